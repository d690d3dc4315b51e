//! The sequence of items shaping operates on.

use std::fmt::Write;
use std::ops::Range;

use crate::font::ShapingFont;
use crate::tag;
use crate::unicode::{normalization_segments, Normalizer};

/// Every feature is enabled for an item with this mask.
pub const ALL_FEATURES: u32 = u32::MAX;

const NOTDEF: &str = ".notdef";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum TextDirection {
    #[default]
    LeftToRight,
    RightToLeft,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct GlyphPosition {
    pub hori_advance: i32,
    pub vert_advance: i32,
    pub x_offset: i32,
    pub y_offset: i32,
}

impl GlyphPosition {
    pub fn new(hori_advance: i32, vert_advance: i32, x_offset: i32, y_offset: i32) -> Self {
        GlyphPosition {
            hori_advance,
            vert_advance,
            x_offset,
            y_offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferItem {
    /// The source character. Kept after mapping so later phases can inspect it.
    pub codepoint: Option<char>,
    /// `None` until the item is mapped to a glyph.
    pub glyph: Option<String>,
    pub cluster: u32,
    /// Features that may act on this item.
    pub mask: u32,
    pub position: GlyphPosition,
}

impl BufferItem {
    pub fn from_char(ch: char, cluster: u32) -> Self {
        BufferItem {
            codepoint: Some(ch),
            glyph: None,
            cluster,
            mask: ALL_FEATURES,
            position: GlyphPosition::default(),
        }
    }

    pub fn from_glyph(glyph: impl Into<String>, cluster: u32) -> Self {
        BufferItem {
            codepoint: None,
            glyph: Some(glyph.into()),
            cluster,
            mask: ALL_FEATURES,
            position: GlyphPosition::default(),
        }
    }

    pub fn glyph_name(&self) -> Option<&str> {
        self.glyph.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer {
    pub items: Vec<BufferItem>,
    pub direction: TextDirection,
    pub script: u32,
    /// `None` is the script's default language.
    pub language: Option<u32>,
    unicode: String,
}

impl Buffer {
    /// A buffer of characters, one cluster per character.
    pub fn from_text(text: &str) -> Self {
        let items = text
            .chars()
            .enumerate()
            .map(|(cluster, ch)| BufferItem::from_char(ch, cluster as u32))
            .collect();
        Buffer {
            items,
            direction: TextDirection::LeftToRight,
            script: tag::DFLT,
            language: None,
            unicode: text.to_string(),
        }
    }

    /// A buffer that is already mapped to glyphs, one cluster per glyph.
    pub fn from_glyphs<S: Into<String>>(glyphs: impl IntoIterator<Item = S>) -> Self {
        let items = glyphs
            .into_iter()
            .enumerate()
            .map(|(cluster, glyph)| BufferItem::from_glyph(glyph, cluster as u32))
            .collect();
        Buffer::from_items(items)
    }

    pub fn from_items(items: Vec<BufferItem>) -> Self {
        Buffer {
            items,
            direction: TextDirection::LeftToRight,
            script: tag::DFLT,
            language: None,
            unicode: String::new(),
        }
    }

    pub fn with_script(mut self, script: u32, language: Option<u32>) -> Self {
        self.script = script;
        self.language = language;
        self
    }

    pub fn with_direction(mut self, direction: TextDirection) -> Self {
        self.direction = direction;
        self
    }

    /// The text the buffer was created from, before normalization.
    pub fn unicode(&self) -> &str {
        &self.unicode
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Normalize the characters of the buffer one segment at a time, see
    /// `unicode::normalization_segments`. Does nothing once any item is a glyph.
    ///
    /// A segment the normalizer leaves unchanged keeps its items. Otherwise every character it
    /// produces takes the lowest cluster of the segment and the mask of its first item.
    pub fn normalize<N: Normalizer + ?Sized>(&mut self, normalizer: &N) {
        let chars = match self
            .items
            .iter()
            .map(|item| match (&item.glyph, item.codepoint) {
                (None, Some(ch)) => Some(ch),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
        {
            Some(chars) => chars,
            None => return,
        };

        let mut items = Vec::with_capacity(self.items.len());
        for segment in normalization_segments(&chars) {
            let source = &self.items[segment.clone()];
            let text = chars[segment].iter().collect::<String>();
            let normalized = normalizer.normalize(&text);
            if normalized == text {
                items.extend_from_slice(source);
                continue;
            }
            let cluster = source.iter().map(|item| item.cluster).min().unwrap_or(0);
            let mask = source.first().map_or(ALL_FEATURES, |item| item.mask);
            items.extend(normalized.chars().map(|ch| BufferItem {
                mask,
                ..BufferItem::from_char(ch, cluster)
            }));
        }
        self.items = items;
    }

    /// Map every unmapped character to its glyph, `.notdef` when the font has none.
    pub fn map_to_glyphs<F: ShapingFont + ?Sized>(&mut self, font: &F) {
        for item in self.items.iter_mut().filter(|item| item.glyph.is_none()) {
            let glyph = item
                .codepoint
                .and_then(|ch| font.glyph_for_char(ch))
                .unwrap_or(NOTDEF);
            item.glyph = Some(glyph.to_string());
        }
    }

    pub fn is_all_glyphs(&self) -> bool {
        self.items.iter().all(|item| item.glyph.is_some())
    }

    /// Disable the features in `mask` for the items in `range`.
    pub fn clear_mask(&mut self, range: Range<usize>, mask: u32) {
        let end = range.end.min(self.items.len());
        let start = range.start.min(end);
        for item in &mut self.items[start..end] {
            item.mask &= !mask;
        }
    }

    pub fn glyph_names(&self) -> Vec<&str> {
        self.items
            .iter()
            .map(|item| item.glyph_name().unwrap_or(NOTDEF))
            .collect()
    }

    pub fn clusters(&self) -> Vec<u32> {
        self.items.iter().map(|item| item.cluster).collect()
    }

    /// Render the buffer as `glyph|glyph`. With `positions`, each glyph is followed by
    /// `@x,y` when it has an offset and by `+advance`.
    pub fn serialize(&self, positions: bool) -> String {
        let mut out = String::new();
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                out.push('|');
            }
            match (&item.glyph, item.codepoint) {
                (Some(glyph), _) => out.push_str(glyph),
                (None, Some(ch)) => {
                    let _ = write!(out, "U+{:04X}", ch as u32);
                }
                (None, None) => out.push_str(NOTDEF),
            }
            if positions {
                let pos = &item.position;
                if pos.x_offset != 0 || pos.y_offset != 0 {
                    let _ = write!(out, "@{},{}", pos.x_offset, pos.y_offset);
                }
                let _ = write!(out, "+{}", pos.hori_advance);
            }
        }
        out
    }
}
