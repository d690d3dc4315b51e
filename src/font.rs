//! What shaping needs to know about a font.
//!
//! Font files are not read here. A `ShapingFont` answers coverage, mapping, metric and glyph
//! category questions by glyph name; `GlyphMap` is an in-memory implementation.

use rustc_hash::FxHashMap;

/// Glyph classification used to skip glyphs when a lookup ignores bases, ligatures or marks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum GlyphCategory {
    #[default]
    Unclassified,
    Base,
    Ligature,
    Mark,
    Component,
}

pub trait ShapingFont {
    /// The glyph the font maps `ch` to.
    fn glyph_for_char(&self, ch: char) -> Option<&str>;

    fn has_glyph(&self, ch: char) -> bool {
        self.glyph_for_char(ch).is_some()
    }

    /// Horizontal advance of `glyph` in font units.
    fn advance(&self, glyph: &str) -> i32;

    fn glyph_category(&self, _glyph: &str) -> GlyphCategory {
        GlyphCategory::Unclassified
    }

    /// Mark attachment class of `glyph`, 0 when it has none.
    fn mark_attachment_class(&self, _glyph: &str) -> u8 {
        0
    }
}

/// A character map and glyph metrics held in memory.
#[derive(Clone, Debug, Default)]
pub struct GlyphMap {
    cmap: FxHashMap<char, String>,
    glyphs: Vec<String>,
    advances: FxHashMap<String, i32>,
    categories: FxHashMap<String, (GlyphCategory, u8)>,
}

impl GlyphMap {
    pub fn new() -> Self {
        GlyphMap::default()
    }

    /// Add a glyph with its horizontal advance.
    pub fn add_glyph(&mut self, glyph: &str, advance: i32) -> &mut Self {
        if !self.advances.contains_key(glyph) {
            self.glyphs.push(glyph.to_string());
        }
        self.advances.insert(glyph.to_string(), advance);
        self
    }

    /// Map `ch` to `glyph`, adding the glyph with a zero advance if it is new.
    pub fn map_char(&mut self, ch: char, glyph: &str) -> &mut Self {
        if !self.advances.contains_key(glyph) {
            self.add_glyph(glyph, 0);
        }
        self.cmap.insert(ch, glyph.to_string());
        self
    }

    pub fn set_category(&mut self, glyph: &str, category: GlyphCategory) -> &mut Self {
        let entry = self
            .categories
            .entry(glyph.to_string())
            .or_insert((GlyphCategory::Unclassified, 0));
        entry.0 = category;
        self
    }

    /// Mark `glyph` as a mark of attachment `class`.
    pub fn set_mark_class(&mut self, glyph: &str, class: u8) -> &mut Self {
        self.categories
            .insert(glyph.to_string(), (GlyphCategory::Mark, class));
        self
    }

    /// Every glyph name, in the order glyphs were added.
    pub fn glyph_names(&self) -> &[String] {
        &self.glyphs
    }
}

impl ShapingFont for GlyphMap {
    fn glyph_for_char(&self, ch: char) -> Option<&str> {
        self.cmap.get(&ch).map(String::as_str)
    }

    fn advance(&self, glyph: &str) -> i32 {
        self.advances.get(glyph).copied().unwrap_or(0)
    }

    fn glyph_category(&self, glyph: &str) -> GlyphCategory {
        self.categories
            .get(glyph)
            .map_or(GlyphCategory::Unclassified, |&(category, _)| category)
    }

    fn mark_attachment_class(&self, glyph: &str) -> u8 {
        self.categories.get(glyph).map_or(0, |&(_, class)| class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glyph_map() {
        let mut font = GlyphMap::new();
        font.add_glyph("space", 250)
            .map_char(' ', "space")
            .map_char('a', "a")
            .set_mark_class("acutecomb", 2);
        assert_eq!(font.glyph_for_char(' '), Some("space"));
        assert!(font.has_glyph('a'));
        assert!(!font.has_glyph('b'));
        assert_eq!(font.advance("space"), 250);
        assert_eq!(font.advance("missing"), 0);
        assert_eq!(font.glyph_category("acutecomb"), GlyphCategory::Mark);
        assert_eq!(font.mark_attachment_class("acutecomb"), 2);
        assert_eq!(font.glyph_category("a"), GlyphCategory::Unclassified);
        assert_eq!(font.glyph_names(), ["space", "a"]);
    }
}
