//! Glyph skipping and context matching for routines.

use crate::buffer::BufferItem;
use crate::font::{GlyphCategory, ShapingFont};
use crate::glyph_class::GlyphClassRef;
use crate::model::LookupFlags;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IgnoreMarks {
    NoIgnoreMarks,
    IgnoreAllMarks,
    IgnoreMarksExcept(u8),
}

/// Which glyphs a routine looks at. Glyphs it doesn't match are skipped over while matching.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MatchType {
    ignore_bases: bool,
    ignore_ligatures: bool,
    ignore_marks: IgnoreMarks,
}

impl MatchType {
    pub fn all() -> MatchType {
        MatchType {
            ignore_bases: false,
            ignore_ligatures: false,
            ignore_marks: IgnoreMarks::NoIgnoreMarks,
        }
    }

    pub fn ignore_marks() -> MatchType {
        MatchType {
            ignore_marks: IgnoreMarks::IgnoreAllMarks,
            ..MatchType::all()
        }
    }

    pub fn from_lookup_flags(flags: LookupFlags) -> MatchType {
        let ignore_marks = if flags.contains(LookupFlags::IGNORE_MARKS) {
            IgnoreMarks::IgnoreAllMarks
        } else if let Some(class) = flags.mark_attachment_type() {
            IgnoreMarks::IgnoreMarksExcept(class)
        } else {
            IgnoreMarks::NoIgnoreMarks
        };
        MatchType {
            ignore_bases: flags.contains(LookupFlags::IGNORE_BASE_GLYPHS),
            ignore_ligatures: flags.contains(LookupFlags::IGNORE_LIGATURES),
            ignore_marks,
        }
    }

    pub fn match_glyph(self, opt_font: Option<&dyn ShapingFont>, item: &BufferItem) -> bool {
        if !self.ignore_bases
            && !self.ignore_ligatures
            && self.ignore_marks == IgnoreMarks::NoIgnoreMarks
        {
            // fast path that doesn't require the glyph category
            return true;
        }
        let (font, glyph) = match (opt_font, item.glyph_name()) {
            (Some(font), Some(glyph)) => (font, glyph),
            _ => return true,
        };
        let category = font.glyph_category(glyph);
        if self.ignore_bases && category == GlyphCategory::Base {
            return false;
        }
        if self.ignore_ligatures && category == GlyphCategory::Ligature {
            return false;
        }
        match self.ignore_marks {
            IgnoreMarks::NoIgnoreMarks => true,
            IgnoreMarks::IgnoreAllMarks => category != GlyphCategory::Mark,
            IgnoreMarks::IgnoreMarksExcept(keep_class) => {
                category != GlyphCategory::Mark || font.mark_attachment_class(glyph) == keep_class
            }
        }
    }

    // searches backwards from items[index-1]
    pub fn find_prev(
        self,
        opt_font: Option<&dyn ShapingFont>,
        items: &[BufferItem],
        mut index: usize,
    ) -> Option<usize> {
        while index > 0 {
            index -= 1;
            if self.match_glyph(opt_font, &items[index]) {
                return Some(index);
            }
        }
        None
    }

    // searches forwards from items[index+1]
    pub fn find_next(
        self,
        opt_font: Option<&dyn ShapingFont>,
        items: &[BufferItem],
        mut index: usize,
    ) -> Option<usize> {
        while index + 1 < items.len() {
            index += 1;
            if self.match_glyph(opt_font, &items[index]) {
                return Some(index);
            }
        }
        None
    }

    // count == 0 will return current index
    pub fn find_nth(
        self,
        opt_font: Option<&dyn ShapingFont>,
        items: &[BufferItem],
        mut index: usize,
        count: usize,
    ) -> Option<usize> {
        for _ in 0..count {
            index = self.find_next(opt_font, items, index)?;
        }
        Some(index)
    }

    /// Match `classes` right-aligned against the glyphs before `items[index]`.
    pub fn match_back(
        self,
        opt_font: Option<&dyn ShapingFont>,
        classes: &[GlyphClassRef],
        items: &[BufferItem],
        mut index: usize,
    ) -> bool {
        for class in classes.iter().rev() {
            match self.find_prev(opt_font, items, index) {
                Some(prev_index) if item_in_class(&items[prev_index], class) => index = prev_index,
                _ => return false,
            }
        }
        true
    }

    /// Match `classes` against the glyphs after `items[index]`, returning the indices matched.
    pub fn match_front(
        self,
        opt_font: Option<&dyn ShapingFont>,
        classes: &[GlyphClassRef],
        items: &[BufferItem],
        mut index: usize,
    ) -> Option<Vec<usize>> {
        let mut matched = Vec::with_capacity(classes.len());
        for class in classes {
            match self.find_next(opt_font, items, index) {
                Some(next_index) if item_in_class(&items[next_index], class) => {
                    index = next_index;
                    matched.push(index);
                }
                _ => return None,
            }
        }
        Some(matched)
    }
}

/// The items matched by a rule at one position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Match {
    /// Index of each input glyph. The first is where the match starts.
    pub positions: Vec<usize>,
}

impl Match {
    pub fn start(&self) -> usize {
        self.positions[0]
    }

    /// Index of the last input glyph.
    pub fn end(&self) -> usize {
        self.positions[self.positions.len() - 1]
    }
}

/// A rule's precontext, input and postcontext as seen by the matcher.
pub struct MatchContext<'a> {
    pub backtrack: &'a [GlyphClassRef],
    pub input: &'a [GlyphClassRef],
    pub lookahead: &'a [GlyphClassRef],
}

impl<'a> MatchContext<'a> {
    /// Match with the first input glyph at `index`.
    ///
    /// Input glyphs must also be enabled by `mask`. Context glyphs only have to be in their
    /// class.
    pub fn matches(
        &self,
        opt_font: Option<&dyn ShapingFont>,
        match_type: MatchType,
        items: &[BufferItem],
        index: usize,
        mask: u32,
    ) -> Option<Match> {
        let (first, rest) = self.input.split_first()?;
        let item = items.get(index)?;
        if !item_in_class(item, first) || !match_type.match_glyph(opt_font, item) {
            return None;
        }
        let mut positions = vec![index];
        positions.extend(match_type.match_front(opt_font, rest, items, index)?);
        if positions.iter().any(|&i| items[i].mask & mask == 0) {
            return None;
        }
        let last = positions[positions.len() - 1];
        if !match_type.match_back(opt_font, self.backtrack, items, index) {
            return None;
        }
        match_type.match_front(opt_font, self.lookahead, items, last)?;
        Some(Match { positions })
    }
}

fn item_in_class(item: &BufferItem, class: &GlyphClassRef) -> bool {
    item.glyph_name().is_some_and(|glyph| class.contains(glyph))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{Buffer, ALL_FEATURES};
    use crate::font::GlyphMap;

    fn glyph(name: &str) -> GlyphClassRef {
        GlyphClassRef::glyph(name)
    }

    fn font() -> GlyphMap {
        let mut font = GlyphMap::new();
        font.set_mark_class("acute", 1)
            .set_mark_class("dot", 2)
            .set_category("f_i", GlyphCategory::Ligature)
            .set_category("a", GlyphCategory::Base);
        font
    }

    #[test]
    fn test_from_lookup_flags() {
        assert_eq!(
            MatchType::from_lookup_flags(LookupFlags::IGNORE_MARKS),
            MatchType::ignore_marks()
        );
        let flags = LookupFlags::empty().with_mark_attachment_type(2);
        assert_eq!(
            MatchType::from_lookup_flags(flags).ignore_marks,
            IgnoreMarks::IgnoreMarksExcept(2)
        );
    }

    #[test]
    fn test_match_glyph() {
        let font = font();
        let items = Buffer::from_glyphs(["a", "acute", "dot", "f_i"]).items;
        let except_dot = MatchType::from_lookup_flags(LookupFlags::empty().with_mark_attachment_type(2));
        let matched = items
            .iter()
            .map(|item| except_dot.match_glyph(Some(&font), item))
            .collect::<Vec<_>>();
        assert_eq!(matched, vec![true, false, true, true]);

        let ignore_ligatures = MatchType::from_lookup_flags(LookupFlags::IGNORE_LIGATURES);
        assert!(!ignore_ligatures.match_glyph(Some(&font), &items[3]));
        // Without a font nothing can be classified.
        assert!(MatchType::ignore_marks().match_glyph(None, &items[1]));
    }

    #[test]
    fn test_find_skips_marks() {
        let font = font();
        let items = Buffer::from_glyphs(["a", "acute", "dot", "b"]).items;
        let match_type = MatchType::ignore_marks();
        assert_eq!(match_type.find_next(Some(&font), &items, 0), Some(3));
        assert_eq!(match_type.find_prev(Some(&font), &items, 3), Some(0));
        assert_eq!(match_type.find_nth(Some(&font), &items, 0, 1), Some(3));
        assert_eq!(match_type.find_nth(Some(&font), &items, 0, 2), None);
        assert_eq!(MatchType::all().find_nth(None, &items, 1, 0), Some(1));
    }

    #[test]
    fn test_match_context() {
        let font = font();
        let items = Buffer::from_glyphs(["x", "a", "acute", "b", "y"]).items;
        let backtrack = [glyph("x")];
        let input = [glyph("a"), GlyphClassRef::inline(["b", "c"])];
        let lookahead = [glyph("y")];
        let context = MatchContext {
            backtrack: &backtrack,
            input: &input,
            lookahead: &lookahead,
        };
        let matched = context
            .matches(Some(&font), MatchType::ignore_marks(), &items, 1, ALL_FEATURES)
            .unwrap();
        assert_eq!(matched.positions, vec![1, 3]);
        assert_eq!((matched.start(), matched.end()), (1, 3));

        // The mark is in the way when marks are not ignored.
        assert!(context
            .matches(Some(&font), MatchType::all(), &items, 1, ALL_FEATURES)
            .is_none());
    }

    #[test]
    fn test_match_respects_mask() {
        let mut buffer = Buffer::from_glyphs(["a", "b"]);
        buffer.clear_mask(1..2, 0b10);
        let input = [glyph("a"), glyph("b")];
        let context = MatchContext {
            backtrack: &[],
            input: &input,
            lookahead: &[],
        };
        assert!(context
            .matches(None, MatchType::all(), &buffer.items, 0, 0b10)
            .is_none());
        assert!(context
            .matches(None, MatchType::all(), &buffer.items, 0, 0b100)
            .is_some());
    }
}
