//! Unicode properties used while preparing text for shaping.

pub mod mcc;

use std::ops::Range;

use unicode_general_category::{get_general_category, GeneralCategory};
use unicode_normalization::char::compose;
use unicode_normalization::UnicodeNormalization;

use self::mcc::{canonical_combining_class, sort_by_modified_combining_class, NOT_REORDERED};

/// Is `ch` in the general category "separator, space" (Zs)?
pub fn is_space_separator(ch: char) -> bool {
    get_general_category(ch) == GeneralCategory::SpaceSeparator
}

/// Default ignorable code points that are hidden after positioning.
pub fn is_default_ignorable(ch: char) -> bool {
    let ch = ch as u32;
    let plane = ch >> 16;
    if plane == 0 {
        // BMP
        match ch >> 8 {
            0x00 => ch == 0x00AD,
            0x03 => ch == 0x034F,
            0x06 => ch == 0x061C,
            0x17 => (0x17B4..=0x17B5).contains(&ch),
            0x18 => (0x180B..=0x180E).contains(&ch),
            0x20 => {
                (0x200B..=0x200F).contains(&ch)
                    || (0x202A..=0x202E).contains(&ch)
                    || (0x2060..=0x206F).contains(&ch)
            }
            0xFE => (0xFE00..=0xFE0F).contains(&ch) || ch == 0xFEFF,
            0xFF => (0xFFF0..=0xFFF8).contains(&ch),
            _ => false,
        }
    } else {
        match plane {
            0x01 => (0x1D173..=0x1D17A).contains(&ch),
            0x0E => (0xE0000..=0xE0FFF).contains(&ch),
            _ => false,
        }
    }
}

/// Normalizes text before it is mapped to glyphs.
pub trait Normalizer {
    fn normalize(&self, text: &str) -> String;
}

/// Canonical composition (NFC), then marks reordered by modified combining class.
#[derive(Clone, Copy, Debug, Default)]
pub struct Nfc;

impl Normalizer for Nfc {
    fn normalize(&self, text: &str) -> String {
        let mut chars = text.nfc().collect::<Vec<_>>();
        sort_by_modified_combining_class(&mut chars);
        chars.into_iter().collect()
    }
}

/// Canonical reordering of combining marks.
///
/// Runs of non-starters are stably sorted by modified combining class. No composition or
/// decomposition is performed, so the number of characters never changes.
#[derive(Clone, Copy, Debug, Default)]
pub struct CanonicalOrdering;

impl Normalizer for CanonicalOrdering {
    fn normalize(&self, text: &str) -> String {
        let mut chars = text.chars().collect::<Vec<_>>();
        sort_by_modified_combining_class(&mut chars);
        chars.into_iter().collect()
    }
}

/// Leaves text untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unnormalized;

impl Normalizer for Unnormalized {
    fn normalize(&self, text: &str) -> String {
        text.to_string()
    }
}

/// Split `chars` into ranges that normalize independently. Each range is a starter, the
/// starters that compose with it, and the non-starters after them. Non-starters at the start
/// of the text form a range of their own.
pub fn normalization_segments(chars: &[char]) -> Vec<Range<usize>> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut starter = None;
    for (i, &ch) in chars.iter().enumerate() {
        if canonical_combining_class(ch) != NOT_REORDERED {
            starter = None;
            continue;
        }
        if let Some(composed) = starter.and_then(|prev| compose(prev, ch)) {
            starter = Some(composed);
            continue;
        }
        if i > start {
            segments.push(start..i);
            start = i;
        }
        starter = Some(ch);
    }
    if start < chars.len() {
        segments.push(start..chars.len());
    }
    segments
}
