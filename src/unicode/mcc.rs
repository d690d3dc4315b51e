use std::cmp::Ordering;

use unicode_canonical_combining_class::get_canonical_combining_class;

/// Starters have class 0 and are never reordered.
pub const NOT_REORDERED: u8 = 0;

pub fn canonical_combining_class(ch: char) -> u8 {
    get_canonical_combining_class(ch) as u8
}

/// The canonical combining class of `ch` with a few values remapped so marks sort the way
/// fonts expect:
///
/// * Hebrew points (10 to 26) follow the order of the SBL Hebrew Font User Manual.
/// * The Telugu length marks (84 and 91) become 4 and 5, otherwise they would be moved after
///   a virama.
pub fn modified_combining_class(ch: char) -> u8 {
    match canonical_combining_class(ch) {
        10 => 22,
        11 => 15,
        12 => 16,
        13 => 17,
        14 => 23,
        15 => 18,
        16 => 19,
        17 => 20,
        18 => 21,
        19 => 14,
        20 => 24,
        21 => 12,
        22 => 25,
        23 => 13,
        24 => 10,
        25 => 11,
        84 => 4,
        91 => 5,
        class => class,
    }
}

/// Stably sort each run of non-starters by modified combining class.
pub fn sort_by_modified_combining_class(chars: &mut [char]) {
    fn compare(a: &char, b: &char) -> Ordering {
        modified_combining_class(*a).cmp(&modified_combining_class(*b))
    }

    for run in chars.split_mut(|&ch| modified_combining_class(ch) == NOT_REORDERED) {
        run.sort_by(compare)
    }
}
