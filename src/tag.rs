//! OpenType tags: scripts, languages and features.

use std::fmt;

/// Generate a 4-byte tag from byte string
///
/// Example:
///
/// ```
/// use fontdame::tag;
/// assert_eq!(tag::LIGA, 0x6C696761);
/// ```
macro_rules! tag {
    ($w:expr) => {
        tag(*$w)
    };
}

#[derive(PartialEq, Eq, Clone, Copy)]
pub struct DisplayTag(pub u32);

/// Returned from `from_string` when the text can't be packed into a tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InvalidTag;

const fn tag(chars: [u8; 4]) -> u32 {
    (chars[3] as u32)
        | ((chars[2] as u32) << 8)
        | ((chars[1] as u32) << 16)
        | ((chars[0] as u32) << 24)
}

/// Pack up to four printable ASCII characters into a tag, padding with spaces.
pub fn from_string(s: &str) -> Result<u32, InvalidTag> {
    if s.is_empty() || s.len() > 4 {
        return Err(InvalidTag);
    }

    let mut tag: u32 = 0;
    let mut count = 0;

    for c in s.chars() {
        if !c.is_ascii() || c.is_ascii_control() {
            return Err(InvalidTag);
        }

        tag = (tag << 8) | (c as u32);
        count += 1;
    }

    while count < 4 {
        tag = (tag << 8) | (' ' as u32);
        count += 1;
    }

    Ok(tag)
}

impl fmt::Display for DisplayTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = self.0;
        let mut s = String::with_capacity(4);
        s.push(char::from((tag >> 24) as u8));
        s.push(char::from(((tag >> 16) & 255) as u8));
        s.push(char::from(((tag >> 8) & 255) as u8));
        s.push(char::from((tag & 255) as u8));
        if s.chars().any(|c| !c.is_ascii() || c.is_ascii_control()) {
            write!(f, "0x{:08x}", tag)
        } else {
            // Padding is not part of the name in legacy dumps or feature files.
            s.trim_end_matches(' ').fmt(f)
        }
    }
}

impl fmt::Debug for DisplayTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_string().fmt(f)
    }
}

impl fmt::Display for InvalidTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid tag")
    }
}

impl std::error::Error for InvalidTag {}

pub const CALT: u32 = tag!(b"calt");
pub const CCMP: u32 = tag!(b"ccmp");
pub const CLIG: u32 = tag!(b"clig");
pub const CURS: u32 = tag!(b"curs");
pub const CYRL: u32 = tag!(b"cyrl");
pub const DFLT: u32 = tag!(b"DFLT");
pub const DIST: u32 = tag!(b"dist");
pub const GREK: u32 = tag!(b"grek");
pub const KERN: u32 = tag!(b"kern");
pub const LATN: u32 = tag!(b"latn");
pub const LIGA: u32 = tag!(b"liga");
pub const LOCL: u32 = tag!(b"locl");
pub const MARK: u32 = tag!(b"mark");
pub const MKMK: u32 = tag!(b"mkmk");
pub const RLIG: u32 = tag!(b"rlig");
pub const SMCP: u32 = tag!(b"smcp");
