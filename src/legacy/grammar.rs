//! Line grammars of the legacy dump format.
//!
//! Every function here is pure: it takes one line (without its line terminator) and returns
//! the event it describes, or `None` when the line doesn't fit the grammar.

use crate::glyph_class::ClassKind;
use crate::model::{LookupFlags, Scope};
use crate::tag;

/// Lookup types understood by the ingester.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupType {
    Single,
    Multiple,
    Ligature,
    Context,
    Chained,
}

impl LookupType {
    pub fn from_name(name: &str) -> Option<LookupType> {
        match name {
            "single" => Some(LookupType::Single),
            "multiple" => Some(LookupType::Multiple),
            "ligature" => Some(LookupType::Ligature),
            "context" => Some(LookupType::Context),
            "chained" => Some(LookupType::Chained),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LookupType::Single => "single",
            LookupType::Multiple => "multiple",
            LookupType::Ligature => "ligature",
            LookupType::Context => "context",
            LookupType::Chained => "chained",
        }
    }
}

/// A line classified by the sentinels that drive state transitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Line<'a> {
    /// Blank or `%` comment.
    Ignored,
    ScriptTableBegin,
    ScriptTableEnd,
    FeatureTableBegin,
    FeatureTableEnd,
    ClassDefinitionBegin(ClassKind),
    ClassDefinitionEnd(ClassKind),
    LookupBegin { id: &'a str, lookup_type: &'a str },
    LookupEnd,
    /// Anything else, handled by the grammar of the current state.
    Body(&'a str),
}

pub fn classify(line: &str) -> Line<'_> {
    if line.trim().is_empty() || line.starts_with('%') {
        return Line::Ignored;
    }
    match line.trim_end() {
        "script table begin" => Line::ScriptTableBegin,
        "script table end" => Line::ScriptTableEnd,
        "feature table begin" => Line::FeatureTableBegin,
        "feature table end" => Line::FeatureTableEnd,
        "class definition begin" => Line::ClassDefinitionBegin(ClassKind::Class),
        "class definition end" => Line::ClassDefinitionEnd(ClassKind::Class),
        "backtrackclass definition begin" => Line::ClassDefinitionBegin(ClassKind::Backtrack),
        "backtrackclass definition end" => Line::ClassDefinitionEnd(ClassKind::Backtrack),
        "lookaheadclass definition begin" => Line::ClassDefinitionBegin(ClassKind::Lookahead),
        "lookaheadclass definition end" => Line::ClassDefinitionEnd(ClassKind::Lookahead),
        "lookup end" => Line::LookupEnd,
        trimmed => match lookup_header(trimmed) {
            Some((id, lookup_type)) => Line::LookupBegin { id, lookup_type },
            None => Line::Body(line),
        },
    }
}

fn lookup_header(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix("lookup")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let (id, lookup_type) = split_field(rest.trim_start())?;
    if !id.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    Some((id, lookup_type.trim_end()))
}

/// Split off the first whitespace separated field.
fn split_field(line: &str) -> Option<(&str, &str)> {
    let end = line.find(char::is_whitespace)?;
    let (head, rest) = line.split_at(end);
    let rest = rest.trim_start();
    if head.is_empty() || rest.is_empty() {
        None
    } else {
        Some((head, rest))
    }
}

/// Split a `, ` separated list, rejecting empty entries.
fn id_list(field: &str) -> Option<Vec<&str>> {
    field
        .split(',')
        .map(str::trim)
        .map(|item| if item.is_empty() { None } else { Some(item) })
        .collect()
}

fn number_list(field: &str) -> Option<Vec<u32>> {
    id_list(field)?
        .into_iter()
        .map(|item| item.parse().ok())
        .collect()
}

/// `<script> <language> <feature-id>[, <feature-id>...]`
pub fn script_line(line: &str) -> Option<(Scope, Vec<u32>)> {
    let (script, rest) = split_field(line)?;
    let (language, features) = split_field(rest)?;
    let scope = Scope::parse(script, language).ok()?;
    Some((scope, number_list(features)?))
}

/// `<id> <tag> <lookup-id>[, <lookup-id>...]`
pub fn feature_line(line: &str) -> Option<(u32, u32, Vec<String>)> {
    let (id, rest) = split_field(line)?;
    let (feature_tag, lookups) = split_field(rest)?;
    let id = id.parse().ok()?;
    let feature_tag = tag::from_string(feature_tag).ok()?;
    let lookups = id_list(lookups)?.into_iter().map(str::to_owned).collect();
    Some((id, feature_tag, lookups))
}

/// `<glyph> <class-id>`
pub fn class_line(line: &str) -> Option<(&str, u32)> {
    let (glyph, class_id) = split_field(line)?;
    Some((glyph, class_id.trim_end().parse().ok()?))
}

/// A rule or flag line inside a lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuleLine<'a> {
    Flag(LookupFlags, bool),
    /// A flag name this crate doesn't know, with its setting.
    UnknownFlag(&'a str, bool),
    MarkAttachmentType(u8),
    Single {
        input: &'a str,
        output: &'a str,
    },
    Multiple {
        input: &'a str,
        output: Vec<&'a str>,
    },
    Ligature {
        components: Vec<&'a str>,
        output: &'a str,
    },
    GlyphContext {
        glyphs: Vec<&'a str>,
        lookups: Vec<(usize, &'a str)>,
    },
    ClassContext {
        classes: Vec<u32>,
        lookups: Vec<(usize, &'a str)>,
    },
    ClassChain {
        backtrack: Vec<u32>,
        input: Vec<u32>,
        lookahead: Vec<u32>,
        lookups: Vec<(usize, &'a str)>,
    },
}

pub fn rule_line(lookup_type: LookupType, line: &str) -> Option<RuleLine<'_>> {
    if let Some(flag) = flag_line(line) {
        return Some(flag);
    }
    match lookup_type {
        LookupType::Single => {
            let (input, output) = split_field(line)?;
            let output = output.trim_end();
            if output.contains(char::is_whitespace) {
                return None;
            }
            Some(RuleLine::Single { input, output })
        }
        LookupType::Multiple => {
            let (input, output) = split_field(line)?;
            Some(RuleLine::Multiple {
                input,
                output: tab_list(output)?,
            })
        }
        LookupType::Ligature => {
            // The ligature comes first, followed by its components.
            let (output, components) = split_field(line)?;
            Some(RuleLine::Ligature {
                components: tab_list(components)?,
                output,
            })
        }
        LookupType::Context => {
            let mut fields = line.trim_end().split('\t');
            let kind = fields.next()?;
            let context = fields.next()?;
            let lookups = positioned_lookups(fields)?;
            match kind {
                "glyph" => Some(RuleLine::GlyphContext {
                    glyphs: id_list(context)?,
                    lookups,
                }),
                "class" => Some(RuleLine::ClassContext {
                    classes: number_list(context)?,
                    lookups,
                }),
                _ => None,
            }
        }
        LookupType::Chained => {
            let mut fields = line.trim_end_matches(['\r', '\n']).split('\t');
            if fields.next()? != "class-chain" {
                return None;
            }
            let backtrack = optional_number_list(fields.next()?)?;
            let input = number_list(fields.next()?)?;
            let lookahead = optional_number_list(fields.next()?)?;
            let lookups = positioned_lookups(fields)?;
            Some(RuleLine::ClassChain {
                backtrack,
                input,
                lookahead,
                lookups,
            })
        }
    }
}

fn flag_line(line: &str) -> Option<RuleLine<'_>> {
    let (name, value) = split_field(line)?;
    let value = value.trim_end();
    if name == "MarkAttachmentType" {
        return value.parse().ok().map(RuleLine::MarkAttachmentType);
    }
    let enabled = match value {
        "yes" => true,
        "no" => false,
        _ => return None,
    };
    match LookupFlags::from_legacy_name(name) {
        Some(flag) => Some(RuleLine::Flag(flag, enabled)),
        None => Some(RuleLine::UnknownFlag(name, enabled)),
    }
}

fn tab_list(field: &str) -> Option<Vec<&str>> {
    field
        .trim_end()
        .split('\t')
        .map(|item| {
            let item = item.trim();
            if item.is_empty() || item.contains(char::is_whitespace) {
                None
            } else {
                Some(item)
            }
        })
        .collect()
}

fn optional_number_list(field: &str) -> Option<Vec<u32>> {
    if field.trim().is_empty() {
        Some(Vec::new())
    } else {
        number_list(field)
    }
}

/// `<position>, <lookup-id>` fields with 1-based positions, converted to 0-based.
fn positioned_lookups<'a>(fields: impl Iterator<Item = &'a str>) -> Option<Vec<(usize, &'a str)>> {
    fields
        .filter(|field| !field.trim().is_empty())
        .map(|field| {
            let (position, lookup) = field.split_once(',')?;
            let position = position.trim().parse::<usize>().ok()?.checked_sub(1)?;
            let lookup = lookup.trim();
            if lookup.is_empty() {
                None
            } else {
                Some((position, lookup))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_sentinels() {
        assert_eq!(classify("script table begin"), Line::ScriptTableBegin);
        assert_eq!(classify("feature table end\r"), Line::FeatureTableEnd);
        assert_eq!(
            classify("lookaheadclass definition begin"),
            Line::ClassDefinitionBegin(ClassKind::Lookahead)
        );
        assert_eq!(
            classify("lookup 12 chained"),
            Line::LookupBegin {
                id: "12",
                lookup_type: "chained"
            }
        );
        assert_eq!(classify("lookup end"), Line::LookupEnd);
        assert_eq!(classify(""), Line::Ignored);
        assert_eq!(classify("% a comment"), Line::Ignored);
        assert_eq!(classify("lookupflag yes"), Line::Body("lookupflag yes"));
    }

    #[test]
    fn test_script_line() {
        let (scope, features) = script_line("latn TRK 0, 3, 4").unwrap();
        assert_eq!(scope, Scope::parse("latn", "TRK").unwrap());
        assert_eq!(features, vec![0, 3, 4]);
        assert!(script_line("latn default").is_none());
        assert!(script_line("latn default x").is_none());
    }

    #[test]
    fn test_feature_line() {
        assert_eq!(
            feature_line("2 liga 5, 6"),
            Some((2, tag::LIGA, vec!["5".to_string(), "6".to_string()]))
        );
        assert!(feature_line("two liga 5").is_none());
    }

    #[test]
    fn test_class_line() {
        assert_eq!(class_line("a.sc 3"), Some(("a.sc", 3)));
        assert!(class_line("a.sc").is_none());
        assert!(class_line("a.sc three").is_none());
    }

    #[test]
    fn test_substitution_lines() {
        assert_eq!(
            rule_line(LookupType::Single, "a a.sc"),
            Some(RuleLine::Single {
                input: "a",
                output: "a.sc"
            })
        );
        assert!(rule_line(LookupType::Single, "a b c").is_none());
        assert_eq!(
            rule_line(LookupType::Multiple, "f_i f\ti"),
            Some(RuleLine::Multiple {
                input: "f_i",
                output: vec!["f", "i"]
            })
        );
        assert_eq!(
            rule_line(LookupType::Ligature, "f_f_i f\tf\ti"),
            Some(RuleLine::Ligature {
                components: vec!["f", "f", "i"],
                output: "f_f_i"
            })
        );
    }

    #[test]
    fn test_flag_lines() {
        assert_eq!(
            rule_line(LookupType::Single, "IgnoreMarks yes"),
            Some(RuleLine::Flag(LookupFlags::IGNORE_MARKS, true))
        );
        assert_eq!(
            rule_line(LookupType::Ligature, "RightToLeft no"),
            Some(RuleLine::Flag(LookupFlags::RIGHT_TO_LEFT, false))
        );
        assert_eq!(
            rule_line(LookupType::Chained, "MarkAttachmentType 2"),
            Some(RuleLine::MarkAttachmentType(2))
        );
        assert_eq!(
            rule_line(LookupType::Single, "UseMarkFilteringSet yes"),
            Some(RuleLine::UnknownFlag("UseMarkFilteringSet", true))
        );
    }

    #[test]
    fn test_context_lines() {
        assert_eq!(
            rule_line(LookupType::Context, "glyph\ta, b\t1, 7\t2, 8"),
            Some(RuleLine::GlyphContext {
                glyphs: vec!["a", "b"],
                lookups: vec![(0, "7"), (1, "8")]
            })
        );
        assert_eq!(
            rule_line(LookupType::Context, "class\t1, 2\t2,9"),
            Some(RuleLine::ClassContext {
                classes: vec![1, 2],
                lookups: vec![(1, "9")]
            })
        );
        assert!(rule_line(LookupType::Context, "glyph\ta\t0, 7").is_none());
        assert!(rule_line(LookupType::Context, "coverage\ta\t1, 7").is_none());
    }

    #[test]
    fn test_class_chain_line() {
        assert_eq!(
            rule_line(LookupType::Chained, "class-chain\t\t1, 2\t3\t1, 4"),
            Some(RuleLine::ClassChain {
                backtrack: vec![],
                input: vec![1, 2],
                lookahead: vec![3],
                lookups: vec![(0, "4")]
            })
        );
        assert_eq!(
            rule_line(LookupType::Chained, "class-chain\t1\t2\t\t1, 4"),
            Some(RuleLine::ClassChain {
                backtrack: vec![1],
                input: vec![2],
                lookahead: vec![],
                lookups: vec![(0, "4")]
            })
        );
        assert!(rule_line(LookupType::Chained, "class-chain\t1\t\t\t1, 4").is_none());
        assert!(rule_line(LookupType::Chained, "glyph-chain\t\ta\t\t1, 4").is_none());
    }
}
