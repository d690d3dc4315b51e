//! Error types

use std::fmt;

use crate::tag::DisplayTag;

/// Error returned when ingesting a legacy rule dump
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum IngestError {
    /// A line did not match the grammar of the state it was read in.
    Parse { line_number: usize, line: String },
    UnsupportedLookupType {
        line_number: usize,
        lookup_type: String,
    },
    /// Class 0 was referenced but no glyph universe was supplied.
    UnknownGlyphUniverse { line_number: usize },
    UnknownClass { line_number: usize, class_id: u32 },
    Resolve(ResolveError),
}

/// Errors that originate when ordering lookups and assembling features
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum ResolveError {
    /// The lookup ids forming the cycle, starting and ending with the same id.
    DependencyCycle(Vec<String>),
    /// A non-default scope for `tag` appeared before its default scope.
    UnscopedLanguageOrdering { feature_id: u32, tag: u32 },
    UnknownLookup(String),
    /// A chaining rule in `lookup` names a context position outside its context.
    BadPosition { lookup: String, position: usize },
}

/// Error returned from shaping functions
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum ShapingError {
    /// Rules were applied to a buffer that still holds codepoints.
    NotGlyphMapped,
    NestingLimitExceeded,
}

/// Error returned when writing a rule set back out
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum EmitError {
    Unrepresentable { routine: String, reason: &'static str },
}

impl From<ResolveError> for IngestError {
    fn from(error: ResolveError) -> Self {
        IngestError::Resolve(error)
    }
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::Parse { line_number, line } => {
                write!(f, "line {}: unable to parse {:?}", line_number, line)
            }
            IngestError::UnsupportedLookupType {
                line_number,
                lookup_type,
            } => write!(
                f,
                "line {}: unsupported lookup type '{}'",
                line_number, lookup_type
            ),
            IngestError::UnknownGlyphUniverse { line_number } => write!(
                f,
                "line {}: class 0 used but the glyph set is unknown",
                line_number
            ),
            IngestError::UnknownClass {
                line_number,
                class_id,
            } => write!(f, "line {}: class {} is not defined", line_number, class_id),
            IngestError::Resolve(err) => write!(f, "resolve: {}", err),
        }
    }
}

impl std::error::Error for IngestError {}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::DependencyCycle(path) => {
                write!(f, "lookup dependency cycle: {}", path.join(" -> "))
            }
            ResolveError::UnscopedLanguageOrdering { feature_id, tag } => write!(
                f,
                "feature {} ('{}') is language specific but precedes the default scope for its tag",
                feature_id,
                DisplayTag(*tag)
            ),
            ResolveError::UnknownLookup(id) => write!(f, "reference to unknown lookup {}", id),
            ResolveError::BadPosition { lookup, position } => write!(
                f,
                "lookup {}: context position {} out of range",
                lookup, position
            ),
        }
    }
}

impl std::error::Error for ResolveError {}

impl fmt::Display for ShapingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapingError::NotGlyphMapped => write!(f, "buffer has not been mapped to glyphs"),
            ShapingError::NestingLimitExceeded => write!(f, "nested lookup limit exceeded"),
        }
    }
}

impl std::error::Error for ShapingError {}

impl fmt::Display for EmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmitError::Unrepresentable { routine, reason } => {
                write!(f, "routine {} can't be written: {}", routine, reason)
            }
        }
    }
}

impl std::error::Error for EmitError {}
