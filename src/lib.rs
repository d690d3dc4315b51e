#![warn(rust_2018_idioms)]

//! Font shaping rules read from FontDame layout dumps.
//!
//! A dump is ingested (`legacy::ingest`) into a `RuleSet`: routines of substitution and
//! chaining rules, grouped into features per script and language. A `Shaper` runs a
//! `ShapePlan` of feature stages over a `Buffer`, and `emit` writes rule sets back out.

pub mod apply;
pub mod buffer;
pub mod config;
pub mod context;
pub mod emit;
pub mod error;
pub mod font;
pub mod glyph_class;
/// Reading of FontDame layout dumps.
pub mod legacy;
pub mod model;
pub mod resolve;
pub mod shaper;
pub mod tag;
pub mod unicode;

pub use crate::legacy::ingest;
