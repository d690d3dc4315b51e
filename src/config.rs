//! Caller supplied names for synthetic classes and lookups.
//!
//! Large glyph classes are given generated names (`@class<N>`) and routines are named after
//! their lookup id. A configuration maps `@class<N>` and `Lookup<N>` to preferred names.

use std::io::Read;

use rustc_hash::FxHashMap;

/// Classes with more members than this are promoted to named classes.
pub const DEFAULT_INLINE_THRESHOLD: usize = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    names: FxHashMap<String, String>,
    pub inline_threshold: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            names: FxHashMap::default(),
            inline_threshold: DEFAULT_INLINE_THRESHOLD,
        }
    }
}

impl Config {
    pub fn new(names: FxHashMap<String, String>) -> Self {
        Config {
            names,
            ..Config::default()
        }
    }

    /// Load a flat JSON object of `"@class3": "@Uppercase"` style pairs.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json).map(Config::new)
    }

    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, serde_json::Error> {
        serde_json::from_reader(reader).map(Config::new)
    }

    pub fn rename(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.names.insert(from.into(), to.into());
    }

    /// Name for the `index`th synthetic class.
    pub fn class_name(&self, index: usize) -> String {
        self.resolve(format!("@class{}", index))
    }

    /// Name of the routine built from lookup `id`: the rename of `Lookup<id>` if there is
    /// one, `lookup_<id>` otherwise.
    pub fn routine_name(&self, id: &str) -> String {
        match self.names.get(&format!("Lookup{}", id)) {
            Some(name) => name.clone(),
            None => format!("lookup_{}", id),
        }
    }

    fn resolve(&self, generated: String) -> String {
        match self.names.get(&generated) {
            Some(name) => name.clone(),
            None => generated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_names() {
        let config = Config::default();
        assert_eq!(config.class_name(0), "@class0");
        assert_eq!(config.routine_name("12"), "lookup_12");
        assert_eq!(config.inline_threshold, 5);
    }

    #[test]
    fn test_json_renames() {
        let config =
            Config::from_json_str(r#"{"@class1": "@Digits", "Lookup4": "fraction_parts"}"#)
                .unwrap();
        assert_eq!(config.class_name(0), "@class0");
        assert_eq!(config.class_name(1), "@Digits");
        assert_eq!(config.routine_name("4"), "fraction_parts");
        assert_eq!(config.routine_name("5"), "lookup_5");
    }

    #[test]
    fn test_json_rejects_non_string_values() {
        assert!(Config::from_json_str(r#"{"@class1": 3}"#).is_err());
    }
}
