use std::path::{Path, PathBuf};

pub fn fixture_path<P: AsRef<Path>>(path: P) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(path)
}

/// Read a dump from `tests/fixtures`
pub fn read_fixture<P: AsRef<Path>>(path: P) -> String {
    std::fs::read_to_string(fixture_path(path)).expect("error reading file contents")
}

/// Glyph names from string literals.
#[allow(dead_code)]
pub fn names(glyphs: &[&str]) -> Vec<String> {
    glyphs.iter().map(|glyph| glyph.to_string()).collect()
}
