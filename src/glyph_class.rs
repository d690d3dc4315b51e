//! Glyph classes: numbered class tables read from a dump and the references rules hold.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::config::Config;

/// A reference to the glyphs a rule matches or produces at one position.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum GlyphClassRef {
    Glyph(String),
    /// A small class written out where it is used.
    Inline(Vec<String>),
    /// A class large enough to be shared under a name.
    Named { name: String, members: Rc<[String]> },
}

impl GlyphClassRef {
    pub fn glyph(name: impl Into<String>) -> Self {
        GlyphClassRef::Glyph(name.into())
    }

    pub fn inline<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        GlyphClassRef::Inline(names.into_iter().map(Into::into).collect())
    }

    pub fn glyphs(&self) -> &[String] {
        match self {
            GlyphClassRef::Glyph(name) => std::slice::from_ref(name),
            GlyphClassRef::Inline(names) => names,
            GlyphClassRef::Named { members, .. } => members,
        }
    }

    pub fn contains(&self, glyph: &str) -> bool {
        self.position(glyph).is_some()
    }

    pub fn position(&self, glyph: &str) -> Option<usize> {
        self.glyphs().iter().position(|name| name == glyph)
    }

    pub fn len(&self) -> usize {
        self.glyphs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs().is_empty()
    }
}

/// Which of a lookup's three class definitions a class id refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassKind {
    Class,
    Backtrack,
    Lookahead,
}

/// Why a class id could not be turned into glyphs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissingClass {
    /// Class 0 needs the glyph universe to compute its complement.
    Universe,
    Undefined(u32),
}

/// The class definitions in effect for a single lookup.
#[derive(Clone, Debug, Default)]
pub struct ClassTable {
    class: FxHashMap<u32, Vec<String>>,
    backtrack: FxHashMap<u32, Vec<String>>,
    lookahead: FxHashMap<u32, Vec<String>>,
}

impl ClassTable {
    pub fn new() -> Self {
        ClassTable::default()
    }

    pub fn clear(&mut self) {
        self.class.clear();
        self.backtrack.clear();
        self.lookahead.clear();
    }

    pub fn define(&mut self, kind: ClassKind, glyph: &str, class_id: u32) {
        let members = self.table_mut(kind).entry(class_id).or_default();
        if !members.iter().any(|member| member == glyph) {
            members.push(glyph.to_owned());
        }
    }

    /// Members of `class_id`. Class 0 is every glyph of `universe` that no other class of the
    /// same kind claims, in universe order.
    pub fn members(
        &self,
        kind: ClassKind,
        class_id: u32,
        universe: Option<&[String]>,
    ) -> Result<Vec<String>, MissingClass> {
        let table = self.table(kind);
        if class_id == 0 {
            let universe = universe.ok_or(MissingClass::Universe)?;
            let complement = universe
                .iter()
                .filter(|glyph| {
                    !table
                        .iter()
                        .any(|(id, members)| *id != 0 && members.contains(*glyph))
                })
                .cloned()
                .collect();
            return Ok(complement);
        }
        table
            .get(&class_id)
            .cloned()
            .ok_or(MissingClass::Undefined(class_id))
    }

    fn table(&self, kind: ClassKind) -> &FxHashMap<u32, Vec<String>> {
        match kind {
            ClassKind::Class => &self.class,
            ClassKind::Backtrack => &self.backtrack,
            ClassKind::Lookahead => &self.lookahead,
        }
    }

    fn table_mut(&mut self, kind: ClassKind) -> &mut FxHashMap<u32, Vec<String>> {
        match kind {
            ClassKind::Class => &mut self.class,
            ClassKind::Backtrack => &mut self.backtrack,
            ClassKind::Lookahead => &mut self.lookahead,
        }
    }
}

/// Turns member lists into `GlyphClassRef`s, naming large classes.
///
/// Identical member lists always resolve to the same named class for the lifetime of the
/// resolver, which spans one ingestion.
#[derive(Debug)]
pub struct ClassResolver<'c> {
    config: &'c Config,
    named: Vec<(String, Rc<[String]>)>,
    index: FxHashMap<Vec<String>, usize>,
}

impl<'c> ClassResolver<'c> {
    pub fn new(config: &'c Config) -> Self {
        ClassResolver {
            config,
            named: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    pub fn resolve(&mut self, members: Vec<String>) -> GlyphClassRef {
        if members.len() == 1 {
            let mut members = members;
            return GlyphClassRef::Glyph(members.remove(0));
        }
        if members.len() <= self.config.inline_threshold {
            return GlyphClassRef::Inline(members);
        }
        let index = match self.index.get(&members) {
            Some(&index) => index,
            None => {
                let index = self.named.len();
                let name = self.config.class_name(index);
                self.named.push((name, Rc::from(members.clone())));
                self.index.insert(members, index);
                index
            }
        };
        let (name, members) = &self.named[index];
        GlyphClassRef::Named {
            name: name.clone(),
            members: Rc::clone(members),
        }
    }

    /// The named classes created so far, in creation order.
    pub fn into_named_classes(self) -> Vec<(String, Rc<[String]>)> {
        self.named
    }
}
