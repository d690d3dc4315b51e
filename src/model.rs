//! The canonical rule model: routines of rules, grouped into features.
//!
//! A `RuleSet` is immutable once assembled. Routines are shared through `Rc`; a routine that
//! is attached to a language specific feature is a separate copy carrying that feature's
//! scopes, so scoping never leaks between features that started from the same lookup.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;

use crate::error::ResolveError;
use crate::glyph_class::GlyphClassRef;
use crate::tag::{self, DisplayTag, InvalidTag};

/// A (script, language) pair. A language of `None` is the script's default language system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Scope {
    pub script: u32,
    pub language: Option<u32>,
}

impl Scope {
    /// `DFLT/default`
    pub const DEFAULT: Scope = Scope {
        script: tag::DFLT,
        language: None,
    };

    pub fn new(script: u32, language: Option<u32>) -> Self {
        Scope { script, language }
    }

    /// Parse the script and language words of a legacy script table line.
    pub fn parse(script: &str, language: &str) -> Result<Self, InvalidTag> {
        let script = tag::from_string(script)?;
        let language = match language {
            "default" | "dflt" => None,
            language => Some(tag::from_string(language)?),
        };
        Ok(Scope { script, language })
    }

    pub fn is_default(&self) -> bool {
        *self == Scope::DEFAULT
    }

    /// Does something registered under this scope act on text in `script`/`language`?
    ///
    /// The default scope acts everywhere, a script's default language acts for every
    /// language of that script.
    pub fn applies_to(&self, script: u32, language: Option<u32>) -> bool {
        if self.is_default() {
            return true;
        }
        self.script == script && (self.language.is_none() || self.language == language)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.language {
            Some(language) => write!(f, "{}/{}", DisplayTag(self.script), DisplayTag(language)),
            None => write!(f, "{}/default", DisplayTag(self.script)),
        }
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct LookupFlags: u16 {
        const RIGHT_TO_LEFT = 0x0001;
        const IGNORE_BASE_GLYPHS = 0x0002;
        const IGNORE_LIGATURES = 0x0004;
        const IGNORE_MARKS = 0x0008;
        /// High byte: only marks of this attachment class are matched.
        const MARK_ATTACHMENT_TYPE = 0xFF00;
    }
}

impl LookupFlags {
    /// Flags as they are named in legacy dumps.
    pub const NAMED: [(&'static str, LookupFlags); 4] = [
        ("RightToLeft", LookupFlags::RIGHT_TO_LEFT),
        ("IgnoreBaseGlyphs", LookupFlags::IGNORE_BASE_GLYPHS),
        ("IgnoreLigatures", LookupFlags::IGNORE_LIGATURES),
        ("IgnoreMarks", LookupFlags::IGNORE_MARKS),
    ];

    pub fn from_legacy_name(name: &str) -> Option<LookupFlags> {
        LookupFlags::NAMED
            .iter()
            .find(|(flag_name, _)| *flag_name == name)
            .map(|&(_, flag)| flag)
    }

    pub fn mark_attachment_type(self) -> Option<u8> {
        match (self.bits() >> 8) as u8 {
            0 => None,
            class => Some(class),
        }
    }

    pub fn with_mark_attachment_type(self, class: u8) -> LookupFlags {
        let bits = (self.bits() & 0x00FF) | (u16::from(class) << 8);
        LookupFlags::from_bits_retain(bits)
    }
}

/// Which shaping phase a rule acts in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Substitution,
    Positioning,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Substitution => write!(f, "sub"),
            Phase::Positioning => write!(f, "pos"),
        }
    }
}

/// Replace the `input` glyphs with the `output` glyphs, optionally only when surrounded by
/// `precontext` and `postcontext`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Substitution {
    pub precontext: Vec<GlyphClassRef>,
    pub input: Vec<GlyphClassRef>,
    pub postcontext: Vec<GlyphClassRef>,
    pub output: Vec<GlyphClassRef>,
}

impl Substitution {
    pub fn new(input: Vec<GlyphClassRef>, output: Vec<GlyphClassRef>) -> Self {
        Substitution {
            precontext: Vec::new(),
            input,
            postcontext: Vec::new(),
            output,
        }
    }

    pub fn with_context(
        mut self,
        precontext: Vec<GlyphClassRef>,
        postcontext: Vec<GlyphClassRef>,
    ) -> Self {
        self.precontext = precontext;
        self.postcontext = postcontext;
        self
    }
}

/// Match a context and run other routines at positions within it.
#[derive(Clone, Debug, PartialEq)]
pub struct Chaining {
    pub precontext: Vec<GlyphClassRef>,
    pub context: Vec<GlyphClassRef>,
    pub postcontext: Vec<GlyphClassRef>,
    lookups: Vec<Vec<Rc<Routine>>>,
}

impl Chaining {
    /// Returns `None` when `context` is empty.
    pub fn new(
        precontext: Vec<GlyphClassRef>,
        context: Vec<GlyphClassRef>,
        postcontext: Vec<GlyphClassRef>,
    ) -> Option<Self> {
        if context.is_empty() {
            return None;
        }
        let lookups = vec![Vec::new(); context.len()];
        Some(Chaining {
            precontext,
            context,
            postcontext,
            lookups,
        })
    }

    /// Run `routine` at the 0-based context `position` when this rule matches.
    pub fn attach(&mut self, position: usize, routine: Rc<Routine>) -> Result<(), ResolveError> {
        match self.lookups.get_mut(position) {
            Some(lookups) => {
                lookups.push(routine);
                Ok(())
            }
            None => Err(ResolveError::BadPosition {
                lookup: routine.name.clone(),
                position,
            }),
        }
    }

    pub fn lookups_at(&self, position: usize) -> &[Rc<Routine>] {
        self.lookups.get(position).map(Vec::as_slice).unwrap_or(&[])
    }

    /// (context position, routine) pairs in application order.
    pub fn lookups(&self) -> impl Iterator<Item = (usize, &Rc<Routine>)> + '_ {
        self.lookups
            .iter()
            .enumerate()
            .flat_map(|(position, routines)| routines.iter().map(move |r| (position, r)))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ValueRecord {
    pub x_placement: i32,
    pub y_placement: i32,
    pub x_advance: i32,
    pub y_advance: i32,
}

impl ValueRecord {
    pub fn is_zero(&self) -> bool {
        *self == ValueRecord::default()
    }
}

/// Adjust the placement and advance of each glyph in `glyphs`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Positioning {
    pub precontext: Vec<GlyphClassRef>,
    pub glyphs: Vec<GlyphClassRef>,
    pub postcontext: Vec<GlyphClassRef>,
    /// One value per entry of `glyphs`.
    pub values: Vec<ValueRecord>,
}

impl Positioning {
    pub fn new(glyphs: Vec<GlyphClassRef>, values: Vec<ValueRecord>) -> Self {
        Positioning {
            precontext: Vec::new(),
            glyphs,
            postcontext: Vec::new(),
            values,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Anchor {
    pub x: i32,
    pub y: i32,
}

/// Anchor based attachment.
///
/// For mark-to-base attachment `bases` holds base anchors and `marks` mark anchors of the
/// class `base_name`. For cursive attachment `bases` holds exit anchors and `marks` entry
/// anchors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub base_name: String,
    pub bases: BTreeMap<String, Anchor>,
    pub marks: BTreeMap<String, Anchor>,
    pub cursive: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Rule {
    Substitution(Substitution),
    Chaining(Chaining),
    Positioning(Positioning),
    Attachment(Attachment),
}

impl Rule {
    pub fn phase(&self) -> Phase {
        match self {
            Rule::Substitution(_) => Phase::Substitution,
            Rule::Positioning(_) | Rule::Attachment(_) => Phase::Positioning,
            Rule::Chaining(chaining) => {
                if chaining
                    .lookups()
                    .any(|(_, routine)| routine.has_phase(Phase::Positioning))
                {
                    Phase::Positioning
                } else {
                    Phase::Substitution
                }
            }
        }
    }
}

impl From<Substitution> for Rule {
    fn from(rule: Substitution) -> Self {
        Rule::Substitution(rule)
    }
}

impl From<Chaining> for Rule {
    fn from(rule: Chaining) -> Self {
        Rule::Chaining(rule)
    }
}

impl From<Positioning> for Rule {
    fn from(rule: Positioning) -> Self {
        Rule::Positioning(rule)
    }
}

impl From<Attachment> for Rule {
    fn from(rule: Attachment) -> Self {
        Rule::Attachment(rule)
    }
}

/// A named, ordered group of rules: a lookup.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Routine {
    pub name: String,
    pub rules: Vec<Rule>,
    /// Empty when the routine applies under every scope.
    pub scopes: Vec<Scope>,
    pub flags: LookupFlags,
}

impl Routine {
    pub fn new(name: impl Into<String>) -> Self {
        Routine {
            name: name.into(),
            ..Routine::default()
        }
    }

    pub fn add_rule(&mut self, rule: impl Into<Rule>) {
        self.rules.push(rule.into());
    }

    pub fn with_rule(mut self, rule: impl Into<Rule>) -> Self {
        self.add_rule(rule);
        self
    }

    pub fn with_flags(mut self, flags: LookupFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn has_phase(&self, phase: Phase) -> bool {
        self.rules.iter().any(|rule| rule.phase() == phase)
    }

    /// Is this routine active for text in `script`/`language`?
    pub fn applies_to(&self, script: u32, language: Option<u32>) -> bool {
        self.scopes.is_empty()
            || self
                .scopes
                .iter()
                .any(|scope| scope.applies_to(script, language))
    }

    /// A new routine with the same rules and flags, restricted to `scopes`.
    pub fn clone_for_scopes(&self, scopes: &[Scope]) -> Routine {
        Routine {
            name: self.name.clone(),
            rules: self.rules.clone(),
            scopes: scopes.to_vec(),
            flags: self.flags,
        }
    }
}

/// Routines registered under a feature tag for a set of scopes.
#[derive(Clone, Debug, PartialEq)]
pub struct Feature {
    pub tag: u32,
    pub scopes: Vec<Scope>,
    pub routines: Vec<Rc<Routine>>,
}

impl Feature {
    pub fn applies_to(&self, script: u32, language: Option<u32>) -> bool {
        self.scopes
            .iter()
            .any(|scope| scope.applies_to(script, language))
    }
}

/// The assembled rules of a font.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RuleSet {
    /// Routines not attached directly to a feature, dependencies before dependents.
    pub routines: Vec<Rc<Routine>>,
    /// Features in assembly order. A tag may appear more than once with different scopes.
    pub features: Vec<Feature>,
    pub named_classes: Vec<(String, Rc<[String]>)>,
}

impl RuleSet {
    pub fn new() -> Self {
        RuleSet::default()
    }

    pub fn add_feature(&mut self, tag: u32, scopes: Vec<Scope>, routines: Vec<Rc<Routine>>) {
        self.features.push(Feature {
            tag,
            scopes,
            routines,
        });
    }

    pub fn has_feature(&self, tag: u32) -> bool {
        self.features.iter().any(|feature| feature.tag == tag)
    }

    /// Routines of every feature with `tag`, in feature then routine order.
    pub fn feature_routines(&self, tag: u32) -> impl Iterator<Item = &Rc<Routine>> + '_ {
        self.features
            .iter()
            .filter(move |feature| feature.tag == tag)
            .flat_map(|feature| feature.routines.iter())
    }

    /// Routines `tag` runs for text in `script`/`language`.
    pub fn routines_for(
        &self,
        tag: u32,
        script: u32,
        language: Option<u32>,
    ) -> impl Iterator<Item = &Rc<Routine>> + '_ {
        self.features
            .iter()
            .filter(move |feature| feature.tag == tag && feature.applies_to(script, language))
            .flat_map(|feature| feature.routines.iter())
            .filter(move |routine| routine.applies_to(script, language))
    }

    pub fn routine(&self, name: &str) -> Option<&Rc<Routine>> {
        self.routines.iter().find(|routine| routine.name == name)
    }
}
