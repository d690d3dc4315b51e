//! Ingestion of FontDame style layout dumps.
//!
//! The dump is read one line at a time by a small state machine. Sentinel lines (`script
//! table begin`, `lookup 3 single`, `class definition end`, ...) move between states; every
//! other line is parsed by the grammar of the current state (see `grammar`). The result is a
//! `RawDocument` where chaining rules still refer to lookups by id. `resolve` turns that into
//! a `RuleSet`.

pub mod grammar;

use std::collections::BTreeMap;

use log::{debug, warn};
use rustc_hash::FxHashMap;

use crate::config::Config;
use crate::error::IngestError;
use crate::glyph_class::{ClassKind, ClassResolver, ClassTable, GlyphClassRef, MissingClass};
use crate::model::{Chaining, LookupFlags, RuleSet, Scope, Substitution};
use crate::resolve;

use self::grammar::{Line, LookupType, RuleLine};

/// Ingester states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Idle,
    ScriptTable,
    FeatureTable,
    ClassDefinition {
        kind: ClassKind,
        lookup_type: LookupType,
    },
    Lookup(LookupType),
}

/// A lookup as read from the dump.
#[derive(Clone, Debug, PartialEq)]
pub struct RawLookup {
    pub id: String,
    /// Name of the routine the lookup becomes.
    pub name: String,
    pub lookup_type: LookupType,
    pub flags: LookupFlags,
    pub rules: Vec<RawRule>,
}

impl RawLookup {
    /// Ids of the lookups this one runs from its chaining rules.
    pub fn dependencies(&self) -> impl Iterator<Item = &str> + '_ {
        self.rules.iter().flat_map(|rule| {
            let lookups: &[(usize, String)] = match rule {
                RawRule::Substitution(_) => &[],
                RawRule::Chaining { lookups, .. } => lookups,
            };
            lookups.iter().map(|(_, id)| id.as_str())
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RawRule {
    Substitution(Substitution),
    /// A chaining rule with its (0-based position, lookup id) references unresolved.
    Chaining {
        rule: Chaining,
        lookups: Vec<(usize, String)>,
    },
}

/// A feature table entry with the scopes the script table registers it under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFeature {
    pub tag: u32,
    pub lookups: Vec<String>,
    pub scopes: Vec<Scope>,
}

/// Everything read from a dump, before lookup references are resolved.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawDocument {
    /// Lookups in the order they appear.
    pub lookups: Vec<RawLookup>,
    /// Features keyed by their declared id.
    pub features: BTreeMap<u32, RawFeature>,
    pub named_classes: Vec<(String, std::rc::Rc<[String]>)>,
}

/// Read a dump and assemble its rule set.
///
/// `glyph_universe` is only needed when a contextual lookup uses class 0.
pub fn ingest(
    text: &str,
    config: &Config,
    glyph_universe: Option<&[String]>,
) -> Result<RuleSet, IngestError> {
    let mut ingester = Ingester::new(config, glyph_universe);
    for line in text.lines() {
        ingester.feed_line(line)?;
    }
    let document = ingester.finish()?;
    Ok(resolve::resolve(document)?)
}

pub struct Ingester<'a> {
    config: &'a Config,
    state: State,
    universe: Option<&'a [String]>,
    classes: ClassTable,
    resolver: ClassResolver<'a>,
    current: Option<RawLookup>,
    lookups: Vec<RawLookup>,
    script_table: FxHashMap<u32, Vec<Scope>>,
    feature_table: BTreeMap<u32, (u32, Vec<String>)>,
    line_number: usize,
}

impl<'a> Ingester<'a> {
    pub fn new(config: &'a Config, universe: Option<&'a [String]>) -> Self {
        Ingester {
            config,
            state: State::Idle,
            universe,
            classes: ClassTable::new(),
            resolver: ClassResolver::new(config),
            current: None,
            lookups: Vec::new(),
            script_table: FxHashMap::default(),
            feature_table: BTreeMap::new(),
            line_number: 0,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn feed_line(&mut self, line: &str) -> Result<(), IngestError> {
        self.line_number += 1;
        let line = line.trim_end_matches(['\r', '\n']);
        self.state = self.transition(grammar::classify(line), line)?;
        Ok(())
    }

    /// Collect what was read. A lookup left open at the end of input is closed.
    pub fn finish(mut self) -> Result<RawDocument, IngestError> {
        match self.state {
            State::Idle => {}
            State::Lookup(_) => {
                warn!("input ended inside a lookup, closing it");
                self.end_lookup();
            }
            state => {
                return Err(IngestError::Parse {
                    line_number: self.line_number + 1,
                    line: format!("end of input in state {:?}", state),
                })
            }
        }

        let mut features = BTreeMap::new();
        for (id, (tag, lookups)) in self.feature_table {
            let scopes = self.script_table.remove(&id).unwrap_or_default();
            features.insert(
                id,
                RawFeature {
                    tag,
                    lookups,
                    scopes,
                },
            );
        }
        Ok(RawDocument {
            lookups: self.lookups,
            features,
            named_classes: self.resolver.into_named_classes(),
        })
    }

    fn transition(&mut self, event: Line<'_>, line: &str) -> Result<State, IngestError> {
        let state = self.state;
        match (state, event) {
            (_, Line::Ignored) => Ok(state),
            (State::Idle, Line::ScriptTableBegin) => Ok(State::ScriptTable),
            (State::ScriptTable, Line::ScriptTableEnd) => Ok(State::Idle),
            (State::Idle, Line::FeatureTableBegin) => Ok(State::FeatureTable),
            (State::FeatureTable, Line::FeatureTableEnd) => Ok(State::Idle),
            (State::Idle, Line::LookupBegin { id, lookup_type }) => {
                self.begin_lookup(id, lookup_type)
            }
            (State::Lookup(lookup_type), Line::ClassDefinitionBegin(kind)) => {
                Ok(State::ClassDefinition { kind, lookup_type })
            }
            // Dumps don't always close a class block with the sentinel that opened it.
            (State::ClassDefinition { lookup_type, .. }, Line::ClassDefinitionEnd(_)) => {
                Ok(State::Lookup(lookup_type))
            }
            (State::Lookup(_), Line::LookupEnd) => {
                self.end_lookup();
                Ok(State::Idle)
            }
            (State::Idle, Line::Body(body)) => {
                // Headers and other free text between sections.
                debug!("skipping line {}: {}", self.line_number, body);
                Ok(state)
            }
            (State::ScriptTable, Line::Body(body)) => {
                let (scope, feature_ids) =
                    grammar::script_line(body).ok_or_else(|| self.parse_error(line))?;
                for feature_id in feature_ids {
                    self.script_table.entry(feature_id).or_default().push(scope);
                }
                Ok(state)
            }
            (State::FeatureTable, Line::Body(body)) => {
                let (id, tag, lookups) =
                    grammar::feature_line(body).ok_or_else(|| self.parse_error(line))?;
                self.feature_table.insert(id, (tag, lookups));
                Ok(state)
            }
            (State::ClassDefinition { kind, .. }, Line::Body(body)) => {
                let (glyph, class_id) =
                    grammar::class_line(body).ok_or_else(|| self.parse_error(line))?;
                self.classes.define(kind, glyph, class_id);
                Ok(state)
            }
            (State::Lookup(lookup_type), Line::Body(body)) => {
                let rule =
                    grammar::rule_line(lookup_type, body).ok_or_else(|| self.parse_error(line))?;
                self.add_rule(rule)?;
                Ok(state)
            }
            _ => Err(self.parse_error(line)),
        }
    }

    fn begin_lookup(&mut self, id: &str, lookup_type: &str) -> Result<State, IngestError> {
        let lookup_type =
            LookupType::from_name(lookup_type).ok_or_else(|| IngestError::UnsupportedLookupType {
                line_number: self.line_number,
                lookup_type: lookup_type.to_string(),
            })?;
        self.current = Some(RawLookup {
            id: id.to_string(),
            name: self.config.routine_name(id),
            lookup_type,
            flags: LookupFlags::empty(),
            rules: Vec::new(),
        });
        Ok(State::Lookup(lookup_type))
    }

    fn end_lookup(&mut self) {
        if let Some(lookup) = self.current.take() {
            debug!(
                "read lookup {} ({}, {} rules)",
                lookup.id,
                lookup.lookup_type.name(),
                lookup.rules.len()
            );
            self.lookups.push(lookup);
        }
        self.classes.clear();
    }

    fn add_rule(&mut self, rule: RuleLine<'_>) -> Result<(), IngestError> {
        let raw_rule = match rule {
            RuleLine::Flag(flag, enabled) => {
                self.lookup_mut()?.flags.set(flag, enabled);
                return Ok(());
            }
            RuleLine::UnknownFlag(name, enabled) => {
                warn!(
                    "line {}: ignoring unknown lookup flag {} ({})",
                    self.line_number, name, enabled
                );
                return Ok(());
            }
            RuleLine::MarkAttachmentType(class) => {
                let lookup = self.lookup_mut()?;
                lookup.flags = lookup.flags.with_mark_attachment_type(class);
                return Ok(());
            }
            RuleLine::Single { input, output } => RawRule::Substitution(Substitution::new(
                vec![GlyphClassRef::glyph(input)],
                vec![GlyphClassRef::glyph(output)],
            )),
            RuleLine::Multiple { input, output } => RawRule::Substitution(Substitution::new(
                vec![GlyphClassRef::glyph(input)],
                output.into_iter().map(GlyphClassRef::glyph).collect(),
            )),
            RuleLine::Ligature { components, output } => {
                RawRule::Substitution(Substitution::new(
                    components.into_iter().map(GlyphClassRef::glyph).collect(),
                    vec![GlyphClassRef::glyph(output)],
                ))
            }
            RuleLine::GlyphContext { glyphs, lookups } => {
                let context = glyphs.into_iter().map(GlyphClassRef::glyph).collect();
                self.chaining(Vec::new(), context, Vec::new(), lookups)?
            }
            RuleLine::ClassContext { classes, lookups } => {
                let context = self.class_refs(ClassKind::Class, &classes)?;
                self.chaining(Vec::new(), context, Vec::new(), lookups)?
            }
            RuleLine::ClassChain {
                backtrack,
                input,
                lookahead,
                lookups,
            } => {
                let precontext = self.class_refs(ClassKind::Backtrack, &backtrack)?;
                let context = self.class_refs(ClassKind::Class, &input)?;
                let postcontext = self.class_refs(ClassKind::Lookahead, &lookahead)?;
                self.chaining(precontext, context, postcontext, lookups)?
            }
        };
        self.lookup_mut()?.rules.push(raw_rule);
        Ok(())
    }

    fn chaining(
        &self,
        precontext: Vec<GlyphClassRef>,
        context: Vec<GlyphClassRef>,
        postcontext: Vec<GlyphClassRef>,
        lookups: Vec<(usize, &str)>,
    ) -> Result<RawRule, IngestError> {
        let rule = Chaining::new(precontext, context, postcontext).ok_or_else(|| {
            IngestError::Parse {
                line_number: self.line_number,
                line: "empty context".to_string(),
            }
        })?;
        let lookups = lookups
            .into_iter()
            .map(|(position, id)| (position, id.to_string()))
            .collect();
        Ok(RawRule::Chaining { rule, lookups })
    }

    fn class_refs(
        &mut self,
        kind: ClassKind,
        class_ids: &[u32],
    ) -> Result<Vec<GlyphClassRef>, IngestError> {
        let line_number = self.line_number;
        class_ids
            .iter()
            .map(|&class_id| {
                let members = self
                    .classes
                    .members(kind, class_id, self.universe)
                    .map_err(|missing| match missing {
                        MissingClass::Universe => IngestError::UnknownGlyphUniverse { line_number },
                        MissingClass::Undefined(class_id) => IngestError::UnknownClass {
                            line_number,
                            class_id,
                        },
                    })?;
                Ok(self.resolver.resolve(members))
            })
            .collect()
    }

    fn lookup_mut(&mut self) -> Result<&mut RawLookup, IngestError> {
        let line_number = self.line_number;
        self.current.as_mut().ok_or(IngestError::Parse {
            line_number,
            line: "rule outside of a lookup".to_string(),
        })
    }

    fn parse_error(&self, line: &str) -> IngestError {
        IngestError::Parse {
            line_number: self.line_number,
            line: line.to_string(),
        }
    }
}
