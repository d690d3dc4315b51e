//! Writing rule sets back out.
//!
//! An `Emitter` turns a `RuleSet` into an external description. The state of one document's
//! emission lives in an `EmitContext`: the lookup id each routine is written under, and the
//! routines already written, so a routine reachable from several features is written once.
//! `LegacyEmitter` writes the dump format `legacy` reads.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::rc::Rc;

use itertools::Itertools;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::EmitError;
use crate::glyph_class::{ClassKind, GlyphClassRef};
use crate::legacy::grammar::LookupType;
use crate::model::{Chaining, LookupFlags, Routine, Rule, RuleSet, Scope, Substitution};
use crate::tag::DisplayTag;

pub trait Emitter {
    type Output;

    fn emit(&mut self, rules: &RuleSet, ctx: &mut EmitContext) -> Result<Self::Output, EmitError>;
}

/// Per-document emission state.
#[derive(Debug, Default)]
pub struct EmitContext {
    lookup_ids: FxHashMap<String, u32>,
    taken: FxHashSet<u32>,
    next_id: u32,
    written: FxHashSet<String>,
}

impl EmitContext {
    pub fn new() -> Self {
        EmitContext::default()
    }

    /// Claim the id in a `lookup_<N>` routine name, if it is still free.
    pub fn reserve(&mut self, name: &str) {
        if self.lookup_ids.contains_key(name) {
            return;
        }
        let natural = name
            .strip_prefix("lookup_")
            .and_then(|id| id.parse::<u32>().ok());
        if let Some(id) = natural {
            if self.taken.insert(id) {
                self.lookup_ids.insert(name.to_string(), id);
            }
        }
    }

    /// The lookup id of the routine `name`. Routines without a reserved id get the lowest
    /// free one.
    pub fn lookup_id(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.lookup_ids.get(name) {
            return id;
        }
        while self.taken.contains(&self.next_id) {
            self.next_id += 1;
        }
        let id = self.next_id;
        self.taken.insert(id);
        self.lookup_ids.insert(name.to_string(), id);
        id
    }

    /// Record that `name` has been written. Returns `false` if it already was.
    pub fn mark_written(&mut self, name: &str) -> bool {
        self.written.insert(name.to_string())
    }

    pub fn is_written(&self, name: &str) -> bool {
        self.written.contains(name)
    }
}

/// Writes the legacy dump grammar: script table, feature table, then one block per lookup.
///
/// Only substitutions without context and chaining rules have a legacy form. Positioning and
/// attachment rules are `EmitError::Unrepresentable`.
#[derive(Debug, Default)]
pub struct LegacyEmitter;

impl LegacyEmitter {
    pub fn new() -> Self {
        LegacyEmitter
    }
}

/// Write `rules` as a legacy dump.
pub fn to_legacy(rules: &RuleSet) -> Result<String, EmitError> {
    LegacyEmitter::new().emit(rules, &mut EmitContext::new())
}

impl Emitter for LegacyEmitter {
    type Output = String;

    fn emit(&mut self, rules: &RuleSet, ctx: &mut EmitContext) -> Result<String, EmitError> {
        let routines = routines_to_write(rules);
        for routine in &routines {
            ctx.reserve(&routine.name);
        }

        let mut scripts: BTreeMap<Scope, Vec<usize>> = BTreeMap::new();
        let mut features = Vec::new();
        for feature in rules
            .features
            .iter()
            .filter(|feature| !feature.routines.is_empty() && !feature.scopes.is_empty())
        {
            let feature_id = features.len();
            for scope in &feature.scopes {
                scripts.entry(*scope).or_default().push(feature_id);
            }
            let lookups = feature
                .routines
                .iter()
                .map(|routine| ctx.lookup_id(&routine.name))
                .join(", ");
            features.push(format!("{}\t{}\t{}", feature_id, DisplayTag(feature.tag), lookups));
        }

        let mut out = String::new();
        out.push_str("script table begin\n");
        for (scope, feature_ids) in &scripts {
            let language = match scope.language {
                Some(language) => DisplayTag(language).to_string(),
                None => "default".to_string(),
            };
            let _ = writeln!(
                out,
                "{}\t{}\t{}",
                DisplayTag(scope.script),
                language,
                feature_ids.iter().join(", ")
            );
        }
        out.push_str("script table end\n\nfeature table begin\n");
        for line in &features {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str("feature table end\n");

        for routine in routines {
            if !ctx.mark_written(&routine.name) {
                continue;
            }
            out.push('\n');
            write_routine(&mut out, routine, ctx).map_err(|reason| {
                EmitError::Unrepresentable {
                    routine: routine.name.clone(),
                    reason,
                }
            })?;
        }
        Ok(out)
    }
}

/// Every routine reachable from `rules`, each after the routines its chaining rules run.
/// Copies of a routine made for a language share its name and are written once.
fn routines_to_write(rules: &RuleSet) -> Vec<&Rc<Routine>> {
    let mut seen = FxHashSet::default();
    let mut order = Vec::new();
    let feature_routines = rules
        .features
        .iter()
        .flat_map(|feature| feature.routines.iter());
    for routine in rules.routines.iter().chain(feature_routines) {
        visit(routine, &mut seen, &mut order);
    }
    order
}

fn visit<'r>(
    routine: &'r Rc<Routine>,
    seen: &mut FxHashSet<&'r str>,
    order: &mut Vec<&'r Rc<Routine>>,
) {
    if !seen.insert(routine.name.as_str()) {
        return;
    }
    for rule in &routine.rules {
        if let Rule::Chaining(chaining) = rule {
            for (_, dependency) in chaining.lookups() {
                visit(dependency, seen, order);
            }
        }
    }
    order.push(routine);
}

fn write_routine(
    out: &mut String,
    routine: &Routine,
    ctx: &mut EmitContext,
) -> Result<(), &'static str> {
    let lookup_type = lookup_type(routine)?;
    let mut body = Vec::new();
    match lookup_type {
        LookupType::Single | LookupType::Multiple | LookupType::Ligature => {
            for rule in &routine.rules {
                if let Rule::Substitution(subst) = rule {
                    for (input, output) in expand_substitution(subst)? {
                        body.push(substitution_line(lookup_type, &input, &output));
                    }
                }
            }
        }
        LookupType::Context => {
            for rule in &routine.rules {
                if let Rule::Chaining(chaining) = rule {
                    let glyphs = chaining
                        .context
                        .iter()
                        .filter_map(|class| match class {
                            GlyphClassRef::Glyph(glyph) => Some(glyph.as_str()),
                            _ => None,
                        })
                        .join(", ");
                    body.push(chaining_line(format!("glyph\t{}", glyphs), chaining, ctx));
                }
            }
        }
        LookupType::Chained => {
            let mut backtrack = ClassDefs::default();
            let mut input = ClassDefs::default();
            let mut lookahead = ClassDefs::default();
            let mut lines = Vec::new();
            for rule in &routine.rules {
                if let Rule::Chaining(chaining) = rule {
                    let head = format!(
                        "class-chain\t{}\t{}\t{}",
                        backtrack.ids(&chaining.precontext)?.iter().join(", "),
                        input.ids(&chaining.context)?.iter().join(", "),
                        lookahead.ids(&chaining.postcontext)?.iter().join(", "),
                    );
                    lines.push(chaining_line(head, chaining, ctx));
                }
            }
            input.write(&mut body, ClassKind::Class);
            backtrack.write(&mut body, ClassKind::Backtrack);
            lookahead.write(&mut body, ClassKind::Lookahead);
            body.extend(lines);
        }
    }

    let _ = writeln!(
        out,
        "lookup {} {}",
        ctx.lookup_id(&routine.name),
        lookup_type.name()
    );
    for (name, flag) in LookupFlags::NAMED {
        if routine.flags.contains(flag) {
            let _ = writeln!(out, "{} yes", name);
        }
    }
    if let Some(class) = routine.flags.mark_attachment_type() {
        let _ = writeln!(out, "MarkAttachmentType {}", class);
    }
    for line in body {
        out.push_str(&line);
        out.push('\n');
    }
    out.push_str("lookup end\n");
    Ok(())
}

/// The single lookup type that can hold every rule of `routine`.
fn lookup_type(routine: &Routine) -> Result<LookupType, &'static str> {
    let mut lookup_type = None;
    for rule in &routine.rules {
        let rule_type = match rule {
            Rule::Substitution(subst) => substitution_type(subst)?,
            Rule::Chaining(chaining) => chaining_type(chaining),
            Rule::Positioning(_) => return Err("positioning rules have no legacy form"),
            Rule::Attachment(_) => return Err("attachment rules have no legacy form"),
        };
        lookup_type = Some(match (lookup_type, rule_type) {
            (None, rule_type) => rule_type,
            (Some(current), rule_type) if current == rule_type => current,
            // One to one substitutions fit in multiple and ligature lookups.
            (Some(LookupType::Single), other @ (LookupType::Multiple | LookupType::Ligature))
            | (Some(other @ (LookupType::Multiple | LookupType::Ligature)), LookupType::Single) => {
                other
            }
            (Some(LookupType::Context), LookupType::Chained)
            | (Some(LookupType::Chained), LookupType::Context) => LookupType::Chained,
            _ => return Err("rules of more than one lookup type"),
        });
    }
    Ok(lookup_type.unwrap_or(LookupType::Single))
}

fn substitution_type(subst: &Substitution) -> Result<LookupType, &'static str> {
    if !subst.precontext.is_empty() || !subst.postcontext.is_empty() {
        return Err("substitution with context");
    }
    match (subst.input.len(), subst.output.len()) {
        (0, _) | (_, 0) => Err("substitution with an empty side"),
        (1, 1) => Ok(LookupType::Single),
        (1, _) => Ok(LookupType::Multiple),
        (_, 1) => Ok(LookupType::Ligature),
        _ => Err("many to many substitution"),
    }
}

fn chaining_type(chaining: &Chaining) -> LookupType {
    let glyphs_only = chaining
        .context
        .iter()
        .all(|class| matches!(class, GlyphClassRef::Glyph(_)));
    if glyphs_only && chaining.precontext.is_empty() && chaining.postcontext.is_empty() {
        LookupType::Context
    } else {
        LookupType::Chained
    }
}

/// Glyph level (input, output) pairs of a substitution. A one to one class substitution maps
/// members by index, or every member to a single output glyph.
fn expand_substitution(subst: &Substitution) -> Result<Vec<(Vec<&str>, Vec<&str>)>, &'static str> {
    if subst.input.iter().chain(&subst.output).any(GlyphClassRef::is_empty) {
        return Err("empty glyph class");
    }
    if let ([input], [output]) = (subst.input.as_slice(), subst.output.as_slice()) {
        let outputs = output.glyphs();
        if outputs.len() != 1 && outputs.len() != input.len() {
            return Err("class substitution with classes of different sizes");
        }
        return Ok(input
            .glyphs()
            .iter()
            .enumerate()
            .map(|(i, glyph)| {
                let output = if outputs.len() == 1 { &outputs[0] } else { &outputs[i] };
                (vec![glyph.as_str()], vec![output.as_str()])
            })
            .collect());
    }
    Ok(vec![(single_glyphs(&subst.input)?, single_glyphs(&subst.output)?)])
}

fn single_glyphs(classes: &[GlyphClassRef]) -> Result<Vec<&str>, &'static str> {
    classes
        .iter()
        .map(|class| match class.glyphs() {
            [glyph] => Ok(glyph.as_str()),
            _ => Err("glyph class in a multiple or ligature substitution"),
        })
        .collect()
}

fn substitution_line(lookup_type: LookupType, input: &[&str], output: &[&str]) -> String {
    match lookup_type {
        // The ligature comes before its components.
        LookupType::Ligature => format!("{}\t{}", output.join("\t"), input.join("\t")),
        _ => format!("{}\t{}", input.join("\t"), output.join("\t")),
    }
}

fn chaining_line(head: String, chaining: &Chaining, ctx: &mut EmitContext) -> String {
    let mut line = head;
    for (position, routine) in chaining.lookups() {
        let _ = write!(line, "\t{}, {}", position + 1, ctx.lookup_id(&routine.name));
    }
    line
}

/// Numbered classes of one kind, built up over the rules of a lookup.
#[derive(Default)]
struct ClassDefs<'r> {
    classes: Vec<&'r [String]>,
    owner: FxHashMap<&'r str, usize>,
}

impl<'r> ClassDefs<'r> {
    fn ids(&mut self, classes: &'r [GlyphClassRef]) -> Result<Vec<usize>, &'static str> {
        classes.iter().map(|class| self.id(class.glyphs())).collect()
    }

    fn id(&mut self, glyphs: &'r [String]) -> Result<usize, &'static str> {
        if glyphs.is_empty() {
            return Err("empty glyph class");
        }
        if let Some(index) = self.classes.iter().position(|class| *class == glyphs) {
            return Ok(index + 1);
        }
        let id = self.classes.len() + 1;
        for glyph in glyphs {
            match self.owner.insert(glyph.as_str(), id) {
                Some(other) if other != id => return Err("glyph in more than one class"),
                _ => {}
            }
        }
        self.classes.push(glyphs);
        Ok(id)
    }

    fn write(&self, body: &mut Vec<String>, kind: ClassKind) {
        if self.classes.is_empty() {
            return;
        }
        let name = match kind {
            ClassKind::Class => "class",
            ClassKind::Backtrack => "backtrackclass",
            ClassKind::Lookahead => "lookaheadclass",
        };
        body.push(format!("{} definition begin", name));
        for (index, glyphs) in self.classes.iter().enumerate() {
            for glyph in glyphs.iter() {
                body.push(format!("{}\t{}", glyph, index + 1));
            }
        }
        body.push(format!("{} definition end", name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::legacy::ingest;
    use crate::tag;

    fn glyphs(names: &[&str]) -> Vec<GlyphClassRef> {
        names.iter().map(|name| GlyphClassRef::glyph(*name)).collect()
    }

    fn single(from: &str, to: &str) -> Substitution {
        Substitution::new(glyphs(&[from]), glyphs(&[to]))
    }

    fn one_feature(routines: Vec<Rc<Routine>>) -> RuleSet {
        let mut rules = RuleSet::new();
        rules.add_feature(tag::LIGA, vec![Scope::DEFAULT], routines);
        rules
    }

    #[test]
    fn test_lookup_ids() {
        let mut ctx = EmitContext::new();
        ctx.reserve("lookup_0");
        ctx.reserve("lookup_2");
        assert_eq!(ctx.lookup_id("fraction_parts"), 1);
        assert_eq!(ctx.lookup_id("lookup_2"), 2);
        assert_eq!(ctx.lookup_id("other"), 3);
        assert_eq!(ctx.lookup_id("fraction_parts"), 1);
        assert!(ctx.mark_written("other"));
        assert!(!ctx.mark_written("other"));
        assert!(ctx.is_written("other"));
    }

    #[test]
    fn test_emit_substitution_lookups() {
        let liga = Routine::new("lookup_3")
            .with_rule(Substitution::new(glyphs(&["f", "i"]), glyphs(&["f_i"])))
            .with_rule(single("fl", "f_l"));
        let decompose = Routine::new("lookup_1")
            .with_rule(Substitution::new(glyphs(&["f_i"]), glyphs(&["f", "i"])))
            .with_flags(LookupFlags::IGNORE_MARKS.with_mark_attachment_type(2));
        let text = to_legacy(&one_feature(vec![Rc::new(liga), Rc::new(decompose)])).unwrap();
        let expected = "script table begin\n\
             DFLT\tdefault\t0\n\
             script table end\n\
             \n\
             feature table begin\n\
             0\tliga\t3, 1\n\
             feature table end\n\
             \n\
             lookup 3 ligature\n\
             f_i\tf\ti\n\
             f_l\tfl\n\
             lookup end\n\
             \n\
             lookup 1 multiple\n\
             IgnoreMarks yes\n\
             MarkAttachmentType 2\n\
             f_i\tf\ti\n\
             lookup end\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_class_substitution_expands() {
        let smcp = Routine::new("lookup_0").with_rule(Substitution::new(
            vec![GlyphClassRef::inline(["a", "b"])],
            vec![GlyphClassRef::inline(["a.sc", "b.sc"])],
        ));
        let text = to_legacy(&one_feature(vec![Rc::new(smcp)])).unwrap();
        assert!(text.contains("lookup 0 single\na\ta.sc\nb\tb.sc\nlookup end\n"));
    }

    #[test]
    fn test_dependencies_written_first() {
        let dummy = Rc::new(Routine::new("lookup_7").with_rule(single("a", "b")));
        let mut chaining = Chaining::new(
            glyphs(&["x"]),
            vec![GlyphClassRef::inline(["a", "c"])],
            vec![],
        )
        .unwrap();
        chaining.attach(0, Rc::clone(&dummy)).unwrap();
        let chain = Routine::new("lookup_2").with_rule(chaining);
        let text = to_legacy(&one_feature(vec![Rc::new(chain)])).unwrap();
        let dummy_at = text.find("lookup 7 single").unwrap();
        let chain_at = text.find("lookup 2 chained").unwrap();
        assert!(dummy_at < chain_at);
        assert!(text.contains(
            "class definition begin\na\t1\nc\t1\nclass definition end\n\
             backtrackclass definition begin\nx\t1\nbacktrackclass definition end\n\
             class-chain\t1\t1\t\t1, 7\n"
        ));
    }

    #[test]
    fn test_shared_routine_written_once() {
        let shared = Rc::new(Routine::new("lookup_0").with_rule(single("a", "b")));
        let mut rules = one_feature(vec![Rc::clone(&shared)]);
        let latn = Scope::new(tag::LATN, None);
        rules.add_feature(tag::SMCP, vec![latn], vec![shared]);
        let text = to_legacy(&rules).unwrap();
        assert_eq!(text.matches("lookup 0 single").count(), 1);
        assert!(text.contains("0\tliga\t0\n1\tsmcp\t0\n"));
        assert!(text.contains("DFLT\tdefault\t0\nlatn\tdefault\t1\n"));
    }

    #[test]
    fn test_unrepresentable() {
        let contextual = Routine::new("lookup_0")
            .with_rule(single("a", "b").with_context(glyphs(&["x"]), vec![]));
        assert_eq!(
            to_legacy(&one_feature(vec![Rc::new(contextual)])),
            Err(EmitError::Unrepresentable {
                routine: "lookup_0".to_string(),
                reason: "substitution with context",
            })
        );

        let mixed = Routine::new("mixed")
            .with_rule(Substitution::new(glyphs(&["f", "i"]), glyphs(&["f_i"])))
            .with_rule(Substitution::new(glyphs(&["f_i"]), glyphs(&["f", "i"])));
        assert!(to_legacy(&one_feature(vec![Rc::new(mixed)])).is_err());
    }

    #[test]
    fn test_reingest_is_a_fixpoint() {
        let text = "script table begin\n\
             DFLT\tdefault\t0\n\
             latn\tTRK\t1\n\
             script table end\n\
             feature table begin\n\
             0\tliga\t4\n\
             1\tliga\t4, 9\n\
             feature table end\n\
             lookup 9 single\n\
             i\tidotless\n\
             lookup end\n\
             lookup 4 context\n\
             glyph\tf, i\t2, 9\n\
             lookup end\n\
             lookup 5 chained\n\
             class definition begin\n\
             a\t1\n\
             b\t1\n\
             class definition end\n\
             class-chain\t\t1\t\t1, 9\n\
             lookup end\n";
        let config = Config::default();
        let first = to_legacy(&ingest(text, &config, None).unwrap()).unwrap();
        let second = to_legacy(&ingest(&first, &config, None).unwrap()).unwrap();
        assert_eq!(first, second);
        assert!(first.contains("latn\tTRK\t1\n"));
        assert!(first.contains("1\tliga\t9\n"));
    }
}
