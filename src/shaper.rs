//! The shaping pipeline.
//!
//! `preprocess → normalize → fixups → map to glyphs → substitute → position → hide default
//! ignorables → postprocess`. The first four steps only run for buffers that still hold
//! characters. Substitution and positioning both walk the plan's stages; pauses between
//! stages are only honoured while substituting.

use std::fmt;
use std::rc::Rc;

use itertools::Itertools;
use log::{debug, warn};
use rustc_hash::FxHashMap;

use crate::apply::{apply_routine, would_apply, ApplyContext};
use crate::buffer::{Buffer, BufferItem, GlyphPosition, ALL_FEATURES};
use crate::error::ShapingError;
use crate::font::ShapingFont;
use crate::model::{Phase, RuleSet};
use crate::tag::{self, DisplayTag};
use crate::unicode::{is_default_ignorable, is_space_separator, Nfc, Normalizer};

/// Mask bit shared by every feature. Tags that don't get a bit of their own use it.
pub const GLOBAL_MASK: u32 = 1;

const SPACE: char = ' ';
const HYPHEN: char = '\u{2010}';
const NON_BREAKING_HYPHEN: char = '\u{2011}';

/// Called between stages with the phase being run.
pub type PauseFn = Box<dyn FnMut(Phase, &mut Buffer)>;

pub enum Stage {
    /// Feature tags, applied in order.
    Features(Vec<u32>),
    Pause(PauseFn),
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Features(tags) => {
                write!(f, "Features({})", tags.iter().map(|&t| DisplayTag(t)).join(","))
            }
            Stage::Pause(_) => write!(f, "Pause"),
        }
    }
}

/// A rule set and the stages to run it in.
#[derive(Debug)]
pub struct ShapePlan {
    rules: Rc<RuleSet>,
    stages: Vec<Stage>,
    masks: FxHashMap<u32, u32>,
    next_bit: u32,
}

impl ShapePlan {
    pub fn new(rules: Rc<RuleSet>) -> Self {
        ShapePlan {
            rules,
            stages: Vec::new(),
            masks: FxHashMap::default(),
            next_bit: 1,
        }
    }

    /// A plan running the common substitution and positioning features.
    pub fn with_default_stages(rules: Rc<RuleSet>) -> Self {
        let mut plan = ShapePlan::new(rules);
        plan.add_features(&[tag::CCMP, tag::LOCL]);
        plan.add_features(&[tag::RLIG, tag::CALT, tag::LIGA, tag::CLIG]);
        plan.add_features(&[tag::CURS, tag::KERN, tag::DIST]);
        plan.add_features(&[tag::MARK, tag::MKMK]);
        plan
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Add a stage applying `tags` in order, giving each new tag its own mask bit.
    pub fn add_features(&mut self, tags: &[u32]) -> &mut Self {
        for &feature_tag in tags {
            if self.masks.contains_key(&feature_tag) {
                continue;
            }
            let mask = if self.next_bit < u32::BITS {
                let mask = 1 << self.next_bit;
                self.next_bit += 1;
                mask
            } else {
                warn!(
                    "out of mask bits, feature {} shares the global mask",
                    DisplayTag(feature_tag)
                );
                GLOBAL_MASK
            };
            self.masks.insert(feature_tag, mask);
        }
        self.stages.push(Stage::Features(tags.to_vec()));
        self
    }

    pub fn add_pause(&mut self, pause: impl FnMut(Phase, &mut Buffer) + 'static) -> &mut Self {
        self.stages.push(Stage::Pause(Box::new(pause)));
        self
    }

    /// The mask bit of `feature_tag`, used with `Buffer::clear_mask` to disable it.
    pub fn feature_mask(&self, feature_tag: u32) -> u32 {
        self.masks.get(&feature_tag).copied().unwrap_or(GLOBAL_MASK)
    }
}

/// Script specific steps around the generic pipeline.
pub trait ShaperHooks {
    fn preprocess_text(&self, _buffer: &mut Buffer) {}

    fn postprocess_glyphs(&self, _buffer: &mut Buffer) {}
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultHooks;

impl ShaperHooks for DefaultHooks {}

pub struct Shaper<'a> {
    font: &'a dyn ShapingFont,
    normalizer: &'a dyn Normalizer,
    hooks: &'a dyn ShaperHooks,
}

impl<'a> Shaper<'a> {
    pub fn new(font: &'a dyn ShapingFont) -> Self {
        Shaper {
            font,
            normalizer: &Nfc,
            hooks: &DefaultHooks,
        }
    }

    pub fn with_normalizer(mut self, normalizer: &'a dyn Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_hooks(mut self, hooks: &'a dyn ShaperHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn shape(&self, plan: &mut ShapePlan, buffer: &mut Buffer) -> Result<(), ShapingError> {
        if !buffer.is_all_glyphs() {
            self.hooks.preprocess_text(buffer);
            self.normalize(buffer);
            buffer.map_to_glyphs(self.font);
            debug!("initial glyph mapping: {}", buffer.serialize(false));
        }
        self.run_stages(plan, buffer, Phase::Substitution)?;
        self.position(plan, buffer)?;
        self.hide_default_ignorables(buffer);
        self.hooks.postprocess_glyphs(buffer);
        Ok(())
    }

    /// Normalize the characters of the buffer and apply the space and hyphen fixups.
    pub fn normalize(&self, buffer: &mut Buffer) {
        buffer.normalize(self.normalizer);

        for item in buffer.items.iter_mut().filter(|item| item.glyph.is_none()) {
            let ch = match item.codepoint {
                Some(ch) => ch,
                None => continue,
            };
            // Only when the font can't display the original character.
            if self.font.has_glyph(ch) {
                continue;
            }
            if is_space_separator(ch) {
                item.codepoint = Some(SPACE);
            } else if ch == NON_BREAKING_HYPHEN {
                item.codepoint = Some(HYPHEN);
            }
        }
    }

    fn position(&self, plan: &mut ShapePlan, buffer: &mut Buffer) -> Result<(), ShapingError> {
        for item in &mut buffer.items {
            let advance = item
                .glyph_name()
                .map_or(0, |glyph| self.font.advance(glyph));
            item.position = GlyphPosition::new(advance, 0, 0, 0);
        }
        self.run_stages(plan, buffer, Phase::Positioning)
    }

    fn run_stages(
        &self,
        plan: &mut ShapePlan,
        buffer: &mut Buffer,
        phase: Phase,
    ) -> Result<(), ShapingError> {
        debug!("running {} stage", phase);
        let ShapePlan {
            rules,
            stages,
            masks,
            ..
        } = plan;
        for stage in stages.iter_mut() {
            match stage {
                Stage::Features(tags) => {
                    debug!(
                        "processing features: {}",
                        tags.iter().map(|&t| DisplayTag(t)).join(",")
                    );
                    for &feature_tag in tags.iter() {
                        let mask = masks.get(&feature_tag).copied().unwrap_or(GLOBAL_MASK);
                        let ctx = ApplyContext::new(phase)
                            .with_font(self.font)
                            .with_mask(mask);
                        let (script, language) = (buffer.script, buffer.language);
                        for routine in rules.routines_for(feature_tag, script, language) {
                            if !routine.has_phase(phase) {
                                continue;
                            }
                            debug!(
                                "before {} ({}): {}",
                                routine.name,
                                DisplayTag(feature_tag),
                                buffer.serialize(phase == Phase::Positioning)
                            );
                            apply_routine(&ctx, routine, buffer)?;
                            debug!(
                                "after {} ({}): {}",
                                routine.name,
                                DisplayTag(feature_tag),
                                buffer.serialize(phase == Phase::Positioning)
                            );
                        }
                    }
                }
                Stage::Pause(pause) => {
                    if phase == Phase::Substitution {
                        pause(phase, buffer);
                    }
                }
            }
        }
        Ok(())
    }

    /// Default ignorables become a zero width space, or are removed if the font has no space.
    fn hide_default_ignorables(&self, buffer: &mut Buffer) {
        let ignorable = |item: &BufferItem| item.codepoint.is_some_and(is_default_ignorable);
        match self.font.glyph_for_char(SPACE) {
            Some(space) => {
                for item in buffer.items.iter_mut().filter(|item| ignorable(item)) {
                    item.glyph = Some(space.to_string());
                    item.position.hori_advance = 0;
                    item.position.vert_advance = 0;
                }
            }
            None => buffer.items.retain(|item| !ignorable(item)),
        }
    }

    /// Would `feature_tag` substitute anything in `items`? Positioning rules are not
    /// considered and `items` are not modified.
    pub fn would_substitute(
        &self,
        plan: &ShapePlan,
        buffer: &Buffer,
        feature_tag: u32,
        items: &[BufferItem],
    ) -> bool {
        let scratch = items
            .iter()
            .map(|item| BufferItem {
                mask: ALL_FEATURES,
                ..item.clone()
            })
            .collect::<Vec<_>>();
        let ctx = ApplyContext::new(Phase::Substitution).with_font(self.font);
        plan.rules
            .routines_for(feature_tag, buffer.script, buffer.language)
            .any(|routine| {
                routine
                    .rules
                    .iter()
                    .filter(|rule| rule.phase() != Phase::Positioning)
                    .any(|rule| {
                        (0..scratch.len())
                            .any(|i| would_apply(&ctx, rule, routine.flags, &scratch, i))
                    })
            })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::font::GlyphMap;
    use crate::glyph_class::GlyphClassRef;
    use crate::model::{Routine, Scope, Substitution};
    use crate::unicode::Unnormalized;

    fn single(from: &str, to: &str) -> Substitution {
        Substitution::new(
            vec![GlyphClassRef::glyph(from)],
            vec![GlyphClassRef::glyph(to)],
        )
    }

    fn font() -> GlyphMap {
        let mut font = GlyphMap::new();
        font.add_glyph("a", 500)
            .add_glyph("b", 520)
            .add_glyph("space", 250)
            .add_glyph("hyphen", 300)
            .map_char('a', "a")
            .map_char('b', "b")
            .map_char(' ', "space")
            .map_char('\u{2010}', "hyphen");
        font
    }

    fn rule_set(feature_tag: u32, routine: Routine) -> Rc<RuleSet> {
        let mut rules = RuleSet::new();
        rules.add_feature(feature_tag, vec![Scope::DEFAULT], vec![Rc::new(routine)]);
        Rc::new(rules)
    }

    #[test]
    fn test_masks() {
        let mut plan = ShapePlan::new(Rc::new(RuleSet::new()));
        plan.add_features(&[tag::LIGA, tag::KERN]).add_features(&[tag::LIGA]);
        assert_eq!(plan.feature_mask(tag::LIGA), 0b10);
        assert_eq!(plan.feature_mask(tag::KERN), 0b100);
        assert_eq!(plan.feature_mask(tag::SMCP), GLOBAL_MASK);
        assert_eq!(plan.stages().len(), 2);
    }

    #[test]
    fn test_fixups() {
        let font = font();
        let shaper = Shaper::new(&font);
        // thin space and non-breaking hyphen are not in the font
        let mut buffer = Buffer::from_text("a\u{2009}\u{2011}");
        shaper.normalize(&mut buffer);
        assert_eq!(buffer.items[1].codepoint, Some(' '));
        assert_eq!(buffer.items[2].codepoint, Some('\u{2010}'));

        let mut font = font.clone();
        font.map_char('\u{2009}', "thinspace");
        let shaper = Shaper::new(&font);
        let mut buffer = Buffer::from_text("\u{2009}");
        shaper.normalize(&mut buffer);
        assert_eq!(buffer.items[0].codepoint, Some('\u{2009}'));
    }

    #[test]
    fn test_normalizer() {
        let mut font = font();
        font.map_char('\u{E1}', "aacute");
        let mut buffer = Buffer::from_text("a\u{301}b");
        Shaper::new(&font).normalize(&mut buffer);
        buffer.map_to_glyphs(&font);
        assert_eq!(buffer.glyph_names(), vec!["aacute", "b"]);
        assert_eq!(buffer.clusters(), vec![0, 2]);

        let mut buffer = Buffer::from_text("a\u{301}b");
        Shaper::new(&font)
            .with_normalizer(&Unnormalized)
            .normalize(&mut buffer);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_shape_text() {
        let font = font();
        let mut plan = ShapePlan::with_default_stages(rule_set(
            tag::LIGA,
            Routine::new("lookup_0").with_rule(single("a", "b")),
        ));
        let mut buffer = Buffer::from_text("ab a");
        Shaper::new(&font).shape(&mut plan, &mut buffer).unwrap();
        assert_eq!(buffer.serialize(true), "b+520|b+520|space+250|b+520");
        assert_eq!(buffer.clusters(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_disabled_feature() {
        let font = font();
        let mut plan = ShapePlan::with_default_stages(rule_set(
            tag::LIGA,
            Routine::new("lookup_0").with_rule(single("a", "b")),
        ));
        let mut buffer = Buffer::from_text("aa");
        buffer.clear_mask(0..1, plan.feature_mask(tag::LIGA));
        Shaper::new(&font).shape(&mut plan, &mut buffer).unwrap();
        assert_eq!(buffer.serialize(false), "a|b");
    }

    #[test]
    fn test_pause_runs_between_substitution_stages() {
        let font = font();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut plan = ShapePlan::new(rule_set(
            tag::LIGA,
            Routine::new("lookup_0").with_rule(single("a", "b")),
        ));
        let calls = Rc::clone(&seen);
        plan.add_pause(move |phase, buffer| {
            calls.borrow_mut().push((phase, buffer.serialize(false)))
        })
            .add_features(&[tag::LIGA]);
        let mut buffer = Buffer::from_glyphs(["a"]);
        Shaper::new(&font).shape(&mut plan, &mut buffer).unwrap();
        assert_eq!(*seen.borrow(), vec![(Phase::Substitution, "a".to_string())]);
        assert_eq!(buffer.serialize(false), "b");
    }

    #[test]
    fn test_hide_default_ignorables() {
        let font = font();
        let mut plan = ShapePlan::with_default_stages(Rc::new(RuleSet::new()));
        let mut buffer = Buffer::from_text("a\u{200D}b");
        Shaper::new(&font).shape(&mut plan, &mut buffer).unwrap();
        assert_eq!(buffer.serialize(true), "a+500|space+0|b+520");

        let mut font = GlyphMap::new();
        font.map_char('a', "a");
        let mut buffer = Buffer::from_text("\u{200D}a");
        Shaper::new(&font).shape(&mut plan, &mut buffer).unwrap();
        assert_eq!(buffer.serialize(false), "a");
    }

    #[test]
    fn test_would_substitute() {
        let font = font();
        let plan = ShapePlan::with_default_stages(rule_set(
            tag::LIGA,
            Routine::new("lookup_0").with_rule(single("a", "b")),
        ));
        let buffer = Buffer::from_glyphs(["x"]);
        let mut items = Buffer::from_glyphs(["b", "a"]).items;
        items[1].mask = 0;
        let shaper = Shaper::new(&font);
        assert!(shaper.would_substitute(&plan, &buffer, tag::LIGA, &items));
        assert!(!shaper.would_substitute(&plan, &buffer, tag::LIGA, &items[..1]));
        assert!(!shaper.would_substitute(&plan, &buffer, tag::SMCP, &items));
        assert_eq!(items[1].mask, 0);
    }

    #[test]
    fn test_script_filtering() {
        let font = font();
        let mut rules = RuleSet::new();
        let trk = tag::from_string("TRK").unwrap();
        let turkish = Routine::new("lookup_1")
            .with_rule(single("a", "b"))
            .clone_for_scopes(&[Scope::new(tag::LATN, Some(trk))]);
        rules.add_feature(
            tag::LOCL,
            vec![Scope::new(tag::LATN, Some(trk))],
            vec![Rc::new(turkish)],
        );
        let mut plan = ShapePlan::with_default_stages(Rc::new(rules));
        let shaper = Shaper::new(&font);

        let mut buffer = Buffer::from_glyphs(["a"]).with_script(tag::LATN, Some(trk));
        shaper.shape(&mut plan, &mut buffer).unwrap();
        assert_eq!(buffer.serialize(false), "b");

        let mut buffer = Buffer::from_glyphs(["a"]).with_script(tag::LATN, None);
        shaper.shape(&mut plan, &mut buffer).unwrap();
        assert_eq!(buffer.serialize(false), "a");
    }
}
