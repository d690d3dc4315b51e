//! Matching rules against a buffer and applying them.
//!
//! A routine is applied by walking the buffer left to right. At each position the routine's
//! rules for the current phase are tried in order and the first that matches is applied;
//! matching then resumes after whatever the rule produced, so output is never rematched by the
//! same pass. Chaining rules run their referenced routines at single positions inside the
//! matched context, each as a one position pass of its own.

use crate::buffer::{Buffer, BufferItem, TextDirection, ALL_FEATURES};
use crate::context::{Match, MatchContext, MatchType};
use crate::error::ShapingError;
use crate::font::{GlyphCategory, ShapingFont};
use crate::glyph_class::GlyphClassRef;
use crate::model::{
    Anchor, Attachment, Chaining, LookupFlags, Phase, Positioning, Routine, Rule, Substitution,
};

/// Routines run from chaining rules may nest this deep.
pub const NESTING_LIMIT: usize = 16;

/// What is being applied and to which items.
#[derive(Clone, Copy)]
pub struct ApplyContext<'a> {
    pub opt_font: Option<&'a dyn ShapingFont>,
    /// Only rules of this phase are tried.
    pub phase: Phase,
    /// Input items need one of these bits in their mask.
    pub mask: u32,
}

impl<'a> ApplyContext<'a> {
    pub fn new(phase: Phase) -> Self {
        ApplyContext {
            opt_font: None,
            phase,
            mask: ALL_FEATURES,
        }
    }

    pub fn with_font(mut self, font: &'a dyn ShapingFont) -> Self {
        self.opt_font = Some(font);
        self
    }

    pub fn with_mask(mut self, mask: u32) -> Self {
        self.mask = mask;
        self
    }
}

/// The result of applying a rule at a position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Applied {
    /// Items from the match start to where matching resumes.
    span: usize,
    /// Change in buffer length.
    delta: isize,
}

/// Apply `routine` across the whole buffer. Returns whether any rule was applied.
pub fn apply_routine(
    ctx: &ApplyContext<'_>,
    routine: &Routine,
    buffer: &mut Buffer,
) -> Result<bool, ShapingError> {
    if !buffer.is_all_glyphs() {
        return Err(ShapingError::NotGlyphMapped);
    }
    if !routine.has_phase(ctx.phase) {
        return Ok(false);
    }
    let match_type = MatchType::from_lookup_flags(routine.flags);
    let mut applied_any = false;
    let mut i = 0;
    while i < buffer.items.len() {
        match apply_at(ctx, routine, match_type, buffer, i, 0)? {
            // A zero span only happens when items were deleted, so the buffer still shrinks.
            Some(applied) => {
                applied_any = true;
                i += applied.span;
            }
            None => i += 1,
        }
    }
    Ok(applied_any)
}

/// Could `rule` of a routine with `flags` match at `index`? Nothing is modified.
pub fn would_apply(
    ctx: &ApplyContext<'_>,
    rule: &Rule,
    flags: LookupFlags,
    items: &[BufferItem],
    index: usize,
) -> bool {
    let match_type = MatchType::from_lookup_flags(flags);
    match rule {
        Rule::Attachment(attachment) => {
            attachment_target(ctx, attachment, match_type, items, index).is_some()
        }
        rule => find_match(ctx, rule, match_type, items, index).is_some(),
    }
}

fn apply_at(
    ctx: &ApplyContext<'_>,
    routine: &Routine,
    match_type: MatchType,
    buffer: &mut Buffer,
    index: usize,
    depth: usize,
) -> Result<Option<Applied>, ShapingError> {
    for rule in routine.rules.iter().filter(|rule| rule.phase() == ctx.phase) {
        if let Some(applied) = apply_rule(ctx, rule, match_type, buffer, index, depth)? {
            return Ok(Some(applied));
        }
    }
    Ok(None)
}

fn apply_rule(
    ctx: &ApplyContext<'_>,
    rule: &Rule,
    match_type: MatchType,
    buffer: &mut Buffer,
    index: usize,
    depth: usize,
) -> Result<Option<Applied>, ShapingError> {
    if let Rule::Attachment(attachment) = rule {
        return Ok(attach(ctx, attachment, match_type, buffer, index));
    }
    let matched = match find_match(ctx, rule, match_type, &buffer.items, index) {
        Some(matched) => matched,
        None => return Ok(None),
    };
    let applied = match rule {
        Rule::Substitution(subst) => substitute(subst, &matched, &mut buffer.items),
        Rule::Chaining(chaining) => {
            apply_chaining(ctx, chaining, match_type, buffer, &matched, depth)?
        }
        Rule::Positioning(positioning) => position(positioning, &matched, &mut buffer.items),
        Rule::Attachment(_) => return Ok(None),
    };
    Ok(Some(applied))
}

fn find_match(
    ctx: &ApplyContext<'_>,
    rule: &Rule,
    match_type: MatchType,
    items: &[BufferItem],
    index: usize,
) -> Option<Match> {
    let context = match rule {
        Rule::Substitution(subst) => MatchContext {
            backtrack: &subst.precontext,
            input: &subst.input,
            lookahead: &subst.postcontext,
        },
        Rule::Chaining(chaining) => MatchContext {
            backtrack: &chaining.precontext,
            input: &chaining.context,
            lookahead: &chaining.postcontext,
        },
        Rule::Positioning(positioning) => MatchContext {
            backtrack: &positioning.precontext,
            input: &positioning.glyphs,
            lookahead: &positioning.postcontext,
        },
        Rule::Attachment(_) => return None,
    };
    context.matches(ctx.opt_font, match_type, items, index, ctx.mask)
}

fn substitute(subst: &Substitution, matched: &Match, items: &mut Vec<BufferItem>) -> Applied {
    let start = matched.start();
    let end = matched.end();

    if subst.input.len() == subst.output.len() {
        // Glyph for glyph; clusters are untouched.
        for ((&i, input), output) in matched.positions.iter().zip(&subst.input).zip(&subst.output) {
            if let Some(glyph) = output_glyph(input, output, items[i].glyph_name()) {
                items[i].glyph = Some(glyph);
            }
        }
        return Applied {
            span: end - start + 1,
            delta: 0,
        };
    }

    let cluster = matched
        .positions
        .iter()
        .map(|&i| items[i].cluster)
        .min()
        .unwrap_or(items[start].cluster);
    let glyphs = subst
        .output
        .iter()
        .filter_map(|output| match subst.input.as_slice() {
            [input] => output_glyph(input, output, items[start].glyph_name()),
            _ => output.glyphs().first().cloned(),
        })
        .collect::<Vec<_>>();
    let template = items[start].clone();
    let outputs = glyphs.into_iter().map(|glyph| BufferItem {
        glyph: Some(glyph),
        cluster,
        ..template.clone()
    });
    // Items skipped over while matching stay, after the output.
    let skipped = (start..=end)
        .filter(|i| !matched.positions.contains(i))
        .map(|i| items[i].clone())
        .collect::<Vec<_>>();
    let replacement = outputs.chain(skipped).collect::<Vec<_>>();
    let removed = end - start + 1;
    let inserted = replacement.len();
    items.splice(start..=end, replacement);
    Applied {
        span: inserted,
        delta: inserted as isize - removed as isize,
    }
}

/// The glyph `output` produces for `glyph`. A class maps to a class by index.
fn output_glyph(
    input: &GlyphClassRef,
    output: &GlyphClassRef,
    glyph: Option<&str>,
) -> Option<String> {
    let outputs = output.glyphs();
    let index = match outputs.len() {
        0 | 1 => 0,
        _ => glyph.and_then(|glyph| input.position(glyph)).unwrap_or(0),
    };
    outputs.get(index).or_else(|| outputs.last()).cloned()
}

fn apply_chaining(
    ctx: &ApplyContext<'_>,
    chaining: &Chaining,
    match_type: MatchType,
    buffer: &mut Buffer,
    matched: &Match,
    depth: usize,
) -> Result<Applied, ShapingError> {
    let start = matched.start();
    let len = (matched.end() - start + 1) as isize;
    let mut delta = 0;
    for (position, routine) in chaining.lookups() {
        if depth >= NESTING_LIMIT {
            return Err(ShapingError::NestingLimitExceeded);
        }
        // Earlier routines may have changed the buffer, so the position is found again.
        let index = match match_type.find_nth(ctx.opt_font, &buffer.items, start, position) {
            Some(index) => index,
            None => continue,
        };
        let nested_type = MatchType::from_lookup_flags(routine.flags);
        if let Some(applied) = apply_at(ctx, routine, nested_type, buffer, index, depth + 1)? {
            delta += applied.delta;
        }
    }
    Ok(Applied {
        span: (len + delta).max(0) as usize,
        delta,
    })
}

fn position(positioning: &Positioning, matched: &Match, items: &mut [BufferItem]) -> Applied {
    for (&i, value) in matched.positions.iter().zip(&positioning.values) {
        if value.is_zero() {
            continue;
        }
        let pos = &mut items[i].position;
        pos.x_offset += value.x_placement;
        pos.y_offset += value.y_placement;
        pos.hori_advance += value.x_advance;
        pos.vert_advance += value.y_advance;
    }
    Applied {
        span: matched.end() - matched.start() + 1,
        delta: 0,
    }
}

/// The item `index` attaches to and the anchors involved.
struct Target {
    other: usize,
    /// Anchor of the item at `index`.
    own: Anchor,
    other_anchor: Anchor,
}

/// For mark-to-base, the base a mark at `index` attaches to. For cursive attachment, the next
/// glyph whose entry joins the exit of the glyph at `index`.
fn attachment_target(
    ctx: &ApplyContext<'_>,
    attachment: &Attachment,
    match_type: MatchType,
    items: &[BufferItem],
    index: usize,
) -> Option<Target> {
    let item = items.get(index)?;
    if item.mask & ctx.mask == 0 || !match_type.match_glyph(ctx.opt_font, item) {
        return None;
    }
    let glyph = item.glyph_name()?;
    if attachment.cursive {
        let exit = *attachment.bases.get(glyph)?;
        let next = match_type.find_next(ctx.opt_font, items, index)?;
        let entry = *attachment.marks.get(items[next].glyph_name()?)?;
        return Some(Target {
            other: next,
            own: exit,
            other_anchor: entry,
        });
    }

    let mark = *attachment.marks.get(glyph)?;
    for (k, candidate) in items[..index].iter().enumerate().rev() {
        let candidate = candidate.glyph_name()?;
        if let Some(&base) = attachment.bases.get(candidate) {
            return Some(Target {
                other: k,
                own: mark,
                other_anchor: base,
            });
        }
        let is_mark = attachment.marks.contains_key(candidate)
            || ctx
                .opt_font
                .is_some_and(|font| font.glyph_category(candidate) == GlyphCategory::Mark);
        if !is_mark {
            return None;
        }
    }
    None
}

fn attach(
    ctx: &ApplyContext<'_>,
    attachment: &Attachment,
    match_type: MatchType,
    buffer: &mut Buffer,
    index: usize,
) -> Option<Applied> {
    let target = attachment_target(ctx, attachment, match_type, &buffer.items, index)?;
    let direction = buffer.direction;
    let items = &mut buffer.items;
    if attachment.cursive {
        let (exit, entry) = (target.own, target.other_anchor);
        let (i, j) = (index, target.other);
        match direction {
            TextDirection::LeftToRight => {
                items[i].position.hori_advance = exit.x + items[i].position.x_offset;
                let d = entry.x + items[j].position.x_offset;
                items[j].position.hori_advance -= d;
                items[j].position.x_offset -= d;
            }
            TextDirection::RightToLeft => {
                let d = exit.x + items[i].position.x_offset;
                items[i].position.hori_advance -= d;
                items[i].position.x_offset -= d;
                items[j].position.hori_advance = entry.x + items[j].position.x_offset;
            }
        }
        items[j].position.y_offset = items[i].position.y_offset + exit.y - entry.y;
    } else {
        let (mark, base) = (target.own, target.other_anchor);
        let base_index = target.other;
        // Offsets are relative to the pen position of the mark.
        let advance: i32 = match direction {
            TextDirection::LeftToRight => items[base_index..index]
                .iter()
                .map(|item| -item.position.hori_advance)
                .sum(),
            TextDirection::RightToLeft => items[base_index + 1..=index]
                .iter()
                .map(|item| item.position.hori_advance)
                .sum(),
        };
        let base_pos = items[base_index].position;
        let pos = &mut items[index].position;
        pos.x_offset = base.x - mark.x + advance + base_pos.x_offset;
        pos.y_offset = base.y - mark.y + base_pos.y_offset;
    }
    Some(Applied { span: 1, delta: 0 })
}
