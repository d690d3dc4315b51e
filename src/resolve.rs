//! Lookup dependency ordering and feature assembly.
//!
//! Lookups are built dependencies first so a chaining rule can hold the routines it runs.
//! Features are then assembled per tag: the lookups registered under `DFLT/default` form the
//! tag's base set, and every other scope of the tag only keeps the lookups not already in the
//! base set. Those are attached as copies carrying the scope.

use std::rc::Rc;

use log::{debug, warn};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::ResolveError;
use crate::legacy::{RawDocument, RawLookup, RawRule};
use crate::model::{Routine, Rule, RuleSet, Scope};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    InProgress,
    Done,
}

/// Turn a raw document into an assembled rule set.
pub fn resolve(document: RawDocument) -> Result<RuleSet, ResolveError> {
    let RawDocument {
        lookups,
        features,
        named_classes,
    } = document;

    let mut index = FxHashMap::default();
    for (i, lookup) in lookups.iter().enumerate() {
        if index.insert(lookup.id.as_str(), i).is_some() {
            warn!("lookup {} defined more than once, using the last", lookup.id);
        }
    }

    let order = dependency_order(&lookups, &index)?;
    let mut built: Vec<Option<Rc<Routine>>> = vec![None; lookups.len()];
    for &i in &order {
        let routine = build_routine(&lookups[i], &index, &built)?;
        built[i] = Some(Rc::new(routine));
    }

    let mut rule_set = RuleSet::new();
    let mut base_for_tag: FxHashMap<u32, FxHashSet<&str>> = FxHashMap::default();
    let mut toplevel = FxHashSet::default();
    for (&feature_id, feature) in &features {
        if feature.scopes.is_empty() {
            warn!(
                "feature {} is not registered for any script, skipping it",
                feature_id
            );
            continue;
        }
        let routines = if feature.scopes.contains(&Scope::DEFAULT) {
            base_for_tag
                .entry(feature.tag)
                .or_default()
                .extend(feature.lookups.iter().map(String::as_str));
            feature
                .lookups
                .iter()
                .map(|id| built_routine(&index, &built, id).map(Rc::clone))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            let base = base_for_tag.get(&feature.tag).ok_or(
                ResolveError::UnscopedLanguageOrdering {
                    feature_id,
                    tag: feature.tag,
                },
            )?;
            feature
                .lookups
                .iter()
                .filter(|id| !base.contains(id.as_str()))
                .map(|id| {
                    let routine = built_routine(&index, &built, id)?;
                    Ok(Rc::new(routine.clone_for_scopes(&feature.scopes)))
                })
                .collect::<Result<Vec<_>, ResolveError>>()?
        };
        for id in &feature.lookups {
            toplevel.insert(id.as_str());
        }
        debug!(
            "feature {} gets {} routines for {:?}",
            feature_id,
            routines.len(),
            feature.scopes
        );
        rule_set.add_feature(feature.tag, feature.scopes.clone(), routines);
    }

    rule_set.routines = order
        .iter()
        .filter(|&&i| !toplevel.contains(lookups[i].id.as_str()))
        .filter_map(|&i| built[i].clone())
        .collect();
    rule_set.named_classes = named_classes;
    Ok(rule_set)
}

/// Indices of `lookups` with every lookup after the lookups it depends on.
///
/// The traversal is an explicit-stack post-order walk; meeting a lookup that is still in
/// progress means the dependencies form a cycle.
fn dependency_order(
    lookups: &[RawLookup],
    index: &FxHashMap<&str, usize>,
) -> Result<Vec<usize>, ResolveError> {
    let mut dependencies = Vec::with_capacity(lookups.len());
    for lookup in lookups {
        let deps = lookup
            .dependencies()
            .map(|id| {
                index
                    .get(id)
                    .copied()
                    .ok_or_else(|| ResolveError::UnknownLookup(id.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        dependencies.push(deps);
    }

    let mut visit = vec![Visit::New; lookups.len()];
    let mut order = Vec::with_capacity(lookups.len());
    for root in 0..lookups.len() {
        if visit[root] != Visit::New || index.get(lookups[root].id.as_str()) != Some(&root) {
            continue;
        }
        visit[root] = Visit::InProgress;
        let mut stack = vec![(root, 0)];
        while let Some((node, next)) = stack.last_mut() {
            let node = *node;
            match dependencies[node].get(*next) {
                Some(&dep) => {
                    *next += 1;
                    match visit[dep] {
                        Visit::Done => {}
                        Visit::InProgress => {
                            let start = stack.iter().position(|&(n, _)| n == dep).unwrap_or(0);
                            let mut path: Vec<String> = stack[start..]
                                .iter()
                                .map(|&(n, _)| lookups[n].id.clone())
                                .collect();
                            path.push(lookups[dep].id.clone());
                            return Err(ResolveError::DependencyCycle(path));
                        }
                        Visit::New => {
                            visit[dep] = Visit::InProgress;
                            stack.push((dep, 0));
                        }
                    }
                }
                None => {
                    visit[node] = Visit::Done;
                    order.push(node);
                    stack.pop();
                }
            }
        }
    }
    Ok(order)
}

fn build_routine(
    lookup: &RawLookup,
    index: &FxHashMap<&str, usize>,
    built: &[Option<Rc<Routine>>],
) -> Result<Routine, ResolveError> {
    let mut routine = Routine::new(lookup.name.as_str()).with_flags(lookup.flags);
    for rule in &lookup.rules {
        match rule {
            RawRule::Substitution(subst) => routine.add_rule(subst.clone()),
            RawRule::Chaining { rule, lookups } => {
                let mut rule = rule.clone();
                for (position, id) in lookups {
                    let dep = built_routine(index, built, id)?;
                    rule.attach(*position, Rc::clone(dep))
                        .map_err(|_| ResolveError::BadPosition {
                            lookup: lookup.id.clone(),
                            position: position + 1,
                        })?;
                }
                routine.add_rule(Rule::Chaining(rule));
            }
        }
    }
    Ok(routine)
}

fn built_routine<'r>(
    index: &FxHashMap<&str, usize>,
    built: &'r [Option<Rc<Routine>>],
    id: &str,
) -> Result<&'r Rc<Routine>, ResolveError> {
    index
        .get(id)
        .and_then(|&i| built[i].as_ref())
        .ok_or_else(|| ResolveError::UnknownLookup(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glyph_class::GlyphClassRef;
    use crate::legacy::grammar::LookupType;
    use crate::legacy::RawFeature;
    use crate::model::{Chaining, LookupFlags, Substitution};
    use crate::tag;

    fn single(id: &str, from: &str, to: &str) -> RawLookup {
        RawLookup {
            id: id.to_string(),
            name: format!("lookup_{}", id),
            lookup_type: LookupType::Single,
            flags: LookupFlags::empty(),
            rules: vec![RawRule::Substitution(Substitution::new(
                vec![GlyphClassRef::glyph(from)],
                vec![GlyphClassRef::glyph(to)],
            ))],
        }
    }

    fn chain(id: &str, glyph: &str, targets: &[&str]) -> RawLookup {
        let rule = Chaining::new(vec![], vec![GlyphClassRef::glyph(glyph)], vec![]).unwrap();
        RawLookup {
            id: id.to_string(),
            name: format!("lookup_{}", id),
            lookup_type: LookupType::Context,
            flags: LookupFlags::empty(),
            rules: vec![RawRule::Chaining {
                rule,
                lookups: targets.iter().map(|t| (0, t.to_string())).collect(),
            }],
        }
    }

    fn feature(tag: u32, lookups: &[&str], scopes: &[Scope]) -> RawFeature {
        RawFeature {
            tag,
            lookups: lookups.iter().map(|id| id.to_string()).collect(),
            scopes: scopes.to_vec(),
        }
    }

    fn names(routines: &[Rc<Routine>]) -> Vec<&str> {
        routines.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_dependencies_come_first() {
        let document = RawDocument {
            lookups: vec![chain("0", "a", &["2"]), chain("1", "a", &["0"]), single("2", "a", "b")],
            ..RawDocument::default()
        };
        let rule_set = resolve(document).unwrap();
        assert_eq!(
            names(&rule_set.routines),
            vec!["lookup_2", "lookup_0", "lookup_1"]
        );
    }

    #[test]
    fn test_chaining_holds_dependency() {
        let document = RawDocument {
            lookups: vec![chain("7", "a", &["8"]), single("8", "a", "b")],
            ..RawDocument::default()
        };
        let rule_set = resolve(document).unwrap();
        let chain = rule_set.routine("lookup_7").unwrap();
        match &chain.rules[0] {
            Rule::Chaining(chaining) => {
                assert_eq!(chaining.lookups_at(0)[0].name, "lookup_8")
            }
            other => panic!("expected chaining rule, got {:?}", other),
        }
    }

    #[test]
    fn test_cycle_is_an_error() {
        let document = RawDocument {
            lookups: vec![chain("0", "a", &["1"]), chain("1", "a", &["2"]), chain("2", "a", &["0"])],
            ..RawDocument::default()
        };
        assert_eq!(
            resolve(document),
            Err(ResolveError::DependencyCycle(vec![
                "0".to_string(),
                "1".to_string(),
                "2".to_string(),
                "0".to_string()
            ]))
        );
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let document = RawDocument {
            lookups: vec![chain("5", "a", &["5"])],
            ..RawDocument::default()
        };
        assert_eq!(
            resolve(document),
            Err(ResolveError::DependencyCycle(vec![
                "5".to_string(),
                "5".to_string()
            ]))
        );
    }

    #[test]
    fn test_unknown_lookup() {
        let document = RawDocument {
            lookups: vec![chain("0", "a", &["9"])],
            ..RawDocument::default()
        };
        assert_eq!(
            resolve(document),
            Err(ResolveError::UnknownLookup("9".to_string()))
        );
    }

    #[test]
    fn test_bad_position() {
        let mut lookup = chain("0", "a", &[]);
        if let RawRule::Chaining { lookups, .. } = &mut lookup.rules[0] {
            lookups.push((3, "1".to_string()));
        }
        let document = RawDocument {
            lookups: vec![lookup, single("1", "a", "b")],
            ..RawDocument::default()
        };
        assert_eq!(
            resolve(document),
            Err(ResolveError::BadPosition {
                lookup: "0".to_string(),
                position: 4
            })
        );
    }

    #[test]
    fn test_language_features_are_disjoint_copies() {
        let trk = Scope::parse("latn", "TRK").unwrap();
        let mut document = RawDocument {
            lookups: vec![single("0", "a", "b"), single("1", "c", "d"), single("2", "e", "f")],
            ..RawDocument::default()
        };
        document
            .features
            .insert(0, feature(tag::LIGA, &["0", "1"], &[Scope::DEFAULT]));
        document
            .features
            .insert(1, feature(tag::LIGA, &["0", "2"], &[trk]));
        let rule_set = resolve(document).unwrap();

        assert_eq!(rule_set.features.len(), 2);
        let base = &rule_set.features[0];
        assert_eq!(names(&base.routines), vec!["lookup_0", "lookup_1"]);
        assert!(base.routines.iter().all(|r| r.scopes.is_empty()));

        let turkish = &rule_set.features[1];
        assert_eq!(names(&turkish.routines), vec!["lookup_2"]);
        assert_eq!(turkish.routines[0].scopes, vec![trk]);
        // All three were attached to features.
        assert!(rule_set.routines.is_empty());
    }

    #[test]
    fn test_language_before_default() {
        let trk = Scope::parse("latn", "TRK").unwrap();
        let mut document = RawDocument {
            lookups: vec![single("0", "a", "b")],
            ..RawDocument::default()
        };
        document
            .features
            .insert(0, feature(tag::LIGA, &["0"], &[trk]));
        document
            .features
            .insert(1, feature(tag::LIGA, &["0"], &[Scope::DEFAULT]));
        assert_eq!(
            resolve(document),
            Err(ResolveError::UnscopedLanguageOrdering {
                feature_id: 0,
                tag: tag::LIGA
            })
        );
    }

    #[test]
    fn test_unregistered_feature_is_skipped() {
        let mut document = RawDocument {
            lookups: vec![single("0", "a", "b")],
            ..RawDocument::default()
        };
        document.features.insert(3, feature(tag::SMCP, &["0"], &[]));
        let rule_set = resolve(document).unwrap();
        assert!(rule_set.features.is_empty());
        assert_eq!(names(&rule_set.routines), vec!["lookup_0"]);
    }
}
