//! The transition resolver (§4.H): finding enabled transitions for an
//! event (or eventlessly) and resolving conflicts among them down to one
//! optimal transition per source, in document order. Grounded in the
//! bundled tool's own `fsm.rs` selection logic, pulled out into a free
//! function module so it has no dependency on the mutable state chart —
//! only on the document, the active configuration, and the evaluator.

use std::collections::HashSet;

use crate::configuration::Configuration;
use crate::datamodel::{EvaluationContext, Evaluator};
use crate::document::{Document, StateId, Transition};
use crate::event::{event_matches, Event};
use crate::hierarchy;

/// `find_enabled_transitions` (§4.H): iterate `all_active_states` in
/// document order; for each, consult its transition list; keep those whose
/// event descriptor matches (or, for an eventless search, those with no
/// descriptor at all) and whose guard evaluates true. Multiple matches per
/// source are all returned here — `resolve_conflicts` narrows to one.
pub fn find_enabled_transitions<'doc>(
    doc: &'doc Document,
    config: &Configuration,
    evaluator: &dyn Evaluator,
    eval_ctx: &EvaluationContext,
    event: Option<&Event>,
) -> Vec<&'doc Transition> {
    let mut active: Vec<StateId> = config.all_active_states(doc).into_iter().collect();
    active.sort_by_key(|&id| doc.state(id).document_order);

    let mut enabled = Vec::new();
    for &state_id in &active {
        for transition in &doc.state(state_id).transitions {
            let event_ok = match event {
                None => transition.is_eventless(),
                Some(ev) => transition
                    .event
                    .as_deref()
                    .map(|descriptors| event_matches(descriptors, &ev.name))
                    .unwrap_or(false),
            };
            if !event_ok {
                continue;
            }
            let cond_ok = match &transition.cond {
                None => true,
                Some(cond) => evaluator.evaluate_condition(cond, eval_ctx),
            };
            if cond_ok {
                enabled.push(transition);
            }
        }
    }
    enabled.sort_by_key(|t| t.document_order);
    enabled
}

/// Two-pass conflict resolution (§4.H) followed by per-source selection.
/// Returns the optimal transition set: at most one transition per source,
/// sorted by document order.
pub fn resolve_conflicts<'doc>(doc: &'doc Document, enabled: Vec<&'doc Transition>) -> Vec<&'doc Transition> {
    let sources: HashSet<StateId> = enabled.iter().map(|t| t.source).collect();

    // Pass 1: descendant wins over ancestor. A transition is discarded if
    // some other enabled transition's source is a (strict) descendant of
    // its own source.
    let after_descendant: Vec<&Transition> = enabled
        .into_iter()
        .filter(|t| {
            !sources
                .iter()
                .any(|&other| other != t.source && hierarchy::descendant_of(doc, other, t.source))
        })
        .collect();

    // Pass 2: parallel region conflict. When two surviving transitions
    // share a parallel ancestor and one escapes it while the other stays
    // inside, only the earlier (by document order) of the two survives.
    let mut survivors = Vec::new();
    for (i, t) in after_descendant.iter().enumerate() {
        let beaten = after_descendant.iter().enumerate().any(|(j, other)| {
            i != j && conflicts_in_parallel_region(doc, t, other) && other.document_order < t.document_order
        });
        if !beaten {
            survivors.push(*t);
        }
    }

    // Per-source selection: first surviving transition per source, by
    // document order.
    let mut seen = HashSet::new();
    let mut result: Vec<&Transition> = survivors.into_iter().filter(|t| seen.insert(t.source)).collect();
    result.sort_by_key(|t| t.document_order);
    result
}

/// True iff `a` and `b` share a parallel ancestor and their potential exit
/// scopes disagree about escaping it — one transition's targets leave the
/// shared parallel region while the other's stay inside.
fn conflicts_in_parallel_region(doc: &Document, a: &Transition, b: &Transition) -> bool {
    for &parallel in hierarchy::parallel_ancestors(doc, a.source) {
        if !hierarchy::parallel_ancestors(doc, b.source).contains(&parallel) {
            continue;
        }
        let exits = |t: &Transition| -> bool {
            if t.is_targetless() {
                return false;
            }
            t.targets.iter().any(|&target| hierarchy::exits_parallel_region(doc, t.source, target))
        };
        if exits(a) != exits(b) {
            return true;
        }
    }
    false
}

/// Convenience wrapper: find and resolve in one call, the shape every
/// `send_event`/microstep call site actually wants.
pub fn select_transitions<'doc>(
    doc: &'doc Document,
    config: &Configuration,
    evaluator: &dyn Evaluator,
    eval_ctx: &EvaluationContext,
    event: Option<&Event>,
) -> Vec<&'doc Transition> {
    resolve_conflicts(doc, find_enabled_transitions(doc, config, evaluator, eval_ctx, event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentBuilder, StateKind, TransitionType};
    use crate::evaluator::NullEvaluator;

    fn ctx<'a>(dm: &'a crate::datamodel::DataStore, cfg: &'a [String]) -> EvaluationContext<'a> {
        EvaluationContext {
            datamodel: dm,
            event_name: None,
            event_data: None,
            configuration: cfg,
            session_id: "s1",
            document_name: None,
        }
    }

    #[test]
    fn descendant_transition_beats_ancestor() {
        let mut b = DocumentBuilder::new();
        let p = b.add_state("p", StateKind::Compound, None, 0);
        let c1 = b.add_state("c1", StateKind::Atomic, Some(p), 1);
        let c2 = b.add_state("c2", StateKind::Atomic, None, 2);
        b.state_mut(p).transitions.push(Transition {
            event: Some("go".to_string()),
            cond: None,
            targets: vec![c2],
            transition_type: TransitionType::External,
            actions: vec![],
            source: p,
            document_order: 1,
        });
        b.state_mut(c1).transitions.push(Transition {
            event: Some("go".to_string()),
            cond: None,
            targets: vec![c2],
            transition_type: TransitionType::External,
            actions: vec![],
            source: c1,
            document_order: 2,
        });
        b.state_mut(p).initial_attribute = Some(c1);
        b.top_level.push("p".to_string());
        b.top_level.push("c2".to_string());
        b.initial = Some("p".to_string());
        let (doc, _w) = b.build().unwrap();

        let config = Configuration::from_leaves([c1]);
        let evaluator = NullEvaluator::new();
        let dm = crate::datamodel::DataStore::new();
        let cfg_names = vec![];
        let eval_ctx = ctx(&dm, &cfg_names);
        let enabled = find_enabled_transitions(&doc, &config, &evaluator, &eval_ctx, Some(&Event::external("go")));
        assert_eq!(enabled.len(), 2);
        let resolved = resolve_conflicts(&doc, enabled);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].source, c1);
    }

    #[test]
    fn first_in_document_order_wins_per_source() {
        let mut b = DocumentBuilder::new();
        let a = b.add_state("a", StateKind::Atomic, None, 0);
        let x = b.add_state("x", StateKind::Atomic, None, 1);
        let y = b.add_state("y", StateKind::Atomic, None, 2);
        b.state_mut(a).transitions.push(Transition {
            event: Some("go".to_string()),
            cond: None,
            targets: vec![x],
            transition_type: TransitionType::External,
            actions: vec![],
            source: a,
            document_order: 1,
        });
        b.state_mut(a).transitions.push(Transition {
            event: Some("go".to_string()),
            cond: None,
            targets: vec![y],
            transition_type: TransitionType::External,
            actions: vec![],
            source: a,
            document_order: 2,
        });
        b.top_level.extend(["a".to_string(), "x".to_string(), "y".to_string()]);
        b.initial = Some("a".to_string());
        let (doc, _w) = b.build().unwrap();

        let config = Configuration::from_leaves([a]);
        let evaluator = NullEvaluator::new();
        let dm = crate::datamodel::DataStore::new();
        let cfg_names = vec![];
        let eval_ctx = ctx(&dm, &cfg_names);
        let selected = select_transitions(&doc, &config, &evaluator, &eval_ctx, Some(&Event::external("go")));
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].targets, vec![x]);
    }
}
