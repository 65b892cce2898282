//! Structural/semantic validation (§4.B). Runs before a [crate::document::Document]
//! is frozen; accumulates every problem found rather than stopping at the
//! first one, so a caller sees the whole picture in one pass.

use std::collections::{HashMap, HashSet};

use crate::document::{DocumentBuilder, StateId, StateKind};
use crate::error::ValidationError;

/// Runs every check in §4.B against a half-built document. Returns
/// `(errors, warnings)`; on any error the document must not be frozen.
pub fn validate(
    builder: &DocumentBuilder,
    initial: Option<StateId>,
    top_level: &[StateId],
) -> (Vec<ValidationError>, Vec<ValidationError>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    check_duplicate_ids(builder, &mut errors);
    check_document_initial(builder, initial, &mut errors);

    for state in builder.states() {
        check_history_placement(builder, state, &mut errors);
        check_initial_attribute(builder, state, &mut errors);
        check_initial_pseudo_state(builder, state, &mut errors);
        check_transition_targets(builder, state, &mut errors);
    }

    check_unreachable_states(builder, initial, top_level, &mut warnings);

    (errors, warnings)
}

fn check_duplicate_ids(builder: &DocumentBuilder, errors: &mut Vec<ValidationError>) {
    let mut seen = HashMap::new();
    for state in builder.states() {
        let count = seen.entry(state.id.clone()).or_insert(0);
        *count += 1;
        if *count == 2 {
            errors.push(ValidationError::DuplicateStateId { id: state.id.clone() });
        }
    }
}

fn check_document_initial(builder: &DocumentBuilder, initial: Option<StateId>, errors: &mut Vec<ValidationError>) {
    if let Some(target) = initial {
        let target_state = builder.state(target);
        if target_state.parent.is_some() {
            // A document-level `initial` must name a top-level state.
            errors.push(ValidationError::InitialTargetNotDirectChild {
                state: "<scxml>".to_string(),
                target: target_state.id.clone(),
            });
        }
    }
}

fn check_initial_attribute(builder: &DocumentBuilder, state: &crate::document::State, errors: &mut Vec<ValidationError>) {
    if let Some(initial_id) = state.initial_attribute {
        let child = builder.state(initial_id);
        if child.parent != Some(state.index) {
            errors.push(ValidationError::InitialTargetNotDirectChild {
                state: state.id.clone(),
                target: child.id.clone(),
            });
        }
    }
    if state.is_compound() && state.children.is_empty() {
        errors.push(ValidationError::CompoundStateHasNoChildren { state: state.id.clone() });
    }
}

fn check_history_placement(builder: &DocumentBuilder, state: &crate::document::State, errors: &mut Vec<ValidationError>) {
    if state.is_history().is_some() {
        let ok = state
            .parent
            .map(|p| {
                let parent = builder.state(p);
                parent.is_compound() || parent.is_parallel()
            })
            .unwrap_or(false);
        if !ok {
            errors.push(ValidationError::HistoryNotDirectChildOfCompoundOrParallel { id: state.id.clone() });
        }
    }
}

fn check_initial_pseudo_state(builder: &DocumentBuilder, state: &crate::document::State, errors: &mut Vec<ValidationError>) {
    if let Some(transition) = &state.initial_transition {
        if transition.targets.is_empty() {
            errors.push(ValidationError::InitialPseudoStateMissingTransition {
                state: state.id.clone(),
            });
            return;
        }
        for &target in &transition.targets {
            let target_state = builder.state(target);
            if target_state.parent != Some(state.index) {
                errors.push(ValidationError::InitialPseudoStateTargetNotDirectChild {
                    state: state.id.clone(),
                    target: target_state.id.clone(),
                });
            }
        }
    }
}

fn check_transition_targets(builder: &DocumentBuilder, state: &crate::document::State, errors: &mut Vec<ValidationError>) {
    for transition in &state.transitions {
        for &target in &transition.targets {
            // `target` is always a valid StateId here since the reader
            // resolves target strings to indices at parse time and
            // reports unresolvable names itself (ReaderError::Structure);
            // this check instead guards programmatically-built documents
            // that passed a bogus index directly.
            if target as usize >= builder.states().len() {
                errors.push(ValidationError::UnknownTransitionTarget {
                    source: state.id.clone(),
                    target: target.to_string(),
                });
            }
        }
    }
}

fn check_unreachable_states(
    builder: &DocumentBuilder,
    initial: Option<StateId>,
    top_level: &[StateId],
    warnings: &mut Vec<ValidationError>,
) {
    let mut reachable = HashSet::new();
    let mut stack: Vec<StateId> = top_level.to_vec();
    if let Some(i) = initial {
        stack.push(i);
    }
    while let Some(id) = stack.pop() {
        if !reachable.insert(id) {
            continue;
        }
        let state = builder.state(id);
        for &child in &state.children {
            stack.push(child);
        }
        for transition in &state.transitions {
            for &target in &transition.targets {
                stack.push(target);
            }
        }
        if let Some(t) = &state.initial_transition {
            for &target in &t.targets {
                stack.push(target);
            }
        }
    }
    for state in builder.states() {
        if !reachable.contains(&state.index) {
            warnings.push(ValidationError::UnreachableState { id: state.id.clone() });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentBuilder;

    #[test]
    fn duplicate_state_id_is_an_error() {
        let mut b = DocumentBuilder::new();
        b.add_state("a", StateKind::Atomic, None, 0);
        b.add_state("a", StateKind::Atomic, None, 1);
        b.top_level.push("a".to_string());
        let result = b.build();
        assert!(result.is_err());
    }

    #[test]
    fn history_outside_compound_or_parallel_is_rejected() {
        let mut b = DocumentBuilder::new();
        let a = b.add_state("a", StateKind::Atomic, None, 0);
        b.add_state(
            "h",
            StateKind::History(crate::document::HistoryType::Shallow),
            Some(a),
            1,
        );
        b.top_level.push("a".to_string());
        let errors = b.build().unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::HistoryNotDirectChildOfCompoundOrParallel { .. })));
    }

    #[test]
    fn unreachable_state_is_a_warning_not_an_error() {
        let mut b = DocumentBuilder::new();
        let a = b.add_state("a", StateKind::Atomic, None, 0);
        b.add_state("unreachable", StateKind::Atomic, None, 1);
        b.top_level.push("a".to_string());
        b.initial = Some("a".to_string());
        let _ = a;
        let (doc, warnings) = b.build().unwrap();
        assert_eq!(doc.state_count(), 2);
        assert!(warnings
            .iter()
            .any(|w| matches!(w, ValidationError::UnreachableState { id } if id == "unreachable")));
    }
}
