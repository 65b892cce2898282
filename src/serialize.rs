//! JSON summary view of a [Document] (§6, the `scxml_to_fsm` tool),
//! feature-gated behind `json-config` alongside the declarative test
//! scenario format in [crate::test]. Executable content isn't
//! representable as data (it's a tree of `dyn ExecutableContent`), so a
//! transition's actions are summarized by count, not reproduced — this is
//! a diagnostic dump, not a serialization format a document could be
//! rebuilt from.

use serde::Serialize;

use crate::document::{Document, StateKind};

#[derive(Debug, Serialize)]
pub struct DocumentSummary {
    pub name: Option<String>,
    pub datamodel_name: Option<String>,
    pub initial: Option<String>,
    pub top_level: Vec<String>,
    pub data: Vec<String>,
    pub states: Vec<StateSummary>,
}

#[derive(Debug, Serialize)]
pub struct StateSummary {
    pub id: String,
    pub kind: String,
    pub parent: Option<String>,
    pub children: Vec<String>,
    pub transitions: Vec<TransitionSummary>,
    pub onentry_action_count: usize,
    pub onexit_action_count: usize,
}

#[derive(Debug, Serialize)]
pub struct TransitionSummary {
    pub event: Option<String>,
    pub has_cond: bool,
    pub targets: Vec<String>,
    pub transition_type: String,
    pub action_count: usize,
}

pub fn summarize(doc: &Document) -> DocumentSummary {
    let states = doc
        .states()
        .map(|state| StateSummary {
            id: state.id.clone(),
            kind: kind_label(&state.kind).to_string(),
            parent: state.parent.map(|p| doc.state(p).id.clone()),
            children: state.children.iter().map(|&c| doc.state(c).id.clone()).collect(),
            transitions: state
                .transitions
                .iter()
                .map(|t| TransitionSummary {
                    event: t.event.clone(),
                    has_cond: t.cond.is_some(),
                    targets: t.targets.iter().map(|&id| doc.state(id).id.clone()).collect(),
                    transition_type: format!("{:?}", t.transition_type),
                    action_count: t.actions.len(),
                })
                .collect(),
            onentry_action_count: state.onentry.len(),
            onexit_action_count: state.onexit.len(),
        })
        .collect();

    DocumentSummary {
        name: doc.name.clone(),
        datamodel_name: doc.datamodel_name.clone(),
        initial: doc.initial.map(|id| doc.state(id).id.clone()),
        top_level: doc.top_level.iter().map(|&id| doc.state(id).id.clone()).collect(),
        data: doc.data.iter().map(|d| d.id.clone()).collect(),
        states,
    }
}

fn kind_label(kind: &StateKind) -> &'static str {
    match kind {
        StateKind::Atomic => "atomic",
        StateKind::Compound => "compound",
        StateKind::Parallel => "parallel",
        StateKind::Final => "final",
        StateKind::History(crate::document::HistoryType::Shallow) => "history.shallow",
        StateKind::History(crate::document::HistoryType::Deep) => "history.deep",
        StateKind::InitialPseudo => "initial-pseudo",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentBuilder;

    #[test]
    fn summarizes_a_minimal_document() {
        let mut b = DocumentBuilder::new();
        b.add_state("a", StateKind::Atomic, None, 0);
        b.top_level.push("a".to_string());
        b.initial = Some("a".to_string());
        let (doc, _warnings) = b.build().unwrap();

        let summary = summarize(&doc);
        assert_eq!(summary.initial.as_deref(), Some("a"));
        assert_eq!(summary.states.len(), 1);
        assert_eq!(summary.states[0].kind, "atomic");
    }
}
