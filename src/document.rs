//! The immutable document model (§3, §4.A): a parsed-and-validated SCXML
//! tree plus the derived lookup tables and hierarchy cache every other
//! component consults. A [Document] is frozen once [DocumentBuilder::build]
//! succeeds; nothing in the interpreter ever mutates it afterwards, which is
//! what lets one `Document` back many independent [crate::fsm::StateChart]
//! instances.

use std::collections::HashMap;

use crate::actions::ExecutableContent;
use crate::datamodel::CompiledExpression;
use crate::error::ValidationError;
use crate::hierarchy::HierarchyCache;

/// Dense index of a [State] inside a [Document]. Using a `u32` index rather
/// than passing states by reference keeps the tree acyclic-by-construction
/// and lets the hierarchy cache use flat `Vec`s instead of hash maps for its
/// O(1) lookups (§9 "store parents by state id").
pub type StateId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryType {
    Shallow,
    Deep,
}

/// The six state kinds named in §3/§9; represented as a sum type rather than
/// a free-form tag so variant-local invariants (history type only applies to
/// `History`) are enforced by the compiler, not by convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    Atomic,
    Compound,
    Parallel,
    Final,
    History(HistoryType),
    InitialPseudo,
}

/// A transition's event descriptor: `None` means eventless ("NULL" in the
/// W3C algorithm); `Some` holds the raw whitespace-separated token string
/// matched via [crate::event::event_matches].
pub type EventDescriptor = Option<String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionType {
    External,
    Internal,
}

#[derive(Debug)]
pub struct Transition {
    pub event: EventDescriptor,
    pub cond: Option<CompiledExpression>,
    pub targets: Vec<StateId>,
    pub transition_type: TransitionType,
    pub actions: Vec<Box<dyn ExecutableContent>>,
    pub source: StateId,
    pub document_order: u32,
}

impl Transition {
    pub fn is_eventless(&self) -> bool {
        self.event.is_none()
    }

    pub fn is_targetless(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Precedence when more than one is present: expression > inline > source
/// (§3 "Data declaration").
#[derive(Debug)]
pub enum DataInit {
    Expression(CompiledExpression),
    Inline(String),
    Source(String),
}

#[derive(Debug)]
pub struct DataDeclaration {
    pub id: String,
    pub init: Option<DataInit>,
}

#[derive(Debug)]
pub struct State {
    pub id: String,
    pub index: StateId,
    pub kind: StateKind,
    /// Explicit `initial="..."` attribute, resolved to a child index.
    /// Compound states only.
    pub initial_attribute: Option<StateId>,
    /// The `<initial>` pseudo-state's own transition, if the compound state
    /// used that form instead of the attribute.
    pub initial_transition: Option<Transition>,
    pub children: Vec<StateId>,
    pub transitions: Vec<Transition>,
    pub onentry: Vec<Box<dyn ExecutableContent>>,
    pub onexit: Vec<Box<dyn ExecutableContent>>,
    pub parent: Option<StateId>,
    pub depth: u32,
    pub document_order: u32,
}

impl State {
    pub fn is_atomic(&self) -> bool {
        matches!(self.kind, StateKind::Atomic | StateKind::Final)
    }

    pub fn is_compound(&self) -> bool {
        matches!(self.kind, StateKind::Compound)
    }

    pub fn is_parallel(&self) -> bool {
        matches!(self.kind, StateKind::Parallel)
    }

    pub fn is_final(&self) -> bool {
        matches!(self.kind, StateKind::Final)
    }

    pub fn is_history(&self) -> Option<HistoryType> {
        match self.kind {
            StateKind::History(t) => Some(t),
            _ => None,
        }
    }
}

/// The frozen, shareable document (§3 "Document"). Construct via
/// [DocumentBuilder].
#[derive(Debug)]
pub struct Document {
    pub name: Option<String>,
    pub datamodel_name: Option<String>,
    pub initial: Option<StateId>,
    pub top_level: Vec<StateId>,
    pub data: Vec<DataDeclaration>,
    states: Vec<State>,
    id_to_index: HashMap<String, StateId>,
    pub hierarchy: HierarchyCache,
}

impl Document {
    pub fn state(&self, id: StateId) -> &State {
        &self.states[id as usize]
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn states(&self) -> impl Iterator<Item = &State> {
        self.states.iter()
    }

    pub fn index_of(&self, id: &str) -> Option<StateId> {
        self.id_to_index.get(id).copied()
    }

    pub fn state_by_name(&self, id: &str) -> Option<&State> {
        self.index_of(id).map(|i| self.state(i))
    }
}

/// Mutable scratch structure used while parsing/constructing a document;
/// consumed by [DocumentBuilder::build] which validates it and computes the
/// hierarchy cache, producing a frozen [Document].
#[derive(Default)]
pub struct DocumentBuilder {
    pub name: Option<String>,
    pub datamodel_name: Option<String>,
    pub initial: Option<String>,
    pub top_level: Vec<String>,
    pub data: Vec<DataDeclaration>,
    states: Vec<State>,
    id_to_index: HashMap<String, StateId>,
}

impl DocumentBuilder {
    pub fn new() -> DocumentBuilder {
        DocumentBuilder::default()
    }

    /// Registers a new state, interning its textual id to a dense
    /// [StateId]. Panics on duplicate ids from the *builder* itself only
    /// when the id was already reserved by this exact call path; true
    /// duplicate-id detection (same id used twice in the document) is a
    /// validation error, not a panic, and is reported by
    /// [crate::validator::validate].
    pub fn add_state(&mut self, id: &str, kind: StateKind, parent: Option<StateId>, document_order: u32) -> StateId {
        let depth = parent.map(|p| self.states[p as usize].depth + 1).unwrap_or(0);
        let index = self.states.len() as StateId;
        self.states.push(State {
            id: id.to_string(),
            index,
            kind,
            initial_attribute: None,
            initial_transition: None,
            children: Vec::new(),
            transitions: Vec::new(),
            onentry: Vec::new(),
            onexit: Vec::new(),
            parent,
            depth,
            document_order,
        });
        if let Some(p) = parent {
            self.states[p as usize].children.push(index);
        }
        // Last registration wins the lookup slot; duplicate detection
        // happens in the validator against the full state list.
        self.id_to_index.insert(id.to_string(), index);
        index
    }

    pub fn state_mut(&mut self, id: StateId) -> &mut State {
        &mut self.states[id as usize]
    }

    pub fn state(&self, id: StateId) -> &State {
        &self.states[id as usize]
    }

    pub fn index_of(&self, id: &str) -> Option<StateId> {
        self.id_to_index.get(id).copied()
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    /// Validates the scratch document, builds the hierarchy cache, and
    /// freezes the result. On failure, returns every accumulated error
    /// (§4.B "accumulates errors and warnings") rather than stopping at the
    /// first one.
    pub fn build(mut self) -> Result<(Document, Vec<ValidationError>), Vec<ValidationError>> {
        let initial = self.initial.as_deref().and_then(|s| self.id_to_index.get(s).copied());
        let top_level: Vec<StateId> = self
            .top_level
            .iter()
            .filter_map(|s| self.id_to_index.get(s).copied())
            .collect();

        let (mut errors, warnings) = crate::validator::validate(&self, initial, &top_level);
        if let Some(name) = &self.initial {
            if initial.is_none() {
                errors.push(ValidationError::InitialTargetUnknown {
                    state: "<scxml>".to_string(),
                    target: name.clone(),
                });
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        let hierarchy = HierarchyCache::build(&self.states);

        let doc = Document {
            name: self.name.take(),
            datamodel_name: self.datamodel_name.take(),
            initial,
            top_level,
            data: std::mem::take(&mut self.data),
            states: std::mem::take(&mut self.states),
            id_to_index: std::mem::take(&mut self.id_to_index),
            hierarchy,
        };
        Ok((doc, warnings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_assigns_dense_indices_and_depth() {
        let mut b = DocumentBuilder::new();
        b.top_level.push("a".to_string());
        let a = b.add_state("a", StateKind::Compound, None, 0);
        let c1 = b.add_state("c1", StateKind::Atomic, Some(a), 1);
        assert_eq!(a, 0);
        assert_eq!(c1, 1);
        assert_eq!(b.state(c1).depth, 1);
        assert_eq!(b.state(a).children, vec![c1]);
    }
}
