//! Active configuration and history snapshotting (§4.D).

use std::collections::{HashMap, HashSet};

use crate::document::{Document, HistoryType, StateId};
use crate::hierarchy;

/// The set of active *leaf* states. Ancestors are derived on demand via
/// the hierarchy cache, never stored redundantly.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Configuration {
    leaves: HashSet<StateId>,
}

impl Configuration {
    pub fn new() -> Configuration {
        Configuration::default()
    }

    pub fn from_leaves(leaves: impl IntoIterator<Item = StateId>) -> Configuration {
        Configuration {
            leaves: leaves.into_iter().collect(),
        }
    }

    pub fn leaves(&self) -> &HashSet<StateId> {
        &self.leaves
    }

    pub fn contains(&self, id: StateId) -> bool {
        self.leaves.contains(&id)
    }

    pub fn insert(&mut self, id: StateId) {
        self.leaves.insert(id);
    }

    pub fn remove(&mut self, id: StateId) {
        self.leaves.remove(&id);
    }

    /// `all_active_states(config, doc)`: union of each leaf's ancestor
    /// path, plus the leaves themselves (§4.D).
    pub fn all_active_states(&self, doc: &Document) -> HashSet<StateId> {
        let mut all = HashSet::new();
        for &leaf in &self.leaves {
            all.insert(leaf);
            all.extend(hierarchy::ancestor_path(doc, leaf).iter().copied());
        }
        all
    }

    pub fn is_active(&self, doc: &Document, id: StateId) -> bool {
        self.all_active_states(doc).contains(&id)
    }
}

/// One snapshot recorded when a compound/parallel parent is exited: its
/// active direct children (shallow) and active atomic descendants (deep).
#[derive(Debug, Clone, Default)]
pub struct HistorySnapshot {
    pub shallow: HashSet<StateId>,
    pub deep: HashSet<StateId>,
}

/// Maps a parent id to its last-recorded snapshot (§3 "HistoryTracker").
/// Overwritten on each re-exit.
#[derive(Debug, Default, Clone)]
pub struct HistoryTracker {
    snapshots: HashMap<StateId, HistorySnapshot>,
}

impl HistoryTracker {
    pub fn new() -> HistoryTracker {
        HistoryTracker::default()
    }

    /// Records the parent's currently active direct children and active
    /// atomic descendants. Must be called *before* onexit actions run
    /// (§4.D "this ordering is mandatory").
    pub fn record(&mut self, doc: &Document, parent: StateId, active_leaves: &HashSet<StateId>) {
        let parent_state = doc.state(parent);
        let shallow: HashSet<StateId> = parent_state
            .children
            .iter()
            .copied()
            .filter(|&child| {
                active_leaves
                    .iter()
                    .any(|&leaf| leaf == child || hierarchy::descendant_of(doc, leaf, child))
            })
            .collect();
        let deep: HashSet<StateId> = active_leaves
            .iter()
            .copied()
            .filter(|&leaf| leaf == parent || hierarchy::descendant_of(doc, leaf, parent))
            .collect();
        self.snapshots.insert(parent, HistorySnapshot { shallow, deep });
    }

    pub fn get(&self, parent: StateId) -> Option<&HistorySnapshot> {
        self.snapshots.get(&parent)
    }
}

/// Restores (or falls back on) the configuration reached by entering a
/// history state, per the entry rule in §4.I: "if parent has a stored
/// snapshot, restore by re-entering each stored state".
pub fn history_restore_targets(doc: &Document, history_state: StateId, history_type: HistoryType, tracker: &HistoryTracker) -> Option<Vec<StateId>> {
    let parent = doc.state(history_state).parent?;
    let snapshot = tracker.get(parent)?;
    let set = match history_type {
        HistoryType::Shallow => &snapshot.shallow,
        HistoryType::Deep => &snapshot.deep,
    };
    Some(set.iter().copied().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentBuilder, StateKind};

    fn sample() -> (Document, StateId, StateId, StateId) {
        let mut b = DocumentBuilder::new();
        let p = b.add_state("p", StateKind::Compound, None, 0);
        let c1 = b.add_state("c1", StateKind::Atomic, Some(p), 1);
        let c2 = b.add_state("c2", StateKind::Atomic, Some(p), 2);
        b.state_mut(p).initial_attribute = Some(c1);
        b.top_level.push("p".to_string());
        b.initial = Some("p".to_string());
        let (doc, _w) = b.build().unwrap();
        (doc, p, c1, c2)
    }

    #[test]
    fn all_active_states_includes_ancestors() {
        let (doc, p, c1, _c2) = sample();
        let config = Configuration::from_leaves([c1]);
        let all = config.all_active_states(&doc);
        assert!(all.contains(&c1));
        assert!(all.contains(&p));
    }

    #[test]
    fn history_round_trip_shallow() {
        let (doc, p, _c1, c2) = sample();
        let mut tracker = HistoryTracker::new();
        let active: HashSet<StateId> = [c2].into_iter().collect();
        tracker.record(&doc, p, &active);
        let snapshot = tracker.get(p).unwrap();
        assert!(snapshot.shallow.contains(&c2));
        assert!(snapshot.deep.contains(&c2));
    }
}
