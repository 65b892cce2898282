//! The hierarchy cache (§4.A) and the pure analyzer functions built on top
//! of it (§4.C). Everything here is computed once, from the state list
//! alone, and is O(1) per query afterwards — only [HierarchyCache::build]
//! itself walks the tree.

use std::collections::{HashMap, HashSet};

use crate::document::{Document, State, StateId};

/// Precomputed relations over a document's state tree. Ancestor paths,
/// descendant sets, and the LCCA matrix are all built once in
/// [HierarchyCache::build] (O(N·d) where `d` is tree depth) so that every
/// analyzer query below is a single `Vec`/`HashMap` lookup.
#[derive(Debug)]
pub struct HierarchyCache {
    /// Root-to-self path for every state, indexed by [StateId].
    ancestor_paths: Vec<Vec<StateId>>,
    /// Every descendant (not just children) of each state.
    descendants: Vec<HashSet<StateId>>,
    /// Deepest compound ancestor shared by an unordered pair, if any.
    lcca: HashMap<(StateId, StateId), Option<StateId>>,
    /// Parallel ancestors of each state, outermost first.
    parallel_ancestors: Vec<Vec<StateId>>,
}

fn pair_key(a: StateId, b: StateId) -> (StateId, StateId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl HierarchyCache {
    pub fn build(states: &[State]) -> HierarchyCache {
        let n = states.len();
        let mut ancestor_paths = vec![Vec::new(); n];
        let mut parallel_ancestors = vec![Vec::new(); n];

        for s in states {
            let idx = s.index as usize;
            let mut path = Vec::new();
            let mut cur = s.parent;
            while let Some(p) = cur {
                path.push(p);
                cur = states[p as usize].parent;
            }
            path.reverse();
            let mut pars: Vec<StateId> = path
                .iter()
                .copied()
                .filter(|&a| states[a as usize].is_parallel())
                .collect();
            if s.is_parallel() {
                pars.push(s.index);
            }
            ancestor_paths[idx] = path;
            parallel_ancestors[idx] = pars;
        }

        let mut descendants = vec![HashSet::new(); n];
        for s in states {
            for &anc in &ancestor_paths[s.index as usize] {
                descendants[anc as usize].insert(s.index);
            }
        }

        let mut lcca: HashMap<(StateId, StateId), Option<StateId>> = HashMap::new();
        for a in 0..n as StateId {
            for b in a..n as StateId {
                let key = pair_key(a, b);
                if lcca.contains_key(&key) {
                    continue;
                }
                lcca.insert(key, compute_lcca(states, &ancestor_paths, a, b));
            }
        }

        HierarchyCache {
            ancestor_paths,
            descendants,
            lcca,
            parallel_ancestors,
        }
    }

    pub fn ancestor_path(&self, a: StateId) -> &[StateId] {
        &self.ancestor_paths[a as usize]
    }

    pub fn is_descendant(&self, a: StateId, b: StateId) -> bool {
        self.descendants[b as usize].contains(&a)
    }

    pub fn lcca(&self, a: StateId, b: StateId) -> Option<StateId> {
        self.lcca.get(&pair_key(a, b)).copied().flatten()
    }

    pub fn parallel_ancestors(&self, a: StateId) -> &[StateId] {
        &self.parallel_ancestors[a as usize]
    }
}

/// Self-and-ancestors path, root-first, ending at `a` itself — useful where
/// the LCCA search needs to include the candidate state as its own ancestor
/// (a compound state is its own LCCA with a descendant).
fn self_and_ancestors(ancestor_paths: &[Vec<StateId>], a: StateId) -> Vec<StateId> {
    let mut v = ancestor_paths[a as usize].clone();
    v.push(a);
    v
}

/// No wrapping `<scxml>` root state exists in this model (top-level states
/// have `parent == None`), so two states in different top-level branches
/// legitimately have no LCCA — callers treat `None` as "the whole chart is
/// in scope" (§3 "may be none").
fn compute_lcca(states: &[State], ancestor_paths: &[Vec<StateId>], a: StateId, b: StateId) -> Option<StateId> {
    let path_a = self_and_ancestors(ancestor_paths, a);
    let set_b: HashSet<StateId> = self_and_ancestors(ancestor_paths, b).into_iter().collect();
    path_a
        .into_iter()
        .rev()
        .find(|cand| set_b.contains(cand) && states[*cand as usize].is_compound())
}

/// `descendant_of?(a, b)` plus the rest of §4.C, exposed as free functions
/// taking a [Document] so call sites read the way the specification states
/// them rather than going through `doc.hierarchy.*` everywhere.
pub fn descendant_of(doc: &Document, a: StateId, b: StateId) -> bool {
    doc.hierarchy.is_descendant(a, b)
}

pub fn ancestor_path(doc: &Document, a: StateId) -> &[StateId] {
    doc.hierarchy.ancestor_path(a)
}

pub fn lcca(doc: &Document, a: StateId, b: StateId) -> Option<StateId> {
    doc.hierarchy.lcca(a, b)
}

pub fn parallel_ancestors(doc: &Document, a: StateId) -> &[StateId] {
    doc.hierarchy.parallel_ancestors(a)
}

/// True iff some shared parallel ancestor places `a` and `b` in different
/// direct-child regions.
pub fn in_different_parallel_regions(doc: &Document, a: StateId, b: StateId) -> bool {
    for &par in parallel_ancestors(doc, a) {
        if !parallel_ancestors(doc, b).contains(&par) {
            continue;
        }
        let region_of = |x: StateId| -> Option<StateId> {
            let path = self_and_ancestors_pub(doc, x);
            let par_pos = path.iter().position(|&s| s == par)?;
            path.get(par_pos + 1).copied()
        };
        match (region_of(a), region_of(b)) {
            (Some(ra), Some(rb)) if ra != rb => return true,
            _ => {}
        }
    }
    false
}

fn self_and_ancestors_pub(doc: &Document, a: StateId) -> Vec<StateId> {
    let mut v = ancestor_path(doc, a).to_vec();
    v.push(a);
    v
}

/// True iff any parallel ancestor of `source` is not an ancestor of
/// `target` and is not `target` itself — i.e. the transition's scope
/// escapes a parallel region.
pub fn exits_parallel_region(doc: &Document, source: StateId, target: StateId) -> bool {
    let target_path = ancestor_path(doc, target);
    parallel_ancestors(doc, source)
        .iter()
        .any(|&par| par != target && !target_path.contains(&par))
}

/// Unique ancestors of the given exiting states that themselves have at
/// least one history child (§4.C `parents_with_history`).
pub fn parents_with_history(doc: &Document, exiting: &[StateId]) -> Vec<StateId> {
    let mut seen = HashSet::new();
    let mut result = Vec::new();
    for &s in exiting {
        for &anc in self_and_ancestors_pub(doc, s).iter() {
            if seen.contains(&anc) {
                continue;
            }
            if doc
                .state(anc)
                .children
                .iter()
                .any(|&c| doc.state(c).is_history().is_some())
            {
                seen.insert(anc);
                result.push(anc);
            }
        }
    }
    result
}
