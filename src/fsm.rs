//! The interpreter loop (§4.I) and the mutable execution carrier it drives
//! (§3 "StateChart"). Everything else in this crate is a pure function or
//! an immutable cache; `StateChart` is the one place state actually
//! changes, and it changes in exactly the steps described there: compute an
//! optimal transition set, compute its exit/entry scope, run actions in
//! exit -> transition -> entry order, replace the configuration, drain
//! eventless and internal-event microsteps until quiescence.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[cfg(test)]
use std::{println as info, println as warn};

#[cfg(not(test))]
use log::{info, warn};

use crate::actions::{self, ActionContext};
use crate::configuration::{Configuration, HistoryTracker};
use crate::datamodel::{Data, DataStore, EvaluationContext, Evaluator, HostFunction};
use crate::document::{DataInit, Document, StateId, StateKind, Transition};
use crate::error::ActionError;
use crate::event::{Event, EventQueues};
use crate::evaluator::NullEvaluator;
use crate::hierarchy;
use crate::resolver;
use crate::tracer::{DefaultTracer, Tracer};

/// Ceiling on microstep iterations per macrostep: bounds work done for one
/// `send_event` call and guards against eventless-transition cycles that
/// would otherwise loop forever.
pub const DEFAULT_MICROSTEP_CEILING: u32 = 1000;

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Process-wide monotonic counter used when the caller doesn't supply a
/// session id. A host that needs cross-process uniqueness should pass
/// [InitOptions::session_id] itself rather than rely on this default.
fn generate_session_id() -> String {
    format!("session-{}", SESSION_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// The one host function the interpreter itself requires: `In(state_id)`
/// reads straight from the per-evaluation `_configuration`, so it needs no
/// reference back into the state chart itself.
fn in_state_function() -> HostFunction {
    Arc::new(|args: &[Data], ctx: &EvaluationContext| {
        let id = match args.first() {
            Some(Data::String(s)) => s.as_str(),
            _ => return Ok(Data::Boolean(false)),
        };
        Ok(Data::Boolean(ctx.configuration.iter().any(|c| c == id)))
    })
}

/// Options accepted by [StateChart::initialize] (§4.L "Programmatic
/// options"): which evaluator and tracer to wire in, the microstep
/// ceiling, and an optional caller-supplied session id.
pub struct InitOptions {
    pub evaluator: Box<dyn Evaluator>,
    pub tracer: Box<dyn Tracer>,
    pub microstep_ceiling: u32,
    pub session_id: Option<String>,
}

impl Default for InitOptions {
    fn default() -> InitOptions {
        InitOptions {
            evaluator: Box::new(NullEvaluator::new()),
            tracer: Box::new(DefaultTracer::new()),
            microstep_ceiling: DEFAULT_MICROSTEP_CEILING,
            session_id: None,
        }
    }
}

impl InitOptions {
    pub fn with_evaluator(evaluator: Box<dyn Evaluator>) -> InitOptions {
        InitOptions {
            evaluator,
            ..InitOptions::default()
        }
    }
}

/// The mutable execution carrier (§3 "StateChart"). One [Document] (frozen,
/// `Arc`-shared) can back many independent `StateChart`s; everything that
/// changes during a run lives here instead.
pub struct StateChart {
    document: Arc<Document>,
    configuration: Configuration,
    configuration_names: Vec<String>,
    history: HistoryTracker,
    datamodel: DataStore,
    queues: EventQueues,
    current_event: Option<Event>,
    evaluator: Box<dyn Evaluator>,
    tracer: Box<dyn Tracer>,
    session_id: String,
    microstep_ceiling: u32,
}

impl StateChart {
    /// Computes the initial configuration, runs onentry for every state
    /// entered along the way, then drains the initial macrostep exactly
    /// like any other.
    pub fn initialize(document: Arc<Document>, mut options: InitOptions) -> StateChart {
        options.evaluator.register_function("In", in_state_function());
        let session_id = options.session_id.unwrap_or_else(generate_session_id);

        let mut chart = StateChart {
            document,
            configuration: Configuration::new(),
            configuration_names: Vec::new(),
            history: HistoryTracker::new(),
            datamodel: DataStore::new(),
            queues: EventQueues::new(),
            current_event: None,
            evaluator: options.evaluator,
            tracer: options.tracer,
            session_id,
            microstep_ceiling: options.microstep_ceiling,
        };

        chart.initialize_datamodel();

        let root = chart.document.initial.or_else(|| chart.document.top_level.first().copied());
        if let Some(root) = root {
            let mut entered = Vec::new();
            let leaves = chart.resolve_entry(root, &mut entered);
            chart.configuration = Configuration::from_leaves(leaves);
            chart.refresh_configuration_names();

            entered.sort_by_key(|&id| chart.document.state(id).document_order);
            entered.dedup();
            for state_id in entered {
                chart.run_onentry(state_id);
            }
        }

        chart.run_microsteps();
        chart
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The active *leaf* set only.
    pub fn active_leaf_states(&self) -> HashSet<String> {
        self.configuration
            .leaves()
            .iter()
            .map(|&id| self.document.state(id).id.clone())
            .collect()
    }

    /// Leaves plus every ancestor.
    pub fn all_active_states(&self) -> HashSet<String> {
        self.configuration_names.iter().cloned().collect()
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.configuration_names.iter().any(|s| s == id)
    }

    /// Finds transitions enabled by `event` (a non-matching event just
    /// falls through to the microstep drain and leaves the chart
    /// unchanged), executes them as one microstep, then drains
    /// eventless/internal microsteps to quiescence.
    pub fn send_event(&mut self, event: Event) {
        self.tracer.trace_event(&self.session_id, &event.name);
        self.current_event = Some(event.clone());

        let doc = Arc::clone(&self.document);
        let eval_ctx = self.eval_context();
        let selected = resolver::select_transitions(&doc, &self.configuration, self.evaluator.as_ref(), &eval_ctx, Some(&event));
        if !selected.is_empty() {
            self.execute_transition_set(&selected);
        }
        self.run_microsteps();
    }

    /// The microstep loop: eventless transitions strictly precede internal
    /// event consumption at every boundary; bounded by
    /// [Self::microstep_ceiling] so a misbehaving document can't hang the
    /// caller.
    fn run_microsteps(&mut self) {
        let mut iterations: u32 = 0;
        loop {
            if iterations >= self.microstep_ceiling {
                warn!(
                    "[{}] microstep ceiling ({}) reached; halting at last consistent configuration",
                    self.session_id, self.microstep_ceiling
                );
                break;
            }
            iterations += 1;

            let doc = Arc::clone(&self.document);
            let eval_ctx = self.eval_context();
            let eventless = resolver::select_transitions(&doc, &self.configuration, self.evaluator.as_ref(), &eval_ctx, None);
            if !eventless.is_empty() {
                self.execute_transition_set(&eventless);
                continue;
            }

            match self.queues.dequeue_internal() {
                Some(event) => {
                    self.current_event = Some(event.clone());
                    let doc = Arc::clone(&self.document);
                    let eval_ctx = self.eval_context();
                    let enabled = resolver::select_transitions(&doc, &self.configuration, self.evaluator.as_ref(), &eval_ctx, Some(&event));
                    if !enabled.is_empty() {
                        self.execute_transition_set(&enabled);
                    }
                }
                None => break,
            }
        }
    }

    /// Executes one optimal transition set. Targetless transitions run
    /// their actions only; targeted transitions additionally compute and
    /// apply an exit/entry scope. The configuration is replaced once, at
    /// the end, by value: history is recorded and the exit set still
    /// counts as active while its onexit and the transitions' own actions
    /// run, and the entry set isn't counted active until after its
    /// onentry has run.
    fn execute_transition_set(&mut self, transitions: &[&Transition]) {
        let targeted: Vec<&Transition> = transitions.iter().copied().filter(|t| !t.is_targetless()).collect();

        let exit_set = self.compute_exit_set(&targeted);
        let (new_leaves, entry_set) = self.compute_entry(&targeted);

        let active_before: HashSet<StateId> = self.configuration.leaves().clone();
        for parent in hierarchy::parents_with_history(&self.document, &exit_set) {
            self.history.record(&self.document, parent, &active_before);
        }

        for &state_id in &exit_set {
            self.run_onexit(state_id);
        }

        let mut ordered: Vec<&Transition> = transitions.to_vec();
        ordered.sort_by_key(|t| t.document_order);
        for t in ordered {
            if let Err(e) = actions::execute_all(&t.actions, self) {
                self.report_action_error(e);
            }
        }

        for &state_id in &entry_set {
            self.run_onentry(state_id);
        }

        for &leaf in &exit_set {
            self.configuration.remove(leaf);
        }
        for &leaf in &new_leaves {
            self.configuration.insert(leaf);
        }
        self.refresh_configuration_names();
    }

    /// Exit-set computation: a currently active leaf belongs to the exit
    /// set if any selected (targeted) transition's scope reaches it, by
    /// any of four rules: (i) it is the transition's own source and not
    /// its LCCA with the target; (ii) it is a descendant of the source;
    /// (iii) it sits in a parallel sibling region the transition leaves;
    /// (iv) it is a descendant of the source/target LCCA that is neither
    /// an ancestor nor a descendant of the target.
    fn compute_exit_set(&self, transitions: &[&Transition]) -> Vec<StateId> {
        let doc = &self.document;
        let mut exit = HashSet::new();
        for &leaf in self.configuration.leaves() {
            'transition_loop: for &t in transitions {
                for &target in &t.targets {
                    let lcca_st = hierarchy::lcca(doc, t.source, target);
                    let rule_i = leaf == t.source && Some(leaf) != lcca_st;
                    let rule_ii = hierarchy::descendant_of(doc, leaf, t.source);
                    let rule_iii = hierarchy::exits_parallel_region(doc, t.source, target)
                        && hierarchy::in_different_parallel_regions(doc, leaf, t.source);
                    let rule_iv = match lcca_st {
                        Some(l) => {
                            hierarchy::descendant_of(doc, leaf, l)
                                && leaf != target
                                && !hierarchy::descendant_of(doc, leaf, target)
                                && !hierarchy::descendant_of(doc, target, leaf)
                        }
                        None => false,
                    };
                    if rule_i || rule_ii || rule_iii || rule_iv {
                        exit.insert(leaf);
                        break 'transition_loop;
                    }
                }
            }
        }
        let mut v: Vec<StateId> = exit.into_iter().collect();
        v.sort_by_key(|&id| std::cmp::Reverse(doc.state(id).document_order));
        v
    }

    /// Entry-set computation: for each target, the ancestor path up to
    /// (excluding) its pairwise LCCA with the transition's source, plus the
    /// target's own entry recursion. Returns the new leaves and the full
    /// set of states entered (for onentry ordering); purely read-only
    /// against the document and history so far, since the actual
    /// configuration mutation happens in the caller.
    fn compute_entry(&self, transitions: &[&Transition]) -> (Vec<StateId>, Vec<StateId>) {
        let mut entered = Vec::new();
        let mut leaves = Vec::new();
        for &t in transitions {
            for &target in &t.targets {
                let lcca_st = hierarchy::lcca(&self.document, t.source, target);
                for &anc in hierarchy::ancestor_path(&self.document, target) {
                    if Some(anc) == lcca_st {
                        continue;
                    }
                    if let Some(l) = lcca_st {
                        if !hierarchy::descendant_of(&self.document, anc, l) {
                            continue;
                        }
                    }
                    if !entered.contains(&anc) {
                        entered.push(anc);
                    }
                }
                leaves.extend(self.resolve_entry(target, &mut entered));
            }
        }
        entered.sort_by_key(|&id| self.document.state(id).document_order);
        entered.dedup();
        (leaves, entered)
    }

    /// Entry rules by state kind, also used to resolve transition targets:
    /// atomic/final are leaves; compound recurses into its resolved
    /// initial child; parallel recurses into every child; history
    /// restores a snapshot or falls back to its default transition's
    /// targets; the `<initial>` pseudo-state is never directly entered.
    /// Pushes every *real* state entered (not history or initial
    /// pseudo-states) into `entered`, in encounter order.
    fn resolve_entry(&self, state_id: StateId, entered: &mut Vec<StateId>) -> Vec<StateId> {
        let state = self.document.state(state_id);
        match state.kind {
            StateKind::Atomic | StateKind::Final => {
                entered.push(state_id);
                vec![state_id]
            }
            StateKind::Compound => {
                entered.push(state_id);
                let child = self.resolve_initial_child(state_id);
                self.resolve_entry(child, entered)
            }
            StateKind::Parallel => {
                entered.push(state_id);
                let children = state.children.clone();
                let mut leaves = Vec::new();
                for child in children {
                    leaves.extend(self.resolve_entry(child, entered));
                }
                leaves
            }
            StateKind::History(history_type) => {
                let parent = state.parent;
                let targets = crate::configuration::history_restore_targets(&self.document, state_id, history_type, &self.history)
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| state.transitions.first().map(|t| t.targets.clone()).unwrap_or_default());
                let mut leaves = Vec::new();
                for target in targets {
                    // A deep snapshot stores atomic descendants, which may sit
                    // several levels below the history's parent; shallow
                    // restores land on a direct child and need none of this,
                    // but deep restores must still re-enter every compound
                    // state strictly between the parent and the target.
                    if let Some(parent) = parent {
                        for &anc in hierarchy::ancestor_path(&self.document, target) {
                            if anc != parent && hierarchy::descendant_of(&self.document, anc, parent) && !entered.contains(&anc) {
                                entered.push(anc);
                            }
                        }
                    }
                    leaves.extend(self.resolve_entry(target, entered));
                }
                leaves
            }
            StateKind::InitialPseudo => Vec::new(),
        }
    }

    /// Resolves a compound state's initial child: explicit
    /// `initial="..."` attribute, else the `<initial>` pseudo-state's
    /// transition target, else the first non-pseudo child. The final
    /// fallback relies on an invariant the validator enforces (every
    /// compound state has at least one non-initial-pseudo child); a
    /// document that reached here without one could only have been built
    /// by hand, bypassing the builder's validation.
    fn resolve_initial_child(&self, state_id: StateId) -> StateId {
        let state = self.document.state(state_id);
        if let Some(attr) = state.initial_attribute {
            return attr;
        }
        if let Some(t) = &state.initial_transition {
            if let Some(&first) = t.targets.first() {
                return first;
            }
        }
        state
            .children
            .iter()
            .copied()
            .find(|&c| !matches!(self.document.state(c).kind, StateKind::InitialPseudo))
            .expect("validated compound state has a non-initial child")
    }

    fn run_onentry(&mut self, state_id: StateId) {
        let doc = Arc::clone(&self.document);
        let state = doc.state(state_id);
        self.tracer.trace_state_entered(&self.session_id, &state.id);
        if let Err(e) = actions::execute_all(&state.onentry, self) {
            self.report_action_error(e);
        }
    }

    fn run_onexit(&mut self, state_id: StateId) {
        let doc = Arc::clone(&self.document);
        let state = doc.state(state_id);
        self.tracer.trace_state_exited(&self.session_id, &state.id);
        if let Err(e) = actions::execute_all(&state.onexit, self) {
            self.report_action_error(e);
        }
    }

    /// Action failures generate `error.execution` and never abort the
    /// macrostep.
    fn report_action_error(&mut self, error: ActionError) {
        self.queues.enqueue(Event::execution_error(error.to_string()));
    }

    /// Initializes the datamodel from `<data>` declarations: expression >
    /// inline > source precedence; a failed initialization binds an empty
    /// value and raises `error.execution`. `src="..."` is always a failure
    /// here — loading from external URLs is explicitly out of scope.
    fn initialize_datamodel(&mut self) {
        let doc = Arc::clone(&self.document);
        for decl in &doc.data {
            let outcome: Result<Data, String> = match &decl.init {
                Some(DataInit::Expression(expr)) => {
                    let ctx = self.eval_context();
                    self.evaluator.evaluate(expr, &ctx).map_err(|e| e.to_string())
                }
                Some(DataInit::Inline(text)) => Ok(Data::String(text.clone())),
                Some(DataInit::Source(_)) => {
                    Err("<data src=...> is not supported; loading external URLs is out of scope".to_string())
                }
                None => Ok(Data::Null),
            };
            match outcome {
                Ok(value) => self.datamodel.set(decl.id.clone(), value),
                Err(reason) => {
                    self.datamodel.set(decl.id.clone(), Data::Null);
                    self.queues
                        .enqueue(Event::execution_error(format!("data '{}': {}", decl.id, reason)));
                }
            }
        }
    }

    fn refresh_configuration_names(&mut self) {
        let doc = Arc::clone(&self.document);
        let mut names: Vec<String> = self
            .configuration
            .all_active_states(&doc)
            .into_iter()
            .map(|id| doc.state(id).id.clone())
            .collect();
        names.sort();
        self.configuration_names = names;
    }
}

impl ActionContext for StateChart {
    fn evaluator(&self) -> &dyn Evaluator {
        self.evaluator.as_ref()
    }

    fn datamodel(&self) -> &DataStore {
        &self.datamodel
    }

    fn datamodel_mut(&mut self) -> &mut DataStore {
        &mut self.datamodel
    }

    fn enqueue(&mut self, event: Event) {
        self.queues.enqueue(event);
    }

    fn current_event_name(&self) -> Option<&str> {
        self.current_event.as_ref().map(|e| e.name.as_str())
    }

    fn current_event_data(&self) -> Option<&Data> {
        self.current_event.as_ref().map(|e| &e.data)
    }

    fn configuration_ids(&self) -> Vec<String> {
        self.configuration_names.clone()
    }

    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn document_name(&self) -> Option<&str> {
        self.document.name.as_deref()
    }

    fn log(&mut self, label: Option<&str>, message: String) {
        match label {
            Some(l) => info!("[{}] {}: {}", self.session_id, l, message),
            None => info!("[{}] {}", self.session_id, message),
        }
    }

    /// `<send>` to a named external processor: actual network delivery is
    /// explicitly out of scope. Every external target is reported as a
    /// communication error rather than silently dropped, so a caller
    /// embedding a real processor can see exactly which sends it still
    /// needs to wire up.
    fn send_external(&mut self, target: Option<&str>, _event: Event) -> Result<(), ActionError> {
        Err(ActionError::SendDeliveryFailed {
            reason: format!(
                "no external event I/O processor configured for target '{}'",
                target.unwrap_or("<unspecified>")
            ),
        })
    }

    fn eval_context(&self) -> EvaluationContext<'_> {
        EvaluationContext {
            datamodel: &self.datamodel,
            event_name: self.current_event.as_ref().map(|e| e.name.as_str()),
            event_data: self.current_event.as_ref().map(|e| &e.data),
            configuration: &self.configuration_names,
            session_id: &self.session_id,
            document_name: self.document.name.as_deref(),
        }
    }
}
