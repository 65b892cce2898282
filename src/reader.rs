//! The bundled XML reader (§6 "bundled reader"): streaming SCXML source to
//! [Document] construction, feature-gated behind `xml`. Grounded in the
//! bundled tool's own quick-xml-based reader, generalized from its
//! `Fsm`-building shape to build a [Document] through [DocumentBuilder]
//! instead.
//!
//! Two passes over the same source. The first (`scan_states`) registers
//! every `<state>`/`<parallel>`/`<final>`/`<history>` element so an
//! `initial="..."` attribute or a `<transition target="...">` naming a
//! sibling defined later in the document still resolves. The second
//! (`fill_content`) walks the same elements again — recognizing them by
//! the identical traversal order rather than re-deriving ids from names —
//! and attaches transitions, executable content, and data declarations now
//! that every id is known.

#![cfg(feature = "xml")]

use std::collections::HashSet;
use std::fs::File;
use std::io::Read as _;

use quick_xml::events::{BytesEnd, BytesStart, Event as XmlEvent};
use quick_xml::Reader;

use crate::actions::{Assign, Branch, ExecutableContent, ForEach, If, Log, Raise, Send, SendParam};
use crate::datamodel::{CompiledExpression, Evaluator};
use crate::document::{
    DataDeclaration, DataInit, Document, DocumentBuilder, HistoryType, StateId, StateKind, Transition, TransitionType,
};
use crate::error::{ReaderError, ValidationError};

/// Parses an SCXML document from source text, compiling every expression
/// (`cond`, data-init `expr`, `<foreach>`'s `array`, ...) through `evaluator`
/// as it is encountered. Assignment `location`s are left as raw strings —
/// those resolve lazily at execution time (§4.F), not at parse time.
pub fn read_from_str(xml: &str, evaluator: &dyn Evaluator) -> Result<(Document, Vec<ValidationError>), ReaderError> {
    let (mut builder, sequence) = scan_states(xml)?;
    fill_content(xml, &mut builder, &sequence, evaluator)?;
    builder.build().map_err(ReaderError::from)
}

/// Convenience wrapper for reading a document straight off disk.
pub fn read_from_xml_file(mut file: File, evaluator: &dyn Evaluator) -> Result<(Document, Vec<ValidationError>), ReaderError> {
    let mut xml = String::new();
    file.read_to_string(&mut xml).map_err(|e| ReaderError::Structure {
        reason: format!("failed to read document: {e}"),
    })?;
    read_from_str(&xml, evaluator)
}

fn xml_err<R>(reader: &Reader<R>, err: quick_xml::Error) -> ReaderError {
    ReaderError::Xml {
        position: reader.buffer_position() as usize,
        reason: err.to_string(),
    }
}

fn local_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn local_name_end(e: &BytesEnd) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn get_attr(e: &BytesStart, name: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name.as_bytes())
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn required_attr(e: &BytesStart, name: &str, tag: &str) -> Result<String, ReaderError> {
    get_attr(e, name).ok_or_else(|| ReaderError::Structure {
        reason: format!("<{tag}> is missing required attribute '{name}'"),
    })
}

fn structural_kind(tag: &str, e: &BytesStart) -> StateKind {
    match tag {
        "state" => StateKind::Compound,
        "parallel" => StateKind::Parallel,
        "final" => StateKind::Final,
        "history" => {
            let deep = get_attr(e, "type").as_deref() == Some("deep");
            StateKind::History(if deep { HistoryType::Deep } else { HistoryType::Shallow })
        }
        _ => unreachable!("structural_kind only called for state-like tags"),
    }
}

fn register_structural(
    builder: &mut DocumentBuilder,
    tag: &str,
    e: &BytesStart,
    parent_stack: &[StateId],
    order: &mut u32,
) -> Result<StateId, ReaderError> {
    *order += 1;
    let parent = parent_stack.last().copied();
    let id = required_attr(e, "id", tag)?;
    let kind = structural_kind(tag, e);
    let state_id = builder.add_state(&id, kind, parent, *order);
    if parent.is_none() {
        builder.top_level.push(id);
    }
    Ok(state_id)
}

/// A `<state>` with no child `<state>`/`<parallel>`/`<final>`/`<history>`
/// elements is atomic, not compound — `<state>` doesn't distinguish the two
/// syntactically, so this is only knowable once the whole element has been
/// seen.
fn downgrade_childless_compounds(builder: &mut DocumentBuilder) {
    let childless: Vec<StateId> = builder
        .states()
        .iter()
        .filter(|s| s.is_compound() && s.children.is_empty())
        .map(|s| s.index)
        .collect();
    for id in childless {
        builder.state_mut(id).kind = StateKind::Atomic;
    }
}

/// Pass 1: registers every state-like element so ids are all known before
/// pass 2 tries to resolve a reference to any of them. Returns the builder
/// plus the exact order in which state ids were assigned, so pass 2 can
/// find its way back to each one by position instead of re-deriving ids.
fn scan_states(xml: &str) -> Result<(DocumentBuilder, Vec<StateId>), ReaderError> {
    let mut reader = Reader::from_str(xml);
    let mut builder = DocumentBuilder::new();
    let mut parent_stack: Vec<StateId> = Vec::new();
    let mut sequence: Vec<StateId> = Vec::new();
    let mut order: u32 = 0;

    loop {
        let event = reader.read_event().map_err(|e| xml_err(&reader, e))?;
        match event {
            XmlEvent::Eof => break,
            XmlEvent::Start(e) => {
                let name = local_name(&e);
                match name.as_str() {
                    "scxml" => {
                        builder.name = get_attr(&e, "name");
                        builder.datamodel_name = get_attr(&e, "datamodel");
                        builder.initial = get_attr(&e, "initial");
                    }
                    "state" | "parallel" | "final" | "history" => {
                        let state_id = register_structural(&mut builder, &name, &e, &parent_stack, &mut order)?;
                        sequence.push(state_id);
                        parent_stack.push(state_id);
                    }
                    _ => {}
                }
            }
            XmlEvent::Empty(e) => {
                let name = local_name(&e);
                if matches!(name.as_str(), "state" | "parallel" | "final" | "history") {
                    let state_id = register_structural(&mut builder, &name, &e, &parent_stack, &mut order)?;
                    sequence.push(state_id);
                }
            }
            XmlEvent::End(e) => {
                let name = local_name_end(&e);
                if matches!(name.as_str(), "state" | "parallel" | "final" | "history") {
                    parent_stack.pop();
                }
            }
            _ => {}
        }
    }

    downgrade_childless_compounds(&mut builder);
    Ok((builder, sequence))
}

/// Which transition slot a parsed `<transition>` belongs in: a regular
/// entry in `State::transitions`, or the single `State::initial_transition`
/// of the state whose `<initial>` child it came from.
#[derive(Clone, Copy)]
enum TransitionOwner {
    State(StateId),
    Initial(StateId),
}

/// Content-building frames, pushed on an opening tag and popped (turned
/// into either a finished action pushed onto whatever sank beneath it, or
/// a piece of a [Transition]/[DataDeclaration] attached straight to the
/// builder) on the matching close.
enum Node {
    OnEntry(StateId, Vec<Box<dyn ExecutableContent>>),
    OnExit(StateId, Vec<Box<dyn ExecutableContent>>),
    Transition {
        owner: TransitionOwner,
        event: Option<String>,
        cond: Option<String>,
        targets: Vec<String>,
        transition_type: TransitionType,
        document_order: u32,
        actions: Vec<Box<dyn ExecutableContent>>,
    },
    If {
        branches: Vec<Branch>,
        cur_cond: Option<String>,
        cur_body: Vec<Box<dyn ExecutableContent>>,
    },
    ForEach {
        array: String,
        item: String,
        index: Option<String>,
        body: Vec<Box<dyn ExecutableContent>>,
    },
    Send {
        event: String,
        target: Option<String>,
        params: Vec<SendParam>,
    },
    Data {
        id: String,
        expr: Option<String>,
        src: Option<String>,
        text: String,
    },
}

/// Pass 2's running state. Holds everything `on_open`/`on_close` need so
/// neither has to thread a dozen separate `&mut` parameters.
struct ContentReader<'a> {
    builder: &'a mut DocumentBuilder,
    sequence: &'a [StateId],
    evaluator: &'a dyn Evaluator,
    cursor: usize,
    state_stack: Vec<StateId>,
    content: Vec<Node>,
    skip_stack: Vec<Vec<u8>>,
    pending_initial_parent: Option<StateId>,
    seen_initial: HashSet<StateId>,
    validation_errors: Vec<ValidationError>,
    doc_order: u32,
}

impl<'a> ContentReader<'a> {
    fn compile(&self, source: &str) -> Result<CompiledExpression, ReaderError> {
        self.evaluator.compile(source).map_err(|e| ReaderError::Structure { reason: e.to_string() })
    }

    fn next_structural(&mut self) -> Result<StateId, ReaderError> {
        let id = self.sequence.get(self.cursor).copied().ok_or_else(|| ReaderError::Structure {
            reason: "structural element mismatch between reader passes".to_string(),
        })?;
        self.cursor += 1;
        Ok(id)
    }

    fn resolve_targets(&self, source: StateId, names: &[String]) -> Result<Vec<StateId>, ReaderError> {
        names
            .iter()
            .map(|name| {
                self.builder.index_of(name).ok_or_else(|| ReaderError::Structure {
                    reason: format!(
                        "transition from '{}' targets unknown state '{}'",
                        self.builder.state(source).id,
                        name
                    ),
                })
            })
            .collect()
    }

    fn push_action(&mut self, action: Box<dyn ExecutableContent>) {
        match self.content.last_mut() {
            Some(Node::OnEntry(_, actions)) => actions.push(action),
            Some(Node::OnExit(_, actions)) => actions.push(action),
            Some(Node::Transition { actions, .. }) => actions.push(action),
            Some(Node::If { cur_body, .. }) => cur_body.push(action),
            Some(Node::ForEach { body, .. }) => body.push(action),
            _ => {}
        }
    }

    /// Finalizes the branch-in-progress at the top of an `<if>` frame and
    /// starts a new one, for an `<elseif>`/`<else>` marker. `next_cond` is
    /// `None` for `<else>`.
    fn switch_branch(&mut self, next_cond: Option<String>) -> Result<(), ReaderError> {
        let (old_cond, old_body) = match self.content.last_mut() {
            Some(Node::If { cur_cond, cur_body, .. }) => (std::mem::take(cur_cond), std::mem::take(cur_body)),
            _ => {
                return Err(ReaderError::Structure {
                    reason: "<elseif>/<else> outside <if>".to_string(),
                })
            }
        };
        let compiled_cond = old_cond.map(|src| self.compile(&src)).transpose()?;
        if let Some(Node::If { branches, cur_cond, .. }) = self.content.last_mut() {
            branches.push(Branch {
                cond: compiled_cond,
                body: old_body,
            });
            *cur_cond = next_cond;
        }
        Ok(())
    }

    fn on_open(&mut self, name: &str, e: &BytesStart, is_empty: bool) -> Result<(), ReaderError> {
        match name {
            "state" | "parallel" | "final" | "history" => {
                let state_id = self.next_structural()?;
                if let Some(init) = get_attr(e, "initial") {
                    if let Some(target) = self.builder.index_of(&init) {
                        self.builder.state_mut(state_id).initial_attribute = Some(target);
                    }
                }
                self.state_stack.push(state_id);
            }
            "initial" => {
                let parent = *self.state_stack.last().ok_or_else(|| ReaderError::Structure {
                    reason: "<initial> outside a state".to_string(),
                })?;
                if !self.seen_initial.insert(parent) {
                    self.validation_errors.push(ValidationError::MultipleInitialElements {
                        state: self.builder.state(parent).id.clone(),
                    });
                }
                self.pending_initial_parent = Some(parent);
            }
            "datamodel" => {}
            "data" => {
                self.content.push(Node::Data {
                    id: required_attr(e, "id", "data")?,
                    expr: get_attr(e, "expr"),
                    src: get_attr(e, "src"),
                    text: String::new(),
                });
            }
            "transition" => {
                self.doc_order += 1;
                let owner = match self.pending_initial_parent {
                    Some(p) => TransitionOwner::Initial(p),
                    None => TransitionOwner::State(*self.state_stack.last().ok_or_else(|| ReaderError::Structure {
                        reason: "<transition> outside a state".to_string(),
                    })?),
                };
                let targets = get_attr(e, "target")
                    .map(|t| t.split_whitespace().map(str::to_string).collect())
                    .unwrap_or_default();
                let transition_type = match get_attr(e, "type").as_deref() {
                    Some("internal") => TransitionType::Internal,
                    _ => TransitionType::External,
                };
                self.content.push(Node::Transition {
                    owner,
                    event: get_attr(e, "event"),
                    cond: get_attr(e, "cond"),
                    targets,
                    transition_type,
                    document_order: self.doc_order,
                    actions: Vec::new(),
                });
            }
            "onentry" => {
                let state = *self.state_stack.last().ok_or_else(|| ReaderError::Structure {
                    reason: "<onentry> outside a state".to_string(),
                })?;
                self.content.push(Node::OnEntry(state, Vec::new()));
            }
            "onexit" => {
                let state = *self.state_stack.last().ok_or_else(|| ReaderError::Structure {
                    reason: "<onexit> outside a state".to_string(),
                })?;
                self.content.push(Node::OnExit(state, Vec::new()));
            }
            "raise" => {
                let event = required_attr(e, "event", "raise")?;
                self.push_action(Box::new(Raise { event }));
            }
            "log" => {
                let label = get_attr(e, "label");
                let expr = get_attr(e, "expr").map(|src| self.compile(&src)).transpose()?;
                self.push_action(Box::new(Log { label, expr }));
            }
            "assign" => {
                let location = required_attr(e, "location", "assign")?;
                let expr = self.compile(&required_attr(e, "expr", "assign")?)?;
                self.push_action(Box::new(Assign { location, expr }));
            }
            "if" => {
                self.content.push(Node::If {
                    branches: Vec::new(),
                    cur_cond: Some(required_attr(e, "cond", "if")?),
                    cur_body: Vec::new(),
                });
            }
            "elseif" => self.switch_branch(Some(required_attr(e, "cond", "elseif")?))?,
            "else" => self.switch_branch(None)?,
            "foreach" => {
                self.content.push(Node::ForEach {
                    array: required_attr(e, "array", "foreach")?,
                    item: required_attr(e, "item", "foreach")?,
                    index: get_attr(e, "index"),
                    body: Vec::new(),
                });
            }
            "send" => {
                self.content.push(Node::Send {
                    event: required_attr(e, "event", "send")?,
                    target: get_attr(e, "target"),
                    params: Vec::new(),
                });
            }
            "param" => {
                let name = required_attr(e, "name", "param")?;
                let expr = self.compile(&required_attr(e, "expr", "param")?)?;
                if let Some(Node::Send { params, .. }) = self.content.last_mut() {
                    params.push(SendParam { name, expr });
                }
            }
            // <script>, <invoke>, <finalize>, <content>, <donedata>: out of
            // scope (§1 Non-goals) but still need their subtree skipped so
            // arbitrary nested markup or text doesn't confuse the reader.
            "script" | "invoke" | "finalize" | "content" | "donedata" if !is_empty => {
                self.skip_stack.push(name.as_bytes().to_vec());
            }
            _ => {}
        }
        Ok(())
    }

    fn on_close(&mut self, name: &str) -> Result<(), ReaderError> {
        match name {
            "state" | "parallel" | "final" | "history" => {
                self.state_stack.pop();
            }
            "initial" => {
                self.pending_initial_parent = None;
            }
            "data" => {
                if matches!(self.content.last(), Some(Node::Data { .. })) {
                    if let Some(Node::Data { id, expr, src, text }) = self.content.pop() {
                        let init = if let Some(src_expr) = expr {
                            Some(DataInit::Expression(self.compile(&src_expr)?))
                        } else if !text.trim().is_empty() {
                            Some(DataInit::Inline(text))
                        } else {
                            src.map(DataInit::Source)
                        };
                        self.builder.data.push(DataDeclaration { id, init });
                    }
                }
            }
            "transition" => {
                if matches!(self.content.last(), Some(Node::Transition { .. })) {
                    if let Some(Node::Transition {
                        owner,
                        event,
                        cond,
                        targets,
                        transition_type,
                        document_order,
                        actions,
                    }) = self.content.pop()
                    {
                        let source = match owner {
                            TransitionOwner::State(s) => s,
                            TransitionOwner::Initial(s) => s,
                        };
                        let resolved_targets = self.resolve_targets(source, &targets)?;
                        let cond = cond.map(|src| self.compile(&src)).transpose()?;
                        let transition = Transition {
                            event,
                            cond,
                            targets: resolved_targets,
                            transition_type,
                            actions,
                            source,
                            document_order,
                        };
                        match owner {
                            TransitionOwner::State(_) => self.builder.state_mut(source).transitions.push(transition),
                            TransitionOwner::Initial(_) => self.builder.state_mut(source).initial_transition = Some(transition),
                        }
                    }
                }
            }
            "onentry" => {
                if let Some(Node::OnEntry(state, actions)) = self.content.pop() {
                    self.builder.state_mut(state).onentry.extend(actions);
                }
            }
            "onexit" => {
                if let Some(Node::OnExit(state, actions)) = self.content.pop() {
                    self.builder.state_mut(state).onexit.extend(actions);
                }
            }
            "if" => {
                if let Some(Node::If { mut branches, cur_cond, cur_body }) = self.content.pop() {
                    let cond = cur_cond.map(|src| self.compile(&src)).transpose()?;
                    branches.push(Branch { cond, body: cur_body });
                    self.push_action(Box::new(If { branches }));
                }
            }
            "foreach" => {
                if let Some(Node::ForEach { array, item, index, body }) = self.content.pop() {
                    let array = self.compile(&array)?;
                    self.push_action(Box::new(ForEach { array, item, index, body }));
                }
            }
            "send" => {
                if let Some(Node::Send { event, target, params }) = self.content.pop() {
                    self.push_action(Box::new(Send { event, target, params }));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn fill_content(
    xml: &str,
    builder: &mut DocumentBuilder,
    sequence: &[StateId],
    evaluator: &dyn Evaluator,
) -> Result<(), ReaderError> {
    let mut reader = Reader::from_str(xml);
    let mut rd = ContentReader {
        builder,
        sequence,
        evaluator,
        cursor: 0,
        state_stack: Vec::new(),
        content: Vec::new(),
        skip_stack: Vec::new(),
        pending_initial_parent: None,
        seen_initial: HashSet::new(),
        validation_errors: Vec::new(),
        doc_order: 0,
    };

    loop {
        let event = reader.read_event().map_err(|e| xml_err(&reader, e))?;
        match event {
            XmlEvent::Eof => break,
            XmlEvent::Start(e) => {
                if !rd.skip_stack.is_empty() {
                    rd.skip_stack.push(e.name().as_ref().to_vec());
                    continue;
                }
                let name = local_name(&e);
                rd.on_open(&name, &e, false)?;
            }
            XmlEvent::Empty(e) => {
                if !rd.skip_stack.is_empty() {
                    continue;
                }
                let name = local_name(&e);
                rd.on_open(&name, &e, true)?;
                rd.on_close(&name)?;
            }
            XmlEvent::End(e) => {
                if !rd.skip_stack.is_empty() {
                    if rd.skip_stack.last().map(|v| v.as_slice()) == Some(e.name().as_ref()) {
                        rd.skip_stack.pop();
                    }
                    continue;
                }
                let name = local_name_end(&e);
                rd.on_close(&name)?;
            }
            XmlEvent::Text(t) => {
                if rd.skip_stack.is_empty() {
                    if let Some(Node::Data { text, .. }) = rd.content.last_mut() {
                        text.push_str(&t.unescape().unwrap_or_default());
                    }
                }
            }
            XmlEvent::CData(t) => {
                if rd.skip_stack.is_empty() {
                    if let Some(Node::Data { text, .. }) = rd.content.last_mut() {
                        text.push_str(&String::from_utf8_lossy(&t.into_inner()));
                    }
                }
            }
            _ => {}
        }
    }

    if !rd.validation_errors.is_empty() {
        return Err(ReaderError::Validation(rd.validation_errors));
    }
    Ok(())
}
