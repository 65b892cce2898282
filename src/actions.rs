//! The action executor (§4.G): the concrete executable-content node types
//! (`assign`/`raise`/`log`/`if`-`elseif`-`else`/`foreach`/`send`) and the
//! trait they all implement. Grounded in the bundled tool's
//! `executable_content` module — same trait-object-per-node shape, so a
//! host embedding this crate can add its own action kinds the same way.

use std::any::Any;
use std::fmt::Debug;

use crate::datamodel::{CompiledExpression, Data, DataStore, EvaluationContext, Evaluator};
use crate::error::ActionError;
use crate::event::Event;

/// Everything an [ExecutableContent] node needs from its surrounding
/// [crate::fsm::StateChart] to run. Kept as a trait (rather than a
/// concrete struct reference) so actions.rs has no dependency on fsm.rs —
/// `StateChart` implements this.
pub trait ActionContext {
    fn evaluator(&self) -> &dyn Evaluator;
    fn datamodel(&self) -> &DataStore;
    fn datamodel_mut(&mut self) -> &mut DataStore;
    fn enqueue(&mut self, event: Event);
    fn current_event_name(&self) -> Option<&str>;
    fn current_event_data(&self) -> Option<&Data>;
    fn configuration_ids(&self) -> Vec<String>;
    fn session_id(&self) -> &str;
    fn document_name(&self) -> Option<&str>;
    fn log(&mut self, label: Option<&str>, message: String);
    fn send_external(&mut self, target: Option<&str>, event: Event) -> Result<(), ActionError>;

    /// Builds the evaluation context described in §4.F, borrowing the
    /// pieces above. Implemented once here so every action and the
    /// transition resolver build the context identically.
    fn eval_context(&self) -> EvaluationContext<'_>;
}

/// A node of executable content: `<raise>`, `<log>`, `<assign>`, `<if>`,
/// `<foreach>`, `<send>`, or a host-defined extension.
pub trait ExecutableContent: Debug {
    fn execute(&self, ctx: &mut dyn ActionContext) -> Result<(), ActionError>;
    fn as_any(&self) -> &dyn Any;
}

fn eval(expr: &CompiledExpression, ctx: &dyn ActionContext) -> Result<Data, ActionError> {
    let eval_ctx = ctx.eval_context();
    Ok(ctx.evaluator().evaluate(expr, &eval_ctx)?)
}

#[derive(Debug)]
pub struct Raise {
    pub event: String,
}

impl ExecutableContent for Raise {
    fn execute(&self, ctx: &mut dyn ActionContext) -> Result<(), ActionError> {
        ctx.enqueue(Event::internal(self.event.clone()));
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct Log {
    pub label: Option<String>,
    pub expr: Option<CompiledExpression>,
}

impl ExecutableContent for Log {
    fn execute(&self, ctx: &mut dyn ActionContext) -> Result<(), ActionError> {
        let message = match &self.expr {
            Some(expr) => eval(expr, ctx)?.to_string(),
            None => String::new(),
        };
        ctx.log(self.label.as_deref(), message);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct Assign {
    pub location: String,
    pub expr: CompiledExpression,
}

impl ExecutableContent for Assign {
    fn execute(&self, ctx: &mut dyn ActionContext) -> Result<(), ActionError> {
        let value = eval(&self.expr, ctx)?;
        let eval_ctx = ctx.eval_context();
        let path = ctx
            .evaluator()
            .resolve_location(&self.location, &eval_ctx)
            .map_err(ActionError::from)?;
        ctx.datamodel_mut()
            .assign(&path, value)
            .map_err(|_| ActionError::AssignToNonMap {
                location: self.location.clone(),
            })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// One `<if>`/`<elseif>`/`<else>` branch. `cond == None` marks the trailing
/// `<else>` branch, which always matches if reached.
#[derive(Debug)]
pub struct Branch {
    pub cond: Option<CompiledExpression>,
    pub body: Vec<Box<dyn ExecutableContent>>,
}

#[derive(Debug)]
pub struct If {
    pub branches: Vec<Branch>,
}

impl ExecutableContent for If {
    fn execute(&self, ctx: &mut dyn ActionContext) -> Result<(), ActionError> {
        for branch in &self.branches {
            let matches = match &branch.cond {
                None => true,
                Some(cond) => {
                    let eval_ctx = ctx.eval_context();
                    ctx.evaluator().evaluate_condition(cond, &eval_ctx)
                }
            };
            if matches {
                for action in &branch.body {
                    action.execute(ctx)?;
                }
                return Ok(());
            }
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct ForEach {
    pub array: CompiledExpression,
    pub item: String,
    pub index: Option<String>,
    pub body: Vec<Box<dyn ExecutableContent>>,
}

impl ExecutableContent for ForEach {
    fn execute(&self, ctx: &mut dyn ActionContext) -> Result<(), ActionError> {
        let array_value = eval(&self.array, ctx)?;
        // Snapshot the iterable at entry (§9): later mutation of the bound
        // variable inside the loop body does not affect remaining
        // iterations.
        let items: Vec<Data> = array_value.as_array().ok_or(ActionError::ForeachOverNonIterable)?.to_vec();

        let saved_item = ctx.datamodel().get(&self.item).cloned();
        let saved_index = self.index.as_ref().and_then(|i| ctx.datamodel().get(i).cloned());

        for (i, element) in items.into_iter().enumerate() {
            ctx.datamodel_mut().set(self.item.clone(), element);
            if let Some(index_name) = &self.index {
                ctx.datamodel_mut().set(index_name.clone(), Data::Integer(i as i64));
            }
            for action in &self.body {
                action.execute(ctx)?;
            }
        }

        match saved_item {
            Some(v) => ctx.datamodel_mut().set(self.item.clone(), v),
            None => {}
        }
        if let Some(index_name) = &self.index {
            if let Some(v) = saved_index {
                ctx.datamodel_mut().set(index_name.clone(), v);
            }
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct SendParam {
    pub name: String,
    pub expr: CompiledExpression,
}

/// `<send>` (§4.G): routes by target. An unspecified/internal target
/// enqueues a new event on the internal queue; a named external target is
/// delegated to the host via [ActionContext::send_external] — actual
/// network delivery is out of scope (§1).
#[derive(Debug)]
pub struct Send {
    pub event: String,
    pub target: Option<String>,
    pub params: Vec<SendParam>,
}

impl ExecutableContent for Send {
    fn execute(&self, ctx: &mut dyn ActionContext) -> Result<(), ActionError> {
        let mut fields = std::collections::HashMap::new();
        for param in &self.params {
            let value = eval(&param.expr, ctx)?;
            fields.insert(param.name.clone(), value);
        }
        let data = if fields.is_empty() { Data::Null } else { Data::Map(fields) };

        match self.target.as_deref() {
            None | Some("#_internal") => {
                ctx.enqueue(Event::internal_with_data(self.event.clone(), data));
                Ok(())
            }
            Some(target) => {
                let event = Event::external_with_data(self.event.clone(), data);
                ctx.send_external(Some(target), event)
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Executes an ordered action list, stopping at (but not swallowing) the
/// first error — per §4.G the caller is responsible for turning that error
/// into an `error.execution` event and continuing the macrostep.
pub fn execute_all(actions: &[Box<dyn ExecutableContent>], ctx: &mut dyn ActionContext) -> Result<(), ActionError> {
    for action in actions {
        action.execute(ctx)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::NullEvaluator;

    struct TestCtx {
        evaluator: NullEvaluator,
        datamodel: DataStore,
        internal: Vec<Event>,
        log_lines: Vec<String>,
    }

    impl ActionContext for TestCtx {
        fn evaluator(&self) -> &dyn Evaluator {
            &self.evaluator
        }
        fn datamodel(&self) -> &DataStore {
            &self.datamodel
        }
        fn datamodel_mut(&mut self) -> &mut DataStore {
            &mut self.datamodel
        }
        fn enqueue(&mut self, event: Event) {
            self.internal.push(event);
        }
        fn current_event_name(&self) -> Option<&str> {
            None
        }
        fn current_event_data(&self) -> Option<&Data> {
            None
        }
        fn configuration_ids(&self) -> Vec<String> {
            vec![]
        }
        fn session_id(&self) -> &str {
            "test-session"
        }
        fn document_name(&self) -> Option<&str> {
            None
        }
        fn log(&mut self, _label: Option<&str>, message: String) {
            self.log_lines.push(message);
        }
        fn send_external(&mut self, _target: Option<&str>, _event: Event) -> Result<(), ActionError> {
            Ok(())
        }
        fn eval_context(&self) -> EvaluationContext<'_> {
            EvaluationContext {
                datamodel: &self.datamodel,
                event_name: None,
                event_data: None,
                configuration: &[],
                session_id: "test-session",
                document_name: None,
            }
        }
    }

    fn test_ctx() -> TestCtx {
        TestCtx {
            evaluator: NullEvaluator::new(),
            datamodel: DataStore::new(),
            internal: Vec::new(),
            log_lines: Vec::new(),
        }
    }

    #[test]
    fn assign_writes_evaluated_value() {
        let mut ctx = test_ctx();
        let assign = Assign {
            location: "x".to_string(),
            expr: ctx.evaluator.compile("42").unwrap(),
        };
        assign.execute(&mut ctx).unwrap();
        assert_eq!(ctx.datamodel.get("x"), Some(&Data::Double(42.0)));
    }

    #[test]
    fn raise_enqueues_internal_event() {
        let mut ctx = test_ctx();
        Raise { event: "x".to_string() }.execute(&mut ctx).unwrap();
        assert_eq!(ctx.internal[0].name, "x");
    }

    #[test]
    fn foreach_restores_bindings_after_loop() {
        let mut ctx = test_ctx();
        ctx.datamodel.set("item", Data::Integer(-1));
        let body: Vec<Box<dyn ExecutableContent>> = vec![];
        let fe = ForEach {
            array: ctx.evaluator.compile("[1, 2, 3]").unwrap(),
            item: "item".to_string(),
            index: None,
            body,
        };
        fe.execute(&mut ctx).unwrap();
        assert_eq!(ctx.datamodel.get("item"), Some(&Data::Integer(-1)));
    }

    #[test]
    fn if_picks_first_true_branch() {
        let mut ctx = test_ctx();
        let log_expr = ctx.evaluator.compile("'taken'").unwrap();
        let branches = vec![
            Branch {
                cond: Some(ctx.evaluator.compile("false").unwrap()),
                body: vec![Box::new(Log {
                    label: None,
                    expr: Some(ctx.evaluator.compile("'skipped'").unwrap()),
                })],
            },
            Branch {
                cond: None,
                body: vec![Box::new(Log {
                    label: None,
                    expr: Some(log_expr),
                })],
            },
        ];
        If { branches }.execute(&mut ctx).unwrap();
        assert_eq!(ctx.log_lines, vec!["taken".to_string()]);
    }

    #[test]
    fn send_with_internal_target_enqueues() {
        let mut ctx = test_ctx();
        let send = Send {
            event: "done".to_string(),
            target: None,
            params: vec![],
        };
        send.execute(&mut ctx).unwrap();
        assert_eq!(ctx.internal[0].name, "done");
    }
}
