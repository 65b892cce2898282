//! The bundled evaluator (§4.F "Bundled evaluator"). Despite the name it is
//! richer than the W3C "null data model" (which supports only `In()`): it
//! adds literals, dotted paths, arithmetic and boolean operators, and array
//! literals, so test documents and examples have something to assign and
//! compare without pulling in an external scripting engine. It is wired
//! through the same [Evaluator] trait boundary as any richer engine a host
//! might substitute.

use std::collections::HashMap;
use std::sync::Mutex;

use super::expressions::{self, into_compiled};
use crate::datamodel::{CompiledExpression, Data, EvaluationContext, Evaluator, HostFunction};
use crate::error::ExpressionError;

#[derive(Debug)]
pub struct NullEvaluator {
    functions: Mutex<HashMap<String, HostFunction>>,
}

impl Default for NullEvaluator {
    fn default() -> Self {
        NullEvaluator::new()
    }
}

impl NullEvaluator {
    pub fn new() -> NullEvaluator {
        NullEvaluator {
            functions: Mutex::new(HashMap::new()),
        }
    }
}

impl Evaluator for NullEvaluator {
    fn compile(&self, source: &str) -> Result<CompiledExpression, ExpressionError> {
        let expr = expressions::compile(source)?;
        Ok(into_compiled(source, expr))
    }

    fn evaluate(&self, expr: &CompiledExpression, ctx: &EvaluationContext) -> Result<Data, ExpressionError> {
        let ast = expr
            .downcast_ref::<expressions::Expr>()
            .ok_or_else(|| ExpressionError::Evaluate {
                reason: "compiled expression was not produced by NullEvaluator".to_string(),
            })?;
        let functions = self.functions.lock().unwrap();
        expressions::evaluate(ast, ctx, &functions)
    }

    fn resolve_location(&self, source: &str, _ctx: &EvaluationContext) -> Result<Vec<String>, ExpressionError> {
        expressions::parse_location(source)
    }

    fn register_function(&mut self, name: &str, f: HostFunction) {
        self.functions.lock().unwrap().insert(name.to_string(), f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datamodel::DataStore;
    use std::sync::Arc;

    #[test]
    fn registers_and_calls_in_function() {
        let mut ev = NullEvaluator::new();
        ev.register_function(
            "In",
            Arc::new(|args: &[Data], _ctx: &EvaluationContext| match &args[0] {
                Data::String(s) if s == "a" => Ok(Data::Boolean(true)),
                _ => Ok(Data::Boolean(false)),
            }),
        );
        let compiled = ev.compile("In('a')").unwrap();
        let dm = DataStore::new();
        let cfg = vec![];
        let ctx = EvaluationContext {
            datamodel: &dm,
            event_name: None,
            event_data: None,
            configuration: &cfg,
            session_id: "s1",
            document_name: None,
        };
        assert!(ev.evaluate_condition(&compiled, &ctx));
    }

    #[test]
    fn empty_source_compiles_to_noop_null() {
        let ev = NullEvaluator::new();
        let compiled = ev.compile("").unwrap();
        let dm = DataStore::new();
        let cfg = vec![];
        let ctx = EvaluationContext {
            datamodel: &dm,
            event_name: None,
            event_data: None,
            configuration: &cfg,
            session_id: "s1",
            document_name: None,
        };
        assert_eq!(ev.evaluate(&compiled, &ctx).unwrap(), Data::Null);
    }
}
