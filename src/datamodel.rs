//! The universal value type, the datamodel store, and the evaluator
//! plug-in boundary (§4.F). The interpreter core depends only on the
//! [Evaluator] trait's four operations; [crate::evaluator::null::NullEvaluator]
//! is the one concrete implementation this crate ships.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::ExpressionError;

/// The value type datamodel variables, event data, and expression results
/// are expressed in. Mirrors the bundled data model's own `Data` enum
/// (Integer/Double/String/Boolean/Array/Map/Null), kept deliberately small
/// since the core only needs a value type the evaluator boundary can move
/// through, not a general-purpose scripting runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Array(Vec<Data>),
    Map(HashMap<String, Data>),
}

impl Data {
    pub fn as_map(&self) -> Option<&HashMap<String, Data>> {
        match self {
            Data::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut HashMap<String, Data>> {
        match self {
            Data::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Data]> {
        match self {
            Data::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Only a strict boolean `true` counts as a passing guard (§9 design
    /// note: "this design treats only strict Boolean `true` as pass").
    pub fn is_strictly_true(&self) -> bool {
        matches!(self, Data::Boolean(true))
    }
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Data::Null => write!(f, "null"),
            Data::Boolean(b) => write!(f, "{b}"),
            Data::Integer(i) => write!(f, "{i}"),
            Data::Double(d) => write!(f, "{d}"),
            Data::String(s) => write!(f, "{s}"),
            Data::Array(a) => {
                write!(f, "[")?;
                for (i, v) in a.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Data::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// The datamodel itself: a flat map of top-level variable names to values,
/// nested arbitrarily through [Data::Map]/[Data::Array] (§3 "StateChart").
#[derive(Debug, Default, Clone)]
pub struct DataStore {
    values: HashMap<String, Data>,
}

impl DataStore {
    pub fn new() -> DataStore {
        DataStore::default()
    }

    pub fn get(&self, name: &str) -> Option<&Data> {
        self.values.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Data) {
        self.values.insert(name.into(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Data)> {
        self.values.iter()
    }

    /// `assign_value` (§4.F): resolves a dotted path, creating intermediate
    /// maps as needed, and writes `value` at the end of it. Fails if an
    /// existing intermediate component is not a map.
    pub fn assign(&mut self, path: &[String], value: Data) -> Result<(), String> {
        if path.is_empty() {
            return Err("empty assignment path".to_string());
        }
        if path.len() == 1 {
            self.values.insert(path[0].clone(), value);
            return Ok(());
        }
        let root = self
            .values
            .entry(path[0].clone())
            .or_insert_with(|| Data::Map(HashMap::new()));
        assign_into(root, &path[1..], value)
    }
}

fn assign_into(current: &mut Data, remaining: &[String], value: Data) -> Result<(), String> {
    if !matches!(current, Data::Map(_)) {
        return Err(format!("intermediate path component '{}' is not a map", remaining[0]));
    }
    let map = current.as_map_mut().unwrap();
    if remaining.len() == 1 {
        map.insert(remaining[0].clone(), value);
        return Ok(());
    }
    let next = map
        .entry(remaining[0].clone())
        .or_insert_with(|| Data::Map(HashMap::new()));
    assign_into(next, &remaining[1..], value)
}

/// Opaque, evaluator-owned compiled form of a source expression (§4.F
/// `compile(source) -> instructions`). The `Any` payload lets each
/// evaluator implementation store whatever representation suits it;
/// callers never downcast this themselves, only the evaluator that
/// produced it does, via [Evaluator::evaluate].
pub struct CompiledExpression {
    pub source: String,
    program: Arc<dyn Any + Send + Sync>,
}

impl CompiledExpression {
    pub fn new(source: impl Into<String>, program: Arc<dyn Any + Send + Sync>) -> CompiledExpression {
        CompiledExpression {
            source: source.into(),
            program,
        }
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.program.downcast_ref::<T>()
    }
}

impl fmt::Debug for CompiledExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompiledExpression({:?})", self.source)
    }
}

/// A host-provided function registered with the evaluator (§4.F "a way to
/// register host-provided functions"); `In(state_id)` is the only one the
/// interpreter itself requires. Receives the same per-evaluation context as
/// `evaluate` so it can, e.g., consult `_configuration`.
pub type HostFunction = Arc<dyn for<'a> Fn(&[Data], &EvaluationContext<'a>) -> Result<Data, ExpressionError> + Send + Sync>;

/// The evaluation context built once per evaluation (§4.F "Evaluation
/// context"): datamodel variables, the current event, `_configuration`, and
/// the SCXML built-ins.
#[derive(Debug, Clone)]
pub struct EvaluationContext<'a> {
    pub datamodel: &'a DataStore,
    pub event_name: Option<&'a str>,
    pub event_data: Option<&'a Data>,
    pub configuration: &'a [String],
    pub session_id: &'a str,
    pub document_name: Option<&'a str>,
}

impl<'a> EvaluationContext<'a> {
    /// Resolves a top-level variable by the lookup precedence described in
    /// §4.F: event-data-as-object keys merge in as top-level variables
    /// alongside the datamodel, with the datamodel taking precedence for a
    /// colliding name (the event is transient, the datamodel is the
    /// chart's durable state).
    pub fn lookup(&self, name: &str) -> Option<Data> {
        match name {
            "_sessionid" => return Some(Data::String(self.session_id.to_string())),
            "_name" => {
                return Some(
                    self.document_name
                        .map(|n| Data::String(n.to_string()))
                        .unwrap_or(Data::Null),
                )
            }
            "_ioprocessors" => return Some(Data::Array(Vec::new())),
            "_configuration" => {
                return Some(Data::Array(
                    self.configuration.iter().map(|s| Data::String(s.clone())).collect(),
                ))
            }
            "_event" => {
                let mut m = HashMap::new();
                m.insert(
                    "name".to_string(),
                    Data::String(self.event_name.unwrap_or("").to_string()),
                );
                m.insert("data".to_string(), self.event_data.cloned().unwrap_or(Data::Null));
                return Some(Data::Map(m));
            }
            _ => {}
        }
        if let Some(v) = self.datamodel.get(name) {
            return Some(v.clone());
        }
        if let Some(Data::Map(m)) = self.event_data {
            if let Some(v) = m.get(name) {
                return Some(v.clone());
            }
        }
        None
    }
}

/// The pluggable expression/datamodel evaluator (§4.F, §9 "Evaluator
/// plug-in boundary"). The interpreter core never assumes a concrete
/// grammar: it only calls these four operations.
pub trait Evaluator: fmt::Debug {
    /// Compiles source text. An empty or absent input compiles to a no-op
    /// expression that evaluates to [Data::Null].
    fn compile(&self, source: &str) -> Result<CompiledExpression, ExpressionError>;

    /// Evaluates previously compiled instructions against a context.
    fn evaluate(&self, expr: &CompiledExpression, ctx: &EvaluationContext) -> Result<Data, ExpressionError>;

    /// Resolves an assignment location into path components. Rejects
    /// sources with leading/trailing whitespace.
    fn resolve_location(&self, source: &str, ctx: &EvaluationContext) -> Result<Vec<String>, ExpressionError>;

    /// Registers a host function by name, callable from compiled
    /// expressions. The interpreter registers `In` during initialization.
    fn register_function(&mut self, name: &str, f: HostFunction);

    /// Evaluates a guard condition, treating any error or non-`true`
    /// result as a non-match (§4.F "Returning error from a guard is
    /// treated as false").
    fn evaluate_condition(&self, expr: &CompiledExpression, ctx: &EvaluationContext) -> bool {
        matches!(self.evaluate(expr, ctx), Ok(v) if v.is_strictly_true())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_creates_intermediate_maps() {
        let mut store = DataStore::new();
        store
            .assign(&["a".to_string(), "b".to_string(), "c".to_string()], Data::Integer(5))
            .unwrap();
        let a = store.get("a").unwrap();
        let b = a.as_map().unwrap().get("b").unwrap();
        assert_eq!(b.as_map().unwrap().get("c"), Some(&Data::Integer(5)));
    }

    #[test]
    fn assign_rejects_non_map_intermediate() {
        let mut store = DataStore::new();
        store.set("a", Data::Integer(1));
        let result = store.assign(&["a".to_string(), "b".to_string()], Data::Integer(2));
        assert!(result.is_err());
    }

    #[test]
    fn only_strict_true_passes() {
        assert!(Data::Boolean(true).is_strictly_true());
        assert!(!Data::Boolean(false).is_strictly_true());
        assert!(!Data::Integer(1).is_strictly_true());
        assert!(!Data::String("true".to_string()).is_strictly_true());
    }
}
