//! Error types for each layer (§7, §4.K). No single error enum spans the
//! whole crate; each layer's errors are shaped for what its callers
//! actually need to do with them.

use std::fmt;

/// Document/validation errors (§4.B). Accumulated, not short-circuited, so
/// a caller sees every problem a document has in one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    InitialTargetUnknown { state: String, target: String },
    InitialTargetNotDirectChild { state: String, target: String },
    DuplicateStateId { id: String },
    HistoryNotDirectChildOfCompoundOrParallel { id: String },
    MultipleInitialElements { state: String },
    InitialPseudoStateMissingTransition { state: String },
    InitialPseudoStateTargetNotDirectChild { state: String, target: String },
    UnknownTransitionTarget { source: String, target: String },
    CompoundStateHasNoChildren { state: String },
    UnreachableState { id: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InitialTargetUnknown { state, target } => {
                write!(f, "state '{state}': initial target '{target}' does not exist")
            }
            ValidationError::InitialTargetNotDirectChild { state, target } => write!(
                f,
                "state '{state}': initial target '{target}' is not a direct child"
            ),
            ValidationError::DuplicateStateId { id } => write!(f, "duplicate state id '{id}'"),
            ValidationError::HistoryNotDirectChildOfCompoundOrParallel { id } => write!(
                f,
                "history state '{id}' must be a direct child of a compound or parallel state"
            ),
            ValidationError::MultipleInitialElements { state } => {
                write!(f, "state '{state}' declares more than one <initial> element")
            }
            ValidationError::InitialPseudoStateMissingTransition { state } => {
                write!(f, "<initial> of state '{state}' has no transition")
            }
            ValidationError::InitialPseudoStateTargetNotDirectChild { state, target } => write!(
                f,
                "<initial> of state '{state}': target '{target}' is not a direct child"
            ),
            ValidationError::UnknownTransitionTarget { source, target } => write!(
                f,
                "transition from '{source}' references unknown target '{target}'"
            ),
            ValidationError::CompoundStateHasNoChildren { state } => {
                write!(f, "compound state '{state}' has no children")
            }
            ValidationError::UnreachableState { id } => write!(f, "state '{id}' is unreachable"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Compile/evaluate/location-resolution failures from the evaluator
/// boundary (§4.F, §7.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpressionError {
    Compile { source: String, reason: String },
    Evaluate { reason: String },
    InvalidLocation { source: String, reason: String },
}

impl fmt::Display for ExpressionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpressionError::Compile { source, reason } => {
                write!(f, "failed to compile '{source}': {reason}")
            }
            ExpressionError::Evaluate { reason } => write!(f, "evaluation failed: {reason}"),
            ExpressionError::InvalidLocation { source, reason } => {
                write!(f, "invalid location '{source}': {reason}")
            }
        }
    }
}

impl std::error::Error for ExpressionError {}

/// Runtime action-execution failures (§7.3), surfaced to the state chart as
/// `error.execution` events rather than aborting the macrostep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    Expression(ExpressionError),
    AssignToNonMap { location: String },
    ForeachOverNonIterable,
    SendDeliveryFailed { reason: String },
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionError::Expression(e) => write!(f, "{e}"),
            ActionError::AssignToNonMap { location } => {
                write!(f, "cannot assign through non-map intermediate at '{location}'")
            }
            ActionError::ForeachOverNonIterable => write!(f, "<foreach> array expression is not iterable"),
            ActionError::SendDeliveryFailed { reason } => write!(f, "send delivery failed: {reason}"),
        }
    }
}

impl std::error::Error for ActionError {}

impl From<ExpressionError> for ActionError {
    fn from(e: ExpressionError) -> Self {
        ActionError::Expression(e)
    }
}

/// Errors from the bundled XML reader (§6 "bundled reader").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderError {
    Xml { position: usize, reason: String },
    Structure { reason: String },
    Validation(Vec<ValidationError>),
}

impl fmt::Display for ReaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReaderError::Xml { position, reason } => {
                write!(f, "XML error at byte {position}: {reason}")
            }
            ReaderError::Structure { reason } => write!(f, "document structure error: {reason}"),
            ReaderError::Validation(errors) => {
                write!(f, "document failed validation: ")?;
                for (i, e) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{e}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ReaderError {}

impl From<Vec<ValidationError>> for ReaderError {
    fn from(errors: Vec<ValidationError>) -> Self {
        ReaderError::Validation(errors)
    }
}
