//! Error taxonomy of the guard engine.
//!
//! - [`Circularity`]: the meta-annotation graph of a guard contains a cycle.
//! - [`GuardConfigError`]: a guard cannot be resolved (bad handler wiring,
//!   no or ambiguous test method, circular definition). Caught at the slot
//!   boundary, which then disables that one slot.
//! - [`DispatchError`]: what a call-site check returns. A
//!   [`GuardViolation`] is the intended contract failure; `Internal` means
//!   the engine itself broke an invariant.

use guardrail_core::TypeId;

use crate::report::GuardViolation;

/// A cycle among guard annotation types, listed along the inspection path.
/// The first and last entries name the same type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("circular guard meta-annotations: {}", .names.join(" -> "))]
pub struct Circularity {
    pub path: Vec<TypeId>,
    pub names: Vec<String>,
}

/// An illegal guard definition or handler wiring.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GuardConfigError {
    #[error("illegal guard {annotation}: {source}")]
    Circular {
        annotation: String,
        #[source]
        source: Circularity,
    },

    #[error("illegal guard {annotation}: no handler type found (searched {})", .searched.join(", "))]
    NoHandler {
        annotation: String,
        searched: Vec<String>,
    },

    #[error("illegal guard {annotation}: handler {handler} is abstract")]
    AbstractHandler { annotation: String, handler: String },

    #[error("illegal guard {annotation}: {handler} does not implement the guard handler capability")]
    NotAHandler { annotation: String, handler: String },

    #[error("handler {handler}: class carries no handler implementation")]
    HandlerNotImplemented { handler: String },

    #[error("handler {handler}: no suitable constructor (need exactly one public or exactly one designated constructor)")]
    NoSuitableConstructor { handler: String },

    #[error("handler {handler}: {count} constructors are marked as designated")]
    MultipleDesignatedConstructors { handler: String, count: usize },

    #[error("handler {handler}: constructor parameter {index} has unsupported type {parameter}")]
    UnsupportedConstructorParameter {
        handler: String,
        index: usize,
        parameter: String,
    },

    #[error("handler {handler}: constructor expects @{expected}, got @{actual}")]
    AnnotationMismatch {
        handler: String,
        expected: String,
        actual: String,
    },

    #[error("handler {handler} failed to construct: {reason}")]
    HandlerConstruction { handler: String, reason: String },

    #[error("illegal guard {annotation}: {handler} has no test method applicable to {target_type}")]
    NoTestMethod {
        annotation: String,
        handler: String,
        target_type: String,
    },

    #[error("illegal guard {annotation}: ambiguous test methods on {handler} for {target_type}: {}", .candidates.join(", "))]
    AmbiguousTestMethod {
        annotation: String,
        handler: String,
        target_type: String,
        candidates: Vec<String>,
    },

    #[error("unknown type {id}")]
    UnknownType { id: TypeId },
}

/// Outcome of a failed call-site check.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    /// The value broke a successfully resolved guard.
    #[error(transparent)]
    Violation(Box<GuardViolation>),

    /// The engine itself is inconsistent (e.g. a slot was requested for a
    /// member that was never scanned).
    #[error("internal guard engine error: {message}")]
    Internal { message: String },
}

impl DispatchError {
    pub fn internal(message: impl Into<String>) -> Self {
        DispatchError::Internal {
            message: message.into(),
        }
    }

    /// The violation, if this is one.
    pub fn violation(&self) -> Option<&GuardViolation> {
        match self {
            DispatchError::Violation(v) => Some(v),
            DispatchError::Internal { .. } => None,
        }
    }
}

impl From<GuardViolation> for DispatchError {
    fn from(v: GuardViolation) -> Self {
        DispatchError::Violation(Box::new(v))
    }
}
