//! Core error types for guardrail-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering the
//! failure modes of type registration.

use crate::type_id::TypeId;
use thiserror::Error;

/// Core errors produced by the guardrail-core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// Attempting to register a qualified name that already exists.
    #[error("duplicate type name: '{name}'")]
    DuplicateTypeName { name: String },

    /// A TypeId was not found in the type registry.
    #[error("type not found: TypeId({id})", id = id.0)]
    TypeNotFound { id: TypeId },

    /// A class-only operation was applied to some other kind of type.
    #[error("'{name}' is not a class")]
    NotAClass { name: String },

    /// An annotation-only operation was applied to some other kind of type.
    #[error("'{name}' is not an annotation type")]
    NotAnAnnotation { name: String },
}
