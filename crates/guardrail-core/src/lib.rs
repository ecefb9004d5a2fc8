pub mod error;
pub mod handler;
pub mod id;
pub mod type_id;
pub mod types;
pub mod value;
pub mod widening;

// Re-export commonly used types
pub use error::CoreError;
pub use handler::{
    ConstructorDef, HandlerBuilder, HandlerImpl, HandlerInstance, Injected, TestMethodDef,
};
pub use id::{ScopeId, Slot};
pub use type_id::{guard_attr, TypeId, TypeRegistry};
pub use types::{
    Annotation, AnnotationDef, AttrValue, ClassDef, GenericType, MemberDef, MemberKind, ParamDef,
    PrimitiveType, TypeDef, TypeKind,
};
pub use value::Value;
