//! Guard resolution and dispatch engine.
//!
//! Classifies guard annotations, resolves their handlers and test methods,
//! links them into per-slot check chains on first use and reports
//! violations. Everything is cached per [`GuardRealm`]; configuration errors
//! disable only the affected slot.

mod cache;
pub mod classify;
pub mod config;
pub mod definition;
pub mod error;
pub mod instantiate;
pub mod link;
pub mod realm;
pub mod report;
pub mod resolve;
pub mod target;

// Re-export commonly used types
pub use classify::Classifier;
pub use config::GuardConfig;
pub use definition::{DefinitionCache, GuardDefinition};
pub use error::{Circularity, DispatchError, GuardConfigError};
pub use instantiate::{Instantiator, InstantiatorCache};
pub use link::{GuardInstance, Linker, SlotStatus};
pub use realm::{GuardRealm, Realms};
pub use report::GuardViolation;
pub use resolve::{find_test_method, ResolvedTest};
pub use target::GuardTarget;
