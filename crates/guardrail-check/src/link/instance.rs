use std::panic::Location;
use std::sync::Arc;

use guardrail_core::{Annotation, HandlerInstance, Value};

use crate::error::DispatchError;
use crate::report;
use crate::resolve::ResolvedTest;
use crate::target::GuardTarget;

/// One guard applied to one target: a constructed handler plus the test
/// method resolved for the target's static type.
#[derive(Debug, Clone)]
pub struct GuardInstance {
    pub target: Arc<GuardTarget>,
    pub annotation: Annotation,
    /// `@Name` of each annotation from the use site down to this guard.
    pub path: Vec<String>,
    /// Pre-rendered target description.
    pub description: String,
    /// Resolved guard message.
    pub message: String,
    pub test: ResolvedTest,
    pub handler: HandlerInstance,
    /// Null values bypass this guard.
    pub skip_null: bool,
    pub max_value_len: usize,
}

impl GuardInstance {
    pub fn check(
        &self,
        value: &Value,
        location: &'static Location<'static>,
    ) -> Result<(), DispatchError> {
        if self.skip_null && value.is_null() {
            return Ok(());
        }
        match self.test.invoke(&self.handler, value) {
            Ok(true) => Ok(()),
            Ok(false) => Err(report::violation(self, value, self.max_value_len, location).into()),
            Err(message) => {
                tracing::error!(
                    target_slot = %self.description,
                    guard = %self.path.join(" -> "),
                    %message,
                    "guard test could not run"
                );
                Err(DispatchError::internal(format!("{}: {}", self.description, message)))
            }
        }
    }
}
