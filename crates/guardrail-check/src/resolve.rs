//! Test-method matching: picks the single handler `test` method that applies
//! to a target's static type.
//!
//! In order, first success wins:
//! 1. Reference targets: the most specific candidate whose parameter type the
//!    target is assignable to.
//! 2. Primitive targets: the exact primitive, then each widening step,
//!    nearest first.
//! 3. Wrapper targets of guards that do not test null: step 2 on the unboxed
//!    primitive. (A null would fail to unbox before the guard could see it,
//!    which is why null-testing guards skip this path.)
//!
//! Ties are never broken by guessing; they fail resolution.

use guardrail_core::widening::widening_chain;
use guardrail_core::{
    HandlerImpl, HandlerInstance, PrimitiveType, TestMethodDef, TypeId, TypeRegistry, Value,
};

use crate::definition::GuardDefinition;
use crate::error::GuardConfigError;
use crate::target::GuardTarget;

/// A matched test method plus the widening applied to values before the call.
#[derive(Debug, Clone)]
pub struct ResolvedTest {
    pub method: TestMethodDef,
    /// Primitive the value is widened to; `None` passes it unchanged.
    pub widen_to: Option<PrimitiveType>,
}

impl ResolvedTest {
    pub fn parameter_type(&self) -> TypeId {
        self.method.parameter_type
    }

    /// Runs the test. `Err` means the value or handler did not have the shape
    /// resolution promised, which is an engine bug rather than a violation.
    pub fn invoke(&self, handler: &HandlerInstance, value: &Value) -> Result<bool, String> {
        let widened;
        let arg = match self.widen_to {
            Some(to) if !value.is_null() => {
                widened = value.widen(to).ok_or_else(|| {
                    format!("cannot widen {} value to {}", value.type_name(), to.name())
                })?;
                &widened
            }
            _ => value,
        };
        self.method
            .invoke(handler, arg)
            .ok_or_else(|| "handler instance does not match its test method".to_string())
    }
}

/// Finds the test method of `handler_type` for `target`.
pub fn find_test_method(
    registry: &TypeRegistry,
    definition: &GuardDefinition,
    handler_type: TypeId,
    target: &GuardTarget,
) -> Result<ResolvedTest, GuardConfigError> {
    let handler = registry
        .class(handler_type)
        .and_then(|c| c.handler.as_ref())
        .ok_or_else(|| GuardConfigError::NotAHandler {
            annotation: definition.name.clone(),
            handler: registry.qualified_name(handler_type),
        })?;
    let matcher = Matcher {
        registry,
        definition,
        handler_type,
        handler,
        target,
    };

    let static_type = target.static_type();
    if registry.primitive(static_type).is_none() {
        if let Some(found) = matcher.most_specific_reference(static_type)? {
            return Ok(found);
        }
    }
    if let Some(primitive) = registry.primitive(static_type) {
        if let Some(found) = matcher.along_widening_chain(primitive)? {
            return Ok(found);
        }
    }
    if !definition.tests_null {
        if let Some(primitive) = registry.unboxed(static_type) {
            if let Some(found) = matcher.along_widening_chain(primitive)? {
                return Ok(found);
            }
        }
    }

    Err(GuardConfigError::NoTestMethod {
        annotation: definition.name.clone(),
        handler: registry.qualified_name(handler_type),
        target_type: registry.render_type(&target.value_type),
    })
}

struct Matcher<'a> {
    registry: &'a TypeRegistry,
    definition: &'a GuardDefinition,
    handler_type: TypeId,
    handler: &'a HandlerImpl,
    target: &'a GuardTarget,
}

impl Matcher<'_> {
    fn most_specific_reference(
        &self,
        static_type: TypeId,
    ) -> Result<Option<ResolvedTest>, GuardConfigError> {
        let registry = self.registry;
        let applicable: Vec<&TestMethodDef> = self
            .handler
            .test_methods
            .iter()
            .filter(|m| registry.primitive(m.parameter_type).is_none())
            .filter(|m| registry.is_assignable(static_type, m.parameter_type))
            .collect();
        if applicable.is_empty() {
            return Ok(None);
        }

        // most specific: assignable to every other applicable candidate
        let most_specific: Vec<&TestMethodDef> = applicable
            .iter()
            .copied()
            .filter(|c| {
                applicable
                    .iter()
                    .all(|o| registry.is_assignable(c.parameter_type, o.parameter_type))
            })
            .collect();

        match most_specific.as_slice() {
            [only] => Ok(Some(ResolvedTest {
                method: (*only).clone(),
                widen_to: None,
            })),
            [] => Err(self.ambiguous(&applicable)),
            tied => Err(self.ambiguous(tied)),
        }
    }

    fn along_widening_chain(
        &self,
        primitive: PrimitiveType,
    ) -> Result<Option<ResolvedTest>, GuardConfigError> {
        for step in std::iter::once(primitive).chain(widening_chain(primitive).iter().copied()) {
            let matching: Vec<&TestMethodDef> = self
                .handler
                .test_methods
                .iter()
                .filter(|m| m.parameter_type == step.type_id())
                .collect();
            match matching.as_slice() {
                [] => continue,
                [only] => {
                    return Ok(Some(ResolvedTest {
                        method: (*only).clone(),
                        widen_to: (step != primitive).then_some(step),
                    }))
                }
                tied => return Err(self.ambiguous(tied)),
            }
        }
        Ok(None)
    }

    fn ambiguous(&self, candidates: &[&TestMethodDef]) -> GuardConfigError {
        GuardConfigError::AmbiguousTestMethod {
            annotation: self.definition.name.clone(),
            handler: self.registry.qualified_name(self.handler_type),
            target_type: self.registry.render_type(&self.target.value_type),
            candidates: candidates
                .iter()
                .map(|m| format!("test({})", self.registry.simple_name(m.parameter_type)))
                .collect(),
        }
    }
}
