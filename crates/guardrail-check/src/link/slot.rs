//! Per-slot lazy resolution and guard-chain composition.
//!
//! A slot resolves exactly once, on first use: either into a composed chain
//! of checks or, on any configuration error, into a permanent pass-through.

use std::fmt;
use std::panic::{self, AssertUnwindSafe, Location};
use std::sync::{Arc, OnceLock};

use serde::Serialize;

use guardrail_core::{Annotation, Value};

use super::instance::GuardInstance;
use super::LinkContext;
use crate::error::{DispatchError, GuardConfigError};
use crate::report::{render_annotation, render_template};
use crate::resolve::find_test_method;
use crate::target::GuardTarget;

type CheckFn =
    Arc<dyn Fn(&Value, &'static Location<'static>) -> Result<(), DispatchError> + Send + Sync>;

/// Resolution outcome of a slot, for tooling and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SlotStatus {
    /// No guards apply; checks are free.
    PassThrough,
    /// `links` guard instances run in order on every check.
    Guarded { links: usize },
    /// Resolution failed; the slot is unprotected for good.
    Disabled { reason: String },
}

enum SlotState {
    Linked { chain: CheckFn, links: usize },
    Disabled { reason: String },
}

/// One checkable position and its lazily linked chain.
pub struct SlotCell {
    target: Arc<GuardTarget>,
    annotations: Vec<Annotation>,
    state: OnceLock<SlotState>,
}

impl fmt::Debug for SlotCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotCell")
            .field("target", &self.target)
            .field("annotations", &self.annotations.len())
            .field("resolved", &self.state.get().is_some())
            .finish()
    }
}

impl SlotCell {
    pub(crate) fn new(target: GuardTarget, annotations: Vec<Annotation>) -> Self {
        SlotCell {
            target: Arc::new(target),
            annotations,
            state: OnceLock::new(),
        }
    }

    pub fn target(&self) -> &GuardTarget {
        &self.target
    }

    pub(crate) fn check(
        &self,
        ctx: LinkContext<'_>,
        value: &Value,
        location: &'static Location<'static>,
    ) -> Result<(), DispatchError> {
        match self.state(ctx) {
            SlotState::Linked { chain, .. } => chain(value, location),
            SlotState::Disabled { .. } => Ok(()),
        }
    }

    pub(crate) fn status(&self, ctx: LinkContext<'_>) -> SlotStatus {
        match self.state(ctx) {
            SlotState::Linked { links: 0, .. } => SlotStatus::PassThrough,
            SlotState::Linked { links, .. } => SlotStatus::Guarded { links: *links },
            SlotState::Disabled { reason } => SlotStatus::Disabled {
                reason: reason.clone(),
            },
        }
    }

    fn state(&self, ctx: LinkContext<'_>) -> &SlotState {
        self.state.get_or_init(|| self.link(ctx))
    }

    fn link(&self, ctx: LinkContext<'_>) -> SlotState {
        let outcome = if ctx.config.contain_handler_panics {
            panic::catch_unwind(AssertUnwindSafe(|| self.instances(ctx)))
                .unwrap_or_else(|_| Err("panicked while linking".to_string()))
        } else {
            self.instances(ctx)
        };

        match outcome {
            Ok(instances) => {
                let links = instances.len();
                tracing::debug!(
                    declaring = %ctx.registry.qualified_name(self.target.declaring_type),
                    member = %self.target.member,
                    slot = %self.target.slot,
                    links,
                    "guard slot linked"
                );
                SlotState::Linked {
                    chain: compose(instances),
                    links,
                }
            }
            Err(reason) => {
                tracing::warn!(
                    declaring = %ctx.registry.qualified_name(self.target.declaring_type),
                    member = %self.target.member,
                    slot = %self.target.slot,
                    %reason,
                    "guard misconfiguration, continuing unprotected"
                );
                SlotState::Disabled { reason }
            }
        }
    }

    fn instances(&self, ctx: LinkContext<'_>) -> Result<Vec<GuardInstance>, String> {
        let description = self.target.describe(ctx.registry);
        let mut out = Vec::new();
        let mut path = Vec::new();
        for annotation in &self.annotations {
            expand(ctx, &self.target, &description, annotation, &mut path, &mut out)
                .map_err(|e| e.to_string())?;
        }
        Ok(out)
    }
}

/// Appends the instances contributed by `annotation`: its own check first
/// (when it is directly marked), then its implied guards depth-first.
fn expand(
    ctx: LinkContext<'_>,
    target: &Arc<GuardTarget>,
    description: &str,
    annotation: &Annotation,
    path: &mut Vec<String>,
    out: &mut Vec<GuardInstance>,
) -> Result<(), GuardConfigError> {
    let registry = ctx.registry;
    let Some(definition) = ctx
        .definitions
        .definition_for(registry, ctx.config, annotation.type_id)?
    else {
        return Ok(());
    };

    path.push(format!("@{}", registry.simple_name(annotation.type_id)));
    if let Some(handler_type) = definition.handler {
        let test = find_test_method(registry, &definition, handler_type, target)?;
        let handler = ctx.instantiators.get(registry, handler_type)?.instantiate(
            registry,
            annotation,
            &target.value_type,
            ctx.config.contain_handler_panics,
        )?;
        let message = match &definition.message {
            Some(template) => render_template(registry, template, annotation),
            None => render_annotation(registry, annotation),
        };
        out.push(GuardInstance {
            target: Arc::clone(target),
            annotation: annotation.clone(),
            path: path.clone(),
            description: description.to_string(),
            message,
            test,
            handler,
            skip_null: !definition.tests_null && registry.primitive(target.static_type()).is_none(),
            max_value_len: ctx.config.max_value_len,
        });
    }
    for implied in &definition.implied {
        expand(ctx, target, description, implied, path, out)?;
    }
    path.pop();
    Ok(())
}

/// Folds the instances, last to first, into one check that runs them in
/// order and stops at the first violation.
fn compose(instances: Vec<GuardInstance>) -> CheckFn {
    let mut next: CheckFn =
        Arc::new(|_: &Value, _: &'static Location<'static>| Ok::<(), DispatchError>(()));
    for instance in instances.into_iter().rev() {
        let rest = next;
        next = Arc::new(move |value: &Value, location: &'static Location<'static>| {
            instance.check(value, location)?;
            rest(value, location)
        });
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use guardrail_core::{HandlerImpl, HandlerInstance, Slot, TypeId};

    use crate::resolve::ResolvedTest;

    struct Recorder;

    fn instance(
        name: &str,
        test: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> GuardInstance {
        let handler = HandlerImpl::builder::<Recorder>()
            .test(TypeId::INT, move |_, v| test(v))
            .build();
        GuardInstance {
            target: Arc::new(GuardTarget {
                declaring_type: TypeId::OBJECT,
                member: "m(int)".into(),
                slot: Slot::Param(0),
                name: Some("x".into()),
                value_type: TypeId::INT.into(),
                sensitive: false,
            }),
            annotation: Annotation::new(TypeId::GUARD),
            path: vec![format!("@{}", name)],
            description: "parameter 'x' (#0) of Object.m(int)".into(),
            message: format!("{} failed", name),
            test: ResolvedTest {
                method: handler.test_methods[0].clone(),
                widen_to: None,
            },
            handler: Arc::new(Recorder) as HandlerInstance,
            skip_null: false,
            max_value_len: 200,
        }
    }

    fn counting(
        calls: &Arc<AtomicUsize>,
        passes: bool,
    ) -> impl Fn(&Value) -> bool + Send + Sync + 'static {
        let calls = Arc::clone(calls);
        move |_: &Value| {
            calls.fetch_add(1, Ordering::SeqCst);
            passes
        }
    }

    #[test]
    fn empty_chain_accepts_everything() {
        let chain = compose(Vec::new());
        assert!(chain(&Value::Null, Location::caller()).is_ok());
    }

    #[test]
    fn first_failure_stops_the_chain() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let chain = compose(vec![
            instance("G1", counting(&first, false)),
            instance("G2", counting(&second, true)),
        ]);

        let err = chain(&Value::Int(1), Location::caller()).unwrap_err();
        assert_eq!(err.violation().unwrap().chain, vec!["@G1"]);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn passing_chain_runs_in_declaration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = |name: &'static str| {
            let seen = Arc::clone(&seen);
            move |_: &Value| {
                seen.lock().unwrap().push(name);
                true
            }
        };
        let chain = compose(vec![
            instance("A", record("A")),
            instance("B", record("B")),
            instance("C", record("C")),
        ]);
        assert!(chain(&Value::Int(1), Location::caller()).is_ok());
        assert_eq!(*seen.lock().unwrap(), vec!["A", "B", "C"]);
    }

    #[test]
    fn skipped_null_never_reaches_the_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut guard = instance("G", counting(&calls, false));
        guard.skip_null = true;
        let chain = compose(vec![guard]);
        assert!(chain(&Value::Null, Location::caller()).is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(chain(&Value::Int(0), Location::caller()).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
