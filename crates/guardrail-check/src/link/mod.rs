//! Call-site linking.
//!
//! A declaring type is scanned once, on first request: every member with at
//! least one guard annotation (on itself or a parameter) gets one
//! [`SlotCell`] per parameter plus one for a returned value. Members without
//! guard annotations are not recorded and check for free.

mod instance;
mod slot;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use guardrail_core::{Annotation, MemberDef, Slot, TypeId, TypeRegistry};

use crate::cache::OnceMap;
use crate::config::GuardConfig;
use crate::definition::DefinitionCache;
use crate::error::DispatchError;
use crate::instantiate::InstantiatorCache;
use crate::target::GuardTarget;

pub use instance::GuardInstance;
pub use slot::{SlotCell, SlotStatus};

/// Borrowed view of everything linking consults.
#[derive(Debug, Clone, Copy)]
pub struct LinkContext<'a> {
    pub registry: &'a TypeRegistry,
    pub config: &'a GuardConfig,
    pub definitions: &'a DefinitionCache,
    pub instantiators: &'a InstantiatorCache,
}

impl LinkContext<'_> {
    /// A guard, or a circular would-be guard whose slot must be disabled.
    fn is_guard_like(&self, annotation: &Annotation) -> bool {
        self.definitions
            .classifier()
            .is_guard(self.registry, annotation.type_id)
            .unwrap_or(true)
    }
}

/// Guarded slots of one member.
#[derive(Debug)]
pub struct MemberGuards {
    pub signature: String,
    params: Vec<SlotCell>,
    returned: Option<SlotCell>,
}

impl MemberGuards {
    pub fn slot(&self, slot: Slot) -> Option<&SlotCell> {
        match slot {
            Slot::Param(i) => self.params.get(usize::from(i)),
            Slot::Return => self.returned.as_ref(),
        }
    }

    pub fn slots(&self) -> impl Iterator<Item = &SlotCell> {
        self.params.iter().chain(self.returned.iter())
    }
}

/// Parameter count and return presence of a declared member.
#[derive(Debug, Clone, Copy)]
struct Shape {
    params: usize,
    returns_value: bool,
}

impl Shape {
    fn of(member: &MemberDef) -> Self {
        Shape {
            params: member.params.len(),
            returns_value: member.returns_value(),
        }
    }

    fn has(self, slot: Slot) -> bool {
        match slot {
            Slot::Param(i) => usize::from(i) < self.params,
            Slot::Return => self.returns_value,
        }
    }
}

/// Scan result of one declaring type.
#[derive(Debug)]
pub struct MethodGuards {
    pub declaring_type: TypeId,
    declared: HashMap<String, Shape>,
    /// Signatures shared by more than one member; never dispatched.
    collisions: HashSet<String>,
    members: HashMap<String, MemberGuards>,
}

impl MethodGuards {
    fn scan(ctx: LinkContext<'_>, declaring_type: TypeId) -> Result<Self, DispatchError> {
        let registry = ctx.registry;
        let declaring = registry.qualified_name(declaring_type);
        let class = registry.class(declaring_type).ok_or_else(|| {
            let message = format!("{} is not a declared class", declaring);
            tracing::error!(%message, "guard scan failed");
            DispatchError::internal(message)
        })?;

        let guarded_by =
            |annotations: &[Annotation]| annotations.iter().any(|a| ctx.is_guard_like(a));
        let mut declared = HashMap::new();
        let mut collisions = HashSet::new();
        let mut members = HashMap::new();
        for member in &class.members {
            let signature = registry.signature(member);
            if declared.insert(signature.clone(), Shape::of(member)).is_some() {
                tracing::error!(
                    %declaring,
                    member = %signature,
                    "members share one dispatch signature"
                );
                members.remove(&signature);
                collisions.insert(signature);
                continue;
            }
            let guarded = guarded_by(&member.annotations)
                || member.params.iter().any(|p| guarded_by(&p.annotations));
            if guarded {
                let guards = member_guards(declaring_type, signature.clone(), member);
                members.insert(signature, guards);
            }
        }

        tracing::debug!(
            %declaring,
            members = declared.len(),
            guarded = members.len(),
            "declaring type scanned"
        );
        Ok(MethodGuards {
            declaring_type,
            declared,
            collisions,
            members,
        })
    }

    /// The guards of `signature`, `None` if that member has none.
    pub fn member(&self, signature: &str) -> Option<&MemberGuards> {
        self.members.get(signature)
    }

    pub fn guarded_members(&self) -> impl Iterator<Item = &MemberGuards> {
        self.members.values()
    }

    /// The slot to check, `Ok(None)` for a member without guards. A member
    /// or slot that does not exist, or a signature naming several members,
    /// is an engine error.
    pub fn slot(
        &self,
        registry: &TypeRegistry,
        signature: &str,
        slot: Slot,
    ) -> Result<Option<&SlotCell>, DispatchError> {
        let missing = |what: String| {
            let message = format!(
                "{}.{}: {}",
                registry.qualified_name(self.declaring_type),
                signature,
                what
            );
            tracing::error!(%message, "guard dispatch for unknown slot");
            DispatchError::internal(message)
        };
        let Some(shape) = self.declared.get(signature) else {
            return Err(missing("no such member".to_string()));
        };
        if self.collisions.contains(signature) {
            return Err(missing("signature names more than one member".to_string()));
        }
        if !shape.has(slot) {
            return Err(missing(format!("no slot {}", slot)));
        }
        Ok(self.members.get(signature).and_then(|member| member.slot(slot)))
    }
}

fn member_guards(declaring_type: TypeId, signature: String, member: &MemberDef) -> MemberGuards {
    let sensitive =
        |annotations: &[Annotation]| annotations.iter().any(|a| a.type_id == TypeId::SENSITIVE);

    let params = member
        .params
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let target = GuardTarget {
                declaring_type,
                member: signature.clone(),
                // signatures with more than u16::MAX parameters do not occur
                slot: Slot::Param(u16::try_from(i).unwrap_or(u16::MAX)),
                name: Some(p.name.clone()),
                value_type: p.ty.clone(),
                sensitive: sensitive(&p.annotations),
            };
            SlotCell::new(target, p.annotations.clone())
        })
        .collect();

    let returned = member.returns_value().then(|| {
        let target = GuardTarget {
            declaring_type,
            member: signature.clone(),
            slot: Slot::Return,
            name: None,
            value_type: member.return_type.clone(),
            sensitive: sensitive(&member.annotations),
        };
        SlotCell::new(target, member.annotations.clone())
    });

    MemberGuards {
        signature,
        params,
        returned,
    }
}

/// Per-declaring-type scan cache.
#[derive(Debug, Default)]
pub struct Linker {
    types: OnceMap<TypeId, Result<Arc<MethodGuards>, DispatchError>>,
}

impl Linker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The scan of `declaring_type`, performed on first request.
    pub fn guards_for(
        &self,
        ctx: LinkContext<'_>,
        declaring_type: TypeId,
    ) -> Result<Arc<MethodGuards>, DispatchError> {
        self.types.get_or_init(declaring_type, || {
            MethodGuards::scan(ctx, declaring_type).map(Arc::new)
        })
    }

    pub fn is_scanned(&self, declaring_type: TypeId) -> bool {
        self.types.get(&declaring_type).is_some()
    }

    /// Number of scanned declaring types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
