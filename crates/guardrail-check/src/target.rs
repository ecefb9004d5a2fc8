//! What a guard is attached to.

use std::hash::{Hash, Hasher};

use guardrail_core::{GenericType, Slot, TypeId, TypeRegistry};

/// One checkable position: a parameter or the return value of a member of a
/// declaring type, with its declared static type.
///
/// Identity is `(declaring type, member, slot)`; the remaining fields are
/// derived from the declaration.
#[derive(Debug, Clone)]
pub struct GuardTarget {
    pub declaring_type: TypeId,
    /// Member signature, e.g. `setAge(int)`.
    pub member: String,
    pub slot: Slot,
    /// Parameter name; `None` for the return value.
    pub name: Option<String>,
    pub value_type: GenericType,
    /// Values must never appear in diagnostics.
    pub sensitive: bool,
}

impl GuardTarget {
    pub fn static_type(&self) -> TypeId {
        self.value_type.raw
    }

    /// Human-readable description, e.g. `parameter 'age' (#0) of
    /// Person.setAge(int)` or `return value of Person.name()`.
    pub fn describe(&self, registry: &TypeRegistry) -> String {
        let owner = format!("{}.{}", registry.simple_name(self.declaring_type), self.member);
        match (self.slot, &self.name) {
            (Slot::Return, _) => format!("return value of {}", owner),
            (Slot::Param(i), Some(name)) => format!("parameter '{}' (#{}) of {}", name, i, owner),
            (Slot::Param(i), None) => format!("parameter #{} of {}", i, owner),
        }
    }
}

impl PartialEq for GuardTarget {
    fn eq(&self, other: &Self) -> bool {
        self.declaring_type == other.declaring_type
            && self.member == other.member
            && self.slot == other.slot
    }
}

impl Eq for GuardTarget {}

impl Hash for GuardTarget {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.declaring_type.hash(state);
        self.member.hash(state);
        self.slot.hash(state);
    }
}
