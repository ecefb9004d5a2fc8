//! Stable identifier newtypes used across the guard engine.
//!
//! [`ScopeId`] names an isolation boundary (one registry and its caches).
//! [`Slot`] names one checkable position on a member: a parameter index or
//! the return value.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Isolation scope identity. Every scope owns its own type registry and caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeId(pub u32);

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One checkable position on a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    /// Zero-based parameter index.
    Param(u16),
    /// The member's return value.
    Return,
}

impl Slot {
    /// Raw index used by instrumented call sites: `-1` is the return value.
    pub const RETURN_INDEX: i32 = -1;

    /// Decodes a raw call-site index. Returns `None` for anything below `-1`
    /// or above `u16::MAX`.
    pub fn from_index(index: i32) -> Option<Slot> {
        match index {
            Self::RETURN_INDEX => Some(Slot::Return),
            i if i >= 0 => u16::try_from(i).ok().map(Slot::Param),
            _ => None,
        }
    }

    /// Encodes the slot back into its raw call-site index.
    pub fn index(self) -> i32 {
        match self {
            Slot::Param(i) => i32::from(i),
            Slot::Return => Self::RETURN_INDEX,
        }
    }

    pub fn is_return(self) -> bool {
        matches!(self, Slot::Return)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Param(i) => write!(f, "#{}", i),
            Slot::Return => f.write_str("return"),
        }
    }
}
