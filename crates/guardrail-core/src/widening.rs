//! Primitive widening and boxing rules.
//!
//! Widening follows the standard primitive promotion order:
//!
//! - byte -> short -> int -> long -> float -> double
//! - char -> int -> long -> float -> double
//! - boolean never widens
//! - byte and short never widen to char, char never widens to short
//!
//! Each chain is linear, so overload resolution walks it nearest-first
//! instead of ranking candidates.

use crate::type_id::TypeId;
use crate::types::PrimitiveType;

use PrimitiveType::*;

const BYTE_CHAIN: &[PrimitiveType] = &[Short, Int, Long, Float, Double];
const SHORT_CHAIN: &[PrimitiveType] = &[Int, Long, Float, Double];
const CHAR_CHAIN: &[PrimitiveType] = &[Int, Long, Float, Double];
const INT_CHAIN: &[PrimitiveType] = &[Long, Float, Double];
const LONG_CHAIN: &[PrimitiveType] = &[Float, Double];
const FLOAT_CHAIN: &[PrimitiveType] = &[Double];

/// The types `from` widens to, nearest first. Does not include `from` itself.
pub fn widening_chain(from: PrimitiveType) -> &'static [PrimitiveType] {
    match from {
        Boolean | Double => &[],
        Byte => BYTE_CHAIN,
        Short => SHORT_CHAIN,
        Char => CHAR_CHAIN,
        Int => INT_CHAIN,
        Long => LONG_CHAIN,
        Float => FLOAT_CHAIN,
    }
}

/// Returns `true` if `from` is `to` or widens to it.
pub fn can_widen(from: PrimitiveType, to: PrimitiveType) -> bool {
    from == to || widening_chain(from).contains(&to)
}

/// The wrapper class boxing `primitive`.
pub fn box_type(primitive: PrimitiveType) -> TypeId {
    match primitive {
        Boolean => TypeId::BOOLEAN_BOX,
        Byte => TypeId::BYTE_BOX,
        Short => TypeId::SHORT_BOX,
        Char => TypeId::CHARACTER,
        Int => TypeId::INTEGER,
        Long => TypeId::LONG_BOX,
        Float => TypeId::FLOAT_BOX,
        Double => TypeId::DOUBLE_BOX,
    }
}

/// The primitive boxed by a builtin wrapper class, if `type_id` is one.
pub fn unbox_type(type_id: TypeId) -> Option<PrimitiveType> {
    PrimitiveType::ALL
        .iter()
        .copied()
        .find(|p| box_type(*p) == type_id)
}
