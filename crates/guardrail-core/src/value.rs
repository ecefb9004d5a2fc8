//! Runtime value representation handed to guards at call sites.
//!
//! [`Value`] is the dynamic counterpart of the declared types in the
//! registry. Primitive and wrapper-typed slots share the scalar variants; a
//! wrapper slot can additionally hold [`Value::Null`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::type_id::TypeId;
use crate::types::PrimitiveType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Char(char),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    List(Vec<Value>),
    /// Any other reference value: its runtime class and string form.
    Object { class: TypeId, repr: String },
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The primitive type of a scalar value, `None` for references and null.
    pub fn primitive_type(&self) -> Option<PrimitiveType> {
        match self {
            Value::Boolean(_) => Some(PrimitiveType::Boolean),
            Value::Byte(_) => Some(PrimitiveType::Byte),
            Value::Short(_) => Some(PrimitiveType::Short),
            Value::Char(_) => Some(PrimitiveType::Char),
            Value::Int(_) => Some(PrimitiveType::Int),
            Value::Long(_) => Some(PrimitiveType::Long),
            Value::Float(_) => Some(PrimitiveType::Float),
            Value::Double(_) => Some(PrimitiveType::Double),
            _ => None,
        }
    }

    /// The runtime class of the value, as far as it can be known without a
    /// registry. Scalars report their primitive type id; null reports `OBJECT`.
    pub fn runtime_type(&self) -> TypeId {
        match self {
            Value::Str(_) => TypeId::STRING,
            Value::List(_) => TypeId::LIST,
            Value::Object { class, .. } => *class,
            Value::Null => TypeId::OBJECT,
            scalar => scalar
                .primitive_type()
                .map(PrimitiveType::type_id)
                .unwrap_or(TypeId::OBJECT),
        }
    }

    /// Converts a scalar along a primitive widening conversion.
    ///
    /// Returns `None` if the value is not a scalar or `to` is not reachable
    /// from its type (see [`crate::widening::can_widen`]).
    pub fn widen(&self, to: PrimitiveType) -> Option<Value> {
        let from = self.primitive_type()?;
        if from == to {
            return Some(self.clone());
        }
        if !crate::widening::can_widen(from, to) {
            return None;
        }
        match to {
            PrimitiveType::Short => {
                self.as_i64().and_then(|v| i16::try_from(v).ok()).map(Value::Short)
            }
            PrimitiveType::Int => self.as_i64().and_then(|v| i32::try_from(v).ok()).map(Value::Int),
            PrimitiveType::Long => self.as_i64().map(Value::Long),
            PrimitiveType::Float => self.as_f64().map(|v| Value::Float(v as f32)),
            PrimitiveType::Double => self.as_f64().map(Value::Double),
            PrimitiveType::Boolean | PrimitiveType::Byte | PrimitiveType::Char => None,
        }
    }

    /// Integral scalar as `i64`. Chars widen to their code point.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Byte(v) => Some(i64::from(*v)),
            Value::Short(v) => Some(i64::from(*v)),
            Value::Char(c) => Some(i64::from(u32::from(*c))),
            Value::Int(v) => Some(i64::from(*v)),
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric scalar as `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    /// Human-readable runtime type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Str(_) => "String",
            Value::List(_) => "List",
            Value::Object { .. } => "Object",
            scalar => scalar.primitive_type().map(PrimitiveType::name).unwrap_or("Object"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Byte(v) => write!(f, "{}", v),
            Value::Short(v) => write!(f, "{}", v),
            Value::Char(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Object { repr, .. } => f.write_str(repr),
        }
    }
}
