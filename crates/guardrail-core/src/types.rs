//! Type descriptions for the guarded host program.
//!
//! The engine has no runtime reflection to lean on, so everything it needs to
//! know about the program is declared up front: classes with their supertypes
//! and members, annotation types with their attributes and meta-annotations,
//! and the eight primitive types.
//!
//! All types use nominal identity via [`TypeId`]. Annotation attributes use
//! [`IndexMap`] so declaration order survives into rendered messages.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::handler::HandlerImpl;
use crate::type_id::TypeId;

/// The primitive (unboxed) value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveType {
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
}

impl PrimitiveType {
    pub const ALL: [PrimitiveType; 8] = [
        PrimitiveType::Boolean,
        PrimitiveType::Byte,
        PrimitiveType::Short,
        PrimitiveType::Char,
        PrimitiveType::Int,
        PrimitiveType::Long,
        PrimitiveType::Float,
        PrimitiveType::Double,
    ];

    /// Source-level keyword for the type.
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Byte => "byte",
            PrimitiveType::Short => "short",
            PrimitiveType::Char => "char",
            PrimitiveType::Int => "int",
            PrimitiveType::Long => "long",
            PrimitiveType::Float => "float",
            PrimitiveType::Double => "double",
        }
    }

    /// The pre-registered [`TypeId`] of this primitive.
    pub fn type_id(self) -> TypeId {
        match self {
            PrimitiveType::Boolean => TypeId::BOOLEAN,
            PrimitiveType::Byte => TypeId::BYTE,
            PrimitiveType::Short => TypeId::SHORT,
            PrimitiveType::Char => TypeId::CHAR,
            PrimitiveType::Int => TypeId::INT,
            PrimitiveType::Long => TypeId::LONG,
            PrimitiveType::Float => TypeId::FLOAT,
            PrimitiveType::Double => TypeId::DOUBLE,
        }
    }
}

/// A possibly parameterized type as written at a declaration site,
/// e.g. `List<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenericType {
    pub raw: TypeId,
    pub arguments: Vec<GenericType>,
}

impl GenericType {
    pub fn raw(raw: TypeId) -> Self {
        GenericType {
            raw,
            arguments: Vec::new(),
        }
    }

    pub fn parameterized(raw: TypeId, arguments: Vec<GenericType>) -> Self {
        GenericType { raw, arguments }
    }
}

impl From<TypeId> for GenericType {
    fn from(raw: TypeId) -> Self {
        GenericType::raw(raw)
    }
}

/// An annotation attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
    Type(TypeId),
    Array(Vec<AttrValue>),
    Annotation(Box<Annotation>),
}

impl AttrValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            AttrValue::Double(d) => Some(*d),
            AttrValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<TypeId> {
        match self {
            AttrValue::Type(t) => Some(*t),
            _ => None,
        }
    }

    /// Collects the type ids of a `Type[]` attribute. Non-type elements are
    /// skipped.
    pub fn as_types(&self) -> Vec<TypeId> {
        match self {
            AttrValue::Array(items) => items.iter().filter_map(AttrValue::as_type).collect(),
            AttrValue::Type(t) => vec![*t],
            _ => Vec::new(),
        }
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        AttrValue::Int(i64::from(v))
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Double(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Str(v)
    }
}

impl From<TypeId> for AttrValue {
    fn from(v: TypeId) -> Self {
        AttrValue::Type(v)
    }
}

impl From<Annotation> for AttrValue {
    fn from(v: Annotation) -> Self {
        AttrValue::Annotation(Box::new(v))
    }
}

/// An annotation instance: the annotation type plus the attribute values
/// written at the use site. Attributes left out fall back to the defaults
/// declared on the annotation type (see `TypeRegistry::attribute`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub type_id: TypeId,
    pub attributes: IndexMap<String, AttrValue>,
}

impl Annotation {
    pub fn new(type_id: TypeId) -> Self {
        Annotation {
            type_id,
            attributes: IndexMap::new(),
        }
    }

    /// Sets an attribute value, builder style.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// The value written at the use site, ignoring declared defaults.
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }
}

/// Declaration of an annotation type.
#[derive(Debug, Clone, Default)]
pub struct AnnotationDef {
    /// Attribute name -> declared default (`None` = must be supplied).
    pub attributes: IndexMap<String, Option<AttrValue>>,
    /// Meta-annotations carried by the annotation type itself.
    pub meta: Vec<Annotation>,
}

impl AnnotationDef {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an attribute without a default.
    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), None);
        self
    }

    /// Declares an attribute with a default value.
    pub fn attribute_with_default(
        mut self,
        name: impl Into<String>,
        default: impl Into<AttrValue>,
    ) -> Self {
        self.attributes.insert(name.into(), Some(default.into()));
        self
    }

    /// Adds a meta-annotation.
    pub fn meta(mut self, annotation: Annotation) -> Self {
        self.meta.push(annotation);
        self
    }
}

/// Method or constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberKind {
    Method,
    Constructor,
}

/// A declared parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDef {
    pub name: String,
    pub ty: GenericType,
    pub annotations: Vec<Annotation>,
}

impl ParamDef {
    pub fn new(name: impl Into<String>, ty: impl Into<GenericType>) -> Self {
        ParamDef {
            name: name.into(),
            ty: ty.into(),
            annotations: Vec::new(),
        }
    }

    pub fn annotated(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }
}

/// A declared method or constructor. Member-level annotations apply to the
/// return value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberDef {
    pub kind: MemberKind,
    pub name: String,
    pub params: Vec<ParamDef>,
    pub return_type: GenericType,
    pub annotations: Vec<Annotation>,
}

impl MemberDef {
    pub fn method(name: impl Into<String>, return_type: impl Into<GenericType>) -> Self {
        MemberDef {
            kind: MemberKind::Method,
            name: name.into(),
            params: Vec::new(),
            return_type: return_type.into(),
            annotations: Vec::new(),
        }
    }

    pub fn constructor() -> Self {
        MemberDef {
            kind: MemberKind::Constructor,
            name: "<init>".to_string(),
            params: Vec::new(),
            return_type: GenericType::raw(TypeId::VOID),
            annotations: Vec::new(),
        }
    }

    pub fn param(mut self, param: ParamDef) -> Self {
        self.params.push(param);
        self
    }

    pub fn annotated(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// Whether the member produces a value a return guard could check.
    pub fn returns_value(&self) -> bool {
        self.kind == MemberKind::Method && self.return_type.raw != TypeId::VOID
    }
}

/// Declaration of a class or interface.
#[derive(Debug, Clone, Default)]
pub struct ClassDef {
    pub is_interface: bool,
    pub is_abstract: bool,
    /// Direct supertypes. An empty list means the root `Object` type.
    pub supertypes: SmallVec<[TypeId; 4]>,
    /// For wrapper classes, the primitive they box.
    pub boxes: Option<PrimitiveType>,
    pub members: Vec<MemberDef>,
    /// Runtime behavior when the class is a guard handler.
    pub handler: Option<HandlerImpl>,
}

impl ClassDef {
    pub fn class() -> Self {
        Self::default()
    }

    pub fn interface() -> Self {
        ClassDef {
            is_interface: true,
            is_abstract: true,
            ..Self::default()
        }
    }

    pub fn extends(mut self, supertype: TypeId) -> Self {
        self.supertypes.push(supertype);
        self
    }

    pub fn abstract_class(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn boxing(mut self, primitive: PrimitiveType) -> Self {
        self.boxes = Some(primitive);
        self
    }

    pub fn member(mut self, member: MemberDef) -> Self {
        self.members.push(member);
        self
    }

    /// Declares the class as a guard handler: implements the handler
    /// capability and carries the given runtime behavior.
    pub fn handler(mut self, handler: HandlerImpl) -> Self {
        if !self.supertypes.contains(&TypeId::GUARD_HANDLER) {
            self.supertypes.push(TypeId::GUARD_HANDLER);
        }
        self.handler = Some(handler);
        self
    }
}

/// What kind of type a [`TypeDef`] describes.
#[derive(Debug, Clone)]
pub enum TypeKind {
    /// The no-value return type.
    Void,
    Primitive(PrimitiveType),
    Class(ClassDef),
    Annotation(AnnotationDef),
}

/// A registered type.
#[derive(Debug, Clone)]
pub struct TypeDef {
    /// Simple name.
    pub name: String,
    /// Dotted package; empty for primitives.
    pub package: String,
    /// Enclosing type for nested declarations.
    pub enclosing: Option<TypeId>,
    pub kind: TypeKind,
}

impl TypeDef {
    pub fn as_class(&self) -> Option<&ClassDef> {
        match &self.kind {
            TypeKind::Class(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_annotation(&self) -> Option<&AnnotationDef> {
        match &self.kind {
            TypeKind::Annotation(a) => Some(a),
            _ => None,
        }
    }
}
