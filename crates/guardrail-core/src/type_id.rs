//! TypeId and TypeRegistry for nominal typing.
//!
//! Every declared type has a unique [`TypeId`] providing O(1) identity
//! comparison. The [`TypeRegistry`] manages registration and lookup, and
//! pre-registers the primitives, the core library types the engine reasons
//! about (wrappers, `String`, the collection interfaces), the language
//! meta-annotations and the guard markers.

use std::collections::{HashMap, HashSet};
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::handler::HandlerImpl;
use crate::types::{
    Annotation, AnnotationDef, AttrValue, ClassDef, GenericType, MemberDef, PrimitiveType,
    TypeDef, TypeKind,
};

/// Unique identifier for a type in the type registry.
///
/// The inner value is an index into the [`TypeRegistry`]'s type vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeId(pub u32);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

/// Pre-registered TypeId constants for built-in types.
impl TypeId {
    pub const VOID: TypeId = TypeId(0);
    pub const BOOLEAN: TypeId = TypeId(1);
    pub const BYTE: TypeId = TypeId(2);
    pub const SHORT: TypeId = TypeId(3);
    pub const CHAR: TypeId = TypeId(4);
    pub const INT: TypeId = TypeId(5);
    pub const LONG: TypeId = TypeId(6);
    pub const FLOAT: TypeId = TypeId(7);
    pub const DOUBLE: TypeId = TypeId(8);
    pub const OBJECT: TypeId = TypeId(9);
    pub const BOOLEAN_BOX: TypeId = TypeId(10);
    pub const BYTE_BOX: TypeId = TypeId(11);
    pub const SHORT_BOX: TypeId = TypeId(12);
    pub const CHARACTER: TypeId = TypeId(13);
    pub const INTEGER: TypeId = TypeId(14);
    pub const LONG_BOX: TypeId = TypeId(15);
    pub const FLOAT_BOX: TypeId = TypeId(16);
    pub const DOUBLE_BOX: TypeId = TypeId(17);
    pub const NUMBER: TypeId = TypeId(18);
    pub const CHAR_SEQUENCE: TypeId = TypeId(19);
    pub const STRING: TypeId = TypeId(20);
    pub const ITERABLE: TypeId = TypeId(21);
    pub const COLLECTION: TypeId = TypeId(22);
    pub const LIST: TypeId = TypeId(23);
    /// Raw class token injected into handler constructors.
    pub const CLASS: TypeId = TypeId(24);
    /// Generic type token injected into handler constructors.
    pub const TYPE_TOKEN: TypeId = TypeId(25);
    /// The capability every guard handler class implements.
    pub const GUARD_HANDLER: TypeId = TypeId(26);
    pub const RETENTION: TypeId = TypeId(27);
    pub const TARGET: TypeId = TypeId(28);
    pub const DOCUMENTED: TypeId = TypeId(29);
    pub const INHERITED: TypeId = TypeId(30);
    pub const REPEATABLE: TypeId = TypeId(31);
    /// The guard marker meta-annotation.
    pub const GUARD: TypeId = TypeId(32);
    /// Marks a parameter or member whose values must never be rendered.
    pub const SENSITIVE: TypeId = TypeId(33);

    /// Language meta-annotations that never participate in guard
    /// classification.
    pub const LANGUAGE_META: [TypeId; 5] = [
        TypeId::RETENTION,
        TypeId::TARGET,
        TypeId::DOCUMENTED,
        TypeId::INHERITED,
        TypeId::REPEATABLE,
    ];
}

/// Attribute names declared by the [`TypeId::GUARD`] marker.
pub mod guard_attr {
    pub const MESSAGE: &str = "message";
    pub const HANDLER: &str = "handler";
    pub const TESTS_NULL: &str = "testsNull";
    pub const RELATIONS: &str = "relations";
    pub const ORDER: &str = "order";
}

/// Registry of all types in a program, providing nominal identity via [`TypeId`].
///
/// On construction, the registry pre-registers the 34 built-in types listed
/// as `TypeId` constants. User types start at `TypeId(34)`.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    /// Types indexed by TypeId.0
    types: Vec<TypeDef>,
    /// Qualified name lookup.
    names: HashMap<String, TypeId>,
}

impl TypeRegistry {
    /// Number of built-in types pre-registered on construction.
    pub const BUILTIN_COUNT: u32 = 34;

    /// Creates a new registry with the built-in types pre-registered.
    pub fn new() -> Self {
        let mut reg = TypeRegistry {
            types: Vec::new(),
            names: HashMap::new(),
        };
        for def in builtin_types() {
            let name = qualified(&def.package, &def.name);
            let id = TypeId(reg.types.len() as u32);
            reg.types.push(def);
            reg.names.insert(name, id);
        }
        debug_assert_eq!(reg.types.len() as u32, Self::BUILTIN_COUNT);
        reg
    }

    /// Registers a top-level class or interface.
    pub fn declare_class(
        &mut self,
        package: &str,
        name: &str,
        class: ClassDef,
    ) -> Result<TypeId, CoreError> {
        self.push(TypeDef {
            name: name.to_string(),
            package: package.to_string(),
            enclosing: None,
            kind: TypeKind::Class(class),
        })
    }

    /// Registers a class nested inside `enclosing`.
    pub fn declare_nested(
        &mut self,
        enclosing: TypeId,
        name: &str,
        class: ClassDef,
    ) -> Result<TypeId, CoreError> {
        let package = self
            .get(enclosing)
            .map(|def| def.package.clone())
            .ok_or(CoreError::TypeNotFound { id: enclosing })?;
        self.push(TypeDef {
            name: name.to_string(),
            package,
            enclosing: Some(enclosing),
            kind: TypeKind::Class(class),
        })
    }

    /// Registers an annotation type.
    pub fn declare_annotation(
        &mut self,
        package: &str,
        name: &str,
        def: AnnotationDef,
    ) -> Result<TypeId, CoreError> {
        self.push(TypeDef {
            name: name.to_string(),
            package: package.to_string(),
            enclosing: None,
            kind: TypeKind::Annotation(def),
        })
    }

    /// Adds a meta-annotation to an already registered annotation type.
    /// Needed to declare mutually meta-annotated types.
    pub fn add_meta_annotation(
        &mut self,
        annotation_type: TypeId,
        meta: Annotation,
    ) -> Result<(), CoreError> {
        let name = self.qualified_name(annotation_type);
        match self.types.get_mut(annotation_type.0 as usize).map(|d| &mut d.kind) {
            Some(TypeKind::Annotation(def)) => {
                def.meta.push(meta);
                Ok(())
            }
            Some(_) => Err(CoreError::NotAnAnnotation { name }),
            None => Err(CoreError::TypeNotFound { id: annotation_type }),
        }
    }

    /// Replaces the declared members of a class.
    pub fn set_members(&mut self, class: TypeId, members: Vec<MemberDef>) -> Result<(), CoreError> {
        self.class_mut(class)?.members = members;
        Ok(())
    }

    /// Attaches runtime handler behavior to a class, making it implement the
    /// handler capability.
    pub fn set_handler(&mut self, class: TypeId, handler: HandlerImpl) -> Result<(), CoreError> {
        let def = self.class_mut(class)?;
        if !def.supertypes.contains(&TypeId::GUARD_HANDLER) {
            def.supertypes.push(TypeId::GUARD_HANDLER);
        }
        def.handler = Some(handler);
        Ok(())
    }

    /// Looks up a type by its [`TypeId`].
    pub fn get(&self, id: TypeId) -> Option<&TypeDef> {
        self.types.get(id.0 as usize)
    }

    /// Looks up a type's [`TypeId`] by qualified name.
    pub fn get_by_name(&self, name: &str) -> Option<TypeId> {
        self.names.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn class(&self, id: TypeId) -> Option<&ClassDef> {
        self.get(id).and_then(TypeDef::as_class)
    }

    pub fn annotation(&self, id: TypeId) -> Option<&AnnotationDef> {
        self.get(id).and_then(TypeDef::as_annotation)
    }

    pub fn is_annotation(&self, id: TypeId) -> bool {
        self.annotation(id).is_some()
    }

    /// The primitive type of `id`, if it is one.
    pub fn primitive(&self, id: TypeId) -> Option<PrimitiveType> {
        match self.get(id).map(|d| &d.kind) {
            Some(TypeKind::Primitive(p)) => Some(*p),
            _ => None,
        }
    }

    /// The primitive boxed by `id`, if it is a wrapper class.
    pub fn unboxed(&self, id: TypeId) -> Option<PrimitiveType> {
        self.class(id).and_then(|c| c.boxes)
    }

    /// Fully qualified name, e.g. `lang.String` or `demo.Min.Handler`.
    /// Unknown ids render as `<unknown TypeId(n)>`.
    pub fn qualified_name(&self, id: TypeId) -> String {
        match self.get(id) {
            Some(def) => match def.enclosing {
                Some(outer) => format!("{}.{}", self.qualified_name(outer), def.name),
                None => qualified(&def.package, &def.name),
            },
            None => format!("<unknown {}>", id),
        }
    }

    /// Simple name, e.g. `String`, `int`, `Handler`.
    pub fn simple_name(&self, id: TypeId) -> String {
        self.get(id)
            .map(|def| def.name.clone())
            .unwrap_or_else(|| format!("<unknown {}>", id))
    }

    /// Renders a generic type with simple names, e.g. `List<String>`.
    pub fn render_type(&self, ty: &GenericType) -> String {
        let raw = self.simple_name(ty.raw);
        if ty.arguments.is_empty() {
            return raw;
        }
        let args: Vec<String> = ty.arguments.iter().map(|a| self.render_type(a)).collect();
        format!("{}<{}>", raw, args.join(", "))
    }

    /// Member signature used as the dispatch key: `name(paramTypes)` with raw
    /// qualified type names, e.g. `setAge(int)` or `<init>(lang.String, int)`.
    /// Overloads on same-named types from different packages stay distinct.
    pub fn signature(&self, member: &MemberDef) -> String {
        let params: Vec<String> = member
            .params
            .iter()
            .map(|p| self.qualified_name(p.ty.raw))
            .collect();
        format!("{}({})", member.name, params.join(", "))
    }

    /// Returns `true` if `sub` is `sup` or transitively declares it as a
    /// supertype. Every non-primitive type is a subtype of `OBJECT`.
    pub fn is_subtype(&self, sub: TypeId, sup: TypeId) -> bool {
        if sub == sup {
            return true;
        }
        if self.primitive(sub).is_some() || sub == TypeId::VOID || self.get(sub).is_none() {
            return false;
        }
        if sup == TypeId::OBJECT {
            return true;
        }
        let mut seen = HashSet::new();
        let mut stack = vec![sub];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            if let Some(class) = self.class(current) {
                for &parent in &class.supertypes {
                    if parent == sup {
                        return true;
                    }
                    stack.push(parent);
                }
            }
        }
        false
    }

    /// Reference assignability: a value of static type `from` may be passed
    /// where `to` is declared. Primitives are only assignable to themselves;
    /// widening is handled separately.
    pub fn is_assignable(&self, from: TypeId, to: TypeId) -> bool {
        if self.primitive(from).is_some() || self.primitive(to).is_some() {
            return from == to;
        }
        self.is_subtype(from, to)
    }

    /// The value of an annotation attribute: the use-site value if present,
    /// otherwise the default declared on the annotation type.
    pub fn attribute(&self, annotation: &Annotation, name: &str) -> Option<AttrValue> {
        if let Some(v) = annotation.get(name) {
            return Some(v.clone());
        }
        self.annotation(annotation.type_id)
            .and_then(|def| def.attributes.get(name))
            .and_then(|default| default.clone())
    }

    /// All attribute values of an annotation instance in declaration order,
    /// defaults included. Use-site values for undeclared names come last.
    pub fn attributes(&self, annotation: &Annotation) -> IndexMap<String, AttrValue> {
        let mut out = IndexMap::new();
        if let Some(def) = self.annotation(annotation.type_id) {
            for name in def.attributes.keys() {
                if let Some(v) = self.attribute(annotation, name) {
                    out.insert(name.clone(), v);
                }
            }
        }
        for (name, v) in &annotation.attributes {
            if !out.contains_key(name) {
                out.insert(name.clone(), v.clone());
            }
        }
        out
    }

    fn push(&mut self, def: TypeDef) -> Result<TypeId, CoreError> {
        let name = match def.enclosing {
            Some(outer) => format!("{}.{}", self.qualified_name(outer), def.name),
            None => qualified(&def.package, &def.name),
        };
        if self.names.contains_key(&name) {
            return Err(CoreError::DuplicateTypeName { name });
        }
        let id = TypeId(self.types.len() as u32);
        self.types.push(def);
        self.names.insert(name, id);
        Ok(id)
    }

    fn class_mut(&mut self, id: TypeId) -> Result<&mut ClassDef, CoreError> {
        let name = self.qualified_name(id);
        match self.types.get_mut(id.0 as usize).map(|d| &mut d.kind) {
            Some(TypeKind::Class(c)) => Ok(c),
            Some(_) => Err(CoreError::NotAClass { name }),
            None => Err(CoreError::TypeNotFound { id }),
        }
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn qualified(package: &str, name: &str) -> String {
    if package.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", package, name)
    }
}

/// The built-in types, in `TypeId` order.
fn builtin_types() -> Vec<TypeDef> {
    const LANG: &str = "lang";
    const META: &str = "lang.annotation";
    const GUARD: &str = "guard";

    let primitive = |p: PrimitiveType| TypeDef {
        name: p.name().to_string(),
        package: String::new(),
        enclosing: None,
        kind: TypeKind::Primitive(p),
    };
    let class = |package: &str, name: &str, def: ClassDef| TypeDef {
        name: name.to_string(),
        package: package.to_string(),
        enclosing: None,
        kind: TypeKind::Class(def),
    };
    let annotation = |package: &str, name: &str, def: AnnotationDef| TypeDef {
        name: name.to_string(),
        package: package.to_string(),
        enclosing: None,
        kind: TypeKind::Annotation(def),
    };
    let wrapper = |name: &str, p: PrimitiveType, numeric: bool| {
        let mut def = ClassDef::class().boxing(p);
        if numeric {
            def = def.extends(TypeId::NUMBER);
        }
        class(LANG, name, def)
    };
    let runtime = || Annotation::new(TypeId::RETENTION).with("value", "RUNTIME");

    vec![
        TypeDef {
            name: "void".to_string(),
            package: String::new(),
            enclosing: None,
            kind: TypeKind::Void,
        },
        primitive(PrimitiveType::Boolean),
        primitive(PrimitiveType::Byte),
        primitive(PrimitiveType::Short),
        primitive(PrimitiveType::Char),
        primitive(PrimitiveType::Int),
        primitive(PrimitiveType::Long),
        primitive(PrimitiveType::Float),
        primitive(PrimitiveType::Double),
        class(LANG, "Object", ClassDef::class()),
        wrapper("Boolean", PrimitiveType::Boolean, false),
        wrapper("Byte", PrimitiveType::Byte, true),
        wrapper("Short", PrimitiveType::Short, true),
        wrapper("Character", PrimitiveType::Char, false),
        wrapper("Integer", PrimitiveType::Int, true),
        wrapper("Long", PrimitiveType::Long, true),
        wrapper("Float", PrimitiveType::Float, true),
        wrapper("Double", PrimitiveType::Double, true),
        class(LANG, "Number", ClassDef::class().abstract_class()),
        class(LANG, "CharSequence", ClassDef::interface()),
        class(LANG, "String", ClassDef::class().extends(TypeId::CHAR_SEQUENCE)),
        class(LANG, "Iterable", ClassDef::interface()),
        class(LANG, "Collection", ClassDef::interface().extends(TypeId::ITERABLE)),
        class(LANG, "List", ClassDef::interface().extends(TypeId::COLLECTION)),
        class(LANG, "Class", ClassDef::class()),
        class(LANG, "Type", ClassDef::interface()),
        class(GUARD, "GuardHandler", ClassDef::interface()),
        annotation(META, "Retention", AnnotationDef::new().attribute("value")),
        annotation(META, "Target", AnnotationDef::new().attribute("value")),
        annotation(META, "Documented", AnnotationDef::new()),
        annotation(META, "Inherited", AnnotationDef::new()),
        annotation(META, "Repeatable", AnnotationDef::new().attribute("value")),
        annotation(
            GUARD,
            "Guard",
            AnnotationDef::new()
                .attribute_with_default(guard_attr::MESSAGE, "")
                .attribute_with_default(guard_attr::HANDLER, TypeId::VOID)
                .attribute_with_default(guard_attr::TESTS_NULL, false)
                .attribute_with_default(guard_attr::RELATIONS, AttrValue::Array(Vec::new()))
                .attribute_with_default(guard_attr::ORDER, 0)
                .meta(runtime())
                .meta(Annotation::new(TypeId::DOCUMENTED)),
        ),
        annotation(GUARD, "Sensitive", AnnotationDef::new().meta(runtime())),
    ]
}
