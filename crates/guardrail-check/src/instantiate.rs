//! Handler instantiation with constructor-argument injection.
//!
//! An [`Instantiator`] is built once per handler type. Building it picks the
//! constructor and checks every parameter against the injectable set, so bad
//! wiring fails before any value is ever checked.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use guardrail_core::{
    Annotation, ConstructorDef, GenericType, HandlerInstance, Injected, TypeId, TypeRegistry,
};

use crate::cache::OnceMap;
use crate::error::GuardConfigError;

/// How one constructor parameter is filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Injection {
    /// The guard annotation instance; its type must match exactly.
    Annotation(TypeId),
    /// The target's generic type.
    TypeToken,
    /// The target's raw class.
    Class,
}

/// Constructs instances of one handler type.
#[derive(Debug, Clone)]
pub struct Instantiator {
    handler_type: TypeId,
    handler_name: String,
    constructor: ConstructorDef,
    wiring: Vec<Injection>,
}

impl Instantiator {
    /// Chooses the constructor of `handler_type`: the only public one, or
    /// else the only designated one.
    pub fn new(registry: &TypeRegistry, handler_type: TypeId) -> Result<Self, GuardConfigError> {
        let handler_name = registry.qualified_name(handler_type);
        let handler = registry
            .class(handler_type)
            .and_then(|c| c.handler.as_ref())
            .ok_or_else(|| GuardConfigError::HandlerNotImplemented {
                handler: handler_name.clone(),
            })?;

        let public: Vec<&ConstructorDef> =
            handler.constructors.iter().filter(|c| c.public).collect();
        let designated: Vec<&ConstructorDef> =
            handler.constructors.iter().filter(|c| c.designated).collect();
        let constructor = match (public.as_slice(), designated.as_slice()) {
            ([only], _) => *only,
            (_, [only]) => *only,
            (_, []) => {
                return Err(GuardConfigError::NoSuitableConstructor {
                    handler: handler_name,
                })
            }
            (_, many) => {
                return Err(GuardConfigError::MultipleDesignatedConstructors {
                    handler: handler_name,
                    count: many.len(),
                })
            }
        };

        let wiring = constructor
            .params
            .iter()
            .enumerate()
            .map(|(index, &param)| match param {
                TypeId::TYPE_TOKEN => Ok(Injection::TypeToken),
                TypeId::CLASS => Ok(Injection::Class),
                ty if registry.is_annotation(ty) => Ok(Injection::Annotation(ty)),
                ty => Err(GuardConfigError::UnsupportedConstructorParameter {
                    handler: handler_name.clone(),
                    index,
                    parameter: registry.qualified_name(ty),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Instantiator {
            handler_type,
            handler_name,
            constructor: constructor.clone(),
            wiring,
        })
    }

    pub fn handler_type(&self) -> TypeId {
        self.handler_type
    }

    /// Builds a handler for `annotation` applied to a target of `target_type`.
    ///
    /// With `contain_panics`, a panicking constructor becomes
    /// [`GuardConfigError::HandlerConstruction`]; otherwise it unwinds.
    pub fn instantiate(
        &self,
        registry: &TypeRegistry,
        annotation: &Annotation,
        target_type: &GenericType,
        contain_panics: bool,
    ) -> Result<HandlerInstance, GuardConfigError> {
        let mut args = Vec::with_capacity(self.wiring.len());
        for injection in &self.wiring {
            args.push(match *injection {
                Injection::Annotation(expected) if expected != annotation.type_id => {
                    return Err(GuardConfigError::AnnotationMismatch {
                        handler: self.handler_name.clone(),
                        expected: registry.qualified_name(expected),
                        actual: registry.qualified_name(annotation.type_id),
                    })
                }
                Injection::Annotation(_) => Injected::Annotation(annotation.clone()),
                Injection::TypeToken => Injected::TypeToken(target_type.clone()),
                Injection::Class => Injected::Class(target_type.raw),
            });
        }

        let built = if contain_panics {
            panic::catch_unwind(AssertUnwindSafe(|| self.constructor.construct(&args)))
                .unwrap_or_else(|payload| Err(format!("panicked: {}", panic_message(&*payload))))
        } else {
            self.constructor.construct(&args)
        };
        built.map_err(|reason| GuardConfigError::HandlerConstruction {
            handler: self.handler_name.clone(),
            reason,
        })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Per-handler-type instantiator cache. Wiring errors are cached too.
#[derive(Debug, Default)]
pub struct InstantiatorCache {
    entries: OnceMap<TypeId, Result<Arc<Instantiator>, GuardConfigError>>,
}

impl InstantiatorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(
        &self,
        registry: &TypeRegistry,
        handler_type: TypeId,
    ) -> Result<Arc<Instantiator>, GuardConfigError> {
        self.entries.get_or_init(handler_type, || {
            Instantiator::new(registry, handler_type).map(Arc::new)
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardrail_core::{AnnotationDef, AttrValue, ClassDef, HandlerImpl};

    struct MinHandler {
        min: i64,
        target: TypeId,
    }

    fn declare_min(reg: &mut TypeRegistry) -> TypeId {
        reg.declare_annotation(
            "demo",
            "Min",
            AnnotationDef::new()
                .attribute("value")
                .meta(Annotation::new(TypeId::GUARD)),
        )
        .unwrap()
    }

    fn declare_handler(reg: &mut TypeRegistry, handler: HandlerImpl) -> TypeId {
        reg.declare_class("demo", "MinHandler", ClassDef::class().handler(handler))
            .unwrap()
    }

    fn min_handler(min: TypeId) -> HandlerImpl {
        HandlerImpl::builder::<MinHandler>()
            .constructor(vec![min, TypeId::CLASS], |args| {
                let min = args[0]
                    .as_annotation()
                    .and_then(|a| a.get("value"))
                    .and_then(AttrValue::as_int)
                    .ok_or("missing value")?;
                let target = args[1].as_class().ok_or("missing class")?;
                Ok(MinHandler { min, target })
            })
            .test(TypeId::LONG, |h, v| v.as_i64().is_some_and(|x| x >= h.min))
            .build()
    }

    #[test]
    fn injects_annotation_and_class() {
        let mut reg = TypeRegistry::new();
        let min = declare_min(&mut reg);
        let h = declare_handler(&mut reg, min_handler(min));

        let inst = Instantiator::new(&reg, h).unwrap();
        let ann = Annotation::new(min).with("value", 5);
        let built = inst
            .instantiate(&reg, &ann, &TypeId::INT.into(), true)
            .unwrap();
        let state = built.downcast_ref::<MinHandler>().unwrap();
        assert_eq!(state.min, 5);
        assert_eq!(state.target, TypeId::INT);
    }

    #[test]
    fn injects_type_token() {
        let mut reg = TypeRegistry::new();
        let h = declare_handler(
            &mut reg,
            HandlerImpl::builder::<GenericType>()
                .constructor(vec![TypeId::TYPE_TOKEN], |args| {
                    args[0].as_type_token().cloned().ok_or_else(|| "no token".to_string())
                })
                .build(),
        );
        let ann = Annotation::new(TypeId::SENSITIVE);
        let token = GenericType::parameterized(TypeId::LIST, vec![TypeId::STRING.into()]);
        let built = Instantiator::new(&reg, h)
            .unwrap()
            .instantiate(&reg, &ann, &token, true)
            .unwrap();
        assert_eq!(built.downcast_ref::<GenericType>(), Some(&token));
    }

    #[test]
    fn designated_constructor_breaks_tie() {
        let mut reg = TypeRegistry::new();
        let h = declare_handler(
            &mut reg,
            HandlerImpl::builder::<u8>()
                .constructor(vec![], |_| Ok(1))
                .constructor(vec![], |_| Ok(2))
                .designated()
                .build(),
        );
        let built = Instantiator::new(&reg, h)
            .unwrap()
            .instantiate(&reg, &Annotation::new(TypeId::GUARD), &TypeId::INT.into(), true)
            .unwrap();
        assert_eq!(built.downcast_ref::<u8>(), Some(&2));
    }

    #[test]
    fn single_public_constructor_wins_over_private_ones() {
        let mut reg = TypeRegistry::new();
        let h = declare_handler(
            &mut reg,
            HandlerImpl::builder::<u8>()
                .private_constructor(vec![], |_| Ok(1))
                .constructor(vec![], |_| Ok(2))
                .build(),
        );
        let built = Instantiator::new(&reg, h)
            .unwrap()
            .instantiate(&reg, &Annotation::new(TypeId::GUARD), &TypeId::INT.into(), true)
            .unwrap();
        assert_eq!(built.downcast_ref::<u8>(), Some(&2));
    }

    #[test]
    fn no_suitable_constructor() {
        let mut reg = TypeRegistry::new();
        let h = declare_handler(
            &mut reg,
            HandlerImpl::builder::<u8>()
                .constructor(vec![], |_| Ok(1))
                .constructor(vec![], |_| Ok(2))
                .build(),
        );
        assert!(matches!(
            Instantiator::new(&reg, h),
            Err(GuardConfigError::NoSuitableConstructor { .. })
        ));

        let empty = ClassDef::class().handler(HandlerImpl::default());
        let empty = reg.declare_class("demo", "EmptyHandler", empty).unwrap();
        assert!(matches!(
            Instantiator::new(&reg, empty),
            Err(GuardConfigError::NoSuitableConstructor { .. })
        ));
    }

    #[test]
    fn class_without_handler_implementation() {
        let mut reg = TypeRegistry::new();
        let plain = reg.declare_class("demo", "Plain", ClassDef::class()).unwrap();
        let err = Instantiator::new(&reg, plain).unwrap_err();
        assert!(matches!(err, GuardConfigError::HandlerNotImplemented { .. }));
        assert_eq!(
            err.to_string(),
            "handler demo.Plain: class carries no handler implementation"
        );
    }

    #[test]
    fn multiple_designated_constructors() {
        let mut reg = TypeRegistry::new();
        let h = declare_handler(
            &mut reg,
            HandlerImpl::builder::<u8>()
                .private_constructor(vec![], |_| Ok(1))
                .designated()
                .private_constructor(vec![], |_| Ok(2))
                .designated()
                .build(),
        );
        assert!(matches!(
            Instantiator::new(&reg, h),
            Err(GuardConfigError::MultipleDesignatedConstructors { count: 2, .. })
        ));
    }

    #[test]
    fn unsupported_parameter_fails_eagerly() {
        let mut reg = TypeRegistry::new();
        let h = declare_handler(
            &mut reg,
            HandlerImpl::builder::<u8>()
                .constructor(vec![TypeId::CLASS, TypeId::STRING], |_| Ok(1))
                .build(),
        );
        match Instantiator::new(&reg, h) {
            Err(GuardConfigError::UnsupportedConstructorParameter { index, parameter, .. }) => {
                assert_eq!(index, 1);
                assert_eq!(parameter, "lang.String");
            }
            other => panic!("expected unsupported parameter, got {:?}", other),
        }
    }

    #[test]
    fn annotation_type_must_match() {
        let mut reg = TypeRegistry::new();
        let min = declare_min(&mut reg);
        let h = declare_handler(&mut reg, min_handler(min));
        let inst = Instantiator::new(&reg, h).unwrap();
        let err = inst
            .instantiate(&reg, &Annotation::new(TypeId::SENSITIVE), &TypeId::INT.into(), true)
            .unwrap_err();
        assert!(matches!(err, GuardConfigError::AnnotationMismatch { .. }));
    }

    #[test]
    fn constructor_errors_and_panics_become_config_errors() {
        let mut reg = TypeRegistry::new();
        let failing = declare_handler(
            &mut reg,
            HandlerImpl::builder::<u8>()
                .constructor(vec![], |_| Err("bad state".to_string()))
                .build(),
        );
        let err = Instantiator::new(&reg, failing)
            .unwrap()
            .instantiate(&reg, &Annotation::new(TypeId::GUARD), &TypeId::INT.into(), true)
            .unwrap_err();
        assert!(err.to_string().contains("bad state"));

        let panicking = reg
            .declare_class(
                "demo",
                "PanickyHandler",
                ClassDef::class().handler(
                    HandlerImpl::builder::<u8>()
                        .constructor(vec![], |_| panic!("boom"))
                        .build(),
                ),
            )
            .unwrap();
        let err = Instantiator::new(&reg, panicking)
            .unwrap()
            .instantiate(&reg, &Annotation::new(TypeId::GUARD), &TypeId::INT.into(), true)
            .unwrap_err();
        match err {
            GuardConfigError::HandlerConstruction { reason, .. } => {
                assert_eq!(reason, "panicked: boom")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn cache_builds_once_and_keeps_errors() {
        let mut reg = TypeRegistry::new();
        let min = declare_min(&mut reg);
        let good = declare_handler(&mut reg, min_handler(min));
        let plain = reg.declare_class("demo", "Plain", ClassDef::class()).unwrap();

        let cache = InstantiatorCache::new();
        let a = cache.get(&reg, good).unwrap();
        let b = cache.get(&reg, good).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.handler_type(), good);
        assert!(cache.get(&reg, plain).is_err());
        assert!(cache.get(&reg, plain).is_err());
        assert_eq!(cache.len(), 2);
    }
}
