//! Runtime behavior of guard handler classes.
//!
//! A handler class declares constructors (with the parameter types the engine
//! injects against) and one or more `test` methods, each accepting exactly one
//! value of a declared type. Both are stored type-erased so the registry can
//! hold handlers of any state type; [`HandlerBuilder`] keeps the declaration
//! site typed.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::type_id::TypeId;
use crate::types::{Annotation, GenericType};
use crate::value::Value;

/// A constructed handler. Test functions downcast it back to their state type.
pub type HandlerInstance = Arc<dyn Any + Send + Sync>;

type Factory = Arc<dyn Fn(&[Injected]) -> Result<HandlerInstance, String> + Send + Sync>;

/// Erased test function. Returns `None` when handed an instance of the wrong
/// state type.
pub type TestFn = Arc<dyn Fn(&(dyn Any + Send + Sync), &Value) -> Option<bool> + Send + Sync>;

/// A value injected into a handler constructor parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Injected {
    /// The guard annotation instance being applied.
    Annotation(Annotation),
    /// The target's declared (possibly parameterized) type.
    TypeToken(GenericType),
    /// The target's raw class.
    Class(TypeId),
}

impl Injected {
    pub fn as_annotation(&self) -> Option<&Annotation> {
        match self {
            Injected::Annotation(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_type_token(&self) -> Option<&GenericType> {
        match self {
            Injected::TypeToken(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<TypeId> {
        match self {
            Injected::Class(c) => Some(*c),
            _ => None,
        }
    }
}

/// A handler constructor.
#[derive(Clone)]
pub struct ConstructorDef {
    /// Declared parameter types, in order.
    pub params: Vec<TypeId>,
    pub public: bool,
    /// Marked as the constructor the engine must use.
    pub designated: bool,
    factory: Factory,
}

impl ConstructorDef {
    pub fn construct(&self, args: &[Injected]) -> Result<HandlerInstance, String> {
        (self.factory)(args)
    }
}

impl fmt::Debug for ConstructorDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructorDef")
            .field("params", &self.params)
            .field("public", &self.public)
            .field("designated", &self.designated)
            .finish_non_exhaustive()
    }
}

/// A `test` method: one value parameter of `parameter_type`, boolean result.
#[derive(Clone)]
pub struct TestMethodDef {
    pub parameter_type: TypeId,
    test: TestFn,
}

impl TestMethodDef {
    pub fn invoke(&self, handler: &HandlerInstance, value: &Value) -> Option<bool> {
        (self.test)(handler.as_ref(), value)
    }
}

impl fmt::Debug for TestMethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestMethodDef")
            .field("parameter_type", &self.parameter_type)
            .finish_non_exhaustive()
    }
}

/// Constructors and test methods of a handler class.
#[derive(Debug, Clone, Default)]
pub struct HandlerImpl {
    pub constructors: Vec<ConstructorDef>,
    pub test_methods: Vec<TestMethodDef>,
}

impl HandlerImpl {
    /// Starts a typed declaration for handler state `H`.
    pub fn builder<H: Send + Sync + 'static>() -> HandlerBuilder<H> {
        HandlerBuilder {
            inner: HandlerImpl::default(),
            _state: PhantomData,
        }
    }
}

/// Typed builder for [`HandlerImpl`].
pub struct HandlerBuilder<H> {
    inner: HandlerImpl,
    _state: PhantomData<fn() -> H>,
}

impl<H: Send + Sync + 'static> HandlerBuilder<H> {
    /// Adds a public constructor.
    pub fn constructor<F>(self, params: Vec<TypeId>, build: F) -> Self
    where
        F: Fn(&[Injected]) -> Result<H, String> + Send + Sync + 'static,
    {
        self.push_constructor(params, true, build)
    }

    /// Adds a non-public constructor.
    pub fn private_constructor<F>(self, params: Vec<TypeId>, build: F) -> Self
    where
        F: Fn(&[Injected]) -> Result<H, String> + Send + Sync + 'static,
    {
        self.push_constructor(params, false, build)
    }

    /// Marks the most recently added constructor as the designated one.
    pub fn designated(mut self) -> Self {
        if let Some(last) = self.inner.constructors.last_mut() {
            last.designated = true;
        }
        self
    }

    /// Adds a `test` method accepting values of `parameter_type`.
    pub fn test<F>(mut self, parameter_type: TypeId, test: F) -> Self
    where
        F: Fn(&H, &Value) -> bool + Send + Sync + 'static,
    {
        let test: TestFn = Arc::new(move |handler, value| {
            handler.downcast_ref::<H>().map(|h| test(h, value))
        });
        self.inner.test_methods.push(TestMethodDef {
            parameter_type,
            test,
        });
        self
    }

    pub fn build(self) -> HandlerImpl {
        self.inner
    }

    fn push_constructor<F>(mut self, params: Vec<TypeId>, public: bool, build: F) -> Self
    where
        F: Fn(&[Injected]) -> Result<H, String> + Send + Sync + 'static,
    {
        let factory: Factory =
            Arc::new(move |args| build(args).map(|h| Arc::new(h) as HandlerInstance));
        self.inner.constructors.push(ConstructorDef {
            params,
            public,
            designated: false,
            factory,
        });
        self
    }
}

impl<H: Default + Send + Sync + 'static> HandlerBuilder<H> {
    /// Adds a public no-argument constructor using `H::default()`.
    pub fn default_constructor(self) -> Self {
        self.constructor(Vec::new(), |_| Ok(H::default()))
    }
}
