//! Shared fixture: a small guarded domain registered the way a host would.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use guardrail_check::{GuardConfig, GuardRealm};
use guardrail_core::{
    guard_attr, Annotation, AnnotationDef, AttrValue, ClassDef, GenericType, HandlerImpl,
    MemberDef, ParamDef, ScopeId, TypeId, TypeRegistry, Value,
};

pub struct Fixture {
    pub registry: TypeRegistry,
    pub person: TypeId,
    pub min: TypeId,
    pub not_empty: TypeId,
    pub not_null: TypeId,
    pub positive: TypeId,
    /// Times any `MinHandler` was constructed.
    pub min_constructions: Arc<AtomicUsize>,
    /// `MinHandler` test overloads in the order they ran: `"int"` or `"long"`.
    pub min_overloads: Arc<Mutex<Vec<&'static str>>>,
}

impl Fixture {
    pub fn realm(self) -> GuardRealm {
        self.realm_with(GuardConfig::default())
    }

    pub fn realm_with(self, config: GuardConfig) -> GuardRealm {
        GuardRealm::new(ScopeId(1), self.registry, config)
    }

    pub fn constructions(&self) -> usize {
        self.min_constructions.load(Ordering::SeqCst)
    }
}

/// Shared counters for the `MinHandler` instances a realm creates.
#[derive(Clone, Default)]
pub struct MinLog {
    pub constructions: Arc<AtomicUsize>,
    pub overloads: Arc<Mutex<Vec<&'static str>>>,
}

impl MinLog {
    fn record(&self, overload: &'static str) {
        if let Ok(mut ran) = self.overloads.lock() {
            ran.push(overload);
        }
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

struct MinState {
    min: i64,
}

#[derive(Default)]
struct Stateless;

fn guard_marker() -> Annotation {
    Annotation::new(TypeId::GUARD)
}

struct Guards {
    min: TypeId,
    not_empty: TypeId,
    not_null: TypeId,
    positive: TypeId,
}

fn declare_guards(reg: &mut TypeRegistry, log: &MinLog) -> Guards {
    // @Min(value): handler found by sibling naming convention
    let min = reg
        .declare_annotation(
            "demo",
            "Min",
            AnnotationDef::new()
                .attribute("value")
                .meta(Annotation::new(TypeId::RETENTION).with("value", "RUNTIME"))
                .meta(guard_marker().with(guard_attr::MESSAGE, "must be at least {value}")),
        )
        .unwrap();
    let constructions = Arc::clone(&log.constructions);
    let (int_log, long_log) = (log.clone(), log.clone());
    let min_handler = HandlerImpl::builder::<MinState>()
        .constructor(vec![min], move |args| {
            constructions.fetch_add(1, Ordering::SeqCst);
            args[0]
                .as_annotation()
                .and_then(|a| a.get("value"))
                .and_then(AttrValue::as_int)
                .map(|min| MinState { min })
                .ok_or_else(|| "@Min without value".to_string())
        })
        .test(TypeId::INT, move |h, v| {
            int_log.record("int");
            matches!(v, Value::Int(x) if i64::from(*x) >= h.min)
        })
        .test(TypeId::LONG, move |h, v| {
            long_log.record("long");
            v.as_i64().is_some_and(|x| x >= h.min)
        })
        .build();
    reg.declare_class("demo", "MinHandler", ClassDef::class().handler(min_handler))
        .unwrap();

    // @NotEmpty: nested handler
    let not_empty = reg
        .declare_annotation("demo", "NotEmpty", AnnotationDef::new().meta(guard_marker()))
        .unwrap();
    let not_empty_handler = HandlerImpl::builder::<Stateless>()
        .default_constructor()
        .test(TypeId::CHAR_SEQUENCE, |_, v| matches!(v, Value::Str(s) if !s.is_empty()))
        .test(TypeId::COLLECTION, |_, v| matches!(v, Value::List(items) if !items.is_empty()))
        .build();
    reg.declare_nested(not_empty, "Handler", ClassDef::class().handler(not_empty_handler))
        .unwrap();

    // @NotNull: explicit handler, sees nulls
    let presence = reg
        .declare_class(
            "checks",
            "PresenceCheck",
            ClassDef::class().handler(
                HandlerImpl::builder::<Stateless>()
                    .default_constructor()
                    .test(TypeId::OBJECT, |_, v| !v.is_null())
                    .build(),
            ),
        )
        .unwrap();
    let not_null = reg
        .declare_annotation(
            "demo",
            "NotNull",
            AnnotationDef::new().meta(
                guard_marker()
                    .with(guard_attr::HANDLER, presence)
                    .with(guard_attr::TESTS_NULL, true)
                    .with(guard_attr::MESSAGE, "must not be null"),
            ),
        )
        .unwrap();

    // @Positive: composed from @Min(1), no handler of its own
    let positive = reg
        .declare_annotation(
            "demo",
            "Positive",
            AnnotationDef::new().meta(Annotation::new(min).with("value", 1)),
        )
        .unwrap();

    Guards {
        min,
        not_empty,
        not_null,
        positive,
    }
}

/// Guards whose resolution fails in various ways.
struct Broken {
    panicky: TypeId,
    loop_a: TypeId,
    either: TypeId,
    both: TypeId,
}

fn declare_broken(reg: &mut TypeRegistry) -> Broken {
    let panicky = reg
        .declare_annotation("demo", "Panicky", AnnotationDef::new().meta(guard_marker()))
        .unwrap();
    reg.declare_class(
        "demo",
        "PanickyHandler",
        ClassDef::class().handler(
            HandlerImpl::builder::<Stateless>()
                .constructor(vec![], |_| panic!("handler refused to start"))
                .test(TypeId::INT, |_, _| true)
                .build(),
        ),
    )
    .unwrap();

    let loop_a = reg
        .declare_annotation("demo", "LoopA", AnnotationDef::new().meta(guard_marker()))
        .unwrap();
    let loop_b = reg
        .declare_annotation("demo", "LoopB", AnnotationDef::new().meta(guard_marker()))
        .unwrap();
    reg.add_meta_annotation(loop_a, Annotation::new(loop_b)).unwrap();
    reg.add_meta_annotation(loop_b, Annotation::new(loop_a)).unwrap();

    let left = reg.declare_class("demo", "Left", ClassDef::interface()).unwrap();
    let right = reg.declare_class("demo", "Right", ClassDef::interface()).unwrap();
    let both = reg
        .declare_class("demo", "Both", ClassDef::class().extends(left).extends(right))
        .unwrap();
    let either = reg
        .declare_annotation("demo", "Either", AnnotationDef::new().meta(guard_marker()))
        .unwrap();
    reg.declare_class(
        "demo",
        "EitherHandler",
        ClassDef::class().handler(
            HandlerImpl::builder::<Stateless>()
                .default_constructor()
                .test(left, |_, _| true)
                .test(right, |_, _| true)
                .build(),
        ),
    )
    .unwrap();

    Broken {
        panicky,
        loop_a,
        either,
        both,
    }
}

/// Registry with a `demo.Person` class exercising every guard.
pub fn fixture() -> Fixture {
    let mut reg = TypeRegistry::new();
    let log = MinLog::default();
    let guards = declare_guards(&mut reg, &log);
    let broken = declare_broken(&mut reg);
    // same simple name, different packages
    let account_id = reg.declare_class("accounts", "Id", ClassDef::class()).unwrap();
    let order_id = reg.declare_class("orders", "Id", ClassDef::class()).unwrap();

    let at_least = |n: i64| Annotation::new(guards.min).with("value", n);
    let marked = |ann: TypeId| Annotation::new(ann);
    let param = |name: &str, ty: TypeId| ParamDef::new(name, ty);
    let setter = |name: &str, p: ParamDef| MemberDef::method(name, TypeId::VOID).param(p);
    let strings = GenericType::parameterized(TypeId::LIST, vec![TypeId::STRING.into()]);

    let members = vec![
        setter("setAge", param("age", TypeId::INT).annotated(at_least(0))),
        setter(
            "setLevel",
            param("level", TypeId::INT).annotated(at_least(0)).annotated(at_least(10)),
        ),
        setter("setQuantity", param("quantity", TypeId::INT).annotated(at_least(1))),
        setter("setBudget", param("budget", TypeId::LONG).annotated(at_least(0))),
        setter("setSmall", param("small", TypeId::SHORT).annotated(at_least(0))),
        setter("setScore", param("score", TypeId::DOUBLE).annotated(at_least(1))),
        setter("setCount", param("count", TypeId::INTEGER).annotated(marked(guards.positive))),
        MemberDef::method("name", TypeId::STRING).annotated(marked(guards.not_empty)),
        MemberDef::method("tags", strings).annotated(marked(guards.not_empty)),
        MemberDef::method("rename", TypeId::VOID)
            .param(param("name", TypeId::STRING).annotated(marked(guards.not_empty)))
            .param(
                param("secret", TypeId::STRING)
                    .annotated(marked(TypeId::SENSITIVE))
                    .annotated(marked(guards.not_empty)),
            ),
        setter(
            "setNickname",
            param("nickname", TypeId::STRING)
                .annotated(marked(guards.not_null))
                .annotated(marked(guards.not_empty)),
        ),
        MemberDef::method("setPair", TypeId::VOID)
            .param(param("first", TypeId::INT).annotated(marked(broken.panicky)))
            .param(param("second", TypeId::INT).annotated(at_least(0))),
        setter("setLoop", param("x", TypeId::INT).annotated(marked(broken.loop_a))),
        setter("setBoth", param("b", broken.both).annotated(marked(broken.either))),
        setter("find", param("id", account_id).annotated(marked(guards.not_null))),
        setter("find", param("id", order_id)),
        MemberDef::method("unguarded", TypeId::INT).param(param("x", TypeId::INT)),
        MemberDef::constructor().param(param("age", TypeId::INT).annotated(at_least(0))),
    ];
    let person = reg.declare_class("demo", "Person", ClassDef::class()).unwrap();
    reg.set_members(person, members).unwrap();

    Fixture {
        registry: reg,
        person,
        min: guards.min,
        not_empty: guards.not_empty,
        not_null: guards.not_null,
        positive: guards.positive,
        min_constructions: log.constructions,
        min_overloads: log.overloads,
    }
}

/// Drains the overload log, returning what ran since the last call.
pub fn take_overloads(overloads: &Mutex<Vec<&'static str>>) -> Vec<&'static str> {
    overloads.lock().map(|mut ran| std::mem::take(&mut *ran)).unwrap_or_default()
}
