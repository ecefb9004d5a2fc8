//! Violation construction and message rendering.

use std::fmt::Write as _;
use std::panic::Location;

use guardrail_core::{Annotation, AttrValue, TypeRegistry, Value};

use crate::link::GuardInstance;

/// Rendered in place of the value of a sensitive target.
pub const CONCEALED: &str = "(concealed)";

/// A value broke a guard. The only error a guarded call site is meant to see.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct GuardViolation {
    /// Full diagnostic line.
    pub message: String,
    /// The guard's own message: rendered template, or the annotation.
    pub guard_message: String,
    /// Description of the checked parameter or return value.
    pub target: String,
    /// Annotations from the use site down to the failing guard.
    pub chain: Vec<String>,
    /// Rendered offending value, `(concealed)` for sensitive targets.
    pub value: String,
    /// Where `check` was called from.
    pub location: &'static Location<'static>,
}

/// Builds the violation for `instance` rejecting `value`.
pub fn violation(
    instance: &GuardInstance,
    value: &Value,
    max_value_len: usize,
    location: &'static Location<'static>,
) -> GuardViolation {
    let rendered = if instance.target.sensitive {
        CONCEALED.to_string()
    } else if value.is_null() {
        "null".to_string()
    } else {
        format!("{} {}", value.type_name(), truncate(&value.to_string(), max_value_len))
    };
    let message = format!(
        "{} violated {}: {}; got {}",
        instance.description,
        instance.path.join(" -> "),
        instance.message,
        rendered
    );
    GuardViolation {
        message,
        guard_message: instance.message.clone(),
        target: instance.description.clone(),
        chain: instance.path.clone(),
        value: rendered,
        location,
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// `@Name(attr=value, ...)` with declared defaults filled in; `@Name` when
/// the annotation has no attributes.
pub fn render_annotation(registry: &TypeRegistry, annotation: &Annotation) -> String {
    let mut out = format!("@{}", registry.simple_name(annotation.type_id));
    let attributes = registry.attributes(annotation);
    if !attributes.is_empty() {
        let parts: Vec<String> = attributes
            .iter()
            .map(|(name, value)| format!("{}={}", name, render_attr(registry, value, true)))
            .collect();
        let _ = write!(out, "({})", parts.join(", "));
    }
    out
}

/// Substitutes `{attr}` placeholders with the annotation's attribute values.
/// Placeholders naming no attribute, and an unterminated `{`, are kept
/// verbatim.
pub fn render_template(registry: &TypeRegistry, template: &str, annotation: &Annotation) -> String {
    let attributes = registry.attributes(annotation);
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let name = &after[..close];
        match attributes.get(name) {
            Some(value) => out.push_str(&render_attr(registry, value, false)),
            None => {
                out.push('{');
                out.push_str(name);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

fn render_attr(registry: &TypeRegistry, value: &AttrValue, quote_strings: bool) -> String {
    match value {
        AttrValue::Bool(b) => b.to_string(),
        AttrValue::Int(i) => i.to_string(),
        AttrValue::Double(d) => d.to_string(),
        AttrValue::Str(s) if quote_strings => format!("\"{}\"", s),
        AttrValue::Str(s) => s.clone(),
        AttrValue::Type(t) => registry.simple_name(*t),
        AttrValue::Array(items) => {
            let items: Vec<String> = items
                .iter()
                .map(|v| render_attr(registry, v, quote_strings))
                .collect();
            format!("[{}]", items.join(", "))
        }
        AttrValue::Annotation(a) => render_annotation(registry, a),
    }
}
