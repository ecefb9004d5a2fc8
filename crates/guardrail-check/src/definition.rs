//! Guard definitions: the immutable, per-annotation-type description the
//! linker works from.
//!
//! A definition is built lazily on first request for an annotation type and
//! cached for the lifetime of the realm. Building one classifies the type,
//! reads the guard marker's attributes, resolves the handler class and
//! collects the implied guards (guard annotations found among the type's
//! own meta-annotations).

use std::sync::Arc;

use guardrail_core::{guard_attr, Annotation, TypeId, TypeRegistry};

use crate::cache::OnceMap;
use crate::classify::Classifier;
use crate::config::GuardConfig;
use crate::error::{Circularity, GuardConfigError};

/// Everything the engine needs to know about one guard annotation type.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardDefinition {
    pub annotation_type: TypeId,
    /// Qualified name of the annotation type.
    pub name: String,
    /// Carries the guard marker itself, as opposed to being a guard only
    /// through the guards it is composed of.
    pub marked: bool,
    /// Message template; `None` renders the annotation instead.
    pub message: Option<String>,
    /// The handler must also see `null` values.
    pub tests_null: bool,
    /// Related guard types. Ordering hint only.
    pub relations: Vec<TypeId>,
    /// Ordering hint only.
    pub order: i64,
    /// Handler class; present exactly when `marked`.
    pub handler: Option<TypeId>,
    /// Composed guard annotations, in declaration order.
    pub implied: Vec<Annotation>,
}

type DefinitionResult = Result<Option<Arc<GuardDefinition>>, GuardConfigError>;

/// Per-annotation-type definition cache.
#[derive(Debug, Default)]
pub struct DefinitionCache {
    classifier: Classifier,
    definitions: OnceMap<TypeId, DefinitionResult>,
}

impl DefinitionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// The definition for `annotation_type`, or `None` if it is not a guard.
    pub fn definition_for(
        &self,
        registry: &TypeRegistry,
        config: &GuardConfig,
        annotation_type: TypeId,
    ) -> DefinitionResult {
        self.definitions.get_or_init(annotation_type, || {
            self.build(registry, config, annotation_type)
        })
    }

    fn build(
        &self,
        registry: &TypeRegistry,
        config: &GuardConfig,
        annotation_type: TypeId,
    ) -> DefinitionResult {
        let name = registry.qualified_name(annotation_type);
        let circular = |source: Circularity| GuardConfigError::Circular {
            annotation: name.clone(),
            source,
        };

        if !self.classifier.is_guard(registry, annotation_type).map_err(circular)? {
            return Ok(None);
        }
        let def = registry
            .annotation(annotation_type)
            .ok_or(GuardConfigError::UnknownType { id: annotation_type })?;

        let mut marker = None;
        let mut implied = Vec::new();
        for meta in &def.meta {
            if meta.type_id == TypeId::GUARD {
                marker.get_or_insert(meta);
                continue;
            }
            if TypeId::LANGUAGE_META.contains(&meta.type_id) {
                continue;
            }
            if self.classifier.is_guard(registry, meta.type_id).map_err(circular)? {
                implied.push(meta.clone());
            }
        }

        let definition = match marker {
            Some(marker) => GuardDefinition {
                annotation_type,
                name: name.clone(),
                marked: true,
                message: registry
                    .attribute(marker, guard_attr::MESSAGE)
                    .and_then(|v| v.as_str().map(String::from))
                    .filter(|m| !m.is_empty()),
                tests_null: registry
                    .attribute(marker, guard_attr::TESTS_NULL)
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false),
                relations: registry
                    .attribute(marker, guard_attr::RELATIONS)
                    .map(|v| v.as_types())
                    .unwrap_or_default(),
                order: registry
                    .attribute(marker, guard_attr::ORDER)
                    .and_then(|v| v.as_int())
                    .unwrap_or(0),
                handler: Some(resolve_handler(registry, config, annotation_type, marker)?),
                implied,
            },
            None => GuardDefinition {
                annotation_type,
                name: name.clone(),
                marked: false,
                message: None,
                tests_null: false,
                relations: Vec::new(),
                order: 0,
                handler: None,
                implied,
            },
        };

        tracing::debug!(
            annotation = %name,
            marked = definition.marked,
            implied = definition.implied.len(),
            "guard definition built"
        );
        Ok(Some(Arc::new(definition)))
    }
}

/// Finds and validates the handler class of a marked guard.
///
/// Lookup order: the marker's explicit `handler` attribute; a nested class
/// named `Handler` that implements the handler capability; a sibling
/// `<Name>Handler` in the annotation's package; `<Name>Handler` in each
/// configured handler package.
pub fn resolve_handler(
    registry: &TypeRegistry,
    config: &GuardConfig,
    annotation_type: TypeId,
    marker: &Annotation,
) -> Result<TypeId, GuardConfigError> {
    let annotation = registry.qualified_name(annotation_type);
    let explicit = registry
        .attribute(marker, guard_attr::HANDLER)
        .and_then(|v| v.as_type())
        .filter(|t| *t != TypeId::VOID);

    let handler = match explicit {
        Some(handler) => handler,
        None => find_by_convention(registry, config, annotation_type)?,
    };
    validate_handler(registry, &annotation, handler)?;
    Ok(handler)
}

fn find_by_convention(
    registry: &TypeRegistry,
    config: &GuardConfig,
    annotation_type: TypeId,
) -> Result<TypeId, GuardConfigError> {
    let annotation = registry.qualified_name(annotation_type);
    let def = registry
        .get(annotation_type)
        .ok_or(GuardConfigError::UnknownType { id: annotation_type })?;

    let nested = format!("{}.Handler", annotation);
    if let Some(id) = registry.get_by_name(&nested) {
        if registry.is_subtype(id, TypeId::GUARD_HANDLER) {
            return Ok(id);
        }
    }

    let simple = format!("{}Handler", def.name);
    let mut searched = vec![nested];
    let packages = std::iter::once(def.package.as_str())
        .chain(config.handler_packages.iter().map(String::as_str));
    for package in packages {
        let candidate = if package.is_empty() {
            simple.clone()
        } else {
            format!("{}.{}", package, simple)
        };
        if let Some(id) = registry.get_by_name(&candidate) {
            return Ok(id);
        }
        searched.push(candidate);
    }

    Err(GuardConfigError::NoHandler {
        annotation,
        searched,
    })
}

fn validate_handler(
    registry: &TypeRegistry,
    annotation: &str,
    handler: TypeId,
) -> Result<(), GuardConfigError> {
    let handler_name = registry.qualified_name(handler);
    let not_a_handler = || GuardConfigError::NotAHandler {
        annotation: annotation.to_string(),
        handler: handler_name.clone(),
    };
    let class = registry.class(handler).ok_or_else(not_a_handler)?;
    if class.is_abstract {
        return Err(GuardConfigError::AbstractHandler {
            annotation: annotation.to_string(),
            handler: handler_name,
        });
    }
    if !registry.is_subtype(handler, TypeId::GUARD_HANDLER) || class.handler.is_none() {
        return Err(not_a_handler());
    }
    Ok(())
}
