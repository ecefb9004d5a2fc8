//! Isolation scopes.
//!
//! A [`GuardRealm`] owns one frozen type registry, its configuration and
//! every cache derived from them. Registration into the registry happens
//! before the realm is built; afterwards everything resolves lazily on first
//! use. [`Realms`] is the arena of live realms: unloading a scope drops all
//! of its caches at once.

use std::panic::Location;
use std::sync::Arc;

use dashmap::DashMap;

use guardrail_core::{ScopeId, Slot, TypeId, TypeRegistry, Value};

use crate::config::GuardConfig;
use crate::definition::{DefinitionCache, GuardDefinition};
use crate::error::{Circularity, DispatchError, GuardConfigError};
use crate::instantiate::InstantiatorCache;
use crate::link::{LinkContext, Linker, MethodGuards, SlotStatus};

#[derive(Debug)]
pub struct GuardRealm {
    scope: ScopeId,
    registry: Arc<TypeRegistry>,
    config: GuardConfig,
    definitions: DefinitionCache,
    instantiators: InstantiatorCache,
    linker: Linker,
}

impl GuardRealm {
    pub fn new(
        scope: ScopeId,
        registry: impl Into<Arc<TypeRegistry>>,
        config: GuardConfig,
    ) -> Self {
        GuardRealm {
            scope,
            registry: registry.into(),
            config,
            definitions: DefinitionCache::new(),
            instantiators: InstantiatorCache::new(),
            linker: Linker::new(),
        }
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn is_guard(&self, annotation_type: TypeId) -> Result<bool, Circularity> {
        self.definitions
            .classifier()
            .is_guard(&self.registry, annotation_type)
    }

    pub fn definition_for(
        &self,
        annotation_type: TypeId,
    ) -> Result<Option<Arc<GuardDefinition>>, GuardConfigError> {
        self.definitions
            .definition_for(&self.registry, &self.config, annotation_type)
    }

    /// Scans `declaring_type` now instead of on its first check. Returns the
    /// number of guarded members.
    pub fn register(&self, declaring_type: TypeId) -> Result<usize, DispatchError> {
        let guards = self.guards_for(declaring_type)?;
        Ok(guards.guarded_members().count())
    }

    /// Checks `value` against the guards of one slot.
    ///
    /// `Ok` when the value passes, the member has no guards, or the slot was
    /// disabled by a configuration error. A violation carries the caller's
    /// location.
    #[track_caller]
    pub fn check(
        &self,
        declaring_type: TypeId,
        signature: &str,
        slot: Slot,
        value: &Value,
    ) -> Result<(), DispatchError> {
        let location = Location::caller();
        let guards = self.guards_for(declaring_type)?;
        match guards.slot(&self.registry, signature, slot)? {
            Some(cell) => cell.check(self.context(), value, location),
            None => Ok(()),
        }
    }

    /// Resolves one slot, if needed, and reports the outcome.
    pub fn slot_status(
        &self,
        declaring_type: TypeId,
        signature: &str,
        slot: Slot,
    ) -> Result<SlotStatus, DispatchError> {
        let guards = self.guards_for(declaring_type)?;
        Ok(match guards.slot(&self.registry, signature, slot)? {
            Some(cell) => cell.status(self.context()),
            None => SlotStatus::PassThrough,
        })
    }

    pub fn is_scanned(&self, declaring_type: TypeId) -> bool {
        self.linker.is_scanned(declaring_type)
    }

    fn guards_for(&self, declaring_type: TypeId) -> Result<Arc<MethodGuards>, DispatchError> {
        self.linker.guards_for(self.context(), declaring_type)
    }

    fn context(&self) -> LinkContext<'_> {
        LinkContext {
            registry: &self.registry,
            config: &self.config,
            definitions: &self.definitions,
            instantiators: &self.instantiators,
        }
    }
}

/// Arena of live realms keyed by scope.
#[derive(Debug, Default)]
pub struct Realms {
    realms: DashMap<ScopeId, Arc<GuardRealm>>,
}

impl Realms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `realm`, returning the realm it replaced, if any.
    pub fn insert(&self, realm: GuardRealm) -> Option<Arc<GuardRealm>> {
        let scope = realm.scope();
        tracing::debug!(%scope, "guard realm loaded");
        self.realms.insert(scope, Arc::new(realm))
    }

    pub fn get(&self, scope: ScopeId) -> Option<Arc<GuardRealm>> {
        self.realms.get(&scope).map(|r| Arc::clone(r.value()))
    }

    /// Removes the realm. Its caches are freed once the last outstanding
    /// handle is dropped.
    pub fn unload(&self, scope: ScopeId) -> Option<Arc<GuardRealm>> {
        let removed = self.realms.remove(&scope).map(|(_, realm)| realm);
        if removed.is_some() {
            tracing::debug!(%scope, "guard realm unloaded");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.realms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.realms.is_empty()
    }
}
