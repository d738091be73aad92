// Module registry
//
// Insertion order is load-bearing: create/delete fan-out reaches modules
// in registration order.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{ModuleType, OrchestratorModule, ProviderKind};
use crate::error::{Error, Result};

/// One registered module.
#[derive(Clone)]
pub struct ModuleRecord {
    pub module_type: ModuleType,
    pub module: Arc<dyn OrchestratorModule>,
}

/// Point-in-time view of the registry.
///
/// Fan-out sites clone this under the registry lock and then release it,
/// so module callbacks never run with the registry locked.
#[derive(Clone)]
pub struct ModuleSnapshot {
    records: Vec<ModuleRecord>,
    media_router: Option<Arc<dyn OrchestratorModule>>,
}

impl ModuleSnapshot {
    /// Registered modules in registration order.
    #[must_use]
    pub fn records(&self) -> &[ModuleRecord] {
        &self.records
    }

    /// The distinguished media router, if one is registered.
    #[must_use]
    pub fn media_router(&self) -> Option<&Arc<dyn OrchestratorModule>> {
        self.media_router.as_ref()
    }

    /// First registered provider serving `kind`.
    #[must_use]
    pub fn provider_for_kind(&self, kind: ProviderKind) -> Option<Arc<dyn OrchestratorModule>> {
        self.records
            .iter()
            .filter(|record| record.module_type == ModuleType::Provider)
            .find(|record| {
                record
                    .module
                    .as_provider()
                    .is_some_and(|provider| provider.provider_kind() == kind)
            })
            .map(|record| Arc::clone(&record.module))
    }
}

struct RegistryInner {
    list: Vec<ModuleRecord>,
    by_type: HashMap<ModuleType, Vec<Arc<dyn OrchestratorModule>>>,
    media_router: Option<Arc<dyn OrchestratorModule>>,
}

/// Typed registry of pluggable modules keyed by capability.
pub struct ModuleRegistry {
    inner: Mutex<RegistryInner>,
}

impl ModuleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                list: Vec::new(),
                by_type: HashMap::new(),
                media_router: None,
            }),
        }
    }

    /// Register a module. Fails when the same instance is already present.
    pub fn register(&self, module: Arc<dyn OrchestratorModule>) -> Result<()> {
        let module_type = module.module_type();
        let mut inner = self.inner.lock();

        for record in &inner.list {
            if Arc::ptr_eq(&record.module, &module) {
                if record.module_type == module_type {
                    warn!(module_type = %module_type, "Module is already registered");
                } else {
                    warn!(
                        previous = %record.module_type,
                        current = %module_type,
                        "Module is already registered with a different type"
                    );
                }
                return Err(Error::AlreadyExists(module_type.name().to_string()));
            }
        }

        inner.list.push(ModuleRecord {
            module_type,
            module: Arc::clone(&module),
        });
        inner
            .by_type
            .entry(module_type)
            .or_default()
            .push(Arc::clone(&module));

        if module_type == ModuleType::MediaRouter {
            inner.media_router = Some(Arc::clone(&module));
        }

        debug!(module_type = %module_type, "Module registered");
        Ok(())
    }

    /// Unregister a module by identity. Removes it from the ordered list,
    /// the per-type bucket, and the media-router slot when it occupies it.
    pub fn unregister(&self, module: &Arc<dyn OrchestratorModule>) -> Result<()> {
        let mut inner = self.inner.lock();

        let Some(position) = inner
            .list
            .iter()
            .position(|record| Arc::ptr_eq(&record.module, module))
        else {
            warn!(
                module_type = %module.module_type(),
                "Module not found for unregistration"
            );
            return Err(Error::NotFound(module.module_type().name().to_string()));
        };

        let record = inner.list.remove(position);

        if let Some(bucket) = inner.by_type.get_mut(&record.module_type) {
            bucket.retain(|entry| !Arc::ptr_eq(entry, module));
        }

        if inner
            .media_router
            .as_ref()
            .is_some_and(|router| Arc::ptr_eq(router, module))
        {
            inner.media_router = None;
        }

        debug!(module_type = %record.module_type, "Module unregistered");
        Ok(())
    }

    /// Insertion-ordered modules of one capability kind.
    #[must_use]
    pub fn modules_of_type(&self, module_type: ModuleType) -> Vec<Arc<dyn OrchestratorModule>> {
        self.inner
            .lock()
            .by_type
            .get(&module_type)
            .cloned()
            .unwrap_or_default()
    }

    /// Snapshot the registry for fan-out outside the lock.
    #[must_use]
    pub fn snapshot(&self) -> ModuleSnapshot {
        let inner = self.inner.lock();
        ModuleSnapshot {
            records: inner.list.clone(),
            media_router: inner.media_router.clone(),
        }
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
