// Orchestrator
//
// Reconciles declarative virtual-host configuration against runtime
// state, drives module fan-out for application lifecycle, and resolves
// stream locations to upstream pull URLs.
//
// Lock order is modules first, then the virtual-host list. Fan-out runs
// against a registry snapshot so module callbacks never execute with the
// registry locked.

mod application;
mod pull;
mod reconcile;
pub(crate) mod vhost;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::models::{ApplicationId, ApplicationInfo, VHostAppName};
use crate::module::{
    ModuleRegistry, ModuleType, Monitoring, OrchestratorModule, ProviderKind,
};
use vhost::{vhost_index, VirtualHost};

/// Outcome of an application lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    Succeeded,
    Failed,
    /// Idempotent-create collision; callers that treat "already there" as
    /// success should accept this.
    Exists,
    NotExists,
}

pub struct Orchestrator {
    registry: ModuleRegistry,
    vhosts: Mutex<Vec<VirtualHost>>,
    last_application_id: AtomicU32,
    monitoring: Option<Arc<dyn Monitoring>>,
}

impl Orchestrator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: ModuleRegistry::new(),
            vhosts: Mutex::new(Vec::new()),
            last_application_id: AtomicU32::new(0),
            monitoring: None,
        }
    }

    #[must_use]
    pub fn with_monitoring(monitoring: Arc<dyn Monitoring>) -> Self {
        Self {
            monitoring: Some(monitoring),
            ..Self::new()
        }
    }

    /// Register a pluggable module. Registration order determines fan-out
    /// order for application create/delete events.
    pub fn register_module(&self, module: Arc<dyn OrchestratorModule>) -> Result<()> {
        self.registry.register(module)
    }

    pub fn unregister_module(&self, module: &Arc<dyn OrchestratorModule>) -> Result<()> {
        self.registry.unregister(module)
    }

    /// Insertion-ordered modules of one capability kind.
    #[must_use]
    pub fn modules_of_type(&self, module_type: ModuleType) -> Vec<Arc<dyn OrchestratorModule>> {
        self.registry.modules_of_type(module_type)
    }

    pub(crate) fn next_app_id(&self) -> ApplicationId {
        ApplicationId(self.last_application_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Names of the reconciled virtual hosts, in configured order.
    #[must_use]
    pub fn virtual_host_names(&self) -> Vec<String> {
        self.vhosts.lock().iter().map(|v| v.name.clone()).collect()
    }

    /// Find the virtual host owning `domain_name`.
    ///
    /// Domains are scanned in configured order and the first pattern that
    /// matches the full hostname wins; that order is part of the contract.
    #[must_use]
    pub fn vhost_name_from_domain(&self, domain_name: &str) -> Option<String> {
        if domain_name.is_empty() {
            return None;
        }

        let hosts = self.vhosts.lock();
        for vhost in hosts.iter() {
            for domain in &vhost.domain_list {
                if domain.regex.is_match(domain_name) {
                    return Some(vhost.name.clone());
                }
            }
        }

        None
    }

    /// Compose an application name for a request that arrived on
    /// `domain_name`. Falls back to an empty vhost token when no virtual
    /// host owns the domain.
    #[must_use]
    pub fn resolve_application_name_from_domain(
        &self,
        domain_name: &str,
        app_name: &str,
    ) -> VHostAppName {
        let vhost_name = self.vhost_name_from_domain(domain_name).unwrap_or_else(|| {
            warn!(domain = domain_name, "Could not find VirtualHost for domain");
            String::new()
        });

        let resolved = VHostAppName::resolve(&vhost_name, app_name);
        debug!(
            resolved = %resolved,
            domain = domain_name,
            app = app_name,
            "Resolved application name"
        );
        resolved
    }

    /// Look up an application by composed name.
    #[must_use]
    pub fn get_application(&self, vhost_app_name: &VHostAppName) -> Option<ApplicationInfo> {
        let hosts = self.vhosts.lock();
        let index = vhost_index(&hosts, vhost_app_name.vhost_name())?;
        hosts[index]
            .app_map
            .values()
            .find(|app| app.app_info.name() == vhost_app_name)
            .map(|app| app.app_info.clone())
    }

    /// Look up an application by id within a virtual host.
    #[must_use]
    pub fn get_application_by_id(
        &self,
        vhost_name: &str,
        app_id: ApplicationId,
    ) -> Option<ApplicationInfo> {
        let hosts = self.vhosts.lock();
        let index = vhost_index(&hosts, vhost_name)?;
        hosts[index]
            .app_map
            .get(&app_id)
            .map(|app| app.app_info.clone())
    }

    /// Resolve the provider module responsible for `url`'s scheme.
    pub fn provider_for_url(&self, url: &str) -> Result<Arc<dyn OrchestratorModule>> {
        let parsed = Url::parse(url)?;
        let kind = ProviderKind::from_scheme(parsed.scheme())?;

        debug!(url, scheme = parsed.scheme(), "Obtaining provider for URL");

        self.registry
            .snapshot()
            .provider_for_kind(kind)
            .ok_or_else(|| Error::NoProvider(parsed.scheme().to_string()))
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_ids_are_strictly_monotonic() {
        let orchestrator = Orchestrator::new();
        let mut previous = ApplicationId(0);
        for _ in 0..100 {
            let id = orchestrator.next_app_id();
            assert!(id > previous);
            previous = id;
        }
    }

    #[test]
    fn test_provider_for_url_rejects_invalid_url() {
        let orchestrator = Orchestrator::new();
        assert!(matches!(
            orchestrator.provider_for_url("not a url"),
            Err(Error::Url(_))
        ));
    }

    #[test]
    fn test_provider_for_url_rejects_unknown_scheme() {
        let orchestrator = Orchestrator::new();
        assert!(matches!(
            orchestrator.provider_for_url("http://origin:9000/app/stream"),
            Err(Error::UnknownScheme(_))
        ));
    }

    #[test]
    fn test_provider_for_url_without_provider() {
        let orchestrator = Orchestrator::new();
        assert!(matches!(
            orchestrator.provider_for_url("ovt://origin:9000/app/stream"),
            Err(Error::NoProvider(_))
        ));
    }
}
