// Runtime virtual-host tree
//
// The orchestrator reconciles declared host configuration against this
// tree. Domain and origin lists keep configured order; it decides which
// domain pattern wins and which origin rule matches first.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use regex::Regex;
use tracing::debug;

use crate::config::{HostConfig, OriginConfig};
use crate::error::Result;
use crate::models::{ApplicationId, ApplicationInfo, StreamId, StreamInfo};
use crate::module::{OrchestratorModule, ProviderStream, RouteObserver};

/// Per-item reconciliation tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ItemState {
    /// Not yet visited by the current apply pass. An item still carrying
    /// this tag at the end of a scan was deleted from configuration.
    NeedToCheck,
    NotChanged,
    New,
    Changed,
    Applied,
    Delete,
}

/// A hostname pattern bound to a virtual host.
///
/// `*` in the configured name is a wildcard; everything else matches
/// literally against the full hostname.
pub(crate) struct Domain {
    pub name: String,
    pub regex: Regex,
    pub state: ItemState,
    pub stream_map: BTreeMap<StreamId, Arc<OrchestratorStream>>,
}

impl Domain {
    pub fn new(name: &str) -> Result<Self> {
        let pattern = format!("^{}$", regex::escape(name).replace(r"\*", ".*"));
        Ok(Self {
            name: name.to_string(),
            regex: Regex::new(&pattern)?,
            state: ItemState::New,
            stream_map: BTreeMap::new(),
        })
    }
}

/// A path-prefix rule mapping requests to upstream URLs.
pub(crate) struct Origin {
    pub location: String,
    pub config: OriginConfig,
    pub state: ItemState,
    pub stream_map: BTreeMap<StreamId, Arc<OrchestratorStream>>,
}

impl Origin {
    pub fn new(config: &OriginConfig) -> Self {
        Self {
            location: config.location.clone(),
            config: config.clone(),
            state: ItemState::New,
            stream_map: BTreeMap::new(),
        }
    }

    pub fn scheme(&self) -> &str {
        &self.config.scheme
    }

    pub fn urls(&self) -> &[String] {
        &self.config.urls
    }
}

/// A pulled ingest tracked by the orchestrator.
///
/// Shared between the matched origin's and domain's stream maps. Once
/// `is_valid` flips to false the provider has been asked to stop it.
pub(crate) struct OrchestratorStream {
    pub app_info: ApplicationInfo,
    pub provider: Arc<dyn OrchestratorModule>,
    pub provider_stream: Arc<dyn ProviderStream>,
    pub full_name: String,
    is_valid: AtomicBool,
}

impl OrchestratorStream {
    pub fn new(
        app_info: ApplicationInfo,
        provider: Arc<dyn OrchestratorModule>,
        provider_stream: Arc<dyn ProviderStream>,
        full_name: String,
    ) -> Self {
        Self {
            app_info,
            provider,
            provider_stream,
            full_name,
            is_valid: AtomicBool::new(true),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid.load(Ordering::SeqCst)
    }

    pub fn invalidate(&self) {
        self.is_valid.store(false, Ordering::SeqCst);
    }
}

/// Runtime application record. Sole ownership lives here; modules are
/// handed non-owning [`ApplicationInfo`] copies keyed by id.
pub(crate) struct Application {
    pub app_info: ApplicationInfo,
}

impl RouteObserver for Application {
    fn on_stream_created(&self, _app: &ApplicationInfo, stream: &StreamInfo) -> bool {
        debug!(stream = %stream.name, app = %self.app_info.name(), "Stream is created");
        true
    }

    fn on_stream_deleted(&self, _app: &ApplicationInfo, stream: &StreamInfo) -> bool {
        debug!(stream = %stream.name, app = %self.app_info.name(), "Stream is deleted");
        true
    }
}

/// One reconciled virtual host and everything it owns.
pub(crate) struct VirtualHost {
    pub name: String,
    pub host_config: HostConfig,
    pub state: ItemState,
    pub domain_list: Vec<Domain>,
    pub origin_list: Vec<Origin>,
    pub app_map: BTreeMap<ApplicationId, Arc<Application>>,
}

impl VirtualHost {
    /// Build a freshly-declared host; the host and all children are `New`.
    pub fn from_config(config: &HostConfig) -> Result<Self> {
        let mut domain_list = Vec::with_capacity(config.domains.len());
        for name in &config.domains {
            domain_list.push(Domain::new(name)?);
        }

        let origin_list = config.origins.iter().map(Origin::new).collect();

        Ok(Self {
            name: config.name.clone(),
            host_config: config.clone(),
            state: ItemState::New,
            domain_list,
            origin_list,
            app_map: BTreeMap::new(),
        })
    }

    /// Transition the host and all children from `expected` to `state`.
    /// Returns false when an item was not in the expected state (the item
    /// is left untouched).
    pub fn mark_all_as(&mut self, expected: ItemState, state: ItemState) -> bool {
        let mut ok = true;

        if self.state == expected {
            self.state = state;
        } else {
            ok = false;
        }

        for domain in &mut self.domain_list {
            if domain.state == expected {
                domain.state = state;
            } else {
                ok = false;
            }
        }

        for origin in &mut self.origin_list {
            if origin.state == expected {
                origin.state = state;
            } else {
                ok = false;
            }
        }

        ok
    }

    /// Transition the host and all children unconditionally.
    pub fn mark_all_as_unchecked(&mut self, state: ItemState) {
        self.state = state;
        for domain in &mut self.domain_list {
            domain.state = state;
        }
        for origin in &mut self.origin_list {
            origin.state = state;
        }
    }
}

/// Position of a host in the ordered runtime list.
pub(crate) fn vhost_index(hosts: &[VirtualHost], name: &str) -> Option<usize> {
    hosts.iter().position(|vhost| vhost.name == name)
}
