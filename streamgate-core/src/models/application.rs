use serde::{Deserialize, Serialize};

use crate::config::{ApplicationConfig, HostConfig};
use crate::models::VHostAppName;

/// Process-wide application identifier. Strictly monotonic, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub u32);

impl std::fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Descriptor handed to modules for application create/delete events.
///
/// Modules must not hold on to this beyond the callback; they revalidate
/// through the orchestrator by id on later calls.
#[derive(Debug, Clone)]
pub struct ApplicationInfo {
    id: ApplicationId,
    name: VHostAppName,
    host: HostConfig,
    app_config: ApplicationConfig,
}

impl ApplicationInfo {
    #[must_use]
    pub fn new(
        id: ApplicationId,
        name: VHostAppName,
        host: HostConfig,
        app_config: ApplicationConfig,
    ) -> Self {
        Self {
            id,
            name,
            host,
            app_config,
        }
    }

    #[must_use]
    pub fn id(&self) -> ApplicationId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &VHostAppName {
        &self.name
    }

    #[must_use]
    pub fn host(&self) -> &HostConfig {
        &self.host
    }

    #[must_use]
    pub fn app_config(&self) -> &ApplicationConfig {
        &self.app_config
    }
}
