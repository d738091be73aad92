// Server wiring
//
// Applies the declared virtual-host map on startup and tears everything
// down again on shutdown by applying an empty map, which stops any
// pulled streams and notifies modules of application deletion.

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info, warn};

use streamgate_core::models::ApplicationInfo;
use streamgate_core::module::Monitoring;
use streamgate_core::{Config, Orchestrator, SERVER_START_TIME};

pub struct StreamGateServer {
    config: Config,
    orchestrator: Arc<Orchestrator>,
}

impl StreamGateServer {
    #[must_use]
    pub fn new(config: Config) -> Self {
        let orchestrator = Arc::new(Orchestrator::with_monitoring(Arc::new(LogMonitoring)));
        Self {
            config,
            orchestrator,
        }
    }

    pub async fn run(&self) -> Result<()> {
        match self.orchestrator.apply_origin_map(&self.config.virtual_hosts) {
            Ok(()) => info!(
                virtual_hosts = self.config.virtual_hosts.len(),
                "Virtual host configuration applied"
            ),
            Err(e) => warn!(error = %e, "Virtual host configuration applied with failures"),
        }

        for name in self.orchestrator.virtual_host_names() {
            info!(vhost = %name, "Virtual host is ready");
        }

        tokio::signal::ctrl_c().await?;
        info!(
            uptime_secs = SERVER_START_TIME.elapsed().as_secs(),
            "Shutdown signal received"
        );

        // Applying an empty map deletes every virtual host and stops any
        // streams they still own
        if let Err(e) = self.orchestrator.apply_origin_map(&[]) {
            error!(error = %e, "Teardown finished with failures");
        }

        Ok(())
    }
}

/// Monitoring sink that records application lifecycle events in the log.
struct LogMonitoring;

impl Monitoring for LogMonitoring {
    fn on_application_created(&self, app: &ApplicationInfo) {
        info!(app = %app.name(), id = %app.id(), "Application created");
    }

    fn on_application_deleted(&self, app: &ApplicationInfo) {
        info!(app = %app.name(), id = %app.id(), "Application deleted");
    }
}
