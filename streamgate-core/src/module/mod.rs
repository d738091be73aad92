// Module capability interfaces
//
// The orchestrator drives pluggable modules through a closed set of
// capability kinds. Every module answers application create/delete
// events; providers and the media router expose extra surface reached
// through the capability accessors (no downcasting).

pub mod registry;

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::models::{ApplicationInfo, StreamId, StreamInfo};

pub use registry::{ModuleRecord, ModuleRegistry, ModuleSnapshot};

/// The four module capability kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleType {
    Provider,
    Publisher,
    MediaRouter,
    Transcoder,
}

impl ModuleType {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Provider => "Provider",
            Self::Publisher => "Publisher",
            Self::MediaRouter => "MediaRouter",
            Self::Transcoder => "Transcoder",
        }
    }
}

impl std::fmt::Display for ModuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Ingest protocols a provider module can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Rtmp,
    Rtsp,
    RtspPull,
    Ovt,
}

impl ProviderKind {
    /// Map an origin scheme to a provider kind. The mapping is closed;
    /// matching is case-insensitive.
    pub fn from_scheme(scheme: &str) -> Result<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "rtmp" => Ok(Self::Rtmp),
            "rtsp" => Ok(Self::Rtsp),
            "rtspc" => Ok(Self::RtspPull),
            "ovt" => Ok(Self::Ovt),
            _ => Err(Error::UnknownScheme(scheme.to_string())),
        }
    }
}

/// Base interface every pluggable module implements.
///
/// Capability accessors return `Some(self)` when the module carries the
/// corresponding extra surface.
pub trait OrchestratorModule: Send + Sync {
    fn module_type(&self) -> ModuleType;

    /// Notification that an application was created. Returning `false`
    /// aborts the creation and triggers rollback.
    fn on_create_application(&self, app: &ApplicationInfo) -> bool;

    /// Notification that an application was deleted. Delete fan-out is
    /// best-effort; a `false` here degrades the aggregate result but does
    /// not stop delivery to later modules.
    fn on_delete_application(&self, app: &ApplicationInfo) -> bool;

    fn as_provider(&self) -> Option<&dyn ProviderModule> {
        None
    }

    fn as_media_router(&self) -> Option<&dyn MediaRouterModule> {
        None
    }
}

/// Handle to a running ingest produced by a provider's pull.
pub trait ProviderStream: Send + Sync {
    fn id(&self) -> StreamId;
    fn name(&self) -> &str;
}

/// Extra surface of provider modules.
pub trait ProviderModule: OrchestratorModule {
    fn provider_kind(&self) -> ProviderKind;

    /// Pull a stream from the first reachable URL in `url_list`.
    /// Returns `None` when no upstream could be pulled.
    fn pull_stream(
        &self,
        app: &ApplicationInfo,
        stream_name: &str,
        url_list: &[String],
        offset: i64,
    ) -> Option<Arc<dyn ProviderStream>>;

    fn stop_stream(&self, app: &ApplicationInfo, stream: &Arc<dyn ProviderStream>) -> bool;

    fn check_origin_availability(&self, url_list: &[String]) -> bool;
}

/// Observer registered with the media router per application.
pub trait RouteObserver: Send + Sync {
    fn on_stream_created(&self, app: &ApplicationInfo, stream: &StreamInfo) -> bool;
    fn on_stream_deleted(&self, app: &ApplicationInfo, stream: &StreamInfo) -> bool;
}

/// Extra surface of the media router module.
pub trait MediaRouterModule: OrchestratorModule {
    fn register_observer_app(&self, app: &ApplicationInfo, observer: Arc<dyn RouteObserver>)
        -> bool;
    fn unregister_observer_app(
        &self,
        app: &ApplicationInfo,
        observer: Arc<dyn RouteObserver>,
    ) -> bool;
}

/// Monitoring sink for application lifecycle events.
pub trait Monitoring: Send + Sync {
    fn on_application_created(&self, app: &ApplicationInfo);
    fn on_application_deleted(&self, app: &ApplicationInfo);
}
