//! Integration tests for the orchestrator
//!
//! Exercises configuration reconciliation, application lifecycle fan-out,
//! and stream pull against recording mock modules.
//!
//! Run with: cargo test --test orchestrator_apply

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use streamgate_core::config::{ApplicationConfig, HostConfig, OriginConfig};
use streamgate_core::models::{ApplicationInfo, StreamId, VHostAppName};
use streamgate_core::module::{
    MediaRouterModule, ModuleType, OrchestratorModule, ProviderKind, ProviderModule,
    ProviderStream, RouteObserver,
};
use streamgate_core::{Error, OperationResult, Orchestrator};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Create { module: &'static str, app: String },
    Delete { module: &'static str, app: String },
}

type EventLog = Arc<Mutex<Vec<Event>>>;

struct MockModule {
    name: &'static str,
    module_type: ModuleType,
    log: EventLog,
    fail_create: AtomicBool,
    fail_delete: AtomicBool,
}

impl MockModule {
    fn new(name: &'static str, module_type: ModuleType, log: EventLog) -> Arc<Self> {
        Arc::new(Self {
            name,
            module_type,
            log,
            fail_create: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
        })
    }
}

impl OrchestratorModule for MockModule {
    fn module_type(&self) -> ModuleType {
        self.module_type
    }

    fn on_create_application(&self, app: &ApplicationInfo) -> bool {
        self.log.lock().push(Event::Create {
            module: self.name,
            app: app.name().to_string(),
        });
        !self.fail_create.load(Ordering::SeqCst)
    }

    fn on_delete_application(&self, app: &ApplicationInfo) -> bool {
        self.log.lock().push(Event::Delete {
            module: self.name,
            app: app.name().to_string(),
        });
        !self.fail_delete.load(Ordering::SeqCst)
    }
}

struct MockStream {
    id: StreamId,
    name: String,
}

impl ProviderStream for MockStream {
    fn id(&self) -> StreamId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct MockProvider {
    kind: ProviderKind,
    log: EventLog,
    next_stream_id: AtomicU32,
    pulled: Mutex<Vec<(String, Vec<String>)>>,
    stopped: Mutex<Vec<String>>,
    fail_pull: AtomicBool,
}

impl MockProvider {
    fn new(kind: ProviderKind, log: EventLog) -> Arc<Self> {
        Arc::new(Self {
            kind,
            log,
            next_stream_id: AtomicU32::new(0),
            pulled: Mutex::new(Vec::new()),
            stopped: Mutex::new(Vec::new()),
            fail_pull: AtomicBool::new(false),
        })
    }
}

impl OrchestratorModule for MockProvider {
    fn module_type(&self) -> ModuleType {
        ModuleType::Provider
    }

    fn on_create_application(&self, app: &ApplicationInfo) -> bool {
        self.log.lock().push(Event::Create {
            module: "provider",
            app: app.name().to_string(),
        });
        true
    }

    fn on_delete_application(&self, app: &ApplicationInfo) -> bool {
        self.log.lock().push(Event::Delete {
            module: "provider",
            app: app.name().to_string(),
        });
        true
    }

    fn as_provider(&self) -> Option<&dyn ProviderModule> {
        Some(self)
    }
}

impl ProviderModule for MockProvider {
    fn provider_kind(&self) -> ProviderKind {
        self.kind
    }

    fn pull_stream(
        &self,
        _app: &ApplicationInfo,
        stream_name: &str,
        url_list: &[String],
        _offset: i64,
    ) -> Option<Arc<dyn ProviderStream>> {
        if self.fail_pull.load(Ordering::SeqCst) {
            return None;
        }

        let id = StreamId(self.next_stream_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.pulled
            .lock()
            .push((stream_name.to_string(), url_list.to_vec()));

        Some(Arc::new(MockStream {
            id,
            name: stream_name.to_string(),
        }))
    }

    fn stop_stream(&self, _app: &ApplicationInfo, stream: &Arc<dyn ProviderStream>) -> bool {
        self.stopped.lock().push(stream.name().to_string());
        true
    }

    fn check_origin_availability(&self, _url_list: &[String]) -> bool {
        true
    }
}

struct MockRouter {
    log: EventLog,
    observed: Mutex<Vec<String>>,
    register_calls: AtomicUsize,
    unregister_calls: AtomicUsize,
}

impl MockRouter {
    fn new(log: EventLog) -> Arc<Self> {
        Arc::new(Self {
            log,
            observed: Mutex::new(Vec::new()),
            register_calls: AtomicUsize::new(0),
            unregister_calls: AtomicUsize::new(0),
        })
    }
}

impl OrchestratorModule for MockRouter {
    fn module_type(&self) -> ModuleType {
        ModuleType::MediaRouter
    }

    fn on_create_application(&self, app: &ApplicationInfo) -> bool {
        self.log.lock().push(Event::Create {
            module: "router",
            app: app.name().to_string(),
        });
        true
    }

    fn on_delete_application(&self, app: &ApplicationInfo) -> bool {
        self.log.lock().push(Event::Delete {
            module: "router",
            app: app.name().to_string(),
        });
        true
    }

    fn as_media_router(&self) -> Option<&dyn MediaRouterModule> {
        Some(self)
    }
}

impl MediaRouterModule for MockRouter {
    fn register_observer_app(
        &self,
        app: &ApplicationInfo,
        _observer: Arc<dyn RouteObserver>,
    ) -> bool {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        self.observed.lock().push(app.name().to_string());
        true
    }

    fn unregister_observer_app(
        &self,
        app: &ApplicationInfo,
        _observer: Arc<dyn RouteObserver>,
    ) -> bool {
        self.unregister_calls.fetch_add(1, Ordering::SeqCst);
        self.observed.lock().retain(|name| name != app.name().as_str());
        true
    }
}

fn host_config(name: &str, domains: &[&str], origins: &[(&str, &str, &[&str])]) -> HostConfig {
    HostConfig {
        name: name.to_string(),
        domains: domains.iter().map(|d| (*d).to_string()).collect(),
        origins: origins
            .iter()
            .map(|(location, scheme, urls)| OriginConfig {
                location: (*location).to_string(),
                scheme: (*scheme).to_string(),
                urls: urls.iter().map(|u| (*u).to_string()).collect(),
            })
            .collect(),
        applications: Vec::new(),
    }
}

fn h1() -> HostConfig {
    host_config(
        "h1",
        &["*.example.com"],
        &[("/app/", "ovt", &["origin:9000/a/"])],
    )
}

#[test]
fn test_new_vhost_is_created() {
    let log: EventLog = EventLog::default();
    let provider = MockProvider::new(ProviderKind::Ovt, log.clone());

    let orchestrator = Orchestrator::new();
    orchestrator.register_module(provider.clone()).unwrap();

    orchestrator.apply_origin_map(&[h1()]).unwrap();

    assert_eq!(orchestrator.virtual_host_names(), vec!["h1".to_string()]);
    assert_eq!(
        orchestrator.vhost_name_from_domain("cdn.example.com"),
        Some("h1".to_string())
    );
    assert!(provider.stopped.lock().is_empty());
}

#[test]
fn test_url_list_resolution() {
    let orchestrator = Orchestrator::new();
    orchestrator.apply_origin_map(&[h1()]).unwrap();

    let name = VHostAppName::parse("#h1#app").unwrap();
    let urls = orchestrator
        .get_url_list_for_location(&name, "mystream")
        .unwrap();

    assert_eq!(urls, vec!["ovt://origin:9000/a/mystream".to_string()]);
}

#[test]
fn test_url_list_resolution_misses() {
    let orchestrator = Orchestrator::new();
    orchestrator.apply_origin_map(&[h1()]).unwrap();

    // Unknown vhost
    let unknown_host = VHostAppName::parse("#h2#app").unwrap();
    assert!(matches!(
        orchestrator.get_url_list_for_location(&unknown_host, "mystream"),
        Err(Error::NotFound(_))
    ));

    // Known vhost, location outside every origin prefix
    let name = VHostAppName::parse("#h1#other").unwrap();
    assert!(matches!(
        orchestrator.get_url_list_for_location(&name, "mystream"),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn test_pull_stream_registers_and_origin_change_stops_it() {
    let log: EventLog = EventLog::default();
    let provider = MockProvider::new(ProviderKind::Ovt, log.clone());

    let orchestrator = Orchestrator::new();
    orchestrator.register_module(provider.clone()).unwrap();
    orchestrator.apply_origin_map(&[h1()]).unwrap();

    let name = VHostAppName::parse("#h1#app").unwrap();
    orchestrator.request_pull_stream(&name, "mystream", 0).unwrap();

    {
        let pulled = provider.pulled.lock();
        assert_eq!(pulled.len(), 1);
        assert_eq!(pulled[0].0, "mystream");
        assert_eq!(pulled[0].1, vec!["ovt://origin:9000/a/mystream".to_string()]);
    }

    // Same host, different upstream URL: the origin is Changed and the
    // previously pulled stream is stopped
    let changed = host_config(
        "h1",
        &["*.example.com"],
        &[("/app/", "ovt", &["origin2:9000/a/"])],
    );
    orchestrator.apply_origin_map(&[changed.clone()]).unwrap();

    assert_eq!(*provider.stopped.lock(), vec!["mystream".to_string()]);

    // The changed origin was torn down together with its streams; it is
    // not resolvable until the next apply pass re-discovers it
    assert!(matches!(
        orchestrator.get_url_list_for_location(&name, "mystream"),
        Err(Error::NotFound(_))
    ));

    orchestrator.apply_origin_map(&[changed]).unwrap();

    let urls = orchestrator
        .get_url_list_for_location(&name, "mystream")
        .unwrap();
    assert_eq!(urls, vec!["ovt://origin2:9000/a/mystream".to_string()]);
}

#[test]
fn test_vhost_deletion_tears_everything_down() {
    let log: EventLog = EventLog::default();
    let provider = MockProvider::new(ProviderKind::Ovt, log.clone());
    let publisher = MockModule::new("publisher", ModuleType::Publisher, log.clone());

    let orchestrator = Orchestrator::new();
    orchestrator.register_module(provider.clone()).unwrap();
    orchestrator.register_module(publisher).unwrap();
    orchestrator.apply_origin_map(&[h1()]).unwrap();

    let name = VHostAppName::parse("#h1#app").unwrap();
    orchestrator.request_pull_stream(&name, "mystream", 0).unwrap();
    assert!(orchestrator.get_application(&name).is_some());

    // Applying an empty host list deletes the vhost
    orchestrator.apply_origin_map(&[]).unwrap();

    assert!(orchestrator.virtual_host_names().is_empty());
    assert!(orchestrator.get_application(&name).is_none());
    assert_eq!(*provider.stopped.lock(), vec!["mystream".to_string()]);

    let deletes: Vec<Event> = log
        .lock()
        .iter()
        .filter(|event| matches!(event, Event::Delete { .. }))
        .cloned()
        .collect();
    assert_eq!(
        deletes,
        vec![
            Event::Delete {
                module: "provider",
                app: "#h1#app".to_string()
            },
            Event::Delete {
                module: "publisher",
                app: "#h1#app".to_string()
            },
        ]
    );
}

#[test]
fn test_final_apply_is_idempotent() {
    let first = vec![
        h1(),
        host_config("h2", &["h2.example.org"], &[("/live/", "rtmp", &["up:1935/live/"])]),
    ];
    let second = vec![
        host_config(
            "h2",
            &["h2.example.org", "alt.example.org"],
            &[("/live/", "rtmp", &["up2:1935/live/"])],
        ),
        host_config("h3", &["*.example.net"], &[("/vod/", "ovt", &["vod:9000/v/"])]),
    ];

    let incremental = Orchestrator::new();
    incremental.apply_origin_map(&first).unwrap();
    incremental.apply_origin_map(&second).unwrap();
    // A changed origin is torn down by the pass that detects it and
    // re-discovered as new on the following one; re-apply to converge
    incremental.apply_origin_map(&second).unwrap();

    let fresh = Orchestrator::new();
    fresh.apply_origin_map(&second).unwrap();

    assert_eq!(incremental.virtual_host_names(), fresh.virtual_host_names());

    for (vhost_app, stream) in [("#h2#live", "s1"), ("#h3#vod", "movie")] {
        let name = VHostAppName::parse(vhost_app).unwrap();
        let a = incremental.get_url_list_for_location(&name, stream).unwrap();
        let b = fresh.get_url_list_for_location(&name, stream).unwrap();
        assert_eq!(a, b);
    }

    for domain in ["h2.example.org", "alt.example.org", "x.example.net", "cdn.example.com"] {
        assert_eq!(
            incremental.vhost_name_from_domain(domain),
            fresh.vhost_name_from_domain(domain)
        );
    }
}

#[test]
fn test_application_ids_are_strictly_monotonic() {
    let orchestrator = Orchestrator::new();
    let host = h1();
    orchestrator.apply_origin_map(std::slice::from_ref(&host)).unwrap();

    let mut previous = None;
    for app_name in ["a", "b", "c", "d"] {
        let result = orchestrator.create_application(
            &host,
            &ApplicationConfig {
                name: app_name.to_string(),
            },
        );
        assert_eq!(result, OperationResult::Succeeded);

        let info = orchestrator
            .get_application(&VHostAppName::resolve("h1", app_name))
            .unwrap();
        if let Some(previous) = previous {
            assert!(info.id() > previous);
        }
        previous = Some(info.id());

        let by_id = orchestrator.get_application_by_id("h1", info.id()).unwrap();
        assert_eq!(by_id.name(), info.name());
    }
}

#[test]
fn test_provider_for_url_resolves_registered_provider() {
    let log: EventLog = EventLog::default();
    let provider = MockProvider::new(ProviderKind::Ovt, log);

    let orchestrator = Orchestrator::new();
    orchestrator.register_module(provider).unwrap();

    let module = orchestrator
        .provider_for_url("ovt://origin:9000/app/stream")
        .unwrap();
    assert_eq!(module.module_type(), ModuleType::Provider);

    assert!(orchestrator
        .provider_for_url("rtmp://origin:1935/app/stream")
        .is_err());
}

#[test]
fn test_create_notifies_modules_in_registration_order() {
    let log: EventLog = EventLog::default();
    let first = MockModule::new("first", ModuleType::Publisher, log.clone());
    let second = MockModule::new("second", ModuleType::Transcoder, log.clone());
    let router = MockRouter::new(log.clone());

    let orchestrator = Orchestrator::new();
    orchestrator.register_module(first).unwrap();
    orchestrator.register_module(second).unwrap();
    orchestrator.register_module(router.clone()).unwrap();

    let host = h1();
    orchestrator.apply_origin_map(std::slice::from_ref(&host)).unwrap();

    let result = orchestrator.create_application(
        &host,
        &ApplicationConfig {
            name: "app".to_string(),
        },
    );
    assert_eq!(result, OperationResult::Succeeded);

    assert_eq!(
        *log.lock(),
        vec![
            Event::Create {
                module: "first",
                app: "#h1#app".to_string()
            },
            Event::Create {
                module: "second",
                app: "#h1#app".to_string()
            },
            Event::Create {
                module: "router",
                app: "#h1#app".to_string()
            },
        ]
    );

    // The application became a route observer
    assert_eq!(*router.observed.lock(), vec!["#h1#app".to_string()]);
    assert_eq!(router.register_calls.load(Ordering::SeqCst), 1);

    // Creating it again is an idempotent collision
    let again = orchestrator.create_application(
        &host,
        &ApplicationConfig {
            name: "app".to_string(),
        },
    );
    assert_eq!(again, OperationResult::Exists);
}

#[test]
fn test_failed_create_rolls_back_notified_modules() {
    let log: EventLog = EventLog::default();
    let first = MockModule::new("first", ModuleType::Publisher, log.clone());
    let failing = MockModule::new("failing", ModuleType::Transcoder, log.clone());
    failing.fail_create.store(true, Ordering::SeqCst);
    let last = MockModule::new("last", ModuleType::Publisher, log.clone());
    let router = MockRouter::new(log.clone());

    let orchestrator = Orchestrator::new();
    orchestrator.register_module(first).unwrap();
    orchestrator.register_module(failing).unwrap();
    orchestrator.register_module(last).unwrap();
    orchestrator.register_module(router.clone()).unwrap();

    let host = h1();
    orchestrator.apply_origin_map(std::slice::from_ref(&host)).unwrap();

    let result = orchestrator.create_application(
        &host,
        &ApplicationConfig {
            name: "app".to_string(),
        },
    );
    assert_eq!(result, OperationResult::Failed);
    assert!(orchestrator
        .get_application(&VHostAppName::resolve("h1", "app"))
        .is_none());

    let events = log.lock().clone();

    // Fan-out stopped at the failing module
    let creates: Vec<&Event> = events
        .iter()
        .filter(|event| matches!(event, Event::Create { .. }))
        .collect();
    assert_eq!(creates.len(), 2);

    // Every module that saw the create also saw the rollback delete
    for module in ["first", "failing"] {
        assert!(events.contains(&Event::Delete {
            module,
            app: "#h1#app".to_string()
        }));
    }

    // The failed create never registered a route observer
    assert_eq!(router.register_calls.load(Ordering::SeqCst), 0);
    assert!(router.observed.lock().is_empty());
}

#[test]
fn test_delete_fan_out_is_best_effort_complete() {
    let log: EventLog = EventLog::default();
    let first = MockModule::new("first", ModuleType::Publisher, log.clone());
    let failing = MockModule::new("failing", ModuleType::Transcoder, log.clone());
    failing.fail_delete.store(true, Ordering::SeqCst);
    let last = MockModule::new("last", ModuleType::Publisher, log.clone());

    let orchestrator = Orchestrator::new();
    orchestrator.register_module(first).unwrap();
    orchestrator.register_module(failing).unwrap();
    orchestrator.register_module(last).unwrap();

    let host = h1();
    orchestrator.apply_origin_map(std::slice::from_ref(&host)).unwrap();

    assert_eq!(
        orchestrator.create_application(
            &host,
            &ApplicationConfig {
                name: "app".to_string()
            }
        ),
        OperationResult::Succeeded
    );

    let info = orchestrator
        .get_application(&VHostAppName::resolve("h1", "app"))
        .unwrap();
    let result = orchestrator.delete_application(&info);
    assert_eq!(result, OperationResult::Failed);

    // The failing module did not short-circuit delivery to later modules
    let deletes: Vec<&'static str> = log
        .lock()
        .iter()
        .filter_map(|event| match event {
            Event::Delete { module, .. } => Some(*module),
            Event::Create { .. } => None,
        })
        .collect();
    assert_eq!(deletes, vec!["first", "failing", "last"]);
}

#[test]
fn test_pull_failure_rolls_back_created_application() {
    let log: EventLog = EventLog::default();
    let provider = MockProvider::new(ProviderKind::Ovt, log.clone());
    provider.fail_pull.store(true, Ordering::SeqCst);

    let orchestrator = Orchestrator::new();
    orchestrator.register_module(provider).unwrap();
    orchestrator.apply_origin_map(&[h1()]).unwrap();

    let name = VHostAppName::parse("#h1#app").unwrap();
    assert!(matches!(
        orchestrator.request_pull_stream(&name, "mystream", 0),
        Err(Error::PullFailed(_))
    ));

    // The application created for this pull was rolled back
    assert!(orchestrator.get_application(&name).is_none());
    let events = log.lock().clone();
    assert!(events.contains(&Event::Delete {
        module: "provider",
        app: "#h1#app".to_string()
    }));
}

#[test]
fn test_pull_failure_keeps_preexisting_application() {
    let log: EventLog = EventLog::default();
    let provider = MockProvider::new(ProviderKind::Ovt, log.clone());

    let orchestrator = Orchestrator::new();
    orchestrator.register_module(provider.clone()).unwrap();

    let host = h1();
    orchestrator.apply_origin_map(std::slice::from_ref(&host)).unwrap();

    assert_eq!(
        orchestrator.create_application(
            &host,
            &ApplicationConfig {
                name: "app".to_string()
            }
        ),
        OperationResult::Succeeded
    );

    provider.fail_pull.store(true, Ordering::SeqCst);
    let name = VHostAppName::resolve("h1", "app");
    assert!(orchestrator.request_pull_stream(&name, "mystream", 0).is_err());

    // The application existed before the pull; it is not rolled back
    assert!(orchestrator.get_application(&name).is_some());
}

#[test]
fn test_pull_without_provider_fails() {
    let orchestrator = Orchestrator::new();
    orchestrator.apply_origin_map(&[h1()]).unwrap();

    let name = VHostAppName::parse("#h1#app").unwrap();
    assert!(matches!(
        orchestrator.request_pull_stream(&name, "mystream", 0),
        Err(Error::NoProvider(_))
    ));
}

#[test]
fn test_pull_with_unknown_scheme_fails() {
    let orchestrator = Orchestrator::new();
    let host = host_config("h1", &["*.example.com"], &[("/app/", "file", &["up/a/"])]);
    orchestrator.apply_origin_map(&[host]).unwrap();

    let name = VHostAppName::parse("#h1#app").unwrap();
    assert!(matches!(
        orchestrator.request_pull_stream(&name, "mystream", 0),
        Err(Error::UnknownScheme(_))
    ));
}

#[test]
fn test_domain_resolution_order_is_first_match_wins() {
    let orchestrator = Orchestrator::new();
    orchestrator
        .apply_origin_map(&[
            host_config("h1", &["*.example.com"], &[]),
            host_config("h2", &["cdn.example.com"], &[]),
        ])
        .unwrap();

    // Both patterns match; the first configured vhost wins
    assert_eq!(
        orchestrator.vhost_name_from_domain("cdn.example.com"),
        Some("h1".to_string())
    );
    assert_eq!(orchestrator.vhost_name_from_domain("unmatched.org"), None);

    let resolved = orchestrator.resolve_application_name_from_domain("cdn.example.com", "app");
    assert_eq!(resolved.as_str(), "#h1#app");
}
