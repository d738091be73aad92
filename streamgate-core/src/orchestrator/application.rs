// Application lifecycle
//
// Creation is all-or-nothing: the record is inserted first, every module
// is notified in registration order, and any refusal rolls the whole
// thing back through the delete path. Deletion is best-effort complete:
// every module is notified even after earlier failures.

use std::sync::Arc;

use tracing::{debug, error, info};

use super::vhost::{vhost_index, Application, VirtualHost};
use super::{OperationResult, Orchestrator};
use crate::config::{ApplicationConfig, HostConfig};
use crate::models::{ApplicationId, ApplicationInfo, VHostAppName};
use crate::module::{ModuleSnapshot, RouteObserver};

impl Orchestrator {
    /// Create an application declared by configuration.
    pub fn create_application(
        &self,
        host: &HostConfig,
        app_config: &ApplicationConfig,
    ) -> OperationResult {
        let modules = self.registry.snapshot();
        let mut hosts = self.vhosts.lock();

        let name = VHostAppName::resolve(&host.name, &app_config.name);
        let app_info = ApplicationInfo::new(
            self.next_app_id(),
            name,
            host.clone(),
            app_config.clone(),
        );

        self.create_application_internal(&modules, &mut hosts, &host.name, &app_info)
    }

    /// Delete an application and notify every module.
    pub fn delete_application(&self, app_info: &ApplicationInfo) -> OperationResult {
        let modules = self.registry.snapshot();
        let mut hosts = self.vhosts.lock();

        if let Some(monitoring) = &self.monitoring {
            monitoring.on_application_deleted(app_info);
        }

        self.delete_application_internal(&modules, &mut hosts, app_info)
    }

    pub(crate) fn create_application_internal(
        &self,
        modules: &ModuleSnapshot,
        hosts: &mut [VirtualHost],
        vhost_name: &str,
        app_info: &ApplicationInfo,
    ) -> OperationResult {
        let Some(index) = vhost_index(hosts, vhost_name) else {
            return OperationResult::Failed;
        };
        let vhost = &mut hosts[index];

        if vhost
            .app_map
            .values()
            .any(|app| app.app_info.name() == app_info.name())
        {
            return OperationResult::Exists;
        }

        info!(app = %app_info.name(), "Trying to create an application");

        if let Some(monitoring) = &self.monitoring {
            monitoring.on_application_created(app_info);
        }

        let app = Arc::new(Application {
            app_info: app_info.clone(),
        });
        vhost.app_map.insert(app_info.id(), Arc::clone(&app));

        // Notify modules of the creation event, in registration order
        let mut created_count = 0usize;
        let mut succeeded = true;

        for record in modules.records() {
            debug!(
                module = %record.module_type,
                app = %app_info.name(),
                "Notifying module of the create event"
            );

            if record.module.on_create_application(app_info) {
                created_count += 1;
            } else {
                error!(
                    module = %record.module_type,
                    app = %app_info.name(),
                    "Module returned an error while creating the application"
                );
                succeeded = false;
                break;
            }
        }

        if succeeded {
            if let Some(router) = modules
                .media_router()
                .and_then(|module| module.as_media_router())
            {
                let observer: Arc<dyn RouteObserver> = Arc::clone(&app) as Arc<dyn RouteObserver>;
                router.register_observer_app(app_info, observer);
            }

            return OperationResult::Succeeded;
        }

        error!(
            app = %app_info.name(),
            notified = created_count,
            "Trying to roll back the application"
        );
        delete_application_from_vhost(modules, &mut hosts[index], app_info.id());
        OperationResult::Failed
    }

    pub(crate) fn delete_application_internal(
        &self,
        modules: &ModuleSnapshot,
        hosts: &mut [VirtualHost],
        app_info: &ApplicationInfo,
    ) -> OperationResult {
        let Some(index) = vhost_index(hosts, app_info.name().vhost_name()) else {
            return OperationResult::Failed;
        };

        delete_application_from_vhost(modules, &mut hosts[index], app_info.id())
    }
}

/// Remove an application from its host and fan out the delete event.
///
/// Delivery is best-effort complete: a failing module degrades the result
/// to `Failed` but later modules are still notified.
pub(crate) fn delete_application_from_vhost(
    modules: &ModuleSnapshot,
    vhost: &mut VirtualHost,
    app_id: ApplicationId,
) -> OperationResult {
    let Some(app) = vhost.app_map.remove(&app_id) else {
        info!(app_id = %app_id, "Application does not exist");
        return OperationResult::NotExists;
    };

    let app_info = &app.app_info;

    info!(app = %app_info.name(), id = %app_info.id(), "Trying to delete the application");

    if let Some(router) = modules
        .media_router()
        .and_then(|module| module.as_media_router())
    {
        let observer: Arc<dyn RouteObserver> = Arc::clone(&app) as Arc<dyn RouteObserver>;
        router.unregister_observer_app(app_info, observer);
    }

    debug!("Notifying modules of the delete event");

    let mut result = OperationResult::Succeeded;
    for record in modules.records() {
        debug!(
            module = %record.module_type,
            app = %app_info.name(),
            "Notifying module of the delete event"
        );

        if !record.module.on_delete_application(app_info) {
            error!(
                module = %record.module_type,
                app = %app_info.name(),
                "Module returned an error while deleting the application"
            );
            result = OperationResult::Failed;
        }
    }

    result
}
