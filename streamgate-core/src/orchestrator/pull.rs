// Location resolution and stream pull
//
// A request location `/<app>/<stream>` is matched against origin rules by
// path prefix, in configured order; the first match wins. The matched
// origin's URLs, extended with the remaining part of the location, become
// the candidate pull URLs for the provider.

use std::sync::Arc;

use tracing::{debug, error, info};

use super::vhost::{vhost_index, OrchestratorStream, VirtualHost};
use super::{OperationResult, Orchestrator};
use crate::config::ApplicationConfig;
use crate::error::{Error, Result};
use crate::models::{ApplicationInfo, VHostAppName};
use crate::module::{ModuleSnapshot, ProviderKind};

impl Orchestrator {
    /// Resolve the upstream URL candidates for `<vhost_app>/<stream>`.
    pub fn get_url_list_for_location(
        &self,
        vhost_app_name: &VHostAppName,
        stream_name: &str,
    ) -> Result<Vec<String>> {
        let full_name = format!("{vhost_app_name}/{stream_name}");

        let hosts = self.vhosts.lock();
        let Some(index) = vhost_index(&hosts, vhost_app_name.vhost_name()) else {
            error!(stream = %full_name, "Could not find VirtualHost for the stream");
            return Err(Error::NotFound(full_name));
        };

        resolve_origin_urls(&hosts[index], vhost_app_name.app_name(), stream_name)
            .map(|resolved| resolved.url_list)
            .ok_or(Error::NotFound(full_name))
    }

    /// Pull `<vhost_app>/<stream>` from the origin that owns its location.
    ///
    /// Creates the application on demand; when the provider fails and the
    /// application was created by this call, the creation is rolled back.
    pub fn request_pull_stream(
        &self,
        vhost_app_name: &VHostAppName,
        stream_name: &str,
        offset: i64,
    ) -> Result<()> {
        let modules = self.registry.snapshot();
        let mut hosts = self.vhosts.lock();

        self.request_pull_stream_for_location(
            &modules,
            &mut hosts,
            vhost_app_name,
            stream_name,
            offset,
        )
    }

    fn request_pull_stream_for_location(
        &self,
        modules: &ModuleSnapshot,
        hosts: &mut Vec<VirtualHost>,
        vhost_app_name: &VHostAppName,
        stream_name: &str,
        offset: i64,
    ) -> Result<()> {
        let full_name = format!("{vhost_app_name}/{stream_name}");

        let Some(vhost_idx) = vhost_index(hosts, vhost_app_name.vhost_name()) else {
            error!(stream = %full_name, "Could not find VirtualHost for the stream");
            return Err(Error::NotFound(full_name));
        };

        let Some(resolved) =
            resolve_origin_urls(&hosts[vhost_idx], vhost_app_name.app_name(), stream_name)
        else {
            error!(stream = %full_name, "Could not find Origin for the stream");
            return Err(Error::NotFound(full_name));
        };

        let scheme = hosts[vhost_idx].origin_list[resolved.origin_idx]
            .scheme()
            .to_string();
        let kind = ProviderKind::from_scheme(&scheme)?;
        let Some(provider_module) = modules.provider_for_kind(kind) else {
            error!(scheme = %scheme, stream = %full_name, "Could not find provider for the stream");
            return Err(Error::NoProvider(scheme));
        };

        // Look up the application, creating it when this is the first
        // stream in its namespace. Remember whether we created it so a
        // failed pull can roll the creation back.
        let existing = hosts[vhost_idx]
            .app_map
            .values()
            .find(|app| app.app_info.name() == vhost_app_name)
            .map(|app| app.app_info.clone());

        let (app_info, created) = match existing {
            Some(app_info) => (app_info, false),
            None => {
                let app_info = ApplicationInfo::new(
                    self.next_app_id(),
                    vhost_app_name.clone(),
                    hosts[vhost_idx].host_config.clone(),
                    ApplicationConfig {
                        name: vhost_app_name.app_name().to_string(),
                    },
                );

                let result = self.create_application_internal(
                    modules,
                    hosts,
                    vhost_app_name.vhost_name(),
                    &app_info,
                );
                if result != OperationResult::Succeeded {
                    return Err(Error::PullFailed(format!(
                        "could not create application for {full_name}"
                    )));
                }

                (app_info, true)
            }
        };

        info!(
            stream = %full_name,
            provider = %provider_module.module_type(),
            "Trying to pull stream from provider"
        );

        let pulled = provider_module.as_provider().and_then(|provider| {
            provider.pull_stream(&app_info, stream_name, &resolved.url_list, offset)
        });

        if let Some(provider_stream) = pulled {
            let stream = Arc::new(OrchestratorStream::new(
                app_info,
                Arc::clone(&provider_module),
                Arc::clone(&provider_stream),
                full_name.clone(),
            ));

            let vhost = &mut hosts[vhost_idx];
            vhost.origin_list[resolved.origin_idx]
                .stream_map
                .insert(provider_stream.id(), Arc::clone(&stream));
            vhost.domain_list[resolved.domain_idx]
                .stream_map
                .insert(provider_stream.id(), stream);

            info!(stream = %full_name, "The stream was pulled successfully");
            return Ok(());
        }

        error!(
            stream = %full_name,
            provider = %provider_module.module_type(),
            "Could not pull stream from provider"
        );

        if created {
            // The application was created for this pull; roll it back
            self.delete_application_internal(modules, hosts, &app_info);
        }

        Err(Error::PullFailed(full_name))
    }
}

struct ResolvedOrigin {
    url_list: Vec<String>,
    domain_idx: usize,
    origin_idx: usize,
}

/// Find the first origin whose location is a prefix of the request
/// location and expand its URLs with the remaining part.
fn resolve_origin_urls(
    vhost: &VirtualHost,
    app_name: &str,
    stream_name: &str,
) -> Option<ResolvedOrigin> {
    let location = format!("/{app_name}/{stream_name}");

    for (domain_idx, _domain) in vhost.domain_list.iter().enumerate() {
        for (origin_idx, origin) in vhost.origin_list.iter().enumerate() {
            debug!(location = %location, "Trying to find an origin matching the location");

            if !location.starts_with(&origin.location) {
                continue;
            }

            // The origin location is a prefix of the request location;
            // the remaining part rides along to every upstream URL:
            //
            //   location:  /app/stream_o
            //   <Location>: /app/stream
            //   remaining:             _o
            let remaining = &location[origin.location.len()..];

            debug!(
                origin = %origin.location,
                remaining = %remaining,
                "Found a matching origin"
            );

            let url_list: Vec<String> = origin
                .urls()
                .iter()
                .map(|url| format!("{}://{}{}", origin.scheme(), url, remaining))
                .collect();

            if url_list.is_empty() {
                return None;
            }

            return Some(ResolvedOrigin {
                url_list,
                domain_idx,
                origin_idx,
            });
        }
    }

    None
}
