// Configuration reconciliation
//
// An apply pass tags every runtime item NeedToCheck, scans the incoming
// configuration to retag matched items, and then walks the runtime list:
// items still NeedToCheck were deleted from configuration and are torn
// down. One failed child degrades the aggregate result but never aborts
// the pass.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, error, info};

use super::application::delete_application_from_vhost;
use super::vhost::{vhost_index, Domain, ItemState, OrchestratorStream, Origin, VirtualHost};
use super::Orchestrator;
use crate::config::{HostConfig, OriginConfig};
use crate::error::{Error, Result};
use crate::models::StreamId;
use crate::module::ModuleSnapshot;

impl Orchestrator {
    /// Reconcile the declared host list against runtime state.
    ///
    /// Holds the virtual-host lock for the full pass. Returns
    /// [`Error::PartialApply`] when one or more items failed; the pass
    /// still applies everything else.
    pub fn apply_origin_map(&self, host_list: &[HostConfig]) -> Result<()> {
        let modules = self.registry.snapshot();
        let mut hosts = self.vhosts.lock();
        let mut failures = 0usize;

        // Mark all items as NeedToCheck
        for vhost in hosts.iter_mut() {
            if !vhost.mark_all_as(ItemState::Applied, ItemState::NeedToCheck) {
                error!(vhost = %vhost.name, "Virtual host was not in applied state");
                failures += 1;
            }
        }

        debug!("Processing virtual hosts");

        for host_config in host_list {
            let Some(index) = vhost_index(&hosts, &host_config.name) else {
                debug!(vhost = %host_config.name, "New virtual host");
                match VirtualHost::from_config(host_config) {
                    Ok(vhost) => hosts.push(vhost),
                    Err(e) => {
                        error!(vhost = %host_config.name, error = %e, "Could not build virtual host");
                        failures += 1;
                    }
                }
                continue;
            };

            let vhost = &mut hosts[index];
            debug!(vhost = %vhost.name, "Processing domains");
            let domain_state = process_domain_list(&mut vhost.domain_list, &host_config.domains);
            debug!(vhost = %vhost.name, "Processing origins");
            let origin_state = process_origin_list(&mut vhost.origin_list, &host_config.origins);

            vhost.state = if domain_state == ItemState::NotChanged
                && origin_state == ItemState::NotChanged
            {
                ItemState::NotChanged
            } else {
                ItemState::Changed
            };
        }

        // Walk the runtime list and apply the computed states
        let mut index = 0;
        while index < hosts.len() {
            match hosts[index].state {
                ItemState::NotChanged | ItemState::New => {
                    hosts[index].mark_all_as_unchecked(ItemState::Applied);
                    index += 1;
                }

                ItemState::Changed => {
                    if apply_for_virtual_host(&modules, &mut hosts[index]) {
                        hosts[index].mark_all_as_unchecked(ItemState::Applied);
                    } else {
                        failures += 1;
                    }
                    index += 1;
                }

                ItemState::NeedToCheck => {
                    // Never matched during the scan: deleted from configuration
                    debug!(vhost = %hosts[index].name, "Virtual host deleted");
                    let mut vhost = hosts.remove(index);
                    vhost.mark_all_as_unchecked(ItemState::Delete);
                    if !apply_for_virtual_host(&modules, &mut vhost) {
                        failures += 1;
                    }
                }

                state @ (ItemState::Applied | ItemState::Delete) => {
                    // A walk should only ever see the states above; delete
                    // the entry defensively
                    error!(vhost = %hosts[index].name, ?state, "Invalid virtual host state");
                    failures += 1;
                    let mut vhost = hosts.remove(index);
                    vhost.mark_all_as_unchecked(ItemState::Delete);
                    apply_for_virtual_host(&modules, &mut vhost);
                }
            }
        }

        debug!("All items are applied");

        if failures == 0 {
            Ok(())
        } else {
            Err(Error::PartialApply { failures })
        }
    }
}

/// Diff the declared domain names against the runtime list.
///
/// Matched items become NotChanged; unmatched declared names are appended
/// as New. When nothing was added, leftover NeedToCheck items are retagged
/// Delete. Returns Changed iff anything differed.
fn process_domain_list(domain_list: &mut Vec<Domain>, config: &[String]) -> ItemState {
    let mut is_changed = false;

    for name in config {
        let found = domain_list
            .iter_mut()
            .find(|domain| domain.state == ItemState::NeedToCheck && domain.name == *name)
            .map(|domain| domain.state = ItemState::NotChanged)
            .is_some();

        if !found {
            debug!(domain = %name, "New domain");
            match Domain::new(name) {
                Ok(domain) => domain_list.push(domain),
                Err(e) => error!(domain = %name, error = %e, "Could not compile domain pattern"),
            }
            is_changed = true;
        }
    }

    if !is_changed {
        // No new item; check for deleted ones
        for domain in domain_list.iter_mut() {
            match domain.state {
                ItemState::NeedToCheck => {
                    debug!(domain = %domain.name, "Domain deleted");
                    domain.state = ItemState::Delete;
                    is_changed = true;
                }
                ItemState::NotChanged => {
                    debug!(domain = %domain.name, "Domain not changed");
                }
                state => {
                    error!(domain = %domain.name, ?state, "Invalid domain state");
                    is_changed = true;
                }
            }
        }
    }

    if is_changed {
        ItemState::Changed
    } else {
        ItemState::NotChanged
    }
}

/// Diff the declared origins against the runtime list.
///
/// Origins are matched by location; a matched origin is unchanged only
/// when the scheme and the ordered URL list are also identical.
fn process_origin_list(origin_list: &mut Vec<Origin>, config: &[OriginConfig]) -> ItemState {
    let mut is_changed = false;

    for origin_config in config {
        let mut found = false;

        for origin in origin_list.iter_mut() {
            if origin.state != ItemState::NeedToCheck || origin.location != origin_config.location
            {
                continue;
            }

            if origin.scheme() != origin_config.scheme {
                debug!(
                    location = %origin.location,
                    previous = %origin.scheme(),
                    current = %origin_config.scheme,
                    "Origin changed (scheme differs)"
                );
                origin.state = ItemState::Changed;
            } else if origin.urls() != origin_config.urls {
                debug!(location = %origin.location, "Origin changed (URL list differs)");
                origin.state = ItemState::Changed;
            } else {
                origin.state = ItemState::NotChanged;
            }

            if origin.state == ItemState::Changed {
                is_changed = true;
            }

            found = true;
            break;
        }

        if !found {
            debug!(
                location = %origin_config.location,
                urls = origin_config.urls.len(),
                "New origin"
            );
            origin_list.push(Origin::new(origin_config));
            is_changed = true;
        }
    }

    if !is_changed {
        // No new item; check for deleted ones
        for origin in origin_list.iter_mut() {
            match origin.state {
                ItemState::NeedToCheck => {
                    debug!(location = %origin.location, "Origin deleted");
                    origin.state = ItemState::Delete;
                    is_changed = true;
                }
                ItemState::NotChanged => {
                    debug!(location = %origin.location, "Origin not changed");
                }
                state => {
                    error!(location = %origin.location, ?state, "Invalid origin state");
                    is_changed = true;
                }
            }
        }
    }

    if is_changed {
        ItemState::Changed
    } else {
        ItemState::NotChanged
    }
}

/// Apply the computed state of one virtual host.
///
/// A deleted host tears down every application it owns. Otherwise changed
/// or deleted domains/origins stop their streams (in insertion order) and
/// are removed from the runtime lists.
pub(crate) fn apply_for_virtual_host(modules: &ModuleSnapshot, vhost: &mut VirtualHost) -> bool {
    let mut succeeded = true;

    debug!(vhost = %vhost.name, "Applying new configuration of virtual host");

    if vhost.state == ItemState::Delete {
        for domain in &vhost.domain_list {
            stop_streams(&domain.stream_map);
        }
        for origin in &vhost.origin_list {
            stop_streams(&origin.stream_map);
        }

        let app_ids: Vec<_> = vhost.app_map.keys().copied().collect();
        for app_id in app_ids {
            let result = delete_application_from_vhost(modules, vhost, app_id);
            if result != super::OperationResult::Succeeded {
                error!(vhost = %vhost.name, app_id = %app_id, "Could not delete application");
                succeeded = false;
            }
        }
        return succeeded;
    }

    vhost.domain_list.retain(|domain| match domain.state {
        ItemState::Applied | ItemState::NotChanged | ItemState::New => {
            debug!(domain = %domain.name, "Domain is not changed/just created");
            true
        }
        ItemState::NeedToCheck | ItemState::Changed | ItemState::Delete => {
            debug!(domain = %domain.name, "Domain is changed/deleted");
            stop_streams(&domain.stream_map);
            false
        }
    });

    vhost.origin_list.retain(|origin| match origin.state {
        ItemState::Applied | ItemState::NotChanged | ItemState::New => {
            debug!(location = %origin.location, "Origin is not changed/just created");
            true
        }
        ItemState::NeedToCheck | ItemState::Changed | ItemState::Delete => {
            debug!(location = %origin.location, "Origin is changed/deleted");
            stop_streams(&origin.stream_map);
            false
        }
    });

    succeeded
}

/// Ask the owning providers to stop every still-valid stream in the map.
/// Stop failures are logged; the streams are invalidated either way.
fn stop_streams(stream_map: &BTreeMap<StreamId, Arc<OrchestratorStream>>) {
    for stream in stream_map.values() {
        if !stream.is_valid() {
            continue;
        }

        info!(stream = %stream.full_name, "Trying to stop stream");

        match stream.provider.as_provider() {
            Some(provider) => {
                if !provider.stop_stream(&stream.app_info, &stream.provider_stream) {
                    error!(
                        stream = %stream.full_name,
                        provider = %stream.provider.module_type(),
                        "Failed to stop stream in provider"
                    );
                }
            }
            None => {
                error!(
                    stream = %stream.full_name,
                    "Stream owner does not expose a provider interface"
                );
            }
        }

        stream.invalidate();
    }
}
