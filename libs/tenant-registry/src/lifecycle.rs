//! Package lifecycle monitoring.
//!
//! The backing component of a cached record lives in an external package
//! that can be updated, removed or force-stopped underneath the registry.
//! [`LifecycleMonitor`] implements the [`PackageEventHandler`] contract and
//! translates those events into evictions or pass-through notifications,
//! surviving the "update in progress" window where the active record has
//! already been evicted but the update has not finished yet.

use std::sync::Arc;

use crate::contracts::RegistryHost;
use crate::model::TenantId;
use crate::registry::ServiceRegistry;

/// The four package lifecycle events the registry reacts to.
///
/// Implemented by [`LifecycleMonitor`]; the host registers one handler with
/// its external package-event source at startup.
pub trait PackageEventHandler: Send + Sync {
    /// A package started updating for `tenant`.
    fn on_update_started(&self, package: &str, tenant: TenantId);

    /// A package finished updating for `tenant`.
    fn on_update_finished(&self, package: &str, tenant: TenantId);

    /// A package was removed for `tenant`.
    fn on_package_removed(&self, package: &str, tenant: TenantId);

    /// A force-stop affecting `packages` is being evaluated for `tenant`.
    ///
    /// With `commit == false` this is a probe: returns `true` ("would
    /// affect") without mutating anything when one of the packages backs the
    /// tenant's cached record. With `commit == true` the matching record is
    /// evicted and `false` is returned.
    fn on_force_stop(&self, packages: &[&str], tenant: TenantId, commit: bool) -> bool;
}

/// Feeds package lifecycle events into a [`ServiceRegistry`].
pub struct LifecycleMonitor<H: RegistryHost> {
    registry: Arc<ServiceRegistry<H>>,
}

impl<H: RegistryHost> LifecycleMonitor<H> {
    #[must_use]
    pub fn new(registry: Arc<ServiceRegistry<H>>) -> Self {
        Self { registry }
    }
}

impl<H: RegistryHost> PackageEventHandler for LifecycleMonitor<H> {
    fn on_update_started(&self, package: &str, tenant: TenantId) {
        let tenant = self.registry.canonical(tenant);
        let mut state = self.registry.lock_state();
        let Some(active) = state.active_package(tenant) else {
            return;
        };
        if active != package {
            return;
        }
        if self.registry.config().refresh_on_update {
            tracing::debug!(
                tenant = %tenant,
                package,
                "evicting service while its package updates"
            );
            // Remember the active package: by update-finished time the
            // record (and with it the answer to "what was active") is gone.
            state.last_active_package = Some(active);
            self.registry.remove_locked(&mut state, tenant);
        } else {
            tracing::debug!(
                tenant = %tenant,
                package,
                "holding service across the package update"
            );
        }
    }

    fn on_update_finished(&self, package: &str, tenant: TenantId) {
        let tenant = self.registry.canonical(tenant);
        let mut state = self.registry.lock_state();
        let active = state
            .active_package(tenant)
            .or_else(|| state.last_active_package.take());
        if active.as_deref() != Some(package) {
            // Some other package relevant to the dependency set changed;
            // every record decides relevance for itself.
            tracing::debug!(package, "forwarding package update to cached services");
            state.touch_all(package);
        }
    }

    fn on_package_removed(&self, package: &str, tenant: TenantId) {
        let tenant = self.registry.canonical(tenant);
        let owned_active = {
            let mut state = self.registry.lock_state();
            match state.active_package(tenant) {
                Some(active) if active == package => {
                    tracing::info!(tenant = %tenant, package, "active service package removed");
                    self.registry.remove_locked(&mut state, tenant);
                    true
                }
                _ => false,
            }
        };
        // The persisted identity property is cleared outside the lock; the
        // settings store is an external collaborator.
        if owned_active {
            if let Some(property) = self.registry.host().service_settings_property() {
                self.registry.settings().put(tenant, property, None);
            }
        }
    }

    fn on_force_stop(&self, packages: &[&str], tenant: TenantId, commit: bool) -> bool {
        let tenant = self.registry.canonical(tenant);
        let mut state = self.registry.lock_state();
        let active = state.active_package(tenant);
        for &package in packages {
            if active.as_deref() == Some(package) {
                if !commit {
                    return true;
                }
                tracing::info!(tenant = %tenant, package, "active service package force-stopped");
                self.registry.remove_locked(&mut state, tenant);
            } else {
                state.touch_all(package);
            }
        }
        false
    }
}
