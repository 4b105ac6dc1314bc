//! Persisted configuration: the store contract and the change watcher.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::contracts::RegistryHost;
use crate::model::TenantId;
use crate::registry::ServiceRegistry;

/// Universal "tenant finished initial setup" property. Watched for every
/// registry regardless of host configuration.
pub const SETUP_COMPLETE_PROPERTY: &str = "setup_complete";

/// Persisted-configuration read/write pair, keyed by tenant and property
/// name. The storage mechanism behind it is an external collaborator.
pub trait SettingsStore: Send + Sync {
    fn get(&self, tenant: TenantId, property: &str) -> Option<String>;

    /// Write `value` for `(tenant, property)`; `None` resets the property
    /// back to unset.
    fn put(&self, tenant: TenantId, property: &str, value: Option<String>);
}

/// In-memory [`SettingsStore`] for hosts without real persistence and for
/// tests.
#[derive(Default)]
pub struct MemorySettingsStore {
    values: RwLock<HashMap<(TenantId, String), String>>,
}

impl MemorySettingsStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, tenant: TenantId, property: &str) -> Option<String> {
        self.values
            .read()
            .get(&(tenant, property.to_owned()))
            .cloned()
    }

    fn put(&self, tenant: TenantId, property: &str, value: Option<String>) {
        let mut values = self.values.write();
        match value {
            Some(value) => {
                values.insert((tenant, property.to_owned()), value);
            }
            None => {
                values.remove(&(tenant, property.to_owned()));
            }
        }
    }
}

/// Routes configuration-property change notifications into the registry.
///
/// Watches exactly the two built-in properties (the host's backing-identity
/// property, when defined, and [`SETUP_COMPLETE_PROPERTY`]) plus whatever
/// extras the host opted into through its registration hook. Built-ins
/// trigger a reconciliation; every other arriving property is forwarded to
/// the host's settings hook.
pub struct SettingsWatcher<H: RegistryHost> {
    registry: Arc<ServiceRegistry<H>>,
    service_property: Option<String>,
    extras: HashSet<String>,
}

impl<H: RegistryHost> SettingsWatcher<H> {
    #[must_use]
    pub fn new(registry: Arc<ServiceRegistry<H>>) -> Self {
        let service_property = registry
            .host()
            .service_settings_property()
            .map(str::to_owned);
        let extras = registry
            .host()
            .extra_settings_properties()
            .into_iter()
            .collect();
        Self {
            registry,
            service_property,
            extras,
        }
    }

    /// Every property this watcher wants change notifications for; the host
    /// registers these with its configuration event source.
    #[must_use]
    pub fn watched_properties(&self) -> Vec<String> {
        let mut properties = vec![SETUP_COMPLETE_PROPERTY.to_owned()];
        if let Some(property) = &self.service_property {
            properties.push(property.clone());
        }
        properties.extend(self.extras.iter().cloned());
        properties
    }

    /// Configuration-change feed entry point.
    pub fn on_property_changed(&self, tenant: TenantId, property: &str) {
        let built_in =
            property == SETUP_COMPLETE_PROPERTY || Some(property) == self.service_property.as_deref();
        if built_in {
            tracing::debug!(tenant = %tenant, property, "built-in property changed, reconciling");
            self.registry.update(tenant);
        } else {
            tracing::trace!(tenant = %tenant, property, "forwarding settings change to the host");
            self.registry.host().on_settings_changed(tenant, property);
        }
    }
}
