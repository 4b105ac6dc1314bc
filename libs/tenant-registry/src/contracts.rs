//! Contracts between the registry core and its host.
//!
//! The registry is generic over a [`RegistryHost`]: the host supplies the
//! per-tenant service factory, reacts to enable/remove transitions, and
//! implements the management extension points. The cached records themselves
//! expose the small [`TenantService`] surface the reconciliation loop needs.
//!
//! Every hook on these traits is invoked while the registry's coarse lock is
//! held (unless noted otherwise). Implementations MUST NOT call back into the
//! registry synchronously from a hook; doing so deadlocks against the same
//! lock. Defer reentrant work to another task instead.

use std::fmt;
use std::time::Duration;

use crate::error::RegistryError;
use crate::model::{ComponentId, TenantId};

/// Surface of a cached per-tenant service record.
///
/// Records are owned exclusively by the registry; callers only ever observe
/// them through closures executed under the registry lock.
pub trait TenantService: Send + 'static {
    /// Push the current administrative disabled state into the record.
    ///
    /// Invoked on every reconciliation; implementations commonly also
    /// refresh derived state here, such as re-resolving their backing
    /// identity.
    fn set_disabled(&mut self, disabled: bool);

    /// Whether the record considers itself enabled. A record that reports
    /// `false` here after a reconciliation is evicted from the cache.
    fn is_enabled(&self) -> bool;

    /// Identity of the external component currently backing this record,
    /// if one resolved.
    fn component(&self) -> Option<&ComponentId>;

    /// A package relevant to this tenant's dependency set changed; the record
    /// decides internally whether it cares.
    fn on_package_touched(&mut self, package: &str) {
        let _ = package;
    }

    /// Append a diagnostic description of this record.
    ///
    /// # Errors
    /// Propagates formatter errors.
    fn dump(&self, prefix: &str, out: &mut dyn fmt::Write) -> fmt::Result {
        let _ = (prefix, out);
        Ok(())
    }
}

/// Extension points a concrete registry provides.
///
/// Mirrors the shape of the cached record lifecycle: `create_service` builds
/// a record (already in the right disabled state), `on_service_enabled` fires
/// after creation and again on every reconciliation of an enabled record (it
/// must be idempotent and cheap), `on_service_removed` fires after eviction.
pub trait RegistryHost: Send + Sync + 'static {
    type Service: TenantService;

    /// Build the record for `tenant`. Returning `None` means the tenant has
    /// no service; nothing is cached and lookups stay absent.
    fn create_service(&self, tenant: TenantId, disabled: bool) -> Option<Self::Service>;

    /// Called after a record is added to the cache, and again whenever a
    /// reconciliation leaves it enabled.
    fn on_service_enabled(&self, service: &mut Self::Service, tenant: TenantId) {
        let _ = (service, tenant);
    }

    /// Called with the record just evicted from the cache.
    fn on_service_removed(&self, service: &mut Self::Service, tenant: TenantId) {
        let _ = (service, tenant);
    }

    /// Map an incoming tenant id to the canonical id used as the cache key.
    ///
    /// Runs exactly once at every public entry point; the result keys both
    /// lookups and insertions. The default is the identity mapping.
    fn resolve_tenant(&self, tenant: TenantId) -> TenantId {
        tenant
    }

    /// Persisted-configuration property naming the backing component, or
    /// `None` when the concrete registry is not settings-defined.
    fn service_settings_property(&self) -> Option<&str> {
        None
    }

    /// Extra configuration properties the registry should watch on top of
    /// the built-in ones. Changes to these are forwarded to
    /// [`RegistryHost::on_settings_changed`].
    fn extra_settings_properties(&self) -> Vec<String> {
        Vec::new()
    }

    /// A watched extra property changed for `tenant`.
    fn on_settings_changed(&self, tenant: TenantId, property: &str) {
        let _ = (tenant, property);
    }

    /// Assert that the current caller may manage this registry.
    ///
    /// Invoked at the top of every management API call; runs without the
    /// registry lock.
    ///
    /// # Errors
    /// `PermissionDenied` when the caller lacks the management capability;
    /// the default returns `NotImplemented`, which is an integration error.
    fn enforce_management(&self, operation: &'static str) -> Result<(), RegistryError> {
        let _ = operation;
        Err(RegistryError::NotImplemented {
            extension: "enforce_management",
        })
    }

    /// Longest lifetime a temporary identity override may be given.
    ///
    /// # Errors
    /// The default returns `NotImplemented`, which is an integration error
    /// for registries exposing the temporary-override management surface.
    fn max_temporary_duration(&self) -> Result<Duration, RegistryError> {
        Err(RegistryError::NotImplemented {
            extension: "max_temporary_duration",
        })
    }
}

/// External query answering which tenants exist and whether a restriction
/// flag is currently set for them. Consulted once when the registry is built
/// (to seed the restriction map) and by the diagnostic dump.
pub trait RestrictionSource: Send + Sync {
    fn current_tenants(&self) -> Vec<TenantId>;

    fn is_restricted(&self, tenant: TenantId, restriction: &str) -> bool;
}
