//! The tenant → service cache and its reconciliation entry point.
//!
//! One [`ServiceRegistry`] owns every cached record behind a single coarse
//! `parking_lot::Mutex`. All external signals (restriction changes, identity
//! changes, package lifecycle events, configuration changes, management
//! calls) funnel into [`ServiceRegistry::update`], which recomputes the
//! disabled state and applies the enable/remove hooks under that lock.
//!
//! Correctness over throughput: tenant counts are small and bounded, so the
//! registry serializes everything on one lock instead of sharding. The lock
//! guarantees serialization, not wall-clock submission order; per-tenant
//! operations are linearized and nothing more is promised across tenants.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use crate::config::RegistryConfig;
use crate::contracts::{RegistryHost, RestrictionSource, TenantService};
use crate::error::RegistryError;
use crate::model::{ComponentId, TenantId};
use crate::resolver::IdentityResolver;
use crate::restrictions::RestrictionTracker;
use crate::settings::{MemorySettingsStore, SettingsStore};

/// Everything guarded by the registry's coarse lock.
pub(crate) struct RegistryState<S> {
    pub(crate) services: BTreeMap<TenantId, S>,
    pub(crate) restrictions: RestrictionTracker,
    /// Package that was active when an update-started event evicted its
    /// record; bridges the gap until the matching update-finished arrives.
    pub(crate) last_active_package: Option<String>,
    pub(crate) allow_instant_binding: bool,
    pub(crate) debug: bool,
    pub(crate) verbose: bool,
}

impl<S: TenantService> RegistryState<S> {
    /// Owning package of the component backing `tenant`'s cached record.
    pub(crate) fn active_package(&self, tenant: TenantId) -> Option<String> {
        self.services
            .get(&tenant)
            .and_then(TenantService::component)
            .map(|component| component.package.clone())
    }

    /// Broadcast a package-touched notification to every cached record.
    pub(crate) fn touch_all(&mut self, package: &str) {
        for service in self.services.values_mut() {
            service.on_package_touched(package);
        }
    }
}

/// Coarse-locked cache of one service record per tenant.
///
/// Constructed through [`ServiceRegistry::builder`] and used behind an
/// `Arc`: the identity-change callback and the lifecycle monitor both hold
/// handles back into the registry.
pub struct ServiceRegistry<H: RegistryHost> {
    host: H,
    config: RegistryConfig,
    resolver: Option<Arc<dyn IdentityResolver>>,
    settings: Arc<dyn SettingsStore>,
    restriction_source: Option<Arc<dyn RestrictionSource>>,
    state: Mutex<RegistryState<H::Service>>,
}

impl<H: RegistryHost> fmt::Debug for ServiceRegistry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ServiceRegistry")
            .field("cached", &state.services.len())
            .field("tracking_restrictions", &state.restrictions.tracking())
            .field("refresh_on_update", &self.config.refresh_on_update)
            .finish()
    }
}

impl<H: RegistryHost> ServiceRegistry<H> {
    pub fn builder(host: H) -> RegistryBuilder<H> {
        RegistryBuilder::new(host)
    }

    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }

    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub(crate) fn settings(&self) -> &Arc<dyn SettingsStore> {
        &self.settings
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, RegistryState<H::Service>> {
        self.state.lock()
    }

    /// Canonical cache key for an incoming tenant id. Applied exactly once
    /// at every public entry point; the same value keys lookups and
    /// insertions.
    pub(crate) fn canonical(&self, tenant: TenantId) -> TenantId {
        self.host.resolve_tenant(tenant)
    }

    /// Run `f` against the record for `tenant`, creating it first if absent.
    ///
    /// Creation consults the restriction state so the record starts in the
    /// correct disabled state, and fires the enabled hook when not disabled.
    /// Returns `None` when the factory declined to build a record.
    pub fn with_service<R>(&self, tenant: TenantId, f: impl FnOnce(&mut H::Service) -> R) -> Option<R> {
        let tenant = self.canonical(tenant);
        let mut state = self.state.lock();
        self.service_mut_locked(&mut state, tenant).map(f)
    }

    /// Run `f` against the cached record for `tenant` without creating one.
    pub fn peek<R>(&self, tenant: TenantId, f: impl FnOnce(&H::Service) -> R) -> Option<R> {
        let tenant = self.canonical(tenant);
        let state = self.state.lock();
        state.services.get(&tenant).map(f)
    }

    /// Reconcile `tenant`: recompute the disabled state from the restriction
    /// map, ensure a record exists, push the flag, and either evict the
    /// record (if it reports not-enabled) or re-fire the enabled hook.
    pub fn update(&self, tenant: TenantId) {
        let tenant = self.canonical(tenant);
        let mut state = self.state.lock();
        let disabled = state.restrictions.is_disabled(tenant);
        self.update_locked(&mut state, tenant, disabled);
    }

    /// Same as [`ServiceRegistry::update`] but trusts the caller-supplied
    /// disabled state instead of re-querying the restriction map.
    pub fn update_with_disabled(&self, tenant: TenantId, disabled: bool) {
        let tenant = self.canonical(tenant);
        let mut state = self.state.lock();
        self.update_locked(&mut state, tenant, disabled);
    }

    /// Evict `tenant`'s record, firing the removed hook. Absent → no-op.
    pub fn remove(&self, tenant: TenantId) -> Option<H::Service> {
        let tenant = self.canonical(tenant);
        let mut state = self.state.lock();
        self.remove_locked(&mut state, tenant)
    }

    /// Visit every cached record. Iteration happens under the lock, so the
    /// snapshot is stable for the duration of the call.
    pub fn visit_all(&self, mut f: impl FnMut(&H::Service)) {
        let state = self.state.lock();
        for service in state.services.values() {
            f(service);
        }
    }

    /// Drop all cached records without firing removal hooks.
    pub fn clear(&self) {
        self.state.lock().services.clear();
    }

    // -- event feed entry points ------------------------------------------

    /// Restriction-change feed. Compares against the stored value; an
    /// unchanged flag is a no-op, a changed one is stored and reconciled.
    pub fn on_restriction_changed(&self, tenant: TenantId, restricted: bool) {
        let tenant = self.canonical(tenant);
        let mut state = self.state.lock();
        if !state.restrictions.tracking() {
            tracing::debug!(tenant = %tenant, "restriction change ignored, tracking is off");
            return;
        }
        if state.restrictions.is_disabled(tenant) == restricted {
            tracing::debug!(tenant = %tenant, "restriction did not change");
            return;
        }
        tracing::info!(tenant = %tenant, restricted, "tenant restriction changed");
        state.restrictions.set(tenant, restricted);
        self.update_locked(&mut state, tenant, restricted);
    }

    /// Host lifecycle: a tenant became available.
    pub fn on_tenant_unlocked(&self, tenant: TenantId) {
        self.update(tenant);
    }

    /// Host lifecycle: a tenant went away for good.
    pub fn on_tenant_removed(&self, tenant: TenantId) {
        self.remove(tenant);
    }

    // -- management API ---------------------------------------------------

    /// Whether instant binding is allowed, for management callers.
    ///
    /// # Errors
    /// `PermissionDenied` / `NotImplemented` from the management check.
    pub fn allow_instant_binding(&self) -> Result<bool, RegistryError> {
        self.host.enforce_management("allow_instant_binding")?;
        Ok(self.state.lock().allow_instant_binding)
    }

    /// Unenforced read of the instant-binding flag, for internal callers
    /// that already passed an outer authorization boundary.
    #[must_use]
    pub fn is_instant_binding_allowed(&self) -> bool {
        self.state.lock().allow_instant_binding
    }

    /// # Errors
    /// `PermissionDenied` / `NotImplemented` from the management check.
    pub fn set_allow_instant_binding(&self, allow: bool) -> Result<(), RegistryError> {
        self.host.enforce_management("set_allow_instant_binding")?;
        tracing::info!(allow, "set_allow_instant_binding");
        self.state.lock().allow_instant_binding = allow;
        Ok(())
    }

    /// Temporarily replace `tenant`'s backing identity with `component` for
    /// `duration`. The cached record is evicted so the next access rebuilds
    /// against the override; the resolver reverts automatically at expiry.
    ///
    /// # Errors
    /// `PermissionDenied` without the management capability;
    /// `DurationExceeded` when `duration` is above the configured maximum;
    /// `NotImplemented` when the host lacks a maximum or the registry has no
    /// resolver.
    pub fn set_temporary_service(
        &self,
        tenant: TenantId,
        component: ComponentId,
        duration: Duration,
    ) -> Result<(), RegistryError> {
        self.host.enforce_management("set_temporary_service")?;
        let maximum = self.host.max_temporary_duration()?;
        if duration > maximum {
            return Err(RegistryError::DurationExceeded {
                requested: duration,
                maximum,
            });
        }
        let resolver = self.resolver_or_err()?;
        let tenant = self.canonical(tenant);
        tracing::info!(
            tenant = %tenant,
            component = %component,
            duration_ms = duration.as_millis(),
            "set_temporary_service"
        );
        {
            let mut state = self.state.lock();
            self.remove_locked(&mut state, tenant);
        }
        // Outside the lock: the resolver's change callback re-enters update().
        resolver.set_temporary(tenant, component, duration);
        Ok(())
    }

    /// # Errors
    /// `PermissionDenied` / `NotImplemented` from the management check, or
    /// `NotImplemented` when the registry has no resolver.
    pub fn set_default_service_enabled(
        &self,
        tenant: TenantId,
        enabled: bool,
    ) -> Result<(), RegistryError> {
        self.host.enforce_management("set_default_service_enabled")?;
        let resolver = self.resolver_or_err()?;
        let tenant = self.canonical(tenant);
        tracing::info!(tenant = %tenant, enabled, "set_default_service_enabled");
        {
            let mut state = self.state.lock();
            self.remove_locked(&mut state, tenant);
        }
        resolver.set_default_enabled(tenant, enabled);
        // Re-run reconciliation so the record's initialization is triggered.
        self.update(tenant);
        Ok(())
    }

    /// # Errors
    /// `PermissionDenied` / `NotImplemented` from the management check, or
    /// `NotImplemented` when the registry has no resolver.
    pub fn is_default_service_enabled(&self, tenant: TenantId) -> Result<bool, RegistryError> {
        self.host.enforce_management("is_default_service_enabled")?;
        let resolver = self.resolver_or_err()?;
        Ok(resolver.is_default_enabled(self.canonical(tenant)))
    }

    /// Drop any pending temporary override for `tenant`.
    ///
    /// # Errors
    /// `PermissionDenied` / `NotImplemented` from the management check, or
    /// `NotImplemented` when the registry has no resolver.
    pub fn reset_temporary_service(&self, tenant: TenantId) -> Result<(), RegistryError> {
        self.host.enforce_management("reset_temporary_service")?;
        let resolver = self.resolver_or_err()?;
        let tenant = self.canonical(tenant);
        tracing::info!(tenant = %tenant, "reset_temporary_service");
        resolver.reset_temporary(tenant);
        Ok(())
    }

    // -- diagnostics ------------------------------------------------------

    pub fn set_debug(&self, debug: bool) {
        self.state.lock().debug = debug;
    }

    #[must_use]
    pub fn debug(&self) -> bool {
        self.state.lock().debug
    }

    pub fn set_verbose(&self, verbose: bool) {
        self.state.lock().verbose = verbose;
    }

    #[must_use]
    pub fn verbose(&self) -> bool {
        self.state.lock().verbose
    }

    /// Write the diagnostic report. Full logging is forced on for the
    /// duration of the dump and restored afterwards.
    ///
    /// # Errors
    /// Propagates formatter errors.
    pub fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let mut state = self.state.lock();
        let real_debug = state.debug;
        let real_verbose = state.verbose;
        state.debug = true;
        state.verbose = true;
        let result = self.dump_locked(&state, out);
        state.debug = real_debug;
        state.verbose = real_verbose;
        result
    }

    fn dump_locked(&self, state: &RegistryState<H::Service>, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "Debug: {} Verbose: {}", state.debug, state.verbose)?;
        writeln!(out, "Refresh on package update: {}", self.config.refresh_on_update)?;
        match &state.last_active_package {
            Some(package) => writeln!(out, "Last active package: {package}")?,
            None => writeln!(out, "Last active package: none")?,
        }
        if let Some(resolver) = &self.resolver {
            write!(out, "Identity resolver: ")?;
            resolver.dump_summary(out)?;
            writeln!(out)?;
            if let Some(source) = &self.restriction_source {
                for tenant in source.current_tenants() {
                    write!(out, "  {tenant}: ")?;
                    resolver.dump_tenant(tenant, out)?;
                    writeln!(out)?;
                }
            }
        }
        match state.restrictions.snapshot() {
            Some(entries) if entries.is_empty() => writeln!(out, "Restricted tenants: none")?,
            Some(entries) => {
                write!(out, "Restricted tenants:")?;
                for (tenant, restricted) in entries {
                    write!(out, " {tenant}={restricted}")?;
                }
                writeln!(out)?;
            }
            None => writeln!(out, "Restriction tracking: off")?,
        }
        writeln!(out, "Allow instant binding: {}", state.allow_instant_binding)?;
        if let Some(property) = self.host.service_settings_property() {
            writeln!(out, "Settings property: {property}")?;
            for tenant in state.services.keys() {
                match self.settings.get(*tenant, property) {
                    Some(value) => writeln!(out, "  {tenant}: {value}")?,
                    None => writeln!(out, "  {tenant}: unset")?,
                }
            }
        }
        if state.services.is_empty() {
            writeln!(out, "Cached services: none")?;
        } else {
            writeln!(out, "Cached services: {}", state.services.len())?;
            for (tenant, service) in &state.services {
                writeln!(out, "Service for tenant {tenant}:")?;
                service.dump("    ", out)?;
                writeln!(out)?;
            }
        }
        Ok(())
    }

    // -- internals --------------------------------------------------------

    fn resolver_or_err(&self) -> Result<&Arc<dyn IdentityResolver>, RegistryError> {
        self.resolver.as_ref().ok_or(RegistryError::NotImplemented {
            extension: "identity_resolver",
        })
    }

    fn service_mut_locked<'a>(
        &self,
        state: &'a mut RegistryState<H::Service>,
        tenant: TenantId,
    ) -> Option<&'a mut H::Service> {
        if !state.services.contains_key(&tenant) {
            let disabled = state.restrictions.is_disabled(tenant);
            if let Some(mut service) = self.host.create_service(tenant, disabled) {
                tracing::debug!(tenant = %tenant, disabled, "service record created");
                if !disabled {
                    self.host.on_service_enabled(&mut service, tenant);
                }
                state.services.insert(tenant, service);
            }
        }
        state.services.get_mut(&tenant)
    }

    pub(crate) fn update_locked(
        &self,
        state: &mut RegistryState<H::Service>,
        tenant: TenantId,
        disabled: bool,
    ) {
        let enabled = {
            let Some(service) = self.service_mut_locked(state, tenant) else {
                return;
            };
            service.set_disabled(disabled);
            service.is_enabled()
        };
        if enabled {
            if let Some(service) = state.services.get_mut(&tenant) {
                self.host.on_service_enabled(service, tenant);
            }
        } else {
            self.remove_locked(state, tenant);
        }
    }

    pub(crate) fn remove_locked(
        &self,
        state: &mut RegistryState<H::Service>,
        tenant: TenantId,
    ) -> Option<H::Service> {
        let mut service = state.services.remove(&tenant)?;
        tracing::debug!(tenant = %tenant, "service record evicted");
        self.host.on_service_removed(&mut service, tenant);
        Some(service)
    }
}

/// Builder for [`ServiceRegistry`].
///
/// The restriction map is seeded here, once, from the supplied
/// [`RestrictionSource`], but only when the config names a restriction
/// flag; otherwise restriction tracking stays off for the lifetime of the
/// registry.
pub struct RegistryBuilder<H: RegistryHost> {
    host: H,
    config: RegistryConfig,
    resolver: Option<Arc<dyn IdentityResolver>>,
    settings: Option<Arc<dyn SettingsStore>>,
    restrictions: Option<Arc<dyn RestrictionSource>>,
}

impl<H: RegistryHost> RegistryBuilder<H> {
    fn new(host: H) -> Self {
        Self {
            host,
            config: RegistryConfig::default(),
            resolver: None,
            settings: None,
            restrictions: None,
        }
    }

    #[must_use]
    pub fn config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn resolver(mut self, resolver: Arc<dyn IdentityResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    #[must_use]
    pub fn settings(mut self, settings: Arc<dyn SettingsStore>) -> Self {
        self.settings = Some(settings);
        self
    }

    #[must_use]
    pub fn restriction_source(mut self, source: Arc<dyn RestrictionSource>) -> Self {
        self.restrictions = Some(source);
        self
    }

    pub fn build(self) -> Arc<ServiceRegistry<H>> {
        let tracker = match (&self.config.restriction, &self.restrictions) {
            (Some(flag), Some(source)) => {
                let seed: Vec<_> = source
                    .current_tenants()
                    .into_iter()
                    .map(|tenant| (tenant, source.is_restricted(tenant, flag)))
                    .collect();
                for (tenant, restricted) in &seed {
                    if *restricted {
                        tracing::info!(tenant = %tenant, "tenant restricted at startup");
                    }
                }
                RestrictionTracker::seeded(seed)
            }
            _ => RestrictionTracker::disabled(),
        };

        let registry = Arc::new(ServiceRegistry {
            host: self.host,
            config: self.config,
            resolver: self.resolver,
            settings: self
                .settings
                .unwrap_or_else(|| Arc::new(MemorySettingsStore::new())),
            restriction_source: self.restrictions,
            state: Mutex::new(RegistryState {
                services: BTreeMap::new(),
                restrictions: tracker,
                last_active_package: None,
                allow_instant_binding: false,
                debug: false,
                verbose: false,
            }),
        });

        // Identity changes (including override expiry) route straight into
        // the reconciliation entry point.
        if let Some(resolver) = registry.resolver.clone() {
            let weak = Arc::downgrade(&registry);
            resolver.set_change_callback(Arc::new(move |tenant, _new_identity| {
                if let Some(registry) = weak.upgrade() {
                    registry.update(tenant);
                }
            }));
        }

        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TestService {
        disabled: bool,
        component: Option<ComponentId>,
        touched: Vec<String>,
    }

    impl TenantService for TestService {
        fn set_disabled(&mut self, disabled: bool) {
            self.disabled = disabled;
        }

        fn is_enabled(&self) -> bool {
            !self.disabled
        }

        fn component(&self) -> Option<&ComponentId> {
            self.component.as_ref()
        }

        fn on_package_touched(&mut self, package: &str) {
            self.touched.push(package.to_owned());
        }

        fn dump(&self, prefix: &str, out: &mut dyn fmt::Write) -> fmt::Result {
            write!(out, "{prefix}disabled={}", self.disabled)
        }
    }

    /// Host that leaves every extension point at its default.
    struct MinimalHost;

    impl RegistryHost for MinimalHost {
        type Service = TestService;

        fn create_service(&self, _tenant: TenantId, disabled: bool) -> Option<TestService> {
            Some(TestService {
                disabled,
                component: None,
                touched: Vec::new(),
            })
        }
    }

    #[derive(Default)]
    struct TestHost {
        component: Option<ComponentId>,
        decline_factory: bool,
        deny_management: bool,
        max_duration: Option<Duration>,
        alias: Option<(TenantId, TenantId)>,
        factory_calls: AtomicUsize,
        enabled_calls: AtomicUsize,
        removed_calls: AtomicUsize,
    }

    impl RegistryHost for TestHost {
        type Service = TestService;

        fn create_service(&self, _tenant: TenantId, disabled: bool) -> Option<TestService> {
            self.factory_calls.fetch_add(1, Ordering::SeqCst);
            if self.decline_factory {
                return None;
            }
            Some(TestService {
                disabled,
                component: self.component.clone(),
                touched: Vec::new(),
            })
        }

        fn on_service_enabled(&self, _service: &mut TestService, _tenant: TenantId) {
            self.enabled_calls.fetch_add(1, Ordering::SeqCst);
        }

        fn on_service_removed(&self, _service: &mut TestService, _tenant: TenantId) {
            self.removed_calls.fetch_add(1, Ordering::SeqCst);
        }

        fn resolve_tenant(&self, tenant: TenantId) -> TenantId {
            match self.alias {
                Some((alias, canonical)) if alias == tenant => canonical,
                _ => tenant,
            }
        }

        fn enforce_management(&self, operation: &'static str) -> Result<(), RegistryError> {
            if self.deny_management {
                Err(RegistryError::PermissionDenied { operation })
            } else {
                Ok(())
            }
        }

        fn max_temporary_duration(&self) -> Result<Duration, RegistryError> {
            self.max_duration.ok_or(RegistryError::NotImplemented {
                extension: "max_temporary_duration",
            })
        }
    }

    struct StaticRestrictions {
        tenants: Vec<TenantId>,
        restricted: Vec<TenantId>,
    }

    impl RestrictionSource for StaticRestrictions {
        fn current_tenants(&self) -> Vec<TenantId> {
            self.tenants.clone()
        }

        fn is_restricted(&self, tenant: TenantId, _restriction: &str) -> bool {
            self.restricted.contains(&tenant)
        }
    }

    fn restricted_config() -> RegistryConfig {
        RegistryConfig {
            restriction: Some("no_service".to_owned()),
            ..RegistryConfig::default()
        }
    }

    fn tenant(raw: u32) -> TenantId {
        TenantId::new(raw)
    }

    #[test]
    fn with_service_caches_exactly_one_record_per_tenant() {
        let registry = ServiceRegistry::builder(TestHost::default()).build();

        assert!(registry.with_service(tenant(1), |_| ()).is_some());
        assert!(registry.with_service(tenant(1), |_| ()).is_some());

        assert_eq!(registry.host().factory_calls.load(Ordering::SeqCst), 1);
        let mut count = 0;
        registry.visit_all(|_| count += 1);
        assert_eq!(count, 1, "at most one live record per tenant");
    }

    #[test]
    fn peek_never_creates() {
        let registry = ServiceRegistry::builder(TestHost::default()).build();
        assert!(registry.peek(tenant(1), |_| ()).is_none());
        assert_eq!(registry.host().factory_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn declined_factory_stores_nothing() {
        let host = TestHost {
            decline_factory: true,
            ..TestHost::default()
        };
        let registry = ServiceRegistry::builder(host).build();

        assert!(registry.with_service(tenant(1), |_| ()).is_none());
        assert!(registry.peek(tenant(1), |_| ()).is_none());

        // update() tolerates the absent record the same way.
        registry.update(tenant(1));
        assert!(registry.peek(tenant(1), |_| ()).is_none());
    }

    #[test]
    fn update_creates_and_is_idempotent() {
        let registry = ServiceRegistry::builder(TestHost::default()).build();

        registry.update(tenant(4));
        let after_first = registry.host().enabled_calls.load(Ordering::SeqCst);
        assert!(registry.peek(tenant(4), |s| s.is_enabled()).unwrap());

        registry.update(tenant(4));
        assert!(registry.peek(tenant(4), |s| s.is_enabled()).unwrap());
        assert_eq!(
            registry.host().removed_calls.load(Ordering::SeqCst),
            0,
            "idempotent update must not evict"
        );
        assert_eq!(
            registry.host().enabled_calls.load(Ordering::SeqCst),
            after_first + 1,
            "enabled hook re-fires on every reconciliation"
        );
        assert_eq!(registry.host().factory_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn restriction_change_evicts_and_recreates_disabled() {
        let source = Arc::new(StaticRestrictions {
            tenants: vec![tenant(0)],
            restricted: Vec::new(),
        });
        let registry = ServiceRegistry::builder(TestHost::default())
            .config(restricted_config())
            .restriction_source(source)
            .build();

        registry.with_service(tenant(0), |_| ());
        assert!(registry.peek(tenant(0), |s| s.is_enabled()).unwrap());

        registry.on_restriction_changed(tenant(0), true);
        assert!(
            registry.peek(tenant(0), |_| ()).is_none(),
            "restricted tenant's record must be evicted"
        );
        assert_eq!(registry.host().removed_calls.load(Ordering::SeqCst), 1);

        let disabled = registry.with_service(tenant(0), |s| s.disabled).unwrap();
        assert!(disabled, "recreated record starts disabled");
    }

    #[test]
    fn unchanged_restriction_is_a_no_op() {
        let source = Arc::new(StaticRestrictions {
            tenants: vec![tenant(0)],
            restricted: Vec::new(),
        });
        let registry = ServiceRegistry::builder(TestHost::default())
            .config(restricted_config())
            .restriction_source(source)
            .build();

        registry.with_service(tenant(0), |_| ());
        registry.on_restriction_changed(tenant(0), false);
        assert!(registry.peek(tenant(0), |_| ()).is_some());
        assert_eq!(registry.host().removed_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn restriction_feed_ignored_when_tracking_is_off() {
        let registry = ServiceRegistry::builder(TestHost::default()).build();
        registry.with_service(tenant(0), |_| ());

        registry.on_restriction_changed(tenant(0), true);
        assert!(
            registry.peek(tenant(0), |_| ()).is_some(),
            "no restriction config means the feed is inert"
        );
    }

    #[test]
    fn startup_seed_marks_restricted_tenants() {
        let source = Arc::new(StaticRestrictions {
            tenants: vec![tenant(0), tenant(1)],
            restricted: vec![tenant(1)],
        });
        let registry = ServiceRegistry::builder(TestHost::default())
            .config(restricted_config())
            .restriction_source(source)
            .build();

        let disabled = registry.with_service(tenant(1), |s| s.disabled).unwrap();
        assert!(disabled, "seeded restriction applies to first creation");
        let disabled = registry.with_service(tenant(0), |s| s.disabled).unwrap();
        assert!(!disabled);
    }

    #[test]
    fn canonical_key_is_used_for_lookup_and_insertion() {
        let host = TestHost {
            alias: Some((tenant(99), tenant(1))),
            ..TestHost::default()
        };
        let registry = ServiceRegistry::builder(host).build();

        registry.with_service(tenant(99), |_| ());
        assert!(
            registry.peek(tenant(1), |_| ()).is_some(),
            "record must be stored under the canonical id"
        );
        assert!(
            registry.peek(tenant(99), |_| ()).is_some(),
            "alias lookups resolve to the same record"
        );

        let mut count = 0;
        registry.visit_all(|_| count += 1);
        assert_eq!(count, 1);

        assert!(registry.remove(tenant(99)).is_some());
        assert!(registry.peek(tenant(1), |_| ()).is_none());
    }

    #[test]
    fn remove_fires_hook_and_returns_record() {
        let registry = ServiceRegistry::builder(TestHost::default()).build();
        registry.with_service(tenant(2), |_| ());

        let removed = registry.remove(tenant(2));
        assert!(removed.is_some());
        assert_eq!(registry.host().removed_calls.load(Ordering::SeqCst), 1);

        assert!(registry.remove(tenant(2)).is_none(), "second remove is a no-op");
        assert_eq!(registry.host().removed_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clear_drops_everything_without_hooks() {
        let registry = ServiceRegistry::builder(TestHost::default()).build();
        registry.with_service(tenant(1), |_| ());
        registry.with_service(tenant(2), |_| ());

        registry.clear();

        let mut count = 0;
        registry.visit_all(|_| count += 1);
        assert_eq!(count, 0);
        assert_eq!(
            registry.host().removed_calls.load(Ordering::SeqCst),
            0,
            "bulk reset must not fire removal hooks"
        );
    }

    #[test]
    fn tenant_lifecycle_hooks_map_to_update_and_remove() {
        let registry = ServiceRegistry::builder(TestHost::default()).build();

        registry.on_tenant_unlocked(tenant(3));
        assert!(registry.peek(tenant(3), |_| ()).is_some());

        registry.on_tenant_removed(tenant(3));
        assert!(registry.peek(tenant(3), |_| ()).is_none());
    }

    #[test]
    fn management_defaults_surface_not_implemented() {
        let registry = ServiceRegistry::builder(MinimalHost).build();
        assert!(matches!(
            registry.allow_instant_binding(),
            Err(RegistryError::NotImplemented { .. })
        ));
        assert!(matches!(
            registry.set_allow_instant_binding(true),
            Err(RegistryError::NotImplemented { .. })
        ));
    }

    #[test]
    fn management_denial_propagates() {
        let host = TestHost {
            deny_management: true,
            ..TestHost::default()
        };
        let registry = ServiceRegistry::builder(host).build();
        assert!(matches!(
            registry.set_allow_instant_binding(true),
            Err(RegistryError::PermissionDenied { .. })
        ));
        assert!(
            !registry.is_instant_binding_allowed(),
            "denied call must not mutate"
        );
    }

    #[test]
    fn instant_binding_round_trips_for_authorized_callers() {
        let registry = ServiceRegistry::builder(TestHost::default()).build();
        assert!(!registry.allow_instant_binding().unwrap());
        registry.set_allow_instant_binding(true).unwrap();
        assert!(registry.allow_instant_binding().unwrap());
        assert!(registry.is_instant_binding_allowed());
    }

    #[test]
    fn temporary_service_requires_a_resolver() {
        let host = TestHost {
            max_duration: Some(Duration::from_secs(60)),
            ..TestHost::default()
        };
        let registry = ServiceRegistry::builder(host).build();
        let result = registry.set_temporary_service(
            tenant(0),
            ComponentId::new("pkg", "Svc"),
            Duration::from_secs(1),
        );
        assert!(matches!(
            result,
            Err(RegistryError::NotImplemented { extension: "identity_resolver" })
        ));
    }

    #[test]
    fn over_long_override_duration_is_rejected() {
        let host = TestHost {
            max_duration: Some(Duration::from_secs(5)),
            ..TestHost::default()
        };
        let registry = ServiceRegistry::builder(host).build();
        let result = registry.set_temporary_service(
            tenant(0),
            ComponentId::new("pkg", "Svc"),
            Duration::from_secs(6),
        );
        assert!(matches!(
            result,
            Err(RegistryError::DurationExceeded { .. })
        ));
    }

    #[test]
    fn dump_reports_cache_and_flags() {
        let source = Arc::new(StaticRestrictions {
            tenants: vec![tenant(0), tenant(1)],
            restricted: vec![tenant(1)],
        });
        let registry = ServiceRegistry::builder(TestHost::default())
            .config(restricted_config())
            .restriction_source(source)
            .build();
        registry.with_service(tenant(0), |_| ());

        let mut report = String::new();
        registry.dump(&mut report).unwrap();

        assert!(report.contains("Debug: true Verbose: true"), "{report}");
        assert!(report.contains("Refresh on package update: true"));
        assert!(report.contains("Restricted tenants: 1=true"));
        assert!(report.contains("Cached services: 1"));
        assert!(report.contains("disabled=false"));

        // Forced flags are restored once the dump completes.
        assert!(!registry.debug());
        assert!(!registry.verbose());
        registry.set_verbose(true);
        let mut second = String::new();
        registry.dump(&mut second).unwrap();
        assert!(registry.verbose(), "pre-existing flag survives the dump");
        assert!(!registry.debug());
    }

    #[test]
    fn update_with_disabled_skips_the_restriction_re_query() {
        let source = Arc::new(StaticRestrictions {
            tenants: vec![tenant(0)],
            restricted: Vec::new(),
        });
        let registry = ServiceRegistry::builder(TestHost::default())
            .config(restricted_config())
            .restriction_source(source)
            .build();
        registry.with_service(tenant(0), |_| ());

        // The hint wins even though the restriction map still says enabled.
        registry.update_with_disabled(tenant(0), true);
        assert!(registry.peek(tenant(0), |_| ()).is_none());
    }
}
