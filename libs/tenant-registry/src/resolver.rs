//! Backing-identity resolution.
//!
//! The registry consumes the [`IdentityResolver`] contract: something that
//! knows, per tenant, which external component backs the service, supports a
//! permanent default plus a time-bounded temporary override, and notifies the
//! registry whenever the resolved identity changes (including when an
//! override expires).
//!
//! [`StaticIdentityResolver`] is the provided implementation: a fixed default
//! component with per-tenant overrides whose expiry timers run on tokio.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;

use crate::model::{ComponentId, TenantId};

/// Callback invoked with the newly resolved identity after a change.
///
/// Never invoked while the caller of a resolver method still holds the
/// registry lock; the registry releases its lock before delegating to the
/// resolver, and expiry timers run on their own task.
pub type IdentityChangedCallback = Arc<dyn Fn(TenantId, Option<ComponentId>) + Send + Sync>;

/// Resolves which external component backs a tenant's service.
pub trait IdentityResolver: Send + Sync + 'static {
    /// The identity currently backing `tenant`, or `None` when the tenant
    /// has no resolvable backing component.
    fn resolve_current(&self, tenant: TenantId) -> Option<ComponentId>;

    /// Register the change callback. The registry does this exactly once at
    /// construction; a later call replaces the previous callback.
    fn set_change_callback(&self, callback: IdentityChangedCallback);

    /// Install a temporary override that auto-reverts after `duration`.
    ///
    /// Duration validation against the configured maximum is the caller's
    /// responsibility; the resolver applies whatever it is given. Must be
    /// called from within a tokio runtime (the expiry timer is spawned on
    /// it).
    fn set_temporary(&self, tenant: TenantId, component: ComponentId, duration: Duration);

    /// Drop any pending override for `tenant`, reverting to the default.
    fn reset_temporary(&self, tenant: TenantId);

    /// Enable or disable the default identity for `tenant`; returns whether
    /// the value changed. Does not notify: the caller reconciles explicitly.
    fn set_default_enabled(&self, tenant: TenantId, enabled: bool) -> bool;

    fn is_default_enabled(&self, tenant: TenantId) -> bool;

    /// One-line summary for the diagnostic dump.
    ///
    /// # Errors
    /// Propagates formatter errors.
    fn dump_summary(&self, out: &mut dyn fmt::Write) -> fmt::Result;

    /// Per-tenant resolution line for the diagnostic dump.
    ///
    /// # Errors
    /// Propagates formatter errors.
    fn dump_tenant(&self, tenant: TenantId, out: &mut dyn fmt::Write) -> fmt::Result;
}

struct TemporaryOverride {
    component: ComponentId,
    expires_at: Instant,
    generation: u64,
    timer: tokio::task::JoinHandle<()>,
}

#[derive(Default)]
struct ResolverState {
    overrides: HashMap<TenantId, TemporaryOverride>,
    default_disabled: HashSet<TenantId>,
    next_generation: u64,
}

struct ResolverInner {
    default_component: Option<ComponentId>,
    state: Mutex<ResolverState>,
    callback: RwLock<Option<IdentityChangedCallback>>,
}

impl ResolverInner {
    fn resolve(&self, tenant: TenantId) -> Option<ComponentId> {
        let state = self.state.lock();
        if let Some(active) = state.overrides.get(&tenant) {
            // A not-yet-fired timer may lag the deadline; the deadline wins.
            if Instant::now() < active.expires_at {
                return Some(active.component.clone());
            }
        }
        if state.default_disabled.contains(&tenant) {
            return None;
        }
        self.default_component.clone()
    }

    fn notify(&self, tenant: TenantId) {
        let callback = self.callback.read().clone();
        if let Some(callback) = callback {
            callback(tenant, self.resolve(tenant));
        }
    }

    /// Timer body: only the override generation that armed the timer may
    /// expire it, so a replaced or reset override can never fire twice.
    fn expire(inner: &Arc<Self>, tenant: TenantId, generation: u64) {
        let expired = {
            let mut state = inner.state.lock();
            match state.overrides.get(&tenant) {
                Some(current) if current.generation == generation => {
                    state.overrides.remove(&tenant);
                    true
                }
                _ => false,
            }
        };
        if expired {
            tracing::info!(tenant = %tenant, "temporary identity override expired");
            inner.notify(tenant);
        }
    }
}

/// [`IdentityResolver`] with a fixed default component.
///
/// Temporary overrides are tracked per tenant; each arms a tokio timer that
/// reverts the tenant to its default identity and fires the change callback
/// exactly once at expiry.
pub struct StaticIdentityResolver {
    inner: Arc<ResolverInner>,
}

impl StaticIdentityResolver {
    #[must_use]
    pub fn new(default_component: Option<ComponentId>) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                default_component,
                state: Mutex::new(ResolverState::default()),
                callback: RwLock::new(None),
            }),
        }
    }
}

impl IdentityResolver for StaticIdentityResolver {
    fn resolve_current(&self, tenant: TenantId) -> Option<ComponentId> {
        self.inner.resolve(tenant)
    }

    fn set_change_callback(&self, callback: IdentityChangedCallback) {
        *self.inner.callback.write() = Some(callback);
    }

    fn set_temporary(&self, tenant: TenantId, component: ComponentId, duration: Duration) {
        {
            let mut state = self.inner.state.lock();
            state.next_generation += 1;
            let generation = state.next_generation;
            if let Some(previous) = state.overrides.remove(&tenant) {
                previous.timer.abort();
            }
            let timer = tokio::spawn({
                let inner = Arc::clone(&self.inner);
                async move {
                    tokio::time::sleep(duration).await;
                    ResolverInner::expire(&inner, tenant, generation);
                }
            });
            state.overrides.insert(
                tenant,
                TemporaryOverride {
                    component: component.clone(),
                    expires_at: Instant::now() + duration,
                    generation,
                    timer,
                },
            );
        }
        tracing::info!(
            tenant = %tenant,
            component = %component,
            duration_ms = duration.as_millis(),
            "temporary identity override set"
        );
        self.inner.notify(tenant);
    }

    fn reset_temporary(&self, tenant: TenantId) {
        let removed = {
            let mut state = self.inner.state.lock();
            state.overrides.remove(&tenant)
        };
        if let Some(active) = removed {
            active.timer.abort();
            tracing::info!(tenant = %tenant, "temporary identity override reset");
            self.inner.notify(tenant);
        }
    }

    fn set_default_enabled(&self, tenant: TenantId, enabled: bool) -> bool {
        let mut state = self.inner.state.lock();
        if enabled {
            state.default_disabled.remove(&tenant)
        } else {
            state.default_disabled.insert(tenant)
        }
    }

    fn is_default_enabled(&self, tenant: TenantId) -> bool {
        !self.inner.state.lock().default_disabled.contains(&tenant)
    }

    fn dump_summary(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let state = self.inner.state.lock();
        match &self.inner.default_component {
            Some(component) => write!(out, "default={component}")?,
            None => write!(out, "default=none")?,
        }
        write!(out, " active_overrides={}", state.overrides.len())
    }

    fn dump_tenant(&self, tenant: TenantId, out: &mut dyn fmt::Write) -> fmt::Result {
        let resolved = self.inner.resolve(tenant);
        let state = self.inner.state.lock();
        let temporary = state.overrides.contains_key(&tenant);
        let default_enabled = !state.default_disabled.contains(&tenant);
        match resolved {
            Some(component) => write!(out, "{component}")?,
            None => write!(out, "unresolved")?,
        }
        write!(out, " (temporary={temporary}, default_enabled={default_enabled})")
    }
}
