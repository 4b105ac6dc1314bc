//! Multi-tenant service instance registry.
//!
//! Given a tenant identifier, the registry lazily creates, caches,
//! enables/disables and evicts one long-lived service record per tenant,
//! staying consistent with three independently arriving signal feeds:
//!
//! - tenant-level administrative restriction flags,
//! - backing-identity changes (permanent defaults and time-bounded
//!   temporary overrides, including override expiry),
//! - lifecycle events of the external package backing the service
//!   (install/update/remove/force-stop) plus configuration-property changes.
//!
//! Everything funnels into one reconciliation entry point
//! ([`ServiceRegistry::update`]) guarded by a single coarse lock, which
//! guarantees at most one live record per tenant and linearizes updates from
//! the independent event sources.
//!
//! The host plugs in through the [`RegistryHost`] contract (service factory,
//! enable/remove hooks, management extension points) and wires the event
//! feeds to [`ServiceRegistry`], [`LifecycleMonitor`] and [`SettingsWatcher`]
//! entry points. See the trait docs for the reentrancy rules hooks must obey.

pub mod config;
pub mod contracts;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod registry;
pub mod resolver;
mod restrictions;
pub mod settings;

pub use config::RegistryConfig;
pub use contracts::{RegistryHost, RestrictionSource, TenantService};
pub use error::RegistryError;
pub use lifecycle::{LifecycleMonitor, PackageEventHandler};
pub use model::{ComponentId, ComponentIdParseError, TenantId};
pub use registry::{RegistryBuilder, ServiceRegistry};
pub use resolver::{IdentityChangedCallback, IdentityResolver, StaticIdentityResolver};
pub use settings::{MemorySettingsStore, SettingsStore, SettingsWatcher, SETUP_COMPLETE_PROPERTY};
