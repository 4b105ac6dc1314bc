//! Registry configuration.

use serde::Deserialize;

/// Construction-time configuration of a [`crate::ServiceRegistry`].
///
/// Missing fields fall back to their defaults, so a registry can be built
/// from an empty config section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// When `true`, a cached service whose backing package starts updating is
    /// evicted (and lazily re-created once callers come back); when `false`,
    /// the cached record is left untouched for the whole update window.
    pub refresh_on_update: bool,

    /// Name of the administrative restriction flag that forces a tenant's
    /// service into the disabled state. `None` turns restriction tracking
    /// off for this registry instance.
    pub restriction: Option<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            refresh_on_update: true,
            restriction: None,
        }
    }
}

impl RegistryConfig {
    /// Deserialize a config from a raw JSON section.
    ///
    /// # Errors
    /// Returns the underlying serde error when the section exists but does
    /// not match the schema.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value.clone())
    }
}
