//! Error taxonomy of the registry's management surface.
//!
//! Lifecycle and configuration events that reference an unknown tenant or an
//! irrelevant package are *not* errors; those paths degrade to silent no-ops.

use std::time::Duration;

/// Errors surfaced synchronously to management API callers.
///
/// None of these are retried by the registry; the caller either lacks the
/// management capability, submitted an out-of-range argument, or the concrete
/// registry never implemented a required extension point.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The caller does not hold the management capability for `operation`.
    #[error("management access denied for `{operation}`")]
    PermissionDenied { operation: &'static str },

    /// A temporary override was requested for longer than the concrete
    /// registry allows.
    #[error("override duration {requested:?} exceeds the maximum {maximum:?}")]
    DurationExceeded {
        requested: Duration,
        maximum: Duration,
    },

    /// The concrete registry left a required extension point unimplemented.
    /// This is an integration error, not a runtime condition.
    #[error("extension point `{extension}` is not implemented by this registry")]
    NotImplemented { extension: &'static str },
}
