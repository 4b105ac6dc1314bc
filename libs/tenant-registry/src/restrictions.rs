//! Per-tenant administrative restriction state.

use std::collections::HashMap;

use crate::model::TenantId;

/// Tracks which tenants are administratively disabled.
///
/// Lives inside the registry state and is therefore guarded by the same
/// coarse lock as the service cache. An absent map means restriction
/// tracking is off for this registry instance; an absent entry means "not
/// restricted".
#[derive(Debug)]
pub(crate) struct RestrictionTracker {
    map: Option<HashMap<TenantId, bool>>,
}

impl RestrictionTracker {
    /// Tracker for a registry without a configured restriction flag.
    pub(crate) fn disabled() -> Self {
        Self { map: None }
    }

    /// Tracker seeded from the startup restriction scan. Only tenants that
    /// are currently restricted get an entry; everyone else defaults.
    pub(crate) fn seeded(entries: impl IntoIterator<Item = (TenantId, bool)>) -> Self {
        let map = entries
            .into_iter()
            .filter(|(_, restricted)| *restricted)
            .collect();
        Self { map: Some(map) }
    }

    pub(crate) fn tracking(&self) -> bool {
        self.map.is_some()
    }

    pub(crate) fn is_disabled(&self, tenant: TenantId) -> bool {
        self.map
            .as_ref()
            .and_then(|map| map.get(&tenant).copied())
            .unwrap_or(false)
    }

    pub(crate) fn set(&mut self, tenant: TenantId, restricted: bool) {
        if let Some(map) = self.map.as_mut() {
            map.insert(tenant, restricted);
        }
    }

    /// Snapshot for diagnostics, sorted by tenant for stable output.
    /// `None` when tracking is off.
    pub(crate) fn snapshot(&self) -> Option<Vec<(TenantId, bool)>> {
        let map = self.map.as_ref()?;
        let mut entries: Vec<_> = map.iter().map(|(t, r)| (*t, *r)).collect();
        entries.sort_by_key(|(t, _)| *t);
        Some(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_tracker_reports_nothing() {
        let tracker = RestrictionTracker::disabled();
        assert!(!tracker.tracking());
        assert!(!tracker.is_disabled(TenantId::new(0)));
        assert!(tracker.snapshot().is_none());
    }

    #[test]
    fn seeding_keeps_only_restricted_tenants() {
        let tracker = RestrictionTracker::seeded(vec![
            (TenantId::new(0), false),
            (TenantId::new(1), true),
            (TenantId::new(2), false),
        ]);
        assert!(tracker.tracking());
        assert!(!tracker.is_disabled(TenantId::new(0)));
        assert!(tracker.is_disabled(TenantId::new(1)));
        assert_eq!(tracker.snapshot().unwrap(), vec![(TenantId::new(1), true)]);
    }

    #[test]
    fn set_overrides_previous_value() {
        let mut tracker = RestrictionTracker::seeded(vec![(TenantId::new(5), true)]);
        tracker.set(TenantId::new(5), false);
        assert!(!tracker.is_disabled(TenantId::new(5)));

        tracker.set(TenantId::new(6), true);
        assert!(tracker.is_disabled(TenantId::new(6)));
    }

    #[test]
    fn set_is_a_no_op_when_tracking_is_off() {
        let mut tracker = RestrictionTracker::disabled();
        tracker.set(TenantId::new(1), true);
        assert!(!tracker.is_disabled(TenantId::new(1)));
    }
}
