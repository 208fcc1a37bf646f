//! Zone registry - the owned zone-state map
//!
//! Created from the configured id list, optionally hydrated from persistence,
//! mutated only by the scheduler, and read by the snapshot API.

use crate::domain::types::{RawZoneDetails, ZoneId, ZoneStatus};
use crate::domain::zone::Zone;
use crate::io::persistence::SavedZone;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Read-only view of one zone for dashboards and reporting
#[derive(Debug, Clone, Serialize)]
pub struct ZoneSnapshot {
    pub name: String,
    /// Kept for consumers that only understand up/down
    pub online: bool,
    pub status: ZoneStatus,
    pub status_label: &'static str,
    pub offline_since: Option<DateTime<Utc>>,
    pub offline_duration_seconds: Option<u64>,
    pub details: Option<RawZoneDetails>,
}

/// Aggregate status counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub expired: usize,
    pub no_subscription: usize,
    pub unpaired: usize,
    pub checking: usize,
}

impl StatusSummary {
    pub fn count(&self, status: ZoneStatus) -> usize {
        match status {
            ZoneStatus::Online => self.online,
            ZoneStatus::Offline => self.offline,
            ZoneStatus::Expired => self.expired,
            ZoneStatus::NoSubscription => self.no_subscription,
            ZoneStatus::Unpaired => self.unpaired,
            ZoneStatus::Checking => self.checking,
        }
    }

    fn record(&mut self, status: ZoneStatus) {
        self.total += 1;
        match status {
            ZoneStatus::Online => self.online += 1,
            ZoneStatus::Offline => self.offline += 1,
            ZoneStatus::Expired => self.expired += 1,
            ZoneStatus::NoSubscription => self.no_subscription += 1,
            ZoneStatus::Unpaired => self.unpaired += 1,
            ZoneStatus::Checking => self.checking += 1,
        }
    }
}

impl std::fmt::Display for StatusSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = ZoneStatus::ALL
            .iter()
            .filter(|s| self.count(**s) > 0)
            .map(|s| format!("{} {}", self.count(*s), s.as_str().replace('_', " ")))
            .collect();

        if parts.is_empty() {
            f.write_str("No zones")
        } else {
            f.write_str(&parts.join(", "))
        }
    }
}

/// All monitored zones, in configuration order
#[derive(Debug, Default)]
pub struct ZoneRegistry {
    order: Vec<ZoneId>,
    zones: FxHashMap<ZoneId, Zone>,
}

impl ZoneRegistry {
    /// Create a registry with every zone in `Checking`. Duplicate ids are ignored.
    pub fn new(ids: &[ZoneId]) -> Self {
        let mut registry = Self::default();
        for id in ids {
            if registry.zones.contains_key(id) {
                debug!(zone_id = %id, "duplicate_zone_id_ignored");
                continue;
            }
            registry.order.push(id.clone());
            registry.zones.insert(id.clone(), Zone::new(id.clone()));
        }
        registry
    }

    /// Restore persisted state for configured zones. Returns how many were restored.
    ///
    /// Saved zones no longer in the id list are ignored. `offline_since` is
    /// normalized so it is set iff the restored status is Offline.
    pub fn hydrate(&mut self, saved: FxHashMap<ZoneId, SavedZone>, now: DateTime<Utc>) -> usize {
        let mut restored = 0;
        for (id, state) in saved {
            let Some(zone) = self.zones.get_mut(&id) else {
                debug!(zone_id = %id, "saved_zone_not_configured");
                continue;
            };

            zone.name = state.name;
            zone.status = state.status;
            zone.details = state.details;
            zone.offline_since = match state.status {
                ZoneStatus::Offline => Some(state.offline_since.unwrap_or(now)),
                _ => None,
            };
            restored += 1;
        }

        info!(restored = %restored, configured = %self.order.len(), "registry_hydrated");
        restored
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn ids(&self) -> &[ZoneId] {
        &self.order
    }

    pub fn get(&self, id: &ZoneId) -> Option<&Zone> {
        self.zones.get(id)
    }

    pub fn get_mut(&mut self, id: &ZoneId) -> Option<&mut Zone> {
        self.zones.get_mut(id)
    }

    /// Zones in configuration order
    pub fn zones(&self) -> impl Iterator<Item = &Zone> {
        self.order.iter().filter_map(|id| self.zones.get(id))
    }

    /// Display name, falling back to the id
    pub fn zone_name(&self, id: &ZoneId) -> String {
        self.zones.get(id).map(|z| z.name.clone()).unwrap_or_else(|| id.to_string())
    }

    /// Zones whose observed status currently differs from the committed one
    pub fn pending_ids(&self) -> Vec<ZoneId> {
        self.zones().filter(|z| z.pending.is_some()).map(|z| z.id.clone()).collect()
    }

    /// Per-zone snapshot for dashboards
    pub fn detailed_status(&self, now: DateTime<Utc>) -> BTreeMap<ZoneId, ZoneSnapshot> {
        self.zones()
            .map(|zone| {
                let snapshot = ZoneSnapshot {
                    name: zone.name.clone(),
                    online: zone.status == ZoneStatus::Online,
                    status: zone.status,
                    status_label: zone.status.label(),
                    offline_since: zone.offline_since,
                    offline_duration_seconds: zone.offline_duration(now).map(|d| d.as_secs()),
                    details: zone.details.clone(),
                };
                (zone.id.clone(), snapshot)
            })
            .collect()
    }

    pub fn status_summary(&self) -> StatusSummary {
        let mut summary = StatusSummary::default();
        for zone in self.zones() {
            summary.record(zone.status);
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn ids(raw: &[&str]) -> Vec<ZoneId> {
        raw.iter().map(|s| ZoneId::from(*s)).collect()
    }

    fn saved(status: ZoneStatus, offline_since: Option<DateTime<Utc>>) -> SavedZone {
        SavedZone { name: "Hotel - Lobby".to_string(), status, offline_since, details: None }
    }

    #[test]
    fn test_new_registry_keeps_order_and_dedupes() {
        let registry = ZoneRegistry::new(&ids(&["b", "a", "b"]));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.ids(), &ids(&["b", "a"])[..]);
        assert!(registry.zones().all(|z| z.status == ZoneStatus::Checking));
    }

    #[test]
    fn test_hydrate_restores_configured_zones_only() {
        let mut registry = ZoneRegistry::new(&ids(&["a"]));
        let mut state = FxHashMap::default();
        state.insert(ZoneId::from("a"), saved(ZoneStatus::Online, None));
        state.insert(ZoneId::from("gone"), saved(ZoneStatus::Offline, Some(t0())));

        assert_eq!(registry.hydrate(state, t0()), 1);
        let zone = registry.get(&ZoneId::from("a")).unwrap();
        assert_eq!(zone.status, ZoneStatus::Online);
        assert_eq!(zone.name, "Hotel - Lobby");
        assert!(registry.get(&ZoneId::from("gone")).is_none());
    }

    #[test]
    fn test_hydrate_normalizes_offline_since() {
        let mut registry = ZoneRegistry::new(&ids(&["a", "b"]));
        let mut state = FxHashMap::default();
        state.insert(ZoneId::from("a"), saved(ZoneStatus::Offline, None));
        state.insert(ZoneId::from("b"), saved(ZoneStatus::Expired, Some(t0())));

        let now = t0() + chrono::Duration::minutes(3);
        registry.hydrate(state, now);

        assert_eq!(registry.get(&ZoneId::from("a")).unwrap().offline_since, Some(now));
        assert_eq!(registry.get(&ZoneId::from("b")).unwrap().offline_since, None);
    }

    #[test]
    fn test_detailed_status() {
        let mut registry = ZoneRegistry::new(&ids(&["a", "b"]));
        {
            let zone = registry.get_mut(&ZoneId::from("a")).unwrap();
            zone.name = "Test Zone".to_string();
            zone.status = ZoneStatus::Offline;
            zone.offline_since = Some(t0());
        }

        let status = registry.detailed_status(t0() + chrono::Duration::minutes(5));
        let a = &status[&ZoneId::from("a")];
        assert_eq!(a.name, "Test Zone");
        assert!(!a.online);
        assert_eq!(a.status_label, "Offline");
        assert_eq!(a.offline_duration_seconds, Some(300));

        let b = &status[&ZoneId::from("b")];
        assert_eq!(b.status, ZoneStatus::Checking);
        assert_eq!(b.status_label, "Checking...");
        assert_eq!(b.offline_since, None);
    }

    #[test]
    fn test_detailed_status_json() {
        let registry = ZoneRegistry::new(&ids(&["a"]));
        let json = serde_json::to_value(registry.detailed_status(t0())).unwrap();
        assert_eq!(json["a"]["status"], "checking");
        assert!(json["a"]["offline_since"].is_null());
    }

    #[test]
    fn test_status_summary() {
        let mut registry = ZoneRegistry::new(&ids(&["a", "b", "c", "d"]));
        registry.get_mut(&ZoneId::from("a")).unwrap().status = ZoneStatus::Online;
        registry.get_mut(&ZoneId::from("b")).unwrap().status = ZoneStatus::Online;
        registry.get_mut(&ZoneId::from("c")).unwrap().status = ZoneStatus::NoSubscription;

        let summary = registry.status_summary();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.online, 2);
        assert_eq!(summary.to_string(), "2 online, 1 no subscription, 1 checking");
    }

    #[test]
    fn test_empty_summary() {
        let registry = ZoneRegistry::new(&[]);
        assert_eq!(registry.status_summary().to_string(), "No zones");
    }
}
