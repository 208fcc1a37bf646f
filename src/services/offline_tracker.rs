//! Offline-duration tracking driven by committed status changes

use crate::domain::types::{ZoneId, ZoneStatus};
use crate::domain::zone::{RecoveryEvent, StatusChanged, Zone};
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use std::time::Duration;
use tracing::{info, warn};

/// Maintains `offline_since` so that it is set iff the committed status is Offline.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineTracker;

impl OfflineTracker {
    pub fn new() -> Self {
        Self
    }

    /// Apply a committed transition to the zone's offline bookkeeping
    pub fn apply(&self, zone: &mut Zone, change: &StatusChanged) -> Option<RecoveryEvent> {
        match change.new {
            ZoneStatus::Offline => {
                if zone.offline_since.is_none() {
                    zone.offline_since = Some(change.at);
                }
                warn!(
                    zone_id = %zone.id,
                    zone_name = %zone.name,
                    previous = %change.old,
                    "zone_went_offline"
                );
                None
            }
            ZoneStatus::Online => {
                let since = zone.offline_since.take()?;
                let offline_for = (change.at - since).to_std().unwrap_or(Duration::ZERO);
                info!(
                    zone_id = %zone.id,
                    zone_name = %zone.name,
                    offline_secs = %offline_for.as_secs(),
                    "zone_back_online"
                );
                Some(RecoveryEvent { zone_id: zone.id.clone(), offline_for, at: change.at })
            }
            status => {
                // Configuration problems are not outages: never accrue offline time
                zone.offline_since = None;
                if status.is_configuration_issue() {
                    warn!(
                        zone_id = %zone.id,
                        zone_name = %zone.name,
                        status = %status,
                        label = %status.label(),
                        "zone_configuration_issue"
                    );
                }
                None
            }
        }
    }

    /// Offline duration for every zone currently offline
    pub fn offline_zones<'a>(
        &self,
        zones: impl IntoIterator<Item = &'a Zone>,
        now: DateTime<Utc>,
    ) -> FxHashMap<ZoneId, Duration> {
        zones
            .into_iter()
            .filter(|zone| zone.status == ZoneStatus::Offline)
            .filter_map(|zone| zone.offline_duration(now).map(|d| (zone.id.clone(), d)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn minutes(m: i64) -> chrono::Duration {
        chrono::Duration::minutes(m)
    }

    /// Commit `new` on the zone and apply the resulting change
    fn commit(zone: &mut Zone, new: ZoneStatus, at: DateTime<Utc>) -> Option<RecoveryEvent> {
        let change = StatusChanged { zone_id: zone.id.clone(), old: zone.status, new, at };
        zone.status = new;
        OfflineTracker::new().apply(zone, &change)
    }

    #[test]
    fn test_into_offline_sets_since() {
        let mut zone = Zone::new(ZoneId::from("z1"));
        commit(&mut zone, ZoneStatus::Online, t0());
        commit(&mut zone, ZoneStatus::Offline, t0() + minutes(1));
        assert_eq!(zone.offline_since, Some(t0() + minutes(1)));
    }

    #[test]
    fn test_existing_since_is_preserved() {
        let mut zone = Zone::new(ZoneId::from("z1"));
        zone.offline_since = Some(t0());
        commit(&mut zone, ZoneStatus::Offline, t0() + minutes(5));
        assert_eq!(zone.offline_since, Some(t0()));
    }

    #[test]
    fn test_recovery_reports_duration() {
        let mut zone = Zone::new(ZoneId::from("z1"));
        commit(&mut zone, ZoneStatus::Offline, t0());

        let recovery = commit(&mut zone, ZoneStatus::Online, t0() + minutes(12)).unwrap();
        assert_eq!(recovery.offline_for, Duration::from_secs(12 * 60));
        assert_eq!(recovery.zone_id, ZoneId::from("z1"));
        assert!(zone.offline_since.is_none());
    }

    #[test]
    fn test_online_without_prior_outage_has_no_recovery() {
        let mut zone = Zone::new(ZoneId::from("z1"));
        assert!(commit(&mut zone, ZoneStatus::Online, t0()).is_none());
    }

    #[test]
    fn test_configuration_states_clear_since() {
        for status in [ZoneStatus::Expired, ZoneStatus::Unpaired, ZoneStatus::NoSubscription] {
            let mut zone = Zone::new(ZoneId::from("z1"));
            commit(&mut zone, ZoneStatus::Offline, t0());
            assert!(zone.offline_since.is_some());

            assert!(commit(&mut zone, status, t0() + minutes(20)).is_none());
            assert!(zone.offline_since.is_none(), "{status}");
        }
    }

    #[test]
    fn test_offline_zones_only_lists_offline() {
        let mut offline = Zone::new(ZoneId::from("a"));
        commit(&mut offline, ZoneStatus::Offline, t0());
        let mut online = Zone::new(ZoneId::from("b"));
        commit(&mut online, ZoneStatus::Online, t0());

        let zones = [offline, online];
        let result = OfflineTracker::new().offline_zones(zones.iter(), t0() + minutes(15));

        assert_eq!(result.len(), 1);
        assert_eq!(result[&ZoneId::from("a")], Duration::from_secs(15 * 60));
    }

    #[test]
    fn test_offline_duration_is_monotonic() {
        let mut zone = Zone::new(ZoneId::from("z1"));
        commit(&mut zone, ZoneStatus::Offline, t0());
        let tracker = OfflineTracker::new();

        let mut last = Duration::ZERO;
        for m in 0..30 {
            let zones = [zone.clone()];
            let d = tracker.offline_zones(zones.iter(), t0() + minutes(m))[&zone.id];
            assert!(d >= last);
            last = d;
        }
    }
}
