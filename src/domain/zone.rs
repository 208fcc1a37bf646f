//! Zone model - the monitored entity and the events its lifecycle produces

use crate::domain::types::{RawZoneDetails, ZoneId, ZoneStatus};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// A candidate status awaiting confirmation by repeated readings
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTransition {
    pub candidate: ZoneStatus,
    pub confirmations: u32,
    pub first_seen: DateTime<Utc>,
}

/// A single monitored zone
#[derive(Debug, Clone)]
pub struct Zone {
    pub id: ZoneId,
    pub name: String,
    /// Committed (externally visible) status
    pub status: ZoneStatus,
    /// Latest raw snapshot, `None` until the first successful fetch
    pub details: Option<RawZoneDetails>,
    /// Set iff `status == Offline`
    pub offline_since: Option<DateTime<Utc>>,
    /// Exists only while the observed status differs from the committed one
    pub pending: Option<PendingTransition>,
}

impl Zone {
    pub fn new(id: ZoneId) -> Self {
        let name = id.0.clone();
        Self {
            id,
            name,
            status: ZoneStatus::Checking,
            details: None,
            offline_since: None,
            pending: None,
        }
    }

    /// Account/group name derived from the display name.
    ///
    /// Zones are conventionally named "Account - Zone"; otherwise the first word is used.
    pub fn group_name(&self) -> String {
        if let Some((group, _)) = self.name.split_once(" - ") {
            return group.trim().to_string();
        }
        self.name.split_whitespace().next().unwrap_or("Unknown").to_string()
    }

    /// Time spent offline as of `now`, `None` unless offline
    pub fn offline_duration(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.offline_since.map(|since| (now - since).to_std().unwrap_or(Duration::ZERO))
    }
}

/// Emitted by the stability filter when a new status is committed
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChanged {
    pub zone_id: ZoneId,
    pub old: ZoneStatus,
    pub new: ZoneStatus,
    pub at: DateTime<Utc>,
}

/// Emitted when an offline zone is confirmed back online
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryEvent {
    pub zone_id: ZoneId,
    pub offline_for: Duration,
    pub at: DateTime<Utc>,
}
