//! Stability (debounce) filter
//!
//! A zone's committed status only changes after `threshold` consecutive
//! readings agree on the same new status. A single noisy reading (one dropped
//! heartbeat) is absorbed; a genuine, repeated change gets through.

use crate::domain::zone::{PendingTransition, StatusChanged, Zone};
use crate::domain::types::ZoneStatus;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Debounce state machine, parameterized by the confirmation threshold
#[derive(Debug, Clone, Copy)]
pub struct StabilityFilter {
    threshold: u32,
}

impl StabilityFilter {
    /// Threshold is clamped to at least 1 (1 = commit on first reading)
    pub fn new(threshold: u32) -> Self {
        Self { threshold: threshold.max(1) }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Feed one candidate status for `zone`. Returns the committed change, if any.
    pub fn observe(
        &self,
        zone: &mut Zone,
        candidate: ZoneStatus,
        now: DateTime<Utc>,
    ) -> Option<StatusChanged> {
        if candidate == zone.status {
            if zone.pending.take().is_some() {
                debug!(zone_id = %zone.id, status = %candidate, "pending_transition_cleared");
            }
            return None;
        }

        let confirmations = match zone.pending.as_mut() {
            Some(pending) if pending.candidate == candidate => {
                pending.confirmations += 1;
                pending.confirmations
            }
            _ => {
                zone.pending =
                    Some(PendingTransition { candidate, confirmations: 1, first_seen: now });
                1
            }
        };

        if confirmations < self.threshold {
            debug!(
                zone_id = %zone.id,
                committed = %zone.status,
                candidate = %candidate,
                confirmations = %confirmations,
                threshold = %self.threshold,
                "pending_transition"
            );
            return None;
        }

        let old = zone.status;
        zone.status = candidate;
        zone.pending = None;

        Some(StatusChanged { zone_id: zone.id.clone(), old, new: candidate, at: now })
    }
}

impl Default for StabilityFilter {
    fn default() -> Self {
        Self::new(2)
    }
}
