//! Sweep execution for the PollingScheduler
//!
//! A sweep walks a list of zones in budget-sized batches. Each batch is fetched
//! concurrently and then applied one response at a time, so the registry and
//! the budget only ever see serialized updates.

use super::PollingScheduler;
use crate::domain::error::{EngineError, FetchError};
use crate::domain::types::{ZoneId, ZoneStatus};
use crate::domain::zone::{RecoveryEvent, StatusChanged};
use crate::infra::metrics::SweepKind;
use crate::io::persistence::ZoneRecord;
use crate::io::status_api::{RemoteStatusClient, ZoneReading};
use crate::services::classifier::classify;
use crate::services::notifier::Alert;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// What one sweep did
#[derive(Debug, Clone)]
pub struct SweepOutcome {
    pub kind: SweepKind,
    /// Zones scheduled for this sweep
    pub zones: usize,
    /// Zones actually fetched (less than `zones` if cancelled)
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub rate_limited: usize,
    pub unreachable: usize,
    pub retries: usize,
    pub batches: usize,
    /// Budget suspensions waited out during the sweep
    pub suspensions: usize,
    pub transitions: Vec<StatusChanged>,
    pub recoveries: Vec<RecoveryEvent>,
    pub alerts_dispatched: usize,
    pub cancelled: bool,
    last_error: Option<String>,
}

impl SweepOutcome {
    fn new(kind: SweepKind, zones: usize) -> Self {
        Self {
            kind,
            zones,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            rate_limited: 0,
            unreachable: 0,
            retries: 0,
            batches: 0,
            suspensions: 0,
            transitions: Vec::new(),
            recoveries: Vec::new(),
            alerts_dispatched: 0,
            cancelled: false,
            last_error: None,
        }
    }

    /// Every fetch of a non-empty sweep failed with Unreachable
    pub fn api_unreachable(&self) -> bool {
        self.attempted > 0 && self.unreachable == self.attempted
    }
}

/// Result of one zone fetch, including the optional retry
struct FetchReport {
    zone_id: ZoneId,
    result: Result<ZoneReading, FetchError>,
    retried: bool,
}

/// Fetch one zone, retrying a transient or connect failure once after `backoff`
async fn fetch_with_retry(
    client: Arc<dyn RemoteStatusClient>,
    zone_id: ZoneId,
    backoff: Duration,
) -> FetchReport {
    match client.fetch(&zone_id).await {
        Err(e) if e.is_retryable() => {
            debug!(zone_id = %zone_id, error = %e, "fetch_retrying");
            tokio::time::sleep(backoff).await;
            let result = client.fetch(&zone_id).await;
            FetchReport { zone_id, result, retried: true }
        }
        result => FetchReport { zone_id, result, retried: false },
    }
}

impl PollingScheduler {
    /// Sweep every configured zone
    pub async fn run_main_sweep(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<SweepOutcome, EngineError> {
        let ids = self.registry.read().ids().to_vec();
        self.sweep(SweepKind::Main, ids, shutdown).await
    }

    /// Sweep only offline zones and zones with an unconfirmed transition
    pub async fn run_priority_sweep(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<SweepOutcome, EngineError> {
        let ids = self.priority_ids();
        self.sweep(SweepKind::Priority, ids, shutdown).await
    }

    async fn sweep(
        &mut self,
        kind: SweepKind,
        ids: Vec<ZoneId>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<SweepOutcome, EngineError> {
        let started = Instant::now();
        let mut outcome = SweepOutcome::new(kind, ids.len());
        debug!(sweep = kind.as_str(), zones = %ids.len(), "sweep_started");

        let mut remaining: &[ZoneId] = &ids;
        while !remaining.is_empty() {
            if *shutdown.borrow() {
                outcome.cancelled = true;
                break;
            }

            if !self.wait_for_budget(shutdown, &mut outcome).await {
                outcome.cancelled = true;
                break;
            }

            let batch_size = self.budget.lock().batch_size().min(remaining.len());
            let (batch, rest) = remaining.split_at(batch_size);
            remaining = rest;

            self.run_batch(batch, &mut outcome).await;
        }

        let now = self.now_utc();
        if !outcome.cancelled {
            outcome.alerts_dispatched = self.evaluate_alerts(now);
        }
        self.reap_background();

        let elapsed_ms = started.elapsed().as_millis() as u64;
        self.metrics.record_sweep(kind, elapsed_ms);

        let summary = self.registry.read().status_summary();
        info!(
            sweep = kind.as_str(),
            zones = %outcome.zones,
            fetched = %outcome.succeeded,
            failed = %outcome.failed,
            rate_limited = %outcome.rate_limited,
            transitions = %outcome.transitions.len(),
            alerts = %outcome.alerts_dispatched,
            duration_ms = %elapsed_ms,
            cancelled = %outcome.cancelled,
            summary = %summary,
            "sweep_completed"
        );

        if outcome.api_unreachable() {
            self.unreachable_sweeps += 1;
            let limit = self.settings.unreachable_sweep_limit.max(1);
            warn!(
                sweep = kind.as_str(),
                consecutive = %self.unreachable_sweeps,
                limit = %limit,
                "status_api_unreachable"
            );
            if self.unreachable_sweeps >= limit {
                return Err(EngineError::ApiUnreachable {
                    sweeps: self.unreachable_sweeps,
                    failed: outcome.unreachable,
                    last_error: outcome.last_error.clone().unwrap_or_default(),
                });
            }
        } else if outcome.attempted > 0 {
            self.unreachable_sweeps = 0;
        }
        Ok(outcome)
    }

    /// Suspend until the budget resets if not even one call is affordable.
    ///
    /// Returns false if shutdown was requested while waiting.
    async fn wait_for_budget(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
        outcome: &mut SweepOutcome,
    ) -> bool {
        let (wait, available) = {
            let mut budget = self.budget.lock();
            (budget.wait_needed(Instant::now()), budget.available())
        };
        let Some(wait) = wait else {
            return true;
        };

        info!(
            available = %available,
            wait_ms = %wait.as_millis(),
            "rate_budget_exhausted_suspending"
        );
        self.metrics.record_budget_suspension();
        outcome.suspensions += 1;

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                let mut budget = self.budget.lock();
                budget.replenish();
                info!(available = %budget.available(), "rate_budget_replenished");
                true
            }
            _ = shutdown.changed() => {
                info!("rate_budget_wait_cancelled");
                false
            }
        }
    }

    /// Fan out one batch and apply every response as it completes
    async fn run_batch(&mut self, batch: &[ZoneId], outcome: &mut SweepOutcome) {
        outcome.batches += 1;
        debug!(batch_size = %batch.len(), available = %self.budget.lock().available(), "batch_started");

        let mut set = JoinSet::new();
        for zone_id in batch {
            set.spawn(fetch_with_retry(
                self.client.clone(),
                zone_id.clone(),
                self.settings.retry_backoff,
            ));
        }

        // Drain fully, even on shutdown, so no batch is half-applied
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(report) => self.apply_report(report, outcome),
                Err(e) => {
                    outcome.attempted += 1;
                    outcome.failed += 1;
                    warn!(error = %e, "fetch_task_failed");
                }
            }
        }
    }

    fn apply_report(&mut self, report: FetchReport, outcome: &mut SweepOutcome) {
        outcome.attempted += 1;
        if report.retried {
            outcome.retries += 1;
            self.metrics.record_fetch_retry();
        }

        let zone_id = report.zone_id;
        match report.result {
            Ok(reading) => {
                self.budget.lock().record_response(reading.rate_limit, Instant::now());
                self.metrics.record_fetch_success();
                outcome.succeeded += 1;

                let now = self.now_utc();
                self.apply_reading(&zone_id, reading, now, outcome);
            }
            Err(FetchError::RateLimited { available, reset_after }) => {
                self.budget.lock().record_rate_limited(available, reset_after, Instant::now());
                self.metrics.record_rate_limited();
                self.metrics.record_fetch_failed();
                outcome.rate_limited += 1;
                outcome.failed += 1;
                warn!(
                    zone_id = %zone_id,
                    available = %available,
                    reset_after_secs = %reset_after.as_secs(),
                    "fetch_rate_limited"
                );
            }
            Err(e) => {
                self.metrics.record_fetch_failed();
                outcome.failed += 1;
                if matches!(e, FetchError::Unreachable(_)) {
                    outcome.unreachable += 1;
                }
                warn!(zone_id = %zone_id, kind = e.kind(), error = %e, "fetch_failed");
                outcome.last_error = Some(e.to_string());
            }
        }
    }

    /// Classify a reading and feed it through stabilization and offline tracking
    pub(crate) fn apply_reading(
        &mut self,
        zone_id: &ZoneId,
        reading: ZoneReading,
        now: DateTime<Utc>,
        outcome: &mut SweepOutcome,
    ) {
        let classification = classify(&reading.details);
        if let Some(ambiguity) = classification.ambiguity {
            warn!(
                zone_id = %zone_id,
                ambiguity = ambiguity.as_str(),
                status = %classification.status,
                "classification_ambiguity"
            );
        }

        let mut registry = self.registry.write();
        let Some(zone) = registry.get_mut(zone_id) else {
            debug!(zone_id = %zone_id, "reading_for_unknown_zone");
            return;
        };

        zone.name = reading.name;
        zone.details = Some(reading.details);

        let Some(change) = self.stability.observe(zone, classification.status, now) else {
            return;
        };

        info!(
            zone_id = %zone_id,
            zone_name = %zone.name,
            old = %change.old,
            new = %change.new,
            "zone_status_changed"
        );
        self.metrics.record_transition();

        if let Some(recovery) = self.tracker.apply(zone, &change) {
            self.metrics.record_recovery();
            outcome.recoveries.push(recovery);
        }

        if change.new == ZoneStatus::Offline {
            self.priority.insert(zone_id.clone());
        } else {
            self.priority.remove(zone_id);
        }

        let record = ZoneRecord {
            zone_id: zone.id.clone(),
            status: zone.status,
            name: zone.name.clone(),
            details: zone.details.clone(),
            offline_since: zone.offline_since,
            group_name: zone.group_name(),
            updated_at: now,
        };
        drop(registry);

        self.persist(record);
        outcome.transitions.push(change);
    }

    /// Fire-and-forget write of a committed transition
    fn persist(&mut self, record: ZoneRecord) {
        let Some(gateway) = self.persistence.clone() else {
            return;
        };
        let metrics = self.metrics.clone();

        self.writes.spawn(async move {
            let zone_id = record.zone_id.clone();
            if let Err(e) = gateway.save(record).await {
                metrics.record_persistence_error();
                warn!(zone_id = %zone_id, error = %e, "persistence_save_failed");
            }
        });
    }

    /// Hand every zone offline for at least the threshold to the notification chain.
    ///
    /// Dispatch runs on spawned tasks; the chain's cooldown decides what is actually sent.
    pub(crate) fn evaluate_alerts(&mut self, now: DateTime<Utc>) -> usize {
        let mut due: Vec<Alert> = {
            let registry = self.registry.read();
            self.tracker
                .offline_zones(registry.zones(), now)
                .into_iter()
                .filter(|(_, duration)| *duration >= self.settings.offline_threshold)
                .map(|(zone_id, offline_duration)| Alert {
                    zone_name: registry.zone_name(&zone_id),
                    zone_id,
                    offline_duration,
                })
                .collect()
        };
        due.sort_by(|a, b| a.zone_id.cmp(&b.zone_id));

        for alert in &due {
            debug!(
                zone_id = %alert.zone_id,
                offline_mins = %(alert.offline_duration.as_secs() / 60),
                "alert_due"
            );
        }

        let count = due.len();
        for alert in due {
            let notifier = self.notifier.clone();
            self.alerts.spawn(async move {
                let outcome = notifier.send_alert(&alert).await;
                (alert.zone_id, outcome)
            });
        }
        count
    }
}
