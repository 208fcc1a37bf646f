//! Polling scheduler - drives every sweep of the monitoring engine
//!
//! The scheduler coordinates:
//! - Main sweeps over every configured zone
//! - Priority sweeps over offline and unsettled zones
//! - Rate-budget aware batching (fan-out per batch, fan-in before the next)
//! - Classification, stabilization and offline bookkeeping of each reading
//! - Persistence writes and alert dispatch (both fire-and-forget)
//!
//! It is the only writer of the zone registry.

mod sweep;

pub use sweep::SweepOutcome;

use crate::domain::error::EngineError;
use crate::domain::types::{ZoneId, ZoneStatus};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::persistence::PersistenceGateway;
use crate::io::status_api::RemoteStatusClient;
use crate::services::notifier::{AlertOutcome, NotificationChain};
use crate::services::offline_tracker::OfflineTracker;
use crate::services::rate_budget::{BudgetSettings, RateBudget};
use crate::services::registry::ZoneRegistry;
use crate::services::stability::StabilityFilter;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

enum Tick {
    Main,
    Priority,
}

/// Timing and threshold settings
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub main_interval: Duration,
    pub priority_interval: Duration,
    pub retry_backoff: Duration,
    /// Consecutive fully unreachable sweeps tolerated before `run` gives up
    pub unreachable_sweep_limit: u32,
    /// Minimum offline duration before an alert is raised
    pub offline_threshold: Duration,
    pub confirmations: u32,
    pub budget: BudgetSettings,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            main_interval: Duration::from_secs(60),
            priority_interval: Duration::from_secs(120),
            retry_backoff: Duration::from_secs(1),
            unreachable_sweep_limit: 3,
            offline_threshold: Duration::from_secs(600),
            confirmations: 2,
            budget: BudgetSettings::default(),
        }
    }
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            main_interval: config.main_interval(),
            priority_interval: config.priority_interval(),
            retry_backoff: config.retry_backoff(),
            unreachable_sweep_limit: config.unreachable_sweep_limit(),
            offline_threshold: config.offline_threshold(),
            confirmations: config.confirmations(),
            budget: config.budget_settings(),
        }
    }
}

/// Owns the polling loop and every per-zone state transition
pub struct PollingScheduler {
    /// Zone state, shared read-only with the snapshot API
    pub(crate) registry: Arc<RwLock<ZoneRegistry>>,
    /// Process-wide token budget
    pub(crate) budget: Arc<Mutex<RateBudget>>,
    /// Zones committed Offline
    pub(crate) priority: FxHashSet<ZoneId>,
    pub(crate) stability: StabilityFilter,
    pub(crate) tracker: OfflineTracker,
    pub(crate) client: Arc<dyn RemoteStatusClient>,
    pub(crate) persistence: Option<Arc<dyn PersistenceGateway>>,
    pub(crate) notifier: Arc<NotificationChain>,
    pub(crate) metrics: Arc<Metrics>,
    pub(crate) settings: SchedulerSettings,
    /// Fully unreachable sweeps in a row
    pub(crate) unreachable_sweeps: u32,
    /// In-flight persistence writes
    pub(crate) writes: JoinSet<()>,
    /// In-flight alert dispatches
    pub(crate) alerts: JoinSet<(ZoneId, AlertOutcome)>,
    /// Wall-clock anchor; UTC timestamps are derived from the tokio clock
    epoch: (Instant, DateTime<Utc>),
}

impl PollingScheduler {
    pub fn new(
        registry: Arc<RwLock<ZoneRegistry>>,
        client: Arc<dyn RemoteStatusClient>,
        notifier: Arc<NotificationChain>,
        metrics: Arc<Metrics>,
        settings: SchedulerSettings,
    ) -> Self {
        // Hydrated offline zones start in the priority set
        let priority: FxHashSet<ZoneId> = registry
            .read()
            .zones()
            .filter(|z| z.status == ZoneStatus::Offline)
            .map(|z| z.id.clone())
            .collect();

        Self {
            registry,
            budget: Arc::new(Mutex::new(RateBudget::new(settings.budget))),
            priority,
            stability: StabilityFilter::new(settings.confirmations),
            tracker: OfflineTracker::new(),
            client,
            persistence: None,
            notifier,
            metrics,
            settings,
            unreachable_sweeps: 0,
            writes: JoinSet::new(),
            alerts: JoinSet::new(),
            epoch: (Instant::now(), Utc::now()),
        }
    }

    /// Write committed transitions through the given gateway
    pub fn with_persistence(mut self, gateway: Arc<dyn PersistenceGateway>) -> Self {
        self.persistence = Some(gateway);
        self
    }

    /// Shared handle to the token budget (for status reporting)
    pub fn budget(&self) -> Arc<Mutex<RateBudget>> {
        self.budget.clone()
    }

    pub fn registry(&self) -> Arc<RwLock<ZoneRegistry>> {
        self.registry.clone()
    }

    /// Zones a priority sweep would poll, in configuration order
    pub fn priority_ids(&self) -> Vec<ZoneId> {
        self.registry
            .read()
            .zones()
            .filter(|z| self.priority.contains(&z.id) || z.pending.is_some())
            .map(|z| z.id.clone())
            .collect()
    }

    /// Current UTC time, advanced by the tokio clock
    pub(crate) fn now_utc(&self) -> DateTime<Utc> {
        let (at, utc) = self.epoch;
        let elapsed = chrono::Duration::from_std(Instant::now() - at).unwrap_or(chrono::Duration::zero());
        utc + elapsed
    }

    /// Run sweeps until shutdown or a fatal error
    ///
    /// Main and priority sweeps are driven from this single loop, so they never overlap.
    /// The first main sweep starts immediately.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), EngineError> {
        let start = Instant::now();
        let mut main_tick = interval_at(start, self.settings.main_interval);
        let mut priority_tick =
            interval_at(start + self.settings.priority_interval, self.settings.priority_interval);
        main_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        priority_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            zones = %self.registry.read().len(),
            main_interval_secs = %self.settings.main_interval.as_secs(),
            priority_interval_secs = %self.settings.priority_interval.as_secs(),
            confirmations = %self.stability.threshold(),
            "scheduler_started"
        );

        let result = loop {
            if *shutdown.borrow() {
                break Ok(());
            }

            let tick = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        // Sender dropped
                        break Ok(());
                    }
                    continue;
                }
                _ = main_tick.tick() => Tick::Main,
                _ = priority_tick.tick() => Tick::Priority,
            };

            let sweep = match tick {
                Tick::Main => self.run_main_sweep(&mut shutdown).await,
                Tick::Priority if self.priority_ids().is_empty() => {
                    debug!("priority_sweep_skipped_empty");
                    continue;
                }
                Tick::Priority => self.run_priority_sweep(&mut shutdown).await,
            };

            if let Err(e) = sweep {
                break Err(e);
            }
        };

        self.finish().await;
        match &result {
            Ok(()) => info!("scheduler_stopped"),
            Err(e) => warn!(error = %e, "scheduler_stopped_fatal"),
        }
        result
    }

    /// Wait for pending persistence writes and stop outstanding alert tasks
    pub async fn finish(&mut self) {
        self.flush_writes().await;

        let aborted = self.alerts.len();
        if aborted > 0 {
            info!(count = %aborted, "alert_tasks_aborted");
        }
        self.alerts.shutdown().await;
    }

    /// Wait until every spawned persistence write has completed
    pub async fn flush_writes(&mut self) {
        while let Some(res) = self.writes.join_next().await {
            if let Err(e) = res {
                warn!(error = %e, "persistence_task_failed");
            }
        }
    }

    /// Wait for every dispatched alert and return the outcomes
    pub async fn drain_alerts(&mut self) -> Vec<(ZoneId, AlertOutcome)> {
        let mut outcomes = Vec::new();
        while let Some(res) = self.alerts.join_next().await {
            match res {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!(error = %e, "alert_task_failed"),
            }
        }
        outcomes
    }

    /// Collect finished background tasks without waiting
    pub(crate) fn reap_background(&mut self) {
        while let Some(res) = self.writes.try_join_next() {
            if let Err(e) = res {
                warn!(error = %e, "persistence_task_failed");
            }
        }
        while let Some(res) = self.alerts.try_join_next() {
            match res {
                Ok((zone_id, outcome)) => debug!(zone_id = %zone_id, outcome = ?outcome, "alert_task_finished"),
                Err(e) => warn!(error = %e, "alert_task_failed"),
            }
        }
    }
}
