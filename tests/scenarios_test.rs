//! End-to-end monitoring scenarios through the public API
//!
//! A scripted status API and a recording notification channel stand in for the
//! network; persistence goes through the real JSON file store.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::watch;
use zone_monitor::domain::{FetchError, NotificationError, RawZoneDetails, ZoneId, ZoneStatus};
use zone_monitor::infra::Metrics;
use zone_monitor::io::status_api::ZoneReading;
use zone_monitor::io::{JsonFileStore, PersistenceGateway, RemoteStatusClient};
use zone_monitor::services::notifier::{AlertMessage, AlertOutcome, ChainSettings, NotificationChannel};
use zone_monitor::services::rate_budget::BudgetSettings;
use zone_monitor::services::{NotificationChain, PollingScheduler, SchedulerSettings, ZoneRegistry};

/// Status API whose answer per zone can be switched between sweeps
#[derive(Default)]
struct ScriptedApi {
    details: Mutex<FxHashMap<ZoneId, RawZoneDetails>>,
}

impl ScriptedApi {
    fn set(&self, zone: &str, details: RawZoneDetails) {
        self.details.lock().insert(ZoneId::from(zone), details);
    }
}

#[async_trait]
impl RemoteStatusClient for ScriptedApi {
    async fn fetch(&self, zone_id: &ZoneId) -> Result<ZoneReading, FetchError> {
        let details = self
            .details
            .lock()
            .get(zone_id)
            .cloned()
            .ok_or_else(|| FetchError::Permanent(format!("unknown zone {zone_id}")))?;
        Ok(ZoneReading { name: format!("Lobby - {zone_id}"), details, rate_limit: None })
    }
}

#[derive(Default)]
struct Inbox {
    messages: Mutex<Vec<AlertMessage>>,
}

#[async_trait]
impl NotificationChannel for Inbox {
    fn name(&self) -> &'static str {
        "inbox"
    }

    async fn send(&self, message: &AlertMessage) -> Result<(), NotificationError> {
        self.messages.lock().push(message.clone());
        Ok(())
    }
}

fn offline() -> RawZoneDetails {
    RawZoneDetails { online: false, ..RawZoneDetails::healthy() }
}

struct Monitor {
    scheduler: PollingScheduler,
    inbox: Arc<Inbox>,
    _shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Monitor {
    async fn sweep(&mut self) {
        let mut rx = self.shutdown_rx.clone();
        self.scheduler.run_main_sweep(&mut rx).await.unwrap();
    }

    fn status(&self, zone: &str) -> ZoneStatus {
        let registry = self.scheduler.registry();
        let status = registry.read().get(&ZoneId::from(zone)).unwrap().status;
        status
    }
}

async fn start_monitor(
    zones: &[&str],
    api: Arc<ScriptedApi>,
    store: Option<Arc<JsonFileStore>>,
    offline_threshold: Duration,
) -> Monitor {
    let ids: Vec<ZoneId> = zones.iter().map(|z| ZoneId::from(*z)).collect();
    let mut registry = ZoneRegistry::new(&ids);
    if let Some(store) = &store {
        let saved = store.load_all().await.unwrap();
        registry.hydrate(saved, chrono::Utc::now());
    }

    let inbox = Arc::new(Inbox::default());
    let channels: Vec<Arc<dyn NotificationChannel>> = vec![inbox.clone()];
    let notifier = Arc::new(NotificationChain::new(channels, ChainSettings::default()));
    let settings = SchedulerSettings {
        offline_threshold,
        budget: BudgetSettings { capacity: 10_000, ..BudgetSettings::default() },
        ..SchedulerSettings::default()
    };

    let mut scheduler = PollingScheduler::new(
        Arc::new(RwLock::new(registry)),
        api,
        notifier,
        Arc::new(Metrics::new()),
        settings,
    );
    if let Some(store) = store {
        scheduler = scheduler.with_persistence(store as Arc<dyn PersistenceGateway>);
    }

    let (tx, rx) = watch::channel(false);
    Monitor { scheduler, inbox, _shutdown_tx: tx, shutdown_rx: rx }
}

#[tokio::test]
async fn test_outage_survives_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("zones.json");
    let api = Arc::new(ScriptedApi::default());
    api.set("bar", RawZoneDetails::healthy());
    api.set("lobby", offline());

    let store = Arc::new(JsonFileStore::new(&path));
    let mut monitor =
        start_monitor(&["bar", "lobby"], api.clone(), Some(store), Duration::from_secs(600)).await;
    monitor.sweep().await;
    monitor.sweep().await;
    monitor.scheduler.flush_writes().await;

    assert_eq!(monitor.status("bar"), ZoneStatus::Online);
    assert_eq!(monitor.status("lobby"), ZoneStatus::Offline);
    let offline_since = monitor
        .scheduler
        .registry()
        .read()
        .get(&ZoneId::from("lobby"))
        .unwrap()
        .offline_since;
    assert!(offline_since.is_some());
    drop(monitor);

    // A new process picks up the outage from disk
    let store = Arc::new(JsonFileStore::new(&path));
    let monitor =
        start_monitor(&["bar", "lobby"], api, Some(store), Duration::from_secs(600)).await;

    assert_eq!(monitor.status("lobby"), ZoneStatus::Offline);
    assert_eq!(monitor.status("bar"), ZoneStatus::Online);
    assert_eq!(monitor.scheduler.priority_ids(), vec![ZoneId::from("lobby")]);

    let registry = monitor.scheduler.registry();
    let restored = registry.read().get(&ZoneId::from("lobby")).unwrap().offline_since;
    assert_eq!(restored, offline_since);
}

#[tokio::test]
async fn test_sustained_outage_alerts_once() {
    let api = Arc::new(ScriptedApi::default());
    api.set("lobby", offline());

    let mut monitor = start_monitor(&["lobby"], api, None, Duration::ZERO).await;

    // First observation is unconfirmed, nothing is due
    monitor.sweep().await;
    assert_eq!(monitor.status("lobby"), ZoneStatus::Checking);
    assert!(monitor.scheduler.drain_alerts().await.is_empty());

    monitor.sweep().await;
    assert_eq!(monitor.status("lobby"), ZoneStatus::Offline);
    let outcomes = monitor.scheduler.drain_alerts().await;
    assert_eq!(outcomes, vec![(ZoneId::from("lobby"), AlertOutcome::Sent { channel: "inbox" })]);

    // Still offline on the next sweep, but the cooldown holds
    monitor.sweep().await;
    let outcomes = monitor.scheduler.drain_alerts().await;
    assert_eq!(outcomes, vec![(ZoneId::from("lobby"), AlertOutcome::Skipped)]);

    let messages = monitor.inbox.messages.lock().clone();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].zone_name, "Lobby - lobby");
    assert!(messages[0].body.starts_with("Zone \"Lobby - lobby\" offline since "));
}

#[tokio::test]
async fn test_recovery_is_visible_in_snapshot() {
    let api = Arc::new(ScriptedApi::default());
    api.set("bar", offline());

    let mut monitor = start_monitor(&["bar"], api.clone(), None, Duration::from_secs(600)).await;
    monitor.sweep().await;
    monitor.sweep().await;
    assert_eq!(monitor.status("bar"), ZoneStatus::Offline);

    api.set("bar", RawZoneDetails::healthy());
    monitor.sweep().await;
    // One healthy reading is not enough to commit
    assert_eq!(monitor.status("bar"), ZoneStatus::Offline);
    monitor.sweep().await;

    let registry = monitor.scheduler.registry();
    let snapshot = registry.read().detailed_status(chrono::Utc::now());
    let bar = &snapshot[&ZoneId::from("bar")];
    assert_eq!(bar.status, ZoneStatus::Online);
    assert!(bar.online);
    assert_eq!(bar.offline_since, None);
    assert_eq!(bar.offline_duration_seconds, None);

    let summary = registry.read().status_summary();
    assert_eq!(summary.total, 1);
    assert_eq!(summary.online, 1);
    assert!(monitor.scheduler.priority_ids().is_empty());
}
