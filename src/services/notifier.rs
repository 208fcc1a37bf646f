//! Notification chain - ordered fallback alerting with per-zone cooldown
//!
//! Channels are tried strictly in priority order. A primary success ends the
//! chain. A fallback success waits a grace period before returning (a delayed
//! primary delivery may still land). Channel errors are logged and never abort
//! the chain. At most one alert per zone is dispatched per cooldown window.

use crate::domain::error::NotificationError;
use crate::domain::types::ZoneId;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::pushover::PushoverChannel;
use crate::io::webhook::WebhookChannel;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// A rendered alert handed to channels
#[derive(Debug, Clone, PartialEq)]
pub struct AlertMessage {
    pub zone_id: ZoneId,
    pub zone_name: String,
    pub offline_duration: Duration,
    pub offline_since: DateTime<Utc>,
    pub title: String,
    pub body: String,
    pub dashboard_url: String,
}

/// A delivery mechanism (push, webhook, ...)
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, message: &AlertMessage) -> Result<(), NotificationError>;
}

/// Request to alert about one offline zone
#[derive(Debug, Clone)]
pub struct Alert {
    pub zone_id: ZoneId,
    pub zone_name: String,
    pub offline_duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertOutcome {
    Sent { channel: &'static str },
    /// Cooldown active or an alert for the zone is already in flight
    Skipped,
    /// Every channel failed
    Failed,
    NoChannels,
}

#[derive(Debug, Clone)]
pub struct ChainSettings {
    pub cooldown: Duration,
    pub fallback_grace: Duration,
    pub dashboard_url: String,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(30 * 60),
            fallback_grace: Duration::from_secs(60),
            dashboard_url: String::new(),
        }
    }
}

/// Releases the in-flight reservation even if the send future is dropped
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<FxHashSet<ZoneId>>,
    zone_id: ZoneId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.zone_id);
    }
}

pub struct NotificationChain {
    channels: Vec<Arc<dyn NotificationChannel>>,
    settings: ChainSettings,
    /// zone -> last successful dispatch
    last_alert: Mutex<FxHashMap<ZoneId, Instant>>,
    in_flight: Mutex<FxHashSet<ZoneId>>,
    metrics: Option<Arc<Metrics>>,
}

impl NotificationChain {
    pub fn new(channels: Vec<Arc<dyn NotificationChannel>>, settings: ChainSettings) -> Self {
        Self {
            channels,
            settings,
            last_alert: Mutex::new(FxHashMap::default()),
            in_flight: Mutex::new(FxHashSet::default()),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the chain from configuration. Channels without credentials are skipped.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(config.api_request_timeout()).build()?;
        let mut channels: Vec<Arc<dyn NotificationChannel>> = Vec::new();

        // Primary: push notifications
        if let (Some(token), Some(user_key)) = (config.pushover_token(), config.pushover_user_key()) {
            channels.push(Arc::new(PushoverChannel::new(http.clone(), token, user_key)));
            info!(channel = "pushover", "notifier_enabled");
        }

        // Fallback: generic webhook
        if let Some(url) = config.webhook_url() {
            channels.push(Arc::new(WebhookChannel::new(http, url)));
            info!(channel = "webhook", "notifier_enabled");
        }

        if channels.is_empty() {
            warn!("no_notification_channels_configured");
        }

        let settings = ChainSettings {
            cooldown: config.alert_cooldown(),
            fallback_grace: config.fallback_grace(),
            dashboard_url: config.dashboard_url().to_string(),
        };
        Ok(Self::new(channels, settings))
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Reserve the zone for dispatch unless it is cooling down or already in flight
    fn try_reserve(&self, zone_id: &ZoneId) -> Option<InFlightGuard<'_>> {
        let last_alert = self.last_alert.lock();
        let mut in_flight = self.in_flight.lock();

        if in_flight.contains(zone_id) {
            return None;
        }
        if let Some(at) = last_alert.get(zone_id) {
            if at.elapsed() < self.settings.cooldown {
                return None;
            }
        }

        in_flight.insert(zone_id.clone());
        Some(InFlightGuard { in_flight: &self.in_flight, zone_id: zone_id.clone() })
    }

    /// Send an alert through the chain
    pub async fn send_alert(&self, alert: &Alert) -> AlertOutcome {
        let Some(_guard) = self.try_reserve(&alert.zone_id) else {
            debug!(zone_id = %alert.zone_id, zone_name = %alert.zone_name, "alert_skipped_cooldown");
            self.record(|m| m.record_alert_skipped());
            return AlertOutcome::Skipped;
        };

        if self.channels.is_empty() {
            warn!(zone_id = %alert.zone_id, "alert_dropped_no_channels");
            return AlertOutcome::NoChannels;
        }

        let message = self.render(alert, Utc::now());
        let mut delivered_by = None;

        for (i, channel) in self.channels.iter().enumerate() {
            info!(zone_id = %alert.zone_id, channel = %channel.name(), "alert_sending");

            match channel.send(&message).await {
                Ok(()) => {
                    info!(zone_id = %alert.zone_id, channel = %channel.name(), "alert_sent");
                    delivered_by = Some(channel.name());

                    if i > 0 && !self.settings.fallback_grace.is_zero() {
                        // Fallback delivered: give a delayed primary delivery time to land
                        tokio::time::sleep(self.settings.fallback_grace).await;
                    }
                    break;
                }
                Err(e) => {
                    error!(
                        zone_id = %alert.zone_id,
                        channel = %channel.name(),
                        error = %e,
                        "alert_channel_failed"
                    );
                }
            }
        }

        match delivered_by {
            Some(channel) => {
                self.last_alert.lock().insert(alert.zone_id.clone(), Instant::now());
                self.record(|m| m.record_alert_sent());
                AlertOutcome::Sent { channel }
            }
            None => {
                error!(zone_id = %alert.zone_id, zone_name = %alert.zone_name, "alert_all_channels_failed");
                self.record(|m| m.record_alert_failed());
                AlertOutcome::Failed
            }
        }
    }

    fn record(&self, f: impl FnOnce(&Metrics)) {
        if let Some(metrics) = &self.metrics {
            f(metrics);
        }
    }

    fn render(&self, alert: &Alert, now: DateTime<Utc>) -> AlertMessage {
        let offline_since = now
            - chrono::Duration::from_std(alert.offline_duration).unwrap_or(chrono::Duration::zero());
        let minutes = alert.offline_duration.as_secs() / 60;

        let mut body = format!(
            "Zone \"{}\" offline since {} (>{} min)",
            alert.zone_name,
            offline_since.format("%H:%M"),
            minutes
        );
        if !self.settings.dashboard_url.is_empty() {
            body.push_str(&format!("\nDashboard: {}", self.settings.dashboard_url));
        }

        AlertMessage {
            zone_id: alert.zone_id.clone(),
            zone_name: alert.zone_name.clone(),
            offline_duration: alert.offline_duration,
            offline_since,
            title: "Zone Offline Alert".to_string(),
            body,
            dashboard_url: self.settings.dashboard_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Channel that records invocations and succeeds or fails on demand
    struct FakeChannel {
        name: &'static str,
        succeed: bool,
        calls: AtomicUsize,
    }

    impl FakeChannel {
        fn new(name: &'static str, succeed: bool) -> Arc<Self> {
            Arc::new(Self { name, succeed, calls: AtomicUsize::new(0) })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NotificationChannel for FakeChannel {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn send(&self, _message: &AlertMessage) -> Result<(), NotificationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.succeed {
                Ok(())
            } else {
                Err(NotificationError::Request { channel: self.name, reason: "boom".into() })
            }
        }
    }

    fn chain(channels: Vec<Arc<FakeChannel>>) -> NotificationChain {
        let channels = channels.into_iter().map(|c| c as Arc<dyn NotificationChannel>).collect();
        NotificationChain::new(
            channels,
            ChainSettings { dashboard_url: "https://dash.example".to_string(), ..Default::default() },
        )
    }

    fn alert(zone: &str) -> Alert {
        Alert {
            zone_id: ZoneId::from(zone),
            zone_name: format!("Hotel - {zone}"),
            offline_duration: Duration::from_secs(11 * 60),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_primary_success_stops_chain() {
        let primary = FakeChannel::new("primary", true);
        let fallback = FakeChannel::new("fallback", true);
        let chain = chain(vec![primary.clone(), fallback.clone()]);

        let outcome = chain.send_alert(&alert("a")).await;

        assert_eq!(outcome, AlertOutcome::Sent { channel: "primary" });
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_after_primary_failure_waits_grace() {
        let primary = FakeChannel::new("primary", false);
        let fallback = FakeChannel::new("fallback", true);
        let chain = chain(vec![primary.clone(), fallback.clone()]);

        let start = Instant::now();
        let outcome = chain.send_alert(&alert("a")).await;

        assert_eq!(outcome, AlertOutcome::Sent { channel: "fallback" });
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 1);
        assert!(start.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_suppresses_second_alert() {
        let primary = FakeChannel::new("primary", true);
        let chain = chain(vec![primary.clone()]);

        assert!(matches!(chain.send_alert(&alert("a")).await, AlertOutcome::Sent { .. }));
        tokio::time::advance(Duration::from_secs(5 * 60)).await;
        assert_eq!(chain.send_alert(&alert("a")).await, AlertOutcome::Skipped);
        assert_eq!(primary.calls(), 1);

        // Other zones are unaffected
        assert!(matches!(chain.send_alert(&alert("b")).await, AlertOutcome::Sent { .. }));

        // Cooldown expires
        tokio::time::advance(Duration::from_secs(26 * 60)).await;
        assert!(matches!(chain.send_alert(&alert("a")).await, AlertOutcome::Sent { .. }));
        assert_eq!(primary.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_alert_does_not_start_cooldown() {
        let primary = FakeChannel::new("primary", false);
        let fallback = FakeChannel::new("fallback", false);
        let chain = chain(vec![primary.clone(), fallback.clone()]);

        assert_eq!(chain.send_alert(&alert("a")).await, AlertOutcome::Failed);
        assert_eq!(chain.send_alert(&alert("a")).await, AlertOutcome::Failed);
        assert_eq!(primary.calls(), 2);
        assert_eq!(fallback.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_alerts_for_same_zone_dispatch_once() {
        let primary = FakeChannel::new("primary", false);
        let fallback = FakeChannel::new("fallback", true);
        let chain = Arc::new(chain(vec![primary.clone(), fallback.clone()]));

        // First alert parks in the fallback grace period
        let first = {
            let chain = chain.clone();
            tokio::spawn(async move { chain.send_alert(&alert("a")).await })
        };
        tokio::task::yield_now().await;

        assert_eq!(chain.send_alert(&alert("a")).await, AlertOutcome::Skipped);
        assert_eq!(first.await.unwrap(), AlertOutcome::Sent { channel: "fallback" });
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn test_no_channels() {
        let chain = chain(vec![]);
        assert_eq!(chain.send_alert(&alert("a")).await, AlertOutcome::NoChannels);
    }

    #[test]
    fn test_render_message() {
        let chain = chain(vec![]);
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let message = chain.render(&alert("a"), now);

        assert_eq!(message.offline_since, Utc.with_ymd_and_hms(2024, 5, 1, 12, 19, 0).unwrap());
        assert_eq!(
            message.body,
            "Zone \"Hotel - a\" offline since 12:19 (>11 min)\nDashboard: https://dash.example"
        );
    }
}
