//! Webhook fallback channel
//!
//! POSTs the alert as JSON to a configured URL (chat relays, paging bridges).
//! Any 2xx response counts as delivered.

use crate::domain::error::NotificationError;
use crate::services::notifier::{AlertMessage, NotificationChannel};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

const CHANNEL: &str = "webhook";

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    zone_id: &'a str,
    zone_name: &'a str,
    offline_since: DateTime<Utc>,
    offline_minutes: u64,
    title: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    dashboard_url: &'a str,
}

impl<'a> From<&'a AlertMessage> for WebhookPayload<'a> {
    fn from(message: &'a AlertMessage) -> Self {
        Self {
            zone_id: message.zone_id.as_str(),
            zone_name: &message.zone_name,
            offline_since: message.offline_since,
            offline_minutes: message.offline_duration.as_secs() / 60,
            title: &message.title,
            message: &message.body,
            dashboard_url: &message.dashboard_url,
        }
    }
}

pub struct WebhookChannel {
    http: reqwest::Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(http: reqwest::Client, url: &str) -> Self {
        Self { http, url: url.to_string() }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &'static str {
        CHANNEL
    }

    async fn send(&self, message: &AlertMessage) -> Result<(), NotificationError> {
        let response = self
            .http
            .post(&self.url)
            .json(&WebhookPayload::from(message))
            .send()
            .await
            .map_err(|e| NotificationError::Request { channel: CHANNEL, reason: e.to_string() })?;

        let status = response.status();
        debug!(http_status = %status.as_u16(), zone_id = %message.zone_id, "webhook_response");

        if status.is_success() {
            Ok(())
        } else {
            Err(NotificationError::Rejected {
                channel: CHANNEL,
                reason: format!("http {}", status.as_u16()),
            })
        }
    }
}
