//! Pushover push-notification channel
//!
//! Form POST to the Pushover messages endpoint. High priority with the alarm
//! sound so an offline zone wakes someone up. Delivery counts as successful
//! only when the response body reports `"status": 1`.

use crate::domain::error::NotificationError;
use crate::services::notifier::{AlertMessage, NotificationChannel};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

const PUSHOVER_URL: &str = "https://api.pushover.net/1/messages.json";
const CHANNEL: &str = "pushover";

#[derive(Debug, Deserialize)]
struct PushoverResponse {
    #[serde(default)]
    status: i64,
    #[serde(default)]
    errors: Vec<String>,
}

pub struct PushoverChannel {
    http: reqwest::Client,
    url: String,
    token: String,
    user_key: String,
}

impl PushoverChannel {
    pub fn new(http: reqwest::Client, token: &str, user_key: &str) -> Self {
        Self::with_url(http, PUSHOVER_URL, token, user_key)
    }

    /// Point the channel at a different endpoint (local relays, tests)
    pub fn with_url(http: reqwest::Client, url: &str, token: &str, user_key: &str) -> Self {
        Self {
            http,
            url: url.to_string(),
            token: token.to_string(),
            user_key: user_key.to_string(),
        }
    }

    fn form<'a>(&'a self, message: &'a AlertMessage) -> [(&'static str, &'a str); 6] {
        [
            ("token", self.token.as_str()),
            ("user", self.user_key.as_str()),
            ("message", message.body.as_str()),
            ("title", message.title.as_str()),
            ("priority", "1"),
            ("sound", "alarm"),
        ]
    }
}

#[async_trait]
impl NotificationChannel for PushoverChannel {
    fn name(&self) -> &'static str {
        CHANNEL
    }

    async fn send(&self, message: &AlertMessage) -> Result<(), NotificationError> {
        let response = self
            .http
            .post(&self.url)
            .form(&self.form(message))
            .send()
            .await
            .map_err(|e| NotificationError::Request { channel: CHANNEL, reason: e.to_string() })?;

        let http_status = response.status();
        let parsed: Option<PushoverResponse> = response.json().await.ok();
        debug!(http_status = %http_status.as_u16(), zone_id = %message.zone_id, "pushover_response");

        match parsed {
            Some(body) if http_status.is_success() && body.status == 1 => Ok(()),
            Some(body) if !body.errors.is_empty() => Err(NotificationError::Rejected {
                channel: CHANNEL,
                reason: body.errors.join("; "),
            }),
            _ => Err(NotificationError::Rejected {
                channel: CHANNEL,
                reason: format!("http {}", http_status.as_u16()),
            }),
        }
    }
}
