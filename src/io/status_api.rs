//! Remote status API client
//!
//! The engine only depends on `RemoteStatusClient`. `HttpStatusClient` is the
//! production implementation: one GraphQL POST per zone, Basic auth with the
//! pre-encoded API key.
//!
//! Error mapping:
//! - connect failure                       -> Unreachable
//! - timeout, 5xx, undecodable body        -> Transient
//! - HTTP 429 or "rate limited" error      -> RateLimited
//! - other 4xx, unknown zone, other errors -> Permanent

use crate::domain::error::FetchError;
use crate::domain::types::{RawZoneDetails, SubscriptionState, ZoneId};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

const ZONE_STATUS_QUERY: &str = r#"
query GetZoneStatus($zoneId: ID!) {
    soundZone(id: $zoneId) {
        id
        name
        isPaired
        online
        device {
            id
            softwareVersion
        }
        subscription {
            state
            isActive
        }
    }
}
"#;

/// Rate-limit metadata attached to a status API response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub remaining: u32,
    pub reset_after: Duration,
}

/// One successful zone query
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneReading {
    pub name: String,
    pub details: RawZoneDetails,
    pub rate_limit: Option<RateLimitInfo>,
}

/// Source of raw zone status
#[async_trait]
pub trait RemoteStatusClient: Send + Sync {
    async fn fetch(&self, zone_id: &ZoneId) -> Result<ZoneReading, FetchError>;
}

#[derive(Debug, Clone)]
pub struct StatusApiConfig {
    pub url: String,
    pub api_key: String,
    pub request_timeout: Duration,
    /// Reset window assumed when a rate-limit error does not carry one
    pub default_reset: Duration,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<ResponseData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
    #[serde(default)]
    extensions: Option<Extensions>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResponseData {
    #[serde(rename = "soundZone")]
    sound_zone: Option<SoundZone>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SoundZone {
    name: Option<String>,
    #[serde(default)]
    is_paired: bool,
    #[serde(default)]
    online: bool,
    #[serde(default)]
    device: Option<Device>,
    #[serde(default)]
    subscription: Option<Subscription>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Device {
    #[serde(default)]
    software_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Subscription {
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Extensions {
    rate_limit: Option<RateLimitExtension>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitExtension {
    available: u32,
    reset_after_seconds: u64,
}

/// reqwest-backed GraphQL client
pub struct HttpStatusClient {
    config: StatusApiConfig,
    http: reqwest::Client,
}

impl HttpStatusClient {
    pub fn new(config: StatusApiConfig) -> anyhow::Result<Self> {
        // One client for connection pooling across all zones
        let http = reqwest::Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { config, http })
    }

    fn map_transport_error(e: reqwest::Error) -> FetchError {
        if e.is_connect() {
            FetchError::Unreachable(e.to_string())
        } else {
            FetchError::Transient(e.to_string())
        }
    }

    fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
        headers
            .get(reqwest::header::RETRY_AFTER)?
            .to_str()
            .ok()?
            .trim()
            .parse::<u64>()
            .ok()
            .map(Duration::from_secs)
    }
}

#[async_trait]
impl RemoteStatusClient for HttpStatusClient {
    async fn fetch(&self, zone_id: &ZoneId) -> Result<ZoneReading, FetchError> {
        let body = json!({ "query": ZONE_STATUS_QUERY, "variables": { "zoneId": zone_id.as_str() } });

        let response = self
            .http
            .post(&self.config.url)
            .header("Authorization", format!("Basic {}", self.config.api_key))
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let reset_after =
                Self::retry_after(response.headers()).unwrap_or(self.config.default_reset);
            return Err(FetchError::RateLimited { available: 0, reset_after });
        }
        if status.is_server_error() {
            return Err(FetchError::Transient(format!("http {}", status.as_u16())));
        }
        if !status.is_success() {
            return Err(FetchError::Permanent(format!("http {}", status.as_u16())));
        }

        let parsed: GraphQlResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Transient(format!("invalid response body: {e}")))?;

        debug!(zone_id = %zone_id, "status_api_response");
        interpret_response(zone_id, parsed, self.config.default_reset)
    }
}

fn interpret_response(
    zone_id: &ZoneId,
    response: GraphQlResponse,
    default_reset: Duration,
) -> Result<ZoneReading, FetchError> {
    let rate_limit = response.extensions.and_then(|e| e.rate_limit).map(|r| RateLimitInfo {
        remaining: r.available,
        reset_after: Duration::from_secs(r.reset_after_seconds),
    });

    if !response.errors.is_empty() {
        let message =
            response.errors.iter().map(|e| e.message.as_str()).collect::<Vec<_>>().join("; ");

        if message.to_lowercase().contains("rate limited") {
            let available = parse_available_tokens(&message)
                .or(rate_limit.map(|r| r.remaining))
                .unwrap_or(0);
            let reset_after = rate_limit.map(|r| r.reset_after).unwrap_or(default_reset);
            return Err(FetchError::RateLimited { available, reset_after });
        }
        return Err(FetchError::Permanent(message));
    }

    let Some(zone) = response.data.and_then(|d| d.sound_zone) else {
        return Err(FetchError::Permanent(format!("zone {zone_id} not found")));
    };

    let (subscription_state, subscription_active) = match zone.subscription {
        Some(sub) => (sub.state.map(SubscriptionState::from), sub.is_active),
        None => (None, None),
    };

    let details = RawZoneDetails {
        paired: zone.is_paired,
        online: zone.online,
        device_present: Some(zone.device.is_some()),
        software_version: zone.device.and_then(|d| d.software_version),
        subscription_state,
        subscription_active,
    };

    Ok(ZoneReading { name: zone.name.unwrap_or_else(|| zone_id.to_string()), details, rate_limit })
}

/// Extract M from "... costs N tokens ... have M available ..."
fn parse_available_tokens(message: &str) -> Option<u32> {
    let words: Vec<&str> = message.split_whitespace().collect();
    words.windows(3).find_map(|w| {
        if w[0] == "have" && w[2].starts_with("available") {
            w[1].parse().ok()
        } else {
            None
        }
    })
}
