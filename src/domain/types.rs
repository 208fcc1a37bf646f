//! Shared types for the zone monitor

use serde::{Deserialize, Serialize};

/// Newtype wrapper for zone IDs (opaque handles issued by the status API)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(pub String);

impl ZoneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ZoneId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Committed health status of a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneStatus {
    /// No confirmed classification yet
    #[default]
    Checking,
    Online,
    Offline,
    Expired,
    Unpaired,
    NoSubscription,
}

impl ZoneStatus {
    pub const ALL: [ZoneStatus; 6] = [
        ZoneStatus::Online,
        ZoneStatus::Offline,
        ZoneStatus::Expired,
        ZoneStatus::NoSubscription,
        ZoneStatus::Unpaired,
        ZoneStatus::Checking,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneStatus::Checking => "checking",
            ZoneStatus::Online => "online",
            ZoneStatus::Offline => "offline",
            ZoneStatus::Expired => "expired",
            ZoneStatus::Unpaired => "unpaired",
            ZoneStatus::NoSubscription => "no_subscription",
        }
    }

    /// Human-readable label for dashboards
    pub fn label(&self) -> &'static str {
        match self {
            ZoneStatus::Checking => "Checking...",
            ZoneStatus::Online => "Online",
            ZoneStatus::Offline => "Offline",
            ZoneStatus::Expired => "Subscription Expired",
            ZoneStatus::Unpaired => "No Device Paired",
            ZoneStatus::NoSubscription => "No Subscription",
        }
    }

    /// Configuration states are not outages and never accrue offline time
    pub fn is_configuration_issue(&self) -> bool {
        matches!(self, ZoneStatus::Expired | ZoneStatus::Unpaired | ZoneStatus::NoSubscription)
    }
}

impl std::fmt::Display for ZoneStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ZoneStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "checking" => Ok(ZoneStatus::Checking),
            "online" => Ok(ZoneStatus::Online),
            "offline" => Ok(ZoneStatus::Offline),
            "expired" => Ok(ZoneStatus::Expired),
            "unpaired" => Ok(ZoneStatus::Unpaired),
            "no_subscription" => Ok(ZoneStatus::NoSubscription),
            other => Err(format!("unknown zone status: {other}")),
        }
    }
}

/// Subscription state as reported by the status API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum SubscriptionState {
    Active,
    Expired,
    Cancelled,
    Inactive,
    Paused,
    Other(String),
}

impl SubscriptionState {
    pub fn as_str(&self) -> &str {
        match self {
            SubscriptionState::Active => "ACTIVE",
            SubscriptionState::Expired => "EXPIRED",
            SubscriptionState::Cancelled => "CANCELLED",
            SubscriptionState::Inactive => "INACTIVE",
            SubscriptionState::Paused => "PAUSED",
            SubscriptionState::Other(s) => s,
        }
    }

    /// Expired or cancelled subscriptions are terminal until renewed
    pub fn is_lapsed(&self) -> bool {
        matches!(self, SubscriptionState::Expired | SubscriptionState::Cancelled)
    }
}

impl From<String> for SubscriptionState {
    fn from(s: String) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => SubscriptionState::Active,
            "EXPIRED" => SubscriptionState::Expired,
            "CANCELLED" | "CANCELED" => SubscriptionState::Cancelled,
            "INACTIVE" => SubscriptionState::Inactive,
            "PAUSED" => SubscriptionState::Paused,
            _ => SubscriptionState::Other(s),
        }
    }
}

impl From<&str> for SubscriptionState {
    fn from(s: &str) -> Self {
        SubscriptionState::from(s.to_string())
    }
}

impl From<SubscriptionState> for String {
    fn from(state: SubscriptionState) -> Self {
        state.as_str().to_string()
    }
}

/// Raw fields reported for a zone, the input to classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawZoneDetails {
    pub paired: bool,
    pub online: bool,
    /// `None` when the query did not ask about the device
    #[serde(default)]
    pub device_present: Option<bool>,
    /// `None` when the zone has no subscription at all
    #[serde(default)]
    pub subscription_state: Option<SubscriptionState>,
    #[serde(default)]
    pub subscription_active: Option<bool>,
    #[serde(default)]
    pub software_version: Option<String>,
}

impl RawZoneDetails {
    /// A paired, online zone with an active subscription
    pub fn healthy() -> Self {
        Self {
            paired: true,
            online: true,
            device_present: Some(true),
            subscription_state: Some(SubscriptionState::Active),
            subscription_active: Some(true),
            software_version: None,
        }
    }
}
