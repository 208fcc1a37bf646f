//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! Secrets can be supplied through the environment instead of the file:
//! STATUS_API_KEY, PUSHOVER_TOKEN, PUSHOVER_USER_KEY, ALERT_WEBHOOK_URL.

use crate::domain::types::ZoneId;
use crate::io::status_api::StatusApiConfig;
use crate::services::rate_budget::BudgetSettings;
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: default_api_url(),
            api_key: String::new(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.soundtrackyourbrand.com/v2".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ZonesConfig {
    #[serde(default)]
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_main_interval_secs")]
    pub main_interval_secs: u64,
    #[serde(default = "default_priority_interval_secs")]
    pub priority_interval_secs: u64,
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
    #[serde(default = "default_cost_per_call")]
    pub cost_per_call: u32,
    #[serde(default = "default_token_capacity")]
    pub token_capacity: u32,
    #[serde(default = "default_reset_secs")]
    pub default_reset_secs: u64,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Consecutive sweeps with every fetch unreachable before the engine stops
    #[serde(default = "default_unreachable_sweep_limit")]
    pub unreachable_sweep_limit: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            main_interval_secs: default_main_interval_secs(),
            priority_interval_secs: default_priority_interval_secs(),
            max_batch: default_max_batch(),
            cost_per_call: default_cost_per_call(),
            token_capacity: default_token_capacity(),
            default_reset_secs: default_reset_secs(),
            retry_backoff_ms: default_retry_backoff_ms(),
            unreachable_sweep_limit: default_unreachable_sweep_limit(),
        }
    }
}

fn default_main_interval_secs() -> u64 {
    60
}

fn default_priority_interval_secs() -> u64 {
    120
}

fn default_max_batch() -> usize {
    20
}

fn default_cost_per_call() -> u32 {
    16
}

fn default_token_capacity() -> u32 {
    100
}

fn default_reset_secs() -> u64 {
    60
}

fn default_retry_backoff_ms() -> u64 {
    1_000
}

fn default_unreachable_sweep_limit() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct StabilityConfig {
    #[serde(default = "default_confirmations")]
    pub confirmations: u32,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self { confirmations: default_confirmations() }
    }
}

fn default_confirmations() -> u32 {
    2
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
    #[serde(default = "default_offline_threshold_secs")]
    pub offline_threshold_secs: u64,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default = "default_fallback_grace_secs")]
    pub fallback_grace_secs: u64,
    #[serde(default)]
    pub dashboard_url: String,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            offline_threshold_secs: default_offline_threshold_secs(),
            cooldown_secs: default_cooldown_secs(),
            fallback_grace_secs: default_fallback_grace_secs(),
            dashboard_url: String::new(),
        }
    }
}

fn default_offline_threshold_secs() -> u64 {
    600
}

fn default_cooldown_secs() -> u64 {
    1_800
}

fn default_fallback_grace_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PushoverConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct WebhookConfig {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub pushover: PushoverConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PersistenceConfig {
    /// JSON state file (omit for memory-only operation)
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Status/metrics HTTP port (0 to disable)
    #[serde(default = "default_server_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: default_server_port() }
    }
}

fn default_server_port() -> u16 {
    9090
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs() }
    }
}

fn default_metrics_interval_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub zones: ZonesConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub stability: StabilityConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone)]
pub struct Config {
    api_url: String,
    api_key: String,
    request_timeout_ms: u64,
    zone_ids: Vec<ZoneId>,
    main_interval_secs: u64,
    priority_interval_secs: u64,
    max_batch: usize,
    cost_per_call: u32,
    token_capacity: u32,
    default_reset_secs: u64,
    retry_backoff_ms: u64,
    unreachable_sweep_limit: u32,
    confirmations: u32,
    offline_threshold_secs: u64,
    cooldown_secs: u64,
    fallback_grace_secs: u64,
    dashboard_url: String,
    pushover_token: Option<String>,
    pushover_user_key: Option<String>,
    webhook_url: Option<String>,
    persistence_path: Option<String>,
    server_port: u16,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

/// Empty strings in the file mean "not configured"
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn resolve_config_path(cli: Option<&str>) -> String {
        if let Some(path) = cli {
            return path.to_string();
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        let mut zone_ids: Vec<ZoneId> = Vec::with_capacity(toml_config.zones.ids.len());
        for raw in toml_config.zones.ids {
            let id = ZoneId::new(raw.trim());
            if !id.as_str().is_empty() && !zone_ids.contains(&id) {
                zone_ids.push(id);
            }
        }

        Self {
            api_url: toml_config.api.url,
            api_key: toml_config.api.api_key,
            request_timeout_ms: toml_config.api.request_timeout_ms,
            zone_ids,
            main_interval_secs: toml_config.polling.main_interval_secs.max(1),
            priority_interval_secs: toml_config.polling.priority_interval_secs.max(1),
            max_batch: toml_config.polling.max_batch.max(1),
            cost_per_call: toml_config.polling.cost_per_call.max(1),
            token_capacity: toml_config.polling.token_capacity,
            default_reset_secs: toml_config.polling.default_reset_secs,
            retry_backoff_ms: toml_config.polling.retry_backoff_ms,
            unreachable_sweep_limit: toml_config.polling.unreachable_sweep_limit.max(1),
            confirmations: toml_config.stability.confirmations.max(1),
            offline_threshold_secs: toml_config.alerts.offline_threshold_secs,
            cooldown_secs: toml_config.alerts.cooldown_secs,
            fallback_grace_secs: toml_config.alerts.fallback_grace_secs,
            dashboard_url: toml_config.alerts.dashboard_url,
            pushover_token: non_empty(toml_config.notifications.pushover.token),
            pushover_user_key: non_empty(toml_config.notifications.pushover.user_key),
            webhook_url: non_empty(toml_config.notifications.webhook.url),
            persistence_path: non_empty(toml_config.persistence.path),
            server_port: toml_config.server.port,
            metrics_interval_secs: toml_config.metrics.interval_secs.max(1),
            config_file,
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load from the given path, falling back to defaults, then apply environment overrides
    pub fn load_from_path(path: &str) -> Self {
        let mut config = match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        };
        config.apply_overrides(|key| env::var(key).ok());
        config
    }

    /// Overlay secrets from a key lookup (the process environment in production)
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = non_empty(lookup("STATUS_API_KEY")) {
            self.api_key = key;
        }
        if let Some(token) = non_empty(lookup("PUSHOVER_TOKEN")) {
            self.pushover_token = Some(token);
        }
        if let Some(user_key) = non_empty(lookup("PUSHOVER_USER_KEY")) {
            self.pushover_user_key = Some(user_key);
        }
        if let Some(url) = non_empty(lookup("ALERT_WEBHOOK_URL")) {
            self.webhook_url = Some(url);
        }
    }

    pub fn status_api(&self) -> StatusApiConfig {
        StatusApiConfig {
            url: self.api_url.clone(),
            api_key: self.api_key.clone(),
            request_timeout: self.api_request_timeout(),
            default_reset: self.default_reset(),
        }
    }

    pub fn budget_settings(&self) -> BudgetSettings {
        BudgetSettings {
            capacity: self.token_capacity,
            cost_per_call: self.cost_per_call,
            max_batch: self.max_batch,
            default_reset: self.default_reset(),
        }
    }

    // Getters for all config fields
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn api_request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn zone_ids(&self) -> &[ZoneId] {
        &self.zone_ids
    }

    pub fn main_interval(&self) -> Duration {
        Duration::from_secs(self.main_interval_secs)
    }

    pub fn priority_interval(&self) -> Duration {
        Duration::from_secs(self.priority_interval_secs)
    }

    pub fn max_batch(&self) -> usize {
        self.max_batch
    }

    pub fn cost_per_call(&self) -> u32 {
        self.cost_per_call
    }

    pub fn token_capacity(&self) -> u32 {
        self.token_capacity
    }

    pub fn default_reset(&self) -> Duration {
        Duration::from_secs(self.default_reset_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn unreachable_sweep_limit(&self) -> u32 {
        self.unreachable_sweep_limit
    }

    pub fn confirmations(&self) -> u32 {
        self.confirmations
    }

    pub fn offline_threshold(&self) -> Duration {
        Duration::from_secs(self.offline_threshold_secs)
    }

    pub fn alert_cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn fallback_grace(&self) -> Duration {
        Duration::from_secs(self.fallback_grace_secs)
    }

    pub fn dashboard_url(&self) -> &str {
        &self.dashboard_url
    }

    pub fn pushover_token(&self) -> Option<&str> {
        self.pushover_token.as_deref()
    }

    pub fn pushover_user_key(&self) -> Option<&str> {
        self.pushover_user_key.as_deref()
    }

    pub fn webhook_url(&self) -> Option<&str> {
        self.webhook_url.as_deref()
    }

    pub fn persistence_path(&self) -> Option<&str> {
        self.persistence_path.as_deref()
    }

    pub fn server_port(&self) -> u16 {
        self.server_port
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.main_interval(), Duration::from_secs(60));
        assert_eq!(config.priority_interval(), Duration::from_secs(120));
        assert_eq!(config.max_batch(), 20);
        assert_eq!(config.cost_per_call(), 16);
        assert_eq!(config.token_capacity(), 100);
        assert_eq!(config.confirmations(), 2);
        assert_eq!(config.offline_threshold(), Duration::from_secs(600));
        assert_eq!(config.alert_cooldown(), Duration::from_secs(1800));
        assert_eq!(config.fallback_grace(), Duration::from_secs(60));
        assert_eq!(config.retry_backoff(), Duration::from_secs(1));
        assert_eq!(config.unreachable_sweep_limit(), 3);
        assert!(config.zone_ids().is_empty());
        assert!(config.pushover_token().is_none());
        assert!(!config.has_api_key());
        assert_eq!(config.config_file(), "default");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
[zones]
ids = ["a", " b ", "a", ""]

[polling]
unreachable_sweep_limit = 0

[stability]
confirmations = 0
"#,
        )
        .unwrap();
        let config = Config::from_toml(toml_config, "inline".to_string());

        assert_eq!(config.zone_ids(), &[ZoneId::from("a"), ZoneId::from("b")][..]);
        // Threshold is clamped to at least one reading
        assert_eq!(config.confirmations(), 1);
        assert_eq!(config.unreachable_sweep_limit(), 1);
        assert_eq!(config.max_batch(), 20);
        assert_eq!(config.server_port(), 9090);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            "STATUS_API_KEY" => Some("secret".to_string()),
            "PUSHOVER_TOKEN" => Some("tok".to_string()),
            "PUSHOVER_USER_KEY" => Some("   ".to_string()),
            "ALERT_WEBHOOK_URL" => Some("https://hooks.example/alert".to_string()),
            _ => None,
        });

        assert_eq!(config.api_key(), "secret");
        assert_eq!(config.pushover_token(), Some("tok"));
        // Blank values do not count as configured
        assert_eq!(config.pushover_user_key(), None);
        assert_eq!(config.webhook_url(), Some("https://hooks.example/alert"));
    }

    #[test]
    fn test_budget_settings_from_config() {
        let settings = Config::default().budget_settings();
        assert_eq!(settings.capacity, 100);
        assert_eq!(settings.cost_per_call, 16);
        assert_eq!(settings.max_batch, 20);
        assert_eq!(settings.default_reset, Duration::from_secs(60));
    }

    #[test]
    fn test_resolve_config_path_prefers_cli() {
        assert_eq!(Config::resolve_config_path(Some("custom.toml")), "custom.toml");
    }
}
