//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::lifecycle::TransitionPolicy;
use crate::{AppError, Result};

/// Keychain service name under which all client secrets are stored.
pub const KEYRING_SERVICE: &str = "dsp-courier";

/// REST and socket endpoints of the DSP backend.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BackendConfig {
    /// Base URL for REST calls, e.g. `https://api.example.com`.
    pub base_url: String,
    /// WebSocket URL of the real-time messaging server.
    pub socket_url: String,
    /// Per-request timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl BackendConfig {
    /// Request timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Where the offer feed pulls new offers from.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OfferSourceKind {
    /// Locally generated sample offers.
    #[default]
    Synthetic,
    /// Orders polled from `GET /dsp/orders`.
    Backend,
}

/// Offer feed behaviour.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct FeedConfig {
    /// Seconds between generation ticks.
    #[serde(default = "default_generation_interval")]
    pub generation_interval_seconds: u64,
    /// Maximum number of offers kept in the backlog.
    #[serde(default = "default_max_backlog")]
    pub max_backlog: usize,
    /// Offer source used by the generation ticker.
    #[serde(default)]
    pub source: OfferSourceKind,
    /// Initial state of the notification gate.
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            generation_interval_seconds: default_generation_interval(),
            max_backlog: default_max_backlog(),
            source: OfferSourceKind::default(),
            notifications_enabled: true,
        }
    }
}

impl FeedConfig {
    /// Generation tick interval as a [`Duration`].
    #[must_use]
    pub fn generation_interval(&self) -> Duration {
        Duration::from_secs(self.generation_interval_seconds)
    }
}

/// Active delivery lifecycle settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LifecycleConfig {
    /// How long a delivered order stays on screen before it is cleared.
    #[serde(default = "default_hold_seconds")]
    pub hold_seconds: u64,
    /// Whether invalid transitions are errors or silent no-ops.
    #[serde(default)]
    pub transition_policy: TransitionPolicy,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            hold_seconds: default_hold_seconds(),
            transition_policy: TransitionPolicy::default(),
        }
    }
}

impl LifecycleConfig {
    /// Delivered-state hold as a [`Duration`].
    #[must_use]
    pub fn hold(&self) -> Duration {
        Duration::from_secs(self.hold_seconds)
    }
}

/// Real-time channel reconnect and queue settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ChannelConfig {
    /// First reconnect delay after a dropped connection.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Upper bound for the doubling reconnect delay.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Capacity of the outbound and inbound frame queues.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Location telemetry debounce thresholds.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct LocationConfig {
    /// Minimum seconds between two sent fixes.
    #[serde(default = "default_min_interval")]
    pub min_interval_seconds: u64,
    /// Minimum distance moved (meters) between two sent fixes.
    #[serde(default = "default_min_distance")]
    pub min_distance_meters: f64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            min_interval_seconds: default_min_interval(),
            min_distance_meters: default_min_distance(),
        }
    }
}

/// Mapping service settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct MapsConfig {
    /// Directions endpoint.
    #[serde(default = "default_directions_url")]
    pub directions_url: String,
    /// API key (populated at runtime).
    #[serde(skip)]
    pub api_key: String,
}

impl Default for MapsConfig {
    fn default() -> Self {
        Self {
            directions_url: default_directions_url(),
            api_key: String::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    15
}

fn default_generation_interval() -> u64 {
    15
}

fn default_max_backlog() -> usize {
    20
}

fn default_hold_seconds() -> u64 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_queue_capacity() -> usize {
    256
}

fn default_min_interval() -> u64 {
    10
}

fn default_min_distance() -> f64 {
    25.0
}

fn default_directions_url() -> String {
    "https://maps.googleapis.com/maps/api/directions/json".into()
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Backend endpoints.
    pub backend: BackendConfig,
    /// Offer feed settings.
    #[serde(default)]
    pub feed: FeedConfig,
    /// Lifecycle settings.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    /// Real-time channel settings.
    #[serde(default)]
    pub channel: ChannelConfig,
    /// Location telemetry settings.
    #[serde(default)]
    pub location: LocationConfig,
    /// Mapping service settings.
    #[serde(default)]
    pub maps: MapsConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the mapping service key from OS keychain with env-var fallback.
    ///
    /// A missing key is not fatal: directions are simply unavailable.
    pub async fn load_credentials(&mut self) {
        match load_credential("maps_api_key", "DSP_MAPS_API_KEY").await {
            Ok(key) => self.maps.api_key = key,
            Err(err) => warn!(%err, "maps api key unavailable; directions disabled"),
        }
    }

    fn validate(&mut self) -> Result<()> {
        let base = self.backend.base_url.trim_end_matches('/');
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(AppError::Config(
                "backend.base_url must be an http(s) url".into(),
            ));
        }
        self.backend.base_url = base.to_owned();

        if !(self.backend.socket_url.starts_with("ws://")
            || self.backend.socket_url.starts_with("wss://"))
        {
            return Err(AppError::Config(
                "backend.socket_url must be a ws(s) url".into(),
            ));
        }

        if self.feed.generation_interval_seconds == 0 {
            return Err(AppError::Config(
                "feed.generation_interval_seconds must be greater than zero".into(),
            ));
        }

        if self.feed.max_backlog == 0 {
            return Err(AppError::Config(
                "feed.max_backlog must be greater than zero".into(),
            ));
        }

        if self.channel.initial_backoff_ms == 0
            || self.channel.initial_backoff_ms > self.channel.max_backoff_ms
        {
            return Err(AppError::Config(
                "channel.initial_backoff_ms must be in 1..=max_backoff_ms".into(),
            ));
        }

        if self.channel.queue_capacity == 0 {
            return Err(AppError::Config(
                "channel.queue_capacity must be greater than zero".into(),
            ));
        }

        if !self.location.min_distance_meters.is_finite() || self.location.min_distance_meters < 0.0
        {
            return Err(AppError::Config(
                "location.min_distance_meters must be a non-negative number".into(),
            ));
        }

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
pub(crate) async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Credentials(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    match env::var(env_key) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(AppError::Credentials(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))),
    }
}
