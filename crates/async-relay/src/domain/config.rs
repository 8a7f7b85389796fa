//! Relay configuration with validation.
//!
//! Values come from defaults overridden by environment variables
//! (`HOST`, `PORT`, `RELAY_*`).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Ports forming the default sibling topology
pub const DEFAULT_TOPOLOGY: [u16; 3] = [3000, 3001, 3002];

/// Upper bound for the submit deadline and the forward timeout
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Main relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// HTTP server configuration
    pub http: HttpConfig,
    /// Timeout configuration
    pub timeouts: TimeoutConfig,
    /// Peer configuration
    pub peers: PeerConfig,
    /// Request limits
    pub limits: LimitsConfig,
    /// Log output configuration
    pub logging: LoggingConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            timeouts: TimeoutConfig::default(),
            peers: PeerConfig::default(),
            limits: LimitsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// `PORT` is required; everything else falls back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("HOST") {
            let host = host.trim();
            if !host.is_empty() {
                config.http.host = host.to_string();
            }
        }

        let port = lookup("PORT").ok_or(ConfigError::Missing("PORT"))?;
        config.http.port = port
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidPort(port.clone()))?;

        if let Some(value) = lookup("RELAY_DEADLINE") {
            config.timeouts.deadline = parse_env_duration("RELAY_DEADLINE", &value)?;
        }
        if let Some(value) = lookup("RELAY_FORWARD_TIMEOUT") {
            config.timeouts.forward = parse_env_duration("RELAY_FORWARD_TIMEOUT", &value)?;
        }
        if let Some(value) = lookup("RELAY_CLEANUP_INTERVAL") {
            config.timeouts.cleanup_interval =
                parse_env_duration("RELAY_CLEANUP_INTERVAL", &value)?;
        }
        if let Some(value) = lookup("RELAY_PEERS") {
            config.peers.static_peers = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.trim_end_matches('/').to_string())
                .collect();
        }
        if let Some(value) = lookup("RELAY_MAX_BODY_BYTES") {
            config.limits.max_body_bytes = value.trim().parse().map_err(|_| {
                ConfigError::InvalidLimit(format!("RELAY_MAX_BODY_BYTES={}", value))
            })?;
        }
        if let Some(value) = lookup("RELAY_LOG_JSON") {
            config.logging.json = matches!(value.trim(), "1" | "true" | "yes");
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.port == 0 {
            return Err(ConfigError::InvalidPort("0".into()));
        }

        if self.http.host.is_empty() {
            return Err(ConfigError::Invalid("host cannot be empty".into()));
        }

        if self.timeouts.deadline.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "deadline cannot be 0".into(),
            ));
        }

        if self.timeouts.forward.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "forward timeout cannot be 0".into(),
            ));
        }

        if self.timeouts.deadline > MAX_TIMEOUT {
            return Err(ConfigError::InvalidTimeout(format!(
                "deadline cannot exceed {}s",
                MAX_TIMEOUT.as_secs()
            )));
        }

        if self.timeouts.forward > MAX_TIMEOUT {
            return Err(ConfigError::InvalidTimeout(format!(
                "forward timeout cannot exceed {}s",
                MAX_TIMEOUT.as_secs()
            )));
        }

        if self.timeouts.cleanup_interval.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "cleanup interval cannot be 0".into(),
            ));
        }

        if self.limits.max_body_bytes == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_body_bytes cannot be 0".into(),
            ));
        }

        if self.peers.static_peers.is_empty() && self.siblings().is_empty() {
            return Err(ConfigError::NoPeers(self.http.port));
        }

        Ok(())
    }

    /// Host and port as `host:port`
    pub fn authority(&self) -> String {
        format!("{}:{}", self.http.host, self.http.port)
    }

    /// Callback URL advertised to peers
    pub fn callback_url(&self) -> String {
        format!("http://{}/callback", self.authority())
    }

    /// Sibling ports of the local port in the configured topology
    pub fn siblings(&self) -> Vec<u16> {
        if !self.peers.topology.contains(&self.http.port) {
            return Vec::new();
        }
        self.peers
            .topology
            .iter()
            .copied()
            .filter(|p| *p != self.http.port)
            .collect()
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind host, also advertised in callback URLs
    pub host: String,
    /// Bind port
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_TOPOLOGY[0],
        }
    }
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Default deadline for a submitted request
    #[serde(with = "humantime_serde")]
    pub deadline: Duration,
    /// Timeout for outbound forward and callback requests
    #[serde(with = "humantime_serde")]
    pub forward: Duration,
    /// Interval of the expired-slot sweeper
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(30),
            forward: Duration::from_secs(5),
            cleanup_interval: Duration::from_secs(10),
        }
    }
}

/// Peer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Fixed port triple; each member forwards to its two siblings
    pub topology: Vec<u16>,
    /// Host used to address topology siblings
    pub topology_host: String,
    /// Explicit peer base URLs (take precedence over the topology)
    pub static_peers: Vec<String>,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            topology: DEFAULT_TOPOLOGY.to_vec(),
            topology_host: "localhost".to_string(),
            static_peers: Vec::new(),
        }
    }
}

/// Request limits configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Max request body size in bytes (default: 1MB)
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Log output configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Required variable not set
    #[error("missing required variable {0}")]
    Missing(&'static str),
    /// Port is not a valid non-zero u16
    #[error("invalid port: {0}")]
    InvalidPort(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// Invalid size limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Local port has no siblings and no static peers are configured
    #[error("no peers configured for port {0}")]
    NoPeers(u16),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn parse_env_duration(key: &str, value: &str) -> Result<Duration, ConfigError> {
    humantime_serde::parse_duration(value)
        .map_err(|e| ConfigError::InvalidTimeout(format!("{}={}: {}", key, value, e)))
}

/// Humantime serde module for Duration serialization
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        // "ms" must be checked before the bare "s" and "m" suffixes
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map_err(|_| "invalid minutes")?
                .checked_mul(60)
                .map(Duration::from_secs)
                .ok_or("minutes out of range")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
