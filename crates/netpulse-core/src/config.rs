// Session and transport configuration
//
// Configuration is loaded from explicit values or environment variables and is
// immutable once a session starts.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{MonitorError, Result};

/// Default latency probe target
pub const DEFAULT_PING_URL: &str = "https://www.google.com/favicon.ico";

/// Default throughput target (Cloudflare, 100 MiB of generated bytes)
pub const DEFAULT_DOWNLOAD_URL: &str = "https://speed.cloudflare.com/__down?bytes=104857600";

const DEFAULT_DURATION_HOURS: u64 = 3;
const DEFAULT_PING_INTERVAL_SECS: u64 = 2;
const DEFAULT_SPEED_INTERVAL_SECS: u64 = 300;

/// Upper bound for every session timing (ten years)
pub const MAX_TIMING: Duration = Duration::from_secs(10 * 365 * 24 * 3600);

/// Configuration for one monitoring session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Upper bound on total session wall-clock time
    #[serde(with = "duration_secs")]
    pub duration: Duration,

    /// Tick period; one latency probe is issued per tick
    #[serde(with = "duration_secs")]
    pub ping_interval: Duration,

    /// Minimum spacing between throughput samples
    #[serde(with = "duration_secs")]
    pub speed_interval: Duration,

    /// Latency probe endpoint
    pub ping_target: Url,

    /// Throughput download endpoint
    pub download_target: Url,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(DEFAULT_DURATION_HOURS * 3600),
            ping_interval: Duration::from_secs(DEFAULT_PING_INTERVAL_SECS),
            speed_interval: Duration::from_secs(DEFAULT_SPEED_INTERVAL_SECS),
            ping_target: Url::parse(DEFAULT_PING_URL).expect("default ping URL is valid"),
            download_target: Url::parse(DEFAULT_DOWNLOAD_URL)
                .expect("default download URL is valid"),
        }
    }
}

impl SessionConfig {
    /// Build a configuration from the user-facing start inputs
    ///
    /// Blank URLs fall back to the defaults. Fails with `InvalidConfig` when a
    /// value is zero or a URL cannot be parsed.
    pub fn new(
        duration_hours: u64,
        ping_interval_secs: u64,
        speed_interval_secs: u64,
        ping_url: &str,
        download_url: &str,
    ) -> Result<Self> {
        let config = Self {
            duration: Duration::from_secs(duration_hours.saturating_mul(3600)),
            ping_interval: Duration::from_secs(ping_interval_secs),
            speed_interval: Duration::from_secs(speed_interval_secs),
            ping_target: parse_target(ping_url, DEFAULT_PING_URL)?,
            download_target: parse_target(download_url, DEFAULT_DOWNLOAD_URL)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Default targets with second-granularity timings
    pub fn from_secs(duration_secs: u64, ping_interval_secs: u64, speed_interval_secs: u64) -> Self {
        Self::default()
            .with_duration(Duration::from_secs(duration_secs))
            .with_ping_interval(Duration::from_secs(ping_interval_secs))
            .with_speed_interval(Duration::from_secs(speed_interval_secs))
    }

    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `NETPULSE_DURATION_HOURS`: Session length in hours (default: 3)
    /// - `NETPULSE_PING_INTERVAL_SECS`: Seconds between latency probes (default: 2)
    /// - `NETPULSE_SPEED_INTERVAL_SECS`: Seconds between throughput samples (default: 300)
    /// - `NETPULSE_PING_URL`: Latency probe target
    /// - `NETPULSE_DOWNLOAD_URL`: Throughput download target
    pub fn from_env() -> Result<Self> {
        let ping_url = env::var("NETPULSE_PING_URL").unwrap_or_default();
        let download_url = env::var("NETPULSE_DOWNLOAD_URL").unwrap_or_default();

        Self::new(
            env_u64("NETPULSE_DURATION_HOURS", DEFAULT_DURATION_HOURS),
            env_u64("NETPULSE_PING_INTERVAL_SECS", DEFAULT_PING_INTERVAL_SECS),
            env_u64("NETPULSE_SPEED_INTERVAL_SECS", DEFAULT_SPEED_INTERVAL_SECS),
            &ping_url,
            &download_url,
        )
    }

    /// Set the session duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set the tick period
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Set the spacing between throughput samples
    pub fn with_speed_interval(mut self, interval: Duration) -> Self {
        self.speed_interval = interval;
        self
    }

    /// Set the latency probe target
    pub fn with_ping_target(mut self, target: Url) -> Self {
        self.ping_target = target;
        self
    }

    /// Set the throughput download target
    pub fn with_download_target(mut self, target: Url) -> Self {
        self.download_target = target;
        self
    }

    /// Check that all timings are positive and at most [`MAX_TIMING`]
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("duration", self.duration),
            ("ping interval", self.ping_interval),
            ("speed interval", self.speed_interval),
        ] {
            if value.is_zero() {
                return Err(MonitorError::invalid_config(format!(
                    "{} must be positive",
                    name
                )));
            }
            if value > MAX_TIMING {
                return Err(MonitorError::invalid_config(format!(
                    "{} exceeds {} days",
                    name,
                    MAX_TIMING.as_secs() / 86_400
                )));
            }
        }
        Ok(())
    }
}

/// HTTP transport configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Per-request timeout for latency probes
    pub probe_timeout: Duration,

    /// TCP/TLS connect timeout for every request
    pub connect_timeout: Duration,

    /// User-Agent header sent with every request
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("netpulse/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl TransportConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `NETPULSE_PROBE_TIMEOUT_SECS`: Latency probe timeout (default: 10)
    /// - `NETPULSE_CONNECT_TIMEOUT_SECS`: Connect timeout (default: 10)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            probe_timeout: env::var("NETPULSE_PROBE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.probe_timeout),
            connect_timeout: env::var("NETPULSE_CONNECT_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
            ..defaults
        }
    }

    /// Set the latency probe timeout
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Well-known throughput endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadPreset {
    /// Cloudflare, 100 MiB
    Cloudflare100Mb,
    /// Cloudflare, 500 MiB
    Cloudflare500Mb,
    /// Cloudflare, 1 GiB
    Cloudflare1Gb,
}

impl DownloadPreset {
    /// All presets, smallest first
    pub const ALL: [DownloadPreset; 3] = [
        DownloadPreset::Cloudflare100Mb,
        DownloadPreset::Cloudflare500Mb,
        DownloadPreset::Cloudflare1Gb,
    ];

    /// Short display label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Cloudflare100Mb => "CF 100MB",
            Self::Cloudflare500Mb => "CF 500MB",
            Self::Cloudflare1Gb => "CF 1GB",
        }
    }

    /// Download endpoint for this preset
    pub fn url(&self) -> &'static str {
        match self {
            Self::Cloudflare100Mb => DEFAULT_DOWNLOAD_URL,
            Self::Cloudflare500Mb => "https://speed.cloudflare.com/__down?bytes=524288000",
            Self::Cloudflare1Gb => "https://speed.cloudflare.com/__down?bytes=1073741824",
        }
    }
}

impl std::fmt::Display for DownloadPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

fn parse_target(raw: &str, fallback: &str) -> Result<Url> {
    let trimmed = raw.trim();
    let target = if trimmed.is_empty() { fallback } else { trimmed };
    Url::parse(target)
        .map_err(|e| MonitorError::invalid_config(format!("invalid URL '{}': {}", target, e)))
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Serde support for Duration as whole seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
