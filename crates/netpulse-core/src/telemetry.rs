// Logging setup
//
// Console logging through tracing-subscriber. Logs go to stderr so that
// stdout stays clean for exported measurement data.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Default filter when neither `RUST_LOG` nor `LOG_LEVEL` is set
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Configuration for logging
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name, attached to the startup event
    pub service_name: String,
    /// Log filter (e.g., "info", "debug", "netpulse_core=trace")
    pub log_filter: Option<String>,
    /// Whether to enable console logging
    pub enable_console: bool,
    /// Emit ANSI colors
    pub ansi: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "netpulse".to_string(),
            log_filter: None,
            enable_console: true,
            ansi: true,
        }
    }
}

impl TelemetryConfig {
    /// Create config from environment variables
    ///
    /// - `RUST_LOG`: Log filter, takes precedence
    /// - `LOG_LEVEL`: Fallback log filter
    /// - `NO_COLOR`: Disables ANSI colors when set
    pub fn from_env() -> Self {
        Self {
            log_filter: std::env::var("RUST_LOG")
                .or_else(|_| std::env::var("LOG_LEVEL"))
                .ok()
                .filter(|f| !f.trim().is_empty()),
            ansi: std::env::var_os("NO_COLOR").is_none(),
            ..Default::default()
        }
    }

    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }

    pub fn with_console(mut self, enabled: bool) -> Self {
        self.enable_console = enabled;
        self
    }

    /// Resolved filter; an unparseable filter falls back to the default
    pub fn env_filter(&self) -> EnvFilter {
        self.log_filter
            .as_ref()
            .and_then(|f| EnvFilter::try_new(f).ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
    }
}

/// Install the global subscriber
///
/// Returns false if a subscriber was already installed.
pub fn init_telemetry(config: TelemetryConfig) -> bool {
    let console_layer = if config.enable_console {
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_ansi(config.ansi)
                .with_writer(std::io::stderr)
                .with_filter(config.env_filter()),
        )
    } else {
        None
    };

    let installed = tracing_subscriber::registry()
        .with(console_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(
            service = %config.service_name,
            version = env!("CARGO_PKG_VERSION"),
            "Logging initialized"
        );
    }
    installed
}
