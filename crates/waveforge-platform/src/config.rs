//! Configuration for the platform layer

use serde::{Deserialize, Serialize};

/// Platform configuration, loaded from defaults, an optional file, and
/// `WAVEFORGE_`-prefixed environment variables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Domain name; the root of every waveform naming path
    #[serde(default = "default_domain_name")]
    pub domain_name: String,

    /// Seconds to wait for components to register after execute
    #[serde(default = "default_binding_timeout")]
    pub component_binding_timeout_secs: u64,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            domain_name: default_domain_name(),
            component_binding_timeout_secs: default_binding_timeout(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON-formatted logs
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_domain_name() -> String {
    "WAVEFORGE_DEV".to_string()
}

fn default_binding_timeout() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl PlatformConfig {
    /// Load configuration from defaults, an optional file, and the
    /// environment
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&PlatformConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("WAVEFORGE")
                .separator("_")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
