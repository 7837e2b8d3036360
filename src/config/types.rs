use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::listeners::OPT_NAME;

/// Root configuration for listenerd
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Listeners created at startup
    #[serde(default)]
    pub listeners: Vec<ListenerSpec>,

    /// Telemetry settings
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Global settings
    #[serde(default)]
    pub settings: Settings,
}

/// Declarative listener definition
#[derive(Debug, Clone, Deserialize)]
pub struct ListenerSpec {
    /// Listener name (unique, used for lookup and completion)
    pub name: String,

    /// Start the backing server immediately after creation
    #[serde(default)]
    pub autostart: bool,

    /// Factory options; must contain the "Protocol" key
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl ListenerSpec {
    /// The factory option map with the spec's name merged in.
    pub fn factory_options(&self) -> HashMap<String, String> {
        let mut options = self.options.clone();
        options.insert(OPT_NAME.to_string(), self.name.clone());
        options
    }
}

/// Telemetry settings
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON-formatted logs
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

/// Global settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Bound on a server's graceful stop
    #[serde(default = "default_stop_grace", with = "humantime_serde")]
    pub stop_grace: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            stop_grace: default_stop_grace(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_stop_grace() -> Duration {
    Duration::from_secs(5)
}
