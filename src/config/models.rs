use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub resume: ResumeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Alert dispatch loop settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchConfig {
    /// Delay before the single retry of alerts that raced handle registration
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Bound of the engine-to-dispatcher alert queue
    #[serde(default = "default_alert_channel_capacity")]
    pub alert_channel_capacity: usize,
}

impl DispatchConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: default_retry_delay_ms(),
            alert_channel_capacity: default_alert_channel_capacity(),
        }
    }
}

fn default_retry_delay_ms() -> u64 {
    250
}

fn default_alert_channel_capacity() -> usize {
    4096
}

/// Resume-data store settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResumeConfig {
    #[serde(default = "default_resume_enabled")]
    pub enabled: bool,
    #[serde(default = "default_resume_path")]
    pub path: PathBuf,
}

impl Default for ResumeConfig {
    fn default() -> Self {
        Self {
            enabled: default_resume_enabled(),
            path: default_resume_path(),
        }
    }
}

fn default_resume_enabled() -> bool {
    true
}

fn default_resume_path() -> PathBuf {
    PathBuf::from("data/resume")
}

/// Log output settings; `RUST_LOG` takes precedence over `filter`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}
