use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

/// Alarm loaded into the in-process store at startup.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct AlarmSeed {
    pub car_name: String,
    pub plate: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub service_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// When set, logs are also written to a daily rolling file here.
    #[serde(default)]
    pub log_directory: Option<String>,
    #[serde(default = "default_source_path")]
    pub source_path: String,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_seconds: u64,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_seconds: u64,
    #[serde(default = "default_alarm_ttl_secs")]
    pub alarm_ttl_seconds: u64,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_api_page_size")]
    pub api_page_size: usize,
    #[serde(default)]
    pub alarms: Vec<AlarmSeed>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_source_path() -> String {
    "placas.csv".to_string()
}

fn default_refresh_interval_secs() -> u64 {
    5
}

fn default_heartbeat_interval_secs() -> u64 {
    60
}

fn default_alarm_ttl_secs() -> u64 {
    60
}

fn default_page_size() -> usize {
    200
}

fn default_api_page_size() -> usize {
    100
}

impl AppConfig {
    pub fn default_path() -> &'static str {
        "config/platewatch.toml"
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let raw = fs::read_to_string(path_ref)
            .with_context(|| format!("failed to read configuration from {}", path_ref.display()))?;
        let mut config: Self = toml::from_str(&raw).with_context(|| {
            format!("failed to parse configuration from {}", path_ref.display())
        })?;
        if config.service_name.trim().is_empty() {
            config.service_name = "platewatch".to_string();
        }
        Ok(config)
    }

    pub fn alarm_ttl(&self) -> Duration {
        Duration::from_secs(self.alarm_ttl_seconds)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds.max(1))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds.max(1))
    }
}
