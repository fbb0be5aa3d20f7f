use crate::domain::models::{MatchMode, TargetSpec};
use crate::relay::worker::RelayConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_true")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_true(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "drone_relay".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Advertised name of the peripheral to lock onto.
    #[serde(default = "default_target_name")]
    pub target_name: Option<String>,
    /// Hardware address of the peripheral, when known.
    #[serde(default)]
    pub target_address: Option<String>,
    #[serde(default)]
    pub match_mode: MatchMode,

    /// Pause before rescanning after a failed connect attempt.
    #[serde(default = "default_connect_backoff_ms")]
    pub connect_backoff_ms: u64,
    /// Bound on how long stop waits before force-releasing the transport.
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,

    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_name: default_target_name(),
            target_address: None,
            match_mode: MatchMode::default(),
            connect_backoff_ms: default_connect_backoff_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
            log_settings: LogSettings::default(),
        }
    }
}

fn default_target_name() -> Option<String> {
    Some("__dji_remote__".to_string())
}
fn default_connect_backoff_ms() -> u64 {
    500
}
fn default_stop_timeout_ms() -> u64 {
    2000
}

impl Settings {
    pub fn target(&self) -> TargetSpec {
        TargetSpec {
            name: self.target_name.clone(),
            address: self.target_address.clone(),
            match_mode: self.match_mode,
        }
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            connect_backoff: Duration::from_millis(self.connect_backoff_ms),
            stop_timeout: Duration::from_millis(self.stop_timeout_ms),
        }
    }
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();

        Ok(Self {
            settings,
            settings_path,
        })
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("DroneRelay");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &PathBuf) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_yields_defaults() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.target_name.as_deref(), Some("__dji_remote__"));
        assert_eq!(settings.match_mode, MatchMode::All);
        assert_eq!(settings.connect_backoff_ms, 500);
        assert_eq!(settings.log_settings.level, "info");
    }

    #[test]
    fn test_target_mapping() {
        let settings: Settings = serde_json::from_str(
            r#"{"target_name": "beacon-1", "target_address": "AA:BB", "match_mode": "any"}"#,
        )
        .unwrap();
        let target = settings.target();
        assert_eq!(target.name.as_deref(), Some("beacon-1"));
        assert_eq!(target.address.as_deref(), Some("AA:BB"));
        assert_eq!(target.match_mode, MatchMode::Any);
        assert!(!target.is_empty());
    }

    #[test]
    fn test_relay_config_mapping() {
        let settings = Settings {
            connect_backoff_ms: 250,
            stop_timeout_ms: 1000,
            ..Settings::default()
        };
        let config = settings.relay_config();
        assert_eq!(config.connect_backoff, Duration::from_millis(250));
        assert_eq!(config.stop_timeout, Duration::from_millis(1000));
    }
}
