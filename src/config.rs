//! Configuration management for the instance host
//!
//! Loads the YAML configuration file. Every field has a default so an empty
//! or partial file is valid.

use crate::host::{ManagerConfig, DEFAULT_DISCOVERY_TIMEOUT};
use crate::platform::{ComponentDescription, FourCharCode};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub plugin: PluginConfig,
    pub host: HostConfig,
    pub playback: PlaybackConfig,
    pub storage: StorageConfig,
}

/// The plugin type to host
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PluginConfig {
    pub component_type: FourCharCode,
    pub subtype: FourCharCode,
    pub manufacturer: FourCharCode,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            component_type: FourCharCode::new(b"aumu"),
            subtype: FourCharCode::new(b"demo"),
            manufacturer: FourCharCode::new(b"Demo"),
        }
    }
}

impl PluginConfig {
    pub fn description(&self) -> ComponentDescription {
        ComponentDescription {
            component_type: self.component_type,
            subtype: self.subtype,
            manufacturer: self.manufacturer,
        }
    }
}

/// Instance manager settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HostConfig {
    /// Instances to create at startup when no session count was saved
    pub instance_count: usize,
    pub discovery_timeout_ms: u64,
    pub require_ui_surface: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            instance_count: 1,
            discovery_timeout_ms: DEFAULT_DISCOVERY_TIMEOUT.as_millis() as u64,
            require_ui_surface: false,
        }
    }
}

/// Note sequence settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub base_note: u8,
    /// MIDI channel, 1-16
    pub channel: u8,
    pub velocity: u8,
    pub step_ms: u64,
    pub once_hold_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            base_note: 60,
            channel: 1,
            velocity: 100,
            step_ms: 100,
            once_hold_ms: 200,
        }
    }
}

/// Where presets and the session record live
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Sled database directory; the app state dir when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .with_context(|| format!("Failed to load config: {}", path.display()))
    }

    /// Parse and validate YAML text
    pub fn from_yaml(contents: &str) -> Result<Self> {
        // An empty document deserializes to unit, not to an empty mapping
        let config: AppConfig = if contents.trim().is_empty() {
            AppConfig::default()
        } else {
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.host.discovery_timeout_ms == 0 {
            anyhow::bail!("host.discovery_timeout_ms must be greater than 0");
        }

        let playback = &self.playback;
        if !(1..=16).contains(&playback.channel) {
            anyhow::bail!(
                "playback.channel must be between 1 and 16, got {}",
                playback.channel
            );
        }
        if playback.base_note > 127 || playback.velocity > 127 {
            anyhow::bail!("playback.base_note and playback.velocity must be 0-127");
        }
        if playback.step_ms == 0 {
            anyhow::bail!("playback.step_ms must be greater than 0");
        }

        Ok(())
    }

    /// Instance manager parameters, starting at `instance_count` instances
    pub fn manager_config(&self, instance_count: usize) -> ManagerConfig {
        let mut config = ManagerConfig::new(self.plugin.description());
        config.initial_instance_count = instance_count;
        config.discovery_timeout = Duration::from_millis(self.host.discovery_timeout_ms);
        config.require_ui_surface = self.host.require_ui_surface;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AppConfig::from_yaml("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.host.instance_count, 1);
        assert_eq!(config.host.discovery_timeout_ms, 5000);
    }

    #[test]
    fn test_partial_document() {
        let yaml = r#"
plugin:
  subtype: "sine"
  manufacturer: "Acme"
host:
  instance_count: 3
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.plugin.component_type, FourCharCode::new(b"aumu"));
        assert_eq!(config.plugin.subtype, FourCharCode::new(b"sine"));
        assert_eq!(config.host.instance_count, 3);
        assert_eq!(config.playback, PlaybackConfig::default());
        assert_eq!(config.plugin.description().to_string(), "aumu/sine/Acme");
    }

    #[test]
    fn test_example_config_parses() {
        let config = AppConfig::from_yaml(include_str!("../config.example.yaml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_invalid_fourcc_rejected() {
        let yaml = "plugin:\n  subtype: \"toolong\"\n";
        assert!(AppConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_validation_rejects_bad_channel() {
        let yaml = "playback:\n  channel: 17\n";
        let err = AppConfig::from_yaml(yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("channel"));
    }

    #[test]
    fn test_manager_config() {
        let mut config = AppConfig::default();
        config.host.discovery_timeout_ms = 250;
        config.host.require_ui_surface = true;

        let manager = config.manager_config(4);
        assert_eq!(manager.initial_instance_count, 4);
        assert_eq!(manager.discovery_timeout, Duration::from_millis(250));
        assert!(manager.require_ui_surface);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let mut config = AppConfig::default();
        config.playback.base_note = 48;
        config.storage.path = Some(dir.path().join("db"));
        config.save(&path).await.unwrap();

        let loaded = AppConfig::load(&path).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(AppConfig::load(dir.path().join("absent.yaml")).await.is_err());
    }
}
