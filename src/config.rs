//! Application configuration stored as TOML
//!
//! Missing sections fall back to defaults, so a file holding only
//! `[serial]` is enough to point the paddle profile at another port.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::connection::{NeverRetry, RetryEveryTicks, RetryPolicy};
use crate::mapping::MappingConfig;
use crate::pipeline::DEFAULT_TICK_RATE_HZ;
use crate::serial::SerialSettings;

const CONFIG_DIR: &str = "tiltcontrol";
const CONFIG_FILE: &str = "config.toml";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct PipelineSettings {
    #[serde(default = "default_tick_rate")]
    pub tick_rate_hz: f32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            tick_rate_hz: DEFAULT_TICK_RATE_HZ,
        }
    }
}

fn default_tick_rate() -> f32 {
    DEFAULT_TICK_RATE_HZ
}

/// Opt-in periodic reconnect
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ReconnectSettings {
    pub every_ticks: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub serial: SerialSettings,

    #[serde(default)]
    pub pipeline: PipelineSettings,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect: Option<ReconnectSettings>,

    #[serde(default)]
    pub mapping: MappingConfig,
}

impl AppConfig {
    /// `<config dir>/tiltcontrol/config.toml`
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| {
            warn!("Could not determine config directory, using current directory");
            PathBuf::from(".")
        });
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(content).map_err(|e| eyre!("Failed to parse config: {}", e))?;
        config
            .mapping
            .validate()
            .map_err(|e| eyre!("Invalid mapping in config: {}", e))?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| eyre!("Failed to serialize config: {}", e))
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
        let config = Self::from_toml(&content)?;
        debug!("Config loaded from {}", path.display());
        Ok(config)
    }

    /// Loads `path` if it exists, defaults otherwise
    pub async fn load_or_default(path: &Path) -> Result<Self> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|e| eyre!("Failed to check if config file exists: {}", e))?;
        if exists {
            Self::load(path).await
        } else {
            info!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
        }
        let content = self.to_toml()?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| eyre!("Failed to write config file {}: {}", path.display(), e))?;
        info!("Config saved to {}", path.display());
        Ok(())
    }

    /// Writes a default file unless one exists; returns whether it wrote
    pub async fn ensure_default_config(path: &Path) -> Result<bool> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|e| eyre!("Failed to check if config file exists: {}", e))?;
        if exists {
            debug!("Config already present at {}", path.display());
            return Ok(false);
        }
        Self::default().save(path).await?;
        Ok(true)
    }

    pub fn retry_policy(&self) -> Box<dyn RetryPolicy> {
        match &self.reconnect {
            Some(settings) => Box::new(RetryEveryTicks::new(
                settings.every_ticks,
                settings.max_attempts,
            )),
            None => Box::new(NeverRetry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::SignalSource;
    use tempfile::tempdir;

    #[test]
    fn partial_file_uses_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [serial]
            port_name = "/dev/ttyACM0"
            baud_rate = 9600
            "#,
        )
        .unwrap();

        assert_eq!(config.serial.port_name, "/dev/ttyACM0");
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.pipeline.tick_rate_hz, DEFAULT_TICK_RATE_HZ);
        assert!(config.reconnect.is_none());
        assert_eq!(config.mapping, MappingConfig::paddle());
    }

    #[test]
    fn invalid_mapping_is_rejected() {
        let result = AppConfig::from_toml(
            r#"
            [mapping]
            name = "broken"

            [mapping.source]
            kind = "euler_axis"
            axis = "roll"

            [mapping.input_range]
            min = -30.0
            max = 30.0

            [mapping.output_range]
            min = -8.0
            max = 8.0

            [mapping.smoothing]
            law = "exponential"
            factor = 1.5
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn reconnect_section_selects_policy() {
        let mut config = AppConfig::from_toml(
            r#"
            [reconnect]
            every_ticks = 30
            max_attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.retry_policy().describe(), "every 30 ticks, 5 attempts");

        config.reconnect = None;
        assert_eq!(config.retry_policy().describe(), "never");
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = AppConfig::default();
        config.mapping = MappingConfig::maze();
        config.reconnect = Some(ReconnectSettings {
            every_ticks: 60,
            max_attempts: None,
        });
        config.save(&path).await.unwrap();

        let loaded = AppConfig::load(&path).await.unwrap();
        assert_eq!(loaded, config);
        assert!(matches!(
            loaded.mapping.source,
            SignalSource::ConstrainedEuler { .. }
        ));
    }

    #[tokio::test]
    async fn ensure_default_config_writes_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        assert!(AppConfig::ensure_default_config(&path).await.unwrap());
        assert!(!AppConfig::ensure_default_config(&path).await.unwrap());
        assert_eq!(AppConfig::load(&path).await.unwrap(), AppConfig::default());
    }

    #[tokio::test]
    async fn missing_file_loads_defaults() {
        let dir = tempdir().unwrap();
        let config = AppConfig::load_or_default(&dir.path().join("absent.toml"))
            .await
            .unwrap();
        assert_eq!(config, AppConfig::default());
    }
}
