pub mod scan_config;
pub mod session_config;

use std::path::Path;

use anyhow::Result;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

pub use scan_config::ScanConfig;
pub use session_config::SessionConfig;

use crate::utils::ensure_directory_exists;

pub const CONFIG_FILE_NAME: &str = "light_config.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightConfig {
    pub scan: ScanConfig,
    pub session: SessionConfig,
}

impl LightConfig {
    /// Loads the config from a configuration file, falling back to defaults
    /// when the file does not exist.
    pub async fn load(file_path: &Path) -> Result<Self> {
        if !file_path.exists() {
            warn!("Config file not found at {:?}, using default.", file_path);
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(file_path).await?;
        let config: Self = serde_json::from_str(&config_json)?;

        info!("Config loaded from {:?}", file_path);
        Ok(config)
    }

    /// Saves the current config to a configuration file.
    pub async fn save(&self, file_path: &Path) -> Result<()> {
        if let Some(config_dir) = file_path.parent() {
            ensure_directory_exists(config_dir).await?;
        }

        let config_json = match serde_json::to_string_pretty(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize light config to JSON: {}", e);
                return Err(e.into());
            }
        };

        fs::write(file_path, config_json).await?;

        info!("Light config saved to {:?}.", file_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = LightConfig::load(&dir.path().join(CONFIG_FILE_NAME)).await.unwrap();
        assert_eq!(config, LightConfig::default());
        assert!(config.scan.filter_by_service);
        assert_eq!(config.session.operation_timeout(), None);
    }

    #[tokio::test]
    async fn save_then_load_keeps_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let mut config = LightConfig::default();
        config.scan.min_rssi = Some(-70);
        config.session.operation_timeout_ms = Some(2500);

        config.save(&path).await.unwrap();
        let loaded = LightConfig::load(&path).await.unwrap();

        assert_eq!(loaded, config);
        assert_eq!(
            loaded.session.operation_timeout(),
            Some(std::time::Duration::from_millis(2500))
        );
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config: LightConfig =
            serde_json::from_str(r#"{ "scan": { "min_rssi": -60 } }"#).unwrap();
        assert!(config.scan.filter_by_service);
        assert_eq!(config.scan.min_rssi, Some(-60));
        assert_eq!(config.session, SessionConfig::default());
    }
}
