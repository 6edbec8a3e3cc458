use std::path::{Path, PathBuf};

use quarry_common::{Error, Result};
use tracing::{debug, info};

use crate::model::AppConfig;

/// Loads the application config from an explicit path, the `QUARRY_CONFIG`
/// environment variable, or the platform config directory, in that order.
/// Falls back to built-in defaults when no file exists.
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load(path: Option<&Path>) -> Result<AppConfig> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        if let Ok(env_path) = std::env::var("QUARRY_CONFIG") {
            return Self::from_file(Path::new(&env_path));
        }

        for candidate in Self::default_candidates() {
            if candidate.exists() {
                return Self::from_file(&candidate);
            }
            debug!("no config at {}", candidate.display());
        }

        info!("no config file found, using defaults");
        Ok(AppConfig::default())
    }

    pub fn from_file(path: &Path) -> Result<AppConfig> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;

        let config = match path.extension().and_then(|x| x.to_str()) {
            Some("toml") => Self::from_toml_str(&raw)?,
            _ => Self::from_yaml_str(&raw)?,
        };

        info!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml_str(raw: &str) -> Result<AppConfig> {
        serde_yaml::from_str(raw).map_err(|e| Error::Config(format!("invalid yaml config: {e}")))
    }

    pub fn from_toml_str(raw: &str) -> Result<AppConfig> {
        toml::from_str(raw).map_err(|e| Error::Config(format!("invalid toml config: {e}")))
    }

    fn default_candidates() -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        if let Some(dir) = dirs::config_dir() {
            let base = dir.join("quarry");
            candidates.push(base.join("config.yaml"));
            candidates.push(base.join("config.toml"));
        }
        candidates
    }
}
