use std::path::{Path, PathBuf};

use schemaver_common::{Error, Result};
use tracing::{debug, info};

use crate::model::AppConfig;

const CONFIG_DIR_NAME: &str = ".schemaver";
const CONFIG_FILE_NAME: &str = "config.yml";

/// Loads `AppConfig` from a YAML or TOML file.
pub struct ConfigLoader;

impl ConfigLoader {
    /// `~/.schemaver`, falling back to the working directory when no home
    /// directory can be resolved.
    pub fn default_config_dir() -> PathBuf {
        dirs::home_dir()
            .map(|home| home.join(CONFIG_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR_NAME))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(CONFIG_FILE_NAME)
    }

    /// Load and validate the config at `path`. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<AppConfig> {
        if !path.exists() {
            debug!("no config file at {}, using defaults", path.display());
            let config = AppConfig::default();
            config.validate()?;
            return Ok(config);
        }

        let config = Self::parse_file(path)?;
        config.validate()?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<AppConfig> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            "yml" | "yaml" => serde_yaml::from_str(&contents)
                .map_err(|e| Error::Config(format!("YAML parse error: {e}"))),
            "toml" => {
                toml::from_str(&contents).map_err(|e| Error::Config(format!("TOML parse error: {e}")))
            }
            other => Err(Error::Config(format!(
                "unsupported config extension: {other}"
            ))),
        }
    }
}
