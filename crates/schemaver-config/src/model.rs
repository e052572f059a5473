use std::path::PathBuf;

use schemaver_common::{Result, SchemaVersion};
use schemaver_security::IdentifierValidator;
use serde::{Deserialize, Serialize};

pub const DEFAULT_VERSION_KEY: &str = "schema_version";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub migrations: MigrationsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    /// Prepended to every custom table name, including the options table.
    pub table_prefix: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("schemaver.db"),
            table_prefix: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MigrationsConfig {
    pub dir: PathBuf,
    /// Option name under which the applied schema version is stored.
    pub version_key: String,
    /// Pin the target version instead of using the highest available step.
    pub target: Option<SchemaVersion>,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("migrations"),
            version_key: DEFAULT_VERSION_KEY.to_string(),
            target: None,
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        IdentifierValidator::validate_table_prefix(&self.database.table_prefix)?;
        IdentifierValidator::validate_option_name(&self.migrations.version_key)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert_eq!(config.migrations.version_key, "schema_version");
        assert_eq!(config.database.table_prefix, "");
        assert!(config.migrations.target.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn bad_prefix_fails_validation() {
        let mut config = AppConfig::default();
        config.database.table_prefix = "wp-".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_version_key_fails_validation() {
        let mut config = AppConfig::default();
        config.migrations.version_key = String::new();
        assert!(config.validate().is_err());
    }
}
