//! File-backed settings.
//!
//! Settings are the lowest-precedence configuration layer: values come from a
//! TOML file when one exists, otherwise from the defaults below. Environment
//! variables override them in [`crate::config::Config::resolve`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable naming an explicit settings file.
pub const SETTINGS_PATH_ENV: &str = "CLAUSEEASE_CONFIG";
/// Settings file looked up in the working directory when no path is given.
pub const DEFAULT_SETTINGS_FILE: &str = "clausease.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub storage: StorageSettings,
    pub auth: AuthSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub master_db_path: String,
    pub tenant_root: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            master_db_path: "db/master.db".to_string(),
            tenant_root: "db/tenants".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub jwt_secret: Option<String>,
    pub session_ttl_hours: u64,
    pub reset_token_ttl_minutes: u64,
    pub clock_skew_leeway_secs: u64,
    pub admin_tag: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            session_ttl_hours: 24,
            reset_token_ttl_minutes: 15,
            clock_skew_leeway_secs: 10,
            admin_tag: "+admin".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "clausease=info".to_string(),
            json: false,
        }
    }
}

impl Settings {
    /// Load settings from `path`, or from the default locations when `None`.
    ///
    /// A missing default file is not an error; a missing explicit file is.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(SETTINGS_PATH_ENV).map(PathBuf::from));

        match explicit {
            Some(path) => Self::from_file(&path),
            None => {
                let default_path = PathBuf::from(DEFAULT_SETTINGS_FILE);
                if default_path.exists() {
                    Self::from_file(&default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}
