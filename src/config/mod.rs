//! Resolved runtime configuration.
//!
//! Precedence, highest first: environment variables (including `.env`),
//! the TOML settings file, built-in defaults.

mod auth;
pub(crate) mod helpers;
mod storage;

pub use auth::AuthConfig;
pub use storage::StorageConfig;

use crate::config::helpers::{parse_bool_env, parse_string_env};
use crate::error::ConfigError;
use crate::settings::Settings;

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub filter: String,
    pub json: bool,
}

impl LoggingConfig {
    fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            filter: parse_string_env("CLAUSEEASE_LOG", settings.logging.filter.clone())?,
            json: parse_bool_env("CLAUSEEASE_LOG_JSON", settings.logging.json)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            storage: StorageConfig::resolve(settings)?,
            auth: AuthConfig::resolve(settings)?,
            logging: LoggingConfig::resolve(settings)?,
        })
    }
}
