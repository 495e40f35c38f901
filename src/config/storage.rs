use std::path::{Component, PathBuf};

use crate::config::helpers::parse_string_env;
use crate::error::ConfigError;
use crate::settings::Settings;

/// Where the master directory and the per-tenant stores live on disk.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub master_db_path: PathBuf,
    pub tenant_root: PathBuf,
}

/// Normalize a storage path, rejecting empty values and `..` traversal.
///
/// Absolute paths are allowed so deployments can point at a data volume.
fn validate_storage_path(key: &str, raw: &str) -> Result<PathBuf, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "path must not be empty".to_string(),
        });
    }

    let raw_path = PathBuf::from(trimmed);
    let mut normalized = PathBuf::new();
    for component in raw_path.components() {
        match component {
            Component::Normal(segment) => normalized.push(segment),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "path must not contain '..' components".to_string(),
                });
            }
            Component::RootDir => normalized.push(Component::RootDir.as_os_str()),
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "path must not be empty".to_string(),
        });
    }

    Ok(normalized)
}

impl StorageConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let master_raw = parse_string_env(
            "CLAUSEEASE_MASTER_DB",
            settings.storage.master_db_path.clone(),
        )?;
        let tenant_raw = parse_string_env(
            "CLAUSEEASE_TENANT_ROOT",
            settings.storage.tenant_root.clone(),
        )?;

        let master_db_path = validate_storage_path("CLAUSEEASE_MASTER_DB", &master_raw)?;
        if master_db_path.file_name().is_none() {
            return Err(ConfigError::InvalidValue {
                key: "CLAUSEEASE_MASTER_DB".to_string(),
                message: "master database path must include a filename".to_string(),
            });
        }

        Ok(Self {
            master_db_path,
            tenant_root: validate_storage_path("CLAUSEEASE_TENANT_ROOT", &tenant_raw)?,
        })
    }
}
