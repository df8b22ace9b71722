use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use crate::storage::{read_json, write_json, StorageError};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Load { path: PathBuf, source: StorageError },
    #[error("failed to save settings to {path}: {source}")]
    Save { path: PathBuf, source: StorageError },
    #[error("settings version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
}

/// Compiler and registry settings, stored as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct DslSettings {
    pub version: u32,
    /// Definitions longer than this many bytes are rejected. None = no limit.
    #[serde(default)]
    pub max_definition_length: Option<usize>,
    /// `tracing` filter directive used when neither `-v` nor `RUST_LOG` is given.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Manifest the CLI reads when `--manifest` is omitted.
    #[serde(default)]
    #[ts(type = "string | null")]
    pub default_manifest: Option<PathBuf>,
}

pub const SETTINGS_VERSION: u32 = 1;

fn default_log_filter() -> String {
    "warn".to_string()
}

impl Default for DslSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            max_definition_length: None,
            log_filter: default_log_filter(),
            default_manifest: None,
        }
    }
}

impl DslSettings {
    /// JSON schema of the settings file.
    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(DslSettings)
    }
}

/// Load settings from `path`. A missing file yields the defaults.
pub fn load_settings(path: &Path) -> Result<DslSettings, SettingsError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no settings file, using defaults");
        return Ok(DslSettings::default());
    }
    let settings: DslSettings = read_json(path).map_err(|source| SettingsError::Load {
        path: path.to_path_buf(),
        source,
    })?;
    if settings.version > SETTINGS_VERSION {
        return Err(SettingsError::UnsupportedVersion {
            found: settings.version,
            supported: SETTINGS_VERSION,
        });
    }
    Ok(settings)
}

pub fn save_settings(path: &Path, settings: &DslSettings) -> Result<(), SettingsError> {
    let save = || -> Result<(), StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        write_json(path, settings)
    };
    save().map_err(|source| SettingsError::Save {
        path: path.to_path_buf(),
        source,
    })
}
