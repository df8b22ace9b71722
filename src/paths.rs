//! Default file names and path builders.

use std::path::{Path, PathBuf};

pub const SETTINGS_FILE: &str = "stream-dsl.json";
pub const MANIFEST_FILE: &str = "definitions.json";

/// Environment variable that overrides the settings file location.
pub const CONFIG_ENV: &str = "STREAM_DSL_CONFIG";

pub fn settings_path(config_dir: &Path) -> PathBuf {
    config_dir.join(SETTINGS_FILE)
}

pub fn manifest_path(dir: &Path) -> PathBuf {
    dir.join(MANIFEST_FILE)
}
