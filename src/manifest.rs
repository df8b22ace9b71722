use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::definition::DefinitionKind;
use crate::error::DefinitionError;
use crate::registry::DefinitionRegistry;
use crate::storage::{read_json, write_json, StorageError};

const MANIFEST_VERSION: u32 = 1;

/// One definition as it appears in a manifest file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct ManifestEntry {
    pub name: String,
    #[serde(default)]
    pub kind: DefinitionKind,
    pub text: String,
}

/// Definitions listed in deployment order: a tap must come after the
/// definition it taps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct Manifest {
    pub version: u32,
    pub definitions: Vec<ManifestEntry>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            definitions: Vec::new(),
        }
    }
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, StorageError> {
        let manifest: Manifest = read_json(path)?;
        if manifest.version > MANIFEST_VERSION {
            return Err(StorageError::Invalid(format!(
                "Manifest version {} is newer than supported version {}",
                manifest.version, MANIFEST_VERSION
            )));
        }
        Ok(manifest)
    }

    pub fn save(&self, path: &Path) -> Result<(), StorageError> {
        write_json(path, self)
    }

    pub fn push(&mut self, kind: DefinitionKind, name: &str, text: &str) {
        self.definitions.push(ManifestEntry {
            name: name.to_string(),
            kind,
            text: text.to_string(),
        });
    }

    /// Deploy every entry in order. A failing entry is reported and skipped;
    /// the rest still deploy.
    pub fn deploy_into(&self, registry: &DefinitionRegistry) -> Vec<DefinitionError> {
        self.definitions
            .iter()
            .filter_map(|entry| {
                registry
                    .deploy(entry.kind, &entry.name, &entry.text)
                    .err()
                    .inspect(|e| tracing::warn!(name = %entry.name, error = %e, "skipped"))
            })
            .collect()
    }

    /// Capture the registry's definitions, original text, deployment order.
    pub fn from_registry(registry: &DefinitionRegistry) -> Self {
        let definitions = registry
            .snapshot()
            .iter()
            .map(|d| ManifestEntry {
                name: d.name().to_string(),
                kind: d.kind(),
                text: d.text().to_string(),
            })
            .collect();
        Self {
            version: MANIFEST_VERSION,
            definitions,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn sample() -> Manifest {
        let mut manifest = Manifest::default();
        manifest.push(DefinitionKind::Stream, "main", "http | transform | file");
        manifest.push(DefinitionKind::Stream, "audit", "tap:main.1 > log");
        manifest.push(DefinitionKind::Job, "nightly", "batch --cron='0 0 * * *'");
        manifest
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = crate::paths::manifest_path(dir.path());
        sample().save(&path).unwrap();
        assert_eq!(Manifest::load(&path).unwrap(), sample());
    }

    #[test]
    fn kind_defaults_to_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.json");
        std::fs::write(
            &path,
            r#"{ "version": 1, "definitions": [ { "name": "a", "text": "http | file" } ] }"#,
        )
        .unwrap();
        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.definitions[0].kind, DefinitionKind::Stream);
    }

    #[test]
    fn newer_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.json");
        std::fs::write(&path, r#"{ "version": 7, "definitions": [] }"#).unwrap();
        assert!(matches!(Manifest::load(&path), Err(StorageError::Invalid(_))));
    }

    #[test]
    fn deploy_continues_past_failures() {
        let mut manifest = Manifest::default();
        manifest.push(DefinitionKind::Stream, "broken", "http |");
        manifest.push(DefinitionKind::Stream, "main", "http | file");
        manifest.push(DefinitionKind::Stream, "audit", "tap:main > log");

        let registry = DefinitionRegistry::new();
        let errors = manifest.deploy_into(&registry);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].name(), "broken");
        assert_eq!(registry.names(), vec!["main", "audit"]);
    }

    #[test]
    fn registry_round_trip() {
        let registry = DefinitionRegistry::new();
        assert!(sample().deploy_into(&registry).is_empty());
        assert_eq!(Manifest::from_registry(&registry), sample());
    }
}
