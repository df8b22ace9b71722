//! In-memory registry of deployed definitions.
//!
//! Deployment order is kept, so a manifest written back out deploys in the
//! same order. Tap resolution always runs against a snapshot taken before
//! the write lock is acquired; the compiler never sees the lock.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::definition::{Definition, DefinitionKind};
use crate::dsl::ast::StreamNode;
use crate::dsl::resolve::StreamLookupEnvironment;
use crate::error::DefinitionError;
use crate::settings::DslSettings;

#[derive(Debug, Default)]
pub struct DefinitionRegistry {
    definitions: RwLock<IndexMap<String, Arc<Definition>>>,
    max_definition_length: Option<usize>,
}

/// A consistent, lock-free view of the registry at one point in time.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    definitions: IndexMap<String, Arc<Definition>>,
}

impl RegistrySnapshot {
    fn lookup(&self, name: &str, kind: DefinitionKind) -> Option<StreamNode> {
        self.definitions
            .get(name)
            .filter(|d| d.kind() == kind)
            .map(|d| d.ast().clone())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Definition>> {
        self.definitions.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Definition>> {
        self.definitions.values()
    }
}

impl StreamLookupEnvironment for RegistrySnapshot {
    fn lookup_stream(&self, name: &str) -> Option<StreamNode> {
        self.lookup(name, DefinitionKind::Stream)
    }

    fn lookup_job(&self, name: &str) -> Option<StreamNode> {
        self.lookup(name, DefinitionKind::Job)
    }
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: &DslSettings) -> Self {
        Self {
            definitions: RwLock::default(),
            max_definition_length: settings.max_definition_length,
        }
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            definitions: self.definitions.read().clone(),
        }
    }

    /// Parse and resolve a definition against the current registry without
    /// storing it.
    pub fn stage(
        &self,
        kind: DefinitionKind,
        name: &str,
        text: &str,
    ) -> Result<Definition, DefinitionError> {
        if let Some(limit) = self.max_definition_length {
            if text.len() > limit {
                return Err(DefinitionError::TooLong {
                    name: name.to_string(),
                    length: text.len(),
                    limit,
                });
            }
        }
        let definition = Definition::parse(kind, name, text)?;
        if definition.tap_target() == Some((kind, name.to_string())) {
            return Err(DefinitionError::SelfTap {
                name: name.to_string(),
            });
        }
        let resolved = definition.resolve(&self.snapshot())?;
        debug!(%name, %kind, "staged");
        Ok(resolved)
    }

    /// Stage a definition and add it under a fresh name.
    pub fn deploy(
        &self,
        kind: DefinitionKind,
        name: &str,
        text: &str,
    ) -> Result<Arc<Definition>, DefinitionError> {
        if self.definitions.read().contains_key(name) {
            return Err(DefinitionError::AlreadyExists {
                name: name.to_string(),
            });
        }
        let definition = Arc::new(self.stage(kind, name, text)?);

        let mut definitions = self.definitions.write();
        // re-check: another deploy may have won the race
        if definitions.contains_key(name) {
            return Err(DefinitionError::AlreadyExists {
                name: name.to_string(),
            });
        }
        definitions.insert(name.to_string(), Arc::clone(&definition));
        info!(%name, %kind, "deployed");
        Ok(definition)
    }

    /// Replace an existing definition and re-resolve everything that taps it.
    /// Returns the dependents that no longer resolve.
    pub fn redeploy(
        &self,
        kind: DefinitionKind,
        name: &str,
        text: &str,
    ) -> Result<Vec<DefinitionError>, DefinitionError> {
        if !self.definitions.read().contains_key(name) {
            return Err(DefinitionError::NotFound {
                name: name.to_string(),
            });
        }
        let definition = Arc::new(self.stage(kind, name, text)?);
        self.definitions
            .write()
            .insert(name.to_string(), definition);
        info!(%name, %kind, "redeployed");
        Ok(self.resolve_all())
    }

    /// Remove a definition. Refused while other definitions tap it.
    pub fn undeploy(&self, name: &str) -> Result<Arc<Definition>, DefinitionError> {
        let mut definitions = self.definitions.write();
        let dependents = dependents_of(&definitions, name);
        if !dependents.is_empty() {
            return Err(DefinitionError::InUse {
                name: name.to_string(),
                dependents,
            });
        }
        let removed = definitions
            .shift_remove(name)
            .ok_or_else(|| DefinitionError::NotFound {
                name: name.to_string(),
            })?;
        info!(%name, "undeployed");
        Ok(removed)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Definition>> {
        self.definitions.read().get(name).cloned()
    }

    /// Names in deployment order.
    pub fn names(&self) -> Vec<String> {
        self.definitions.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.read().is_empty()
    }

    /// Names of the other definitions whose source taps `name`.
    pub fn dependents(&self, name: &str) -> Vec<String> {
        dependents_of(&self.definitions.read(), name)
    }

    /// Re-resolve every definition against one snapshot. Definitions that
    /// fail keep their previous resolution and are reported.
    pub fn resolve_all(&self) -> Vec<DefinitionError> {
        let snapshot = self.snapshot();
        let mut updates = Vec::new();
        let mut failures = Vec::new();
        for definition in snapshot.iter() {
            match definition.resolve(&snapshot) {
                Ok(resolved) => {
                    if resolved != **definition {
                        updates.push(Arc::new(resolved));
                    }
                }
                Err(e) => {
                    warn!(name = definition.name(), error = %e, "re-resolution failed");
                    failures.push(e);
                }
            }
        }

        if !updates.is_empty() {
            let mut definitions = self.definitions.write();
            for updated in updates {
                debug!(name = updated.name(), "re-resolved");
                // a concurrent undeploy wins
                if let Some(slot) = definitions.get_mut(updated.name()) {
                    *slot = updated;
                }
            }
        }
        failures
    }
}

fn dependents_of(definitions: &IndexMap<String, Arc<Definition>>, name: &str) -> Vec<String> {
    let Some(target_kind) = definitions.get(name).map(|d| d.kind()) else {
        return Vec::new();
    };
    definitions
        .values()
        .filter(|d| d.name() != name)
        .filter(|d| d.tap_target().is_some_and(|(kind, target)| kind == target_kind && target == name))
        .map(|d| d.name().to_string())
        .collect()
}
