use serde::Serialize;
use thiserror::Error;
use ts_rs::TS;

use crate::dsl::error::{Diagnostic, DiagnosticReport};
use crate::storage::StorageError;

/// Failures of the definition layer above the compiler: a definition that
/// does not compile, or a registry operation that cannot be honoured.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, TS)]
#[serde(tag = "code", content = "detail")]
#[ts(export)]
pub enum DefinitionError {
    #[error("{name}: {diagnostic}")]
    Parse {
        name: String,
        #[ts(as = "DiagnosticReport")]
        diagnostic: Diagnostic,
    },
    #[error("{name}: {diagnostic}")]
    Resolution {
        name: String,
        #[ts(as = "DiagnosticReport")]
        diagnostic: Diagnostic,
    },
    #[error("definition '{name}' is declared as '{declared}' in its text")]
    NameMismatch { name: String, declared: String },
    #[error("definition '{name}' cannot tap itself")]
    SelfTap { name: String },
    #[error("definition '{name}' already exists")]
    AlreadyExists { name: String },
    #[error("definition '{name}' not found")]
    NotFound { name: String },
    #[error("definition '{name}' is still tapped by {dependents:?}")]
    InUse { name: String, dependents: Vec<String> },
    #[error("definition '{name}' is {length} bytes, the limit is {limit}")]
    TooLong { name: String, length: usize, limit: usize },
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl DefinitionError {
    /// The compiler diagnostic behind this error, if any.
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            Self::Parse { diagnostic, .. } | Self::Resolution { diagnostic, .. } => Some(diagnostic),
            _ => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Parse { name, .. }
            | Self::Resolution { name, .. }
            | Self::NameMismatch { name, .. }
            | Self::SelfTap { name }
            | Self::AlreadyExists { name }
            | Self::NotFound { name }
            | Self::InUse { name, .. }
            | Self::TooLong { name, .. } => name,
            Self::Storage { .. } => "",
        }
    }
}

impl From<StorageError> for DefinitionError {
    fn from(e: StorageError) -> Self {
        DefinitionError::Storage {
            message: e.to_string(),
        }
    }
}
