use std::fmt;

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::dsl::ast::{ChannelType, StreamNode};
use crate::dsl::resolve::{self, StreamLookupEnvironment};
use crate::dsl::{parse_definition, parse_job_definition};
use crate::error::DefinitionError;

/// Whether a definition describes a long-running stream or a triggered job.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum DefinitionKind {
    #[default]
    Stream,
    Job,
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefinitionKind::Stream => write!(f, "stream"),
            DefinitionKind::Job => write!(f, "job"),
        }
    }
}

/// A named definition: its original text, the parsed tree and, once
/// resolved, the tree with every tap pointing at a module label.
///
/// Values are immutable. [`Definition::resolve`] returns a new definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Definition {
    name: String,
    kind: DefinitionKind,
    text: String,
    parsed: StreamNode,
    resolved: Option<StreamNode>,
}

impl Definition {
    pub fn parse(kind: DefinitionKind, name: &str, text: &str) -> Result<Self, DefinitionError> {
        let parsed = match kind {
            DefinitionKind::Stream => parse_definition(text),
            DefinitionKind::Job => parse_job_definition(text),
        }
        .map_err(|diagnostic| DefinitionError::Parse {
            name: name.to_string(),
            diagnostic,
        })?;

        // a `name =` prefix must agree with the name it is stored under
        if let Some(declared) = parsed.name.as_deref().filter(|d| *d != name) {
            return Err(DefinitionError::NameMismatch {
                name: name.to_string(),
                declared: declared.to_string(),
            });
        }

        Ok(Self {
            name: name.to_string(),
            kind,
            text: text.to_string(),
            parsed,
            resolved: None,
        })
    }

    /// Resolve taps against `env`. Resolving an already resolved definition
    /// starts again from the parsed tree, so it picks up redefined targets.
    pub fn resolve(&self, env: &dyn StreamLookupEnvironment) -> Result<Self, DefinitionError> {
        let resolved =
            resolve::resolve_stream(&self.parsed, env).map_err(|diagnostic| {
                DefinitionError::Resolution {
                    name: self.name.clone(),
                    diagnostic,
                }
            })?;
        Ok(Self {
            resolved: Some(resolved),
            ..self.clone()
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DefinitionKind {
        self.kind
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// The tree as written, taps unresolved.
    pub fn parsed(&self) -> &StreamNode {
        &self.parsed
    }

    /// The resolved tree when available, otherwise the parsed one.
    pub fn ast(&self) -> &StreamNode {
        self.resolved.as_ref().unwrap_or(&self.parsed)
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }

    pub fn source_channel_type(&self) -> Option<ChannelType> {
        self.ast().source.as_ref().map(|c| c.channel_type)
    }

    pub fn sink_channel_type(&self) -> Option<ChannelType> {
        self.ast().sink.as_ref().map(|c| c.channel_type)
    }

    /// Arguments of the module with the given label, in written order.
    pub fn arguments(&self, label: &str) -> Option<IndexMap<String, String>> {
        self.ast().module_by_label(label).map(|m| {
            m.arguments
                .iter()
                .map(|a| (a.name.clone(), a.value.clone()))
                .collect()
        })
    }

    /// The definition a source tap reads from, with its kind.
    pub fn tap_target(&self) -> Option<(DefinitionKind, String)> {
        let source = self.parsed.source.as_ref()?;
        match source.channel_type {
            ChannelType::TapStream => Some((DefinitionKind::Stream, source.target_name())),
            ChannelType::TapJob => Some((DefinitionKind::Job, source.target_name())),
            _ => None,
        }
    }

    pub fn stringify(&self, include_positions: bool) -> String {
        self.ast().stringify(include_positions)
    }
}

impl fmt::Display for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // the tree already carries the name when the text declared it
        if self.ast().name.is_some() {
            f.write_str(&self.stringify(false))
        } else {
            write!(f, "{} = {}", self.name, self.stringify(false))
        }
    }
}
