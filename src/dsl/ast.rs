//! AST node types for the stream definition language.
//!
//! Nodes are immutable values. Resolution produces new nodes instead of
//! rewriting shared lists in place.

use std::fmt::{self, Write};

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Source span for error reporting, as half-open byte offsets `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn encloses(self, other: Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

// ── Channels ─────────────────────────────────────────────────────

/// The kind of conduit a channel reference names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelType {
    Stream,
    Job,
    TapStream,
    TapJob,
    Queue,
    Topic,
}

impl ChannelType {
    /// Textual prefix used when rendering a channel of this type.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Stream => "stream:",
            Self::Job => "job:",
            Self::TapStream => "tap:stream:",
            Self::TapJob => "tap:job:",
            Self::Queue => "queue:",
            Self::Topic => "topic:",
        }
    }

    pub fn is_tap(self) -> bool {
        matches!(self, Self::TapStream | Self::TapJob)
    }

    /// For tap types, the segment that may echo the tapped definition kind
    /// (`stream` in `tap:stream:foo`).
    pub fn tap_echo(self) -> Option<&'static str> {
        match self {
            Self::TapStream => Some("stream"),
            Self::TapJob => Some("job"),
            _ => None,
        }
    }

    /// Map a leading channel keyword to its (non-tap) type. `tap` is handled
    /// by the parser since it needs the following segment.
    pub fn from_keyword(word: &str) -> Option<ChannelType> {
        match word {
            "queue" => Some(Self::Queue),
            "topic" => Some(Self::Topic),
            "stream" => Some(Self::Stream),
            "job" => Some(Self::Job),
            _ => None,
        }
    }
}

/// Words that open a channel reference when followed by `:`.
pub const CHANNEL_KEYWORDS: &[&str] = &["queue", "topic", "stream", "job", "tap"];

/// `queue:orders`, `tap:stream:main.2`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelNode {
    pub channel_type: ChannelType,
    pub name_components: Vec<String>,
    pub indexing_elements: Vec<String>,
    pub span: Span,
}

impl ChannelNode {
    pub fn new(
        channel_type: ChannelType,
        name_components: Vec<String>,
        indexing_elements: Vec<String>,
        span: Span,
    ) -> Self {
        Self {
            channel_type,
            name_components,
            indexing_elements,
            span,
        }
    }

    /// Name components with a leading tap echo (`stream`/`job`) removed.
    pub fn target_components(&self) -> &[String] {
        match (self.channel_type.tap_echo(), self.name_components.split_first()) {
            (Some(echo), Some((first, rest))) if first.eq_ignore_ascii_case(echo) && !rest.is_empty() => {
                rest
            }
            _ => &self.name_components,
        }
    }

    /// Target components joined by `:`.
    pub fn target_name(&self) -> String {
        self.target_components().join(":")
    }

    /// Name of the tapped stream. Only defined for `TapStream` channels.
    pub fn stream_name(&self) -> Option<String> {
        (self.channel_type == ChannelType::TapStream).then(|| self.target_name())
    }

    /// Name of the tapped job. Only defined for `TapJob` channels.
    pub fn job_name(&self) -> Option<String> {
        (self.channel_type == ChannelType::TapJob).then(|| self.target_name())
    }

    /// Name the channel is known by on the bus: `tap:` + target for stream
    /// taps, `tap:job:` + target for job taps, the bare name otherwise,
    /// followed by any `.index` elements.
    pub fn channel_name(&self) -> String {
        let mut s = match self.channel_type {
            ChannelType::TapStream => String::from("tap:"),
            ChannelType::TapJob => String::from("tap:job:"),
            _ => String::new(),
        };
        s.push_str(&self.target_name());
        self.push_indexing(&mut s);
        s
    }

    /// Fully qualified reference as written in a definition: type prefix,
    /// target, then `.index` elements. Parses back to the same channel.
    pub fn qualified_name(&self) -> String {
        let mut s = String::from(self.channel_type.prefix());
        s.push_str(&self.target_name());
        self.push_indexing(&mut s);
        s
    }

    fn push_indexing(&self, s: &mut String) {
        for element in &self.indexing_elements {
            s.push('.');
            s.push_str(element);
        }
    }

    /// An independent duplicate. Lists are cloned, never shared.
    pub fn copy_of(&self) -> ChannelNode {
        self.clone()
    }

    /// Functional update of the indexing elements.
    pub fn with_indexing(&self, indexing_elements: Vec<String>) -> ChannelNode {
        ChannelNode {
            indexing_elements,
            ..self.clone()
        }
    }

    pub fn stringify(&self, include_positions: bool) -> String {
        if include_positions {
            format!("({}:{}>{})", self.qualified_name(), self.span.start, self.span.end)
        } else {
            self.qualified_name()
        }
    }

    pub fn semantically_eq(&self, other: &ChannelNode) -> bool {
        self.channel_type == other.channel_type
            && self.target_components() == other.target_components()
            && self.indexing_elements == other.indexing_elements
    }
}

impl fmt::Display for ChannelNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name())
    }
}

// ── Modules ──────────────────────────────────────────────────────

/// `--name=value`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentNode {
    pub name: String,
    pub value: String,
    pub span: Span,
}

impl ArgumentNode {
    pub fn stringify(&self, include_positions: bool) -> String {
        let mut s = format!("--{}={}", self.name, quote_value(&self.value));
        if include_positions {
            let _ = write!(s, ":{}>{}", self.span.start, self.span.end);
        }
        s
    }
}

/// `t1: transform --expression=payload`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleNode {
    pub name: String,
    pub label: Option<String>,
    pub arguments: Vec<ArgumentNode>,
    pub span: Span,
}

impl ModuleNode {
    /// The label taps resolve to: the explicit label, else the module name.
    pub fn label_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    pub fn argument(&self, name: &str) -> Option<&str> {
        self.arguments
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn stringify(&self, include_positions: bool) -> String {
        let mut s = String::new();
        if include_positions {
            s.push('(');
        }
        if let Some(label) = &self.label {
            let _ = write!(s, "{label}: ");
        }
        s.push_str(&self.name);
        if include_positions {
            let _ = write!(s, ":{}>{}", self.span.start, self.span.end);
        }
        for arg in &self.arguments {
            s.push(' ');
            s.push_str(&arg.stringify(false));
        }
        if include_positions {
            s.push(')');
        }
        s
    }

    pub fn semantically_eq(&self, other: &ModuleNode) -> bool {
        self.name == other.name
            && self.label == other.label
            && self.arguments.len() == other.arguments.len()
            && self
                .arguments
                .iter()
                .zip(&other.arguments)
                .all(|(a, b)| a.name == b.name && a.value == b.value)
    }
}

// ── Definition root ──────────────────────────────────────────────

/// One parsed definition: `[name =] [source >] m1 | m2 | ... [> sink]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamNode {
    pub name: Option<String>,
    pub source: Option<ChannelNode>,
    pub modules: Vec<ModuleNode>,
    pub sink: Option<ChannelNode>,
    pub span: Span,
}

impl StreamNode {
    pub fn module_by_label(&self, label: &str) -> Option<&ModuleNode> {
        self.modules.iter().find(|m| m.label_name() == label)
    }

    /// Label of the module at `index` in the pipeline.
    pub fn label_at(&self, index: usize) -> Option<&str> {
        self.modules.get(index).map(ModuleNode::label_name)
    }

    pub fn first_label(&self) -> Option<&str> {
        self.label_at(0)
    }

    /// Every channel reference in the definition, source first.
    pub fn channels(&self) -> impl Iterator<Item = &ChannelNode> {
        self.source.iter().chain(self.sink.iter())
    }

    pub fn stringify(&self, include_positions: bool) -> String {
        let mut s = String::new();
        if let Some(name) = &self.name {
            let _ = write!(s, "{name} = ");
        }
        let (pipe, arrow) = if include_positions {
            ("|", ">")
        } else {
            (" | ", " > ")
        };
        if let Some(source) = &self.source {
            s.push_str(&source.stringify(include_positions));
            s.push_str(arrow);
        }
        let modules: Vec<String> = self
            .modules
            .iter()
            .map(|m| m.stringify(include_positions))
            .collect();
        s.push_str(&modules.join(pipe));
        if let Some(sink) = &self.sink {
            s.push_str(arrow);
            s.push_str(&sink.stringify(include_positions));
        }
        s
    }

    /// Equality over everything except source positions and tap echo segments.
    pub fn semantically_eq(&self, other: &StreamNode) -> bool {
        fn channel_eq(a: Option<&ChannelNode>, b: Option<&ChannelNode>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => a.semantically_eq(b),
                (None, None) => true,
                _ => false,
            }
        }
        self.name == other.name
            && channel_eq(self.source.as_ref(), other.source.as_ref())
            && channel_eq(self.sink.as_ref(), other.sink.as_ref())
            && self.modules.len() == other.modules.len()
            && self
                .modules
                .iter()
                .zip(&other.modules)
                .all(|(a, b)| a.semantically_eq(b))
    }
}

impl fmt::Display for StreamNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stringify(false))
    }
}

/// Render an argument value so the lexer reads it back unchanged. Values
/// that a bare value cannot carry are single-quoted, inner quotes doubled.
pub fn quote_value(value: &str) -> String {
    let bare = !value.is_empty()
        && !value.starts_with('\'')
        && !value.starts_with('"')
        && !value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '|' | ';'));
    if bare {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "''"))
    }
}
