//! Tap resolution.
//!
//! A tap names another definition and, optionally, a module inside it.
//! Resolution rewrites the reference so its single indexing element is the
//! label of a concrete module:
//!
//! - `tap:main` taps the first module of `main`.
//! - `tap:main.2` taps the module at position 2.
//! - `tap:main.http` already names a label and is left alone.
//!
//! Nodes are never rewritten in place; every function here returns a new node.

use indexmap::IndexMap;
use tracing::debug;

use super::ast::{ChannelNode, ChannelType, StreamNode};
use super::error::{Diagnostic, DslMessage};

/// Read-only view of the definitions a tap can refer to.
pub trait StreamLookupEnvironment {
    fn lookup_stream(&self, name: &str) -> Option<StreamNode>;

    fn lookup_job(&self, _name: &str) -> Option<StreamNode> {
        None
    }
}

/// A plain name → stream map. Jobs are not tracked.
impl StreamLookupEnvironment for IndexMap<String, StreamNode> {
    fn lookup_stream(&self, name: &str) -> Option<StreamNode> {
        self.get(name).cloned()
    }
}

/// How an indexing element is read.
#[derive(Debug, PartialEq, Eq)]
enum TapIndex<'a> {
    Position(usize),
    /// All digits, but too large for `usize`. Never in range.
    Overflow(&'a str),
    Label(&'a str),
}

fn classify(element: &str) -> TapIndex<'_> {
    if element.is_empty() || !element.bytes().all(|b| b.is_ascii_digit()) {
        return TapIndex::Label(element);
    }
    match element.parse::<usize>() {
        Ok(i) => TapIndex::Position(i),
        Err(_) => TapIndex::Overflow(element),
    }
}

/// Resolve one channel reference. Non-tap channels come back unchanged.
pub fn resolve_channel(
    channel: &ChannelNode,
    env: &dyn StreamLookupEnvironment,
) -> Result<ChannelNode, Diagnostic> {
    if !channel.channel_type.is_tap() {
        return Ok(channel.copy_of());
    }
    let target = channel.target_name();

    let position = match channel.indexing_elements.first() {
        None => 0,
        Some(element) => match classify(element) {
            TapIndex::Label(label) => {
                debug!(channel = %channel, label, "tap already names a label");
                return Ok(channel.copy_of());
            }
            TapIndex::Overflow(index) => {
                let referenced = lookup(channel, &target, env)?;
                return Err(out_of_range(channel, &target, index, &referenced));
            }
            TapIndex::Position(i) => i,
        },
    };

    let referenced = lookup(channel, &target, env)?;
    let Some(label) = referenced.label_at(position) else {
        let index = channel
            .indexing_elements
            .first()
            .map_or_else(|| position.to_string(), Clone::clone);
        return Err(out_of_range(channel, &target, &index, &referenced));
    };

    let mut indexing = channel.indexing_elements.clone();
    match indexing.first_mut() {
        Some(first) => *first = label.to_string(),
        None => indexing.push(label.to_string()),
    }
    let resolved = channel.with_indexing(indexing);
    debug!(from = %channel, to = %resolved, "resolved tap");
    Ok(resolved)
}

/// Find the definition a tap refers to, by its tap kind.
fn lookup(
    channel: &ChannelNode,
    target: &str,
    env: &dyn StreamLookupEnvironment,
) -> Result<StreamNode, Diagnostic> {
    let (found, message) = if channel.channel_type == ChannelType::TapJob {
        (
            env.lookup_job(target),
            DslMessage::UnrecognizedJobReference { name: target.to_string() },
        )
    } else {
        (
            env.lookup_stream(target),
            DslMessage::UnrecognizedStreamReference { name: target.to_string() },
        )
    };
    found.ok_or_else(|| Diagnostic::new(message, channel.span))
}

fn out_of_range(
    channel: &ChannelNode,
    target: &str,
    index: &str,
    referenced: &StreamNode,
) -> Diagnostic {
    Diagnostic::new(
        DslMessage::TapIndexOutOfRange {
            stream: target.to_string(),
            index: index.to_string(),
            size: referenced.modules.len(),
        },
        channel.span,
    )
}

/// Resolve every channel of a definition, producing a new node.
pub fn resolve_stream(
    stream: &StreamNode,
    env: &dyn StreamLookupEnvironment,
) -> Result<StreamNode, Diagnostic> {
    let source = stream
        .source
        .as_ref()
        .map(|c| resolve_channel(c, env))
        .transpose()?;
    let sink = stream
        .sink
        .as_ref()
        .map(|c| resolve_channel(c, env))
        .transpose()?;
    Ok(StreamNode {
        source,
        sink,
        ..stream.clone()
    })
}

/// True when every tap in the definition names a label rather than a position.
pub fn is_resolved(stream: &StreamNode) -> bool {
    stream.channels().filter(|c| c.channel_type.is_tap()).all(|c| {
        c.indexing_elements
            .first()
            .is_some_and(|e| matches!(classify(e), TapIndex::Label(_)))
    })
}
