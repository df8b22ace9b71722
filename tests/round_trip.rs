//! Property tests: rendering a tree and parsing it back keeps its meaning.

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;

use stream_dsl::dsl::ast::*;
use stream_dsl::dsl::parse_definition;

fn ident() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,6}"
}

fn module_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,5}(-[a-z0-9]{1,3})?"
}

/// Printable ASCII, so quoting and bare values both get exercised.
fn value() -> impl Strategy<Value = String> {
    "[ -~]{0,12}"
}

fn arguments() -> impl Strategy<Value = Vec<ArgumentNode>> {
    prop::collection::vec(value(), 0..4).prop_map(|values| {
        values
            .into_iter()
            .enumerate()
            .map(|(i, value)| ArgumentNode {
                name: format!("arg{i}"),
                value,
                span: Span::default(),
            })
            .collect()
    })
}

fn modules() -> impl Strategy<Value = Vec<ModuleNode>> {
    prop::collection::vec((module_name(), arguments()), 1..5).prop_map(|specs| {
        let mut seen = Vec::new();
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (name, arguments))| {
                // repeated names need a label to stay distinct
                let label = seen.contains(&name).then(|| format!("l_{i}"));
                seen.push(name.clone());
                ModuleNode {
                    name,
                    label,
                    arguments,
                    span: Span::default(),
                }
            })
            .collect()
    })
}

fn channel(kinds: &'static [ChannelType]) -> impl Strategy<Value = ChannelNode> {
    (
        prop::sample::select(kinds),
        prop::collection::vec(ident(), 1..3),
        prop::option::of(prop_oneof![ident(), "[0-9]{1,3}"]),
    )
        .prop_map(|(channel_type, name_components, index)| {
            let indexing = if channel_type.is_tap() {
                index.into_iter().collect()
            } else {
                Vec::new()
            };
            ChannelNode::new(channel_type, name_components, indexing, Span::default())
        })
}

const SOURCES: &[ChannelType] = &[
    ChannelType::Queue,
    ChannelType::Topic,
    ChannelType::Stream,
    ChannelType::Job,
    ChannelType::TapStream,
    ChannelType::TapJob,
];

const SINKS: &[ChannelType] = &[
    ChannelType::Queue,
    ChannelType::Topic,
    ChannelType::Stream,
    ChannelType::Job,
];

fn stream() -> impl Strategy<Value = StreamNode> {
    (
        prop::option::of(ident()),
        prop::option::of(channel(SOURCES)),
        modules(),
        prop::option::of(channel(SINKS)),
    )
        .prop_map(|(name, source, modules, sink)| StreamNode {
            name,
            source,
            modules,
            sink,
            span: Span::default(),
        })
}

proptest! {
    #[test]
    fn stringify_then_parse_is_semantically_equal(node in stream()) {
        let text = node.stringify(false);
        let reparsed = parse_definition(&text)
            .map_err(|d| TestCaseError::fail(d.format_with_source(&text)))?;
        prop_assert!(
            node.semantically_eq(&reparsed),
            "{text}\n{node:?}\n{reparsed:?}"
        );
        // and the canonical text is a fixed point
        prop_assert_eq!(reparsed.stringify(false), text);
    }

    #[test]
    fn children_lie_inside_parents(node in stream()) {
        let text = node.stringify(false);
        let parsed = parse_definition(&text).unwrap();
        prop_assert!(parsed.span.end <= text.len());
        for module in &parsed.modules {
            prop_assert!(parsed.span.encloses(module.span));
            for arg in &module.arguments {
                prop_assert!(module.span.encloses(arg.span));
            }
        }
        for channel in parsed.channels() {
            prop_assert!(parsed.span.encloses(channel.span));
        }
    }

    #[test]
    fn arbitrary_text_never_panics(text in "\\PC{0,40}") {
        match parse_definition(&text) {
            Ok(node) => prop_assert!(node.span.end <= text.len()),
            Err(diagnostic) => {
                prop_assert!(diagnostic.start() <= diagnostic.end());
                prop_assert!(diagnostic.end() <= text.len());
            }
        }
    }
}
