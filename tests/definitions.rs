//! End-to-end: text in, resolved definitions and diagnostics out.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use indexmap::IndexMap;

use stream_dsl::dsl::ast::{ChannelType, StreamNode};
use stream_dsl::dsl::error::{DslMessage, ErrorKind};
use stream_dsl::dsl::resolve::{resolve_channel, resolve_stream};
use stream_dsl::dsl::parse_definition;
use stream_dsl::manifest::Manifest;
use stream_dsl::settings::{load_settings, save_settings, DslSettings};
use stream_dsl::{Definition, DefinitionError, DefinitionKind, DefinitionRegistry};

fn env() -> IndexMap<String, StreamNode> {
    let mut env = IndexMap::new();
    env.insert("main".to_string(), parse_definition("http | transform | file").unwrap());
    env
}

fn tap(text: &str) -> stream_dsl::dsl::ast::ChannelNode {
    parse_definition(text).unwrap().source.unwrap()
}

#[test]
fn default_tap_resolves_to_first_module() {
    let resolved = resolve_channel(&tap("tap:main > log"), &env()).unwrap();
    assert_eq!(resolved.indexing_elements, vec!["http"]);
}

#[test]
fn positional_tap_resolves_to_label() {
    let resolved = resolve_channel(&tap("tap:main.2 > log"), &env()).unwrap();
    assert_eq!(resolved.indexing_elements, vec!["file"]);
}

#[test]
fn positional_tap_out_of_range() {
    let err = resolve_channel(&tap("tap:main.9 > log"), &env()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Resolution);
    assert_eq!(err.code(), "XD142E");
    assert_eq!(err.arguments(), vec!["main", "9", "3"]);
}

#[test]
fn unknown_stream_is_reported_with_its_name() {
    let err = resolve_channel(&tap("tap:doesnotexist > log"), &env()).unwrap_err();
    assert_eq!(
        err.message,
        DslMessage::UnrecognizedStreamReference { name: "doesnotexist".into() }
    );
    assert_eq!(err.arguments(), vec!["doesnotexist"]);
}

#[test]
fn label_index_skips_lookup() {
    let channel = tap("tap:main.http > log");
    assert_eq!(resolve_channel(&channel, &env()).unwrap(), channel);
}

#[test]
fn resolving_twice_changes_nothing() {
    let stream = parse_definition("tap:main.1 > log").unwrap();
    let once = resolve_stream(&stream, &env()).unwrap();
    let twice = resolve_stream(&once, &env()).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn module_offsets_are_exact() {
    let stream = parse_definition("http | file").unwrap();
    assert_eq!(stream.modules[1].span.start, 7);
    assert_eq!(stream.modules[1].span.end, 11);
}

#[test]
fn bare_tap_is_not_a_definition() {
    let err = parse_definition("tap:main").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Syntactic);
    assert_eq!(err.message, DslMessage::EmptyPipeline);
}

#[test]
fn copies_never_alias() {
    let original = tap("tap:main.2 > log");
    let copy = original.copy_of();
    let resolved = resolve_channel(&copy, &env()).unwrap();
    assert_eq!(original.indexing_elements, vec!["2"]);
    assert_eq!(copy.indexing_elements, vec!["2"]);
    assert_eq!(resolved.indexing_elements, vec!["file"]);
}

#[test]
fn positions_dump() {
    let stream = parse_definition("tap:main.http > file").unwrap();
    assert_eq!(stream.stringify(true), "(tap:stream:main.http:0>13)>(file:16>20)");
}

#[test]
fn tap_channel_names() {
    assert_eq!(tap("tap:main.http > log").channel_name(), "tap:main.http");
    assert_eq!(tap("tap:stream:main > log").channel_name(), "tap:main");
    assert_eq!(tap("queue:orders > log").channel_name(), "orders");
}

#[test]
fn facade_exposes_channel_types() {
    let def = Definition::parse(
        DefinitionKind::Stream,
        "orders",
        "queue:orders > t: transform --expression='payload.total' > topic:totals",
    )
    .unwrap();
    assert_eq!(def.source_channel_type(), Some(ChannelType::Queue));
    assert_eq!(def.sink_channel_type(), Some(ChannelType::Topic));
    assert_eq!(def.arguments("t").unwrap()["expression"], "payload.total");
    assert_eq!(def.tap_target(), None);
}

#[test]
fn independent_definitions_fail_independently() {
    let registry = DefinitionRegistry::new();
    let results: Vec<Result<_, DefinitionError>> = [
        ("a", "http | file"),
        ("b", "http | | file"),
        ("c", "tap:a.1 > log"),
        ("d", "tap:a.5 > log"),
    ]
    .iter()
    .map(|(name, text)| registry.deploy(DefinitionKind::Stream, name, text))
    .collect();

    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(DefinitionError::Parse { .. })));
    assert!(results[2].is_ok());
    assert!(matches!(results[3], Err(DefinitionError::Resolution { .. })));
    assert_eq!(registry.names(), vec!["a", "c"]);
}

#[test]
fn manifest_and_settings_drive_a_registry() {
    let dir = tempfile::tempdir().unwrap();

    let settings_path = dir.path().join("stream-dsl.json");
    let settings = DslSettings {
        max_definition_length: Some(64),
        ..DslSettings::default()
    };
    save_settings(&settings_path, &settings).unwrap();
    let settings = load_settings(&settings_path).unwrap();

    let manifest_path = dir.path().join("definitions.json");
    let mut manifest = Manifest::default();
    manifest.push(DefinitionKind::Stream, "main", "http | transform | file");
    manifest.push(DefinitionKind::Stream, "audit", "tap:main.1 > log");
    manifest.push(
        DefinitionKind::Stream,
        "verbose",
        "http --a=aaaaaaaaaa --b=bbbbbbbbbb --c=cccccccccc --d=dddddddddd | file",
    );
    manifest.save(&manifest_path).unwrap();

    let registry = DefinitionRegistry::with_settings(&settings);
    let errors = Manifest::load(&manifest_path).unwrap().deploy_into(&registry);
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], DefinitionError::TooLong { .. }));

    let audit = registry.get("audit").unwrap();
    assert_eq!(audit.stringify(false), "tap:stream:main.transform > log");
}
