use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use stream_dsl::dsl::{self, lexer};
use stream_dsl::manifest::Manifest;
use stream_dsl::settings::{self, DslSettings};
use stream_dsl::{DefinitionError, DefinitionKind, DefinitionRegistry};

// ── CLI argument parsing ─────────────────────────────────────────

#[derive(Parser)]
#[command(name = "stream-dsl", about = "Stream and job definition compiler", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (default: $STREAM_DSL_CONFIG, then ./stream-dsl.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output raw JSON instead of formatted text
    #[arg(long, global = true)]
    json: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the token stream of a definition
    Tokens { text: String },
    /// Parse a definition and print its tree
    Parse {
        text: String,
        /// Annotate every node with its source span
        #[arg(long)]
        positions: bool,
        #[arg(long, value_enum, default_value_t = Kind::Stream)]
        kind: Kind,
    },
    /// Deploy every definition of a manifest and report failures
    Check {
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
    /// Resolve a definition against the definitions of a manifest
    Resolve {
        text: String,
        #[arg(long)]
        manifest: Option<PathBuf>,
        /// Name of the definition (default: its `name =` prefix)
        #[arg(long)]
        name: Option<String>,
        #[arg(long, value_enum, default_value_t = Kind::Stream)]
        kind: Kind,
        #[arg(long)]
        positions: bool,
    },
    /// Print the JSON schema of the settings or manifest file
    Schema {
        #[arg(value_enum, default_value_t = SchemaTarget::Settings)]
        target: SchemaTarget,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Stream,
    Job,
}

impl From<Kind> for DefinitionKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Stream => DefinitionKind::Stream,
            Kind::Job => DefinitionKind::Job,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SchemaTarget {
    Settings,
    Manifest,
}

/// Exit code for definitions that do not compile or resolve.
const EXIT_INVALID: i32 = 1;
/// Exit code for unreadable settings or manifests.
const EXIT_IO: i32 = 2;

// ── Setup ────────────────────────────────────────────────────────

fn settings_file(config: Option<&Path>) -> PathBuf {
    config.map(Path::to_path_buf).unwrap_or_else(|| {
        std::env::var_os(stream_dsl::paths::CONFIG_ENV).map_or_else(
            || stream_dsl::paths::settings_path(Path::new(".")),
            PathBuf::from,
        )
    })
}

fn init_tracing(verbose: u8, settings: &DslSettings) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&settings.log_filter))
            .unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn fail(code: i32, message: &str) -> ! {
    eprintln!("Error: {message}");
    process::exit(code);
}

fn load_registry(manifest: Option<&Path>, settings: &DslSettings) -> (DefinitionRegistry, Vec<DefinitionError>) {
    let registry = DefinitionRegistry::with_settings(settings);
    let path = manifest.or(settings.default_manifest.as_deref());
    let Some(path) = path else {
        return (registry, Vec::new());
    };
    let manifest = Manifest::load(path)
        .unwrap_or_else(|e| fail(EXIT_IO, &format!("{}: {e}", path.display())));
    let errors = manifest.deploy_into(&registry);
    (registry, errors)
}

// ── Output formatting ────────────────────────────────────────────

fn print_json<T: Serialize>(value: &T) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

fn report_error(error: &DefinitionError, text: Option<&str>, raw_json: bool) {
    if raw_json {
        print_json(&json!({ "error": error }));
        return;
    }
    match (error.diagnostic(), text) {
        (Some(diagnostic), Some(text)) => {
            eprintln!("{}: {}", error.name(), diagnostic.format_with_source(text));
        }
        _ => eprintln!("{error}"),
    }
}

// ── Commands ─────────────────────────────────────────────────────

fn run_tokens(text: &str, raw_json: bool) {
    let tokens = lexer::lex(text);
    if raw_json {
        let list: Vec<_> = tokens
            .iter()
            .map(|t| json!({ "token": t.token.to_string(), "span": t.span }))
            .collect();
        print_json(&list);
        return;
    }
    for t in &tokens {
        println!("{:>4}..{:<4} {}", t.span.start, t.span.end, t.token);
    }
}

fn run_parse(text: &str, positions: bool, kind: DefinitionKind, raw_json: bool) -> i32 {
    let parsed = match kind {
        DefinitionKind::Stream => dsl::parse_definition(text),
        DefinitionKind::Job => dsl::parse_job_definition(text),
    };
    match parsed {
        Ok(node) if raw_json => {
            print_json(&node);
            0
        }
        Ok(node) => {
            println!("{}", node.stringify(positions));
            0
        }
        Err(diagnostic) if raw_json => {
            print_json(&json!({ "error": diagnostic }));
            EXIT_INVALID
        }
        Err(diagnostic) => {
            eprintln!("{}", diagnostic.format_with_source(text));
            EXIT_INVALID
        }
    }
}

fn run_check(manifest: Option<&Path>, settings: &DslSettings, raw_json: bool) -> i32 {
    if manifest.is_none() && settings.default_manifest.is_none() {
        fail(EXIT_IO, "no manifest given and no default_manifest configured");
    }
    let (registry, errors) = load_registry(manifest, settings);
    if raw_json {
        print_json(&json!({ "deployed": registry.names(), "errors": errors }));
    } else {
        for name in registry.names() {
            println!("ok    {name}");
        }
        for error in &errors {
            println!("FAIL  {error}");
        }
    }
    if errors.is_empty() {
        0
    } else {
        EXIT_INVALID
    }
}

fn run_resolve(
    text: &str,
    name: Option<&str>,
    kind: DefinitionKind,
    positions: bool,
    registry: &DefinitionRegistry,
    raw_json: bool,
) -> i32 {
    // fall back to the definition's own `name =` prefix
    let name = name.map(str::to_string).or_else(|| {
        dsl::parse_definition(text).ok().and_then(|node| node.name)
    });
    let name = name.as_deref().unwrap_or("definition");

    match registry.stage(kind, name, text) {
        Ok(definition) if raw_json => {
            print_json(&definition);
            0
        }
        Ok(definition) => {
            println!("{}", definition.stringify(positions));
            0
        }
        Err(e) => {
            report_error(&e, Some(text), raw_json);
            EXIT_INVALID
        }
    }
}

fn run_schema(target: SchemaTarget) {
    match target {
        SchemaTarget::Settings => print_json(&DslSettings::schema()),
        SchemaTarget::Manifest => print_json(&schemars::schema_for!(Manifest)),
    }
}

fn main() {
    let cli = Cli::parse();

    let settings_path = settings_file(cli.config.as_deref());
    let settings = settings::load_settings(&settings_path)
        .unwrap_or_else(|e| fail(EXIT_IO, &e.to_string()));
    init_tracing(cli.verbose, &settings);
    tracing::debug!(path = %settings_path.display(), "settings loaded");

    let raw = cli.json;
    let code = match &cli.command {
        Commands::Tokens { text } => {
            run_tokens(text, raw);
            0
        }
        Commands::Parse {
            text,
            positions,
            kind,
        } => run_parse(text, *positions, (*kind).into(), raw),
        Commands::Check { manifest } => run_check(manifest.as_deref(), &settings, raw),
        Commands::Resolve {
            text,
            manifest,
            name,
            kind,
            positions,
        } => {
            let (registry, errors) = load_registry(manifest.as_deref(), &settings);
            for error in &errors {
                tracing::warn!(%error, "manifest entry not deployed");
            }
            run_resolve(text, name.as_deref(), (*kind).into(), *positions, &registry, raw)
        }
        Commands::Schema { target } => {
            run_schema(*target);
            0
        }
    };
    process::exit(code);
}
