#[allow(
    clippy::wildcard_imports,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod ast;
#[allow(
    clippy::wildcard_imports,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod error;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod lexer;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod parser;
#[allow(
    clippy::wildcard_imports,
    clippy::single_match_else,
    clippy::module_name_repetitions,
)]
pub mod resolve;

use ast::StreamNode;
use error::Diagnostic;

/// Parse one stream definition.
///
/// source → lex → parse → `StreamNode` (unresolved; see [`resolve`]).
pub fn parse_definition(source: &str) -> Result<StreamNode, Diagnostic> {
    let tokens = lexer::lex(source);
    let node = parser::parse(tokens)?;
    tracing::debug!(definition = %node, "parsed");
    Ok(node)
}

/// Parse one job definition: a single module, no channels.
pub fn parse_job_definition(source: &str) -> Result<StreamNode, Diagnostic> {
    parser::parse_job(lexer::lex(source))
}
