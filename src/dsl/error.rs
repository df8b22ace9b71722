use std::fmt;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::ast::Span;

/// Which pass produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum ErrorKind {
    Lexical,
    Syntactic,
    Resolution,
}

/// Every problem the compiler can report. Variant names and their codes are
/// stable; the fields are the substitution arguments for the message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DslMessage {
    // Lexical
    UnexpectedCharacter { character: String },
    UnterminatedLiteral,
    // Syntactic
    UnexpectedToken { found: String },
    ExpectedModuleName { found: String },
    ExpectedArgumentName,
    ExpectedEquals { argument: String },
    ExpectedArgumentValue { argument: String },
    ExpectedChannelSegment { found: String },
    ExpectedIndexSegment { found: String },
    ExpectedChannelPrefix { found: String },
    EmptyPipeline,
    DanglingPipe,
    DanglingChannelOperator,
    TapAsSink,
    IndexOnlyOnTaps,
    MultipleIndexes,
    DuplicateLabel { label: String },
    DuplicateArgument { module: String, argument: String },
    JobWithChannels,
    JobWithMultipleModules,
    // Resolution
    UnrecognizedStreamReference { name: String },
    UnrecognizedJobReference { name: String },
    TapIndexOutOfRange { stream: String, index: String, size: usize },
}

impl DslMessage {
    /// Stable message code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnexpectedCharacter { .. } => "XD100E",
            Self::UnterminatedLiteral => "XD101E",
            Self::UnexpectedToken { .. } => "XD110E",
            Self::ExpectedModuleName { .. } => "XD111E",
            Self::ExpectedArgumentName => "XD112E",
            Self::ExpectedEquals { .. } => "XD113E",
            Self::ExpectedArgumentValue { .. } => "XD114E",
            Self::ExpectedChannelSegment { .. } => "XD115E",
            Self::ExpectedIndexSegment { .. } => "XD116E",
            Self::ExpectedChannelPrefix { .. } => "XD117E",
            Self::EmptyPipeline => "XD118E",
            Self::DanglingPipe => "XD119E",
            Self::DanglingChannelOperator => "XD120E",
            Self::TapAsSink => "XD121E",
            Self::IndexOnlyOnTaps => "XD122E",
            Self::MultipleIndexes => "XD123E",
            Self::DuplicateLabel { .. } => "XD124E",
            Self::DuplicateArgument { .. } => "XD125E",
            Self::JobWithChannels => "XD126E",
            Self::JobWithMultipleModules => "XD127E",
            Self::UnrecognizedStreamReference { .. } => "XD140E",
            Self::UnrecognizedJobReference { .. } => "XD141E",
            Self::TapIndexOutOfRange { .. } => "XD142E",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnexpectedCharacter { .. } | Self::UnterminatedLiteral => ErrorKind::Lexical,
            Self::UnrecognizedStreamReference { .. }
            | Self::UnrecognizedJobReference { .. }
            | Self::TapIndexOutOfRange { .. } => ErrorKind::Resolution,
            _ => ErrorKind::Syntactic,
        }
    }

    /// The substitution arguments, in the order the message text uses them.
    pub fn arguments(&self) -> Vec<String> {
        match self {
            Self::UnexpectedCharacter { character } => vec![character.clone()],
            Self::UnexpectedToken { found }
            | Self::ExpectedModuleName { found }
            | Self::ExpectedChannelSegment { found }
            | Self::ExpectedIndexSegment { found }
            | Self::ExpectedChannelPrefix { found } => vec![found.clone()],
            Self::ExpectedEquals { argument } | Self::ExpectedArgumentValue { argument } => {
                vec![argument.clone()]
            }
            Self::DuplicateLabel { label } => vec![label.clone()],
            Self::DuplicateArgument { module, argument } => vec![module.clone(), argument.clone()],
            Self::UnrecognizedStreamReference { name } | Self::UnrecognizedJobReference { name } => {
                vec![name.clone()]
            }
            Self::TapIndexOutOfRange { stream, index, size } => {
                vec![stream.clone(), index.clone(), size.to_string()]
            }
            Self::UnterminatedLiteral
            | Self::ExpectedArgumentName
            | Self::EmptyPipeline
            | Self::DanglingPipe
            | Self::DanglingChannelOperator
            | Self::TapAsSink
            | Self::IndexOnlyOnTaps
            | Self::MultipleIndexes
            | Self::JobWithChannels
            | Self::JobWithMultipleModules => Vec::new(),
        }
    }
}

impl fmt::Display for DslMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedCharacter { character } => {
                write!(f, "Unexpected character '{character}'")
            }
            Self::UnterminatedLiteral => write!(f, "Unterminated quoted literal"),
            Self::UnexpectedToken { found } => write!(f, "Unexpected {found}"),
            Self::ExpectedModuleName { found } => {
                write!(f, "Expected a module name, found {found}")
            }
            Self::ExpectedArgumentName => write!(f, "Expected an argument name after '--'"),
            Self::ExpectedEquals { argument } => {
                write!(f, "Expected '=' after argument name '{argument}'")
            }
            Self::ExpectedArgumentValue { argument } => {
                write!(f, "Expected a value for argument '{argument}'")
            }
            Self::ExpectedChannelSegment { found } => {
                write!(f, "Expected a channel name segment, found {found}")
            }
            Self::ExpectedIndexSegment { found } => {
                write!(f, "Expected a module label or index after '.', found {found}")
            }
            Self::ExpectedChannelPrefix { found } => write!(
                f,
                "Expected a channel (queue:, topic:, stream:, job:) after '>', found {found}"
            ),
            Self::EmptyPipeline => write!(f, "A definition must contain at least one module"),
            Self::DanglingPipe => write!(f, "'|' must have a module on both sides"),
            Self::DanglingChannelOperator => write!(f, "'>' must be followed by a channel"),
            Self::TapAsSink => write!(f, "A tap can only be used as a source channel"),
            Self::IndexOnlyOnTaps => write!(f, "Only tap channels can be indexed"),
            Self::MultipleIndexes => write!(f, "A tap can only be indexed once"),
            Self::DuplicateLabel { label } => write!(
                f,
                "Label '{label}' is used more than once, add a distinct label ('name: module')"
            ),
            Self::DuplicateArgument { module, argument } => {
                write!(f, "Argument '{argument}' is specified more than once for module '{module}'")
            }
            Self::JobWithChannels => write!(f, "A job definition cannot use channels"),
            Self::JobWithMultipleModules => {
                write!(f, "A job definition must consist of exactly one module")
            }
            Self::UnrecognizedStreamReference { name } => {
                write!(f, "Unrecognized stream reference '{name}'")
            }
            Self::UnrecognizedJobReference { name } => {
                write!(f, "Unrecognized job reference '{name}'")
            }
            Self::TapIndexOutOfRange { stream, index, size } => write!(
                f,
                "Tap index {index} is out of range for stream '{stream}' which has {size} modules"
            ),
        }
    }
}

/// A message anchored at a source span. Serializes as a [`DiagnosticReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "DiagnosticReport")]
pub struct Diagnostic {
    pub message: DslMessage,
    pub span: Span,
}

/// The wire form of a diagnostic: everything a caller needs to show it
/// without knowing the message variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DiagnosticReport {
    pub code: String,
    pub kind: ErrorKind,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub arguments: Vec<String>,
}

impl From<Diagnostic> for DiagnosticReport {
    fn from(d: Diagnostic) -> Self {
        d.report()
    }
}

impl Diagnostic {
    pub fn new(message: DslMessage, span: Span) -> Self {
        Self { message, span }
    }

    pub fn code(&self) -> &'static str {
        self.message.code()
    }

    pub fn kind(&self) -> ErrorKind {
        self.message.kind()
    }

    pub fn is_resolution(&self) -> bool {
        self.kind() == ErrorKind::Resolution
    }

    pub fn text(&self) -> String {
        self.message.to_string()
    }

    pub fn start(&self) -> usize {
        self.span.start
    }

    pub fn end(&self) -> usize {
        self.span.end
    }

    pub fn arguments(&self) -> Vec<String> {
        self.message.arguments()
    }

    pub fn report(&self) -> DiagnosticReport {
        DiagnosticReport {
            code: self.code().to_string(),
            kind: self.kind(),
            text: self.text(),
            start: self.start(),
            end: self.end(),
            arguments: self.arguments(),
        }
    }

    /// Format the diagnostic with the offending definition and a caret line.
    pub fn format_with_source(&self, source: &str) -> String {
        let column = source
            .get(..self.span.start.min(source.len()))
            .map_or(self.span.start, |prefix| prefix.chars().count());
        let width = source
            .get(self.span.start..self.span.end.min(source.len()))
            .map_or(1, |s| s.chars().count().max(1));
        format!(
            "{}\n{}\n{}{}",
            self,
            source,
            " ".repeat(column),
            "^".repeat(width),
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:(pos {}): {}", self.code(), self.span.start, self.message)
    }
}

impl std::error::Error for Diagnostic {}
