use std::collections::HashSet;

use super::ast::*;
use super::error::{Diagnostic, DslMessage};
use super::lexer::{SpannedToken, Token};

/// Parse a stream definition. Stops at the first problem: one definition,
/// one outcome.
pub fn parse(tokens: Vec<SpannedToken>) -> Result<StreamNode, Diagnostic> {
    let mut parser = Parser::new(tokens);
    parser.parse_definition()
}

/// Parse a job definition: a single module with arguments and no channels.
pub fn parse_job(tokens: Vec<SpannedToken>) -> Result<StreamNode, Diagnostic> {
    let node = parse(tokens)?;
    if let Some(channel) = node.channels().next() {
        return Err(Diagnostic::new(DslMessage::JobWithChannels, channel.span));
    }
    if let Some(extra) = node.modules.get(1) {
        return Err(Diagnostic::new(DslMessage::JobWithMultipleModules, extra.span));
    }
    Ok(node)
}

struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<SpannedToken>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn parse_definition(&mut self) -> Result<StreamNode, Diagnostic> {
        let start = self.span();

        // name = ...
        let name = if matches!(self.peek(), Token::Ident(_)) && self.peek_at(1) == &Token::Eq {
            let (name, _) = self.expect_ident(|found| DslMessage::UnexpectedToken { found })?;
            self.advance();
            Some(name)
        } else {
            None
        };

        let source = if self.at_channel_prefix() {
            let channel = self.parse_channel()?;
            match self.peek() {
                Token::Gt => {
                    self.advance();
                }
                Token::Eof => return Err(self.error(DslMessage::EmptyPipeline)),
                _ => return Err(self.unexpected()),
            }
            Some(channel)
        } else {
            None
        };

        match self.peek() {
            Token::Eof => return Err(self.error(DslMessage::EmptyPipeline)),
            Token::Pipe => return Err(self.error(DslMessage::DanglingPipe)),
            _ => {}
        }

        let mut modules = vec![self.parse_module()?];
        while matches!(self.peek(), Token::Pipe) {
            let pipe = self.span();
            self.advance();
            if matches!(self.peek(), Token::Eof | Token::Pipe | Token::Gt) {
                return Err(Diagnostic::new(DslMessage::DanglingPipe, pipe));
            }
            modules.push(self.parse_module()?);
        }

        let sink = if matches!(self.peek(), Token::Gt) {
            let arrow = self.span();
            self.advance();
            if self.at_eof() {
                return Err(Diagnostic::new(DslMessage::DanglingChannelOperator, arrow));
            }
            if !self.at_channel_prefix() {
                return Err(self.lexical_or(|found| DslMessage::ExpectedChannelPrefix { found }));
            }
            let channel = self.parse_channel()?;
            if channel.channel_type.is_tap() {
                return Err(Diagnostic::new(DslMessage::TapAsSink, channel.span));
            }
            Some(channel)
        } else {
            None
        };

        if !self.at_eof() {
            return Err(self.unexpected());
        }

        check_unique_labels(&modules)?;

        let end = self.previous_span();
        Ok(StreamNode {
            name,
            source,
            modules,
            sink,
            span: start.merge(end),
        })
    }

    // ── Helpers ────────────────────────────────────────────────────

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.pos + offset)
            .map_or(&Token::Eof, |t| &t.token)
    }

    fn span(&self) -> Span {
        self.tokens.get(self.pos).map_or_else(
            || self.tokens.last().map_or(Span::default(), |t| t.span),
            |t| t.span,
        )
    }

    /// Span of the last consumed token.
    fn previous_span(&self) -> Span {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(Span::default(), |t| t.span)
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    /// A channel keyword directly followed by `:`.
    fn at_channel_prefix(&self) -> bool {
        matches!(self.peek(), Token::Ident(word) if CHANNEL_KEYWORDS.contains(&word.as_str()))
            && self.peek_at(1) == &Token::Colon
    }

    fn error(&self, message: DslMessage) -> Diagnostic {
        Diagnostic::new(message, self.span())
    }

    /// Report the current token, preferring a lexical diagnostic when the
    /// token is itself a lexing problem.
    fn lexical_or(&self, make: impl FnOnce(String) -> DslMessage) -> Diagnostic {
        let message = match self.peek() {
            Token::Unknown(c) => DslMessage::UnexpectedCharacter {
                character: c.to_string(),
            },
            Token::Unterminated(_) => DslMessage::UnterminatedLiteral,
            other => make(other.to_string()),
        };
        self.error(message)
    }

    fn unexpected(&self) -> Diagnostic {
        self.lexical_or(|found| DslMessage::UnexpectedToken { found })
    }

    fn expect_ident(
        &mut self,
        make: impl FnOnce(String) -> DslMessage,
    ) -> Result<(String, Span), Diagnostic> {
        if let Token::Ident(name) = self.peek().clone() {
            let sp = self.span();
            self.advance();
            Ok((name, sp))
        } else {
            Err(self.lexical_or(make))
        }
    }

    /// A channel name or index segment: identifier or number.
    fn expect_segment(
        &mut self,
        make: impl FnOnce(String) -> DslMessage,
    ) -> Result<String, Diagnostic> {
        match self.peek().clone() {
            Token::Ident(s) | Token::Number(s) => {
                self.advance();
                Ok(s)
            }
            _ => Err(self.lexical_or(make)),
        }
    }

    // ── Channels ───────────────────────────────────────────────────

    fn parse_channel(&mut self) -> Result<ChannelNode, Diagnostic> {
        let (keyword, start) = self.expect_ident(|found| DslMessage::UnexpectedToken { found })?;
        // at_channel_prefix guarantees the colon
        self.advance();

        let mut name_components =
            vec![self.expect_segment(|found| DslMessage::ExpectedChannelSegment { found })?];
        while matches!(self.peek(), Token::Colon) {
            self.advance();
            name_components
                .push(self.expect_segment(|found| DslMessage::ExpectedChannelSegment { found })?);
        }

        let channel_type = if keyword == "tap" {
            match name_components.as_slice() {
                [echo, _, ..] if echo.eq_ignore_ascii_case("job") => ChannelType::TapJob,
                _ => ChannelType::TapStream,
            }
        } else {
            ChannelType::from_keyword(&keyword)
                .ok_or_else(|| Diagnostic::new(DslMessage::UnexpectedToken { found: keyword.clone() }, start))?
        };

        let mut indexing_elements = Vec::new();
        let mut first_dot = None;
        while matches!(self.peek(), Token::Dot) {
            first_dot.get_or_insert(self.span());
            self.advance();
            indexing_elements
                .push(self.expect_segment(|found| DslMessage::ExpectedIndexSegment { found })?);
        }

        let span = start.merge(self.previous_span());
        if let Some(dot) = first_dot {
            if !channel_type.is_tap() {
                return Err(Diagnostic::new(DslMessage::IndexOnlyOnTaps, dot));
            }
            if indexing_elements.len() > 1 {
                return Err(Diagnostic::new(DslMessage::MultipleIndexes, span));
            }
        }

        Ok(ChannelNode::new(channel_type, name_components, indexing_elements, span))
    }

    // ── Modules ────────────────────────────────────────────────────

    fn parse_module(&mut self) -> Result<ModuleNode, Diagnostic> {
        let start = self.span();

        // label: module
        let label = match self.peek() {
            Token::Ident(word) if self.peek_at(1) == &Token::Colon => {
                if CHANNEL_KEYWORDS.contains(&word.as_str()) {
                    let found = format!("channel '{word}:'");
                    return Err(self.error(DslMessage::ExpectedModuleName { found }));
                }
                let word = word.clone();
                self.advance();
                self.advance();
                Some(word)
            }
            _ => None,
        };

        let (name, _) = self.expect_ident(|found| DslMessage::ExpectedModuleName { found })?;

        let mut arguments: Vec<ArgumentNode> = Vec::new();
        while let Token::OptionFlag(argument) = self.peek().clone() {
            let flag = self.span();
            self.advance();
            if argument.is_empty() {
                return Err(Diagnostic::new(DslMessage::ExpectedArgumentName, flag));
            }
            if !matches!(self.peek(), Token::Eq) {
                return Err(self.lexical_or(|_| DslMessage::ExpectedEquals {
                    argument: argument.clone(),
                }));
            }
            self.advance();
            let value = match self.peek().clone() {
                Token::Literal(v) => {
                    self.advance();
                    v
                }
                _ => {
                    return Err(self.lexical_or(|_| DslMessage::ExpectedArgumentValue {
                        argument: argument.clone(),
                    }))
                }
            };
            if arguments.iter().any(|a| a.name == argument) {
                return Err(Diagnostic::new(
                    DslMessage::DuplicateArgument {
                        module: name.clone(),
                        argument,
                    },
                    flag,
                ));
            }
            arguments.push(ArgumentNode {
                name: argument,
                value,
                span: flag.merge(self.previous_span()),
            });
        }

        Ok(ModuleNode {
            name,
            label,
            arguments,
            span: start.merge(self.previous_span()),
        })
    }
}

fn check_unique_labels(modules: &[ModuleNode]) -> Result<(), Diagnostic> {
    let mut seen = HashSet::new();
    for module in modules {
        if !seen.insert(module.label_name()) {
            return Err(Diagnostic::new(
                DslMessage::DuplicateLabel {
                    label: module.label_name().to_string(),
                },
                module.span,
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::dsl::error::ErrorKind;
    use crate::dsl::lexer::lex;

    fn parse_str(s: &str) -> StreamNode {
        parse(lex(s)).unwrap()
    }

    fn parse_err(s: &str) -> Diagnostic {
        parse(lex(s)).unwrap_err()
    }

    #[test]
    fn parse_simple_pipeline() {
        let node = parse_str("http | transform | file");
        let names: Vec<&str> = node.modules.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["http", "transform", "file"]);
        assert!(node.source.is_none());
        assert!(node.sink.is_none());
        assert_eq!(node.span, Span::new(0, 23));
    }

    #[test]
    fn module_positions() {
        let node = parse_str("http | file");
        assert_eq!(node.modules[0].span, Span::new(0, 4));
        assert_eq!(node.modules[1].span.start, 7);
        assert_eq!(node.modules[1].span.end, 11);
    }

    #[test]
    fn parse_arguments() {
        let node = parse_str("http --port=9000 | transform --expression='payload + 1' | file");
        assert_eq!(node.modules[0].argument("port"), Some("9000"));
        assert_eq!(node.modules[1].argument("expression"), Some("payload + 1"));
        let arg = &node.modules[0].arguments[0];
        assert_eq!(arg.span, Span::new(5, 16));
        assert_eq!(node.modules[0].span, Span::new(0, 16));
    }

    #[test]
    fn parse_labels() {
        let node = parse_str("http | t1: transform | t2: transform | file");
        assert_eq!(node.modules[1].label.as_deref(), Some("t1"));
        assert_eq!(node.modules[2].label_name(), "t2");
        assert_eq!(node.modules[3].label_name(), "file");
        assert_eq!(node.modules[1].span, Span::new(7, 20));
    }

    #[test]
    fn parse_source_and_sink_channels() {
        let node = parse_str("queue:orders > transform > topic:out");
        let source = node.source.unwrap();
        assert_eq!(source.channel_type, ChannelType::Queue);
        assert_eq!(source.name_components, vec!["orders"]);
        assert_eq!(source.span, Span::new(0, 12));
        let sink = node.sink.unwrap();
        assert_eq!(sink.channel_type, ChannelType::Topic);
        assert_eq!(sink.span, Span::new(27, 36));
    }

    #[test]
    fn parse_taps() {
        let node = parse_str("tap:main.2 > log");
        let tap = node.source.unwrap();
        assert_eq!(tap.channel_type, ChannelType::TapStream);
        assert_eq!(tap.indexing_elements, vec!["2"]);
        assert_eq!(tap.stream_name().as_deref(), Some("main"));

        let node = parse_str("tap:stream:main.http > log");
        let tap = node.source.unwrap();
        assert_eq!(tap.name_components, vec!["stream", "main"]);
        assert_eq!(tap.stream_name().as_deref(), Some("main"));

        let node = parse_str("tap:job:nightly > log");
        let tap = node.source.unwrap();
        assert_eq!(tap.channel_type, ChannelType::TapJob);
        assert_eq!(tap.job_name().as_deref(), Some("nightly"));
    }

    #[test]
    fn multi_segment_channel_names() {
        let node = parse_str("trigger > queue:job:nightly");
        let sink = node.sink.unwrap();
        assert_eq!(sink.name_components, vec!["job", "nightly"]);
        assert_eq!(sink.channel_name(), "job:nightly");
        assert_eq!(sink.qualified_name(), "queue:job:nightly");
    }

    #[test]
    fn named_definition() {
        let node = parse_str("main = http | file");
        assert_eq!(node.name.as_deref(), Some("main"));
        assert_eq!(node.modules[0].span.start, 7);
        assert_eq!(node.span, Span::new(0, 18));
    }

    #[test]
    fn channel_alone_is_empty_pipeline() {
        let err = parse_err("tap:main");
        assert_eq!(err.message, DslMessage::EmptyPipeline);
        assert_eq!(err.kind(), ErrorKind::Syntactic);
        let err = parse_err("tap:main >");
        assert_eq!(err.message, DslMessage::EmptyPipeline);
    }

    #[test]
    fn empty_definition() {
        assert_eq!(parse_err("").message, DslMessage::EmptyPipeline);
        assert_eq!(parse_err("   ").message, DslMessage::EmptyPipeline);
    }

    #[test]
    fn leading_and_trailing_pipes() {
        let err = parse_err("| file");
        assert_eq!(err.message, DslMessage::DanglingPipe);
        assert_eq!(err.start(), 0);

        let err = parse_err("http |");
        assert_eq!(err.message, DslMessage::DanglingPipe);
        assert_eq!(err.span, Span::new(5, 6));

        let err = parse_err("http | | file");
        assert_eq!(err.message, DslMessage::DanglingPipe);
    }

    #[test]
    fn dangling_sink_operator() {
        let err = parse_err("http >");
        assert_eq!(err.message, DslMessage::DanglingChannelOperator);
        assert_eq!(err.start(), 5);
    }

    #[test]
    fn sink_must_be_a_channel() {
        let err = parse_err("http > file");
        assert!(matches!(err.message, DslMessage::ExpectedChannelPrefix { .. }));
        assert_eq!(err.start(), 7);
    }

    #[test]
    fn tap_cannot_be_sink() {
        let err = parse_err("http > tap:main");
        assert_eq!(err.message, DslMessage::TapAsSink);
        assert_eq!(err.span, Span::new(7, 15));
    }

    #[test]
    fn index_only_on_taps() {
        let err = parse_err("queue:a.b > log");
        assert_eq!(err.message, DslMessage::IndexOnlyOnTaps);
        assert_eq!(err.start(), 7);
    }

    #[test]
    fn only_one_index() {
        let err = parse_err("tap:main.1.2 > log");
        assert_eq!(err.message, DslMessage::MultipleIndexes);
    }

    #[test]
    fn missing_index_segment() {
        let err = parse_err("tap:main. > log");
        assert_eq!(
            err.message,
            DslMessage::ExpectedIndexSegment { found: "'>'".into() }
        );
    }

    #[test]
    fn missing_channel_segment() {
        let err = parse_err("queue: > log");
        assert!(matches!(err.message, DslMessage::ExpectedChannelSegment { .. }));
        assert_eq!(err.start(), 7);
    }

    #[test]
    fn source_channel_needs_arrow() {
        let err = parse_err("queue:a log");
        assert_eq!(
            err.message,
            DslMessage::UnexpectedToken { found: "identifier 'log'".into() }
        );
    }

    #[test]
    fn argument_errors() {
        assert_eq!(parse_err("http --=1").message, DslMessage::ExpectedArgumentName);
        assert_eq!(
            parse_err("http --port 9000").message,
            DslMessage::ExpectedEquals { argument: "port".into() }
        );
        assert_eq!(
            parse_err("http --port= 9000").message,
            DslMessage::ExpectedArgumentValue { argument: "port".into() }
        );
        assert_eq!(
            parse_err("http --port=1 --port=2").message,
            DslMessage::DuplicateArgument { module: "http".into(), argument: "port".into() }
        );
    }

    #[test]
    fn lexical_problems_surface_as_lexical() {
        let err = parse_err("http @ file");
        assert_eq!(err.message, DslMessage::UnexpectedCharacter { character: "@".into() });
        assert_eq!(err.kind(), ErrorKind::Lexical);
        assert_eq!(err.span, Span::new(5, 6));

        let err = parse_err("http --x='abc");
        assert_eq!(err.message, DslMessage::UnterminatedLiteral);
        assert_eq!(err.start(), 9);
    }

    #[test]
    fn duplicate_labels_rejected() {
        let err = parse_err("http | transform | transform");
        assert_eq!(err.message, DslMessage::DuplicateLabel { label: "transform".into() });
        assert_eq!(err.start(), 19);
    }

    #[test]
    fn channel_keyword_is_not_a_label() {
        let err = parse_err("http | queue: file");
        assert!(matches!(err.message, DslMessage::ExpectedModuleName { .. }));
    }

    #[test]
    fn trailing_garbage() {
        let err = parse_err("http | file ; log");
        assert_eq!(err.message, DslMessage::UnexpectedToken { found: "';'".into() });
        let err = parse_err("http file");
        assert_eq!(err.start(), 5);
    }

    #[test]
    fn double_colon_is_unexpected() {
        let err = parse_err("queue::a > log");
        assert_eq!(err.message, DslMessage::UnexpectedToken { found: "'::'".into() });
        assert_eq!(err.span, Span::new(5, 7));
    }

    #[test]
    fn jobs_are_single_modules() {
        let node = parse_job(lex("batch --cron='0 0 * * *'")).unwrap();
        assert_eq!(node.modules.len(), 1);
        assert_eq!(node.modules[0].argument("cron"), Some("0 0 * * *"));

        let err = parse_job(lex("a | b")).unwrap_err();
        assert_eq!(err.message, DslMessage::JobWithMultipleModules);
        assert_eq!(err.start(), 4);

        let err = parse_job(lex("queue:in > a")).unwrap_err();
        assert_eq!(err.message, DslMessage::JobWithChannels);
    }

    #[test]
    fn child_spans_inside_parent() {
        let node = parse_str("s = tap:main.1 > t: transform --e='x y' | file > queue:out");
        for module in &node.modules {
            assert!(node.span.encloses(module.span));
            for arg in &module.arguments {
                assert!(module.span.encloses(arg.span));
            }
        }
        for channel in node.channels() {
            assert!(node.span.encloses(channel.span));
        }
    }
}
