use std::fmt;

use super::ast::Span;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    // Words and literals
    Ident(String),
    Number(String),
    /// Quoted or bare argument value, unescaped.
    Literal(String),
    /// `--name`
    OptionFlag(String),

    // Punctuation
    Pipe,        // |
    Colon,       // :
    DoubleColon, // ::
    Dot,         // .
    Gt,          // >
    Eq,          // =
    Semicolon,   // ;

    // Lexical problems, reported by the parser
    Unknown(char),
    Unterminated(String),

    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "identifier '{s}'"),
            Token::Number(s) => write!(f, "number '{s}'"),
            Token::Literal(s) => write!(f, "literal '{s}'"),
            Token::OptionFlag(s) => write!(f, "option '--{s}'"),
            Token::Pipe => write!(f, "'|'"),
            Token::Colon => write!(f, "':'"),
            Token::DoubleColon => write!(f, "'::'"),
            Token::Dot => write!(f, "'.'"),
            Token::Gt => write!(f, "'>'"),
            Token::Eq => write!(f, "'='"),
            Token::Semicolon => write!(f, "';'"),
            Token::Unknown(c) => write!(f, "'{c}'"),
            Token::Unterminated(_) => write!(f, "unterminated literal"),
            Token::Eof => write!(f, "end of input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

/// Tokenize one definition. Never fails: characters the language does not
/// know become `Token::Unknown` and an open quote becomes
/// `Token::Unterminated`. The last token is always `Eof` at `[len, len)`.
pub fn lex(source: &str) -> Vec<SpannedToken> {
    let mut lexer = Lexer::new(source);
    lexer.tokenize()
}

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    tokens: Vec<SpannedToken>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            tokens: Vec::new(),
        }
    }

    fn tokenize(&mut self) -> Vec<SpannedToken> {
        while self.pos < self.bytes.len() {
            // Argument values are read verbatim right after `--name=`
            if self.expecting_argument_value() {
                self.lex_argument_value();
                continue;
            }

            self.skip_whitespace();
            if self.pos >= self.bytes.len() {
                break;
            }

            let start = self.pos;
            let ch = self.bytes[self.pos];

            match ch {
                b'|' => { self.pos += 1; self.push(Token::Pipe, start); }
                b'.' => { self.pos += 1; self.push(Token::Dot, start); }
                b'>' => { self.pos += 1; self.push(Token::Gt, start); }
                b'=' => { self.pos += 1; self.push(Token::Eq, start); }
                b';' => { self.pos += 1; self.push(Token::Semicolon, start); }
                b':' => {
                    self.pos += 1;
                    if self.peek() == Some(b':') {
                        self.pos += 1;
                        self.push(Token::DoubleColon, start);
                    } else {
                        self.push(Token::Colon, start);
                    }
                }
                b'-' if self.bytes.get(self.pos + 1) == Some(&b'-') => {
                    self.pos += 2;
                    let name_start = self.pos;
                    self.consume_ident_chars();
                    let name = self.source[name_start..self.pos].to_string();
                    self.push(Token::OptionFlag(name), start);
                }
                b'\'' | b'"' => {
                    self.lex_quoted(start, ch);
                }
                b'0'..=b'9' => {
                    while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                        self.pos += 1;
                    }
                    let digits = self.source[start..self.pos].to_string();
                    self.push(Token::Number(digits), start);
                }
                b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                    self.consume_ident_chars();
                    let word = self.source[start..self.pos].to_string();
                    self.push(Token::Ident(word), start);
                }
                _ => {
                    let c = self.source[start..].chars().next().unwrap_or('\u{fffd}');
                    self.pos += c.len_utf8();
                    self.push(Token::Unknown(c), start);
                }
            }
        }

        self.tokens.push(SpannedToken {
            token: Token::Eof,
            span: Span::new(self.bytes.len(), self.bytes.len()),
        });
        std::mem::take(&mut self.tokens)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn push(&mut self, token: Token, start: usize) {
        self.tokens.push(SpannedToken {
            token,
            span: Span::new(start, self.pos),
        });
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    /// True when the last two tokens were `--name` and `=`, with the cursor
    /// directly after the `=`.
    fn expecting_argument_value(&self) -> bool {
        match self.tokens.as_slice() {
            [.., flag, eq] => {
                matches!(flag.token, Token::OptionFlag(_))
                    && eq.token == Token::Eq
                    && eq.span.end == self.pos
                    && self
                        .peek()
                        .is_some_and(|b| !b.is_ascii_whitespace() && b != b'|' && b != b';')
            }
            _ => false,
        }
    }

    /// Identifier characters: alphanumerics and `_`, plus a single `-` when
    /// another identifier character follows it (`aggregate-counter`).
    fn consume_ident_chars(&mut self) {
        while let Some(b) = self.peek() {
            let joins = b == b'-'
                && self
                    .bytes
                    .get(self.pos + 1)
                    .is_some_and(|n| n.is_ascii_alphanumeric() || *n == b'_');
            if b.is_ascii_alphanumeric() || b == b'_' || joins {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn lex_argument_value(&mut self) {
        let start = self.pos;
        match self.peek() {
            Some(q @ (b'\'' | b'"')) => self.lex_quoted(start, q),
            _ => {
                while self
                    .peek()
                    .is_some_and(|b| !b.is_ascii_whitespace() && b != b'|' && b != b';')
                {
                    self.pos += 1;
                }
                let value = self.source[start..self.pos].to_string();
                self.push(Token::Literal(value), start);
            }
        }
    }

    /// Quoted literal; the quote character is escaped by doubling it.
    fn lex_quoted(&mut self, start: usize, quote: u8) {
        self.pos += 1;
        let mut value = String::new();
        let mut chunk_start = self.pos;
        loop {
            match self.peek() {
                None => {
                    value.push_str(&self.source[chunk_start..self.pos]);
                    self.push(Token::Unterminated(value), start);
                    return;
                }
                Some(b) if b == quote => {
                    value.push_str(&self.source[chunk_start..self.pos]);
                    if self.bytes.get(self.pos + 1) == Some(&quote) {
                        value.push(char::from(quote));
                        self.pos += 2;
                        chunk_start = self.pos;
                    } else {
                        self.pos += 1;
                        self.push(Token::Literal(value), start);
                        return;
                    }
                }
                Some(_) => self.pos += 1,
            }
        }
    }
}
