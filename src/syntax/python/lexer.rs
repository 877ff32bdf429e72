//! Lossless tokenizer for fragment sources.
//!
//! Every character of the input ends up in exactly one token, so concatenating the
//! token texts reproduces the source byte for byte. Whitespace, comments and line
//! continuations are tokens like any other.
//!
//! f-strings are split into literal parts and the expression tokens of each replacement
//! field, so names used inside `{...}` can be rewritten like ordinary code.

use std::fmt;

/// Token categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier or keyword
    Name,
    /// Numeric literal
    Number,
    /// Complete string literal including prefix and quotes
    Str,
    /// Literal portion of an f-string, including the delimiting quote and braces
    FStrPart,
    /// Operator or delimiter
    Op,
    /// `#` comment up to the end of the line
    Comment,
    /// Line break
    Newline,
    /// Spaces, tabs and form feeds
    Space,
    /// Backslash followed by a line break
    Continuation,
}

/// A token and the 1-based line it starts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
}

impl Token {
    /// Whether the token carries syntax, as opposed to layout.
    #[must_use]
    pub fn is_significant(&self) -> bool {
        !matches!(
            self.kind,
            TokenKind::Space | TokenKind::Comment | TokenKind::Newline | TokenKind::Continuation
        )
    }

    /// Whether this is the operator `op`.
    #[must_use]
    pub fn is_op(&self, op: &str) -> bool {
        self.kind == TokenKind::Op && self.text == op
    }

    /// Whether this is the name or keyword `name`.
    #[must_use]
    pub fn is_name(&self, name: &str) -> bool {
        self.kind == TokenKind::Name && self.text == name
    }
}

/// A tokenization failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub line: usize,
    pub reason: String,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.reason)
    }
}

const OPS3: &[&str] = &["**=", "//=", ">>=", "<<=", "..."];
const OPS2: &[&str] = &[
    "**", "//", "<<", ">>", "<=", ">=", "==", "!=", "->", ":=", "+=", "-=", "*=", "/=", "%=",
    "&=", "|=", "^=", "@=",
];
const STRING_PREFIXES: &[&str] = &["r", "u", "b", "f", "br", "rb", "fr", "rf"];

/// Split `source` into tokens.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
        tokens: Vec::new(),
    };
    while lexer.pos < lexer.chars.len() {
        lexer.lex_token()?;
    }
    Ok(lexer.tokens)
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    tokens: Vec<Token>,
}

impl Lexer {
    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn push(&mut self, kind: TokenKind, start: usize, line: usize) {
        let text: String = self.chars[start..self.pos].iter().collect();
        self.tokens.push(Token {
            kind,
            text,
            line,
        });
    }

    fn error(&self, line: usize, reason: impl Into<String>) -> LexError {
        LexError {
            line,
            reason: reason.into(),
        }
    }

    fn lex_token(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        let line = self.line;
        let c = self.chars[self.pos];

        match c {
            '\n' => {
                self.pos += 1;
                self.push(TokenKind::Newline, start, line);
                self.line += 1;
            }
            '\r' => {
                self.pos += if self.peek(1) == Some('\n') { 2 } else { 1 };
                self.push(TokenKind::Newline, start, line);
                self.line += 1;
            }
            ' ' | '\t' | '\x0c' => {
                while matches!(self.peek(0), Some(' ' | '\t' | '\x0c')) {
                    self.pos += 1;
                }
                self.push(TokenKind::Space, start, line);
            }
            '#' => {
                while !matches!(self.peek(0), None | Some('\n' | '\r')) {
                    self.pos += 1;
                }
                self.push(TokenKind::Comment, start, line);
            }
            '\\' if matches!(self.peek(1), Some('\n' | '\r')) => {
                self.pos += 1;
                self.pos += if self.peek(0) == Some('\r') && self.peek(1) == Some('\n') {
                    2
                } else {
                    1
                };
                self.push(TokenKind::Continuation, start, line);
                self.line += 1;
            }
            c if c.is_alphabetic() || c == '_' => {
                while self.peek(0).is_some_and(|c| c.is_alphanumeric() || c == '_') {
                    self.pos += 1;
                }
                let word: String = self.chars[start..self.pos].iter().collect();
                let is_prefix = STRING_PREFIXES.contains(&word.to_ascii_lowercase().as_str());
                if is_prefix && matches!(self.peek(0), Some('\'' | '"')) {
                    self.lex_string(start, line)?;
                } else {
                    self.push(TokenKind::Name, start, line);
                }
            }
            '0'..='9' => self.lex_number(start, line),
            '.' if self.peek(1).is_some_and(|c| c.is_ascii_digit()) => self.lex_number(start, line),
            '\'' | '"' => self.lex_string(start, line)?,
            _ => {
                let rest: String = self.chars[self.pos..(self.pos + 3).min(self.chars.len())]
                    .iter()
                    .collect();
                let len = if OPS3.iter().any(|op| rest.starts_with(op)) {
                    3
                } else if OPS2.iter().any(|op| rest.starts_with(op)) {
                    2
                } else {
                    1
                };
                self.pos += len;
                self.push(TokenKind::Op, start, line);
            }
        }
        Ok(())
    }

    fn lex_number(&mut self, start: usize, line: usize) {
        let hex = self.peek(0) == Some('0') && matches!(self.peek(1), Some('x' | 'X'));
        while let Some(c) = self.peek(0) {
            if c.is_alphanumeric() || c == '_' || c == '.' {
                self.pos += 1;
            } else if matches!(c, '+' | '-')
                && !hex
                && matches!(self.chars.get(self.pos - 1), Some('e' | 'E'))
            {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.push(TokenKind::Number, start, line);
    }

    /// Lex a string whose prefix (possibly empty) starts at `start`; `self.pos` is on the
    /// opening quote.
    fn lex_string(&mut self, start: usize, line: usize) -> Result<(), LexError> {
        let prefix: String = self.chars[start..self.pos].iter().collect();
        let is_format = prefix.contains(['f', 'F']);
        let quote = self.chars[self.pos];
        let triple = self.peek(1) == Some(quote) && self.peek(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        if is_format {
            return self.lex_fstring(start, line, quote, triple);
        }

        loop {
            let Some(c) = self.peek(0) else {
                return Err(self.error(line, "unterminated string literal"));
            };
            match c {
                '\\' => {
                    if self.peek(1) == Some('\n') {
                        self.line += 1;
                    }
                    self.pos += 2;
                }
                c if c == quote && self.closes(quote, triple) => {
                    self.pos += if triple { 3 } else { 1 };
                    break;
                }
                '\n' if !triple => return Err(self.error(line, "unterminated string literal")),
                '\n' => {
                    self.line += 1;
                    self.pos += 1;
                }
                _ => self.pos += 1,
            }
        }
        self.pos = self.pos.min(self.chars.len());
        self.push(TokenKind::Str, start, line);
        Ok(())
    }

    fn closes(&self, quote: char, triple: bool) -> bool {
        !triple || (self.peek(1) == Some(quote) && self.peek(2) == Some(quote))
    }

    fn lex_fstring(
        &mut self,
        start: usize,
        line: usize,
        quote: char,
        triple: bool,
    ) -> Result<(), LexError> {
        let mut part_start = start;
        let mut part_line = line;

        loop {
            let Some(c) = self.peek(0) else {
                return Err(self.error(line, "unterminated f-string"));
            };
            match c {
                '\\' => {
                    if self.peek(1) == Some('\n') {
                        self.line += 1;
                    }
                    self.pos = (self.pos + 2).min(self.chars.len());
                }
                c if c == quote && self.closes(quote, triple) => {
                    self.pos += if triple { 3 } else { 1 };
                    self.push(TokenKind::FStrPart, part_start, part_line);
                    return Ok(());
                }
                '{' if self.peek(1) == Some('{') => self.pos += 2,
                '}' if self.peek(1) == Some('}') => self.pos += 2,
                '{' => {
                    self.pos += 1;
                    self.push(TokenKind::FStrPart, part_start, part_line);
                    self.lex_fstring_field(line, triple)?;

                    part_start = self.pos;
                    part_line = self.line;
                    if matches!(self.peek(0), Some('!' | ':')) {
                        self.skip_format_spec(line)?;
                    }
                    if self.peek(0) != Some('}') {
                        return Err(self.error(line, "f-string: expecting '}'"));
                    }
                    self.pos += 1;
                }
                '\n' if !triple => return Err(self.error(line, "unterminated f-string")),
                '\n' => {
                    self.line += 1;
                    self.pos += 1;
                }
                _ => self.pos += 1,
            }
        }
    }

    /// Lex the expression of a replacement field, stopping before the `}`, `!` or `:`
    /// that ends it.
    fn lex_fstring_field(&mut self, line: usize, triple: bool) -> Result<(), LexError> {
        let mut depth = 0usize;
        loop {
            let Some(c) = self.peek(0) else {
                return Err(self.error(line, "f-string: expecting '}'"));
            };
            if depth == 0
                && (c == '}' || c == ':' || (c == '!' && self.peek(1) != Some('=')))
            {
                return Ok(());
            }
            if c == '\n' && !triple {
                return Err(self.error(line, "unterminated f-string"));
            }
            match c {
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth = depth.saturating_sub(1),
                _ => {}
            }
            self.lex_token()?;
        }
    }

    fn skip_format_spec(&mut self, line: usize) -> Result<(), LexError> {
        let mut depth = 0usize;
        loop {
            match self.peek(0) {
                None => return Err(self.error(line, "f-string: expecting '}'")),
                Some('{') => depth += 1,
                Some('}') if depth == 0 => return Ok(()),
                Some('}') => depth -= 1,
                Some('\n') => self.line += 1,
                _ => {}
            }
            self.pos += 1;
        }
    }
}
