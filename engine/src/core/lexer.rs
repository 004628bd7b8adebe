//! Python-compatible tokenizer used by the static analyzer.
//!
//! Produces the token stream the parser needs: names, numbers, string
//! literals, operators, logical newlines and INDENT/DEDENT markers. Comments
//! and blank lines are dropped. The tokenizer never evaluates anything.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Name,
    Number,
    Str,
    Op,
    Newline,
    Indent,
    Dedent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, line: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            line,
        }
    }

    pub fn is_op(&self, op: &str) -> bool {
        self.kind == TokenKind::Op && self.text == op
    }

    pub fn is_name(&self, name: &str) -> bool {
        self.kind == TokenKind::Name && self.text == name
    }
}

/// Tokenization or parse failure with the 1-based line it was found on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub line: usize,
    pub message: String,
}

impl SyntaxError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (line {})", self.message, self.line)
    }
}

impl std::error::Error for SyntaxError {}

// Longest first so that greedy matching picks `**=` over `**` over `*`.
const OPERATORS: &[&str] = &[
    "**=", "//=", ">>=", "<<=", "...", "->", ":=", "**", "//", "<<", ">>", "<=", ">=", "==", "!=",
    "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "@=", "+", "-", "*", "/", "%", "@", "&", "|",
    "^", "~", "<", ">", "(", ")", "[", "]", "{", "}", ",", ":", ".", ";", "=",
];

const TAB_SIZE: usize = 8;

/// Tokenize `source` into a stream terminated by closing DEDENTs.
pub fn tokenize(source: &str) -> Result<Vec<Token>, SyntaxError> {
    Lexer::new(source).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    tokens: Vec<Token>,
    indents: Vec<usize>,
    /// Open brackets with the line they were opened on.
    brackets: Vec<(char, usize)>,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            tokens: Vec::new(),
            indents: vec![0],
            brackets: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn run(mut self) -> Result<Vec<Token>, SyntaxError> {
        let mut at_line_start = true;
        while self.pos < self.chars.len() {
            if at_line_start && self.brackets.is_empty() {
                if self.handle_indentation()? {
                    continue;
                }
                at_line_start = false;
            }
            let Some(ch) = self.peek() else { break };
            match ch {
                ' ' | '\t' | '\x0c' | '\r' => self.pos += 1,
                '#' => self.skip_comment(),
                '\n' => {
                    self.pos += 1;
                    if self.brackets.is_empty() {
                        self.push_newline();
                        at_line_start = true;
                    }
                    self.line += 1;
                }
                '\\' => self.line_continuation()?,
                c if c.is_ascii_digit() => self.number(),
                '.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.number(),
                c if is_identifier_start(c) => {
                    if self.string_prefix_len().is_some() {
                        self.string()?;
                    } else {
                        self.name();
                    }
                }
                '\'' | '"' => self.string()?,
                _ => self.operator()?,
            }
        }

        if let Some(&(open, line)) = self.brackets.last() {
            return Err(SyntaxError::new(line, format!("'{open}' was never closed")));
        }
        self.push_newline();
        while self.indents.len() > 1 {
            self.indents.pop();
            self.tokens.push(Token::new(TokenKind::Dedent, "", self.line));
        }
        Ok(self.tokens)
    }

    /// Measure indentation of a fresh physical line and emit INDENT/DEDENT.
    ///
    /// Returns `true` when the line is blank or comment-only and was consumed.
    fn handle_indentation(&mut self) -> Result<bool, SyntaxError> {
        let mut width = 0;
        while let Some(ch) = self.peek() {
            match ch {
                ' ' => width += 1,
                '\t' => width = (width / TAB_SIZE + 1) * TAB_SIZE,
                '\x0c' => width = 0,
                _ => break,
            }
            self.pos += 1;
        }
        match self.peek() {
            None => return Ok(true),
            Some('#') => {
                self.skip_comment();
                self.skip_line_end();
                return Ok(true);
            }
            Some('\n') | Some('\r') => {
                self.skip_line_end();
                return Ok(true);
            }
            _ => {}
        }

        let current = self.indents.last().copied().unwrap_or(0);
        if width > current {
            self.indents.push(width);
            self.tokens.push(Token::new(TokenKind::Indent, "", self.line));
        } else if width < current {
            while self.indents.last().is_some_and(|&level| level > width) {
                self.indents.pop();
                self.tokens.push(Token::new(TokenKind::Dedent, "", self.line));
            }
            if self.indents.last().copied() != Some(width) {
                return Err(SyntaxError::new(
                    self.line,
                    "unindent does not match any outer indentation level",
                ));
            }
        }
        Ok(false)
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            self.pos += 1;
        }
    }

    fn skip_line_end(&mut self) {
        if self.peek() == Some('\r') {
            self.pos += 1;
        }
        if self.peek() == Some('\n') {
            self.pos += 1;
            self.line += 1;
        }
    }

    fn push_newline(&mut self) {
        let needs_newline = self
            .tokens
            .last()
            .is_some_and(|tok| !matches!(tok.kind, TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent));
        if needs_newline {
            self.tokens.push(Token::new(TokenKind::Newline, "", self.line));
        }
    }

    fn line_continuation(&mut self) -> Result<(), SyntaxError> {
        self.pos += 1;
        if self.peek() == Some('\r') {
            self.pos += 1;
        }
        match self.peek() {
            Some('\n') => {
                self.pos += 1;
                self.line += 1;
                Ok(())
            }
            None => Err(SyntaxError::new(self.line, "unexpected EOF after line continuation")),
            Some(_) => Err(SyntaxError::new(
                self.line,
                "unexpected character after line continuation character",
            )),
        }
    }

    fn number(&mut self) {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            let exponent_sign = (ch == '+' || ch == '-')
                && matches!(self.chars.get(self.pos.wrapping_sub(1)), Some('e') | Some('E'))
                && !self.chars[start..self.pos].iter().any(|c| matches!(c, 'x' | 'X'));
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '.' || exponent_sign {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        self.tokens.push(Token::new(TokenKind::Number, text, self.line));
    }

    fn name(&mut self) {
        let start = self.pos;
        while self.peek().is_some_and(is_identifier_continue) {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        self.tokens.push(Token::new(TokenKind::Name, text, self.line));
    }

    /// Length of a string prefix (`r`, `b`, `f`, `rb`, ...) at the cursor, if a
    /// quote follows it.
    fn string_prefix_len(&self) -> Option<usize> {
        let mut len = 0;
        while len < 2 && self.peek_at(len).is_some_and(|c| "rRbBuUfF".contains(c)) {
            len += 1;
        }
        if len == 0 {
            return None;
        }
        match self.peek_at(len) {
            Some('\'') | Some('"') => Some(len),
            _ => None,
        }
    }

    fn string(&mut self) -> Result<(), SyntaxError> {
        let start = self.pos;
        let start_line = self.line;
        self.pos += self.string_prefix_len().unwrap_or(0);
        let Some(quote) = self.peek() else {
            return Err(SyntaxError::new(start_line, "unterminated string literal"));
        };
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        loop {
            let Some(ch) = self.peek() else {
                let what = if triple {
                    "unterminated triple-quoted string literal"
                } else {
                    "unterminated string literal"
                };
                return Err(SyntaxError::new(start_line, what));
            };
            match ch {
                '\\' => match (self.peek_at(1), self.peek_at(2)) {
                    (Some('\r'), Some('\n')) => {
                        self.line += 1;
                        self.pos += 3;
                    }
                    (Some('\n'), _) => {
                        self.line += 1;
                        self.pos += 2;
                    }
                    _ => self.pos += 2,
                },
                '\n' if !triple => {
                    return Err(SyntaxError::new(start_line, "unterminated string literal"));
                }
                '\n' => {
                    self.line += 1;
                    self.pos += 1;
                }
                c if c == quote => {
                    if !triple {
                        self.pos += 1;
                        break;
                    }
                    if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                        self.pos += 3;
                        break;
                    }
                    self.pos += 1;
                }
                _ => self.pos += 1,
            }
        }

        let end = self.pos.min(self.chars.len());
        let text: String = self.chars[start..end].iter().collect();
        self.tokens.push(Token::new(TokenKind::Str, text, start_line));
        Ok(())
    }

    fn operator(&mut self) -> Result<(), SyntaxError> {
        let rest: String = self.chars[self.pos..(self.pos + 3).min(self.chars.len())]
            .iter()
            .collect();
        let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(**op)) else {
            let ch = self.peek().unwrap_or('?');
            return Err(SyntaxError::new(
                self.line,
                format!("invalid character '{ch}' (U+{:04X})", ch as u32),
            ));
        };

        match *op {
            "(" | "[" | "{" => self.brackets.push((op.chars().next().unwrap_or('('), self.line)),
            ")" | "]" | "}" => {
                let close = op.chars().next().unwrap_or(')');
                match self.brackets.pop() {
                    Some((open, _)) if matches_bracket(open, close) => {}
                    Some((open, line)) => {
                        return Err(SyntaxError::new(
                            self.line,
                            format!(
                                "closing parenthesis '{close}' does not match opening parenthesis '{open}' on line {line}"
                            ),
                        ));
                    }
                    None => {
                        return Err(SyntaxError::new(self.line, format!("unmatched '{close}'")));
                    }
                }
            }
            _ => {}
        }

        self.pos += op.chars().count();
        self.tokens.push(Token::new(TokenKind::Op, *op, self.line));
        Ok(())
    }
}

fn matches_bracket(open: char, close: char) -> bool {
    matches!((open, close), ('(', ')') | ('[', ']') | ('{', '}'))
}

fn is_identifier_start(ch: char) -> bool {
    ch == '_' || ch.is_alphabetic()
}

fn is_identifier_continue(ch: char) -> bool {
    ch == '_' || ch.is_alphanumeric()
}

/// True when a string token carries an `f` prefix.
pub fn is_fstring(token: &Token) -> bool {
    token.kind == TokenKind::Str
        && token
            .text
            .chars()
            .take_while(|c| *c != '\'' && *c != '"')
            .any(|c| c == 'f' || c == 'F')
}

/// Extract the replacement-field expressions of an f-string literal.
///
/// Doubled braces are literal text. Conversions (`!r`) and format specs
/// (`:>10`) are cut off at the first top-level `!` or `:`.
pub fn fstring_fields(token: &Token) -> Vec<String> {
    let body: Vec<char> = token
        .text
        .chars()
        .skip_while(|c| *c != '\'' && *c != '"')
        .collect();
    let mut fields = Vec::new();
    let mut i = 0;
    while i < body.len() {
        match body[i] {
            '{' if body.get(i + 1) == Some(&'{') => i += 2,
            '{' => {
                let mut depth = 1;
                let mut j = i + 1;
                while j < body.len() && depth > 0 {
                    match body[j] {
                        '{' => depth += 1,
                        '}' => depth -= 1,
                        _ => {}
                    }
                    j += 1;
                }
                let end = if depth == 0 { j - 1 } else { j };
                fields.push(field_expression(&body[i + 1..end]));
                i = j;
            }
            _ => i += 1,
        }
    }
    fields
}

fn field_expression(field: &[char]) -> String {
    let mut depth = 0usize;
    let mut end = field.len();
    for (idx, ch) in field.iter().enumerate() {
        match ch {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            '!' if depth == 0 && field.get(idx + 1) != Some(&'=') => {
                end = idx;
                break;
            }
            ':' if depth == 0 => {
                end = idx;
                break;
            }
            _ => {}
        }
    }
    field[..end].iter().collect()
}
