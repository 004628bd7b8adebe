//! Statement-tree parser over the token stream.
//!
//! Builds the block structure of a module (simple statements, compound
//! headers and their bodies) and rejects malformed block layout. Expressions
//! stay as flat token runs; the analyzer only needs names, attribute access
//! and call shapes, which are visible at token level.

use crate::core::lexer::{SyntaxError, Token, TokenKind, tokenize};

/// Keywords that always open a compound statement.
const COMPOUND_KEYWORDS: [&str; 11] = [
    "if", "elif", "else", "for", "while", "try", "except", "finally", "with", "def", "class",
];

/// Soft keywords that open a compound statement only in header position.
const SOFT_KEYWORDS: [&str; 2] = ["match", "case"];

/// One statement. Compound statements own their body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub line: usize,
    /// Tokens of a simple statement, or of a compound header up to and
    /// including its `:`.
    pub tokens: Vec<Token>,
    pub body: Vec<Statement>,
}

impl Statement {
    /// Leading keyword, skipping `async`.
    pub fn keyword(&self) -> Option<&str> {
        let mut iter = self.tokens.iter();
        let mut first = iter.next().filter(|tok| tok.kind == TokenKind::Name)?;
        if first.text == "async" {
            first = iter.next()?;
        }
        Some(first.text.as_str())
    }

    pub fn is_compound(&self) -> bool {
        self.tokens.last().is_some_and(|tok| tok.is_op(":")) && is_header(&self.tokens)
    }
}

/// A parsed module: the top-level statement list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub body: Vec<Statement>,
}

impl Module {
    /// Visit every statement depth-first, in source order.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Statement)) {
        fn walk_all<'a>(stmts: &'a [Statement], visit: &mut impl FnMut(&'a Statement)) {
            for stmt in stmts {
                visit(stmt);
                walk_all(&stmt.body, visit);
            }
        }
        walk_all(&self.body, visit);
    }
}

/// Tokenize and parse `source` into a [`Module`].
pub fn parse(source: &str) -> Result<Module, SyntaxError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let body = parser.block(false)?;
    Ok(Module { body })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn block(&mut self, nested: bool) -> Result<Vec<Statement>, SyntaxError> {
        let mut body = Vec::new();
        loop {
            let Some(tok) = self.peek() else {
                return Ok(body);
            };
            match tok.kind {
                TokenKind::Dedent if nested => {
                    self.pos += 1;
                    return Ok(body);
                }
                TokenKind::Dedent => {
                    return Err(SyntaxError::new(tok.line, "unexpected unindent"));
                }
                TokenKind::Indent => {
                    return Err(SyntaxError::new(tok.line, "unexpected indent"));
                }
                TokenKind::Newline => self.pos += 1,
                _ => {
                    let tokens = self.logical_line();
                    self.statement(tokens, &mut body)?;
                }
            }
        }
    }

    /// Consume tokens up to and including the next NEWLINE.
    fn logical_line(&mut self) -> Vec<Token> {
        let mut line = Vec::new();
        while let Some(tok) = self.tokens.get(self.pos) {
            self.pos += 1;
            if tok.kind == TokenKind::Newline {
                break;
            }
            line.push(tok.clone());
        }
        line
    }

    fn statement(&mut self, tokens: Vec<Token>, out: &mut Vec<Statement>) -> Result<(), SyntaxError> {
        let line = tokens.first().map(|tok| tok.line).unwrap_or(0);
        if !is_header(&tokens) {
            return simple_statements(tokens, out);
        }

        let keyword = tokens
            .iter()
            .find(|tok| tok.text != "async")
            .map(|tok| tok.text.clone())
            .unwrap_or_default();
        let Some(colon) = header_colon(&tokens) else {
            return Err(SyntaxError::new(line, format!("expected ':' after '{keyword}'")));
        };

        let mut header = tokens;
        let inline = header.split_off(colon + 1);
        let mut body = Vec::new();
        if inline.is_empty() {
            if !self.peek().is_some_and(|tok| tok.kind == TokenKind::Indent) {
                return Err(SyntaxError::new(
                    line,
                    format!("expected an indented block after '{keyword}' statement on line {line}"),
                ));
            }
            self.pos += 1;
            body = self.block(true)?;
        } else {
            simple_statements(inline, &mut body)?;
        }

        out.push(Statement {
            line,
            tokens: header,
            body,
        });
        Ok(())
    }
}

/// Split a logical line on top-level `;` into simple statements.
fn simple_statements(tokens: Vec<Token>, out: &mut Vec<Statement>) -> Result<(), SyntaxError> {
    let mut current: Vec<Token> = Vec::new();
    let mut depth = 0usize;
    let mut parts = Vec::new();
    for tok in tokens {
        if tok.kind == TokenKind::Op {
            match tok.text.as_str() {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => depth = depth.saturating_sub(1),
                ";" if depth == 0 => {
                    if current.is_empty() {
                        return Err(SyntaxError::new(tok.line, "invalid syntax"));
                    }
                    parts.push(std::mem::take(&mut current));
                    continue;
                }
                _ => {}
            }
        }
        current.push(tok);
    }
    if !current.is_empty() {
        parts.push(current);
    }

    for part in parts {
        if is_header(&part) {
            let line = part[0].line;
            return Err(SyntaxError::new(line, "invalid syntax"));
        }
        if let Some(last) = part.last()
            && last.is_op(":")
        {
            return Err(SyntaxError::new(last.line, "invalid syntax"));
        }
        out.push(Statement {
            line: part[0].line,
            tokens: part,
            body: Vec::new(),
        });
    }
    Ok(())
}

/// True when the token run starts a compound statement.
fn is_header(tokens: &[Token]) -> bool {
    let Some(first) = tokens.first() else {
        return false;
    };
    if first.kind != TokenKind::Name {
        return false;
    }
    if first.text == "async" {
        return tokens
            .get(1)
            .is_some_and(|tok| matches!(tok.text.as_str(), "def" | "for" | "with"));
    }
    if COMPOUND_KEYWORDS.contains(&first.text.as_str()) {
        return true;
    }
    // `match x:` is a header; `match = 1` and `match(x)` on its own are not.
    SOFT_KEYWORDS.contains(&first.text.as_str())
        && tokens.len() > 2
        && tokens.last().is_some_and(|tok| tok.is_op(":"))
        && !tokens.get(1).is_some_and(|tok| {
            tok.kind == TokenKind::Op && !matches!(tok.text.as_str(), "(" | "[" | "{" | "-" | "*")
        })
}

/// Index of the `:` that ends a compound header.
///
/// Colons inside brackets and those belonging to a `lambda` are skipped.
fn header_colon(tokens: &[Token]) -> Option<usize> {
    let mut depth = 0usize;
    let mut lambdas = 0usize;
    for (idx, tok) in tokens.iter().enumerate() {
        match tok.kind {
            TokenKind::Name if tok.text == "lambda" && depth == 0 => lambdas += 1,
            TokenKind::Op => match tok.text.as_str() {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => depth = depth.saturating_sub(1),
                ":" if depth == 0 && lambdas > 0 => lambdas -= 1,
                ":" if depth == 0 => return Some(idx),
                _ => {}
            },
            _ => {}
        }
    }
    None
}
