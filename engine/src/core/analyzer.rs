//! Static safety gate run before any submission is executed.
//!
//! Two independent checks, both must pass:
//!
//! - **Structural**: parse the source into a statement tree and flag imports,
//!   `global`/`nonlocal`, `with`, dunder lookups and `__import__` calls.
//! - **Lexical**: scan the raw text for a fixed denylist of substrings.
//!
//! The checks overlap but are not equivalent (`"import"` inside a string
//! literal trips only the lexical one); neither is relaxed in favour of the
//! other.

use std::fmt;

use crate::core::lexer::{Token, TokenKind, fstring_fields, is_fstring, tokenize};
use crate::core::syntax::{Statement, parse};
use crate::core::types::AnalysisResult;

/// Raw-text denylist, checked in this order.
pub const FORBIDDEN_SUBSTRINGS: [&str; 5] = ["import", "__", "exec", "eval", "open"];

const DUNDER: &str = "__";

/// A single reason a submission is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    Syntax { line: usize, message: String },
    ForbiddenNode { line: usize, node: &'static str },
    DunderAttribute { line: usize, name: String },
    DunderName { line: usize, name: String },
    ForbiddenCall { line: usize, name: String },
    ForbiddenSubstring { token: &'static str },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Syntax { line, message } => {
                write!(f, "SyntaxError: {message} (line {line})")
            }
            Violation::ForbiddenNode { line, node } => {
                write!(f, "Forbidden node: {node} (line {line})")
            }
            Violation::DunderAttribute { line, name } => {
                write!(f, "Forbidden dunder attribute: {name} (line {line})")
            }
            Violation::DunderName { line, name } => {
                write!(f, "Forbidden dunder name: {name} (line {line})")
            }
            Violation::ForbiddenCall { line, name } => {
                write!(f, "Forbidden call: {name} (line {line})")
            }
            Violation::ForbiddenSubstring { token } => {
                write!(f, "Forbidden token in source: '{token}'")
            }
        }
    }
}

/// Analyze `source` without executing it.
pub fn analyze(source: &str) -> AnalysisResult {
    let mut violations = structural_violations(source);
    violations.extend(lexical_violations(source));
    AnalysisResult::from_violations(violations.iter().map(ToString::to_string).collect())
}

/// Parse and walk the statement tree. A parse failure is one violation.
pub fn structural_violations(source: &str) -> Vec<Violation> {
    let module = match parse(source) {
        Ok(module) => module,
        Err(err) => {
            return vec![Violation::Syntax {
                line: err.line,
                message: err.message,
            }];
        }
    };

    let mut violations = Vec::new();
    module.walk(&mut |stmt| check_statement(stmt, &mut violations));
    violations
}

/// Substring denylist over the raw text.
pub fn lexical_violations(source: &str) -> Vec<Violation> {
    FORBIDDEN_SUBSTRINGS
        .iter()
        .copied()
        .filter(|token| source.contains(*token))
        .map(|token| Violation::ForbiddenSubstring { token })
        .collect()
}

fn check_statement(stmt: &Statement, violations: &mut Vec<Violation>) {
    let node = match stmt.keyword() {
        Some("import") => Some("Import"),
        Some("from") if stmt.tokens.iter().any(|tok| tok.is_name("import")) => Some("ImportFrom"),
        Some("global") => Some("Global"),
        Some("nonlocal") => Some("Nonlocal"),
        Some("with") if stmt.is_compound() => Some("With"),
        _ => None,
    };
    if let Some(node) = node {
        violations.push(Violation::ForbiddenNode {
            line: stmt.line,
            node,
        });
    }
    check_tokens(&stmt.tokens, violations);
}

fn check_tokens(tokens: &[Token], violations: &mut Vec<Violation>) {
    let bindings = binding_names(tokens);
    for (idx, tok) in tokens.iter().enumerate() {
        if is_fstring(tok) {
            check_fstring(tok, violations);
            continue;
        }
        if tok.kind != TokenKind::Name || !tok.text.starts_with(DUNDER) || bindings[idx] {
            continue;
        }
        let prev = idx.checked_sub(1).and_then(|i| tokens.get(i));
        if prev.is_some_and(|p| p.is_name("def") || p.is_name("class")) {
            // Definitions bind a name; they do not look one up.
            continue;
        }
        let next = tokens.get(idx + 1);
        if prev.is_some_and(|p| p.is_op(".")) {
            violations.push(Violation::DunderAttribute {
                line: tok.line,
                name: tok.text.clone(),
            });
            continue;
        }
        if tok.text == "__import__" && next.is_some_and(|n| n.is_op("(")) {
            violations.push(Violation::ForbiddenCall {
                line: tok.line,
                name: tok.text.clone(),
            });
        }
        violations.push(Violation::DunderName {
            line: tok.line,
            name: tok.text.clone(),
        });
    }
}

/// Marks Name tokens that are parameter or keyword-argument names.
///
/// These never appear as name lookups: `def f(__x)`, `lambda __x: 0` and
/// `f(__x=1)` bind or label a name without reading one. Default values and
/// call arguments are still lookups.
fn binding_names(tokens: &[Token]) -> Vec<bool> {
    let mut bindings = vec![false; tokens.len()];
    let mut brackets: Vec<&str> = Vec::new();
    let mut def_params: Option<usize> = None;
    let mut lambdas: Vec<usize> = Vec::new();

    for (idx, tok) in tokens.iter().enumerate() {
        let prev = idx.checked_sub(1).and_then(|i| tokens.get(i));
        if tok.kind == TokenKind::Op {
            match tok.text.as_str() {
                "(" | "[" | "{" => {
                    brackets.push(tok.text.as_str());
                    let before = idx.checked_sub(2).and_then(|i| tokens.get(i));
                    if tok.is_op("(") && before.is_some_and(|t| t.is_name("def")) {
                        def_params = Some(brackets.len());
                    }
                }
                ")" | "]" | "}" => {
                    if def_params == Some(brackets.len()) {
                        def_params = None;
                    }
                    brackets.pop();
                }
                ":" if lambdas.last() == Some(&brackets.len()) => {
                    lambdas.pop();
                }
                _ => {}
            }
            continue;
        }
        if tok.is_name("lambda") {
            lambdas.push(brackets.len());
            continue;
        }
        if tok.kind != TokenKind::Name {
            continue;
        }
        let starts_item = prev.is_some_and(|p| {
            p.is_op("(") || p.is_op(",") || p.is_op("*") || p.is_op("**") || p.is_name("lambda")
        });
        if !starts_item {
            continue;
        }
        let depth = brackets.len();
        let keyword = brackets.last() == Some(&"(")
            && tokens.get(idx + 1).is_some_and(|next| next.is_op("="));
        bindings[idx] = keyword || def_params == Some(depth) || lambdas.last() == Some(&depth);
    }
    bindings
}

/// Expressions inside f-string replacement fields are code too.
fn check_fstring(tok: &Token, violations: &mut Vec<Violation>) {
    for field in fstring_fields(tok) {
        match tokenize(&field) {
            Ok(mut inner) => {
                for inner_tok in &mut inner {
                    inner_tok.line = tok.line;
                }
                check_tokens(&inner, violations);
            }
            Err(err) => violations.push(Violation::Syntax {
                line: tok.line,
                message: format!("f-string: {}", err.message),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn structural(source: &str) -> Vec<String> {
        structural_violations(source)
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn plain_program_is_safe() {
        let result = analyze("print('Door unlocked')\n");
        assert!(result.is_safe);
        assert!(result.violations.is_empty());
    }

    #[test]
    fn function_definitions_are_safe() {
        let source = "def add(a, b):\n    total = a + b\n    return total\n\nprint(add(2, 3))\n";
        assert!(analyze(source).is_safe);
    }

    #[test]
    fn import_is_rejected_by_both_checks() {
        let result = analyze("import os");
        assert!(!result.is_safe);
        assert_eq!(
            result.violations,
            vec![
                "Forbidden node: Import (line 1)".to_string(),
                "Forbidden token in source: 'import'".to_string(),
            ]
        );
    }

    #[test]
    fn from_import_is_rejected() {
        assert_eq!(
            structural("from os import path\n"),
            vec!["Forbidden node: ImportFrom (line 1)"]
        );
    }

    #[test]
    fn import_after_semicolon_is_rejected() {
        assert_eq!(
            structural("x = 1; import sys\n"),
            vec!["Forbidden node: Import (line 1)"]
        );
    }

    #[test]
    fn import_inside_block_is_rejected() {
        let source = "def f():\n    if True:\n        import os\n";
        assert_eq!(structural(source), vec!["Forbidden node: Import (line 3)"]);
    }

    #[test]
    fn global_and_nonlocal_are_rejected() {
        let source = "def f():\n    global x\n    def g():\n        nonlocal y\n";
        assert_eq!(
            structural(source),
            vec![
                "Forbidden node: Global (line 2)",
                "Forbidden node: Nonlocal (line 4)"
            ]
        );
    }

    #[test]
    fn with_is_rejected() {
        assert_eq!(
            structural("with thing() as t:\n    pass\n"),
            vec!["Forbidden node: With (line 1)"]
        );
        assert_eq!(
            structural("async def f():\n    async with x:\n        pass\n"),
            vec!["Forbidden node: With (line 2)"]
        );
    }

    #[test]
    fn dunder_lookups_are_rejected() {
        assert_eq!(
            structural("x = ().__class__\n"),
            vec!["Forbidden dunder attribute: __class__ (line 1)"]
        );
        assert_eq!(
            structural("print(__builtins__)\n"),
            vec!["Forbidden dunder name: __builtins__ (line 1)"]
        );
    }

    #[test]
    fn dynamic_import_call_is_rejected() {
        assert_eq!(
            structural("m = __import__('os')\n"),
            vec![
                "Forbidden call: __import__ (line 1)",
                "Forbidden dunder name: __import__ (line 1)"
            ]
        );
    }

    #[test]
    fn dunder_definitions_are_only_caught_lexically() {
        let source = "class A:\n    def __init__(self):\n        self.x = 1\n";
        assert!(structural(source).is_empty());
        assert_eq!(
            analyze(source).violations,
            vec!["Forbidden token in source: '__'".to_string()]
        );
    }

    #[test]
    fn fstring_fields_are_checked() {
        let source = "print(f\"{().__class__}\")\n";
        assert_eq!(
            structural(source),
            vec!["Forbidden dunder attribute: __class__ (line 1)"]
        );
    }

    #[test]
    fn words_in_strings_trip_only_the_lexical_check() {
        let source = "print('please open the door')\n";
        assert!(structural(source).is_empty());
        assert_eq!(
            analyze(source).violations,
            vec!["Forbidden token in source: 'open'".to_string()]
        );
    }

    #[test]
    fn syntax_error_is_a_violation_not_a_crash() {
        let result = analyze("print('unterminated\n");
        assert!(!result.is_safe);
        assert_eq!(
            result.violations,
            vec!["SyntaxError: unterminated string literal (line 1)".to_string()]
        );
    }

    #[test]
    fn lexical_check_runs_even_when_parsing_fails() {
        let result = analyze("eval(\n");
        assert_eq!(
            result.violations,
            vec![
                "SyntaxError: '(' was never closed (line 1)".to_string(),
                "Forbidden token in source: 'eval'".to_string(),
            ]
        );
    }

    #[test]
    fn reports_every_violation() {
        let source = "import os\nglobal g\nexec('x')\n";
        let result = analyze(source);
        assert_eq!(
            result.violations,
            vec![
                "Forbidden node: Import (line 1)".to_string(),
                "Forbidden node: Global (line 2)".to_string(),
                "Forbidden token in source: 'import'".to_string(),
                "Forbidden token in source: 'exec'".to_string(),
            ]
        );
    }

    #[test]
    fn parameter_and_keyword_names_are_not_lookups() {
        assert!(structural("def f(a, __x, *__rest, __k=1, **__kw):\n    return a\n").is_empty());
        assert!(structural("g = lambda __x, __y=2: 0\n").is_empty());
        assert!(structural("f(1, __x=2)\n").is_empty());
        // Lexically the source is still rejected.
        assert!(!analyze("f(__x=2)\n").is_safe);
    }

    #[test]
    fn defaults_and_arguments_are_still_lookups() {
        assert_eq!(
            structural("def f(x=__y):\n    return g(__z)\n"),
            vec![
                "Forbidden dunder name: __y (line 1)",
                "Forbidden dunder name: __z (line 2)"
            ]
        );
        assert_eq!(
            structural("def f(x): return g(__z)\n"),
            vec!["Forbidden dunder name: __z (line 1)"]
        );
        assert_eq!(
            structural("f(lambda a: a, __b)\n"),
            vec!["Forbidden dunder name: __b (line 1)"]
        );
    }
}
