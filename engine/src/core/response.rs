//! Response assembly.
//!
//! Every response leaves here, so `score` and `world_actions` are derived
//! from the assertion list in one place: `score` counts passing assertions,
//! and world actions are released only when every assertion passed.

use serde_json::Value;

use crate::core::types::{
    AST_SAFETY, Assertion, AssertionDetails, ExecutionResult, Response, Telemetry,
};

/// Number of lines in the submitted source, as reported in telemetry.
pub fn line_count(source: &str) -> usize {
    source.lines().count()
}

/// Build a scored response from a completed execution and its assertions.
pub fn scored(
    source: &str,
    execution: ExecutionResult,
    assertions: Vec<Assertion>,
    world_actions_on_pass: &[Value],
) -> Response {
    let all_pass = assertions.iter().all(|a| a.pass);
    let ok = all_pass && execution.success() && execution.stderr.is_empty();
    let world_actions = if all_pass {
        world_actions_on_pass.to_vec()
    } else {
        Vec::new()
    };
    Response {
        ok,
        score: score(&assertions),
        stdout: execution.stdout,
        stderr: execution.stderr,
        assertions,
        world_actions,
        telemetry: Telemetry {
            exec_ms: u64::try_from(execution.elapsed.as_millis()).unwrap_or(u64::MAX),
            lines: line_count(source),
        },
    }
}

/// Response for a submission rejected by the static analyzer.
pub fn unsafe_submission(source: &str, violations: Vec<String>) -> Response {
    Response {
        ok: false,
        stdout: String::new(),
        stderr: violations.join("\n"),
        assertions: vec![Assertion {
            name: AST_SAFETY.to_string(),
            pass: false,
            details: AssertionDetails::Safety { errors: violations },
        }],
        score: 0,
        world_actions: Vec::new(),
        telemetry: Telemetry {
            exec_ms: 0,
            lines: line_count(source),
        },
    }
}

/// Response for a request that never reached execution, or whose execution
/// could not be carried out by the environment.
pub fn failure(diagnostic: impl Into<String>, lines: usize) -> Response {
    Response {
        ok: false,
        stdout: String::new(),
        stderr: diagnostic.into(),
        assertions: Vec::new(),
        score: 0,
        world_actions: Vec::new(),
        telemetry: Telemetry { exec_ms: 0, lines },
    }
}

fn score(assertions: &[Assertion]) -> usize {
    assertions.iter().filter(|a| a.pass).count()
}
