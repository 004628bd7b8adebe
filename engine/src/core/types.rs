//! Shared data model for the submission pipeline.
//!
//! These types are the stable contracts between the analyzer, the sandbox,
//! the goal evaluator and the JSON protocol. They carry no I/O.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Reserved `exit_status` reported when the wall-clock budget expires.
pub const TIMEOUT_EXIT_STATUS: i32 = 124;

/// Synthetic stderr attached to a timed-out execution.
pub const TIMEOUT_MESSAGE: &str = "Timeout: code exceeded time limit";

pub const DEFAULT_CPU_MS: u64 = 2000;
pub const DEFAULT_MEM_MB: u64 = 128;

/// Per-execution resource budget requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Wall-clock budget in milliseconds; also drives the CPU-time ceiling.
    pub cpu_ms: u64,
    /// Address-space ceiling in MiB.
    pub mem_mb: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            cpu_ms: DEFAULT_CPU_MS,
            mem_mb: DEFAULT_MEM_MB,
        }
    }
}

impl Limits {
    pub fn wall_timeout(&self) -> Duration {
        Duration::from_millis(self.cpu_ms)
    }

    /// CPU-time ceiling in whole seconds (never below one second).
    pub fn cpu_seconds(&self) -> u64 {
        (self.cpu_ms / 1000).max(1)
    }

    pub fn memory_bytes(&self) -> u64 {
        self.mem_mb.saturating_mul(1024 * 1024)
    }
}

/// One user-provided program plus its declared resource limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub puzzle_id: String,
    pub source: String,
    pub limits: Limits,
}

/// Outcome of the static safety analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisResult {
    pub is_safe: bool,
    pub violations: Vec<String>,
}

impl AnalysisResult {
    pub fn from_violations(violations: Vec<String>) -> Self {
        Self {
            is_safe: violations.is_empty(),
            violations,
        }
    }
}

/// A program handed to the sandbox. `stdin` is an optional side channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub source: String,
    pub stdin: Option<String>,
}

impl Program {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            stdin: None,
        }
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }
}

/// Captured result of one sandboxed process run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Exit code, `-signal` when killed by a signal, or [`TIMEOUT_EXIT_STATUS`].
    pub exit_status: i32,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ExecutionResult {
    pub fn timed_out(elapsed: Duration) -> Self {
        Self {
            exit_status: TIMEOUT_EXIT_STATUS,
            stdout: String::new(),
            stderr: TIMEOUT_MESSAGE.to_string(),
            elapsed,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.exit_status == TIMEOUT_EXIT_STATUS
    }

    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

/// One `(arguments, expected)` pair of a function contract.
///
/// Serialized as the two-element JSON array `[[args...], expected]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractCase(pub Vec<Value>, pub Value);

impl ContractCase {
    pub fn args(&self) -> &[Value] {
        &self.0
    }

    pub fn expected(&self) -> &Value {
        &self.1
    }
}

/// Goal kind tags as they appear in puzzle definitions.
pub const STDOUT_INCLUDES: &str = "stdout_includes";
pub const FORBIDDEN_TOKENS: &str = "forbidden_tokens";
pub const FUNCTION_CONTRACT: &str = "function_contract";
pub const CUSTOM_EVAL: &str = "custom_eval";

const KNOWN_GOAL_KINDS: [&str; 4] = [STDOUT_INCLUDES, FORBIDDEN_TOKENS, FUNCTION_CONTRACT, CUSTOM_EVAL];

/// A single declarative pass/fail check associated with a puzzle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Goal {
    StdoutIncludes {
        value: String,
    },
    ForbiddenTokens {
        value: Vec<String>,
    },
    FunctionContract {
        name: String,
        #[serde(default)]
        cases: Vec<ContractCase>,
    },
    #[serde(rename = "custom_eval")]
    CustomHook {
        name: String,
        #[serde(default)]
        args: Value,
    },
    /// External input that does not describe a known goal.
    #[serde(skip)]
    Unrecognized { kind: String, reason: String },
}

impl Goal {
    /// Convert one raw goal object, keeping unrecognized input as a failing goal.
    pub fn from_value(value: Value) -> Self {
        let kind = match value.get("type") {
            Some(Value::String(kind)) => kind.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        match serde_json::from_value::<Goal>(value) {
            Ok(goal) => goal,
            Err(err) if KNOWN_GOAL_KINDS.contains(&kind.as_str()) => Goal::Unrecognized {
                reason: format!("Invalid goal '{kind}': {err}"),
                kind,
            },
            Err(_) => Goal::Unrecognized {
                reason: format!("Unknown goal type '{kind}'"),
                kind,
            },
        }
    }

    /// Tag reported as the assertion name.
    pub fn kind(&self) -> &str {
        match self {
            Goal::StdoutIncludes { .. } => STDOUT_INCLUDES,
            Goal::ForbiddenTokens { .. } => FORBIDDEN_TOKENS,
            Goal::FunctionContract { .. } => FUNCTION_CONTRACT,
            Goal::CustomHook { .. } => CUSTOM_EVAL,
            Goal::Unrecognized { kind, .. } => kind,
        }
    }
}

/// Deserialize a goal list leniently: every element becomes a [`Goal`].
pub fn deserialize_goals<'de, D>(deserializer: D) -> Result<Vec<Goal>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<Value>::deserialize(deserializer)?;
    Ok(raw.into_iter().map(Goal::from_value).collect())
}

/// Kind-specific fields of an assertion, flattened into the assertion object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AssertionDetails {
    StdoutIncludes {
        needle: String,
    },
    ForbiddenTokens {
        tokens: Vec<String>,
        found: Vec<String>,
    },
    FunctionContract {
        function: String,
        cases: Vec<bool>,
        harness_err: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        harness_error: Option<String>,
    },
    CustomHook {
        hook: String,
        registered: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    Safety {
        errors: Vec<String>,
    },
    Error {
        error: String,
    },
}

/// Recorded outcome of evaluating one goal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assertion {
    pub name: String,
    pub pass: bool,
    #[serde(flatten)]
    pub details: AssertionDetails,
}

/// Assertion name used for the synthetic safety failure.
pub const AST_SAFETY: &str = "ast_safety";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Telemetry {
    pub exec_ms: u64,
    pub lines: usize,
}

/// The single JSON object written back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub ok: bool,
    pub stdout: String,
    pub stderr: String,
    pub assertions: Vec<Assertion>,
    pub score: usize,
    pub world_actions: Vec<Value>,
    pub telemetry: Telemetry,
}
