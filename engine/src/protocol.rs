//! Request handling: one JSON request in, one [`Response`] out.
//!
//! Pipeline: parse the request, gate it through the analyzer, load the
//! puzzle, execute once, evaluate goals, assemble the response. Every failure
//! becomes an in-band `ok: false` response.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::core::analyzer::analyze;
use crate::core::hooks::HookRegistry;
use crate::core::response::{failure, line_count, scored, unsafe_submission};
use crate::core::types::{Limits, Program, Response, Submission};
use crate::goals::{GoalEvaluator, GoalInput};
use crate::io::config::EngineConfig;
use crate::io::puzzle::{PuzzleStore, is_valid_puzzle_id};
use crate::io::sandbox::Sandbox;

/// Puzzle id used when a request names none.
pub const DEFAULT_PUZZLE_ID: &str = "unknown";

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawRequest {
    puzzle_id: String,
    code: String,
    limits: RawLimits,
}

impl Default for RawRequest {
    fn default() -> Self {
        Self {
            puzzle_id: DEFAULT_PUZZLE_ID.to_string(),
            code: String::new(),
            limits: RawLimits::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawLimits {
    cpu_ms: Option<u64>,
    mem_mb: Option<u64>,
}

/// Parse and validate a raw request, filling defaults from `config`.
pub fn parse_request(raw: &str, config: &EngineConfig) -> Result<Submission> {
    let request: RawRequest = serde_json::from_str(raw).context("parse request")?;
    if !is_valid_puzzle_id(&request.puzzle_id) {
        bail!("invalid puzzle_id '{}'", request.puzzle_id);
    }
    let defaults = config.default_limits();
    let requested = Limits {
        cpu_ms: request.limits.cpu_ms.unwrap_or(defaults.cpu_ms),
        mem_mb: request.limits.mem_mb.unwrap_or(defaults.mem_mb),
    };
    if requested.cpu_ms == 0 || requested.mem_mb == 0 {
        bail!("limits.cpu_ms and limits.mem_mb must be > 0");
    }
    Ok(Submission {
        puzzle_id: request.puzzle_id,
        source: request.code,
        limits: config.clamp(requested),
    })
}

/// Stateless request handler wiring the pipeline stages together.
pub struct Engine<S> {
    config: EngineConfig,
    sandbox: S,
    hooks: HookRegistry,
    puzzles: PuzzleStore,
}

impl<S: Sandbox> Engine<S> {
    pub fn new(config: EngineConfig, sandbox: S) -> Self {
        let puzzles = PuzzleStore::new(config.puzzles_dir.clone());
        Self {
            config,
            sandbox,
            hooks: HookRegistry::with_builtins(),
            puzzles,
        }
    }

    /// Replace the hook registry used for `custom_eval` goals.
    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn sandbox(&self) -> &S {
        &self.sandbox
    }

    /// Handle one raw request. Never fails; faults are reported in-band.
    pub fn handle(&self, raw: &str) -> Response {
        match parse_request(raw, &self.config) {
            Ok(submission) => self.submit(&submission),
            Err(err) => {
                warn!(err = %format!("{err:#}"), "malformed request");
                failure(format!("Bad JSON request: {err:#}"), 0)
            }
        }
    }

    /// Run a parsed submission through analysis, execution and scoring.
    #[instrument(skip_all, fields(puzzle_id = %submission.puzzle_id))]
    pub fn submit(&self, submission: &Submission) -> Response {
        let source = submission.source.as_str();
        let analysis = analyze(source);
        if !analysis.is_safe {
            info!(violations = analysis.violations.len(), "submission rejected");
            return unsafe_submission(source, analysis.violations);
        }

        let puzzle = match self.puzzles.load(&submission.puzzle_id) {
            Ok(puzzle) => puzzle,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "puzzle load failed");
                return failure(format!("Puzzle load failed: {err:#}"), line_count(source));
            }
        };

        let execution = match self
            .sandbox
            .execute(&Program::new(source), &submission.limits)
        {
            Ok(execution) => execution,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "execution fault");
                return failure(format!("Execution failed: {err:#}"), line_count(source));
            }
        };
        debug!(
            exit_status = execution.exit_status,
            elapsed_ms = execution.elapsed.as_millis() as u64,
            "submission executed"
        );

        let evaluator = GoalEvaluator::new(&self.sandbox, &self.hooks);
        let (all_pass, assertions) = evaluator.evaluate(
            &puzzle.goals,
            GoalInput {
                source,
                stdout: &execution.stdout,
                limits: &submission.limits,
            },
        );
        info!(all_pass, exit_status = execution.exit_status, "submission scored");
        scored(source, execution, assertions, &puzzle.world_actions_on_pass)
    }
}
