//! Test-only helpers: a scripted sandbox and execution result builders.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::process::Command;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use serde_json::{Value, json};

use crate::core::types::{ExecutionResult, Limits, Program};
use crate::io::sandbox::Sandbox;

/// One scripted reaction of [`ScriptedSandbox`].
#[derive(Debug, Clone)]
pub enum ScriptedRun {
    /// Return this result as-is.
    Result(ExecutionResult),
    /// Answer a harness program with a well-formed report carrying its nonce.
    HarnessReport { ok: bool, cases: Vec<bool> },
    /// Fail with an environment fault.
    Fault(String),
}

/// Sandbox that replays queued reactions and records every program it saw.
#[derive(Debug, Default)]
pub struct ScriptedSandbox {
    runs: RefCell<VecDeque<ScriptedRun>>,
    programs: RefCell<Vec<(Program, Limits)>>,
}

impl ScriptedSandbox {
    pub fn new(runs: Vec<ScriptedRun>) -> Self {
        Self {
            runs: RefCell::new(runs.into()),
            programs: RefCell::new(Vec::new()),
        }
    }

    /// Programs executed so far, in order.
    pub fn programs(&self) -> Vec<Program> {
        self.programs.borrow().iter().map(|(p, _)| p.clone()).collect()
    }

    pub fn limits(&self) -> Vec<Limits> {
        self.programs.borrow().iter().map(|(_, l)| *l).collect()
    }

    pub fn remaining(&self) -> usize {
        self.runs.borrow().len()
    }
}

impl Sandbox for ScriptedSandbox {
    fn execute(&self, program: &Program, limits: &Limits) -> Result<ExecutionResult> {
        self.programs.borrow_mut().push((program.clone(), *limits));
        let run = self
            .runs
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted sandbox exhausted"))?;
        match run {
            ScriptedRun::Result(result) => Ok(result),
            ScriptedRun::HarnessReport { ok, cases } => {
                let nonce = harness_nonce(program)?;
                let report = json!({"nonce": nonce, "ok": ok, "cases": cases});
                Ok(exited(0, &format!("\n{report}\n"), ""))
            }
            ScriptedRun::Fault(message) => bail!(message),
        }
    }
}

fn harness_nonce(program: &Program) -> Result<String> {
    let stdin = program
        .stdin
        .as_deref()
        .ok_or_else(|| anyhow!("program has no harness payload"))?;
    let payload: Value = serde_json::from_str(stdin)?;
    payload["nonce"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("harness payload has no nonce"))
}

/// A finished execution with the given status and output.
pub fn exited(exit_status: i32, stdout: &str, stderr: &str) -> ExecutionResult {
    ExecutionResult {
        exit_status,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        elapsed: Duration::from_millis(5),
    }
}

/// A clean run that printed `stdout`.
pub fn printed(stdout: &str) -> ExecutionResult {
    exited(0, stdout, "")
}

/// True when a `python3` interpreter can be spawned.
pub fn python_available() -> bool {
    Command::new("python3")
        .arg("-c")
        .arg("pass")
        .output()
        .is_ok_and(|out| out.status.success())
}
