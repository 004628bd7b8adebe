//! Function-contract harness construction and report parsing.
//!
//! The harness is a fixed program compiled into the binary. Everything that
//! varies per goal (submission source, function name, cases) travels as a JSON
//! payload on the harness's stdin, so submitted text is never spliced into
//! program text. A random nonce ties the final report line to this harness
//! run; a line printed by the submission cannot carry it.

use rand::distributions::Alphanumeric;
use rand::{Rng, thread_rng};
use serde::{Deserialize, Serialize};

use crate::core::types::{ContractCase, Program};

/// Python source of the function-contract harness.
pub const HARNESS_SOURCE: &str = include_str!("../../harness/function_contract.py");

const NONCE_LEN: usize = 24;

#[derive(Debug, Serialize)]
struct HarnessPayload<'a> {
    nonce: &'a str,
    code: &'a str,
    function: &'a str,
    cases: &'a [ContractCase],
}

/// Structured result printed by the harness as its last line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HarnessReport {
    pub ok: bool,
    pub cases: Vec<bool>,
}

#[derive(Debug, Deserialize)]
struct RawReport {
    nonce: String,
    ok: bool,
    cases: Vec<bool>,
}

/// A harness program plus the nonce its report must carry.
#[derive(Debug, Clone)]
pub struct HarnessRun {
    pub program: Program,
    pub nonce: String,
}

/// Build the harness program for one function contract.
pub fn build_harness(
    source: &str,
    function: &str,
    cases: &[ContractCase],
) -> serde_json::Result<HarnessRun> {
    let nonce = generate_nonce();
    let payload = HarnessPayload {
        nonce: &nonce,
        code: source,
        function,
        cases,
    };
    let stdin = serde_json::to_string(&payload)?;
    Ok(HarnessRun {
        program: Program::new(HARNESS_SOURCE).with_stdin(stdin),
        nonce,
    })
}

fn generate_nonce() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect()
}

/// Parse the harness report from captured stdout.
///
/// Only the last non-empty line is considered, and it must carry `nonce`.
pub fn parse_report(stdout: &str, nonce: &str) -> Result<HarnessReport, String> {
    let last = stdout
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| "HARNESS: no output".to_string())?;
    let raw: RawReport = serde_json::from_str(last.trim())
        .map_err(|err| format!("HARNESS: invalid JSON output: {err}"))?;
    if raw.nonce != nonce {
        return Err("HARNESS: report did not come from the harness".to_string());
    }
    Ok(HarnessReport {
        ok: raw.ok,
        cases: raw.cases,
    })
}
