//! Goal evaluation against a submission and its captured output.
//!
//! Goals are evaluated in declaration order and independently of each other.
//! A goal that cannot be evaluated becomes a failing assertion; nothing here
//! aborts the request.

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::core::harness::{build_harness, parse_report};
use crate::core::hooks::{HookContext, HookRegistry};
use crate::core::types::{Assertion, AssertionDetails, ContractCase, Goal, Limits};
use crate::io::sandbox::Sandbox;

/// Everything a goal may look at.
#[derive(Debug, Clone, Copy)]
pub struct GoalInput<'a> {
    pub source: &'a str,
    pub stdout: &'a str,
    pub limits: &'a Limits,
}

/// Evaluates goals, re-entering the sandbox for function contracts.
pub struct GoalEvaluator<'a, S: ?Sized> {
    sandbox: &'a S,
    hooks: &'a HookRegistry,
}

impl<'a, S: Sandbox + ?Sized> GoalEvaluator<'a, S> {
    pub fn new(sandbox: &'a S, hooks: &'a HookRegistry) -> Self {
        Self { sandbox, hooks }
    }

    /// Evaluate every goal; returns whether all passed plus one assertion per goal.
    #[instrument(skip_all, fields(goals = goals.len()))]
    pub fn evaluate(&self, goals: &[Goal], input: GoalInput<'_>) -> (bool, Vec<Assertion>) {
        let assertions: Vec<Assertion> = goals
            .iter()
            .map(|goal| self.evaluate_goal(goal, input))
            .collect();
        let all_pass = assertions.iter().all(|a| a.pass);
        debug!(all_pass, passed = assertions.iter().filter(|a| a.pass).count(), "goals evaluated");
        (all_pass, assertions)
    }

    fn evaluate_goal(&self, goal: &Goal, input: GoalInput<'_>) -> Assertion {
        let name = goal.kind().to_string();
        let (pass, details) = match goal {
            Goal::StdoutIncludes { value } => (
                input.stdout.contains(value.as_str()),
                AssertionDetails::StdoutIncludes {
                    needle: value.clone(),
                },
            ),
            Goal::ForbiddenTokens { value } => {
                let found: Vec<String> = value
                    .iter()
                    .filter(|token| input.source.contains(token.as_str()))
                    .cloned()
                    .collect();
                (
                    found.is_empty(),
                    AssertionDetails::ForbiddenTokens {
                        tokens: value.clone(),
                        found,
                    },
                )
            }
            Goal::FunctionContract { name, cases } => self.function_contract(name, cases, input),
            Goal::CustomHook { name, args } => match self.hooks.get(name) {
                Some(hook) => {
                    let ctx = HookContext {
                        source: input.source,
                        stdout: input.stdout,
                    };
                    let verdict = hook.evaluate(&ctx, args);
                    (
                        verdict.pass,
                        AssertionDetails::CustomHook {
                            hook: name.clone(),
                            registered: true,
                            detail: verdict.detail,
                        },
                    )
                }
                None => {
                    debug!(hook = %name, "no hook registered, passing");
                    (
                        true,
                        AssertionDetails::CustomHook {
                            hook: name.clone(),
                            registered: false,
                            detail: None,
                        },
                    )
                }
            },
            Goal::Unrecognized { reason, .. } => {
                warn!(reason = %reason, "unrecognized goal");
                (
                    false,
                    AssertionDetails::Error {
                        error: reason.clone(),
                    },
                )
            }
        };
        Assertion {
            name,
            pass,
            details,
        }
    }

    fn function_contract(
        &self,
        function: &str,
        cases: &[ContractCase],
        input: GoalInput<'_>,
    ) -> (bool, AssertionDetails) {
        let outcome = match self.run_harness(function, cases, input) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(function, err = %format!("{err:#}"), "harness fault");
                ContractOutcome::failed(String::new(), format!("HARNESS: {err:#}"))
            }
        };
        (
            outcome.ok,
            AssertionDetails::FunctionContract {
                function: function.to_string(),
                cases: outcome.cases,
                harness_err: outcome.stderr,
                harness_error: outcome.error,
            },
        )
    }

    fn run_harness(
        &self,
        function: &str,
        cases: &[ContractCase],
        input: GoalInput<'_>,
    ) -> Result<ContractOutcome> {
        let run = build_harness(input.source, function, cases).context("encode harness payload")?;
        let result = self
            .sandbox
            .execute(&run.program, input.limits)
            .context("run harness")?;
        debug!(function, exit_status = result.exit_status, "harness finished");

        if result.is_timeout() {
            return Ok(ContractOutcome::failed(
                result.stderr,
                "HARNESS: timed out".to_string(),
            ));
        }
        if !result.success() {
            let error = format!("HARNESS: exited with status {}", result.exit_status);
            return Ok(ContractOutcome::failed(result.stderr, error));
        }
        match parse_report(&result.stdout, &run.nonce) {
            Ok(report) => {
                if !report.ok {
                    debug!(function, cases = ?report.cases, "contract not satisfied");
                }
                Ok(ContractOutcome {
                    ok: report.ok && report.cases.iter().all(|case| *case),
                    cases: report.cases,
                    stderr: result.stderr,
                    error: None,
                })
            }
            Err(error) => Ok(ContractOutcome::failed(result.stderr, error)),
        }
    }
}

struct ContractOutcome {
    ok: bool,
    cases: Vec<bool>,
    stderr: String,
    error: Option<String>,
}

impl ContractOutcome {
    fn failed(stderr: String, error: String) -> Self {
        Self {
            ok: false,
            cases: Vec::new(),
            stderr,
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::harness::HARNESS_SOURCE;
    use crate::core::hooks::HookVerdict;
    use crate::core::types::{ExecutionResult, FUNCTION_CONTRACT};
    use crate::test_support::{ScriptedRun, ScriptedSandbox, exited};
    use serde_json::{Value, json};
    use std::time::Duration;

    const LIMITS: Limits = Limits {
        cpu_ms: 2000,
        mem_mb: 128,
    };

    fn input<'a>(source: &'a str, stdout: &'a str) -> GoalInput<'a> {
        GoalInput {
            source,
            stdout,
            limits: &LIMITS,
        }
    }

    fn goals(raw: Value) -> Vec<Goal> {
        raw.as_array()
            .expect("array")
            .iter()
            .cloned()
            .map(Goal::from_value)
            .collect()
    }

    fn add_contract() -> Vec<Goal> {
        goals(json!([
            {"type": "function_contract", "name": "add", "cases": [[[2, 3], 5], [[0, 0], 1]]}
        ]))
    }

    #[test]
    fn stdout_and_token_goals_keep_declaration_order() {
        let sandbox = ScriptedSandbox::default();
        let hooks = HookRegistry::default();
        let evaluator = GoalEvaluator::new(&sandbox, &hooks);
        let (all_pass, assertions) = evaluator.evaluate(
            &goals(json!([
                {"type": "stdout_includes", "value": "Door unlocked"},
                {"type": "forbidden_tokens", "value": ["print", "while", "for"]}
            ])),
            input("print('Door unlocked')\n", "Door unlocked\n"),
        );

        assert!(!all_pass);
        assert_eq!(
            serde_json::to_value(&assertions).expect("serialize"),
            json!([
                {"name": "stdout_includes", "pass": true, "needle": "Door unlocked"},
                {"name": "forbidden_tokens", "pass": false, "tokens": ["print", "while", "for"], "found": ["print"]}
            ])
        );
        assert!(sandbox.programs().is_empty());
    }

    #[test]
    fn no_goals_pass_vacuously() {
        let sandbox = ScriptedSandbox::default();
        let hooks = HookRegistry::default();
        let (all_pass, assertions) =
            GoalEvaluator::new(&sandbox, &hooks).evaluate(&[], input("", ""));
        assert!(all_pass);
        assert!(assertions.is_empty());
    }

    #[test]
    fn function_contract_reports_per_case_results() {
        let sandbox = ScriptedSandbox::new(vec![ScriptedRun::HarnessReport {
            ok: false,
            cases: vec![true, false],
        }]);
        let hooks = HookRegistry::default();
        let source = "def add(a, b):\n    return a + b\n";
        let (all_pass, assertions) =
            GoalEvaluator::new(&sandbox, &hooks).evaluate(&add_contract(), input(source, ""));

        assert!(!all_pass);
        assert_eq!(assertions[0].name, FUNCTION_CONTRACT);
        assert_eq!(
            assertions[0].details,
            AssertionDetails::FunctionContract {
                function: "add".to_string(),
                cases: vec![true, false],
                harness_err: String::new(),
                harness_error: None,
            }
        );

        let programs = sandbox.programs();
        assert_eq!(programs.len(), 1);
        assert_eq!(programs[0].source, HARNESS_SOURCE);
        let payload: Value =
            serde_json::from_str(programs[0].stdin.as_deref().expect("stdin")).expect("json");
        assert_eq!(payload["code"], json!(source));
        assert_eq!(sandbox.limits(), vec![LIMITS]);
    }

    #[test]
    fn function_contract_passes_when_every_case_passes() {
        let sandbox = ScriptedSandbox::new(vec![ScriptedRun::HarnessReport {
            ok: true,
            cases: vec![true, true],
        }]);
        let hooks = HookRegistry::default();
        let (all_pass, assertions) =
            GoalEvaluator::new(&sandbox, &hooks).evaluate(&add_contract(), input("", ""));
        assert!(all_pass);
        assert!(assertions[0].pass);
    }

    #[test]
    fn harness_load_failure_fails_with_empty_cases() {
        let sandbox = ScriptedSandbox::new(vec![ScriptedRun::HarnessReport {
            ok: false,
            cases: vec![],
        }]);
        let hooks = HookRegistry::default();
        let (all_pass, assertions) =
            GoalEvaluator::new(&sandbox, &hooks).evaluate(&add_contract(), input("", ""));
        assert!(!all_pass);
        assert!(!assertions[0].pass);
    }

    #[test]
    fn forged_report_is_rejected() {
        let forged = r#"{"nonce": "guess", "ok": true, "cases": [true, true]}"#;
        let sandbox = ScriptedSandbox::new(vec![ScriptedRun::Result(exited(0, forged, ""))]);
        let hooks = HookRegistry::default();
        let (all_pass, assertions) =
            GoalEvaluator::new(&sandbox, &hooks).evaluate(&add_contract(), input("", ""));
        assert!(!all_pass);
        let AssertionDetails::FunctionContract { harness_error, .. } = &assertions[0].details
        else {
            panic!("unexpected details: {:?}", assertions[0].details);
        };
        assert_eq!(
            harness_error.as_deref(),
            Some("HARNESS: report did not come from the harness")
        );
    }

    #[test]
    fn harness_faults_become_failed_assertions() {
        let sandbox = ScriptedSandbox::new(vec![
            ScriptedRun::Result(exited(1, "", "Traceback")),
            ScriptedRun::Result(ExecutionResult::timed_out(Duration::from_secs(2))),
            ScriptedRun::Fault("no space left".to_string()),
        ]);
        let hooks = HookRegistry::default();
        let mut contracts = add_contract();
        contracts.extend(add_contract());
        contracts.extend(add_contract());
        let (all_pass, assertions) =
            GoalEvaluator::new(&sandbox, &hooks).evaluate(&contracts, input("", ""));

        assert!(!all_pass);
        let errors: Vec<(String, Option<String>)> = assertions
            .iter()
            .map(|a| match &a.details {
                AssertionDetails::FunctionContract {
                    harness_err,
                    harness_error,
                    ..
                } => (harness_err.clone(), harness_error.clone()),
                other => panic!("unexpected details: {other:?}"),
            })
            .collect();
        assert_eq!(
            errors[0],
            (
                "Traceback".to_string(),
                Some("HARNESS: exited with status 1".to_string())
            )
        );
        assert_eq!(errors[1].1.as_deref(), Some("HARNESS: timed out"));
        let fault = errors[2].1.as_deref().expect("fault");
        assert!(fault.contains("run harness"));
        assert!(fault.contains("no space left"));
    }

    #[test]
    fn custom_hooks_use_registry() {
        let sandbox = ScriptedSandbox::default();
        let mut hooks = HookRegistry::with_builtins();
        hooks.register("always_fail", |_: &HookContext<'_>, _: &Value| {
            HookVerdict::fail("nope")
        });
        let (all_pass, assertions) = GoalEvaluator::new(&sandbox, &hooks).evaluate(
            &goals(json!([
                {"type": "custom_eval", "name": "stdout_equals", "args": {"value": "42"}},
                {"type": "custom_eval", "name": "unregistered"},
                {"type": "custom_eval", "name": "always_fail"}
            ])),
            input("print(42)\n", "42\n"),
        );

        assert!(!all_pass);
        assert_eq!(
            serde_json::to_value(&assertions).expect("serialize"),
            json!([
                {"name": "custom_eval", "pass": true, "hook": "stdout_equals", "registered": true},
                {"name": "custom_eval", "pass": true, "hook": "unregistered", "registered": false},
                {"name": "custom_eval", "pass": false, "hook": "always_fail", "registered": true, "detail": "nope"}
            ])
        );
    }

    #[test]
    fn unrecognized_goals_fail_explicitly() {
        let sandbox = ScriptedSandbox::default();
        let hooks = HookRegistry::default();
        let (all_pass, assertions) = GoalEvaluator::new(&sandbox, &hooks).evaluate(
            &goals(json!([{"type": "teleport"}])),
            input("", ""),
        );
        assert!(!all_pass);
        assert_eq!(
            serde_json::to_value(&assertions[0]).expect("serialize"),
            json!({"name": "teleport", "pass": false, "error": "Unknown goal type 'teleport'"})
        );
    }
}
