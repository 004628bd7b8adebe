//! Named extension hooks for `custom_eval` goals.
//!
//! A hook sees the submitted source and the captured stdout, never a way to
//! run code. Names without a registered hook pass as a no-op.

use std::collections::BTreeMap;

use serde_json::Value;

/// Read-only view handed to a hook.
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    pub source: &'a str,
    pub stdout: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookVerdict {
    pub pass: bool,
    pub detail: Option<String>,
}

impl HookVerdict {
    pub fn pass() -> Self {
        Self {
            pass: true,
            detail: None,
        }
    }

    pub fn fail(detail: impl Into<String>) -> Self {
        Self {
            pass: false,
            detail: Some(detail.into()),
        }
    }
}

pub trait GoalHook: Send + Sync {
    fn evaluate(&self, ctx: &HookContext<'_>, args: &Value) -> HookVerdict;
}

impl<F> GoalHook for F
where
    F: Fn(&HookContext<'_>, &Value) -> HookVerdict + Send + Sync,
{
    fn evaluate(&self, ctx: &HookContext<'_>, args: &Value) -> HookVerdict {
        self(ctx, args)
    }
}

/// Hook lookup table keyed by hook name.
#[derive(Default)]
pub struct HookRegistry {
    hooks: BTreeMap<String, Box<dyn GoalHook>>,
}

impl HookRegistry {
    /// Registry preloaded with the built-in hooks.
    pub fn with_builtins() -> Self {
        let mut registry = Self::default();
        registry.register("stdout_equals", stdout_equals);
        registry.register("max_lines", max_lines);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, hook: impl GoalHook + 'static) {
        self.hooks.insert(name.into(), Box::new(hook));
    }

    pub fn get(&self, name: &str) -> Option<&dyn GoalHook> {
        self.hooks.get(name).map(|hook| hook.as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.hooks.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// `{"value": "..."}`: trimmed stdout equals the trimmed value.
fn stdout_equals(ctx: &HookContext<'_>, args: &Value) -> HookVerdict {
    let Some(expected) = args.get("value").and_then(Value::as_str) else {
        return HookVerdict::fail("stdout_equals requires a string 'value'");
    };
    if ctx.stdout.trim() == expected.trim() {
        HookVerdict::pass()
    } else {
        HookVerdict::fail(format!("expected stdout {:?}", expected.trim()))
    }
}

/// `{"max": n}`: the source has at most `n` lines.
fn max_lines(ctx: &HookContext<'_>, args: &Value) -> HookVerdict {
    let Some(max) = args.get("max").and_then(Value::as_u64) else {
        return HookVerdict::fail("max_lines requires an integer 'max'");
    };
    let lines = ctx.source.lines().count() as u64;
    if lines <= max {
        HookVerdict::pass()
    } else {
        HookVerdict::fail(format!("{lines} lines exceeds the limit of {max}"))
    }
}
