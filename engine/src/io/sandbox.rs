//! Sandboxed execution of already-vetted programs.
//!
//! The [`Sandbox`] trait decouples goal evaluation from the process backend.
//! [`ProcessSandbox`] materializes the program in a scoped temporary directory
//! and runs it under kernel-enforced rlimits plus a wall-clock supervisor.
//! Callers must gate untrusted source through the analyzer first; the sandbox
//! does not re-check it.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;
use tracing::{debug, instrument, warn};

use crate::core::types::{ExecutionResult, Limits, Program};
use crate::io::config::EngineConfig;
use crate::io::process::run_command_with_timeout;

/// File name of the materialized program inside its temporary directory.
pub const PROGRAM_FILE: &str = "main.py";

/// Capability to run one program under resource limits.
///
/// Errors are environment faults only (temporary storage, spawn, wait). A
/// program that crashes, exceeds a limit, or times out is an ordinary
/// [`ExecutionResult`].
pub trait Sandbox {
    fn execute(&self, program: &Program, limits: &Limits) -> Result<ExecutionResult>;
}

impl<S: Sandbox + ?Sized> Sandbox for &S {
    fn execute(&self, program: &Program, limits: &Limits) -> Result<ExecutionResult> {
        (**self).execute(program, limits)
    }
}

/// OS-level ceilings applied to the child before it execs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessLimits {
    pub cpu_seconds: u64,
    pub memory_bytes: u64,
    pub file_size_bytes: u64,
}

impl ProcessLimits {
    pub fn new(limits: &Limits, file_size_bytes: u64) -> Self {
        Self {
            cpu_seconds: limits.cpu_seconds(),
            memory_bytes: limits.memory_bytes(),
            file_size_bytes,
        }
    }
}

/// Program materialized on disk; the directory is removed on drop.
struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn create(source: &str) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("engine-run-")
            .tempdir()
            .context("create temporary directory")?;
        let path = dir.path().join(PROGRAM_FILE);
        fs::write(&path, source).with_context(|| format!("write {}", path.display()))?;
        Ok(Self { dir })
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn program_path(&self) -> PathBuf {
        self.dir.path().join(PROGRAM_FILE)
    }
}

/// Sandbox that runs programs with the configured interpreter.
#[derive(Debug, Clone)]
pub struct ProcessSandbox {
    interpreter: Vec<String>,
    file_size_limit_bytes: u64,
    output_limit_bytes: usize,
}

impl ProcessSandbox {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            interpreter: config.interpreter.clone(),
            file_size_limit_bytes: config.limits.file_size_limit_bytes,
            output_limit_bytes: config.output_limit_bytes,
        }
    }

    fn command(&self, workspace: &Workspace, limits: ProcessLimits) -> Result<Command> {
        let (program, args) = self
            .interpreter
            .split_first()
            .ok_or_else(|| anyhow!("interpreter is not configured"))?;
        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg(workspace.program_path())
            .current_dir(workspace.root())
            .env_clear();
        if let Some(path) = std::env::var_os("PATH") {
            cmd.env("PATH", path);
        }
        apply_process_limits(&mut cmd, limits);
        Ok(cmd)
    }
}

impl Sandbox for ProcessSandbox {
    #[instrument(skip_all, fields(cpu_ms = limits.cpu_ms, mem_mb = limits.mem_mb, stdin = program.stdin.is_some()))]
    fn execute(&self, program: &Program, limits: &Limits) -> Result<ExecutionResult> {
        let workspace = Workspace::create(&program.source)?;
        debug!(dir = %workspace.root().display(), "materialized program");

        let process_limits = ProcessLimits::new(limits, self.file_size_limit_bytes);
        let cmd = self.command(&workspace, process_limits)?;
        let output = run_command_with_timeout(
            cmd,
            program.stdin.as_deref().map(str::as_bytes),
            limits.wall_timeout(),
            self.output_limit_bytes,
        )
        .context("run interpreter")?;

        if output.timed_out {
            warn!(cpu_ms = limits.cpu_ms, "program exceeded wall-clock budget");
            return Ok(ExecutionResult::timed_out(output.elapsed));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let mut stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        stderr.push_str(&output.stdout_truncated_notice());
        stderr.push_str(&output.stderr_truncated_notice());

        let result = ExecutionResult {
            exit_status: output.exit_code(),
            stdout,
            stderr,
            elapsed: output.elapsed,
        };
        debug!(exit_status = result.exit_status, "program finished");
        Ok(result)
    }
}

/// Install rlimits, a fresh session and a parent-death signal in the child.
#[cfg(unix)]
#[allow(unsafe_code)]
fn apply_process_limits(cmd: &mut Command, limits: ProcessLimits) {
    use std::os::unix::process::CommandExt;

    // SAFETY: the closure runs between fork and exec. It only issues
    // setsid/prctl/setrlimit syscalls on values captured by copy and does not
    // allocate or take locks.
    unsafe {
        cmd.pre_exec(move || enter_limits(limits));
    }
}

#[cfg(not(unix))]
fn apply_process_limits(_cmd: &mut Command, _limits: ProcessLimits) {
    warn!("process rlimits are unavailable on this platform");
}

#[cfg(unix)]
fn enter_limits(limits: ProcessLimits) -> std::io::Result<()> {
    use nix::sys::resource::{Resource, setrlimit};

    nix::unistd::setsid()?;

    #[cfg(target_os = "linux")]
    nix::sys::prctl::set_pdeathsig(nix::sys::signal::Signal::SIGKILL)?;

    // Soft limit delivers SIGXCPU; the hard limit one second later is SIGKILL.
    setrlimit(Resource::RLIMIT_CPU, limits.cpu_seconds, limits.cpu_seconds + 1)?;
    setrlimit(Resource::RLIMIT_AS, limits.memory_bytes, limits.memory_bytes)?;
    setrlimit(Resource::RLIMIT_CORE, 0, 0)?;
    setrlimit(Resource::RLIMIT_FSIZE, limits.file_size_bytes, limits.file_size_bytes)?;
    Ok(())
}
