//! Engine configuration stored in `engine.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::types::{DEFAULT_CPU_MS, DEFAULT_MEM_MB, Limits};

/// Engine configuration (TOML).
///
/// Missing fields default to values suitable for short puzzle programs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Interpreter argv prefix; the program path is appended.
    pub interpreter: Vec<String>,

    /// Directory holding `<puzzle_id>.json` definitions.
    pub puzzles_dir: PathBuf,

    /// Keep at most this many bytes of stdout and of stderr per execution.
    pub output_limit_bytes: usize,

    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Applied when a request omits `limits.cpu_ms`.
    pub default_cpu_ms: u64,
    /// Applied when a request omits `limits.mem_mb`.
    pub default_mem_mb: u64,
    /// Requests asking for more are clamped to this ceiling.
    pub max_cpu_ms: u64,
    pub max_mem_mb: u64,
    /// `RLIMIT_FSIZE` for every sandboxed process.
    pub file_size_limit_bytes: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            default_cpu_ms: DEFAULT_CPU_MS,
            default_mem_mb: DEFAULT_MEM_MB,
            max_cpu_ms: 10_000,
            max_mem_mb: 1024,
            file_size_limit_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interpreter: ["python3", "-I", "-S", "-B"]
                .into_iter()
                .map(String::from)
                .collect(),
            puzzles_dir: PathBuf::from("content/puzzles"),
            output_limit_bytes: 1_000_000,
            limits: LimitsConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.interpreter.is_empty() || self.interpreter[0].trim().is_empty() {
            return Err(anyhow!("interpreter must be a non-empty array"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        let limits = &self.limits;
        if limits.default_cpu_ms == 0 || limits.max_cpu_ms == 0 {
            return Err(anyhow!("limits.default_cpu_ms and limits.max_cpu_ms must be > 0"));
        }
        if limits.default_mem_mb == 0 || limits.max_mem_mb == 0 {
            return Err(anyhow!("limits.default_mem_mb and limits.max_mem_mb must be > 0"));
        }
        if limits.file_size_limit_bytes == 0 {
            return Err(anyhow!("limits.file_size_limit_bytes must be > 0"));
        }
        Ok(())
    }

    /// Limits applied when the request carries none.
    pub fn default_limits(&self) -> Limits {
        Limits {
            cpu_ms: self.limits.default_cpu_ms,
            mem_mb: self.limits.default_mem_mb,
        }
    }

    /// Clamp requested limits to the configured ceilings.
    pub fn clamp(&self, requested: Limits) -> Limits {
        let clamped = Limits {
            cpu_ms: requested.cpu_ms.min(self.limits.max_cpu_ms),
            mem_mb: requested.mem_mb.min(self.limits.max_mem_mb),
        };
        if clamped != requested {
            warn!(
                requested_cpu_ms = requested.cpu_ms,
                requested_mem_mb = requested.mem_mb,
                cpu_ms = clamped.cpu_ms,
                mem_mb = clamped.mem_mb,
                "requested limits clamped to configured ceiling"
            );
        }
        clamped
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `EngineConfig::default()`.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        let cfg = EngineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: EngineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}
