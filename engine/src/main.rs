//! Puzzle submission engine.
//!
//! Reads one JSON request from stdin and writes one JSON response to stdout.
//! Diagnostics go to stderr.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::error;

use engine::core::analyzer::analyze;
use engine::core::response::failure;
use engine::exit_codes;
use engine::io::config::{EngineConfig, load_config};
use engine::io::sandbox::ProcessSandbox;
use engine::protocol::Engine;

#[derive(Parser)]
#[command(
    name = "engine",
    version,
    about = "Score untrusted puzzle submissions in a sandbox"
)]
struct Cli {
    /// Path to the engine configuration file.
    #[arg(long, global = true, default_value = "engine.toml")]
    config: PathBuf,

    /// Directory of puzzle definitions (overrides the config file).
    #[arg(long, global = true)]
    puzzles_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Evaluate one JSON request from stdin (default).
    Run,
    /// Print the static analysis of a source file (or stdin) as JSON.
    Analyze {
        /// Source file; reads stdin when omitted.
        path: Option<PathBuf>,
    },
}

fn main() {
    engine::logging::init();
    let cli = Cli::parse();
    let code = match cli.command {
        None | Some(Command::Run) => cmd_run(&cli.config, cli.puzzles_dir),
        Some(Command::Analyze { ref path }) => cmd_analyze(path.as_deref()),
    };
    std::process::exit(code);
}

fn cmd_run(config_path: &Path, puzzles_dir: Option<PathBuf>) -> i32 {
    let response = match (load(config_path, puzzles_dir), read_stdin()) {
        (Ok(config), Ok(raw)) => {
            let sandbox = ProcessSandbox::new(&config);
            Engine::new(config, sandbox).handle(&raw)
        }
        (Err(err), _) => {
            error!(err = %format!("{err:#}"), "invalid configuration");
            failure(format!("Engine configuration error: {err:#}"), 0)
        }
        (_, Err(err)) => {
            error!(err = %format!("{err:#}"), "failed to read request");
            failure(format!("Bad JSON request: {err:#}"), 0)
        }
    };
    match write_json(&response) {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::FAILED
        }
    }
}

fn cmd_analyze(path: Option<&Path>) -> i32 {
    let source = match path {
        Some(path) => fs::read_to_string(path).with_context(|| format!("read {}", path.display())),
        None => read_stdin(),
    };
    let source = match source {
        Ok(source) => source,
        Err(err) => {
            eprintln!("{err:#}");
            return exit_codes::FAILED;
        }
    };
    let analysis = analyze(&source);
    if let Err(err) = write_json(&analysis) {
        eprintln!("{err:#}");
        return exit_codes::FAILED;
    }
    if analysis.is_safe {
        exit_codes::OK
    } else {
        exit_codes::UNSAFE
    }
}

fn load(config_path: &Path, puzzles_dir: Option<PathBuf>) -> Result<EngineConfig> {
    let mut config = load_config(config_path)?;
    if let Some(dir) = puzzles_dir {
        config.puzzles_dir = dir;
    }
    Ok(config)
}

fn read_stdin() -> Result<String> {
    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .context("read stdin")?;
    Ok(raw)
}

/// Serialize `value` as one JSON line on stdout.
fn write_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string(value).context("serialize json")?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{payload}").context("write stdout")?;
    stdout.flush().context("flush stdout")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_is_the_default_command() {
        let cli = Cli::parse_from(["engine"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from("engine.toml"));
    }

    #[test]
    fn parse_analyze_with_path() {
        let cli = Cli::parse_from(["engine", "analyze", "main.py", "--config", "x.toml"]);
        assert_eq!(
            cli.command,
            Some(Command::Analyze {
                path: Some(PathBuf::from("main.py"))
            })
        );
        assert_eq!(cli.config, PathBuf::from("x.toml"));
    }

    #[test]
    fn puzzles_dir_overrides_config() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = load(&temp.path().join("missing.toml"), Some(PathBuf::from("p"))).expect("load");
        assert_eq!(config.puzzles_dir, PathBuf::from("p"));
    }
}
