//! Puzzle definitions loaded from `<puzzles_dir>/<puzzle_id>.json`.

use std::fs;
use std::path::PathBuf;
use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::core::types::{Goal, deserialize_goals};

static PUZZLE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("puzzle id regex"));

/// A puzzle definition as authored in content files.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Puzzle {
    pub id: String,
    #[serde(default)]
    pub title_key: Option<String>,
    #[serde(default)]
    pub intro_key: Option<String>,
    #[serde(default)]
    pub starter_code: String,
    #[serde(deserialize_with = "deserialize_goals")]
    pub goals: Vec<Goal>,
    #[serde(default)]
    pub world_actions_on_pass: Vec<Value>,
}

impl Puzzle {
    /// Puzzle used when no definition exists for the requested id.
    pub fn fallback(id: &str) -> Self {
        Self {
            id: id.to_string(),
            title_key: Some("puzzle.fallback.title".to_string()),
            intro_key: Some("puzzle.fallback.intro".to_string()),
            starter_code: "print('Door unlocked')\n".to_string(),
            goals: vec![
                Goal::StdoutIncludes {
                    value: "Door unlocked".to_string(),
                },
                Goal::ForbiddenTokens {
                    value: vec!["import".to_string(), "__".to_string(), "open".to_string()],
                },
            ],
            world_actions_on_pass: vec![json!({"type": "open_door", "params": {"id": "D-01"}})],
        }
    }
}

/// True when `id` is safe to use as a file stem.
pub fn is_valid_puzzle_id(id: &str) -> bool {
    PUZZLE_ID.is_match(id)
}

/// Read-only view of the puzzle content directory.
#[derive(Debug, Clone)]
pub struct PuzzleStore {
    dir: PathBuf,
}

impl PuzzleStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Load a puzzle by id, falling back to the built-in puzzle when absent.
    pub fn load(&self, id: &str) -> Result<Puzzle> {
        if !is_valid_puzzle_id(id) {
            bail!("invalid puzzle id '{id}'");
        }
        let path = self.dir.join(format!("{id}.json"));
        if !path.exists() {
            warn!(puzzle_id = id, path = %path.display(), "puzzle not found, using fallback");
            return Ok(Puzzle::fallback(id));
        }
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        let puzzle: Puzzle =
            serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
        if puzzle.goals.is_empty() {
            warn!(puzzle_id = id, "puzzle declares no goals");
        }
        debug!(puzzle_id = id, goals = puzzle.goals.len(), "loaded puzzle");
        Ok(puzzle)
    }
}
