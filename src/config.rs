/// Configuration and well-known paths
///
/// Everything lives under the assistant's config directory (normally
/// `~/.claude`). `REFLECT_CLAUDE_DIR` wins over `CLAUDE_CONFIG_DIR`, which wins
/// over the home directory default.

use crate::error::{ReflectError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the queue file inside the config directory
pub const QUEUE_FILE_NAME: &str = "learnings-queue.json";

/// Default number of days a queued correction stays fresh
pub const DEFAULT_DECAY_DAYS: u32 = 90;

/// Resolved locations used by every command
#[derive(Debug, Clone)]
pub struct Paths {
    pub claude_dir: PathBuf,
    pub queue_file: PathBuf,
}

impl Paths {
    /// Resolve paths from the environment
    pub fn from_env() -> Result<Self> {
        let claude_dir = match std::env::var_os("REFLECT_CLAUDE_DIR")
            .or_else(|| std::env::var_os("CLAUDE_CONFIG_DIR"))
        {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir()
                .ok_or_else(|| {
                    ReflectError::Config("Could not determine home directory".to_string())
                })?
                .join(".claude"),
        };

        Ok(Self::with_claude_dir(claude_dir))
    }

    /// Build paths rooted at an explicit config directory
    pub fn with_claude_dir<P: AsRef<Path>>(claude_dir: P) -> Self {
        let claude_dir = claude_dir.as_ref().to_path_buf();
        let queue_file = claude_dir.join(QUEUE_FILE_NAME);
        Self {
            claude_dir,
            queue_file,
        }
    }

    /// Directory holding per-project transcript folders
    pub fn projects_dir(&self) -> PathBuf {
        self.claude_dir.join("projects")
    }

    /// The user-wide knowledge document
    pub fn global_document(&self) -> PathBuf {
        self.claude_dir.join("CLAUDE.md")
    }

    /// User-wide rule files
    pub fn user_rules_dir(&self) -> PathBuf {
        self.claude_dir.join("rules")
    }
}

/// Whether a run may touch any store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    #[default]
    Apply,
    Preview,
}

/// What a processing run should do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    /// Queue plus optional history scan, full review
    #[default]
    Process,
    /// Show which documents learnings could land in
    ListTargets,
    /// Review queued items only
    ReviewPending,
    /// Check queued learnings against existing documents, no writes
    DedupePass,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Action::Process => "process",
            Action::ListTargets => "list-targets",
            Action::ReviewPending => "review-pending",
            Action::DedupePass => "dedupe-pass",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "process" => Ok(Action::Process),
            "list-targets" => Ok(Action::ListTargets),
            "review-pending" => Ok(Action::ReviewPending),
            "dedupe-pass" => Ok(Action::DedupePass),
            other => Err(format!(
                "unknown action '{}' (expected process, list-targets, review-pending or dedupe-pass)",
                other
            )),
        }
    }
}

/// Invocation options for one processing run
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProcessOptions {
    pub mode: RunMode,
    pub history_window_days: Option<u32>,
    pub action: Action,
}

impl ProcessOptions {
    pub fn is_preview(&self) -> bool {
        self.mode == RunMode::Preview
    }
}
