// Captures corrections from live user turns into the queue
//
// Filters out sensitive stuff like passwords and API keys before anything
// touches disk.

use crate::core::ProjectDetector;
use crate::error::{ReflectError, Result};
use crate::intelligence::PatternDetector;
use crate::queue::{CandidateCorrection, QueueStore};
use crate::transcript::models::is_command_echo;
use regex::Regex;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::debug;

// A pasted log isn't a correction
const MAX_TURN_LENGTH: usize = 10_000;

// Regex patterns for stuff we definitely shouldn't queue
const SENSITIVE_PATTERNS: &[&str] = &[
    r"password\s*[=:]",
    r"passwd\s*[=:]",
    r"token\s*[=:]",
    r"api[_-]?key\s*[=:]",
    r"secret\s*[=:]",
    r"auth\s*=",
    r"bearer\s+[a-z0-9\-_.=]{8,}",
    r"--password",
    r"--token",
    r"-----begin [a-z ]*private key-----",
    r"\bsk-[a-z0-9\-_]{16,}",
    r"\bakia[0-9a-z]{16}\b",
    r"\bgh[pousr]_[a-z0-9]{20,}",
];

/// What the host's user-prompt hook sends on stdin
#[derive(Debug, Clone, Deserialize, Default)]
pub struct HookInput {
    #[serde(default)]
    pub prompt: String,
    pub cwd: Option<String>,
    pub session_id: Option<String>,
}

impl HookInput {
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| ReflectError::malformed("hook input", e.to_string()))
    }
}

pub struct Recorder {
    detector: PatternDetector,
    store: QueueStore,
    sensitive_regex: Vec<Regex>,
}

impl Recorder {
    pub fn new(store: QueueStore) -> Result<Self> {
        Self::with_detector(store, PatternDetector::new())
    }

    pub fn with_detector(store: QueueStore, detector: PatternDetector) -> Result<Self> {
        // Build all the regex patterns once so we don't recompile them every turn
        let sensitive_regex = SENSITIVE_PATTERNS
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            detector,
            store,
            sensitive_regex,
        })
    }

    pub fn store(&self) -> &QueueStore {
        &self.store
    }

    /// Check one user turn and queue it if it reads like a correction
    ///
    /// Ok(None) means the turn was fine to look at but isn't a correction.
    pub async fn record(&self, turn: &str, project_path: &str) -> Result<Option<CandidateCorrection>> {
        self.validate_turn(turn)?;

        let sanitized = self.sanitize_turn(turn);
        if self.should_ignore(&sanitized) {
            debug!("Turn ignored");
            return Ok(None);
        }

        let Some(candidate) = self.detector.detect(&sanitized, project_path) else {
            return Ok(None);
        };

        let queued = self.store.append(&candidate).await?;
        debug!(
            source_type = %candidate.source_type,
            patterns = ?candidate.matched_patterns,
            queued,
            "Correction queued"
        );

        Ok(Some(candidate))
    }

    /// Same as `record`, fed by the hook payload
    ///
    /// The project is the root enclosing the hook's cwd, or the current
    /// directory when the host didn't send one.
    pub async fn record_hook(&self, input: &HookInput) -> Result<Option<CandidateCorrection>> {
        let start = match input.cwd.as_deref().filter(|cwd| !cwd.is_empty()) {
            Some(cwd) => PathBuf::from(cwd),
            None => std::env::current_dir()?,
        };
        let project_root = ProjectDetector::detect(&start)?;
        self.record(&input.prompt, &project_root.to_string_lossy()).await
    }

    // Not empty, not huge, no credentials
    fn validate_turn(&self, turn: &str) -> Result<()> {
        let trimmed = turn.trim();
        if trimmed.is_empty() {
            return Err(ReflectError::InvalidTurn("empty turn".to_string()));
        }

        if trimmed.chars().count() > MAX_TURN_LENGTH {
            return Err(ReflectError::TurnTooLong(MAX_TURN_LENGTH));
        }

        if self.contains_sensitive_data(trimmed) {
            return Err(ReflectError::SensitiveData);
        }

        Ok(())
    }

    /// Sanitize a turn
    ///
    /// - Removes null bytes
    /// - Normalizes whitespace (runs of whitespace to single spaces)
    fn sanitize_turn(&self, turn: &str) -> String {
        turn.replace('\0', "")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn contains_sensitive_data(&self, turn: &str) -> bool {
        let lowercase = turn.to_lowercase();

        self.sensitive_regex
            .iter()
            .any(|regex| regex.is_match(&lowercase))
    }

    /// Slash commands and host echoes aren't something the user said to the model
    pub fn should_ignore(&self, turn: &str) -> bool {
        let trimmed = turn.trim();

        if trimmed.chars().count() < 2 {
            return true;
        }

        let slash_command = trimmed.starts_with('/')
            && trimmed
                .split_whitespace()
                .next()
                .is_some_and(|w| w[1..].chars().all(|c| c.is_alphanumeric() || c == '-' || c == ':'));

        slash_command || is_command_echo(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::SourceType;
    use tempfile::TempDir;

    fn create_test_recorder(temp: &TempDir) -> Recorder {
        let store = QueueStore::new(temp.path().join("learnings-queue.json"));
        Recorder::new(store).unwrap()
    }

    #[tokio::test]
    async fn test_record_correction() {
        let temp = TempDir::new().unwrap();
        let recorder = create_test_recorder(&temp);

        let candidate = recorder
            .record("no, use Postgres not SQLite", "/a")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(candidate.source_type, SourceType::PatternMatch);
        assert_eq!(candidate.source_project_path, "/a");
        assert_eq!(recorder.store().read().await.unwrap(), vec![candidate]);
    }

    #[tokio::test]
    async fn test_plain_turn_not_queued() {
        let temp = TempDir::new().unwrap();
        let recorder = create_test_recorder(&temp);

        let result = recorder.record("add a health endpoint", "/a").await.unwrap();
        assert!(result.is_none());
        assert!(recorder.store().is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_record_empty_turn() {
        let temp = TempDir::new().unwrap();
        let recorder = create_test_recorder(&temp);

        let result = recorder.record("   ", "/a").await;
        match result {
            Err(ReflectError::InvalidTurn(_)) => {}
            _ => panic!("Expected InvalidTurn error"),
        }
    }

    #[tokio::test]
    async fn test_sensitive_turn_never_queued() {
        let temp = TempDir::new().unwrap();
        let recorder = create_test_recorder(&temp);

        let result = recorder
            .record("no, the password=hunter2 not the old one", "/a")
            .await;
        match result {
            Err(ReflectError::SensitiveData) => {}
            _ => panic!("Expected SensitiveData error"),
        }
        assert!(recorder.store().is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_turn_too_long() {
        let temp = TempDir::new().unwrap();
        let recorder = create_test_recorder(&temp);

        let long_turn = format!("remember: {}", "a".repeat(MAX_TURN_LENGTH));
        let result = recorder.record(&long_turn, "/a").await;
        match result {
            Err(ReflectError::TurnTooLong(_)) => {}
            _ => panic!("Expected TurnTooLong error"),
        }
    }

    #[test]
    fn test_sanitize_turn() {
        let temp = TempDir::new().unwrap();
        let recorder = create_test_recorder(&temp);

        assert_eq!(recorder.sanitize_turn("  use   uv\n not pip "), "use uv not pip");
        assert!(!recorder.sanitize_turn("use\0uv").contains('\0'));
    }

    #[test]
    fn test_contains_sensitive_data() {
        let temp = TempDir::new().unwrap();
        let recorder = create_test_recorder(&temp);

        assert!(recorder.contains_sensitive_data("export API_KEY=abc123"));
        assert!(recorder.contains_sensitive_data("use Authorization: Bearer abcdef123456"));
        assert!(recorder.contains_sensitive_data("the key is sk-abcdefghijklmnopqrst"));
        assert!(!recorder.contains_sensitive_data("don't log the token, use a hash"));
        assert!(!recorder.contains_sensitive_data("use npm not yarn"));
    }

    #[test]
    fn test_should_ignore() {
        let temp = TempDir::new().unwrap();
        let recorder = create_test_recorder(&temp);

        assert!(recorder.should_ignore("/clear"));
        assert!(recorder.should_ignore("/review-pr 12"));
        assert!(recorder.should_ignore("<command-name>/model</command-name>"));
        assert!(!recorder.should_ignore("/usr/local is read-only, don't write there"));
        assert!(!recorder.should_ignore("no, use pnpm"));
    }

    #[tokio::test]
    async fn test_record_hook_uses_project_root() {
        let temp = TempDir::new().unwrap();
        let recorder = create_test_recorder(&temp);

        let project = temp.path().join("app");
        std::fs::create_dir_all(project.join("src")).unwrap();
        std::fs::write(project.join("Cargo.toml"), "[package]\n").unwrap();

        let payload = serde_json::json!({
            "session_id": "s1",
            "prompt": "remember: run cargo fmt before committing",
            "cwd": project.join("src"),
        });
        let input = HookInput::parse(&payload.to_string()).unwrap();
        let candidate = recorder.record_hook(&input).await.unwrap().unwrap();

        assert_eq!(candidate.source_type, SourceType::ExplicitMarker);
        assert_eq!(candidate.source_project_path, project.to_string_lossy());
        assert!(HookInput::parse("not json").is_err());
    }
}
