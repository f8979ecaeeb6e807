/// Data models for queued corrections
///
/// These map one-to-one onto the JSON objects stored in the queue file.

use crate::config::DEFAULT_DECAY_DAYS;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Confidence given to records that never stated one
pub const DEFAULT_CONFIDENCE: f64 = 0.6;

/// Where a candidate came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    ExplicitMarker,
    #[default]
    PatternMatch,
    ToolRejection,
    HistoryScan,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SourceType::ExplicitMarker => "explicit-marker",
            SourceType::PatternMatch => "pattern-match",
            SourceType::ToolRejection => "tool-rejection",
            SourceType::HistoryScan => "history-scan",
        };
        write!(f, "{}", s)
    }
}

/// A raw detected correction, before classification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateCorrection {
    #[serde(rename = "message")]
    pub raw_text: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "project", default)]
    pub source_project_path: String,
    #[serde(rename = "type", default)]
    pub source_type: SourceType,
    #[serde(rename = "patterns", default)]
    pub matched_patterns: Vec<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default = "default_decay_days")]
    pub decay_days: u32,
}

fn default_confidence() -> f64 {
    DEFAULT_CONFIDENCE
}

fn default_decay_days() -> u32 {
    DEFAULT_DECAY_DAYS
}

impl CandidateCorrection {
    pub fn new(
        raw_text: impl Into<String>,
        source_project_path: impl Into<String>,
        source_type: SourceType,
        confidence: f64,
    ) -> Self {
        Self {
            raw_text: raw_text.into(),
            timestamp: Utc::now(),
            source_project_path: source_project_path.into(),
            source_type,
            matched_patterns: Vec::new(),
            confidence: confidence.clamp(0.0, 1.0),
            decay_days: DEFAULT_DECAY_DAYS,
        }
    }

    pub fn with_patterns(mut self, patterns: Vec<String>) -> Self {
        self.matched_patterns = patterns;
        self
    }

    pub fn with_decay_days(mut self, decay_days: u32) -> Self {
        self.decay_days = decay_days;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Identity used to remove exactly this record from the queue later
    pub fn key(&self) -> QueueKey {
        QueueKey {
            timestamp: self.timestamp,
            project: self.source_project_path.clone(),
            message: self.raw_text.clone(),
        }
    }

    /// Whole days since capture
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.timestamp).num_days().max(0)
    }
}

/// Identity of a queued record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueKey {
    pub timestamp: DateTime<Utc>,
    pub project: String,
    pub message: String,
}
