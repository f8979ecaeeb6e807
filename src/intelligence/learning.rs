/// Learning models
///
/// A Learning is an accepted, scoped, actionable correction that can be
/// merged into a knowledge document once a human approves it.

use crate::docs::MemoryEntry;
use crate::intelligence::scorer::Scorer;
use crate::queue::{CandidateCorrection, QueueKey, SourceType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a learning applies everywhere or only to its project
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    Project,
    Global,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Project => write!(f, "project"),
            Scope::Global => write!(f, "global"),
        }
    }
}

/// Document section a learning belongs under
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum SectionTag {
    ModelPrefs,
    ToolUsage,
    Conventions,
    Errors,
    Environment,
}

impl SectionTag {
    /// Rendering order inside a managed block
    pub const ALL: [SectionTag; 5] = [
        SectionTag::ModelPrefs,
        SectionTag::ToolUsage,
        SectionTag::Conventions,
        SectionTag::Errors,
        SectionTag::Environment,
    ];

    /// Header text used when the section has to be created
    pub fn title(&self) -> &'static str {
        match self {
            SectionTag::ModelPrefs => "Model Preferences",
            SectionTag::ToolUsage => "Tool Usage",
            SectionTag::Conventions => "Conventions",
            SectionTag::Errors => "Errors",
            SectionTag::Environment => "Environment",
        }
    }

    /// Recognise an existing header as this section
    ///
    /// Case-insensitive, and a few common synonyms count too.
    pub fn from_heading(heading: &str) -> Option<Self> {
        let heading = heading.trim().trim_start_matches('#').trim().to_lowercase();
        let aliases: &[(SectionTag, &[&str])] = &[
            (SectionTag::ModelPrefs, &["model preferences", "model prefs", "models", "model-prefs"]),
            (SectionTag::ToolUsage, &["tool usage", "tools", "tool-usage", "tooling"]),
            (SectionTag::Conventions, &["conventions", "code style", "coding conventions", "style"]),
            (SectionTag::Errors, &["errors", "known errors", "common errors", "pitfalls"]),
            (SectionTag::Environment, &["environment", "setup", "env"]),
        ];

        aliases
            .iter()
            .find(|(_, names)| names.contains(&heading.as_str()))
            .map(|(tag, _)| *tag)
    }
}

impl std::fmt::Display for SectionTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SectionTag::ModelPrefs => "model-prefs",
            SectionTag::ToolUsage => "tool-usage",
            SectionTag::Conventions => "conventions",
            SectionTag::Errors => "errors",
            SectionTag::Environment => "environment",
        };
        write!(f, "{}", s)
    }
}

/// What to do with a learning relative to a target document
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum MergeDisposition {
    /// Nothing similar exists yet
    New,
    /// Substitute a human-merged text for the existing line
    Merge,
    /// Substitute the learning for the existing line
    Replace,
    /// Similar line exists but add this one too
    AddAnyway,
    Skip,
}

impl std::fmt::Display for MergeDisposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MergeDisposition::New => "new",
            MergeDisposition::Merge => "merge",
            MergeDisposition::Replace => "replace",
            MergeDisposition::AddAnyway => "add-anyway",
            MergeDisposition::Skip => "skip",
        };
        write!(f, "{}", s)
    }
}

/// A classified correction ready for review
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Learning {
    pub actionable_text: String,
    pub scope: Scope,
    pub section_tag: SectionTag,
    pub dedupe_group_id: Option<String>,
    pub merge_disposition: Option<MergeDisposition>,
    /// Line the disposition refers to, for merge and replace
    pub existing_entry: Option<MemoryEntry>,
    pub source_project_path: String,
    pub source_type: SourceType,
    pub sources: Vec<QueueKey>,
    pub confidence: f64,
    pub decay_days: u32,
    pub captured_at: DateTime<Utc>,
    /// Classifier couldn't decide; the human makes the call
    pub ambiguous: bool,
    /// Scope was defaulted rather than inferred
    pub scope_flagged: bool,
    pub resolved_referent: Option<String>,
}

impl Learning {
    pub fn from_candidate(
        candidate: &CandidateCorrection,
        actionable_text: impl Into<String>,
        scope: Scope,
        section_tag: SectionTag,
    ) -> Self {
        Self {
            actionable_text: actionable_text.into(),
            scope,
            section_tag,
            dedupe_group_id: None,
            merge_disposition: None,
            existing_entry: None,
            source_project_path: candidate.source_project_path.clone(),
            source_type: candidate.source_type,
            sources: vec![candidate.key()],
            confidence: candidate.confidence,
            decay_days: candidate.decay_days,
            captured_at: candidate.timestamp,
            ambiguous: false,
            scope_flagged: false,
            resolved_referent: None,
        }
    }

    /// Disposition once checked, `New` before that
    pub fn disposition(&self) -> MergeDisposition {
        self.merge_disposition.unwrap_or(MergeDisposition::New)
    }

    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.captured_at).num_days().max(0)
    }

    /// Waited in the queue past its decay window
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        Scorer::is_stale(self.age_days(now), self.decay_days)
    }

    /// Confidence after decay, used to order the review summary
    pub fn standing(&self, now: DateTime<Utc>) -> f64 {
        Scorer::effective_confidence(self.confidence, self.age_days(now) as f64, self.decay_days)
    }
}
