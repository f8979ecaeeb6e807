// Spots corrections in what the user just typed
//
// Like "no, use Postgres not SQLite" or "remember: tabs, not spaces".
// This runs on every single user turn, so it only does regex work on a
// bounded slice of text. No I/O, no allocation beyond the result.

use crate::intelligence::patterns::{Language, PatternFamily, PatternSet};
use crate::intelligence::scorer::{Scorer, EXPLICIT_CONFIDENCE, STRONG_SIGNAL_DECAY_DAYS};
use crate::queue::{CandidateCorrection, SourceType};
use std::collections::BTreeSet;
use tracing::debug;

// Longer turns are cut here before matching, which keeps the cost bounded
pub const MAX_SCAN_CHARS: usize = 4_000;

/// Result of evaluating one piece of text
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub source_type: SourceType,
    pub matched_patterns: Vec<String>,
    pub confidence: f64,
}

pub struct PatternDetector {
    patterns: PatternSet,
}

impl Default for PatternDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternDetector {
    /// Detector with the English phrase set
    pub fn new() -> Self {
        Self {
            patterns: PatternSet::english(),
        }
    }

    pub fn with_patterns(patterns: PatternSet) -> Self {
        Self { patterns }
    }

    pub fn language(&self) -> Language {
        self.patterns.language()
    }

    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    // Main function - turns one user turn into zero or one candidate
    pub fn detect(&self, text: &str, project_path: &str) -> Option<CandidateCorrection> {
        let detection = self.evaluate(text)?;

        let decay_days = match detection.source_type {
            SourceType::ExplicitMarker => STRONG_SIGNAL_DECAY_DAYS,
            _ => crate::config::DEFAULT_DECAY_DAYS,
        };

        Some(
            CandidateCorrection::new(
                text.trim(),
                project_path,
                detection.source_type,
                detection.confidence,
            )
            .with_patterns(detection.matched_patterns)
            .with_decay_days(decay_days),
        )
    }

    /// Classify text without building a candidate
    ///
    /// Explicit markers short-circuit everything else.
    pub fn evaluate(&self, text: &str) -> Option<Detection> {
        if text.trim().is_empty() {
            return None;
        }

        // Marker regexes are linear, so they see the whole turn
        if self.patterns.has_explicit_marker(text) {
            debug!("Explicit marker found");
            return Some(Detection {
                source_type: SourceType::ExplicitMarker,
                matched_patterns: vec!["explicit:remember".to_string()],
                confidence: EXPLICIT_CONFIDENCE,
            });
        }

        let hits = self.patterns.matches(bounded(text));
        if hits.is_empty() {
            return None;
        }

        let families: BTreeSet<PatternFamily> = hits.iter().map(|(family, _)| *family).collect();
        let matched_patterns: Vec<String> = hits
            .iter()
            .map(|(family, name)| format!("{}:{}", family.as_str(), name))
            .collect();

        debug!(patterns = ?matched_patterns, "Correction patterns matched");

        Some(Detection {
            source_type: SourceType::PatternMatch,
            matched_patterns,
            confidence: Scorer::pattern_confidence(families.len()),
        })
    }
}

// Cut at a char boundary so multibyte text never panics
fn bounded(text: &str) -> &str {
    match text.char_indices().nth(MAX_SCAN_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intelligence::scorer::PATTERN_BASE_CONFIDENCE;

    #[test]
    fn test_explicit_marker_any_case() {
        let detector = PatternDetector::new();

        for text in [
            "remember: always run cargo fmt",
            "Remember: use uv",
            "REMEMBER: the staging db is read-only",
            "ok, and remember: what's the timeout?",
        ] {
            let candidate = detector.detect(text, "/test").unwrap();
            assert_eq!(candidate.source_type, SourceType::ExplicitMarker);
            assert_eq!(candidate.confidence, 1.0);
            assert_eq!(candidate.decay_days, STRONG_SIGNAL_DECAY_DAYS);
        }
    }

    #[test]
    fn test_pattern_match() {
        let detector = PatternDetector::new();

        let candidate = detector
            .detect("no, use Postgres not SQLite", "/a")
            .unwrap();
        assert_eq!(candidate.source_type, SourceType::PatternMatch);
        assert_eq!(candidate.source_project_path, "/a");
        assert!(candidate.confidence > PATTERN_BASE_CONFIDENCE);
        assert!(candidate.confidence < 1.0);
        assert!(candidate
            .matched_patterns
            .iter()
            .any(|p| p.starts_with("x-not-y:")));
    }

    #[test]
    fn test_single_family_gets_baseline() {
        let detector = PatternDetector::new();
        let candidate = detector
            .detect("actually the tests live under spec/", "/a")
            .unwrap();
        assert_eq!(candidate.confidence, PATTERN_BASE_CONFIDENCE);
    }

    #[test]
    fn test_no_match_is_noop() {
        let detector = PatternDetector::new();
        assert!(detector.detect("add a retry to the fetch loop", "/a").is_none());
        assert!(detector.detect("   ", "/a").is_none());
    }

    #[test]
    fn test_huge_input_is_bounded() {
        let detector = PatternDetector::new();
        let padding = "é".repeat(MAX_SCAN_CHARS * 3);

        // Families are only looked for in the bounded slice
        assert!(detector.detect(&format!("{} no, use pnpm", padding), "/a").is_none());
        assert_eq!(bounded(&padding).chars().count(), MAX_SCAN_CHARS);

        // The marker is looked for everywhere
        let candidate = detector
            .detect(&format!("{} remember: this is past the cut", padding), "/a")
            .unwrap();
        assert_eq!(candidate.source_type, SourceType::ExplicitMarker);
    }
}
