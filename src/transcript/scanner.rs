// Mines past session transcripts for corrections we missed live
//
// Transcripts live under <claude_dir>/projects/<encoded project>/ as JSONL,
// sub-conversations in nested folders. Read-only: nothing here ever writes.

use crate::config::{Paths, DEFAULT_DECAY_DAYS};
use crate::docs::project_folder_name;
use crate::intelligence::analyzer::WorkItem;
use crate::intelligence::pattern_detector::PatternDetector;
use crate::intelligence::patterns::{detect_language, Language, PatternSet};
use crate::intelligence::scorer::{Scorer, STRONG_SIGNAL_DECAY_DAYS};
use crate::queue::{CandidateCorrection, SourceType};
use crate::transcript::models::{TranscriptRecord, Turn};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

// User turns sampled to pick the scan language
const LANGUAGE_SAMPLE: usize = 20;

// Turns before a candidate handed to the classifier as context
const CONTEXT_TURNS: usize = 3;

// Context turns are cut to this many characters
const CONTEXT_CHARS: usize = 500;

/// A candidate found in a transcript, with the turns leading up to it
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedCorrection {
    pub candidate: CandidateCorrection,
    pub context: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    pub candidates: Vec<ScannedCorrection>,
    pub files_scanned: usize,
    pub lines_skipped: usize,
    pub language: Language,
}

impl ScanReport {
    fn empty() -> Self {
        Self {
            candidates: Vec::new(),
            files_scanned: 0,
            lines_skipped: 0,
            language: Language::English,
        }
    }

    /// Scan results as unqueued work items
    pub fn into_work_items(self) -> Vec<WorkItem> {
        self.candidates
            .into_iter()
            .map(|s| WorkItem::scanned(s.candidate, s.context))
            .collect()
    }
}

struct TimedTurn {
    turn: Turn,
    timestamp: Option<DateTime<Utc>>,
}

pub struct TranscriptScanner {
    paths: Paths,
}

impl TranscriptScanner {
    pub fn new(paths: Paths) -> Self {
        Self { paths }
    }

    /// Folder holding a project's transcripts
    pub fn transcript_dir(&self, project_path: &str) -> PathBuf {
        self.paths
            .projects_dir()
            .join(project_folder_name(project_path))
    }

    /// Scan a project's transcripts, optionally only the last `max_age_days`
    pub async fn scan(&self, project_path: &str, max_age_days: Option<u32>) -> ScanReport {
        let dir = self.transcript_dir(project_path);
        let cutoff = max_age_days.map(|days| Utc::now() - Duration::days(days as i64));

        let files = find_transcripts(&dir).await;
        if files.is_empty() {
            debug!(dir = %dir.display(), "No transcripts found");
            return ScanReport::empty();
        }

        let mut report = ScanReport::empty();
        let mut sessions: Vec<Vec<TimedTurn>> = Vec::new();

        for file in &files {
            if let Some(cutoff) = cutoff {
                if modified_before(file, cutoff).await {
                    debug!(file = %file.display(), "Transcript older than window, skipped");
                    continue;
                }
            }

            let content = match tokio::fs::read(file).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "Could not read transcript");
                    continue;
                }
            };
            report.files_scanned += 1;

            let mut turns = Vec::new();
            // Bytes, so one bad line can't take the rest of the file with it
            for (n, line) in content.split(|b| *b == b'\n').enumerate() {
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                let record: TranscriptRecord = match serde_json::from_slice(line) {
                    Ok(record) => record,
                    Err(e) => {
                        debug!(file = %file.display(), line = n + 1, error = %e, "Malformed transcript line");
                        report.lines_skipped += 1;
                        continue;
                    }
                };

                let timestamp = record.timestamp();
                if let (Some(cutoff), Some(ts)) = (cutoff, timestamp) {
                    if ts < cutoff {
                        continue;
                    }
                }
                if let Some(turn) = record.turn() {
                    turns.push(TimedTurn { turn, timestamp });
                }
            }
            sessions.push(turns);
        }

        // One language for the whole scan
        let samples: Vec<&str> = sessions
            .iter()
            .flatten()
            .filter_map(|t| match &t.turn {
                Turn::User(text) => Some(text.as_str()),
                _ => None,
            })
            .take(LANGUAGE_SAMPLE)
            .collect();
        report.language = detect_language(&samples);
        let detector = PatternDetector::with_patterns(PatternSet::for_language(report.language));

        let mut found = Vec::new();
        for turns in &sessions {
            for (idx, timed) in turns.iter().enumerate() {
                let candidate = match &timed.turn {
                    Turn::User(text) => user_candidate(&detector, text, project_path),
                    Turn::Rejection(feedback) => rejection_candidate(&detector, feedback, project_path),
                    Turn::Assistant(_) => None,
                };
                let Some(mut candidate) = candidate else {
                    continue;
                };
                if let Some(ts) = timed.timestamp {
                    candidate = candidate.with_timestamp(ts);
                }

                found.push(ScannedCorrection {
                    candidate,
                    context: context_before(turns, idx),
                });
            }
        }

        report.candidates = collapse_duplicates(found);
        info!(
            files = report.files_scanned,
            candidates = report.candidates.len(),
            skipped_lines = report.lines_skipped,
            language = %report.language,
            "Transcript scan finished"
        );
        report
    }
}

fn user_candidate(detector: &PatternDetector, text: &str, project_path: &str) -> Option<CandidateCorrection> {
    let detection = detector.evaluate(text)?;
    let (source_type, decay_days) = match detection.source_type {
        SourceType::ExplicitMarker => (SourceType::ExplicitMarker, STRONG_SIGNAL_DECAY_DAYS),
        _ => (SourceType::HistoryScan, DEFAULT_DECAY_DAYS),
    };

    Some(
        CandidateCorrection::new(text.trim(), project_path, source_type, detection.confidence)
            .with_patterns(detection.matched_patterns)
            .with_decay_days(decay_days),
    )
}

fn rejection_candidate(
    detector: &PatternDetector,
    feedback: &str,
    project_path: &str,
) -> Option<CandidateCorrection> {
    let feedback = feedback.trim();
    if feedback.is_empty() {
        debug!("Tool rejection without feedback, discarded");
        return None;
    }

    let detection = detector.evaluate(feedback);
    let feedback_confidence = detection.as_ref().map(|d| d.confidence).unwrap_or(0.0);
    let mut patterns = vec!["rejection:tool-use".to_string()];
    if let Some(detection) = detection {
        patterns.extend(detection.matched_patterns);
    }

    Some(
        CandidateCorrection::new(
            feedback,
            project_path,
            SourceType::ToolRejection,
            Scorer::rejection_confidence(feedback_confidence),
        )
        .with_patterns(patterns)
        .with_decay_days(STRONG_SIGNAL_DECAY_DAYS),
    )
}

fn context_before(turns: &[TimedTurn], idx: usize) -> Vec<String> {
    let start = idx.saturating_sub(CONTEXT_TURNS);
    turns[start..idx]
        .iter()
        .map(|t| match &t.turn {
            Turn::User(text) | Turn::Rejection(text) | Turn::Assistant(text) => {
                text.chars().take(CONTEXT_CHARS).collect()
            }
        })
        .collect()
}

// Same trimmed text seen twice: keep the most confident, at the first position
fn collapse_duplicates(found: Vec<ScannedCorrection>) -> Vec<ScannedCorrection> {
    let mut out: Vec<ScannedCorrection> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for item in found {
        let key = item.candidate.raw_text.trim().to_string();
        match index.get(&key) {
            Some(&pos) => {
                if item.candidate.confidence > out[pos].candidate.confidence {
                    out[pos] = item;
                }
            }
            None => {
                index.insert(key, out.len());
                out.push(item);
            }
        }
    }

    out
}

// Every *.jsonl below the directory, sorted
async fn find_transcripts(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let Ok(mut entries) = tokio::fs::read_dir(&current).await else {
            continue;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            if file_type.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|e| e == "jsonl") {
                found.push(path);
            }
        }
    }

    found.sort();
    found
}

async fn modified_before(path: &Path, cutoff: DateTime<Utc>) -> bool {
    let modified: Option<SystemTime> = tokio::fs::metadata(path)
        .await
        .ok()
        .and_then(|m| m.modified().ok());
    match modified {
        Some(modified) => DateTime::<Utc>::from(modified) < cutoff,
        None => false,
    }
}
