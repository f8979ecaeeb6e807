/// Working-set analyzer
///
/// Coordinates classification and deduplication of a batch of candidates.

use crate::docs::MemoryEntry;
use crate::error::Result;
use crate::intelligence::classifier::{Classifier, Decision, RejectReason, RuleClassifier};
use crate::intelligence::deduplicator::{ConsolidationProposal, Deduplicator, ExistingMatch};
use crate::intelligence::learning::{Learning, MergeDisposition};
use crate::queue::{CandidateCorrection, QueueKey};
use tracing::debug;

/// One candidate plus the turns around it
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub candidate: CandidateCorrection,
    pub context: Vec<String>,
    /// Came from the queue rather than an unqueued scan
    pub queued: bool,
}

impl WorkItem {
    pub fn queued(candidate: CandidateCorrection) -> Self {
        Self {
            candidate,
            context: Vec::new(),
            queued: true,
        }
    }

    pub fn scanned(candidate: CandidateCorrection, context: Vec<String>) -> Self {
        Self {
            candidate,
            context,
            queued: false,
        }
    }
}

/// A candidate the classifier dropped
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub key: QueueKey,
    pub raw_text: String,
    pub reason: RejectReason,
    pub queued: bool,
}

/// Main analyzer
pub struct Analyzer {
    classifier: Box<dyn Classifier + Send + Sync>,
    deduplicator: Deduplicator,
}

impl Analyzer {
    /// Create an analyzer backed by the rule classifier
    pub fn new() -> Result<Self> {
        Self::with_classifier(Box::new(RuleClassifier::new()?))
    }

    pub fn with_classifier(classifier: Box<dyn Classifier + Send + Sync>) -> Result<Self> {
        Ok(Self {
            classifier,
            deduplicator: Deduplicator::new()?,
        })
    }

    pub fn deduplicator(&self) -> &Deduplicator {
        &self.deduplicator
    }

    /// Split the batch into learnings and rejections, order preserved
    pub fn filter(&self, items: &[WorkItem]) -> (Vec<Learning>, Vec<Rejection>) {
        let mut learnings = Vec::new();
        let mut rejected = Vec::new();

        for item in items {
            match self.classifier.classify(&item.candidate, &item.context) {
                Decision::Accept(learning) => learnings.push(learning),
                Decision::Reject(reason) => {
                    debug!(text = %item.candidate.raw_text, %reason, "Candidate rejected");
                    rejected.push(Rejection {
                        key: item.candidate.key(),
                        raw_text: item.candidate.raw_text.clone(),
                        reason,
                        queued: item.queued,
                    });
                }
            }
        }

        (learnings, rejected)
    }

    /// Stage A proposals for the batch
    pub fn propose(&self, learnings: &[Learning]) -> Vec<ConsolidationProposal> {
        self.deduplicator.propose_clusters(learnings)
    }

    /// Stage B: attach existing-document hits
    ///
    /// Learnings without a hit become `New`. The others stay undecided
    /// until a human picks an option.
    pub fn check_existing(
        &self,
        learnings: &mut [Learning],
        entries: &[MemoryEntry],
    ) -> Vec<Vec<ExistingMatch>> {
        learnings
            .iter_mut()
            .map(|learning| {
                let hits = self.deduplicator.find_existing(learning, entries);
                if hits.is_empty() {
                    learning.merge_disposition = Some(MergeDisposition::New);
                } else {
                    learning.merge_disposition = None;
                }
                hits
            })
            .collect()
    }

    /// Full analysis without side effects
    pub fn analyze(&self, items: &[WorkItem], entries: &[MemoryEntry]) -> AnalysisReport {
        let (mut learnings, rejected) = self.filter(items);
        let proposals = self.propose(&learnings);
        let existing = self.check_existing(&mut learnings, entries);

        AnalysisReport {
            candidates_seen: items.len(),
            learnings,
            rejected,
            proposals,
            existing,
        }
    }
}

/// Analysis report
#[derive(Debug)]
pub struct AnalysisReport {
    pub candidates_seen: usize,
    pub learnings: Vec<Learning>,
    pub rejected: Vec<Rejection>,
    pub proposals: Vec<ConsolidationProposal>,
    /// Parallel to `learnings`
    pub existing: Vec<Vec<ExistingMatch>>,
}

impl AnalysisReport {
    pub fn duplicates_found(&self) -> usize {
        self.existing.iter().filter(|hits| !hits.is_empty()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docs::TargetKind;
    use crate::queue::SourceType;
    use std::path::PathBuf;

    fn item(text: &str) -> WorkItem {
        WorkItem::queued(CandidateCorrection::new(
            text,
            "/a",
            SourceType::PatternMatch,
            0.6,
        ))
    }

    #[test]
    fn test_analyze() {
        let analyzer = Analyzer::new().unwrap();
        let items = vec![
            item("Use gpt-5.1 for complex tasks"),
            item("looks good"),
            item("Prefer gpt-5.1 over gpt-5 for reasoning"),
            item("no, use Postgres not SQLite"),
        ];
        let entries = vec![MemoryEntry {
            text: "Use Postgres not SQLite".to_string(),
            source_file: PathBuf::from("/a/CLAUDE.md"),
            relative_path: "./CLAUDE.md".to_string(),
            source_kind: TargetKind::Root,
            line: 3,
        }];

        let report = analyzer.analyze(&items, &entries);

        assert_eq!(report.candidates_seen, 4);
        assert_eq!(report.learnings.len(), 3);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].reason, RejectReason::Acknowledgement);
        assert_eq!(report.proposals.len(), 1);
        assert_eq!(report.duplicates_found(), 1);

        // Exact duplicate is still left for the human
        assert_eq!(report.learnings[2].merge_disposition, None);
        assert_eq!(report.learnings[0].merge_disposition, Some(MergeDisposition::New));
    }

    struct AcceptNothing;

    impl Classifier for AcceptNothing {
        fn classify(&self, _candidate: &CandidateCorrection, _context: &[String]) -> Decision {
            Decision::Reject(RejectReason::TooShort)
        }
    }

    #[test]
    fn test_custom_classifier() {
        let analyzer = Analyzer::with_classifier(Box::new(AcceptNothing)).unwrap();
        let (learnings, rejected) = analyzer.filter(&[item("use uv, not pip")]);
        assert!(learnings.is_empty());
        assert_eq!(rejected.len(), 1);
        assert!(rejected[0].queued);
    }
}
