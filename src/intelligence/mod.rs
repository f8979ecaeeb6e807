/// Intelligence module
///
/// Turns raw user turns into reviewable learnings: detection, classification,
/// consolidation and decay scoring.

pub mod analyzer;
pub mod classifier;
pub mod deduplicator;
pub mod learning;
pub mod lexicon;
pub mod pattern_detector;
pub mod patterns;
pub mod scorer;

pub use analyzer::{AnalysisReport, Analyzer, Rejection, WorkItem};
pub use classifier::{actionable_text, Classifier, Decision, RejectReason, RuleClassifier};
pub use deduplicator::{ConsolidationChoice, ConsolidationProposal, Deduplicator, ExistingMatch};
pub use learning::{Learning, MergeDisposition, Scope, SectionTag};
pub use lexicon::Lexicon;
pub use pattern_detector::{Detection, PatternDetector};
pub use patterns::{detect_language, Language, PatternFamily, PatternSet};
pub use scorer::Scorer;
