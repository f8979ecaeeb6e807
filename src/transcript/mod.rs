/// Session transcript mining
///
/// Reads the host's JSONL transcripts and turns past corrections into candidates.

pub mod models;
pub mod scanner;

pub use models::{TranscriptRecord, Turn, REJECTION_NOTICE};
pub use scanner::{ScanReport, ScannedCorrection, TranscriptScanner};
