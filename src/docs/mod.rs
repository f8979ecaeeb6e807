/// Knowledge documents
///
/// Finding them, reading them, and merging approved learnings into them.

pub mod discovery;
pub mod document;
pub mod merger;

pub use discovery::{
    auto_memory_path, find_target_files, global_target, project_folder_name, project_target,
    read_all_memory_entries, read_auto_memory, LearningKind, MemoryEntry, MemoryTopic, Router,
    TargetFile, TargetKind,
};
pub use document::{DocumentStyle, TargetDocument, BEGIN_MARKER, END_MARKER};
pub use merger::{ApprovedEntry, DocumentOutcome, DocumentStatus, Merger, RunResult};
