/// reflect library
///
/// Captures corrections given to an AI coding assistant, turns them into
/// reviewed learnings, and merges those into the assistant's memory files.

pub mod config;
pub mod core;
pub mod docs;
pub mod error;
pub mod intelligence;
pub mod queue;
pub mod review;
pub mod transcript;

// Re-exports for convenience
pub use config::{Paths, ProcessOptions};
pub use error::{ReflectError, Result};
pub use queue::QueueStore;
