/// Core functionality modules
///
/// Live capture of corrections and project detection.

pub mod project_detector;
pub mod recorder;

pub use project_detector::ProjectDetector;
pub use recorder::{HookInput, Recorder};
