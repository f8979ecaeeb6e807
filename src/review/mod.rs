/// Human review of queued learnings
///
/// The workflow state machine and the driver trait a UI implements.

pub mod workflow;

pub use workflow::{
    Resolution, ReviewDriver, ReviewSession, ReviewState, Strategy, Summary, SummaryItem,
};
