/// Queue module for reflect
///
/// Durable, shared, append-only store of candidate corrections waiting for review.
/// Every write is an atomic file swap so concurrent sessions never corrupt it.

pub mod models;
pub mod store;

pub use models::*;
pub use store::QueueStore;
