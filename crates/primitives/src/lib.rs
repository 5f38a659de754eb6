//! Shared primitives for the fundscope indexer.
/// Throttling backoff schedule and state
pub mod backoff;
/// Transport retry layer and error classification
pub mod retries;

pub use backoff::{BackoffPolicy, BackoffState};
