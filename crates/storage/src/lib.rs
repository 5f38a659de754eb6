//! `ClickHouse` persistence for fundscope
//!
//! Events are stored in a `ReplacingMergeTree` keyed by `(tx_hash, log_index)`, which makes
//! re-ingesting a log idempotent. The processed flag is flipped by inserting a newer version
//! of the same row.

pub mod models;
pub mod schema;
pub mod store;
pub mod types;
pub mod writer;

pub use models::{
    ContributionRow, EventCountRow, EventKey, EventRecord, ProjectCreatedRow, ProjectStatusRow,
    RefundRow,
};
pub use store::{EventStore, MemoryEventStore, VersionClock};
pub use types::{AddressBytes, HashBytes};
pub use writer::ClickhouseWriter;
