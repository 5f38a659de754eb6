//! Fundscope driver: checkpointed, batched scanning of contract events.
pub mod checkpoint;
pub mod driver;
pub mod error;
pub mod monitor;
pub mod status;

pub use driver::Driver;
pub use error::IndexerError;
pub use monitor::{EventMonitor, MonitorConfig, ScanOutcome};
pub use status::StatusSnapshot;
