//! Business processors fed by the indexing engine.
//!
//! Processors are looked up by event name. An event without a processor is skipped, which
//! the engine treats the same as a successful dispatch.
mod crowdfunding;
mod registry;

pub use crowdfunding::{CrowdfundingProcessor, ProjectStatus, register_crowdfunding};
pub use registry::{Dispatch, EventProcessor, ProcessorRegistry};
