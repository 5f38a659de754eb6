//! ABI-driven decoding of raw chain logs into typed events.
//!
//! ABIs are loaded at runtime, so decoding goes through `alloy`'s dynamic ABI types rather
//! than `sol!` bindings.
mod decode;
mod event;
mod value;

pub use decode::{decode, decode_topic};
pub use event::{DecodedEvent, EventKind, UNKNOWN_EVENT};
pub use value::FieldValue;
