use alloy::primitives::B256;
use serde_json::{Map, Value};

use crate::FieldValue;

/// Event name recorded for logs that match no ABI event.
pub const UNKNOWN_EVENT: &str = "Unknown";

/// Whether a log was matched against the owning contract's ABI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Matched an ABI event with this name
    Known(String),
    /// No ABI event matched; carries the raw signature topic, if the log had one
    Unknown {
        /// `topics[0]` of the log
        signature: Option<B256>,
    },
}

/// A raw log decoded against its contract's ABI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvent {
    /// Name of the contract that emitted the log
    pub contract_name: String,
    /// Matched event, or the unknown variant
    pub kind: EventKind,
    /// Decoded parameters in declaration order
    pub fields: Vec<(String, FieldValue)>,
    /// Transaction hash of the log
    pub tx_hash: B256,
    /// Block the log was emitted in
    pub block_number: u64,
    /// Index of the log within its block
    pub log_index: u64,
}

impl DecodedEvent {
    /// Event name, [`UNKNOWN_EVENT`] when unmatched.
    pub fn name(&self) -> &str {
        match &self.kind {
            EventKind::Known(name) => name,
            EventKind::Unknown { .. } => UNKNOWN_EVENT,
        }
    }

    /// Whether no ABI event matched.
    pub const fn is_unknown(&self) -> bool {
        matches!(self.kind, EventKind::Unknown { .. })
    }

    /// Look up a field by parameter name.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(field, _)| field == name).map(|(_, value)| value)
    }

    /// JSON object of all fields. Unknown events carry their raw signature instead.
    pub fn fields_json(&self) -> Value {
        let mut map = Map::new();
        if let EventKind::Unknown { signature: Some(signature) } = &self.kind {
            map.insert("signature".to_owned(), Value::String(signature.to_string()));
        }
        for (name, value) in &self.fields {
            map.insert(name.clone(), value.to_json());
        }
        Value::Object(map)
    }
}
