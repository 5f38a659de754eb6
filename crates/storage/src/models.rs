//! Row types stored in `ClickHouse`

use alloy::primitives::Address;
use clickhouse::Row;
use decoder::DecodedEvent;
use serde::{Deserialize, Serialize};

use crate::types::{AddressBytes, HashBytes};

/// Identity of a persisted event: one log of one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventKey {
    /// Transaction hash
    pub tx_hash: HashBytes,
    /// Position of the log in its block
    pub log_index: u64,
}

/// Row in the `events` table
#[derive(Debug, Clone, PartialEq, Eq, Row, Serialize, Deserialize)]
pub struct EventRecord {
    /// Transaction hash
    pub tx_hash: HashBytes,
    /// Position of the log in its block
    pub log_index: u64,
    /// Block the log was emitted in
    pub block_number: u64,
    /// Emitting contract
    pub contract_address: AddressBytes,
    /// Configured name of the emitting contract
    pub contract_name: String,
    /// Event name, `Unknown` when no ABI event matched
    pub event_name: String,
    /// Decoded fields as a JSON object
    pub fields: String,
    /// Set once the event processor succeeded
    pub processed: bool,
    /// Row version; the highest one wins on merge
    pub version: u64,
}

impl EventRecord {
    /// Build an unprocessed record for a decoded event. The store assigns the version.
    pub fn from_decoded(event: &DecodedEvent, contract_address: Address) -> Self {
        Self {
            tx_hash: event.tx_hash.into(),
            log_index: event.log_index,
            block_number: event.block_number,
            contract_address: contract_address.into(),
            contract_name: event.contract_name.clone(),
            event_name: event.name().to_owned(),
            fields: event.fields_json().to_string(),
            processed: false,
            version: 0,
        }
    }

    /// Uniqueness key of this record.
    pub const fn key(&self) -> EventKey {
        EventKey { tx_hash: self.tx_hash, log_index: self.log_index }
    }
}

/// Row in the `projects_created` table
#[derive(Debug, Clone, PartialEq, Eq, Row, Serialize, Deserialize)]
pub struct ProjectCreatedRow {
    /// Project ID
    pub project_id: u64,
    /// Project title
    pub title: String,
    /// Funding goal in wei
    pub target_amount: u128,
    /// Project creator
    pub creator: AddressBytes,
    /// Transaction hash
    pub tx_hash: HashBytes,
    /// Log index
    pub log_index: u64,
    /// Block number
    pub block_number: u64,
}

/// Row in the `project_status_changes` table
#[derive(Debug, Clone, PartialEq, Eq, Row, Serialize, Deserialize)]
pub struct ProjectStatusRow {
    /// Project ID
    pub project_id: u64,
    /// Raw status code
    pub status: u8,
    /// Status name
    pub status_name: String,
    /// Transaction hash
    pub tx_hash: HashBytes,
    /// Log index
    pub log_index: u64,
    /// Block number
    pub block_number: u64,
}

/// Row in the `contributions` table
#[derive(Debug, Clone, PartialEq, Eq, Row, Serialize, Deserialize)]
pub struct ContributionRow {
    /// Project ID
    pub project_id: u64,
    /// Contributor address
    pub contributor: AddressBytes,
    /// Contributed amount in wei
    pub amount: u128,
    /// Transaction hash
    pub tx_hash: HashBytes,
    /// Log index
    pub log_index: u64,
    /// Block number
    pub block_number: u64,
}

/// Row in the `refunds` table
#[derive(Debug, Clone, PartialEq, Eq, Row, Serialize, Deserialize)]
pub struct RefundRow {
    /// Project ID
    pub project_id: u64,
    /// Refunded address
    pub refundee: AddressBytes,
    /// Refunded amount in wei
    pub amount: u128,
    /// Reason given by the contract
    pub reason: String,
    /// Transaction hash
    pub tx_hash: HashBytes,
    /// Log index
    pub log_index: u64,
    /// Block number
    pub block_number: u64,
}

/// Number of events per name
#[derive(Debug, Clone, PartialEq, Eq, Row, Serialize, Deserialize)]
pub struct EventCountRow {
    /// Event name
    pub event_name: String,
    /// Events seen
    pub total: u64,
    /// Events whose processor succeeded
    pub processed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    use alloy::primitives::{B256, U256};
    use decoder::{EventKind, FieldValue};

    #[test]
    fn record_from_decoded_event_is_unprocessed() {
        let event = DecodedEvent {
            contract_name: "Crowdfunding".to_owned(),
            kind: EventKind::Known("ContributionMade".to_owned()),
            fields: vec![("projectId".to_owned(), FieldValue::Unsigned(U256::from(7)))],
            tx_hash: B256::repeat_byte(0x11),
            block_number: 650,
            log_index: 3,
        };

        let record = EventRecord::from_decoded(&event, Address::repeat_byte(0xaa));

        assert_eq!(record.event_name, "ContributionMade");
        assert_eq!(record.fields, r#"{"projectId":"7"}"#);
        assert!(!record.processed);
        assert_eq!(record.key(), EventKey { tx_hash: HashBytes([0x11; 32]), log_index: 3 });
    }
}
