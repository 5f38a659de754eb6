//! Raw chain logs as consumed by the decoder.
use alloy::{
    primitives::{Address, B256, Bytes},
    rpc::types::Log,
};
use eyre::{OptionExt, Result};

/// A log as returned by a range query, with its on-chain identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    /// Emitting contract
    pub address: Address,
    /// Ordered topics; `topics[0]` is the event signature hash for non-anonymous events
    pub topics: Vec<B256>,
    /// ABI-encoded non-indexed fields
    pub data: Bytes,
    /// Transaction hash
    pub tx_hash: B256,
    /// Block number
    pub block_number: u64,
    /// Index of the log within its block
    pub log_index: u64,
}

impl RawLog {
    /// The event signature hash, if the log has any topics.
    pub fn signature(&self) -> Option<B256> {
        self.topics.first().copied()
    }
}

impl TryFrom<Log> for RawLog {
    type Error = eyre::Report;

    fn try_from(log: Log) -> Result<Self> {
        let tx_hash = log.transaction_hash.ok_or_eyre("log is missing its transaction hash")?;
        let block_number = log.block_number.ok_or_eyre("log is missing its block number")?;
        let log_index = log.log_index.ok_or_eyre("log is missing its log index")?;

        Ok(Self {
            address: log.address(),
            topics: log.topics().to_vec(),
            data: log.data().data.clone(),
            tx_hash,
            block_number,
            log_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use alloy::primitives::{LogData, address, b256, bytes};

    fn rpc_log(log_index: Option<u64>) -> Log {
        Log {
            inner: alloy::primitives::Log {
                address: address!("0x00000000000000000000000000000000000000aa"),
                data: LogData::new_unchecked(
                    vec![b256!(
                        "0x1111111111111111111111111111111111111111111111111111111111111111"
                    )],
                    bytes!("0x01"),
                ),
            },
            block_hash: None,
            block_number: Some(650),
            block_timestamp: None,
            transaction_hash: Some(B256::repeat_byte(7)),
            transaction_index: Some(0),
            log_index,
            removed: false,
        }
    }

    #[test]
    fn converts_mined_log() {
        let raw = RawLog::try_from(rpc_log(Some(3))).unwrap();
        assert_eq!(raw.block_number, 650);
        assert_eq!(raw.log_index, 3);
        assert_eq!(raw.tx_hash, B256::repeat_byte(7));
        assert_eq!(raw.data, bytes!("0x01"));
        assert_eq!(
            raw.signature(),
            Some(b256!("0x1111111111111111111111111111111111111111111111111111111111111111"))
        );
    }

    #[test]
    fn rejects_pending_log() {
        assert!(RawLog::try_from(rpc_log(None)).is_err());
    }
}
