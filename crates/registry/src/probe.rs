//! Deployment block discovery via `eth_getCode`.
use alloy::primitives::Address;
use chainio::{ChainClient, ChainError};
use tracing::debug;

/// Default number of blocks below the head that the probe searches.
pub const DEFAULT_DEPLOY_LOOKBACK: u64 = 1000;

/// Find the first block in `[head - lookback, head]` at which `address` has code.
///
/// Returns `None` when the contract has no code at `head`, or already had code at the start of
/// the window (deployed before it). Code presence is assumed monotonic, so the window is
/// bisected instead of walked block by block.
pub async fn find_deploy_block(
    chain: &dyn ChainClient,
    address: Address,
    head: u64,
    lookback: u64,
) -> Result<Option<u64>, ChainError> {
    if !has_code(chain, address, head).await? {
        debug!(%address, head, "No code at head");
        return Ok(None);
    }

    let floor = head.saturating_sub(lookback);
    if has_code(chain, address, floor).await? {
        debug!(%address, floor, "Contract predates the lookback window");
        return Ok(None);
    }

    // Invariant: no code at `lo`, code at `hi`.
    let (mut lo, mut hi) = (floor, head);
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if has_code(chain, address, mid).await? {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    Ok(Some(hi))
}

async fn has_code(
    chain: &dyn ChainClient,
    address: Address,
    block_number: u64,
) -> Result<bool, ChainError> {
    Ok(!chain.code_at(address, block_number).await?.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    use alloy::primitives::Bytes;
    use async_trait::async_trait;
    use chainio::RawLog;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct DeployedAt {
        block: Option<u64>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChainClient for DeployedAt {
        async fn head_block_number(&self) -> Result<u64, ChainError> {
            Ok(700)
        }

        async fn filter_logs(
            &self,
            _: &[Address],
            _: u64,
            _: u64,
        ) -> Result<Vec<RawLog>, ChainError> {
            Ok(Vec::new())
        }

        async fn code_at(&self, _: Address, block_number: u64) -> Result<Bytes, ChainError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(match self.block {
                Some(deployed) if block_number >= deployed => Bytes::from_static(&[0x60, 0x80]),
                _ => Bytes::new(),
            })
        }
    }

    fn deployed_at(block: Option<u64>) -> DeployedAt {
        DeployedAt { block, calls: AtomicUsize::new(0) }
    }

    #[tokio::test]
    async fn finds_exact_deploy_block_within_window() {
        let chain = deployed_at(Some(650));
        let found = find_deploy_block(&chain, Address::ZERO, 700, DEFAULT_DEPLOY_LOOKBACK).await;

        assert_eq!(found.unwrap(), Some(650));
        assert!(chain.calls.load(Ordering::SeqCst) <= 14);
    }

    #[tokio::test]
    async fn deploy_at_head_is_found() {
        let chain = deployed_at(Some(700));
        let found = find_deploy_block(&chain, Address::ZERO, 700, 1000).await.unwrap();
        assert_eq!(found, Some(700));
    }

    #[tokio::test]
    async fn contract_older_than_window_is_unresolved() {
        let chain = deployed_at(Some(10));
        let found = find_deploy_block(&chain, Address::ZERO, 5_000, 1000).await.unwrap();
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn missing_contract_is_unresolved() {
        let chain = deployed_at(None);
        let found = find_deploy_block(&chain, Address::ZERO, 700, 1000).await.unwrap();
        assert_eq!(found, None);
        assert_eq!(chain.calls.load(Ordering::SeqCst), 1);
    }
}
