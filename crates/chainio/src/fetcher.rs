//! Range log retrieval for a set of contracts.
use std::{collections::BTreeSet, sync::Arc};

use alloy::primitives::Address;
use tracing::{debug, warn};

use crate::{ChainClient, ChainError, RawLog};

/// Issues range-filtered log queries for many addresses at once.
#[derive(Debug, Clone)]
pub struct LogFetcher {
    client: Arc<dyn ChainClient>,
}

impl LogFetcher {
    /// Create a fetcher over `client`.
    pub fn new(client: Arc<dyn ChainClient>) -> Self {
        Self { client }
    }

    /// Fetch the logs of every address in `addresses` for `[from_block, to_block]` in a single
    /// query. Logs from addresses outside the set are dropped.
    pub async fn fetch(
        &self,
        addresses: &BTreeSet<Address>,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, ChainError> {
        if addresses.is_empty() || from_block > to_block {
            return Ok(Vec::new());
        }

        let query: Vec<Address> = addresses.iter().copied().collect();
        let logs = self.client.filter_logs(&query, from_block, to_block).await?;
        let total = logs.len();

        let logs: Vec<RawLog> =
            logs.into_iter().filter(|log| addresses.contains(&log.address)).collect();
        if logs.len() != total {
            warn!(
                dropped = total - logs.len(),
                from_block, to_block, "Upstream returned logs for unrequested addresses"
            );
        }

        debug!(
            from_block,
            to_block,
            contracts = addresses.len(),
            logs = logs.len(),
            "Fetched logs"
        );
        Ok(logs)
    }

    /// Fetch each address on its own, sequentially.
    ///
    /// Used when the combined query fails for a reason other than throttling, so that one
    /// misbehaving contract only costs its own logs. Stops early on throttling: the returned
    /// list then ends with the throttled address.
    pub async fn fetch_each(
        &self,
        addresses: &BTreeSet<Address>,
        from_block: u64,
        to_block: u64,
    ) -> Vec<(Address, Result<Vec<RawLog>, ChainError>)> {
        let mut results = Vec::with_capacity(addresses.len());
        for address in addresses {
            let result = self.client.filter_logs(&[*address], from_block, to_block).await;
            let throttled = matches!(&result, Err(err) if err.is_throttled());
            results.push((*address, result));
            if throttled {
                break;
            }
        }
        results
    }
}
