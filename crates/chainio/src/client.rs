//! Chain client abstraction and its alloy-backed implementation.
use alloy::{
    eips::BlockId,
    primitives::{Address, Bytes},
    providers::{Provider, ProviderBuilder},
    rpc::{client::ClientBuilder, types::Filter},
    transports::TransportError,
};
use async_trait::async_trait;
use derive_more::Debug;
use primitives::retries::{DEFAULT_RETRY_LAYER, is_rate_limited};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::{DefaultProvider, log::RawLog};

/// Failures surfaced by a [`ChainClient`].
#[derive(Debug, Error)]
pub enum ChainError {
    /// The upstream refused the request because of its rate limits.
    #[error("upstream throttled the request: {0}")]
    Throttled(String),
    /// Any other transport or node failure.
    #[error("chain unavailable: {0}")]
    Unavailable(String),
}

impl ChainError {
    /// Classify a transport error.
    pub fn from_transport(err: &TransportError) -> Self {
        if is_rate_limited(err) {
            Self::Throttled(err.to_string())
        } else {
            Self::Unavailable(err.to_string())
        }
    }

    /// Whether this error is upstream throttling.
    pub const fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled(_))
    }
}

impl From<TransportError> for ChainError {
    fn from(err: TransportError) -> Self {
        Self::from_transport(&err)
    }
}

/// Read-only view of a chain. Implementations must be safe for concurrent use.
#[async_trait]
pub trait ChainClient: Send + Sync + std::fmt::Debug {
    /// Latest block number.
    async fn head_block_number(&self) -> Result<u64, ChainError>;

    /// Logs emitted by any of `addresses` in the inclusive range `[from_block, to_block]`.
    async fn filter_logs(
        &self,
        addresses: &[Address],
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, ChainError>;

    /// Code deployed at `address` as of `block_number`; empty when there is none.
    async fn code_at(&self, address: Address, block_number: u64) -> Result<Bytes, ChainError>;
}

/// [`ChainClient`] over a JSON-RPC HTTP endpoint.
#[derive(Debug, Clone)]
pub struct RpcChainClient {
    #[debug(skip)]
    provider: DefaultProvider,
    url: Url,
}

impl RpcChainClient {
    /// Connect to `rpc_url` with the default transport retry layer.
    pub fn new(rpc_url: Url) -> Self {
        let client = ClientBuilder::default().layer(DEFAULT_RETRY_LAYER).http(rpc_url.clone());
        let provider = ProviderBuilder::new().connect_client(client);
        Self { provider, url: rpc_url }
    }

    /// Endpoint this client talks to.
    pub const fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn head_block_number(&self) -> Result<u64, ChainError> {
        let head = self.provider.get_block_number().await?;
        debug!(head, "Fetched chain head");
        Ok(head)
    }

    async fn filter_logs(
        &self,
        addresses: &[Address],
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, ChainError> {
        let filter =
            Filter::new().address(addresses.to_vec()).from_block(from_block).to_block(to_block);
        let logs = self.provider.get_logs(&filter).await?;

        let raw = logs
            .into_iter()
            .filter_map(|log| match RawLog::try_from(log) {
                Ok(raw) => Some(raw),
                Err(err) => {
                    warn!(err = %err, from_block, to_block, "Skipping log without chain identity");
                    None
                }
            })
            .collect();
        Ok(raw)
    }

    async fn code_at(&self, address: Address, block_number: u64) -> Result<Bytes, ChainError> {
        let code =
            self.provider.get_code_at(address).block_id(BlockId::number(block_number)).await?;
        Ok(code)
    }
}
