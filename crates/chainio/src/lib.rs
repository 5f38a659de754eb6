//! `ChainIO` is the read-only boundary to the chain: head, logs and code lookups.
pub mod client;
pub mod crowdfunding;
pub mod fetcher;
pub mod log;

use alloy::providers::{RootProvider, fillers::FillProvider, utils::JoinedRecommendedFillers};

pub use client::{ChainClient, ChainError, RpcChainClient};
pub use fetcher::LogFetcher;
pub use log::RawLog;

/// Alias to the default provider with all recommended fillers (read-only).
pub type DefaultProvider = FillProvider<JoinedRecommendedFillers, RootProvider>;
