use std::sync::atomic::{AtomicU64, Ordering};

use alloy::{json_abi::JsonAbi, primitives::Address};
use chainio::RawLog;
use decoder::DecodedEvent;

/// A registered contract.
///
/// Everything except the deployment block is fixed at construction. The deployment block
/// reads as 0 until it is known.
#[derive(Debug)]
pub struct ContractHandle {
    name: String,
    address: Address,
    abi: JsonAbi,
    deploy_block: AtomicU64,
}

impl ContractHandle {
    /// Create a handle; `deploy_block` 0 means unknown.
    pub const fn new(name: String, address: Address, abi: JsonAbi, deploy_block: u64) -> Self {
        Self { name, address, abi, deploy_block: AtomicU64::new(deploy_block) }
    }

    /// Contract name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Contract address.
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Parsed ABI.
    pub const fn abi(&self) -> &JsonAbi {
        &self.abi
    }

    /// First block the contract can emit events at, 0 while unknown.
    pub fn deploy_block(&self) -> u64 {
        self.deploy_block.load(Ordering::Acquire)
    }

    /// Record the deployment block once it has been resolved.
    pub(crate) fn set_deploy_block(&self, block: u64) {
        self.deploy_block.store(block, Ordering::Release);
    }

    /// Whether the contract may have emitted events in a batch ending at `to_block`.
    ///
    /// Contracts with an unknown deployment block are always eligible.
    pub fn is_eligible(&self, to_block: u64) -> bool {
        let deploy_block = self.deploy_block();
        deploy_block == 0 || deploy_block <= to_block
    }

    /// Decode a log emitted by this contract.
    pub fn decode(&self, log: &RawLog) -> DecodedEvent {
        decoder::decode(log, &self.name, &self.abi)
    }
}
