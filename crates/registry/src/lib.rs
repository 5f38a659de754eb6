//! Registry of monitored contracts: addresses, parsed ABIs and deployment blocks.
pub mod abi;
mod handle;
pub mod probe;
mod registry;

pub use abi::parse_abi;
pub use handle::ContractHandle;
pub use registry::ContractRegistry;

use thiserror::Error;

/// Errors returned by the contract registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The ABI source is neither a compiler artifact nor a bare ABI array.
    #[error("invalid ABI for contract {name}: {reason}")]
    InvalidAbi {
        /// Contract name
        name: String,
        /// Parser message
        reason: String,
    },
    /// The configured address is not a valid 20-byte hex address.
    #[error("invalid address for contract {name}: {address}")]
    InvalidAddress {
        /// Contract name
        name: String,
        /// Offending input
        address: String,
    },
    /// A contract with this name or address is already registered.
    #[error("contract already registered: {0}")]
    Duplicate(String),
    /// No contract with this name.
    #[error("contract not found: {0}")]
    NotFound(String),
}
