use alloy::primitives::{Address, B256};
use derive_more::Deref;
use serde::{Deserialize, Serialize};

/// Wrapper around `[u8; 20]` stored as `FixedString(20)`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default, Deref,
)]
pub struct AddressBytes(pub [u8; 20]);

impl From<Address> for AddressBytes {
    fn from(value: Address) -> Self {
        Self(value.into_array())
    }
}

impl From<AddressBytes> for Address {
    fn from(value: AddressBytes) -> Self {
        Self::from(value.0)
    }
}

/// Wrapper around `[u8; 32]` stored as `FixedString(32)`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default, Deref,
)]
pub struct HashBytes(pub [u8; 32]);

impl From<B256> for HashBytes {
    fn from(value: B256) -> Self {
        Self(value.0)
    }
}

impl From<HashBytes> for B256 {
    fn from(value: HashBytes) -> Self {
        Self::from(value.0)
    }
}

impl HashBytes {
    /// Lowercase hex without `0x`, as expected by `unhex()` in queries.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}
