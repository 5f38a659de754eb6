use alloy::{
    dyn_abi::DynSolValue,
    primitives::{Address, Bytes, I256, U256},
};
use serde_json::Value;

/// A decoded event field.
///
/// Integers keep their full 256-bit width. Types without a dedicated variant end up in
/// [`FieldValue::Unknown`] as a display string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// `uintN`
    Unsigned(U256),
    /// `intN`
    Signed(I256),
    /// `address`
    Address(Address),
    /// `bool`
    Bool(bool),
    /// `bytes` and `bytesN`
    Bytes(Bytes),
    /// `string`
    String(String),
    /// Arrays and tuples
    List(Vec<FieldValue>),
    /// Anything else, rendered as a string (hex for raw words)
    Unknown(String),
}

impl FieldValue {
    /// The value as an unsigned integer.
    pub const fn as_u256(&self) -> Option<U256> {
        match self {
            Self::Unsigned(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as a `u64`, if it is an unsigned integer that fits.
    pub fn as_u64(&self) -> Option<u64> {
        self.as_u256().and_then(|v| u64::try_from(v).ok())
    }

    /// The value as a signed integer.
    pub const fn as_i256(&self) -> Option<I256> {
        match self {
            Self::Signed(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as an address.
    pub const fn as_address(&self) -> Option<Address> {
        match self {
            Self::Address(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as a bool.
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as raw bytes.
    pub const fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(v) => Some(v),
            _ => None,
        }
    }

    /// The value as a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// JSON rendering used for persistence.
    ///
    /// Integers are rendered as decimal strings so that no precision is lost.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Unsigned(v) => Value::String(v.to_string()),
            Self::Signed(v) => Value::String(v.to_string()),
            Self::Address(a) => Value::String(a.to_checksum(None)),
            Self::Bool(b) => Value::Bool(*b),
            Self::Bytes(b) => Value::String(format!("0x{}", hex::encode(b))),
            Self::String(s) | Self::Unknown(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
        }
    }
}

impl From<DynSolValue> for FieldValue {
    fn from(value: DynSolValue) -> Self {
        match value {
            DynSolValue::Uint(v, _) => Self::Unsigned(v),
            DynSolValue::Int(v, _) => Self::Signed(v),
            DynSolValue::Address(a) => Self::Address(a),
            DynSolValue::Bool(b) => Self::Bool(b),
            DynSolValue::Bytes(b) => Self::Bytes(b.into()),
            DynSolValue::FixedBytes(word, size) => {
                Self::Bytes(Bytes::copy_from_slice(&word[..size.min(32)]))
            }
            DynSolValue::String(s) => Self::String(s),
            DynSolValue::Array(items) |
            DynSolValue::FixedArray(items) |
            DynSolValue::Tuple(items) => {
                Self::List(items.into_iter().map(Self::from).collect())
            }
            other => Self::Unknown(format!("{other:?}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use alloy::primitives::{B256, address};
    use serde_json::json;

    #[test]
    fn converts_dynamic_values() {
        assert_eq!(
            FieldValue::from(DynSolValue::Uint(U256::from(5), 256)),
            FieldValue::Unsigned(U256::from(5))
        );
        assert_eq!(
            FieldValue::from(DynSolValue::FixedBytes(B256::repeat_byte(0xab), 4)),
            FieldValue::Bytes(Bytes::from(vec![0xab; 4]))
        );
        assert_eq!(
            FieldValue::from(DynSolValue::Array(vec![DynSolValue::Bool(true)])),
            FieldValue::List(vec![FieldValue::Bool(true)])
        );
    }

    #[test]
    fn accessors_are_type_checked() {
        let amount = FieldValue::Unsigned(U256::from(7));
        assert_eq!(amount.as_u64(), Some(7));
        assert_eq!(amount.as_address(), None);

        let huge = FieldValue::Unsigned(U256::MAX);
        assert_eq!(huge.as_u64(), None);
        assert_eq!(huge.as_u256(), Some(U256::MAX));

        assert_eq!(FieldValue::String("x".to_owned()).as_str(), Some("x"));
        assert_eq!(FieldValue::Unknown("x".to_owned()).as_str(), None);
    }

    #[test]
    fn json_keeps_large_integers_exact() {
        assert_eq!(FieldValue::Unsigned(U256::MAX).to_json(), json!(U256::MAX.to_string()));
        assert_eq!(FieldValue::Signed(I256::MINUS_ONE).to_json(), json!("-1"));
        assert_eq!(
            FieldValue::Address(address!("0x5fbdb2315678afecb367f032d93f642f64180aa3")).to_json(),
            json!("0x5FbDB2315678afecb367f032d93F642f64180aa3")
        );
        assert_eq!(FieldValue::Bytes(Bytes::from(vec![1, 2])).to_json(), json!("0x0102"));
    }
}
