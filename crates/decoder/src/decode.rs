use alloy::{
    dyn_abi::{DynSolType, DynSolValue, Specifier},
    json_abi::{Event, JsonAbi},
    primitives::{Address, B256, Bytes, I256, U256},
};
use chainio::RawLog;
use tracing::{debug, warn};

use crate::{DecodedEvent, EventKind, FieldValue};

/// Decode `log` against `abi`.
///
/// Never fails: a log whose signature matches no ABI event yields [`EventKind::Unknown`], and
/// a payload that cannot be unpacked leaves the non-indexed fields out of the result.
pub fn decode(log: &RawLog, contract_name: &str, abi: &JsonAbi) -> DecodedEvent {
    let mut decoded = DecodedEvent {
        contract_name: contract_name.to_owned(),
        kind: EventKind::Unknown { signature: log.signature() },
        fields: Vec::new(),
        tx_hash: log.tx_hash,
        block_number: log.block_number,
        log_index: log.log_index,
    };

    let Some(event) = log.signature().and_then(|signature| find_event(abi, signature)) else {
        debug!(
            contract = contract_name,
            signature = ?log.signature(),
            tx_hash = %log.tx_hash,
            log_index = log.log_index,
            "No ABI event matches log signature"
        );
        return decoded;
    };

    decoded.kind = EventKind::Known(event.name.clone());
    decoded.fields = decode_fields(event, log);
    decoded
}

/// ABI tables are small, a linear scan is enough.
fn find_event(abi: &JsonAbi, signature: B256) -> Option<&Event> {
    abi.events().find(|event| !event.anonymous && event.selector() == signature)
}

fn decode_fields(event: &Event, log: &RawLog) -> Vec<(String, FieldValue)> {
    let mut body = decode_body(event, log).into_iter();
    let mut topics = log.topics.iter().skip(1);
    let mut fields = Vec::with_capacity(event.inputs.len());

    for (i, param) in event.inputs.iter().enumerate() {
        let name = if param.name.is_empty() { format!("arg{i}") } else { param.name.clone() };
        let value = if param.indexed {
            let value = topics.next().map(|topic| decode_topic(&param.ty, *topic));
            if value.is_none() {
                warn!(
                    event = %event.name,
                    field = %name,
                    "Log has fewer topics than indexed fields"
                );
            }
            value
        } else {
            body.next()
        };

        if let Some(value) = value {
            fields.push((name, value));
        }
    }
    fields
}

/// Unpack the non-indexed parameters from the data payload, in declaration order.
///
/// Returns an empty list when the types cannot be resolved or the payload does not match.
fn decode_body(event: &Event, log: &RawLog) -> Vec<FieldValue> {
    let types: Result<Vec<DynSolType>, _> =
        event.inputs.iter().filter(|param| !param.indexed).map(|param| param.resolve()).collect();
    let types = match types {
        Ok(types) if types.is_empty() => return Vec::new(),
        Ok(types) => types,
        Err(err) => {
            warn!(event = %event.name, err = %err, "Unsupported parameter type in ABI");
            return Vec::new();
        }
    };

    match DynSolType::Tuple(types).abi_decode_sequence(&log.data) {
        Ok(DynSolValue::Tuple(values)) => values.into_iter().map(FieldValue::from).collect(),
        Ok(other) => vec![FieldValue::from(other)],
        Err(err) => {
            warn!(
                event = %event.name,
                tx_hash = %log.tx_hash,
                log_index = log.log_index,
                err = %err,
                "Failed to unpack event data, omitting non-indexed fields"
            );
            Vec::new()
        }
    }
}

/// Decode a single indexed parameter of Solidity type `ty` from its topic word.
///
/// Dynamic types (`string`, `bytes`, arrays, tuples) are stored as hashes in topics; `bytes`
/// yields the raw hash and the others fall back to its hex string.
pub fn decode_topic(ty: &str, topic: B256) -> FieldValue {
    if ty.ends_with(']') || ty.starts_with('(') || ty.starts_with("tuple") {
        return FieldValue::Unknown(topic.to_string());
    }

    if ty.starts_with("uint") {
        FieldValue::Unsigned(U256::from_be_bytes(topic.0))
    } else if ty.starts_with("int") {
        FieldValue::Signed(I256::from_raw(U256::from_be_bytes(topic.0)))
    } else if ty == "address" {
        FieldValue::Address(Address::from_word(topic))
    } else if ty == "bool" {
        FieldValue::Bool(!topic.is_zero())
    } else if ty == "bytes" {
        FieldValue::Bytes(Bytes::copy_from_slice(topic.as_slice()))
    } else if let Some(size) = fixed_bytes_size(ty) {
        FieldValue::Bytes(Bytes::copy_from_slice(&topic[..size]))
    } else {
        FieldValue::Unknown(topic.to_string())
    }
}

fn fixed_bytes_size(ty: &str) -> Option<usize> {
    ty.strip_prefix("bytes")
        .and_then(|size| size.parse::<usize>().ok())
        .filter(|size| (1..=32).contains(size))
}
