//! IPC command handlers.
//!
//! Each submodule implements the commands for one IPC category. Amounts
//! travel as decimal strings in both directions; numbers are accepted on
//! input when they fit in a `u64`.

pub mod events;
pub mod oracle;
pub mod rewards;

use serde::de::DeserializeOwned;
use serde_json::Value;

use colla_types::Amount;

use crate::rpc::RpcError;

type Result<T = Value> = std::result::Result<T, RpcError>;

/// Required parameter `name`, deserialized as `T`.
pub(crate) fn param<T: DeserializeOwned>(params: &Value, name: &str) -> Result<T> {
    let value = params
        .get(name)
        .ok_or_else(|| RpcError::invalid_params(&format!("{name} required")))?;
    serde_json::from_value(value.clone())
        .map_err(|e| RpcError::invalid_params(&format!("{name}: {e}")))
}

/// Optional parameter `name`; `null` counts as absent.
pub(crate) fn optional_param<T: DeserializeOwned>(params: &Value, name: &str) -> Result<Option<T>> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => param(params, name).map(Some),
    }
}

/// Required amount, as a decimal string or a non-negative integer.
pub(crate) fn amount_param(params: &Value, name: &str) -> Result<Amount> {
    match params.get(name) {
        Some(Value::String(text)) => text
            .parse()
            .map_err(|e| RpcError::invalid_params(&format!("{name}: {e}"))),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Amount::from)
            .ok_or_else(|| RpcError::invalid_params(&format!("{name} must be a non-negative integer"))),
        _ => Err(RpcError::invalid_params(&format!("{name} required"))),
    }
}

/// Required 32-byte value, hex-encoded with an optional `0x` prefix.
pub(crate) fn hash_param(params: &Value, name: &str) -> Result<[u8; 32]> {
    let text: String = param(params, name)?;
    let mut out = [0u8; 32];
    hex::decode_to_slice(text.trim_start_matches("0x"), &mut out)
        .map_err(|e| RpcError::invalid_params(&format!("{name}: {e}")))?;
    Ok(out)
}

/// Required hex-encoded byte string.
pub(crate) fn bytes_param(params: &Value, name: &str) -> Result<Vec<u8>> {
    let text: String = param(params, name)?;
    hex::decode(text.trim_start_matches("0x"))
        .map_err(|e| RpcError::invalid_params(&format!("{name}: {e}")))
}
