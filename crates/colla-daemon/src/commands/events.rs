//! Event log command handlers.

use std::sync::Arc;

use serde_json::Value;

use super::{optional_param, Result};
use crate::rpc::RpcError;
use crate::DaemonState;

const MAX_PAGE: u32 = 1_000;

/// Logged events with ids greater than `after`, oldest first.
pub async fn get_events(state: &Arc<DaemonState>, params: &Value) -> Result {
    let after: i64 = optional_param(params, "after")?.unwrap_or(0);
    let limit: u32 = optional_param(params, "limit")?.unwrap_or(100).min(MAX_PAGE);

    let engine = state.engine.lock().await;
    let events = colla_db::queries::events::since(engine.conn(), after, limit)
        .map_err(|e| RpcError::internal_error(&format!("db error: {e}")))?;

    let result: Vec<Value> = events
        .into_iter()
        .map(|(id, event)| {
            serde_json::json!({
                "id": id,
                "kind": event.kind(),
                "event": event,
            })
        })
        .collect();
    Ok(serde_json::json!(result))
}
