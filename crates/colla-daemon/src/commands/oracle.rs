//! Collateral oracle command handlers.

use std::sync::Arc;

use serde_json::Value;

use colla_oracle::ingest::FeedSubmission;
use colla_types::{Address, OwnershipEntry, Timestamp, ValidatorSnapshot};

use super::{bytes_param, hash_param, optional_param, param, Result};
use crate::DaemonState;

/// Store one validator's feed. Caller must be a registered feeder.
pub async fn store_feed_data(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller: Address = param(params, "caller")?;
    let validator: Address = param(params, "validator")?;
    let timestamp: Timestamp = param(params, "timestamp")?;
    let snapshot: ValidatorSnapshot = param(params, "snapshot")?;
    let ownerships: Vec<OwnershipEntry> = param(params, "ownerships")?;

    let mut engine = state.engine.lock().await;
    let index = engine.store_feed(caller, validator, timestamp, snapshot, ownerships)?;

    Ok(serde_json::json!({ "index": index }))
}

/// Record the state root feeders will prove a batch against.
pub async fn submit_state_root(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller: Address = param(params, "caller")?;
    let target: Timestamp = param(params, "target")?;
    let root = hash_param(params, "state_root")?;

    let mut engine = state.engine.lock().await;
    engine.submit_state_root(caller, target, root)?;

    Ok(serde_json::json!({ "target": target }))
}

/// Verify and store a batch of feeds sharing one target timestamp.
pub async fn ingest_feeds(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller: Address = param(params, "caller")?;
    let target: Timestamp = param(params, "target")?;
    let submissions: Vec<FeedSubmission> = param(params, "feeds")?;
    let proof = bytes_param(params, "proof")?;

    let mut engine = state.engine.lock().await;
    let indices = engine.ingest(caller, target, submissions, &proof)?;

    Ok(serde_json::json!({ "indices": indices }))
}

/// Aggregate snapshot of a validator at a timestamp.
pub async fn get_validator(state: &Arc<DaemonState>, params: &Value) -> Result {
    let validator: Address = param(params, "validator")?;
    let timestamp: Timestamp = param(params, "timestamp")?;

    let engine = state.engine.lock().await;
    let snapshot = engine.oracle().get_validator(timestamp, &validator)?;

    Ok(serde_json::json!(snapshot))
}

pub async fn get_collateral_ownership(state: &Arc<DaemonState>, params: &Value) -> Result {
    let validator: Address = param(params, "validator")?;
    let owner: Address = param(params, "owner")?;
    let timestamp: Timestamp = param(params, "timestamp")?;

    let engine = state.engine.lock().await;
    let shares = engine
        .oracle()
        .get_collateral_ownership(timestamp, &validator, &owner)?;

    Ok(serde_json::json!({ "shares": shares.to_string() }))
}

pub async fn get_ownership_twab(state: &Arc<DaemonState>, params: &Value) -> Result {
    let validator: Address = param(params, "validator")?;
    let owner: Address = param(params, "owner")?;
    let start: Timestamp = param(params, "start")?;
    let end: Timestamp = param(params, "end")?;

    let engine = state.engine.lock().await;
    let twab = engine
        .oracle()
        .get_collateral_ownership_twab(start, end, &validator, &owner)?;

    Ok(serde_json::json!({ "twab": twab.to_string() }))
}

/// Every owner with a positive TWAB over the window.
pub async fn get_ownerships_twab(state: &Arc<DaemonState>, params: &Value) -> Result {
    let validator: Address = param(params, "validator")?;
    let start: Timestamp = param(params, "start")?;
    let end: Timestamp = param(params, "end")?;

    let engine = state.engine.lock().await;
    let owners = engine
        .oracle()
        .get_collateral_ownerships_twab(start, end, &validator)?;

    let result: Vec<Value> = owners
        .iter()
        .map(|entry| {
            serde_json::json!({
                "owner": entry.owner,
                "twab": entry.twab.to_string(),
            })
        })
        .collect();
    Ok(serde_json::json!(result))
}

pub async fn get_total_twab(state: &Arc<DaemonState>, params: &Value) -> Result {
    let validator: Address = param(params, "validator")?;
    let start: Timestamp = param(params, "start")?;
    let end: Timestamp = param(params, "end")?;

    let engine = state.engine.lock().await;
    let twab = engine.oracle().get_total_twab(start, end, &validator)?;

    Ok(serde_json::json!({ "twab": twab.to_string() }))
}

/// Historical owners in first-seen order, optionally paged.
pub async fn get_historical_owners(state: &Arc<DaemonState>, params: &Value) -> Result {
    let validator: Address = param(params, "validator")?;
    let offset: usize = optional_param(params, "offset")?.unwrap_or(0);
    let limit: Option<usize> = optional_param(params, "limit")?;

    let engine = state.engine.lock().await;
    let owners = engine.oracle().get_historical_owners(&validator);
    let page: Vec<Address> = owners
        .iter()
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .copied()
        .collect();

    Ok(serde_json::json!({
        "total": owners.len(),
        "owners": page,
    }))
}

pub async fn get_last_feed_timestamp(state: &Arc<DaemonState>, params: &Value) -> Result {
    let validator: Address = param(params, "validator")?;

    let engine = state.engine.lock().await;
    let last = engine.oracle().get_last_feed_timestamp(&validator);

    Ok(serde_json::json!({ "timestamp": last }))
}

/// Every validator with at least one feed, in first-fed order.
pub async fn get_validators(state: &Arc<DaemonState>) -> Result {
    let engine = state.engine.lock().await;
    Ok(serde_json::json!(engine.oracle().validators()))
}
