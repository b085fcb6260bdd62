//! Epoch reward command handlers.

use std::sync::Arc;

use serde_json::Value;

use colla_rewards::DistributionConfig;
use colla_types::{Address, Epoch};

use super::{amount_param, param, Result};
use crate::rpc::RpcError;
use crate::{epoch, DaemonState};

/// Current epoch and the seconds until the next one begins.
pub async fn get_current_epoch(state: &Arc<DaemonState>) -> Result {
    let now = epoch::unix_now();
    let engine = state.engine.lock().await;
    let clock = engine.router().clock();

    Ok(serde_json::json!({
        "epoch": epoch::current_epoch(clock, now),
        "seconds_until_next": epoch::seconds_until_next_epoch(clock, now),
        "now": now,
    }))
}

/// Queue rewards for a validator's next finalized epoch.
pub async fn deposit_rewards(state: &Arc<DaemonState>, params: &Value) -> Result {
    let validator: Address = param(params, "validator")?;
    let amount = amount_param(params, "amount")?;

    let mut engine = state.engine.lock().await;
    let pending = engine.deposit(validator, amount)?;

    Ok(serde_json::json!({ "pending": pending.to_string() }))
}

/// Mint and record an epoch's reward pool. Open to any caller.
pub async fn finalize_epoch(state: &Arc<DaemonState>, params: &Value) -> Result {
    let validator: Address = param(params, "validator")?;
    let epoch: Epoch = param(params, "epoch")?;

    let mut engine = state.engine.lock().await;
    let record = engine.finalize_epoch(epoch, validator)?;

    Ok(serde_json::json!(record))
}

pub async fn get_epoch_reward(state: &Arc<DaemonState>, params: &Value) -> Result {
    let validator: Address = param(params, "validator")?;
    let epoch: Epoch = param(params, "epoch")?;

    let engine = state.engine.lock().await;
    let router = engine.router();
    Ok(serde_json::json!({
        "record": router.epoch_reward(&validator, epoch),
        "last_finalized_epoch": router.last_finalized_epoch(&validator),
    }))
}

pub async fn set_distribution_config(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller: Address = param(params, "caller")?;
    let validator: Address = param(params, "validator")?;
    let start_epoch: Epoch = param(params, "start_epoch")?;
    let config: DistributionConfig = param(params, "config")?;

    let mut engine = state.engine.lock().await;
    engine.set_distribution_config(caller, validator, start_epoch, config)?;

    Ok(serde_json::json!({ "start_epoch": start_epoch }))
}

/// Config applicable at `epoch`, plus every effective epoch on record.
pub async fn get_distribution_config(state: &Arc<DaemonState>, params: &Value) -> Result {
    let validator: Address = param(params, "validator")?;
    let epoch: Epoch = param(params, "epoch")?;

    let engine = state.engine.lock().await;
    let router = engine.router();
    Ok(serde_json::json!({
        "config": router.applicable_config(&validator, epoch),
        "effective_epochs": router.config_epochs(&validator),
    }))
}

pub async fn claim_rewards(state: &Arc<DaemonState>, params: &Value) -> Result {
    let vault: Address = param(params, "vault")?;
    let validator: Address = param(params, "validator")?;
    let from: Epoch = param(params, "from_epoch")?;
    let to: Epoch = param(params, "to_epoch")?;

    let mut engine = state.engine.lock().await;
    let receipt = engine.claim_rewards(vault, validator, from, to)?;

    Ok(serde_json::json!({
        "total_net": receipt.total_net().to_string(),
        "total_fees": receipt.total_fees().to_string(),
        "receipt": receipt,
    }))
}

pub async fn claim_for_non_targets(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller: Address = param(params, "caller")?;
    let validator: Address = param(params, "validator")?;
    let vaults: Vec<Address> = param(params, "vaults")?;
    let from: Epoch = param(params, "from_epoch")?;
    let to: Epoch = param(params, "to_epoch")?;
    if vaults.is_empty() {
        return Err(RpcError::invalid_params("vaults must not be empty"));
    }

    let mut engine = state.engine.lock().await;
    let receipt = engine.claim_for_non_targets(caller, validator, &vaults, from, to)?;

    Ok(serde_json::json!({
        "total_net": receipt.total_net().to_string(),
        "receipt": receipt,
    }))
}

/// Net amount `vault` could claim over the range right now.
pub async fn get_claimable_rewards(state: &Arc<DaemonState>, params: &Value) -> Result {
    let vault: Address = param(params, "vault")?;
    let validator: Address = param(params, "validator")?;
    let from: Epoch = param(params, "from_epoch")?;
    let to: Epoch = param(params, "to_epoch")?;

    let engine = state.engine.lock().await;
    let claimable = engine
        .router()
        .get_claimable_rewards(engine.oracle(), &validator, &vault, from, to)?;

    Ok(serde_json::json!({ "claimable": claimable.to_string() }))
}

/// Treasury balances of an address.
pub async fn get_balance(state: &Arc<DaemonState>, params: &Value) -> Result {
    let address: Address = param(params, "address")?;

    let engine = state.engine.lock().await;
    let account = engine.treasury().account(&address);

    Ok(serde_json::json!({
        "balance": account.balance.to_string(),
        "pending": account.pending.to_string(),
        "escrow": account.escrow.to_string(),
    }))
}
