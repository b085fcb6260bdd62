//! Reward router query functions: epoch records, configs and claims.

use rusqlite::Connection;

use colla_rewards::{DistributionConfig, EpochReward};
use colla_types::{Address, Amount, Epoch};

use crate::{address_from_sql, amount_from_sql, amount_to_sql, DbError, Result};

/// Insert or replace the record of `(validator, epoch)`.
pub fn upsert_epoch(
    conn: &Connection,
    validator: &Address,
    epoch: Epoch,
    record: &EpochReward,
) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO epoch_rewards (validator, epoch, total_reward, total_twab, finalized)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            validator.as_slice(),
            epoch as i64,
            amount_to_sql(record.total_reward),
            amount_to_sql(record.total_twab),
            record.finalized,
        ],
    )?;
    Ok(())
}

/// Every epoch record, ordered by validator then epoch.
pub fn load_epochs(conn: &Connection) -> Result<Vec<(Address, Epoch, EpochReward)>> {
    let mut stmt = conn.prepare(
        "SELECT validator, epoch, total_reward, total_twab, finalized
         FROM epoch_rewards ORDER BY validator, epoch",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, Vec<u8>>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, bool>(4)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut records = Vec::with_capacity(rows.len());
    for (validator, epoch, total_reward, total_twab, finalized) in rows {
        records.push((
            address_from_sql(&validator)?,
            epoch as u64,
            EpochReward {
                total_reward: amount_from_sql(&total_reward)?,
                total_twab: amount_from_sql(&total_twab)?,
                finalized,
            },
        ));
    }
    Ok(records)
}

/// Insert or replace the config effective at `(validator, effective_epoch)`.
pub fn upsert_config(
    conn: &Connection,
    validator: &Address,
    effective_epoch: Epoch,
    config: &DistributionConfig,
) -> Result<()> {
    let body = serde_json::to_string(config).map_err(|e| DbError::Serialization(e.to_string()))?;
    conn.execute(
        "INSERT OR REPLACE INTO distribution_configs (validator, effective_epoch, config)
         VALUES (?1, ?2, ?3)",
        rusqlite::params![validator.as_slice(), effective_epoch as i64, body],
    )?;
    Ok(())
}

/// Every config, ordered by validator then effective epoch.
pub fn load_configs(conn: &Connection) -> Result<Vec<(Address, Epoch, DistributionConfig)>> {
    let mut stmt = conn.prepare(
        "SELECT validator, effective_epoch, config
         FROM distribution_configs ORDER BY validator, effective_epoch",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, Vec<u8>>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut configs = Vec::with_capacity(rows.len());
    for (validator, epoch, body) in rows {
        let config: DistributionConfig =
            serde_json::from_str(&body).map_err(|e| DbError::Serialization(e.to_string()))?;
        configs.push((address_from_sql(&validator)?, epoch as u64, config));
    }
    Ok(configs)
}

/// Record a gross claim. A second claim for the same key is rejected.
pub fn insert_claim(
    conn: &Connection,
    validator: &Address,
    vault: &Address,
    epoch: Epoch,
    gross: Amount,
) -> Result<()> {
    conn.execute(
        "INSERT INTO claims (validator, vault, epoch, gross) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            validator.as_slice(),
            vault.as_slice(),
            epoch as i64,
            amount_to_sql(gross),
        ],
    )?;
    Ok(())
}

/// Every claim as `(validator, vault, epoch, gross)`.
pub fn load_claims(conn: &Connection) -> Result<Vec<(Address, Address, Epoch, Amount)>> {
    let mut stmt = conn.prepare("SELECT validator, vault, epoch, gross FROM claims")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, Vec<u8>>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut claims = Vec::with_capacity(rows.len());
    for (validator, vault, epoch, gross) in rows {
        claims.push((
            address_from_sql(&validator)?,
            address_from_sql(&vault)?,
            epoch as u64,
            amount_from_sql(&gross)?,
        ));
    }
    Ok(claims)
}
