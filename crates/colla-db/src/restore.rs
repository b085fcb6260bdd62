//! Rebuild in-memory state from the database.
//!
//! Feeds are replayed through [`CollateralOracleStore::store_feed_data`], so
//! the accumulators are recomputed rather than trusted from disk. Router
//! state is reinstalled record by record.

use rusqlite::Connection;

use colla_oracle::CollateralOracleStore;
use colla_rewards::{ClaimLedger, DistributionConfigStore, EpochClock, EpochLedger, RewardRouter, RouterRoles};

use crate::queries::{feeds, rewards};
use crate::{DbError, Result};

/// Replay every stored feed into a fresh oracle store.
pub fn oracle(conn: &Connection) -> Result<CollateralOracleStore> {
    let mut store = CollateralOracleStore::new();
    let stored = feeds::load_all(conn)?;
    let count = stored.len();
    for feed in stored {
        let index = store
            .store_feed_data(feed.validator, feed.timestamp, feed.snapshot, feed.ownerships)
            .map_err(|e| DbError::Restore(format!("feed {}@{}: {e}", feed.validator, feed.timestamp)))?;
        if index != feed.index {
            return Err(DbError::Restore(format!(
                "feed {}@{} replayed at index {index}, stored as {}",
                feed.validator, feed.timestamp, feed.index
            )));
        }
    }
    // Replayed feeds were already logged when first stored.
    let _ = store.drain_events();
    tracing::info!(feeds = count, validators = store.validator_count(), "oracle restored");
    Ok(store)
}

/// Rebuild the reward router from stored epochs, configs and claims.
pub fn router<C: EpochClock>(conn: &Connection, roles: RouterRoles, clock: C) -> Result<RewardRouter<C>> {
    let mut ledger = EpochLedger::new();
    for (validator, epoch, record) in rewards::load_epochs(conn)? {
        ledger.restore(validator, epoch, record);
    }

    let mut configs = DistributionConfigStore::new();
    for (validator, epoch, config) in rewards::load_configs(conn)? {
        configs
            .set(validator, epoch, config)
            .map_err(|e| DbError::Restore(format!("config {validator}@{epoch}: {e}")))?;
    }

    let mut claims = ClaimLedger::new();
    for (validator, vault, epoch, gross) in rewards::load_claims(conn)? {
        claims.record(validator, vault, epoch, gross);
    }

    tracing::info!(claims = claims.len(), "router restored");
    Ok(RewardRouter::from_parts(roles, clock, ledger, configs, claims))
}
