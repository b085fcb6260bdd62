//! The daemon's state: oracle store, reward router and treasury, backed by
//! SQLite.
//!
//! Every mutation runs in memory first. On success its effects and the
//! events it queued are written in one SQLite transaction. If that write
//! fails, memory is reloaded from the last commit before the error is
//! returned, so a failed call leaves no trace.

use std::collections::BTreeSet;

use rusqlite::Connection;
use tracing::error;

use colla_db::queries::{events, feeds, rewards, treasury};
use colla_db::DbError;
use colla_oracle::ingest::{FeedIngestor, FeedSubmission};
use colla_oracle::{CollateralOracleStore, OracleError};
use colla_rewards::{
    ClaimReceipt, DistributionConfig, EpochReward, LinearEpochClock, RewardError, RewardRouter,
    RouterRoles, StaticOperatorRegistry, Treasury,
};
use colla_types::events::Event;
use colla_types::{Address, Amount, Epoch, OwnershipEntry, Timestamp, ValidatorSnapshot};

use crate::attest::{KeyedAttestationVerifier, RootBook};
use crate::config::DaemonConfig;
use crate::epoch;

/// Errors surfaced by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Reward(#[from] RewardError),

    #[error(transparent)]
    Db(#[from] DbError),

    /// The caller is not a registered feeder.
    #[error("caller {0} is not a feeder")]
    NotFeeder(Address),
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::Db(DbError::Sqlite(e))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

pub struct Engine {
    conn: Connection,
    oracle: CollateralOracleStore,
    router: RewardRouter<LinearEpochClock>,
    treasury: Treasury,
    roles: RouterRoles,
    clock: LinearEpochClock,
    registry: StaticOperatorRegistry,
    feeders: BTreeSet<Address>,
    ingestor: FeedIngestor,
    roots: RootBook,
    /// Memory is ahead of the database and must be reloaded.
    stale: bool,
}

impl Engine {
    /// Restore state from `conn` and apply the configured roles.
    pub fn open(conn: Connection, config: &DaemonConfig) -> anyhow::Result<Self> {
        let roles = RouterRoles::new(
            config.roles.admins.iter().copied(),
            config.roles.operators.iter().copied(),
        );
        let clock = epoch::clock(&config.epochs);
        let oracle = colla_db::restore::oracle(&conn)?;
        let router = colla_db::restore::router(&conn, roles.clone(), clock)?;
        let treasury = treasury::load(&conn)?;
        let registry = config
            .roles
            .validator_operators
            .iter()
            .map(|(validator, operator)| (*validator, *operator))
            .collect();

        Ok(Self {
            conn,
            oracle,
            router,
            treasury,
            roles,
            clock,
            registry,
            feeders: config.roles.feeders.clone(),
            ingestor: FeedIngestor::new(
                config.ingest.program_key()?,
                config.ingest.state_root_grace_secs,
            ),
            roots: RootBook::new(),
            stale: false,
        })
    }

    pub fn oracle(&self) -> &CollateralOracleStore {
        &self.oracle
    }

    pub fn router(&self) -> &RewardRouter<LinearEpochClock> {
        &self.router
    }

    pub fn treasury(&self) -> &Treasury {
        &self.treasury
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    fn require_feeder(&self, caller: &Address) -> Result<()> {
        if self.feeders.contains(caller) {
            Ok(())
        } else {
            Err(EngineError::NotFeeder(*caller))
        }
    }

    fn drain_events(&mut self) -> Vec<Event> {
        let mut events = self.oracle.drain_events();
        events.extend(self.router.drain_events());
        events
    }

    /// Rebuild oracle, router and treasury from the last commit.
    fn reload(&mut self) -> Result<()> {
        self.oracle = colla_db::restore::oracle(&self.conn)?;
        self.router = colla_db::restore::router(&self.conn, self.roles.clone(), self.clock)?;
        self.treasury = treasury::load(&self.conn)?;
        self.stale = false;
        Ok(())
    }

    /// Reload if a previous write failed. Called before every mutation.
    fn sync(&mut self) -> Result<()> {
        if self.stale {
            self.reload()?;
        }
        Ok(())
    }

    /// Undo the in-memory effects of a mutation whose write failed.
    fn settle(&mut self, written: Result<()>) -> Result<()> {
        if let Err(err) = written {
            self.stale = true;
            if let Err(reload) = self.reload() {
                error!("reload after failed write: {reload}");
            }
            return Err(err);
        }
        Ok(())
    }

    /// Store a single feed submitted by a trusted feeder.
    pub fn store_feed(
        &mut self,
        caller: Address,
        validator: Address,
        timestamp: Timestamp,
        snapshot: ValidatorSnapshot,
        ownerships: Vec<OwnershipEntry>,
    ) -> Result<u64> {
        self.require_feeder(&caller)?;
        self.sync()?;
        let stored = feeds::StoredFeed {
            validator,
            timestamp,
            index: 0,
            snapshot: snapshot.clone(),
            ownerships: ownerships.clone(),
        };
        let index = self
            .oracle
            .store_feed_data(validator, timestamp, snapshot, ownerships)?;

        let events = self.drain_events();
        let written = persist(&mut self.conn, &events, |conn| {
            feeds::insert(conn, &feeds::StoredFeed { index, ..stored })
        });
        self.settle(written)?;
        Ok(index)
    }

    /// Record the state root of `target` for later batch verification.
    pub fn submit_state_root(&mut self, caller: Address, target: Timestamp, root: [u8; 32]) -> Result<()> {
        self.require_feeder(&caller)?;
        if self.roots.insert(target, root).is_some() {
            tracing::warn!(target_ts = target, %caller, "state root replaced");
        }
        Ok(())
    }

    /// Verify and store a batch of feeds sharing `target`.
    pub fn ingest(
        &mut self,
        caller: Address,
        target: Timestamp,
        submissions: Vec<FeedSubmission>,
        proof: &[u8],
    ) -> Result<Vec<u64>> {
        self.require_feeder(&caller)?;
        self.sync()?;
        let stored: Vec<feeds::StoredFeed> = submissions
            .iter()
            .map(|s| feeds::StoredFeed {
                validator: s.validator,
                timestamp: s.timestamp,
                index: 0,
                snapshot: s.snapshot.clone(),
                ownerships: s.ownerships.clone(),
            })
            .collect();
        let indices = self.ingestor.ingest(
            &mut self.oracle,
            &KeyedAttestationVerifier,
            &self.roots,
            target,
            submissions,
            proof,
            epoch::unix_now(),
        )?;

        let events = self.drain_events();
        let written = persist(&mut self.conn, &events, |conn| {
            for (feed, index) in stored.into_iter().zip(&indices) {
                feeds::insert(conn, &feeds::StoredFeed { index: *index, ..feed })?;
            }
            Ok(())
        });
        self.settle(written)?;
        Ok(indices)
    }

    /// Queue rewards for `validator`'s next finalization.
    pub fn deposit(&mut self, validator: Address, amount: Amount) -> Result<Amount> {
        self.sync()?;
        let pending = self.treasury.deposit(validator, amount)?;
        let written = persist(&mut self.conn, &[], |conn| treasury::save(conn, &self.treasury));
        self.settle(written)?;
        Ok(pending)
    }

    pub fn finalize_epoch(&mut self, epoch: Epoch, validator: Address) -> Result<EpochReward> {
        self.sync()?;
        let record = self
            .router
            .finalize_epoch(&self.oracle, &mut self.treasury, epoch, validator)?;

        let events = self.drain_events();
        let written = persist(&mut self.conn, &events, |conn| {
            rewards::upsert_epoch(conn, &validator, epoch, &record)?;
            treasury::save(conn, &self.treasury)
        });
        self.settle(written)?;
        Ok(record)
    }

    pub fn set_distribution_config(
        &mut self,
        caller: Address,
        validator: Address,
        start_epoch: Epoch,
        config: DistributionConfig,
    ) -> Result<()> {
        self.sync()?;
        let stored = config.clone();
        self.router
            .set_distribution_config(&self.registry, caller, validator, start_epoch, config)?;

        let events = self.drain_events();
        let written = persist(&mut self.conn, &events, |conn| {
            rewards::upsert_config(conn, &validator, start_epoch, &stored)
        });
        self.settle(written)
    }

    pub fn claim_rewards(
        &mut self,
        vault: Address,
        validator: Address,
        from: Epoch,
        to: Epoch,
    ) -> Result<ClaimReceipt> {
        self.sync()?;
        let receipt = self.router.claim_rewards(
            &self.oracle,
            &mut self.treasury,
            vault,
            validator,
            from,
            to,
        )?;
        self.persist_receipt(&receipt)?;
        Ok(receipt)
    }

    pub fn claim_for_non_targets(
        &mut self,
        caller: Address,
        validator: Address,
        vaults: &[Address],
        from: Epoch,
        to: Epoch,
    ) -> Result<ClaimReceipt> {
        self.sync()?;
        let receipt = self.router.claim_for_non_targets(
            &self.oracle,
            &mut self.treasury,
            caller,
            validator,
            vaults,
            from,
            to,
        )?;
        self.persist_receipt(&receipt)?;
        Ok(receipt)
    }

    fn persist_receipt(&mut self, receipt: &ClaimReceipt) -> Result<()> {
        let events = self.drain_events();
        let written = persist(&mut self.conn, &events, |conn| {
            for line in &receipt.lines {
                rewards::insert_claim(conn, &receipt.validator, &line.vault, line.epoch, line.gross)?;
            }
            treasury::save(conn, &self.treasury)
        });
        self.settle(written)
    }
}

/// Write a mutation's effects and events in one transaction.
///
/// A failed write leaves the database at the previous commit.
fn persist(
    conn: &mut Connection,
    queued: &[Event],
    write: impl FnOnce(&Connection) -> colla_db::Result<()>,
) -> Result<()> {
    let tx = conn.transaction()?;
    write(&tx)?;
    for event in queued {
        events::append(&tx, event)?;
    }
    tx.commit()?;
    Ok(())
}
