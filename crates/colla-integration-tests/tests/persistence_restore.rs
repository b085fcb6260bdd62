//! Integration test: state survives a database round trip.
//!
//! Exercises the daemon's persistence path without the RPC layer:
//! 1. Run feeds, finalization, configs and claims in memory
//! 2. Mirror each committed change into SQLite, as the daemon does
//! 3. Rebuild oracle, router and treasury from the database
//! 4. Verify queries and further settlement behave identically
//!
//! This test uses colla-db (queries, restore), colla-oracle,
//! colla-rewards and colla-types.

use rusqlite::Connection;

use colla_db::queries::{events, feeds, rewards, treasury};
use colla_oracle::CollateralOracleStore;
use colla_rewards::{
    DistributionConfig, LinearEpochClock, RewardRouter, RouterRoles, StaticOperatorRegistry,
};
use colla_types::events::Event;
use colla_types::{Address, OwnershipEntry, ValidatorSnapshot};

const V: Address = Address::repeat_byte(0xAA);
const X: Address = Address::repeat_byte(1);
const Y: Address = Address::repeat_byte(2);
const ADMIN: Address = Address::repeat_byte(0xAD);
const DEFAULT: Address = Address::repeat_byte(0xDE);

fn roles() -> RouterRoles {
    RouterRoles::new([ADMIN], [])
}

fn clock() -> LinearEpochClock {
    LinearEpochClock::new(0, 100)
}

fn store_feed(
    conn: &Connection,
    oracle: &mut CollateralOracleStore,
    timestamp: u64,
    ownerships: Vec<OwnershipEntry>,
) {
    let snapshot = ValidatorSnapshot {
        collateral_amount: 1_000,
        collateral_shares: ownerships.iter().map(|o| o.shares).sum(),
        ..ValidatorSnapshot::default()
    };
    let index = oracle
        .store_feed_data(V, timestamp, snapshot.clone(), ownerships.clone())
        .expect("feed");
    feeds::insert(
        conn,
        &feeds::StoredFeed {
            validator: V,
            timestamp,
            index,
            snapshot,
            ownerships,
        },
    )
    .expect("persist feed");
}

fn log(conn: &Connection, queued: Vec<Event>) {
    for event in &queued {
        events::append(conn, event).expect("append");
    }
}

#[test]
fn restored_state_matches_live_state() {
    let conn = colla_db::open_memory().expect("db");
    let mut oracle = CollateralOracleStore::new();
    let mut router = RewardRouter::new(roles(), clock());
    let mut bank = colla_rewards::Treasury::new();
    let registry = StaticOperatorRegistry::new();

    store_feed(&conn, &mut oracle, 100, vec![OwnershipEntry::new(X, 40), OwnershipEntry::new(Y, 60)]);
    store_feed(&conn, &mut oracle, 150, vec![OwnershipEntry::new(X, 80), OwnershipEntry::new(Y, 20)]);
    store_feed(&conn, &mut oracle, 200, vec![OwnershipEntry::new(Y, 100)]);
    store_feed(&conn, &mut oracle, 300, vec![OwnershipEntry::new(Y, 100)]);
    log(&conn, oracle.drain_events());

    let config = DistributionConfig {
        targets: [X].into_iter().collect(),
        default_recipient: Some(DEFAULT),
        ..DistributionConfig::default()
    };
    router
        .set_distribution_config(&registry, ADMIN, V, 1, config.clone())
        .expect("config");
    rewards::upsert_config(&conn, &V, 1, &config).expect("persist config");

    for (epoch, pool) in [(1, 1_000u128), (2, 500)] {
        bank.deposit(V, pool).expect("deposit");
        let record = router
            .finalize_epoch(&oracle, &mut bank, epoch, V)
            .expect("finalize");
        rewards::upsert_epoch(&conn, &V, epoch, &record).expect("persist epoch");
    }

    // X claims epoch 1 only; epoch 2 stays open across the restart.
    let receipt = router
        .claim_rewards(&oracle, &mut bank, X, V, 1, 1)
        .expect("claim");
    for line in &receipt.lines {
        rewards::insert_claim(&conn, &V, &line.vault, line.epoch, line.gross).expect("persist claim");
    }
    treasury::save(&conn, &bank).expect("persist treasury");
    log(&conn, router.drain_events());
    assert_eq!(receipt.total_net(), 600);

    // Rebuild everything from disk.
    let restored_oracle = colla_db::restore::oracle(&conn).expect("oracle");
    let mut restored_router = colla_db::restore::router(&conn, roles(), clock()).expect("router");
    let mut restored_bank = treasury::load(&conn).expect("treasury");

    assert_eq!(restored_oracle.validators(), oracle.validators());
    assert_eq!(restored_oracle.get_historical_owners(&V), &[X, Y]);
    for owner in [X, Y] {
        assert_eq!(
            restored_oracle.get_twab_snapshot(&V, &owner),
            oracle.get_twab_snapshot(&V, &owner)
        );
        assert_eq!(
            restored_oracle
                .get_collateral_ownership_twab(100, 300, &V, &owner)
                .expect("restored"),
            oracle
                .get_collateral_ownership_twab(100, 300, &V, &owner)
                .expect("live")
        );
    }
    assert_eq!(restored_router.last_finalized_epoch(&V), 2);
    assert_eq!(restored_router.claimed_amount(&V, &X, 1), 600);
    assert_eq!(restored_bank.balance_of(&X), 600);
    assert_eq!(restored_bank.escrow_of(&V), 900);

    // Epoch 1 stays claimed; epoch 2 pays out after the restart.
    assert_eq!(
        restored_router
            .get_claimable_rewards(&restored_oracle, &V, &X, 1, 2)
            .expect("claimable"),
        0
    );
    let receipt = restored_router
        .claim_for_non_targets(&restored_oracle, &mut restored_bank, DEFAULT, V, &[Y], 1, 2)
        .expect("non-targets");
    assert_eq!(receipt.total_net(), 400 + 500);
    assert_eq!(restored_bank.escrow_of(&V), 0);

    let logged = events::since(&conn, 0, 100).expect("events");
    let kinds: Vec<&str> = logged.iter().map(|(_, e)| e.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            "feed_stored",
            "feed_stored",
            "feed_stored",
            "feed_stored",
            "distribution_config_set",
            "epoch_finalized",
            "epoch_finalized",
            "rewards_claimed",
        ]
    );
}

#[test]
fn corrupted_feed_log_fails_restore() {
    let conn = colla_db::open_memory().expect("db");
    let mut oracle = CollateralOracleStore::new();
    store_feed(&conn, &mut oracle, 100, vec![OwnershipEntry::new(X, 1)]);

    // A second row claiming an earlier timestamp cannot be replayed.
    feeds::insert(
        &conn,
        &feeds::StoredFeed {
            validator: V,
            timestamp: 50,
            index: 2,
            snapshot: ValidatorSnapshot::default(),
            ownerships: vec![OwnershipEntry::new(X, 1)],
        },
    )
    .expect("insert");

    let err = colla_db::restore::oracle(&conn).unwrap_err();
    assert!(matches!(err, colla_db::DbError::Restore(_)));
}
