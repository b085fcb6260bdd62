//! Integration test: epoch reward settlement.
//!
//! Exercises the reward lifecycle on top of a live oracle:
//! 1. Feed ownership for a validator across three epochs
//! 2. Finalize epochs from deposited rewards
//! 3. Route target claims with commission and non-target claims without
//! 4. Switch distribution configs between epochs
//! 5. Verify every minted unit ends up paid out exactly once
//!
//! This test uses colla-rewards (router, treasury), colla-oracle and
//! colla-types.

use colla_oracle::CollateralOracleStore;
use colla_rewards::{
    DistributionConfig, LinearEpochClock, RewardError, RewardRouter, RouterRoles,
    StaticOperatorRegistry, Treasury,
};
use colla_types::events::Event;
use colla_types::{Address, Epoch, OwnershipEntry, ValidatorSnapshot};

const V: Address = Address::repeat_byte(0xAA);
const X: Address = Address::repeat_byte(1);
const Y: Address = Address::repeat_byte(2);
const Z: Address = Address::repeat_byte(3);
const ADMIN: Address = Address::repeat_byte(0xAD);
const OPERATOR: Address = Address::repeat_byte(0x0E);
const DEFAULT: Address = Address::repeat_byte(0xDE);
const FEE: Address = Address::repeat_byte(0xFE);
const EPOCH_SECS: u64 = 1_000;

struct Harness {
    oracle: CollateralOracleStore,
    router: RewardRouter<LinearEpochClock>,
    treasury: Treasury,
    registry: StaticOperatorRegistry,
}

impl Harness {
    /// Epoch `e` spans `[1000e, 1000e + 1000)`. Feeds land at every epoch
    /// boundary from 1 through `last_epoch + 1`.
    fn new(last_epoch: Epoch) -> Self {
        let mut oracle = CollateralOracleStore::new();
        for epoch in 1..=last_epoch + 1 {
            // Z joins halfway through epoch 2.
            let mut ownerships = vec![OwnershipEntry::new(X, 25), OwnershipEntry::new(Y, 75)];
            if epoch >= 3 {
                ownerships.push(OwnershipEntry::new(Z, 100));
            }
            oracle
                .store_feed_data(V, epoch * EPOCH_SECS, ValidatorSnapshot::default(), ownerships)
                .expect("feed");
            if epoch == 2 {
                oracle
                    .store_feed_data(
                        V,
                        2_500,
                        ValidatorSnapshot::default(),
                        vec![
                            OwnershipEntry::new(X, 25),
                            OwnershipEntry::new(Y, 75),
                            OwnershipEntry::new(Z, 100),
                        ],
                    )
                    .expect("mid-epoch feed");
            }
        }
        let registry = [(V, OPERATOR)].into_iter().collect();
        Self {
            oracle,
            router: RewardRouter::new(RouterRoles::new([ADMIN], []), LinearEpochClock::new(0, EPOCH_SECS)),
            treasury: Treasury::new(),
            registry,
        }
    }

    fn finalize(&mut self, epoch: Epoch, reward: u128) {
        self.treasury.deposit(V, reward).expect("deposit");
        self.router
            .finalize_epoch(&self.oracle, &mut self.treasury, epoch, V)
            .expect("finalize");
    }

    fn configure(&mut self, caller: Address, start_epoch: Epoch, config: DistributionConfig) {
        self.router
            .set_distribution_config(&self.registry, caller, V, start_epoch, config)
            .expect("config");
    }
}

fn config(targets: &[Address], commission_bps: u16) -> DistributionConfig {
    DistributionConfig {
        targets: targets.iter().copied().collect(),
        operator: Some(OPERATOR),
        default_recipient: Some(DEFAULT),
        fee_recipient: Some(FEE),
        commission_bps,
    }
}

#[test]
fn target_claim_pays_commission() {
    let mut h = Harness::new(1);
    h.finalize(1, 1_000);
    // The registry operator can configure before any config exists.
    h.configure(OPERATOR, 1, config(&[X], 1_000));

    assert_eq!(
        h.router
            .get_claimable_rewards(&h.oracle, &V, &X, 1, 1)
            .expect("claimable"),
        225
    );

    let receipt = h
        .router
        .claim_rewards(&h.oracle, &mut h.treasury, X, V, 1, 1)
        .expect("claim");
    assert_eq!(receipt.lines.len(), 1);
    assert_eq!(receipt.lines[0].gross, 250);
    assert_eq!(receipt.lines[0].fee, 25);
    assert_eq!(receipt.lines[0].net, 225);
    assert_eq!(h.treasury.balance_of(&X), 225);
    assert_eq!(h.treasury.balance_of(&FEE), 25);
    assert_eq!(h.router.claimed_amount(&V, &X, 1), 250);

    // A second claim is a no-op.
    let again = h
        .router
        .claim_rewards(&h.oracle, &mut h.treasury, X, V, 1, 1)
        .expect("reclaim");
    assert!(again.is_empty());
    assert_eq!(h.treasury.balance_of(&X), 225);
}

#[test]
fn non_target_rewards_go_to_default_recipient() {
    let mut h = Harness::new(1);
    h.finalize(1, 1_000);
    h.configure(ADMIN, 1, config(&[X], 1_000));

    let err = h
        .router
        .claim_rewards(&h.oracle, &mut h.treasury, Y, V, 1, 1)
        .unwrap_err();
    assert!(matches!(err, RewardError::NotATarget { epoch: 1, .. }));

    // X is a target and is skipped; Y pays no commission.
    let receipt = h
        .router
        .claim_for_non_targets(&h.oracle, &mut h.treasury, DEFAULT, V, &[X, Y], 1, 1)
        .expect("non-target claim");
    assert_eq!(receipt.total_net(), 750);
    assert_eq!(receipt.total_fees(), 0);
    assert_eq!(receipt.transfers.len(), 1);
    assert_eq!(h.treasury.balance_of(&DEFAULT), 750);
    assert_eq!(h.router.claimed_amount(&V, &X, 1), 0);

    let events = h.router.drain_events();
    assert!(matches!(
        events.last(),
        Some(Event::NonTargetRewardsClaimed { epoch: 1, .. })
    ));
}

#[test]
fn config_changes_apply_from_their_epoch() {
    let mut h = Harness::new(3);
    h.configure(ADMIN, 1, config(&[X], 1_000));
    h.configure(OPERATOR, 3, config(&[X, Z], 0));
    for epoch in 1..=3 {
        h.finalize(epoch, 2_000);
    }

    // Backdating is rejected.
    let err = h
        .router
        .set_distribution_config(&h.registry, ADMIN, V, 2, config(&[], 0))
        .unwrap_err();
    assert!(matches!(err, RewardError::EpochOrder { start: 2, last: 3 }));

    // Epoch 2 total TWAB: 100 for 500s and 200 for 500s => 150.
    assert_eq!(h.router.epoch_reward(&V, 2).expect("epoch 2").total_twab, 150);

    // X: 500 gross in epoch 1, 333 in epoch 2, 250 in epoch 3.
    let receipt = h
        .router
        .claim_rewards(&h.oracle, &mut h.treasury, X, V, 1, 3)
        .expect("claim");
    let gross: Vec<u128> = receipt.lines.iter().map(|l| l.gross).collect();
    let fees: Vec<u128> = receipt.lines.iter().map(|l| l.fee).collect();
    assert_eq!(gross, vec![500, 333, 250]);
    assert_eq!(fees, vec![50, 33, 0]);
    assert_eq!(h.treasury.balance_of(&X), 450 + 300 + 250);
    assert_eq!(h.treasury.balance_of(&FEE), 83);

    // Z only became a target in epoch 3.
    let err = h
        .router
        .claim_rewards(&h.oracle, &mut h.treasury, Z, V, 2, 3)
        .unwrap_err();
    assert!(matches!(err, RewardError::NotATarget { epoch: 2, .. }));
    let receipt = h
        .router
        .claim_rewards(&h.oracle, &mut h.treasury, Z, V, 3, 3)
        .expect("z");
    assert_eq!(receipt.total_net(), 1_000);
}

#[test]
fn minted_rewards_are_conserved() {
    let mut h = Harness::new(3);
    h.configure(ADMIN, 1, config(&[X], 750));
    h.configure(ADMIN, 3, config(&[X, Z], 300));
    let pools = [1_000u128, 777, 12_345];
    for (epoch, pool) in (1..=3).zip(pools) {
        h.finalize(epoch, pool);
    }
    let minted: u128 = pools.iter().sum();

    h.router
        .claim_rewards(&h.oracle, &mut h.treasury, X, V, 1, 3)
        .expect("x");
    h.router
        .claim_rewards(&h.oracle, &mut h.treasury, Z, V, 3, 3)
        .expect("z");
    h.router
        .claim_for_non_targets(&h.oracle, &mut h.treasury, OPERATOR, V, &[Y, Z], 1, 3)
        .expect("non-targets");

    let paid: u128 = [X, Z, FEE, DEFAULT]
        .iter()
        .map(|addr| h.treasury.balance_of(addr))
        .sum();
    let escrow = h.treasury.escrow_of(&V);
    assert_eq!(paid + escrow, minted);
    // Rounding dust stays in escrow: at most one unit per claimed share.
    assert!(escrow <= 3 * 3);
}

#[test]
fn unauthorized_config_and_claims_are_rejected() {
    let mut h = Harness::new(1);
    let stranger = Address::repeat_byte(0x55);

    let err = h
        .router
        .set_distribution_config(&h.registry, stranger, V, 1, config(&[X], 0))
        .unwrap_err();
    assert!(matches!(err, RewardError::Unauthorized { caller } if caller == stranger));

    let err = h
        .router
        .set_distribution_config(&h.registry, ADMIN, V, 1, config(&[X], 10_001))
        .unwrap_err();
    assert!(matches!(err, RewardError::InvalidCommission(10_001)));

    h.configure(ADMIN, 1, config(&[X], 0));
    h.finalize(1, 1_000);
    let err = h
        .router
        .claim_for_non_targets(&h.oracle, &mut h.treasury, stranger, V, &[Y], 1, 1)
        .unwrap_err();
    assert!(matches!(err, RewardError::Unauthorized { .. }));
    assert_eq!(h.treasury.escrow_of(&V), 1_000);
}
