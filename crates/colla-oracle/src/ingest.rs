//! Proof-verified feed ingestion.
//!
//! Feeds arrive in batches that share one target timestamp. A batch is
//! accepted only if the proof verifier accepts it against the state root
//! of that target and the batch's public-data digest. Either every
//! submission in the batch is stored or none is.
//!
//! State roots are fetched from a [`StateRootOracle`] and cached per
//! target. Once the grace window after a target has passed, only a cached
//! root can be used.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use colla_types::{Address, OwnershipEntry, Timestamp, ValidatorSnapshot};

use crate::store::CollateralOracleStore;
use crate::{OracleError, Result};

/// Domain separator for batch digests.
const BATCH_DIGEST_CONTEXT: &str = "colla 2026-10 feed batch public data v1";

/// Verifies succinct proofs over feed batches.
pub trait ProofVerifier {
    /// Returns `true` if `proof` attests `public_data` under `state_root`
    /// for the program identified by `program_key`.
    fn verify(
        &self,
        program_key: &[u8; 32],
        state_root: &[u8; 32],
        proof: &[u8],
        public_data: &[u8; 32],
    ) -> bool;
}

/// Source of consensus state roots.
pub trait StateRootOracle {
    /// State root at `target`, if the oracle can still serve it.
    fn root_at(&self, target: Timestamp) -> Option<[u8; 32]>;
}

/// Per-target state root cache with a grace window.
#[derive(Clone, Debug)]
pub struct StateRootCache {
    grace_secs: u64,
    cached: HashMap<Timestamp, [u8; 32]>,
}

impl StateRootCache {
    /// Create an empty cache with the given grace window in seconds.
    pub fn new(grace_secs: u64) -> Self {
        Self {
            grace_secs,
            cached: HashMap::new(),
        }
    }

    /// Grace window in seconds.
    pub fn grace_secs(&self) -> u64 {
        self.grace_secs
    }

    /// Cached root for `target`, if any.
    pub fn get(&self, target: Timestamp) -> Option<[u8; 32]> {
        self.cached.get(&target).copied()
    }

    /// Resolve the state root for `target` at time `now`.
    ///
    /// A cached root is returned as-is. Otherwise the oracle is queried
    /// while `now - target <= grace`, and a fetched root is cached.
    ///
    /// # Errors
    ///
    /// - [`OracleError::StateRootTimeout`] if nothing is cached and the
    ///   oracle cannot serve the root (or the grace window has passed)
    pub fn resolve(
        &mut self,
        oracle: &impl StateRootOracle,
        target: Timestamp,
        now: Timestamp,
    ) -> Result<[u8; 32]> {
        if let Some(root) = self.get(target) {
            tracing::debug!(target_ts = target, "reusing cached state root");
            return Ok(root);
        }

        let timeout = OracleError::StateRootTimeout {
            target,
            now,
            grace: self.grace_secs,
        };
        if now.saturating_sub(target) > self.grace_secs {
            tracing::warn!(target_ts = target, now, grace = self.grace_secs, "state root grace window elapsed");
            return Err(timeout);
        }
        let root = oracle.root_at(target).ok_or(timeout)?;
        self.cached.insert(target, root);
        Ok(root)
    }
}

/// One validator's feed inside a batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSubmission {
    pub validator: Address,
    pub timestamp: Timestamp,
    pub snapshot: ValidatorSnapshot,
    pub ownerships: Vec<OwnershipEntry>,
}

impl FeedSubmission {
    /// Canonical byte encoding committed to by the proof.
    ///
    /// Layout: validator (20) | timestamp (8, BE) | collateral amount,
    /// collateral shares, voting power, total voting power (16 each, BE) |
    /// owner count (8, BE) | per owner: address (20) | shares (16, BE).
    pub fn public_data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(20 + 8 + 64 + 8 + self.ownerships.len() * 36);
        out.extend_from_slice(self.validator.as_slice());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&self.snapshot.collateral_amount.to_be_bytes());
        out.extend_from_slice(&self.snapshot.collateral_shares.to_be_bytes());
        out.extend_from_slice(&self.snapshot.voting_power.to_be_bytes());
        out.extend_from_slice(&self.snapshot.total_voting_power.to_be_bytes());
        out.extend_from_slice(&(self.ownerships.len() as u64).to_be_bytes());
        for entry in &self.ownerships {
            out.extend_from_slice(entry.owner.as_slice());
            out.extend_from_slice(&entry.shares.to_be_bytes());
        }
        out
    }
}

/// Digest over a batch's submissions, in submission order.
pub fn batch_digest(target: Timestamp, submissions: &[FeedSubmission]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(BATCH_DIGEST_CONTEXT);
    hasher.update(&target.to_be_bytes());
    hasher.update(&(submissions.len() as u64).to_be_bytes());
    for submission in submissions {
        let data = submission.public_data();
        hasher.update(&(data.len() as u64).to_be_bytes());
        hasher.update(&data);
    }
    *hasher.finalize().as_bytes()
}

/// Applies proof-verified feed batches to a [`CollateralOracleStore`].
#[derive(Clone, Debug)]
pub struct FeedIngestor {
    program_key: [u8; 32],
    cache: StateRootCache,
}

impl FeedIngestor {
    pub fn new(program_key: [u8; 32], grace_secs: u64) -> Self {
        Self {
            program_key,
            cache: StateRootCache::new(grace_secs),
        }
    }

    pub fn program_key(&self) -> &[u8; 32] {
        &self.program_key
    }

    pub fn cache(&self) -> &StateRootCache {
        &self.cache
    }

    /// Verify and store a batch of feeds for `target`.
    ///
    /// Returns the feed index allocated to each submission, in order.
    ///
    /// # Errors
    ///
    /// - [`OracleError::EmptyBatch`] if `submissions` is empty
    /// - [`OracleError::TargetMismatch`] if a submission's timestamp differs from `target`
    /// - [`OracleError::DuplicateValidator`] if a validator appears twice
    /// - [`OracleError::StateRootTimeout`] if no state root is available
    /// - [`OracleError::ProofRejected`] if the verifier rejects the proof
    /// - any feed validation error from [`CollateralOracleStore::check_feed_data`]
    #[allow(clippy::too_many_arguments)]
    pub fn ingest<V, O>(
        &mut self,
        store: &mut CollateralOracleStore,
        verifier: &V,
        oracle: &O,
        target: Timestamp,
        submissions: Vec<FeedSubmission>,
        proof: &[u8],
        now: Timestamp,
    ) -> Result<Vec<u64>>
    where
        V: ProofVerifier,
        O: StateRootOracle,
    {
        if submissions.is_empty() {
            return Err(OracleError::EmptyBatch);
        }
        let mut seen = HashSet::with_capacity(submissions.len());
        for submission in &submissions {
            if submission.timestamp != target {
                return Err(OracleError::TargetMismatch {
                    expected: target,
                    actual: submission.timestamp,
                });
            }
            if !seen.insert(submission.validator) {
                return Err(OracleError::DuplicateValidator(submission.validator));
            }
            store.check_feed_data(&submission.validator, submission.timestamp, &submission.ownerships)?;
        }

        let state_root = self.cache.resolve(oracle, target, now)?;
        let digest = batch_digest(target, &submissions);
        if !verifier.verify(&self.program_key, &state_root, proof, &digest) {
            tracing::warn!(target_ts = target, batch = submissions.len(), "feed proof rejected");
            return Err(OracleError::ProofRejected { target });
        }

        let count = submissions.len();
        let mut indices = Vec::with_capacity(count);
        for submission in submissions {
            // Every submission passed check_feed_data against distinct validators.
            indices.push(store.store_feed_data(
                submission.validator,
                submission.timestamp,
                submission.snapshot,
                submission.ownerships,
            )?);
        }
        tracing::info!(target_ts = target, batch = count, "feed batch ingested");
        Ok(indices)
    }
}
