//! In-process proof verification for feed batches.
//!
//! Feeders attest a batch with a BLAKE3 MAC keyed by the program key over
//! `state_root || public_data`. State roots are submitted by feeders ahead
//! of the batch and served from a [`RootBook`].

use std::collections::HashMap;

use colla_oracle::ingest::{ProofVerifier, StateRootOracle};
use colla_types::Timestamp;

/// Attestation a feeder attaches to a batch.
pub fn attest(program_key: &[u8; 32], state_root: &[u8; 32], public_data: &[u8; 32]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_keyed(program_key);
    hasher.update(state_root);
    hasher.update(public_data);
    *hasher.finalize().as_bytes()
}

/// Verifies keyed BLAKE3 attestations.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeyedAttestationVerifier;

impl ProofVerifier for KeyedAttestationVerifier {
    fn verify(
        &self,
        program_key: &[u8; 32],
        state_root: &[u8; 32],
        proof: &[u8],
        public_data: &[u8; 32],
    ) -> bool {
        let expected = blake3::Hash::from(attest(program_key, state_root, public_data));
        // blake3::Hash equality is constant-time.
        <[u8; 32]>::try_from(proof)
            .map(|proof| expected == blake3::Hash::from(proof))
            .unwrap_or(false)
    }
}

/// State roots submitted by feeders, keyed by target timestamp.
#[derive(Clone, Debug, Default)]
pub struct RootBook {
    roots: HashMap<Timestamp, [u8; 32]>,
}

impl RootBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the root for `target`; returns the previous root, if any.
    pub fn insert(&mut self, target: Timestamp, root: [u8; 32]) -> Option<[u8; 32]> {
        self.roots.insert(target, root)
    }
}

impl StateRootOracle for RootBook {
    fn root_at(&self, target: Timestamp) -> Option<[u8; 32]> {
        self.roots.get(&target).copied()
    }
}
