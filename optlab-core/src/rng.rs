//! Deterministic RNG hierarchy.
//!
//! A master seed generates deterministic sub-seeds for each `(run_id, label, round)`
//! tuple. Sub-seeds are derived via BLAKE3 hashing, independently of thread
//! scheduling order, so random extraction is identical regardless of thread count.

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Deterministic RNG hierarchy.
///
/// Because derivation is hash-based (not order-dependent), the same master
/// seed produces identical sub-seeds regardless of the order in which
/// labels or rounds are requested.
#[derive(Debug, Clone)]
pub struct RngHierarchy {
    master_seed: u64,
}

impl RngHierarchy {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Derive a deterministic sub-seed for a specific (run_id, label, round).
    pub fn sub_seed(&self, run_id: &str, label: &str, round: u64) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(run_id.as_bytes());
        hasher.update(&[0]);
        hasher.update(label.as_bytes());
        hasher.update(&round.to_le_bytes());
        let hash = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(head)
    }

    /// Create a seeded StdRng from a sub-seed.
    pub fn rng_for(&self, run_id: &str, label: &str, round: u64) -> StdRng {
        StdRng::seed_from_u64(self.sub_seed(run_id, label, round))
    }
}
