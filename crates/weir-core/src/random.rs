//! Round-robin pool of seeded PRNGs

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// A fixed-size pool of independently seeded PRNGs handed out
/// round-robin.
///
/// Each generator is seeded once from a shared seed source at
/// construction; callers are then spread across the pool by a monotonic
/// counter modulo the pool size. Supplying a fixed seed makes every
/// generator, and therefore the whole pool, deterministic.
pub struct RngPool {
    pool: Vec<Mutex<StdRng>>,
    next: AtomicU64,
}

impl RngPool {
    /// Create a pool of `size` generators seeded from OS entropy.
    ///
    /// # Panics
    ///
    /// Panics if `size` is 0.
    pub fn new(size: usize) -> Self {
        Self::from_seed_source(size, StdRng::from_entropy())
    }

    /// Create a pool whose generators derive deterministically from
    /// `seed`.
    ///
    /// # Panics
    ///
    /// Panics if `size` is 0.
    pub fn with_seed(size: usize, seed: u64) -> Self {
        Self::from_seed_source(size, StdRng::seed_from_u64(seed))
    }

    fn from_seed_source(size: usize, mut seed_source: StdRng) -> Self {
        assert!(size > 0, "pool size must be greater than 0");
        let mut pool = Vec::with_capacity(size);
        for _ in 0..size {
            let mut seed = <StdRng as SeedableRng>::Seed::default();
            seed_source.fill_bytes(&mut seed);
            pool.push(Mutex::new(StdRng::from_seed(seed)));
        }
        Self {
            pool,
            next: AtomicU64::new(0),
        }
    }

    /// Number of generators in the pool.
    pub fn len(&self) -> usize {
        self.pool.len()
    }

    /// Always false; the constructor rejects empty pools.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Run `f` against the next generator in round-robin order.
    pub fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.pool.len() as u64;
        f(&mut self.pool[index as usize].lock())
    }

    /// Draw 64 random bits from the next generator.
    pub fn next_u64(&self) -> u64 {
        self.with_rng(|rng| rng.next_u64())
    }

    /// Fill `dest` from the next generator.
    pub fn fill_bytes(&self, dest: &mut [u8]) {
        self.with_rng(|rng| rng.fill_bytes(dest))
    }
}
