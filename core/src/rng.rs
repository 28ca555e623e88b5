//! Deterministic random number generation.
//!
//! RULE: Nothing in the pipeline may call any platform RNG.
//! All randomness flows through StreamRng instances derived from a
//! single master seed, so a run is fully reproducible from its seed.
//!
//! Each consumer gets its own RNG stream, seeded deterministically
//! from (master_seed XOR stream_index). This means:
//!   - Adding a new stream never changes existing streams.
//!   - Each stream is fully reproducible in isolation.

use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

/// A named, deterministic RNG for a single pipeline stream.
pub struct StreamRng {
    pub name: &'static str,
    inner: Pcg64Mcg,
}

impl StreamRng {
    /// Create a stream RNG from the master seed and a stable stream
    /// index. The index must never change once assigned.
    pub fn new(master_seed: u64, stream_index: u64) -> Self {
        let derived_seed = master_seed ^ (stream_index.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        Self {
            name: "unnamed",
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    /// Create a stream RNG directly from a raw seed. Used for the
    /// per-tree seeds the forest draws out of its own stream.
    pub fn from_raw_seed(seed: u64) -> Self {
        Self {
            name: "raw",
            inner: Pcg64Mcg::seed_from_u64(seed),
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        use rand::RngCore;
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Draw a raw u64 (full range).
    pub fn next_u64(&mut self) -> u64 {
        use rand::RngCore;
        self.inner.next_u64()
    }

    /// Roll a u64 in [0, n).
    pub fn next_u64_below(&mut self, n: u64) -> u64 {
        use rand::RngCore;
        assert!(n > 0, "n must be > 0");
        self.inner.next_u64() % n
    }

    /// Roll an i64 in [lo, hi] inclusive.
    pub fn range_i64(&mut self, lo: i64, hi: i64) -> i64 {
        assert!(lo <= hi, "lo must be <= hi");
        lo + self.next_u64_below((hi - lo + 1) as u64) as i64
    }

    /// Bernoulli trial: returns true with probability p.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Sample from a simplified Pareto distribution.
    /// x_min: minimum value, alpha: shape parameter (higher = less skewed).
    pub fn pareto(&mut self, x_min: f64, alpha: f64) -> f64 {
        let u = self.next_f64().max(1e-10);
        x_min * u.powf(-1.0 / alpha)
    }

    /// Fisher-Yates shuffle, in place.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        if items.len() < 2 {
            return;
        }
        for i in (1..items.len()).rev() {
            let j = self.next_u64_below(i as u64 + 1) as usize;
            items.swap(i, j);
        }
    }
}

/// All stream RNGs for a single run, indexed by stable slot.
pub struct RngBank {
    master_seed: u64,
}

impl RngBank {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn for_stream(&self, slot: StreamSlot) -> StreamRng {
        StreamRng::new(self.master_seed, slot as u64).with_name(slot.name())
    }
}

/// Stable stream slot assignments.
/// NEVER reorder or remove entries — only append.
/// Reordering changes every stream's seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum StreamSlot {
    Synthetic = 0,
    Split = 1,
    Forest = 2,
    // Add new streams here — append only.
}

impl StreamSlot {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Synthetic => "synthetic",
            Self::Split => "split",
            Self::Forest => "forest",
        }
    }
}
