//! A seedable RNG handle used for weight initialization, dropout masks, and
//! sampling. Replaces the C++ original's process-global Gaussian generator
//! (and the teacher's unseeded `rand::rng()` calls) with an explicit handle
//! a `Session` owns, so a fixed seed makes one run's parameter trajectory
//! reproducible end to end.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};

/// Seedable RNG used throughout the crate for anything non-deterministic.
pub struct NeuroxRng(StdRng);

impl NeuroxRng {
    /// Build a handle from a fixed seed, for reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }

    /// Build a handle seeded from the OS entropy source.
    pub fn from_entropy() -> Self {
        Self(StdRng::from_os_rng())
    }

    /// A uniform value sampled from `[lo, hi)`.
    pub fn uniform(&mut self, lo: f32, hi: f32) -> f32 {
        self.0.random_range(lo..hi)
    }

    /// A uniform index in `[0, bound)`. Returns 0 if `bound == 0`.
    pub fn index(&mut self, bound: usize) -> usize {
        if bound == 0 {
            0
        } else {
            self.0.random_range(0..bound)
        }
    }

    /// A standard-normal (mean 0, variance 1) sample.
    pub fn gaussian(&mut self) -> f32 {
        StandardNormal.sample(&mut self.0)
    }

    /// A uniform value in `[0, 1)`, used for dropout masks and sampled-column draws.
    pub fn unit(&mut self) -> f32 {
        self.0.random::<f32>()
    }
}

impl Default for NeuroxRng {
    fn default() -> Self {
        Self::from_entropy()
    }
}
