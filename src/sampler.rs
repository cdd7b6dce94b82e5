//! Categorical sampling from a filtered distribution.

use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Draws token ids from a probability distribution.
///
/// The random source is a constructor parameter rather than ambient global
/// state, so independent decode loops can be seeded in isolation and tests
/// can substitute a deterministic generator.
pub struct Sampler<R: Rng> {
    rng: R,
}

impl Sampler<StdRng> {
    /// Reproducible sampler seeded from a fixed value.
    pub fn from_seed(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    /// Sampler seeded from operating-system entropy.
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }
}

impl<R: Rng> Sampler<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// Sample one index from a categorical distribution.
    ///
    /// `probs` must be normalized with at least one non-zero entry; if
    /// rounding keeps the cumulative scan from crossing the draw, the last
    /// non-zero index wins.
    pub fn sample(&mut self, probs: &Array1<f32>) -> usize {
        let draw: f32 = self.rng.gen();
        let mut cumulative = 0.0;
        let mut last_nonzero = 0;
        for (i, &p) in probs.iter().enumerate() {
            if p <= 0.0 {
                continue;
            }
            cumulative += p;
            last_nonzero = i;
            if draw <= cumulative {
                return i;
            }
        }
        last_nonzero
    }
}
