//! Fixed-length incremental decoding against an opaque scoring oracle.

use ndarray::Array1;
use rand::rngs::StdRng;
use rand::Rng;

use crate::error::{InferenceError, Result};
use crate::filter::{softmax, top_filtering, FILTER_VALUE};
use crate::sampler::Sampler;

/// One scoring step's result: next-position scores plus the refreshed
/// carried state.
pub struct Step<P> {
    /// One score per vocabulary entry for the position after `tokens`.
    pub scores: Array1<f32>,
    /// Carried state covering everything scored so far. Ownership transfers
    /// to the caller; the previous value is consumed by the call.
    pub past: P,
}

/// The scoring side of a causal language model.
///
/// The decoder samples through this interface without knowing how scores are
/// produced. On the seeding call (`past = None`) the oracle consumes the full
/// current input along with any position/type id sequences; on later calls it
/// receives only the most recently sampled token plus the carried state, and
/// never re-scores the prefix.
pub trait Oracle {
    type Past;

    fn score(
        &self,
        tokens: &[usize],
        positions: Option<&[usize]>,
        type_ids: Option<&[usize]>,
        past: Option<Self::Past>,
    ) -> Result<Step<Self::Past>>;
}

/// Sampling parameters for one generation call.
#[derive(Debug, Clone)]
pub struct DecodeParams {
    /// Number of tokens to generate. The loop always runs to this length;
    /// end-of-turn truncation is the caller's job.
    pub length: usize,
    pub temperature: f32,
    pub top_k: usize,
    pub top_p: f32,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            length: 20,
            temperature: 1.0,
            top_k: 0,
            top_p: 0.9,
        }
    }
}

/// Drives a bounded decode loop: score, filter, sample, feed back.
pub struct Decoder<R: Rng> {
    sampler: Sampler<R>,
}

impl Decoder<StdRng> {
    /// Decoder with a reproducible, independently seeded sampler.
    pub fn from_seed(seed: u64) -> Self {
        Self::new(Sampler::from_seed(seed))
    }

    pub fn from_entropy() -> Self {
        Self::new(Sampler::from_entropy())
    }
}

impl<R: Rng> Decoder<R> {
    pub fn new(sampler: Sampler<R>) -> Self {
        Self { sampler }
    }

    /// Generate exactly `params.length` tokens following `input`.
    ///
    /// Each step scores the final position of the current input, scales by
    /// temperature, restricts candidates with [`top_filtering`], and samples
    /// one token from the renormalized distribution. After the first step the
    /// carried state lets the oracle see only the sampled token. Position and
    /// type ids apply to the seeding call only.
    ///
    /// Oracle failures abort the whole generation; there are no retries and
    /// no early stop on any sentinel token. Callers must keep the filter from
    /// excluding every candidate (`top_k >= 1`, `top_p > 0`, or a permissive
    /// threshold).
    pub fn generate<O: Oracle>(
        &mut self,
        oracle: &O,
        input: &[usize],
        positions: Option<&[usize]>,
        type_ids: Option<&[usize]>,
        params: &DecodeParams,
    ) -> Result<Vec<usize>> {
        if params.temperature <= 0.0 {
            return Err(InferenceError::InvalidTemperature(params.temperature));
        }

        let mut output = Vec::with_capacity(params.length);
        let mut current: Vec<usize> = input.to_vec();
        let mut past = None;

        for _ in 0..params.length {
            let step = match past.take() {
                None => oracle.score(&current, positions, type_ids, None)?,
                Some(p) => oracle.score(&current, None, None, Some(p))?,
            };

            let mut scores = step.scores;
            scores.mapv_inplace(|v| v / params.temperature);
            top_filtering(&mut scores, params.top_k, params.top_p, FILTER_VALUE);

            let probs = softmax(&scores);
            let next = self.sampler.sample(&probs);

            output.push(next);
            current.clear();
            current.push(next);
            past = Some(step.past);
        }

        Ok(output)
    }
}
