//! Logit filtering for restricted sampling.
//!
//! Shapes one decoding step's raw scores into a candidate set by top-k,
//! nucleus (top-p) and absolute-threshold filtering. Excluded entries are
//! driven to [`FILTER_VALUE`] so they carry zero probability after softmax;
//! vector length and indexing are preserved.

use ndarray::Array1;

/// Sentinel assigned to excluded entries.
pub const FILTER_VALUE: f32 = f32::NEG_INFINITY;

/// Filter a single position's logits in place.
///
/// Stages run in a fixed order and compose (an entry excluded by any stage
/// stays excluded):
///
/// 1. `top_k > 0`: keep entries scoring at least the k-th largest value.
///    Ties at the boundary are all retained.
/// 2. `top_p > 0.0`: sort descending, softmax, and cut after the first token
///    whose cumulative probability mass exceeds `top_p` (that token itself is
///    kept).
/// 3. drop entries below `threshold` (pass [`FILTER_VALUE`] to disable).
///
/// Operates on exactly one sequence position; the 1-D array type is the
/// batch-size-1 precondition. Callers must leave at least one candidate
/// retained (e.g. keep `top_k >= 1` or `top_p > 0`); an empty candidate set
/// is not defended against here.
pub fn top_filtering(logits: &mut Array1<f32>, top_k: usize, top_p: f32, threshold: f32) {
    let top_k = top_k.min(logits.len());
    if top_k > 0 {
        let mut sorted: Vec<f32> = logits.iter().copied().collect();
        sorted.sort_unstable_by(|a, b| b.partial_cmp(a).unwrap());
        let kth = sorted[top_k - 1];
        logits.mapv_inplace(|v| if v < kth { FILTER_VALUE } else { v });
    }

    if top_p > 0.0 {
        let mut order: Vec<usize> = (0..logits.len()).collect();
        order.sort_unstable_by(|&a, &b| logits[b].partial_cmp(&logits[a]).unwrap());

        let sorted_scores = Array1::from_iter(order.iter().map(|&i| logits[i]));
        let probs = softmax(&sorted_scores);

        // Find the first rank whose cumulative mass crosses top_p; the cut
        // sits one past it so the crossing token survives.
        let mut cut = order.len();
        let mut cumulative = 0.0;
        for (rank, &p) in probs.iter().enumerate() {
            cumulative += p;
            if cumulative > top_p {
                cut = rank + 1;
                break;
            }
        }
        for &idx in &order[cut.min(order.len())..] {
            logits[idx] = FILTER_VALUE;
        }
    }

    if threshold > FILTER_VALUE {
        logits.mapv_inplace(|v| if v < threshold { FILTER_VALUE } else { v });
    }
}

/// Numerically stable softmax; [`FILTER_VALUE`] entries map to zero mass.
pub fn softmax(scores: &Array1<f32>) -> Array1<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        // Every entry excluded; nothing to normalize.
        return Array1::zeros(scores.len());
    }
    let mut out = scores.mapv(|v| (v - max).exp());
    let sum: f32 = out.sum();
    if sum > 0.0 {
        out.mapv_inplace(|v| v / sum);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn retained(logits: &Array1<f32>) -> Vec<usize> {
        logits
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_finite())
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn top_k_keeps_two_highest() {
        let mut logits = array![1.0_f32, 2.0, 3.0, 4.0, 5.0];
        top_filtering(&mut logits, 2, 0.0, FILTER_VALUE);
        assert_eq!(retained(&logits), vec![3, 4]);
        assert_eq!(logits[3], 4.0);
        assert_eq!(logits[4], 5.0);
    }

    #[test]
    fn top_k_retains_boundary_ties() {
        let mut logits = array![5.0_f32, 4.0, 4.0, 1.0];
        top_filtering(&mut logits, 2, 0.0, FILTER_VALUE);
        // Both entries tied at the k-th value survive.
        assert_eq!(retained(&logits), vec![0, 1, 2]);
    }

    #[test]
    fn top_k_larger_than_vocab_is_noop() {
        let mut logits = array![1.0_f32, 2.0, 3.0];
        top_filtering(&mut logits, 10, 0.0, FILTER_VALUE);
        assert_eq!(retained(&logits).len(), 3);
    }

    #[test]
    fn nucleus_keeps_minimal_prefix_over_mass() {
        // softmax(ln p) = p, so probabilities are 0.5, 0.3, 0.2.
        let mut logits = array![0.5_f32.ln(), 0.3_f32.ln(), 0.2_f32.ln()];
        top_filtering(&mut logits, 0, 0.7, FILTER_VALUE);
        // 0.5 alone is below 0.7; the token crossing the boundary is kept.
        assert_eq!(retained(&logits), vec![0, 1]);

        let kept = softmax(&logits);
        let mass: f32 = kept.sum();
        assert!((mass - 1.0).abs() < 1e-6);
    }

    #[test]
    fn nucleus_boundary_is_minimal() {
        let mut logits = array![0.5_f32.ln(), 0.3_f32.ln(), 0.2_f32.ln()];
        top_filtering(&mut logits, 0, 0.7, FILTER_VALUE);

        let original = array![0.5_f32, 0.3, 0.2];
        let kept = retained(&logits);
        let mass: f32 = kept.iter().map(|&i| original[i]).sum();
        assert!(mass >= 0.7);
        // Dropping the lowest-ranked retained entry falls short of p.
        let without_last: f32 = kept[..kept.len() - 1].iter().map(|&i| original[i]).sum();
        assert!(without_last < 0.7);
    }

    #[test]
    fn stages_compose() {
        let mut logits = array![1.0_f32, 2.0, 3.0, 4.0, 5.0];
        top_filtering(&mut logits, 3, 0.5, FILTER_VALUE);
        // Top-k leaves {2,3,4}; the nucleus stage can only shrink that set.
        for idx in retained(&logits) {
            assert!(idx >= 2);
        }
        assert!(!retained(&logits).is_empty());
    }

    #[test]
    fn refiltering_is_idempotent() {
        let mut logits = array![0.1_f32, 1.5, -0.3, 2.2, 0.9, 2.2];
        top_filtering(&mut logits, 3, 0.8, FILTER_VALUE);
        let once = logits.clone();
        top_filtering(&mut logits, 3, 0.8, FILTER_VALUE);
        assert_eq!(logits, once);
    }

    #[test]
    fn absolute_threshold_drops_low_scores() {
        let mut logits = array![-2.0_f32, 0.5, 3.0];
        top_filtering(&mut logits, 0, 0.0, 0.0);
        assert_eq!(retained(&logits), vec![1, 2]);
    }

    #[test]
    fn disabled_filter_leaves_scores_untouched() {
        let mut logits = array![1.0_f32, 2.0, 3.0];
        let before = logits.clone();
        top_filtering(&mut logits, 0, 0.0, FILTER_VALUE);
        assert_eq!(logits, before);
    }

    #[test]
    fn softmax_zeroes_excluded_entries() {
        let probs = softmax(&array![1.0_f32, FILTER_VALUE, 1.0]);
        assert_eq!(probs[1], 0.0);
        assert!((probs.sum() - 1.0).abs() < 1e-6);
    }
}
