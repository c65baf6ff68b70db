// crates/qscope-eval/src/report.rs

//! Precision and recall over flow lists.
//!
//! Both lists arrive sorted descending by packet count. The tail entry of
//! each list is dropped before matching (it is the least trustworthy rank);
//! the recall denominator still spans the full ground-truth mass.

use std::collections::HashMap;

use qscope_core::Fid;

/// `(precision, recall)` of `estimate` against `ground_truth`, by packet
/// mass. `(0, 0)` when either side has no usable mass.
#[must_use]
pub fn precision_recall(ground_truth: &[(Fid, u64)], estimate: &[(Fid, u64)]) -> (f64, f64) {
    if ground_truth.is_empty() || estimate.is_empty() {
        return (0.0, 0.0);
    }
    let est_trim = &estimate[..estimate.len() - 1];
    let gt_trim: HashMap<Fid, u64> = ground_truth[..ground_truth.len() - 1]
        .iter()
        .copied()
        .collect();

    let mut hit = 0u64;
    let mut est_mass = 0u64;
    for &(fid, n) in est_trim {
        est_mass += n;
        if let Some(&truth) = gt_trim.get(&fid) {
            hit += n.min(truth);
        }
    }
    let gt_mass: u64 = ground_truth.iter().map(|&(_, n)| n).sum();
    if est_mass == 0 || gt_mass == 0 {
        return (0.0, 0.0);
    }
    (hit as f64 / est_mass as f64, hit as f64 / gt_mass as f64)
}
