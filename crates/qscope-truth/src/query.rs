// crates/qscope-truth/src/query.rs

//! Interval and depth-band queries over the repaired tap log.

use std::collections::HashMap;

use qscope_core::Fid;

use crate::stream::{TruthRecord, TruthStream};

fn count_sorted(
    records: &[TruthRecord],
    ts: u64,
    te: u64,
    key: impl Fn(&TruthRecord) -> u64,
    k: Option<usize>,
) -> Vec<(Fid, u64)> {
    let mut counts: HashMap<Fid, u64> = HashMap::new();
    for r in records {
        let t = key(r);
        if ts <= t && t <= te {
            *counts.entry(r.fid).or_insert(0) += 1;
        }
    }
    let mut out: Vec<(Fid, u64)> = counts.into_iter().collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    if let Some(k) = k {
        out.truncate(k);
    }
    out
}

impl TruthStream {
    /// Flows by packet count whose **enqueue** time falls in `[ts, te]`,
    /// descending; `k = None` returns all.
    #[must_use]
    pub fn top(&self, ts: u64, te: u64, k: Option<usize>) -> Vec<(Fid, u64)> {
        count_sorted(self.records(), ts, te, |r| r.enq, k)
    }

    /// Flows by packet count whose **dequeue** time falls in `[ts, te]`.
    #[must_use]
    pub fn retrieve(&self, ts: u64, te: u64, k: Option<usize>) -> Vec<(Fid, u64)> {
        count_sorted(self.records(), ts, te, |r| r.deq, k)
    }

    /// The switch-order fid trace of packets dequeued in `[ts, te]`.
    #[must_use]
    pub fn traces(&self, ts: u64, te: u64) -> Vec<Fid> {
        self.records()
            .iter()
            .filter(|r| ts <= r.deq && r.deq <= te)
            .map(|r| r.fid)
            .collect()
    }

    /// Packets whose queue depth exceeds `threshold`.
    #[must_use]
    pub fn packets_above_threshold(&self, threshold: u32) -> Vec<&TruthRecord> {
        self.records()
            .iter()
            .filter(|r| r.qlen > threshold)
            .collect()
    }

    /// Partition packets into depth bands `[q_i, q_{i+1})` for consecutive
    /// thresholds, plus a final `> q_last` band. Depths below `q_0` (and
    /// exactly `q_last`) fall into no band.
    #[must_use]
    pub fn bucketize_by_depth(&self, thresholds: &[u32]) -> Vec<Vec<&TruthRecord>> {
        let n = thresholds.len();
        let mut bands: Vec<Vec<&TruthRecord>> = vec![Vec::new(); n];
        if n == 0 {
            return bands;
        }
        for r in self.records() {
            let q = r.qlen;
            if q > thresholds[n - 1] {
                bands[n - 1].push(r);
                continue;
            }
            for i in 0..n.saturating_sub(1) {
                if q >= thresholds[i] && q < thresholds[i + 1] {
                    bands[i].push(r);
                    break;
                }
            }
        }
        bands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(enq: u64, deq: u64, qlen: u32, fid: u64) -> TruthRecord {
        TruthRecord {
            enq,
            deq,
            qlen,
            fid: Fid::from_u64(fid),
        }
    }

    fn stream() -> TruthStream {
        TruthStream::from_records(vec![
            rec(10, 15, 100, 1),
            rec(20, 26, 300, 2),
            rec(30, 37, 700, 1),
            rec(40, 48, 1500, 3),
            rec(50, 59, 2500, 1),
        ])
    }

    #[test]
    fn top_counts_by_enqueue_time() {
        let s = stream();
        let top = s.top(10, 40, None);
        assert_eq!(top[0], (Fid::from_u64(1), 2));
        assert_eq!(top.len(), 3);
        assert_eq!(s.top(10, 40, Some(1)).len(), 1);
    }

    #[test]
    fn retrieve_counts_by_dequeue_time() {
        let s = stream();
        // deq 48 and 59 fall outside.
        let got = s.retrieve(15, 40, None);
        assert_eq!(got[0], (Fid::from_u64(1), 2));
        assert_eq!(got[1], (Fid::from_u64(2), 1));
    }

    #[test]
    fn traces_preserve_switch_order() {
        let s = stream();
        let t: Vec<u64> = s.traces(15, 48).iter().map(Fid::as_u64).collect();
        assert_eq!(t, vec![1, 2, 1, 3]);
    }

    #[test]
    fn depth_bands_are_half_open_with_overflow_tail() {
        let s = stream();
        let bands = s.bucketize_by_depth(&[200, 1000, 2000]);
        let lens: Vec<usize> = bands.iter().map(Vec::len).collect();
        // [200,1000): 300, 700; [1000,2000): 1500; >2000: 2500.
        assert_eq!(lens, vec![2, 1, 1]);
        assert!(s.packets_above_threshold(500).len() == 3);
    }
}
