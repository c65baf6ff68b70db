// crates/qscope-sketch/src/hash_pipe.rs

//! HashPipe: a pipeline of hash-indexed stages fed per packet.
//!
//! Stage 0 always admits the incoming flow, evicting any incumbent. The
//! evicted pair walks the remaining stages: it merges on a flow match,
//! settles into an empty cell, or swaps with a smaller incumbent and
//! carries that one further downstream.

use std::collections::HashMap;

use qscope_core::Fid;

use crate::hash::FlowHash;

/// `stages x cells` pipeline state.
pub struct HashPipe {
    stages: usize,
    cells: usize,
    table: Vec<Option<(Fid, u64)>>,
}

impl HashPipe {
    /// # Panics
    /// Panics if `stages` is zero, exceeds the hash family, or `cells` is
    /// zero.
    #[must_use]
    pub fn new(stages: usize, cells: usize) -> Self {
        assert!(
            (1..=crate::hash::ROWS).contains(&stages),
            "stages must be in 1..={}",
            crate::hash::ROWS
        );
        assert!(cells > 0, "cells must be positive");
        Self {
            stages,
            cells,
            table: vec![None; stages * cells],
        }
    }

    #[inline]
    fn slot(&self, h: &FlowHash, stage: usize, fid: &Fid) -> usize {
        stage * self.cells + usize::from(h.hash(stage, fid)) % self.cells
    }

    /// Feed one packet of `fid` through the pipeline.
    pub fn record(&mut self, h: &FlowHash, fid: Fid) {
        let slot = self.slot(h, 0, &fid);
        let mut carry = match self.table[slot] {
            None => {
                self.table[slot] = Some((fid, 1));
                return;
            }
            Some((incumbent, n)) if incumbent == fid => {
                self.table[slot] = Some((incumbent, n + 1));
                return;
            }
            Some(evicted) => {
                self.table[slot] = Some((fid, 1));
                evicted
            }
        };

        for stage in 1..self.stages {
            let slot = self.slot(h, stage, &carry.0);
            match self.table[slot] {
                Some((incumbent, n)) if incumbent == carry.0 => {
                    self.table[slot] = Some((incumbent, n + carry.1));
                    return;
                }
                None => {
                    self.table[slot] = Some(carry);
                    return;
                }
                Some((incumbent, n)) if n < carry.1 => {
                    self.table[slot] = Some(carry);
                    carry = (incumbent, n);
                }
                Some(_) => {}
            }
        }
        // Carry falls off the last stage and is forgotten.
    }

    /// Aggregate every non-empty cell across all stages, descending.
    #[must_use]
    pub fn flows(&self) -> Vec<(Fid, u64)> {
        let mut counts: HashMap<Fid, u64> = HashMap::new();
        for cell in self.table.iter().flatten() {
            *counts.entry(cell.0).or_insert(0) += cell.1;
        }
        let mut out: Vec<(Fid, u64)> = counts.into_iter().collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out
    }
}

/// Run a packet trace through a fresh pipeline, the way the harness
/// consumes it.
#[must_use]
pub fn hash_pipe(h: &FlowHash, trace: &[Fid], stages: usize, cells: usize) -> Vec<(Fid, u64)> {
    let mut pipe = HashPipe::new(stages, cells);
    for fid in trace {
        pipe.record(h, *fid);
    }
    pipe.flows()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lone_flow_counts_exactly() {
        let h = FlowHash::new();
        let trace = vec![Fid::from_u64(9); 25];
        assert_eq!(hash_pipe(&h, &trace, 3, 64), vec![(Fid::from_u64(9), 25)]);
    }

    #[test]
    fn total_mass_is_never_created() {
        let h = FlowHash::new();
        let trace: Vec<Fid> = (0..500u64).map(|i| Fid::from_u64(i % 37)).collect();
        let flows = hash_pipe(&h, &trace, 3, 16);
        let mass: u64 = flows.iter().map(|&(_, n)| n).sum();
        assert!(mass <= trace.len() as u64);
    }

    #[test]
    fn heavy_flow_survives_the_pipeline() {
        let h = FlowHash::new();
        let mut trace = Vec::new();
        for i in 0..400u64 {
            trace.push(Fid::from_u64(1));
            trace.push(Fid::from_u64(100 + i % 50));
        }
        let flows = hash_pipe(&h, &trace, 5, 64);
        assert_eq!(flows[0].0, Fid::from_u64(1));
        assert!(flows[0].1 >= 300, "heavy hitter should retain most mass");
    }
}
