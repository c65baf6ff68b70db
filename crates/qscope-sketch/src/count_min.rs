// crates/qscope-sketch/src/count_min.rs

//! Count-Min sketch over flow counts.

use qscope_core::Fid;

use crate::hash::FlowHash;

/// `rows x cols` counting sketch; `cols` must be a power of two so row
/// indices reduce by mask.
pub struct CountMin {
    rows: usize,
    col_mask: usize,
    table: Vec<u64>,
}

impl CountMin {
    /// # Panics
    /// Panics if `cols` is not a power of two, `rows` is zero, or `rows`
    /// exceeds the hash family.
    #[must_use]
    pub fn new(rows: usize, cols: usize) -> Self {
        assert!(cols.is_power_of_two(), "cols must be a power of two");
        assert!(
            (1..=crate::hash::ROWS).contains(&rows),
            "rows must be in 1..={}",
            crate::hash::ROWS
        );
        Self {
            rows,
            col_mask: cols - 1,
            table: vec![0; rows * cols],
        }
    }

    #[inline]
    fn slot(&self, h: &FlowHash, row: usize, fid: &Fid) -> usize {
        row * (self.col_mask + 1) + (usize::from(h.hash(row, fid)) & self.col_mask)
    }

    /// Add `n` packets of `fid` to every row.
    pub fn insert(&mut self, h: &FlowHash, fid: &Fid, n: u64) {
        for row in 0..self.rows {
            let slot = self.slot(h, row, fid);
            self.table[slot] += n;
        }
    }

    /// Point estimate: the minimum across rows.
    #[must_use]
    pub fn query(&self, h: &FlowHash, fid: &Fid) -> u64 {
        (0..self.rows)
            .map(|row| self.table[self.slot(h, row, fid)])
            .min()
            .unwrap_or(0)
    }

    /// Estimate every flow in `filter`, descending by count.
    #[must_use]
    pub fn retrieve(&self, h: &FlowHash, filter: &[(Fid, u64)]) -> Vec<(Fid, u64)> {
        let mut out: Vec<(Fid, u64)> = filter
            .iter()
            .map(|(fid, _)| (*fid, self.query(h, fid)))
            .collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out
    }
}

/// Build a sketch from a flow list and estimate the `filter` flows, the
/// way the harness consumes it.
#[must_use]
pub fn count_min(
    h: &FlowHash,
    flows: &[(Fid, u64)],
    filter: &[(Fid, u64)],
    rows: usize,
    cols: usize,
) -> Vec<(Fid, u64)> {
    let mut sketch = CountMin::new(rows, cols);
    for (fid, n) in flows {
        sketch.insert(h, fid, *n);
    }
    sketch.retrieve(h, filter)
}
