// crates/qscope-sketch/src/flow_radar.rs

//! FlowRadar: XOR-coded flow table with singleton peeling.
//!
//! Every flow hashes to `H = 3` cells of one table; each cell keeps a flow
//! counter, a packet counter, and the XOR of its member flow ids. A
//! parallel bit array distinguishes a flow's first packet batch from
//! repeats. Decoding repeatedly locates cells holding exactly one flow,
//! emits that flow, and subtracts it from its cells until no singleton
//! remains.

use std::collections::HashMap;

use qscope_core::Fid;

use crate::hash::FlowHash;

/// Cells every flow spreads across.
pub const HASH_COUNT: usize = 3;

#[derive(Clone, Copy, Default)]
struct Cell {
    flows: i64,
    packets: i64,
    fid_xor: u64,
}

/// The encode-side table.
pub struct FlowRadar {
    cells: Vec<Cell>,
    seen: Vec<bool>,
}

impl FlowRadar {
    /// # Panics
    /// Panics if `cell_count` is zero.
    #[must_use]
    pub fn new(cell_count: usize) -> Self {
        assert!(cell_count > 0, "cell_count must be positive");
        Self {
            cells: vec![Cell::default(); cell_count],
            seen: vec![false; cell_count],
        }
    }

    fn positions(&self, h: &FlowHash, fid: &Fid) -> [usize; HASH_COUNT] {
        let m = self.cells.len();
        [
            usize::from(h.hash(0, fid)) % m,
            usize::from(h.hash(1, fid)) % m,
            usize::from(h.hash(2, fid)) % m,
        ]
    }

    /// Record `n` packets of `fid`.
    pub fn add_flow(&mut self, h: &FlowHash, fid: &Fid, n: u64) {
        let pos = self.positions(h, fid);
        let mut already = 0;
        for &p in &pos {
            if self.seen[p] {
                already += 1;
            }
            self.seen[p] = true;
        }
        if already == HASH_COUNT {
            // Flow seen before (or aliased): only the packet counters move.
            for &p in &pos {
                self.cells[p].packets += n as i64;
            }
        } else {
            for &p in &pos {
                self.cells[p].flows += 1;
                self.cells[p].packets += n as i64;
                self.cells[p].fid_xor ^= fid.as_u64();
            }
        }
    }

    /// Peel singleton cells until none remain, descending by count.
    ///
    /// Flows left entangled past the decodability threshold are simply
    /// absent from the result.
    #[must_use]
    pub fn decode(mut self, h: &FlowHash) -> Vec<(Fid, u64)> {
        let mut out: HashMap<Fid, u64> = HashMap::new();
        loop {
            let mut progressed = false;
            for i in 0..self.cells.len() {
                if self.cells[i].flows != 1 {
                    continue;
                }
                let fid = Fid::from_u64(self.cells[i].fid_xor);
                let packets = self.cells[i].packets;
                out.insert(fid, packets.max(0) as u64);
                progressed = true;
                for p in self.positions(h, &fid) {
                    self.cells[p].flows -= 1;
                    self.cells[p].packets -= packets;
                    self.cells[p].fid_xor ^= fid.as_u64();
                }
            }
            if !progressed {
                break;
            }
        }
        let mut flows: Vec<(Fid, u64)> = out.into_iter().collect();
        flows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        flows
    }
}

/// Encode a flow list and decode it back, the way the harness consumes it.
#[must_use]
pub fn flow_radar(h: &FlowHash, flows: &[(Fid, u64)], cell_count: usize) -> Vec<(Fid, u64)> {
    let mut radar = FlowRadar::new(cell_count);
    for (fid, n) in flows {
        radar.add_flow(h, fid, *n);
    }
    radar.decode(h)
}
