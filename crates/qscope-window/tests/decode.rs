//! End-to-end decoding of synthetic snapshot directories: raw register
//! grids are written byte-for-byte the way the controller dumps them, then
//! decoded and queried through the public API.

use std::fs;
use std::path::PathBuf;

use proptest::prelude::*;
use qscope_core::{Fid, WindowConfig};
use qscope_window::query::Coverage;
use qscope_window::{RawCell, TimeWindowDecoder, WrapTracker};

/// Reference geometry: alpha=1, k=2, T=2, TB0=2, z=1.
fn cfg() -> WindowConfig {
    WindowConfig::new(1, 2, 2, 2, 1.0).unwrap()
}

fn tmp_dir(tag: &str) -> PathBuf {
    let mut p = std::env::temp_dir();
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    p.push(format!("qscope_decode_{tag}_{nanos}"));
    fs::create_dir_all(&p).unwrap();
    p
}

/// A snapshot grid under construction: `T` windows of `2^k` `(tts, fid)`
/// slots, serialized in the controller's block order.
struct Grid {
    windows: Vec<Vec<(u32, u64)>>,
}

impl Grid {
    fn new(cfg: &WindowConfig) -> Self {
        Self {
            windows: vec![vec![(0, 0); cfg.slots()]; cfg.windows as usize],
        }
    }

    fn set(&mut self, window: usize, slot: usize, tts: u32, fid: u64) -> &mut Self {
        self.windows[window][slot] = (tts, fid);
        self
    }

    fn write(&self, dir: &PathBuf, name: &str) {
        let mut bytes = Vec::new();
        for cells in &self.windows {
            for &(tts, _) in cells {
                bytes.extend_from_slice(&tts.to_le_bytes());
            }
            for &(_, fid) in cells {
                // src word: little-endian storage of the first four
                // network-order fid bytes.
                let src = u32::from_be_bytes(Fid::from_u64(fid).as_bytes()[..4].try_into().unwrap());
                bytes.extend_from_slice(&src.to_le_bytes());
            }
            for &(_, fid) in cells {
                let dst = u32::from_be_bytes(Fid::from_u64(fid).as_bytes()[4..].try_into().unwrap());
                bytes.extend_from_slice(&dst.to_le_bytes());
            }
        }
        fs::write(dir.join(name), bytes).unwrap();
    }
}

#[test]
fn single_cell_snapshot_reconstructs_its_midpoint() {
    let dir = tmp_dir("single");
    let mut g = Grid::new(&cfg());
    g.set(0, 1, 5, 0xaabb_ccdd_eeff_1122);
    g.write(&dir, "10_0.bin");

    let dec = TimeWindowDecoder::from_dir(cfg(), &dir).unwrap();
    assert_eq!(dec.sets().len(), 1);
    let set = &dec.sets()[0];
    assert_eq!(set.cells.len(), 1);
    let c = set.cells[0];
    assert_eq!((c.tts, c.window, c.wrap), (5, 0, 0));
    assert_eq!(c.fid.to_string(), "aabbccddeeff1122");
    assert_eq!((set.sts, set.lts), (22, 22));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn encoded_cells_decode_with_exact_tts_bits() {
    // Anchor cycle 5 (tts 20..=23); every slot of window 0 populated plus
    // two matching window-1 cells (anchor (23-4)>>1 = 9 -> cid 2, idx 1).
    let dir = tmp_dir("roundtrip");
    let mut g = Grid::new(&cfg());
    for slot in 0..4u32 {
        g.set(0, slot as usize, 20 + slot, 0x100 + u64::from(slot));
    }
    g.set(1, 0, 8, 0x200);
    g.set(1, 1, 9, 0x201);
    g.write(&dir, "10_0.bin");

    let dec = TimeWindowDecoder::from_dir(cfg(), &dir).unwrap();
    let set = &dec.sets()[0];
    assert_eq!(set.window_counts, vec![4, 2]);
    let mut got: Vec<(u8, u32)> = set.cells.iter().map(|c| (c.window, c.tts)).collect();
    got.sort_unstable();
    assert_eq!(
        got,
        vec![(0, 20), (0, 21), (0, 22), (0, 23), (1, 8), (1, 9)]
    );

    // The set spans at most one full cycle of every window.
    assert!(set.lts - set.sts <= cfg().total_duration());

    // Exact-bounds query sees every cell, and window 0 dominates.
    let out = dec.retrieve(set.sts, set.lts);
    assert_eq!(out.coverage, Coverage::Full);
    assert_eq!(out.flows.len(), 6);
    assert_eq!(out.dominant_window, Some(0));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn wrap_is_detected_across_snapshots() {
    let dir = tmp_dir("wrap");
    let mut a = Grid::new(&cfg());
    a.set(0, 3, (1 << 30) - 2, 0x11);
    a.write(&dir, "10_0.bin");
    let mut b = Grid::new(&cfg());
    b.set(0, 0, 3, 0x22);
    b.write(&dir, "11_0.bin");

    let dec = TimeWindowDecoder::from_dir(cfg(), &dir).unwrap();
    assert_eq!(dec.sets().len(), 2);
    assert_eq!(dec.sets()[0].cells[0].wrap, 0);
    assert_eq!(dec.sets()[1].cells[0].wrap, 1);
    // Wrap count is non-decreasing in file order.
    assert!(dec.sets()[1].lts > dec.sets()[0].lts);

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn all_zero_snapshot_is_skipped() {
    let dir = tmp_dir("skip");
    Grid::new(&cfg()).write(&dir, "10_0.bin");
    let mut g = Grid::new(&cfg());
    g.set(0, 0, 7, 0x33);
    g.write(&dir, "11_0.bin");

    let dec = TimeWindowDecoder::from_dir(cfg(), &dir).unwrap();
    assert_eq!(dec.sets().len(), 1);
    assert_eq!(dec.sets()[0].cells[0].fid, Fid::from_u64(0x33));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn unused_window_zero_degrades_to_an_empty_set() {
    let dir = tmp_dir("w0empty");
    // Window 0 untouched, window 1 carrying stale data: the set is empty
    // and the wrap count must not move.
    let mut a = Grid::new(&cfg());
    a.set(1, 0, 9, 0x66);
    a.write(&dir, "10_0.bin");
    let mut b = Grid::new(&cfg());
    b.set(0, 2, 6, 0x77);
    b.write(&dir, "11_0.bin");

    let dec = TimeWindowDecoder::from_dir(cfg(), &dir).unwrap();
    assert_eq!(dec.sets().len(), 2);
    assert!(dec.sets()[0].is_empty());
    assert_eq!((dec.sets()[0].sts, dec.sets()[0].lts), (0, 0));
    assert_eq!(dec.sets()[1].cells[0].wrap, 0);

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn zero_fid_cells_never_surface() {
    let dir = tmp_dir("zerofid");
    let mut g = Grid::new(&cfg());
    g.set(0, 1, 5, 0x44);
    g.set(0, 0, 4, 0); // same cycle, unused slot
    g.write(&dir, "10_0.bin");

    let dec = TimeWindowDecoder::from_dir(cfg(), &dir).unwrap();
    assert!(dec.sets()[0].cells.iter().all(|c| !c.fid.is_zero()));
    assert_eq!(dec.sets()[0].cells.len(), 1);

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn signals_lift_through_the_decoded_sets() {
    let dir = tmp_dir("sig_snap");
    let mut g = Grid::new(&cfg());
    g.set(0, 1, 5, 0x55);
    g.write(&dir, "10_0.bin");

    let sig_dir = tmp_dir("sig_data");
    let mut rec = Vec::new();
    rec.extend_from_slice(&1u32.to_le_bytes());
    rec.extend_from_slice(&18u32.to_le_bytes());
    rec.extend_from_slice(&22u32.to_le_bytes());
    // Second record aligned nowhere near the set: dropped.
    rec.extend_from_slice(&1u32.to_le_bytes());
    rec.extend_from_slice(&40_000u32.to_le_bytes());
    rec.extend_from_slice(&80_000u32.to_le_bytes());
    fs::write(sig_dir.join("10_0.bin"), rec).unwrap();

    let mut dec = TimeWindowDecoder::from_dir(cfg(), &dir).unwrap();
    let stats = dec.load_signals(&sig_dir).unwrap();
    assert_eq!((stats.records, stats.matched, stats.dropped), (2, 1, 1));
    assert_eq!(dec.signals().len(), 1);
    assert_eq!(dec.signals()[0].deq, 22);
    assert_eq!(dec.signals()[0].enq, 18);

    let _ = fs::remove_dir_all(dir);
    let _ = fs::remove_dir_all(sig_dir);
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 48,
        .. ProptestConfig::default()
    })]

    /// Drive the tracker with trimmed views of a real monotone 64-bit
    /// clock: the recovered wrap count must equal the clock's rollovers
    /// since the first snapshot. Gaps stay under the burst threshold and
    /// all four slots carry the same stamp, the regime the heuristic is
    /// built for.
    #[test]
    fn tracker_recovers_rollovers_of_a_monotone_clock(
        start_off in 1u64..5_000_000,
        gaps in prop::collection::vec(1_000u64..200_000, 5..40),
    ) {
        let c = cfg();
        let mut tracker = WrapTracker::new();
        let mut t = (1u64 << 32) - start_off;
        let mut baseline = None;
        for g in gaps {
            t += g;
            let tts = ((t >> 2) & ((1 << 30) - 1)) as u32;
            let w0: Vec<RawCell> = (0..4)
                .map(|_| RawCell { tts, fid: Fid::from_u64(9) })
                .collect();
            let scan = tracker.observe(&c, &w0);
            let base = *baseline.get_or_insert(t >> 32);
            prop_assert_eq!(u64::from(scan.wraps), (t >> 32) - base);
        }
    }
}

#[test]
fn archive_roundtrip_preserves_query_results() {
    let dir = tmp_dir("archive");
    let mut g = Grid::new(&cfg());
    for slot in 0..4u32 {
        g.set(0, slot as usize, 20 + slot, 0x300 + u64::from(slot));
    }
    g.write(&dir, "10_0.bin");

    let dec = TimeWindowDecoder::from_dir(cfg(), &dir).unwrap();
    let set_bounds = (dec.sets()[0].sts, dec.sets()[0].lts);

    let restored = TimeWindowDecoder::from_archive(dec.to_archive());
    let a = dec.retrieve(set_bounds.0, set_bounds.1);
    let b = restored.retrieve(set_bounds.0, set_bounds.1);
    assert_eq!(a.flows, b.flows);
    assert_eq!(a.spans, b.spans);

    let _ = fs::remove_dir_all(dir);
}
