// crates/qscope-window/src/filter.rs

//! Latest-cycle selection: from a raw snapshot, keep only the cells of the
//! most recent complete cycle of every window.
//!
//! Window 0's largest trimmed stamp anchors the walk. Slots at or below its
//! index belong to the current cycle; slots above it still hold the previous
//! cycle. Each higher window's anchor is the stamp of the cell the lower
//! window displaced, `(tts - 2^k) >> alpha`, and its comparable cycle-id
//! narrows by `alpha` bits.

use qscope_core::{LiveCell, WindowConfig, WindowSet};

use crate::snapshot::RawSnapshot;
use crate::wrap::Window0Scan;

/// Decode one snapshot into its live set.
///
/// `scan` must come from the same snapshot's window-0 pass. Snapshots whose
/// window 0 is entirely unused must short-circuit to [`empty_set`] instead.
#[must_use]
pub fn filter_snapshot(cfg: &WindowConfig, snap: &RawSnapshot, scan: &Window0Scan) -> WindowSet {
    let slots = cfg.slots();
    let k = cfg.index_bits;
    let wraps = scan.wraps;

    // Anchor state descends through the windows; signed so the early-trace
    // case (largest stamp below 2^k) underflows the way the cycle arithmetic
    // expects rather than panicking.
    let mut anchor_tts = i64::from(scan.largest_tts);
    let mut anchor_slot = scan.largest_slot;
    let mut anchor_cid = anchor_tts >> k;

    let mut cells = Vec::new();
    let mut window_counts = vec![0u32; cfg.windows as usize];
    let mut smallest: Option<LiveCell> = None;

    for w in 0..cfg.windows {
        let mask = i64::from(cfg.cid_mask(w));
        let regs = &snap.windows[w as usize];

        // Current-cycle half: slots 0..=anchor.
        let mut first_of_half = true;
        for reg in regs.iter().take(anchor_slot + 1) {
            if reg.fid.is_zero() {
                continue;
            }
            let cid = i64::from(reg.tts >> k);
            if cid & mask == anchor_cid & mask {
                let live = LiveCell {
                    tts: reg.tts,
                    fid: reg.fid,
                    window: w as u8,
                    wrap: wraps,
                };
                window_counts[w as usize] += 1;
                cells.push(live);
                if first_of_half {
                    first_of_half = false;
                    smallest = Some(live);
                }
            }
        }

        // Previous-cycle half: slots anchor+1..2^k. A raw cycle id above the
        // anchor's means the cell was written before the rollover the anchor
        // already crossed.
        let mut first_of_half = true;
        for reg in regs.iter().take(slots).skip(anchor_slot + 1) {
            if reg.fid.is_zero() {
                continue;
            }
            let cid = i64::from(reg.tts >> k);
            if (cid + 1) & mask == anchor_cid & mask {
                let wrap = if cid > anchor_cid {
                    wraps.saturating_sub(1)
                } else {
                    wraps
                };
                let live = LiveCell {
                    tts: reg.tts,
                    fid: reg.fid,
                    window: w as u8,
                    wrap,
                };
                window_counts[w as usize] += 1;
                cells.push(live);
                if first_of_half {
                    first_of_half = false;
                    smallest = Some(live);
                }
            }
        }

        // Descend: the next window's anchor is the displaced cell's stamp.
        anchor_tts = (anchor_tts - (1 << k)) >> cfg.alpha;
        anchor_slot = (anchor_tts & (slots as i64 - 1)) as usize;
        anchor_cid = anchor_tts >> k;
    }

    let largest = {
        let reg = &snap.windows[0][scan.largest_slot];
        (!reg.fid.is_zero()).then_some(LiveCell {
            tts: scan.largest_tts,
            fid: reg.fid,
            window: 0,
            wrap: wraps,
        })
    };
    let tb = cfg.shift(0);
    let lts =
        (u64::from(scan.largest_tts) << tb) + (1 << (tb - 1)) + (u64::from(wraps) << 32);
    let sts = smallest.map_or(lts, |c| c.midpoint(cfg));

    WindowSet {
        stamp: snap.stamp,
        cells,
        sts,
        lts,
        largest,
        smallest,
        window_counts,
    }
}

/// The degenerate set for a snapshot whose window 0 carries no data.
#[must_use]
pub fn empty_set(cfg: &WindowConfig, snap: &RawSnapshot) -> WindowSet {
    WindowSet {
        stamp: snap.stamp,
        cells: Vec::new(),
        sts: 0,
        lts: 0,
        largest: None,
        smallest: None,
        window_counts: vec![0; cfg.windows as usize],
    }
}
