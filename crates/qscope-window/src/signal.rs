// crates/qscope-window/src/signal.rs

//! Data-plane signal records and their lift onto the 64-bit timeline.
//!
//! A signal is emitted per interesting packet and carries 32-bit enqueue
//! and dequeue stamps. The enclosing snapshot's live cells recover the
//! missing wrap count: a cell whose trimmed stamp sits within a few ticks
//! of the signal's dequeue stamp (aligned to that cell's window resolution)
//! shares its rollover history.

use std::fs;
use std::path::Path;

use qscope_core::{TelemetryError, WindowConfig, WindowSet};

/// Alignment tolerance, in trimmed ticks, for cell matching.
pub const DEFAULT_TOLERANCE: u32 = 5;

/// One 12-byte on-disk signal record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SignalRecord {
    /// Packet type tag assigned by the data plane.
    pub kind: u32,
    /// 32-bit enqueue timestamp.
    pub enq: u32,
    /// 32-bit dequeue timestamp.
    pub deq: u32,
}

/// A signal after wrap recovery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LiftedSignal {
    pub kind: u32,
    pub enq: u64,
    pub deq: u64,
}

/// Running totals of a correlation pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SignalStats {
    pub files: usize,
    pub records: usize,
    pub matched: usize,
    pub dropped: usize,
}

/// Parse a signal file: zero or more `(type, enq, deq)` little-endian
/// records. A trailing partial record is malformed input.
pub fn read_signal_file(path: &Path) -> Result<Vec<SignalRecord>, TelemetryError> {
    let bytes = fs::read(path).map_err(|e| TelemetryError::io(path, e))?;
    let trailing = bytes.len() % 12;
    if trailing != 0 {
        return Err(TelemetryError::TruncatedRecord {
            path: path.to_owned(),
            kind: "signal",
            trailing,
        });
    }
    let word = |c: &[u8]| u32::from_le_bytes([c[0], c[1], c[2], c[3]]);
    Ok(bytes
        .chunks_exact(12)
        .map(|c| SignalRecord {
            kind: word(&c[0..4]),
            enq: word(&c[4..8]),
            deq: word(&c[8..12]),
        })
        .collect())
}

/// Find the dequeue wrap for `rec` among one set's live cells.
fn match_in_set(cfg: &WindowConfig, set: &WindowSet, rec: SignalRecord, tol: u32) -> Option<u32> {
    set.cells.iter().find_map(|cell| {
        let tb = cfg.shift(u32::from(cell.window));
        let diff = i64::from(rec.deq >> tb) - i64::from(cell.tts);
        (diff.abs() < i64::from(tol)).then_some(cell.wrap)
    })
}

/// Lift one signal against its candidate set, falling back to the
/// immediately previous set. `None` means the signal is dropped.
#[must_use]
pub fn lift(
    cfg: &WindowConfig,
    sets: &[WindowSet],
    set_index: usize,
    rec: SignalRecord,
    tol: u32,
) -> Option<LiftedSignal> {
    let wrap = match_in_set(cfg, &sets[set_index], rec, tol).or_else(|| {
        set_index
            .checked_sub(1)
            .and_then(|prev| match_in_set(cfg, &sets[prev], rec, tol))
    })?;
    let deq_wrap = u64::from(wrap);
    // An enqueue stamp above the dequeue stamp means the clock rolled over
    // while the packet sat in the queue.
    let enq_wrap = if rec.enq < rec.deq {
        deq_wrap
    } else {
        deq_wrap.saturating_sub(1)
    };
    Some(LiftedSignal {
        kind: rec.kind,
        enq: u64::from(rec.enq) + (enq_wrap << 32),
        deq: u64::from(rec.deq) + (deq_wrap << 32),
    })
}
