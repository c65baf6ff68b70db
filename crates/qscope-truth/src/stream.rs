// crates/qscope-truth/src/stream.rs

//! Ground-truth INT tap ingest: 20-byte big-endian records, independent
//! enqueue/dequeue wrap repair, warm-up/cool-down trimming, and stream
//! statistics.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used
)]

use std::fs;
use std::path::{Path, PathBuf};

use qscope_core::{Fid, TelemetryError};
use tracing::{debug, info};

/// Records discarded at the head of the stream (capture start-up noise).
pub const WARMUP: usize = 10;
/// Records discarded at the tail of the stream.
pub const COOLDOWN: usize = 10;

/// Backwards gaps larger than this are a true 32-bit rollover; smaller ones
/// are reordering noise. A genuine wrap shows a gap of nearly the full
/// rollover (~4.29 s in ns), while noise stays within the queue's
/// reordering horizon.
pub const OUT_OF_ORDER_CUTOFF_NS: u64 = 4_000_000_000;

/// One repaired ground-truth record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TruthRecord {
    /// Enqueue time on the 64-bit timeline.
    pub enq: u64,
    /// Dequeue time on the 64-bit timeline.
    pub deq: u64,
    /// Queue depth seen at enqueue.
    pub qlen: u32,
    pub fid: Fid,
}

/// Summary statistics over the trimmed stream.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TruthStats {
    pub packets: usize,
    pub first_enq: u64,
    pub last_enq: u64,
    pub first_deq: u64,
    pub last_deq: u64,
    /// `last_deq - first_deq`.
    pub dequeue_span: u64,
    /// `last_enq - first_enq`.
    pub enqueue_span: u64,
    pub avg_qlen: f64,
    /// Mean dequeue-to-dequeue gap.
    pub avg_interval: f64,
    /// Records rejected as out-of-order noise.
    pub dropped: usize,
}

/// Incremental wrap repair for the two tap clocks.
///
/// `seed` consumes the first record of a file to (re)establish the
/// previous-value state; `skip` consumes a warm-up record; `push` applies
/// the full repair rule and returns the widened pair, or `None` when the
/// record is reordering noise.
#[derive(Debug, Default)]
pub struct WrapRepair {
    base_enq: u64,
    base_deq: u64,
    prev_enq: u64,
    prev_deq: u64,
}

impl WrapRepair {
    /// First record of a file: only establishes the previous-value state.
    /// A dequeue below its own enqueue means the dequeue clock already
    /// rolled over.
    pub fn seed(&mut self, enq32: u32, deq32: u32) {
        let mut deq = u64::from(deq32) + self.base_deq;
        let enq = u64::from(enq32) + self.base_enq;
        if enq > deq {
            self.base_deq += 1 << 32;
            deq += 1 << 32;
        }
        self.prev_enq = enq;
        self.prev_deq = deq;
    }

    /// Warm-up record: advance the previous-value state, repair nothing.
    pub fn skip(&mut self, enq32: u32, deq32: u32) {
        self.prev_enq = u64::from(enq32) + self.base_enq;
        self.prev_deq = u64::from(deq32) + self.base_deq;
    }

    /// Full repair rule. Returns `(enq64, deq64)` or `None` for noise.
    pub fn push(&mut self, enq32: u32, deq32: u32) -> Option<(u64, u64)> {
        let mut deq = u64::from(deq32) + self.base_deq;
        let mut enq = u64::from(enq32) + self.base_enq;
        if enq > deq {
            self.base_deq += 1 << 32;
            deq += 1 << 32;
        }
        if deq < self.prev_deq {
            if self.prev_deq - deq > OUT_OF_ORDER_CUTOFF_NS {
                self.base_deq += 1 << 32;
                deq += 1 << 32;
            } else {
                return None;
            }
        }
        if enq < self.prev_enq {
            if self.prev_enq - enq > OUT_OF_ORDER_CUTOFF_NS {
                self.base_enq += 1 << 32;
                enq += 1 << 32;
            } else {
                return None;
            }
        }
        self.prev_enq = enq;
        self.prev_deq = deq;
        Some((enq, deq))
    }
}

fn parse_record(chunk: &[u8]) -> (u32, u32, u32, Fid) {
    let word = |c: &[u8]| u32::from_be_bytes([c[0], c[1], c[2], c[3]]);
    let mut fid = [0u8; 8];
    fid.copy_from_slice(&chunk[12..20]);
    (
        word(&chunk[0..4]),
        word(&chunk[4..8]),
        word(&chunk[8..12]),
        Fid::from_bytes(fid),
    )
}

/// The full tap log of one run, repaired and trimmed.
#[derive(Debug)]
pub struct TruthStream {
    records: Vec<TruthRecord>,
    stats: TruthStats,
}

impl TruthStream {
    /// Ingest every ground-truth file under `dir`, in sorted name order.
    pub fn from_dir(dir: &Path) -> Result<Self, TelemetryError> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(|e| TelemetryError::io(dir, e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TelemetryError::io(dir, e))?
            .into_iter()
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        if files.is_empty() {
            return Err(TelemetryError::EmptyDirectory {
                path: dir.to_owned(),
            });
        }
        files.sort();

        let mut repair = WrapRepair::default();
        let mut records = Vec::new();
        let mut warm = 0usize;
        let mut dropped = 0usize;
        for path in &files {
            debug!(path = %path.display(), "loading ground-truth file");
            let bytes = fs::read(path).map_err(|e| TelemetryError::io(path, e))?;
            let trailing = bytes.len() % 20;
            if trailing != 0 {
                return Err(TelemetryError::TruncatedRecord {
                    path: path.clone(),
                    kind: "ground-truth",
                    trailing,
                });
            }
            let mut chunks = bytes.chunks_exact(20);
            // The first record of each file only seeds the repair state.
            let Some(first) = chunks.next() else { continue };
            let (deq32, enq32, ..) = parse_record(first);
            repair.seed(enq32, deq32);

            for chunk in chunks {
                let (deq32, enq32, qlen, fid) = parse_record(chunk);
                if warm < WARMUP {
                    warm += 1;
                    repair.skip(enq32, deq32);
                    continue;
                }
                match repair.push(enq32, deq32) {
                    Some((enq, deq)) => records.push(TruthRecord { enq, deq, qlen, fid }),
                    None => dropped += 1,
                }
            }
        }

        if records.len() < COOLDOWN + 2 {
            return Err(TelemetryError::StreamTooShort {
                path: dir.to_owned(),
                records: records.len(),
            });
        }
        records.truncate(records.len() - COOLDOWN);

        let stats = Self::summarize(&records, dropped);
        info!(
            packets = stats.packets,
            dequeue_span = stats.dequeue_span,
            avg_qlen = stats.avg_qlen,
            avg_interval = stats.avg_interval,
            dropped,
            "ground-truth ingest complete"
        );
        Ok(Self { records, stats })
    }

    /// Build directly from repaired records (synthetic inputs, tests).
    #[must_use]
    pub fn from_records(records: Vec<TruthRecord>) -> Self {
        let stats = Self::summarize(&records, 0);
        Self { records, stats }
    }

    fn summarize(records: &[TruthRecord], dropped: usize) -> TruthStats {
        let Some((first, last)) = records.first().zip(records.last()) else {
            return TruthStats {
                dropped,
                ..TruthStats::default()
            };
        };
        let packets = records.len();
        let sum_qlen: u64 = records.iter().map(|r| u64::from(r.qlen)).sum();
        TruthStats {
            packets,
            first_enq: first.enq,
            last_enq: last.enq,
            first_deq: first.deq,
            last_deq: last.deq,
            dequeue_span: last.deq - first.deq,
            enqueue_span: last.enq - first.enq,
            avg_qlen: sum_qlen as f64 / packets as f64,
            avg_interval: (last.deq - first.deq) as f64 / (packets - 1).max(1) as f64,
            dropped,
        }
    }

    #[inline]
    #[must_use]
    pub fn records(&self) -> &[TruthRecord] {
        &self.records
    }

    #[inline]
    #[must_use]
    pub const fn stats(&self) -> &TruthStats {
        &self.stats
    }
}
