// crates/qscope-window/src/decoder.rs

//! Ingest orchestration: directory of snapshots in, queryable sets out.

use std::path::Path;

use qscope_core::{FileStamp, SetArchive, TelemetryError, WindowConfig, WindowSet};
use tracing::{debug, info};

use crate::filter::{empty_set, filter_snapshot};
use crate::query::{self, QueryOutcome};
use crate::signal::{self, LiftedSignal, SignalStats, DEFAULT_TOLERANCE};
use crate::snapshot::{read_snapshot, snapshot_files};
use crate::wrap::WrapTracker;

/// The decoded state of one capture run: configuration, coefficient table,
/// filtered sets in snapshot order, and any correlated signals.
///
/// Built once at ingest; read-only afterwards. Queries only ever see the
/// sets present at construction time.
#[derive(Debug)]
pub struct TimeWindowDecoder {
    cfg: WindowConfig,
    coeff: Vec<f64>,
    sets: Vec<WindowSet>,
    signals: Vec<LiftedSignal>,
    tolerance: u32,
}

impl TimeWindowDecoder {
    /// Ingest every snapshot under `dir`.
    ///
    /// Files that parse to all-unused grids are discarded (the switch had
    /// not written yet); snapshots whose window 0 is unused decode to empty
    /// sets without advancing the wrap count.
    pub fn from_dir(cfg: WindowConfig, dir: &Path) -> Result<Self, TelemetryError> {
        let files = snapshot_files(dir)?;
        let mut tracker = WrapTracker::new();
        let mut sets = Vec::with_capacity(files.len());
        for (stamp, path) in files {
            let snap = read_snapshot(&path, stamp, &cfg)?;
            if snap.is_all_unused() {
                debug!(%stamp, "skipping all-unused snapshot");
                continue;
            }
            let set = if snap.window0_unused() {
                empty_set(&cfg, &snap)
            } else {
                let scan = tracker.observe(&cfg, &snap.windows[0]);
                filter_snapshot(&cfg, &snap, &scan)
            };
            debug!(
                %stamp,
                cells = set.len(),
                sts = set.sts,
                lts = set.lts,
                wraps = tracker.wraps(),
                "decoded set"
            );
            sets.push(set);
        }
        info!(
            sets = sets.len(),
            wraps = tracker.wraps(),
            period = cfg.total_duration(),
            "snapshot ingest complete"
        );
        let coeff = cfg.coefficients();
        Ok(Self {
            cfg,
            coeff,
            sets,
            signals: Vec::new(),
            tolerance: DEFAULT_TOLERANCE,
        })
    }

    /// Rebuild a decoder from a persisted archive (no raw-register ingest).
    #[must_use]
    pub fn from_archive(archive: SetArchive) -> Self {
        let coeff = archive.config.coefficients();
        Self {
            cfg: archive.config,
            coeff,
            sets: archive.sets,
            signals: Vec::new(),
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    /// Snapshot the decoded state for persistence.
    #[must_use]
    pub fn to_archive(&self) -> SetArchive {
        SetArchive::new(self.cfg, self.sets.clone())
    }

    /// Override the signal-matching tolerance (trimmed ticks).
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: u32) -> Self {
        self.tolerance = tolerance;
        self
    }

    #[inline]
    #[must_use]
    pub const fn config(&self) -> &WindowConfig {
        &self.cfg
    }

    #[inline]
    #[must_use]
    pub fn coefficients(&self) -> &[f64] {
        &self.coeff
    }

    #[inline]
    #[must_use]
    pub fn sets(&self) -> &[WindowSet] {
        &self.sets
    }

    #[inline]
    #[must_use]
    pub fn signals(&self) -> &[LiftedSignal] {
        &self.signals
    }

    /// Interval query `[ts, te]` in nanoseconds on the reconstructed
    /// timeline; see [`query::retrieve`].
    #[must_use]
    pub fn retrieve(&self, ts: u64, te: u64) -> QueryOutcome {
        query::retrieve(&self.cfg, &self.coeff, &self.sets, ts, te)
    }

    /// Correlate every signal file under `dir` against the decoded sets,
    /// appending matches to the signal list. Unmatched signals are dropped
    /// and only counted.
    pub fn load_signals(&mut self, dir: &Path) -> Result<SignalStats, TelemetryError> {
        let files = match snapshot_files(dir) {
            Ok(files) => files,
            // A run without interesting packets writes no signal files.
            Err(TelemetryError::EmptyDirectory { .. }) => return Ok(SignalStats::default()),
            Err(e) => return Err(e),
        };
        if self.sets.is_empty() {
            debug!("no decoded sets; every signal would be unmatched");
            return Ok(SignalStats::default());
        }
        let mut stats = SignalStats::default();
        for (stamp, path) in files {
            stats.files += 1;
            let set_index = self.candidate_set(stamp);
            for rec in signal::read_signal_file(&path)? {
                stats.records += 1;
                match signal::lift(&self.cfg, &self.sets, set_index, rec, self.tolerance) {
                    Some(lifted) => {
                        stats.matched += 1;
                        self.signals.push(lifted);
                    }
                    None => stats.dropped += 1,
                }
            }
        }
        info!(
            files = stats.files,
            matched = stats.matched,
            dropped = stats.dropped,
            "signal correlation complete"
        );
        Ok(stats)
    }

    /// The set written at `stamp`, or the first set when no stamp matches.
    fn candidate_set(&self, stamp: FileStamp) -> usize {
        self.sets
            .iter()
            .position(|s| s.stamp == stamp)
            .unwrap_or(0)
    }
}
