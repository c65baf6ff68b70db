// crates/qscope-window/src/snapshot.rs

//! Raw snapshot files: directory enumeration and register-grid parsing.
//!
//! A snapshot file is named `<sec>_<usec>.bin` and carries, per window,
//! three consecutive blocks of `2^k` 32-bit little-endian words: trimmed
//! timestamps, source IPs, destination IPs.

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

use qscope_core::{FileStamp, Fid, TelemetryError, WindowConfig};
use tracing::debug;

/// One register slot as stored by the data plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawCell {
    /// Trimmed dequeue timestamp.
    pub tts: u32,
    /// Flow id of the last packet that visited the slot in its cycle.
    pub fid: Fid,
}

/// One parsed snapshot: `T` windows of `2^k` cells each.
#[derive(Clone, Debug)]
pub struct RawSnapshot {
    /// Write time from the filename.
    pub stamp: FileStamp,
    /// `windows[i][j]` is window `i`, slot `j`.
    pub windows: Vec<Vec<RawCell>>,
}

impl RawSnapshot {
    /// The switch had written nothing yet: every slot of every window is
    /// unused. Such files are discarded by the reader's skip rule.
    #[must_use]
    pub fn is_all_unused(&self) -> bool {
        self.windows
            .iter()
            .all(|w| w.iter().all(|c| c.fid.is_zero()))
    }

    /// Window 0 carries no data; the snapshot degrades to an empty set.
    #[must_use]
    pub fn window0_unused(&self) -> bool {
        self.windows[0].iter().all(|c| c.fid.is_zero())
    }
}

/// Enumerate `<sec>_<usec>.bin` files under `dir`, ascending by stamp.
///
/// An unreadable directory is fatal; a directory with no matching files is
/// reported as empty.
pub fn snapshot_files(dir: &Path) -> Result<Vec<(FileStamp, PathBuf)>, TelemetryError> {
    let mut out = Vec::new();
    let entries = fs::read_dir(dir).map_err(|e| TelemetryError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| TelemetryError::io(dir, e))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("bin") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if let Some(stamp) = FileStamp::parse_stem(stem) {
            out.push((stamp, path));
        }
    }
    if out.is_empty() {
        return Err(TelemetryError::EmptyDirectory {
            path: dir.to_owned(),
        });
    }
    out.sort_by_key(|(stamp, _)| *stamp);
    Ok(out)
}

/// Parse one snapshot file against the configured geometry.
pub fn read_snapshot(
    path: &Path,
    stamp: FileStamp,
    cfg: &WindowConfig,
) -> Result<RawSnapshot, TelemetryError> {
    let bytes = fs::read(path).map_err(|e| TelemetryError::io(path, e))?;
    let slots = cfg.slots();
    let expected = 3 * u64::from(cfg.windows) * slots as u64 * 4;
    if bytes.len() as u64 != expected {
        return Err(TelemetryError::RegisterLength {
            kind: "time-window",
            path: path.to_owned(),
            len: bytes.len() as u64,
            expected,
        });
    }

    let mut words = bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]));
    let mut windows = Vec::with_capacity(cfg.windows as usize);
    for _ in 0..cfg.windows {
        let tts: Vec<u32> = words.by_ref().take(slots).collect();
        let src: Vec<u32> = words.by_ref().take(slots).collect();
        let dst: Vec<u32> = words.by_ref().take(slots).collect();
        let cells = tts
            .into_iter()
            .zip(src)
            .zip(dst)
            .map(|((tts, s), d)| RawCell {
                tts,
                fid: Fid::from_words(s, d),
            })
            .collect();
        windows.push(cells);
    }
    debug!(%stamp, windows = windows.len(), "parsed snapshot");
    Ok(RawSnapshot { stamp, windows })
}
