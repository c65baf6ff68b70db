//! Serialization helpers for decoded-set archives.
//!
//! JSON and CBOR read/write utilities with extension-based auto-detection.
//! Unknown/missing extensions are rejected for reads and default to JSON
//! for writes. An archive captures the run configuration plus every decoded
//! [`WindowSet`], so later query sessions can skip raw-register ingest.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::config::WindowConfig;
use crate::error::TelemetryError;
use crate::types::WindowSet;

/// Format version for [`SetArchive`].
pub const ARCHIVE_VERSION: u16 = 1;

/// Persisted form of a decoded run: configuration echo plus sets.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SetArchive {
    /// Schema/encoding version.
    pub version: u16,
    /// Tunables the sets were decoded under.
    pub config: WindowConfig,
    /// Decoded sets in snapshot order.
    pub sets: Vec<WindowSet>,
}

impl SetArchive {
    /// Wrap decoded sets for persistence.
    #[inline]
    #[must_use]
    pub fn new(config: WindowConfig, sets: Vec<WindowSet>) -> Self {
        Self {
            version: ARCHIVE_VERSION,
            config,
            sets,
        }
    }
}

/// Ensure the parent directory for a file exists (no-op if none).
fn ensure_parent_dir(path: &Path) -> Result<(), TelemetryError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir).map_err(|e| TelemetryError::io(dir, e))?;
        }
    }
    Ok(())
}

/// Read a [`SetArchive`] from **JSON**.
pub fn read_archive_json<P: AsRef<Path>>(path: P) -> Result<SetArchive, TelemetryError> {
    let path = path.as_ref();
    let f = File::open(path).map_err(|e| TelemetryError::io(path, e))?;
    let rdr = BufReader::new(f);
    serde_json::from_reader(rdr).map_err(|e| TelemetryError::ArchiveDecode {
        path: path.to_owned(),
        reason: e.to_string(),
    })
}

/// Write a [`SetArchive`] to **JSON** (pretty).
pub fn write_archive_json<P: AsRef<Path>>(path: P, v: &SetArchive) -> Result<(), TelemetryError> {
    let path = path.as_ref();
    ensure_parent_dir(path)?;
    let f = File::create(path).map_err(|e| TelemetryError::io(path, e))?;
    let w = BufWriter::new(f);
    serde_json::to_writer_pretty(w, v).map_err(|e| TelemetryError::ArchiveEncode {
        path: path.to_owned(),
        reason: e.to_string(),
    })
}

/// Read a [`SetArchive`] from **CBOR**.
pub fn read_archive_cbor<P: AsRef<Path>>(path: P) -> Result<SetArchive, TelemetryError> {
    let path = path.as_ref();
    let f = File::open(path).map_err(|e| TelemetryError::io(path, e))?;
    let mut rdr = BufReader::new(f);
    ciborium::de::from_reader(&mut rdr).map_err(|e| TelemetryError::ArchiveDecode {
        path: path.to_owned(),
        reason: e.to_string(),
    })
}

/// Write a [`SetArchive`] to **CBOR**.
pub fn write_archive_cbor<P: AsRef<Path>>(path: P, v: &SetArchive) -> Result<(), TelemetryError> {
    let path = path.as_ref();
    ensure_parent_dir(path)?;
    let f = File::create(path).map_err(|e| TelemetryError::io(path, e))?;
    let mut w = BufWriter::new(f);
    ciborium::ser::into_writer(v, &mut w).map_err(|e| TelemetryError::ArchiveEncode {
        path: path.to_owned(),
        reason: e.to_string(),
    })
}

/// Auto-detect read by extension `.json` / `.cbor` (case-insensitive).
pub fn read_archive_auto<P: AsRef<Path>>(path: P) -> Result<SetArchive, TelemetryError> {
    match ext_lower(path.as_ref()).as_deref() {
        Some("json") => read_archive_json(path),
        Some("cbor") => read_archive_cbor(path),
        _ => Err(TelemetryError::ArchiveExtension {
            path: path.as_ref().to_owned(),
        }),
    }
}

/// Auto-detect write (defaults to **JSON** if unknown or missing).
pub fn write_archive_auto<P: AsRef<Path>>(path: P, v: &SetArchive) -> Result<(), TelemetryError> {
    match ext_lower(path.as_ref()).as_deref() {
        Some("cbor") => write_archive_cbor(path, v),
        _ => write_archive_json(path, v),
    }
}

/// Return the lowercase extension (without dot) if present.
fn ext_lower(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_ascii_lowercase())
}
