// crates/qscope-core/src/error.rs

//! Typed errors for the analysis core.
//!
//! Only ingest-time failures are errors; query-time conditions (an interval
//! no snapshot covers, a query extending past the last snapshot) are
//! reported as coverage diagnostics on the query outcome instead. Control
//! flow never unwinds through the core.

use std::path::PathBuf;
use thiserror::Error;

/// Everything the decoding and ingest layers can fail with.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Filesystem-level failure, with the path that triggered it.
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A register dump whose size does not match the configured geometry.
    #[error("{kind} file {path} is {len} bytes; expected {expected}")]
    RegisterLength {
        kind: &'static str,
        path: PathBuf,
        len: u64,
        expected: u64,
    },

    /// A record stream ending mid-record.
    #[error("{path} ends with a truncated {kind} record ({trailing} trailing bytes)")]
    TruncatedRecord {
        path: PathBuf,
        kind: &'static str,
        trailing: usize,
    },

    /// A data directory with no usable files.
    #[error("no usable data files under {path}")]
    EmptyDirectory { path: PathBuf },

    /// Too few ground-truth records to survive warm-up/cool-down trimming.
    #[error("{path}: ground-truth stream too short ({records} records after repair)")]
    StreamTooShort { path: PathBuf, records: usize },

    /// Rejected tunables.
    #[error("invalid window configuration: {reason}")]
    Config { reason: String },

    /// Archive path with an extension the codec dispatch cannot place.
    #[error("archive {path}: unsupported extension (expected .json or .cbor)")]
    ArchiveExtension { path: PathBuf },

    /// Archive payload that failed to decode.
    #[error("decoding archive {path}: {reason}")]
    ArchiveDecode { path: PathBuf, reason: String },

    /// Archive payload that failed to encode.
    #[error("encoding archive {path}: {reason}")]
    ArchiveEncode { path: PathBuf, reason: String },
}

impl TelemetryError {
    /// Attach a path to a raw I/O error.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
