// crates/qscope-window/src/lib.rs

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod decoder;
pub mod filter;
pub mod monitor;
pub mod query;
pub mod signal;
pub mod snapshot;
pub mod wrap;

// ---- Re-exports for workspace compatibility ----
pub use decoder::TimeWindowDecoder;
pub use monitor::{decode_monitor_dir, QueueEntry, QueueSample};
pub use query::{Coverage, QueryOutcome, QuerySpan};
pub use signal::{LiftedSignal, SignalRecord, SignalStats, DEFAULT_TOLERANCE};
pub use snapshot::{RawCell, RawSnapshot};
pub use wrap::{Window0Scan, WrapTracker};
