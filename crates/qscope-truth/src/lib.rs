// crates/qscope-truth/src/lib.rs

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod query;
pub mod stream;

// ---- Re-exports for workspace compatibility ----
pub use stream::{
    TruthRecord, TruthStats, TruthStream, WrapRepair, COOLDOWN, OUT_OF_ORDER_CUTOFF_NS, WARMUP,
};
