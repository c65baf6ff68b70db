// crates/qscope-core/src/types.rs

//! Canonical core types used across the qscope workspace.
//!
//! These live in `qscope-core` and are broadly re-exported at the crate root
//! so other crates can import via `qscope_core::Fid`, `qscope_core::LiveCell`,
//! etc.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::config::WindowConfig;

/// Flow identifier: source IPv4 followed by destination IPv4, network order.
///
/// The data plane writes the two halves as 32-bit little-endian register
/// words; [`Fid::from_words`] performs the byte reversal so the stored form
/// is always network order. An all-zero fid marks an unused slot.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fid([u8; 8]);

impl Fid {
    /// The unused-slot marker.
    pub const ZERO: Self = Self([0u8; 8]);

    /// Construct from raw network-order bytes.
    #[inline]
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Assemble from the two register words as read off disk (little-endian
    /// decoded). Reversing each word's bytes restores network order.
    #[inline]
    #[must_use]
    pub fn from_words(src: u32, dst: u32) -> Self {
        let mut b = [0u8; 8];
        b[..4].copy_from_slice(&src.to_be_bytes());
        b[4..].copy_from_slice(&dst.to_be_bytes());
        Self(b)
    }

    /// Network-order bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// Whether this is the unused-slot marker.
    #[inline]
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 8]
    }

    /// The fid as one big-endian word (XOR-codable form).
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        u64::from_be_bytes(self.0)
    }

    /// Inverse of [`Fid::as_u64`].
    #[inline]
    #[must_use]
    pub const fn from_u64(v: u64) -> Self {
        Self(v.to_be_bytes())
    }
}

impl fmt::Display for Fid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Fid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fid({})", hex::encode(self.0))
    }
}

impl FromStr for Fid {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut b = [0u8; 8];
        hex::decode_to_slice(s, &mut b)?;
        Ok(Self(b))
    }
}

// Archives carry fids as lowercase hex strings, not byte tuples.
impl Serialize for Fid {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Fid {
    fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        let s = String::deserialize(de)?;
        s.parse().map_err(|e| D::Error::custom(format!("fid: {e}")))
    }
}

/// `(seconds, microseconds)` write time parsed from a data file's stem.
///
/// Snapshot and signal files are named `<sec>_<usec>.bin`; queue-monitor
/// files append a third `_<wrap_flag>` component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileStamp {
    pub sec: u64,
    pub usec: u64,
}

impl FileStamp {
    /// Parse a `<sec>_<usec>` stem. Returns `None` on malformed stems.
    #[must_use]
    pub fn parse_stem(stem: &str) -> Option<Self> {
        let (sec, usec) = stem.split_once('_')?;
        Some(Self {
            sec: sec.parse().ok()?,
            usec: usec.parse().ok()?,
        })
    }

    /// Parse a `<sec>_<usec>_<wrap_flag>` stem (queue-monitor naming).
    #[must_use]
    pub fn parse_flagged_stem(stem: &str) -> Option<(Self, bool)> {
        let mut parts = stem.splitn(3, '_');
        let sec = parts.next()?.parse().ok()?;
        let usec = parts.next()?.parse().ok()?;
        let flag: u32 = parts.next()?.parse().ok()?;
        Some((Self { sec, usec }, flag == 1))
    }
}

impl fmt::Display for FileStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.sec, self.usec)
    }
}

/// A cell surviving the latest-cycle filter of one snapshot.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LiveCell {
    /// Trimmed timestamp as stored in the register.
    pub tts: u32,
    /// Flow id of the packet that last visited the slot.
    pub fid: Fid,
    /// Which time window the cell belongs to (0 = finest).
    pub window: u8,
    /// 32-bit rollovers of the untrimmed clock at the cell's write time.
    pub wrap: u32,
}

impl LiveCell {
    /// `[earliest, latest]` untrimmed nanoseconds the cell can represent,
    /// before the wrap offset.
    #[inline]
    #[must_use]
    pub fn span(&self, cfg: &WindowConfig) -> (u64, u64) {
        let tb = cfg.shift(u32::from(self.window));
        let lo = u64::from(self.tts) << tb;
        (lo, lo + (1 << tb) - 1)
    }

    /// Reconstructed midpoint timestamp on the global 64-bit timeline.
    #[inline]
    #[must_use]
    pub fn midpoint(&self, cfg: &WindowConfig) -> u64 {
        let tb = cfg.shift(u32::from(self.window));
        (u64::from(self.tts) << tb) + (1 << (tb - 1)) + (u64::from(self.wrap) << 32)
    }
}

/// The decoded view of one snapshot: the most recent complete cycle of every
/// window, with the set's reconstructed time bounds.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowSet {
    /// Write time from the snapshot's filename.
    pub stamp: FileStamp,
    /// Surviving cells, in filter scan order.
    pub cells: Vec<LiveCell>,
    /// Smallest reconstructed midpoint in the set.
    pub sts: u64,
    /// Largest reconstructed midpoint in the set.
    pub lts: u64,
    /// The cell backing `lts` (window 0's largest trimmed stamp).
    pub largest: Option<LiveCell>,
    /// The cell backing `sts`.
    pub smallest: Option<LiveCell>,
    /// Survivor count per window.
    pub window_counts: Vec<u32>,
}

impl WindowSet {
    /// Whether the filter kept any cell at all.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Number of surviving cells.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether `ts` falls inside the set's reconstructed bounds.
    #[inline]
    #[must_use]
    pub fn covers(&self, ts: u64) -> bool {
        self.sts <= ts && ts <= self.lts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fid_word_assembly_reverses_bytes() {
        // Words as decoded from little-endian disk order.
        let fid = Fid::from_words(0xaabb_ccdd, 0xeeff_1122);
        assert_eq!(fid.to_string(), "aabbccddeeff1122");
        assert!(!fid.is_zero());
        assert_eq!(fid.as_u64(), 0xaabb_ccdd_eeff_1122);
    }

    #[test]
    fn fid_hex_roundtrip() {
        let fid = Fid::from_bytes([0x0a, 0x00, 0x00, 0x01, 0x0a, 0x00, 0x00, 0x02]);
        let back: Fid = fid.to_string().parse().unwrap();
        assert_eq!(fid, back);
    }

    #[test]
    fn stamp_orders_by_sec_then_usec() {
        let a = FileStamp::parse_stem("12_900000").unwrap();
        let b = FileStamp::parse_stem("13_1").unwrap();
        assert!(a < b);
        assert_eq!(a.to_string(), "12_900000");
    }

    #[test]
    fn flagged_stamp_parses_wrap_marker() {
        let (stamp, wrapped) = FileStamp::parse_flagged_stem("7_250_1").unwrap();
        assert_eq!(stamp, FileStamp { sec: 7, usec: 250 });
        assert!(wrapped);
        assert!(FileStamp::parse_flagged_stem("7_250").is_none());
    }
}
