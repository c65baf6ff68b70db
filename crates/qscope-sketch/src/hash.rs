// crates/qscope-sketch/src/hash.rs

//! The shared hash family: eight CRC-16 variants distinguished by
//! polynomial, reflection, initial value, and xor-out. Sketch rows pick a
//! variant by index, so every sketch sees mutually independent-looking
//! indices for the same flow id.

use crc::{
    Algorithm, Crc, CRC_16_ARC, CRC_16_DDS_110, CRC_16_DECT_R, CRC_16_DNP, CRC_16_GENIBUS,
    CRC_16_MAXIM_DOW, CRC_16_UMTS, CRC_16_USB,
};
use qscope_core::Fid;

/// Number of distinct rows in the family.
pub const ROWS: usize = 8;

const ALGORITHMS: [&Algorithm<u16>; ROWS] = [
    &CRC_16_ARC,
    &CRC_16_USB,
    &CRC_16_GENIBUS,
    &CRC_16_UMTS,
    &CRC_16_DECT_R,
    &CRC_16_DNP,
    &CRC_16_MAXIM_DOW,
    &CRC_16_DDS_110,
];

/// Precomputed CRC tables for the whole family.
pub struct FlowHash {
    rows: Vec<Crc<u16>>,
}

impl FlowHash {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: ALGORITHMS.iter().map(|a| Crc::<u16>::new(a)).collect(),
        }
    }

    /// Hash `fid` with row `row` of the family.
    ///
    /// # Panics
    /// Panics if `row >= ROWS`.
    #[inline]
    #[must_use]
    pub fn hash(&self, row: usize, fid: &Fid) -> u16 {
        self.rows[row].checksum(fid.as_bytes())
    }
}

impl Default for FlowHash {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_distinct_hash_functions() {
        let h = FlowHash::new();
        let fids = [
            Fid::from_u64(0x0a00_0001_0a00_0002),
            Fid::from_u64(0xc0a8_0101_c0a8_0202),
            Fid::from_u64(1),
            Fid::from_u64(u64::MAX),
        ];
        let profiles: Vec<Vec<u16>> = (0..ROWS)
            .map(|r| fids.iter().map(|f| h.hash(r, f)).collect())
            .collect();
        for a in 0..ROWS {
            for b in a + 1..ROWS {
                assert_ne!(profiles[a], profiles[b], "rows {a} and {b} coincide");
            }
        }
    }

    #[test]
    fn hashing_is_deterministic() {
        let h = FlowHash::new();
        let fid = Fid::from_u64(42);
        assert_eq!(h.hash(0, &fid), h.hash(0, &fid));
    }
}
