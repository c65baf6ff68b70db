// crates/qscope-core/src/config.rs

//! Run-immutable tunables of the time-window structure and the quantities
//! derived from them (bit widths, set period, sampling coefficients).
//!
//! All five tunables must match the data plane that produced the snapshots;
//! nothing on disk self-describes them.

use serde::{Deserialize, Serialize};

use crate::error::TelemetryError;

/// Tunables of one capture run.
///
/// Field names follow the data-plane parameters: `alpha` is the per-level
/// compression factor, `index_bits` is log2 of the slots per window
/// (`k`), `windows` is the window count (`T`), `trim_bits` is how many low
/// bits window 0 drops from the nanosecond clock (`TB0`), and `cell_prob`
/// is the per-cycle write probability of a window-0 cell (`z`).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct WindowConfig {
    pub alpha: u32,
    pub index_bits: u32,
    pub windows: u32,
    pub trim_bits: u32,
    pub cell_prob: f64,
}

impl WindowConfig {
    /// Validate and construct. The last window must retain at least one
    /// cycle-id bit, which bounds `alpha * (windows - 1)`.
    pub fn new(
        alpha: u32,
        index_bits: u32,
        windows: u32,
        trim_bits: u32,
        cell_prob: f64,
    ) -> Result<Self, TelemetryError> {
        let fail = |reason: String| Err(TelemetryError::Config { reason });
        if alpha < 1 {
            return fail("alpha must be >= 1".into());
        }
        if index_bits < 1 {
            return fail("index_bits (k) must be >= 1".into());
        }
        if windows < 1 {
            return fail("windows (T) must be >= 1".into());
        }
        if !(1..32).contains(&trim_bits) {
            return fail(format!("trim_bits (TB0) must be in 1..32, got {trim_bits}"));
        }
        if !(cell_prob > 0.0 && cell_prob <= 1.0) {
            return fail(format!("cell_prob (z) must be in (0, 1], got {cell_prob}"));
        }
        let last_cid_bits = 32i64
            - i64::from(trim_bits)
            - i64::from(index_bits)
            - i64::from(alpha) * i64::from(windows - 1);
        if last_cid_bits < 1 {
            return fail(format!(
                "window {} would keep {last_cid_bits} cycle-id bits; \
                 require 32 - TB0 - k - alpha*(T-1) >= 1",
                windows - 1
            ));
        }
        Ok(Self {
            alpha,
            index_bits,
            windows,
            trim_bits,
            cell_prob,
        })
    }

    /// Slots per window, `2^k`.
    #[inline]
    #[must_use]
    pub const fn slots(&self) -> usize {
        1 << self.index_bits
    }

    /// Width of the trimmed timestamp field, `B = 32 - TB0`.
    #[inline]
    #[must_use]
    pub const fn tts_bits(&self) -> u32 {
        32 - self.trim_bits
    }

    /// Nanosecond shift of window `w`: one `tts` tick of window `w` covers
    /// `2^(TB0 + alpha*w)` ns.
    #[inline]
    #[must_use]
    pub const fn shift(&self, w: u32) -> u32 {
        self.trim_bits + self.alpha * w
    }

    /// Meaningful cycle-id bits of window `w`.
    #[inline]
    #[must_use]
    pub const fn cid_bits(&self, w: u32) -> u32 {
        32 - self.trim_bits - self.index_bits - self.alpha * w
    }

    /// Mask selecting the comparable cycle-id bits of window `w`.
    #[inline]
    #[must_use]
    pub const fn cid_mask(&self, w: u32) -> u32 {
        (1u32 << self.cid_bits(w)) - 1
    }

    /// Burst threshold exponent for the wrap heuristic, `(B + k) / 2`.
    #[inline]
    #[must_use]
    pub const fn burst_threshold_bit(&self) -> u32 {
        (self.tts_bits() + self.index_bits) / 2
    }

    /// The set period: nanoseconds one complete cycle of every window spans,
    /// `sum_i 2^(TB0 + k + alpha*i)`.
    #[must_use]
    pub fn total_duration(&self) -> u64 {
        (0..self.windows)
            .map(|i| 1u64 << (self.trim_bits + self.index_bits + self.alpha * i))
            .sum()
    }

    /// Per-window sampling coefficients, `coeff[0..T]`.
    ///
    /// `coeff[i]` is the probability-derived attenuation of window `i`;
    /// estimated counts divide the raw survivor count by it. `z == 1` means
    /// every cycle is captured and no attenuation applies.
    #[must_use]
    pub fn coefficients(&self) -> Vec<f64> {
        let t = self.windows as usize;
        if (self.cell_prob - 1.0).abs() < f64::EPSILON {
            return vec![1.0; t];
        }
        let m = f64::from(1u32 << self.alpha);
        let mut out = Vec::with_capacity(t);
        out.push(1.0);
        let mut z = self.cell_prob;
        let mut p = 1.0 - z * z;
        let mut co = 1.0;
        for _ in 1..t {
            let step = z * (1.0 - p.powf(m)) / ((1.0 - p) * m);
            co *= step;
            out.push(co);
            z = 1.0 - p.powf(m);
            p = 1.0 - z * z;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(alpha: u32, k: u32, t: u32, tb0: u32, z: f64) -> WindowConfig {
        WindowConfig::new(alpha, k, t, tb0, z).unwrap()
    }

    #[test]
    fn derived_widths_match_the_small_reference_setup() {
        let c = cfg(1, 2, 2, 2, 1.0);
        assert_eq!(c.slots(), 4);
        assert_eq!(c.tts_bits(), 30);
        assert_eq!(c.burst_threshold_bit(), 16);
        assert_eq!(c.total_duration(), 48);
        assert_eq!(c.cid_bits(0), 28);
        assert_eq!(c.cid_bits(1), 27);
    }

    #[test]
    fn deterministic_capture_has_unit_coefficients() {
        let c = cfg(1, 2, 4, 2, 1.0);
        assert_eq!(c.coefficients(), vec![1.0; 4]);
    }

    #[test]
    fn half_probability_attenuates_by_seven_sixteenths() {
        let c = cfg(1, 2, 2, 2, 0.5);
        let co = c.coefficients();
        assert_eq!(co[0], 1.0);
        assert!((co[1] - 0.4375).abs() < 1e-12);
    }

    #[test]
    fn rejects_geometry_with_no_cycle_bits_left() {
        assert!(WindowConfig::new(4, 10, 6, 7, 1.0).is_err());
        assert!(WindowConfig::new(1, 10, 3, 7, 1.0).is_ok());
    }

    #[test]
    fn rejects_out_of_range_probability() {
        assert!(WindowConfig::new(1, 2, 2, 2, 0.0).is_err());
        assert!(WindowConfig::new(1, 2, 2, 2, 1.5).is_err());
    }
}
