//! Invariants of the core arithmetic: coefficient shape, set-period closed
//! form, and flow-id/timestamp reconstruction round-trips.

use proptest::prelude::*;
use qscope_core::{Fid, LiveCell, WindowConfig};

/// Valid tunable combinations for property runs: geometry is constrained so
/// the last window keeps at least one cycle-id bit.
fn arb_config() -> impl Strategy<Value = WindowConfig> {
    (1u32..=3, 1u32..=6, 1u32..=4, 2u32..=10, 0.05f64..=1.0).prop_filter_map(
        "geometry must keep cycle-id bits",
        |(alpha, k, t, tb0, z)| WindowConfig::new(alpha, k, t, tb0, z).ok(),
    )
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64, // good CI/runtime balance
        .. ProptestConfig::default()
    })]

    #[test]
    fn coefficients_start_at_one_and_never_increase(cfg in arb_config()) {
        let co = cfg.coefficients();
        prop_assert_eq!(co.len(), cfg.windows as usize);
        prop_assert_eq!(co[0], 1.0);
        for w in co.windows(2) {
            prop_assert!(w[1] > 0.0, "coefficients must stay positive");
            prop_assert!(w[1] <= w[0], "coefficients must be non-increasing");
        }
    }

    #[test]
    fn set_period_matches_the_geometric_closed_form(cfg in arb_config()) {
        // sum_i 2^(TB0+k+alpha*i)  ==  (2^(alpha*T) - 1)/(2^alpha - 1) * 2^(TB0+k)
        let unit = 1u64 << (cfg.trim_bits + cfg.index_bits);
        let quotient =
            ((1u64 << (cfg.alpha * cfg.windows)) - 1) / ((1u64 << cfg.alpha) - 1);
        prop_assert_eq!(cfg.total_duration(), quotient * unit);
    }

    #[test]
    fn fid_survives_hex_roundtrip(bytes in prop::array::uniform8(any::<u8>())) {
        let fid = Fid::from_bytes(bytes);
        let back: Fid = fid.to_string().parse().unwrap();
        prop_assert_eq!(fid, back);
        prop_assert_eq!(Fid::from_u64(fid.as_u64()), fid);
    }

    #[test]
    fn midpoint_sits_inside_the_cell_span(
        cfg in arb_config(),
        tts in 0u32..=0x3fff_ffff,
        wrap in 0u32..=3,
    ) {
        let window = (cfg.windows - 1) as u8;
        let cell = LiveCell { tts, fid: Fid::from_u64(1), window, wrap };
        let (lo, hi) = cell.span(&cfg);
        let mid = cell.midpoint(&cfg);
        let offset = u64::from(wrap) << 32;
        prop_assert!(lo + offset <= mid);
        prop_assert!(mid <= hi + offset);
    }
}
