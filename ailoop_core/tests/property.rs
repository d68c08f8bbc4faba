use ailoop_core::calibration::fit_points;
use ailoop_core::filter::{MedianOf3, MovingAverage};
use ailoop_core::store::RECORD_LEN;
use ailoop_core::{CalibrationRecord, Curve, FilterCfg};
use proptest::prelude::*;

fn median_of(samples: [u16; 3]) -> u16 {
    let mut m = MedianOf3::default();
    m.push(samples[0]);
    m.push(samples[1]);
    m.push(samples[2])
}

proptest! {
    #[test]
    fn median_ignores_order_of_the_outer_values(a in any::<u16>(), b in any::<u16>(), c in any::<u16>()) {
        let mut sorted = [a, b, c];
        sorted.sort_unstable();
        let [lo, mid, hi] = sorted;
        prop_assert_eq!(median_of([lo, mid, hi]), mid);
        prop_assert_eq!(median_of([hi, mid, lo]), mid);
        prop_assert_eq!(median_of([lo, hi, mid]), mid);
        prop_assert_eq!(median_of([hi, lo, mid]), mid);
        prop_assert_eq!(median_of([mid, lo, hi]), mid);
        prop_assert_eq!(median_of([mid, hi, lo]), mid);
    }

    #[test]
    fn moving_average_converges_to_a_constant(
        window in 1u8..=200,
        v in any::<u16>(),
        history in proptest::collection::vec(any::<u16>(), 0..300),
        extra in 0usize..50,
    ) {
        let mut avg = MovingAverage::default();
        for h in history {
            avg.push(h, window);
        }
        let mut last = 0.0;
        for _ in 0..usize::from(window) + extra {
            last = avg.push(v, window);
        }
        prop_assert_eq!(last, f64::from(v));
    }

    #[test]
    fn exact_quadratics_are_recovered(
        a in -1e-7f64..1e-7,
        b in 0.8f64..1.25,
        c in -500.0f64..500.0,
        start in 10_000.0f64..20_000.0,
        step in 1_000.0f64..2_500.0,
    ) {
        let xs: Vec<f64> = (0..17).map(|i| start + step * f64::from(i)).collect();
        let want = Curve { a, b, c };
        let ys: Vec<f64> = xs.iter().map(|x| want.apply(*x)).collect();
        let got = fit_points(&xs, &ys).unwrap();
        for x in &xs {
            prop_assert!((got.apply(*x) - want.apply(*x)).abs() < 1e-4);
        }
        prop_assert!((got.a - a).abs() < 1e-11);
    }

    #[test]
    fn decoder_never_panics(bytes in proptest::collection::vec(any::<u8>(), RECORD_LEN)) {
        let mut buf = [0u8; RECORD_LEN];
        buf.copy_from_slice(&bytes);
        if let Ok(rec) = CalibrationRecord::decode(&buf) {
            let clean = rec.sanitized(FilterCfg::default());
            prop_assert!(clean.filter().is_valid());
        }
    }
}
