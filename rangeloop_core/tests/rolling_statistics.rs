//! Ring invariant and closed-form moments for the rolling window.

use proptest::prelude::*;
use rangeloop_core::RollingStatistics;

fn closed_form(xs: &[f64]) -> (f64, f64) {
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

proptest! {
    #[test]
    fn window_holds_exactly_last_c_samples(
        cap in 1usize..40,
        xs in proptest::collection::vec(-5_000.0f64..5_000.0, 0..200),
    ) {
        let mut w = RollingStatistics::new(cap).unwrap();
        for &x in &xs {
            w.add(x);
        }
        let start = xs.len().saturating_sub(cap);
        prop_assert_eq!(w.len(), xs.len().min(cap));
        prop_assert_eq!(w.iter().collect::<Vec<_>>(), xs[start..].to_vec());
    }

    #[test]
    fn moments_match_closed_form(
        cap in 1usize..40,
        xs in proptest::collection::vec(-8_000.0f64..8_000.0, 1..200),
    ) {
        let mut w = RollingStatistics::new(cap).unwrap();
        for &x in &xs {
            w.add(x);
        }
        let held: Vec<f64> = w.iter().collect();
        let (mean, sd) = closed_form(&held);
        prop_assert!(close(w.mean().unwrap(), mean));
        prop_assert!(close(w.population_std_dev().unwrap(), sd));
    }
}

#[test]
fn constant_samples_have_zero_deviation() {
    let mut w = RollingStatistics::new(5).unwrap();
    for _ in 0..7 {
        w.add(100.0);
    }
    assert_eq!(w.mean(), Some(100.0));
    assert_eq!(w.population_std_dev(), Some(0.0));
}

#[test]
fn clear_empties_but_keeps_capacity() {
    let mut w = RollingStatistics::new(4).unwrap();
    w.add(1.0);
    w.clear();
    assert!(w.is_empty());
    assert_eq!(w.capacity(), 4);
    assert_eq!(w.mean(), None);
}
