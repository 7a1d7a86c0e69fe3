/*!
 * Statistics Tracker Test
 * Streaming aggregates agree with the textbook definitions
 */

use proptest::prelude::*;
use telemetry_guard::sampling::StatsTracker;
use telemetry_guard::ManualClock;

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

fn sample_std_dev(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    let ss: f64 = xs.iter().map(|x| (x - m).powi(2)).sum();
    (ss / (xs.len() - 1) as f64).sqrt()
}

proptest! {
    #[test]
    fn prop_welford_matches_batch(durations in prop::collection::vec(0.0f64..10_000.0, 1..200)) {
        let tracker = StatsTracker::new(ManualClock::starting_now());
        for d in &durations {
            tracker.observe("q", *d, false, false);
        }
        let s = tracker.get("q").unwrap();

        prop_assert_eq!(s.execution_count, durations.len() as u64);
        prop_assert!((s.mean_duration - mean(&durations)).abs() < 1e-6);
        prop_assert!((s.std_dev_duration - sample_std_dev(&durations)).abs() < 1e-6);
    }

    #[test]
    fn prop_error_rate_is_share_of_failures(errors in prop::collection::vec(any::<bool>(), 1..200)) {
        let tracker = StatsTracker::new(ManualClock::starting_now());
        for e in &errors {
            tracker.observe("q", 1.0, *e, false);
        }
        let expected = errors.iter().filter(|e| **e).count() as f64 / errors.len() as f64;
        prop_assert!((tracker.get("q").unwrap().error_rate - expected).abs() < 1e-9);
    }
}

#[test]
fn test_single_observation_has_zero_std_dev() {
    let tracker = StatsTracker::new(ManualClock::starting_now());
    let s = tracker.observe("q", 42.0, false, false);
    assert_eq!(s.std_dev_duration, 0.0);
    assert_eq!(s.mean_duration, 42.0);
}

#[test]
fn test_executions_per_second_uses_observed_window() {
    let clock = ManualClock::starting_now();
    let tracker = StatsTracker::new(clock.clone());
    for _ in 0..10 {
        tracker.observe("q", 1.0, false, false);
        clock.advance(std::time::Duration::from_secs(1));
    }
    // 10 executions between first_seen and first_seen + 9s
    let eps = tracker.get("q").unwrap().executions_per_second();
    assert!((eps - 10.0 / 9.0).abs() < 1e-9);
}
