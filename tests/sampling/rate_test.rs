/*!
 * Rate Decision Test
 * Tier mapping, error bypass and convergence under overload
 */

use proptest::prelude::*;
use telemetry_guard::sampling::tier_rate;
use telemetry_guard::{AdaptiveSampler, ManualClock, QueryMetrics, SamplerConfig};

fn sampler(min: f64, threshold: f64, max: u64) -> AdaptiveSampler {
    AdaptiveSampler::new(
        &SamplerConfig {
            min_sample_rate: min,
            high_cost_threshold_ms: threshold,
            max_records_per_second: max,
        },
        ManualClock::starting_now(),
    )
}

#[test]
fn test_cheap_query_lands_in_lowest_tier() {
    let s = sampler(0.1, 500.0, 1000);
    let rate = s.calculate_sample_rate("ping", &QueryMetrics::new(50.0));

    assert!((s.stats("ping").unwrap().importance_score - 0.04).abs() < 1e-12);
    assert!((rate - f64::max(0.1, 0.04 * 1.67)).abs() < 1e-12);
}

#[test]
fn test_critical_expensive_query_full_rate() {
    let s = sampler(0.1, 500.0, 1000);
    // cost 0.4 + criticality 0.1 + saturated variability + one failure in four
    for (i, d) in [100.0, 2000.0, 100.0, 2000.0].into_iter().enumerate() {
        let metrics = QueryMetrics::new(d).with_critical(true).with_error(i == 0);
        s.calculate_sample_rate("close_books", &metrics);
    }
    let score = s.stats("close_books").unwrap().importance_score;
    assert!(score > 0.7, "score {score}");
    assert_eq!(s.sample_rate("close_books"), Some(1.0));
}

#[test]
fn test_overload_converges_within_budget() {
    let max = 500;
    let s = sampler(0.1, 1000.0, max);
    let ops: Vec<String> = (0..20).map(|i| format!("collector_{i}")).collect();

    let mut overloaded_at = None;
    for cycle in 0..100 {
        for op in &ops {
            s.calculate_sample_rate(op, &QueryMetrics::new(400.0 + (cycle % 7) as f64 * 50.0));
        }
        if overloaded_at.is_none() && s.demand_volume() > max as f64 {
            overloaded_at = Some(cycle);
        }
    }

    assert!(overloaded_at.is_some(), "feed never overloaded the budget");
    assert!(s.estimated_volume() <= max as f64, "volume {}", s.estimated_volume());
}

#[test]
fn test_errors_bypass_volume_pressure() {
    let s = sampler(0.1, 1000.0, 10);
    for _ in 0..500 {
        s.calculate_sample_rate("busy", &QueryMetrics::new(900.0));
    }
    assert!(s.sample_rate("busy").unwrap() < 1.0);
    assert_eq!(
        s.calculate_sample_rate("busy", &QueryMetrics::new(900.0).with_error(true)),
        1.0
    );
}

proptest! {
    #[test]
    fn prop_tier_rate_monotone(a in 0.0f64..=1.0, b in 0.0f64..=1.0, min in 0.01f64..=0.5) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(tier_rate(lo, min) <= tier_rate(hi, min));
    }

    #[test]
    fn prop_rates_within_bounds(durations in prop::collection::vec(0.0f64..5_000.0, 1..100)) {
        let s = sampler(0.1, 1000.0, 50);
        for (i, d) in durations.iter().enumerate() {
            let rate = s.calculate_sample_rate(&format!("op_{}", i % 5), &QueryMetrics::new(*d));
            prop_assert!((0.1..=1.0).contains(&rate));
        }
    }
}
