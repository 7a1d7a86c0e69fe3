/*!
 * Configuration Test
 * JSON files drive the processor, including custom error patterns
 */

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use telemetry_guard::{
    ErrorOutcome, ExecutionReport, GuardConfig, GuardError, GuardProcessor, ManualClock,
    NoopStore, Processor,
};

fn write_config(json: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_from_file() {
    let file = write_config(
        r#"{
            "breaker": { "failure_threshold": 2, "failure_window": 30, "open_cooldown": 5 },
            "sampler": { "min_sample_rate": 0.2, "high_cost_threshold_ms": 250.0 },
            "sync": { "enabled": false },
            "patterns": [{
                "name": "citus_missing",
                "pattern": "citus_stat_statements",
                "action": "disable_query",
                "feature": "citus",
                "backoff": 120,
                "description": "Citus not installed"
            }],
            "extend_default_patterns": true,
            "fallbacks": { "stat_monitor": "stat_statements" }
        }"#,
    );

    let config = GuardConfig::from_file(file.path()).unwrap();
    assert_eq!(config.breaker.failure_threshold, 2);
    assert_eq!(config.breaker.open_cooldown, Duration::from_secs(5));
    assert_eq!(config.sampler.min_sample_rate, 0.2);
    assert!(!config.sync.enabled);

    let clock = ManualClock::starting_now();
    let guard = GuardProcessor::new(config, Arc::new(NoopStore), clock.clone()).unwrap();

    let verdict = guard.process(&ExecutionReport::failure(
        "citus_queries",
        1.0,
        r#"relation "citus_stat_statements" does not exist"#,
    ));
    match verdict.outcome {
        Some(ErrorOutcome::Suppressed { error, reenable_at, .. }) => {
            assert_eq!(error.feature.as_str(), "citus");
            assert_eq!(error.message, "Citus not installed");
            assert_eq!(reenable_at, guard.breaker().now() + Duration::from_secs(120));
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    // Built-in rules still apply after the custom one
    let verdict = guard.process(&ExecutionReport::failure(
        "stat_monitor",
        1.0,
        r#"relation "pg_stat_monitor" does not exist"#,
    ));
    assert_eq!(verdict.fallback(), Some("stat_statements"));
}

#[test]
fn test_bad_pattern_rejected() {
    let file = write_config(
        r#"{ "patterns": [{ "name": "bad", "pattern": "(", "action": "circuit_break",
              "feature": "x", "backoff": 10 }] }"#,
    );
    let config = GuardConfig::from_file(file.path()).unwrap();
    let err = GuardProcessor::new(config, Arc::new(NoopStore), ManualClock::starting_now())
        .unwrap_err();
    assert!(matches!(err, GuardError::InvalidPattern { .. }));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = GuardConfig::from_file(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, GuardError::Io(_)));
}

#[tokio::test]
async fn test_default_processor_lifecycle() {
    let guard = GuardProcessor::with_defaults().unwrap();
    guard.init().await.unwrap();
    guard.process(&ExecutionReport::success("q", 1.0).critical());
    guard.shutdown().await.unwrap();
}
