/*!
 * Shared State Test
 * Profiles written by one instance are picked up by the next
 */

use async_trait::async_trait;
use mockall::mock;
use std::sync::Arc;
use std::time::Duration;
use telemetry_guard::monitoring::counters::{LOAD_FAILURES, SYNC_FAILURES, SYNC_SUCCESSES};
use telemetry_guard::{
    ExecutionReport, GuardConfig, GuardError, GuardProcessor, GuardResult, ManualClock,
    MemoryStore, Processor, SharedStore,
};

mock! {
    pub Store {}

    #[async_trait]
    impl SharedStore for Store {
        async fn get(&self, key: &str) -> GuardResult<Option<String>>;
        async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> GuardResult<()>;
        async fn scan_prefix(&self, prefix: &str) -> GuardResult<Vec<(String, String)>>;
    }
}

#[tokio::test]
async fn test_second_instance_inherits_profiles() {
    let clock = ManualClock::starting_now();
    let store = Arc::new(MemoryStore::new(clock.clone()));

    let first = GuardProcessor::new(GuardConfig::default(), store.clone(), clock.clone()).unwrap();
    first.init().await.unwrap();
    for _ in 0..20 {
        first.process(&ExecutionReport::success("slow_report", 900.0));
    }
    first.shutdown().await.unwrap();

    let second = GuardProcessor::new(GuardConfig::default(), store.clone(), clock).unwrap();
    second.init().await.unwrap();
    let stats = second.stats("slow_report").expect("profile restored");
    assert_eq!(stats.execution_count, 20);
    assert_eq!(
        second.sampler().sample_rate("slow_report"),
        first.sampler().sample_rate("slow_report")
    );
    second.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_entries_expire_after_ttl() {
    let clock = ManualClock::starting_now();
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let mut config = GuardConfig::default();
    config.sync.ttl = Duration::from_secs(60);

    let guard = GuardProcessor::new(config.clone(), store.clone(), clock.clone()).unwrap();
    guard.process(&ExecutionReport::success("q", 10.0));
    guard.synchronizer().sync().await.unwrap();

    clock.advance(Duration::from_secs(61));
    let fresh = GuardProcessor::new(config, store, clock).unwrap();
    assert_eq!(fresh.synchronizer().load().await.unwrap(), 0);
    assert!(fresh.stats("q").is_none());
}

#[tokio::test]
async fn test_failing_store_never_breaks_the_guard() {
    let mut store = MockStore::new();
    store
        .expect_scan_prefix()
        .returning(|_| Err(GuardError::Store("READONLY replica".into())));
    store
        .expect_set_with_ttl()
        .returning(|_, _, _| Err(GuardError::Store("READONLY replica".into())));
    store.expect_get().returning(|_| Ok(None));

    let guard = GuardProcessor::new(
        GuardConfig::default(),
        Arc::new(store),
        ManualClock::starting_now(),
    )
    .unwrap();

    guard.init().await.unwrap();
    let verdict = guard.process(&ExecutionReport::success("q", 10.0));
    assert!(verdict.sample_rate > 0.0);
    guard.shutdown().await.unwrap();

    let counters = guard.counters();
    assert_eq!(counters.get(LOAD_FAILURES), 1);
    assert_eq!(counters.get(SYNC_FAILURES), 1);
    assert_eq!(counters.get(SYNC_SUCCESSES), 0);
}

#[tokio::test]
async fn test_opportunistic_sync_after_interval() {
    let clock = ManualClock::starting_now();
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let guard = GuardProcessor::new(GuardConfig::default(), store.clone(), clock.clone()).unwrap();

    guard.process(&ExecutionReport::success("q", 10.0));
    assert!(store.is_empty());

    clock.advance(Duration::from_secs(31));
    guard.process(&ExecutionReport::success("q", 10.0));
    for _ in 0..100 {
        if !store.is_empty() && !guard.synchronizer().is_in_flight() {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(store.len(), 1);
    assert_eq!(guard.counters().get(SYNC_SUCCESSES), 1);
}
