//! Tests for the safe-write protocol: sequence tickets, retry, and
//! supersession.
//!
//! These run with paused time so the backoff sleeps inside the retry loop
//! auto-advance and the tests stay fast and deterministic.

use std::sync::Arc;
use std::time::Duration;

use statelog::prelude::*;

fn store_on(broker: &MemoryBroker, runner_id: &str) -> StatusStore<MemoryBroker> {
    let config = StoreConfig {
        runner_id: runner_id.to_string(),
        ..StoreConfig::default()
    };
    StatusStore::configure(config, broker.clone(), Arc::new(broker.admin()))
        .expect("configure must succeed")
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(30), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test(start_paused = true)]
async fn superseded_retry_is_abandoned() {
    let broker = MemoryBroker::new();
    let mut store = store_on(&broker, "w");
    store.start().await.unwrap();

    // First attempt for the RUNNING write fails and enters backoff.
    broker.fail_next_sends(1);
    store.put(RunnerStatus::new("r1", RunnerState::Running, None));
    tokio::time::sleep(Duration::from_millis(10)).await;

    // A fresher write advances the entry's sequence past the old ticket.
    store.put(RunnerStatus::new("r1", RunnerState::Failed, None));
    store.flush().await.unwrap();

    // Only the fresh write reached the log; the stale retry was dropped.
    let tp = TopicPartition::new("runner_status", 0);
    assert_eq!(broker.end_offset(&tp).await, Some(Offset::new(1)));

    wait_until(|| store.get("r1").is_some()).await;
    assert_eq!(
        store.get("r1"),
        Some(RunnerStatus::new("r1", RunnerState::Failed, None))
    );

    store.stop().await;
}

#[tokio::test(start_paused = true)]
async fn retriable_failures_are_retried_until_the_write_lands() {
    let broker = MemoryBroker::new();
    let mut store = store_on(&broker, "w");
    store.start().await.unwrap();

    broker.fail_next_sends(3);
    store.put(RunnerStatus::new("r1", RunnerState::Running, None));
    store.flush().await.unwrap();

    let tp = TopicPartition::new("runner_status", 0);
    assert_eq!(broker.end_offset(&tp).await, Some(Offset::new(1)));
    wait_until(|| store.get("r1").is_some()).await;

    store.stop().await;
}

#[tokio::test(start_paused = true)]
async fn fatal_send_failure_is_dropped_without_poisoning_the_store() {
    let broker = MemoryBroker::new();
    let mut store = store_on(&broker, "w");
    store.start().await.unwrap();

    broker.fail_next_sends_fatal(1);
    store.put(RunnerStatus::new("r1", RunnerState::Running, None));
    store.flush().await.unwrap();

    // The write was dropped, not retried.
    let tp = TopicPartition::new("runner_status", 0);
    assert_eq!(broker.end_offset(&tp).await, Some(Offset::new(0)));
    assert_eq!(store.get("r1"), None);

    // The store keeps working for subsequent writes.
    store.put(RunnerStatus::new("r2", RunnerState::Running, None));
    store.flush().await.unwrap();
    wait_until(|| store.get("r2").is_some()).await;

    store.stop().await;
}

#[tokio::test(start_paused = true)]
async fn each_put_takes_its_own_ticket() {
    let broker = MemoryBroker::new();
    let mut store = store_on(&broker, "w");
    store.start().await.unwrap();

    // A burst of puts for one runner: every attempt is issued, none is
    // suppressed, and the last one by log order wins.
    store.put(RunnerStatus::new("r1", RunnerState::Running, None));
    store.put(RunnerStatus::new("r1", RunnerState::Failed, None));
    store.put(RunnerStatus::new("r1", RunnerState::Shutdown, None));
    store.flush().await.unwrap();

    let tp = TopicPartition::new("runner_status", 0);
    assert_eq!(broker.end_offset(&tp).await, Some(Offset::new(3)));

    let expected = RunnerStatus::new("r1", RunnerState::Shutdown, None);
    wait_until(|| store.get("r1") == Some(expected.clone())).await;

    store.stop().await;
}
