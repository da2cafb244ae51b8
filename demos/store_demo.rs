//! End-to-end status store walkthrough against the in-memory broker.
//!
//! Run with: cargo run --example store_demo

use std::sync::Arc;
use std::time::Duration;

use statelog::prelude::*;
use statelog::telemetry::{init_logging, LogFormat};

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    init_logging(LogFormat::from_env())?;

    let broker = MemoryBroker::new();
    let config = StoreConfig {
        runner_id: "runner-1".to_string(),
        ..StoreConfig::default()
    };

    let mut store = StatusStore::configure(config.clone(), broker.clone(), Arc::new(broker.admin()))?;
    store.start().await?;

    store.put(RunnerStatus::new("runner-1", RunnerState::Running, None));
    store.flush().await?;

    // The update becomes visible once the replay task has echoed it back.
    while store.get("runner-1").is_none() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    println!("runner-1 after echo: {:?}", store.get("runner-1"));

    // A second store on the same topic recovers the state by replay.
    let mut observer = StatusStore::configure(
        StoreConfig {
            runner_id: "runner-2".to_string(),
            ..config
        },
        broker.clone(),
        Arc::new(broker.admin()),
    )?;
    observer.start().await?;
    println!("runner-1 seen by observer: {:?}", observer.get("runner-1"));

    // Destroying a runner writes a tombstone; compaction purges it later.
    store.put(RunnerStatus::new("runner-1", RunnerState::Destroyed, None));
    store.flush().await?;
    while store.get("runner-1").is_some() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    println!("runner-1 after destroy: {:?}", store.get("runner-1"));

    observer.stop().await;
    store.stop().await;
    Ok(())
}
