//! # Statelog
//! Log-backed state persistence for distributed task-runner fleets.
//!
//! This crate gives every process in a runner fleet a consistent,
//! crash-recoverable view of each runner's lifecycle status without a
//! separate database: one compacted topic on a durable, ordered,
//! partitioned log broker is the single source of truth, and each process
//! replays it into an in-memory cache.
//!
//! # Goals
//! - Echo-read consistency: a write becomes visible only after it
//!   round-trips through the log, so every process converges on log order
//! - Crash recovery by replay: a fresh process catches up to the end of
//!   the log before serving reads
//! - Safe writes: per-key sequence tickets stop a slow retried write from
//!   clobbering a fresher one
//! - Pluggable broker: produce/consume/admin primitives sit behind traits,
//!   with an in-memory broker included for tests and development
//!
//! ## Getting started
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use statelog::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     let broker = MemoryBroker::new();
//!     let config = StoreConfig {
//!         runner_id: "runner-1".to_string(),
//!         ..StoreConfig::default()
//!     };
//!
//!     let mut store =
//!         StatusStore::configure(config, broker.clone(), Arc::new(broker.admin()))?;
//!     store.start().await?;
//!
//!     store.put(RunnerStatus::new("runner-1", RunnerState::Running, None));
//!     store.flush().await?;
//!
//!     // Visible once the update has round-tripped through the log.
//!     let status = store.get("runner-1");
//!     println!("runner-1: {status:?}");
//!
//!     store.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! A networked broker plugs in by implementing the [`client`] traits
//! ([`RecordProducer`](client::RecordProducer),
//! [`RecordConsumer`](client::RecordConsumer),
//! [`LogClientFactory`](client::LogClientFactory),
//! [`TopicAdmin`](client::TopicAdmin)) against its client library.
//!
//! ## Architecture
//!
//! - [`log::TopicLog`] — generic append/replay channel over one topic; a
//!   dedicated replay task owns the consumer and delivers every record to a
//!   sink in fetch order
//! - [`store::StatusStore`] — maps [`status::RunnerStatus`] values onto log
//!   records; a single driver task owns all cache mutation
//! - [`client::MemoryBroker`] — in-memory binding of the broker seams with
//!   fault injection for tests

pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod log;
pub mod retry;
pub mod status;
pub mod store;
pub mod telemetry;
pub mod types;

pub mod prelude {
    //! Convenience re-exports for the common path.

    pub use crate::client::{
        LogClientFactory, MemoryBroker, RecordConsumer, RecordProducer, TopicAdmin,
    };
    pub use crate::config::{ConsumerOptions, ProducerOptions, StoreConfig};
    pub use crate::error::{DecodeError, Result, SendError, StoreError};
    pub use crate::log::{LogState, TopicLog};
    pub use crate::status::{RunnerState, RunnerStatus};
    pub use crate::store::StatusStore;
    pub use crate::types::{
        LogRecord, Offset, PartitionId, RecordMetadata, TopicPartition, TopicSpec,
    };

    pub use bytes;
}
