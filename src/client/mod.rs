//! Broker client seams for the topic-backed log.
//!
//! These traits abstract the broker's produce/consume/admin primitives,
//! allowing for:
//! - different broker bindings (networked client, in-memory for testing)
//! - easier testing with fault injection
//! - clear separation between log semantics and client plumbing
//!
//! # Available Implementations
//!
//! - [`MemoryBroker`]: in-memory broker for tests and local development
//! - networked broker clients bind the same traits outside this crate
//!
//! # Trait Hierarchy
//!
//! - [`RecordProducer`]: append records; a send resolves exactly once with
//!   either [`RecordMetadata`] or a typed [`SendError`]
//! - [`RecordConsumer`]: fetch, position, and commit; exclusively owned by
//!   the log channel's replay task once started
//! - [`LogClientFactory`]: opens producer/consumer handles from tuning
//!   options at start time
//! - [`TopicAdmin`]: one-shot topic provisioning, injected as a collaborator

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::{ConsumerOptions, ProducerOptions};
use crate::error::{SendError, StoreError};
use crate::types::{LogRecord, Offset, PartitionId, RecordMetadata, TopicPartition, TopicSpec};

mod memory;

pub use memory::{MemoryBroker, MemoryConsumer, MemoryProducer, MemoryTopicAdmin};

/// Appends records to the log.
#[async_trait]
pub trait RecordProducer: Send + Sync + 'static {
    /// Append one record. A `None` value writes a tombstone.
    ///
    /// Resolves exactly once, with broker-assigned metadata on success or a
    /// typed error on failure. Retrying is the caller's decision.
    async fn send(
        &self,
        topic: &str,
        key: &str,
        value: Option<Bytes>,
    ) -> Result<RecordMetadata, SendError>;

    /// Block until the producer has no pending unsent records.
    async fn flush(&self) -> Result<(), SendError>;
}

/// Fetches records from the log.
///
/// After `TopicLog::start` returns, the consumer handle is exclusively
/// owned by the replay task; no other task may fetch or commit on it. The
/// `&mut self` receivers encode that single ownership.
#[async_trait]
pub trait RecordConsumer: Send + 'static {
    /// Partition metadata for a topic, or `None` if the broker does not
    /// (yet) know the topic.
    async fn partitions_for(&self, topic: &str) -> Result<Option<Vec<PartitionId>>, StoreError>;

    /// Replace this consumer's assignment with the given partitions and
    /// establish initial positions for them.
    async fn assign(&mut self, partitions: Vec<TopicPartition>) -> Result<(), StoreError>;

    /// End offset (offset of the next record to be written) for each given
    /// partition, captured at call time.
    async fn end_offsets(
        &self,
        partitions: &[TopicPartition],
    ) -> Result<HashMap<TopicPartition, Offset>, StoreError>;

    /// Offset of the next record this consumer will fetch from a partition.
    async fn position(&mut self, tp: &TopicPartition) -> Result<Offset, StoreError>;

    /// One fetch. Waits until records are available or the timeout elapses;
    /// `None` waits unboundedly (the caller cancels by dropping the future).
    async fn poll(&mut self, timeout: Option<Duration>) -> Result<Vec<LogRecord>, StoreError>;

    /// Synchronously commit this consumer's current positions.
    async fn commit(&mut self) -> Result<(), StoreError>;
}

/// Opens client handles against one broker.
pub trait LogClientFactory: Send + Sync + 'static {
    type Producer: RecordProducer;
    type Consumer: RecordConsumer;

    fn producer(&self, options: &ProducerOptions) -> Result<Self::Producer, StoreError>;

    fn consumer(&self, options: &ConsumerOptions) -> Result<Self::Consumer, StoreError>;
}

/// Topic provisioning collaborator.
///
/// The store never implements topic/ACL CRUD itself; it pushes one topic
/// definition through this seam on first start.
#[async_trait]
pub trait TopicAdmin: Send + Sync + 'static {
    /// Create the topic if it does not exist.
    ///
    /// Returns the names of topics actually created; an already-existing
    /// topic is success with an empty set.
    async fn ensure_topic(&self, spec: &TopicSpec) -> Result<BTreeSet<String>, StoreError>;
}
