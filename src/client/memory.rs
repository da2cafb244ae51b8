//! In-memory broker for tests and local development.
//!
//! This provides a full-featured in-memory implementation of the client
//! seams — [`RecordProducer`], [`RecordConsumer`], [`LogClientFactory`],
//! and [`TopicAdmin`] — so the whole store can run without an external
//! broker.
//!
//! **WARNING**: This is for testing/development only. Records live in
//! process memory, compaction never runs, and data is lost on drop.
//!
//! # Fault Injection
//!
//! Tests can make the next N sends fail with retriable or fatal errors via
//! [`MemoryBroker::fail_next_sends`] and
//! [`MemoryBroker::fail_next_sends_fatal`], which exercises the safe-write
//! retry protocol end to end. [`MemoryBroker::fail_next_flushes`] does the
//! same for producer flushes.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Notify, RwLock};
use tracing::debug;

use super::{LogClientFactory, RecordConsumer, RecordProducer, TopicAdmin};
use crate::config::{ConsumerOptions, OffsetReset, ProducerOptions};
use crate::error::{SendError, StoreError};
use crate::types::{LogRecord, Offset, PartitionId, RecordMetadata, TopicPartition, TopicSpec};

/// A stored record. Offsets are implicit: a record's offset is its index
/// in the partition's vector.
#[derive(Debug, Clone)]
struct StoredRecord {
    key: String,
    value: Option<Bytes>,
}

/// Log for a single partition.
#[derive(Debug, Clone, Default)]
struct PartitionData {
    records: Vec<StoredRecord>,
}

/// One topic: one log per partition. The cleanup policy is not modeled;
/// compaction never runs here.
#[derive(Debug, Clone)]
struct TopicData {
    partitions: Vec<PartitionData>,
}

/// Shared broker state.
struct BrokerInner {
    /// Topic name -> topic data.
    topics: RwLock<HashMap<String, TopicData>>,
    /// (group, partition) -> committed position.
    committed: RwLock<HashMap<(String, TopicPartition), Offset>>,
    /// Wakes consumers blocked in `poll` when a record is appended.
    appended: Notify,
    /// Remaining sends to fail with a retriable error.
    retriable_failures: AtomicUsize,
    /// Remaining sends to fail with a fatal error.
    fatal_failures: AtomicUsize,
    /// Remaining producer flushes to fail.
    flush_failures: AtomicUsize,
}

impl BrokerInner {
    fn take_injected_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// In-memory broker.
///
/// Cheap to clone; all clones share the same state. Also acts as the
/// [`LogClientFactory`] for its own producers and consumers.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                topics: RwLock::new(HashMap::new()),
                committed: RwLock::new(HashMap::new()),
                appended: Notify::new(),
                retriable_failures: AtomicUsize::new(0),
                fatal_failures: AtomicUsize::new(0),
                flush_failures: AtomicUsize::new(0),
            }),
        }
    }

    /// Admin handle for this broker.
    pub fn admin(&self) -> MemoryTopicAdmin {
        MemoryTopicAdmin {
            inner: self.inner.clone(),
        }
    }

    /// Fail the next `n` sends with a retriable error.
    pub fn fail_next_sends(&self, n: usize) {
        self.inner.retriable_failures.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` sends with a fatal error.
    pub fn fail_next_sends_fatal(&self, n: usize) {
        self.inner.fatal_failures.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` producer flushes with a retriable error.
    pub fn fail_next_flushes(&self, n: usize) {
        self.inner.flush_failures.store(n, Ordering::SeqCst);
    }

    /// End offset of a partition, or `None` if it does not exist.
    pub async fn end_offset(&self, tp: &TopicPartition) -> Option<Offset> {
        let topics = self.inner.topics.read().await;
        let partition = topics
            .get(&tp.topic)?
            .partitions
            .get(tp.partition.value() as usize)?;
        Some(Offset::new(partition.records.len() as i64))
    }

    /// Committed position of a consumer group on a partition.
    pub async fn committed(&self, group: &str, tp: &TopicPartition) -> Option<Offset> {
        let committed = self.inner.committed.read().await;
        committed.get(&(group.to_string(), tp.clone())).copied()
    }
}

impl LogClientFactory for MemoryBroker {
    type Producer = MemoryProducer;
    type Consumer = MemoryConsumer;

    fn producer(&self, _options: &ProducerOptions) -> Result<MemoryProducer, StoreError> {
        Ok(MemoryProducer {
            inner: self.inner.clone(),
        })
    }

    fn consumer(&self, options: &ConsumerOptions) -> Result<MemoryConsumer, StoreError> {
        Ok(MemoryConsumer {
            inner: self.inner.clone(),
            options: options.clone(),
            assignment: Vec::new(),
            positions: HashMap::new(),
        })
    }
}

/// Producer handle against a [`MemoryBroker`].
pub struct MemoryProducer {
    inner: Arc<BrokerInner>,
}

impl MemoryProducer {
    fn route(key: &str, partitions: usize) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % partitions as u64) as usize
    }
}

#[async_trait]
impl RecordProducer for MemoryProducer {
    async fn send(
        &self,
        topic: &str,
        key: &str,
        value: Option<Bytes>,
    ) -> Result<RecordMetadata, SendError> {
        if BrokerInner::take_injected_failure(&self.inner.fatal_failures) {
            return Err(SendError::Fatal("injected fatal failure".to_string()));
        }
        if BrokerInner::take_injected_failure(&self.inner.retriable_failures) {
            return Err(SendError::Retriable("injected retriable failure".to_string()));
        }

        let metadata = {
            let mut topics = self.inner.topics.write().await;
            let topic_data = topics
                .get_mut(topic)
                .ok_or_else(|| SendError::Fatal(format!("unknown topic {topic:?}")))?;
            let index = Self::route(key, topic_data.partitions.len());
            let partition = &mut topic_data.partitions[index];
            let offset = Offset::new(partition.records.len() as i64);
            partition.records.push(StoredRecord {
                key: key.to_string(),
                value,
            });
            RecordMetadata {
                partition: PartitionId::new(index as i32),
                offset,
            }
        };

        self.inner.appended.notify_waiters();
        Ok(metadata)
    }

    async fn flush(&self) -> Result<(), SendError> {
        if BrokerInner::take_injected_failure(&self.inner.flush_failures) {
            return Err(SendError::Retriable("injected flush failure".to_string()));
        }
        // Sends are applied synchronously, so nothing is ever buffered.
        Ok(())
    }
}

/// Consumer handle against a [`MemoryBroker`].
pub struct MemoryConsumer {
    inner: Arc<BrokerInner>,
    options: ConsumerOptions,
    assignment: Vec<TopicPartition>,
    positions: HashMap<TopicPartition, Offset>,
}

impl MemoryConsumer {
    /// Collect every record past the current positions, advancing them.
    async fn fetch_available(&mut self) -> Vec<LogRecord> {
        let topics = self.inner.topics.read().await;
        let mut batch = Vec::new();
        for tp in &self.assignment {
            let Some(topic_data) = topics.get(&tp.topic) else {
                continue;
            };
            let Some(partition) = topic_data.partitions.get(tp.partition.value() as usize) else {
                continue;
            };
            let Some(position) = self.positions.get_mut(tp) else {
                continue;
            };
            let start = position.value() as usize;
            for (index, record) in partition.records.iter().enumerate().skip(start) {
                batch.push(LogRecord {
                    topic: tp.topic.clone(),
                    partition: tp.partition,
                    offset: Offset::new(index as i64),
                    key: record.key.clone(),
                    value: record.value.clone(),
                });
            }
            *position = Offset::new(partition.records.len() as i64);
        }
        batch
    }
}

#[async_trait]
impl RecordConsumer for MemoryConsumer {
    async fn partitions_for(&self, topic: &str) -> Result<Option<Vec<PartitionId>>, StoreError> {
        let topics = self.inner.topics.read().await;
        Ok(topics.get(topic).map(|data| {
            (0..data.partitions.len() as i32)
                .map(PartitionId::new)
                .collect()
        }))
    }

    async fn assign(&mut self, partitions: Vec<TopicPartition>) -> Result<(), StoreError> {
        let topics = self.inner.topics.read().await;
        let committed = self.inner.committed.read().await;
        self.positions.clear();
        for tp in &partitions {
            let stored = self
                .options
                .group
                .as_ref()
                .and_then(|group| committed.get(&(group.clone(), tp.clone())).copied());
            let position = match stored {
                Some(offset) => offset,
                None => match self.options.offset_reset {
                    OffsetReset::Earliest => Offset::new(0),
                    OffsetReset::Latest => topics
                        .get(&tp.topic)
                        .and_then(|data| data.partitions.get(tp.partition.value() as usize))
                        .map(|p| Offset::new(p.records.len() as i64))
                        .unwrap_or_default(),
                },
            };
            self.positions.insert(tp.clone(), position);
        }
        self.assignment = partitions;
        Ok(())
    }

    async fn end_offsets(
        &self,
        partitions: &[TopicPartition],
    ) -> Result<HashMap<TopicPartition, Offset>, StoreError> {
        let topics = self.inner.topics.read().await;
        let mut ends = HashMap::new();
        for tp in partitions {
            let partition = topics
                .get(&tp.topic)
                .and_then(|data| data.partitions.get(tp.partition.value() as usize))
                .ok_or_else(|| StoreError::Client(format!("unknown partition {tp}")))?;
            ends.insert(tp.clone(), Offset::new(partition.records.len() as i64));
        }
        Ok(ends)
    }

    async fn position(&mut self, tp: &TopicPartition) -> Result<Offset, StoreError> {
        self.positions
            .get(tp)
            .copied()
            .ok_or_else(|| StoreError::Client(format!("partition {tp} is not assigned")))
    }

    async fn poll(&mut self, timeout: Option<Duration>) -> Result<Vec<LogRecord>, StoreError> {
        loop {
            // Register for the wakeup before scanning, so an append racing
            // with the scan cannot be missed.
            let inner = self.inner.clone();
            let mut notified = std::pin::pin!(inner.appended.notified());
            notified.as_mut().enable();

            let batch = self.fetch_available().await;
            if !batch.is_empty() {
                return Ok(batch);
            }

            match timeout {
                None => notified.await,
                Some(wait) => {
                    if tokio::time::timeout(wait, notified).await.is_err() {
                        return Ok(Vec::new());
                    }
                }
            }
        }
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let Some(group) = self.options.group.clone() else {
            return Ok(());
        };
        let mut committed = self.inner.committed.write().await;
        for (tp, position) in &self.positions {
            committed.insert((group.clone(), tp.clone()), *position);
        }
        Ok(())
    }
}

/// Admin handle against a [`MemoryBroker`].
pub struct MemoryTopicAdmin {
    inner: Arc<BrokerInner>,
}

#[async_trait]
impl TopicAdmin for MemoryTopicAdmin {
    async fn ensure_topic(&self, spec: &TopicSpec) -> Result<BTreeSet<String>, StoreError> {
        if spec.partitions < 1 {
            return Err(StoreError::Admin(format!(
                "topic {:?} must have at least one partition",
                spec.name
            )));
        }
        let mut topics = self.inner.topics.write().await;
        if topics.contains_key(&spec.name) {
            debug!(topic = %spec.name, "topic already exists");
            return Ok(BTreeSet::new());
        }
        topics.insert(
            spec.name.clone(),
            TopicData {
                partitions: vec![PartitionData::default(); spec.partitions as usize],
            },
        );
        debug!(topic = %spec.name, partitions = spec.partitions, "created topic");
        Ok(BTreeSet::from([spec.name.clone()]))
    }
}
