//! Status backing store over the topic-backed log.
//!
//! [`StatusStore`] gives every process in a runner fleet a consistent,
//! crash-recoverable view of each runner's lifecycle status using one
//! compacted topic as the single source of truth.
//!
//! # Echo-Read Design
//!
//! `put()` serializes the status and appends it to the log asynchronously;
//! the replay task independently fetches every record — including ones this
//! instance produced — and routes it to the driver task, which is the only
//! writer of the cache visible to `get()`. A write is therefore never
//! visible until it has round-tripped through the log, and `get()` may lag
//! a concurrent `put()`.
//!
//! # Single-Writer Driver
//!
//! All cache mutation happens on one driver task per store. Application
//! tasks submit put-intents through a channel; replayed records arrive on
//! the same channel, so the driver applies both in a single total order
//! with no shared lock. Reads go through a [`DashMap`] mirror that only the
//! driver writes.
//!
//! # Safe Writes
//!
//! Every put attempt takes a ticket from its cache entry's monotonically
//! increasing sequence before the send is issued. When a send fails with a
//! retriable error, the retry loop first re-validates that the entry's
//! sequence still equals the ticket; if a fresher put has advanced it, the
//! stale retry is abandoned silently. This prevents a slow, retried write
//! for a key from clobbering a newer value written after the retry was
//! queued.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use backon::BackoffBuilder;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, trace, warn};

use crate::client::{LogClientFactory, RecordProducer, TopicAdmin};
use crate::config::{ConsumerOptions, ProducerOptions, StoreConfig};
use crate::error::StoreError;
use crate::log::{EnsureTopic, LogSender, RecordSink, TopicLog};
use crate::retry::send_policy;
use crate::status::{decode_status, encode_status, parse_status_key, status_key, RunnerStatus};
use crate::types::{LogRecord, TopicSpec};

/// Events consumed by the driver task, in submission order.
enum StoreEvent {
    /// A put-intent from an application task.
    Put(RunnerStatus),
    /// A record replayed from the log.
    Record(LogRecord),
    /// Ack once every event ahead of this one has been applied.
    Barrier(oneshot::Sender<()>),
    /// Ack with the flush outcome once all outstanding sends have settled
    /// and the producer has been flushed.
    Flush(oneshot::Sender<Result<(), StoreError>>),
    /// Stop the driver.
    Shutdown,
}

/// Record sink that routes replayed records onto the driver's channel.
struct ChannelSink {
    events: mpsc::UnboundedSender<StoreEvent>,
}

#[async_trait]
impl RecordSink for ChannelSink {
    async fn deliver(&self, record: LogRecord) {
        if self.events.send(StoreEvent::Record(record)).is_err() {
            warn!("discarding replayed record; store driver is gone");
        }
    }
}

/// Per-runner write bookkeeping. Created lazily on first put or first
/// replayed record for the key; lives for the store's process lifetime.
/// Never exposed outside the store.
struct CacheEntry {
    /// Monotonically increasing write sequence. Shared with in-flight send
    /// tasks so their staleness checks see the freshest ticket; only the
    /// driver advances it.
    sequence: Arc<AtomicU64>,
}

impl CacheEntry {
    fn new() -> Self {
        Self {
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Advance the sequence and return the new value as this attempt's
    /// ticket.
    fn increment(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Log-backed store of runner statuses.
///
/// Create with [`configure`](StatusStore::configure), then drive through
/// `start`/`put`/`get`/`flush`/`stop`. Not designed for restart-in-place:
/// each process run starts and stops the store exactly once.
pub struct StatusStore<F: LogClientFactory> {
    config: StoreConfig,
    log: TopicLog<F>,
    events: mpsc::UnboundedSender<StoreEvent>,
    intake: Option<mpsc::UnboundedReceiver<StoreEvent>>,
    visible: Arc<DashMap<String, RunnerStatus>>,
    driver: Option<JoinHandle<()>>,
}

impl<F: LogClientFactory> StatusStore<F> {
    /// Validate the configuration and assemble the store. No I/O happens
    /// here; client handles open at [`start`](StatusStore::start).
    pub fn configure(
        config: StoreConfig,
        factory: F,
        admin: Arc<dyn TopicAdmin>,
    ) -> Result<Self, StoreError> {
        config.validate()?;

        let spec = TopicSpec::define(&config.topic)
            .compacted()
            .partitions(config.partitions)
            .replication_factor(config.replication_factor)
            .build();
        let initializer = Arc::new(EnsureTopic::new(admin, spec));

        let (events, intake) = mpsc::unbounded_channel();
        let sink = Arc::new(ChannelSink {
            events: events.clone(),
        });
        let log = TopicLog::new(
            &config.topic,
            factory,
            ProducerOptions::default(),
            ConsumerOptions::default(),
            initializer,
            sink,
        );

        Ok(Self {
            config,
            log,
            events,
            intake: Some(intake),
            visible: Arc::new(DashMap::new()),
            driver: None,
        })
    }

    /// Start the backing log and the driver task.
    ///
    /// By the time this returns, every status committed to the log before
    /// the call is visible via [`get`](StatusStore::get).
    pub async fn start(&mut self) -> Result<(), StoreError> {
        self.log.start().await?;

        let intake = self.intake.take().ok_or_else(|| {
            StoreError::InvalidState("status store was already started".to_string())
        })?;
        let driver = Driver {
            entries: HashMap::new(),
            visible: self.visible.clone(),
            sender: self.log.sender()?,
            sends: JoinSet::new(),
        };
        self.driver = Some(tokio::spawn(driver.run(intake)));

        // Catch-up records are queued ahead of this barrier, so they are
        // applied before start returns.
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send_event(StoreEvent::Barrier(ack_tx))?;
        ack_rx
            .await
            .map_err(|_| StoreError::InvalidState("store driver exited during start".to_string()))?;

        info!(topic = %self.config.topic, runner_id = %self.config.runner_id, "status store started");
        Ok(())
    }

    /// Current status of a runner, or `None` if unknown or tombstoned.
    ///
    /// Non-blocking; may lag a concurrent `put` that has not yet round-
    /// tripped through the log.
    pub fn get(&self, runner_id: &str) -> Option<RunnerStatus> {
        self.visible.get(runner_id).map(|entry| entry.clone())
    }

    /// Enqueue a status update.
    ///
    /// Fire-and-forget: the store guarantees the intent is enqueued, not
    /// that it is delivered. A destroyed status is written as a tombstone.
    /// Outside the started lifecycle the update is logged and dropped.
    pub fn put(&self, status: RunnerStatus) {
        if self.intake.is_some() {
            warn!("discarding status update; status store is not started");
            return;
        }
        if self.events.send(StoreEvent::Put(status)).is_err() {
            warn!("discarding status update; store driver is gone");
        }
    }

    /// Block until every enqueued put has been issued and the producer has
    /// no pending unsent records. No timeout: deadline enforcement belongs
    /// to the caller.
    ///
    /// Errors with `InvalidState` outside the started lifecycle, and
    /// surfaces a producer flush failure instead of claiming the barrier
    /// held.
    pub async fn flush(&self) -> Result<(), StoreError> {
        if self.intake.is_some() {
            return Err(StoreError::InvalidState(
                "status store is not started".to_string(),
            ));
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send_event(StoreEvent::Flush(ack_tx))?;
        ack_rx
            .await
            .map_err(|_| StoreError::InvalidState("store driver exited during flush".to_string()))?
    }

    /// Stop the backing log, then the driver. Outstanding send retries are
    /// aborted. Idempotent, and safe after a failed `start`.
    pub async fn stop(&mut self) {
        self.log.stop().await;
        if let Some(driver) = self.driver.take() {
            let _ = self.events.send(StoreEvent::Shutdown);
            if let Err(err) = driver.await {
                error!(error = %err, "store driver terminated abnormally");
            }
        }
        info!(topic = %self.config.topic, "status store stopped");
    }

    fn send_event(&self, event: StoreEvent) -> Result<(), StoreError> {
        self.events
            .send(event)
            .map_err(|_| StoreError::InvalidState("status store is not running".to_string()))
    }
}

/// The store's single writer. Sole mutator of the map reads go through;
/// spawns one send task per put whose first attempt failed.
struct Driver<P: RecordProducer> {
    entries: HashMap<String, CacheEntry>,
    visible: Arc<DashMap<String, RunnerStatus>>,
    sender: LogSender<P>,
    sends: JoinSet<()>,
}

impl<P: RecordProducer> Driver<P> {
    async fn run(mut self, mut intake: mpsc::UnboundedReceiver<StoreEvent>) {
        while let Some(event) = intake.recv().await {
            match event {
                StoreEvent::Put(status) => self.handle_put(status).await,
                StoreEvent::Record(record) => self.apply_record(record),
                StoreEvent::Barrier(ack) => {
                    let _ = ack.send(());
                }
                StoreEvent::Flush(ack) => {
                    self.drain_sends().await;
                    let outcome = self.sender.flush().await;
                    if let Err(err) = &outcome {
                        error!(error = %err, "failed to flush producer");
                    }
                    let _ = ack.send(outcome.map_err(StoreError::from));
                }
                StoreEvent::Shutdown => break,
            }
        }
        // Dropping the JoinSet aborts any send still retrying.
    }

    /// Take a ticket, serialize, and issue the send.
    ///
    /// The first attempt is awaited here, so sequential puts reach the log
    /// in submission order (the producer allows one in-flight request
    /// anyway). Only a retriable failure hands off to a background retry
    /// task, whose later attempts may legitimately reorder — that is what
    /// the staleness ticket guards against.
    async fn handle_put(&mut self, status: RunnerStatus) {
        let entry = self
            .entries
            .entry(status.runner_id().to_string())
            .or_insert_with(CacheEntry::new);
        let ticket = entry.increment();
        let sequence = entry.sequence.clone();

        // Destroyed runners are written as tombstones so compaction
        // eventually purges them.
        let value = if status.is_destroyed() {
            None
        } else {
            match encode_status(&status) {
                Ok(bytes) => Some(bytes),
                Err(err) => {
                    error!(runner_id = %status.runner_id(), error = %err, "failed to serialize status");
                    return;
                }
            }
        };

        let key = status_key(status.runner_id());
        match self.sender.send(&key, value.clone()).await {
            // The visible update arrives later via replay, not here.
            Ok(_) => {}
            Err(err) if err.is_retriable() => {
                warn!(key = %key, error = %err, "retriable failure writing status; scheduling retry");
                let sender = self.sender.clone();
                let visible = self.visible.clone();
                self.sends
                    .spawn(retry_send(sender, key, value, status, ticket, sequence, visible));
            }
            Err(err) => {
                // No delivery guarantee beyond "enqueued": log and drop.
                error!(key = %key, error = %err, "failed to write status update");
            }
        }
    }

    /// Wait for every outstanding send task to settle.
    async fn drain_sends(&mut self) {
        while self.sends.join_next().await.is_some() {}
    }

    /// Apply one replayed record to the cache. The only path that changes
    /// what `get` returns.
    fn apply_record(&mut self, record: LogRecord) {
        let Some(runner_id) = parse_status_key(&record.key) else {
            warn!(key = %record.key, "discarding record with unrecognized key");
            return;
        };
        let runner_id = runner_id.to_string();
        self.entries
            .entry(runner_id.clone())
            .or_insert_with(CacheEntry::new);

        match &record.value {
            None => {
                trace!(runner_id = %runner_id, offset = %record.offset, "applying tombstone");
                self.visible.remove(&runner_id);
            }
            Some(value) => match decode_status(&runner_id, value) {
                Ok(status) => {
                    trace!(runner_id = %runner_id, state = %status.state(), offset = %record.offset, "applying status update");
                    self.visible.insert(runner_id, status);
                }
                Err(err) => {
                    // Never halts replay; the record is simply skipped.
                    error!(runner_id = %runner_id, offset = %record.offset, error = %err, "failed to decode status record");
                }
            },
        }
    }
}

/// Re-send a status append whose first attempt failed with a retriable
/// error, until the write lands or a fresher write for the same key
/// supersedes this attempt's ticket.
async fn retry_send<P: RecordProducer>(
    sender: LogSender<P>,
    key: String,
    value: Option<Bytes>,
    status: RunnerStatus,
    ticket: u64,
    sequence: Arc<AtomicU64>,
    visible: Arc<DashMap<String, RunnerStatus>>,
) {
    let mut delays = send_policy().build();
    // Attempt 1 was the synchronous send in `handle_put`.
    let mut attempt: u64 = 1;
    loop {
        if !can_write_safely(&visible, &status, ticket, &sequence) {
            debug!(key = %key, ticket, "abandoning superseded status write");
            return;
        }
        let Some(delay) = delays.next() else {
            error!(key = %key, attempt, "retry policy exhausted; dropping status write");
            return;
        };
        tokio::time::sleep(delay).await;
        // A fresher write may have landed while we slept.
        if !can_write_safely(&visible, &status, ticket, &sequence) {
            debug!(key = %key, ticket, "abandoning superseded status write");
            return;
        }

        attempt += 1;
        match sender.send(&key, value.clone()).await {
            // The visible update arrives later via replay, not here.
            Ok(_) => return,
            Err(err) if err.is_retriable() => {
                warn!(key = %key, attempt, error = %err, "retriable failure writing status; backing off");
            }
            Err(err) => {
                // No delivery guarantee beyond "enqueued": log and drop.
                error!(key = %key, error = %err, "failed to write status update");
                return;
            }
        }
    }
}

/// A retry may proceed only while the entry's sequence still equals this
/// attempt's ticket and the visible value, if any, still belongs to the
/// same runner.
fn can_write_safely(
    visible: &DashMap<String, RunnerStatus>,
    status: &RunnerStatus,
    ticket: u64,
    sequence: &AtomicU64,
) -> bool {
    if sequence.load(Ordering::SeqCst) != ticket {
        return false;
    }
    match visible.get(status.runner_id()) {
        Some(current) => current.runner_id() == status.runner_id(),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_entry_tickets_are_monotonic() {
        let entry = CacheEntry::new();
        assert_eq!(entry.increment(), 1);
        assert_eq!(entry.increment(), 2);
        assert_eq!(entry.sequence.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn stale_ticket_fails_safe_write_check() {
        use crate::status::{RunnerState, RunnerStatus};

        let visible = DashMap::new();
        let sequence = AtomicU64::new(1);
        let status = RunnerStatus::new("r1", RunnerState::Running, None);
        assert!(can_write_safely(&visible, &status, 1, &sequence));

        // A fresher put advanced the sequence past this attempt's ticket.
        sequence.store(2, Ordering::SeqCst);
        assert!(!can_write_safely(&visible, &status, 1, &sequence));
    }
}
