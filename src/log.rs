//! Generic append/replay channel over one durable topic.
//!
//! [`TopicLog`] binds a producer, a consumer, a one-time topic initializer,
//! and a per-record sink to a single topic. Appends go through a cheap
//! [`LogSender`] handle; reads happen on a dedicated replay task that owns
//! the consumer exclusively and delivers every record — including ones
//! this process produced — to the sink in fetch order.
//!
//! # Lifecycle
//!
//! ```text
//! NotStarted -> Initializing -> CatchingUp -> Running -> Stopping -> Stopped
//! ```
//!
//! `start()` runs the initializer, opens the client handles, waits up to 30
//! seconds for partition metadata, assigns every discovered partition, and
//! performs a synchronous catch-up read before spawning the replay task. A
//! fatal failure during `Initializing` aborts the transition and leaves the
//! channel unusable; `stop()` is safe to call regardless of how far the
//! channel got, and at most once does real work.
//!
//! # Replay Semantics
//!
//! Each fetch commits the consumer's new position *before* dispatching the
//! fetched records to the sink. A crash between the commit and the last
//! dispatch can therefore skip records on the next start when a consumer
//! group is configured: replay is at-most-once, trading redelivery away for
//! never re-observing a record.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::client::{LogClientFactory, RecordConsumer, RecordProducer, TopicAdmin};
use crate::config::{ConsumerOptions, ProducerOptions};
use crate::constants::{CREATE_TOPIC_TIMEOUT, METADATA_RETRY_MAX_SLEEP, METADATA_RETRY_MIN_SLEEP};
use crate::error::{SendError, StoreError};
use crate::types::{LogRecord, RecordMetadata, TopicPartition, TopicSpec};

/// Receives every record the replay task fetches, in fetch order.
///
/// For the status store this is the only path that makes a write visible:
/// a local append never mutates caller-visible state directly.
#[async_trait]
pub trait RecordSink: Send + Sync + 'static {
    async fn deliver(&self, record: LogRecord);
}

/// One-time initialization run at the start of the channel lifecycle,
/// before client handles are opened. Typically [`EnsureTopic`].
#[async_trait]
pub trait LogInitializer: Send + Sync + 'static {
    async fn run(&self) -> Result<(), StoreError>;
}

/// Initializer that pushes a topic definition through the admin seam.
pub struct EnsureTopic {
    admin: Arc<dyn TopicAdmin>,
    spec: TopicSpec,
}

impl EnsureTopic {
    pub fn new(admin: Arc<dyn TopicAdmin>, spec: TopicSpec) -> Self {
        Self { admin, spec }
    }
}

#[async_trait]
impl LogInitializer for EnsureTopic {
    async fn run(&self) -> Result<(), StoreError> {
        debug!(topic = %self.spec.name, "ensuring backing topic exists");
        let created = self.admin.ensure_topic(&self.spec).await?;
        if created.contains(&self.spec.name) {
            info!(
                topic = %self.spec.name,
                partitions = self.spec.partitions,
                replication_factor = self.spec.replication_factor,
                "created compacted backing topic"
            );
        }
        Ok(())
    }
}

/// Lifecycle state of a [`TopicLog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogState {
    NotStarted,
    Initializing,
    CatchingUp,
    Running,
    Stopping,
    Stopped,
}

/// Append/replay channel bound to one topic.
pub struct TopicLog<F: LogClientFactory> {
    topic: String,
    factory: F,
    producer_options: ProducerOptions,
    consumer_options: ConsumerOptions,
    initializer: Arc<dyn LogInitializer>,
    sink: Arc<dyn RecordSink>,
    state: LogState,
    producer: Option<Arc<F::Producer>>,
    stop_tx: Option<watch::Sender<bool>>,
    replay: Option<JoinHandle<()>>,
}

impl<F: LogClientFactory> TopicLog<F> {
    pub fn new(
        topic: impl Into<String>,
        factory: F,
        producer_options: ProducerOptions,
        consumer_options: ConsumerOptions,
        initializer: Arc<dyn LogInitializer>,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        Self {
            topic: topic.into(),
            factory,
            producer_options,
            consumer_options,
            initializer,
            sink,
            state: LogState::NotStarted,
            producer: None,
            stop_tx: None,
            replay: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LogState {
        self.state
    }

    /// Topic this channel is bound to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Handle for appending to this channel. Available once started.
    pub fn sender(&self) -> Result<LogSender<F::Producer>, StoreError> {
        let producer = self.producer.clone().ok_or_else(|| {
            StoreError::InvalidState(format!(
                "log channel for topic {:?} is not started",
                self.topic
            ))
        })?;
        Ok(LogSender {
            topic: self.topic.clone(),
            producer,
        })
    }

    /// Start the channel: initialize the topic, open client handles, wait
    /// for partition metadata, catch up to the end of the log, and spawn
    /// the replay task.
    ///
    /// Returns once the sink has observed every record present in the log
    /// before the call.
    pub async fn start(&mut self) -> Result<(), StoreError> {
        if self.state != LogState::NotStarted {
            return Err(StoreError::InvalidState(format!(
                "log channel for topic {:?} was already started",
                self.topic
            )));
        }
        self.state = LogState::Initializing;
        info!(topic = %self.topic, "starting topic-backed log");

        // Initializer failures are logged, not fatal: if the topic truly is
        // missing the metadata wait below surfaces the connectivity error.
        if let Err(err) = self.initializer.run().await {
            warn!(topic = %self.topic, error = %err, "topic initializer failed");
        }

        let producer = self.factory.producer(&self.producer_options)?;
        let mut consumer = self.factory.consumer(&self.consumer_options)?;

        let assignment = self.wait_for_partition_metadata(&consumer).await?;
        consumer.assign(assignment.clone()).await?;
        self.producer = Some(Arc::new(producer));

        self.state = LogState::CatchingUp;
        read_to_log_end(&mut consumer, &assignment, &self.sink).await?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let topic = self.topic.clone();
        let sink = self.sink.clone();
        self.replay = Some(tokio::spawn(replay_loop(consumer, sink, stop_rx, topic)));
        self.stop_tx = Some(stop_tx);
        self.state = LogState::Running;

        info!(topic = %self.topic, partitions = assignment.len(), "topic-backed log started");
        Ok(())
    }

    /// Signal the replay task to exit, wait for it, and drop the client
    /// handles. Safe to call after a failed `start()`, and idempotent.
    pub async fn stop(&mut self) {
        if self.state == LogState::Stopped {
            return;
        }
        info!(topic = %self.topic, "stopping topic-backed log");
        self.state = LogState::Stopping;

        if let Some(stop_tx) = self.stop_tx.take() {
            // Non-blocking wake; the replay task re-checks the flag and
            // exits even if it was parked inside an unbounded fetch.
            let _ = stop_tx.send(true);
        }
        if let Some(replay) = self.replay.take() {
            if let Err(err) = replay.await {
                error!(topic = %self.topic, error = %err, "replay task terminated abnormally");
            }
        }
        self.producer = None;
        self.state = LogState::Stopped;
        info!(topic = %self.topic, "stopped topic-backed log");
    }

    /// Poll for partition metadata until it appears or the creation timeout
    /// elapses. The sleep between lookups ramps up with elapsed time.
    async fn wait_for_partition_metadata(
        &self,
        consumer: &F::Consumer,
    ) -> Result<Vec<TopicPartition>, StoreError> {
        let started = Instant::now();
        loop {
            match consumer.partitions_for(&self.topic).await? {
                Some(partitions) if !partitions.is_empty() => {
                    return Ok(partitions
                        .into_iter()
                        .map(|partition| TopicPartition::new(self.topic.clone(), partition))
                        .collect());
                }
                _ => {}
            }
            let elapsed = started.elapsed();
            if elapsed >= CREATE_TOPIC_TIMEOUT {
                return Err(StoreError::Connectivity(format!(
                    "could not look up partition metadata for topic {:?} in the allotted \
                     period; this could indicate a connectivity issue, unavailable topic \
                     partitions, or a topic that took too long to create",
                    self.topic
                )));
            }
            let backoff = elapsed.clamp(METADATA_RETRY_MIN_SLEEP, METADATA_RETRY_MAX_SLEEP);
            tokio::time::sleep(backoff).await;
        }
    }
}

/// Cheap handle for appending to a [`TopicLog`].
pub struct LogSender<P: RecordProducer> {
    topic: String,
    producer: Arc<P>,
}

impl<P: RecordProducer> Clone for LogSender<P> {
    fn clone(&self) -> Self {
        Self {
            topic: self.topic.clone(),
            producer: self.producer.clone(),
        }
    }
}

impl<P: RecordProducer> LogSender<P> {
    /// Append one record; `None` writes a tombstone. Resolves exactly once.
    pub async fn send(
        &self,
        key: &str,
        value: Option<Bytes>,
    ) -> Result<RecordMetadata, SendError> {
        self.producer.send(&self.topic, key, value).await
    }

    /// Block until the producer has no pending unsent records.
    pub async fn flush(&self) -> Result<(), SendError> {
        self.producer.flush().await
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// Catch-up read: capture the end offset of every assigned partition, then
/// drive fetches until the consumer's position reaches each captured end.
///
/// Only records present before the call are guaranteed to be delivered;
/// records appended concurrently may or may not be observed.
async fn read_to_log_end<C: RecordConsumer>(
    consumer: &mut C,
    assignment: &[TopicPartition],
    sink: &Arc<dyn RecordSink>,
) -> Result<(), StoreError> {
    trace!("reading to end of status log");
    let mut pending = consumer.end_offsets(assignment).await?;
    trace!(?pending, "captured end offsets");

    while !pending.is_empty() {
        let mut reached = Vec::new();
        let mut lagging = false;
        for (tp, end) in &pending {
            if consumer.position(tp).await? >= *end {
                reached.push(tp.clone());
            } else {
                lagging = true;
                break;
            }
        }
        for tp in reached {
            pending.remove(&tp);
        }
        if lagging {
            // The captured end offsets are known to exist, so an unbounded
            // fetch here cannot hang.
            poll_once(consumer, sink, None).await;
        }
    }
    Ok(())
}

/// One fetch-and-dispatch cycle: fetch a batch, commit the new position,
/// then deliver each record to the sink in fetch order.
///
/// Committing before delivery is deliberate: replay is at-most-once (see
/// the module docs). Fetch errors are logged and swallowed so a transient
/// broker failure never kills the replay loop.
async fn poll_once<C: RecordConsumer>(
    consumer: &mut C,
    sink: &Arc<dyn RecordSink>,
    timeout: Option<std::time::Duration>,
) {
    let records = match consumer.poll(timeout).await {
        Ok(records) => records,
        Err(err) => {
            error!(error = %err, "error polling status log");
            return;
        }
    };
    if let Err(err) = consumer.commit().await {
        error!(error = %err, "error committing consumer position");
    }
    for record in records {
        sink.deliver(record).await;
    }
}

/// Background loop driving the consumer. Exclusive owner of the handle.
async fn replay_loop<C: RecordConsumer>(
    mut consumer: C,
    sink: Arc<dyn RecordSink>,
    mut stop_rx: watch::Receiver<bool>,
    topic: String,
) {
    trace!(topic, "replay task started");
    loop {
        if *stop_rx.borrow() {
            break;
        }
        tokio::select! {
            // A wake that isn't a stop request just re-enters the loop.
            _ = stop_rx.changed() => continue,
            () = poll_once(&mut consumer, &sink, None) => {}
        }
    }
    trace!(topic, "replay task exiting");
}
