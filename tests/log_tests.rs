//! Tests for the topic-backed log channel: lifecycle, catch-up, and replay
//! ordering.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use statelog::client::{LogClientFactory, MemoryBroker, RecordProducer, TopicAdmin};
use statelog::config::{ConsumerOptions, ProducerOptions};
use statelog::error::StoreError;
use statelog::log::{EnsureTopic, LogInitializer, LogState, RecordSink, TopicLog};
use statelog::types::{LogRecord, Offset, TopicPartition, TopicSpec};

const TOPIC: &str = "runner_status";

/// Sink that records everything it is handed, in delivery order.
#[derive(Default)]
struct CollectingSink {
    records: Mutex<Vec<LogRecord>>,
}

impl CollectingSink {
    fn snapshot(&self) -> Vec<LogRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordSink for CollectingSink {
    async fn deliver(&self, record: LogRecord) {
        self.records.lock().unwrap().push(record);
    }
}

/// Initializer that provisions nothing, for exercising the metadata wait.
struct NoopInitializer;

#[async_trait]
impl LogInitializer for NoopInitializer {
    async fn run(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

fn spec() -> TopicSpec {
    TopicSpec::define(TOPIC).compacted().build()
}

fn topic_log(
    broker: &MemoryBroker,
    consumer_options: ConsumerOptions,
    initializer: Arc<dyn LogInitializer>,
    sink: Arc<dyn RecordSink>,
) -> TopicLog<MemoryBroker> {
    TopicLog::new(
        TOPIC,
        broker.clone(),
        ProducerOptions::default(),
        consumer_options,
        initializer,
        sink,
    )
}

async fn seed(broker: &MemoryBroker, entries: &[(&str, Option<&'static [u8]>)]) {
    broker.admin().ensure_topic(&spec()).await.unwrap();
    let producer = broker.producer(&ProducerOptions::default()).unwrap();
    for (key, value) in entries {
        producer
            .send(TOPIC, key, value.map(Bytes::from_static))
            .await
            .unwrap();
    }
}

// ============================================================================
// Catch-Up
// ============================================================================

#[tokio::test]
async fn start_catches_up_on_records_present_before_the_call() {
    let broker = MemoryBroker::new();
    seed(
        &broker,
        &[
            ("status-runner-r1", Some(b"a" as &[u8])),
            ("status-runner-r2", Some(b"b" as &[u8])),
            ("status-runner-r1", None),
        ],
    )
    .await;

    let sink = Arc::new(CollectingSink::default());
    let initializer = Arc::new(EnsureTopic::new(Arc::new(broker.admin()), spec()));
    let mut log = topic_log(&broker, ConsumerOptions::default(), initializer, sink.clone());

    log.start().await.unwrap();
    assert_eq!(log.state(), LogState::Running);

    // Everything in the log before start() is delivered, in offset order,
    // before start() returns.
    let records = sink.snapshot();
    assert_eq!(records.len(), 3);
    assert_eq!(
        records.iter().map(|r| r.offset).collect::<Vec<_>>(),
        vec![Offset::new(0), Offset::new(1), Offset::new(2)]
    );
    assert!(records[2].is_tombstone());

    log.stop().await;
    assert_eq!(log.state(), LogState::Stopped);
}

#[tokio::test]
async fn records_appended_after_start_reach_the_sink() {
    let broker = MemoryBroker::new();
    broker.admin().ensure_topic(&spec()).await.unwrap();

    let sink = Arc::new(CollectingSink::default());
    let mut log = topic_log(
        &broker,
        ConsumerOptions::default(),
        Arc::new(NoopInitializer),
        sink.clone(),
    );
    log.start().await.unwrap();
    assert!(sink.snapshot().is_empty());

    let producer = broker.producer(&ProducerOptions::default()).unwrap();
    producer
        .send(TOPIC, "status-runner-r1", Some(Bytes::from_static(b"x")))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while sink.snapshot().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("replay never delivered the record");
    assert_eq!(sink.snapshot()[0].key, "status-runner-r1");

    log.stop().await;
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test(start_paused = true)]
async fn start_fails_when_partition_metadata_never_appears() {
    // No topic and an initializer that creates nothing: the metadata wait
    // must give up with a connectivity error after its 30s bound.
    let broker = MemoryBroker::new();
    let mut log = topic_log(
        &broker,
        ConsumerOptions::default(),
        Arc::new(NoopInitializer),
        Arc::new(CollectingSink::default()),
    );

    let err = log.start().await.unwrap_err();
    assert!(matches!(err, StoreError::Connectivity(_)), "got {err:?}");

    // stop() is safe after the failed start, and idempotent.
    log.stop().await;
    assert_eq!(log.state(), LogState::Stopped);
    log.stop().await;
}

#[tokio::test]
async fn double_start_is_rejected() {
    let broker = MemoryBroker::new();
    broker.admin().ensure_topic(&spec()).await.unwrap();
    let mut log = topic_log(
        &broker,
        ConsumerOptions::default(),
        Arc::new(NoopInitializer),
        Arc::new(CollectingSink::default()),
    );
    log.start().await.unwrap();
    let err = log.start().await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidState(_)));
    log.stop().await;
}

#[tokio::test]
async fn sender_is_unavailable_before_start() {
    let broker = MemoryBroker::new();
    let log = topic_log(
        &broker,
        ConsumerOptions::default(),
        Arc::new(NoopInitializer),
        Arc::new(CollectingSink::default()),
    );
    assert!(matches!(log.sender(), Err(StoreError::InvalidState(_))));
}

#[tokio::test]
async fn initializer_failure_is_not_fatal_when_the_topic_exists() {
    struct FailingInitializer;

    #[async_trait]
    impl LogInitializer for FailingInitializer {
        async fn run(&self) -> Result<(), StoreError> {
            Err(StoreError::Admin("admin endpoint unreachable".to_string()))
        }
    }

    let broker = MemoryBroker::new();
    broker.admin().ensure_topic(&spec()).await.unwrap();
    let mut log = topic_log(
        &broker,
        ConsumerOptions::default(),
        Arc::new(FailingInitializer),
        Arc::new(CollectingSink::default()),
    );
    log.start().await.unwrap();
    assert_eq!(log.state(), LogState::Running);
    log.stop().await;
}

// ============================================================================
// Replay Ordering
// ============================================================================

#[tokio::test]
async fn position_is_committed_before_records_are_dispatched() {
    // Sink that records, for every delivered record, the group's committed
    // position at delivery time. At-most-once replay means the commit has
    // already moved past the record when the sink sees it.
    struct CommitWitness {
        broker: MemoryBroker,
        group: String,
        witnessed: Mutex<Vec<(Offset, Option<Offset>)>>,
    }

    #[async_trait]
    impl RecordSink for CommitWitness {
        async fn deliver(&self, record: LogRecord) {
            let tp = TopicPartition::new(record.topic.clone(), record.partition);
            let committed = self.broker.committed(&self.group, &tp).await;
            self.witnessed
                .lock()
                .unwrap()
                .push((record.offset, committed));
        }
    }

    let broker = MemoryBroker::new();
    seed(
        &broker,
        &[
            ("status-runner-r1", Some(b"a" as &[u8])),
            ("status-runner-r2", Some(b"b" as &[u8])),
        ],
    )
    .await;

    let group = "replay-witness".to_string();
    let sink = Arc::new(CommitWitness {
        broker: broker.clone(),
        group: group.clone(),
        witnessed: Mutex::new(Vec::new()),
    });
    let options = ConsumerOptions {
        group: Some(group),
        ..ConsumerOptions::default()
    };
    let mut log = topic_log(&broker, options, Arc::new(NoopInitializer), sink.clone());
    log.start().await.unwrap();

    let witnessed = sink.witnessed.lock().unwrap().clone();
    assert_eq!(witnessed.len(), 2);
    for (offset, committed) in witnessed {
        let committed = committed.expect("commit must precede dispatch");
        assert!(
            committed >= offset.next(),
            "record {offset} delivered before its commit (committed = {committed})"
        );
    }

    log.stop().await;
}

// ============================================================================
// Admin Seam
// ============================================================================

#[tokio::test]
async fn ensure_topic_reports_creation_exactly_once() {
    let broker = MemoryBroker::new();
    let admin = broker.admin();
    let created = admin.ensure_topic(&spec()).await.unwrap();
    assert_eq!(created, BTreeSet::from([TOPIC.to_string()]));
    let created = admin.ensure_topic(&spec()).await.unwrap();
    assert!(created.is_empty());
}
