//! Type-safe wrappers for log primitives.
//!
//! These newtypes prevent mixing up integer values that share an underlying
//! representation but carry different semantic meanings (offsets versus
//! partition indexes), and define the record and topic value types shared by
//! the client seams, the topic-backed log, and the status store.

use std::fmt;

use bytes::Bytes;

/// A record offset within a partition.
///
/// Offsets are broker-assigned and monotonically increasing per partition.
/// In positions and end-offset maps an offset denotes the *next* record to
/// be fetched or written, so a consumer whose position has reached a
/// partition's end offset has consumed everything in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Offset(pub i64);

impl Offset {
    /// Create a new offset from a raw value.
    #[inline]
    pub const fn new(value: i64) -> Self {
        Offset(value)
    }

    /// Get the raw i64 value.
    #[inline]
    pub const fn value(self) -> i64 {
        self.0
    }

    /// Offset immediately after this one.
    #[inline]
    pub const fn next(self) -> Self {
        Offset(self.0 + 1)
    }
}

impl From<i64> for Offset {
    fn from(value: i64) -> Self {
        Offset(value)
    }
}

impl From<Offset> for i64 {
    fn from(offset: Offset) -> Self {
        offset.0
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A partition index within a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PartitionId(pub i32);

impl PartitionId {
    /// Create a new partition id from a raw value.
    #[inline]
    pub const fn new(value: i32) -> Self {
        PartitionId(value)
    }

    /// Get the raw i32 value.
    #[inline]
    pub const fn value(self) -> i32 {
        self.0
    }
}

impl From<i32> for PartitionId {
    fn from(value: i32) -> Self {
        PartitionId(value)
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A (topic, partition) pair identifying one partition of one topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: PartitionId,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: impl Into<PartitionId>) -> Self {
        Self {
            topic: topic.into(),
            partition: partition.into(),
        }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// A single record as read from the log.
///
/// A `None` value is a tombstone: under compaction the broker eventually
/// removes both the tombstone and the superseded values for its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub topic: String,
    pub partition: PartitionId,
    pub offset: Offset,
    pub key: String,
    pub value: Option<Bytes>,
}

impl LogRecord {
    /// Whether this record deletes its key.
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }
}

/// Metadata returned by the broker for a successfully appended record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordMetadata {
    pub partition: PartitionId,
    pub offset: Offset,
}

/// Retention behavior of a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CleanupPolicy {
    /// Retain only the latest record per key.
    #[default]
    Compact,
    /// Retain records up to a size/time bound regardless of key.
    Delete,
}

/// Definition of a topic pushed through the admin seam on first start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    pub name: String,
    pub partitions: i32,
    pub replication_factor: i16,
    pub cleanup_policy: CleanupPolicy,
}

impl TopicSpec {
    /// Start defining a topic with default partitioning and retention.
    pub fn define(name: impl Into<String>) -> TopicSpecBuilder {
        TopicSpecBuilder {
            name: name.into(),
            partitions: 1,
            replication_factor: 1,
            cleanup_policy: CleanupPolicy::Delete,
        }
    }
}

/// Builder for [`TopicSpec`].
#[derive(Debug, Clone)]
pub struct TopicSpecBuilder {
    name: String,
    partitions: i32,
    replication_factor: i16,
    cleanup_policy: CleanupPolicy,
}

impl TopicSpecBuilder {
    /// Retain only the latest record per key.
    pub fn compacted(mut self) -> Self {
        self.cleanup_policy = CleanupPolicy::Compact;
        self
    }

    pub fn partitions(mut self, partitions: i32) -> Self {
        self.partitions = partitions;
        self
    }

    pub fn replication_factor(mut self, replication_factor: i16) -> Self {
        self.replication_factor = replication_factor;
        self
    }

    pub fn build(self) -> TopicSpec {
        TopicSpec {
            name: self.name,
            partitions: self.partitions,
            replication_factor: self.replication_factor,
            cleanup_policy: self.cleanup_policy,
        }
    }
}
