//! Store configuration and client tuning options.
//!
//! [`StoreConfig`] is the surface consumed from the surrounding runtime. It
//! can be built from a key-value property map (the runtime's native shape)
//! or from environment variables for standalone deployments.
//!
//! [`ProducerOptions`] and [`ConsumerOptions`] carry the client tuning the
//! status store requires and are handed to the [`LogClientFactory`] when
//! handles are opened at start:
//!
//! - the producer acknowledges from all replicas, allows a single in-flight
//!   request per connection (so client-level retries cannot reorder sends
//!   for the same key), and disables client-level retries entirely because
//!   the safe-write protocol retries explicitly;
//! - the consumer resets to the earliest offset and never auto-commits,
//!   because the log is always replayed in full.
//!
//! [`LogClientFactory`]: crate::client::LogClientFactory

use std::collections::HashMap;

use crate::constants::{
    DEFAULT_STATUS_STORAGE_PARTITIONS, DEFAULT_STATUS_STORAGE_REPLICATION_FACTOR,
    DEFAULT_STATUS_STORAGE_TOPIC, RUNNER_ID_CONFIG, STATUS_STORAGE_PARTITIONS_CONFIG,
    STATUS_STORAGE_REPLICATION_FACTOR_CONFIG, STATUS_STORAGE_TOPIC_CONFIG,
};
use crate::error::StoreError;

/// Configuration for a [`StatusStore`](crate::store::StatusStore).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Identifier of the runner process owning this store.
    pub runner_id: String,

    /// Name of the compacted topic backing the store. Required, non-blank.
    pub topic: String,

    /// Partition count used when the topic is first created.
    pub partitions: i32,

    /// Replication factor used when the topic is first created.
    pub replication_factor: i16,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            runner_id: String::new(),
            topic: DEFAULT_STATUS_STORAGE_TOPIC.to_string(),
            partitions: DEFAULT_STATUS_STORAGE_PARTITIONS,
            replication_factor: DEFAULT_STATUS_STORAGE_REPLICATION_FACTOR,
        }
    }
}

impl StoreConfig {
    /// Build a configuration from the runtime's property map.
    ///
    /// Unknown keys are ignored; absent keys take their defaults. A present
    /// but unparsable numeric value is a configuration error rather than a
    /// silent fallback.
    pub fn from_map(props: &HashMap<String, String>) -> Result<Self, StoreError> {
        let mut config = Self::default();

        if let Some(runner_id) = props.get(RUNNER_ID_CONFIG) {
            config.runner_id = runner_id.clone();
        }
        if let Some(topic) = props.get(STATUS_STORAGE_TOPIC_CONFIG) {
            config.topic = topic.clone();
        }
        if let Some(partitions) = props.get(STATUS_STORAGE_PARTITIONS_CONFIG) {
            config.partitions = partitions.parse().map_err(|_| {
                StoreError::Config(format!(
                    "{STATUS_STORAGE_PARTITIONS_CONFIG} must be an integer, got {partitions:?}"
                ))
            })?;
        }
        if let Some(replication) = props.get(STATUS_STORAGE_REPLICATION_FACTOR_CONFIG) {
            config.replication_factor = replication.parse().map_err(|_| {
                StoreError::Config(format!(
                    "{STATUS_STORAGE_REPLICATION_FACTOR_CONFIG} must be an integer, got {replication:?}"
                ))
            })?;
        }

        Ok(config)
    }

    /// Create configuration from environment variables.
    ///
    /// - `RUNNER_ID`: runner identifier (default: empty)
    /// - `STATUS_STORAGE_TOPIC`: backing topic name (default: `runner_status`)
    /// - `STATUS_STORAGE_PARTITIONS`: partition count (default: 1)
    /// - `STATUS_STORAGE_REPLICATION_FACTOR`: replication factor (default: 1)
    ///
    /// As with [`from_map`](StoreConfig::from_map), a variable that is set
    /// but unparsable is a configuration error rather than a silent
    /// fallback.
    pub fn from_env() -> Result<Self, StoreError> {
        let defaults = Self::default();

        let runner_id = std::env::var("RUNNER_ID").unwrap_or(defaults.runner_id);
        let topic = std::env::var("STATUS_STORAGE_TOPIC").unwrap_or(defaults.topic);
        let partitions = match std::env::var("STATUS_STORAGE_PARTITIONS") {
            Ok(raw) => raw.parse().map_err(|_| {
                StoreError::Config(format!(
                    "STATUS_STORAGE_PARTITIONS must be an integer, got {raw:?}"
                ))
            })?,
            Err(_) => defaults.partitions,
        };
        let replication_factor = match std::env::var("STATUS_STORAGE_REPLICATION_FACTOR") {
            Ok(raw) => raw.parse().map_err(|_| {
                StoreError::Config(format!(
                    "STATUS_STORAGE_REPLICATION_FACTOR must be an integer, got {raw:?}"
                ))
            })?,
            Err(_) => defaults.replication_factor,
        };

        Ok(Self {
            runner_id,
            topic,
            partitions,
            replication_factor,
        })
    }

    /// Validate the configuration. Called by `StatusStore::configure`.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.topic.trim().is_empty() {
            return Err(StoreError::Config(
                "status storage topic name must be specified".to_string(),
            ));
        }
        if self.partitions < 1 {
            return Err(StoreError::Config(format!(
                "status storage partition count must be at least 1, got {}",
                self.partitions
            )));
        }
        if self.replication_factor < 1 {
            return Err(StoreError::Config(format!(
                "status storage replication factor must be at least 1, got {}",
                self.replication_factor
            )));
        }
        Ok(())
    }
}

/// Acknowledgement level required from the broker for a produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acks {
    /// Every in-sync replica must acknowledge.
    All,
    /// Only the partition leader must acknowledge.
    Leader,
    /// Fire and forget.
    None,
}

/// Producer tuning handed to the client factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerOptions {
    /// Required acknowledgement level.
    pub acks: Acks,

    /// Maximum in-flight requests per connection. One keeps retried sends
    /// ordered relative to earlier sends for the same key.
    pub max_in_flight: usize,

    /// Client-level automatic retries. Zero: the safe-write protocol owns
    /// retrying, with per-attempt staleness checks a client cannot do.
    pub retries: u32,
}

impl Default for ProducerOptions {
    fn default() -> Self {
        Self {
            acks: Acks::All,
            max_in_flight: 1,
            retries: 0,
        }
    }
}

/// Where a consumer without a committed position starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffsetReset {
    /// Start from the beginning of the log. The store always wants the
    /// complete log, so this is the default.
    #[default]
    Earliest,
    /// Start from the end of the log.
    Latest,
}

/// Consumer tuning handed to the client factory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConsumerOptions {
    /// Position to reset to when no committed position exists.
    pub offset_reset: OffsetReset,

    /// Automatic position commits. Always off here; the log channel commits
    /// explicitly after each fetch.
    pub auto_commit: bool,

    /// Optional consumer group. `None` (the default) makes every start a
    /// full replay from the earliest retained offset.
    pub group: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.topic, "runner_status");
        assert_eq!(config.partitions, 1);
        assert_eq!(config.replication_factor, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn producer_defaults_are_durability_tuned() {
        let options = ProducerOptions::default();
        assert_eq!(options.acks, Acks::All);
        assert_eq!(options.max_in_flight, 1);
        assert_eq!(options.retries, 0);
    }

    #[test]
    fn consumer_defaults_replay_in_full() {
        let options = ConsumerOptions::default();
        assert_eq!(options.offset_reset, OffsetReset::Earliest);
        assert!(!options.auto_commit);
        assert!(options.group.is_none());
    }
}
