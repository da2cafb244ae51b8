//! Centralized configuration keys, defaults, and timing constants.
//!
//! Having them in one place makes it easier to:
//!
//! - Keep the configuration surface in sync with its documentation
//! - Update values consistently
//! - Document the rationale for each constant

use std::time::Duration;

// =============================================================================
// Record Keys
// =============================================================================

/// Key prefix for runner status records.
///
/// The status topic multiplexes record types; the prefix is the discriminator.
/// A full key has the form `status-runner-<runnerId>`.
pub const RUNNER_STATUS_PREFIX: &str = "status-runner-";

// =============================================================================
// Configuration Keys
// =============================================================================

/// Identifier of the runner process owning this store.
pub const RUNNER_ID_CONFIG: &str = "runner.id";

/// Name of the compacted topic backing the status store. Required, non-blank.
pub const STATUS_STORAGE_TOPIC_CONFIG: &str = "status.storage.topic";

/// Default status topic name.
pub const DEFAULT_STATUS_STORAGE_TOPIC: &str = "runner_status";

/// Partition count for the status topic.
pub const STATUS_STORAGE_PARTITIONS_CONFIG: &str = "status.storage.partitions.config";

/// Default partition count. A single partition gives a total order over
/// all status records, which is the common deployment.
pub const DEFAULT_STATUS_STORAGE_PARTITIONS: i32 = 1;

/// Replication factor for the status topic.
pub const STATUS_STORAGE_REPLICATION_FACTOR_CONFIG: &str =
    "status.storage.replication.factor.config";

/// Default replication factor.
pub const DEFAULT_STATUS_STORAGE_REPLICATION_FACTOR: i16 = 1;

// =============================================================================
// Timing Constants
// =============================================================================

/// How long `TopicLog::start` waits for partition metadata before giving up
/// with a connectivity error. Covers the case where the topic was just
/// created and the broker has not yet propagated metadata to consumers.
pub const CREATE_TOPIC_TIMEOUT: Duration = Duration::from_secs(30);

/// Lower bound on the sleep between partition metadata lookups.
pub const METADATA_RETRY_MIN_SLEEP: Duration = Duration::from_millis(10);

/// Upper bound on the sleep between partition metadata lookups. The sleep
/// ramps up with elapsed time until it hits this cap.
pub const METADATA_RETRY_MAX_SLEEP: Duration = Duration::from_secs(1);
