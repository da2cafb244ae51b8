//! Crate-level error types.
//!
//! The crate uses a two-layer error hierarchy:
//!
//! ## Store Layer
//!
//! - [`StoreError`]: fatal configuration, connectivity, and lifecycle errors
//!   surfaced to the caller of `configure()`/`start()`.
//!
//! ## Send/Decode Layer
//!
//! - [`SendError`]: per-attempt produce failures, split into retriable and
//!   fatal variants. Retriable failures are recovered internally by the
//!   safe-write protocol; fatal ones are logged and dropped.
//! - [`DecodeError`]: malformed payloads read back from the log. These never
//!   halt replay; the offending record is logged and discarded.
//!
//! ## Conversion
//!
//! [`SendError`] converts into [`StoreError`] via `From`, so send failures
//! hit during a store-level operation (e.g. `flush`) propagate with `?`.

use std::result;

use thiserror::Error as ThisError;

pub type Result<T> = result::Result<T, StoreError>;

/// Fatal store-level errors.
#[derive(Debug, Clone, ThisError)]
pub enum StoreError {
    /// Missing or invalid configuration, detected at `configure()`.
    #[error("configuration error: {0}")]
    Config(String),

    /// Partition metadata for the backing topic could not be discovered in
    /// the allotted period. This could indicate a connectivity issue,
    /// unavailable topic partitions, or a topic that took too long to create.
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// An operation was invoked in a lifecycle state that does not allow it.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The topic admin collaborator failed.
    #[error("admin error: {0}")]
    Admin(String),

    /// A produce failure that escaped the internal retry path.
    #[error(transparent)]
    Send(#[from] SendError),

    /// Broker client failure outside the produce path (metadata, fetch,
    /// position, commit).
    #[error("client error: {0}")]
    Client(String),
}

/// Failure of a single produce attempt.
#[derive(Debug, Clone, ThisError)]
pub enum SendError {
    /// Transient broker failure; the attempt may be retried.
    #[error("retriable send failure: {0}")]
    Retriable(String),

    /// Permanent failure; retrying will not help.
    #[error("send failed: {0}")]
    Fatal(String),
}

impl SendError {
    /// Whether the safe-write protocol may retry after this failure.
    pub fn is_retriable(&self) -> bool {
        matches!(self, SendError::Retriable(_))
    }
}

/// Failure to decode a status record read back from the log.
#[derive(Debug, ThisError)]
pub enum DecodeError {
    /// The payload is not valid JSON or does not match the status schema.
    #[error("invalid status payload: {0}")]
    Json(#[from] serde_json::Error),
}
