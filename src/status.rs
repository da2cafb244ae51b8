//! Runner status model, status keys, and the JSON wire codec.
//!
//! A [`RunnerStatus`] is an immutable value describing one runner's
//! lifecycle state. The store never validates transition legality; any state
//! may follow any other at this layer.
//!
//! # Wire Contract
//!
//! Status records are keyed `status-runner-<runnerId>` and carry a JSON
//! value `{"state": ..., "trace": ..., "runner_id": ...}` serialized to
//! bytes, or a null payload (tombstone) when the runner is destroyed.
//! Decoding is strict: unknown fields and unrecognized state names are
//! rejected rather than inferred. The runner id embedded in the key is
//! authoritative; the payload's `runner_id` field is informational.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::constants::RUNNER_STATUS_PREFIX;
use crate::error::DecodeError;

/// Lifecycle state of a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunnerState {
    Running,
    Shutdown,
    Failed,
    Destroyed,
}

impl RunnerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunnerState::Running => "RUNNING",
            RunnerState::Shutdown => "SHUTDOWN",
            RunnerState::Failed => "FAILED",
            RunnerState::Destroyed => "DESTROYED",
        }
    }
}

impl std::fmt::Display for RunnerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable status of one runner.
///
/// Equality covers all three fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunnerStatus {
    runner_id: String,
    state: RunnerState,
    trace: Option<String>,
}

impl RunnerStatus {
    pub fn new(runner_id: impl Into<String>, state: RunnerState, trace: Option<String>) -> Self {
        Self {
            runner_id: runner_id.into(),
            state,
            trace,
        }
    }

    pub fn runner_id(&self) -> &str {
        &self.runner_id
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    pub fn trace(&self) -> Option<&str> {
        self.trace.as_deref()
    }

    /// Destroyed statuses are written as tombstones so compaction purges
    /// the runner from the log.
    pub fn is_destroyed(&self) -> bool {
        self.state == RunnerState::Destroyed
    }
}

/// Build the record key for a runner's status.
pub fn status_key(runner_id: &str) -> String {
    format!("{RUNNER_STATUS_PREFIX}{runner_id}")
}

/// Extract the runner id from a status record key.
///
/// Returns `None` when the prefix does not match or the id is empty.
pub fn parse_status_key(key: &str) -> Option<&str> {
    key.strip_prefix(RUNNER_STATUS_PREFIX)
        .filter(|id| !id.is_empty())
}

/// On-wire shape of a status value.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StatusWire {
    state: RunnerState,
    trace: Option<String>,
    runner_id: String,
}

/// Serialize a status to its JSON wire form.
pub fn encode_status(status: &RunnerStatus) -> Result<Bytes, DecodeError> {
    let wire = StatusWire {
        state: status.state(),
        trace: status.trace().map(str::to_string),
        runner_id: status.runner_id().to_string(),
    };
    let bytes = serde_json::to_vec(&wire)?;
    Ok(Bytes::from(bytes))
}

/// Strictly decode a status value read back from the log.
///
/// `runner_id` comes from the record key and overrides the payload field.
pub fn decode_status(runner_id: &str, value: &[u8]) -> Result<RunnerStatus, DecodeError> {
    let wire: StatusWire = serde_json::from_slice(value)?;
    Ok(RunnerStatus::new(runner_id, wire.state, wire.trace))
}
