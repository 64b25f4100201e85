//! Error types for the hive core.

use thiserror::Error;

/// Hive error type.
///
/// Explicit admin operations (register, add signature, save/load) surface
/// these; best-effort paths (alert fan-out, SIEM forwarding) degrade
/// silently with a log line instead.
#[derive(Debug, Error)]
pub enum HiveError {
    /// Null or malformed argument.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No free slot (agents, signatures, playbooks, tasks).
    #[error("exhausted: {0}")]
    Exhausted(String),

    /// Duplicate name or number.
    #[error("already exists: {0}")]
    Exists(String),

    /// Lookup found nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// Snapshot failed validation; in-memory state is untouched.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// File or socket error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wire frame failed validation.
    #[error("parse error: {0}")]
    Parse(#[from] palisade_proto::ProtoError),

    /// Operation did not complete in its deadline.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Operation was cancelled by shutdown.
    #[error("cancelled")]
    Cancelled,

    /// Violated invariant; implementation bug.
    #[error("internal error: {0}")]
    Internal(String),
}
