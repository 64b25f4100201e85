//! Error types for the Shield pipeline and its components.

use thiserror::Error;

/// Shield error type.
///
/// The evaluation pipeline itself only ever surfaces [`ShieldError::NotFound`]
/// (unknown zone); sub-component failures are folded into the verdict's
/// reason string and handled with conservative defaults. The remaining
/// variants surface from explicit configuration operations.
#[derive(Debug, Error)]
pub enum ShieldError {
    /// Null or malformed argument (bad zone name, empty pattern, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No free slot or budget left (signature table, context window, ...).
    #[error("exhausted: {0}")]
    Exhausted(String),

    /// Duplicate name or number.
    #[error("already exists: {0}")]
    Exists(String),

    /// Lookup by id or name found nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// File or socket error (request-log sink).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Violated invariant; implementation bug.
    #[error("internal error: {0}")]
    Internal(String),
}
