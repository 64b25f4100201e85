//! Error types for wire protocol encoding and decoding.

use thiserror::Error;

/// Protocol error type.
///
/// Frames with an unknown magic or foreign major version are *not* errors;
/// they decode to [`crate::frame::Decoded::Skip`] and are dropped silently.
/// Everything here indicates a malformed frame from a peer that should be
/// disconnected, or a transport failure.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Frame or payload failed structural validation.
    #[error("parse error: {0}")]
    Parse(String),

    /// Payload was shorter than its fixed layout requires.
    #[error("truncated payload: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    /// A length field exceeds its hard cap.
    #[error("field too large: {field} is {len} bytes (max {max})")]
    TooLarge {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// Underlying socket or file error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer closed the connection mid-frame.
    #[error("peer disconnected")]
    Disconnected,
}
