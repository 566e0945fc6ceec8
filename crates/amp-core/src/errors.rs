//! Envelope error types.

use thiserror::Error;

/// Errors raised while decoding a wire frame into a [`Msg`](crate::Msg).
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The frame carried no bytes at all.
    #[error("empty frame")]
    Empty,
    /// The header line was not a valid message header.
    #[error("invalid message header: {0}")]
    Header(#[from] serde_json::Error),
    /// A compressed frame could not be inflated.
    #[error("failed to inflate frame: {0}")]
    Inflate(#[from] std::io::Error),
}
