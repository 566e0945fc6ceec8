//! # amp-core
//!
//! Shared vocabulary for the amp push protocol.
//!
//! - **Envelope**: [`Msg`] and [`MsgType`] with plain and deflate-compressed framing
//! - **Identifiers**: [`SessionId`], the subscriber key handed to brokers and requesters
//! - **Errors**: [`EnvelopeError`] for frames that cannot be decoded
//! - **Logging**: subscriber setup and in-memory capture for tests

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod message;

pub use errors::EnvelopeError;
pub use ids::SessionId;
pub use message::{COMPRESSION_THRESHOLD, Msg, MsgType};
