//! Transport capability consumed by a session.

use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::ConnectionError;

/// Duplex frame channel to one client, e.g. a websocket.
///
/// `read` is only ever called by the session's reader task, while `write`
/// and `close` are called from the session loop and, for `close`, from any
/// producer that overflows the output queue. Implementations must allow
/// these to run concurrently.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Wait for the next frame from the client.
    ///
    /// Must return an error once the connection is closed, including when a
    /// read is already pending at the time of `close`.
    async fn read(&self) -> Result<Bytes, ConnectionError>;

    /// Write one frame; `compressed` marks a deflated payload.
    async fn write(&self, payload: Bytes, compressed: bool) -> Result<(), ConnectionError>;

    /// Close the connection. Must be idempotent and must not block.
    fn close(&self);

    /// Whether the client accepts deflated frames.
    fn supports_compression(&self) -> bool;

    /// Transport-level connection number, for logs.
    fn conn_no(&self) -> u64;
}
