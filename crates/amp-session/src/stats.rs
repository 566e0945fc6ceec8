//! End-of-session counters.

use std::time::Duration;

use serde::Serialize;

/// Snapshot returned once a session has fully shut down.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Messages read from the client and dispatched.
    pub in_messages: u64,
    /// Messages written to the client, alive messages included.
    pub out_messages: u64,
    /// Alive messages queued by the heartbeat.
    pub alive_messages: u64,
    /// Inbound frames that failed to decode.
    pub dropped_frames: u64,
    /// Deepest the output queue got.
    pub max_queue_len: usize,
    /// Whether the session was closed for overflowing its output queue.
    pub overflowed: bool,
    /// Wall time from start to shutdown.
    pub duration: Duration,
}

impl SessionStats {
    /// Duration in whole milliseconds, for logs.
    pub fn duration_ms(&self) -> u64 {
        u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX)
    }
}
