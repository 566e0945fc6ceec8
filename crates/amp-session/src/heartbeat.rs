//! Idle heartbeat timer.
//!
//! The timer is one-shot: after it fires it stays disarmed until the next
//! write re-arms it with [`Heartbeat::reset`]. The session loop only polls
//! [`Heartbeat::fired`] while [`Heartbeat::is_armed`] holds, so a fired timer
//! never spins the loop.

use std::pin::Pin;
use std::time::Duration;

use tokio::time::{self, Instant, Sleep};

/// Heartbeat timer for one session.
pub(crate) struct Heartbeat {
    interval: Duration,
    sleep: Pin<Box<Sleep>>,
    armed: bool,
}

impl Heartbeat {
    /// Start armed, due one `interval` from now.
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            sleep: Box::pin(time::sleep(interval)),
            armed: true,
        }
    }

    /// Re-arm for a full interval from now.
    pub(crate) fn reset(&mut self) {
        self.sleep.as_mut().reset(Instant::now() + self.interval);
        self.armed = true;
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.armed
    }

    #[cfg(test)]
    pub(crate) fn deadline(&self) -> Instant {
        self.sleep.deadline()
    }

    /// Wait for the deadline, then disarm.
    pub(crate) async fn fired(&mut self) {
        self.sleep.as_mut().await;
        self.armed = false;
    }
}
