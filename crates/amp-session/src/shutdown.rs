//! Graceful shutdown coordination via `CancellationToken`.

use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::session::Session;
use crate::stats::SessionStats;

/// Default time sessions get to wind down before they are aborted.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Owns the process-wide shutdown token shared by every session.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Run `session` on its own task, bound to this coordinator's token.
    pub fn spawn_session(&self, session: Session) -> JoinHandle<SessionStats> {
        tokio::spawn(session.run(self.token()))
    }

    /// Cancel the token and wait for `handles` to finish.
    ///
    /// Sessions still running after `timeout` (default
    /// [`DEFAULT_SHUTDOWN_TIMEOUT`]) are aborted, which still unsubscribes
    /// them. Returns the stats of sessions that finished in time.
    pub async fn graceful_shutdown(
        &self,
        handles: Vec<JoinHandle<SessionStats>>,
        timeout: Option<Duration>,
    ) -> Vec<SessionStats> {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);

        self.shutdown();
        info!(
            session_count = handles.len(),
            timeout_secs = timeout.as_secs(),
            "waiting for sessions to finish"
        );

        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        let mut pending: FuturesUnordered<_> = handles.into_iter().collect();
        let deadline = Instant::now() + timeout;
        let mut finished = Vec::with_capacity(pending.len());

        loop {
            match tokio::time::timeout_at(deadline, pending.next()).await {
                Ok(Some(Ok(stats))) => finished.push(stats),
                Ok(Some(Err(error))) => warn!(%error, "session task failed"),
                Ok(None) => return finished,
                Err(_) => break,
            }
        }

        let remaining = pending.len();
        warn!(remaining, "shutdown timed out after {timeout:?}, aborting sessions");
        for abort in aborts {
            abort.abort();
        }
        finished
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
