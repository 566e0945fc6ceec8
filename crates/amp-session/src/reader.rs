//! Inbound reader task.
//!
//! Reads frames until the connection fails, decodes them and hands each
//! message to the session loop through a single-slot channel. The sender is
//! dropped when the task returns, which is how the loop learns the
//! connection is gone.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use amp_core::Msg;
use metrics::counter;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, debug};

use crate::connection::Connection;
use crate::metrics::SESSION_DROPPED_FRAMES_TOTAL;

/// Spawn the reader in the current span.
///
/// `dropped` counts frames that failed to decode.
pub(crate) fn spawn(
    conn: Arc<dyn Connection>,
    dropped: Arc<AtomicU64>,
) -> (mpsc::Receiver<Msg>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(1);
    let task = tokio::spawn(read_loop(conn, tx, dropped).instrument(Span::current()));
    (rx, task)
}

async fn read_loop(conn: Arc<dyn Connection>, tx: mpsc::Sender<Msg>, dropped: Arc<AtomicU64>) {
    loop {
        let frame = match conn.read().await {
            Ok(frame) => frame,
            Err(error) => {
                debug!(%error, "read ended");
                return;
            }
        };
        let msg = match Msg::decode(&frame) {
            Ok(msg) => msg,
            Err(error) => {
                let _ = dropped.fetch_add(1, Ordering::Relaxed);
                counter!(SESSION_DROPPED_FRAMES_TOTAL).increment(1);
                debug!(%error, len = frame.len(), "dropping undecodable frame");
                continue;
            }
        };
        if tx.send(msg).await.is_err() {
            return;
        }
    }
}
