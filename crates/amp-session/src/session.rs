//! Session loop for one client connection.
//!
//! A [`Session`] owns the connection for its whole life. [`Session::run`]
//! multiplexes four event sources in a single `select!`:
//!
//! 1. wake-ups from producers that pushed to the output queue
//! 2. the idle heartbeat
//! 3. the hand-off slot holding the next message to write
//! 4. decoded messages from the inbound reader, and its closure
//!
//! plus the process-wide shutdown token. Shutdown only closes the connection;
//! the loop keeps running until the reader reports the closure, so client
//! disconnects, write failures, overflow and shutdown all leave through the
//! same path.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use amp_core::{Msg, MsgType, SessionId};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span};

use crate::broker::{Broker, Requester};
use crate::config::SessionConfig;
use crate::connection::Connection;
use crate::errors::ConnectionError;
use crate::heartbeat::Heartbeat;
use crate::metrics::{
    SESSION_ALIVE_TOTAL, SESSION_DURATION_SECONDS, SESSION_MESSAGES_IN_TOTAL,
    SESSION_MESSAGES_OUT_TOTAL, SESSIONS_ACTIVE, SESSIONS_TOTAL,
};
use crate::queue::OutQueue;
use crate::reader;
use crate::stats::SessionStats;

struct Shared {
    id: SessionId,
    queue: OutQueue,
}

/// Delivery entry point into a running session.
///
/// Cheap to clone. Brokers and requesters keep one per subscriber and push
/// through it from any task until they are told to unsubscribe.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
}

impl SessionHandle {
    /// Identity used as the subscriber key.
    pub fn id(&self) -> &SessionId {
        &self.shared.id
    }

    /// Queue `msg` for delivery to the client. Never blocks.
    ///
    /// Returns `false` when the message was dropped because the session has
    /// overflowed or terminated.
    pub fn send(&self, msg: impl Into<Arc<Msg>>) -> bool {
        self.shared.queue.push(msg.into()).is_ok()
    }

    /// Whether further sends will be dropped.
    pub fn is_closed(&self) -> bool {
        self.shared.queue.is_closed()
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.shared.id)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SessionState {
    Running,
    /// Shutdown closed the connection; waiting for the reader to notice.
    ShuttingDown,
    Terminated,
}

/// One client connection bound to a broker and a requester.
pub struct Session {
    shared: Arc<Shared>,
    changed: mpsc::Receiver<()>,
    config: Arc<SessionConfig>,
    conn: Arc<dyn Connection>,
    broker: Arc<dyn Broker>,
    requester: Arc<dyn Requester>,
}

impl Session {
    /// Create a session. Nothing runs until [`Session::run`].
    ///
    /// Handles taken before `run` may already queue messages; they are
    /// written once the loop starts.
    pub fn new(
        config: Arc<SessionConfig>,
        conn: Arc<dyn Connection>,
        broker: Arc<dyn Broker>,
        requester: Arc<dyn Requester>,
    ) -> Self {
        let (queue, changed) = OutQueue::new(config.max_queue_depth, conn.clone());
        Self {
            shared: Arc::new(Shared {
                id: SessionId::new(),
                queue,
            }),
            changed,
            config,
            conn,
            broker,
            requester,
        }
    }

    /// This session's identity.
    pub fn id(&self) -> &SessionId {
        &self.shared.id
    }

    /// A handle for delivering messages to this session.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            shared: self.shared.clone(),
        }
    }

    /// Run until the connection can no longer be read.
    ///
    /// Cancelling `shutdown` closes the connection once; the loop then winds
    /// down through the same path as a client disconnect. Returns after the
    /// broker and requester have been told to unsubscribe and the reader has
    /// stopped. Dropping the future before completion performs the same
    /// cleanup and also closes the connection.
    pub async fn run(self, shutdown: CancellationToken) -> SessionStats {
        let span = info_span!(
            "session",
            session_id = %self.shared.id,
            conn_no = self.conn.conn_no(),
        );
        self.run_loop(shutdown).instrument(span).await
    }

    async fn run_loop(self, shutdown: CancellationToken) -> SessionStats {
        let Self {
            shared,
            mut changed,
            config,
            conn,
            broker,
            requester,
        } = self;

        counter!(SESSIONS_TOTAL).increment(1);
        gauge!(SESSIONS_ACTIVE).increment(1.0);
        debug!("session started");

        let dropped = Arc::new(AtomicU64::new(0));
        let (mut inbound, reader) = reader::spawn(conn.clone(), dropped.clone());
        let mut cleanup = Cleanup {
            shared: shared.clone(),
            conn: conn.clone(),
            broker: broker.clone(),
            requester: requester.clone(),
            reader,
            dropped,
            started: Instant::now(),
            in_messages: 0,
            out_messages: 0,
            unsubscribed: false,
            finished: false,
        };

        let handle = SessionHandle {
            shared: shared.clone(),
        };
        let (slot_tx, mut slot_rx) = mpsc::channel::<Arc<Msg>>(1);
        let mut heartbeat = Heartbeat::new(config.heartbeat_interval());
        let mut state = SessionState::Running;

        while state != SessionState::Terminated {
            shared.queue.try_pop(&slot_tx);

            tokio::select! {
                Some(()) = changed.recv() => {}
                () = heartbeat.fired(), if heartbeat.is_armed() => {
                    let slot_empty = slot_tx.capacity() == slot_tx.max_capacity();
                    if shared.queue.push_alive_if_idle(slot_empty) {
                        debug!("queued alive");
                    }
                }
                Some(msg) = slot_rx.recv() => {
                    write(conn.as_ref(), &msg).await;
                    heartbeat.reset();
                    cleanup.out_messages += 1;
                }
                msg = inbound.recv() => match msg {
                    Some(msg) => {
                        dispatch(&handle, broker.as_ref(), requester.as_ref(), msg);
                        cleanup.in_messages += 1;
                    }
                    None => {
                        debug!("inbound closed");
                        cleanup.unsubscribe();
                        state = SessionState::Terminated;
                    }
                },
                () = shutdown.cancelled(), if state == SessionState::Running => {
                    debug!("shutdown requested, closing connection");
                    conn.close();
                    state = SessionState::ShuttingDown;
                }
            }
        }

        cleanup.finish()
    }
}

fn dispatch(handle: &SessionHandle, broker: &dyn Broker, requester: &dyn Requester, msg: Msg) {
    match msg.msg_type {
        MsgType::Ping => {
            let _ = handle.send(Msg::pong_of(&msg));
        }
        MsgType::Request => requester.send(handle, msg),
        MsgType::Subscribe => broker.subscribe(handle, msg.subscriptions),
        other if other.is_data() => {
            debug!(msg_type = ?other, "ignoring data message sent by client");
        }
        other => debug!(msg_type = ?other, "ignoring inbound message"),
    }
}

async fn write(conn: &dyn Connection, msg: &Msg) {
    let (payload, compressed) = if conn.supports_compression() {
        msg.encode_compressed()
    } else {
        (msg.encode(), false)
    };
    match conn.write(payload, compressed).await {
        Ok(()) => {}
        // Already closed; the reader will see it.
        Err(ConnectionError::Closed) => debug!("write on closed connection"),
        Err(error) => {
            debug!(%error, "write failed, closing connection");
            conn.close();
        }
    }
}

/// Releases everything the loop started, on every exit path.
struct Cleanup {
    shared: Arc<Shared>,
    conn: Arc<dyn Connection>,
    broker: Arc<dyn Broker>,
    requester: Arc<dyn Requester>,
    reader: JoinHandle<()>,
    dropped: Arc<AtomicU64>,
    started: Instant,
    in_messages: u64,
    out_messages: u64,
    unsubscribed: bool,
    finished: bool,
}

impl Cleanup {
    fn unsubscribe(&mut self) {
        if self.unsubscribed {
            return;
        }
        self.unsubscribed = true;
        self.broker.unsubscribe(&self.shared.id);
        self.requester.unsubscribe(&self.shared.id);
    }

    fn finish(&mut self) -> SessionStats {
        self.finished = true;
        self.reader.abort();
        self.unsubscribe();

        let totals = self.shared.queue.terminate();
        let stats = SessionStats {
            in_messages: self.in_messages,
            out_messages: self.out_messages,
            alive_messages: totals.alive_sent,
            dropped_frames: self.dropped.load(Ordering::Relaxed),
            max_queue_len: totals.max_len,
            overflowed: totals.overflowed,
            duration: self.started.elapsed(),
        };

        info!(
            in_messages = stats.in_messages,
            out_messages = stats.out_messages,
            alive_messages = stats.alive_messages,
            dropped_frames = stats.dropped_frames,
            max_queue_len = stats.max_queue_len,
            rejected = totals.rejected,
            duration_ms = stats.duration_ms(),
            "session stats"
        );
        counter!(SESSION_MESSAGES_IN_TOTAL).increment(stats.in_messages);
        counter!(SESSION_MESSAGES_OUT_TOTAL).increment(stats.out_messages);
        counter!(SESSION_ALIVE_TOTAL).increment(stats.alive_messages);
        histogram!(SESSION_DURATION_SECONDS).record(stats.duration.as_secs_f64());
        gauge!(SESSIONS_ACTIVE).decrement(1.0);
        stats
    }
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        if !self.finished {
            debug!("session dropped before completion");
            self.conn.close();
            let _ = self.finish();
        }
    }
}
