//! Channel-backed [`Connection`] for embedding sessions in-process.
//!
//! [`in_process`] returns the server half, which a session consumes, and an
//! [`InProcessClient`] that plays the remote peer: it pushes frames to the
//! session, receives written frames, and can observe or trigger close.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use amp_core::{EnvelopeError, Msg};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::connection::Connection;
use crate::errors::ConnectionError;

/// Frames the client may push before `send` waits.
const INBOUND_CAPACITY: usize = 64;

/// A frame written by the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Raw payload.
    pub payload: Bytes,
    /// Whether the payload is deflated.
    pub compressed: bool,
}

impl Frame {
    /// Decode the payload, inflating it first when compressed.
    pub fn decode(&self) -> Result<Msg, EnvelopeError> {
        if self.compressed {
            Msg::decode_compressed(&self.payload)
        } else {
            Msg::decode(&self.payload)
        }
    }
}

struct Shared {
    closed: CancellationToken,
    close_calls: AtomicUsize,
    fail_writes: AtomicBool,
}

/// Server half of an in-process connection.
pub struct InProcessConnection {
    no: u64,
    compression: bool,
    inbound: Mutex<mpsc::Receiver<Bytes>>,
    outbound: mpsc::UnboundedSender<Frame>,
    shared: Arc<Shared>,
}

/// Client half of an in-process connection.
pub struct InProcessClient {
    inbound: Option<mpsc::Sender<Bytes>>,
    outbound: mpsc::UnboundedReceiver<Frame>,
    shared: Arc<Shared>,
}

/// Create a connected pair. `compression` is what the server half reports
/// from [`Connection::supports_compression`].
pub fn in_process(no: u64, compression: bool) -> (InProcessConnection, InProcessClient) {
    let (in_tx, in_rx) = mpsc::channel(INBOUND_CAPACITY);
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared {
        closed: CancellationToken::new(),
        close_calls: AtomicUsize::new(0),
        fail_writes: AtomicBool::new(false),
    });
    let server = InProcessConnection {
        no,
        compression,
        inbound: Mutex::new(in_rx),
        outbound: out_tx,
        shared: shared.clone(),
    };
    let client = InProcessClient {
        inbound: Some(in_tx),
        outbound: out_rx,
        shared,
    };
    (server, client)
}

#[async_trait]
impl Connection for InProcessConnection {
    async fn read(&self) -> Result<Bytes, ConnectionError> {
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            biased;
            () = self.shared.closed.cancelled() => Err(ConnectionError::Closed),
            frame = inbound.recv() => frame.ok_or(ConnectionError::Closed),
        }
    }

    async fn write(&self, payload: Bytes, compressed: bool) -> Result<(), ConnectionError> {
        if self.shared.closed.is_cancelled() {
            return Err(ConnectionError::Closed);
        }
        if self.shared.fail_writes.load(Ordering::Relaxed) {
            return Err(ConnectionError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "peer stopped reading",
            )));
        }
        self.outbound
            .send(Frame {
                payload,
                compressed,
            })
            .map_err(|_| ConnectionError::Closed)
    }

    fn close(&self) {
        let _ = self.shared.close_calls.fetch_add(1, Ordering::SeqCst);
        self.shared.closed.cancel();
    }

    fn supports_compression(&self) -> bool {
        self.compression
    }

    fn conn_no(&self) -> u64 {
        self.no
    }
}

impl InProcessClient {
    /// Push a raw frame to the session.
    pub async fn send_frame(&self, frame: impl Into<Bytes>) -> Result<(), ConnectionError> {
        let inbound = self.inbound.as_ref().ok_or(ConnectionError::Closed)?;
        inbound
            .send(frame.into())
            .await
            .map_err(|_| ConnectionError::Closed)
    }

    /// Encode and push a message.
    pub async fn send(&self, msg: &Msg) -> Result<(), ConnectionError> {
        self.send_frame(msg.encode()).await
    }

    /// Next frame written by the session, or `None` once the server half is gone
    /// and every written frame has been received.
    pub async fn recv_frame(&mut self) -> Option<Frame> {
        self.outbound.recv().await
    }

    /// Next written frame, decoded.
    pub async fn recv(&mut self) -> Option<Msg> {
        let frame = self.recv_frame().await?;
        frame.decode().ok()
    }

    /// A written frame if one is already waiting.
    pub fn try_recv_frame(&mut self) -> Option<Frame> {
        self.outbound.try_recv().ok()
    }

    /// Stop sending; the session sees end of stream after draining pushed frames.
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Drop the transport from the client side.
    pub fn disconnect(&self) {
        self.shared.closed.cancel();
    }

    /// Make every subsequent write fail with an I/O error.
    pub fn fail_writes(&self) {
        self.shared.fail_writes.store(true, Ordering::Relaxed);
    }

    /// Whether the connection has been closed by either side.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.is_cancelled()
    }

    /// Number of times the server half's `close` was called.
    pub fn close_calls(&self) -> usize {
        self.shared.close_calls.load(Ordering::SeqCst)
    }

    /// Resolves once the connection is closed.
    pub async fn closed(&self) {
        self.shared.closed.cancelled().await;
    }
}
