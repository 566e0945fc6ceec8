//! # amp-session
//!
//! Per-connection session engine for the amp push protocol.
//!
//! - Session loop: one task per client multiplexing inbound reads, outbound
//!   writes, heartbeats and shutdown
//! - Output queue: mutex-guarded FIFO that disconnects clients which fall
//!   behind instead of buffering without bound
//! - Capabilities: [`Connection`], [`Broker`] and [`Requester`] traits the
//!   embedding service implements
//! - Graceful shutdown via a shared `CancellationToken`

#![deny(unsafe_code)]

pub mod broker;
pub mod config;
pub mod connection;
pub mod errors;
mod heartbeat;
pub mod in_process;
pub mod metrics;
mod queue;
mod reader;
pub mod session;
pub mod shutdown;
pub mod stats;

#[cfg(test)]
mod testutil;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

pub use broker::{Broker, Requester};
pub use config::{SessionConfig, load_config, load_config_from_path};
pub use connection::Connection;
pub use errors::{ConfigError, ConnectionError};
pub use in_process::{Frame, InProcessClient, InProcessConnection, in_process};
pub use session::{Session, SessionHandle};
pub use shutdown::ShutdownCoordinator;
pub use stats::SessionStats;

/// Run a session for `conn` until it can no longer be read.
///
/// Blocks the calling task for the whole session and never fails: transport
/// errors, overflow and shutdown all end in the same cleanup, after which the
/// final counters are returned.
pub async fn serve(
    config: Arc<SessionConfig>,
    conn: Arc<dyn Connection>,
    broker: Arc<dyn Broker>,
    requester: Arc<dyn Requester>,
    shutdown: CancellationToken,
) -> SessionStats {
    Session::new(config, conn, broker, requester)
        .run(shutdown)
        .await
}
