//! Metric names recorded through the `metrics` facade.
//!
//! The library records but never installs a recorder; the embedding service
//! chooses the exporter.

/// Sessions started (counter).
pub const SESSIONS_TOTAL: &str = "amp_sessions_total";
/// Sessions currently running (gauge).
pub const SESSIONS_ACTIVE: &str = "amp_sessions_active";
/// Sessions closed for output queue overflow (counter).
pub const SESSION_OVERFLOWS_TOTAL: &str = "amp_session_overflows_total";
/// Inbound messages dispatched (counter).
pub const SESSION_MESSAGES_IN_TOTAL: &str = "amp_session_messages_in_total";
/// Outbound messages written (counter).
pub const SESSION_MESSAGES_OUT_TOTAL: &str = "amp_session_messages_out_total";
/// Alive messages queued by the heartbeat (counter).
pub const SESSION_ALIVE_TOTAL: &str = "amp_session_alive_total";
/// Inbound frames dropped because they failed to decode (counter).
pub const SESSION_DROPPED_FRAMES_TOTAL: &str = "amp_session_dropped_frames_total";
/// Session lifetime in seconds (histogram).
pub const SESSION_DURATION_SECONDS: &str = "amp_session_duration_seconds";
