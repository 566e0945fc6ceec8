//! Capabilities the session dispatches inbound traffic to.
//!
//! Both collaborators receive a [`SessionHandle`] and push replies or
//! published data back through [`SessionHandle::send`], from any task and at
//! any time, until they observe `unsubscribe` for that session's id.

use std::collections::BTreeMap;

use amp_core::{Msg, SessionId};

use crate::session::SessionHandle;

/// Publish/subscribe broker.
pub trait Broker: Send + Sync + 'static {
    /// Register (or replace) the topics `subscriber` wants pushed.
    ///
    /// `subscriptions` maps topic to the last sequence number the client has seen.
    fn subscribe(&self, subscriber: &SessionHandle, subscriptions: BTreeMap<String, i64>);

    /// Forget every subscription of `session_id`.
    fn unsubscribe(&self, session_id: &SessionId);
}

/// Request/response dispatcher.
pub trait Requester: Send + Sync + 'static {
    /// Route `request`; the response goes to `reply_to`.
    fn send(&self, reply_to: &SessionHandle, request: Msg);

    /// Drop any pending replies for `session_id`.
    fn unsubscribe(&self, session_id: &SessionId);
}
