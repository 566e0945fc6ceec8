//! Recording fakes for the broker and requester capabilities.

use std::collections::BTreeMap;

use amp_core::{Msg, SessionId};
use parking_lot::Mutex;

use crate::broker::{Broker, Requester};
use crate::session::SessionHandle;

/// Broker that remembers every call and the last handle it was given.
#[derive(Default)]
pub(crate) struct RecordingBroker {
    pub subscriptions: Mutex<Vec<(SessionId, BTreeMap<String, i64>)>>,
    pub subscriber: Mutex<Option<SessionHandle>>,
    pub unsubscribed: Mutex<Vec<SessionId>>,
}

impl Broker for RecordingBroker {
    fn subscribe(&self, subscriber: &SessionHandle, subscriptions: BTreeMap<String, i64>) {
        self.subscriptions
            .lock()
            .push((subscriber.id().clone(), subscriptions));
        *self.subscriber.lock() = Some(subscriber.clone());
    }

    fn unsubscribe(&self, session_id: &SessionId) {
        self.unsubscribed.lock().push(session_id.clone());
    }
}

/// Requester that answers every request with its own body.
#[derive(Default)]
pub(crate) struct EchoRequester {
    pub requests: Mutex<Vec<(SessionId, Msg)>>,
    pub unsubscribed: Mutex<Vec<SessionId>>,
}

impl Requester for EchoRequester {
    fn send(&self, reply_to: &SessionHandle, request: Msg) {
        let _ = reply_to.send(Msg::response_to(&request, request.body.clone()));
        self.requests.lock().push((reply_to.id().clone(), request));
    }

    fn unsubscribe(&self, session_id: &SessionId) {
        self.unsubscribed.lock().push(session_id.clone());
    }
}
