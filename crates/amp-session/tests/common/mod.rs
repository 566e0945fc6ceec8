//! Shared broker and requester implementations for integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use amp_core::{Msg, SessionId};
use amp_session::{Broker, Requester, SessionHandle};
use parking_lot::Mutex;

/// Topic fan-out broker keyed by session id.
#[derive(Default)]
pub struct FanoutBroker {
    topics: Mutex<HashMap<String, Vec<SessionHandle>>>,
    unsubscribes: Mutex<Vec<SessionId>>,
}

impl FanoutBroker {
    /// Push to every subscriber of `topic`; returns how many accepted it.
    pub fn publish(&self, topic: &str, ts: i64, body: &str) -> usize {
        let topics = self.topics.lock();
        let Some(subscribers) = topics.get(topic) else {
            return 0;
        };
        subscribers
            .iter()
            .filter(|s| s.send(Msg::publish(topic, ts, body.to_owned())))
            .count()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.lock().get(topic).map_or(0, Vec::len)
    }

    pub fn unsubscribes(&self) -> Vec<SessionId> {
        self.unsubscribes.lock().clone()
    }
}

impl Broker for FanoutBroker {
    fn subscribe(&self, subscriber: &SessionHandle, subscriptions: BTreeMap<String, i64>) {
        let mut topics = self.topics.lock();
        for topic in subscriptions.into_keys() {
            let handles = topics.entry(topic).or_default();
            handles.retain(|h| h.id() != subscriber.id());
            handles.push(subscriber.clone());
        }
    }

    fn unsubscribe(&self, session_id: &SessionId) {
        for handles in self.topics.lock().values_mut() {
            handles.retain(|h| h.id() != session_id);
        }
        self.unsubscribes.lock().push(session_id.clone());
    }
}

/// Requester that replies to each request with its body, from a spawned task.
#[derive(Default)]
pub struct EchoRequester {
    pub requests: AtomicUsize,
    pub unsubscribes: AtomicUsize,
}

impl Requester for EchoRequester {
    fn send(&self, reply_to: &SessionHandle, request: Msg) {
        let _ = self.requests.fetch_add(1, Ordering::SeqCst);
        let reply_to = reply_to.clone();
        drop(tokio::spawn(async move {
            let _ = reply_to.send(Msg::response_to(&request, request.body.clone()));
        }));
    }

    fn unsubscribe(&self, _session_id: &SessionId) {
        let _ = self.unsubscribes.fetch_add(1, Ordering::SeqCst);
    }
}
