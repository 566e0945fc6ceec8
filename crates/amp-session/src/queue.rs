//! Output queue with overflow shedding.
//!
//! Any task may push; only the session loop pops. Every access goes through
//! one mutex, including the length checks used for overflow and stats.
//! Pushing never blocks: the wake-up signal to the loop is a `try_send` on a
//! capacity-1 channel, and a dropped wake-up is harmless because the loop
//! polls the queue at the top of every iteration.

use std::collections::VecDeque;
use std::sync::Arc;

use amp_core::Msg;
use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::connection::Connection;
use crate::metrics::SESSION_OVERFLOWS_TOTAL;

/// Why a message was not queued.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Rejected {
    /// The queue overflowed earlier and the connection is being torn down.
    Overflowed,
    /// The session loop has finished.
    Terminated,
}

#[derive(Default)]
struct QueueState {
    messages: VecDeque<Arc<Msg>>,
    max_len: usize,
    alive_sent: u64,
    rejected: u64,
    overflowed: bool,
    terminated: bool,
}

/// Counters read once the session ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct QueueTotals {
    pub max_len: usize,
    pub alive_sent: u64,
    pub rejected: u64,
    pub overflowed: bool,
}

pub(crate) struct OutQueue {
    state: Mutex<QueueState>,
    changed: mpsc::Sender<()>,
    max_depth: usize,
    conn: Arc<dyn Connection>,
}

impl OutQueue {
    /// Create a queue and the receiver the loop waits on for wake-ups.
    pub(crate) fn new(max_depth: usize, conn: Arc<dyn Connection>) -> (Self, mpsc::Receiver<()>) {
        let (changed, changed_rx) = mpsc::channel(1);
        let queue = Self {
            state: Mutex::new(QueueState::default()),
            changed,
            max_depth,
            conn,
        };
        (queue, changed_rx)
    }

    /// Append `msg` and wake the loop.
    ///
    /// The first push that takes the length past the maximum closes the
    /// connection and drops the backlog; later pushes are rejected.
    pub(crate) fn push(&self, msg: Arc<Msg>) -> Result<(), Rejected> {
        let mut state = self.state.lock();
        self.push_locked(&mut state, msg)
    }

    /// Queue an alive message if nothing is waiting to be written.
    ///
    /// `slot_empty` tells whether the loop's hand-off slot is also empty.
    pub(crate) fn push_alive_if_idle(&self, slot_empty: bool) -> bool {
        let mut state = self.state.lock();
        if !slot_empty || !state.messages.is_empty() {
            return false;
        }
        if self.push_locked(&mut state, Arc::new(Msg::alive())).is_err() {
            return false;
        }
        state.alive_sent += 1;
        true
    }

    fn push_locked(&self, state: &mut QueueState, msg: Arc<Msg>) -> Result<(), Rejected> {
        if state.terminated {
            state.rejected += 1;
            return Err(Rejected::Terminated);
        }
        if state.overflowed {
            state.rejected += 1;
            return Err(Rejected::Overflowed);
        }
        state.messages.push_back(msg);
        let _ = self.changed.try_send(());

        let len = state.messages.len();
        state.max_len = state.max_len.max(len);
        if len > self.max_depth {
            state.overflowed = true;
            state.messages.clear();
            self.conn.close();
            counter!(SESSION_OVERFLOWS_TOTAL).increment(1);
            info!(len, "out queue overflow");
        }
        Ok(())
    }

    /// Move the head into `slot` if the slot has room.
    ///
    /// Leaves the queue untouched when the slot is still occupied.
    pub(crate) fn try_pop(&self, slot: &mpsc::Sender<Arc<Msg>>) {
        let mut state = self.state.lock();
        if state.messages.is_empty() {
            return;
        }
        if let Ok(permit) = slot.try_reserve() {
            if let Some(msg) = state.messages.pop_front() {
                permit.send(msg);
            }
        }
    }

    /// Whether pushes are refused, after overflow or termination.
    pub(crate) fn is_closed(&self) -> bool {
        let state = self.state.lock();
        state.overflowed || state.terminated
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.state.lock().messages.len()
    }

    /// Refuse further pushes, drop leftovers and report totals.
    pub(crate) fn terminate(&self) -> QueueTotals {
        let mut state = self.state.lock();
        state.terminated = true;
        let leftover = state.messages.len();
        if leftover > 0 {
            debug!(leftover, "discarding unsent messages");
            state.messages.clear();
        }
        state.totals()
    }

    #[cfg(test)]
    pub(crate) fn totals(&self) -> QueueTotals {
        self.state.lock().totals()
    }
}

impl QueueState {
    fn totals(&self) -> QueueTotals {
        QueueTotals {
            max_len: self.max_len,
            alive_sent: self.alive_sent,
            rejected: self.rejected,
            overflowed: self.overflowed,
        }
    }
}
