// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Session seam and the registry the sender flushes from.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::futures::Notified;
use tokio::sync::Notify;

/// A session whose beacon data can be shipped in chunks.
///
/// Implementations are shared between event producers and the sender, so
/// every method takes `&self`. The sender drives one chunk at a time:
/// [`next_chunk`](BeaconSession::next_chunk) hands out the oldest pending
/// data, after which exactly one of
/// [`mark_chunk_sent`](BeaconSession::mark_chunk_sent) or
/// [`reset_chunk`](BeaconSession::reset_chunk) is called.
pub trait BeaconSession: Send + Sync {
    fn session_number(&self) -> i32;

    fn has_pending_data(&self) -> bool;

    /// Returns the next payload of at most `max_size` bytes where possible,
    /// or `None` when nothing is pending.
    fn next_chunk(&self, max_size: usize) -> Option<Vec<u8>>;

    /// Drops the data handed out by the last `next_chunk` call.
    fn mark_chunk_sent(&self);

    /// Returns the data handed out by the last `next_chunk` call to the pending queue.
    fn reset_chunk(&self);
}

pub type SessionRef = Arc<dyn BeaconSession>;

fn same_session(a: &SessionRef, b: &SessionRef) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

#[derive(Default)]
struct Groups {
    open: Vec<SessionRef>,
    finished: Vec<SessionRef>,
}

/// Open and finished sessions, each group in registration order.
#[derive(Default)]
pub struct SessionRegistry {
    groups: Mutex<Groups>,
    finished_signal: Notify,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Groups> {
        self.groups.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a session to the open group.
    pub fn register(&self, session: SessionRef) {
        let mut groups = self.lock();
        if !groups.open.iter().any(|s| same_session(s, &session)) {
            groups.open.push(session);
        }
    }

    /// Moves a session to the finished group and wakes the sender.
    pub fn finish(&self, session: &SessionRef) {
        {
            let mut groups = self.lock();
            groups.open.retain(|s| !same_session(s, session));
            if !groups.finished.iter().any(|s| same_session(s, session)) {
                groups.finished.push(Arc::clone(session));
            }
        }
        self.finished_signal.notify_one();
    }

    /// Drops a finished session once its data is sent or discarded.
    pub fn remove_finished(&self, session: &SessionRef) {
        self.lock().finished.retain(|s| !same_session(s, session));
    }

    pub fn open_snapshot(&self) -> Vec<SessionRef> {
        self.lock().open.clone()
    }

    pub fn finished_snapshot(&self) -> Vec<SessionRef> {
        self.lock().finished.clone()
    }

    pub fn open_count(&self) -> usize {
        self.lock().open.len()
    }

    pub fn finished_count(&self) -> usize {
        self.lock().finished.len()
    }

    pub fn is_empty(&self) -> bool {
        let groups = self.lock();
        groups.open.is_empty() && groups.finished.is_empty()
    }

    /// Forgets every session.
    pub fn clear(&self) {
        let mut groups = self.lock();
        groups.open.clear();
        groups.finished.clear();
    }

    /// Completes once a session was finished since the last wake-up.
    pub fn finished_notified(&self) -> Notified<'_> {
        self.finished_signal.notified()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let groups = self.lock();
        f.debug_struct("SessionRegistry")
            .field("open", &groups.open.len())
            .field("finished", &groups.finished.len())
            .finish()
    }
}
