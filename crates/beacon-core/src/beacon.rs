// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory beacon buffer.
//!
//! A beacon is a fixed per-session prefix followed by `&`-joined serialized
//! events. Chunks never split an event: each chunk repeats the prefix and
//! carries as many whole events as fit the size limit. An event that alone
//! exceeds the limit is shipped as its own chunk.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::session::BeaconSession;

const EVENT_SEPARATOR: char = '&';

#[derive(Debug, Default)]
struct Buffer {
    pending: VecDeque<String>,
    in_flight: Vec<String>,
}

impl Buffer {
    fn restore_in_flight(&mut self) {
        for event in self.in_flight.drain(..).rev() {
            self.pending.push_front(event);
        }
    }
}

#[derive(Debug)]
pub struct Beacon {
    session_number: i32,
    prefix: String,
    buffer: Mutex<Buffer>,
}

impl Beacon {
    pub fn new(session_number: i32, prefix: impl Into<String>) -> Self {
        Self {
            session_number,
            prefix: prefix.into(),
            buffer: Mutex::new(Buffer::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Buffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends one serialized event.
    pub fn add_event(&self, event: impl Into<String>) {
        self.lock().pending.push_back(event.into());
    }

    /// Number of events not yet handed out or sent.
    pub fn pending_events(&self) -> usize {
        self.lock().pending.len()
    }

    /// Drops every buffered event, including a chunk in flight.
    pub fn clear(&self) {
        let mut buffer = self.lock();
        buffer.pending.clear();
        buffer.in_flight.clear();
    }
}

impl BeaconSession for Beacon {
    fn session_number(&self) -> i32 {
        self.session_number
    }

    fn has_pending_data(&self) -> bool {
        let buffer = self.lock();
        !buffer.pending.is_empty() || !buffer.in_flight.is_empty()
    }

    fn next_chunk(&self, max_size: usize) -> Option<Vec<u8>> {
        let mut buffer = self.lock();
        buffer.restore_in_flight();

        let mut chunk = self.prefix.clone();
        while let Some(event) = buffer.pending.front() {
            let grown = chunk.len() + EVENT_SEPARATOR.len_utf8() + event.len();
            if grown > max_size && !buffer.in_flight.is_empty() {
                break;
            }
            chunk.push(EVENT_SEPARATOR);
            chunk.push_str(event);
            if let Some(event) = buffer.pending.pop_front() {
                buffer.in_flight.push(event);
            }
        }

        if buffer.in_flight.is_empty() {
            None
        } else {
            Some(chunk.into_bytes())
        }
    }

    fn mark_chunk_sent(&self) {
        self.lock().in_flight.clear();
    }

    fn reset_chunk(&self) {
        self.lock().restore_in_flight();
    }
}
