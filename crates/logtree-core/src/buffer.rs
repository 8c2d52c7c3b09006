//! Ingestion buffer: the only structure producers and the registry share.
//!
//! Producers enqueue under a short mutex; the registry service swaps the whole
//! queue out on each tick and applies it without holding the lock.

use crate::sink::EventSink;
use crate::types::LogEvent;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Queue {
    events: Vec<LogEvent>,
    next_sequence: u64,
}

impl Queue {
    fn push(&mut self, mut event: LogEvent) {
        if event.sequence_nr.is_none() {
            event.sequence_nr = Some(self.next_sequence);
            self.next_sequence += 1;
        }
        self.events.push(event);
    }
}

/// Thread-safe FIFO of pending events.
#[derive(Debug, Default)]
pub struct IngestBuffer {
    queue: Mutex<Queue>,
}

impl IngestBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Take every pending event, oldest first.
    pub fn drain(&self) -> Vec<LogEvent> {
        std::mem::take(&mut self.lock().events)
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().events.is_empty()
    }
}

impl EventSink for IngestBuffer {
    fn notify(&self, event: LogEvent) {
        self.lock().push(event);
    }

    fn notify_batch(&self, events: Vec<LogEvent>) {
        let mut queue = self.lock();
        for event in events {
            queue.push(event);
        }
    }
}
