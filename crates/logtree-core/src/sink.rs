//! Event sinks: where receivers deliver what they parse.

use crate::types::LogEvent;
use std::sync::{Arc, RwLock};

/// Destination for parsed events. Implementations must not block the caller
/// for longer than a short critical section.
pub trait EventSink: Send + Sync {
    fn notify(&self, event: LogEvent);

    fn notify_batch(&self, events: Vec<LogEvent>) {
        for event in events {
            self.notify(event);
        }
    }
}

/// A swappable sink reference shared between a receiver and its tasks.
///
/// While detached, events are dropped on the floor.
#[derive(Clone, Default)]
pub struct SinkSlot(Arc<RwLock<Option<Arc<dyn EventSink>>>>);

impl SinkSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, sink: Arc<dyn EventSink>) {
        let mut slot = self.0.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(sink);
    }

    pub fn detach(&self) {
        let mut slot = self.0.write().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }

    pub fn is_attached(&self) -> bool {
        self.0.read().map(|s| s.is_some()).unwrap_or(false)
    }

    fn current(&self) -> Option<Arc<dyn EventSink>> {
        self.0.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn notify(&self, event: LogEvent) {
        if let Some(sink) = self.current() {
            sink.notify(event);
        }
    }

    /// Forward a batch; empty batches are skipped.
    pub fn notify_batch(&self, events: Vec<LogEvent>) {
        if events.is_empty() {
            return;
        }
        if let Some(sink) = self.current() {
            sink.notify_batch(events);
        }
    }
}

impl std::fmt::Debug for SinkSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkSlot")
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Collects everything it is given. Handy in tests and for one-shot parsing.
#[derive(Debug, Default)]
pub struct VecSink(std::sync::Mutex<Vec<LogEvent>>);

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<LogEvent> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn len(&self) -> usize {
        self.0.lock().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for VecSink {
    fn notify(&self, event: LogEvent) {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).push(event);
    }

    fn notify_batch(&self, events: Vec<LogEvent>) {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).extend(events);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_slot_discards_events() {
        let slot = SinkSlot::new();
        let sink = Arc::new(VecSink::new());
        slot.notify(LogEvent::new("lost"));

        slot.attach(sink.clone());
        assert!(slot.is_attached());
        slot.notify(LogEvent::new("kept"));
        slot.notify_batch(vec![LogEvent::new("a"), LogEvent::new("b")]);

        slot.detach();
        slot.notify(LogEvent::new("lost again"));

        let got: Vec<_> = sink.take().into_iter().map(|e| e.message).collect();
        assert_eq!(got, vec!["kept", "a", "b"]);
    }

    #[test]
    fn clones_share_the_same_slot() {
        let slot = SinkSlot::new();
        let task_side = slot.clone();
        let sink = Arc::new(VecSink::new());
        slot.attach(sink.clone());
        task_side.notify(LogEvent::new("from task"));
        assert_eq!(sink.len(), 1);
    }
}
