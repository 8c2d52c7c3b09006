//! Registry service: the single task that owns the [`LoggerRegistry`].
//!
//! A fixed interval drains the [`IngestBuffer`] and applies each batch;
//! everything else (toggling loggers, searching, snapshots) arrives as a
//! command over an unbounded channel and is answered on a oneshot. Since only
//! this task ever touches the registry, no further locking is needed.

use crate::buffer::IngestBuffer;
use crate::error::ServiceClosed;
use crate::registry::{LoggerRegistry, RegistrySnapshot};
use crate::types::{LogEvent, LogLevel};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

pub const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_millis(100);

/// Batches of newly visible events fanned out to subscribers.
pub type VisibleBatch = Arc<Vec<LogEvent>>;

const SUBSCRIBER_CAPACITY: usize = 1024;

#[derive(Debug)]
pub enum RegistryCommand {
    SetEnabled {
        path: String,
        enabled: bool,
        response_tx: oneshot::Sender<bool>,
    },
    RemoveLogger {
        path: String,
        response_tx: oneshot::Sender<Option<usize>>,
    },
    ClearAll(oneshot::Sender<usize>),
    SetMinLevel {
        level: LogLevel,
        response_tx: oneshot::Sender<()>,
    },
    Search {
        text: String,
        response_tx: oneshot::Sender<Vec<LogEvent>>,
    },
    Visible(oneshot::Sender<Vec<LogEvent>>),
    Snapshot(oneshot::Sender<RegistrySnapshot>),
    /// Drain the buffer now instead of waiting for the next tick.
    Flush(oneshot::Sender<usize>),
    Shutdown,
}

#[derive(Clone)]
pub struct RegistryHandle {
    tx: mpsc::UnboundedSender<RegistryCommand>,
    events_tx: broadcast::Sender<VisibleBatch>,
}

impl RegistryHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> RegistryCommand,
    ) -> Result<T, ServiceClosed> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx.send(command(response_tx)).map_err(|_| ServiceClosed)?;
        response_rx.await.map_err(|_| ServiceClosed)
    }

    pub async fn set_enabled(&self, path: impl Into<String>, enabled: bool) -> Result<bool, ServiceClosed> {
        let path = path.into();
        self.request(|response_tx| RegistryCommand::SetEnabled {
            path,
            enabled,
            response_tx,
        })
        .await
    }

    pub async fn remove_logger(&self, path: impl Into<String>) -> Result<Option<usize>, ServiceClosed> {
        let path = path.into();
        self.request(|response_tx| RegistryCommand::RemoveLogger { path, response_tx })
            .await
    }

    pub async fn clear_all(&self) -> Result<usize, ServiceClosed> {
        self.request(RegistryCommand::ClearAll).await
    }

    pub async fn set_min_level(&self, level: LogLevel) -> Result<(), ServiceClosed> {
        self.request(|response_tx| RegistryCommand::SetMinLevel { level, response_tx })
            .await
    }

    pub async fn search(&self, text: impl Into<String>) -> Result<Vec<LogEvent>, ServiceClosed> {
        let text = text.into();
        self.request(|response_tx| RegistryCommand::Search { text, response_tx })
            .await
    }

    pub async fn visible(&self) -> Result<Vec<LogEvent>, ServiceClosed> {
        self.request(RegistryCommand::Visible).await
    }

    pub async fn snapshot(&self) -> Result<RegistrySnapshot, ServiceClosed> {
        self.request(RegistryCommand::Snapshot).await
    }

    /// Drain pending events immediately; returns how many were applied.
    pub async fn flush(&self) -> Result<usize, ServiceClosed> {
        self.request(RegistryCommand::Flush).await
    }

    /// Receive every subsequently applied batch of visible events.
    pub fn subscribe(&self) -> broadcast::Receiver<VisibleBatch> {
        self.events_tx.subscribe()
    }

    pub fn shutdown(&self) -> Result<(), ServiceClosed> {
        self.tx.send(RegistryCommand::Shutdown).map_err(|_| ServiceClosed)
    }
}

pub struct RegistryService {
    registry: LoggerRegistry,
    buffer: Arc<IngestBuffer>,
    rx: mpsc::UnboundedReceiver<RegistryCommand>,
    events_tx: broadcast::Sender<VisibleBatch>,
    drain_interval: Duration,
}

impl RegistryService {
    pub fn new(buffer: Arc<IngestBuffer>, drain_interval: Duration) -> (Self, RegistryHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(SUBSCRIBER_CAPACITY);

        let service = Self {
            registry: LoggerRegistry::new(),
            buffer,
            rx,
            events_tx: events_tx.clone(),
            drain_interval,
        };
        let handle = RegistryHandle { tx, events_tx };

        (service, handle)
    }

    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.registry.set_min_level(level);
        self
    }

    /// Run until shut down or every handle is dropped. Pending events are
    /// applied one last time and the registry is handed back.
    pub async fn run(mut self) -> LoggerRegistry {
        debug!(interval_ms = self.drain_interval.as_millis() as u64, "registry service started");

        let mut ticker = tokio::time::interval(self.drain_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.drain();
                }
                command = self.rx.recv() => match command {
                    Some(RegistryCommand::Shutdown) | None => break,
                    Some(command) => self.handle(command),
                },
            }
        }

        self.drain();
        debug!(events = self.registry.len(), "registry service stopped");
        self.registry
    }

    fn drain(&mut self) -> usize {
        let batch = self.buffer.drain();
        if batch.is_empty() {
            return 0;
        }
        let applied = batch.len();
        let visible = self.registry.apply_batch(batch);
        trace!(applied, visible = visible.len(), "applied batch");
        if !visible.is_empty() {
            // No subscribers is fine.
            let _ = self.events_tx.send(Arc::new(visible));
        }
        applied
    }

    fn handle(&mut self, command: RegistryCommand) {
        let delivered = match command {
            RegistryCommand::SetEnabled {
                path,
                enabled,
                response_tx,
            } => response_tx.send(self.registry.set_enabled(&path, enabled)).is_ok(),
            RegistryCommand::RemoveLogger { path, response_tx } => {
                response_tx.send(self.registry.remove_logger(&path)).is_ok()
            }
            RegistryCommand::ClearAll(response_tx) => response_tx.send(self.registry.clear_all()).is_ok(),
            RegistryCommand::SetMinLevel { level, response_tx } => {
                self.registry.set_min_level(level);
                response_tx.send(()).is_ok()
            }
            RegistryCommand::Search { text, response_tx } => {
                let hits = self.registry.search(&text).into_iter().cloned().collect();
                response_tx.send(hits).is_ok()
            }
            RegistryCommand::Visible(response_tx) => {
                let events = self.registry.visible().into_iter().cloned().collect();
                response_tx.send(events).is_ok()
            }
            RegistryCommand::Snapshot(response_tx) => response_tx.send(self.registry.snapshot()).is_ok(),
            RegistryCommand::Flush(response_tx) => {
                let applied = self.drain();
                response_tx.send(applied).is_ok()
            }
            RegistryCommand::Shutdown => true,
        };
        if !delivered {
            warn!("registry reply dropped; requester went away");
        }
    }
}
