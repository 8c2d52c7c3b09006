//! Wiring: receivers into the buffer, the registry service on a task, visible
//! batches to the printer.

use crate::output::{render_tree, EventPrinter};
use anyhow::Context;
use logtree_core::config::{Config, ReceiverSpec};
use logtree_core::{EventSink, IngestBuffer, RegistryService, RegistrySnapshot};
use logtree_receivers::{QueryRunner, Receiver, ReceiverFactory};
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

/// The receivers that started successfully.
#[derive(Default)]
pub struct ReceiverSet {
    running: Vec<Box<dyn Receiver>>,
}

impl ReceiverSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialise `receiver` and attach it to `sink`. A receiver that fails
    /// to initialise is terminated and not kept.
    pub fn add(&mut self, mut receiver: Box<dyn Receiver>, sink: Arc<dyn EventSink>) -> anyhow::Result<()> {
        let name = receiver.display_name();
        if let Err(e) = receiver.initialize() {
            receiver.terminate();
            return Err(e).with_context(|| format!("receiver {name} failed to start"));
        }
        receiver.attach(sink);
        info!(receiver = %name, kind = receiver.kind(), "receiver started");
        self.running.push(receiver);
        Ok(())
    }

    /// Build and start every configured receiver. Failures are returned one
    /// per receiver; the rest keep running.
    pub fn start_all(
        &mut self,
        factory: &ReceiverFactory,
        specs: &[ReceiverSpec],
        sink: Arc<dyn EventSink>,
    ) -> Vec<anyhow::Error> {
        let mut failures = Vec::new();
        for spec in specs {
            let built = factory
                .create(&spec.kind, spec.settings_value())
                .with_context(|| format!("invalid {} receiver", spec.kind));
            let result = built.and_then(|receiver| self.add(receiver, sink.clone()));
            if let Err(e) = result {
                failures.push(e);
            }
        }
        failures
    }

    pub fn len(&self) -> usize {
        self.running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.running.iter().map(|r| r.display_name()).collect()
    }

    /// Query runners of the receivers that support on-demand queries.
    pub fn query_runners(&self) -> Vec<(String, Arc<dyn QueryRunner>)> {
        self.running
            .iter()
            .filter_map(|r| r.as_query_runner().map(|q| (r.display_name(), q)))
            .collect()
    }

    pub fn clear_all(&mut self) {
        for receiver in &mut self.running {
            receiver.clear();
        }
    }

    pub fn terminate_all(&mut self) {
        for mut receiver in self.running.drain(..) {
            receiver.detach();
            receiver.terminate();
            debug!(receiver = %receiver.display_name(), "receiver terminated");
        }
    }
}

impl Drop for ReceiverSet {
    fn drop(&mut self) {
        self.terminate_all();
    }
}

/// Run until `shutdown` resolves, printing visible events to `out`. Returns
/// the final state of the logger tree.
///
/// Receivers that fail to start are logged and skipped. Query-capable
/// receivers run one query at startup.
pub async fn run<W, F>(config: &Config, out: W, shutdown: F) -> anyhow::Result<RegistrySnapshot>
where
    W: Write,
    F: Future<Output = ()>,
{
    let buffer = Arc::new(IngestBuffer::new());
    let (service, handle) = RegistryService::new(buffer.clone(), config.drain_interval());
    let service = service.with_min_level(config.ingest.min_level);
    let mut batches = handle.subscribe();
    let service_task = tokio::spawn(service.run());

    let mut receivers = ReceiverSet::new();
    for failure in receivers.start_all(&ReceiverFactory::new(), &config.receivers, buffer.clone()) {
        error!("{failure:#}");
    }
    if receivers.is_empty() {
        warn!("no receivers are running");
    }

    for (name, runner) in receivers.query_runners() {
        tokio::spawn(async move {
            match runner.run_query().await {
                Ok(n) => debug!(receiver = %name, events = n, "initial query finished"),
                Err(e) => warn!(receiver = %name, error = %e, "initial query failed"),
            }
        });
    }

    let mut printer = EventPrinter::new(out, config.output.clone());
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            batch = batches.recv() => match batch {
                Ok(batch) => printer.print_batch(&batch)?,
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "output fell behind; batches dropped"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    receivers.terminate_all();
    // Whatever arrived before the receivers stopped still gets printed.
    if handle.flush().await.is_ok() {
        while let Ok(batch) = batches.try_recv() {
            printer.print_batch(&batch)?;
        }
    }
    // Already stopped if the service exited on its own.
    let _ = handle.shutdown();
    let registry = service_task.await.context("registry service panicked")?;
    Ok(registry.snapshot())
}

/// [`run`] against stdout until ctrl-c, then print the logger tree.
pub async fn run_until_ctrl_c(config: &Config) -> anyhow::Result<()> {
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    let snapshot = run(config, std::io::stdout(), shutdown).await?;
    print!("{}", render_tree(&snapshot));
    Ok(())
}
