//! TCP receiver: every accepted connection is an independent CSV stream.

use crate::factory::{self, ReceiverInfo};
use crate::lifecycle::Lifecycle;
use crate::{Receiver, ReceiverError};
use logtree_core::csv::{into_events, CsvConfig, CsvParser};
use logtree_core::{EventSink, SinkSlot};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

pub const KIND: &str = "csv-tcp";

const SAMPLE_CONFIG: &str = "Configuration for NLog:\n\
<target name=\"TcpOutlet\" xsi:type=\"NLogViewer\" address=\"tcp://localhost:4505\"/>";

pub const INFO: ReceiverInfo = ReceiverInfo {
    kind: KIND,
    name: "CSV over TCP",
    description: "Listens for TCP connections; each connection carries CSV log records.",
    sample_config: SAMPLE_CONFIG,
    build,
};

fn build(value: serde_json::Value) -> Result<Box<dyn Receiver>, ReceiverError> {
    Ok(Box::new(TcpReceiver::new(factory::settings(KIND, value)?)))
}

/// Pause after a failed `accept` so a persistent error does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Deserialize)]
pub struct TcpSettings {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub ipv6: bool,
    /// Bind address override; defaults to the unspecified address.
    #[serde(default)]
    pub host: Option<IpAddr>,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default)]
    pub csv: CsvConfig,
}

fn default_port() -> u16 { 4505 }
fn default_buffer_size() -> usize { 10_000 }

impl Default for TcpSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            ipv6: false,
            host: None,
            buffer_size: default_buffer_size(),
            csv: CsvConfig::default(),
        }
    }
}

impl TcpSettings {
    fn bind_addr(&self) -> SocketAddr {
        let ip = self.host.unwrap_or(if self.ipv6 {
            IpAddr::V6(Ipv6Addr::UNSPECIFIED)
        } else {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        });
        SocketAddr::new(ip, self.port)
    }
}

pub struct TcpReceiver {
    settings: TcpSettings,
    sink: SinkSlot,
    lifecycle: Lifecycle,
    local_addr: Option<SocketAddr>,
}

impl TcpReceiver {
    pub fn new(settings: TcpSettings) -> Self {
        Self {
            settings,
            sink: SinkSlot::new(),
            lifecycle: Lifecycle::default(),
            local_addr: None,
        }
    }

    /// The bound address while running. Useful when binding port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

impl Receiver for TcpReceiver {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn display_name(&self) -> String {
        format!("TCP {}", self.local_addr.unwrap_or_else(|| self.settings.bind_addr()))
    }

    fn sample_client_config(&self) -> &'static str {
        SAMPLE_CONFIG
    }

    fn initialize(&mut self) -> Result<(), ReceiverError> {
        if self.lifecycle.is_running() {
            return Ok(());
        }
        let runtime = Lifecycle::runtime()?;

        let addr = self.settings.bind_addr();
        let std_listener =
            std::net::TcpListener::bind(addr).map_err(|source| ReceiverError::Bind { addr, source })?;
        std_listener.set_nonblocking(true)?;
        let local_addr = std_listener.local_addr()?;
        let listener = TcpListener::from_std(std_listener)?;

        let token = self.lifecycle.begin();
        self.local_addr = Some(local_addr);
        debug!(%local_addr, "TCP receiver listening");

        runtime.spawn(accept_loop(
            listener,
            self.sink.clone(),
            self.settings.csv.clone(),
            self.settings.buffer_size.max(1),
            token,
        ));
        Ok(())
    }

    fn attach(&mut self, sink: Arc<dyn EventSink>) {
        self.sink.attach(sink);
    }

    fn detach(&mut self) {
        self.sink.detach();
    }

    fn terminate(&mut self) {
        if self.lifecycle.stop() {
            debug!(addr = ?self.local_addr, "TCP receiver stopped");
        }
        self.local_addr = None;
    }
}

async fn accept_loop(
    listener: TcpListener,
    sink: SinkSlot,
    csv: CsvConfig,
    buffer_size: usize,
    token: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                debug!(%peer, "TCP connection accepted");
                tokio::spawn(read_connection(
                    stream,
                    peer,
                    sink.clone(),
                    CsvParser::new(csv.clone()),
                    buffer_size,
                    token.child_token(),
                ));
            }
            Err(e) => {
                warn!(error = %e, "TCP accept failed");
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(ACCEPT_BACKOFF) => {}
                }
            }
        }
    }
}

async fn read_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    sink: SinkSlot,
    mut parser: CsvParser,
    buffer_size: usize,
    token: CancellationToken,
) {
    let mut buf = vec![0u8; buffer_size];
    loop {
        let read = tokio::select! {
            _ = token.cancelled() => break,
            read = stream.read(&mut buf) => read,
        };

        match read {
            Ok(0) => {
                sink.notify_batch(into_events(parser.finish()));
                debug!(%peer, "TCP connection closed");
                break;
            }
            Ok(n) => {
                trace!(%peer, bytes = n, "TCP chunk");
                sink.notify_batch(into_events(parser.feed(&buf[..n])));
            }
            Err(e) => {
                warn!(%peer, error = %e, "TCP read failed; dropping connection");
                break;
            }
        }
    }
}
