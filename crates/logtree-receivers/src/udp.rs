//! UDP / multicast receiver.
//!
//! Datagrams are grouped into sessions: the first datagram opens one, and
//! further datagrams join it while each arrives within the inactivity timeout.
//! A longer gap closes the session and its text is parsed as one unit. This is
//! a best-effort heuristic for senders that split a record over several
//! datagrams; nothing guarantees a sender pauses between records.

use crate::factory::{self, ReceiverInfo};
use crate::lifecycle::Lifecycle;
use crate::{Receiver, ReceiverError};
use logtree_core::csv::{into_events, CsvConfig, CsvParser};
use logtree_core::{EventSink, SinkSlot};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

pub const KIND: &str = "csv-udp";

/// Largest possible UDP payload; every datagram is read whole.
const MAX_DATAGRAM: usize = 65_535;

const SAMPLE_CONFIG: &str = "Configuration for log4net:\n\
<appender name=\"UdpAppender\" type=\"log4net.Appender.UdpAppender\">\n\
\x20   <remoteAddress value=\"localhost\" />\n\
\x20   <remotePort value=\"7071\" />\n\
\x20   <layout type=\"log4net.Layout.XmlLayoutSchemaLog4j\" />\n\
</appender>";

pub const INFO: ReceiverInfo = ReceiverInfo {
    kind: KIND,
    name: "CSV over UDP",
    description: "Receives CSV log records as UDP datagrams, optionally from a multicast group.",
    sample_config: SAMPLE_CONFIG,
    build,
};

fn build(value: serde_json::Value) -> Result<Box<dyn Receiver>, ReceiverError> {
    Ok(Box::new(UdpReceiver::new(factory::settings(KIND, value)?)))
}

#[derive(Debug, Clone, Deserialize)]
pub struct UdpSettings {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub ipv6: bool,
    #[serde(default)]
    pub host: Option<IpAddr>,
    #[serde(default)]
    pub multicast_group: Option<IpAddr>,
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,
    #[serde(default)]
    pub csv: CsvConfig,
}

fn default_port() -> u16 { 7071 }
fn default_session_timeout_ms() -> u64 { 1000 }

impl Default for UdpSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            ipv6: false,
            host: None,
            multicast_group: None,
            session_timeout_ms: default_session_timeout_ms(),
            csv: CsvConfig::default(),
        }
    }
}

impl UdpSettings {
    fn bind_addr(&self) -> SocketAddr {
        let ip = self.host.unwrap_or(if self.ipv6 {
            IpAddr::V6(Ipv6Addr::UNSPECIFIED)
        } else {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        });
        SocketAddr::new(ip, self.port)
    }
}

pub struct UdpReceiver {
    settings: UdpSettings,
    sink: SinkSlot,
    lifecycle: Lifecycle,
    local_addr: Option<SocketAddr>,
}

impl UdpReceiver {
    pub fn new(settings: UdpSettings) -> Self {
        Self {
            settings,
            sink: SinkSlot::new(),
            lifecycle: Lifecycle::default(),
            local_addr: None,
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn bind(&self) -> Result<std::net::UdpSocket, ReceiverError> {
        let addr = self.settings.bind_addr();
        let socket =
            std::net::UdpSocket::bind(addr).map_err(|source| ReceiverError::Bind { addr, source })?;

        if let Some(group) = self.settings.multicast_group {
            let joined = match group {
                IpAddr::V4(v4) => socket.join_multicast_v4(&v4, &Ipv4Addr::UNSPECIFIED),
                IpAddr::V6(v6) => socket.join_multicast_v6(&v6, 0),
            };
            joined.map_err(|source| ReceiverError::Multicast { group, source })?;
            debug!(%group, "joined multicast group");
        }

        socket.set_nonblocking(true)?;
        Ok(socket)
    }
}

impl Receiver for UdpReceiver {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn display_name(&self) -> String {
        let addr = self.local_addr.unwrap_or_else(|| self.settings.bind_addr());
        match self.settings.multicast_group {
            Some(group) => format!("UDP {addr} (multicast {group})"),
            None => format!("UDP {addr}"),
        }
    }

    fn sample_client_config(&self) -> &'static str {
        SAMPLE_CONFIG
    }

    fn initialize(&mut self) -> Result<(), ReceiverError> {
        if self.lifecycle.is_running() {
            return Ok(());
        }
        let runtime = Lifecycle::runtime()?;

        let std_socket = self.bind()?;
        let local_addr = std_socket.local_addr()?;
        let socket = UdpSocket::from_std(std_socket)?;

        let token = self.lifecycle.begin();
        self.local_addr = Some(local_addr);
        debug!(%local_addr, "UDP receiver listening");

        runtime.spawn(receive_loop(
            socket,
            self.sink.clone(),
            CsvParser::new(self.settings.csv.clone()),
            Duration::from_millis(self.settings.session_timeout_ms),
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
            debug!(addr = ?self.local_addr, "UDP receiver stopped");
        }
        self.local_addr = None;
    }
}

fn append_datagram(session: &mut String, datagram: &[u8]) {
    session.push_str(&String::from_utf8_lossy(datagram));
    session.push('\n');
}

async fn receive_loop(
    socket: UdpSocket,
    sink: SinkSlot,
    mut parser: CsvParser,
    session_timeout: Duration,
    token: CancellationToken,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let first = tokio::select! {
            _ = token.cancelled() => break,
            first = socket.recv_from(&mut buf) => first,
        };
        let mut session = String::new();
        match first {
            Ok((n, peer)) => {
                trace!(%peer, bytes = n, "UDP session opened");
                append_datagram(&mut session, &buf[..n]);
            }
            Err(e) => {
                warn!(error = %e, "UDP receive failed");
                continue;
            }
        }

        loop {
            let next = tokio::select! {
                _ = token.cancelled() => return,
                next = tokio::time::timeout(session_timeout, socket.recv_from(&mut buf)) => next,
            };
            match next {
                Ok(Ok((n, _))) => append_datagram(&mut session, &buf[..n]),
                Ok(Err(e)) => {
                    warn!(error = %e, "UDP receive failed; closing session");
                    break;
                }
                Err(_elapsed) => break,
            }
        }

        sink.notify_batch(into_events(parser.parse_str(&session)));
        parser.reset();
    }
}
