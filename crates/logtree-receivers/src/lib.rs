//! logtree-receivers: log source adapters for logtree.
//!
//! Each receiver owns one I/O resource (a tailed file, a listening socket, a
//! search endpoint), parses what arrives on its own Tokio tasks and pushes the
//! resulting [`LogEvent`](logtree_core::LogEvent)s into whatever
//! [`EventSink`] is attached.
//!
//! Receivers are built by name through the [`ReceiverFactory`]:
//!
//! | type       | receiver                 |
//! |------------|--------------------------|
//! | `csv-file` | [`file::FileReceiver`]   |
//! | `csv-tcp`  | [`tcp::TcpReceiver`]     |
//! | `csv-udp`  | [`udp::UdpReceiver`]     |
//! | `search`   | [`search::SearchReceiver`] |

pub mod factory;
pub mod file;
mod lifecycle;
pub mod search;
pub mod tcp;
pub mod udp;

pub use factory::{ReceiverFactory, ReceiverInfo};

use futures::future::BoxFuture;
use logtree_core::EventSink;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

/// Errors raised while setting up or running a receiver.
#[derive(Debug, thiserror::Error)]
pub enum ReceiverError {
    #[error("receivers must be initialised from within a Tokio runtime")]
    NoRuntime,

    #[error("unknown receiver type {0:?}")]
    UnknownKind(String),

    #[error("invalid settings for {kind} receiver: {source}")]
    Settings {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to join multicast group {group}: {source}")]
    Multicast {
        group: IpAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to watch {}: {source}", path.display())]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("invalid search endpoint {uri:?}: {reason}")]
    Endpoint { uri: String, reason: String },

    #[error("search request failed: {0}")]
    Http(#[from] hyper::Error),

    #[error("could not build search request: {0}")]
    Request(#[from] hyper::http::Error),

    #[error("search backend answered {status}: {body}")]
    Status {
        status: hyper::StatusCode,
        body: String,
    },

    #[error("malformed search response: {0}")]
    Response(#[source] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A log source that feeds an [`EventSink`].
///
/// All methods are synchronous; `initialize` binds or opens its resource
/// before returning and spawns the background tasks on the current Tokio
/// runtime.
pub trait Receiver: Send {
    /// Type identifier as used in configuration (`csv-tcp`, ...).
    fn kind(&self) -> &'static str;

    /// Human-readable label for this instance.
    fn display_name(&self) -> String;

    /// Example configuration for the logging library on the sending side.
    fn sample_client_config(&self) -> &'static str;

    /// Open the underlying resource and start receiving. Calling it again
    /// while running does nothing.
    fn initialize(&mut self) -> Result<(), ReceiverError>;

    /// Start delivering events to `sink`, replacing any previous sink.
    fn attach(&mut self, sink: Arc<dyn EventSink>);

    /// Stop delivering events. The receiver keeps running.
    fn detach(&mut self);

    /// Stop all background work and release the resource. Always safe to
    /// call, including after a failed `initialize`.
    fn terminate(&mut self);

    /// Forget per-session state. Most receivers have none.
    fn clear(&mut self) {}

    /// Receivers that can be queried on demand expose that capability here.
    fn as_query_runner(&self) -> Option<Arc<dyn QueryRunner>> {
        None
    }
}

/// On-demand query capability.
pub trait QueryRunner: Send + Sync {
    /// Run one query-and-notify cycle; resolves to the number of new events
    /// delivered to the sink.
    fn run_query(&self) -> BoxFuture<'_, Result<usize, ReceiverError>>;
}
