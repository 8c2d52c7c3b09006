//! Search backend receiver.
//!
//! Polls an Elasticsearch-style `_search` endpoint for log documents, either
//! on demand through [`QueryRunner`] or continuously on a fixed period. Hits
//! are deduplicated by document id across the whole session, so overlapping
//! time windows never deliver the same document twice.

pub mod backend;
pub mod mapping;

pub use backend::{HttpSearchBackend, QuerySpec, SearchBackend, SearchHit, SearchRequest, SearchResponse};
pub use mapping::{hit_timestamp, map_hit, SEARCH_LOGGER};

use crate::factory::{self, ReceiverInfo};
use crate::lifecycle::Lifecycle;
use crate::{QueryRunner, Receiver, ReceiverError};
use chrono::{DateTime, TimeDelta, Utc};
use futures::future::BoxFuture;
use logtree_core::{EventSink, LogEvent, SinkSlot};
use serde::Deserialize;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const KIND: &str = "search";

pub const INFO: ReceiverInfo = ReceiverInfo {
    kind: KIND,
    name: "Search backend",
    description: "Queries an Elasticsearch-compatible search API for log documents.",
    sample_config: "",
    build,
};

fn build(value: serde_json::Value) -> Result<Box<dyn Receiver>, ReceiverError> {
    Ok(Box::new(SearchReceiver::new(factory::settings(KIND, value)?)))
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchSettings {
    #[serde(default = "default_node_uri")]
    pub node_uri: String,
    #[serde(default = "default_index")]
    pub index: String,
    #[serde(default = "default_document_type")]
    pub document_type: String,
    #[serde(default)]
    pub raw_query: Option<String>,
    #[serde(default = "default_size")]
    pub size: usize,
    #[serde(default = "default_refresh_period_ms")]
    pub refresh_period_ms: u64,
    #[serde(default)]
    pub run_continuously: bool,
    /// Only documents newer than `now - recent_window_secs`.
    #[serde(default)]
    pub recent_window_secs: Option<u64>,
    #[serde(default)]
    pub oldest_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub newest_time: Option<DateTime<Utc>>,
    /// Emit an event describing each manually triggered request.
    #[serde(default)]
    pub log_query: bool,
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,
    #[serde(default = "default_max_seen_ids")]
    pub max_seen_ids: usize,
}

fn default_node_uri() -> String { "http://localhost:9200".to_string() }
fn default_index() -> String { "logstash-*".to_string() }
fn default_document_type() -> String { "logevent".to_string() }
fn default_size() -> usize { 500 }
fn default_refresh_period_ms() -> u64 { 5000 }
fn default_timestamp_field() -> String { "@timestamp".to_string() }
fn default_max_seen_ids() -> usize { 100_000 }

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            node_uri: default_node_uri(),
            index: default_index(),
            document_type: default_document_type(),
            raw_query: None,
            size: default_size(),
            refresh_period_ms: default_refresh_period_ms(),
            run_continuously: false,
            recent_window_secs: None,
            oldest_time: None,
            newest_time: None,
            log_query: false,
            timestamp_field: default_timestamp_field(),
            max_seen_ids: default_max_seen_ids(),
        }
    }
}

/// Time window for one query: `(exclusive lower, exclusive upper)`.
///
/// The lower bound is the latest of the configured oldest time, the recent
/// window and, for continuous polling, the newest document seen so far. The
/// upper bound is the earlier of now and the configured newest time.
pub fn query_bounds(
    settings: &SearchSettings,
    now: DateTime<Utc>,
    newest_seen: Option<DateTime<Utc>>,
) -> (Option<DateTime<Utc>>, DateTime<Utc>) {
    let recent = settings
        .recent_window_secs
        .and_then(|secs| TimeDelta::try_seconds(i64::try_from(secs).ok()?))
        .and_then(|window| now.checked_sub_signed(window));

    let lower = [settings.oldest_time, recent, newest_seen]
        .into_iter()
        .flatten()
        .max();
    let upper = settings.newest_time.map_or(now, |newest| newest.min(now));
    (lower, upper)
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Document ids already delivered, evicting the oldest beyond `capacity`.
#[derive(Debug)]
struct SeenIds {
    order: VecDeque<String>,
    set: HashSet<String>,
    capacity: usize,
}

impl SeenIds {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            set: HashSet::new(),
            capacity: capacity.max(1),
        }
    }

    /// Returns `false` if the id was already present.
    fn insert(&mut self, id: &str) -> bool {
        if self.set.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.set.remove(&oldest);
            }
        }
        self.order.push_back(id.to_string());
        self.set.insert(id.to_string());
        true
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    fn clear(&mut self) {
        self.order.clear();
        self.set.clear();
    }
}

#[derive(Debug)]
struct PollState {
    seen: SeenIds,
    newest: Option<DateTime<Utc>>,
    queries: u64,
    notified: u64,
}

/// Counters for one search session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollStats {
    pub queries: u64,
    pub notified: u64,
    pub seen_ids: usize,
    pub newest: Option<DateTime<Utc>>,
}

/// The shared half of a search receiver: runs queries and owns the dedup
/// state. Manual queries and the continuous loop both go through here.
pub struct SearchPoller {
    settings: SearchSettings,
    backend: Arc<dyn SearchBackend>,
    sink: SinkSlot,
    state: Mutex<PollState>,
}

impl SearchPoller {
    fn new(settings: SearchSettings, backend: Arc<dyn SearchBackend>, sink: SinkSlot) -> Self {
        let state = PollState {
            seen: SeenIds::new(settings.max_seen_ids),
            newest: None,
            queries: 0,
            notified: 0,
        };
        Self {
            settings,
            backend,
            sink,
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> MutexGuard<'_, PollState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn stats(&self) -> PollStats {
        let state = self.state();
        PollStats {
            queries: state.queries,
            notified: state.notified,
            seen_ids: state.seen.len(),
            newest: state.newest,
        }
    }

    pub fn clear(&self) {
        let mut state = self.state();
        state.seen.clear();
        state.newest = None;
        state.queries = 0;
        state.notified = 0;
    }

    fn request(&self, from_loop: bool) -> SearchRequest {
        let newest_seen = if from_loop { self.state().newest } else { None };
        let (after, before) = query_bounds(&self.settings, Utc::now(), newest_seen);
        SearchRequest::build(&QuerySpec {
            index: &self.settings.index,
            document_type: &self.settings.document_type,
            raw_query: self.settings.raw_query.as_deref(),
            size: self.settings.size,
            timestamp_field: &self.settings.timestamp_field,
            after,
            before,
        })
    }

    fn describe(&self, request: &SearchRequest) -> LogEvent {
        let mut event = LogEvent::new(format!(
            "Invoked search query:\n{}{}\n{}",
            self.backend.endpoint(),
            request.path,
            request.body
        ))
        .with_logger(SEARCH_LOGGER);
        event.call_site_class = Some(SEARCH_LOGGER.to_string());
        event
    }

    /// One query-and-notify cycle. Returns the number of new events.
    pub async fn run_cycle(&self, from_loop: bool) -> Result<usize, ReceiverError> {
        let request = self.request(from_loop);
        if self.settings.log_query && !from_loop {
            self.sink.notify(self.describe(&request));
        }

        let response = self.backend.search(&request).await?;

        // Hits are only marked seen once they can be delivered.
        if !self.sink.is_attached() {
            self.state().queries += 1;
            debug!(hits = response.hits.hits.len(), "search cycle finished without a sink");
            return Ok(0);
        }

        let events = {
            let mut state = self.state();
            state.queries += 1;
            let mut events = Vec::new();
            for hit in &response.hits.hits {
                if !state.seen.insert(&hit.id) {
                    continue;
                }
                if let Some(stamp) = hit_timestamp(hit, &self.settings.timestamp_field) {
                    if state.newest.map_or(true, |newest| stamp > newest) {
                        state.newest = Some(stamp);
                    }
                }
                events.push(map_hit(hit, &self.settings.timestamp_field));
            }
            state.notified += events.len() as u64;
            events
        };

        let delivered = events.len();
        debug!(
            hits = response.hits.hits.len(),
            new = delivered,
            "search cycle finished"
        );
        self.sink.notify_batch(events);
        Ok(delivered)
    }
}

impl QueryRunner for SearchPoller {
    fn run_query(&self) -> BoxFuture<'_, Result<usize, ReceiverError>> {
        Box::pin(self.run_cycle(false))
    }
}

async fn poll_loop(poller: Arc<SearchPoller>, period: Duration, token: CancellationToken) {
    loop {
        if let Err(e) = poller.run_cycle(true).await {
            warn!(error = %e, "search cycle failed");
        }
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(period) => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Receiver
// ---------------------------------------------------------------------------

pub struct SearchReceiver {
    settings: SearchSettings,
    sink: SinkSlot,
    lifecycle: Lifecycle,
    backend: Option<Arc<dyn SearchBackend>>,
    poller: Option<Arc<SearchPoller>>,
}

impl SearchReceiver {
    pub fn new(settings: SearchSettings) -> Self {
        Self {
            settings,
            sink: SinkSlot::new(),
            lifecycle: Lifecycle::default(),
            backend: None,
            poller: None,
        }
    }

    /// Use `backend` instead of an HTTP client built from `node_uri`.
    pub fn with_backend(settings: SearchSettings, backend: Arc<dyn SearchBackend>) -> Self {
        Self {
            backend: Some(backend),
            ..Self::new(settings)
        }
    }

    pub fn stats(&self) -> Option<PollStats> {
        self.poller.as_ref().map(|p| p.stats())
    }
}

impl Receiver for SearchReceiver {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn display_name(&self) -> String {
        format!("Search {} [{}]", self.settings.node_uri, self.settings.index)
    }

    fn sample_client_config(&self) -> &'static str {
        INFO.sample_config
    }

    fn initialize(&mut self) -> Result<(), ReceiverError> {
        if self.lifecycle.is_running() {
            return Ok(());
        }
        let runtime = Lifecycle::runtime()?;

        let backend: Arc<dyn SearchBackend> = match &self.backend {
            Some(backend) => backend.clone(),
            None => Arc::new(HttpSearchBackend::new(&self.settings.node_uri)?),
        };
        let poller = Arc::new(SearchPoller::new(
            self.settings.clone(),
            backend,
            self.sink.clone(),
        ));

        let token = self.lifecycle.begin();
        if self.settings.run_continuously {
            let period = Duration::from_millis(self.settings.refresh_period_ms.max(1));
            runtime.spawn(poll_loop(poller.clone(), period, token));
        }
        debug!(node = %self.settings.node_uri, continuous = self.settings.run_continuously, "search receiver ready");
        self.poller = Some(poller);
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
            debug!(node = %self.settings.node_uri, "search receiver stopped");
        }
        self.poller = None;
    }

    fn clear(&mut self) {
        if let Some(poller) = &self.poller {
            poller.clear();
        }
    }

    fn as_query_runner(&self) -> Option<Arc<dyn QueryRunner>> {
        self.poller.clone().map(|p| p as Arc<dyn QueryRunner>)
    }
}
