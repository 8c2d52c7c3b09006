//! Search request/response shapes and the HTTP backend.

use crate::ReceiverError;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::BoxFuture;
use http_body_util::{BodyExt, Full};
use hyper::header::{CONTENT_TYPE, HOST};
use hyper::{Method, Request, Uri};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tracing::debug;

/// One search call: the path below the node URI and the JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub path: String,
    pub body: Value,
}

/// Parameters that shape a request.
#[derive(Debug, Clone)]
pub struct QuerySpec<'a> {
    pub index: &'a str,
    pub document_type: &'a str,
    pub raw_query: Option<&'a str>,
    pub size: usize,
    pub timestamp_field: &'a str,
    /// Exclusive lower bound, if any.
    pub after: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub before: DateTime<Utc>,
}

fn format_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl SearchRequest {
    pub fn build(spec: &QuerySpec<'_>) -> Self {
        let index = if spec.index.is_empty() { "_all" } else { spec.index };
        let path = if spec.document_type.is_empty() {
            format!("/{index}/_search")
        } else {
            format!("/{index}/{}/_search", spec.document_type)
        };

        let mut range = serde_json::Map::new();
        if let Some(after) = spec.after {
            range.insert("gt".to_string(), json!(format_time(after)));
        }
        range.insert("lt".to_string(), json!(format_time(spec.before)));

        let mut filter = vec![json!({ "range": { spec.timestamp_field: range } })];
        if let Some(raw) = spec.raw_query.filter(|q| !q.trim().is_empty()) {
            filter.push(json!({ "query_string": { "query": raw } }));
        }

        let mut body = json!({
            "sort": [ { spec.timestamp_field: { "order": "desc" } } ],
            "query": { "bool": { "filter": filter } },
        });
        if spec.size > 0 {
            body["size"] = json!(spec.size);
        }

        Self { path, body }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub hits: HitsEnvelope,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HitsEnvelope {
    #[serde(default)]
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_index", default)]
    pub index: String,
    #[serde(rename = "_type", default)]
    pub doc_type: String,
    #[serde(rename = "_source", default)]
    pub source: serde_json::Map<String, Value>,
}

/// The narrow interface the search receiver needs from a search engine.
pub trait SearchBackend: Send + Sync {
    /// Where requests go, for diagnostics.
    fn endpoint(&self) -> String;

    fn search<'a>(&'a self, request: &'a SearchRequest) -> BoxFuture<'a, Result<SearchResponse, ReceiverError>>;
}

/// HTTP/1.1 JSON client for Elasticsearch-style `_search` endpoints.
#[derive(Debug, Clone)]
pub struct HttpSearchBackend {
    base: String,
    authority: String,
    host: String,
    port: u16,
}

impl HttpSearchBackend {
    pub fn new(node_uri: &str) -> Result<Self, ReceiverError> {
        let endpoint_err = |reason: &str| ReceiverError::Endpoint {
            uri: node_uri.to_string(),
            reason: reason.to_string(),
        };

        let uri: Uri = node_uri.parse().map_err(|_| endpoint_err("not a valid URI"))?;
        match uri.scheme_str() {
            Some("http") | None => {}
            Some(_) => return Err(endpoint_err("only plain http is supported")),
        }
        let authority = uri.authority().ok_or_else(|| endpoint_err("missing host"))?;
        let host = authority.host().trim_matches(|c| c == '[' || c == ']').to_string();
        let port = authority.port_u16().unwrap_or(80);

        Ok(Self {
            base: format!("http://{}", authority.as_str()),
            authority: authority.as_str().to_string(),
            host,
            port,
        })
    }

    async fn post(&self, request: &SearchRequest) -> Result<SearchResponse, ReceiverError> {
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "search connection closed with error");
            }
        });

        let body = serde_json::to_vec(&request.body).map_err(ReceiverError::Response)?;
        let http_request = Request::builder()
            .method(Method::POST)
            .uri(request.path.as_str())
            .header(HOST, self.authority.as_str())
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body)))?;

        let response = sender.send_request(http_request).await?;
        let status = response.status();
        let bytes = response.into_body().collect().await?.to_bytes();

        if !status.is_success() {
            return Err(ReceiverError::Status {
                status,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        serde_json::from_slice(&bytes).map_err(ReceiverError::Response)
    }
}

impl SearchBackend for HttpSearchBackend {
    fn endpoint(&self) -> String {
        self.base.clone()
    }

    fn search<'a>(&'a self, request: &'a SearchRequest) -> BoxFuture<'a, Result<SearchResponse, ReceiverError>> {
        Box::pin(self.post(request))
    }
}
