//! Index client for the external search engine.
//!
//! All index I/O goes through [`IndexClient`]: delete-by-query, add and
//! commit. Clients never retry; callers decide whether to re-invoke.
//!
//! [`SolrClient`] speaks the JSON update handler:
//!
//! | Operation | Request |
//! |---|---|
//! | delete-by-query | `POST {base}/update` `{"delete":{"query":"*:*"}}` |
//! | add | `POST {base}/update` `[{..doc..}, ..]` |
//! | commit | `POST {base}/update?commit=true` `{"commit":{}}` |

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

use crate::indexer::document::IndexDocument;

/// Query matching every document in the index.
pub const MATCH_ALL: &str = "*:*";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexClientError {
    #[error("search index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("search index protocol error: {0}")]
    IndexProtocolError(String),
}

impl IndexClientError {
    pub fn help_message(&self) -> &'static str {
        match self {
            IndexClientError::IndexUnavailable(_) => {
                "Check that the search engine is running and the configured URL is reachable."
            }
            IndexClientError::IndexProtocolError(_) => {
                "The search engine rejected the request; check its logs and schema."
            }
        }
    }
}

pub type IndexClientResult<T> = Result<T, IndexClientError>;

/// Operations the indexer needs from the search engine.
pub trait IndexClient: Send + Sync {
    fn id(&self) -> &str;
    fn delete_by_query(&self, query: &str) -> IndexClientResult<()>;
    fn add(&self, documents: &[IndexDocument]) -> IndexClientResult<()>;
    fn commit(&self) -> IndexClientResult<()>;
}

/// Connection settings for [`SolrClient`].
#[derive(Debug, Clone)]
pub struct SolrSettings {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for SolrSettings {
    fn default() -> Self {
        Self {
            base_url: crate::config::DEFAULT_INDEX_URL.to_string(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpdateResponse {
    #[serde(rename = "responseHeader")]
    header: ResponseHeader,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ResponseHeader {
    status: i64,
}

/// Blocking HTTP client for a Solr core's update handler.
pub struct SolrClient {
    http: reqwest::blocking::Client,
    update_url: String,
}

impl SolrClient {
    pub fn new(settings: &SolrSettings) -> IndexClientResult<Self> {
        let http = reqwest::blocking::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| IndexClientError::IndexUnavailable(e.to_string()))?;
        Ok(Self {
            http,
            update_url: update_url(&settings.base_url),
        })
    }

    pub fn update_url(&self) -> &str {
        &self.update_url
    }

    fn post(&self, url: &str, body: &Value) -> IndexClientResult<()> {
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .map_err(|e| IndexClientError::IndexUnavailable(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| IndexClientError::IndexUnavailable(e.to_string()))?;
        check_update_response(status.as_u16(), &text)?;
        debug!(url, status = status.as_u16(), "index update accepted");
        Ok(())
    }
}

impl IndexClient for SolrClient {
    fn id(&self) -> &str {
        "solr"
    }

    fn delete_by_query(&self, query: &str) -> IndexClientResult<()> {
        self.post(&self.update_url, &delete_by_query_body(query))
    }

    fn add(&self, documents: &[IndexDocument]) -> IndexClientResult<()> {
        if documents.is_empty() {
            return Ok(());
        }
        self.post(&self.update_url, &add_body(documents))
    }

    fn commit(&self) -> IndexClientResult<()> {
        let url = format!("{}?commit=true", self.update_url);
        self.post(&url, &json!({ "commit": {} }))
    }
}

/// `http://host:8983/solr/` -> `http://host:8983/solr/update`.
pub fn update_url(base_url: &str) -> String {
    format!("{}/update", base_url.trim_end_matches('/'))
}

pub fn delete_by_query_body(query: &str) -> Value {
    json!({ "delete": { "query": query } })
}

pub fn add_body(documents: &[IndexDocument]) -> Value {
    Value::Array(documents.iter().map(IndexDocument::to_json).collect())
}

/// Map an update handler reply onto the client error taxonomy.
pub fn check_update_response(status: u16, body: &str) -> IndexClientResult<()> {
    if status == 502 || status == 503 || status == 504 {
        return Err(IndexClientError::IndexUnavailable(format!(
            "HTTP {status}"
        )));
    }
    let parsed: Result<UpdateResponse, _> = serde_json::from_str(body);
    match parsed {
        Ok(reply) if (200..300).contains(&status) && reply.header.status == 0 => Ok(()),
        Ok(reply) => Err(IndexClientError::IndexProtocolError(format!(
            "HTTP {status}, status {}: {}",
            reply.header.status,
            reply.error.map(|e| e.to_string()).unwrap_or_default()
        ))),
        Err(e) => Err(IndexClientError::IndexProtocolError(format!(
            "HTTP {status}, malformed response: {e}"
        ))),
    }
}
