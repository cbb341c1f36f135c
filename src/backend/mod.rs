//! Search backend collaborator
//!
//! The executor talks to the document store through the [`Backend`] trait.
//! [`SocketBackend`] is the production implementation: it forwards
//! requests to a search gateway over a Unix socket using the
//! length-prefixed JSON framing in [`protocol`].

pub mod client;
pub mod protocol;

pub use client::{SocketBackend, get_socket_path};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::query::request::SearchRequest;

/// Typed failure of a backend call
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend rejected the query grammar
    #[error("query could not be parsed: {0}")]
    Parse(String),

    #[error("search failed: {0}")]
    Execution(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// No answer within the client-side timeout
    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connection(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl BackendError {
    /// Whether the failure was the backend refusing to parse the query,
    /// as opposed to failing to run it
    pub fn is_parse_error(&self) -> bool {
        matches!(self, BackendError::Parse(_))
    }
}

/// One matching document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    /// Index the document was found in
    pub index: String,
    pub id: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub source: Map<String, Value>,
    /// Highlighted fragments keyed by field
    #[serde(default)]
    pub highlight: BTreeMap<String, Vec<String>>,
}

/// Best phrase suggestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestOption {
    pub text: String,
    pub highlighted: String,
}

/// Raw answer to a search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub took_ms: u64,
    /// Some shards hit their timeout; the hits are partial
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub hits: Vec<Hit>,
    #[serde(default)]
    pub suggest: Option<SuggestOption>,
}

/// Document store able to run compiled searches
pub trait Backend: Send + Sync {
    /// Run a finalized search
    fn search(
        &self,
        request: &SearchRequest,
    ) -> impl Future<Output = Result<SearchResponse, BackendError>> + Send;

    /// Fetch documents by page id
    fn get(
        &self,
        indices: &[String],
        ids: &[u64],
        source: &Value,
    ) -> impl Future<Output = Result<Vec<Hit>, BackendError>> + Send;

    fn ping(&self) -> impl Future<Output = Result<(), BackendError>> + Send;
}
