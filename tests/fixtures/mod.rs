// Scripted in-memory backend shared by the integration tests

use serde_json::{Map, Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, Semaphore};

use wikiquery::backend::{Backend, BackendError, Hit, SearchResponse};
use wikiquery::config::SearchConfig;
use wikiquery::content::NullContentStore;
use wikiquery::query::SearchRequest;
use wikiquery::searcher::Searcher;

/// Backend that records every request and answers from a script.
///
/// Once the script runs out every search answers with an empty response.
/// A gated backend holds each search until [`FakeBackend::release`].
#[derive(Default)]
pub struct FakeBackend {
    responses: Mutex<VecDeque<Result<SearchResponse, BackendError>>>,
    requests: Mutex<Vec<SearchRequest>>,
    started: Notify,
    gate: Option<Semaphore>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    pub fn respond(self, response: Result<SearchResponse, BackendError>) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    pub fn requests(&self) -> Vec<SearchRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Resolves once a search has reached the backend
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(64);
        }
    }
}

impl Backend for FakeBackend {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, BackendError> {
        self.requests.lock().unwrap().push(request.clone());
        self.started.notify_one();
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await;
        }
        let next = self.responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(SearchResponse::default()))
    }

    async fn get(
        &self,
        _indices: &[String],
        ids: &[u64],
        _source: &Value,
    ) -> Result<Vec<Hit>, BackendError> {
        Ok(ids
            .iter()
            .map(|id| {
                let mut hit = hit(*id, &format!("Page {}", id));
                hit.source.insert("text".into(), json!(format!("text of page {}", id)));
                hit
            })
            .collect())
    }

    async fn ping(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

pub fn searcher(config: SearchConfig, backend: FakeBackend) -> Searcher<FakeBackend> {
    Searcher::new(Arc::new(config), Arc::new(NullContentStore), backend)
}

/// Main-namespace hit
pub fn hit(id: u64, title: &str) -> Hit {
    let mut source = Map::new();
    source.insert("namespace".into(), json!(0));
    source.insert("namespace_text".into(), json!(""));
    source.insert("title".into(), json!(title));
    Hit {
        index: "wiki_content".into(),
        id: id.to_string(),
        score: Some(1.0),
        source,
        ..Default::default()
    }
}

pub fn response(hits: Vec<Hit>) -> SearchResponse {
    SearchResponse {
        took_ms: 3,
        total: hits.len() as u64,
        hits,
        ..Default::default()
    }
}
