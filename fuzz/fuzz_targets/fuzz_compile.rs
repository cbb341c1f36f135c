#![no_main]

use libfuzzer_sys::fuzz_target;
use serde_json::Value;
use std::sync::{Arc, LazyLock};

use wikiquery::backend::{Backend, BackendError, Hit, SearchResponse};
use wikiquery::config::SearchConfig;
use wikiquery::content::NullContentStore;
use wikiquery::query::SearchRequest;
use wikiquery::searcher::{Compiled, SearchOptions, Searcher};

struct Offline;

impl Backend for Offline {
    async fn search(&self, _request: &SearchRequest) -> Result<SearchResponse, BackendError> {
        Ok(SearchResponse::default())
    }

    async fn get(&self, _: &[String], _: &[u64], _: &Value) -> Result<Vec<Hit>, BackendError> {
        Ok(Vec::new())
    }

    async fn ping(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

static SEARCHER: LazyLock<Searcher<Offline>> = LazyLock::new(|| {
    Searcher::new(
        Arc::new(SearchConfig::default()),
        Arc::new(NullContentStore),
        Offline,
    )
});

fuzz_target!(|data: &str| {
    // Compilation should never panic, whatever the keyword soup
    if let Compiled::Request(request) = SEARCHER.compile_text(data, &SearchOptions::default()) {
        let _ = request.body();
        let _ = request.degraded().map(|d| d.body());
    }
});
