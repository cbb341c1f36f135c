//! Public search entry points
//!
//! [`Searcher`] owns the long-lived collaborators (configuration, namespace
//! table, content store, backend, admission pools, keyword registry) and
//! builds a fresh [`SearchContext`] for every call. Compilation is
//! synchronous; only slot acquisition and the backend call suspend.

use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::admission::{AdmissionController, UserIdentity};
use crate::backend::{Backend, BackendError, Hit};
use crate::config::SearchConfig;
use crate::content::ContentStore;
use crate::error::{SearchError, SearchResult, TIMED_OUT, Warning};
use crate::namespace::{NamespaceSet, NamespaceTable};
use crate::query::context::{SearchContext, SearchKind};
use crate::query::dsl::{Clause, MatchKind, MoreLikeThis, Operator};
use crate::query::features::FeatureRegistry;
use crate::query::request::{
    IndexSelection, SearchRequest, SearchRequestBuilder, Sort, pool_for, timeouts_for,
};
use crate::query::rescore::BoostInstaller;
use crate::query::scanner::extract_keywords;
use crate::query::text;
use crate::results::{ResultSet, ResultsType};

const NEAR_MATCH_FIELDS: [&str; 4] = [
    "title.near_match",
    "redirect.title.near_match",
    "title.near_match_asciifolding",
    "redirect.title.near_match_asciifolding",
];

/// Per-call options
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub offset: usize,
    pub limit: usize,
    /// `None` searches the content namespaces
    pub namespaces: Option<NamespaceSet>,
    pub sort: Sort,
    pub user: UserIdentity,
    /// Defaults to the wiki's content language
    pub user_language: Option<String>,
    /// Ask for a "did you mean" suggestion
    pub show_suggestion: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 20,
            namespaces: None,
            sort: Sort::Relevance,
            user: UserIdentity::default(),
            user_language: None,
            show_suggestion: true,
        }
    }
}

/// Outcome of compiling a full-text search
#[derive(Debug, Clone)]
pub enum Compiled {
    /// A keyword can never match; the backend need not be asked
    NoResultsPossible(Vec<Warning>),
    Request(SearchRequest),
}

/// Compiles and runs searches against one wiki
pub struct Searcher<B> {
    config: Arc<SearchConfig>,
    namespaces: NamespaceTable,
    content: Arc<dyn ContentStore>,
    backend: B,
    admission: AdmissionController,
    features: FeatureRegistry,
}

impl<B: Backend> Searcher<B> {
    pub fn new(config: Arc<SearchConfig>, content: Arc<dyn ContentStore>, backend: B) -> Self {
        Self {
            namespaces: NamespaceTable::from_config(&config),
            admission: AdmissionController::new(&config.pools),
            features: FeatureRegistry::standard(),
            config,
            content,
            backend,
        }
    }

    /// Replace the keyword registry
    pub fn with_features(mut self, features: FeatureRegistry) -> Self {
        self.features = features;
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn namespace_table(&self) -> &NamespaceTable {
        &self.namespaces
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn default_namespaces(&self, options: &SearchOptions) -> NamespaceSet {
        options
            .namespaces
            .clone()
            .unwrap_or_else(|| NamespaceSet::only(self.config.content_namespaces.iter().copied()))
    }

    fn context(&self, namespaces: NamespaceSet, options: &SearchOptions) -> SearchContext<'_> {
        let ctx = SearchContext::new(
            &self.config,
            &self.namespaces,
            self.content.as_ref(),
            namespaces,
        );
        match &options.user_language {
            Some(language) => ctx.with_user_language(language),
            None => ctx,
        }
    }

    /// Compile a full-text search without running it
    pub fn compile_text(&self, term: &str, options: &SearchOptions) -> Compiled {
        let mut ctx = self.context(self.default_namespaces(options), options);
        ctx.term = term.to_string();
        extract_keywords(&self.features, &mut ctx);

        if ctx.no_results_possible {
            debug!(term = %term, "keyword filters can never match");
            return Compiled::NoResultsPossible(ctx.warnings);
        }

        let text = text::build(&mut ctx, options.show_suggestion, options.offset);
        let description = format!("{} search for '{}'", ctx.search_kind.as_str(), term);
        let request = SearchRequestBuilder::new(description)
            .maybe_query(text.query)
            .fallback(text.fallback)
            .suggest(text.suggest)
            .sort(options.sort)
            .page(options.offset, options.limit)
            .build(&ctx, &BoostInstaller::new());
        Compiled::Request(request)
    }

    /// Full-text search.
    ///
    /// If the backend cannot parse the compiled query, the search is
    /// retried once with the simplified fallback query and no rescoring.
    pub async fn compile_and_execute(
        &self,
        term: &str,
        options: &SearchOptions,
    ) -> SearchResult<ResultSet> {
        let request = match self.compile_text(term, options) {
            Compiled::NoResultsPossible(warnings) => return Ok(ResultSet::empty(warnings)),
            Compiled::Request(request) => request,
        };

        let result = self.submit(&request, &options.user).await;
        let parse_failed = matches!(&result, Err(SearchError::Backend(e)) if e.is_parse_error());
        if parse_failed {
            if let Some(degraded) = request.degraded() {
                warn!(term = %term, "backend could not parse query, retrying degraded");
                return self.submit(&degraded, &options.user).await;
            }
        }
        result
    }

    /// Compile an exact-ish title search
    pub fn compile_near_match(
        &self,
        term: &str,
        options: &SearchOptions,
    ) -> SearchResult<SearchRequest> {
        self.check_title_length(term)?;
        let (namespaces, term) = self.leading_namespace(term, options);
        let mut ctx = self.context(namespaces, options);
        ctx.search_kind = SearchKind::NearMatch;
        ctx.term = term.to_string();

        let highlight = Clause::MultiMatch {
            fields: NEAR_MATCH_FIELDS.iter().map(|f| f.to_string()).collect(),
            query: term.to_string(),
            operator: None,
            analyzer: None,
        };
        let filter = if self.config.all_fields.near_match {
            Clause::MultiMatch {
                fields: vec![
                    "all_near_match".to_string(),
                    "all_near_match.asciifolding".to_string(),
                ],
                query: term.to_string(),
                operator: None,
                analyzer: None,
            }
        } else {
            highlight.clone()
        };
        ctx.highlight_query = Some(highlight);
        ctx.filters.push(filter);

        Ok(SearchRequestBuilder::new(format!("near_match search for '{}'", term))
            .results_type(ResultsType::Titles)
            .sort(options.sort)
            .page(options.offset, options.limit)
            .build(&ctx, &BoostInstaller::new()))
    }

    pub async fn near_match_search(
        &self,
        term: &str,
        options: &SearchOptions,
    ) -> SearchResult<ResultSet> {
        let request = self.compile_near_match(term, options)?;
        self.submit(&request, &options.user).await
    }

    /// Compile a title prefix search
    pub fn compile_prefix(&self, term: &str, options: &SearchOptions) -> SearchResult<SearchRequest> {
        self.check_title_length(term)?;
        let (namespaces, term) = self.leading_namespace(term, options);
        let mut ctx = self.context(namespaces, options);
        ctx.search_kind = SearchKind::Prefix;
        ctx.term = term.to_string();
        ctx.boost_links = true;

        let mut query = None;
        if !term.is_empty() {
            if self.config.prefix_search_starts_with_any_word {
                ctx.filters.push(Clause::Match {
                    field: "title.word_prefix".to_string(),
                    query: term.to_string(),
                    kind: MatchKind::Boolean,
                    operator: Some(Operator::And),
                    analyzer: Some("plain".to_string()),
                });
            } else {
                let w = &self.config.prefix_weights;
                query = Some(Clause::MultiMatch {
                    fields: vec![
                        format!("title.prefix^{}", w.title),
                        format!("redirect.title.prefix^{}", w.redirect),
                        format!("title.prefix_asciifolding^{}", w.title_asciifolding),
                        format!("redirect.title.prefix_asciifolding^{}", w.redirect_asciifolding),
                    ],
                    query: term.to_string(),
                    operator: None,
                    analyzer: None,
                });
            }
        }

        Ok(SearchRequestBuilder::new(format!("prefix search for '{}'", term))
            .maybe_query(query)
            .results_type(ResultsType::Titles)
            .sort(options.sort)
            .page(options.offset, options.limit)
            .build(&ctx, &BoostInstaller::new()))
    }

    pub async fn prefix_search(&self, term: &str, options: &SearchOptions) -> SearchResult<ResultSet> {
        let request = self.compile_prefix(term, options)?;
        self.submit(&request, &options.user).await
    }

    /// Pages similar to the pages with `page_ids`.
    ///
    /// With `only_wikibase` set, only pages linked to a wikibase item are
    /// returned.
    pub async fn more_like_these(
        &self,
        page_ids: &[u64],
        only_wikibase: bool,
        options: &SearchOptions,
    ) -> SearchResult<ResultSet> {
        let settings = &self.config.more_like;
        if settings.fields.is_empty() || page_ids.is_empty() {
            return Ok(ResultSet::default());
        }

        // The all field is not stored, so its text has to be fetched first
        let use_fields = settings.use_fields && !settings.fields.iter().any(|f| f == "all");
        let mut like_text = None;
        if !use_fields && settings.fields != ["text"] {
            let found = self.get(page_ids, &json!(["text"]), options).await?;
            if found.is_empty() {
                return Ok(ResultSet::default());
            }
            let text: Vec<&str> = found
                .iter()
                .filter_map(|hit| hit.source.get("text").and_then(Value::as_str))
                .collect();
            like_text = Some(text.join(" "));
        }

        let ids: Vec<String> = page_ids.iter().map(u64::to_string).collect();
        let mut ctx = self.context(self.default_namespaces(options), options);
        ctx.search_kind = SearchKind::MoreLike;
        ctx.contained_special_syntax = true;
        ctx.add_filter(Clause::Ids { values: ids.clone() }, true);
        if only_wikibase {
            ctx.add_filter(Clause::Exists { field: "wikibase_item".to_string() }, false);
        }

        let query = Clause::MoreLikeThis(MoreLikeThis {
            fields: settings.fields.clone(),
            like_ids: ids.clone(),
            like_text,
            min_doc_freq: settings.min_doc_freq,
            max_doc_freq: settings.max_doc_freq,
            max_query_terms: settings.max_query_terms,
            min_term_freq: settings.min_term_freq,
            min_word_len: settings.min_word_len,
            max_word_len: settings.max_word_len,
            minimum_should_match: settings.minimum_should_match.clone(),
        });

        let request = SearchRequestBuilder::new(format!("more_like search for '{}'", ids.join(", ")))
            .query(query)
            .sort(options.sort)
            .page(options.offset, options.limit)
            .build(&ctx, &BoostInstaller::new());
        self.submit(&request, &options.user).await
    }

    /// Fetch pages by id; a missing index yields no pages
    pub async fn get(
        &self,
        page_ids: &[u64],
        source: &Value,
        options: &SearchOptions,
    ) -> SearchResult<Vec<Hit>> {
        let ctx = self.context(self.default_namespaces(options), options);
        let indices = IndexSelection::resolve(&ctx).indices(&self.config.index_base_name);
        let (_, timeout) = timeouts_for(&self.config, SearchKind::Get);

        let call = async {
            tokio::time::timeout(timeout, self.backend.get(&indices, page_ids, source))
                .await
                .unwrap_or_else(|_| Err(BackendError::Timeout(timeout)))
        };
        match self.admission.run(pool_for(SearchKind::Get), &options.user, call).await? {
            Ok(hits) => Ok(hits),
            Err(BackendError::NotFound(what)) => {
                debug!(missing = %what, "get found nothing");
                Ok(Vec::new())
            }
            Err(e) => {
                warn!(error = %e, "get of {:?} failed", page_ids);
                Err(e.into())
            }
        }
    }

    pub async fn ping(&self) -> SearchResult<()> {
        Ok(self.backend.ping().await?)
    }

    /// Run a finalized request under admission control
    async fn submit(&self, request: &SearchRequest, user: &UserIdentity) -> SearchResult<ResultSet> {
        let timeout = request.client_timeout();
        let call = async {
            tokio::time::timeout(timeout, self.backend.search(request))
                .await
                .unwrap_or_else(|_| Err(BackendError::Timeout(timeout)))
        };

        let response = match self.admission.run(request.pool(), user, call).await? {
            Ok(response) => response,
            Err(e) => {
                warn!(kind = request.kind().as_str(), error = %e, "{} failed", request.description());
                return Err(e.into());
            }
        };

        let mut results = request.results_type().transform(request, response);
        if results.timed_out {
            warn!(
                kind = request.kind().as_str(),
                took_ms = results.took_ms,
                "{} timed out and only returned partial results",
                request.description()
            );
            if results.is_empty() {
                return Err(SearchError::TimedOutWithoutResults);
            }
            results.warnings.push(Warning::new(TIMED_OUT, &[]));
        }

        info!(
            kind = request.kind().as_str(),
            total = results.total,
            took_ms = results.took_ms,
            "{}",
            request.description()
        );
        Ok(results)
    }

    fn check_title_length(&self, term: &str) -> SearchResult<()> {
        let max = self.config.limits.max_title_search;
        if term.len() > max {
            return Err(SearchError::RequestTooLong {
                length: term.len(),
                max,
            });
        }
        Ok(())
    }

    /// A leading `Namespace:` replaces the searched namespaces
    fn leading_namespace<'t>(&self, term: &'t str, options: &SearchOptions) -> (NamespaceSet, &'t str) {
        match self.namespaces.split_prefix(term) {
            Some((namespaces, rest)) => (namespaces, rest),
            None => (self.default_namespaces(options), term),
        }
    }
}
