//! Search request assembly
//!
//! [`SearchRequestBuilder`] collects the per-call options (paging, sort,
//! results type, suggestion text) and is finalized once against a compiled
//! [`SearchContext`] into an immutable [`SearchRequest`]. Finalizing picks
//! the indices, decides whether a namespace filter is needed, folds the
//! filters into one clause, layers the rescore passes and attaches the
//! highlight and suggestion configuration.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::admission::PoolKind;
use crate::config::{SearchConfig, SuggestConfig};
use crate::error::Warning;
use crate::query::context::{SearchContext, SearchKind};
use crate::query::dsl::{BoolClause, Clause, RescorePass};
use crate::query::rescore::BoostInstaller;
use crate::results::ResultsType;

pub const HIGHLIGHT_PRE: &str = "<span class=\"searchmatch\">";
pub const HIGHLIGHT_POST: &str = "</span>";
pub const SUGGESTION_HIGHLIGHT_PRE: &str = "<em>";
pub const SUGGESTION_HIGHLIGHT_POST: &str = "</em>";

/// Result ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sort {
    #[default]
    Relevance,
    TitleAsc,
    TitleDesc,
    IncomingLinksAsc,
    IncomingLinksDesc,
    /// Index order
    None,
}

#[derive(Debug, Error)]
#[error("unknown sort order: {0}")]
pub struct UnknownSort(pub String);

impl Sort {
    pub fn as_str(self) -> &'static str {
        match self {
            Sort::Relevance => "relevance",
            Sort::TitleAsc => "title_asc",
            Sort::TitleDesc => "title_desc",
            Sort::IncomingLinksAsc => "incoming_links_asc",
            Sort::IncomingLinksDesc => "incoming_links_desc",
            Sort::None => "none",
        }
    }

    /// Backend sort specification; `None` for score order
    pub fn to_json(self) -> Option<Value> {
        match self {
            Sort::Relevance => None,
            Sort::TitleAsc => Some(json!([{ "title.keyword": "asc" }])),
            Sort::TitleDesc => Some(json!([{ "title.keyword": "desc" }])),
            Sort::IncomingLinksAsc => Some(json!([
                { "incoming_links": { "order": "asc", "missing": "_first" } }
            ])),
            Sort::IncomingLinksDesc => Some(json!([
                { "incoming_links": { "order": "desc", "missing": "_last" } }
            ])),
            Sort::None => Some(json!(["_doc"])),
        }
    }
}

impl FromStr for Sort {
    type Err = UnknownSort;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relevance" => Ok(Sort::Relevance),
            "title_asc" => Ok(Sort::TitleAsc),
            "title_desc" => Ok(Sort::TitleDesc),
            "incoming_links_asc" => Ok(Sort::IncomingLinksAsc),
            "incoming_links_desc" => Ok(Sort::IncomingLinksDesc),
            "none" | "just_match" => Ok(Sort::None),
            other => Err(UnknownSort(other.to_string())),
        }
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Highlighter implementation of one field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HighlighterKind {
    Fvh,
    Plain,
    Experimental,
}

impl HighlighterKind {
    fn as_str(self) -> &'static str {
        match self {
            HighlighterKind::Fvh => "fvh",
            HighlighterKind::Plain => "plain",
            HighlighterKind::Experimental => "experimental",
        }
    }
}

/// Highlighting of one field
#[derive(Debug, Clone, PartialEq)]
pub struct HighlightField {
    pub name: String,
    pub kind: HighlighterKind,
    /// 0 highlights the entire value
    pub number_of_fragments: u32,
    pub fragment_size: Option<u32>,
    pub matched_fields: Vec<String>,
    /// Highlighter-specific options
    pub options: Option<Value>,
    pub highlight_query: Option<Clause>,
}

impl HighlightField {
    pub fn new(name: &str, kind: HighlighterKind, number_of_fragments: u32) -> Self {
        Self {
            name: name.to_string(),
            kind,
            number_of_fragments,
            fragment_size: None,
            matched_fields: Vec::new(),
            options: None,
            highlight_query: None,
        }
    }

    /// Also match on the unstemmed copy of the field
    pub fn with_plain(mut self) -> Self {
        self.matched_fields = vec![self.name.clone(), format!("{}.plain", self.name)];
        self
    }

    fn to_json(&self) -> Value {
        let mut body = Map::new();
        body.insert("type".into(), json!(self.kind.as_str()));
        body.insert("number_of_fragments".into(), json!(self.number_of_fragments));
        if let Some(size) = self.fragment_size {
            body.insert("fragment_size".into(), json!(size));
        }
        if !self.matched_fields.is_empty() {
            body.insert("matched_fields".into(), json!(self.matched_fields));
            body.insert("order".into(), json!("score"));
        }
        if let Some(options) = &self.options {
            body.insert("options".into(), options.clone());
        }
        if let Some(query) = &self.highlight_query {
            body.insert("highlight_query".into(), query.to_json());
        }
        Value::Object(body)
    }
}

/// Highlighting configuration of a request
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Highlight {
    pub fields: Vec<HighlightField>,
    pub highlight_query: Option<Clause>,
}

impl Highlight {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Drop every field served by the plain highlighter
    pub fn without_plain(mut self) -> Self {
        self.fields.retain(|f| f.kind != HighlighterKind::Plain);
        self
    }

    pub fn to_json(&self) -> Value {
        let fields: Map<String, Value> = self
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.to_json()))
            .collect();
        let mut body = Map::new();
        body.insert("pre_tags".into(), json!([HIGHLIGHT_PRE]));
        body.insert("post_tags".into(), json!([HIGHLIGHT_POST]));
        body.insert("fields".into(), Value::Object(fields));
        if let Some(query) = &self.highlight_query {
            body.insert("highlight_query".into(), query.to_json());
        }
        Value::Object(body)
    }
}

/// "Did you mean" phrase suggester
#[derive(Debug, Clone, PartialEq)]
pub struct PhraseSuggest {
    pub text: String,
    pub field: String,
    pub max_errors: f64,
    pub confidence: f64,
}

impl PhraseSuggest {
    pub fn new(text: &str, config: &SuggestConfig) -> Self {
        Self {
            text: text.to_string(),
            field: "suggest".to_string(),
            max_errors: config.max_errors,
            confidence: config.confidence,
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "text": self.text,
            "suggest": {
                "phrase": {
                    "field": self.field,
                    "size": 1,
                    "max_errors": self.max_errors,
                    "confidence": self.confidence,
                    "direct_generator": [{
                        "field": self.field,
                        "suggest_mode": "always",
                        "max_term_freq": 0.5,
                        "prefix_length": 2,
                    }],
                    "highlight": {
                        "pre_tag": SUGGESTION_HIGHLIGHT_PRE,
                        "post_tag": SUGGESTION_HIGHLIGHT_POST,
                    },
                }
            }
        })
    }
}

/// URL-level options of a search call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_type: Option<String>,
    /// Shard-side timeout, e.g. `20s`
    pub timeout: String,
}

/// Indices a search runs against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSelection {
    /// `content` or `general`; `None` searches every index type
    pub suffix: Option<&'static str>,
    pub extra: Vec<String>,
    pub needs_namespace_filter: bool,
}

impl IndexSelection {
    pub const CONTENT: &'static str = "content";
    pub const GENERAL: &'static str = "general";

    pub fn resolve(ctx: &SearchContext<'_>) -> Self {
        let table = ctx.namespace_table;
        let Some(ids) = ctx.namespaces.ids() else {
            return Self {
                suffix: None,
                extra: Vec::new(),
                needs_namespace_filter: false,
            };
        };

        let content = ids.iter().filter(|&&ns| table.is_content(ns)).count();
        let suffix = if content == ids.len() {
            Some(Self::CONTENT)
        } else if content == 0 {
            Some(Self::GENERAL)
        } else {
            None
        };

        let mut extra = Vec::new();
        if ctx.allows_extra_indexes() {
            for ns in ids {
                for index in ctx.config.extra_indexes.get(ns).into_iter().flatten() {
                    if !extra.contains(index) {
                        extra.push(index.clone());
                    }
                }
            }
        }

        let valid = table.valid_namespaces();
        let needs_namespace_filter = if !extra.is_empty() {
            // Extra indexes hold other namespaces too
            true
        } else if ids.len() == valid.len() {
            false
        } else {
            match suffix {
                None => true,
                Some(suffix) => {
                    let in_type = valid
                        .iter()
                        .filter(|&&ns| table.is_content(ns) == (suffix == Self::CONTENT))
                        .count();
                    ids.len() != in_type
                }
            }
        };

        Self {
            suffix,
            extra,
            needs_namespace_filter,
        }
    }

    /// Index names for `base`, local index first
    pub fn indices(&self, base: &str) -> Vec<String> {
        let mut indices = vec![match self.suffix {
            Some(suffix) => format!("{}_{}", base, suffix),
            None => base.to_string(),
        }];
        indices.extend(self.extra.iter().cloned());
        indices
    }
}

/// Server and client timeouts for a search kind
pub fn timeouts_for(config: &SearchConfig, kind: SearchKind) -> (Duration, Duration) {
    let t = &config.timeouts;
    match kind {
        SearchKind::Regex => (
            Duration::from_secs(t.shard_regex_secs),
            Duration::from_secs(t.client_regex_secs),
        ),
        _ => (
            Duration::from_secs(t.shard_default_secs),
            Duration::from_secs(t.client_default_secs),
        ),
    }
}

/// Admission pool serving a search kind
pub fn pool_for(kind: SearchKind) -> PoolKind {
    match kind {
        SearchKind::Regex => PoolKind::Regex,
        SearchKind::Prefix => PoolKind::Prefix,
        SearchKind::MoreLike => PoolKind::MoreLike,
        _ => PoolKind::Search,
    }
}

/// Collects per-call options until the request is finalized
#[derive(Debug, Clone)]
pub struct SearchRequestBuilder {
    kind: Option<SearchKind>,
    description: String,
    query: Option<Clause>,
    fallback: Option<Clause>,
    suggest_text: Option<String>,
    sort: Sort,
    offset: usize,
    limit: usize,
    results_type: ResultsType,
}

impl SearchRequestBuilder {
    /// Builder for a search described as `description` in logs
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            kind: None,
            description: description.into(),
            query: None,
            fallback: None,
            suggest_text: None,
            sort: Sort::Relevance,
            offset: 0,
            limit: 20,
            results_type: ResultsType::FullText,
        }
    }

    /// Override the kind recorded on the context
    pub fn kind(mut self, kind: SearchKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Main scoring query; match-all when never set
    pub fn query(mut self, query: Clause) -> Self {
        self.query = Some(query);
        self
    }

    pub fn maybe_query(mut self, query: Option<Clause>) -> Self {
        self.query = query;
        self
    }

    /// Query to retry with if the backend cannot parse the main one
    pub fn fallback(mut self, query: Option<Clause>) -> Self {
        self.fallback = query;
        self
    }

    pub fn suggest(mut self, text: Option<String>) -> Self {
        self.suggest_text = text;
        self
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    pub fn results_type(mut self, results_type: ResultsType) -> Self {
        self.results_type = results_type;
        self
    }

    /// Finalize against the compiled context
    pub fn build(self, ctx: &SearchContext<'_>, boosts: &BoostInstaller) -> SearchRequest {
        let config = ctx.config;
        let kind = self.kind.unwrap_or(ctx.search_kind);

        let selection = IndexSelection::resolve(ctx);
        let mut filters = ctx.filters.clone();
        let mut not_filters = ctx.not_filters.clone();
        if !selection.extra.is_empty() {
            not_filters.push(Clause::term("local_sites_with_dupe", config.wiki_id.as_str()));
        }
        if selection.needs_namespace_filter {
            if let Some(ids) = ctx.namespaces.ids() {
                filters.push(Clause::terms("namespace", ids.iter().copied()));
            }
        }

        let mut rescore = Vec::new();
        if self.sort == Sort::Relevance {
            rescore.extend(ctx.rescore.iter().cloned());
            rescore.extend(boosts.boost_pass(ctx, self.sort));
        }

        let highlight = self.results_type.highlight(ctx).map(|mut highlight| {
            // Plain highlighting copes badly with fuzzy terms
            if ctx.fuzzy_query {
                highlight = highlight.without_plain();
            }
            let mut query = ctx.highlight_query.clone();
            if !ctx.non_text_highlight_queries.is_empty() {
                let mut should: Vec<Clause> = query.into_iter().collect();
                should.extend(ctx.non_text_highlight_queries.iter().cloned());
                query = Some(Clause::Bool(BoolClause {
                    should,
                    ..Default::default()
                }));
            }
            highlight.highlight_query = query;
            highlight
        });

        let (shard_timeout, client_timeout) = timeouts_for(config, kind);
        let offset = self.offset.min(config.limits.max_offset);

        debug!(
            kind = kind.as_str(),
            filters = filters.len(),
            not_filters = not_filters.len(),
            rescore = rescore.len(),
            "finalized search request"
        );

        SearchRequest {
            kind,
            description: self.description,
            indices: selection.indices(&config.index_base_name),
            query: self.query.unwrap_or(Clause::MatchAll),
            non_text_queries: ctx.non_text_queries.clone(),
            filter: Clause::unify(&filters, &not_filters),
            rescore,
            sort: self.sort,
            offset,
            limit: self.limit,
            highlight,
            suggest: self
                .suggest_text
                .map(|text| PhraseSuggest::new(&text, &config.suggest)),
            results_type: self.results_type,
            search_type: config
                .more_accurate_scoring
                .then(|| "dfs_query_then_fetch".to_string()),
            shard_timeout,
            client_timeout,
            fallback: self.fallback,
            suggest_prefixes: ctx.suggest_prefixes.clone(),
            suggest_suffixes: ctx.suggest_suffixes.clone(),
            contained_special_syntax: ctx.contained_special_syntax,
            warnings: ctx.warnings.clone(),
        }
    }
}

/// A finalized search, ready to submit
#[derive(Debug, Clone)]
pub struct SearchRequest {
    kind: SearchKind,
    description: String,
    indices: Vec<String>,
    query: Clause,
    non_text_queries: Vec<Clause>,
    filter: Option<Clause>,
    rescore: Vec<RescorePass>,
    sort: Sort,
    offset: usize,
    limit: usize,
    highlight: Option<Highlight>,
    suggest: Option<PhraseSuggest>,
    results_type: ResultsType,
    search_type: Option<String>,
    shard_timeout: Duration,
    client_timeout: Duration,
    fallback: Option<Clause>,
    suggest_prefixes: Vec<String>,
    suggest_suffixes: Vec<String>,
    contained_special_syntax: bool,
    warnings: Vec<Warning>,
}

impl SearchRequest {
    pub fn kind(&self) -> SearchKind {
        self.kind
    }

    pub fn pool(&self) -> PoolKind {
        pool_for(self.kind)
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn indices(&self) -> &[String] {
        &self.indices
    }

    pub fn query(&self) -> &Clause {
        &self.query
    }

    pub fn filter(&self) -> Option<&Clause> {
        self.filter.as_ref()
    }

    pub fn rescore(&self) -> &[RescorePass] {
        &self.rescore
    }

    pub fn sort(&self) -> Sort {
        self.sort
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn highlight(&self) -> Option<&Highlight> {
        self.highlight.as_ref()
    }

    pub fn suggest(&self) -> Option<&PhraseSuggest> {
        self.suggest.as_ref()
    }

    pub fn results_type(&self) -> ResultsType {
        self.results_type
    }

    pub fn client_timeout(&self) -> Duration {
        self.client_timeout
    }

    pub fn suggest_prefixes(&self) -> &[String] {
        &self.suggest_prefixes
    }

    pub fn suggest_suffixes(&self) -> &[String] {
        &self.suggest_suffixes
    }

    pub fn contained_special_syntax(&self) -> bool {
        self.contained_special_syntax
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// The simplified retry of this request.
    ///
    /// Swaps in the fallback query and drops every rescore pass. The
    /// result carries no fallback of its own, so it cannot degrade again.
    pub fn degraded(&self) -> Option<SearchRequest> {
        let fallback = self.fallback.clone()?;
        Some(SearchRequest {
            kind: SearchKind::Degraded,
            query: fallback,
            rescore: Vec::new(),
            fallback: None,
            ..self.clone()
        })
    }

    /// Main query with the non-text queries and the filter folded in
    fn effective_query(&self) -> Clause {
        let mut query = if self.non_text_queries.is_empty() {
            self.query.clone()
        } else {
            let mut must = vec![self.query.clone()];
            must.extend(self.non_text_queries.iter().cloned());
            Clause::Bool(BoolClause {
                must,
                ..Default::default()
            })
        };
        if let Some(filter) = &self.filter {
            query = Clause::Bool(BoolClause {
                must: vec![query],
                filter: vec![filter.clone()],
                ..Default::default()
            });
        }
        query
    }

    /// JSON body sent to the backend
    pub fn body(&self) -> Value {
        let mut body = Map::new();
        body.insert("_source".into(), self.results_type.source_filtering());
        body.insert("stored_fields".into(), json!(self.results_type.stored_fields()));
        body.insert("query".into(), self.effective_query().to_json());

        if let Some(highlight) = &self.highlight {
            body.insert("highlight".into(), highlight.to_json());
        }

        let mut stats = vec![self.kind.as_str()];
        if let Some(suggest) = &self.suggest {
            body.insert("suggest".into(), suggest.to_json());
            stats.push("suggest");
        }
        body.insert("stats".into(), json!(stats));

        if self.offset > 0 {
            body.insert("from".into(), json!(self.offset));
        }
        body.insert("size".into(), json!(self.limit));

        if !self.rescore.is_empty() {
            let passes: Vec<Value> = self.rescore.iter().map(RescorePass::to_json).collect();
            body.insert("rescore".into(), Value::Array(passes));
        }
        if let Some(sort) = self.sort.to_json() {
            body.insert("sort".into(), sort);
        }
        Value::Object(body)
    }

    pub fn params(&self) -> SearchParams {
        SearchParams {
            search_type: self.search_type.clone(),
            timeout: format!("{}s", self.shard_timeout.as_secs()),
        }
    }
}
