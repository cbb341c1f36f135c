//! Per-search compilation state

use std::collections::BTreeMap;

use crate::config::SearchConfig;
use crate::content::ContentStore;
use crate::error::{Warning, WarningCollector};
use crate::namespace::{NamespaceSet, NamespaceTable};
use crate::query::dsl::{Clause, QueryString, RescorePass};
use crate::query::escaper::Escaper;

/// Operation class of a search; selects pool, timeouts and stats bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    FullText,
    Regex,
    Prefix,
    NearMatch,
    MoreLike,
    Get,
    /// Retry of a full-text search with a simplified query
    Degraded,
}

impl SearchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchKind::FullText => "full_text",
            SearchKind::Regex => "regex",
            SearchKind::Prefix => "prefix",
            SearchKind::NearMatch => "near_match",
            SearchKind::MoreLike => "more_like",
            SearchKind::Get => "get",
            SearchKind::Degraded => "degraded_full_text",
        }
    }
}

/// Where a matched keyword may be evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossSearchStrategy {
    /// Only meaningful against the local wiki's indexes
    HostWikiOnly,
    /// May also run against extra (shared) indexes
    AllWikis,
}

impl CrossSearchStrategy {
    pub fn intersect(self, other: Self) -> Self {
        match (self, other) {
            (CrossSearchStrategy::AllWikis, CrossSearchStrategy::AllWikis) => {
                CrossSearchStrategy::AllWikis
            }
            _ => CrossSearchStrategy::HostWikiOnly,
        }
    }
}

/// Something the highlighter should mark in the page source
#[derive(Debug, Clone, PartialEq)]
pub enum HighlightSource {
    Regex {
        pattern: String,
        locale: String,
        insensitive: bool,
    },
    Query(Clause),
}

/// Mutable accumulator threaded through one compilation.
///
/// Created per search call and dropped after the results are mapped.
pub struct SearchContext<'a> {
    pub config: &'a SearchConfig,
    pub namespace_table: &'a NamespaceTable,
    pub content: &'a dyn ContentStore,
    pub escaper: Escaper,

    /// Working term, stripped of keyword spans as they are consumed
    pub term: String,
    pub namespaces: NamespaceSet,
    pub filters: Vec<Clause>,
    pub not_filters: Vec<Clause>,
    /// Scoring clauses ANDed with the text query (e.g. phrase prefixes)
    pub non_text_queries: Vec<Clause>,
    pub non_text_highlight_queries: Vec<Clause>,
    pub highlight_query: Option<Clause>,
    pub rescore: Vec<RescorePass>,
    pub highlight_sources: Vec<HighlightSource>,
    pub suggest_prefixes: Vec<String>,
    pub suggest_suffixes: Vec<String>,
    pub boost_templates: BTreeMap<String, f64>,
    pub boost_links: bool,
    pub prefer_recent_decay_portion: f64,
    pub prefer_recent_half_life: f64,
    pub contained_special_syntax: bool,
    pub fuzzy_query: bool,
    pub limit_search_to_local_wiki: bool,
    /// A keyword resolved to a filter that can never match
    pub no_results_possible: bool,
    pub search_kind: SearchKind,
    pub cross_search: CrossSearchStrategy,
    pub user_language: String,
    pub warnings: Vec<Warning>,
}

impl<'a> SearchContext<'a> {
    pub fn new(
        config: &'a SearchConfig,
        namespace_table: &'a NamespaceTable,
        content: &'a dyn ContentStore,
        namespaces: NamespaceSet,
    ) -> Self {
        Self {
            config,
            namespace_table,
            content,
            escaper: Escaper::new(&config.content_language),
            term: String::new(),
            namespaces,
            filters: Vec::new(),
            not_filters: Vec::new(),
            non_text_queries: Vec::new(),
            non_text_highlight_queries: Vec::new(),
            highlight_query: None,
            rescore: Vec::new(),
            highlight_sources: Vec::new(),
            suggest_prefixes: Vec::new(),
            suggest_suffixes: Vec::new(),
            boost_templates: config.default_boost_templates().clone(),
            boost_links: config.boost.links,
            prefer_recent_decay_portion: config.boost.prefer_recent_default_portion,
            prefer_recent_half_life: config.boost.prefer_recent_half_life,
            contained_special_syntax: false,
            fuzzy_query: false,
            limit_search_to_local_wiki: false,
            no_results_possible: false,
            search_kind: SearchKind::FullText,
            cross_search: CrossSearchStrategy::AllWikis,
            user_language: config.content_language.clone(),
            warnings: Vec::new(),
        }
    }

    pub fn with_user_language(mut self, language: &str) -> Self {
        self.user_language = language.to_string();
        self
    }

    /// Route a keyword clause to the required or excluded set
    pub fn add_filter(&mut self, clause: Clause, negated: bool) {
        if negated {
            self.not_filters.push(clause);
        } else {
            self.filters.push(clause);
        }
    }

    /// Whether extra indexes may be searched for this query
    pub fn allows_extra_indexes(&self) -> bool {
        !self.limit_search_to_local_wiki && self.cross_search == CrossSearchStrategy::AllWikis
    }

    /// Query-string query carrying the configured wildcard and automaton limits
    pub fn query_string(&self, query: &str, fields: Vec<String>) -> QueryString {
        let mut qs = QueryString::new(query, fields);
        qs.allow_leading_wildcard = self.config.allow_leading_wildcard;
        qs.max_determinized_states = self.config.query_string_max_determinized_states;
        qs
    }

    /// Wrap `query` in the `safer` clause when one is configured
    pub fn wrap_in_safer(&self, query: Clause, is_rescore: bool) -> Clause {
        match &self.config.safer {
            Some(settings) => Clause::Safer {
                query: Box::new(query),
                settings: settings.clone(),
                is_rescore,
            },
            None => query,
        }
    }
}

impl WarningCollector for SearchContext<'_> {
    fn add_warning(&mut self, key: &str, params: &[&str]) {
        self.warnings.add_warning(key, params);
    }
}
