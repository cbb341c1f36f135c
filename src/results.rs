//! Typed result sets
//!
//! A [`ResultsType`] decides what a search asks the backend to return
//! (source fields and highlighting) and how the raw response is mapped
//! back into a [`ResultSet`].

use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;

use crate::backend::{Hit, SearchResponse};
use crate::error::Warning;
use crate::namespace::NS_FILE;
use crate::query::context::{HighlightSource, SearchContext};
use crate::query::dsl::Clause;
use crate::query::request::{
    Highlight, HighlightField, HighlighterKind, SUGGESTION_HIGHLIGHT_POST,
    SUGGESTION_HIGHLIGHT_PRE, SearchRequest,
};

const SNIPPET_SIZE: u32 = 150;
const LONG_FRAGMENT: u32 = 10000;

/// What a search returns per hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultsType {
    /// Page metadata plus highlighted snippets of every text field
    #[default]
    FullText,
    /// Namespace and title only; used by title searches
    Titles,
}

impl ResultsType {
    /// Value of the `_source` parameter
    pub fn source_filtering(&self) -> Value {
        match self {
            ResultsType::FullText => json!([
                "namespace",
                "namespace_text",
                "title",
                "redirect.*",
                "timestamp",
                "text_bytes",
                "wiki",
            ]),
            ResultsType::Titles => json!(["namespace", "namespace_text", "title"]),
        }
    }

    pub fn stored_fields(&self) -> Vec<&'static str> {
        match self {
            ResultsType::FullText => vec!["text.word_count"],
            ResultsType::Titles => Vec::new(),
        }
    }

    /// Highlighting for this result type, including the page-source
    /// highlights registered by keywords
    pub fn highlight(&self, ctx: &SearchContext<'_>) -> Option<Highlight> {
        let fields = match self {
            ResultsType::Titles => vec![
                HighlightField::new("title", HighlighterKind::Fvh, 0).with_plain(),
                long_fragment("redirect.title"),
            ],
            ResultsType::FullText => {
                let mut fields = vec![
                    HighlightField::new("title", HighlighterKind::Fvh, 0).with_plain(),
                    long_fragment("redirect.title"),
                    long_fragment("category"),
                    long_fragment("heading"),
                    snippet("text"),
                    snippet("auxiliary_text"),
                ];
                if ctx.namespaces.contains(NS_FILE) {
                    fields.push(snippet("file_text"));
                }
                fields.extend(source_fields(ctx));
                fields
            }
        };

        let highlight = Highlight {
            fields,
            highlight_query: None,
        };
        (!highlight.is_empty()).then_some(highlight)
    }

    /// Map a raw response into typed results
    pub fn transform(&self, request: &SearchRequest, response: SearchResponse) -> ResultSet {
        let suggestion = response.suggest.map(|option| {
            let prefix = request.suggest_prefixes().concat();
            let suffix = request.suggest_suffixes().concat();
            Suggestion {
                query: format!("{}{}{}", prefix, option.text, suffix),
                snippet: format!("{}{}{}", prefix, option.highlighted, suffix),
            }
        });

        ResultSet {
            total: response.total,
            hits: response.hits.into_iter().map(SearchHit::from).collect(),
            suggestion,
            warnings: request.warnings().to_vec(),
            contained_special_syntax: request.contained_special_syntax(),
            timed_out: response.timed_out,
            took_ms: response.took_ms,
        }
    }
}

fn long_fragment(name: &str) -> HighlightField {
    let mut field = HighlightField::new(name, HighlighterKind::Fvh, 1).with_plain();
    field.fragment_size = Some(LONG_FRAGMENT);
    field
}

fn snippet(name: &str) -> HighlightField {
    let mut field = HighlightField::new(name, HighlighterKind::Fvh, 1).with_plain();
    field.fragment_size = Some(SNIPPET_SIZE);
    field
}

/// Highlight fields over the page source, one per registered source
fn source_fields(ctx: &SearchContext<'_>) -> Vec<HighlightField> {
    let mut patterns = Vec::new();
    let mut locale = None;
    let mut insensitive = false;
    let mut queries = Vec::new();

    for source in &ctx.highlight_sources {
        match source {
            HighlightSource::Regex {
                pattern,
                locale: l,
                insensitive: i,
            } => {
                patterns.push(pattern.clone());
                locale.get_or_insert_with(|| l.clone());
                insensitive |= *i;
            }
            HighlightSource::Query(clause) => queries.push(clause.clone()),
        }
    }

    let mut fields = Vec::new();
    if !patterns.is_empty() {
        let mut field =
            HighlightField::new("source_text.plain", HighlighterKind::Experimental, 1);
        field.fragment_size = Some(SNIPPET_SIZE);
        field.options = Some(json!({
            "regex": patterns,
            "locale": locale.unwrap_or_default(),
            "regex_flavor": "lucene",
            "skip_query": true,
            "regex_case_insensitive": insensitive,
            "max_determinized_states": ctx.config.regex.max_determinized_states,
        }));
        fields.push(field);
    } else if !queries.is_empty() {
        let mut field = HighlightField::new("source_text.plain", HighlighterKind::Plain, 1);
        field.fragment_size = Some(SNIPPET_SIZE);
        field.highlight_query = Clause::any_of(queries);
        fields.push(field);
    }
    fields
}

/// "Did you mean" suggestion, with the user's keyword syntax reapplied
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub query: String,
    /// Suggestion with the corrected words wrapped in `<em>`
    pub snippet: String,
}

impl Suggestion {
    /// Corrected words of the snippet
    pub fn corrections(&self) -> Vec<&str> {
        let mut out = Vec::new();
        let mut rest = self.snippet.as_str();
        while let Some(start) = rest.find(SUGGESTION_HIGHLIGHT_PRE) {
            let after = &rest[start + SUGGESTION_HIGHLIGHT_PRE.len()..];
            let Some(end) = after.find(SUGGESTION_HIGHLIGHT_POST) else {
                break;
            };
            out.push(&after[..end]);
            rest = &after[end + SUGGESTION_HIGHLIGHT_POST.len()..];
        }
        out
    }
}

/// One result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub page_id: Option<u64>,
    pub namespace: i32,
    pub namespace_text: String,
    pub title: String,
    pub score: Option<f64>,
    pub timestamp: Option<String>,
    pub index: String,
    /// Highlighted fragments keyed by field
    pub snippets: BTreeMap<String, Vec<String>>,
}

impl SearchHit {
    /// Title including its namespace prefix
    pub fn full_title(&self) -> String {
        if self.namespace_text.is_empty() {
            self.title.clone()
        } else {
            format!("{}:{}", self.namespace_text, self.title)
        }
    }

    /// First fragment of the best available snippet field
    pub fn best_snippet(&self) -> Option<&str> {
        ["source_text.plain", "text", "auxiliary_text", "file_text", "heading"]
            .iter()
            .find_map(|field| self.snippets.get(*field).and_then(|s| s.first()))
            .map(String::as_str)
    }
}

impl From<Hit> for SearchHit {
    fn from(hit: Hit) -> Self {
        let str_field = |name: &str| hit.source.get(name).and_then(Value::as_str).map(String::from);
        Self {
            page_id: hit.id.parse().ok(),
            namespace: hit
                .source
                .get("namespace")
                .and_then(Value::as_i64)
                .and_then(|ns| i32::try_from(ns).ok())
                .unwrap_or_default(),
            namespace_text: str_field("namespace_text").unwrap_or_default(),
            title: str_field("title").unwrap_or_default(),
            timestamp: str_field("timestamp"),
            score: hit.score,
            index: hit.index,
            snippets: hit.highlight,
        }
    }
}

/// Results of one search
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    pub total: u64,
    pub hits: Vec<SearchHit>,
    pub suggestion: Option<Suggestion>,
    pub warnings: Vec<Warning>,
    pub contained_special_syntax: bool,
    /// Backend timed out; hits are partial
    pub timed_out: bool,
    pub took_ms: u64,
}

impl ResultSet {
    /// Result of a search that could never match anything
    pub fn empty(warnings: Vec<Warning>) -> Self {
        Self {
            warnings,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}
