//! Backend query clauses
//!
//! A typed model of the subset of the backend's JSON query language the
//! compiler emits. Clauses are plain values; [`Clause::to_json`] renders
//! them for the wire.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value, json};

/// Boolean operator of text queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    And,
    Or,
}

impl Operator {
    fn as_str(self) -> &'static str {
        match self {
            Operator::And => "AND",
            Operator::Or => "OR",
        }
    }
}

/// Flavour of a single-field match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Boolean,
    Phrase,
    PhrasePrefix,
}

/// A query clause
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    MatchAll,
    Match {
        field: String,
        query: String,
        kind: MatchKind,
        operator: Option<Operator>,
        analyzer: Option<String>,
    },
    MultiMatch {
        fields: Vec<String>,
        query: String,
        operator: Option<Operator>,
        analyzer: Option<String>,
    },
    Term {
        field: String,
        value: Value,
    },
    Terms {
        field: String,
        values: Vec<Value>,
    },
    Exists {
        field: String,
    },
    Ids {
        values: Vec<String>,
    },
    QueryString(QueryString),
    SimpleQueryString {
        fields: Vec<String>,
        query: String,
        default_operator: Operator,
    },
    Bool(BoolClause),
    /// `safer` wrapper; `settings` carries the configured options
    Safer {
        query: Box<Clause>,
        settings: Value,
        is_rescore: bool,
    },
    SourceRegex(SourceRegex),
    Script(Script),
    FunctionScore(FunctionScore),
    MoreLikeThis(MoreLikeThis),
}

impl Clause {
    /// Single-field boolean match
    pub fn match_field(field: &str, query: &str) -> Self {
        Clause::Match {
            field: field.to_string(),
            query: query.to_string(),
            kind: MatchKind::Boolean,
            operator: None,
            analyzer: None,
        }
    }

    pub fn term(field: &str, value: impl Into<Value>) -> Self {
        Clause::Term {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn terms<V: Into<Value>>(field: &str, values: impl IntoIterator<Item = V>) -> Self {
        Clause::Terms {
            field: field.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// OR of `clauses`; a single clause is returned unwrapped
    pub fn any_of(mut clauses: Vec<Clause>) -> Option<Self> {
        match clauses.len() {
            0 => None,
            1 => clauses.pop(),
            _ => Some(Clause::Bool(BoolClause {
                should: clauses,
                minimum_should_match: Some(1),
                ..Default::default()
            })),
        }
    }

    /// AND of `clauses`; a single clause is returned unwrapped
    pub fn all_of(mut clauses: Vec<Clause>) -> Option<Self> {
        match clauses.len() {
            0 => None,
            1 => clauses.pop(),
            _ => Some(Clause::Bool(BoolClause {
                must: clauses,
                ..Default::default()
            })),
        }
    }

    /// Combine required and excluded clauses into one filter
    pub fn unify(filters: &[Clause], not_filters: &[Clause]) -> Option<Self> {
        if not_filters.is_empty() && filters.len() == 1 {
            return Some(filters[0].clone());
        }
        if filters.is_empty() && not_filters.is_empty() {
            return None;
        }
        Some(Clause::Bool(BoolClause {
            filter: filters.to_vec(),
            must_not: not_filters.to_vec(),
            ..Default::default()
        }))
    }

    pub fn to_json(&self) -> Value {
        match self {
            Clause::MatchAll => json!({ "match_all": {} }),
            Clause::Match {
                field,
                query,
                kind,
                operator,
                analyzer,
            } => {
                let name = match kind {
                    MatchKind::Boolean => "match",
                    MatchKind::Phrase => "match_phrase",
                    MatchKind::PhrasePrefix => "match_phrase_prefix",
                };
                let mut body = Map::new();
                body.insert("query".into(), json!(query));
                if let Some(op) = operator {
                    body.insert("operator".into(), json!(op.as_str().to_lowercase()));
                }
                if let Some(analyzer) = analyzer {
                    body.insert("analyzer".into(), json!(analyzer));
                }
                json!({ name: { field.as_str(): body } })
            }
            Clause::MultiMatch {
                fields,
                query,
                operator,
                analyzer,
            } => {
                let mut body = Map::new();
                body.insert("query".into(), json!(query));
                body.insert("fields".into(), json!(fields));
                if let Some(op) = operator {
                    body.insert("operator".into(), json!(op.as_str().to_lowercase()));
                }
                if let Some(analyzer) = analyzer {
                    body.insert("analyzer".into(), json!(analyzer));
                }
                json!({ "multi_match": body })
            }
            Clause::Term { field, value } => json!({ "term": { field.as_str(): value } }),
            Clause::Terms { field, values } => json!({ "terms": { field.as_str(): values } }),
            Clause::Exists { field } => json!({ "exists": { "field": field } }),
            Clause::Ids { values } => json!({ "ids": { "values": values } }),
            Clause::QueryString(qs) => qs.to_json(),
            Clause::SimpleQueryString {
                fields,
                query,
                default_operator,
            } => json!({
                "simple_query_string": {
                    "fields": fields,
                    "query": query,
                    "default_operator": default_operator.as_str(),
                }
            }),
            Clause::Bool(b) => b.to_json(),
            Clause::Safer {
                query,
                settings,
                is_rescore,
            } => {
                let mut body = match settings {
                    Value::Object(map) => map.clone(),
                    _ => Map::new(),
                };
                body.insert("query".into(), query.to_json());
                let phrase = body.entry("phrase").or_insert_with(|| json!({}));
                if let Value::Object(phrase) = phrase {
                    let action = if *is_rescore {
                        "convert_to_match_all_query"
                    } else {
                        "convert_to_term_queries"
                    };
                    phrase.insert("phrase_too_large_action".into(), json!(action));
                }
                json!({ "safer": body })
            }
            Clause::SourceRegex(r) => r.to_json(),
            Clause::Script(s) => json!({ "script": { "script": s.to_json() } }),
            Clause::FunctionScore(f) => f.to_json(),
            Clause::MoreLikeThis(m) => m.to_json(),
        }
    }
}

impl Serialize for Clause {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Compound boolean clause
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoolClause {
    pub must: Vec<Clause>,
    pub should: Vec<Clause>,
    pub filter: Vec<Clause>,
    pub must_not: Vec<Clause>,
    pub minimum_should_match: Option<u32>,
}

impl BoolClause {
    fn to_json(&self) -> Value {
        let mut body = Map::new();
        for (name, clauses) in [
            ("must", &self.must),
            ("should", &self.should),
            ("filter", &self.filter),
            ("must_not", &self.must_not),
        ] {
            if !clauses.is_empty() {
                let rendered: Vec<Value> = clauses.iter().map(Clause::to_json).collect();
                body.insert(name.into(), Value::Array(rendered));
            }
        }
        if let Some(min) = self.minimum_should_match {
            body.insert("minimum_should_match".into(), json!(min));
        }
        json!({ "bool": body })
    }
}

/// Full query-string query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryString {
    pub query: String,
    pub fields: Vec<String>,
    pub phrase_slop: u32,
    pub default_operator: Operator,
    pub allow_leading_wildcard: bool,
    pub fuzzy_prefix_length: u32,
    pub max_determinized_states: Option<u32>,
}

impl QueryString {
    pub fn new(query: &str, fields: Vec<String>) -> Self {
        Self {
            query: query.to_string(),
            fields,
            phrase_slop: 0,
            default_operator: Operator::And,
            allow_leading_wildcard: true,
            fuzzy_prefix_length: 2,
            max_determinized_states: None,
        }
    }

    fn to_json(&self) -> Value {
        let mut body = Map::new();
        body.insert("query".into(), json!(self.query));
        body.insert("fields".into(), json!(self.fields));
        body.insert("auto_generate_phrase_queries".into(), json!(true));
        body.insert("phrase_slop".into(), json!(self.phrase_slop));
        body.insert("default_operator".into(), json!(self.default_operator.as_str()));
        body.insert("allow_leading_wildcard".into(), json!(self.allow_leading_wildcard));
        body.insert("fuzzy_prefix_length".into(), json!(self.fuzzy_prefix_length));
        body.insert("rewrite".into(), json!("top_terms_boost_1024"));
        if let Some(states) = self.max_determinized_states {
            body.insert("max_determinized_states".into(), json!(states));
        }
        json!({ "query_string": body })
    }
}

/// Trigram-accelerated regex filter over the page source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRegex {
    pub regex: String,
    pub field: String,
    pub ngram_field: String,
    pub max_inspect: u32,
    pub max_determinized_states: u32,
    pub max_ngrams_extracted: Option<u32>,
    pub case_sensitive: bool,
    pub locale: String,
}

impl SourceRegex {
    fn to_json(&self) -> Value {
        let mut body = Map::new();
        body.insert("regex".into(), json!(self.regex));
        body.insert("field".into(), json!(self.field));
        body.insert("ngram_field".into(), json!(self.ngram_field));
        body.insert("max_inspect".into(), json!(self.max_inspect));
        body.insert(
            "max_determinized_states".into(),
            json!(self.max_determinized_states),
        );
        if let Some(max) = self.max_ngrams_extracted {
            body.insert("max_ngrams_extracted".into(), json!(max));
        }
        body.insert("case_sensitive".into(), json!(self.case_sensitive));
        body.insert("locale".into(), json!(self.locale));
        json!({ "source_regex": body })
    }
}

/// Inline script with parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub source: String,
    pub lang: String,
    pub params: Map<String, Value>,
}

impl Script {
    fn to_json(&self) -> Value {
        json!({
            "source": self.source,
            "lang": self.lang,
            "params": self.params,
        })
    }
}

/// Field-value-factor modifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    /// `log10(x + 2)`
    Log2p,
}

/// One scoring function
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreFunction {
    FieldValueFactor {
        field: String,
        modifier: Modifier,
        missing: f64,
    },
    ScriptScore(Script),
    /// Constant multiplier for documents matching `filter`
    Weight { weight: f64, filter: Clause },
}

impl ScoreFunction {
    fn to_json(&self) -> Value {
        match self {
            ScoreFunction::FieldValueFactor {
                field,
                modifier,
                missing,
            } => {
                let modifier = match modifier {
                    Modifier::Log2p => "log2p",
                };
                json!({
                    "field_value_factor": {
                        "field": field,
                        "modifier": modifier,
                        "missing": missing,
                    }
                })
            }
            ScoreFunction::ScriptScore(script) => {
                json!({ "script_score": { "script": script.to_json() } })
            }
            ScoreFunction::Weight { weight, filter } => json!({
                "filter": filter.to_json(),
                "weight": weight,
            }),
        }
    }
}

/// Function-score query without an inner query (matches all documents)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FunctionScore {
    pub functions: Vec<ScoreFunction>,
}

impl FunctionScore {
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    fn to_json(&self) -> Value {
        let functions: Vec<Value> = self.functions.iter().map(ScoreFunction::to_json).collect();
        json!({ "function_score": { "functions": functions } })
    }
}

/// More-like-this query
#[derive(Debug, Clone, PartialEq)]
pub struct MoreLikeThis {
    pub fields: Vec<String>,
    /// Ids of the documents to compare against
    pub like_ids: Vec<String>,
    /// Text to compare against, when resolved up front
    pub like_text: Option<String>,
    pub min_doc_freq: u32,
    pub max_doc_freq: Option<u32>,
    pub max_query_terms: u32,
    pub min_term_freq: u32,
    pub min_word_len: u32,
    pub max_word_len: u32,
    pub minimum_should_match: String,
}

impl MoreLikeThis {
    fn to_json(&self) -> Value {
        let mut like: Vec<Value> = self
            .like_ids
            .iter()
            .map(|id| json!({ "_id": id }))
            .collect();
        if let Some(text) = &self.like_text {
            like.push(json!(text));
        }

        let mut body = Map::new();
        body.insert("fields".into(), json!(self.fields));
        body.insert("like".into(), Value::Array(like));
        body.insert("min_doc_freq".into(), json!(self.min_doc_freq));
        if let Some(max) = self.max_doc_freq {
            body.insert("max_doc_freq".into(), json!(max));
        }
        body.insert("max_query_terms".into(), json!(self.max_query_terms));
        body.insert("min_term_freq".into(), json!(self.min_term_freq));
        body.insert("min_word_length".into(), json!(self.min_word_len));
        body.insert("max_word_length".into(), json!(self.max_word_len));
        body.insert("minimum_should_match".into(), json!(self.minimum_should_match));
        json!({ "more_like_this": body })
    }
}

/// How a rescore combines with the primary score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreMode {
    Total,
    Multiply,
}

/// Secondary scoring pass over the top `window_size` hits
#[derive(Debug, Clone, PartialEq)]
pub struct RescorePass {
    pub window_size: u32,
    pub query: Clause,
    pub query_weight: f64,
    pub rescore_query_weight: f64,
    pub score_mode: Option<ScoreMode>,
}

impl RescorePass {
    pub fn to_json(&self) -> Value {
        let mut query = Map::new();
        query.insert("rescore_query".into(), self.query.to_json());
        query.insert("query_weight".into(), json!(self.query_weight));
        query.insert("rescore_query_weight".into(), json!(self.rescore_query_weight));
        if let Some(mode) = self.score_mode {
            let mode = match mode {
                ScoreMode::Total => "total",
                ScoreMode::Multiply => "multiply",
            };
            query.insert("score_mode".into(), json!(mode));
        }
        json!({ "window_size": self.window_size, "query": query })
    }
}

/// Format a field weight the way the backend's query-string grammar expects
/// (`20`, `0.5`), without binary floating point noise.
pub fn format_weight(weight: f64) -> String {
    let rounded = (weight * 1e6).round() / 1e6;
    format!("{}", rounded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_json() {
        let clause = Clause::match_field("template", "Template:Foo");
        assert_eq!(
            clause.to_json(),
            json!({ "match": { "template": { "query": "Template:Foo" } } })
        );
    }

    #[test]
    fn test_unify() {
        assert!(Clause::unify(&[], &[]).is_none());

        let only = Clause::unify(&[Clause::term("namespace", 0)], &[]).unwrap();
        assert_eq!(only, Clause::term("namespace", 0));

        let both = Clause::unify(&[Clause::term("a", 1)], &[Clause::term("b", 2)]).unwrap();
        assert_eq!(
            both.to_json(),
            json!({ "bool": { "filter": [{ "term": { "a": 1 } }], "must_not": [{ "term": { "b": 2 } }] } })
        );
    }

    #[test]
    fn test_any_of() {
        assert!(Clause::any_of(Vec::new()).is_none());
        let single = Clause::any_of(vec![Clause::MatchAll]).unwrap();
        assert_eq!(single, Clause::MatchAll);
        let many = Clause::any_of(vec![Clause::MatchAll, Clause::MatchAll]).unwrap();
        assert!(matches!(many, Clause::Bool(ref b) if b.should.len() == 2));
    }

    #[test]
    fn test_safer_action() {
        let clause = Clause::Safer {
            query: Box::new(Clause::MatchAll),
            settings: json!({ "phrase": { "max_terms_in_all_queries": 128 } }),
            is_rescore: true,
        };
        let rendered = clause.to_json();
        assert_eq!(
            rendered["safer"]["phrase"]["phrase_too_large_action"],
            json!("convert_to_match_all_query")
        );
        assert_eq!(rendered["safer"]["phrase"]["max_terms_in_all_queries"], json!(128));
        assert_eq!(rendered["safer"]["query"], json!({ "match_all": {} }));
    }

    #[test]
    fn test_rescore_json() {
        let pass = RescorePass {
            window_size: 8192,
            query: Clause::FunctionScore(FunctionScore {
                functions: vec![ScoreFunction::FieldValueFactor {
                    field: "incoming_links".into(),
                    modifier: Modifier::Log2p,
                    missing: 0.0,
                }],
            }),
            query_weight: 1.0,
            rescore_query_weight: 1.0,
            score_mode: Some(ScoreMode::Multiply),
        };
        let rendered = pass.to_json();
        assert_eq!(rendered["window_size"], json!(8192));
        assert_eq!(rendered["query"]["score_mode"], json!("multiply"));
        assert_eq!(
            rendered["query"]["rescore_query"]["function_score"]["functions"][0]["field_value_factor"]["modifier"],
            json!("log2p")
        );
    }

    #[test]
    fn test_format_weight() {
        assert_eq!(format_weight(20.0), "20");
        assert_eq!(format_weight(0.5), "0.5");
        assert_eq!(format_weight(0.1 * 3.0), "0.3");
        assert_eq!(format_weight(2.0 * 15.0), "30");
    }
}
