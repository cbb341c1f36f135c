//! Full-text query assembly
//!
//! Turns the residual term left by keyword extraction into the main
//! query-string query, its near-match companion, the phrase rescore and
//! the simplified query used if the backend cannot parse the main one.

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use crate::query::context::SearchContext;
use crate::query::dsl::{BoolClause, Clause, MatchKind, Operator, RescorePass};
use crate::query::escaper::contains_syntax;
use crate::query::fields::FieldWeighting;
use crate::query::scanner::{Segment, segment};

/// A phrase ending in a wildcard: `"foo bar*"`
static PHRASE_PREFIX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"^"([^"*]+)[*]""#).ok());

/// Compiled text part of a full-text search
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextQuery {
    /// `None` when nothing but keywords was searched for
    pub query: Option<Clause>,
    /// Conjunctive simple query over the same fields
    pub fallback: Option<Clause>,
    /// Text to run the phrase suggester on
    pub suggest: Option<String>,
}

/// One segment rendered for the query string
struct Part {
    escaped: String,
    /// Same part with the all-fields shortcut disabled
    non_all: String,
}

/// Build the text query from `ctx.term`.
///
/// Expects keyword extraction to have run already. Records phrase-prefix
/// queries, the highlight query, the phrase rescore and the special-syntax
/// and fuzzy flags on `ctx`.
pub fn build(ctx: &mut SearchContext<'_>, show_suggestion: bool, offset: usize) -> TextQuery {
    ctx.term = ctx.escaper.escape_quote_pairs(&ctx.term).trim().to_string();

    let namespaces = ctx.namespaces.clone();
    let weighting = FieldWeighting::new(ctx.config, &namespaces);

    let mut parts = Vec::new();
    let mut near_match = Vec::new();
    for seg in segment(&ctx.term) {
        match seg {
            Segment::Phrase {
                text,
                slop,
                negated,
                fuzzy,
            } => {
                let mut main = ctx.escaper.fixup_query_string_part(&text);
                if !negated && !fuzzy && slop.is_none() {
                    if let Some(prefix) = phrase_prefix(&main) {
                        add_phrase_prefix(ctx, &prefix);
                        continue;
                    }
                }

                let not = if negated { "NOT " } else { "" };
                if fuzzy {
                    let escaped = format!("{}{}", not, main);
                    parts.push(Part {
                        non_all: escaped.clone(),
                        escaped,
                    });
                } else {
                    if slop.is_none() {
                        main = format!("{}~{}", main, ctx.config.phrase.slop_precise);
                    }
                    // Phrases are locked to the fields they name, so the
                    // highlighter needs a copy without the all field
                    parts.push(Part {
                        escaped: format!("{}{}", not, weighting.switch_to_exact(&main, true)),
                        non_all: format!("{}{}", not, weighting.switch_to_exact(&main, false)),
                    });
                }
            }
            Segment::Wildcard(text) => {
                // Prefix matches skip stemming
                let term = ctx.escaper.fixup_query_string_part(&text);
                let exact = weighting.switch_to_exact_for_wildcards(&term);
                parts.push(Part {
                    escaped: exact.clone(),
                    non_all: exact,
                });
            }
            Segment::Raw(text) => {
                let fixed = ctx.escaper.fixup_query_string_part(&text);
                parts.push(Part {
                    escaped: fixed.clone(),
                    non_all: fixed,
                });
                near_match.push(text);
            }
        }
    }

    let escaped: Vec<&str> = parts.iter().map(|p| p.escaped.as_str()).collect();
    let (query_string, fuzzy) = ctx.escaper.fixup_whole_query_string(&escaped.join(" "));
    ctx.fuzzy_query |= fuzzy;
    let near_match = near_match.join(" ");

    if query_string.is_empty() {
        return TextQuery::default();
    }

    let mut show_suggestion = show_suggestion;
    if contains_syntax(&query_string) {
        ctx.contained_special_syntax = true;
        show_suggestion = false;
    }

    let config = ctx.config;
    let mut fields = weighting.build_fields(1.0, ".plain", true);
    fields.extend(weighting.build_fields(config.stemmed_weight, "", true));
    let near_match_fields = weighting.build_fields(config.near_match_weight, ".near_match", true);

    let query = main_query(ctx, &fields, near_match_fields, &query_string, &near_match);

    let non_all_fields = if config.all_fields.use_all {
        let mut non_all_fields = weighting.build_fields(1.0, ".plain", false);
        non_all_fields.extend(weighting.build_fields(config.stemmed_weight, "", false));
        let non_all: Vec<&str> = parts.iter().map(|p| p.non_all.as_str()).collect();
        let (non_all_query, _) = ctx.escaper.fixup_whole_query_string(&non_all.join(" "));
        ctx.highlight_query = Some(query_for_fields(
            ctx,
            non_all_fields.clone(),
            &non_all_query,
            1,
            false,
        ));
        non_all_fields
    } else {
        fields.clone()
    };

    // A phrase rescore only helps multi-word queries without phrases of their own
    let phrase = &config.phrase;
    if phrase.rescore_boost > 1.0
        && phrase.rescore_window > 0
        && !ctx.contained_special_syntax
        && !query_string.contains('"')
        && query_string.contains(' ')
    {
        let rescore_fields = if config.all_fields.for_rescore {
            fields.clone()
        } else {
            non_all_fields
        };
        let rescore_query = query_for_fields(
            ctx,
            rescore_fields,
            &format!("\"{}\"", query_string),
            phrase.slop_boost,
            true,
        );
        ctx.rescore.push(RescorePass {
            window_size: phrase.rescore_window,
            query: rescore_query,
            query_weight: 1.0,
            rescore_query_weight: phrase.rescore_boost,
            score_mode: None,
        });
    }

    let suggest = (show_suggestion && offset == 0).then(|| ctx.term.clone());

    debug!(query = %query_string, near_match = %near_match, fuzzy, "assembled text query");

    TextQuery {
        query: Some(query),
        fallback: Some(Clause::SimpleQueryString {
            fields,
            query: query_string,
            default_operator: Operator::And,
        }),
        suggest,
    }
}

/// Inner text of a phrase ending in a wildcard
fn phrase_prefix(main: &str) -> Option<String> {
    let caps = PHRASE_PREFIX.as_ref()?.captures(main)?;
    Some(caps[1].to_string())
}

fn add_phrase_prefix(ctx: &mut SearchContext<'_>, prefix: &str) {
    ctx.non_text_queries.push(Clause::Match {
        field: "all.plain".to_string(),
        query: prefix.to_string(),
        kind: MatchKind::PhrasePrefix,
        operator: None,
        analyzer: None,
    });
    let highlight = ctx.query_string(&format!("{}*", prefix), vec!["all.plain".to_string()]);
    ctx.non_text_highlight_queries.push(Clause::QueryString(highlight));
}

/// Query-string query over `fields`, OR-ed with an unescaped near match
/// on titles when there is raw text to match
fn main_query(
    ctx: &SearchContext<'_>,
    fields: &[String],
    near_match_fields: Vec<String>,
    query_string: &str,
    near_match: &str,
) -> Clause {
    let most_fields = query_for_fields(
        ctx,
        fields.to_vec(),
        query_string,
        ctx.config.phrase.slop_default,
        false,
    );
    if near_match.is_empty() {
        return most_fields;
    }
    Clause::Bool(BoolClause {
        should: vec![
            most_fields,
            Clause::MultiMatch {
                fields: near_match_fields,
                query: near_match.to_string(),
                operator: None,
                analyzer: None,
            },
        ],
        minimum_should_match: Some(1),
        ..Default::default()
    })
}

fn query_for_fields(
    ctx: &SearchContext<'_>,
    fields: Vec<String>,
    query_string: &str,
    phrase_slop: u32,
    is_rescore: bool,
) -> Clause {
    let mut qs = ctx.query_string(query_string, fields);
    qs.phrase_slop = phrase_slop;
    ctx.wrap_in_safer(Clause::QueryString(qs), is_rescore)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::content::NullContentStore;
    use crate::query::features::FeatureRegistry;
    use crate::query::features::test_support::with_context;
    use crate::query::scanner::extract_keywords;

    fn compile(config: &SearchConfig, term: &str, show_suggestion: bool) -> (TextQuery, Snapshot) {
        let registry = FeatureRegistry::standard();
        with_context(config, &NullContentStore, |ctx| {
            ctx.term = term.to_string();
            extract_keywords(&registry, ctx);
            let text = build(ctx, show_suggestion, 0);
            (
                text,
                Snapshot {
                    term: ctx.term.clone(),
                    special: ctx.contained_special_syntax,
                    fuzzy: ctx.fuzzy_query,
                    rescore: ctx.rescore.clone(),
                    non_text: ctx.non_text_queries.clone(),
                    highlight_query: ctx.highlight_query.clone(),
                },
            )
        })
    }

    struct Snapshot {
        term: String,
        special: bool,
        fuzzy: bool,
        rescore: Vec<RescorePass>,
        non_text: Vec<Clause>,
        highlight_query: Option<Clause>,
    }

    fn query_string_of(clause: &Clause) -> &str {
        match clause {
            Clause::QueryString(qs) => &qs.query,
            Clause::Bool(b) => query_string_of(&b.should[0]),
            Clause::Safer { query, .. } => query_string_of(query),
            other => panic!("not a query string: {:?}", other),
        }
    }

    #[test]
    fn test_plain_words() {
        let config = SearchConfig::default();
        let (text, snap) = compile(&config, "castle moat", true);
        let query = text.query.unwrap();
        assert_eq!(query_string_of(&query), "castle moat");

        // Near match companion over titles
        let Clause::Bool(bool) = &query else {
            panic!("expected bool");
        };
        assert_eq!(bool.minimum_should_match, Some(1));
        assert!(matches!(
            &bool.should[1],
            Clause::MultiMatch { query, fields, .. }
                if query == "castle moat" && fields[0] == "title.near_match^40"
        ));

        assert!(!snap.special);
        assert_eq!(snap.rescore.len(), 1);
        assert_eq!(snap.rescore[0].window_size, 512);
        assert_eq!(snap.rescore[0].rescore_query_weight, 10.0);
        assert_eq!(query_string_of(&snap.rescore[0].query), "\"castle moat\"");
        assert_eq!(text.suggest.as_deref(), Some("castle moat"));
        assert!(matches!(
            text.fallback,
            Some(Clause::SimpleQueryString { default_operator: Operator::And, .. })
        ));
    }

    #[test]
    fn test_single_word_no_rescore() {
        let config = SearchConfig::default();
        let (_, snap) = compile(&config, "castle", true);
        assert!(snap.rescore.is_empty());
    }

    #[test]
    fn test_phrase_switches_to_exact() {
        let config = SearchConfig::default();
        let (text, snap) = compile(&config, "\"castle moat\"", true);
        let qs = query_string_of(text.query.as_ref().unwrap()).to_string();
        assert!(qs.starts_with("(title.plain:\"castle moat\"~0^20 OR "));
        assert!(snap.special);
        assert!(snap.rescore.is_empty());
        assert!(text.suggest.is_none());
    }

    #[test]
    fn test_negated_phrase() {
        let config = SearchConfig::default();
        let (text, _) = compile(&config, "castle -\"moat\"", false);
        let qs = query_string_of(text.query.as_ref().unwrap()).to_string();
        assert!(qs.contains("NOT (title.plain:\"moat\"~0^20"));
    }

    #[test]
    fn test_phrase_prefix() {
        let config = SearchConfig::default();
        let (text, snap) = compile(&config, "\"castle mo*\"", false);
        assert!(text.query.is_none());
        assert_eq!(
            snap.non_text,
            vec![Clause::Match {
                field: "all.plain".into(),
                query: "castle mo".into(),
                kind: MatchKind::PhrasePrefix,
                operator: None,
                analyzer: None,
            }]
        );
    }

    #[test]
    fn test_wildcard_plain_fields() {
        let config = SearchConfig::default();
        let (text, snap) = compile(&config, "cast*", false);
        let qs = query_string_of(text.query.as_ref().unwrap()).to_string();
        assert!(qs.starts_with("(title.plain:cast*^20"));
        assert!(snap.special);
    }

    #[test]
    fn test_fuzzy_flag() {
        let config = SearchConfig::default();
        let (_, snap) = compile(&config, "castle~", false);
        assert!(snap.fuzzy);
    }

    #[test]
    fn test_keywords_only() {
        let config = SearchConfig::default();
        let (text, snap) = compile(&config, "hastemplate:Foo", true);
        assert_eq!(snap.term, "");
        assert_eq!(text, TextQuery::default());
    }

    #[test]
    fn test_all_fields_highlight_query() {
        let mut config = SearchConfig::default();
        config.all_fields.use_all = true;
        let (text, snap) = compile(&config, "castle moat", false);
        let Clause::Bool(bool) = text.query.unwrap() else {
            panic!("expected bool");
        };
        let Clause::QueryString(main) = &bool.should[0] else {
            panic!("expected query string");
        };
        assert_eq!(main.fields, vec!["all.plain^1", "all^0.5"]);

        let Some(Clause::QueryString(highlight)) = snap.highlight_query else {
            panic!("expected highlight query");
        };
        assert_eq!(highlight.fields.len(), 16);
        assert_eq!(highlight.phrase_slop, 1);

        // Rescore keeps the all field by default
        let Clause::QueryString(rescore) = &snap.rescore[0].query else {
            panic!("expected query string");
        };
        assert_eq!(rescore.fields, main.fields);
    }
}
