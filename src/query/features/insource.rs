//! `insource:` in its regex (`insource:/re/i`) and text forms

use regex::Regex;
use serde_json::{Map, Value, json};
use std::sync::LazyLock;

use super::{Applied, KeywordFeature, KeywordMatch, at_token_boundary};
use crate::config::RegexStrategy;
use crate::query::context::{CrossSearchStrategy, HighlightSource, SearchContext, SearchKind};
use crate::query::dsl::{Clause, Script, SourceRegex};

static INSOURCE_REGEX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(-)?insource:/((?:[^\\/]|\\.)+)/(i)? ?").ok());

const REGEX_SCRIPT: &str = "\
def text = params._source.source_text;
if (text == null) { return false; }
if (params.insensitive) { text = text.toLowerCase(); }
return text ==~ params.pattern;";

pub struct InsourceRegexFeature;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegexValue {
    pub pattern: String,
    pub insensitive: bool,
}

impl KeywordFeature for InsourceRegexFeature {
    type Value = RegexValue;

    fn keywords(&self) -> &'static [&'static str] {
        &["insource"]
    }

    fn find(&self, text: &str, from: usize) -> Option<KeywordMatch> {
        let re = INSOURCE_REGEX.as_ref()?;
        let mut from = from;
        while from <= text.len() {
            let caps = re.captures_at(text, from)?;
            let whole = caps.get(0)?;
            if !at_token_boundary(text, whole.start()) {
                from = whole.start() + 1;
                continue;
            }
            let pattern = caps.get(2)?.as_str();
            let flags = if caps.get(3).is_some() { "i" } else { "" };
            return Some(KeywordMatch {
                start: whole.start(),
                end: whole.end(),
                key: "insource".to_string(),
                value: pattern.to_string(),
                quoted_value: format!("/{}/{}", pattern, flags),
                negated: caps.get(1).is_some(),
            });
        }
        None
    }

    fn cross_search_strategy(&self, _value: &RegexValue) -> CrossSearchStrategy {
        CrossSearchStrategy::HostWikiOnly
    }

    fn parse_value(&self, ctx: &mut SearchContext<'_>, m: &KeywordMatch) -> Option<RegexValue> {
        if !ctx.config.regex.enabled {
            return None;
        }
        Some(RegexValue {
            pattern: m.value.clone(),
            insensitive: m.quoted_value.ends_with('i'),
        })
    }

    fn apply(&self, ctx: &mut SearchContext<'_>, m: &KeywordMatch, value: RegexValue) -> Applied {
        ctx.search_kind = SearchKind::Regex;
        let locale = ctx.config.content_language.clone();

        if !m.negated {
            ctx.highlight_sources.push(HighlightSource::Regex {
                pattern: value.pattern.clone(),
                locale: locale.clone(),
                insensitive: value.insensitive,
            });
        }

        let config = ctx.config;
        let regex = &config.regex;
        let clause = match regex.strategy {
            RegexStrategy::Plugin => Clause::SourceRegex(SourceRegex {
                regex: value.pattern,
                field: "source_text".to_string(),
                ngram_field: "source_text.trigram".to_string(),
                max_inspect: regex.max_inspect,
                max_determinized_states: regex.max_determinized_states,
                max_ngrams_extracted: regex.max_ngrams_extracted,
                case_sensitive: !value.insensitive,
                locale,
            }),
            RegexStrategy::Script => {
                let mut params = Map::new();
                params.insert("pattern".into(), json!(format!(".*({}).*", value.pattern)));
                params.insert("insensitive".into(), Value::Bool(value.insensitive));
                params.insert("language".into(), json!(locale));
                Clause::Script(Script {
                    source: REGEX_SCRIPT.to_string(),
                    lang: config.script_language.clone(),
                    params,
                })
            }
        };
        Applied::filter(clause)
    }
}

/// Filter a free-text value against `fields` with a query-string query.
///
/// Records whether the value implied fuzzy matching.
pub(super) fn text_filter(ctx: &mut SearchContext<'_>, value: &str, fields: Vec<String>) -> Clause {
    let part = ctx.escaper.fixup_query_string_part(value);
    let (query, fuzzy) = ctx.escaper.fixup_whole_query_string(&part);
    ctx.fuzzy_query |= fuzzy;
    let qs = ctx.query_string(&query, fields);
    ctx.wrap_in_safer(Clause::QueryString(qs), false)
}

pub struct InsourceFeature;

impl KeywordFeature for InsourceFeature {
    type Value = String;

    fn keywords(&self) -> &'static [&'static str] {
        &["insource"]
    }

    fn parse_value(&self, _ctx: &mut SearchContext<'_>, m: &KeywordMatch) -> Option<String> {
        Some(m.quoted_value.clone())
    }

    fn apply(&self, ctx: &mut SearchContext<'_>, m: &KeywordMatch, value: String) -> Applied {
        let clause = text_filter(ctx, &value, vec!["source_text.plain".to_string()]);
        if !m.negated {
            ctx.highlight_sources.push(HighlightSource::Query(clause.clone()));
        }
        Applied::filter(clause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::content::NullContentStore;
    use crate::query::features::DynFeature;
    use crate::query::features::test_support::with_context;

    #[test]
    fn test_regex_span() {
        let m = InsourceRegexFeature
            .locate(r"insource:/foo.*bar/i catapult", 0)
            .unwrap();
        assert_eq!(m.value, "foo.*bar");
        assert_eq!(m.quoted_value, "/foo.*bar/i");
        assert_eq!(m.end, 21);
        assert!(!m.negated);
    }

    #[test]
    fn test_regex_escaped_slash() {
        let m = InsourceRegexFeature.locate(r"insource:/a\/b/", 0).unwrap();
        assert_eq!(m.value, r"a\/b");
    }

    #[test]
    fn test_regex_plugin_filter() {
        let config = SearchConfig::default();
        with_context(&config, &NullContentStore, |ctx| {
            let m = InsourceRegexFeature.locate("insource:/foo.*bar/i", 0).unwrap();
            let applied = InsourceRegexFeature.handle(ctx, &m).unwrap();
            match applied.clause {
                Some(Clause::SourceRegex(ref r)) => {
                    assert_eq!(r.regex, "foo.*bar");
                    assert!(!r.case_sensitive);
                    assert_eq!(r.max_inspect, 10_000);
                }
                ref other => panic!("unexpected clause {:?}", other),
            }
            assert_eq!(ctx.search_kind, SearchKind::Regex);
            assert_eq!(ctx.cross_search, CrossSearchStrategy::HostWikiOnly);
            assert_eq!(
                ctx.highlight_sources,
                vec![HighlightSource::Regex {
                    pattern: "foo.*bar".into(),
                    locale: "en".into(),
                    insensitive: true
                }]
            );
        });
    }

    #[test]
    fn test_regex_negated_no_highlight() {
        let config = SearchConfig::default();
        with_context(&config, &NullContentStore, |ctx| {
            let m = InsourceRegexFeature.locate("-insource:/x/", 0).unwrap();
            assert!(m.negated);
            InsourceRegexFeature.handle(ctx, &m).unwrap();
            assert!(ctx.highlight_sources.is_empty());
        });
    }

    #[test]
    fn test_regex_script_strategy() {
        let mut config = SearchConfig::default();
        config.regex.strategy = RegexStrategy::Script;
        with_context(&config, &NullContentStore, |ctx| {
            let m = InsourceRegexFeature.locate("insource:/ab+/", 0).unwrap();
            let applied = InsourceRegexFeature.handle(ctx, &m).unwrap();
            match applied.clause {
                Some(Clause::Script(ref s)) => {
                    assert_eq!(s.params["pattern"], json!(".*(ab+).*"));
                    assert_eq!(s.params["insensitive"], json!(false));
                    assert_eq!(s.lang, "groovy");
                }
                ref other => panic!("unexpected clause {:?}", other),
            }
        });
    }

    #[test]
    fn test_regex_disabled() {
        let mut config = SearchConfig::default();
        config.regex.enabled = false;
        with_context(&config, &NullContentStore, |ctx| {
            let m = InsourceRegexFeature.locate("insource:/x/", 0).unwrap();
            assert!(InsourceRegexFeature.handle(ctx, &m).is_none());
            assert!(!ctx.contained_special_syntax);
            assert_eq!(ctx.search_kind, SearchKind::FullText);
        });
    }

    #[test]
    fn test_text_form() {
        let config = SearchConfig::default();
        with_context(&config, &NullContentStore, |ctx| {
            let m = InsourceFeature.locate("insource:\"foo bar\"", 0).unwrap();
            let applied = InsourceFeature.handle(ctx, &m).unwrap();
            match applied.clause {
                Some(Clause::QueryString(ref qs)) => {
                    assert_eq!(qs.query, "\"foo bar\"");
                    assert_eq!(qs.fields, vec!["source_text.plain".to_string()]);
                }
                ref other => panic!("unexpected clause {:?}", other),
            }
            assert_eq!(ctx.highlight_sources.len(), 1);
            assert!(!applied.keep_text);
        });
    }

    #[test]
    fn test_text_negated_no_highlight() {
        let config = SearchConfig::default();
        with_context(&config, &NullContentStore, |ctx| {
            let m = InsourceFeature.locate("castle -insource:moat", 0).unwrap();
            assert!(m.negated);
            InsourceFeature.handle(ctx, &m).unwrap();
            assert!(ctx.highlight_sources.is_empty());
        });
    }

    #[test]
    fn test_fuzzy_survives_later_filter() {
        let config = SearchConfig::default();
        with_context(&config, &NullContentStore, |ctx| {
            text_filter(ctx, "catapult~", vec!["source_text.plain".to_string()]);
            assert!(ctx.fuzzy_query);
            text_filter(ctx, "castle", vec!["title".to_string()]);
            assert!(ctx.fuzzy_query);
        });
    }
}
