//! `prefix:` restricts results to titles starting with the value

use super::{Applied, KeywordFeature, KeywordMatch, find_keyword_head};
use crate::namespace::{NS_MAIN, NamespaceSet};
use crate::query::context::{CrossSearchStrategy, SearchContext};
use crate::query::dsl::{BoolClause, Clause};

pub struct PrefixFeature;

/// Parsed `prefix:` argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixValue {
    /// `None` selects every namespace
    pub namespace: Option<i32>,
    /// `None` matches every title in the namespace
    pub title: Option<String>,
}

impl PrefixValue {
    pub fn to_clause(&self) -> Option<Clause> {
        let prefix = self
            .title
            .as_deref()
            .map(|title| Clause::match_field("title.prefix", title));
        let namespace = self.namespace.map(|ns| Clause::term("namespace", ns));
        match (prefix, namespace) {
            (Some(prefix), Some(namespace)) => Some(Clause::Bool(BoolClause {
                must: vec![prefix, namespace],
                ..Default::default()
            })),
            (prefix, namespace) => namespace.or(prefix),
        }
    }
}

fn trim_quotes(value: &str) -> &str {
    let trimmed = value.trim_end();
    match trimmed.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
        Some(inner) if !inner.contains('"') => inner,
        _ => value,
    }
}

impl KeywordFeature for PrefixFeature {
    type Value = PrefixValue;

    fn keywords(&self) -> &'static [&'static str] {
        &["prefix"]
    }

    fn is_greedy(&self) -> bool {
        true
    }

    fn find(&self, text: &str, from: usize) -> Option<KeywordMatch> {
        let head = find_keyword_head(text, from, self.keywords())?;
        let value = text[head.value_start..].to_string();
        if value.trim().trim_matches('"').trim().is_empty() {
            return None;
        }
        Some(KeywordMatch {
            start: head.start,
            end: text.len(),
            key: head.key.to_string(),
            value: value.clone(),
            quoted_value: value,
            negated: head.negated,
        })
    }

    fn cross_search_strategy(&self, _value: &PrefixValue) -> CrossSearchStrategy {
        CrossSearchStrategy::HostWikiOnly
    }

    fn parse_value(&self, ctx: &mut SearchContext<'_>, m: &KeywordMatch) -> Option<PrefixValue> {
        let mut value = trim_quotes(&m.value);
        let mut namespace = Some(NS_MAIN);

        if let Some((selected, rest)) = ctx.namespace_table.split_prefix(value) {
            namespace = selected.ids().and_then(|ids| ids.first().copied());
            value = trim_quotes(rest);
        }

        let value = value.trim();
        Some(PrefixValue {
            namespace,
            title: (!value.is_empty()).then(|| value.to_string()),
        })
    }

    fn apply(&self, ctx: &mut SearchContext<'_>, m: &KeywordMatch, value: PrefixValue) -> Applied {
        ctx.suggest_suffixes.push(format!(" prefix:{}", m.value));
        // Replaces, never intersects with, the caller's selection
        ctx.namespaces = match value.namespace {
            Some(ns) => NamespaceSet::only([ns]),
            None => NamespaceSet::All,
        };
        Applied::maybe_filter(value.to_clause())
    }
}
