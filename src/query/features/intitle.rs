//! `intitle:` filters on title and redirect text, and keeps its value in
//! the full-text query

use super::insource::text_filter;
use super::{Applied, KeywordFeature, KeywordMatch};
use crate::query::context::SearchContext;

pub struct IntitleFeature;

fn title_fields(query: &str) -> Vec<String> {
    let fields: &[&str] = if query.contains(['?', '*']) {
        &["title.plain", "redirect.title.plain"]
    } else {
        &["title", "title.plain", "redirect.title", "redirect.title.plain"]
    };
    fields.iter().map(|f| f.to_string()).collect()
}

impl KeywordFeature for IntitleFeature {
    type Value = String;

    fn keywords(&self) -> &'static [&'static str] {
        &["intitle"]
    }

    fn parse_value(&self, _ctx: &mut SearchContext<'_>, m: &KeywordMatch) -> Option<String> {
        Some(m.quoted_value.clone())
    }

    fn apply(&self, ctx: &mut SearchContext<'_>, m: &KeywordMatch, value: String) -> Applied {
        let fields = title_fields(&value);
        let clause = text_filter(ctx, &value, fields);
        Applied {
            clause: Some(clause),
            keep_text: !m.negated,
        }
    }
}
