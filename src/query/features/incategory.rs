//! `incategory:A|B|id:123` filters on category membership

use super::{Applied, KeywordFeature, KeywordMatch};
use crate::query::context::{CrossSearchStrategy, SearchContext};
use crate::query::dsl::Clause;

pub struct IncategoryFeature;

/// One `|`-separated entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryRef {
    Name(String),
    /// `id:<digits>`, resolved through the content store
    PageId(u64),
}

impl CategoryRef {
    fn parse(entry: &str) -> Self {
        match entry.strip_prefix("id:").map(str::parse::<u64>) {
            Some(Ok(id)) => CategoryRef::PageId(id),
            _ => CategoryRef::Name(entry.to_string()),
        }
    }
}

impl KeywordFeature for IncategoryFeature {
    type Value = Vec<CategoryRef>;

    fn keywords(&self) -> &'static [&'static str] {
        &["incategory"]
    }

    fn cross_search_strategy(&self, refs: &Vec<CategoryRef>) -> CrossSearchStrategy {
        // Page ids only mean something on the local wiki
        if refs.iter().any(|r| matches!(r, CategoryRef::PageId(_))) {
            CrossSearchStrategy::HostWikiOnly
        } else {
            CrossSearchStrategy::AllWikis
        }
    }

    fn parse_value(&self, ctx: &mut SearchContext<'_>, m: &KeywordMatch) -> Option<Vec<CategoryRef>> {
        Some(
            m.value
                .split('|')
                .take(ctx.config.limits.max_incategory_options)
                .map(CategoryRef::parse)
                .collect(),
        )
    }

    fn apply(&self, ctx: &mut SearchContext<'_>, _m: &KeywordMatch, refs: Vec<CategoryRef>) -> Applied {
        let mut names = Vec::new();
        let mut ids = Vec::new();
        for r in refs {
            match r {
                CategoryRef::Name(name) => names.push(name),
                CategoryRef::PageId(id) => ids.push(id),
            }
        }
        if !ids.is_empty() {
            names.extend(
                ctx.content
                    .titles_for_page_ids(&ids)
                    .into_iter()
                    .map(|title| title.text),
            );
        }

        let matches = names
            .iter()
            .filter(|name| !name.is_empty())
            .map(|name| Clause::match_field("category.lowercase_keyword", name))
            .collect();
        match Clause::any_of(matches) {
            Some(clause) => Applied::filter(clause),
            None => {
                ctx.no_results_possible = true;
                Applied::none()
            }
        }
    }
}
