//! `local:` at the head of a query keeps the search on the local wiki

use super::{Applied, KeywordFeature, KeywordMatch};
use crate::query::context::{CrossSearchStrategy, SearchContext};

pub struct LocalFeature;

impl KeywordFeature for LocalFeature {
    type Value = ();

    fn keywords(&self) -> &'static [&'static str] {
        &["local"]
    }

    fn find(&self, text: &str, from: usize) -> Option<KeywordMatch> {
        let body = text.trim_start();
        let start = text.len() - body.len();
        if from > 0 || !body.starts_with("local:") {
            return None;
        }
        Some(KeywordMatch {
            start: 0,
            end: start + "local:".len(),
            key: "local".to_string(),
            value: String::new(),
            quoted_value: String::new(),
            negated: false,
        })
    }

    fn cross_search_strategy(&self, _value: &()) -> CrossSearchStrategy {
        CrossSearchStrategy::HostWikiOnly
    }

    fn is_special_syntax(&self) -> bool {
        false
    }

    fn parse_value(&self, _ctx: &mut SearchContext<'_>, _m: &KeywordMatch) -> Option<()> {
        Some(())
    }

    fn apply(&self, ctx: &mut SearchContext<'_>, _m: &KeywordMatch, _value: ()) -> Applied {
        ctx.limit_search_to_local_wiki = true;
        Applied::none()
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
    fn test_only_at_head() {
        let m = LocalFeature.locate("  local:cats", 0).unwrap();
        assert_eq!(m.end, 8);
        assert!(LocalFeature.locate("cats local:dogs", 0).is_none());
    }

    #[test]
    fn test_sets_local() {
        let config = SearchConfig::default();
        with_context(&config, &NullContentStore, |ctx| {
            let m = LocalFeature.locate("local:cats", 0).unwrap();
            LocalFeature.handle(ctx, &m).unwrap();
            assert!(ctx.limit_search_to_local_wiki);
            assert!(!ctx.allows_extra_indexes());
            assert!(!ctx.contained_special_syntax);
        });
    }
}
