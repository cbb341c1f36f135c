//! `linksto:` filters on outgoing links

use super::{Applied, KeywordFeature, KeywordMatch};
use crate::query::context::{CrossSearchStrategy, SearchContext};
use crate::query::dsl::Clause;

pub struct LinksToFeature;

impl KeywordFeature for LinksToFeature {
    type Value = String;

    fn keywords(&self) -> &'static [&'static str] {
        &["linksto"]
    }

    fn cross_search_strategy(&self, _value: &String) -> CrossSearchStrategy {
        CrossSearchStrategy::HostWikiOnly
    }

    fn parse_value(&self, _ctx: &mut SearchContext<'_>, m: &KeywordMatch) -> Option<String> {
        // Links are indexed by db key
        Some(m.value.replace(' ', "_"))
    }

    fn apply(&self, _ctx: &mut SearchContext<'_>, _m: &KeywordMatch, value: String) -> Applied {
        Applied::filter(Clause::match_field("outgoing_link", &value))
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
    fn test_underscores() {
        let config = SearchConfig::default();
        with_context(&config, &NullContentStore, |ctx| {
            let m = LinksToFeature.locate("linksto:\"Main Page\"", 0).unwrap();
            let applied = LinksToFeature.handle(ctx, &m).unwrap();
            assert_eq!(
                applied.clause,
                Some(Clause::match_field("outgoing_link", "Main_Page"))
            );
            assert_eq!(ctx.cross_search, CrossSearchStrategy::HostWikiOnly);
            assert!(ctx.contained_special_syntax);
        });
    }
}
