//! `inlanguage:en,fr` filters on the document language

use super::{Applied, KeywordFeature, KeywordMatch};
use crate::error::{TOO_MANY_CONDITIONS, WarningCollector};
use crate::query::context::SearchContext;
use crate::query::dsl::Clause;

/// Most languages a single `inlanguage:` may list
pub const MAX_LANGUAGES: usize = 20;

pub struct InlanguageFeature;

impl KeywordFeature for InlanguageFeature {
    type Value = Vec<String>;

    fn keywords(&self) -> &'static [&'static str] {
        &["inlanguage"]
    }

    fn parse_value(&self, ctx: &mut SearchContext<'_>, m: &KeywordMatch) -> Option<Vec<String>> {
        let mut langs: Vec<String> = m.value.split(',').map(str::to_string).collect();
        if langs.len() > MAX_LANGUAGES {
            let limit = MAX_LANGUAGES.to_string();
            ctx.add_warning(TOO_MANY_CONDITIONS, &[&m.key, &limit]);
            langs.truncate(MAX_LANGUAGES);
        }
        Some(langs)
    }

    fn apply(&self, _ctx: &mut SearchContext<'_>, _m: &KeywordMatch, langs: Vec<String>) -> Applied {
        let queries = langs
            .iter()
            .map(|lang| lang.trim())
            .filter(|lang| !lang.is_empty())
            .map(|lang| Clause::match_field("language", lang))
            .collect();
        Applied::maybe_filter(Clause::any_of(queries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::content::NullContentStore;
    use crate::error::Warning;
    use crate::query::features::DynFeature;
    use crate::query::features::test_support::with_context;

    fn run(text: &str) -> (Applied, Vec<Warning>) {
        let config = SearchConfig::default();
        with_context(&config, &NullContentStore, |ctx| {
            let m = InlanguageFeature.locate(text, 0).unwrap();
            let applied = InlanguageFeature.handle(ctx, &m).unwrap();
            (applied, ctx.warnings.clone())
        })
    }

    #[test]
    fn test_single_language() {
        let (applied, warnings) = run("inlanguage:fr");
        assert!(warnings.is_empty());
        assert_eq!(applied.clause, Some(Clause::match_field("language", "fr")));
    }

    #[test]
    fn test_truncates_with_one_warning() {
        let langs: Vec<String> = (0..25).map(|i| format!("l{}", i)).collect();
        let (applied, warnings) = run(&format!("inlanguage:{}", langs.join(",")));
        assert_eq!(
            warnings,
            vec![Warning::new(TOO_MANY_CONDITIONS, &["inlanguage", "20"])]
        );
        match applied.clause {
            Some(Clause::Bool(b)) => assert_eq!(b.should.len(), MAX_LANGUAGES),
            other => panic!("unexpected clause {:?}", other),
        }
    }

    #[test]
    fn test_skips_blank_entries() {
        let (applied, _) = run("inlanguage:en,,de");
        match applied.clause {
            Some(Clause::Bool(b)) => assert_eq!(b.should.len(), 2),
            other => panic!("unexpected clause {:?}", other),
        }
    }
}
