//! `hastemplate:` filters on transcluded templates

use super::{Applied, KeywordFeature, KeywordMatch};
use crate::namespace::{NS_MAIN, NS_TEMPLATE, Title};
use crate::query::context::SearchContext;
use crate::query::dsl::Clause;

pub struct HasTemplateFeature;

impl KeywordFeature for HasTemplateFeature {
    type Value = String;

    fn keywords(&self) -> &'static [&'static str] {
        &["hastemplate"]
    }

    /// Template names are written the way they are transcluded: a bare name
    /// lives in the template namespace, `:Name` in the main namespace.
    fn parse_value(&self, ctx: &mut SearchContext<'_>, m: &KeywordMatch) -> Option<String> {
        let value = m.value.trim_matches('"');
        if let Some(main) = value.strip_prefix(':') {
            return Some(main.to_string());
        }
        let table = ctx.namespace_table;
        match table.parse_title(value) {
            Some(title) if title.namespace == NS_MAIN => {
                Some(table.prefixed_text(&Title::new(NS_TEMPLATE, title.text)))
            }
            _ => Some(value.to_string()),
        }
    }

    fn apply(&self, _ctx: &mut SearchContext<'_>, _m: &KeywordMatch, value: String) -> Applied {
        Applied::filter(Clause::match_field("template", &value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::content::NullContentStore;
    use crate::query::features::DynFeature;
    use crate::query::features::test_support::with_context;

    fn run(text: &str) -> Applied {
        let config = SearchConfig::default();
        with_context(&config, &NullContentStore, |ctx| {
            let m = HasTemplateFeature.locate(text, 0).unwrap();
            HasTemplateFeature.handle(ctx, &m).unwrap()
        })
    }

    fn template(value: &str) -> Option<Clause> {
        Some(Clause::match_field("template", value))
    }

    #[test]
    fn test_bare_name() {
        assert_eq!(run("hastemplate:foo_bar").clause, template("Template:Foo bar"));
        assert_eq!(run("hastemplate:\"Infobox person\"").clause, template("Template:Infobox person"));
    }

    #[test]
    fn test_main_namespace() {
        assert_eq!(run("hastemplate::Foo").clause, template("Foo"));
    }

    #[test]
    fn test_namespaced() {
        assert_eq!(run("hastemplate:User:Bob/box").clause, template("User:Bob/box"));
    }
}
