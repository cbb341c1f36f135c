//! `boost-templates:"Template:A|150% Template:B|50%"` overrides template boosts

use std::collections::BTreeMap;

use super::{Applied, KeywordFeature, KeywordMatch};
use crate::config::parse_boost_templates;
use crate::query::context::SearchContext;

pub struct BoostTemplatesFeature;

impl KeywordFeature for BoostTemplatesFeature {
    type Value = BTreeMap<String, f64>;

    fn keywords(&self) -> &'static [&'static str] {
        &["boost-templates"]
    }

    fn parse_value(&self, ctx: &mut SearchContext<'_>, m: &KeywordMatch) -> Option<Self::Value> {
        let parsed = parse_boost_templates(&m.value);
        if parsed.is_empty() {
            Some(ctx.config.default_boost_templates().clone())
        } else {
            Some(parsed)
        }
    }

    fn apply(&self, ctx: &mut SearchContext<'_>, _m: &KeywordMatch, value: Self::Value) -> Applied {
        ctx.boost_templates = value;
        Applied::none()
    }
}
