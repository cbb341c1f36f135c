//! `prefer-recent:[portion][,half_life_days]` boosts recently edited pages

use regex::Regex;
use std::sync::LazyLock;

use super::{Applied, KeywordFeature, KeywordMatch, at_token_boundary};
use crate::query::context::SearchContext;

// Portion is a number in [0, 1]; half life any non-negative number
static PREFER_RECENT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"prefer-recent:(1|0?(?:\.\d+)?)?(?:,(\d*\.?\d+))? ?").ok());

pub struct PreferRecentFeature;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreferRecent {
    pub decay_portion: f64,
    /// Days; `None` keeps the configured half life
    pub half_life: Option<f64>,
}

impl KeywordFeature for PreferRecentFeature {
    type Value = PreferRecent;

    fn keywords(&self) -> &'static [&'static str] {
        &["prefer-recent"]
    }

    fn find(&self, text: &str, from: usize) -> Option<KeywordMatch> {
        let re = PREFER_RECENT.as_ref()?;
        let mut from = from;
        while from <= text.len() {
            let caps = re.captures_at(text, from)?;
            let whole = caps.get(0)?;
            if !at_token_boundary(text, whole.start()) {
                from = whole.start() + 1;
                continue;
            }
            let portion = caps.get(1).map_or("", |m| m.as_str());
            let value = match caps.get(2) {
                Some(half_life) => format!("{},{}", portion, half_life.as_str()),
                None => portion.to_string(),
            };
            return Some(KeywordMatch {
                start: whole.start(),
                end: whole.end(),
                key: "prefer-recent".to_string(),
                value: value.clone(),
                quoted_value: value,
                negated: false,
            });
        }
        None
    }

    fn parse_value(&self, ctx: &mut SearchContext<'_>, m: &KeywordMatch) -> Option<PreferRecent> {
        let (portion, half_life) = match m.value.split_once(',') {
            Some((portion, half_life)) => (portion, Some(half_life)),
            None => (m.value.as_str(), None),
        };
        let decay_portion = if portion.is_empty() {
            ctx.config.boost.prefer_recent_unspecified_portion
        } else {
            portion.parse().ok()?
        };
        let half_life = match half_life {
            Some(h) => Some(h.parse().ok()?),
            None => None,
        };
        Some(PreferRecent {
            decay_portion,
            half_life,
        })
    }

    fn apply(&self, ctx: &mut SearchContext<'_>, _m: &KeywordMatch, value: PreferRecent) -> Applied {
        ctx.prefer_recent_decay_portion = value.decay_portion;
        if let Some(half_life) = value.half_life {
            ctx.prefer_recent_half_life = half_life;
        }
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

    fn run(text: &str) -> (f64, f64, KeywordMatch) {
        let config = SearchConfig::default();
        with_context(&config, &NullContentStore, |ctx| {
            let m = PreferRecentFeature.locate(text, 0).unwrap();
            PreferRecentFeature.handle(ctx, &m).unwrap();
            (
                ctx.prefer_recent_decay_portion,
                ctx.prefer_recent_half_life,
                m,
            )
        })
    }

    #[test]
    fn test_portion_and_half_life() {
        let (portion, half_life, m) = run("prefer-recent:0.3,30 castle");
        assert_eq!(portion, 0.3);
        assert_eq!(half_life, 30.0);
        assert_eq!(m.end, 21);
    }

    #[test]
    fn test_unspecified_portion() {
        let (portion, half_life, _) = run("castle prefer-recent:");
        assert_eq!(portion, 0.6);
        assert_eq!(half_life, 160.0);

        let (portion, half_life, _) = run("prefer-recent:,7");
        assert_eq!(portion, 0.6);
        assert_eq!(half_life, 7.0);
    }

    #[test]
    fn test_full_portion() {
        let (portion, _, _) = run("prefer-recent:1");
        assert_eq!(portion, 1.0);
        let (portion, _, _) = run("prefer-recent:.5");
        assert_eq!(portion, 0.5);
    }

    #[test]
    fn test_boundary() {
        assert!(PreferRecentFeature.locate("xprefer-recent:1", 0).is_none());
    }
}
