//! Boost installer
//!
//! Layers relevance-shaping functions (incoming links, recency, templates,
//! namespaces, language) over the primary query as a single multiplicative
//! rescore pass.

use serde_json::{Map, json};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::namespace::{NS_MAIN, NS_TALK, NamespaceTable};
use crate::query::context::SearchContext;
use crate::query::dsl::{
    Clause, FunctionScore, Modifier, RescorePass, ScoreFunction, ScoreMode, Script, format_weight,
};
use crate::query::request::Sort;

const MS_PER_DAY: f64 = 86_400_000.0;

const DECAY_SCRIPT: &str =
    "Math.expm1(params.decay_constant * (doc['timestamp'].value - params.now)) * params.portion + 1";

/// Adds the boost rescore pass to a context
#[derive(Debug, Clone, Copy)]
pub struct BoostInstaller {
    now_ms: i64,
}

impl Default for BoostInstaller {
    fn default() -> Self {
        Self::new()
    }
}

impl BoostInstaller {
    pub fn new() -> Self {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Self { now_ms }
    }

    /// Installer with a fixed clock
    pub fn at(now_ms: i64) -> Self {
        Self { now_ms }
    }

    /// The boost pass for `ctx`, when sorting by relevance and at least
    /// one boost applies.
    pub fn boost_pass(&self, ctx: &SearchContext<'_>, sort: Sort) -> Option<RescorePass> {
        if sort != Sort::Relevance {
            return None;
        }

        let mut functions = Vec::new();

        if ctx.boost_links {
            functions.push(ScoreFunction::FieldValueFactor {
                field: "incoming_links".to_string(),
                modifier: Modifier::Log2p,
                missing: 0.0,
            });
        }

        if let Some(decay) = self.decay_function(ctx) {
            functions.push(decay);
        }

        for (name, boost) in &ctx.boost_templates {
            functions.push(ScoreFunction::Weight {
                weight: *boost,
                filter: Clause::match_field("template", name),
            });
        }

        functions.extend(namespace_functions(ctx));
        functions.extend(language_functions(ctx));

        if functions.is_empty() {
            return None;
        }

        debug!(functions = functions.len(), "installing boosts");
        Some(RescorePass {
            window_size: ctx.config.boost.function_rescore_window,
            query: Clause::FunctionScore(FunctionScore { functions }),
            query_weight: 1.0,
            rescore_query_weight: 1.0,
            score_mode: Some(ScoreMode::Multiply),
        })
    }

    /// `1 + p * (e^(c * (t - now)) - 1)`, with `c` the decay constant per ms
    fn decay_function(&self, ctx: &SearchContext<'_>) -> Option<ScoreFunction> {
        let portion = ctx.prefer_recent_decay_portion;
        let half_life = ctx.prefer_recent_half_life;
        if portion <= 0.0 || half_life <= 0.0 {
            return None;
        }

        let mut params = Map::new();
        params.insert(
            "decay_constant".into(),
            json!(std::f64::consts::LN_2 / half_life / MS_PER_DAY),
        );
        params.insert("portion".into(), json!(portion));
        params.insert("now".into(), json!(self.now_ms));
        Some(ScoreFunction::ScriptScore(Script {
            source: DECAY_SCRIPT.to_string(),
            lang: ctx.config.script_language.clone(),
            params,
        }))
    }
}

/// Weight of one namespace.
///
/// Explicit weights win; subject namespaces default to 1 for main and the
/// default weight otherwise; talk namespaces are a fraction of their
/// subject's weight.
pub fn namespace_weight(ctx: &SearchContext<'_>, namespace: i32) -> f64 {
    let boost = &ctx.config.boost;
    let explicit = |ns: i32| {
        boost.namespace_weights.iter().find_map(|(key, weight)| {
            let id = key.parse::<i32>().ok().or_else(|| ctx.namespace_table.lookup(key));
            (id == Some(ns)).then_some(*weight)
        })
    };

    if let Some(weight) = explicit(namespace) {
        return weight;
    }
    if !NamespaceTable::is_talk(namespace) {
        return if namespace == NS_MAIN {
            1.0
        } else {
            boost.default_namespace_weight
        };
    }
    if let Some(subject) = explicit(NamespaceTable::subject(namespace)) {
        return boost.talk_namespace_weight * subject;
    }
    if namespace == NS_TALK {
        return boost.talk_namespace_weight;
    }
    boost.default_namespace_weight * boost.talk_namespace_weight
}

/// One terms filter per distinct weight; weight 1 is left out
fn namespace_functions(ctx: &SearchContext<'_>) -> Vec<ScoreFunction> {
    let namespaces = match ctx.namespaces.ids() {
        Some(ids) => ids.to_vec(),
        None => ctx.namespace_table.valid_namespaces(),
    };

    let mut groups: Vec<(String, f64, Vec<i32>)> = Vec::new();
    for ns in namespaces {
        let weight = namespace_weight(ctx, ns);
        let key = format_weight(weight);
        match groups.iter_mut().find(|(k, _, _)| *k == key) {
            Some((_, _, ids)) => ids.push(ns),
            None => groups.push((key, weight, vec![ns])),
        }
    }
    if groups.len() <= 1 {
        return Vec::new();
    }

    groups
        .into_iter()
        .filter(|(key, _, _)| key != "1")
        .map(|(_, weight, ids)| ScoreFunction::Weight {
            weight,
            filter: Clause::terms("namespace", ids),
        })
        .collect()
}

fn language_functions(ctx: &SearchContext<'_>) -> Vec<ScoreFunction> {
    let boost = &ctx.config.boost;
    let wiki_language = &ctx.config.content_language;
    let mut functions = Vec::new();
    if boost.user_language_weight > 0.0 {
        functions.push(ScoreFunction::Weight {
            weight: boost.user_language_weight,
            filter: Clause::term("language", ctx.user_language.as_str()),
        });
    }
    if ctx.user_language != *wiki_language && boost.wiki_language_weight > 0.0 {
        functions.push(ScoreFunction::Weight {
            weight: boost.wiki_language_weight,
            filter: Clause::term("language", wiki_language.as_str()),
        });
    }
    functions
}
