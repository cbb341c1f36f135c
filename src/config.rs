//! Search configuration
//!
//! Every tunable of the compiler and the executor lives in [`SearchConfig`].
//! The struct is loaded from JSON; missing keys fall back to the defaults
//! below so partial files are accepted.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use crate::utils::get_config_path;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Identifier of the local wiki, used to filter duplicates out of extra indexes
    #[serde(default = "default_wiki_id")]
    pub wiki_id: String,

    /// Content language of the wiki
    #[serde(default = "default_language")]
    pub content_language: String,

    /// Upper-case the first letter of titles
    #[serde(default = "default_true")]
    pub capital_links: bool,

    /// Namespaces stored in the content index
    #[serde(default = "default_content_namespaces")]
    pub content_namespaces: Vec<i32>,

    /// Extra indexes to search, keyed by namespace (e.g. a shared file repository)
    #[serde(default)]
    pub extra_indexes: BTreeMap<i32, Vec<String>>,

    /// Base name of the local indexes
    #[serde(default = "default_index_base_name")]
    pub index_base_name: String,

    #[serde(default)]
    pub weights: FieldWeights,

    #[serde(default)]
    pub prefix_weights: PrefixWeights,

    /// Multiplier for the near-match fields
    #[serde(default = "default_near_match_weight")]
    pub near_match_weight: f64,

    /// Multiplier for the stemmed fields
    #[serde(default = "default_stemmed_weight")]
    pub stemmed_weight: f64,

    #[serde(default)]
    pub phrase: PhraseConfig,

    #[serde(default)]
    pub boost: BoostConfig,

    #[serde(default)]
    pub suggest: SuggestConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub pools: PoolsConfig,

    #[serde(default)]
    pub regex: RegexConfig,

    #[serde(default)]
    pub all_fields: AllFieldsConfig,

    #[serde(default)]
    pub more_like: MoreLikeConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    /// Use `dfs_query_then_fetch`
    #[serde(default = "default_true")]
    pub more_accurate_scoring: bool,

    #[serde(default = "default_true")]
    pub allow_leading_wildcard: bool,

    /// Maximum automaton size for query_string queries
    #[serde(default)]
    pub query_string_max_determinized_states: Option<u32>,

    /// Settings of the `safer` query wrapper; the wrapper is skipped when unset
    #[serde(default)]
    pub safer: Option<serde_json::Value>,

    /// Prefix search matches the start of any word instead of the whole title
    #[serde(default)]
    pub prefix_search_starts_with_any_word: bool,

    /// Script language used for script filters and score functions
    #[serde(default = "default_script_language")]
    pub script_language: String,

    #[serde(skip)]
    default_templates: OnceLock<BTreeMap<String, f64>>,
}

/// Per-field multipliers for full-text matching
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldWeights {
    pub title: f64,
    pub redirect: f64,
    pub category: f64,
    pub heading: f64,
    pub opening_text: f64,
    pub text: f64,
    pub auxiliary_text: f64,
    pub file_text: f64,
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self {
            title: 20.0,
            redirect: 15.0,
            category: 8.0,
            heading: 5.0,
            opening_text: 3.0,
            text: 1.0,
            auxiliary_text: 0.5,
            file_text: 0.5,
        }
    }
}

/// Multipliers for the prefix-search fields
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefixWeights {
    pub title: f64,
    pub redirect: f64,
    pub title_asciifolding: f64,
    pub redirect_asciifolding: f64,
}

impl Default for PrefixWeights {
    fn default() -> Self {
        Self {
            title: 10.0,
            redirect: 1.0,
            title_asciifolding: 7.0,
            redirect_asciifolding: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhraseConfig {
    /// Slop appended to quoted phrases without an explicit one
    pub slop_precise: u32,
    /// Slop of generated phrase queries in the main query
    pub slop_default: u32,
    /// Slop of the phrase rescore
    pub slop_boost: u32,
    /// Weight of the phrase rescore; no phrase rescore at or below 1
    pub rescore_boost: f64,
    pub rescore_window: u32,
}

impl Default for PhraseConfig {
    fn default() -> Self {
        Self {
            slop_precise: 0,
            slop_default: 0,
            slop_boost: 1,
            rescore_boost: 10.0,
            rescore_window: 512,
        }
    }
}

/// Relevance boosting applied as a function rescore
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostConfig {
    /// Boost by incoming link count
    #[serde(default = "default_true")]
    pub links: bool,

    #[serde(default = "default_function_window")]
    pub function_rescore_window: u32,

    /// Decay portion used when `prefer-recent:` is absent
    #[serde(default)]
    pub prefer_recent_default_portion: f64,

    /// Decay portion used when `prefer-recent:` is given without one
    #[serde(default = "default_unspecified_portion")]
    pub prefer_recent_unspecified_portion: f64,

    /// Half life in days
    #[serde(default = "default_half_life")]
    pub prefer_recent_half_life: f64,

    /// Namespace weights keyed by id or by name
    #[serde(default = "default_namespace_weights")]
    pub namespace_weights: BTreeMap<String, f64>,

    #[serde(default = "default_namespace_weight")]
    pub default_namespace_weight: f64,

    #[serde(default = "default_talk_weight")]
    pub talk_namespace_weight: f64,

    /// Weight for documents in the user's language (0 disables)
    #[serde(default)]
    pub user_language_weight: f64,

    /// Weight for documents in the wiki's language when it differs (0 disables)
    #[serde(default)]
    pub wiki_language_weight: f64,

    /// Default boosted templates, one `Template|150%` entry per line;
    /// `#` starts a comment
    #[serde(default)]
    pub default_boost_templates: String,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            links: true,
            function_rescore_window: default_function_window(),
            prefer_recent_default_portion: 0.0,
            prefer_recent_unspecified_portion: default_unspecified_portion(),
            prefer_recent_half_life: default_half_life(),
            namespace_weights: default_namespace_weights(),
            default_namespace_weight: default_namespace_weight(),
            talk_namespace_weight: default_talk_weight(),
            user_language_weight: 0.0,
            wiki_language_weight: 0.0,
            default_boost_templates: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestConfig {
    pub max_errors: f64,
    pub confidence: f64,
}

impl Default for SuggestConfig {
    fn default() -> Self {
        Self {
            max_errors: 2.0,
            confidence: 2.0,
        }
    }
}

/// Timeouts per operation class, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub shard_default_secs: u64,
    pub shard_regex_secs: u64,
    pub client_default_secs: u64,
    pub client_regex_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            shard_default_secs: 20,
            shard_regex_secs: 120,
            client_default_secs: 40,
            client_regex_secs: 240,
        }
    }
}

/// Capacity of one admission pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Concurrent calls allowed
    pub workers: usize,
    /// Calls allowed to wait for a slot
    pub max_queue: usize,
    /// How long a queued call waits before giving up
    pub timeout_ms: u64,
}

impl PoolConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolsConfig {
    #[serde(default = "default_search_pool")]
    pub search: PoolConfig,
    #[serde(default = "default_search_pool")]
    pub prefix: PoolConfig,
    #[serde(default = "default_regex_pool")]
    pub regex: PoolConfig,
    #[serde(default = "default_search_pool")]
    pub more_like: PoolConfig,
    /// Concurrent calls per user; 0 disables the per-user throttle
    #[serde(default = "default_per_user_workers")]
    pub per_user_workers: usize,
}

impl Default for PoolsConfig {
    fn default() -> Self {
        Self {
            search: default_search_pool(),
            prefix: default_search_pool(),
            regex: default_regex_pool(),
            more_like: default_search_pool(),
            per_user_workers: default_per_user_workers(),
        }
    }
}

/// How `insource:/regex/` is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegexStrategy {
    /// Trigram-accelerated `source_regex` filter
    Plugin,
    /// Script filter evaluated per document
    Script,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegexConfig {
    pub enabled: bool,
    pub strategy: RegexStrategy,
    pub max_inspect: u32,
    pub max_determinized_states: u32,
    pub max_ngrams_extracted: Option<u32>,
}

impl Default for RegexConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: RegexStrategy::Plugin,
            max_inspect: 10_000,
            max_determinized_states: 20_000,
            max_ngrams_extracted: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AllFieldsConfig {
    /// Match against the consolidated `all` fields
    pub use_all: bool,
    /// The phrase rescore may use the `all` fields too
    pub for_rescore: bool,
    /// Near-match title search uses `all_near_match`
    pub near_match: bool,
}

impl Default for AllFieldsConfig {
    fn default() -> Self {
        Self {
            use_all: false,
            for_rescore: true,
            near_match: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MoreLikeConfig {
    pub fields: Vec<String>,
    /// Let the backend read the fields itself instead of fetching text first
    pub use_fields: bool,
    pub min_doc_freq: u32,
    pub max_doc_freq: Option<u32>,
    pub max_query_terms: u32,
    pub min_term_freq: u32,
    pub min_word_len: u32,
    pub max_word_len: u32,
    pub minimum_should_match: String,
}

impl Default for MoreLikeConfig {
    fn default() -> Self {
        Self {
            fields: vec!["text".to_string()],
            use_fields: false,
            min_doc_freq: 2,
            max_doc_freq: None,
            max_query_terms: 25,
            min_term_freq: 2,
            min_word_len: 0,
            max_word_len: 0,
            minimum_should_match: "30%".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_incategory_options: usize,
    /// Longest term accepted by title searches, in bytes
    pub max_title_search: usize,
    pub max_offset: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_incategory_options: 100,
            max_title_search: 255,
            max_offset: 100_000,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_wiki_id() -> String {
    "wiki".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_content_namespaces() -> Vec<i32> {
    vec![0]
}

fn default_index_base_name() -> String {
    "wiki".to_string()
}

fn default_near_match_weight() -> f64 {
    2.0
}

fn default_stemmed_weight() -> f64 {
    0.5
}

fn default_function_window() -> u32 {
    8192
}

fn default_unspecified_portion() -> f64 {
    0.6
}

fn default_half_life() -> f64 {
    160.0
}

fn default_namespace_weights() -> BTreeMap<String, f64> {
    [("2", 0.05), ("4", 0.1), ("8", 0.05), ("10", 0.005), ("12", 0.1)]
        .into_iter()
        .map(|(ns, w)| (ns.to_string(), w))
        .collect()
}

fn default_namespace_weight() -> f64 {
    0.2
}

fn default_talk_weight() -> f64 {
    0.25
}

fn default_search_pool() -> PoolConfig {
    PoolConfig {
        workers: 50,
        max_queue: 100,
        timeout_ms: 15_000,
    }
}

fn default_regex_pool() -> PoolConfig {
    PoolConfig {
        workers: 10,
        max_queue: 10,
        timeout_ms: 30_000,
    }
}

fn default_per_user_workers() -> usize {
    2
}

fn default_script_language() -> String {
    "groovy".to_string()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            wiki_id: default_wiki_id(),
            content_language: default_language(),
            capital_links: true,
            content_namespaces: default_content_namespaces(),
            extra_indexes: BTreeMap::new(),
            index_base_name: default_index_base_name(),
            weights: FieldWeights::default(),
            prefix_weights: PrefixWeights::default(),
            near_match_weight: default_near_match_weight(),
            stemmed_weight: default_stemmed_weight(),
            phrase: PhraseConfig::default(),
            boost: BoostConfig::default(),
            suggest: SuggestConfig::default(),
            timeouts: TimeoutConfig::default(),
            pools: PoolsConfig::default(),
            regex: RegexConfig::default(),
            all_fields: AllFieldsConfig::default(),
            more_like: MoreLikeConfig::default(),
            limits: LimitsConfig::default(),
            more_accurate_scoring: true,
            allow_leading_wildcard: true,
            query_string_max_determinized_states: None,
            safer: None,
            prefix_search_starts_with_any_word: false,
            script_language: default_script_language(),
            default_templates: OnceLock::new(),
        }
    }
}

impl SearchConfig {
    /// Load config from the app data directory, or return default if not found
    pub fn load() -> Result<Self> {
        let config_path = get_config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: SearchConfig =
            serde_json::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Default boosted templates, parsed on first use
    pub fn default_boost_templates(&self) -> &BTreeMap<String, f64> {
        self.default_templates.get_or_init(|| {
            let lines = parse_settings_lines(&self.boost.default_boost_templates);
            parse_boost_templates(&lines.join(" "))
        })
    }
}

/// Strip comments and blank lines from a multi-line setting
fn parse_settings_lines(text: &str) -> Vec<&str> {
    text.lines()
        .map(|line| match line.find('#') {
            Some(pos) => &line[..pos],
            None => line,
        })
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

/// Parse `Name|150% Other|50%` into name → multiplier.
///
/// Entries that do not follow the `name|digits%` shape are skipped.
pub fn parse_boost_templates(text: &str) -> BTreeMap<String, f64> {
    let mut templates = BTreeMap::new();
    let mut rest = text;

    while let Some(bar) = rest.find('|') {
        let name = &rest[..bar];
        let after = &rest[bar + 1..];
        let digits = after.bytes().take_while(|b| b.is_ascii_digit()).count();

        if !name.is_empty() && digits > 0 && after[digits..].starts_with('%') {
            if let Ok(pct) = after[..digits].parse::<f64>() {
                templates.insert(name.to_string(), pct / 100.0);
            }
            rest = &after[digits + 1..];
            rest = rest.strip_prefix(' ').unwrap_or(rest);
        } else {
            // Resume after the bar so the next entry can still be found
            rest = after;
        }
    }

    templates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = SearchConfig::default();
        assert_eq!(config.weights.title, 20.0);
        assert_eq!(config.limits.max_incategory_options, 100);
        assert_eq!(config.boost.prefer_recent_unspecified_portion, 0.6);
        assert_eq!(config.pools.regex.workers, 10);
    }

    #[test]
    fn test_config_empty_json() {
        let config: SearchConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.weights.redirect, 15.0);
        assert_eq!(config.timeouts.client_regex_secs, 240);
        assert_eq!(config.regex.strategy, RegexStrategy::Plugin);
        assert_eq!(config.boost.namespace_weights.get("10"), Some(&0.005));
    }

    #[test]
    fn test_config_partial_json() {
        let json = r#"{"wiki_id": "enwiki", "regex": {"enabled": false, "strategy": "script"}}"#;
        let config: SearchConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.wiki_id, "enwiki");
        assert!(!config.regex.enabled);
        assert_eq!(config.regex.strategy, RegexStrategy::Script);
        assert_eq!(config.regex.max_inspect, 10_000);
        assert_eq!(config.phrase.rescore_window, 512);
    }

    #[test]
    fn test_parse_boost_templates() {
        let templates = parse_boost_templates("Template:Featured|150% Template:Stub|20%");
        assert_eq!(templates.len(), 2);
        assert_eq!(templates["Template:Featured"], 1.5);
        assert_eq!(templates["Template:Stub"], 0.2);
    }

    #[test]
    fn test_parse_boost_templates_garbage() {
        assert!(parse_boost_templates("nothing here").is_empty());
        assert!(parse_boost_templates("Foo|abc%").is_empty());
        let templates = parse_boost_templates("Foo|x Bar|10%");
        assert_eq!(templates.get("x Bar"), Some(&0.1));
    }

    #[test]
    fn test_default_boost_templates_cached() {
        let mut config = SearchConfig::default();
        config.boost.default_boost_templates =
            "# featured content\nTemplate:Quality|200%\n\nTemplate:Poor|50% # low\n".to_string();

        let first = config.default_boost_templates() as *const _;
        let second = config.default_boost_templates() as *const _;
        assert_eq!(first, second);
        assert_eq!(config.default_boost_templates()["Template:Quality"], 2.0);
        assert_eq!(config.default_boost_templates()["Template:Poor"], 0.5);
    }
}
