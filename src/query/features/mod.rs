//! Keyword features
//!
//! Each `key:value` element of the search syntax is handled by one
//! [`KeywordFeature`]. A feature locates its spans in the working term,
//! parses the value into a typed payload and turns that payload into a
//! filter clause (or a direct change to the [`SearchContext`]).
//!
//! The scanner only sees features through the object-safe [`DynFeature`],
//! which every `KeywordFeature` implements.

mod boost_templates;
mod hastemplate;
mod incategory;
mod inlanguage;
mod insource;
mod intitle;
mod linksto;
mod local;
mod prefer_recent;
mod prefix;

pub use boost_templates::BoostTemplatesFeature;
pub use hastemplate::HasTemplateFeature;
pub use incategory::{CategoryRef, IncategoryFeature};
pub use inlanguage::{InlanguageFeature, MAX_LANGUAGES};
pub use insource::{InsourceFeature, InsourceRegexFeature, RegexValue};
pub use intitle::IntitleFeature;
pub use linksto::LinksToFeature;
pub use local::LocalFeature;
pub use prefer_recent::{PreferRecent, PreferRecentFeature};
pub use prefix::{PrefixFeature, PrefixValue};

use crate::query::context::{CrossSearchStrategy, SearchContext};
use crate::query::dsl::Clause;

/// A located keyword span
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordMatch {
    /// Byte offset of the span (including any leading `-`)
    pub start: usize,
    /// Byte offset just past the span (including one trailing space)
    pub end: usize,
    pub key: String,
    /// Value with surrounding quotes removed and `\"` unescaped
    pub value: String,
    /// Value as typed, quotes kept, `\"` unescaped
    pub quoted_value: String,
    pub negated: bool,
}

impl KeywordMatch {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Outcome of applying a feature
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Applied {
    /// Clause routed to the filter or not-filter list
    pub clause: Option<Clause>,
    /// Leave the value in the residual query
    pub keep_text: bool,
}

impl Applied {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn filter(clause: Clause) -> Self {
        Self {
            clause: Some(clause),
            keep_text: false,
        }
    }

    pub fn maybe_filter(clause: Option<Clause>) -> Self {
        Self {
            clause,
            keep_text: false,
        }
    }
}

/// One keyword of the search syntax
pub trait KeywordFeature: Send + Sync {
    /// Parsed payload of a match
    type Value;

    fn keywords(&self) -> &'static [&'static str];

    /// Greedy features consume the rest of the term once matched
    fn is_greedy(&self) -> bool {
        false
    }

    /// Find the first span at or after `from`
    fn find(&self, text: &str, from: usize) -> Option<KeywordMatch> {
        find_key_value(text, from, self.keywords())
    }

    fn cross_search_strategy(&self, _value: &Self::Value) -> CrossSearchStrategy {
        CrossSearchStrategy::AllWikis
    }

    /// Whether a match marks the search as using special syntax
    fn is_special_syntax(&self) -> bool {
        true
    }

    /// Parse the matched value. `None` drops the span without applying it.
    fn parse_value(&self, ctx: &mut SearchContext<'_>, m: &KeywordMatch) -> Option<Self::Value>;

    fn apply(&self, ctx: &mut SearchContext<'_>, m: &KeywordMatch, value: Self::Value) -> Applied;
}

/// Type-erased view of a [`KeywordFeature`]
pub trait DynFeature: Send + Sync {
    fn keyword_names(&self) -> &'static [&'static str];
    fn greedy(&self) -> bool;
    fn locate(&self, text: &str, from: usize) -> Option<KeywordMatch>;
    /// Parse and apply a match; `None` when the value was rejected
    fn handle(&self, ctx: &mut SearchContext<'_>, m: &KeywordMatch) -> Option<Applied>;
}

impl<F: KeywordFeature> DynFeature for F {
    fn keyword_names(&self) -> &'static [&'static str] {
        self.keywords()
    }

    fn greedy(&self) -> bool {
        self.is_greedy()
    }

    fn locate(&self, text: &str, from: usize) -> Option<KeywordMatch> {
        self.find(text, from)
    }

    fn handle(&self, ctx: &mut SearchContext<'_>, m: &KeywordMatch) -> Option<Applied> {
        let value = self.parse_value(ctx, m)?;
        ctx.contained_special_syntax |= self.is_special_syntax();
        ctx.cross_search = ctx
            .cross_search
            .intersect(self.cross_search_strategy(&value));
        Some(self.apply(ctx, m, value))
    }
}

/// Ordered set of features used by the scanner
pub struct FeatureRegistry {
    features: Vec<Box<dyn DynFeature>>,
}

impl Default for FeatureRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl FeatureRegistry {
    /// All built-in features, in application order
    pub fn standard() -> Self {
        Self {
            features: vec![
                Box::new(PrefixFeature),
                Box::new(PreferRecentFeature),
                Box::new(LocalFeature),
                Box::new(InsourceRegexFeature),
                Box::new(BoostTemplatesFeature),
                Box::new(HasTemplateFeature),
                Box::new(LinksToFeature),
                Box::new(IncategoryFeature),
                Box::new(InsourceFeature),
                Box::new(InlanguageFeature),
                Box::new(IntitleFeature),
            ],
        }
    }

    pub fn empty() -> Self {
        Self {
            features: Vec::new(),
        }
    }

    pub fn with(mut self, feature: impl DynFeature + 'static) -> Self {
        self.features.push(Box::new(feature));
        self
    }

    pub fn greedy(&self) -> impl Iterator<Item = &dyn DynFeature> {
        self.features
            .iter()
            .map(|f| f.as_ref())
            .filter(|f| f.greedy())
    }

    pub fn non_greedy(&self) -> impl Iterator<Item = &dyn DynFeature> {
        self.features
            .iter()
            .map(|f| f.as_ref())
            .filter(|f| !f.greedy())
    }
}

/// Whether a keyword may start at `pos`
pub(crate) fn at_token_boundary(text: &str, pos: usize) -> bool {
    match text[..pos].chars().next_back() {
        None => true,
        Some(c) => !(c.is_ascii_lowercase() || c == '-'),
    }
}

/// A `[-]key:` head found at a token boundary
pub(crate) struct KeywordHead {
    pub start: usize,
    pub negated: bool,
    pub key: &'static str,
    /// Offset just past the colon
    pub value_start: usize,
}

/// Locate the first `[-]key:` head at or after `from`
pub(crate) fn find_keyword_head(
    text: &str,
    from: usize,
    keywords: &[&'static str],
) -> Option<KeywordHead> {
    let mut pos = from;
    while pos < text.len() {
        if text.is_char_boundary(pos) {
            if let Some(head) = keyword_head_at(text, pos, keywords) {
                return Some(head);
            }
        }
        pos += 1;
    }
    None
}

fn keyword_head_at(text: &str, pos: usize, keywords: &[&'static str]) -> Option<KeywordHead> {
    if !at_token_boundary(text, pos) {
        return None;
    }
    let rest = &text[pos..];
    let (negated, rest) = match rest.strip_prefix('-') {
        Some(stripped) => (true, stripped),
        None => (false, rest),
    };
    let key = keywords
        .iter()
        .copied()
        .find(|k| rest.starts_with(k) && rest[k.len()..].starts_with(':'))?;
    Some(KeywordHead {
        start: pos,
        negated,
        key,
        value_start: pos + usize::from(negated) + key.len() + 1,
    })
}

/// Default matcher: `[-]key:value`, where value is a bare run without
/// spaces or quotes, or a double-quoted string that may contain `\"`.
pub fn find_key_value(text: &str, from: usize, keywords: &[&'static str]) -> Option<KeywordMatch> {
    let mut from = from;
    while let Some(head) = find_keyword_head(text, from, keywords) {
        if let Some(found) = match_value(text, &head) {
            return Some(found);
        }
        from = head.start + 1;
    }
    None
}

fn match_value(text: &str, head: &KeywordHead) -> Option<KeywordMatch> {
    let (pos, negated, key) = (head.start, head.negated, head.key);
    let mut cursor = head.value_start;
    cursor += text[cursor..].len() - text[cursor..].trim_start().len();

    let raw_end = scan_value(text, cursor)?;
    let raw = &text[cursor..raw_end];
    let quoted_value = raw.replace("\\\"", "\"");
    let value = if raw.starts_with('"') {
        quoted_value[1..quoted_value.len() - 1].to_string()
    } else {
        quoted_value.clone()
    };

    let end = if text[raw_end..].starts_with(' ') {
        raw_end + 1
    } else {
        raw_end
    };

    Some(KeywordMatch {
        start: pos,
        end,
        key: key.to_string(),
        value,
        quoted_value,
        negated,
    })
}

/// End offset of a value starting at `start`
fn scan_value(text: &str, start: usize) -> Option<usize> {
    let rest = &text[start..];
    if let Some(body) = rest.strip_prefix('"') {
        let mut escaped = false;
        for (i, c) in body.char_indices() {
            match c {
                '"' if !escaped => {
                    return if i == 0 { None } else { Some(start + 1 + i + 1) };
                }
                '\\' => escaped = !escaped,
                _ => escaped = false,
            }
        }
        return None;
    }
    let len = rest.find([' ', '"']).unwrap_or(rest.len());
    if len == 0 { None } else { Some(start + len) }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::config::SearchConfig;
    use crate::content::ContentStore;
    use crate::namespace::{NamespaceSet, NamespaceTable};
    use crate::query::context::SearchContext;

    /// Run `f` against a fresh context
    pub fn with_context<R>(
        config: &SearchConfig,
        content: &dyn ContentStore,
        f: impl FnOnce(&mut SearchContext<'_>) -> R,
    ) -> R {
        let table = NamespaceTable::from_config(config);
        let mut ctx = SearchContext::new(config, &table, content, NamespaceSet::All);
        f(&mut ctx)
    }
}
