//! Query scanner
//!
//! Two passes over the working term:
//!
//! 1. [`extract_keywords`] applies every keyword feature in registry order,
//!    cutting matched spans out of the term and recording their filters
//!    and suggestion affixes on the context.
//! 2. [`segment`] splits what is left into quoted phrases, wildcard tokens
//!    and raw text, preserving order.

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use crate::query::context::SearchContext;
use crate::query::features::{DynFeature, FeatureRegistry, KeywordMatch};

static WILDCARD: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\w+\*(?:\w*\*?)*").ok());

/// Piece of the residual term
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Raw(String),
    /// Quoted phrase; `text` includes the quotes and any `~N` slop
    Phrase {
        text: String,
        slop: Option<u32>,
        negated: bool,
        fuzzy: bool,
    },
    Wildcard(String),
}

/// Apply all keyword features to `ctx.term`
pub fn extract_keywords(registry: &FeatureRegistry, ctx: &mut SearchContext<'_>) {
    let term = std::mem::take(&mut ctx.term);

    let greedy = registry
        .greedy()
        .filter_map(|f| f.locate(&term, 0).map(|m| (f, m)))
        .min_by_key(|(_, m)| m.start);

    let mut head = match &greedy {
        Some((_, m)) => term[..m.start].to_string(),
        None => term.clone(),
    };

    for feature in registry.non_greedy() {
        let mut pos = 0;
        while let Some(m) = feature.locate(&head, pos) {
            let replacement = apply_match(feature, ctx, &m, &head);
            head.replace_range(m.start..m.end, &replacement);
            pos = m.start + replacement.len();
        }
    }

    if let Some((feature, m)) = greedy {
        if let Some(applied) = feature.handle(ctx, &m) {
            if let Some(clause) = applied.clause {
                ctx.add_filter(clause, m.negated);
            }
        }
    }

    debug!(term = %term, residual = %head, "extracted keywords");
    ctx.term = head;
}

/// Apply one match and return the text that replaces its span
fn apply_match(
    feature: &dyn DynFeature,
    ctx: &mut SearchContext<'_>,
    m: &KeywordMatch,
    text: &str,
) -> String {
    let Some(applied) = feature.handle(ctx, m) else {
        return String::new();
    };
    if let Some(clause) = applied.clause {
        ctx.add_filter(clause, m.negated);
    }
    if applied.keep_text && !m.negated {
        format!("{} ", m.quoted_value)
    } else {
        ctx.suggest_prefixes.push(text[m.start..m.end].to_string());
        String::new()
    }
}

/// Split the residual term into phrases, wildcards and raw text
pub fn segment(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut raw_start = 0;
    let mut pos = 0;

    while pos < text.len() {
        match phrase_at(text, pos) {
            Some((start, end, phrase)) => {
                push_raw(&mut segments, &text[raw_start..start]);
                segments.push(phrase);
                raw_start = end;
                pos = end;
            }
            None => {
                pos += text[pos..].chars().next().map_or(1, char::len_utf8);
            }
        }
    }
    push_raw(&mut segments, &text[raw_start..]);
    segments
}

/// Split raw text around wildcard tokens
fn push_raw(segments: &mut Vec<Segment>, raw: &str) {
    if raw.is_empty() {
        return;
    }
    let Some(re) = WILDCARD.as_ref() else {
        segments.push(Segment::Raw(raw.to_string()));
        return;
    };
    let mut last = 0;
    for m in re.find_iter(raw) {
        if m.start() > last {
            segments.push(Segment::Raw(raw[last..m.start()].to_string()));
        }
        segments.push(Segment::Wildcard(m.as_str().to_string()));
        last = m.end();
    }
    if last < raw.len() {
        segments.push(Segment::Raw(raw[last..].to_string()));
    }
}

/// Match `[-!]"..."[~N][~]` starting at `pos`
fn phrase_at(text: &str, pos: usize) -> Option<(usize, usize, Segment)> {
    let rest = &text[pos..];
    let (negated, quote) = if rest.starts_with(['-', '!']) && rest[1..].starts_with('"') {
        (true, pos + 1)
    } else if rest.starts_with('"') {
        (false, pos)
    } else {
        return None;
    };

    // Not directly after a closing bracket
    if text[..pos].ends_with(']') {
        return None;
    }

    let close = closing_quote(text, quote)?;
    let mut end = close + 1;

    let mut slop = None;
    if let Some(after) = text[end..].strip_prefix('~') {
        let digits = after.bytes().take_while(u8::is_ascii_digit).count();
        if digits > 0 {
            slop = after[..digits].parse().ok();
            end += 1 + digits;
        }
    }
    let phrase_end = end;
    let fuzzy = text[end..].starts_with('~');
    if fuzzy {
        end += 1;
    }

    Some((
        pos,
        end,
        Segment::Phrase {
            text: text[quote..phrase_end].to_string(),
            slop,
            negated,
            fuzzy,
        },
    ))
}

/// Offset of the quote closing the phrase opened at `open`.
///
/// A quote preceded by a backslash is part of the phrase, unless no
/// unescaped quote follows, in which case the last one closes it.
fn closing_quote(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut last_escaped = None;
    for j in open + 1..bytes.len() {
        if bytes[j] != b'"' {
            continue;
        }
        if bytes[j - 1] == b'\\' {
            if j > open + 1 {
                last_escaped = Some(j);
            }
            continue;
        }
        return if j == open + 1 { None } else { Some(j) };
    }
    last_escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::content::NullContentStore;
    use crate::namespace::{NS_MAIN, NamespaceSet};
    use crate::query::dsl::Clause;
    use crate::query::features::test_support::with_context;

    fn phrase(text: &str, slop: Option<u32>, negated: bool, fuzzy: bool) -> Segment {
        Segment::Phrase {
            text: text.to_string(),
            slop,
            negated,
            fuzzy,
        }
    }

    #[test]
    fn test_segment_plain() {
        assert_eq!(segment("foo bar"), vec![Segment::Raw("foo bar".into())]);
        assert!(segment("").is_empty());
    }

    #[test]
    fn test_segment_phrases() {
        assert_eq!(
            segment(r#"a "b c"~2~ -"d" e"#),
            vec![
                Segment::Raw("a ".into()),
                phrase("\"b c\"~2", Some(2), false, true),
                Segment::Raw(" ".into()),
                phrase("\"d\"", None, true, false),
                Segment::Raw(" e".into()),
            ]
        );
    }

    #[test]
    fn test_segment_escaped_quote() {
        assert_eq!(
            segment(r#""a\"b""#),
            vec![phrase(r#""a\"b""#, None, false, false)]
        );
    }

    #[test]
    fn test_segment_bracket_guard() {
        let segments = segment(r#"[x]"y""#);
        assert!(segments.iter().all(|s| !matches!(s, Segment::Phrase { .. })));
    }

    #[test]
    fn test_segment_wildcards() {
        assert_eq!(
            segment("cat* dog"),
            vec![Segment::Wildcard("cat*".into()), Segment::Raw(" dog".into())]
        );
        assert_eq!(
            segment("a b*c*"),
            vec![Segment::Raw("a ".into()), Segment::Wildcard("b*c*".into())]
        );
    }

    #[test]
    fn test_unclosed_quote_is_raw() {
        assert_eq!(segment("\"open"), vec![Segment::Raw("\"open".into())]);
        assert_eq!(segment("\"\""), vec![Segment::Raw("\"\"".into())]);
    }

    fn scan(term: &str) -> (String, Vec<Clause>, Vec<Clause>, Vec<String>, Vec<String>, NamespaceSet) {
        let config = SearchConfig::default();
        let registry = FeatureRegistry::standard();
        with_context(&config, &NullContentStore, |ctx| {
            ctx.term = term.to_string();
            extract_keywords(&registry, ctx);
            (
                ctx.term.clone(),
                ctx.filters.clone(),
                ctx.not_filters.clone(),
                ctx.suggest_prefixes.clone(),
                ctx.suggest_suffixes.clone(),
                ctx.namespaces.clone(),
            )
        })
    }

    #[test]
    fn test_extract_negated() {
        let (term, filters, not_filters, prefixes, _, _) = scan("cats -hastemplate:Foo");
        assert_eq!(term, "cats ");
        assert!(filters.is_empty());
        assert_eq!(not_filters, vec![Clause::match_field("template", "Template:Foo")]);
        assert_eq!(prefixes, vec!["-hastemplate:Foo".to_string()]);
    }

    #[test]
    fn test_extract_keep_text() {
        let (term, filters, _, prefixes, _, _) = scan("intitle:castle moat");
        assert_eq!(term, "castle moat");
        assert_eq!(filters.len(), 1);
        assert!(prefixes.is_empty());
    }

    #[test]
    fn test_extract_greedy_last() {
        let (term, filters, _, _, suffixes, namespaces) =
            scan("linksto:Foo cats prefix:Bar intitle:x");
        assert_eq!(term, "cats ");
        assert_eq!(filters.len(), 2);
        assert_eq!(suffixes, vec![" prefix:Bar intitle:x".to_string()]);
        assert_eq!(namespaces, NamespaceSet::only([NS_MAIN]));
    }

    #[test]
    fn test_unknown_keyword_untouched() {
        let (term, filters, _, _, _, _) = scan("foo:bar baz");
        assert_eq!(term, "foo:bar baz");
        assert!(filters.is_empty());
    }
}
