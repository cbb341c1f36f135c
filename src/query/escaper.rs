//! Escaping of free text for the backend's query-string grammar
//!
//! The text is handled as a sequence of units: a backslash always binds to
//! the character after it, so an escaped character is never reinterpreted
//! by a later rule. This is what makes [`Escaper::fixup_whole_query_string`]
//! stable when applied to its own output.

/// One character of query text, escaped or not
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Bare(char),
    Escaped(char),
}

impl Unit {
    fn ch(self) -> char {
        match self {
            Unit::Bare(c) | Unit::Escaped(c) => c,
        }
    }

    fn is_bare(self, c: char) -> bool {
        self == Unit::Bare(c)
    }

    fn is_word(self) -> bool {
        is_word_char(self.ch())
    }

    fn is_space(self) -> bool {
        self.ch().is_whitespace()
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn to_units(text: &str) -> Vec<Unit> {
    let mut units = Vec::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            // A trailing backslash escapes itself
            units.push(Unit::Escaped(chars.next().unwrap_or('\\')));
        } else {
            units.push(Unit::Bare(c));
        }
    }
    units
}

fn render(units: &[Unit]) -> String {
    let mut out = String::with_capacity(units.len() + 8);
    for unit in units {
        match *unit {
            Unit::Bare(c) => out.push(c),
            Unit::Escaped(c) => {
                out.push('\\');
                out.push(c);
            }
        }
    }
    out
}

/// Upper bound on normalization passes; real input settles in two or three
const MAX_PASSES: usize = 64;

/// Escapes user text for the query-string grammar
#[derive(Debug, Clone)]
pub struct Escaper {
    language: String,
}

impl Escaper {
    pub fn new(language: &str) -> Self {
        Self {
            language: language.to_string(),
        }
    }

    /// Escape quotes that sit inside a word.
    ///
    /// Only Hebrew needs this: `"` doubles as the gershayim acronym mark
    /// there, so a quote with non-space on both sides is taken literally.
    pub fn escape_quote_pairs(&self, text: &str) -> String {
        if self.language != "he" {
            return text.to_string();
        }

        let mut units = to_units(text);
        for i in 1..units.len().saturating_sub(1) {
            if units[i].is_bare('"') && !units[i - 1].is_space() && !units[i + 1].is_space() {
                units[i] = Unit::Escaped('"');
            }
        }
        render(&units)
    }

    /// Make one segment of user text safe to embed in a query string.
    ///
    /// Grouping, ranges, boosts and field selectors are escaped, stray
    /// backslashes are taken literally (only `\"` survives as an escape),
    /// slashes become spaces and an unterminated quote is closed.
    pub fn fixup_query_string_part(&self, text: &str) -> String {
        let mut out = Vec::with_capacity(text.len());
        for unit in to_units(text) {
            match unit {
                Unit::Bare(c @ ('(' | ')' | '{' | '}' | '[' | ']' | '^' | ':')) => {
                    out.push(Unit::Escaped(c))
                }
                Unit::Bare('/') => out.push(Unit::Bare(' ')),
                Unit::Escaped('"') => out.push(unit),
                Unit::Escaped(c) => {
                    out.push(Unit::Escaped('\\'));
                    match c {
                        '\\' | '(' | ')' | '{' | '}' | '[' | ']' | '^' | ':' => {
                            out.push(Unit::Escaped(c))
                        }
                        '/' => out.push(Unit::Bare(' ')),
                        _ => out.push(Unit::Bare(c)),
                    }
                }
                Unit::Bare(_) => out.push(unit),
            }
        }

        if out.iter().filter(|u| u.is_bare('"')).count() % 2 == 1 {
            out.push(Unit::Bare('"'));
        }
        render(&out)
    }

    /// Normalize an assembled query string.
    ///
    /// Repairs syntax the backend would reject: misplaced `~ ? * + - ! ||`,
    /// dangling `AND`/`OR`/`NOT`, unbalanced quotes and parentheses. Returns
    /// the fixed string and whether it contains a valid fuzzy (`term~`)
    /// operator. The result is a fixed point: fixing it again changes nothing.
    pub fn fixup_whole_query_string(&self, text: &str) -> (String, bool) {
        let mut units = to_units(text);
        let mut fuzzy = false;

        for _ in 0..MAX_PASSES {
            let (next, next_fuzzy) = normalize_pass(&units);
            fuzzy = next_fuzzy;
            if next == units {
                break;
            }
            units = next;
        }

        (render(&units), fuzzy)
    }
}

/// Whether an escaped query string still uses query-string syntax
pub fn contains_syntax(query: &str) -> bool {
    let units = to_units(query);
    units.iter().any(|u| {
        matches!(
            u,
            Unit::Bare('?' | '*' | '+' | '~' | '"' | '!' | '|' | '-')
        )
    }) || query.contains("AND")
        || query.contains("OR")
        || query.contains("NOT")
}

/// Whether quotes and parentheses of `text` are balanced, ignoring escaped
/// characters and parentheses inside quotes
pub fn is_balanced(text: &str) -> bool {
    let mut in_quote = false;
    let mut depth: i64 = 0;
    for unit in to_units(text) {
        match unit {
            Unit::Bare('"') => in_quote = !in_quote,
            Unit::Bare('(') if !in_quote => depth += 1,
            Unit::Bare(')') if !in_quote => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    !in_quote && depth == 0
}

fn normalize_pass(input: &[Unit]) -> (Vec<Unit>, bool) {
    let units = escape_orphan_tildes(input);
    let units = drop_leading_wildcards(&units);
    let units = drop_range_markers(&units);
    let (units, fuzzy) = check_fuzzy(&units);
    let units = check_proximity(&units);
    let units = escape_bad_operators(&units);
    let units = escape_dangling_or(&units);
    let units = lowercase_dangling_keywords(&units);
    (balance(&units), fuzzy)
}

/// `~` must follow a term or a closing quote
fn escape_orphan_tildes(units: &[Unit]) -> Vec<Unit> {
    let mut out = units.to_vec();
    for i in 0..out.len() {
        if out[i].is_bare('~') {
            let ok = i > 0 && (units[i - 1].is_word() || units[i - 1].is_bare('"'));
            if !ok {
                out[i] = Unit::Escaped('~');
            }
        }
    }
    out
}

/// `?` and `*` must follow a term
fn drop_leading_wildcards(units: &[Unit]) -> Vec<Unit> {
    let mut out = Vec::with_capacity(units.len());
    for (i, unit) in units.iter().enumerate() {
        if (unit.is_bare('?') || unit.is_bare('*')) && !(i > 0 && units[i - 1].is_word()) {
            continue;
        }
        out.push(*unit);
    }
    out
}

/// `<` and `>` range markers glued to a token are dropped
fn drop_range_markers(units: &[Unit]) -> Vec<Unit> {
    let mut out = Vec::with_capacity(units.len());
    let mut i = 0;
    while i < units.len() {
        if units[i].is_bare('<') || units[i].is_bare('>') {
            let start = i;
            while i < units.len() && (units[i].is_bare('<') || units[i].is_bare('>')) {
                i += 1;
            }
            let glued = i < units.len() && !units[i].is_space();
            if !glued {
                out.extend_from_slice(&units[start..i]);
            }
            continue;
        }
        out.push(units[i]);
        i += 1;
    }
    out
}

fn trailing_end(units: &[Unit], from: usize) -> usize {
    let mut end = from;
    while end < units.len() && !units[end].is_space() {
        end += 1;
    }
    end
}

/// `term~` and `term~0..2` are fuzzy; anything else after the `~` is literal
fn check_fuzzy(units: &[Unit]) -> (Vec<Unit>, bool) {
    let mut out = units.to_vec();
    let mut fuzzy = false;
    let mut i = 1;
    while i < out.len() {
        if out[i].is_bare('~') && out[i - 1].is_word() {
            let end = trailing_end(&out, i + 1);
            let trailing = &out[i + 1..end];
            let valid = match trailing {
                [] => true,
                [Unit::Bare(c)] => matches!(c, '0'..='2'),
                _ => false,
            };
            if valid {
                fuzzy = true;
            } else {
                for unit in &mut out[i..end] {
                    if unit.is_bare('~') {
                        *unit = Unit::Escaped('~');
                    }
                }
            }
            i = end;
            continue;
        }
        i += 1;
    }
    (out, fuzzy)
}

/// `"phrase"~N` needs a number
fn check_proximity(units: &[Unit]) -> Vec<Unit> {
    let mut out = units.to_vec();
    let mut i = 0;
    while i + 1 < out.len() {
        if out[i].is_bare('"') && out[i + 1].is_bare('~') {
            let end = trailing_end(&out, i + 2);
            let has_digit = out[i + 2..end].iter().any(|u| u.ch().is_ascii_digit());
            if !has_digit {
                out[i + 1] = Unit::Escaped('~');
            }
            i = end;
            continue;
        }
        i += 1;
    }
    out
}

fn is_operator(unit: Unit) -> bool {
    matches!(unit, Unit::Bare('+' | '-' | '!'))
}

/// `+`, `-` and `!` only work directly before a term and after a space or
/// the start of the query (`foo -bar`, `-bar foo`)
fn escape_bad_operators(units: &[Unit]) -> Vec<Unit> {
    let mut out = units.to_vec();

    // Not followed by a term: only the last operator of a run may stay
    let mut i = 0;
    while i < out.len() {
        if is_operator(out[i]) {
            let start = i;
            while i < out.len() && is_operator(out[i]) {
                i += 1;
            }
            let followed_by_word = i < out.len() && out[i].is_word();
            let keep_last = if followed_by_word { 1 } else { 0 };
            for unit in &mut out[start..i - keep_last] {
                *unit = Unit::Escaped(unit.ch());
            }
            continue;
        }
        i += 1;
    }

    // Glued to the previous token
    for i in 0..out.len() {
        if is_operator(out[i]) {
            let ok = i == 0 || matches!(out[i - 1].ch(), ' ' | '\\');
            if !ok {
                out[i] = Unit::Escaped(out[i].ch());
            }
        }
    }

    out
}

/// `||` needs a term on both sides
fn escape_dangling_or(units: &[Unit]) -> Vec<Unit> {
    let mut out = units.to_vec();

    let first = out.iter().position(|u| !u.is_space()).unwrap_or(out.len());
    if first + 1 < out.len() && out[first].is_bare('|') && out[first + 1].is_bare('|') {
        out[first] = Unit::Escaped('|');
        out[first + 1] = Unit::Escaped('|');
    }

    let last = out.iter().rposition(|u| !u.is_space());
    if let Some(last) = last {
        if last >= 1 && out[last].is_bare('|') && out[last - 1].is_bare('|') {
            out[last] = Unit::Escaped('|');
            out[last - 1] = Unit::Escaped('|');
        }
    }

    out
}

fn bare_word_at(units: &[Unit], at: usize, word: &str) -> bool {
    let len = word.chars().count();
    at + len <= units.len()
        && units[at..at + len]
            .iter()
            .zip(word.chars())
            .all(|(u, c)| u.is_bare(c))
}

/// Leading `AND`/`OR` and trailing `AND`/`OR`/`NOT` are plain words
fn lowercase_dangling_keywords(units: &[Unit]) -> Vec<Unit> {
    let mut out = units.to_vec();

    let first = out.iter().position(|u| !u.is_space()).unwrap_or(out.len());
    for word in ["AND", "OR"] {
        let len = word.len();
        if bare_word_at(&out, first, word) && out.get(first + len).is_none_or(|u| !u.is_word()) {
            lowercase(&mut out[first..first + len]);
            break;
        }
    }

    if let Some(last) = out.iter().rposition(|u| !u.is_space()) {
        for word in ["AND", "OR", "NOT"] {
            let len = word.len();
            if last + 1 < len {
                continue;
            }
            let start = last + 1 - len;
            let boundary = start == 0 || !out[start - 1].is_word();
            if boundary && bare_word_at(&out, start, word) {
                lowercase(&mut out[start..=last]);
                break;
            }
        }
    }

    out
}

fn lowercase(units: &mut [Unit]) {
    for unit in units {
        if let Unit::Bare(c) = *unit {
            *unit = Unit::Bare(c.to_ascii_lowercase());
        }
    }
}

/// Escape unmatched `)`, close an open quote and any open `(`
fn balance(units: &[Unit]) -> Vec<Unit> {
    let mut out = Vec::with_capacity(units.len() + 2);
    let mut in_quote = false;
    let mut depth = 0usize;

    for &unit in units {
        match unit {
            Unit::Bare('"') => in_quote = !in_quote,
            Unit::Bare('(') if !in_quote => depth += 1,
            Unit::Bare(')') if !in_quote => {
                if depth == 0 {
                    out.push(Unit::Escaped(')'));
                    continue;
                }
                depth -= 1;
            }
            _ => {}
        }
        out.push(unit);
    }

    if in_quote {
        out.push(Unit::Bare('"'));
    }
    out.extend(std::iter::repeat_n(Unit::Bare(')'), depth));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn whole(text: &str) -> (String, bool) {
        Escaper::new("en").fixup_whole_query_string(text)
    }

    fn part(text: &str) -> String {
        Escaper::new("en").fixup_query_string_part(text)
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(whole("foo bar baz"), ("foo bar baz".to_string(), false));
    }

    #[test]
    fn test_fuzzy_detection() {
        assert_eq!(whole("catapult~"), ("catapult~".to_string(), true));
        assert_eq!(whole("catapult~2"), ("catapult~2".to_string(), true));
        assert_eq!(whole("catapult~3"), ("catapult\\~3".to_string(), false));
        assert_eq!(whole("catapult~foo~"), ("catapult\\~foo\\~".to_string(), false));
    }

    #[test]
    fn test_orphan_tilde() {
        assert_eq!(whole("~foo").0, "\\~foo");
        assert_eq!(whole("foo ~ bar").0, "foo \\~ bar");
    }

    #[test]
    fn test_proximity() {
        assert_eq!(whole("\"foo bar\"~3").0, "\"foo bar\"~3");
        assert_eq!(whole("\"foo bar\"~x").0, "\"foo bar\"\\~x");
    }

    #[test]
    fn test_leading_wildcards_removed() {
        assert_eq!(whole("*foo ?bar").0, "foo bar");
        assert_eq!(whole("foo*").0, "foo*");
        assert_eq!(whole("fo?o").0, "fo?o");
    }

    #[test]
    fn test_range_markers() {
        assert_eq!(whole(">foo <<bar").0, "foo bar");
        assert_eq!(whole("a > b").0, "a > b");
    }

    #[test]
    fn test_operators() {
        assert_eq!(whole("foo -bar").0, "foo -bar");
        assert_eq!(whole("-bar foo").0, "-bar foo");
        assert_eq!(whole("foo-bar").0, "foo\\-bar");
        assert_eq!(whole("foo - bar").0, "foo \\- bar");
        assert_eq!(whole("foo- bar").0, "foo\\- bar");
        assert_eq!(whole("--foo").0, "\\-\\-foo");
        assert_eq!(whole("!foo +bar").0, "!foo +bar");
    }

    #[test]
    fn test_dangling_or() {
        assert_eq!(whole("|| foo").0, "\\|\\| foo");
        assert_eq!(whole("foo ||").0, "foo \\|\\|");
        assert_eq!(whole("foo || bar").0, "foo || bar");
    }

    #[test]
    fn test_dangling_keywords() {
        assert_eq!(whole("AND foo").0, "and foo");
        assert_eq!(whole("OR foo").0, "or foo");
        assert_eq!(whole("foo NOT").0, "foo not");
        assert_eq!(whole("foo AND bar").0, "foo AND bar");
        assert_eq!(whole("ANDROID").0, "ANDROID");
        assert_eq!(whole("KNOT").0, "KNOT");
    }

    #[test]
    fn test_balance() {
        assert_eq!(whole("\"foo bar").0, "\"foo bar\"");
        assert_eq!(whole("(foo bar").0, "(foo bar)");
        assert_eq!(whole("foo) bar").0, "foo\\) bar");
        assert_eq!(whole("\"(foo\"").0, "\"(foo\"");
    }

    #[test]
    fn test_trailing_backslash() {
        assert_eq!(whole("foo\\").0, "foo\\\\");
    }

    #[test]
    fn test_part_escapes_structure() {
        assert_eq!(part("(a) {b} [c] ^d e:f"), "\\(a\\) \\{b\\} \\[c\\] \\^d e\\:f");
        assert_eq!(part("a/b"), "a b");
        assert_eq!(part("\"open"), "\"open\"");
        assert_eq!(part("say \\\"hi\\\""), "say \\\"hi\\\"");
        assert_eq!(part("c:\\temp"), "c\\:\\\\temp");
    }

    #[test]
    fn test_hebrew_gershayim() {
        let he = Escaper::new("he");
        assert_eq!(he.escape_quote_pairs("צה\"ל"), "צה\\\"ל");
        assert_eq!(he.escape_quote_pairs("\"foo bar\""), "\"foo bar\"");
        assert_eq!(Escaper::new("en").escape_quote_pairs("a\"b"), "a\"b");
    }

    #[test]
    fn test_contains_syntax() {
        assert!(contains_syntax("foo -bar"));
        assert!(contains_syntax("\"foo\""));
        assert!(contains_syntax("foo AND bar"));
        assert!(!contains_syntax("foo \\-bar"));
        assert!(!contains_syntax("plain words"));
    }

    proptest! {
        #[test]
        fn prop_whole_is_balanced(input in "[a-zA-Z0-9 \"()~*?+!|<>\\\\-]{0,40}") {
            let (fixed, _) = whole(&input);
            prop_assert!(is_balanced(&fixed), "unbalanced: {:?} -> {:?}", input, fixed);
        }

        #[test]
        fn prop_whole_is_idempotent(input in "\\PC{0,40}") {
            let (once, fuzzy_once) = whole(&input);
            let (twice, fuzzy_twice) = whole(&once);
            prop_assert_eq!(&once, &twice);
            prop_assert_eq!(fuzzy_once, fuzzy_twice);
        }
    }
}
