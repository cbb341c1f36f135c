//! Namespaces and titles
//!
//! A small model of wiki namespaces: the id/name table used to resolve
//! `Talk:` style prefixes, the subject/talk pairing used by namespace
//! boosts, and the ordered namespace selection of a search.

use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

use crate::config::SearchConfig;

pub const NS_MEDIA: i32 = -2;
pub const NS_SPECIAL: i32 = -1;
pub const NS_MAIN: i32 = 0;
pub const NS_TALK: i32 = 1;
pub const NS_USER: i32 = 2;
pub const NS_PROJECT: i32 = 4;
pub const NS_FILE: i32 = 6;
pub const NS_MEDIAWIKI: i32 = 8;
pub const NS_TEMPLATE: i32 = 10;
pub const NS_HELP: i32 = 12;
pub const NS_CATEGORY: i32 = 14;

/// Sentinel accepted in place of a namespace name to mean every namespace
pub const ALL_NAMESPACES: &str = "all";

const DEFAULT_NAMESPACES: &[(i32, &str)] = &[
    (NS_MEDIA, "Media"),
    (NS_SPECIAL, "Special"),
    (NS_MAIN, ""),
    (NS_TALK, "Talk"),
    (NS_USER, "User"),
    (3, "User talk"),
    (NS_PROJECT, "Project"),
    (5, "Project talk"),
    (NS_FILE, "File"),
    (7, "File talk"),
    (NS_MEDIAWIKI, "MediaWiki"),
    (9, "MediaWiki talk"),
    (NS_TEMPLATE, "Template"),
    (11, "Template talk"),
    (NS_HELP, "Help"),
    (13, "Help talk"),
    (NS_CATEGORY, "Category"),
    (15, "Category talk"),
];

/// Namespace selection of a search
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NamespaceSet {
    /// No restriction
    #[default]
    All,
    /// Ordered, duplicate-free list of namespace ids
    Only(Vec<i32>),
}

impl NamespaceSet {
    /// Build a restriction; an empty list means no restriction
    pub fn only(ids: impl IntoIterator<Item = i32>) -> Self {
        let mut out: Vec<i32> = Vec::new();
        for id in ids {
            if !out.contains(&id) {
                out.push(id);
            }
        }
        if out.is_empty() {
            NamespaceSet::All
        } else {
            NamespaceSet::Only(out)
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, NamespaceSet::All)
    }

    pub fn contains(&self, ns: i32) -> bool {
        match self {
            NamespaceSet::All => true,
            NamespaceSet::Only(ids) => ids.contains(&ns),
        }
    }

    /// The explicit ids, if restricted
    pub fn ids(&self) -> Option<&[i32]> {
        match self {
            NamespaceSet::All => None,
            NamespaceSet::Only(ids) => Some(ids),
        }
    }
}

/// A namespace-qualified page title
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Title {
    pub namespace: i32,
    /// Title text without the namespace prefix, spaces not underscores
    pub text: String,
}

impl Title {
    pub fn new(namespace: i32, text: impl Into<String>) -> Self {
        Self {
            namespace,
            text: text.into(),
        }
    }

    /// Title text with underscores
    pub fn db_key(&self) -> String {
        self.text.replace(' ', "_")
    }
}

/// Lookup table between namespace ids and names
#[derive(Debug, Clone)]
pub struct NamespaceTable {
    by_name: FxHashMap<String, i32>,
    canonical: BTreeMap<i32, String>,
    content: Vec<i32>,
    capital_links: bool,
}

impl Default for NamespaceTable {
    fn default() -> Self {
        Self::mediawiki_defaults()
    }
}

impl NamespaceTable {
    /// The built-in namespaces, plus the `Image` alias
    pub fn mediawiki_defaults() -> Self {
        let mut table = Self {
            by_name: FxHashMap::default(),
            canonical: BTreeMap::new(),
            content: vec![NS_MAIN],
            capital_links: true,
        };
        for &(id, name) in DEFAULT_NAMESPACES {
            table.insert(id, name);
        }
        table.add_alias("Image", NS_FILE);
        table.add_alias("Image talk", NS_FILE + 1);
        table
    }

    /// Defaults adjusted for the wiki described by `config`
    pub fn from_config(config: &SearchConfig) -> Self {
        let mut table = Self::mediawiki_defaults();
        table.content = config.content_namespaces.clone();
        table.capital_links = config.capital_links;
        table
    }

    /// Register a namespace under its canonical name
    pub fn insert(&mut self, id: i32, name: &str) {
        self.canonical.insert(id, name.to_string());
        if !name.is_empty() {
            self.by_name.insert(normalize_name(name), id);
        }
    }

    /// Register an additional name for an existing namespace
    pub fn add_alias(&mut self, alias: &str, id: i32) {
        self.by_name.insert(normalize_name(alias), id);
    }

    /// Resolve a namespace name, case-insensitively, treating `_` as a space
    pub fn lookup(&self, name: &str) -> Option<i32> {
        self.by_name.get(&normalize_name(name)).copied()
    }

    pub fn name(&self, id: i32) -> Option<&str> {
        self.canonical.get(&id).map(String::as_str)
    }

    /// Namespaces that can hold pages
    pub fn valid_namespaces(&self) -> Vec<i32> {
        self.canonical.keys().copied().filter(|&id| id >= 0).collect()
    }

    pub fn is_content(&self, id: i32) -> bool {
        self.content.contains(&id)
    }

    pub fn is_talk(id: i32) -> bool {
        id > NS_MAIN && id % 2 == 1
    }

    /// The subject namespace of a talk namespace (identity for subjects)
    pub fn subject(id: i32) -> i32 {
        if Self::is_talk(id) { id - 1 } else { id }
    }

    /// Split a leading `Name:` off `text`.
    ///
    /// Returns the selected namespaces and the remainder, or `None` when the
    /// text has no resolvable prefix. `all:` selects every namespace.
    pub fn split_prefix<'t>(&self, text: &'t str) -> Option<(NamespaceSet, &'t str)> {
        let colon = text.find(':')?;
        let name = &text[..colon];
        let rest = &text[colon + 1..];

        if name.trim().eq_ignore_ascii_case(ALL_NAMESPACES) {
            return Some((NamespaceSet::All, rest));
        }

        let id = self.lookup(name)?;
        Some((NamespaceSet::only([id]), rest))
    }

    /// Parse user-supplied text into a title.
    ///
    /// A leading `:` forces the main namespace.
    pub fn parse_title(&self, text: &str) -> Option<Title> {
        let cleaned = text.replace('_', " ");
        let mut cleaned = cleaned.trim();

        let forced_main = cleaned.starts_with(':');
        if forced_main {
            cleaned = cleaned[1..].trim_start();
        }

        let (namespace, rest) = if forced_main {
            (NS_MAIN, cleaned)
        } else {
            match cleaned.find(':') {
                Some(colon) => match self.lookup(&cleaned[..colon]) {
                    Some(id) => (id, cleaned[colon + 1..].trim_start()),
                    None => (NS_MAIN, cleaned),
                },
                None => (NS_MAIN, cleaned),
            }
        };

        if rest.is_empty() {
            return None;
        }

        Some(Title::new(namespace, self.capitalize(rest)))
    }

    /// Title text with its namespace prefix
    pub fn prefixed_text(&self, title: &Title) -> String {
        match self.name(title.namespace) {
            Some(name) if !name.is_empty() => format!("{}:{}", name, title.text),
            _ => title.text.clone(),
        }
    }

    fn capitalize(&self, text: &str) -> String {
        if !self.capital_links {
            return text.to_string();
        }
        let mut chars = text.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

fn normalize_name(name: &str) -> String {
    name.trim().replace('_', " ").to_lowercase()
}
