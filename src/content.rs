//! Content store collaborator
//!
//! Resolves page ids to titles for `incategory:id:NNN`. Lookups are
//! synchronous: they run while the query is being compiled.

use std::collections::HashMap;

use crate::namespace::Title;

/// Resolves page identifiers to canonical titles
pub trait ContentStore: Send + Sync {
    /// Titles of the pages that exist among `ids`, in input order
    fn titles_for_page_ids(&self, ids: &[u64]) -> Vec<Title>;
}

/// A store that knows no pages
#[derive(Debug, Default, Clone, Copy)]
pub struct NullContentStore;

impl ContentStore for NullContentStore {
    fn titles_for_page_ids(&self, _ids: &[u64]) -> Vec<Title> {
        Vec::new()
    }
}

/// In-memory page table
#[derive(Debug, Default, Clone)]
pub struct StaticContentStore {
    pages: HashMap<u64, Title>,
}

impl StaticContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, id: u64, title: Title) -> Self {
        self.pages.insert(id, title);
        self
    }
}

impl ContentStore for StaticContentStore {
    fn titles_for_page_ids(&self, ids: &[u64]) -> Vec<Title> {
        ids.iter().filter_map(|id| self.pages.get(id).cloned()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::NS_CATEGORY;

    #[test]
    fn test_static_store() {
        let store = StaticContentStore::new()
            .with_page(7, Title::new(NS_CATEGORY, "Living people"))
            .with_page(9, Title::new(NS_CATEGORY, "Cats"));

        let titles = store.titles_for_page_ids(&[9, 8, 7]);
        assert_eq!(titles.len(), 2);
        assert_eq!(titles[0].text, "Cats");
        assert_eq!(titles[1].text, "Living people");
    }

    #[test]
    fn test_null_store() {
        assert!(NullContentStore.titles_for_page_ids(&[1, 2]).is_empty());
    }
}
