//! Field weighting
//!
//! Builds the `field^boost` lists that text queries are matched against.

use crate::config::SearchConfig;
use crate::namespace::{NS_FILE, NamespaceSet};
use crate::query::dsl::format_weight;

/// Field list builder for one search
#[derive(Debug, Clone, Copy)]
pub struct FieldWeighting<'a> {
    config: &'a SearchConfig,
    namespaces: &'a NamespaceSet,
}

impl<'a> FieldWeighting<'a> {
    pub fn new(config: &'a SearchConfig, namespaces: &'a NamespaceSet) -> Self {
        Self { config, namespaces }
    }

    /// Fields to match text against, each boosted by `weight` times its
    /// configured weight.
    ///
    /// With all-fields mode on (and allowed for this call) a single
    /// consolidated field is returned instead. Near-match fields only
    /// cover titles and redirects.
    pub fn build_fields(&self, weight: f64, suffix: &str, all_fields_allowed: bool) -> Vec<String> {
        let w = &self.config.weights;
        if all_fields_allowed && self.config.all_fields.use_all {
            // Near-match fields cannot share the root all field
            if suffix == ".near_match" {
                return vec![format!("all_near_match^{}", format_weight(weight))];
            }
            return vec![format!("all{}^{}", suffix, format_weight(weight))];
        }

        let mut fields = vec![
            format!("title{}^{}", suffix, format_weight(weight * w.title)),
            format!("redirect.title{}^{}", suffix, format_weight(weight * w.redirect)),
        ];
        if suffix == ".near_match" {
            return fields;
        }

        fields.push(format!("category{}^{}", suffix, format_weight(weight * w.category)));
        fields.push(format!("heading{}^{}", suffix, format_weight(weight * w.heading)));
        fields.push(format!(
            "opening_text{}^{}",
            suffix,
            format_weight(weight * w.opening_text)
        ));
        fields.push(format!("text{}^{}", suffix, format_weight(weight * w.text)));
        fields.push(format!(
            "auxiliary_text{}^{}",
            suffix,
            format_weight(weight * w.auxiliary_text)
        ));
        if self.namespaces.contains(NS_FILE) {
            fields.push(format!(
                "file_text{}^{}",
                suffix,
                format_weight(weight * w.file_text)
            ));
        }
        fields
    }

    /// Rewrite a phrase so it only matches unstemmed fields
    pub fn switch_to_exact(&self, term: &str, all_fields_allowed: bool) -> String {
        let exact = self.build_fields(1.0, &format!(".plain:{}", term), all_fields_allowed);
        format!("({})", exact.join(" OR "))
    }

    /// Rewrite a wildcard term so it only matches unstemmed fields
    pub fn switch_to_exact_for_wildcards(&self, term: &str) -> String {
        if self.config.all_fields.use_all {
            format!(
                "(title.plain:{}^{} OR all.plain:{})",
                term,
                format_weight(self.config.weights.title),
                term
            )
        } else {
            self.switch_to_exact(term, false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_list() {
        let config = SearchConfig::default();
        let all = NamespaceSet::All;
        let fields = FieldWeighting::new(&config, &all).build_fields(1.0, ".plain", true);
        assert_eq!(
            fields,
            vec![
                "title.plain^20",
                "redirect.title.plain^15",
                "category.plain^8",
                "heading.plain^5",
                "opening_text.plain^3",
                "text.plain^1",
                "auxiliary_text.plain^0.5",
                "file_text.plain^0.5",
            ]
        );
    }

    #[test]
    fn test_file_text_needs_file_namespace() {
        let config = SearchConfig::default();
        let main = NamespaceSet::only([0]);
        let fields = FieldWeighting::new(&config, &main).build_fields(0.5, "", true);
        assert_eq!(fields.len(), 7);
        assert_eq!(fields[0], "title^10");
        assert!(fields.iter().all(|f| !f.starts_with("file_text")));

        let files = NamespaceSet::only([0, NS_FILE]);
        let fields = FieldWeighting::new(&config, &files).build_fields(0.5, "", true);
        assert_eq!(fields.last().unwrap(), "file_text^0.25");
    }

    #[test]
    fn test_near_match_titles_only() {
        let config = SearchConfig::default();
        let all = NamespaceSet::All;
        let fields = FieldWeighting::new(&config, &all).build_fields(2.0, ".near_match", true);
        assert_eq!(fields, vec!["title.near_match^40", "redirect.title.near_match^30"]);
    }

    #[test]
    fn test_all_fields_mode() {
        let mut config = SearchConfig::default();
        config.all_fields.use_all = true;
        let all = NamespaceSet::All;
        let weighting = FieldWeighting::new(&config, &all);
        assert_eq!(weighting.build_fields(1.0, ".plain", true), vec!["all.plain^1"]);
        assert_eq!(weighting.build_fields(0.5, "", true), vec!["all^0.5"]);
        assert_eq!(weighting.build_fields(1.0, ".plain", false).len(), 8);
        assert_eq!(
            weighting.build_fields(2.0, ".near_match", true),
            vec!["all_near_match^2"]
        );
    }

    #[test]
    fn test_switch_to_exact() {
        let config = SearchConfig::default();
        let main = NamespaceSet::only([0]);
        let weighting = FieldWeighting::new(&config, &main);
        let exact = weighting.switch_to_exact("\"a b\"~0", true);
        assert!(exact.starts_with("(title.plain:\"a b\"~0^20 OR redirect.title.plain:\"a b\"~0^15"));
        assert!(exact.ends_with("auxiliary_text.plain:\"a b\"~0^0.5)"));
        assert_eq!(
            weighting.switch_to_exact_for_wildcards("cat*"),
            weighting.switch_to_exact("cat*", false)
        );
    }

    #[test]
    fn test_switch_wildcards_all_fields() {
        let mut config = SearchConfig::default();
        config.all_fields.use_all = true;
        let all = NamespaceSet::All;
        assert_eq!(
            FieldWeighting::new(&config, &all).switch_to_exact_for_wildcards("cat*"),
            "(title.plain:cat*^20 OR all.plain:cat*)"
        );
    }
}
