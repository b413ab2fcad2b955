//  INDEX.rs
//
//  Description:
//!   Implements `SearchIndex`: a tokenized, in-memory inverted index
//!   over the example-dataset catalog, built once at boot and read-only
//!   thereafter. Queries return dataset ids ranked by
//!   summed term frequency across the indexed fields.

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::catalog::CatalogEntry;

/// A tokenized, in-memory search index over `ExternalData` metadata, honoring
/// an optional curated whitelist (only these ids are ever indexed) and
/// blacklist (these ids are never indexed).
#[derive(Clone, Debug, Default)]
pub struct SearchIndex {
    /// token -> (dataset_id -> term frequency within that dataset's indexed text)
    postings: HashMap<String, HashMap<String, u32>>,
    dataset_ids: HashSet<String>,
}

impl SearchIndex {
    /// Builds an index from a catalog, applying whitelist/blacklist filtering
    /// before tokenizing so that neither list can be bypassed by a query.
    pub fn build(entries: &[CatalogEntry], whitelist: Option<&HashSet<String>>, blacklist: Option<&HashSet<String>>) -> Self {
        let mut index = Self::default();

        for entry in entries {
            if let Some(whitelist) = whitelist {
                if !whitelist.contains(&entry.dataset_id) {
                    continue;
                }
            }
            if let Some(blacklist) = blacklist {
                if blacklist.contains(&entry.dataset_id) {
                    continue;
                }
            }

            index.dataset_ids.insert(entry.dataset_id.clone());
            let mut text = String::new();
            text.push_str(&entry.title);
            text.push(' ');
            text.push_str(&entry.description);
            text.push(' ');
            text.push_str(&entry.group);
            for value in &entry.sample_metadata_values {
                text.push(' ');
                text.push_str(value);
            }

            for token in tokenize(&text) {
                *index.postings.entry(token).or_default().entry(entry.dataset_id.clone()).or_insert(0) += 1;
            }
        }

        debug!("Built search index over {} dataset(s), {} distinct token(s)", index.dataset_ids.len(), index.postings.len());
        index
    }

    /// Returns dataset ids matching `query`, ranked by summed term frequency
    /// across the query's tokens (a dataset hit by more query tokens, or hit
    /// more frequently, ranks higher). Empty if the index has no matches.
    pub fn query(&self, query: &str) -> Vec<String> {
        let mut scores: HashMap<&str, u32> = HashMap::new();
        for token in tokenize(query) {
            if let Some(postings) = self.postings.get(&token) {
                for (dataset_id, freq) in postings {
                    *scores.entry(dataset_id.as_str()).or_insert(0) += freq;
                }
            }
        }

        let mut ranked: Vec<(&str, u32)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.into_iter().map(|(id, _)| id.to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.dataset_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset_ids.is_empty()
    }
}

/// Lowercases and splits on anything that isn't alphanumeric, dropping
/// empty tokens.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase().split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).map(str::to_string).collect()
}



#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, title: &str, group: &str, metadata: Vec<&str>) -> CatalogEntry {
        CatalogEntry {
            dataset_id: id.to_string(),
            title: title.to_string(),
            description: String::new(),
            group: group.to_string(),
            sample_metadata_values: metadata.into_iter().map(str::to_string).collect(),
        }
    }

    #[test]
    fn query_finds_dataset_by_title_token() {
        let index = SearchIndex::build(&[entry("ds-1", "Melanoma RNA-seq cohort", "melanoma", vec!["liver", "skin"])], None, None);
        assert_eq!(index.query("melanoma"), vec!["ds-1".to_string()]);
    }

    #[test]
    fn query_ranks_more_relevant_dataset_first() {
        let entries = vec![
            entry("ds-1", "Liver fibrosis RNA-seq", "liver", vec!["liver", "liver"]),
            entry("ds-2", "Unrelated skin biopsy panel", "skin", vec!["skin"]),
        ];
        let index = SearchIndex::build(&entries, None, None);
        let results = index.query("liver");
        assert_eq!(results.first(), Some(&"ds-1".to_string()));
    }

    #[test]
    fn whitelist_excludes_non_listed_datasets() {
        let entries = vec![entry("ds-1", "Melanoma", "melanoma", vec![]), entry("ds-2", "Melanoma replicate", "melanoma", vec![])];
        let whitelist: HashSet<String> = ["ds-1".to_string()].into_iter().collect();
        let index = SearchIndex::build(&entries, Some(&whitelist), None);
        assert_eq!(index.len(), 1);
        assert_eq!(index.query("melanoma"), vec!["ds-1".to_string()]);
    }

    #[test]
    fn blacklist_excludes_listed_datasets() {
        let entries = vec![entry("ds-1", "Melanoma", "melanoma", vec![]), entry("ds-2", "Melanoma replicate", "melanoma", vec![])];
        let blacklist: HashSet<String> = ["ds-2".to_string()].into_iter().collect();
        let index = SearchIndex::build(&entries, None, Some(&blacklist));
        assert_eq!(index.len(), 1);
        assert!(!index.query("melanoma").contains(&"ds-2".to_string()));
    }

    #[test]
    fn query_with_no_matches_is_empty() {
        let index = SearchIndex::build(&[entry("ds-1", "Melanoma", "melanoma", vec![])], None, None);
        assert!(index.query("nonexistent-term").is_empty());
    }
}
