//! Frequency index over live one-join sub-expressions

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, Default)]
struct Occurrences {
    count: usize,
    /// Candidate network index -> occurrences in that network
    networks: BTreeMap<usize, usize>,
}

/// Occurrence counts of pair definitions across candidate networks.
///
/// The ranking orders entries by descending count, then by definition, so
/// the most frequent pair (ties to the lexicographically smallest
/// definition) is the first element.
#[derive(Debug, Clone, Default)]
pub struct SubExpressionOccurrenceMap {
    entries: HashMap<String, Occurrences>,
    ranking: BTreeSet<(Reverse<usize>, String)>,
}

impl SubExpressionOccurrenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one occurrence of `definition` in `network`
    pub fn add(&mut self, definition: &str, network: usize) {
        let entry = self.entries.entry(definition.to_string()).or_default();
        if entry.count > 0 {
            self.ranking
                .remove(&(Reverse(entry.count), definition.to_string()));
        }
        entry.count += 1;
        *entry.networks.entry(network).or_insert(0) += 1;
        self.ranking
            .insert((Reverse(entry.count), definition.to_string()));
    }

    /// Forget one occurrence of `definition` in `network`; unknown
    /// occurrences are ignored
    pub fn remove(&mut self, definition: &str, network: usize) {
        let Some(entry) = self.entries.get_mut(definition) else {
            return;
        };
        let Some(in_network) = entry.networks.get_mut(&network) else {
            return;
        };

        *in_network -= 1;
        if *in_network == 0 {
            entry.networks.remove(&network);
        }
        self.ranking
            .remove(&(Reverse(entry.count), definition.to_string()));
        entry.count -= 1;
        if entry.count == 0 {
            self.entries.remove(definition);
        } else {
            self.ranking
                .insert((Reverse(entry.count), definition.to_string()));
        }
    }

    /// Definition with the highest count and that count
    pub fn most_frequent(&self) -> Option<(&str, usize)> {
        self.ranking
            .first()
            .map(|(Reverse(count), definition)| (definition.as_str(), *count))
    }

    pub fn count(&self, definition: &str) -> usize {
        self.entries.get(definition).map_or(0, |e| e.count)
    }

    /// Networks containing `definition`, ascending
    pub fn networks(&self, definition: &str) -> Vec<usize> {
        self.entries
            .get(definition)
            .map(|e| e.networks.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Number of distinct definitions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_most_frequent_by_count() {
        let mut map = SubExpressionOccurrenceMap::new();
        map.add("b ⋈ c", 0);
        map.add("a ⋈ b", 1);
        map.add("a ⋈ b", 2);
        assert_eq!(map.most_frequent(), Some(("a ⋈ b", 2)));
        assert_eq!(map.networks("a ⋈ b"), vec![1, 2]);
    }

    #[test]
    fn test_tie_breaks_lexicographically() {
        let mut map = SubExpressionOccurrenceMap::new();
        map.add("y ⋈ z", 0);
        map.add("b ⋈ c", 1);
        assert_eq!(map.most_frequent(), Some(("b ⋈ c", 1)));
    }

    #[test]
    fn test_remove_updates_ranking() {
        let mut map = SubExpressionOccurrenceMap::new();
        map.add("a ⋈ b", 0);
        map.add("a ⋈ b", 0);
        map.add("c ⋈ d", 1);
        map.remove("a ⋈ b", 0);
        assert_eq!(map.count("a ⋈ b"), 1);
        assert_eq!(map.networks("a ⋈ b"), vec![0]);
        assert_eq!(map.most_frequent(), Some(("a ⋈ b", 1)));

        map.remove("a ⋈ b", 0);
        assert_eq!(map.count("a ⋈ b"), 0);
        assert!(map.networks("a ⋈ b").is_empty());
        assert_eq!(map.most_frequent(), Some(("c ⋈ d", 1)));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut map = SubExpressionOccurrenceMap::new();
        map.remove("a ⋈ b", 0);
        map.add("a ⋈ b", 0);
        map.remove("a ⋈ b", 7);
        assert_eq!(map.count("a ⋈ b"), 1);
        map.remove("a ⋈ b", 0);
        assert!(map.is_empty());
        assert_eq!(map.most_frequent(), None);
    }
}
