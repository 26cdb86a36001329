//! Co-occurrence clusterer.
//!
//! Two words belong together when they appear next to each other in the
//! selected text more often than chance predicts. For words A and B:
//!
//! ```text
//! P(B|A) P(A) / (P(A) P(B))  =  #(A,B) * #total / (#A * #B)
//! ```
//!
//! A score of 1 means adjacency is independent; larger scores mean the words
//! form a phrase. Pairs scoring at least the cutoff are unioned.

use std::collections::HashMap;

use log::debug;
use serde::Serialize;

use crate::counter::PopulationCounts;
use crate::weight::WordInfo;

/// Two adjacent words from the selected population and their score.
#[derive(Debug, Clone, PartialEq)]
pub struct WordPair {
    pub first: String,
    pub second: String,
    pub count: u32,
    pub score: f64,
}

/// One visual cluster: member words in display order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    pub id: usize,
    pub words: Vec<String>,
    pub weight: f64,
}

/// `pair_count * total / (first_count * second_count)`, or 0 when any
/// factor of the denominator is 0.
pub fn pair_score(
    pair_count: u32,
    total_selected: usize,
    first_count: u32,
    second_count: u32,
) -> f64 {
    let denominator = f64::from(first_count) * f64::from(second_count);
    if denominator == 0.0 || total_selected == 0 {
        return 0.0;
    }
    f64::from(pair_count) * total_selected as f64 / denominator
}

/// Scores every counted pair whose words both survive in `words`, highest
/// first. Equal scores keep the order the pairs were first seen in.
pub fn scored_pairs(words: &[WordInfo], selected: &PopulationCounts) -> Vec<WordPair> {
    let counts: HashMap<&str, u32> = words
        .iter()
        .map(|w| (w.key.as_str(), w.selected_count))
        .collect();

    let mut pairs: Vec<WordPair> = selected
        .pair_order
        .iter()
        .filter(|(first, second)| first != second)
        .filter_map(|(first, second)| {
            let first_count = *counts.get(first.as_str())?;
            let second_count = *counts.get(second.as_str())?;
            let count = selected.pair_count(first, second);
            Some(WordPair {
                first: first.clone(),
                second: second.clone(),
                count,
                score: pair_score(count, selected.total_entities, first_count, second_count),
            })
        })
        .collect();
    // stable sort: ties stay in first-seen order
    pairs.sort_by(|a, b| b.score.total_cmp(&a.score));
    pairs
}

struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        DisjointSet {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
        true
    }
}

/// Assigns a cluster id to every word in `words`.
///
/// `words` must be in display order; ids are dense and numbered by the
/// first appearance of each cluster in that order, so any prefix of the list
/// still carries dense ids. Words no pair reaches `cutoff` for stay alone.
pub fn cluster_words(words: &mut [WordInfo], selected: &PopulationCounts, cutoff: f64) {
    let index: HashMap<String, usize> = words
        .iter()
        .enumerate()
        .map(|(i, w)| (w.key.clone(), i))
        .collect();
    let mut sets = DisjointSet::new(words.len());

    let mut merges = 0usize;
    for pair in scored_pairs(words, selected) {
        if pair.score < cutoff {
            break;
        }
        if let (Some(&a), Some(&b)) = (index.get(&pair.first), index.get(&pair.second)) {
            if sets.union(a, b) {
                merges += 1;
            }
        }
    }

    let mut labels: HashMap<usize, usize> = HashMap::new();
    for i in 0..words.len() {
        let root = sets.find(i);
        let next = labels.len();
        words[i].cluster = Some(*labels.entry(root).or_insert(next));
    }
    debug!(
        "Clustered words - words={}, clusters={}, merges={}, cutoff={}",
        words.len(),
        labels.len(),
        merges,
        cutoff
    );
}

/// Groups clustered words by id, in id order.
pub fn group_clusters(words: &[WordInfo]) -> Vec<Cluster> {
    let mut clusters: Vec<Cluster> = Vec::new();
    for word in words {
        let Some(id) = word.cluster else {
            continue;
        };
        match clusters.iter_mut().find(|c| c.id == id) {
            Some(cluster) => {
                cluster.words.push(word.word.clone());
                cluster.weight += word.weight;
            }
            None => clusters.push(Cluster {
                id,
                words: vec![word.word.clone()],
                weight: word.weight,
            }),
        }
    }
    clusters.sort_by_key(|c| c.id);
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weight::rank_words;

    fn selected(
        words: &[(&str, u32)],
        pairs: &[(&str, &str, u32)],
        total: usize,
    ) -> PopulationCounts {
        let mut counts = PopulationCounts {
            word_counts: words.iter().map(|(w, c)| (w.to_string(), *c)).collect(),
            total_entities: total,
            ..PopulationCounts::default()
        };
        for (a, b, c) in pairs {
            let key = (a.to_string(), b.to_string());
            counts.pair_order.push(key.clone());
            counts.pair_counts.insert(key, *c);
        }
        counts
    }

    fn clustered(counts: &PopulationCounts, cutoff: f64) -> Vec<WordInfo> {
        let mut words = rank_words(counts, &PopulationCounts::default(), 1, 0.0);
        cluster_words(&mut words, counts, cutoff);
        words
    }

    fn cluster_of(words: &[WordInfo], key: &str) -> Option<usize> {
        words.iter().find(|w| w.key == key).and_then(|w| w.cluster)
    }

    #[test]
    fn score_formula() {
        // 1 * 2 / (2 * 1)
        assert_eq!(pair_score(1, 2, 2, 1), 1.0);
        assert_eq!(pair_score(3, 10, 3, 3), 10.0 / 3.0);
        assert_eq!(pair_score(1, 0, 1, 1), 0.0);
        assert_eq!(pair_score(1, 5, 0, 1), 0.0);
    }

    #[test]
    fn cutoff_separates_and_merges() {
        let counts = selected(
            &[("red", 2), ("car", 1), ("truck", 1)],
            &[("red", "car", 1), ("red", "truck", 1)],
            2,
        );
        let above = clustered(&counts, 1.0 + 1e-9);
        assert_ne!(cluster_of(&above, "red"), cluster_of(&above, "car"));

        let below = clustered(&counts, 0.5);
        assert_eq!(cluster_of(&below, "red"), cluster_of(&below, "car"));
        assert_eq!(cluster_of(&below, "red"), cluster_of(&below, "truck"));
    }

    #[test]
    fn ids_are_dense_in_display_order() {
        let counts = selected(
            &[("a", 4), ("b", 3), ("c", 2), ("d", 1)],
            &[("b", "d", 1)],
            4,
        );
        let words = clustered(&counts, 0.0);
        let ids: Vec<Option<usize>> = words.iter().map(|w| w.cluster).collect();
        assert_eq!(ids, vec![Some(0), Some(1), Some(2), Some(1)]);
    }

    #[test]
    fn pairs_with_filtered_words_are_ignored() {
        let counts = selected(&[("a", 2)], &[("a", "gone", 1)], 2);
        let words = rank_words(&counts, &PopulationCounts::default(), 1, 0.0);
        assert!(scored_pairs(&words, &counts).is_empty());
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let counts = selected(
            &[("a", 1), ("b", 1), ("c", 1)],
            &[("b", "c", 1), ("a", "b", 1)],
            1,
        );
        let words = rank_words(&counts, &PopulationCounts::default(), 1, 0.0);
        let pairs = scored_pairs(&words, &counts);
        assert_eq!(pairs[0].first, "b");
        assert_eq!(pairs[1].first, "a");
    }

    #[test]
    fn groups_follow_ids() {
        let counts = selected(
            &[("red", 2), ("car", 1), ("truck", 1)],
            &[("red", "car", 1)],
            2,
        );
        let words = clustered(&counts, 1.0);
        let groups = group_clusters(&words);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].words, vec!["red", "car"]);
        assert_eq!(groups[1].words, vec!["truck"]);
    }
}
