//! Property tests over randomly generated label sets.

use std::collections::{BTreeSet, HashSet};

use proptest::prelude::*;

use semantic_summary::{
    Entity, EntityId, EntityTable, PopulationCounts, TextFilter, WordInfo, cluster_words,
    count_population, rank_words, scored_pairs, word_weight,
};

const VOCABULARY: &[&str] = &["alpha", "beta", "gamma", "delta", "omega", "Alpha"];

fn labels() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(
        prop::collection::vec(prop::sample::select(VOCABULARY), 0..6).prop_map(|w| w.join(" ")),
        1..12,
    )
}

fn table(labels: &[String]) -> EntityTable {
    labels
        .iter()
        .enumerate()
        .map(|(i, l)| (EntityId(i as u64), Entity::new().with("label", l.as_str())))
        .collect()
}

fn all_ids(table: &EntityTable) -> BTreeSet<EntityId> {
    table.keys().copied().collect()
}

fn ranked(labels: &[String]) -> (Vec<WordInfo>, PopulationCounts) {
    let table = table(labels);
    let filter = TextFilter::default();
    let names = vec!["label".to_string()];
    let counts = count_population(&table, &all_ids(&table), &names, &filter);
    let words = rank_words(&counts, &counts, 1, 0.0);
    (words, counts)
}

proptest! {
    #[test]
    fn counts_never_exceed_population(labels in labels()) {
        let (_, counts) = ranked(&labels);
        prop_assert_eq!(counts.total_entities, labels.len());
        for &count in counts.word_counts.values() {
            prop_assert!(count as usize <= labels.len());
        }
        for ((first, second), &count) in &counts.pair_counts {
            prop_assert!(count <= counts.word_count(first));
            prop_assert!(count <= counts.word_count(second));
        }
    }

    #[test]
    fn min_occurrence_filters_exactly(labels in labels(), min in 0usize..6) {
        let table = table(&labels);
        let names = vec!["label".to_string()];
        let counts = count_population(&table, &all_ids(&table), &names, &TextFilter::default());
        let words = rank_words(&counts, &counts, min, 0.5);
        prop_assert!(words.iter().all(|w| w.selected_count as usize >= min));
        let expected = counts.word_counts.values().filter(|&&c| c as usize >= min).count();
        prop_assert_eq!(words.len(), expected);
    }

    #[test]
    fn weight_is_monotone(
        sel in 0u32..50,
        net in 0u32..50,
        total_sel in 1usize..60,
        total_net in 1usize..60,
        f in 0.0f64..=1.0,
        g in 0.0f64..=1.0,
    ) {
        let w = word_weight(sel, net, total_sel, total_net, f);
        prop_assert!(w >= 0.0);
        prop_assert!(word_weight(sel + 1, net, total_sel, total_net, f) >= w);
        prop_assert!(word_weight(sel, net + 1, total_sel, total_net, f) <= w);
        let (lo, hi) = if f <= g { (f, g) } else { (g, f) };
        prop_assert!(
            word_weight(sel, net, total_sel, total_net, hi)
                <= word_weight(sel, net, total_sel, total_net, lo)
        );
    }

    #[test]
    fn zero_cutoff_joins_every_adjacent_pair(labels in labels()) {
        let (mut words, counts) = ranked(&labels);
        cluster_words(&mut words, &counts, 0.0);
        for (first, second) in counts.pair_counts.keys() {
            let a = words.iter().find(|w| &w.key == first).and_then(|w| w.cluster);
            let b = words.iter().find(|w| &w.key == second).and_then(|w| w.cluster);
            prop_assert_eq!(a, b);
        }
    }

    #[test]
    fn cutoff_above_best_score_isolates_words(labels in labels()) {
        let (mut words, counts) = ranked(&labels);
        let best = scored_pairs(&words, &counts)
            .first()
            .map_or(0.0, |p| p.score);
        cluster_words(&mut words, &counts, best + 1.0);
        let ids: HashSet<Option<usize>> = words.iter().map(|w| w.cluster).collect();
        prop_assert_eq!(ids.len(), words.len());
        let max = words.iter().filter_map(|w| w.cluster).max();
        prop_assert_eq!(max, words.len().checked_sub(1));
    }

    #[test]
    fn pipeline_is_deterministic(labels in labels(), cutoff in 0.0f64..5.0) {
        let (mut a, counts_a) = ranked(&labels);
        let (mut b, counts_b) = ranked(&labels);
        cluster_words(&mut a, &counts_a, cutoff);
        cluster_words(&mut b, &counts_b, cutoff);
        prop_assert_eq!(a, b);
    }
}
