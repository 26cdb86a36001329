//! Population counter: word presence and adjacent-pair counts over a set of
//! entities.
//!
//! Every count is an entity-presence count: a word (or an ordered pair) adds
//! at most one per entity, however often it repeats in that entity's text.

use std::collections::{BTreeSet, HashMap, HashSet};

use log::debug;
use rayon::prelude::*;

use crate::entity::{Entity, EntityId, EntityTable};
use crate::filter::{TextFilter, Token, Tokenizer};

/// An ordered pair of word keys: `.0` immediately precedes `.1`.
pub type PairKey = (String, String);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PopulationCounts {
    /// word key -> number of entities containing it.
    pub word_counts: HashMap<String, u32>,
    /// (first, second) -> number of entities where `first` is directly
    /// followed by `second`.
    pub pair_counts: HashMap<PairKey, u32>,
    /// Pairs in the order they were first seen.
    pub pair_order: Vec<PairKey>,
    /// word key -> original-case form seen first.
    pub display_forms: HashMap<String, String>,
    /// Entities actually counted.
    pub total_entities: usize,
}

impl PopulationCounts {
    pub fn word_count(&self, word: &str) -> u32 {
        self.word_counts.get(word).copied().unwrap_or(0)
    }

    pub fn pair_count(&self, first: &str, second: &str) -> u32 {
        self.pair_counts
            .get(&(first.to_string(), second.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn display_form<'a>(&'a self, word: &'a str) -> &'a str {
        self.display_forms
            .get(word)
            .map(String::as_str)
            .unwrap_or(word)
    }
}

/// Distinct words and pairs of a single entity, in first-seen order.
#[derive(Default)]
struct EntityTally {
    words: Vec<Token>,
    pairs: Vec<PairKey>,
}

fn tally_entity(
    entity: &Entity,
    attribute_names: &[String],
    tokenizer: &Tokenizer<'_>,
) -> EntityTally {
    let mut tally = EntityTally::default();
    let mut seen_words = HashSet::new();
    let mut seen_pairs = HashSet::new();

    for name in attribute_names {
        let Some(value) = entity.get(name) else {
            continue;
        };
        // list elements form one stream; pairs never span two attributes
        let tokens: Vec<Token> = value.parts().flat_map(|p| tokenizer.tokenize(p)).collect();

        for window in tokens.windows(2) {
            let pair = (window[0].key.clone(), window[1].key.clone());
            if seen_pairs.insert(pair.clone()) {
                tally.pairs.push(pair);
            }
        }
        for token in tokens {
            if seen_words.insert(token.key.clone()) {
                tally.words.push(token);
            }
        }
    }
    tally
}

/// Counts words and adjacent pairs over `ids`, reading only `attribute_names`.
///
/// Ids without an entry in `entities` are skipped and do not count toward
/// `total_entities`. Entities are tokenized in parallel and merged in id
/// order, so the output (first-seen forms and pair order included) does not
/// depend on scheduling.
pub fn count_population(
    entities: &EntityTable,
    ids: &BTreeSet<EntityId>,
    attribute_names: &[String],
    filter: &TextFilter,
) -> PopulationCounts {
    let members: Vec<&Entity> = ids.iter().filter_map(|id| entities.get(id)).collect();

    let tallies: Vec<EntityTally> = members
        .par_iter()
        .map_init(
            || filter.tokenizer(),
            |tokenizer, entity| tally_entity(entity, attribute_names, tokenizer),
        )
        .collect();

    let mut counts = PopulationCounts {
        total_entities: members.len(),
        ..PopulationCounts::default()
    };
    for tally in tallies {
        for token in tally.words {
            counts
                .display_forms
                .entry(token.key.clone())
                .or_insert(token.surface);
            *counts.word_counts.entry(token.key).or_insert(0) += 1;
        }
        for pair in tally.pairs {
            let count = counts.pair_counts.entry(pair.clone()).or_insert(0);
            if *count == 0 {
                counts.pair_order.push(pair);
            }
            *count += 1;
        }
    }

    debug!(
        "Counted population - entities={}, words={}, pairs={}",
        counts.total_entities,
        counts.word_counts.len(),
        counts.pair_counts.len()
    );
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterConfig;

    fn table(values: &[(u64, &str)]) -> EntityTable {
        values
            .iter()
            .map(|(id, label)| (EntityId(*id), Entity::new().with("label", *label)))
            .collect()
    }

    fn all_ids(table: &EntityTable) -> BTreeSet<EntityId> {
        table.keys().copied().collect()
    }

    fn attrs(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn red_car_red_truck() {
        let t = table(&[(1, "red car"), (2, "red truck")]);
        let c = count_population(&t, &all_ids(&t), &attrs(&["label"]), &TextFilter::default());
        assert_eq!(c.total_entities, 2);
        assert_eq!(c.word_count("red"), 2);
        assert_eq!(c.word_count("car"), 1);
        assert_eq!(c.word_count("truck"), 1);
        assert_eq!(c.pair_count("red", "car"), 1);
        assert_eq!(c.pair_count("red", "truck"), 1);
        assert_eq!(c.pair_count("car", "red"), 0);
    }

    #[test]
    fn repeated_words_count_once_per_entity() {
        let t = table(&[(1, "go go go go"), (2, "go")]);
        let c = count_population(&t, &all_ids(&t), &attrs(&["label"]), &TextFilter::default());
        assert_eq!(c.word_count("go"), 2);
        assert_eq!(c.pair_count("go", "go"), 1);
    }

    #[test]
    fn pairs_do_not_cross_attributes() {
        let mut t = EntityTable::new();
        t.insert(
            EntityId(1),
            Entity::new().with("a", "alpha").with("b", "beta"),
        );
        let c = count_population(&t, &all_ids(&t), &attrs(&["a", "b"]), &TextFilter::default());
        assert_eq!(c.word_count("alpha"), 1);
        assert_eq!(c.word_count("beta"), 1);
        assert!(c.pair_counts.is_empty());
    }

    #[test]
    fn list_values_form_one_stream() {
        let mut t = EntityTable::new();
        t.insert(EntityId(1), Entity::new().with("go", vec!["cell", "cycle"]));
        let c = count_population(&t, &all_ids(&t), &attrs(&["go"]), &TextFilter::default());
        assert_eq!(c.pair_count("cell", "cycle"), 1);
    }

    #[test]
    fn missing_attributes_and_ids_contribute_nothing() {
        let t = table(&[(1, "red car")]);
        let mut ids = all_ids(&t);
        ids.insert(EntityId(99));
        let c = count_population(&t, &ids, &attrs(&["label", "missing"]), &TextFilter::default());
        assert_eq!(c.total_entities, 1);
        assert_eq!(c.word_count("red"), 1);
    }

    #[test]
    fn only_selected_attributes_are_read() {
        let mut t = EntityTable::new();
        t.insert(
            EntityId(1),
            Entity::new().with("label", "red").with("note", "blue"),
        );
        let c = count_population(&t, &all_ids(&t), &attrs(&["label"]), &TextFilter::default());
        assert_eq!(c.word_count("blue"), 0);
    }

    #[test]
    fn first_seen_casing_follows_id_order() {
        let t = table(&[(2, "RED"), (1, "Red"), (3, "red")]);
        let c = count_population(&t, &all_ids(&t), &attrs(&["label"]), &TextFilter::default());
        assert_eq!(c.display_form("red"), "Red");
    }

    #[test]
    fn stemmed_words_merge_across_entities() {
        let t = table(&[(1, "running"), (2, "run")]);
        let mut filter = TextFilter::with_config(FilterConfig::default()).unwrap();
        filter.set_stemming(true);
        let c = count_population(&t, &all_ids(&t), &attrs(&["label"]), &filter);
        assert_eq!(c.word_count("run"), 2);
        assert_eq!(c.display_form("run"), "running");
    }

    #[test]
    fn empty_population() {
        let t = table(&[(1, "red")]);
        let c = count_population(&t, &BTreeSet::new(), &attrs(&["label"]), &TextFilter::default());
        assert_eq!(c.total_entities, 0);
        assert!(c.word_counts.is_empty());
    }
}
