//! Weight normalizer: blends selected-population frequency with the
//! collection baseline into a single display weight.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::counter::PopulationCounts;

pub const MIN_FONT_SIZE: u32 = 12;
pub const MAX_FONT_SIZE: u32 = 64;

/// Computed state of one word in one cloud.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordInfo {
    /// Display form (first-seen original casing).
    pub word: String,
    /// Normalized form the counts are keyed by.
    pub key: String,
    pub selected_count: u32,
    pub network_count: u32,
    pub weight: f64,
    pub font_size: u32,
    /// `None` until clustering ran, and always `None` without clustering.
    pub cluster: Option<usize>,
}

impl WordInfo {
    /// Display order: weight descending, then key ascending.
    pub fn display_cmp(&self, other: &WordInfo) -> Ordering {
        other
            .weight
            .total_cmp(&self.weight)
            .then_with(|| self.key.cmp(&other.key))
    }
}

fn fraction(count: u32, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        f64::from(count) / total as f64
    }
}

/// Weight of one word.
///
/// `s = selected_count / total_selected`, `n = network_count / total_network`
/// (capped at 1) and the result is `s * (1 - net_weight_factor * n)`. With a
/// factor of 0 only `s` matters; with 1 a word present in every entity of
/// the collection weighs 0. Zero totals give a fraction of 0.
///
/// # Example
/// ```
/// use semantic_summary::word_weight;
/// assert_eq!(word_weight(2, 2, 2, 2, 0.0), 1.0);
/// assert_eq!(word_weight(2, 2, 2, 2, 1.0), 0.0);
/// assert_eq!(word_weight(1, 1, 0, 0, 0.5), 0.0);
/// ```
pub fn word_weight(
    selected_count: u32,
    network_count: u32,
    total_selected: usize,
    total_network: usize,
    net_weight_factor: f64,
) -> f64 {
    let selected = fraction(selected_count, total_selected);
    let network = fraction(network_count, total_network).min(1.0);
    (selected * (1.0 - net_weight_factor * network)).max(0.0)
}

/// Builds the weighted word list for every selected word seen in at least
/// `min_occurrence` entities, in display order. Font sizes and clusters are
/// left for later stages.
pub fn rank_words(
    selected: &PopulationCounts,
    network: &PopulationCounts,
    min_occurrence: usize,
    net_weight_factor: f64,
) -> Vec<WordInfo> {
    let mut words: Vec<WordInfo> = selected
        .word_counts
        .iter()
        .filter(|&(_, &count)| count as usize >= min_occurrence)
        .map(|(key, &selected_count)| {
            let network_count = network.word_count(key);
            WordInfo {
                word: selected.display_form(key).to_string(),
                key: key.clone(),
                selected_count,
                network_count,
                weight: word_weight(
                    selected_count,
                    network_count,
                    selected.total_entities,
                    network.total_entities,
                    net_weight_factor,
                ),
                font_size: MIN_FONT_SIZE,
                cluster: None,
            }
        })
        .collect();
    words.sort_by(WordInfo::display_cmp);
    words
}

/// Scales weights linearly onto `[MIN_FONT_SIZE, MAX_FONT_SIZE]` across the
/// given list. Equal weights all get the largest size.
pub fn assign_font_sizes(words: &mut [WordInfo]) {
    let (min, max) = words.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), w| {
        (lo.min(w.weight), hi.max(w.weight))
    });
    let span = max - min;
    let range = f64::from(MAX_FONT_SIZE - MIN_FONT_SIZE);
    for word in words.iter_mut() {
        word.font_size = if span > 0.0 {
            MIN_FONT_SIZE + ((word.weight - min) / span * range).round() as u32
        } else {
            MAX_FONT_SIZE
        };
    }
}
