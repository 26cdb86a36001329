//! Cloud state machine.
//!
//! A cloud caches its word list and tracks what has gone stale in a
//! [`DirtyMask`]. Setters only mark bits; the work happens on the next read,
//! which reruns just the stages the mask requires:
//!
//! | bit         | set by                                   | reruns                      |
//! |-------------|------------------------------------------|-----------------------------|
//! | `SELECTION` | selection update                         | counts, ratios, clusters    |
//! | `COUNTS`    | attributes, filter, stemming, entities   | counts, ratios, clusters    |
//! | `RATIOS`    | net weight factor, min occurrence        | ratios, clusters            |
//! | `CLUSTERS`  | cutoff, display style, max words         | clusters                    |
//!
//! Every invalidation bumps a generation counter. A recompute remembers the
//! generation it started from and is thrown away if the cloud changed before
//! it finished.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::cluster::{Cluster, cluster_words, group_clusters};
use crate::collection::{Collection, SourceSnapshot};
use crate::config::{
    CloudDefaults, check_attribute_names, check_cluster_cutoff, check_net_weight_factor,
};
use crate::counter::{PopulationCounts, count_population};
use crate::entity::EntityId;
use crate::error::{Error, Result, ValidationError};
use crate::weight::{WordInfo, assign_font_sizes, rank_words};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayStyle {
    /// Words ranked by weight only.
    NoClustering,
    #[default]
    ClusteredStandard,
    ClusteredBoxes,
}

impl DisplayStyle {
    pub fn is_clustered(self) -> bool {
        !matches!(self, DisplayStyle::NoClustering)
    }

    fn as_str(self) -> &'static str {
        match self {
            DisplayStyle::NoClustering => "no-clustering",
            DisplayStyle::ClusteredStandard => "clustered-standard",
            DisplayStyle::ClusteredBoxes => "clustered-boxes",
        }
    }
}

impl fmt::Display for DisplayStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisplayStyle {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "no-clustering" | "none" => Ok(DisplayStyle::NoClustering),
            "clustered-standard" | "clustered" => Ok(DisplayStyle::ClusteredStandard),
            "clustered-boxes" | "boxes" => Ok(DisplayStyle::ClusteredBoxes),
            _ => Err(ValidationError::UnknownDisplayStyle(s.to_string())),
        }
    }
}

/// Which cached stages of a cloud are stale.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirtyMask(u8);

impl DirtyMask {
    pub const CLEAN: DirtyMask = DirtyMask(0);
    pub const COUNTS: DirtyMask = DirtyMask(1);
    pub const RATIOS: DirtyMask = DirtyMask(1 << 1);
    pub const SELECTION: DirtyMask = DirtyMask(1 << 2);
    pub const CLUSTERS: DirtyMask = DirtyMask(1 << 3);
    pub const ALL: DirtyMask = DirtyMask(0b1111);

    pub fn is_clean(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: DirtyMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: DirtyMask) -> bool {
        self.0 & other.0 != 0
    }

    fn needs_counts(self) -> bool {
        self.intersects(DirtyMask::COUNTS | DirtyMask::SELECTION)
    }

    fn needs_ratios(self) -> bool {
        self.needs_counts() || self.contains(DirtyMask::RATIOS)
    }
}

impl BitOr for DirtyMask {
    type Output = DirtyMask;

    fn bitor(self, rhs: DirtyMask) -> DirtyMask {
        DirtyMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for DirtyMask {
    fn bitor_assign(&mut self, rhs: DirtyMask) {
        self.0 |= rhs.0;
    }
}

/// User-tunable parameters of one cloud.
#[derive(Debug, Clone, PartialEq)]
pub struct CloudParams {
    /// `None` reads every text attribute of the collection.
    pub attribute_names: Option<Vec<String>>,
    pub max_words: usize,
    pub min_word_occurrence: usize,
    pub cluster_cutoff: f64,
    pub net_weight_factor: f64,
    pub display_style: DisplayStyle,
}

impl From<&CloudDefaults> for CloudParams {
    fn from(defaults: &CloudDefaults) -> Self {
        CloudParams {
            attribute_names: None,
            max_words: defaults.max_words,
            min_word_occurrence: defaults.min_word_occurrence,
            cluster_cutoff: defaults.cluster_cutoff,
            net_weight_factor: defaults.net_weight_factor,
            display_style: defaults.display_style,
        }
    }
}

/// Selected and baseline counts for one attribute list and filter.
#[derive(Debug)]
struct CountCache {
    selected: PopulationCounts,
    network: PopulationCounts,
}

struct CloudState {
    name: String,
    params: CloudParams,
    selection: Arc<BTreeSet<EntityId>>,
    dirty: DirtyMask,
    generation: u64,
    counts: Option<Arc<CountCache>>,
    ranked: Option<Arc<Vec<WordInfo>>>,
    words: Arc<[WordInfo]>,
    destroyed: bool,
}

impl CloudState {
    fn mark(&mut self, mask: DirtyMask) {
        if mask.is_clean() {
            return;
        }
        self.dirty |= mask;
        self.generation += 1;
    }
}

/// Inputs of one recompute, captured under the state lock.
struct RecomputeJob {
    generation: u64,
    dirty: DirtyMask,
    params: CloudParams,
    selection: Arc<BTreeSet<EntityId>>,
    counts: Option<Arc<CountCache>>,
    ranked: Option<Arc<Vec<WordInfo>>>,
}

enum Pending {
    Clean(Arc<[WordInfo]>),
    Job(RecomputeJob),
}

struct RecomputeOutput {
    counts: Arc<CountCache>,
    ranked: Arc<Vec<WordInfo>>,
    words: Arc<[WordInfo]>,
}

impl RecomputeJob {
    fn run(self, source: &SourceSnapshot) -> RecomputeOutput {
        let attribute_names = self
            .params
            .attribute_names
            .as_ref()
            .unwrap_or(&*source.attribute_names);

        let counts = match self.counts {
            Some(counts) if !self.dirty.needs_counts() => counts,
            _ => Arc::new(CountCache {
                selected: count_population(
                    &source.entities,
                    &self.selection,
                    attribute_names,
                    &source.filter,
                ),
                network: count_population(
                    &source.entities,
                    &source.members,
                    attribute_names,
                    &source.filter,
                ),
            }),
        };

        let ranked = match self.ranked {
            Some(ranked) if !self.dirty.needs_ratios() => ranked,
            _ => Arc::new(rank_words(
                &counts.selected,
                &counts.network,
                self.params.min_word_occurrence,
                self.params.net_weight_factor,
            )),
        };

        let mut words: Vec<WordInfo> = ranked.as_ref().clone();
        if self.params.display_style.is_clustered() {
            cluster_words(&mut words, &counts.selected, self.params.cluster_cutoff);
        }
        words.truncate(self.params.max_words);
        assign_font_sizes(&mut words);

        RecomputeOutput {
            counts,
            ranked,
            words: words.into(),
        }
    }
}

/// One named word cloud over a selection of a collection's entities.
pub struct Cloud {
    collection: Weak<Collection>,
    is_null: bool,
    state: Mutex<CloudState>,
    // one recompute at a time; readers of `cached_word_infos` never wait on it
    recompute: Mutex<()>,
    recomputes: AtomicU64,
}

impl fmt::Debug for Cloud {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Cloud")
            .field("name", &state.name)
            .field("is_null", &self.is_null)
            .field("dirty", &state.dirty)
            .field("generation", &state.generation)
            .finish()
    }
}

impl Cloud {
    pub(crate) fn new(
        collection: Weak<Collection>,
        name: String,
        params: CloudParams,
        selection: BTreeSet<EntityId>,
        is_null: bool,
    ) -> Self {
        Cloud {
            collection,
            is_null,
            state: Mutex::new(CloudState {
                name,
                params,
                selection: Arc::new(selection),
                dirty: DirtyMask::ALL,
                generation: 0,
                counts: None,
                ranked: None,
                words: Arc::from(Vec::new()),
                destroyed: false,
            }),
            recompute: Mutex::new(()),
            recomputes: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> String {
        self.state.lock().name.clone()
    }

    /// True for the cloud that follows a collection's live selection.
    pub fn is_null(&self) -> bool {
        self.is_null
    }

    pub fn collection(&self) -> Result<Arc<Collection>> {
        self.collection
            .upgrade()
            .ok_or_else(|| Error::Destroyed(format!("collection of cloud {:?}", self.name())))
    }

    pub fn params(&self) -> CloudParams {
        self.state.lock().params.clone()
    }

    /// The attributes words are read from, resolving the default to every
    /// text attribute of the collection.
    pub fn attribute_names(&self) -> Vec<String> {
        if let Some(names) = &self.state.lock().params.attribute_names {
            return names.clone();
        }
        self.collection
            .upgrade()
            .map(|c| c.attribute_names())
            .unwrap_or_default()
    }

    pub fn selection(&self) -> Vec<EntityId> {
        self.state.lock().selection.iter().copied().collect()
    }

    pub fn dirty(&self) -> DirtyMask {
        self.state.lock().dirty
    }

    pub fn is_clean(&self) -> bool {
        self.dirty().is_clean()
    }

    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Number of recomputes committed so far.
    pub fn recompute_count(&self) -> u64 {
        self.recomputes.load(Ordering::Relaxed)
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }

    /// Applies `update` to the live state and marks `mask` if it reports a
    /// change.
    fn update<F>(&self, mask: DirtyMask, update: F) -> Result<()>
    where
        F: FnOnce(&mut CloudState) -> std::result::Result<bool, ValidationError>,
    {
        let mut state = self.state.lock();
        if state.destroyed {
            return Err(Error::Destroyed(format!("cloud {:?}", state.name)));
        }
        if update(&mut state)? {
            state.mark(mask);
        }
        Ok(())
    }

    pub fn set_attribute_names<I, S>(&self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        check_attribute_names(&names)?;
        self.update(DirtyMask::COUNTS | DirtyMask::RATIOS, |state| {
            let changed = state.params.attribute_names.as_ref() != Some(&names);
            state.params.attribute_names = Some(names);
            Ok(changed)
        })
    }

    pub fn set_max_words(&self, max_words: usize) -> Result<()> {
        self.update(DirtyMask::CLUSTERS, |state| {
            let changed = state.params.max_words != max_words;
            state.params.max_words = max_words;
            Ok(changed)
        })
    }

    pub fn set_min_word_occurrence(&self, min: usize) -> Result<()> {
        self.update(DirtyMask::RATIOS, |state| {
            let changed = state.params.min_word_occurrence != min;
            state.params.min_word_occurrence = min;
            Ok(changed)
        })
    }

    pub fn set_cluster_cutoff(&self, cutoff: f64) -> Result<()> {
        self.update(DirtyMask::CLUSTERS, |state| {
            let cutoff = check_cluster_cutoff(cutoff)?;
            let changed = state.params.cluster_cutoff != cutoff;
            state.params.cluster_cutoff = cutoff;
            Ok(changed)
        })
    }

    pub fn set_net_weight_factor(&self, factor: f64) -> Result<()> {
        self.update(DirtyMask::RATIOS, |state| {
            let factor = check_net_weight_factor(factor)?;
            let changed = state.params.net_weight_factor != factor;
            state.params.net_weight_factor = factor;
            Ok(changed)
        })
    }

    pub fn set_display_style(&self, style: DisplayStyle) -> Result<()> {
        self.update(DirtyMask::CLUSTERS, |state| {
            let changed = state.params.display_style != style;
            state.params.display_style = style;
            Ok(changed)
        })
    }

    /// Replaces the selected entities with `ids` (the current selection).
    pub fn update_selection<I>(&self, ids: I) -> Result<()>
    where
        I: IntoIterator<Item = EntityId>,
    {
        let selection: BTreeSet<EntityId> = ids.into_iter().collect();
        self.update(
            DirtyMask::SELECTION | DirtyMask::COUNTS | DirtyMask::RATIOS,
            |state| {
                let changed = *state.selection != selection;
                state.selection = Arc::new(selection);
                Ok(changed)
            },
        )
    }

    /// Forces a full recompute on the next read.
    pub fn invalidate(&self) -> Result<()> {
        self.update(DirtyMask::ALL, |_| Ok(true))
    }

    pub(crate) fn mark(&self, mask: DirtyMask) {
        let mut state = self.state.lock();
        if !state.destroyed {
            state.mark(mask);
        }
    }

    pub(crate) fn rename(&self, name: String) {
        self.state.lock().name = name;
    }

    pub(crate) fn destroy(&self) {
        let mut state = self.state.lock();
        state.destroyed = true;
        state.counts = None;
        state.ranked = None;
        state.words = Arc::from(Vec::new());
    }

    /// The last committed word list, without recomputing.
    pub fn cached_word_infos(&self) -> Arc<[WordInfo]> {
        Arc::clone(&self.state.lock().words)
    }

    /// The current word list in display order, recomputing stale stages
    /// first. Repeated calls without an intervening change return the same
    /// list without recomputing.
    pub fn word_infos(&self) -> Result<Arc<[WordInfo]>> {
        if let Some(words) = self.clean_words()? {
            return Ok(words);
        }
        let _recompute = self.recompute.lock();
        loop {
            let job = match self.pending()? {
                Pending::Clean(words) => return Ok(words),
                Pending::Job(job) => job,
            };
            let source = self.collection()?.source_snapshot();
            let (generation, dirty) = (job.generation, job.dirty);
            let output = job.run(&source);
            if let Some(words) = self.commit(generation, dirty, output)? {
                return Ok(words);
            }
        }
    }

    fn clean_words(&self) -> Result<Option<Arc<[WordInfo]>>> {
        let state = self.state.lock();
        if state.destroyed {
            return Err(Error::Destroyed(format!("cloud {:?}", state.name)));
        }
        Ok(state.dirty.is_clean().then(|| Arc::clone(&state.words)))
    }

    /// Captures the inputs of the next recompute, or the cached list if
    /// nothing is stale.
    fn pending(&self) -> Result<Pending> {
        let state = self.state.lock();
        if state.destroyed {
            return Err(Error::Destroyed(format!("cloud {:?}", state.name)));
        }
        if state.dirty.is_clean() {
            return Ok(Pending::Clean(Arc::clone(&state.words)));
        }
        Ok(Pending::Job(RecomputeJob {
            generation: state.generation,
            dirty: state.dirty,
            params: state.params.clone(),
            selection: Arc::clone(&state.selection),
            counts: state.counts.clone(),
            ranked: state.ranked.clone(),
        }))
    }

    /// Installs `output` if the cloud is still at `generation`. Returns
    /// `None` when a change arrived in the meantime and the output was
    /// dropped.
    fn commit(
        &self,
        generation: u64,
        dirty: DirtyMask,
        output: RecomputeOutput,
    ) -> Result<Option<Arc<[WordInfo]>>> {
        let mut state = self.state.lock();
        if state.destroyed {
            return Err(Error::Destroyed(format!("cloud {:?}", state.name)));
        }
        if state.generation != generation {
            warn!(
                "Discarding stale recompute - cloud={:?}, started_at={}, now={}",
                state.name, generation, state.generation
            );
            return Ok(None);
        }
        state.counts = Some(output.counts);
        state.ranked = Some(output.ranked);
        state.words = output.words;
        state.dirty = DirtyMask::CLEAN;
        self.recomputes.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Recomputed cloud - name={:?}, dirty={:?}, words={}, generation={}",
            state.name,
            dirty,
            state.words.len(),
            generation
        );
        Ok(Some(Arc::clone(&state.words)))
    }

    /// Cluster id of `word`, if it is in the current word list and
    /// clustering is enabled. `word` may be the displayed form in any case
    /// or anything the collection's filter normalizes to the same key, so
    /// `Running` finds `run` when stemming is on.
    pub fn cluster_assignment(&self, word: &str) -> Result<Option<usize>> {
        let words = self.word_infos()?;
        let lower = word.to_lowercase();
        let key = self
            .collection()?
            .source_snapshot()
            .filter
            .tokenize(word)
            .into_iter()
            .next()
            .map(|token| token.key);
        Ok(words
            .iter()
            .find(|w| {
                w.key == lower
                    || w.word.to_lowercase() == lower
                    || key.as_deref() == Some(w.key.as_str())
            })
            .and_then(|w| w.cluster))
    }

    /// The current clusters in display order. Empty without clustering.
    pub fn clusters(&self) -> Result<Vec<Cluster>> {
        Ok(group_clusters(&self.word_infos()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::entity::Entity;

    #[test]
    fn mask_algebra() {
        let mask = DirtyMask::COUNTS | DirtyMask::RATIOS;
        assert!(mask.contains(DirtyMask::COUNTS));
        assert!(!mask.contains(DirtyMask::SELECTION));
        assert!(mask.intersects(DirtyMask::RATIOS | DirtyMask::CLUSTERS));
        assert!(mask.needs_counts());
        assert!(DirtyMask::RATIOS.needs_ratios());
        assert!(!DirtyMask::CLUSTERS.needs_ratios());
        assert!(DirtyMask::CLEAN.is_clean());
        assert!(DirtyMask::ALL.contains(mask | DirtyMask::SELECTION | DirtyMask::CLUSTERS));
    }

    #[test]
    fn display_style_parsing() {
        assert_eq!(
            "no-clustering".parse::<DisplayStyle>(),
            Ok(DisplayStyle::NoClustering)
        );
        assert_eq!(
            " Clustered-Boxes ".parse::<DisplayStyle>(),
            Ok(DisplayStyle::ClusteredBoxes)
        );
        assert_eq!(
            "spiral".parse::<DisplayStyle>(),
            Err(ValidationError::UnknownDisplayStyle("spiral".into()))
        );
        assert_eq!(DisplayStyle::ClusteredStandard.to_string(), "clustered-standard");
    }

    #[test]
    fn state_mark_bumps_generation_once_per_change() {
        let cloud = Cloud::new(
            Weak::new(),
            "c".into(),
            CloudParams::from(&CloudDefaults::default()),
            BTreeSet::new(),
            false,
        );
        let start = cloud.generation();
        cloud.set_max_words(10).unwrap();
        cloud.set_max_words(10).unwrap();
        assert_eq!(cloud.generation(), start + 1);
    }

    #[test]
    fn rejected_values_leave_state_unchanged() {
        let cloud = Cloud::new(
            Weak::new(),
            "c".into(),
            CloudParams::from(&CloudDefaults::default()),
            BTreeSet::new(),
            false,
        );
        let before = cloud.params();
        let generation = cloud.generation();
        assert!(cloud.set_net_weight_factor(1.2).is_err());
        assert!(cloud.set_cluster_cutoff(-1.0).is_err());
        assert!(cloud.set_attribute_names(["a", "a"]).is_err());
        assert_eq!(cloud.params(), before);
        assert_eq!(cloud.generation(), generation);
    }

    fn red_car_cloud() -> (Arc<Collection>, Arc<Cloud>) {
        let net = Engine::default().add_collection("net").unwrap();
        net.register_entity_set([(EntityId(1), Entity::new().with("label", "red car"))])
            .unwrap();
        let cloud = net.create_cloud(None, [EntityId(1)]).unwrap();
        cloud.set_min_word_occurrence(1).unwrap();
        (net, cloud)
    }

    #[test]
    fn stale_commit_is_discarded() {
        let (net, cloud) = red_car_cloud();

        let Pending::Job(job) = cloud.pending().unwrap() else {
            panic!("new cloud should be dirty");
        };
        let generation = job.generation;
        let output = job.run(&net.source_snapshot());

        cloud.set_net_weight_factor(0.5).unwrap();
        assert!(cloud.commit(generation, DirtyMask::ALL, output).unwrap().is_none());
        assert!(cloud.dirty().contains(DirtyMask::RATIOS));
        assert_eq!(cloud.recompute_count(), 0);
        assert!(cloud.cached_word_infos().is_empty());

        let words = cloud.word_infos().unwrap();
        assert_eq!(words.len(), 2);
        assert_eq!(cloud.recompute_count(), 1);
        assert!(cloud.is_clean());
    }

    #[test]
    fn current_commit_is_installed() {
        let (net, cloud) = red_car_cloud();

        let Pending::Job(job) = cloud.pending().unwrap() else {
            panic!("new cloud should be dirty");
        };
        let generation = job.generation;
        let output = job.run(&net.source_snapshot());
        let words = cloud.commit(generation, DirtyMask::ALL, output).unwrap().unwrap();
        assert_eq!(words.len(), 2);
        assert!(matches!(cloud.pending().unwrap(), Pending::Clean(_)));
    }

    #[test]
    fn orphaned_cloud_read_fails() {
        let cloud = Cloud::new(
            Weak::new(),
            "c".into(),
            CloudParams::from(&CloudDefaults::default()),
            BTreeSet::new(),
            false,
        );
        assert!(matches!(cloud.word_infos(), Err(Error::Destroyed(_))));
    }
}
