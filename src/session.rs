//! Persisted state handed to (and received from) the host's session writer.
//! The on-disk format is the host's business; these types only fix the
//! fields and derive serde.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::cloud::{Cloud, CloudParams, DisplayStyle};
use crate::config::{check_attribute_names, check_cluster_cutoff, check_net_weight_factor};
use crate::entity::EntityId;
use crate::error::{Error, Result};
use crate::filter::{FilterConfig, StemLang, TextFilter};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSnapshot {
    pub key: String,
    pub uid: u32,
    pub stemming: bool,
    #[serde(default)]
    pub stem_lang: StemLang,
    pub cloud_counter: u32,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub clouds: Vec<CloudSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudSnapshot {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_names: Option<Vec<String>>,
    pub max_words: usize,
    pub min_word_occurrence: usize,
    pub cluster_cutoff: f64,
    pub net_weight_factor: f64,
    pub display_style: DisplayStyle,
    pub selection: Vec<EntityId>,
}

/// A cloud rebuilt from a snapshot, parameters already checked.
pub(crate) struct RestoredCloud {
    pub name: String,
    pub params: CloudParams,
    pub selection: BTreeSet<EntityId>,
}

/// Everything a restored collection is built from. Producing one touches no
/// live state.
pub(crate) struct RestorePlan {
    pub filter: TextFilter,
    pub cloud_counter: u32,
    pub clouds: Vec<RestoredCloud>,
}

impl CollectionSnapshot {
    /// Checks every saved value. The first invalid one is reported and
    /// nothing is built.
    pub(crate) fn plan(&self) -> Result<RestorePlan> {
        let mut filter = TextFilter::with_config(self.filter.clone())?;
        filter.set_stemming(self.stemming);
        filter.set_stem_lang(self.stem_lang);

        let mut names = HashSet::new();
        let mut clouds = Vec::with_capacity(self.clouds.len());
        for cloud in &self.clouds {
            if !names.insert(cloud.name.as_str()) {
                return Err(Error::DuplicateCloudName(cloud.name.clone()));
            }
            clouds.push(RestoredCloud {
                name: cloud.name.clone(),
                params: cloud.params()?,
                selection: cloud.selection.iter().copied().collect(),
            });
        }
        Ok(RestorePlan {
            filter,
            cloud_counter: self.cloud_counter.max(1),
            clouds,
        })
    }
}

impl CloudSnapshot {
    pub fn of(cloud: &Cloud) -> Self {
        let params = cloud.params();
        CloudSnapshot {
            name: cloud.name(),
            attribute_names: params.attribute_names,
            max_words: params.max_words,
            min_word_occurrence: params.min_word_occurrence,
            cluster_cutoff: params.cluster_cutoff,
            net_weight_factor: params.net_weight_factor,
            display_style: params.display_style,
            selection: cloud.selection(),
        }
    }

    /// The saved parameters, run through the same checks as the setters.
    pub fn params(&self) -> Result<CloudParams> {
        if let Some(names) = &self.attribute_names {
            check_attribute_names(names)?;
        }
        Ok(CloudParams {
            attribute_names: self.attribute_names.clone(),
            max_words: self.max_words,
            min_word_occurrence: self.min_word_occurrence,
            cluster_cutoff: check_cluster_cutoff(self.cluster_cutoff)?,
            net_weight_factor: check_net_weight_factor(self.net_weight_factor)?,
            display_style: self.display_style,
        })
    }
}
