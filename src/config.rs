//! Engine-wide defaults for newly created clouds.

use serde::{Deserialize, Serialize};

use crate::cloud::DisplayStyle;
use crate::error::{Error, ValidationError};

pub const DEFAULT_MAX_WORDS: usize = 40;
pub const DEFAULT_MIN_WORD_OCCURRENCE: usize = 40;
pub const DEFAULT_CLUSTER_CUTOFF: f64 = 20.0;
pub const DEFAULT_NET_WEIGHT_FACTOR: f64 = 1.0;

/// Parameters every new cloud starts from.
///
/// Missing fields fall back to their defaults when read from JSON:
/// ```
/// use semantic_summary::CloudDefaults;
/// let d = CloudDefaults::from_json_str(r#"{ "net_weight_factor": 0.25 }"#).unwrap();
/// assert_eq!(d.net_weight_factor, 0.25);
/// assert_eq!(d.max_words, 40);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudDefaults {
    pub max_words: usize,
    pub min_word_occurrence: usize,
    pub cluster_cutoff: f64,
    pub net_weight_factor: f64,
    pub display_style: DisplayStyle,
}

impl Default for CloudDefaults {
    fn default() -> Self {
        CloudDefaults {
            max_words: DEFAULT_MAX_WORDS,
            min_word_occurrence: DEFAULT_MIN_WORD_OCCURRENCE,
            cluster_cutoff: DEFAULT_CLUSTER_CUTOFF,
            net_weight_factor: DEFAULT_NET_WEIGHT_FACTOR,
            display_style: DisplayStyle::default(),
        }
    }
}

impl CloudDefaults {
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        let defaults: CloudDefaults = serde_json::from_str(json)?;
        defaults.validate()?;
        Ok(defaults)
    }

    /// Reports the first invalid field. Nothing is clamped here.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_cluster_cutoff(self.cluster_cutoff)?;
        check_net_weight_factor(self.net_weight_factor)?;
        Ok(())
    }
}

pub(crate) fn check_cluster_cutoff(value: f64) -> Result<f64, ValidationError> {
    if value.is_nan() {
        return Err(ValidationError::NotANumber {
            field: "cluster_cutoff",
        });
    }
    if value < 0.0 {
        return Err(ValidationError::OutOfRange {
            field: "cluster_cutoff",
            value,
            nearest: 0.0,
        });
    }
    Ok(value)
}

pub(crate) fn check_net_weight_factor(value: f64) -> Result<f64, ValidationError> {
    if value.is_nan() {
        return Err(ValidationError::NotANumber {
            field: "net_weight_factor",
        });
    }
    if !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::OutOfRange {
            field: "net_weight_factor",
            value,
            nearest: value.clamp(0.0, 1.0),
        });
    }
    Ok(value)
}

/// Rejects an attribute list that names the same attribute twice.
pub(crate) fn check_attribute_names(names: &[String]) -> Result<(), ValidationError> {
    let mut seen = std::collections::BTreeSet::new();
    match names.iter().find(|n| !seen.insert(n.as_str())) {
        Some(duplicate) => Err(ValidationError::DuplicateAttribute(duplicate.clone())),
        None => Ok(()),
    }
}
