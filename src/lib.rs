#![forbid(unsafe_code)]
//! # Semantic Summary
//!
//! Computes ranked, clustered word clouds that describe a selected subset of
//! entities against the collection they belong to.
//!
//! Pipeline, per cloud:
//! 1. [`TextFilter`] splits each text attribute into normalized words
//!    (delimiters, stop words, optional number filter, optional stemming).
//! 2. [`count_population`] counts, per entity, which words and adjacent word
//!    pairs occur, once for the selection and once for the whole collection.
//! 3. [`word_weight`] turns both counts into a display weight, blending the
//!    collection baseline in by the cloud's net weight factor.
//! 4. [`cluster_words`] joins words that appear next to each other more often
//!    than chance into clusters.
//!
//! A [`Cloud`] caches its result and recomputes lazily, rerunning only the
//! stages its parameter changes invalidated.
//!
//! ## Example
//! ```
//! use semantic_summary::{Engine, Entity, EntityId};
//!
//! let engine = Engine::default();
//! let net = engine.add_collection("network").unwrap();
//! net.register_entity_set([
//!     (EntityId(1), Entity::new().with("label", "red car")),
//!     (EntityId(2), Entity::new().with("label", "red truck")),
//!     (EntityId(3), Entity::new().with("label", "blue boat")),
//! ])
//! .unwrap();
//!
//! let cloud = net.create_cloud(None, [EntityId(1), EntityId(2)]).unwrap();
//! cloud.set_min_word_occurrence(1).unwrap();
//! cloud.set_net_weight_factor(0.0).unwrap();
//!
//! let words = cloud.word_infos().unwrap();
//! assert_eq!(words[0].word, "red");
//! assert_eq!(words[0].selected_count, 2);
//! ```

pub mod cloud;
pub mod cluster;
pub mod collection;
pub mod config;
pub mod counter;
pub mod engine;
pub mod entity;
pub mod error;
pub mod events;
pub mod export;
pub mod filter;
pub mod session;
pub mod weight;

pub use cloud::{Cloud, CloudParams, DirtyMask, DisplayStyle};
pub use cluster::{Cluster, WordPair, cluster_words, group_clusters, pair_score, scored_pairs};
pub use collection::{CLOUD_NAME_PREFIX, Collection};
pub use config::CloudDefaults;
pub use counter::{PairKey, PopulationCounts, count_population};
pub use engine::Engine;
pub use entity::{AttributeValue, Entity, EntityId, EntityTable};
pub use error::{ConfigError, Error, Result, ValidationError};
pub use events::{ListenerId, ModelEvent};
pub use export::{ExportFormat, csv_safe_cell, export_words, render_txt};
pub use filter::{FilterConfig, StemLang, TextFilter, Token, Tokenizer, is_number};
pub use session::{CloudSnapshot, CollectionSnapshot};
pub use weight::{
    MAX_FONT_SIZE, MIN_FONT_SIZE, WordInfo, assign_font_sizes, rank_words, word_weight,
};
