//! Collections: the entity universe a set of clouds is computed against,
//! plus the text filter those clouds share.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use log::info;
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;

use crate::cloud::{Cloud, CloudParams, DirtyMask};
use crate::config::CloudDefaults;
use crate::entity::{AttributeValue, Entity, EntityId, EntityTable};
use crate::error::{Error, Result};
use crate::events::{Listeners, ModelEvent};
use crate::filter::{FilterConfig, StemLang, TextFilter};
use crate::session::{CloudSnapshot, CollectionSnapshot, RestorePlan, RestoredCloud};

pub const CLOUD_NAME_PREFIX: &str = "Cloud ";

/// Read-only view of a collection taken at the start of a recompute.
pub(crate) struct SourceSnapshot {
    pub entities: Arc<EntityTable>,
    pub members: Arc<BTreeSet<EntityId>>,
    pub filter: Arc<TextFilter>,
    pub attribute_names: Arc<Vec<String>>,
}

struct CollectionData {
    entities: Arc<EntityTable>,
    members: Arc<BTreeSet<EntityId>>,
    attribute_names: Arc<Vec<String>>,
    filter: Arc<TextFilter>,
    cloud_counter: u32,
}

impl CollectionData {
    fn new(filter: TextFilter, cloud_counter: u32) -> Self {
        CollectionData {
            entities: Arc::new(EntityTable::new()),
            members: Arc::new(BTreeSet::new()),
            attribute_names: Arc::new(Vec::new()),
            filter: Arc::new(filter),
            cloud_counter,
        }
    }

    fn set_entities(&mut self, entities: EntityTable) {
        let names: BTreeSet<&str> = entities.values().flat_map(Entity::attribute_names).collect();
        self.attribute_names = Arc::new(names.into_iter().map(String::from).collect());
        self.members = Arc::new(entities.keys().copied().collect());
        self.entities = Arc::new(entities);
    }
}

/// Entities, text filter and clouds of one network.
///
/// Created through [`crate::Engine`]; clouds keep a weak reference back to
/// the collection that owns them.
pub struct Collection {
    key: String,
    uid: u32,
    this: Weak<Collection>,
    defaults: CloudDefaults,
    listeners: Arc<Listeners>,
    data: RwLock<CollectionData>,
    clouds: Mutex<Vec<Arc<Cloud>>>,
    null_cloud: OnceLock<Arc<Cloud>>,
    destroyed: AtomicBool,
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("key", &self.key)
            .field("uid", &self.uid)
            .field("entities", &self.data.read().entities.len())
            .finish()
    }
}

impl Collection {
    pub(crate) fn new(
        key: String,
        uid: u32,
        defaults: CloudDefaults,
        listeners: Arc<Listeners>,
    ) -> Arc<Self> {
        let data = CollectionData::new(TextFilter::default(), 1);
        Collection::assemble(key, uid, defaults, listeners, data, Vec::new())
    }

    /// Builds a collection from a checked session plan. No events fire.
    pub(crate) fn restored(
        key: String,
        uid: u32,
        defaults: CloudDefaults,
        listeners: Arc<Listeners>,
        plan: RestorePlan,
        entities: EntityTable,
    ) -> Arc<Self> {
        let mut clouds = plan.clouds;
        for cloud in &mut clouds {
            cloud.selection.retain(|id| entities.contains_key(id));
        }
        let mut data = CollectionData::new(plan.filter, plan.cloud_counter);
        data.set_entities(entities);
        Collection::assemble(key, uid, defaults, listeners, data, clouds)
    }

    fn assemble(
        key: String,
        uid: u32,
        defaults: CloudDefaults,
        listeners: Arc<Listeners>,
        data: CollectionData,
        clouds: Vec<RestoredCloud>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| {
            let clouds = clouds
                .into_iter()
                .map(|c| Arc::new(Cloud::new(this.clone(), c.name, c.params, c.selection, false)))
                .collect();
            Collection {
                key,
                uid,
                this: this.clone(),
                defaults,
                listeners,
                data: RwLock::new(data),
                clouds: Mutex::new(clouds),
                null_cloud: OnceLock::new(),
                destroyed: AtomicBool::new(false),
            }
        })
    }

    /// Host-assigned key this collection is registered under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Engine-unique identifier, persisted with sessions.
    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::Destroyed(format!("collection {:?}", self.key)));
        }
        Ok(())
    }

    pub(crate) fn source_snapshot(&self) -> SourceSnapshot {
        let data = self.data.read();
        SourceSnapshot {
            entities: Arc::clone(&data.entities),
            members: Arc::clone(&data.members),
            filter: Arc::clone(&data.filter),
            attribute_names: Arc::clone(&data.attribute_names),
        }
    }

    // ---- entities ----

    /// Replaces the collection's members. Every cloud recounts on its next read.
    pub fn register_entity_set<I>(&self, entities: I) -> Result<()>
    where
        I: IntoIterator<Item = (EntityId, Entity)>,
    {
        self.ensure_alive()?;
        let table: EntityTable = entities.into_iter().collect();
        let len = table.len();
        self.data.write().set_entities(table);
        info!("Registered entity set - collection={:?}, entities={}", self.key, len);
        self.modified();
        Ok(())
    }

    /// Drops entities from the collection. Selections that still name them
    /// simply stop counting them.
    pub fn remove_entities<I>(&self, ids: I) -> Result<()>
    where
        I: IntoIterator<Item = EntityId>,
    {
        self.ensure_alive()?;
        let ids: HashSet<EntityId> = ids.into_iter().collect();
        {
            let mut data = self.data.write();
            let mut table = data.entities.as_ref().clone();
            let before = table.len();
            table.retain(|id, _| !ids.contains(id));
            if table.len() == before {
                return Ok(());
            }
            data.set_entities(table);
        }
        self.modified();
        Ok(())
    }

    pub fn entities(&self) -> Vec<EntityId> {
        self.data.read().members.iter().copied().collect()
    }

    pub fn entity(&self, id: EntityId) -> Option<Entity> {
        self.data.read().entities.get(&id).cloned()
    }

    pub fn attribute_value(&self, id: EntityId, attribute: &str) -> Option<AttributeValue> {
        self.data.read().entities.get(&id)?.get(attribute).cloned()
    }

    /// Every text attribute present on at least one entity, sorted.
    pub fn attribute_names(&self) -> Vec<String> {
        self.data.read().attribute_names.as_ref().clone()
    }

    // ---- text filter ----

    pub fn filter_config(&self) -> FilterConfig {
        self.data.read().filter.config().clone()
    }

    /// Replaces delimiters, excluded words and the numeric filter. An invalid
    /// configuration is rejected and the current one kept.
    pub fn set_filter_config(&self, config: FilterConfig) -> Result<()> {
        self.ensure_alive()?;
        self.update_filter(|filter| {
            if *filter.config() == config {
                return Ok(false);
            }
            filter.set_config(config)?;
            Ok(true)
        })
    }

    pub fn stemming(&self) -> bool {
        self.data.read().filter.stemming()
    }

    pub fn set_stemming(&self, stemming: bool) -> Result<()> {
        self.ensure_alive()?;
        self.update_filter(|filter| {
            let changed = filter.stemming() != stemming;
            filter.set_stemming(stemming);
            Ok(changed)
        })
    }

    pub fn stem_lang(&self) -> StemLang {
        self.data.read().filter.stem_lang()
    }

    pub fn set_stem_lang(&self, lang: StemLang) -> Result<()> {
        self.ensure_alive()?;
        self.update_filter(|filter| {
            let changed = filter.stem_lang() != lang;
            filter.set_stem_lang(lang);
            Ok(changed)
        })
    }

    fn update_filter<F>(&self, update: F) -> Result<()>
    where
        F: FnOnce(&mut TextFilter) -> Result<bool>,
    {
        {
            let mut data = self.data.write();
            let mut filter = data.filter.as_ref().clone();
            if !update(&mut filter)? {
                return Ok(());
            }
            data.filter = Arc::new(filter);
        }
        self.modified();
        Ok(())
    }

    fn modified(&self) {
        self.mark_clouds(DirtyMask::COUNTS | DirtyMask::RATIOS);
        self.listeners.fire(&ModelEvent::CollectionModified {
            collection: self.key.clone(),
        });
    }

    fn mark_clouds(&self, mask: DirtyMask) {
        for cloud in self.clouds.lock().iter() {
            cloud.mark(mask);
        }
        if let Some(null_cloud) = self.null_cloud.get() {
            null_cloud.mark(mask);
        }
    }

    // ---- clouds ----

    pub fn cloud_counter(&self) -> u32 {
        self.data.read().cloud_counter
    }

    /// Next free default name (`Cloud 1`, `Cloud 2`, ...). The counter only
    /// moves forward; once it cannot advance, [`Error::Exhausted`] is
    /// returned and named clouds can still be created.
    pub fn next_cloud_name(&self) -> Result<String> {
        let clouds = self.clouds.lock();
        let mut data = self.data.write();
        loop {
            let counter = data.cloud_counter;
            data.cloud_counter = counter
                .checked_add(1)
                .ok_or(Error::Exhausted("default cloud names"))?;
            let name = format!("{CLOUD_NAME_PREFIX}{counter}");
            if !clouds.iter().any(|c| c.name() == name) {
                return Ok(name);
            }
        }
    }

    /// Creates a cloud over a fixed snapshot of `selection`. Without a name
    /// the next default name is used.
    pub fn create_cloud<I>(&self, name: Option<&str>, selection: I) -> Result<Arc<Cloud>>
    where
        I: IntoIterator<Item = EntityId>,
    {
        self.ensure_alive()?;
        let name = match name {
            Some(name) => name.to_string(),
            None => self.next_cloud_name()?,
        };
        let cloud = Arc::new(Cloud::new(
            self.this.clone(),
            name.clone(),
            CloudParams::from(&self.defaults),
            selection.into_iter().collect(),
            false,
        ));
        {
            let mut clouds = self.clouds.lock();
            if clouds.iter().any(|c| c.name() == name) {
                return Err(Error::DuplicateCloudName(name));
            }
            clouds.push(Arc::clone(&cloud));
        }
        info!("Created cloud - collection={:?}, cloud={:?}", self.key, name);
        self.listeners.fire(&ModelEvent::CloudAdded {
            collection: self.key.clone(),
            cloud: name,
        });
        Ok(cloud)
    }

    pub fn cloud(&self, name: &str) -> Option<Arc<Cloud>> {
        self.clouds.lock().iter().find(|c| c.name() == name).cloned()
    }

    /// Named clouds in creation order (the null cloud is not included).
    pub fn clouds(&self) -> Vec<Arc<Cloud>> {
        self.clouds.lock().clone()
    }

    pub fn rename_cloud(&self, old_name: &str, new_name: &str) -> Result<()> {
        self.ensure_alive()?;
        if old_name == new_name {
            return Ok(());
        }
        {
            let clouds = self.clouds.lock();
            if clouds.iter().any(|c| c.name() == new_name) {
                return Err(Error::DuplicateCloudName(new_name.to_string()));
            }
            let cloud = clouds
                .iter()
                .find(|c| c.name() == old_name)
                .ok_or_else(|| Error::UnknownCloud(old_name.to_string()))?;
            cloud.rename(new_name.to_string());
        }
        info!(
            "Renamed cloud - collection={:?}, from={:?}, to={:?}",
            self.key, old_name, new_name
        );
        self.listeners.fire(&ModelEvent::CloudRenamed {
            collection: self.key.clone(),
            old_name: old_name.to_string(),
            new_name: new_name.to_string(),
        });
        Ok(())
    }

    /// Removes and destroys a cloud; later calls on it fail with
    /// [`Error::Destroyed`].
    pub fn delete_cloud(&self, name: &str) -> Result<()> {
        let cloud = {
            let mut clouds = self.clouds.lock();
            let index = clouds
                .iter()
                .position(|c| c.name() == name)
                .ok_or_else(|| Error::UnknownCloud(name.to_string()))?;
            clouds.remove(index)
        };
        cloud.destroy();
        info!("Deleted cloud - collection={:?}, cloud={:?}", self.key, name);
        self.listeners.fire(&ModelEvent::CloudDeleted {
            collection: self.key.clone(),
            cloud: name.to_string(),
        });
        Ok(())
    }

    /// The cloud following the live selection, created on first use.
    pub fn null_cloud(&self) -> Arc<Cloud> {
        Arc::clone(self.null_cloud.get_or_init(|| {
            Arc::new(Cloud::new(
                self.this.clone(),
                String::new(),
                CloudParams::from(&self.defaults),
                BTreeSet::new(),
                true,
            ))
        }))
    }

    /// Points the null cloud at the host's current selection.
    pub fn set_live_selection<I>(&self, ids: I) -> Result<()>
    where
        I: IntoIterator<Item = EntityId>,
    {
        self.ensure_alive()?;
        self.null_cloud().update_selection(ids)
    }

    /// Brings every named cloud up to date, in parallel.
    pub fn refresh_clouds(&self) -> Result<()> {
        self.clouds()
            .par_iter()
            .try_for_each(|cloud| cloud.word_infos().map(drop))
    }

    pub(crate) fn destroy(&self) {
        self.destroyed.store(true, Ordering::Release);
        let clouds = std::mem::take(&mut *self.clouds.lock());
        for cloud in clouds {
            cloud.destroy();
        }
        if let Some(null_cloud) = self.null_cloud.get() {
            null_cloud.destroy();
        }
        info!("Destroyed collection - collection={:?}", self.key);
    }

    // ---- sessions ----

    pub fn snapshot(&self) -> CollectionSnapshot {
        let (stemming, stem_lang, cloud_counter, filter) = {
            let data = self.data.read();
            (
                data.filter.stemming(),
                data.filter.stem_lang(),
                data.cloud_counter,
                data.filter.config().clone(),
            )
        };
        CollectionSnapshot {
            key: self.key.clone(),
            uid: self.uid,
            stemming,
            stem_lang,
            cloud_counter,
            filter,
            clouds: self.clouds().iter().map(|c| CloudSnapshot::of(c)).collect(),
        }
    }
}
