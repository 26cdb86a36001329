//! The engine owns every collection the host has registered.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use log::info;
use parking_lot::Mutex;

use crate::collection::Collection;
use crate::config::CloudDefaults;
use crate::entity::{Entity, EntityId, EntityTable};
use crate::error::{Error, Result};
use crate::events::{ListenerId, Listeners, ModelEvent};
use crate::session::CollectionSnapshot;

/// Registry of collections keyed by the host's collection key.
///
/// There is no global instance: the host creates an engine and passes it
/// around.
pub struct Engine {
    defaults: CloudDefaults,
    listeners: Arc<Listeners>,
    // also serializes uid allocation
    collections: Mutex<BTreeMap<String, Arc<Collection>>>,
    null_collection: OnceLock<Arc<Collection>>,
}

impl Default for Engine {
    fn default() -> Self {
        Engine {
            defaults: CloudDefaults::default(),
            listeners: Arc::new(Listeners::default()),
            collections: Mutex::new(BTreeMap::new()),
            null_collection: OnceLock::new(),
        }
    }
}

impl Engine {
    /// Creates an engine whose new clouds start from `defaults`.
    pub fn new(defaults: CloudDefaults) -> Result<Self> {
        defaults.validate()?;
        Ok(Engine {
            defaults,
            ..Engine::default()
        })
    }

    pub fn defaults(&self) -> &CloudDefaults {
        &self.defaults
    }

    /// Returns the collection registered under `key`, creating it if needed.
    pub fn add_collection(&self, key: impl Into<String>) -> Result<Arc<Collection>> {
        let key = key.into();
        let mut collections = self.collections.lock();
        if let Some(existing) = collections.get(&key) {
            return Ok(Arc::clone(existing));
        }
        let uid = next_uid(collections.values().map(|c| c.uid()))?;
        let collection = Collection::new(
            key.clone(),
            uid,
            self.defaults.clone(),
            Arc::clone(&self.listeners),
        );
        collections.insert(key.clone(), Arc::clone(&collection));
        info!("Registered collection - key={:?}, uid={}", key, uid);
        Ok(collection)
    }

    pub fn collection(&self, key: &str) -> Option<Arc<Collection>> {
        self.collections.lock().get(key).cloned()
    }

    pub fn is_managed(&self, key: &str) -> bool {
        self.collections.lock().contains_key(key)
    }

    /// Registered collections ordered by key.
    pub fn collections(&self) -> Vec<Arc<Collection>> {
        self.collections.lock().values().cloned().collect()
    }

    /// Unregisters a collection and destroys it together with its clouds.
    pub fn remove_collection(&self, key: &str) -> Option<Arc<Collection>> {
        let removed = self.collections.lock().remove(key)?;
        removed.destroy();
        self.listeners.fire(&ModelEvent::CollectionRemoved {
            collection: key.to_string(),
        });
        Some(removed)
    }

    /// Placeholder collection used while the host has no collection in
    /// focus. It is never registered and has uid 0.
    pub fn null_collection(&self) -> Arc<Collection> {
        Arc::clone(self.null_collection.get_or_init(|| {
            Collection::new(
                String::new(),
                0,
                self.defaults.clone(),
                Arc::clone(&self.listeners),
            )
        }))
    }

    /// Registers a collection from a saved session. The saved uid is kept
    /// unless another collection already holds it.
    ///
    /// The snapshot is checked in full before the registry changes; on error
    /// any collection already registered under the key is left untouched.
    /// Otherwise it is replaced, destroyed and reported as removed.
    pub fn restore_collection<I>(
        &self,
        snapshot: &CollectionSnapshot,
        entities: I,
    ) -> Result<Arc<Collection>>
    where
        I: IntoIterator<Item = (EntityId, Entity)>,
    {
        let plan = snapshot.plan()?;
        let entities: EntityTable = entities.into_iter().collect();
        let (collection, replaced) = {
            let mut collections = self.collections.lock();
            let uid_free = collections
                .iter()
                .all(|(key, c)| key == &snapshot.key || c.uid() != snapshot.uid);
            let uid = if snapshot.uid > 0 && snapshot.uid < u32::MAX && uid_free {
                snapshot.uid
            } else {
                next_uid(
                    collections
                        .iter()
                        .filter(|(key, _)| *key != &snapshot.key)
                        .map(|(_, c)| c.uid()),
                )?
            };
            let collection = Collection::restored(
                snapshot.key.clone(),
                uid,
                self.defaults.clone(),
                Arc::clone(&self.listeners),
                plan,
                entities,
            );
            let replaced = collections.insert(snapshot.key.clone(), Arc::clone(&collection));
            (collection, replaced)
        };
        if let Some(old) = replaced {
            old.destroy();
            self.listeners.fire(&ModelEvent::CollectionRemoved {
                collection: snapshot.key.clone(),
            });
        }
        self.listeners.fire(&ModelEvent::CollectionModified {
            collection: snapshot.key.clone(),
        });
        for cloud in collection.clouds() {
            self.listeners.fire(&ModelEvent::CloudAdded {
                collection: snapshot.key.clone(),
                cloud: cloud.name(),
            });
        }
        info!(
            "Restored collection - key={:?}, uid={}, clouds={}",
            snapshot.key,
            collection.uid(),
            snapshot.clouds.len()
        );
        Ok(collection)
    }

    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ModelEvent) + Send + Sync + 'static,
    {
        self.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }
}

/// `max + 1` over the uids in use. Callers hold the registry lock.
fn next_uid(in_use: impl Iterator<Item = u32>) -> Result<u32> {
    let max = in_use.max().unwrap_or(0);
    max.checked_add(1).ok_or(Error::Exhausted("collection uids"))
}
