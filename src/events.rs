//! Model change notifications, delivered to listeners in the order they
//! subscribed.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    CloudAdded { collection: String, cloud: String },
    CloudDeleted { collection: String, cloud: String },
    CloudRenamed {
        collection: String,
        old_name: String,
        new_name: String,
    },
    /// Entities or text filter settings changed; every cloud is stale.
    CollectionModified { collection: String },
    CollectionRemoved { collection: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&ModelEvent) + Send + Sync>;

#[derive(Default)]
pub struct Listeners {
    next_id: AtomicU64,
    entries: RwLock<Vec<(ListenerId, Listener)>>,
}

impl Listeners {
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ModelEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    /// Calls every listener without holding the registry lock, so a listener
    /// may subscribe or unsubscribe from inside its callback.
    pub fn fire(&self, event: &ModelEvent) {
        let snapshot: Vec<Listener> = self
            .entries
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }
}
