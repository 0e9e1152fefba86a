//! Active object map
//!
//! Tracks which servant is bound to each object id, and which servants are
//! bound to more than one id.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use super::servant::{ServantKey, ServantRef};
use crate::types::ObjectId;

/// Thread-safe id → servant map
pub struct ActiveObjectMap {
    entries: Mutex<MapEntries>,
    /// Whether servants bound to several ids are tracked
    track_multiple: bool,
}

#[derive(Default)]
struct MapEntries {
    by_id: HashMap<ObjectId, ServantRef>,
    /// Ids bound to each servant, in activation order
    by_servant: HashMap<ServantKey, Vec<ObjectId>>,
    /// Servants currently bound to two or more ids
    multiple: HashSet<ServantKey>,
}

impl MapEntries {
    fn unbind(&mut self, id: &ObjectId, servant: &ServantRef) {
        let key = ServantKey::of(servant);
        let remaining = match self.by_servant.get_mut(&key) {
            Some(ids) => {
                ids.retain(|bound| bound != id);
                ids.len()
            }
            None => 0,
        };
        if remaining == 0 {
            self.by_servant.remove(&key);
        }
        if remaining < 2 {
            self.multiple.remove(&key);
        }
    }
}

impl ActiveObjectMap {
    /// Create a new map
    pub fn new(track_multiple: bool) -> Self {
        Self {
            entries: Mutex::new(MapEntries::default()),
            track_multiple,
        }
    }

    /// Bind a servant to an id, replacing any previous binding of the id
    pub fn put(&self, id: ObjectId, servant: ServantRef) {
        let mut entries = self.entries.lock();
        if let Some(previous) = entries.by_id.remove(&id) {
            entries.unbind(&id, &previous);
        }

        let key = ServantKey::of(&servant);
        let ids = entries.by_servant.entry(key).or_default();
        ids.push(id.clone());
        let count = ids.len();
        if self.track_multiple && count >= 2 {
            entries.multiple.insert(key);
        }
        entries.by_id.insert(id, servant);
    }

    /// Look up the servant bound to an id
    pub fn get(&self, id: &ObjectId) -> Option<ServantRef> {
        self.entries.lock().by_id.get(id).cloned()
    }

    /// Remove the binding of an id
    pub fn remove(&self, id: &ObjectId) -> Option<ServantRef> {
        let mut entries = self.entries.lock();
        let servant = entries.by_id.remove(id)?;
        entries.unbind(id, &servant);
        Some(servant)
    }

    /// Whether an id is bound
    pub fn contains_key(&self, id: &ObjectId) -> bool {
        self.entries.lock().by_id.contains_key(id)
    }

    /// Whether a servant is bound to at least one id
    pub fn contains_servant(&self, servant: &ServantRef) -> bool {
        self.entries
            .lock()
            .by_servant
            .contains_key(&ServantKey::of(servant))
    }

    /// Whether a servant is bound to two or more ids
    pub fn has_multiple_ids(&self, servant: &ServantRef) -> bool {
        self.entries
            .lock()
            .multiple
            .contains(&ServantKey::of(servant))
    }

    /// First id a servant was bound to
    pub fn id_of(&self, servant: &ServantRef) -> Option<ObjectId> {
        self.entries
            .lock()
            .by_servant
            .get(&ServantKey::of(servant))
            .and_then(|ids| ids.first().cloned())
    }

    /// Snapshot of all bound ids
    pub fn keys(&self) -> Vec<ObjectId> {
        self.entries.lock().by_id.keys().cloned().collect()
    }

    /// Snapshot of all bindings
    pub fn entries(&self) -> Vec<(ObjectId, ServantRef)> {
        self.entries
            .lock()
            .by_id
            .iter()
            .map(|(id, servant)| (id.clone(), servant.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().by_id.is_empty()
    }

    /// Drop every binding
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.by_id.clear();
        entries.by_servant.clear();
        entries.multiple.clear();
    }
}
