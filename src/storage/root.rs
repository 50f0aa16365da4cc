use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use crate::catalog::catalog::Catalog;
use crate::mvcc::write_set::SlotKey;
use crate::storage::store::ObjectStore;

/// Everything a session sees: the object store and the catalogs by class.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RootData {
    pub store: ObjectStore,
    pub catalogs: BTreeMap<String, Catalog>,
}

impl RootData {
    pub fn new() -> Self {
        RootData::default()
    }

    pub fn catalog(&self, class_name: &str) -> Option<&Catalog> {
        self.catalogs.get(class_name)
    }

    /// Overwrite one slot of `self` with its content in `source`. A slot
    /// absent from `source` is removed here too.
    pub fn copy_slot(&mut self, source: &RootData, slot: &SlotKey) {
        match slot {
            SlotKey::LastId => self.store.counters.last_id = source.store.counters.last_id,
            SlotKey::LastTempId => self.store.counters.last_temp_id = source.store.counters.last_temp_id,
            SlotKey::Bucket(key) => copy_entry(&mut self.store.buckets, &source.store.buckets, key),
            SlotKey::Secondary(name) => copy_entry(&mut self.store.secondary, &source.store.secondary, name),
            SlotKey::Temp(id) => copy_entry(&mut self.store.temp, &source.store.temp, id),
            SlotKey::Catalog(class) => copy_entry(&mut self.catalogs, &source.catalogs, class),
            SlotKey::CatalogAll(class) => {
                if let (Some(target), Some(from)) = (self.catalogs.get_mut(class), source.catalogs.get(class)) {
                    target.all = from.all.clone();
                }
            }
            SlotKey::IndexValue { class, index, key } => {
                let from = source.catalogs.get(class).and_then(|c| c.indexes.get(index));
                let target = self.catalogs.get_mut(class).and_then(|c| c.indexes.get_mut(index));
                if let (Some(target), Some(from)) = (target, from) {
                    copy_entry(&mut target.by_value, &from.by_value, key);
                }
            }
            SlotKey::IndexObject { class, index, id } => {
                let from = source.catalogs.get(class).and_then(|c| c.indexes.get(index));
                let target = self.catalogs.get_mut(class).and_then(|c| c.indexes.get_mut(index));
                if let (Some(target), Some(from)) = (target, from) {
                    copy_entry(&mut target.by_object, &from.by_object, id);
                }
            }
        }
    }
}

fn copy_entry<K: Ord + Clone, V: Clone>(target: &mut BTreeMap<K, V>, source: &BTreeMap<K, V>, key: &K) {
    match source.get(key) {
        Some(value) => {
            target.insert(key.clone(), value.clone());
        }
        None => {
            target.remove(key);
        }
    }
}
