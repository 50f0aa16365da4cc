use std::collections::BTreeSet;
use crate::index::value::{IndexKey, StoredValue};

/// Unit of commit-time conflict detection: one named slot of the root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SlotKey {
    LastId,
    LastTempId,
    /// Second-level map of durable objects, by ikey.
    Bucket(u32),
    Secondary(String),
    Temp(i64),
    /// A catalog as a whole: its existence and its set of indexes.
    Catalog(String),
    CatalogAll(String),
    IndexValue { class: String, index: String, key: IndexKey },
    IndexObject { class: String, index: String, id: u64 },
}

impl SlotKey {
    pub fn class(&self) -> Option<&str> {
        match self {
            SlotKey::Catalog(class) | SlotKey::CatalogAll(class) => Some(class),
            SlotKey::IndexValue { class, .. } | SlotKey::IndexObject { class, .. } => Some(class),
            _ => None,
        }
    }
}

/// Slots a session depends on (`reads`) and slots it changed (`writes`).
#[derive(Debug, Clone, Default)]
pub struct WriteSet {
    pub reads: BTreeSet<SlotKey>,
    pub writes: BTreeSet<SlotKey>,
}

impl WriteSet {
    pub fn new() -> Self {
        WriteSet::default()
    }

    pub fn read(&mut self, slot: SlotKey) {
        self.reads.insert(slot);
    }

    pub fn write(&mut self, slot: SlotKey) {
        self.writes.insert(slot);
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn clear(&mut self) {
        self.reads.clear();
        self.writes.clear();
    }

    /// Record an index entry change: the reverse-map slot of `id` and the
    /// forward-map slot of every key it left or joined.
    pub fn index_entry(&mut self, class: &str, index: &str, id: u64, old: Option<&StoredValue>, new: Option<&StoredValue>) {
        self.read(SlotKey::Catalog(class.to_string()));
        self.write(SlotKey::IndexObject {
            class: class.to_string(),
            index: index.to_string(),
            id,
        });
        let keys = old.into_iter().chain(new).flat_map(StoredValue::keys);
        for key in keys {
            self.write(SlotKey::IndexValue {
                class: class.to_string(),
                index: index.to_string(),
                key: key.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_entry_records_both_keys() {
        let mut writes = WriteSet::new();
        let old = StoredValue::Single(IndexKey::from("red"));
        let new = StoredValue::Single(IndexKey::from("blue"));
        writes.index_entry("Thing", "color", 4, Some(&old), Some(&new));

        assert_eq!(writes.len(), 3);
        assert!(writes.reads.contains(&SlotKey::Catalog("Thing".to_string())));
        assert!(writes.writes.contains(&SlotKey::IndexValue {
            class: "Thing".to_string(),
            index: "color".to_string(),
            key: IndexKey::from("red"),
        }));
    }
}
