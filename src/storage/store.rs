use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, Result};
use crate::core::types::{ikey, ObjectId, ObjectRecord};
use crate::mvcc::write_set::{SlotKey, WriteSet};
use crate::storage::id_alloc::Counters;

/// Second-level shard: durable objects sharing an ikey, by id.
pub type Bucket = BTreeMap<u64, ObjectRecord>;

/// Mutable view of the map an identifier lives in.
#[derive(Debug)]
pub enum BucketMut<'a> {
    Durable(&'a mut Bucket),
    Temp(&'a mut BTreeMap<i64, ObjectRecord>),
    Secondary(&'a mut BTreeMap<String, u64>),
}

/// Durable objects sharded by ikey, transient objects in one flat map, and the
/// secondary string ids pointing at durable objects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectStore {
    pub counters: Counters,
    pub buckets: BTreeMap<u32, Bucket>,
    pub secondary: BTreeMap<String, u64>,
    pub temp: BTreeMap<i64, ObjectRecord>,
}

impl ObjectStore {
    pub fn new() -> Self {
        ObjectStore::default()
    }

    /// Map holding `id`. Durable buckets are created on demand when `create`
    /// is set; otherwise a missing bucket gives `None`.
    pub fn locate_bucket(&mut self, id: &ObjectId, create: bool, writes: &mut WriteSet) -> Option<BucketMut<'_>> {
        match id {
            ObjectId::Named(_) => Some(BucketMut::Secondary(&mut self.secondary)),
            ObjectId::Temp(_) => Some(BucketMut::Temp(&mut self.temp)),
            ObjectId::Durable(n) => {
                let key = ikey(*n);
                if create && !self.buckets.contains_key(&key) {
                    writes.write(SlotKey::Bucket(key));
                    self.buckets.insert(key, Bucket::new());
                }
                self.buckets.get_mut(&key).map(BucketMut::Durable)
            }
        }
    }

    pub fn exists(&self, id: &ObjectId) -> bool {
        match id {
            ObjectId::Named(name) => self.secondary.contains_key(name),
            ObjectId::Temp(n) => self.temp.contains_key(n),
            ObjectId::Durable(n) => self
                .buckets
                .get(&ikey(*n))
                .is_some_and(|bucket| bucket.contains_key(n)),
        }
    }

    /// Guard before insertion: an id already in use is a conflict.
    pub fn ensure_free(&self, id: &ObjectId) -> Result<()> {
        if self.exists(id) {
            Err(Error::conflict(format!("object id '{}' is already in use", id)))
        } else {
            Ok(())
        }
    }

    /// Secondary ids must be non-empty, non-numeric strings.
    pub fn validate_secondary(raw: &str) -> Result<()> {
        match ObjectId::parse(raw) {
            ObjectId::Named(_) if !raw.trim().is_empty() => Ok(()),
            _ => Err(Error::conflict(format!("'{}' is not usable as a secondary id", raw))),
        }
    }

    /// Insert `object` under its iid (and secondary id, if any). Collisions on
    /// either id are conflicts and leave the store untouched.
    pub fn insert(&mut self, object: ObjectRecord, writes: &mut WriteSet) -> Result<()> {
        let id = object.id();
        self.ensure_free(&id)?;

        let secondary = object.secondary_id.clone();
        if let Some(name) = &secondary {
            if object.is_temp() {
                return Err(Error::conflict(format!(
                    "transient object {} cannot carry secondary id '{}'",
                    object.iid, name
                )));
            }
            Self::validate_secondary(name)?;
            self.ensure_free(&ObjectId::Named(name.clone()))?;
        }

        match &id {
            ObjectId::Temp(n) => {
                writes.write(SlotKey::Temp(*n));
                self.temp.insert(*n, object);
            }
            ObjectId::Durable(n) => {
                let n = *n;
                writes.write(SlotKey::Bucket(ikey(n)));
                if let Some(BucketMut::Durable(bucket)) = self.locate_bucket(&id, true, writes) {
                    bucket.insert(n, object);
                }
                if let Some(name) = secondary {
                    writes.write(SlotKey::Secondary(name.clone()));
                    self.secondary.insert(name, n);
                }
            }
            ObjectId::Named(_) => {
                return Err(Error::invalid_value(format!("object {} has no numeric id", id)));
            }
        }
        Ok(())
    }

    /// Remove the object known by `id`, together with its secondary id.
    pub fn remove(&mut self, id: &ObjectId, writes: &mut WriteSet) -> Option<ObjectRecord> {
        match self.canonical(id)? {
            ObjectId::Temp(n) => {
                writes.write(SlotKey::Temp(n));
                self.temp.remove(&n)
            }
            ObjectId::Durable(n) => {
                let key = ikey(n);
                let object = self.buckets.get_mut(&key)?.remove(&n)?;
                writes.write(SlotKey::Bucket(key));
                if let Some(name) = &object.secondary_id {
                    writes.write(SlotKey::Secondary(name.clone()));
                    self.secondary.remove(name);
                }
                Some(object)
            }
            ObjectId::Named(_) => None,
        }
    }

    /// Numeric id behind `id`; secondary ids are followed to their object.
    pub fn canonical(&self, id: &ObjectId) -> Option<ObjectId> {
        match id {
            ObjectId::Named(name) => {
                let n = *self.secondary.get(name)?;
                Some(ObjectId::Durable(n))
            }
            ObjectId::Durable(0) => None,
            other => Some(other.clone()),
        }
    }

    pub fn get(&self, id: &ObjectId) -> Option<&ObjectRecord> {
        match self.canonical(id)? {
            ObjectId::Temp(n) => self.temp.get(&n),
            ObjectId::Durable(n) => self.buckets.get(&ikey(n))?.get(&n),
            ObjectId::Named(_) => None,
        }
    }

    /// Mutable access; marks the object's slot as written.
    pub fn get_mut(&mut self, id: &ObjectId, writes: &mut WriteSet) -> Option<&mut ObjectRecord> {
        match self.canonical(id)? {
            ObjectId::Temp(n) => {
                let object = self.temp.get_mut(&n)?;
                writes.write(SlotKey::Temp(n));
                Some(object)
            }
            ObjectId::Durable(n) => {
                let key = ikey(n);
                let object = self.buckets.get_mut(&key)?.get_mut(&n)?;
                writes.write(SlotKey::Bucket(key));
                Some(object)
            }
            ObjectId::Named(_) => None,
        }
    }

    pub fn durable_objects(&self) -> impl Iterator<Item = &ObjectRecord> {
        self.buckets.values().flat_map(|bucket| bucket.values())
    }

    pub fn objects_of_class<'a>(&'a self, class_name: &'a str) -> impl Iterator<Item = &'a ObjectRecord> {
        self.durable_objects().filter(move |o| o.class_name == class_name)
    }

    pub fn durable_count(&self) -> usize {
        self.buckets.values().map(Bucket::len).sum()
    }
}
