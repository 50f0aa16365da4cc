use std::collections::BTreeMap;
use log::debug;
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, Result};
use crate::index::kind::IndexKind;
use crate::index::sets::{IdSet, SetOps};
use crate::index::value::{IndexKey, IndexValue, KeyType, StoredValue};
use crate::query::criteria::Criterion;

/// Per-search settings handed down to indexes and operators.
#[derive(Debug, Clone, Copy)]
pub struct SearchContext<'a> {
    /// Catalog name, for error messages.
    pub catalog: &'a str,
    pub or_intersect_threshold: u64,
}

/// Forward and reverse maps for one indexed attribute.
///
/// Every id in `by_object` appears in `by_value[k]` for each key `k` of its
/// stored value, and nowhere else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    pub kind: IndexKind,
    pub key_type: KeyType,
    pub by_value: BTreeMap<IndexKey, IdSet>,
    pub by_object: BTreeMap<u64, StoredValue>,
}

impl Index {
    pub fn new(name: &str, kind: IndexKind, key_type: KeyType) -> Self {
        Index {
            name: name.to_string(),
            kind,
            key_type,
            by_value: BTreeMap::new(),
            by_object: BTreeMap::new(),
        }
    }

    pub fn is_indexed(&self, id: u64) -> bool {
        self.by_object.contains_key(&id)
    }

    pub fn stored(&self, id: u64) -> Option<&StoredValue> {
        self.by_object.get(&id)
    }

    pub fn get(&self, key: &IndexKey) -> Option<&IdSet> {
        self.by_value.get(key)
    }

    pub fn len(&self) -> usize {
        self.by_object.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_object.is_empty()
    }

    pub fn check_key(&self, key: &IndexKey, catalog: &str) -> Result<()> {
        if key.key_type() == self.key_type {
            Ok(())
        } else {
            Err(Error::invalid_value(format!(
                "index '{}' of catalog '{}' holds {:?} values, got {}",
                self.name, catalog, self.key_type, key
            )))
        }
    }

    /// Bring the entry for `id` in line with `value`. Returns whether the
    /// index changed.
    pub fn index_object(&mut self, id: u64, value: Option<IndexValue>, catalog: &str) -> Result<bool> {
        let Some(value) = value else {
            return Ok(self.unindex_object(id));
        };

        for key in value.keys() {
            self.check_key(key, catalog)?;
        }

        let value = value.into_stored();
        match self.by_object.get(&id) {
            Some(current) if *current == value => Ok(false),
            Some(_) => {
                self.remove_entry(id);
                self.add_entry(id, value);
                Ok(true)
            }
            None => {
                self.add_entry(id, value);
                Ok(true)
            }
        }
    }

    pub fn unindex_object(&mut self, id: u64) -> bool {
        self.remove_entry(id).is_some()
    }

    fn add_entry(&mut self, id: u64, value: StoredValue) {
        for key in value.keys() {
            self.add_key(id, key.clone());
        }
        debug!("index {}: add {} -> {:?}", self.name, id, value);
        self.by_object.insert(id, value);
    }

    fn remove_entry(&mut self, id: u64) -> Option<StoredValue> {
        let value = self.by_object.remove(&id)?;
        for key in value.keys() {
            self.remove_key(id, key);
        }
        debug!("index {}: remove {}", self.name, id);
        Some(value)
    }

    fn add_key(&mut self, id: u64, key: IndexKey) {
        self.by_value.entry(key).or_default().insert(id);
    }

    fn remove_key(&mut self, id: u64, key: &IndexKey) {
        if let Some(ids) = self.by_value.get_mut(key) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_value.remove(key);
            }
        }
    }

    /// Narrow `running` with `criterion`, preparing it for this index's kind first.
    pub fn search(&self, criterion: &Criterion, running: Option<&IdSet>, ctx: &SearchContext) -> Result<Option<IdSet>> {
        let prepared = self.kind.prepare_search(criterion);
        self.search_prepared(&prepared, running, ctx)
    }

    /// Same as `search`, for a criterion already in this index's key space.
    /// `None` means no match.
    pub fn search_prepared(&self, criterion: &Criterion, running: Option<&IdSet>, ctx: &SearchContext) -> Result<Option<IdSet>> {
        let (ids, applied) = match criterion {
            Criterion::Value(key) => {
                self.check_key(key, ctx.catalog)?;
                match self.by_value.get(key) {
                    Some(ids) => (ids.clone(), false),
                    None => return Ok(None),
                }
            }
            Criterion::Op(op) => {
                let evaluated = op.evaluate(self, running, ctx)?;
                match evaluated.ids {
                    Some(ids) => (ids, evaluated.applied),
                    None => return Ok(None),
                }
            }
        };

        match running {
            Some(rs) if !applied => Ok(SetOps::non_empty(ids & rs)),
            _ => Ok(SetOps::non_empty(ids)),
        }
    }
}
