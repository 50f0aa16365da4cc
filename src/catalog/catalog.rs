use std::cmp::Ordering;
use std::collections::BTreeMap;
use log::debug;
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, Result};
use crate::core::stats::{CatalogStats, IndexStats};
use crate::core::types::ObjectRecord;
use crate::index::inverted::{Index, SearchContext};
use crate::index::sets::{IdSet, SetOps};
use crate::mvcc::write_set::{SlotKey, WriteSet};
use crate::query::criteria::{Criteria, Visibility};
use crate::query::planner::QueryPlanner;
use crate::query::types::SortOrder;
use crate::schema::schema::{ClassDefinition, FieldDefinition};

/// Which indexes a reindex touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reindex {
    /// Every index; the object joins `all` if anything changed.
    All,
    /// Remove the object from every index and from `all`.
    Unindex,
    /// Exactly these indexes.
    Indexes(Vec<String>),
    /// The indexes of these fields, or of every other field when `exclude`.
    Fields { names: Vec<String>, exclude: bool },
}

/// Indexes of one class plus the set of every indexed id of that class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub class_name: String,
    pub indexes: BTreeMap<String, Index>,
    pub all: IdSet,
}

impl Catalog {
    pub fn new(class_name: &str) -> Self {
        Catalog {
            class_name: class_name.to_string(),
            indexes: BTreeMap::new(),
            all: IdSet::new(),
        }
    }

    /// Empty index for `field`. Returns false when it already exists.
    pub fn add_index(&mut self, field: &FieldDefinition) -> bool {
        if self.indexes.contains_key(&field.name) {
            return false;
        }
        self.indexes.insert(field.name.clone(), Index::new(&field.name, field.kind, field.key_type));
        true
    }

    pub fn remove_index(&mut self, name: &str) -> Option<Index> {
        self.indexes.remove(name)
    }

    pub fn index(&self, name: &str) -> Result<&Index> {
        self.indexes.get(name).ok_or_else(|| {
            Error::not_found(format!("catalog '{}' has no index '{}'", self.class_name, name))
        })
    }

    /// Ids matching every positive constraint, minus those matching a negative
    /// one. Without positive constraints the base set is `all`. `None` means
    /// no match.
    pub fn search(&self, criteria: &Criteria, visibility: Option<&Visibility>, or_intersect_threshold: u64) -> Result<Option<IdSet>> {
        let ctx = SearchContext {
            catalog: &self.class_name,
            or_intersect_threshold,
        };

        let secure = visibility.map(|v| (v.attribute.as_str(), v.criterion()));
        let constraints = criteria
            .iter()
            .map(|(attribute, criterion)| (attribute.as_str(), criterion))
            .chain(secure.as_ref().map(|(attribute, criterion)| (*attribute, criterion)));
        let plan = QueryPlanner::new(self).plan(constraints)?;

        let mut running: Option<IdSet> = None;
        for step in &plan.positive {
            match step.index.search_prepared(&step.criterion, running.as_ref(), &ctx)? {
                Some(ids) => running = Some(ids),
                None => {
                    debug!("search {}: no match on '{}'", self.class_name, step.attribute);
                    return Ok(None);
                }
            }
        }

        let mut result = running.unwrap_or_else(|| self.all.clone());
        for step in &plan.negative {
            if let Some(excluded) = step.index.search_prepared(&step.criterion, None, &ctx)? {
                result -= &excluded;
            }
        }
        Ok(SetOps::non_empty(result))
    }

    /// Order `ids` by the value stored in `sort_by`, ids without a value
    /// last; by id when no sort index is given.
    pub fn sort(&self, ids: &IdSet, sort_by: Option<&str>, order: SortOrder) -> Result<Vec<u64>> {
        let mut sorted: Vec<u64> = ids.iter().collect();
        let Some(name) = sort_by else {
            if order == SortOrder::Desc {
                sorted.reverse();
            }
            return Ok(sorted);
        };

        let index = self.index(name)?;
        sorted.sort_by(|a, b| {
            let ka = index.stored(*a).and_then(|v| v.sort_key());
            let kb = index.stored(*b).and_then(|v| v.sort_key());
            match (ka, kb) {
                (Some(ka), Some(kb)) => {
                    let by_key = match order {
                        SortOrder::Asc => ka.cmp(kb),
                        SortOrder::Desc => kb.cmp(ka),
                    };
                    by_key.then(a.cmp(b))
                }
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => a.cmp(b),
            }
        });
        Ok(sorted)
    }

    /// Bring the entries of `object` in line with its current values. Returns
    /// whether any index or `all` changed.
    pub fn reindex(&mut self, class: &ClassDefinition, object: &ObjectRecord, scope: &Reindex, writes: &mut WriteSet) -> Result<bool> {
        let Some(id) = object.durable_id() else {
            debug!("reindex {}: transient object {} skipped", self.class_name, object.iid);
            return Ok(false);
        };

        if let Reindex::Indexes(names) = scope {
            if let Some(missing) = names.iter().find(|n| !self.indexes.contains_key(n.as_str())) {
                return Err(Error::not_found(format!(
                    "catalog '{}' has no index '{}'",
                    self.class_name, missing
                )));
            }
        }

        let mut changed = false;
        let class_name = &self.class_name;
        for (name, index) in self.indexes.iter_mut() {
            let selected = match scope {
                Reindex::All | Reindex::Unindex => true,
                Reindex::Indexes(names) => names.contains(name),
                Reindex::Fields { names, exclude } => names.contains(name) != *exclude,
            };
            if !selected {
                continue;
            }

            let value = match scope {
                Reindex::Unindex => None,
                _ => class.field(name).filter(|f| f.indexed).and_then(|f| f.index_value(object)),
            };
            let old = index.stored(id).cloned();
            if index.index_object(id, value, class_name)? {
                writes.index_entry(class_name, name, id, old.as_ref(), index.stored(id));
                changed = true;
            }
        }

        match scope {
            Reindex::Unindex => {
                if self.all.remove(id) {
                    writes.write(SlotKey::CatalogAll(self.class_name.clone()));
                    changed = true;
                }
            }
            Reindex::All if changed => {
                self.add_to_all(id, writes);
            }
            _ => {}
        }
        Ok(changed)
    }

    /// Make `id` part of `all`. Returns whether it was new.
    pub fn add_to_all(&mut self, id: u64, writes: &mut WriteSet) -> bool {
        writes.read(SlotKey::Catalog(self.class_name.clone()));
        if self.all.insert(id) {
            writes.write(SlotKey::CatalogAll(self.class_name.clone()));
            true
        } else {
            false
        }
    }

    pub fn stats(&self) -> CatalogStats {
        CatalogStats {
            class_name: self.class_name.clone(),
            object_count: self.all.len(),
            indexes: self
                .indexes
                .values()
                .map(|index| IndexStats {
                    name: index.name.clone(),
                    kind: format!("{:?}", index.kind),
                    key_type: format!("{:?}", index.key_type),
                    distinct_values: index.by_value.len(),
                    indexed_objects: index.by_object.len(),
                })
                .collect(),
        }
    }
}
