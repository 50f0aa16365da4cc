use std::collections::BTreeMap;
use log::{debug, info};
use crate::catalog::catalog::{Catalog, Reindex};
use crate::core::error::Result;
use crate::core::types::{ikey, ObjectId};
use crate::mvcc::write_set::{SlotKey, WriteSet};
use crate::schema::schema::Schema;
use crate::storage::root::RootData;

/// What one reconciliation did, for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created_catalogs: Vec<String>,
    pub deleted_catalogs: Vec<String>,
    /// `(class, index)` pairs.
    pub created_indexes: Vec<(String, String)>,
    pub deleted_indexes: Vec<(String, String)>,
    /// Indexes recreated because their kind or key type changed.
    pub updated_indexes: Vec<(String, String)>,
    /// Objects whose entries changed during the population pass.
    pub populated: u64,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.created_catalogs.is_empty()
            && self.deleted_catalogs.is_empty()
            && self.created_indexes.is_empty()
            && self.deleted_indexes.is_empty()
            && self.updated_indexes.is_empty()
    }
}

enum Population {
    /// Brand-new catalog: every durable object of the class.
    Catalog,
    /// New or recreated indexes of an existing catalog: its `all` set.
    Indexes(Vec<String>),
}

/// Align the catalogs of `root` with the indexable classes of `schema`, then
/// run one population pass over everything that was created.
pub fn reconcile(root: &mut RootData, schema: &Schema, writes: &mut WriteSet) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();
    let mut pending: BTreeMap<String, Population> = BTreeMap::new();

    for class in schema.indexable_classes() {
        if root.catalogs.contains_key(&class.name) {
            continue;
        }
        let mut catalog = Catalog::new(&class.name);
        for field in class.indexed_fields() {
            catalog.add_index(field);
        }
        root.catalogs.insert(class.name.clone(), catalog);
        writes.write(SlotKey::Catalog(class.name.clone()));
        report.created_catalogs.push(class.name.clone());
        pending.insert(class.name.clone(), Population::Catalog);
    }

    let stale: Vec<String> = root
        .catalogs
        .keys()
        .filter(|name| !schema.class(name).is_some_and(|c| c.is_indexable()))
        .cloned()
        .collect();
    for name in stale {
        root.catalogs.remove(&name);
        writes.write(SlotKey::Catalog(name.clone()));
        report.deleted_catalogs.push(name);
    }

    for (class_name, catalog) in root.catalogs.iter_mut() {
        if pending.contains_key(class_name) {
            continue;
        }
        let Some(class) = schema.class(class_name) else {
            continue;
        };

        let mut created = Vec::new();
        let removed: Vec<String> = catalog
            .indexes
            .keys()
            .filter(|name| !class.indexed_fields().any(|f| &f.name == *name))
            .cloned()
            .collect();
        for name in removed {
            catalog.remove_index(&name);
            report.deleted_indexes.push((class_name.clone(), name));
        }

        for field in class.indexed_fields() {
            match catalog.indexes.get(&field.name) {
                Some(index) if index.kind == field.kind && index.key_type == field.key_type => {}
                Some(_) => {
                    catalog.remove_index(&field.name);
                    catalog.add_index(field);
                    report.updated_indexes.push((class_name.clone(), field.name.clone()));
                    created.push(field.name.clone());
                }
                None => {
                    catalog.add_index(field);
                    report.created_indexes.push((class_name.clone(), field.name.clone()));
                    created.push(field.name.clone());
                }
            }
        }

        if !created.is_empty() {
            pending.insert(class_name.clone(), Population::Indexes(created));
        }
    }

    let touched = report
        .deleted_indexes
        .iter()
        .chain(&report.updated_indexes)
        .chain(&report.created_indexes)
        .map(|(class, _)| class.clone());
    for class in touched {
        writes.write(SlotKey::Catalog(class));
    }

    report.populated = populate(root, schema, &pending, writes)?;

    if report.is_noop() {
        debug!("reconcile: catalogs already match the schema");
    } else {
        info!(
            "reconcile: {} catalogs created, {} deleted; {} indexes created, {} updated, {} deleted; {} objects populated",
            report.created_catalogs.len(),
            report.deleted_catalogs.len(),
            report.created_indexes.len(),
            report.updated_indexes.len(),
            report.deleted_indexes.len(),
            report.populated
        );
    }
    Ok(report)
}

/// The single population pass. Each object is submitted to the new indexes
/// only; returns how many objects actually changed.
fn populate(root: &mut RootData, schema: &Schema, pending: &BTreeMap<String, Population>, writes: &mut WriteSet) -> Result<u64> {
    let RootData { store, catalogs } = root;
    let mut changed = 0;

    for (class_name, population) in pending {
        let (Some(class), Some(catalog)) = (schema.class(class_name), catalogs.get_mut(class_name)) else {
            continue;
        };

        match population {
            Population::Catalog => {
                // Objects created concurrently move the id counter.
                writes.read(SlotKey::LastId);
                for object in store.objects_of_class(class_name) {
                    let Some(id) = object.durable_id() else { continue };
                    writes.read(SlotKey::Bucket(ikey(id)));
                    let indexed = catalog.reindex(class, object, &Reindex::All, writes)?;
                    catalog.add_to_all(id, writes);
                    if indexed {
                        changed += 1;
                    }
                }
            }
            Population::Indexes(names) => {
                let scope = Reindex::Indexes(names.clone());
                writes.read(SlotKey::CatalogAll(class_name.clone()));
                let ids: Vec<u64> = catalog.all.iter().collect();
                for id in ids {
                    writes.read(SlotKey::Bucket(ikey(id)));
                    let Some(object) = store.get(&ObjectId::Durable(id)) else {
                        debug!("populate {}: id {} in catalog but not in store", class_name, id);
                        continue;
                    };
                    if catalog.reindex(class, object, &scope, writes)? {
                        changed += 1;
                    }
                }
            }
        }
    }
    Ok(changed)
}
