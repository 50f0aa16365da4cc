use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use log::{debug, warn};
use crate::catalog::catalog::{Catalog, Reindex};
use crate::catalog::reconcile::{reconcile, ReconcileReport};
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::stats::StoreStats;
use crate::core::types::{FieldValue, ObjectId, ObjectRecord};
use crate::index::sets::IdSet;
use crate::lock::page_lock::PageLock;
use crate::mvcc::controller::MVCCController;
use crate::mvcc::write_set::WriteSet;
use crate::query::criteria::{Criteria, Visibility};
use crate::query::params::parse_criteria;
use crate::query::types::SortOrder;
use crate::schema::schema::{ClassDefinition, Schema};
use crate::storage::checkpoint::Checkpoint;
use crate::storage::layout::StorageLayout;
use crate::storage::root::RootData;
use crate::storage::store::ObjectStore;

/// Binary folder change that waits for the commit that justifies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FolderChange {
    Move { from: i64, to: i64 },
    Remove(i64),
}

/// One worker's view of the database.
///
/// Reads see the snapshot taken when the session was opened (or last
/// committed/aborted). Writes stay local until `commit`. Operations that can
/// leave half-applied changes behind (create, confirm, update, reindex,
/// delete, reconcile) discard every pending write of the session when they
/// fail. Binary folders are only moved or removed once the commit succeeds.
pub struct Session {
    mvcc: Arc<MVCCController>,
    schema: Arc<Schema>,
    config: Arc<Config>,
    storage: Option<Arc<StorageLayout>>,
    root: RootData,
    base_version: u64,
    writes: WriteSet,
    folders: Vec<FolderChange>,
}

impl Session {
    pub(crate) fn open(
        mvcc: Arc<MVCCController>,
        schema: Arc<Schema>,
        config: Arc<Config>,
        storage: Option<Arc<StorageLayout>>,
    ) -> Self {
        let snapshot = mvcc.snapshot();
        Session {
            mvcc,
            schema,
            config,
            storage,
            root: snapshot.root,
            base_version: snapshot.version,
            writes: WriteSet::new(),
            folders: Vec::new(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Version of the committed root this session is based on.
    pub fn base_version(&self) -> u64 {
        self.base_version
    }

    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats::collect(&self.root, self.base_version)
    }

    // ---- object store ----

    /// Create an object of `class_name`. Durable objects are indexed right away;
    /// transient ones wait for `confirm`.
    pub fn create(&mut self, class_name: &str, secondary_id: Option<&str>, temp: bool) -> Result<ObjectRecord> {
        self.create_with(class_name, secondary_id, temp, |_| {})
    }

    /// Like `create`, with `init` filling in the fields before the object is
    /// stored and indexed.
    pub fn create_with<F>(&mut self, class_name: &str, secondary_id: Option<&str>, temp: bool, init: F) -> Result<ObjectRecord>
    where
        F: FnOnce(&mut ObjectRecord),
    {
        self.guarded("create", |s| s.create_object(class_name, secondary_id, temp, init))
    }

    /// Turn a transient object into a durable one. Returns the object under
    /// its new id.
    pub fn confirm(&mut self, id: impl Into<ObjectId>) -> Result<ObjectRecord> {
        let id = id.into();
        self.guarded("confirm", |s| s.confirm_object(&id))
    }

    /// Unindex, drop the binary folder, then remove from the store.
    pub fn delete(&mut self, id: impl Into<ObjectId>) -> Result<()> {
        let id = id.into();
        self.guarded("delete", |s| s.delete_object(&id))
    }

    /// Numeric strings are looked up as integer ids. `None` when absent.
    pub fn resolve(&self, id: impl Into<ObjectId>) -> Option<&ObjectRecord> {
        self.root.store.get(&id.into())
    }

    /// Change an object in place, then reindex it. Returns whether any index
    /// changed. Ids are not editable this way.
    pub fn update<F>(&mut self, id: impl Into<ObjectId>, edit: F) -> Result<bool>
    where
        F: FnOnce(&mut ObjectRecord),
    {
        let id = id.into();
        self.guarded("update", |s| s.update_object(&id, edit))
    }

    pub fn set_field(&mut self, id: impl Into<ObjectId>, name: &str, value: impl Into<FieldValue>) -> Result<bool> {
        let value = value.into();
        self.update(id, |object| {
            object.fields.insert(name.to_string(), value);
        })
    }

    pub fn reindex(&mut self, id: impl Into<ObjectId>, scope: &Reindex) -> Result<bool> {
        let id = id.into();
        self.guarded("reindex", |s| {
            let object = s.require(&id)?.clone();
            let schema = Arc::clone(&s.schema);
            s.reindex_object(&schema, &object, scope)
        })
    }

    /// Folder for the binary attachments of an object, created on demand.
    /// Until the commit, an object confirmed in this session keeps using its
    /// transient folder.
    pub fn binary_folder(&self, id: impl Into<ObjectId>, create: bool) -> Result<PathBuf> {
        let storage = self.storage.as_ref().ok_or_else(|| {
            Error::new(ErrorKind::InvalidState, "in-memory database has no binary storage".to_string())
        })?;
        let object = self.require(&id.into())?;
        let staged = self.folders.iter().rev().find_map(|change| match *change {
            FolderChange::Move { from, to } if to == object.iid => Some(from),
            _ => None,
        });
        let folder = storage.binary_folder(staged.unwrap_or(object.iid));
        if create {
            fs::create_dir_all(&folder)?;
        }
        Ok(folder)
    }

    // ---- catalog ----

    pub fn catalog(&self, class_name: &str) -> Result<&Catalog> {
        self.schema.require_class(class_name)?;
        self.root
            .catalog(class_name)
            .ok_or_else(|| Error::not_found(format!("class '{}' has no catalog", class_name)))
    }

    /// Ids of `class_name` matching `criteria`. With `secure`, the caller's
    /// visibility set is an extra constraint. `None` means no match.
    pub fn search(&self, class_name: &str, criteria: &Criteria, secure: Option<&Visibility>) -> Result<Option<IdSet>> {
        self.catalog(class_name)?
            .search(criteria, secure, self.config.or_intersect_threshold)
    }

    pub fn search_sorted(
        &self,
        class_name: &str,
        criteria: &Criteria,
        sort_by: Option<&str>,
        order: SortOrder,
        secure: Option<&Visibility>,
    ) -> Result<Vec<u64>> {
        let catalog = self.catalog(class_name)?;
        match catalog.search(criteria, secure, self.config.or_intersect_threshold)? {
            Some(ids) => catalog.sort(&ids, sort_by, order),
            None => Ok(Vec::new()),
        }
    }

    /// `search_sorted` with criteria in their packed text form.
    pub fn search_packed(
        &self,
        class_name: &str,
        packed: &str,
        sort_by: Option<&str>,
        order: SortOrder,
        secure: Option<&Visibility>,
    ) -> Result<Vec<u64>> {
        let criteria = parse_criteria(packed)?;
        self.search_sorted(class_name, &criteria, sort_by, order, secure)
    }

    /// `search_sorted`, resolved into objects.
    pub fn search_objects(
        &self,
        class_name: &str,
        criteria: &Criteria,
        sort_by: Option<&str>,
        order: SortOrder,
        secure: Option<&Visibility>,
    ) -> Result<Vec<&ObjectRecord>> {
        let ids = self.search_sorted(class_name, criteria, sort_by, order, secure)?;
        Ok(ids
            .into_iter()
            .filter_map(|id| self.root.store.get(&ObjectId::Durable(id)))
            .collect())
    }

    /// Align the catalogs with this session's schema.
    pub fn reconcile(&mut self) -> Result<ReconcileReport> {
        self.guarded("reconcile", |s| {
            let schema = Arc::clone(&s.schema);
            reconcile(&mut s.root, &schema, &mut s.writes)
        })
    }

    /// Reconcile the catalogs with `schema` and use it from now on. Sessions
    /// opened later only see it once `Database::reload_schema` installs it.
    pub fn adopt_schema(&mut self, schema: Arc<Schema>) -> Result<ReconcileReport> {
        let report = self.guarded("reconcile", |s| reconcile(&mut s.root, &schema, &mut s.writes))?;
        self.schema = schema;
        Ok(report)
    }

    // ---- page locks ----

    pub fn lock_page(&mut self, id: impl Into<ObjectId>, user: &str, page: &str) -> Result<()> {
        let id = id.into();
        PageLock::check(self.require(&id)?, user, page)?;
        let object = self.require_mut(&id)?;
        PageLock::acquire(object, user, page)
    }

    pub fn check_page(&self, id: impl Into<ObjectId>, user: &str, page: &str) -> Result<()> {
        PageLock::check(self.require(&id.into())?, user, page)
    }

    pub fn unlock_page(&mut self, id: impl Into<ObjectId>, user: &str, page: &str) -> Result<bool> {
        let id = id.into();
        PageLock::check(self.require(&id)?, user, page)?;
        if !self.require(&id)?.locks.contains_key(page) {
            return Ok(false);
        }
        PageLock::release(self.require_mut(&id)?, user, page)
    }

    pub fn force_unlock(&mut self, id: impl Into<ObjectId>, page: &str, roles: &[&str]) -> Result<bool> {
        let id = id.into();
        if !self.require(&id)?.locks.contains_key(page) {
            return Ok(false);
        }
        PageLock::force_release(self.require_mut(&id)?, page, roles)
    }

    // ---- transaction ----

    /// Publish pending writes, then apply the binary folder changes they
    /// imply. A conflict with a concurrent commit discards both; the caller
    /// may redo the work in this (now refreshed) session.
    pub fn commit(&mut self) -> Result<u64> {
        let storage = self.storage.clone();
        let checkpoint = self.config.checkpoint_on_commit;
        let result = self.mvcc.commit(&self.root, self.base_version, &self.writes, |version, root| {
            match (&storage, checkpoint) {
                (Some(layout), true) => Checkpoint::save(layout, version, root),
                _ => Ok(()),
            }
        });

        let applied = match &result {
            Ok(_) => true,
            Err(err) if err.is_conflict() => {
                warn!("discarding {} pending writes: {}", self.writes.len(), err);
                false
            }
            Err(err) => {
                warn!("commit applied but checkpoint failed: {}", err);
                true
            }
        };
        let folders = std::mem::take(&mut self.folders);
        self.reset();

        let moved = if applied { self.apply_folder_changes(&folders) } else { Ok(()) };
        let version = result?;
        moved?;
        Ok(version)
    }

    /// Drop pending writes and move to the latest committed root.
    pub fn abort(&mut self) {
        if !self.writes.is_empty() {
            debug!("abort: {} pending writes dropped", self.writes.len());
        }
        self.reset();
    }

    fn reset(&mut self) {
        let snapshot = self.mvcc.snapshot();
        self.mvcc.release(self.base_version);
        self.root = snapshot.root;
        self.base_version = snapshot.version;
        self.writes.clear();
        self.folders.clear();
    }

    fn guarded<T, F>(&mut self, action: &str, op: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let result = op(self);
        if let Err(err) = &result {
            if !self.writes.is_empty() {
                warn!("{} failed, discarding {} pending writes: {}", action, self.writes.len(), err);
            }
            self.reset();
        }
        result
    }

    // ---- internals ----

    fn require(&self, id: &ObjectId) -> Result<&ObjectRecord> {
        self.root
            .store
            .get(id)
            .ok_or_else(|| Error::not_found(format!("no object with id '{}'", id)))
    }

    fn require_mut(&mut self, id: &ObjectId) -> Result<&mut ObjectRecord> {
        self.root
            .store
            .get_mut(id, &mut self.writes)
            .ok_or_else(|| Error::not_found(format!("no object with id '{}'", id)))
    }

    fn create_object<F>(&mut self, class_name: &str, secondary_id: Option<&str>, temp: bool, init: F) -> Result<ObjectRecord>
    where
        F: FnOnce(&mut ObjectRecord),
    {
        let schema = Arc::clone(&self.schema);
        let class = schema.require_class(class_name)?;

        if let Some(name) = secondary_id {
            if temp {
                return Err(Error::conflict(format!(
                    "transient objects cannot carry secondary id '{}'",
                    name
                )));
            }
            ObjectStore::validate_secondary(name)?;
            self.root.store.ensure_free(&ObjectId::Named(name.to_string()))?;
        }

        let iid = self.root.store.counters.allocate(temp, &mut self.writes);
        let mut object = ObjectRecord::new(iid, class_name, secondary_id.map(String::from));
        init(&mut object);
        if !temp && object.secondary_id.is_none() {
            object.secondary_id = Self::custom_id(class, &object)?;
        }

        self.root.store.insert(object.clone(), &mut self.writes)?;
        if !temp {
            self.index_new(class, &object)?;
        }
        debug!("created {} {}", class_name, object.id());
        Ok(object)
    }

    fn confirm_object(&mut self, id: &ObjectId) -> Result<ObjectRecord> {
        let schema = Arc::clone(&self.schema);
        let current = self.require(id)?;
        if !current.is_temp() {
            return Err(Error::new(
                ErrorKind::InvalidState,
                format!("object {} is already confirmed", current.iid),
            ));
        }
        let class = schema.require_class(&current.class_name)?;
        let temp_iid = current.iid;

        let mut object = self
            .root
            .store
            .remove(id, &mut self.writes)
            .ok_or_else(|| Error::not_found(format!("no object with id '{}'", id)))?;
        object.iid = self.root.store.counters.allocate(false, &mut self.writes);
        object.secondary_id = Self::custom_id(class, &object)?;

        self.root.store.insert(object.clone(), &mut self.writes)?;
        self.index_new(class, &object)?;
        self.folders.push(FolderChange::Move { from: temp_iid, to: object.iid });
        debug!("confirmed {} {} as {}", object.class_name, temp_iid, object.id());
        Ok(object)
    }

    fn delete_object(&mut self, id: &ObjectId) -> Result<()> {
        let schema = Arc::clone(&self.schema);
        let object = self.require(id)?.clone();

        if !object.is_temp() {
            if let (Some(class), Some(catalog)) = (
                schema.class(&object.class_name),
                self.root.catalogs.get_mut(&object.class_name),
            ) {
                catalog.reindex(class, &object, &Reindex::Unindex, &mut self.writes)?;
            }
        }

        self.root.store.remove(id, &mut self.writes);
        // Confirmed in this session: the files are still in the transient folder.
        let moved = self.folders.iter().position(|change| {
            matches!(*change, FolderChange::Move { to, .. } if to == object.iid)
        });
        let folder_id = match moved.map(|index| self.folders.remove(index)) {
            Some(FolderChange::Move { from, .. }) => from,
            _ => object.iid,
        };
        self.folders.push(FolderChange::Remove(folder_id));
        debug!("deleted {} {}", object.class_name, object.id());
        Ok(())
    }

    fn update_object<F>(&mut self, id: &ObjectId, edit: F) -> Result<bool>
    where
        F: FnOnce(&mut ObjectRecord),
    {
        let schema = Arc::clone(&self.schema);
        let object = self.require_mut(id)?;
        let (iid, secondary_id) = (object.iid, object.secondary_id.clone());
        edit(object);
        if object.iid != iid || object.secondary_id != secondary_id {
            return Err(Error::invalid_value(format!("ids of object {} cannot be edited", iid)));
        }
        let object = object.clone();
        self.reindex_object(&schema, &object, &Reindex::All)
    }

    fn reindex_object(&mut self, schema: &Schema, object: &ObjectRecord, scope: &Reindex) -> Result<bool> {
        if object.is_temp() {
            return Ok(false);
        }
        let class = schema.require_class(&object.class_name)?;
        if !class.is_indexable() {
            return Ok(false);
        }
        let catalog = self
            .root
            .catalogs
            .get_mut(&class.name)
            .ok_or_else(|| Error::not_found(format!("class '{}' has no catalog", class.name)))?;
        catalog.reindex(class, object, scope, &mut self.writes)
    }

    /// Index a freshly durable object; it joins `all` even with no indexable value.
    fn index_new(&mut self, class: &ClassDefinition, object: &ObjectRecord) -> Result<()> {
        let Some(id) = object.durable_id() else {
            return Ok(());
        };
        if !class.is_indexable() {
            return Ok(());
        }
        let catalog = self
            .root
            .catalogs
            .get_mut(&class.name)
            .ok_or_else(|| Error::not_found(format!("class '{}' has no catalog", class.name)))?;
        catalog.reindex(class, object, &Reindex::All, &mut self.writes)?;
        catalog.add_to_all(id, &mut self.writes);
        Ok(())
    }

    /// Secondary id from the class's id hook, if it has one.
    fn custom_id(class: &ClassDefinition, object: &ObjectRecord) -> Result<Option<String>> {
        let Some(hook) = &class.id_hook else {
            return Ok(None);
        };
        match hook(object) {
            Some(name) => {
                ObjectStore::validate_secondary(&name)?;
                Ok(Some(name))
            }
            None => Ok(None),
        }
    }

    /// Runs after a commit was applied. Every change is attempted; the first
    /// failure is returned.
    fn apply_folder_changes(&self, changes: &[FolderChange]) -> Result<()> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        let mut first_error = None;
        for change in changes {
            let outcome = match *change {
                FolderChange::Move { from, to } => Self::move_folder(storage, from, to),
                FolderChange::Remove(iid) => Self::remove_folder(storage, iid),
            };
            if let Err(err) = outcome {
                warn!("binary folder change {:?} failed: {}", change, err);
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn move_folder(storage: &StorageLayout, from: i64, to: i64) -> Result<()> {
        let source = storage.binary_folder(from);
        if !source.exists() {
            return Ok(());
        }
        let target = storage.binary_folder(to);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&source, &target)?;
        debug!("moved binary folder {} -> {}", from, to);
        Ok(())
    }

    fn remove_folder(storage: &StorageLayout, iid: i64) -> Result<()> {
        let folder = storage.binary_folder(iid);
        if folder.exists() {
            fs::remove_dir_all(&folder)?;
            debug!("removed binary folder of {}", iid);
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.mvcc.release(self.base_version);
    }
}
