use std::sync::Arc;
use log::info;
use parking_lot::RwLock;
use crate::catalog::reconcile::ReconcileReport;
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::session::Session;
use crate::core::stats::StoreStats;
use crate::mvcc::controller::MVCCController;
use crate::schema::schema::Schema;
use crate::storage::checkpoint::Checkpoint;
use crate::storage::file_lock::FileLock;
use crate::storage::layout::StorageLayout;
use crate::storage::root::RootData;

/// Shared root of the object store and catalogs. Workers open one `Session`
/// each.
pub struct Database {
    config: Arc<Config>,

    storage: Option<Arc<StorageLayout>>,

    schema: RwLock<Arc<Schema>>,

    mvcc: Arc<MVCCController>,

    // Held for the lifetime of the database.
    _lock: Option<FileLock>,
}

impl Database {
    /// Open (or create) a database. With a storage path, the last checkpoint
    /// is loaded and the directory is locked for this process. Catalogs are
    /// reconciled against `schema` before returning.
    pub fn open_with_schema(schema: Schema, config: Config) -> Result<Self> {
        let (storage, lock, root, version) = match &config.storage_path {
            Some(path) => {
                let storage = StorageLayout::new(path)?;
                let lock = FileLock::acquire(&storage)?;
                let (root, version) = match Checkpoint::load(&storage)? {
                    Some(checkpoint) => {
                        info!(
                            "recovered version {} from checkpoint of {}",
                            checkpoint.version, checkpoint.timestamp
                        );
                        (checkpoint.root, checkpoint.version)
                    }
                    None => (RootData::new(), 0),
                };
                (Some(Arc::new(storage)), Some(lock), root, version)
            }
            None => (None, None, RootData::new(), 0),
        };

        let db = Database {
            config: Arc::new(config),
            storage,
            schema: RwLock::new(Arc::new(schema)),
            mvcc: Arc::new(MVCCController::new(root, version)),
            _lock: lock,
        };
        db.reconcile_schema()?;
        Ok(db)
    }

    pub fn in_memory(schema: Schema) -> Result<Self> {
        Self::open_with_schema(schema, Config::in_memory())
    }

    pub fn session(&self) -> Session {
        Session::open(
            self.mvcc.clone(),
            self.schema(),
            self.config.clone(),
            self.storage.clone(),
        )
    }

    /// Reconcile the catalogs with a new schema, then install it for new
    /// sessions. Sessions opened earlier keep the schema they started with.
    pub fn reload_schema(&self, schema: Schema) -> Result<ReconcileReport> {
        let schema = Arc::new(schema);
        let mut session = self.session();
        let report = session.adopt_schema(Arc::clone(&schema))?;
        session.commit()?;
        *self.schema.write() = schema;
        Ok(report)
    }

    fn reconcile_schema(&self) -> Result<ReconcileReport> {
        let mut session = self.session();
        let report = session.reconcile()?;
        session.commit()?;
        Ok(report)
    }

    /// Write a checkpoint of the committed root now.
    pub fn checkpoint(&self) -> Result<()> {
        let storage = self.storage.as_ref().ok_or_else(|| {
            Error::new(ErrorKind::InvalidState, "in-memory database has no storage path".to_string())
        })?;
        self.mvcc.read(|root, version| Checkpoint::save(storage, version, root))
    }

    pub fn stats(&self) -> StoreStats {
        self.mvcc.read(StoreStats::collect)
    }

    pub fn version(&self) -> u64 {
        self.mvcc.current_version()
    }

    pub fn schema(&self) -> Arc<Schema> {
        self.schema.read().clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage(&self) -> Option<&StorageLayout> {
        self.storage.as_deref()
    }
}
