use serde::{Serialize, Deserialize};
use crate::core::error::Result;
use crate::storage::root::RootData;

/// Store statistics for monitoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub version: u64,

    // Object store
    pub durable_objects: usize,
    pub transient_objects: usize,
    pub secondary_ids: usize,
    pub buckets: usize,
    pub last_id: u64,
    pub last_temp_id: u64,

    // Catalogs
    pub catalogs: Vec<CatalogStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogStats {
    pub class_name: String,
    pub object_count: u64,
    pub indexes: Vec<IndexStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub name: String,
    pub kind: String,
    pub key_type: String,
    pub distinct_values: usize,
    pub indexed_objects: usize,
}

impl StoreStats {
    pub fn collect(root: &RootData, version: u64) -> Self {
        StoreStats {
            version,
            durable_objects: root.store.durable_count(),
            transient_objects: root.store.temp.len(),
            secondary_ids: root.store.secondary.len(),
            buckets: root.store.buckets.len(),
            last_id: root.store.counters.last_id,
            last_temp_id: root.store.counters.last_temp_id,
            catalogs: root.catalogs.values().map(|c| c.stats()).collect(),
        }
    }

    pub fn catalog(&self, class_name: &str) -> Option<&CatalogStats> {
        self.catalogs.iter().find(|c| c.class_name == class_name)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
