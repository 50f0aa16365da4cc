use std::path::PathBuf;

/// Number of first-level shards. Fixed: changing it would re-shard every durable object.
pub const BUCKET_COUNT: u64 = 10_000;

/// Below this running-result size, OR intersects each value set before the union.
pub const OR_INTERSECT_THRESHOLD: u64 = 200;

#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for checkpoints and binary folders. `None` keeps everything in memory.
    pub storage_path: Option<PathBuf>,
    pub checkpoint_on_commit: bool,
    pub or_intersect_threshold: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_path: None,
            checkpoint_on_commit: true,
            or_intersect_threshold: OR_INTERSECT_THRESHOLD,
        }
    }
}

impl Config {
    pub fn in_memory() -> Self {
        Config::default()
    }

    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    pub fn with_checkpoint_on_commit(mut self, enabled: bool) -> Self {
        self.checkpoint_on_commit = enabled;
        self
    }

    pub fn bucket_count(&self) -> u64 {
        BUCKET_COUNT
    }
}
