use std::fs::{self, File};
use std::io::Write;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, ErrorKind, Result};
use crate::storage::layout::StorageLayout;
use crate::storage::root::RootData;

const MAGIC: &[u8; 4] = b"STRX";
const HEADER_LEN: usize = 8;

/// Full image of the committed root.
///
/// File format: `MAGIC`, crc32 of the payload (little endian), bincode payload.
#[derive(Debug, Clone, Deserialize)]
pub struct Checkpoint {
    pub version: u64,
    pub timestamp: DateTime<Utc>,
    pub root: RootData,
}

#[derive(Serialize)]
struct CheckpointRef<'a> {
    version: u64,
    timestamp: DateTime<Utc>,
    root: &'a RootData,
}

impl Checkpoint {
    /// Load checkpoint from disk
    pub fn load(storage: &StorageLayout) -> Result<Option<Self>> {
        let path = storage.checkpoint_path();
        if !path.exists() {
            return Ok(None);
        }

        let data = fs::read(&path)?;
        if data.len() < HEADER_LEN || &data[..4] != MAGIC {
            return Err(Error::new(
                ErrorKind::Corrupted,
                format!("{} is not a checkpoint file", path.display()),
            ));
        }

        let mut crc = [0u8; 4];
        crc.copy_from_slice(&data[4..HEADER_LEN]);
        let payload = &data[HEADER_LEN..];
        if crc32fast::hash(payload) != u32::from_le_bytes(crc) {
            warn!("checkpoint {} fails its checksum", path.display());
            return Err(Error::new(
                ErrorKind::Corrupted,
                format!("checksum mismatch in {}", path.display()),
            ));
        }

        let checkpoint: Checkpoint = bincode::deserialize(payload)?;
        debug!("loaded checkpoint version {} from {}", checkpoint.version, checkpoint.timestamp);
        Ok(Some(checkpoint))
    }

    /// Write `root` as the checkpoint of `version`. The previous checkpoint is
    /// replaced atomically.
    pub fn save(storage: &StorageLayout, version: u64, root: &RootData) -> Result<()> {
        let payload = bincode::serialize(&CheckpointRef {
            version,
            timestamp: Utc::now(),
            root,
        })?;

        let tmp_path = storage.checkpoint_tmp_path();
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(MAGIC)?;
            file.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
            file.write_all(&payload)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, storage.checkpoint_path())?;

        debug!("checkpoint version {} written ({} bytes)", version, payload.len() + HEADER_LEN);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ObjectRecord;
    use crate::mvcc::write_set::WriteSet;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path()).unwrap();
        assert!(Checkpoint::load(&layout).unwrap().is_none());

        let mut root = RootData::new();
        let mut writes = WriteSet::new();
        let iid = root.store.counters.allocate(false, &mut writes);
        root.store.insert(ObjectRecord::new(iid, "Note", None), &mut writes).unwrap();

        Checkpoint::save(&layout, 3, &root).unwrap();
        let loaded = Checkpoint::load(&layout).unwrap().unwrap();
        assert_eq!(loaded.version, 3);
        assert_eq!(loaded.root, root);
    }

    #[test]
    fn test_corruption_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path()).unwrap();
        Checkpoint::save(&layout, 1, &RootData::new()).unwrap();

        let mut data = fs::read(layout.checkpoint_path()).unwrap();
        let last = data.len() - 1;
        data[last] ^= 0xff;
        fs::write(layout.checkpoint_path(), data).unwrap();

        let err = Checkpoint::load(&layout).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Corrupted);
    }
}
