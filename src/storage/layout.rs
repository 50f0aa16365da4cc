use std::path::{Path, PathBuf};
use std::fs;
use crate::core::error::Result;
use crate::core::types::ikey;

/// Directory structure of a storage path
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub base_dir: PathBuf,      // Root directory
    pub meta_dir: PathBuf,      // Checkpoint location
    pub binary_dir: PathBuf,    // Per-object binary folders
}

impl StorageLayout {
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        let meta_dir = base_dir.join("meta");
        let binary_dir = base_dir.join("binary");

        fs::create_dir_all(&meta_dir)?;
        fs::create_dir_all(&binary_dir)?;

        Ok(StorageLayout {
            base_dir,
            meta_dir,
            binary_dir,
        })
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.meta_dir.join("checkpoint.bin")
    }

    pub fn checkpoint_tmp_path(&self) -> PathBuf {
        self.meta_dir.join("checkpoint.bin.tmp")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.base_dir.join(".lock")
    }

    /// `binary/<ikey>/<id>` for durable objects, `binary/temp/<abs id>` for
    /// transient ones.
    pub fn binary_folder(&self, iid: i64) -> PathBuf {
        if iid < 0 {
            self.binary_dir.join("temp").join(iid.unsigned_abs().to_string())
        } else {
            let id = iid as u64;
            self.binary_dir.join(ikey(id).to_string()).join(id.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_folder_is_sharded_by_ikey() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path()).unwrap();
        assert!(layout.meta_dir.is_dir());
        assert_eq!(layout.binary_folder(20_017), dir.path().join("binary").join("17").join("20017"));
        assert_eq!(layout.binary_folder(-3), dir.path().join("binary").join("temp").join("3"));
    }
}
