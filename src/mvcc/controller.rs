use std::collections::{BTreeMap, HashMap};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use parking_lot::RwLock;
use crate::core::error::{Error, Result};
use crate::mvcc::write_set::{SlotKey, WriteSet};
use crate::storage::root::RootData;

/// Slot versions older than every open snapshot are dropped past this size.
const MAX_TRACKED_SLOTS: usize = 100_000;

/// Private copy of the committed root handed to a session.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub root: RootData,
    pub version: u64,
    pub timestamp: DateTime<Utc>,
}

struct SharedRoot {
    root: RootData,
    version: u64,
    /// Version of the last commit that wrote each slot.
    slot_versions: HashMap<SlotKey, u64>,
    /// Open snapshots, counted per base version.
    active: BTreeMap<u64, usize>,
}

/// Optimistic concurrency control over the shared root.
///
/// Sessions work on snapshots. A commit is rejected when a slot it read or
/// wrote was committed by someone else after its snapshot was taken;
/// otherwise its written slots are copied into the shared root.
pub struct MVCCController {
    shared: RwLock<SharedRoot>,
}

impl MVCCController {
    pub fn new(root: RootData, version: u64) -> Self {
        MVCCController {
            shared: RwLock::new(SharedRoot {
                root,
                version,
                slot_versions: HashMap::new(),
                active: BTreeMap::new(),
            }),
        }
    }

    pub fn current_version(&self) -> u64 {
        self.shared.read().version
    }

    /// Run `f` against the committed root without copying it.
    pub fn read<R>(&self, f: impl FnOnce(&RootData, u64) -> R) -> R {
        let shared = self.shared.read();
        f(&shared.root, shared.version)
    }

    /// Copy the committed root. Pair with `release` once the snapshot is dropped.
    pub fn snapshot(&self) -> Snapshot {
        let mut shared = self.shared.write();
        let version = shared.version;
        *shared.active.entry(version).or_insert(0) += 1;
        Snapshot {
            root: shared.root.clone(),
            version,
            timestamp: Utc::now(),
        }
    }

    pub fn release(&self, version: u64) {
        let mut shared = self.shared.write();
        if let Some(count) = shared.active.get_mut(&version) {
            *count -= 1;
            if *count == 0 {
                shared.active.remove(&version);
            }
        }
    }

    /// Validate and publish the writes of a session based on `base_version`.
    /// `on_commit` sees the new root and version while the commit lock is
    /// held; its error is returned after the commit has been applied.
    pub fn commit<F>(&self, local: &RootData, base_version: u64, writes: &WriteSet, on_commit: F) -> Result<u64>
    where
        F: FnOnce(u64, &RootData) -> Result<()>,
    {
        let mut shared = self.shared.write();
        if writes.is_empty() {
            return Ok(shared.version);
        }

        for slot in writes.reads.iter().chain(&writes.writes) {
            if let Some(&committed) = shared.slot_versions.get(slot) {
                if committed > base_version {
                    warn!(
                        "commit conflict on {:?}: written at version {}, session based on {}",
                        slot, committed, base_version
                    );
                    return Err(Error::conflict(format!(
                        "{:?} was changed by a concurrent commit",
                        slot
                    )));
                }
            }
        }

        let whole: Vec<&str> = writes
            .writes
            .iter()
            .filter_map(|slot| match slot {
                SlotKey::Catalog(class) => Some(class.as_str()),
                _ => None,
            })
            .collect();

        // A rewritten catalog replaces every entry of the class.
        for class in &whole {
            let changed = shared
                .slot_versions
                .iter()
                .find(|(slot, committed)| **committed > base_version && slot.class() == Some(*class));
            if let Some((slot, committed)) = changed {
                warn!(
                    "commit conflict on catalog {}: {:?} written at version {}, session based on {}",
                    class, slot, committed, base_version
                );
                return Err(Error::conflict(format!(
                    "catalog '{}' was changed by a concurrent commit",
                    class
                )));
            }
        }

        let version = shared.version + 1;

        for slot in &writes.writes {
            let covered = !matches!(slot, SlotKey::Catalog(_))
                && slot.class().is_some_and(|class| whole.contains(&class));
            if !covered {
                shared.root.copy_slot(local, slot);
            }
            shared.slot_versions.insert(slot.clone(), version);
        }
        shared.version = version;
        debug!("commit version {}: {} slots", version, writes.len());

        if shared.slot_versions.len() > MAX_TRACKED_SLOTS {
            Self::gc_slot_versions(&mut shared);
        }

        on_commit(version, &shared.root)?;
        Ok(version)
    }

    // A session only conflicts on versions above its own base.
    fn gc_slot_versions(shared: &mut SharedRoot) {
        let oldest = shared.active.keys().next().copied().unwrap_or(shared.version);
        let before = shared.slot_versions.len();
        shared.slot_versions.retain(|_, v| *v > oldest);
        debug!("dropped {} slot versions at or below {}", before - shared.slot_versions.len(), oldest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ObjectRecord;

    fn insert(root: &mut RootData, writes: &mut WriteSet) -> i64 {
        let iid = root.store.counters.allocate(false, writes);
        root.store.insert(ObjectRecord::new(iid, "Note", None), writes).unwrap();
        iid
    }

    #[test]
    fn test_commit_publishes_written_slots() {
        let controller = MVCCController::new(RootData::new(), 0);
        let mut snapshot = controller.snapshot();
        let mut writes = WriteSet::new();
        insert(&mut snapshot.root, &mut writes);

        let version = controller.commit(&snapshot.root, snapshot.version, &writes, |_, _| Ok(())).unwrap();
        assert_eq!(version, 1);
        controller.read(|root, v| {
            assert_eq!(v, 1);
            assert_eq!(root.store.durable_count(), 1);
            assert_eq!(root.store.counters.last_id, 1);
        });
    }

    #[test]
    fn test_overlapping_commits_conflict() {
        let controller = MVCCController::new(RootData::new(), 0);
        let mut first = controller.snapshot();
        let mut second = controller.snapshot();

        let mut first_writes = WriteSet::new();
        let mut second_writes = WriteSet::new();
        insert(&mut first.root, &mut first_writes);
        insert(&mut second.root, &mut second_writes);

        controller.commit(&first.root, first.version, &first_writes, |_, _| Ok(())).unwrap();
        let err = controller.commit(&second.root, second.version, &second_writes, |_, _| Ok(())).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(controller.current_version(), 1);
    }

    #[test]
    fn test_catalog_rewrite_conflicts_with_index_entries() {
        let controller = MVCCController::new(RootData::new(), 0);
        let rewrite = controller.snapshot();
        let entry = controller.snapshot();

        let mut entry_writes = WriteSet::new();
        entry_writes.index_entry("Thing", "color", 1, None, None);
        controller.commit(&entry.root, entry.version, &entry_writes, |_, _| Ok(())).unwrap();

        let mut rewrite_writes = WriteSet::new();
        rewrite_writes.write(SlotKey::Catalog("Thing".to_string()));
        let err = controller.commit(&rewrite.root, rewrite.version, &rewrite_writes, |_, _| Ok(())).unwrap_err();
        assert!(err.is_conflict());

        // Another class is unaffected.
        let mut other = WriteSet::new();
        other.write(SlotKey::Catalog("Note".to_string()));
        controller.commit(&rewrite.root, rewrite.version, &other, |_, _| Ok(())).unwrap();
    }

    #[test]
    fn test_disjoint_commits_both_apply() {
        let controller = MVCCController::new(RootData::new(), 0);
        let mut first = controller.snapshot();
        let mut second = controller.snapshot();

        let mut first_writes = WriteSet::new();
        first.root.store.insert(ObjectRecord::new(5, "Note", None), &mut first_writes).unwrap();
        let mut second_writes = WriteSet::new();
        second.root.store.insert(ObjectRecord::new(6, "Note", None), &mut second_writes).unwrap();

        controller.commit(&first.root, first.version, &first_writes, |_, _| Ok(())).unwrap();
        controller.commit(&second.root, second.version, &second_writes, |_, _| Ok(())).unwrap();
        controller.read(|root, _| assert_eq!(root.store.durable_count(), 2));
    }
}
