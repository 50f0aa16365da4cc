use std::sync::Arc;
use std::thread;
use strandex::{ClassDefinition, Config, Criteria, Database, ErrorKind, KeyType, Schema};
use tempfile::TempDir;

fn schema() -> Schema {
    Schema::new().add_class(
        ClassDefinition::new("Task")
            .add_keyword_field("state")
            .add_list_field("tags", KeyType::Text),
    )
}

// Common test setup
fn setup_persistent() -> (TempDir, Config) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::default().with_storage_path(temp_dir.path());
    (temp_dir, config)
}

#[test]
fn test_writes_are_invisible_until_commit() {
    let db = Database::in_memory(schema()).unwrap();
    let mut writer = db.session();
    let reader = db.session();

    let task = writer.create_with("Task", None, false, |o| o.set_field("state", "open")).unwrap();
    assert!(reader.resolve(task.iid).is_none());
    assert!(db.session().resolve(task.iid).is_none());

    let version = writer.commit().unwrap();
    assert_eq!(db.version(), version);
    // Old snapshot stays stable; a new session sees the commit.
    assert!(reader.resolve(task.iid).is_none());
    assert!(db.session().resolve(task.iid).is_some());
}

#[test]
fn test_concurrent_allocations_conflict() {
    let db = Database::in_memory(schema()).unwrap();
    let mut first = db.session();
    let mut second = db.session();

    first.create("Task", None, false).unwrap();
    second.create("Task", None, false).unwrap();

    first.commit().unwrap();
    let err = second.commit().unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(second.pending_writes(), 0);

    // Retry on the refreshed session.
    let retried = second.create("Task", None, false).unwrap();
    assert_eq!(retried.iid, 2);
    second.commit().unwrap();
    assert_eq!(db.stats().durable_objects, 2);
}

#[test]
fn test_disjoint_updates_both_commit() {
    let db = Database::in_memory(schema()).unwrap();
    let mut setup = db.session();
    let a = setup.create_with("Task", None, false, |o| o.set_field("tags", vec!["x"])).unwrap();
    let b = setup.create_with("Task", None, false, |o| o.set_field("tags", vec!["y"])).unwrap();
    setup.commit().unwrap();

    let mut first = db.session();
    let mut second = db.session();
    first.set_field(a.iid, "state", "done").unwrap();
    second.set_field(b.iid, "tags", vec!["z"]).unwrap();
    first.commit().unwrap();
    second.commit().unwrap();

    let session = db.session();
    let done = session.search("Task", &Criteria::new().with("state", "done"), None).unwrap();
    assert!(done.unwrap().contains(a.iid as u64));
    let z = session.search("Task", &Criteria::new().with("tags", "z"), None).unwrap();
    assert!(z.unwrap().contains(b.iid as u64));
}

#[test]
fn test_same_forward_bucket_conflicts() {
    let db = Database::in_memory(schema()).unwrap();
    let mut setup = db.session();
    let a = setup.create("Task", None, false).unwrap();
    let b = setup.create("Task", None, false).unwrap();
    setup.commit().unwrap();

    let mut first = db.session();
    let mut second = db.session();
    first.set_field(a.iid, "state", "open").unwrap();
    second.set_field(b.iid, "state", "open").unwrap();
    first.commit().unwrap();
    assert!(second.commit().unwrap_err().is_conflict());
}

#[test]
fn test_threads_retry_on_conflict() {
    let db = Arc::new(Database::in_memory(schema()).unwrap());
    let workers: Vec<_> = (0..4)
        .map(|_| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                let mut session = db.session();
                for _ in 0..10 {
                    loop {
                        session.create("Task", None, false).unwrap();
                        match session.commit() {
                            Ok(_) => break,
                            Err(err) if err.is_conflict() => continue,
                            Err(err) => panic!("commit failed: {}", err),
                        }
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let stats = db.stats();
    assert_eq!(stats.durable_objects, 40);
    assert_eq!(stats.last_id, 40);
    assert_eq!(stats.catalog("Task").map(|c| c.object_count), Some(40));
}

#[test]
fn test_page_locks() {
    let db = Database::in_memory(schema()).unwrap();
    let mut session = db.session();
    let task = session.create("Task", None, false).unwrap();

    session.lock_page(task.iid, "ann", "main").unwrap();
    assert!(session.lock_page(task.iid, "bob", "main").unwrap_err().is_conflict());
    assert!(session.check_page(task.iid, "bob", "main").is_err());
    session.check_page(task.iid, "ann", "main").unwrap();
    // A refused lock does not discard other work.
    assert!(session.resolve(task.iid).is_some());

    assert!(session.force_unlock(task.iid, "main", &["Reader"]).is_err());
    assert!(session.force_unlock(task.iid, "main", &["Manager"]).unwrap());
    session.lock_page(task.iid, "bob", "main").unwrap();
    assert!(session.unlock_page(task.iid, "bob", "main").unwrap());
    assert!(!session.unlock_page(task.iid, "bob", "main").unwrap());
}

#[test]
fn test_checkpoint_survives_reopen() {
    let (_dir, config) = setup_persistent();
    let task_id;
    {
        let db = Database::open_with_schema(schema(), config.clone()).unwrap();
        let mut session = db.session();
        let task = session
            .create_with("Task", Some("first-task"), false, |o| o.set_field("state", "open"))
            .unwrap();
        task_id = task.iid;
        let folder = session.binary_folder(task.iid, true).unwrap();
        assert!(folder.is_dir());
        session.commit().unwrap();
    }

    let db = Database::open_with_schema(schema(), config).unwrap();
    let session = db.session();
    assert_eq!(session.resolve("first-task").map(|o| o.iid), Some(task_id));
    let open = session.search("Task", &Criteria::new().with("state", "open"), None).unwrap();
    assert!(open.unwrap().contains(task_id as u64));
    assert!(db.version() >= 1);
}

#[test]
fn test_storage_directory_is_locked() {
    let (_dir, config) = setup_persistent();
    let _db = Database::open_with_schema(schema(), config.clone()).unwrap();
    let err = Database::open_with_schema(schema(), config).err().unwrap();
    assert_eq!(err.kind, ErrorKind::InvalidState);
}

#[test]
fn test_confirm_moves_binary_folder() {
    let (_dir, config) = setup_persistent();
    let db = Database::open_with_schema(schema(), config).unwrap();
    let mut session = db.session();

    let draft = session.create("Task", None, true).unwrap();
    let temp_folder = session.binary_folder(draft.iid, true).unwrap();
    std::fs::write(temp_folder.join("upload.txt"), b"data").unwrap();

    let task = session.confirm(draft.iid).unwrap();
    // Files stay in place until the commit.
    assert_eq!(session.binary_folder(task.iid, false).unwrap(), temp_folder);
    session.commit().unwrap();

    let folder = session.binary_folder(task.iid, false).unwrap();
    assert!(!temp_folder.exists());
    assert!(folder.join("upload.txt").is_file());

    session.delete(task.iid).unwrap();
    assert!(folder.exists());
    session.commit().unwrap();
    assert!(!folder.exists());
}

#[test]
fn test_failed_confirm_leaves_binary_folder() {
    let (_dir, config) = setup_persistent();
    let db = Database::open_with_schema(schema(), config).unwrap();
    let mut session = db.session();
    let draft = session.create("Task", None, true).unwrap();
    let temp_folder = session.binary_folder(draft.iid, true).unwrap();
    std::fs::write(temp_folder.join("upload.txt"), b"data").unwrap();
    session.commit().unwrap();

    let mut other = db.session();
    let taken = other.create("Task", None, false).unwrap();
    other.commit().unwrap();

    // Allocates the id the other session just committed.
    let task = session.confirm(draft.iid).unwrap();
    assert_eq!(task.iid, taken.iid);
    assert!(session.commit().unwrap_err().is_conflict());

    assert!(session.resolve(draft.iid).is_some_and(|o| o.is_temp()));
    assert!(temp_folder.join("upload.txt").is_file());
    let taken_folder = session.binary_folder(taken.iid, false).unwrap();
    assert!(!taken_folder.join("upload.txt").exists());

    // Redo on the refreshed session.
    let task = session.confirm(draft.iid).unwrap();
    session.commit().unwrap();
    let folder = session.binary_folder(task.iid, false).unwrap();
    assert!(folder.join("upload.txt").is_file());
    assert!(!temp_folder.exists());
}

fn schema_with_owner() -> Schema {
    Schema::new().add_class(
        ClassDefinition::new("Task")
            .add_keyword_field("state")
            .add_list_field("tags", KeyType::Text)
            .add_keyword_field("owner"),
    )
}

#[test]
fn test_reconcile_conflicts_with_concurrent_index_writes() {
    let db = Database::in_memory(schema()).unwrap();
    let mut setup = db.session();
    let task = setup.create_with("Task", None, false, |o| o.set_field("state", "open")).unwrap();
    setup.commit().unwrap();

    let mut reconciler = db.session();
    let mut editor = db.session();
    editor.set_field(task.iid, "state", "done").unwrap();
    editor.commit().unwrap();

    let report = reconciler.adopt_schema(Arc::new(schema_with_owner())).unwrap();
    assert_eq!(report.created_indexes.len(), 1);
    assert!(reconciler.commit().unwrap_err().is_conflict());

    let session = db.session();
    let done = session.search("Task", &Criteria::new().with("state", "done"), None).unwrap();
    assert!(done.unwrap().contains(task.iid as u64));
    assert!(session.search("Task", &Criteria::new().with("state", "open"), None).unwrap().is_none());

    // Redo on the refreshed session.
    reconciler.adopt_schema(Arc::new(schema_with_owner())).unwrap();
    reconciler.commit().unwrap();
    let session = db.session();
    let done = session.search("Task", &Criteria::new().with("state", "done"), None).unwrap();
    assert!(done.unwrap().contains(task.iid as u64));
    assert!(session.catalog("Task").unwrap().index("owner").is_ok());
}

#[test]
fn test_new_catalog_sees_concurrent_creations() {
    let db = Database::in_memory(Schema::new().add_class(ClassDefinition::new("Task").add_stored_field("state"))).unwrap();
    let mut reconciler = db.session();
    let mut writer = db.session();
    writer.create_with("Task", None, false, |o| o.set_field("state", "open")).unwrap();
    writer.commit().unwrap();

    reconciler.adopt_schema(Arc::new(schema())).unwrap();
    assert!(reconciler.commit().unwrap_err().is_conflict());
    reconciler.adopt_schema(Arc::new(schema())).unwrap();
    reconciler.commit().unwrap();

    let open = db.session().search("Task", &Criteria::new().with("state", "open"), None).unwrap();
    assert_eq!(open.map(|ids| ids.len()), Some(1));
}
