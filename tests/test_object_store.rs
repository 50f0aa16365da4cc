use std::collections::HashSet;
use strandex::core::types::ikey;
use strandex::{ClassDefinition, Criteria, Database, ErrorKind, FieldValue, KeyType, ObjectId, ObjectRecord, Schema};

// Common test setup
fn test_schema() -> Schema {
    Schema::new()
        .add_class(
            ClassDefinition::new("Person")
                .add_keyword_field("name")
                .add_list_field("tags", KeyType::Text),
        )
        .add_class(
            ClassDefinition::new("Page")
                .add_text_field("title")
                .with_id_hook(|o: &ObjectRecord| match o.get_field("title") {
                    Some(FieldValue::Text(t)) => Some(t.to_lowercase().replace(' ', "-")),
                    _ => None,
                }),
        )
        .add_class(ClassDefinition::new("Note").add_stored_field("body"))
}

fn setup_db() -> Database {
    Database::in_memory(test_schema()).unwrap()
}

#[test]
fn test_ids_are_unique_across_deletions() {
    let db = setup_db();
    let mut session = db.session();

    let mut durable = HashSet::new();
    let mut transient = HashSet::new();
    for i in 0..50 {
        let person = session.create("Person", None, false).unwrap();
        assert!(durable.insert(person.iid));
        let draft = session.create("Person", None, true).unwrap();
        assert!(draft.iid < 0);
        assert!(transient.insert(draft.iid));
        if i % 3 == 0 {
            session.delete(person.iid).unwrap();
            session.delete(draft.iid).unwrap();
        }
    }
    session.commit().unwrap();

    let later = session.create("Person", None, false).unwrap();
    assert!(!durable.contains(&later.iid));
    assert_eq!(later.iid, 51);
}

#[test]
fn test_confirm_round_trip() {
    let db = setup_db();
    let mut session = db.session();

    let draft = session
        .create_with("Person", None, true, |o| o.set_field("name", "Ada"))
        .unwrap();
    assert!(draft.is_temp());
    assert_eq!(session.search("Person", &Criteria::new(), None).unwrap(), None);

    let confirmed = session.confirm(draft.iid).unwrap();
    assert!(confirmed.iid > 0);
    assert!(session.resolve(draft.iid).is_none());
    assert_eq!(session.resolve(confirmed.iid), Some(&confirmed));
    assert_eq!(session.resolve(confirmed.iid.to_string().as_str()), Some(&confirmed));

    let found = session.search("Person", &Criteria::new().with("name", "ada"), None).unwrap();
    assert!(found.unwrap().contains(confirmed.iid as u64));

    let again = session.confirm(confirmed.iid).unwrap_err();
    assert_eq!(again.kind, ErrorKind::InvalidState);
}

#[test]
fn test_id_hook_sets_secondary_id() {
    let db = setup_db();
    let mut session = db.session();

    let draft = session
        .create_with("Page", None, true, |o| o.set_field("title", "Getting Started"))
        .unwrap();
    let page = session.confirm(draft.iid).unwrap();
    assert_eq!(page.secondary_id.as_deref(), Some("getting-started"));
    assert_eq!(session.resolve("getting-started").map(|o| o.iid), Some(page.iid));

    // Same title again: the hook produces a taken id.
    let second = session
        .create_with("Page", None, true, |o| o.set_field("title", "getting started"))
        .unwrap();
    let err = session.confirm(second.iid).unwrap_err();
    assert!(err.is_conflict());
}

#[test]
fn test_duplicate_secondary_id_is_conflict() {
    let db = setup_db();
    let mut session = db.session();
    session.create("Person", Some("ada"), false).unwrap();
    session.commit().unwrap();

    let err = session.create("Person", Some("ada"), false).unwrap_err();
    assert!(err.is_conflict());
    assert!(session.create("Person", Some("12"), false).unwrap_err().is_conflict());
    assert!(session.create("Person", Some("bob"), true).unwrap_err().is_conflict());
    assert_eq!(session.resolve("ada").map(|o| o.iid), Some(1));
}

#[test]
fn test_failed_create_discards_pending_writes() {
    let db = setup_db();
    let mut session = db.session();
    session.create("Person", None, false).unwrap();
    assert!(session.pending_writes() > 0);

    let err = session.create("Robot", None, false).unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(session.pending_writes(), 0);
    assert!(session.resolve(1i64).is_none());
}

#[test]
fn test_delete_unindexes() {
    let db = setup_db();
    let mut session = db.session();
    let person = session
        .create_with("Person", Some("ada"), false, |o| o.set_field("name", "Ada"))
        .unwrap();

    session.delete("ada").unwrap();
    assert!(session.resolve(person.iid).is_none());
    assert!(session.resolve("ada").is_none());
    assert_eq!(session.search("Person", &Criteria::new(), None).unwrap(), None);
    assert!(session.catalog("Person").unwrap().indexes["name"].is_empty());
    assert!(session.delete(person.iid).unwrap_err().is_not_found());
}

#[test]
fn test_non_indexable_class_has_no_catalog() {
    let db = setup_db();
    let mut session = db.session();
    let note = session.create_with("Note", None, false, |o| o.set_field("body", "hi")).unwrap();
    assert_eq!(session.resolve(note.iid).map(|o| o.class_name.as_str()), Some("Note"));
    assert!(session.search("Note", &Criteria::new(), None).unwrap_err().is_not_found());
}

#[test]
fn test_update_reindexes() {
    let db = setup_db();
    let mut session = db.session();
    let person = session
        .create_with("Person", None, false, |o| o.set_field("tags", vec!["a", "b"]))
        .unwrap();

    assert!(session.set_field(person.iid, "tags", vec!["b", "c"]).unwrap());
    assert!(!session.set_field(person.iid, "tags", vec!["c", "b"]).unwrap());
    let found = session.search("Person", &Criteria::new().with("tags", "a"), None).unwrap();
    assert_eq!(found, None);

    let err = session.update(person.iid, |o| o.iid = 99).unwrap_err();
    assert!(err.is_invalid_value());
    assert!(session.resolve(99i64).is_none());
}

#[test]
fn test_bucket_keys_stay_in_range() {
    for id in [0u64, 1, 9_999, 10_000, 10_001, u64::MAX] {
        assert!(ikey(id) < 10_000);
    }
    assert_eq!(ObjectId::from("-4"), ObjectId::Temp(-4));
    assert_eq!(ObjectId::from("17").ikey(), Some(17));
    assert_eq!(ObjectId::from("ada").ikey(), None);
}

#[test]
fn test_binary_folder_needs_storage() {
    let db = setup_db();
    let mut session = db.session();
    let person = session.create("Person", None, false).unwrap();
    let err = session.binary_folder(person.iid, true).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidState);
}
