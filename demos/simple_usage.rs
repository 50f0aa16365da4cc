/// Strandex API demo
///
/// - Schema with keyword, list, text and date indexes
/// - Transient objects confirmed into durable ones
/// - Boolean searches (or / and / in / not), sorted and packed
/// - Commit, statistics

use chrono::{TimeZone, Utc};
use strandex::query::params::pack;
use strandex::{
    ClassDefinition, Config, Criteria, Database, FieldValue, KeyType, ObjectRecord, Operator, Schema, SortOrder,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("\n╔═══════════════════════════════════════════════╗");
    println!("║        Strandex - Object Store Demo           ║");
    println!("╚═══════════════════════════════════════════════╝\n");

    // Step 1: Declare the schema and open the database
    let schema = Schema::new().add_class(
        ClassDefinition::new("Article")
            .add_text_field("title")
            .add_keyword_field("state")
            .add_list_field("tags", KeyType::Text)
            .add_date_field("published")
            .with_id_hook(|o: &ObjectRecord| match o.get_field("title") {
                Some(FieldValue::Text(title)) => Some(title.to_lowercase().replace(' ', "-")),
                _ => None,
            }),
    );
    let db = Database::open_with_schema(schema, Config::in_memory())?;
    let mut session = db.session();
    println!("Opened in-memory database at version {}\n", db.version());

    // Step 2: Create drafts and confirm them
    let articles = [
        ("Rust Ownership", "published", vec!["rust", "memory"], 3),
        ("Roaring Bitmaps", "published", vec!["rust", "indexing"], 10),
        ("Query Planning", "draft", vec!["indexing"], 21),
    ];
    for (title, state, tags, day) in articles {
        let draft = session.create_with("Article", None, true, |o| {
            o.set_field("title", title);
            o.set_field("state", state);
            o.set_field("tags", tags);
            o.set_field("published", Utc.with_ymd_and_hms(2024, 5, day, 9, 0, 0).unwrap());
        })?;
        let article = session.confirm(draft.iid)?;
        println!(
            "  {} -> #{} ({})",
            draft.iid,
            article.iid,
            article.secondary_id.as_deref().unwrap_or("-")
        );
    }
    let version = session.commit()?;
    println!("Committed version {}\n", version);

    // Step 3: Search
    let rust_published = Criteria::new()
        .with("tags", "rust")
        .with("state", "published");
    let found = session.search_objects("Article", &rust_published, Some("published"), SortOrder::Desc, None)?;
    println!("tags=rust, state=published:");
    for article in found {
        println!("  #{} {:?}", article.iid, article.get_field("title"));
    }

    let both = Criteria::new().with("tags", Operator::and(["rust", "indexing"]));
    println!("and(rust, indexing): {:?}", session.search_sorted("Article", &both, None, SortOrder::Asc, None)?);

    let not_draft = Criteria::new().with("state", Operator::not(["draft"]));
    println!("not(draft): {:?}", session.search_sorted("Article", &not_draft, None, SortOrder::Asc, None)?);

    let since = Utc.with_ymd_and_hms(2024, 5, 5, 0, 0, 0).unwrap();
    let packed = pack(&Criteria::new().with("published", Operator::range(Some(since), None)))?;
    println!("{} -> {:?}", packed, session.search_packed("Article", &packed, None, SortOrder::Asc, None)?);

    println!("title prefix 'roar*': {:?}", session.search("Article", &Criteria::new().with("title", "roar*"), None)?);
    println!("by secondary id: {:?}", session.resolve("query-planning").map(|o| o.iid));

    // Step 4: Statistics
    println!("\n{}", db.stats().to_json()?);
    Ok(())
}
