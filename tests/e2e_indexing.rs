//! End-to-end tests for indexed fields.
//!
//! Every write of an indexed field replaces the element's entry for that
//! key, so lookups always reflect the current property value.

use std::sync::Arc;

use chrono::NaiveDate;
use neo4j_ogm::{
    Entity, EntityType, Error, FieldMeta, FieldType, IndexQuery, IndexType, OgmConfig, OgmContext,
    ScalarKind,
};
use pretty_assertions::assert_eq;

fn person(ctx: &OgmContext) -> Arc<EntityType> {
    ctx.register(
        EntityType::node("Person")
            .field(FieldMeta::new("name", FieldType::Boxed(ScalarKind::String)).indexed())
            .field(FieldMeta::new("age", FieldType::Primitive(ScalarKind::Int)).indexed())
            .field(FieldMeta::new("bio", FieldType::Boxed(ScalarKind::String)).fulltext(Some("bios")))
            .field(FieldMeta::new("born", FieldType::Date).indexed_in("birthdays"))
            .field(FieldMeta::new("nickname", FieldType::Boxed(ScalarKind::String))),
    )
}

fn names(entities: &[Entity]) -> Vec<String> {
    let mut names: Vec<String> = entities
        .iter()
        .map(|e| e.get("name").unwrap().as_str().unwrap_or_default().to_string())
        .collect();
    names.sort();
    names
}

// ============================================================================
// 1. Exact lookups follow the current value
// ============================================================================

#[test]
fn test_find_by_index_after_detached_save() {
    let ctx = OgmContext::in_memory();
    let ty = person(&ctx);

    let ada = ctx.new_entity(&ty).unwrap();
    ada.set("name", "Ada").unwrap();
    assert!(ctx.find_by_index(&ty, "name", "Ada").unwrap().is_empty());

    ctx.save(&ada).unwrap();
    let found = ctx.find_by_index(&ty, "name", "Ada").unwrap();
    assert_eq!(found.len(), 1);
    assert!(found[0].same_instance(&ada));
}

#[test]
fn test_update_replaces_index_entry() {
    let ctx = OgmContext::in_memory();
    let ty = person(&ctx);
    let tx = ctx.begin_tx().unwrap();
    let ada = ctx.new_entity(&ty).unwrap();
    ada.set("name", "Ada").unwrap();
    ada.set("name", "Augusta").unwrap();
    tx.commit().unwrap();

    assert!(ctx.find_by_index(&ty, "name", "Ada").unwrap().is_empty());
    assert_eq!(ctx.find_by_index(&ty, "name", "Augusta").unwrap(), vec![ada]);
}

#[test]
fn test_null_removes_index_entry() {
    let ctx = OgmContext::in_memory();
    let ty = person(&ctx);
    let tx = ctx.begin_tx().unwrap();
    let ada = ctx.new_entity(&ty).unwrap();
    ada.set("name", "Ada").unwrap();
    ada.set("name", neo4j_ogm::FieldValue::Null).unwrap();
    tx.commit().unwrap();

    assert!(ctx.find_by_index(&ty, "name", "Ada").unwrap().is_empty());
}

#[test]
fn test_unindexed_field_cannot_be_searched() {
    let ctx = OgmContext::in_memory();
    let ty = person(&ctx);
    assert!(matches!(
        ctx.find_by_index(&ty, "nickname", "Lady"),
        Err(Error::IllegalUsage(_))
    ));
    assert!(matches!(ctx.find_by_index(&ty, "missing", "x"), Err(Error::IllegalUsage(_))));
}

// ============================================================================
// 2. Numeric range and full-text queries
// ============================================================================

#[test]
fn test_numeric_range_query() {
    let ctx = OgmContext::in_memory();
    let ty = person(&ctx);
    let tx = ctx.begin_tx().unwrap();
    for (name, age) in [("Ada", 36), ("Bob", 52), ("Cy", 17)] {
        let p = ctx.new_entity(&ty).unwrap();
        p.set("name", name).unwrap();
        p.set("age", age).unwrap();
    }
    tx.commit().unwrap();

    let range = IndexQuery::Range { min: Some(18.0), max: Some(60.0) };
    let adults = ctx.query_index("Person", "age", &range, &ty).unwrap();
    assert_eq!(names(&adults), vec!["Ada".to_string(), "Bob".to_string()]);

    let open = IndexQuery::Range { min: None, max: Some(20.0) };
    assert_eq!(names(&ctx.query_index("Person", "age", &open, &ty).unwrap()), vec!["Cy".to_string()]);
}

#[test]
fn test_fulltext_term_query() {
    let ctx = OgmContext::in_memory();
    let ty = person(&ctx);
    // Indexes are declared when the type's accessors are resolved.
    assert_eq!(ctx.store().index_type("bios"), None);
    ctx.accessors_for(&ty).unwrap();
    assert_eq!(ctx.store().index_type("bios"), Some(IndexType::FullText));

    let tx = ctx.begin_tx().unwrap();
    let ada = ctx.new_entity(&ty).unwrap();
    ada.set("name", "Ada").unwrap();
    ada.set("bio", "Wrote the first published Algorithm").unwrap();
    let bob = ctx.new_entity(&ty).unwrap();
    bob.set("name", "Bob").unwrap();
    bob.set("bio", "Built engines").unwrap();
    tx.commit().unwrap();

    let hits = ctx.query_index("bios", "bio", &IndexQuery::Term("algorithm".into()), &ty).unwrap();
    assert_eq!(hits, vec![ada]);
    assert!(ctx.query_index("bios", "bio", &IndexQuery::Term("poetry".into()), &ty).unwrap().is_empty());
}

#[test]
fn test_fulltext_in_default_index_is_rejected() {
    let ctx = OgmContext::in_memory();
    let ty = ctx.register(
        EntityType::node("Book")
            .field(FieldMeta::new("title", FieldType::Boxed(ScalarKind::String)).fulltext(Some("Book"))),
    );
    assert!(matches!(ctx.new_entity(&ty), Err(Error::Configuration(_))));
}

// ============================================================================
// 3. Converted values are indexed in store form
// ============================================================================

#[test]
fn test_date_field_found_by_date() {
    let ctx = OgmContext::in_memory();
    let ty = person(&ctx);
    let born = NaiveDate::from_ymd_opt(1815, 12, 10).unwrap();

    let tx = ctx.begin_tx().unwrap();
    let ada = ctx.new_entity(&ty).unwrap();
    ada.set("name", "Ada").unwrap();
    ada.set("born", born).unwrap();
    tx.commit().unwrap();

    assert_eq!(ctx.find_by_index(&ty, "born", born).unwrap(), vec![ada.clone()]);
    assert_eq!(ada.read_property("born").unwrap().as_str(), Some("1815-12-10"));
}

// ============================================================================
// 4. Type-level and context-wide indexing
// ============================================================================

#[test]
fn test_type_level_indexing() {
    let ctx = OgmContext::in_memory();
    let city = ctx.register(
        EntityType::node("City")
            .indexed()
            .index_name("places")
            .field(FieldMeta::new("name", FieldType::Boxed(ScalarKind::String)))
            .field(FieldMeta::new("id", FieldType::Boxed(ScalarKind::Int)).id()),
    );
    let tx = ctx.begin_tx().unwrap();
    let london = ctx.new_entity(&city).unwrap();
    london.set("name", "London").unwrap();
    tx.commit().unwrap();

    let hits = ctx.query_index("places", "name", &IndexQuery::Exact("London".into()), &city).unwrap();
    assert_eq!(hits, vec![london.clone()]);
    assert_eq!(ctx.find_by_index(&city, "name", "London").unwrap(), vec![london]);
}

#[test]
fn test_index_all_properties() {
    let config = OgmConfig { index_all_properties: true, ..OgmConfig::default() };
    let ctx = OgmContext::builder().config(config).build().unwrap();
    let ty = ctx.register(
        EntityType::node("Note").field(FieldMeta::new("text", FieldType::Boxed(ScalarKind::String))),
    );
    let tx = ctx.begin_tx().unwrap();
    let note = ctx.new_entity(&ty).unwrap();
    note.set("text", "hello").unwrap();
    tx.commit().unwrap();

    assert_eq!(ctx.find_by_index(&ty, "text", "hello").unwrap(), vec![note]);
}

// ============================================================================
// 5. Removal
// ============================================================================

#[test]
fn test_remove_clears_index_entries() {
    let ctx = OgmContext::in_memory();
    let ty = person(&ctx);
    let tx = ctx.begin_tx().unwrap();
    let ada = ctx.new_entity(&ty).unwrap();
    ada.set("name", "Ada").unwrap();
    ada.set("age", 36).unwrap();
    tx.commit().unwrap();

    ada.remove().unwrap();
    assert!(ctx.find_by_index(&ty, "name", "Ada").unwrap().is_empty());
    let everyone = IndexQuery::Range { min: None, max: None };
    assert!(ctx.query_index("Person", "age", &everyone, &ty).unwrap().is_empty());
}
