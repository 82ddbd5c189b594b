//! End-to-end tests for computed traversal fields and relationship entities.
//!
//! Traversal fields rerun their traversal on every read. Relationship
//! entities expose the relationship's own properties and its end nodes.

use std::sync::Arc;

use neo4j_ogm::{
    Direction, Entity, EntitySet, EntityType, Error, FieldMeta, FieldType, OgmConfig, OgmContext,
    ScalarKind, TraversalDescription,
};
use pretty_assertions::assert_eq;

fn person(ctx: &OgmContext, network: TraversalDescription) -> Arc<EntityType> {
    ctx.register(
        EntityType::node("Person")
            .field(FieldMeta::new("name", FieldType::Boxed(ScalarKind::String)))
            .field(
                FieldMeta::new("knows", FieldType::ReferenceSet("Person".into()))
                    .related_to("KNOWS", Direction::Outgoing),
            )
            .field(FieldMeta::new("network", FieldType::ReferenceSet("Person".into())).traversal(network)),
    )
}

fn named(ctx: &Arc<OgmContext>, ty: &Arc<EntityType>, name: &str) -> Entity {
    let entity = ctx.new_entity(ty).unwrap();
    entity.set("name", name).unwrap();
    entity
}

fn knows(from: &Entity, to: &[&Entity]) {
    let set: EntitySet = to.iter().map(|e| (*e).clone()).collect();
    from.set("knows", set).unwrap();
}

fn names_of(entity: &Entity, field: &str) -> Vec<String> {
    let mut names: Vec<String> = entity
        .get(field)
        .unwrap()
        .entities()
        .unwrap()
        .iter()
        .map(|e| e.get("name").unwrap().as_str().unwrap_or_default().to_string())
        .collect();
    names.sort();
    names
}

// ============================================================================
// 1. Traversal fields
// ============================================================================

#[test]
fn test_traversal_depth_range_excludes_start() {
    let ctx = OgmContext::in_memory();
    let ty = person(&ctx, TraversalDescription::new(Direction::Outgoing).relationship("KNOWS").depth(1, 2));
    let tx = ctx.begin_tx().unwrap();
    let a = named(&ctx, &ty, "a");
    let b = named(&ctx, &ty, "b");
    let c = named(&ctx, &ty, "c");
    let d = named(&ctx, &ty, "d");
    knows(&a, &[&b]);
    knows(&b, &[&c]);
    knows(&c, &[&d, &a]);
    tx.commit().unwrap();

    assert_eq!(names_of(&a, "network"), vec!["b", "c"]);
    assert_eq!(names_of(&c, "network"), vec!["a", "b", "d"]);
}

#[test]
fn test_traversal_is_recomputed_on_every_read() {
    let ctx = OgmContext::in_memory();
    let ty = person(&ctx, TraversalDescription::new(Direction::Outgoing).relationship("KNOWS").depth(1, 2));
    let tx = ctx.begin_tx().unwrap();
    let a = named(&ctx, &ty, "a");
    let b = named(&ctx, &ty, "b");
    let c = named(&ctx, &ty, "c");
    knows(&a, &[&b]);
    assert_eq!(names_of(&a, "network"), vec!["b"]);

    knows(&b, &[&c]);
    assert_eq!(names_of(&a, "network"), vec!["b", "c"]);

    knows(&a, &[]);
    assert!(names_of(&a, "network").is_empty());
    tx.commit().unwrap();
}

#[test]
fn test_traversal_without_max_depth_is_capped() {
    let config = OgmConfig { max_traversal_depth: 2, ..OgmConfig::default() };
    let ctx = OgmContext::builder().config(config).build().unwrap();
    let ty = person(&ctx, TraversalDescription::new(Direction::Outgoing).relationship("KNOWS"));
    let tx = ctx.begin_tx().unwrap();
    let chain: Vec<Entity> = (0..5).map(|i| named(&ctx, &ty, &format!("p{i}"))).collect();
    for pair in chain.windows(2) {
        knows(&pair[0], &[&pair[1]]);
    }
    tx.commit().unwrap();

    assert_eq!(names_of(&chain[0], "network"), vec!["p1", "p2"]);
}

#[test]
fn test_traversal_field_is_read_only() {
    let ctx = OgmContext::in_memory();
    let ty = person(&ctx, TraversalDescription::new(Direction::Both).relationship("KNOWS"));
    let tx = ctx.begin_tx().unwrap();
    let a = named(&ctx, &ty, "a");
    let b = named(&ctx, &ty, "b");

    let err = a.set("network", [b].into_iter().collect::<EntitySet>()).unwrap_err();
    match err {
        Error::ReadOnlyField { field, .. } => assert_eq!(field, "network"),
        other => panic!("expected read-only field, got {other:?}"),
    }
    assert!(!a.is_writable("network"));
    tx.commit().unwrap();
}

// ============================================================================
// 2. Relationship entities
// ============================================================================

struct Cinema {
    ctx: Arc<OgmContext>,
    actor: Arc<EntityType>,
    movie: Arc<EntityType>,
    role: Arc<EntityType>,
}

fn cinema() -> Cinema {
    let ctx = OgmContext::in_memory();
    let actor = ctx.register(
        EntityType::node("Actor")
            .field(FieldMeta::new("name", FieldType::Boxed(ScalarKind::String)))
            .field(FieldMeta::new("roles", FieldType::RelationshipEntitySet("Role".into()))),
    );
    let movie = ctx.register(
        EntityType::node("Movie")
            .field(FieldMeta::new("name", FieldType::Boxed(ScalarKind::String)))
            .field(
                FieldMeta::new("cast", FieldType::RelationshipEntitySet("Role".into()))
                    .related_to_via("ACTS_IN", Direction::Incoming),
            ),
    );
    let role = ctx.register(
        EntityType::relationship("Role", "ACTS_IN")
            .field(FieldMeta::new("id", FieldType::Boxed(ScalarKind::Int)).id())
            .field(FieldMeta::new("actor", FieldType::Reference("Actor".into())).start_node())
            .field(FieldMeta::new("movie", FieldType::Reference("Movie".into())).end_node())
            .field(FieldMeta::new("character", FieldType::Boxed(ScalarKind::String))),
    );
    Cinema { ctx, actor, movie, role }
}

#[test]
fn test_relate_to_creates_relationship_entity() {
    let Cinema { ctx, actor, movie, role } = cinema();
    let tx = ctx.begin_tx().unwrap();
    let keanu = named(&ctx, &actor, "Keanu");
    let matrix = named(&ctx, &movie, "The Matrix");

    let neo = keanu.relate_to(&matrix, &role).unwrap();
    neo.set("character", "Neo").unwrap();
    tx.commit().unwrap();

    assert_eq!(ctx.store().relationship_count().unwrap(), 1);
    assert_eq!(neo.read_property("character").unwrap().as_str(), Some("Neo"));
    assert_eq!(neo.get("id").unwrap().as_int(), Some(neo.relationship_id().unwrap().0 as i64));

    let roles = keanu.get("roles").unwrap().entities().unwrap();
    assert_eq!(roles.len(), 1);
    assert!(roles.contains(&neo));
    let cast = matrix.get("cast").unwrap().entities().unwrap();
    assert!(cast.to_vec()[0].same_instance(&neo));

    assert!(neo.get("actor").unwrap().as_entity().unwrap().same_instance(&keanu));
    assert!(neo.get("movie").unwrap().as_entity().unwrap().same_instance(&matrix));
}

#[test]
fn test_relationship_entity_ends_are_fixed_once_attached() {
    let Cinema { ctx, actor, movie, role } = cinema();
    let tx = ctx.begin_tx().unwrap();
    let keanu = named(&ctx, &actor, "Keanu");
    let carrie = named(&ctx, &actor, "Carrie-Anne");
    let matrix = named(&ctx, &movie, "The Matrix");
    let neo = keanu.relate_to(&matrix, &role).unwrap();

    assert!(!neo.is_writable("actor"));
    assert!(neo.set("actor", &keanu).is_ok());
    assert!(matches!(neo.set("actor", &carrie), Err(Error::ReadOnlyField { .. })));
    assert!(matches!(
        keanu.set("roles", [neo.clone()].into_iter().collect::<EntitySet>()),
        Err(Error::ReadOnlyField { .. })
    ));
    tx.commit().unwrap();
}

#[test]
fn test_detached_relationship_entity_saved_from_ends() {
    let Cinema { ctx, actor, movie, role } = cinema();

    let keanu = named(&ctx, &actor, "Keanu");
    let matrix = named(&ctx, &movie, "The Matrix");
    let neo = ctx.new_entity(&role).unwrap();
    neo.set("actor", &keanu).unwrap();
    neo.set("movie", &matrix).unwrap();
    neo.set("character", "Neo").unwrap();
    assert_eq!(ctx.store().node_count().unwrap(), 0);

    // Both ends are persisted along with the relationship.
    ctx.save(&neo).unwrap();
    assert_eq!(ctx.store().node_count().unwrap(), 2);
    assert_eq!(ctx.store().relationship_count().unwrap(), 1);

    let rel = ctx.store().get_relationship(neo.relationship_id().unwrap()).unwrap().unwrap();
    assert_eq!(rel.src, keanu.node_id().unwrap());
    assert_eq!(rel.dst, matrix.node_id().unwrap());
    assert_eq!(rel.rel_type, "ACTS_IN");
    assert_eq!(neo.read_property("character").unwrap().as_str(), Some("Neo"));
    assert_eq!(keanu.read_property("name").unwrap().as_str(), Some("Keanu"));

    let roles = keanu.get("roles").unwrap().entities().unwrap();
    assert!(roles.to_vec()[0].same_instance(&neo));
}

#[test]
fn test_relate_to_requires_relationship_type() {
    let Cinema { ctx, actor, movie, .. } = cinema();
    let tx = ctx.begin_tx().unwrap();
    let keanu = named(&ctx, &actor, "Keanu");
    let matrix = named(&ctx, &movie, "The Matrix");
    assert!(matches!(keanu.relate_to(&matrix, &movie), Err(Error::IllegalUsage(_))));
    tx.commit().unwrap();
}
