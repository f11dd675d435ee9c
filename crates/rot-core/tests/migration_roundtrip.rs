//! Integration tests: load → migrate → write-back → reload.
//!
//! Verifies that old map files come up in the current schema, that the
//! migrated document is persisted exactly once, and that a save/load cycle
//! of a current map loses nothing.

use rot_core::id::EntityId;
use rot_core::migrate::Fix;
use rot_core::model::*;
use rot_core::store::{MapStore, MemoryStore, load_map, save_map};
use pretty_assertions::assert_eq;

const LEGACY: &str = include_str!("fixtures/legacy_v1.json");

// ─── Legacy files ────────────────────────────────────────────────────────

#[test]
fn legacy_map_is_migrated_and_written_back_once() {
    let store = MemoryStore::with_doc("legacy_v1", LEGACY);

    let first = load_map(&store, "legacy_v1").expect("legacy map should load");
    assert!(first.written_back);
    assert_eq!(store.write_count(), 1);
    for fix in [
        Fix::BlockersAdded,
        Fix::LegacyTokenId,
        Fix::LegacyDrawingId,
        Fix::LegacyLink,
        Fix::ShapeGroupRenamed,
        Fix::PointsRenamed,
        Fix::VertexIdAssigned,
        Fix::LegacyPolyBlockerId,
    ] {
        assert!(first.fixes.contains(&fix), "missing fix {fix:?}");
    }

    let second = load_map(&store, "legacy_v1").expect("migrated map should load");
    assert!(second.fixes.is_empty());
    assert!(!second.written_back);
    assert_eq!(store.write_count(), 1, "migration must not write twice");
    assert_eq!(second.map, first.map);
}

#[test]
fn legacy_link_still_points_at_its_token() {
    let store = MemoryStore::with_doc("legacy_v1", LEGACY);
    let map = load_map(&store, "legacy_v1").unwrap().map;

    let token_id = EntityId::intern("00001-1-1-1-1");
    assert!(map.token(token_id).is_some());
    let circle = map
        .drawing(EntityId::intern("00002-1-1-1-1"))
        .expect("circle migrated");
    assert_eq!(circle.link, Some(token_id));
}

#[test]
fn legacy_fields_land_in_typed_model() {
    let store = MemoryStore::with_doc("legacy_v1", LEGACY);
    let map = load_map(&store, "legacy_v1").unwrap().map;

    assert_eq!(map.map_name, "legacy_v1");
    assert_eq!(map.blocker_type, BlockerType::Rectangle);
    assert!(map.anti_blocker_on);
    assert_eq!((map.x, map.y), (24.0, 18.0));
    assert_eq!(map.diagonal_movement, DiagonalRule::FiveTen);
    assert_eq!(map.system, "standard");
    assert!(map.blockers.is_empty());

    let line = &map.drawings[1];
    assert_eq!(line.group, Some(4));
    let verts = line.verts().expect("vertex line");
    assert_eq!(verts.len(), 2);
    assert_eq!(verts[0].id, EntityId::intern("p1"));

    let poly = &map.poly_blockers[0];
    assert_eq!(poly.id, EntityId::intern("00004-1-1-1-1"));
    assert_eq!(poly.verts.len(), 3);
}

#[test]
fn catalog_fields_are_not_persisted() {
    let store = MemoryStore::with_doc("legacy_v1", LEGACY);
    load_map(&store, "legacy_v1").unwrap();

    let written: serde_json::Value = serde_json::from_str(&store.get("legacy_v1").unwrap()).unwrap();
    assert!(written.get("maps").is_none());
    assert!(written.get("tokenList").is_none());
}

// ─── Current files ───────────────────────────────────────────────────────

#[test]
fn save_then_load_is_identical() {
    let store = MemoryStore::new();
    let mut map = MapState::new("session");
    let mut hero = Token::new(50.0, 60.0, 1.0, false);
    hero.initiative = Some(12.0);
    hero.hp = Some("9/10".into());
    let hero_id = hero.id;
    map.tokens.push(hero);
    map.tokens.push(Token::new(0.0, 0.0, 49.9, true));

    let mut aura = Shape::new(
        ShapeKind::Circle {
            x: 50.0,
            y: 60.0,
            radius: 20.0,
        },
        true,
        "#123456",
    );
    aura.link = Some(hero_id);
    map.drawings.push(aura);
    map.drawings.push(Shape::new(
        ShapeKind::VertexLine {
            verts: vec![Vertex::new(0.0, 0.0), Vertex::new(5.0, 5.0)],
        },
        false,
        "#000",
    ));
    map.blockers.push(Blocker::normalized(10.0, 10.0, 5.0, 5.0));
    map.poly_blockers.push(PolyBlocker::new(vec![
        Vertex::new(0.0, 0.0),
        Vertex::new(1.0, 0.0),
        Vertex::new(1.0, 1.0),
    ]));
    map.current_turn = Some(hero_id);
    map.diagonal_movement = DiagonalRule::Taxi;

    assert!(save_map(&store, "session", &map));
    let loaded = load_map(&store, "session").unwrap();
    assert!(loaded.fixes.is_empty());
    assert_eq!(loaded.map, map);
    assert_eq!(store.list().unwrap(), vec!["session"]);
}
