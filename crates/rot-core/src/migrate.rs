//! Schema migration for map documents written by older releases.
//!
//! Migration runs on the raw JSON tree before it is deserialized into a
//! [`MapState`](crate::model::MapState). Each fix is applied independently
//! whenever its precondition is detected, and the caller is told which ones
//! fired so it can write the document back once.

use crate::id::EntityId;
use serde_json::{Map, Value};

/// Top-level fields a map document cannot be loaded without.
pub const REQUIRED_FIELDS: &[&str] = &[
    "antiBlockerOn",
    "blockerType",
    "gridColor",
    "map",
    "x",
    "y",
    "offsetX",
    "offsetY",
    "tokens",
    "drawings",
    "polyBlockers",
];

/// Collections that must be arrays when present.
const COLLECTIONS: &[&str] = &["tokens", "drawings", "polyBlockers", "blockers"];

// Namespace prefixes for integer ids from the pre-UUID format.
const TOKEN_PREFIX: &str = "00001";
const DRAWING_PREFIX: &str = "00002";
const BLOCKER_PREFIX: &str = "00003";
const POLY_BLOCKER_PREFIX: &str = "00004";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MigrateError {
    #[error("map document is not a JSON object")]
    NotAnObject,
    #[error("map document is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("map field `{0}` must be an array")]
    NotAnArray(&'static str),
}

/// A single migration step that fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fix {
    LegacyTokenId,
    LegacyDrawingId,
    LegacyLink,
    ShapeGroupRenamed,
    PointsRenamed,
    LegacyBlockerId,
    LegacyPolyBlockerId,
    VertexIdAssigned,
    BlockersAdded,
}

/// Bring `doc` up to the current schema in place.
///
/// Returns the fixes that were applied; an empty list means the document was
/// already current. Structural problems are reported before anything is
/// touched.
pub fn migrate(doc: &mut Value) -> Result<Vec<Fix>, MigrateError> {
    let root = doc.as_object_mut().ok_or(MigrateError::NotAnObject)?;
    for &field in REQUIRED_FIELDS {
        if root.get(field).is_none_or(Value::is_null) {
            return Err(MigrateError::MissingField(field));
        }
    }
    for &field in COLLECTIONS {
        if let Some(value) = root.get(field)
            && !value.is_array()
        {
            return Err(MigrateError::NotAnArray(field));
        }
    }

    let mut fixes = Vec::new();

    if !root.contains_key("blockers") {
        root.insert("blockers".into(), Value::Array(Vec::new()));
        fixes.push(Fix::BlockersAdded);
    }

    for token in objects_mut(root, "tokens") {
        if rewrite_legacy_id(token, "id", TOKEN_PREFIX) {
            fixes.push(Fix::LegacyTokenId);
        }
    }

    for drawing in objects_mut(root, "drawings") {
        if rewrite_legacy_id(drawing, "id", DRAWING_PREFIX) {
            fixes.push(Fix::LegacyDrawingId);
        }
        // Links point at tokens, so they share the token namespace.
        if rewrite_legacy_id(drawing, "link", TOKEN_PREFIX) {
            fixes.push(Fix::LegacyLink);
        }
        if rename_field(drawing, "shapeGroup", "group") {
            fixes.push(Fix::ShapeGroupRenamed);
        }
        if rename_field(drawing, "points", "verts") {
            fixes.push(Fix::PointsRenamed);
        }
        if assign_vertex_ids(drawing) {
            fixes.push(Fix::VertexIdAssigned);
        }
    }

    for blocker in objects_mut(root, "blockers") {
        if rewrite_legacy_id(blocker, "id", BLOCKER_PREFIX) {
            fixes.push(Fix::LegacyBlockerId);
        }
    }

    for poly in objects_mut(root, "polyBlockers") {
        if rewrite_legacy_id(poly, "id", POLY_BLOCKER_PREFIX) {
            fixes.push(Fix::LegacyPolyBlockerId);
        }
        if assign_vertex_ids(poly) {
            fixes.push(Fix::VertexIdAssigned);
        }
    }

    Ok(fixes)
}

/// The id an integer from the old format maps to.
pub fn legacy_id(prefix: &str, n: &str) -> String {
    format!("{prefix}-{n}-{n}-{n}-{n}")
}

fn objects_mut<'a>(
    root: &'a mut Map<String, Value>,
    field: &str,
) -> impl Iterator<Item = &'a mut Map<String, Value>> {
    root.get_mut(field)
        .and_then(Value::as_array_mut)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object_mut)
}

fn rewrite_legacy_id(obj: &mut Map<String, Value>, key: &str, prefix: &str) -> bool {
    let Some(Value::Number(n)) = obj.get(key) else {
        return false;
    };
    let digits = number_text(n);
    obj.insert(key.to_string(), Value::String(legacy_id(prefix, &digits)));
    true
}

/// Integers print without a fractional part, the way they were written.
fn number_text(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => (f as i64).to_string(),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

fn rename_field(obj: &mut Map<String, Value>, from: &str, to: &str) -> bool {
    match obj.remove(from) {
        Some(value) => {
            obj.insert(to.to_string(), value);
            true
        }
        None => false,
    }
}

fn assign_vertex_ids(obj: &mut Map<String, Value>) -> bool {
    let Some(verts) = obj.get_mut("verts").and_then(Value::as_array_mut) else {
        return false;
    };
    let mut assigned = false;
    for vert in verts.iter_mut().filter_map(Value::as_object_mut) {
        if vert.get("id").is_none_or(Value::is_null) {
            vert.insert(
                "id".into(),
                Value::String(EntityId::fresh().as_str().to_string()),
            );
            assigned = true;
        }
    }
    assigned
}
