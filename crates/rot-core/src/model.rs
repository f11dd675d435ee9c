//! Core scene data model for a Room of Thought map.
//!
//! A map is one flat document: grid settings plus four ordered collections
//! (tokens, drawings, rectangle blockers, polygon blockers). Cross references
//! are plain ids resolved by lookup. A drawing's `link` names the token it is
//! anchored to; `group` numbers tie tokens or drawings together so they
//! translate in lock-step.
//!
//! Field names and shapes match the JSON files written by earlier releases,
//! so a document deserializes straight from disk once it has been migrated.

use crate::catalog::Catalog;
use crate::id::EntityId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Shared movement group number (tokens and drawings use separate spaces).
pub type GroupId = i64;

/// Exclusive upper bound on a token's footprint, in grid squares.
pub const MAX_TOKEN_SIZE: f64 = 50.0;

// ─── Geometry ────────────────────────────────────────────────────────────

/// A polygon or polyline corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub id: EntityId,
    pub x: f64,
    pub y: f64,
}

impl Vertex {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            id: EntityId::fresh(),
            x,
            y,
        }
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.x += dx;
        self.y += dy;
    }
}

// ─── Tokens ──────────────────────────────────────────────────────────────

/// A creature or object placed on the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub id: EntityId,
    /// Footprint in grid squares, always within `(0, MAX_TOKEN_SIZE)`.
    pub size: f64,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub dm: bool,
    #[serde(default)]
    pub layer: i32,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiative: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ac: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mental_def: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_def: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_def: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fort_def: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub will_def: Option<f64>,
    /// Hit points as `current/max`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concentrating: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hide_tracker: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_lock: Option<bool>,
}

impl Token {
    /// A token with only the required fields set.
    pub fn new(x: f64, y: f64, size: f64, dm: bool) -> Self {
        Self {
            id: EntityId::fresh(),
            size,
            x,
            y,
            dm,
            layer: 0,
            text: String::new(),
            image: None,
            name: None,
            notes: None,
            initiative: None,
            ac: None,
            mental_def: None,
            physical_def: None,
            ref_def: None,
            fort_def: None,
            will_def: None,
            hp: None,
            status: None,
            group: None,
            concentrating: None,
            hide_tracker: None,
            hidden: None,
            rotation: None,
            object_lock: None,
        }
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}

/// Token size must lie strictly between zero and [`MAX_TOKEN_SIZE`].
pub fn is_valid_token_size(size: f64) -> bool {
    size > 0.0 && size < MAX_TOKEN_SIZE
}

/// Accepts `current/max` where both halves parse as numbers.
pub fn is_hit_points(hp: &str) -> bool {
    match hp.split_once('/') {
        Some((current, max)) => {
            current.trim().parse::<f64>().is_ok() && max.trim().parse::<f64>().is_ok()
        }
        None => false,
    }
}

// ─── Drawings ────────────────────────────────────────────────────────────

/// The geometry of a drawing. Tagged by the `shape` field on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape")]
pub enum ShapeKind {
    #[serde(rename = "circle")]
    Circle { x: f64, y: f64, radius: f64 },
    #[serde(rename = "square")]
    Square {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
    #[serde(rename = "cone")]
    Cone {
        x: f64,
        y: f64,
        angle: f64,
        range: f64,
        #[serde(rename = "is90Deg", default)]
        is_90_deg: bool,
    },
    #[serde(rename = "5ftLine")]
    FiveFootLine {
        x: f64,
        y: f64,
        angle: f64,
        range: f64,
    },
    #[serde(rename = "vertexLine")]
    VertexLine { verts: Vec<Vertex> },
}

impl ShapeKind {
    /// The wire/disk tag of this variant.
    pub fn tag(&self) -> &'static str {
        match self {
            ShapeKind::Circle { .. } => "circle",
            ShapeKind::Square { .. } => "square",
            ShapeKind::Cone { .. } => "cone",
            ShapeKind::FiveFootLine { .. } => "5ftLine",
            ShapeKind::VertexLine { .. } => "vertexLine",
        }
    }
}

/// A drawn overlay: area template, marker or free polyline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shape {
    pub id: EntityId,
    pub visible: bool,
    pub true_color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupId>,
    /// Token this drawing is anchored to. Its position is derived from the
    /// token and never edited directly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<EntityId>,
    #[serde(flatten)]
    pub kind: ShapeKind,
}

impl Shape {
    pub fn new(kind: ShapeKind, visible: bool, true_color: impl Into<String>) -> Self {
        Self {
            id: EntityId::fresh(),
            visible,
            true_color: true_color.into(),
            group: None,
            link: None,
            kind,
        }
    }

    /// Anchor point of positioned variants. Vertex lines have none.
    pub fn position(&self) -> Option<(f64, f64)> {
        match &self.kind {
            ShapeKind::Circle { x, y, .. }
            | ShapeKind::Square { x, y, .. }
            | ShapeKind::Cone { x, y, .. }
            | ShapeKind::FiveFootLine { x, y, .. } => Some((*x, *y)),
            ShapeKind::VertexLine { .. } => None,
        }
    }

    /// Move the anchor point. Returns false for vertex lines.
    pub fn set_position(&mut self, new_x: f64, new_y: f64) -> bool {
        match &mut self.kind {
            ShapeKind::Circle { x, y, .. }
            | ShapeKind::Square { x, y, .. }
            | ShapeKind::Cone { x, y, .. }
            | ShapeKind::FiveFootLine { x, y, .. } => {
                *x = new_x;
                *y = new_y;
                true
            }
            ShapeKind::VertexLine { .. } => false,
        }
    }

    /// Translate the whole drawing, every vertex for vertex lines.
    pub fn translate(&mut self, dx: f64, dy: f64) {
        match &mut self.kind {
            ShapeKind::Circle { x, y, .. }
            | ShapeKind::Square { x, y, .. }
            | ShapeKind::Cone { x, y, .. }
            | ShapeKind::FiveFootLine { x, y, .. } => {
                *x += dx;
                *y += dy;
            }
            ShapeKind::VertexLine { verts } => {
                for v in verts {
                    v.translate(dx, dy);
                }
            }
        }
    }

    pub fn verts(&self) -> Option<&[Vertex]> {
        match &self.kind {
            ShapeKind::VertexLine { verts } => Some(verts),
            _ => None,
        }
    }

    pub fn verts_mut(&mut self) -> Option<&mut Vec<Vertex>> {
        match &mut self.kind {
            ShapeKind::VertexLine { verts } => Some(verts),
            _ => None,
        }
    }
}

// ─── Obstructions ────────────────────────────────────────────────────────

/// Axis-aligned rectangular obstruction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Blocker {
    pub id: EntityId,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Blocker {
    /// Build a blocker from a drag rectangle that may have negative extents.
    /// The result is rounded to whole pixels and anchored at its top-left.
    pub fn normalized(x: f64, y: f64, width: f64, height: f64) -> Self {
        let (x, width) = normalize_span(x, width);
        let (y, height) = normalize_span(y, height);
        Self {
            id: EntityId::fresh(),
            x,
            y,
            width,
            height,
        }
    }

    /// Re-anchor in place after an edit left a negative extent.
    pub fn normalize(&mut self) {
        (self.x, self.width) = normalize_span(self.x, self.width);
        (self.y, self.height) = normalize_span(self.y, self.height);
    }
}

fn normalize_span(start: f64, extent: f64) -> (f64, f64) {
    let start = start.round();
    let extent = extent.round();
    (start.min(start + extent), extent.abs())
}

/// Free-form polygon obstruction. Always keeps at least three corners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolyBlocker {
    pub id: EntityId,
    #[serde(default)]
    pub inactive: bool,
    pub verts: Vec<Vertex>,
}

/// Minimum corner count of a polygon blocker.
pub const MIN_POLY_VERTS: usize = 3;

/// Minimum point count of a vertex line.
pub const MIN_LINE_VERTS: usize = 2;

impl PolyBlocker {
    pub fn new(verts: Vec<Vertex>) -> Self {
        Self {
            id: EntityId::fresh(),
            inactive: false,
            verts,
        }
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        for v in &mut self.verts {
            v.translate(dx, dy);
        }
    }
}

// ─── Map settings ────────────────────────────────────────────────────────

/// Which obstruction geometry viewers compute occlusion from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockerType {
    Rectangle,
    #[default]
    Polygon,
}

impl TryFrom<u8> for BlockerType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(BlockerType::Rectangle),
            1 => Ok(BlockerType::Polygon),
            other => Err(other),
        }
    }
}

impl From<BlockerType> for u8 {
    fn from(value: BlockerType) -> Self {
        match value {
            BlockerType::Rectangle => 0,
            BlockerType::Polygon => 1,
        }
    }
}

impl Serialize for BlockerType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8((*self).into())
    }
}

impl<'de> Deserialize<'de> for BlockerType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = u8::deserialize(deserializer)?;
        BlockerType::try_from(raw)
            .map_err(|v| serde::de::Error::custom(format!("unknown blockerType {v}")))
    }
}

/// Distance rule for diagonal movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DiagonalRule {
    /// Alternate 5 ft / 10 ft per diagonal step.
    #[default]
    #[serde(rename = "5-10")]
    FiveTen,
    /// Manhattan distance.
    #[serde(rename = "taxi")]
    Taxi,
}

fn default_system() -> String {
    "standard".to_string()
}

// ─── Map document ────────────────────────────────────────────────────────

/// The complete authoritative scene. One instance is resident per session
/// and it is the unit of persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapState {
    #[serde(default)]
    pub map_name: String,
    pub blocker_type: BlockerType,
    pub grid_color: String,
    pub anti_blocker_on: bool,
    /// Background image file name.
    pub map: String,
    /// Grid columns.
    pub x: f64,
    /// Grid rows.
    pub y: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub tokens: Vec<Token>,
    pub drawings: Vec<Shape>,
    pub poly_blockers: Vec<PolyBlocker>,
    #[serde(default)]
    pub blockers: Vec<Blocker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_turn: Option<EntityId>,
    #[serde(default)]
    pub diagonal_movement: DiagonalRule,
    #[serde(default = "default_system")]
    pub system: String,
}

impl MapState {
    /// A blank 16×9 map with the stock background.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            map_name: name.into(),
            blocker_type: BlockerType::Polygon,
            grid_color: "#000000".to_string(),
            anti_blocker_on: false,
            map: "White.png".to_string(),
            x: 16.0,
            y: 9.0,
            offset_x: 0.0,
            offset_y: 0.0,
            tokens: Vec::new(),
            drawings: Vec::new(),
            poly_blockers: Vec::new(),
            blockers: Vec::new(),
            current_turn: None,
            diagonal_movement: DiagonalRule::FiveTen,
            system: default_system(),
        }
    }

    pub fn token(&self, id: EntityId) -> Option<&Token> {
        self.tokens.iter().find(|t| t.id == id)
    }

    pub fn token_mut(&mut self, id: EntityId) -> Option<&mut Token> {
        self.tokens.iter_mut().find(|t| t.id == id)
    }

    pub fn drawing(&self, id: EntityId) -> Option<&Shape> {
        self.drawings.iter().find(|d| d.id == id)
    }

    pub fn drawing_mut(&mut self, id: EntityId) -> Option<&mut Shape> {
        self.drawings.iter_mut().find(|d| d.id == id)
    }

    pub fn blocker_mut(&mut self, id: EntityId) -> Option<&mut Blocker> {
        self.blockers.iter_mut().find(|b| b.id == id)
    }

    pub fn poly_blocker_mut(&mut self, id: EntityId) -> Option<&mut PolyBlocker> {
        self.poly_blockers.iter_mut().find(|p| p.id == id)
    }

    /// Remove tokens matching `pred` together with every drawing anchored to
    /// any of them. Clears the current turn if it pointed at a removed token.
    /// Returns the number of tokens removed.
    ///
    /// Drawings whose link was already dangling are dropped as well.
    pub fn remove_tokens_where(&mut self, mut pred: impl FnMut(&Token) -> bool) -> usize {
        let before = self.tokens.len();
        self.tokens.retain(|t| !pred(t));
        let removed = before - self.tokens.len();
        let tokens = &self.tokens;
        self.drawings.retain(|d| match d.link {
            Some(link) => tokens.iter().any(|t| t.id == link),
            None => true,
        });
        if let Some(turn) = self.current_turn
            && !self.tokens.iter().any(|t| t.id == turn)
        {
            self.current_turn = None;
        }
        removed
    }
}

/// What viewers receive: the authoritative map plus the derived catalog.
/// Catalog fields are flattened alongside the map fields.
#[derive(Debug, Serialize)]
pub struct SceneSnapshot<'a> {
    #[serde(flatten)]
    pub map: &'a MapState,
    #[serde(flatten)]
    pub catalog: &'a Catalog,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn token_size_bounds_are_exclusive() {
        assert!(!is_valid_token_size(0.0));
        assert!(!is_valid_token_size(50.0));
        assert!(is_valid_token_size(49.9));
        assert!(is_valid_token_size(0.5));
        assert!(!is_valid_token_size(-1.0));
    }

    #[test]
    fn hit_points_format() {
        assert!(is_hit_points("12/30"));
        assert!(is_hit_points("0/7.5"));
        assert!(!is_hit_points("12"));
        assert!(!is_hit_points("a/b"));
    }

    #[test]
    fn blocker_normalizes_negative_drag() {
        let b = Blocker::normalized(100.0, 100.0, -10.0, 5.0);
        assert_eq!((b.x, b.y, b.width, b.height), (90.0, 100.0, 10.0, 5.0));

        let b = Blocker::normalized(10.4, 20.6, 5.2, -8.7);
        assert_eq!((b.x, b.y, b.width, b.height), (10.0, 12.0, 5.0, 9.0));
    }

    #[test]
    fn shape_serializes_with_shape_tag() {
        let mut shape = Shape::new(
            ShapeKind::Circle {
                x: 1.0,
                y: 2.0,
                radius: 3.0,
            },
            true,
            "#ff0000",
        );
        shape.id = EntityId::intern("c1");
        let json = serde_json::to_value(&shape).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "c1",
                "visible": true,
                "trueColor": "#ff0000",
                "shape": "circle",
                "x": 1.0,
                "y": 2.0,
                "radius": 3.0,
            })
        );
    }

    #[test]
    fn cone_reads_is90deg() {
        let shape: Shape = serde_json::from_value(serde_json::json!({
            "id": "k",
            "visible": false,
            "trueColor": "#000",
            "shape": "cone",
            "x": 0, "y": 0, "angle": 1.5, "range": 30, "is90Deg": true,
            "link": "tok",
        }))
        .unwrap();
        assert_eq!(shape.link, Some(EntityId::intern("tok")));
        match shape.kind {
            ShapeKind::Cone { is_90_deg, .. } => assert!(is_90_deg),
            other => panic!("expected cone, got {}", other.tag()),
        }
    }

    #[test]
    fn blocker_type_is_numeric() {
        assert_eq!(serde_json::to_string(&BlockerType::Rectangle).unwrap(), "0");
        assert!(serde_json::from_str::<BlockerType>("2").is_err());
    }

    #[test]
    fn removing_tokens_drops_linked_drawings_and_turn() {
        let mut map = MapState::new("m");
        let a = Token::new(0.0, 0.0, 1.0, false);
        let b = Token::new(0.0, 0.0, 1.0, false);
        let (a_id, b_id) = (a.id, b.id);
        map.tokens = vec![a, b];
        let mut linked = Shape::new(
            ShapeKind::Circle {
                x: 0.0,
                y: 0.0,
                radius: 1.0,
            },
            true,
            "#fff",
        );
        linked.link = Some(a_id);
        let free = Shape::new(
            ShapeKind::Square {
                x: 0.0,
                y: 0.0,
                width: 1.0,
                height: 1.0,
            },
            true,
            "#fff",
        );
        let free_id = free.id;
        map.drawings = vec![linked, free];
        map.current_turn = Some(a_id);

        assert_eq!(map.remove_tokens_where(|t| t.id == a_id), 1);
        assert_eq!(map.tokens.len(), 1);
        assert_eq!(map.tokens[0].id, b_id);
        assert_eq!(map.drawings.len(), 1);
        assert_eq!(map.drawings[0].id, free_id);
        assert_eq!(map.current_turn, None);
    }
}
