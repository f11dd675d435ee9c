//! Per-event mutations of a [`MapState`].
//!
//! Every function validates the whole request before touching the map: a
//! rejected request leaves the map exactly as it was. Callers broadcast and
//! persist only on `Ok`.

use crate::linkage;
use crate::protocol::*;
use rot_core::id::EntityId;
use rot_core::model::{
    Blocker, BlockerType, MIN_LINE_VERTS, MIN_POLY_VERTS, MapState, PolyBlocker, Shape,
    ShapeKind, Token, Vertex, is_hit_points, is_valid_token_size,
};
use std::cmp::Ordering;

/// Why a request was dropped. Logged, never sent to the client.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Rejection {
    #[error("missing required field `{0}`")]
    Missing(&'static str),
    #[error("`{field}` out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },
    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("no {kind} with id {id}")]
    NotFound { kind: &'static str, id: EntityId },
    #[error("`{field}` does not apply to a {shape}")]
    WrongShape {
        field: &'static str,
        shape: &'static str,
    },
    #[error("drawing {0} is linked to a token and follows it")]
    Anchored(EntityId),
    #[error("a {kind} needs at least {min} vertices")]
    TooFewVertices { kind: &'static str, min: usize },
    #[error("nothing to do: {0}")]
    NoOp(&'static str),
    #[error("invalid map name {0:?}")]
    InvalidMapName(String),
    #[error("map {0:?} already exists")]
    MapExists(String),
    #[error("map {name:?} could not be loaded: {reason}")]
    LoadFailed { name: String, reason: String },
    #[error("map {0:?} could not be written")]
    WriteFailed(String),
}

pub type Outcome<T = ()> = Result<T, Rejection>;

pub(crate) fn require<T>(value: Option<T>, field: &'static str) -> Outcome<T> {
    value.ok_or(Rejection::Missing(field))
}

fn not_found(kind: &'static str, id: EntityId) -> Rejection {
    Rejection::NotFound { kind, id }
}

fn token_index(map: &MapState, id: EntityId) -> Outcome<usize> {
    map.tokens
        .iter()
        .position(|t| t.id == id)
        .ok_or(not_found("token", id))
}

fn drawing_index(map: &MapState, id: EntityId) -> Outcome<usize> {
    map.drawings
        .iter()
        .position(|d| d.id == id)
        .ok_or(not_found("drawing", id))
}

fn poly_blocker_index(map: &MapState, id: EntityId) -> Outcome<usize> {
    map.poly_blockers
        .iter()
        .position(|p| p.id == id)
        .ok_or(not_found("poly blocker", id))
}

fn vert_index(verts: &[Vertex], id: EntityId) -> Outcome<usize> {
    verts
        .iter()
        .position(|v| v.id == id)
        .ok_or(not_found("vertex", id))
}

fn check_size(size: f64) -> Outcome {
    if is_valid_token_size(size) {
        Ok(())
    } else {
        Err(Rejection::OutOfRange {
            field: "size",
            value: size,
        })
    }
}

fn check_hp(hp: &str) -> Outcome {
    if is_hit_points(hp) {
        Ok(())
    } else {
        Err(Rejection::Invalid {
            field: "hp",
            reason: format!("{hp:?} is not current/max"),
        })
    }
}

// ─── Tokens ──────────────────────────────────────────────────────────────

pub fn create_token(map: &mut MapState, req: CreateToken) -> Outcome<EntityId> {
    let x = require(req.x, "x")?;
    let y = require(req.y, "y")?;
    let size = require(req.size, "size")?;
    let dm = require(req.dm, "dm")?;
    check_size(size)?;
    if let Some(hp) = &req.hp {
        check_hp(hp)?;
    }

    let mut token = Token::new(x, y, size, dm);
    token.layer = req.layer.unwrap_or(0);
    token.text = req.text.unwrap_or_default();
    token.image = req.image;
    token.name = req.name;
    token.notes = req.notes;
    token.initiative = req.initiative;
    token.ac = req.ac;
    token.hp = req.hp;
    token.status = req.status;
    token.group = req.group;
    token.concentrating = req.concentrating;
    token.hide_tracker = req.hide_tracker;
    token.hidden = req.hidden;

    let id = token.id;
    map.tokens.push(token);
    Ok(id)
}

pub fn move_token(map: &mut MapState, req: MoveToken) -> Outcome {
    let id = require(req.id, "id")?;
    let x = require(req.x, "x")?;
    let y = require(req.y, "y")?;
    linkage::move_token(map, id, x, y, req.bypass_link.unwrap_or(false))
        .map(drop)
        .ok_or(not_found("token", id))
}

pub fn edit_token(map: &mut MapState, req: EditToken) -> Outcome {
    let id = require(req.id, "id")?;
    if let Some(size) = req.size {
        check_size(size)?;
    }
    if let Some(hp) = req.hp.as_set() {
        check_hp(hp)?;
    }
    let index = token_index(map, id)?;

    if let Some(size) = req.size {
        // Linked auras keep their margin around the token.
        let grow = (size - map.tokens[index].size) * 0.5;
        for shape in map.drawings.iter_mut().filter(|d| d.link == Some(id)) {
            if let ShapeKind::Circle { radius, .. } = &mut shape.kind {
                *radius += grow;
            }
        }
    }

    let token = &mut map.tokens[index];
    if let Some(size) = req.size {
        token.size = size;
    }
    if let Some(layer) = req.layer {
        token.layer = layer;
    }
    if let Some(text) = req.text {
        token.text = text;
    }
    if let Some(dm) = req.dm {
        token.dm = dm;
    }
    if let Some(concentrating) = req.concentrating {
        token.concentrating = Some(concentrating);
    }
    if let Some(hide_tracker) = req.hide_tracker {
        token.hide_tracker = Some(hide_tracker);
    }
    req.status.apply_to(&mut token.status);
    req.notes.apply_to(&mut token.notes);
    req.group.apply_to(&mut token.group);
    req.initiative.apply_to(&mut token.initiative);
    req.name.apply_to(&mut token.name);
    req.ac.apply_to(&mut token.ac);
    req.mental_def.apply_to(&mut token.mental_def);
    req.physical_def.apply_to(&mut token.physical_def);
    req.ref_def.apply_to(&mut token.ref_def);
    req.fort_def.apply_to(&mut token.fort_def);
    req.will_def.apply_to(&mut token.will_def);
    req.hp.apply_to(&mut token.hp);
    req.image.apply_to(&mut token.image);
    Ok(())
}

pub fn set_token_hidden(map: &mut MapState, req: SetTokenHidden) -> Outcome {
    let id = require(req.id, "id")?;
    let hidden = require(req.hidden, "hidden")?;
    let index = token_index(map, id)?;

    map.tokens[index].hidden = Some(hidden);
    for shape in map.drawings.iter_mut().filter(|d| d.link == Some(id)) {
        shape.visible = !hidden;
    }
    Ok(())
}

pub fn remove_token(map: &mut MapState, req: ById) -> Outcome {
    let id = require(req.id, "id")?;
    token_index(map, id)?;
    map.remove_tokens_where(|t| t.id == id);
    Ok(())
}

pub fn clear_tokens(map: &mut MapState) -> Outcome {
    let removed = map.remove_tokens_where(|_| true);
    log::info!("cleared {removed} token(s)");
    Ok(())
}

// ─── Initiative tracker ──────────────────────────────────────────────────

pub fn change_turn(map: &mut MapState, req: ChangeTurn) -> Outcome {
    if let Some(id) = req.id {
        token_index(map, id)?;
    }
    map.current_turn = req.id;
    Ok(())
}

/// Order tokens by initiative, highest first. Tokens without initiative go
/// last; ties keep their current order.
pub fn sort_tracker(map: &mut MapState) -> Outcome {
    if map.tokens.is_empty() {
        return Err(Rejection::NoOp("no tokens to sort"));
    }
    map.tokens
        .sort_by(|a, b| match (a.initiative, b.initiative) {
            (Some(a), Some(b)) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
    Ok(())
}

pub fn switch_tracker_position(map: &mut MapState, req: SwitchTrackerPosition) -> Outcome {
    let origin = token_index(map, require(req.origin, "origin")?)?;
    let target = token_index(map, require(req.target, "target")?)?;
    map.tokens.swap(origin, target);
    Ok(())
}

// ─── Map settings ────────────────────────────────────────────────────────

pub fn set_map_data(map: &mut MapState, req: SetMapData) -> Outcome {
    for (field, value) in [("x", req.x), ("y", req.y)] {
        if let Some(value) = value
            && value <= 0.0
        {
            return Err(Rejection::OutOfRange { field, value });
        }
    }

    if let Some(grid_color) = req.grid_color {
        map.grid_color = grid_color;
    }
    if let Some(background) = req.map {
        map.map = background;
    }
    if let Some(x) = req.x {
        map.x = x;
    }
    if let Some(y) = req.y {
        map.y = y;
    }
    if let Some(offset_x) = req.offset_x {
        map.offset_x = offset_x;
    }
    if let Some(offset_y) = req.offset_y {
        map.offset_y = offset_y;
    }
    if let Some(rule) = req.diagonal_movement {
        map.diagonal_movement = rule;
    }
    if let Some(system) = req.system {
        map.system = system;
    }
    Ok(())
}

pub fn switch_blocker_type(map: &mut MapState, req: SwitchBlockerType) -> Outcome {
    let raw = require(req.blocker_type, "type")?;
    map.blocker_type = BlockerType::try_from(raw).map_err(|v| Rejection::Invalid {
        field: "type",
        reason: format!("unknown blocker type {v}"),
    })?;
    Ok(())
}

pub fn invert_blockers(map: &mut MapState) -> Outcome {
    map.anti_blocker_on = !map.anti_blocker_on;
    Ok(())
}

// ─── Drawings ────────────────────────────────────────────────────────────

fn line_verts(input: Vec<VertexInput>) -> Outcome<Vec<Vertex>> {
    if input.len() < MIN_LINE_VERTS {
        return Err(Rejection::TooFewVertices {
            kind: "vertex line",
            min: MIN_LINE_VERTS,
        });
    }
    Ok(input.into_iter().map(VertexInput::into_vertex).collect())
}

pub fn add_drawing(map: &mut MapState, req: AddDrawing) -> Outcome<EntityId> {
    let tag = require(req.shape, "shape")?;
    let visible = require(req.visible, "visible")?;
    let color = require(req.true_color, "trueColor")?;
    if let Some(link) = req.link {
        token_index(map, link)?;
    }

    let kind = match tag.as_str() {
        "circle" => ShapeKind::Circle {
            x: require(req.x, "x")?.round(),
            y: require(req.y, "y")?.round(),
            radius: require(req.radius, "radius")?,
        },
        "square" => ShapeKind::Square {
            x: require(req.x, "x")?.round(),
            y: require(req.y, "y")?.round(),
            width: require(req.width, "width")?.round(),
            height: require(req.height, "height")?.round(),
        },
        "cone" => ShapeKind::Cone {
            x: require(req.x, "x")?.round(),
            y: require(req.y, "y")?.round(),
            angle: require(req.angle, "angle")?,
            range: require(req.range, "range")?,
            is_90_deg: require(req.is_90_deg, "is90Deg")?,
        },
        "5ftLine" => ShapeKind::FiveFootLine {
            x: require(req.x, "x")?.round(),
            y: require(req.y, "y")?.round(),
            angle: require(req.angle, "angle")?,
            range: require(req.range, "range")?,
        },
        "vertexLine" => ShapeKind::VertexLine {
            verts: line_verts(require(req.verts, "verts")?)?,
        },
        other => {
            return Err(Rejection::Invalid {
                field: "shape",
                reason: format!("unknown shape {other:?}"),
            });
        }
    };

    let mut shape = Shape::new(kind, visible, color);
    shape.link = req.link;
    let id = shape.id;
    map.drawings.push(shape);
    linkage::anchor_all(map);
    Ok(id)
}

pub fn edit_drawing(map: &mut MapState, req: EditDrawing) -> Outcome {
    let id = require(req.id, "id")?;
    let index = drawing_index(map, id)?;
    let shape = &map.drawings[index];
    let tag = shape.kind.tag();
    let cascade = req.move_shape_group.unwrap_or(true);
    let group = shape.group;
    let both = req.both.unwrap_or(false);

    if shape.link.is_some() && (both || req.x.is_some() || req.y.is_some()) {
        return Err(Rejection::Anchored(id));
    }

    if both && shape.verts().is_some() {
        // Whole-line drag: the first vertex lands on (x, y).
        let x = require(req.x, "x")?;
        let y = require(req.y, "y")?;
        let Some(&first) = shape.verts().and_then(|v| v.first()) else {
            return Err(Rejection::TooFewVertices {
                kind: "vertex line",
                min: MIN_LINE_VERTS,
            });
        };
        let (dx, dy) = (x - first.x, y - first.y);

        map.drawings[index].translate(dx, dy);
        if cascade && let Some(group) = group {
            linkage::move_shape_group(&mut map.drawings, id, dx, dy, group);
        }
    } else {
        let verts = match req.verts {
            Some(_) if shape.verts().is_none() => {
                return Err(Rejection::WrongShape { field: "verts", shape: tag });
            }
            Some(input) => Some(line_verts(input)?),
            None => None,
        };
        if req.radius.is_some() && !matches!(shape.kind, ShapeKind::Circle { .. }) {
            return Err(Rejection::WrongShape { field: "radius", shape: tag });
        }
        let has_sweep = matches!(
            shape.kind,
            ShapeKind::Cone { .. } | ShapeKind::FiveFootLine { .. }
        );
        if req.angle.is_some() && !has_sweep {
            return Err(Rejection::WrongShape { field: "angle", shape: tag });
        }
        if req.range.is_some() && !has_sweep {
            return Err(Rejection::WrongShape { field: "range", shape: tag });
        }
        let position = shape.position();
        if (req.x.is_some() || req.y.is_some()) && position.is_none() {
            return Err(Rejection::WrongShape { field: "x", shape: tag });
        }

        // The group follows the unrounded delta, the drawing snaps to whole
        // pixels.
        let group_delta = match (req.x, req.y, position, group) {
            (Some(x), Some(y), Some((cx, cy)), Some(group)) if cascade => {
                Some((x - cx, y - cy, group))
            }
            _ => None,
        };

        let shape = &mut map.drawings[index];
        if let (Some(verts), Some(slot)) = (verts, shape.verts_mut()) {
            *slot = verts;
        }
        match &mut shape.kind {
            ShapeKind::Circle { radius, .. } => {
                if let Some(r) = req.radius {
                    *radius = r;
                }
            }
            ShapeKind::Cone { angle, range, .. } | ShapeKind::FiveFootLine { angle, range, .. } => {
                if let Some(a) = req.angle {
                    *angle = a;
                }
                if let Some(r) = req.range {
                    *range = r;
                }
            }
            ShapeKind::Square { .. } | ShapeKind::VertexLine { .. } => {}
        }
        if let Some((cx, cy)) = shape.position() {
            let x = req.x.map_or(cx, f64::round);
            let y = req.y.map_or(cy, f64::round);
            shape.set_position(x, y);
        }

        if let Some((dx, dy, group)) = group_delta {
            linkage::move_shape_group(&mut map.drawings, id, dx, dy, group);
        }
    }

    let shape = &mut map.drawings[index];
    req.group.apply_to(&mut shape.group);
    if let Some(visible) = req.visible {
        shape.visible = visible;
    }
    Ok(())
}

pub fn remove_drawing(map: &mut MapState, req: ById) -> Outcome {
    let id = require(req.id, "id")?;
    let index = drawing_index(map, id)?;
    map.drawings.remove(index);
    Ok(())
}

pub fn clear_drawings(map: &mut MapState) -> Outcome {
    map.drawings.clear();
    Ok(())
}

// ─── Rectangle blockers ──────────────────────────────────────────────────

pub fn add_blocker(map: &mut MapState, req: AddBlocker) -> Outcome<EntityId> {
    let blocker = Blocker::normalized(
        require(req.x, "x")?,
        require(req.y, "y")?,
        require(req.width, "width")?,
        require(req.height, "height")?,
    );
    if blocker.width == 0.0 && blocker.height == 0.0 {
        return Err(Rejection::NoOp("zero-area blocker"));
    }
    let id = blocker.id;
    map.blockers.push(blocker);
    Ok(id)
}

pub fn edit_blocker(map: &mut MapState, req: EditBlocker) -> Outcome {
    let id = require(req.id, "id")?;
    let blocker = map.blocker_mut(id).ok_or(not_found("blocker", id))?;
    if let Some(x) = req.x {
        blocker.x = x;
    }
    if let Some(y) = req.y {
        blocker.y = y;
    }
    if let Some(width) = req.width {
        blocker.width = width;
    }
    if let Some(height) = req.height {
        blocker.height = height;
    }
    blocker.normalize();
    Ok(())
}

pub fn remove_blocker(map: &mut MapState, req: ById) -> Outcome {
    let id = require(req.id, "id")?;
    let index = map
        .blockers
        .iter()
        .position(|b| b.id == id)
        .ok_or(not_found("blocker", id))?;
    map.blockers.remove(index);
    Ok(())
}

/// Removes both rectangle and polygon blockers.
pub fn clear_blockers(map: &mut MapState) -> Outcome {
    map.blockers.clear();
    map.poly_blockers.clear();
    Ok(())
}

// ─── Polygon blockers ────────────────────────────────────────────────────

/// A square polygon blocker centred on (x, y) with half-side `offset.min`.
pub fn add_poly_blocker(map: &mut MapState, req: AddPolyBlocker) -> Outcome<EntityId> {
    let x = require(req.x, "x")?;
    let y = require(req.y, "y")?;
    let m = require(req.offset.and_then(|o| o.min), "offset.min")?;

    let poly = PolyBlocker::new(vec![
        Vertex::new(x - m, y + m),
        Vertex::new(x + m, y + m),
        Vertex::new(x + m, y - m),
        Vertex::new(x - m, y - m),
    ]);
    let id = poly.id;
    map.poly_blockers.push(poly);
    Ok(id)
}

pub fn add_custom_poly_blocker(map: &mut MapState, req: AddCustomPolyBlocker) -> Outcome<EntityId> {
    let verts = require(req.new_poly_blocker_verts, "newPolyBlockerVerts")?;
    if verts.len() < MIN_POLY_VERTS {
        return Err(Rejection::TooFewVertices {
            kind: "poly blocker",
            min: MIN_POLY_VERTS,
        });
    }
    let poly = PolyBlocker::new(verts.into_iter().map(|v| Vertex::new(v.x, v.y)).collect());
    let id = poly.id;
    map.poly_blockers.push(poly);
    Ok(id)
}

pub fn move_poly_blocker(map: &mut MapState, req: MovePolyBlocker) -> Outcome {
    let id = require(req.id, "id")?;
    let dx = require(req.offset_x, "offsetX")?;
    let dy = require(req.offset_y, "offsetY")?;
    let index = poly_blocker_index(map, id)?;
    map.poly_blockers[index].translate(dx, dy);
    Ok(())
}

pub fn toggle_poly_blocker(map: &mut MapState, req: ById) -> Outcome {
    let id = require(req.id, "id")?;
    let poly = map
        .poly_blocker_mut(id)
        .ok_or(not_found("poly blocker", id))?;
    poly.inactive = !poly.inactive;
    Ok(())
}

pub fn remove_poly_blocker(map: &mut MapState, req: ById) -> Outcome {
    let id = require(req.id, "id")?;
    let index = poly_blocker_index(map, id)?;
    map.poly_blockers.remove(index);
    Ok(())
}

/// Insert the midpoint of `vertID` and its successor right after `vertID`.
/// After the last corner the midpoint is inserted at the front.
pub fn add_vert(map: &mut MapState, req: AddVert) -> Outcome<EntityId> {
    let id = require(req.id, "id")?;
    let vert_id = require(req.vert_id, "vertID")?;
    let index = poly_blocker_index(map, id)?;
    let verts = &mut map.poly_blockers[index].verts;
    let at = vert_index(verts, vert_id)?;

    let next = (at + 1) % verts.len();
    let (a, b) = (verts[at], verts[next]);
    let mid = Vertex::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0);
    let mid_id = mid.id;
    verts.insert(next, mid);
    Ok(mid_id)
}

pub fn edit_vert(map: &mut MapState, req: EditVert) -> Outcome {
    let id = require(req.id, "id")?;
    let vert_id = require(req.vert_id, "vertID")?;
    let x = require(req.x, "x")?;
    let y = require(req.y, "y")?;
    let index = poly_blocker_index(map, id)?;
    let verts = &mut map.poly_blockers[index].verts;
    let at = vert_index(verts, vert_id)?;
    verts[at].x = x;
    verts[at].y = y;
    Ok(())
}

pub fn remove_vert(map: &mut MapState, req: RemoveVert) -> Outcome {
    let owner = require(req.owner, "type")?;
    let id = require(req.id, "id")?;
    let vert_id = require(req.vert_id, "vertID")?;

    let (verts, kind, min) = match owner {
        VertOwner::Blocker => {
            let index = poly_blocker_index(map, id)?;
            (
                &mut map.poly_blockers[index].verts,
                "poly blocker",
                MIN_POLY_VERTS,
            )
        }
        VertOwner::Line => {
            let index = drawing_index(map, id)?;
            let shape = &mut map.drawings[index];
            let tag = shape.kind.tag();
            let verts = shape.verts_mut().ok_or(Rejection::WrongShape {
                field: "vertID",
                shape: tag,
            })?;
            (verts, "vertex line", MIN_LINE_VERTS)
        }
    };

    let at = vert_index(verts, vert_id)?;
    if verts.len() <= min {
        return Err(Rejection::TooFewVertices { kind, min });
    }
    verts.remove(at);
    Ok(())
}
