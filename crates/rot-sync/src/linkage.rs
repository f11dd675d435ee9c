//! Derived motion: group cascades and token anchoring.
//!
//! Two relations make one edit move several entities:
//!
//! - **groups**: tokens (or drawings) sharing a group number translate by
//!   the same delta as the one being moved;
//! - **links**: a drawing with `link` set always sits at its token's position.
//!
//! Token groups and drawing groups are separate number spaces. Linked
//! drawings are never moved by a drawing-group cascade; they follow their
//! token instead.

use rot_core::id::EntityId;
use rot_core::model::{GroupId, MapState, Shape};
use smallvec::SmallVec;

/// Translate every drawing in `group` by `(dx, dy)`, except `origin` itself
/// and drawings anchored to a token. Returns how many drawings moved.
pub fn move_shape_group(
    drawings: &mut [Shape],
    origin: EntityId,
    dx: f64,
    dy: f64,
    group: GroupId,
) -> usize {
    let mut moved = 0;
    for shape in drawings
        .iter_mut()
        .filter(|s| s.id != origin && s.group == Some(group) && s.link.is_none())
    {
        shape.translate(dx, dy);
        moved += 1;
    }
    moved
}

/// Snap every drawing linked to `token` onto `position`, cascading each
/// snapped drawing's delta through its drawing group.
pub fn anchor_linked_shapes(drawings: &mut [Shape], token: EntityId, position: (f64, f64)) {
    let (tx, ty) = position;
    let mut cascades: SmallVec<[(EntityId, f64, f64, GroupId); 2]> = SmallVec::new();

    for shape in drawings.iter_mut().filter(|s| s.link == Some(token)) {
        let Some((sx, sy)) = shape.position() else {
            log::warn!(
                "{} {} is linked to token {token} but has no anchor point",
                shape.kind.tag(),
                shape.id
            );
            continue;
        };
        if let Some(group) = shape.group {
            cascades.push((shape.id, tx - sx, ty - sy, group));
        }
        shape.set_position(tx, ty);
    }

    // Cascades skip linked drawings, so applying them after the snap is
    // the same as applying them inline.
    for (origin, dx, dy, group) in cascades {
        move_shape_group(drawings, origin, dx, dy, group);
    }
}

/// Move token `id` to `(x, y)`.
///
/// Unless `bypass_group` is set, every other token in the same group moves
/// by the same delta. Linked drawings of every moved token are re-anchored.
/// Returns the ids of the moved tokens (the target last), or `None` when
/// `id` is unknown.
pub fn move_token(
    map: &mut MapState,
    id: EntityId,
    x: f64,
    y: f64,
    bypass_group: bool,
) -> Option<SmallVec<[EntityId; 4]>> {
    let (old_x, old_y, group) = {
        let token = map.token(id)?;
        (token.x, token.y, token.group)
    };
    let (dx, dy) = (x - old_x, y - old_y);
    let mut moved: SmallVec<[EntityId; 4]> = SmallVec::new();

    if let Some(group) = group
        && !bypass_group
    {
        for other in map
            .tokens
            .iter_mut()
            .filter(|t| t.id != id && t.group == Some(group))
        {
            other.x += dx;
            other.y += dy;
            moved.push(other.id);
        }
    }

    if let Some(token) = map.token_mut(id) {
        token.x = x;
        token.y = y;
    }
    moved.push(id);

    for &token_id in &moved {
        if let Some(position) = map.token(token_id).map(|t| t.position()) {
            anchor_linked_shapes(&mut map.drawings, token_id, position);
        }
    }

    log::debug!("moved {} token(s) by ({dx}, {dy})", moved.len());
    Some(moved)
}

/// Re-anchor the drawings of every token. Used after loads and bulk edits.
pub fn anchor_all(map: &mut MapState) {
    let positions: Vec<(EntityId, (f64, f64))> =
        map.tokens.iter().map(|t| (t.id, t.position())).collect();
    for (id, position) in positions {
        anchor_linked_shapes(&mut map.drawings, id, position);
    }
}
