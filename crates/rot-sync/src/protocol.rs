//! Wire protocol: one tagged request variant per inbound event, plus the
//! two outbound events.
//!
//! Frames are JSON objects `{"event": "<name>", "data": {...}}`. Payload
//! fields are all optional at the serde level so that a missing field turns
//! into a logged rejection by the router instead of a dropped frame.
//! Events without a payload accept a missing `data`, `null` or `{}`.
//!
//! Ids in requests are resolved against ids already in use and never
//! interned; an id nothing owns arrives as [`EntityId::unknown`].

use rot_core::id::EntityId;
use rot_core::model::{DiagonalRule, GroupId, SceneSnapshot, Vertex};
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

/// How long viewers keep a ping marker on screen.
pub const PING_TTL_MS: u64 = 5000;

// ─── Tri-state field ─────────────────────────────────────────────────────

/// An edit field that distinguishes "leave alone" (absent) from "reset"
/// (`null`) and "set" (a value).
///
/// Use with `#[serde(default)]` so an absent field becomes `Keep`.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch<T> {
    Keep,
    Clear,
    Set(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Keep
    }
}

impl<T> Patch<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, Patch::Keep)
    }

    pub fn as_set(&self) -> Option<&T> {
        match self {
            Patch::Set(v) => Some(v),
            _ => None,
        }
    }

    /// Write this patch into an optional slot.
    pub fn apply_to(self, slot: &mut Option<T>) {
        match self {
            Patch::Keep => {}
            Patch::Clear => *slot = None,
            Patch::Set(v) => *slot = Some(v),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(v) => Patch::Set(v),
            None => Patch::Clear,
        })
    }
}

// ─── Request ids ─────────────────────────────────────────────────────────

fn known_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<EntityId>, D::Error> {
    let id = Option::<String>::deserialize(deserializer)?;
    Ok(id.map(|s| EntityId::resolve(&s)))
}

/// The `data` of an event that carries nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoPayload;

impl<'de> Deserialize<'de> for NoPayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<IgnoredAny>::deserialize(deserializer)?;
        Ok(NoPayload)
    }
}

// ─── Payloads ────────────────────────────────────────────────────────────

/// A point sent by a client; `id` is present when editing existing vertices.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct VertexInput {
    #[serde(default, deserialize_with = "known_id")]
    pub id: Option<EntityId>,
    pub x: f64,
    pub y: f64,
}

impl VertexInput {
    /// Keep the client's id when it names an existing vertex, otherwise mint
    /// a new one.
    pub fn into_vertex(self) -> Vertex {
        match self.id {
            Some(id) if !id.is_unknown() => Vertex {
                id,
                x: self.x,
                y: self.y,
            },
            _ => Vertex::new(self.x, self.y),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ById {
    #[serde(deserialize_with = "known_id")]
    pub id: Option<EntityId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateNewMap {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChangeSelectedMap {
    pub selected_map: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChangeTurn {
    /// `None` ends the turn order display.
    #[serde(deserialize_with = "known_id")]
    pub id: Option<EntityId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RequestPing {
    pub ping_x: Option<f64>,
    pub ping_y: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SwitchBlockerType {
    #[serde(rename = "type")]
    pub blocker_type: Option<u8>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SetMapData {
    pub grid_color: Option<String>,
    pub map: Option<String>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub offset_x: Option<f64>,
    pub offset_y: Option<f64>,
    pub diagonal_movement: Option<DiagonalRule>,
    pub system: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AddDrawing {
    pub shape: Option<String>,
    pub visible: Option<bool>,
    pub true_color: Option<String>,
    #[serde(deserialize_with = "known_id")]
    pub link: Option<EntityId>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub radius: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub angle: Option<f64>,
    pub range: Option<f64>,
    #[serde(rename = "is90Deg")]
    pub is_90_deg: Option<bool>,
    pub verts: Option<Vec<VertexInput>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EditDrawing {
    #[serde(deserialize_with = "known_id")]
    pub id: Option<EntityId>,
    pub group: Patch<GroupId>,
    pub visible: Option<bool>,
    pub verts: Option<Vec<VertexInput>>,
    pub radius: Option<f64>,
    pub angle: Option<f64>,
    pub range: Option<f64>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    /// Translate every vertex of a vertex line so the first lands on (x, y).
    pub both: Option<bool>,
    /// `Some(false)` moves only this drawing, not its group.
    pub move_shape_group: Option<bool>,
}

/// Which kind of owner a vertex removal addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum VertOwner {
    #[serde(rename = "blocker")]
    Blocker,
    #[serde(rename = "line")]
    Line,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AddVert {
    #[serde(deserialize_with = "known_id")]
    pub id: Option<EntityId>,
    #[serde(rename = "vertID", deserialize_with = "known_id")]
    pub vert_id: Option<EntityId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EditVert {
    #[serde(deserialize_with = "known_id")]
    pub id: Option<EntityId>,
    #[serde(rename = "vertID", deserialize_with = "known_id")]
    pub vert_id: Option<EntityId>,
    pub x: Option<f64>,
    pub y: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoveVert {
    #[serde(rename = "type")]
    pub owner: Option<VertOwner>,
    #[serde(deserialize_with = "known_id")]
    pub id: Option<EntityId>,
    #[serde(rename = "vertID", deserialize_with = "known_id")]
    pub vert_id: Option<EntityId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SquareOffset {
    /// Half the side length of the square.
    pub min: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AddPolyBlocker {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub offset: Option<SquareOffset>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AddCustomPolyBlocker {
    pub new_poly_blocker_verts: Option<Vec<VertexInput>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MovePolyBlocker {
    #[serde(deserialize_with = "known_id")]
    pub id: Option<EntityId>,
    pub offset_x: Option<f64>,
    pub offset_y: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AddBlocker {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EditBlocker {
    #[serde(deserialize_with = "known_id")]
    pub id: Option<EntityId>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateToken {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub size: Option<f64>,
    pub dm: Option<bool>,
    pub layer: Option<i32>,
    pub text: Option<String>,
    pub image: Option<String>,
    pub name: Option<String>,
    pub notes: Option<String>,
    pub initiative: Option<f64>,
    pub ac: Option<f64>,
    pub hp: Option<String>,
    pub status: Option<String>,
    pub group: Option<GroupId>,
    pub concentrating: Option<bool>,
    pub hide_tracker: Option<bool>,
    pub hidden: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MoveToken {
    #[serde(deserialize_with = "known_id")]
    pub id: Option<EntityId>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    /// Move only this token, not the rest of its group.
    pub bypass_link: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EditToken {
    #[serde(deserialize_with = "known_id")]
    pub id: Option<EntityId>,
    pub size: Option<f64>,
    pub layer: Option<i32>,
    pub text: Option<String>,
    pub dm: Option<bool>,
    pub concentrating: Option<bool>,
    pub hide_tracker: Option<bool>,
    pub status: Patch<String>,
    pub notes: Patch<String>,
    pub group: Patch<GroupId>,
    pub initiative: Patch<f64>,
    pub name: Patch<String>,
    pub ac: Patch<f64>,
    pub mental_def: Patch<f64>,
    pub physical_def: Patch<f64>,
    pub ref_def: Patch<f64>,
    pub fort_def: Patch<f64>,
    pub will_def: Patch<f64>,
    pub hp: Patch<String>,
    pub image: Patch<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SetTokenHidden {
    #[serde(deserialize_with = "known_id")]
    pub id: Option<EntityId>,
    pub hidden: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SwitchTrackerPosition {
    #[serde(deserialize_with = "known_id")]
    pub origin: Option<EntityId>,
    #[serde(deserialize_with = "known_id")]
    pub target: Option<EntityId>,
}

// ─── Inbound ─────────────────────────────────────────────────────────────

/// Every event a viewer can send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum Request {
    CreateNewMap(CreateNewMap),
    ChangeSelectedMap(ChangeSelectedMap),
    RequestPing(RequestPing),

    ChangeTurn(ChangeTurn),
    SortTracker(NoPayload),
    SwitchTrackerPosition(SwitchTrackerPosition),

    SetMapData(SetMapData),
    SwitchBlockerType(SwitchBlockerType),
    InvertBlockers(NoPayload),

    CreateToken(CreateToken),
    MoveToken(MoveToken),
    EditToken(EditToken),
    SetTokenHidden(SetTokenHidden),
    RemoveToken(ById),
    ClearTokens(NoPayload),

    AddDrawing(AddDrawing),
    EditDrawing(EditDrawing),
    RemoveDrawing(ById),
    ClearDrawings(NoPayload),

    AddBlocker(AddBlocker),
    EditBlocker(EditBlocker),
    RemoveBlocker(ById),
    ClearBlockers(NoPayload),

    AddPolyBlocker(AddPolyBlocker),
    AddCustomPolyBlocker(AddCustomPolyBlocker),
    MovePolyBlocker(MovePolyBlocker),
    TogglePolyBlocker(ById),
    RemovePolyBlocker(ById),
    AddVert(AddVert),
    EditVert(EditVert),
    RemoveVert(RemoveVert),
}

impl Request {
    /// Parse one text frame.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// The wire event name, for logs.
    pub fn event(&self) -> &'static str {
        match self {
            Request::CreateNewMap(_) => "createNewMap",
            Request::ChangeSelectedMap(_) => "changeSelectedMap",
            Request::RequestPing(_) => "requestPing",
            Request::ChangeTurn(_) => "changeTurn",
            Request::SortTracker(_) => "sortTracker",
            Request::SwitchTrackerPosition(_) => "switchTrackerPosition",
            Request::SetMapData(_) => "setMapData",
            Request::SwitchBlockerType(_) => "switchBlockerType",
            Request::InvertBlockers(_) => "invertBlockers",
            Request::CreateToken(_) => "createToken",
            Request::MoveToken(_) => "moveToken",
            Request::EditToken(_) => "editToken",
            Request::SetTokenHidden(_) => "setTokenHidden",
            Request::RemoveToken(_) => "removeToken",
            Request::ClearTokens(_) => "clearTokens",
            Request::AddDrawing(_) => "addDrawing",
            Request::EditDrawing(_) => "editDrawing",
            Request::RemoveDrawing(_) => "removeDrawing",
            Request::ClearDrawings(_) => "clearDrawings",
            Request::AddBlocker(_) => "addBlocker",
            Request::EditBlocker(_) => "editBlocker",
            Request::RemoveBlocker(_) => "removeBlocker",
            Request::ClearBlockers(_) => "clearBlockers",
            Request::AddPolyBlocker(_) => "addPolyBlocker",
            Request::AddCustomPolyBlocker(_) => "addCustomPolyBlocker",
            Request::MovePolyBlocker(_) => "movePolyBlocker",
            Request::TogglePolyBlocker(_) => "togglePolyBlocker",
            Request::RemovePolyBlocker(_) => "removePolyBlocker",
            Request::AddVert(_) => "addVert",
            Request::EditVert(_) => "editVert",
            Request::RemoveVert(_) => "removeVert",
        }
    }
}

// ─── Outbound ────────────────────────────────────────────────────────────

/// A transient pointer marker. Never part of the persisted map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ping {
    pub ping_x: f64,
    pub ping_y: f64,
    pub ttl_ms: u64,
}

impl Ping {
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            ping_x: x,
            ping_y: y,
            ttl_ms: PING_TTL_MS,
        }
    }
}

/// Every event the server sends.
#[derive(Debug, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum Outbound<'a> {
    CurrentMapData(SceneSnapshot<'a>),
    PingAt(Ping),
}

impl Outbound<'_> {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
