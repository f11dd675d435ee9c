//! The authoritative session: one resident map, its store, and the sink that
//! fans snapshots out to viewers.
//!
//! Every accepted mutation runs in the same order: apply, broadcast the full
//! snapshot, persist. Rejected requests do neither.

use crate::linkage;
use crate::protocol::{ChangeSelectedMap, CreateNewMap, Ping, Request, RequestPing};
use crate::router::{self, Outcome, Rejection, require};
use rot_core::catalog::Catalog;
use rot_core::model::{MapState, SceneSnapshot};
use rot_core::store::{MapStore, is_valid_map_name, load_map, save_map};

/// Where snapshots and pings go. The server implements this over its
/// broadcast channel; tests record into a `Vec`.
pub trait SceneSink {
    fn publish_scene(&mut self, snapshot: &SceneSnapshot<'_>);
    fn publish_ping(&mut self, ping: Ping);
}

pub struct Session<S, K> {
    map: MapState,
    selected: String,
    catalog: Catalog,
    store: S,
    sink: K,
}

impl<S: MapStore, K: SceneSink> Session<S, K> {
    /// Load `selected` from `store`. A map that cannot be loaded is replaced
    /// by an empty one so the session can still serve viewers.
    pub fn open(store: S, sink: K, selected: &str) -> Self {
        let map = match load_map(&store, selected) {
            Ok(loaded) => {
                if !loaded.fixes.is_empty() {
                    log::info!(
                        "migrated map {selected:?} ({} fix(es), written back: {})",
                        loaded.fixes.len(),
                        loaded.written_back
                    );
                }
                loaded.map
            }
            Err(e) => {
                log::error!("{e}; starting with an empty map");
                MapState::new(selected)
            }
        };

        let mut session = Self {
            map,
            selected: selected.to_string(),
            catalog: Catalog::default(),
            store,
            sink,
        };
        linkage::anchor_all(&mut session.map);
        session.refresh_maps();
        session
    }

    pub fn map(&self) -> &MapState {
        &self.map
    }

    pub fn selected(&self) -> &str {
        &self.selected
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut K {
        &mut self.sink
    }

    pub fn snapshot(&self) -> SceneSnapshot<'_> {
        SceneSnapshot {
            map: &self.map,
            catalog: &self.catalog,
        }
    }

    /// Replace the asset listings. Returns whether anything changed; the
    /// caller decides whether to broadcast.
    pub fn set_catalog(&mut self, catalog: Catalog) -> bool {
        if catalog == self.catalog {
            return false;
        }
        self.catalog = catalog;
        true
    }

    /// Re-read the selectable map names from the store.
    pub fn refresh_maps(&mut self) {
        match self.store.list() {
            Ok(maps) => self.catalog.maps = maps,
            Err(e) => log::error!("failed to list maps: {e}"),
        }
    }

    /// Send the current snapshot to every viewer.
    pub fn broadcast(&mut self) {
        let snapshot = SceneSnapshot {
            map: &self.map,
            catalog: &self.catalog,
        };
        self.sink.publish_scene(&snapshot);
    }

    /// Apply one request. `Err` means nothing changed, nothing was sent and
    /// nothing was written.
    pub fn handle(&mut self, request: Request) -> Outcome {
        let event = request.event();
        let outcome = self.dispatch(request);
        match &outcome {
            Ok(()) => log::debug!("{event}: applied"),
            Err(rejection) => log::warn!("{event}: rejected, {rejection}"),
        }
        outcome
    }

    fn dispatch(&mut self, request: Request) -> Outcome {
        match request {
            Request::CreateNewMap(req) => self.create_map(req),
            Request::ChangeSelectedMap(req) => self.select_map(req),
            Request::RequestPing(req) => self.ping(req),

            Request::ChangeTurn(req) => self.mutate(|m| router::change_turn(m, req)),
            Request::SortTracker(_) => self.mutate(router::sort_tracker),
            Request::SwitchTrackerPosition(req) => {
                self.mutate(|m| router::switch_tracker_position(m, req))
            }

            Request::SetMapData(req) => self.mutate(|m| router::set_map_data(m, req)),
            Request::SwitchBlockerType(req) => {
                self.mutate(|m| router::switch_blocker_type(m, req))
            }
            Request::InvertBlockers(_) => self.mutate(router::invert_blockers),

            Request::CreateToken(req) => self.mutate(|m| router::create_token(m, req).map(drop)),
            Request::MoveToken(req) => self.mutate(|m| router::move_token(m, req)),
            Request::EditToken(req) => self.mutate(|m| router::edit_token(m, req)),
            Request::SetTokenHidden(req) => self.mutate(|m| router::set_token_hidden(m, req)),
            Request::RemoveToken(req) => self.mutate(|m| router::remove_token(m, req)),
            Request::ClearTokens(_) => self.mutate(router::clear_tokens),

            Request::AddDrawing(req) => self.mutate(|m| router::add_drawing(m, req).map(drop)),
            Request::EditDrawing(req) => self.mutate(|m| router::edit_drawing(m, req)),
            Request::RemoveDrawing(req) => self.mutate(|m| router::remove_drawing(m, req)),
            Request::ClearDrawings(_) => self.mutate(router::clear_drawings),

            Request::AddBlocker(req) => self.mutate(|m| router::add_blocker(m, req).map(drop)),
            Request::EditBlocker(req) => self.mutate(|m| router::edit_blocker(m, req)),
            Request::RemoveBlocker(req) => self.mutate(|m| router::remove_blocker(m, req)),
            Request::ClearBlockers(_) => self.mutate(router::clear_blockers),

            Request::AddPolyBlocker(req) => {
                self.mutate(|m| router::add_poly_blocker(m, req).map(drop))
            }
            Request::AddCustomPolyBlocker(req) => {
                self.mutate(|m| router::add_custom_poly_blocker(m, req).map(drop))
            }
            Request::MovePolyBlocker(req) => self.mutate(|m| router::move_poly_blocker(m, req)),
            Request::TogglePolyBlocker(req) => {
                self.mutate(|m| router::toggle_poly_blocker(m, req))
            }
            Request::RemovePolyBlocker(req) => {
                self.mutate(|m| router::remove_poly_blocker(m, req))
            }
            Request::AddVert(req) => self.mutate(|m| router::add_vert(m, req).map(drop)),
            Request::EditVert(req) => self.mutate(|m| router::edit_vert(m, req)),
            Request::RemoveVert(req) => self.mutate(|m| router::remove_vert(m, req)),
        }
    }

    fn mutate(&mut self, op: impl FnOnce(&mut MapState) -> Outcome) -> Outcome {
        op(&mut self.map)?;
        self.broadcast();
        self.persist();
        Ok(())
    }

    /// Write failures are logged by the store layer and do not roll back
    /// the in-memory map.
    fn persist(&self) {
        save_map(&self.store, &self.selected, &self.map);
    }

    fn ping(&mut self, req: RequestPing) -> Outcome {
        let x = require(req.ping_x, "pingX")?;
        let y = require(req.ping_y, "pingY")?;
        self.sink.publish_ping(Ping::at(x, y));
        Ok(())
    }

    /// Switch the resident map. The previous map was already persisted by
    /// its last mutation.
    fn select_map(&mut self, req: ChangeSelectedMap) -> Outcome {
        let name = require(req.selected_map, "selectedMap")?;
        if !is_valid_map_name(&name) {
            return Err(Rejection::InvalidMapName(name));
        }

        let map = match load_map(&self.store, &name) {
            Ok(loaded) => loaded.map,
            Err(e) if e.is_unreadable() => {
                log::warn!("{e}; serving {name:?} as an empty map");
                MapState::new(name.as_str())
            }
            Err(e) => {
                return Err(Rejection::LoadFailed {
                    name,
                    reason: e.to_string(),
                });
            }
        };

        log::info!("switched map {:?} -> {name:?}", self.selected);
        self.map = map;
        self.selected = name;
        linkage::anchor_all(&mut self.map);
        self.refresh_maps();
        self.broadcast();
        Ok(())
    }

    /// Write a blank map under a new name. The selected map is unchanged.
    fn create_map(&mut self, req: CreateNewMap) -> Outcome {
        let name = require(req.name, "name")?;
        if !is_valid_map_name(&name) {
            return Err(Rejection::InvalidMapName(name));
        }
        if self.store.contains(&name) {
            return Err(Rejection::MapExists(name));
        }
        if !save_map(&self.store, &name, &MapState::new(name.as_str())) {
            return Err(Rejection::WriteFailed(name));
        }

        log::info!("created map {name:?}");
        self.refresh_maps();
        self.broadcast();
        Ok(())
    }
}
