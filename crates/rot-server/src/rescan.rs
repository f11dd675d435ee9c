//! Periodic asset rescans.

use crate::hub::HubHandle;
use rot_core::catalog::{AssetDirs, Catalog};
use rot_core::store::{FileStore, MapStore};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Scan the asset folders and the map directory.
pub fn scan(store: &FileStore, dirs: &AssetDirs) -> Catalog {
    let maps = store.list().unwrap_or_else(|e| {
        log::error!("failed to list maps in {}: {e}", store.root().display());
        Vec::new()
    });
    Catalog::scan(dirs, maps)
}

/// Scan off the async workers and hand the result to the hub.
pub async fn rescan_once(hub: &HubHandle, store: &FileStore, dirs: &AssetDirs) -> bool {
    let (store, dirs) = (store.clone(), dirs.clone());
    match tokio::task::spawn_blocking(move || scan(&store, &dirs)).await {
        Ok(catalog) => hub.set_catalog(catalog).await,
        Err(e) => {
            log::error!("asset scan panicked: {e}");
            true
        }
    }
}

/// Rescan every `every` until the hub stops.
pub fn spawn(hub: HubHandle, store: FileStore, dirs: AssetDirs, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if !rescan_once(&hub, &store, &dirs).await {
                break;
            }
        }
        log::debug!("asset rescans stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn scan_combines_maps_and_assets() {
        let data = tempfile::tempdir().unwrap();
        let public = tempfile::tempdir().unwrap();
        fs::write(data.path().join("keep.json"), "{}").unwrap();
        let dirs = AssetDirs::under(public.path());
        fs::create_dir_all(&dirs.map_sources).unwrap();
        fs::write(dirs.map_sources.join("forest.webm"), b"").unwrap();

        let catalog = scan(&FileStore::new(data.path()), &dirs);
        assert_eq!(catalog.maps, vec!["keep"]);
        assert_eq!(catalog.map_source_list, vec!["forest.webm"]);
        assert!(catalog.token_list.is_empty());
    }
}
