//! Room of Thought server binary.
//!
//! Loads the selected map, keeps the asset catalog fresh and serves viewers
//! over WebSocket until interrupted.

use clap::Parser;
use rot_core::store::FileStore;
use rot_server::{Config, hub, rescan, server};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config = Config::parse();

    std::fs::create_dir_all(&config.data_dir)?;
    let store = FileStore::new(&config.data_dir);
    let dirs = config.asset_dirs();

    let (hub, _actor) = hub::spawn(store.clone(), &config.map);
    rescan::rescan_once(&hub, &store, &dirs).await;
    if let Some(every) = config.poll_interval() {
        rescan::spawn(hub.clone(), store.clone(), dirs, every);
    }

    let listener = TcpListener::bind(config.listen_addr()).await?;
    log::info!(
        "listening on {} (data in {})",
        listener.local_addr()?,
        config.data_dir.display()
    );

    tokio::select! {
        () = server::serve(listener, hub) => {}
        signal = tokio::signal::ctrl_c() => {
            signal?;
            log::info!("shutting down");
        }
    }
    Ok(())
}
