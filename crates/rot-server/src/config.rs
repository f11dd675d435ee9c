//! Process configuration from flags, falling back to `ROT_*` environment
//! variables.

use clap::Parser;
use rot_core::catalog::AssetDirs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "rot-server",
    version,
    about = "Authoritative scene server for Room of Thought"
)]
pub struct Config {
    /// TCP port for WebSocket viewers.
    #[arg(long, env = "ROT_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Directory holding one `<map>.json` per map.
    #[arg(long, env = "ROT_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Directory with the `tokens/`, `dmTokens/` and `maps/` asset folders.
    #[arg(long, env = "ROT_PUBLIC_DIR", default_value = "client/public")]
    pub public_dir: PathBuf,

    /// Asset rescan period in milliseconds. 0 disables rescans.
    #[arg(long, env = "ROT_POLL_INTERVAL_MS", default_value_t = 15_000)]
    pub poll_interval_ms: u64,

    /// Map selected at startup.
    #[arg(long, env = "ROT_MAP", default_value = "currentSettings")]
    pub map: String,
}

impl Config {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        (self.poll_interval_ms > 0).then(|| Duration::from_millis(self.poll_interval_ms))
    }

    pub fn asset_dirs(&self) -> AssetDirs {
        AssetDirs::under(&self.public_dir)
    }
}
