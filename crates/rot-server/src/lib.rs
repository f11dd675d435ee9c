//! Room of Thought server: configuration, the session hub and the
//! WebSocket transport.

pub mod config;
pub mod hub;
pub mod rescan;
pub mod server;

pub use config::Config;
pub use hub::HubHandle;
