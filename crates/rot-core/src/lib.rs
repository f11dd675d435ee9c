pub mod catalog;
pub mod id;
pub mod migrate;
pub mod model;
pub mod store;

pub use catalog::{AssetDirs, Catalog};
pub use id::EntityId;
pub use migrate::{Fix, MigrateError, migrate};
pub use model::*;
pub use store::{FileStore, LoadError, LoadedMap, MapStore, MemoryStore, load_map, save_map};
