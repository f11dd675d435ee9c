//! Map persistence: one JSON document per named map.
//!
//! Reads are synchronous and retried a bounded number of times; writes never
//! propagate failure to the caller. The in-memory map stays authoritative
//! even when the disk does not cooperate.

use crate::catalog::list_files;
use crate::migrate::{Fix, MigrateError, migrate};
use crate::model::MapState;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// How many times a read is attempted before the map counts as unreadable.
pub const READ_ATTEMPTS: usize = 5;

/// File extension of map documents.
pub const MAP_EXTENSION: &str = "json";

/// Backing storage for named map documents.
pub trait MapStore {
    /// Read the raw document for `name`.
    fn read(&self, name: &str) -> io::Result<String>;

    /// Replace the raw document for `name`.
    fn write(&self, name: &str, contents: &str) -> io::Result<()>;

    /// Names of every stored map, sorted.
    fn list(&self) -> io::Result<Vec<String>>;

    fn contains(&self, name: &str) -> bool {
        self.list()
            .map(|names| names.iter().any(|n| n == name))
            .unwrap_or(false)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("could not read map `{name}` after {attempts} attempts")]
    Unreadable { name: String, attempts: usize },
    #[error("map `{name}` is not valid JSON: {source}")]
    Syntax {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("map `{name}` is structurally broken: {source}")]
    Structure {
        name: String,
        #[source]
        source: MigrateError,
    },
    #[error("map `{name}` does not match the map schema: {source}")]
    Schema {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

impl LoadError {
    /// Unreadable maps degrade to an empty map; everything else is fatal to
    /// the load.
    pub fn is_unreadable(&self) -> bool {
        matches!(self, LoadError::Unreadable { .. })
    }
}

/// A successfully loaded (and, if needed, migrated) map.
#[derive(Debug)]
pub struct LoadedMap {
    pub map: MapState,
    pub fixes: Vec<Fix>,
    /// Whether migrated content was persisted back.
    pub written_back: bool,
}

/// Map names become file stems, so they must not escape the data directory.
pub fn is_valid_map_name(name: &str) -> bool {
    !name.trim().is_empty()
        && !name.starts_with('.')
        && !name.chars().any(|c| c == '/' || c == '\\' || c.is_control())
}

/// Load, migrate and deserialize the map called `name`.
///
/// If any migration step fired the migrated map is written straight back,
/// so the next load finds a current document.
pub fn load_map<S: MapStore + ?Sized>(store: &S, name: &str) -> Result<LoadedMap, LoadError> {
    let raw = read_with_retry(store, name)?;
    let mut doc: serde_json::Value =
        serde_json::from_str(&raw).map_err(|source| LoadError::Syntax {
            name: name.to_string(),
            source,
        })?;
    let fixes = migrate(&mut doc).map_err(|source| LoadError::Structure {
        name: name.to_string(),
        source,
    })?;
    let mut map: MapState = serde_json::from_value(doc).map_err(|source| LoadError::Schema {
        name: name.to_string(),
        source,
    })?;
    map.map_name = name.to_string();

    let written_back = if fixes.is_empty() {
        false
    } else {
        log::info!("migrated map `{name}` ({fixes:?}), writing back");
        save_map(store, name, &map)
    };

    Ok(LoadedMap {
        map,
        fixes,
        written_back,
    })
}

fn read_with_retry<S: MapStore + ?Sized>(store: &S, name: &str) -> Result<String, LoadError> {
    for attempt in 1..=READ_ATTEMPTS {
        match store.read(name) {
            Ok(raw) => return Ok(raw),
            Err(e) => log::error!("reading map `{name}` failed (attempt {attempt}): {e}"),
        }
    }
    Err(LoadError::Unreadable {
        name: name.to_string(),
        attempts: READ_ATTEMPTS,
    })
}

/// Persist `map` under `name`. Failures are logged and reported as `false`.
pub fn save_map<S: MapStore + ?Sized>(store: &S, name: &str, map: &MapState) -> bool {
    let text = match to_pretty_json(map) {
        Ok(text) => text,
        Err(e) => {
            log::error!("serializing map `{name}` failed: {e}");
            return false;
        }
    };
    match store.write(name, &text) {
        Ok(()) => true,
        Err(e) => {
            log::error!("writing map `{name}` failed: {e}");
            false
        }
    }
}

/// Serialize with a four-space indent, the layout map files have always had.
pub fn to_pretty_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    String::from_utf8(buf).map_err(<serde_json::Error as serde::ser::Error>::custom)
}

// ─── File store ──────────────────────────────────────────────────────────

/// Maps stored as `<root>/<name>.json`. The directory listing is the list of
/// selectable maps.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.{MAP_EXTENSION}"))
    }
}

impl MapStore for FileStore {
    fn read(&self, name: &str) -> io::Result<String> {
        fs::read_to_string(self.path_for(name))
    }

    fn write(&self, name: &str, contents: &str) -> io::Result<()> {
        write_atomic(&self.path_for(name), contents.as_bytes())
    }

    fn list(&self) -> io::Result<Vec<String>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        Ok(list_files(&self.root, &[MAP_EXTENSION])
            .into_iter()
            .filter_map(|file| {
                Path::new(&file)
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .map(str::to_string)
            })
            .collect())
    }
}

/// Write through a sibling temp file so a crash never leaves half a map.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("map.json");
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));
    fs::write(&tmp_path, bytes)?;
    if let Err(error) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(error);
    }
    Ok(())
}

// ─── Memory store ────────────────────────────────────────────────────────

/// In-process store for embedding and tests. Failures can be injected to
/// exercise the retry and write-failure paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: Mutex<BTreeMap<String, String>>,
    writes: AtomicUsize,
    reads: AtomicUsize,
    failing_reads: AtomicUsize,
    failing_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_doc(name: &str, contents: &str) -> Self {
        let store = Self::new();
        store.insert(name, contents);
        store
    }

    pub fn insert(&self, name: &str, contents: &str) {
        self.docs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), contents.to_string());
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.docs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of read attempts so far, failed ones included.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Make the next `n` reads fail.
    pub fn fail_next_reads(&self, n: usize) {
        self.failing_reads.store(n, Ordering::SeqCst);
    }

    /// Make every write fail until switched off again.
    pub fn fail_writes(&self, fail: bool) {
        self.failing_writes.store(fail, Ordering::SeqCst);
    }
}

impl MapStore for MemoryStore {
    fn read(&self, name: &str) -> io::Result<String> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let pending = self.failing_reads.load(Ordering::SeqCst);
        if pending > 0 {
            self.failing_reads.store(pending - 1, Ordering::SeqCst);
            return Err(io::Error::other("injected read failure"));
        }
        self.get(name)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no map `{name}`")))
    }

    fn write(&self, name: &str, contents: &str) -> io::Result<()> {
        if self.failing_writes.load(Ordering::SeqCst) {
            return Err(io::Error::other("injected write failure"));
        }
        self.insert(name, contents);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn list(&self) -> io::Result<Vec<String>> {
        Ok(self
            .docs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Token;
    use pretty_assertions::assert_eq;

    #[test]
    fn map_names_cannot_escape_the_directory() {
        assert!(is_valid_map_name("Goblin Cave"));
        assert!(!is_valid_map_name(""));
        assert!(!is_valid_map_name("   "));
        assert!(!is_valid_map_name("../etc/passwd"));
        assert!(!is_valid_map_name("a/b"));
        assert!(!is_valid_map_name("a\\b"));
        assert!(!is_valid_map_name(".hidden"));
    }

    #[test]
    fn pretty_json_uses_four_spaces() {
        let text = to_pretty_json(&serde_json::json!({ "a": 1 })).unwrap();
        assert_eq!(text, "{\n    \"a\": 1\n}");
    }

    #[test]
    fn read_is_retried_until_it_succeeds() {
        let store = MemoryStore::new();
        save_map(&store, "m", &MapState::new("m"));
        store.fail_next_reads(READ_ATTEMPTS - 1);

        let loaded = load_map(&store, "m").unwrap();
        assert_eq!(loaded.map.map_name, "m");
        assert_eq!(store.read_count(), READ_ATTEMPTS);
    }

    #[test]
    fn read_gives_up_after_bounded_attempts() {
        let store = MemoryStore::new();
        let err = load_map(&store, "absent").unwrap_err();
        assert!(err.is_unreadable());
        assert_eq!(store.read_count(), READ_ATTEMPTS);
    }

    #[test]
    fn save_failure_is_reported_not_raised() {
        let store = MemoryStore::new();
        store.fail_writes(true);
        assert!(!save_map(&store, "m", &MapState::new("m")));
        assert_eq!(store.get("m"), None);
    }

    #[test]
    fn file_store_roundtrip_and_listing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("data"));
        assert_eq!(store.list().unwrap(), Vec::<String>::new());

        let mut map = MapState::new("arena");
        map.tokens.push(Token::new(10.0, 20.0, 1.0, true));
        assert!(save_map(&store, "arena", &map));
        assert!(save_map(&store, "crypt", &MapState::new("crypt")));
        fs::write(dir.path().join("data").join("readme.txt"), "x").unwrap();

        assert_eq!(store.list().unwrap(), vec!["arena", "crypt"]);
        assert!(store.contains("arena"));
        assert!(!store.path_for("arena").with_extension("json.tmp").exists());

        let loaded = load_map(&store, "arena").unwrap();
        assert_eq!(loaded.map, map);
        assert!(loaded.fixes.is_empty());
        assert!(!loaded.written_back);
    }

    #[test]
    fn broken_documents_are_not_unreadable() {
        let store = MemoryStore::with_doc("junk", "not json");
        assert!(matches!(
            load_map(&store, "junk"),
            Err(LoadError::Syntax { .. })
        ));

        let store = MemoryStore::with_doc("partial", r#"{"tokens": []}"#);
        assert!(matches!(
            load_map(&store, "partial"),
            Err(LoadError::Structure { .. })
        ));
    }
}
