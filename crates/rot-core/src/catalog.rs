//! Asset catalog: the file listings viewers pick token images, backgrounds
//! and maps from.
//!
//! The catalog is derived state. It is rebuilt from directory listings and
//! merged into every snapshot, but never written into a map file.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Image extensions accepted for tokens.
pub const TOKEN_EXTENSIONS: &[&str] = &["jpg", "png", "jpeg", "gif"];

/// Media extensions accepted for map backgrounds (video maps included).
pub const MAP_SOURCE_EXTENSIONS: &[&str] = &["jpg", "png", "jpeg", "gif", "webm", "mp4"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    /// Selectable map names (data file stems).
    pub maps: Vec<String>,
    pub token_list: Vec<String>,
    pub dm_token_list: Vec<String>,
    pub map_source_list: Vec<String>,
}

/// Where the public asset folders live.
#[derive(Debug, Clone)]
pub struct AssetDirs {
    pub tokens: PathBuf,
    pub dm_tokens: PathBuf,
    pub map_sources: PathBuf,
}

impl AssetDirs {
    /// The standard `tokens/`, `dmTokens/`, `maps/` layout under `public`.
    pub fn under(public: &Path) -> Self {
        Self {
            tokens: public.join("tokens"),
            dm_tokens: public.join("dmTokens"),
            map_sources: public.join("maps"),
        }
    }
}

impl Catalog {
    /// Rescan the asset folders. `maps` is supplied by the caller because it
    /// comes from the map store, not from the public folders.
    pub fn scan(dirs: &AssetDirs, maps: Vec<String>) -> Self {
        Self {
            maps,
            token_list: list_files(&dirs.tokens, TOKEN_EXTENSIONS),
            dm_token_list: list_files(&dirs.dm_tokens, TOKEN_EXTENSIONS),
            map_source_list: list_files(&dirs.map_sources, MAP_SOURCE_EXTENSIONS),
        }
    }
}

/// File names in `dir` whose extension is one of `extensions`
/// (case-insensitive), sorted. A missing or unreadable directory yields an
/// empty list.
pub fn list_files(dir: &Path, extensions: &[&str]) -> Vec<String> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::error!("failed to list {}: {e}", dir.display());
            }
            return Vec::new();
        }
    };

    let mut names: Vec<String> = entries
        .flatten()
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| has_extension(name, extensions))
        .collect();
    names.sort();
    names
}

fn has_extension(name: &str, extensions: &[&str]) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn lists_matching_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["orc.png", "Bard.JPG", "notes.txt", "wolf.gif"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("nested.png")).unwrap();

        let listed = list_files(dir.path(), TOKEN_EXTENSIONS);
        assert_eq!(listed, vec!["Bard.JPG", "orc.png", "wolf.gif"]);
    }

    #[test]
    fn missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_files(&dir.path().join("absent"), TOKEN_EXTENSIONS).is_empty());
    }

    #[test]
    fn scan_reads_all_three_folders() {
        let public = tempfile::tempdir().unwrap();
        let dirs = AssetDirs::under(public.path());
        fs::create_dir_all(&dirs.tokens).unwrap();
        fs::create_dir_all(&dirs.dm_tokens).unwrap();
        fs::create_dir_all(&dirs.map_sources).unwrap();
        fs::write(dirs.tokens.join("a.png"), b"").unwrap();
        fs::write(dirs.dm_tokens.join("boss.jpeg"), b"").unwrap();
        fs::write(dirs.map_sources.join("cave.mp4"), b"").unwrap();

        let catalog = Catalog::scan(&dirs, vec!["dungeon".into()]);
        assert_eq!(catalog.maps, vec!["dungeon"]);
        assert_eq!(catalog.token_list, vec!["a.png"]);
        assert_eq!(catalog.dm_token_list, vec!["boss.jpeg"]);
        assert_eq!(catalog.map_source_list, vec!["cave.mp4"]);
    }
}
