//! File-backed page store
//!
//! Stores each key as a JSON file in an XDG-compliant cache directory
//! (`~/.cache/prayerclock/` on Linux), with an optional byte quota across
//! all files in the directory.

use super::store::{PageStore, StoreError};
use directories::ProjectDirs;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Page store writing one `{key}.json` file per entry
#[derive(Debug, Clone)]
pub struct FileStore {
    /// Directory where cache files are stored
    cache_dir: PathBuf,
    /// Maximum total size of all files, in bytes
    quota_bytes: Option<u64>,
}

impl FileStore {
    /// Creates a FileStore using the XDG-compliant cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no
    /// home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "prayerclock")?;
        Some(Self::with_dir(project_dirs.cache_dir().to_path_buf()))
    }

    /// Creates a FileStore with a custom cache directory
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            quota_bytes: None,
        }
    }

    /// Limits the total size of stored files
    pub fn with_quota(mut self, quota_bytes: u64) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }

    /// Directory where cache files are stored
    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the path to the file for the given key
    fn cache_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", sanitize(key)))
    }

    /// Ensures the cache directory exists
    fn ensure_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.cache_dir)
    }

    /// Total size of stored files, not counting `exclude`
    fn used_bytes(&self, exclude: &Path) -> std::io::Result<u64> {
        let mut total = 0;
        for entry in fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            if path == exclude || !is_json(&path) {
                continue;
            }
            total += fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        }
        Ok(total)
    }
}

impl PageStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.cache_path(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.ensure_dir()?;
        let path = self.cache_path(key);

        if let Some(limit) = self.quota_bytes {
            let needed = self.used_bytes(&path)? + value.len() as u64;
            if needed > limit {
                return Err(StoreError::QuotaExceeded { needed, limit });
            }
        }

        fs::write(path, value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.cache_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let entries = match fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !is_json(&path) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }
        Ok(keys)
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

/// Replaces characters that are unsafe in file names
fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (FileStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::with_dir(temp_dir.path().to_path_buf());
        (store, temp_dir)
    }

    #[test]
    fn test_set_creates_file_in_cache_directory() {
        let (store, temp_dir) = create_test_store();

        store
            .set("prayer_40.71_-74.01_2025-06-01_2", "{\"ok\":true}")
            .expect("Write should succeed");

        let expected_path = temp_dir.path().join("prayer_40.71_-74.01_2025-06-01_2.json");
        assert!(expected_path.exists(), "Cache file should exist");
        let content = fs::read_to_string(&expected_path).expect("Should read file");
        assert_eq!(content, "{\"ok\":true}");
    }

    #[test]
    fn test_get_returns_none_for_missing_key() {
        let (store, _temp_dir) = create_test_store();
        assert!(store.get("nonexistent_key").expect("read").is_none());
    }

    #[test]
    fn test_set_creates_directory_if_missing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let nested_path = temp_dir.path().join("nested").join("cache");
        let store = FileStore::with_dir(nested_path.clone());

        store.set("last_location", "{}").expect("Write should succeed");

        assert!(nested_path.join("last_location.json").exists());
    }

    #[test]
    fn test_overwrite_and_remove() {
        let (store, _temp_dir) = create_test_store();
        store.set("key", "first").unwrap();
        store.set("key", "second").unwrap();
        assert_eq!(store.get("key").unwrap().as_deref(), Some("second"));

        store.remove("key").unwrap();
        store.remove("key").expect("Removing twice is fine");
        assert!(store.get("key").unwrap().is_none());
    }

    #[test]
    fn test_keys_lists_json_stems_only() {
        let (store, temp_dir) = create_test_store();
        store.set("prayer_a", "1").unwrap();
        store.set("last_location", "2").unwrap();
        fs::write(temp_dir.path().join("prayerclock.log"), "log line").unwrap();

        let mut keys = store.keys().unwrap();
        keys.sort();
        assert_eq!(keys, ["last_location", "prayer_a"]);
    }

    #[test]
    fn test_keys_on_missing_directory_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::with_dir(temp_dir.path().join("never_created"));
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn test_quota_rejects_oversized_write() {
        let (store, _temp_dir) = create_test_store();
        let store = store.with_quota(16);

        store.set("a", "0123456789").unwrap();
        let error = store.set("b", "0123456789").unwrap_err();
        assert!(matches!(error, StoreError::QuotaExceeded { needed: 20, limit: 16 }));

        // Rewriting the same key only counts the new value
        store.set("a", "9876543210").expect("Replacement fits");
    }

    #[test]
    fn test_sanitize_replaces_path_separators() {
        assert_eq!(sanitize("../etc/passwd"), ".._etc_passwd");
        assert_eq!(sanitize("40.71_-74.01"), "40.71_-74.01");
    }

    #[test]
    fn test_new_creates_xdg_compliant_path() {
        if let Some(store) = FileStore::new() {
            let path_str = store.dir().to_string_lossy();
            assert!(path_str.contains("prayerclock"));
        }
        // Passes if new() returns None (e.g., no home directory in CI)
    }
}
