//! File-backed storage tier.
//!
//! All keys live in one JSON object, written with sorted keys, 2-space
//! indentation and a trailing newline:
//! ```json
//! {
//!   "storefront_token": "eyJhbGciOi...",
//!   "storefront_token_exp": "1750003600000"
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use storefront_application::ports::{StorageBackend, StorageError};
use tracing::debug;

/// Directory below the platform data directory used by default.
const APP_DIR: &str = "storefront";

/// Storage tier persisting keys to a JSON file.
///
/// Every operation re-reads the file, so several processes sharing it see
/// each other's writes on their next read.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    /// Creates a store backed by the file at `path`. The file and its parent
    /// directories are created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Creates a store for `namespace` inside `dir`.
    #[must_use]
    pub fn in_dir(dir: &Path, namespace: &str) -> Self {
        Self::new(dir.join(format!("{namespace}_session.json")))
    }

    /// Default directory for session files, under the platform's local data
    /// directory.
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        dirs::data_local_dir().map(|dir| dir.join(APP_DIR))
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(BTreeMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                StorageError::Serialization(format!("{}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = to_json_stable(entries)?;

        // Write-then-rename so readers never see a half-written file.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), keys = entries.len(), "session file written");
        Ok(())
    }
}

/// Serializes with 2-space indentation and a trailing newline.
fn to_json_stable<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    let mut buffer = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"  ");
    let mut serializer = Serializer::with_formatter(&mut buffer, formatter);
    value
        .serialize(&mut serializer)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    buffer.push(b'\n');
    Ok(buffer)
}

impl StorageBackend for FileStorage {
    fn name(&self) -> &str {
        "file"
    }

    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock();
        Ok(self.load()?.remove(key))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        // A corrupt file is replaced rather than blocking every later write.
        let mut entries = self.load().unwrap_or_default();
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        let mut entries = match self.load() {
            Ok(entries) => entries,
            Err(StorageError::Serialization(_)) => BTreeMap::new(),
            Err(e) => return Err(e),
        };
        if entries.remove(key).is_none() && self.path.exists() {
            return Ok(());
        }
        if entries.is_empty() {
            return match fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(StorageError::Io(e)),
            };
        }
        self.save(&entries)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::in_dir(dir.path(), "shop");
        assert_eq!(storage.read("shop_token").unwrap(), None);
        assert!(!storage.path().exists());
    }

    #[test]
    fn test_values_survive_a_new_instance() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("profiles").join("default");

        let storage = FileStorage::in_dir(&nested, "shop");
        storage.write("shop_token", "abc.def.ghi").unwrap();
        storage.write("shop_token_exp", "1750003600000").unwrap();

        let reopened = FileStorage::in_dir(&nested, "shop");
        assert_eq!(
            reopened.read("shop_token").unwrap().as_deref(),
            Some("abc.def.ghi")
        );
        assert_eq!(
            reopened.read("shop_token_exp").unwrap().as_deref(),
            Some("1750003600000")
        );
    }

    #[test]
    fn test_file_layout_is_stable() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path().join("session.json"));
        storage.write("b_key", "2").unwrap();
        storage.write("a_key", "1").unwrap();

        let content = fs::read_to_string(storage.path()).unwrap();
        assert_eq!(content, "{\n  \"a_key\": \"1\",\n  \"b_key\": \"2\"\n}\n");
    }

    #[test]
    fn test_removing_last_key_deletes_file() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::in_dir(dir.path(), "shop");
        storage.write("shop_token", "abc").unwrap();
        storage.write("shop_token_exp", "1").unwrap();

        storage.remove("shop_token").unwrap();
        assert!(storage.path().exists());
        storage.remove("shop_token_exp").unwrap();
        assert!(!storage.path().exists());

        storage.remove("shop_reload_tracker").unwrap();
    }

    #[test]
    fn test_corrupt_file_is_reported_then_replaced() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::in_dir(dir.path(), "shop");
        fs::write(storage.path(), "{not json").unwrap();

        assert!(matches!(
            storage.read("shop_token"),
            Err(StorageError::Serialization(_))
        ));

        storage.write("shop_token", "fresh").unwrap();
        assert_eq!(storage.read("shop_token").unwrap().as_deref(), Some("fresh"));
    }
}
