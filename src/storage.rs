use crate::error::StorageError;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

/// Durable string key-value storage provider.
///
/// The platform supplies the real implementation (device storage on mobile,
/// local storage on web). The crate ships [`FileStore`] for desktop-style
/// deployments and [`MemoryStore`] for tests and embedders without a
/// filesystem.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// One file per key under a directory. Writes go through a temp file and a
/// rename so each key is overwritten atomically.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    // Keys contain ':' separators; map anything unsafe for a filename.
    fn file_name(key: &str) -> String {
        key.chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            })
            .collect()
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(Self::file_name(key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let name = Self::file_name(key);
        let path = self.dir.join(&name);
        // Appended suffix, not `with_extension`: keys carry dots, and
        // replacing the last segment would make distinct keys share a temp
        // file.
        let tmp = self.dir.join(format!("{name}.tmp"));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store for tests and platforms that persist elsewhere.
#[derive(Default)]
pub struct MemoryStore {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.map.lock().expect("storage lock poisoned").get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.map
            .lock()
            .expect("storage lock poisoned")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.map.lock().expect("storage lock poisoned").remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a").unwrap(), None);

        store.set("a", "1").unwrap();
        assert_eq!(store.get("a").unwrap(), Some("1".to_string()));

        store.set("a", "2").unwrap();
        assert_eq!(store.get("a").unwrap(), Some("2".to_string()));

        store.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
    }

    #[test]
    fn test_memory_store_remove_missing_is_ok() {
        let store = MemoryStore::new();
        assert!(store.remove("missing").is_ok());
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = TempDir::new().expect("tempdir");
        let store = FileStore::new(dir.path()).expect("store");

        assert_eq!(store.get("i18n:entry:en:common").unwrap(), None);

        store.set("i18n:entry:en:common", r#"{"a":"b"}"#).unwrap();
        assert_eq!(
            store.get("i18n:entry:en:common").unwrap(),
            Some(r#"{"a":"b"}"#.to_string())
        );

        store.remove("i18n:entry:en:common").unwrap();
        assert_eq!(store.get("i18n:entry:en:common").unwrap(), None);
    }

    #[test]
    fn test_file_store_overwrite_last_write_wins() {
        let dir = TempDir::new().expect("tempdir");
        let store = FileStore::new(dir.path()).expect("store");

        store.set("k", "first").unwrap();
        store.set("k", "second").unwrap();
        assert_eq!(store.get("k").unwrap(), Some("second".to_string()));
    }

    #[test]
    fn test_file_store_keys_with_separators_do_not_collide() {
        let dir = TempDir::new().expect("tempdir");
        let store = FileStore::new(dir.path()).expect("store");

        store.set("i18n:entry:en:common", "en").unwrap();
        store.set("i18n:entry:es:common", "es").unwrap();

        assert_eq!(store.get("i18n:entry:en:common").unwrap(), Some("en".to_string()));
        assert_eq!(store.get("i18n:entry:es:common").unwrap(), Some("es".to_string()));
    }

    #[test]
    fn test_file_store_dotted_keys_do_not_share_temp_files() {
        let dir = TempDir::new().expect("tempdir");
        let store = FileStore::new(dir.path()).expect("store");

        // "stats.tmp" is exactly the temp name a naive extension swap would
        // pick while writing "stats.total"; it must survive that write.
        store.set("stats.tmp", "keep").unwrap();
        store.set("stats.total", "42").unwrap();

        assert_eq!(store.get("stats.tmp").unwrap(), Some("keep".to_string()));
        assert_eq!(store.get("stats.total").unwrap(), Some("42".to_string()));
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = TempDir::new().expect("tempdir");
        {
            let store = FileStore::new(dir.path()).expect("store");
            store.set("persist", "yes").unwrap();
        }
        let store = FileStore::new(dir.path()).expect("store");
        assert_eq!(store.get("persist").unwrap(), Some("yes".to_string()));
    }
}
