//! Optional key/blob stores the marker cache persists into.

use crate::error::{AccessError, ConfigError};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

pub trait CacheStore: Send + Sync {
    fn contains(&self, key: &str) -> bool;
    fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>, AccessError>;
    fn save(&self, key: &str, blob: &[u8]) -> Result<(), AccessError>;
}

/// Process-local store. Survives engine re-creation, not process restarts.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCacheStore {
    fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>, AccessError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn save(&self, key: &str, blob: &[u8]) -> Result<(), AccessError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), blob.to_vec());
        Ok(())
    }
}

/// One file per key under a directory; writes go through a temp file and a rename.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    /// Create the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| ConfigError::InvalidSetting {
            name: "METACRUD_CACHE_DIR",
            reason: format!("{}: {}", dir.display(), e),
        })?;
        Ok(FileCacheStore { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", file))
    }
}

impl CacheStore for FileCacheStore {
    fn contains(&self, key: &str) -> bool {
        self.path_for(key).is_file()
    }

    fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>, AccessError> {
        match std::fs::read(self.path_for(key)) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AccessError::Cache(e.to_string())),
        }
    }

    fn save(&self, key: &str, blob: &[u8]) -> Result<(), AccessError> {
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| AccessError::Cache(e.to_string()))?;
        tmp.write_all(blob).map_err(|e| AccessError::Cache(e.to_string()))?;
        tmp.persist(self.path_for(key))
            .map_err(|e| AccessError::Cache(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryCacheStore::new();
        assert!(!store.contains("annotations"));
        store.save("annotations", b"{}").unwrap();
        assert!(store.contains("annotations"));
        assert_eq!(store.fetch("annotations").unwrap().as_deref(), Some(&b"{}"[..]));
        assert_eq!(store.fetch("other").unwrap(), None);
    }

    #[test]
    fn file_store_writes_one_file_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::open(dir.path().join("cache")).unwrap();
        assert!(!store.contains("meta/annotations"));
        store.save("meta/annotations", b"[1]").unwrap();
        assert!(dir.path().join("cache").join("meta_annotations.json").is_file());
        assert_eq!(store.fetch("meta/annotations").unwrap(), Some(b"[1]".to_vec()));
        store.save("meta/annotations", b"[2]").unwrap();
        assert_eq!(store.fetch("meta/annotations").unwrap(), Some(b"[2]".to_vec()));
    }
}
