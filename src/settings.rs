//! Settings from the environment, optionally seeded from `.env` by [`Settings::load`].
//!
//! - `METACRUD_CACHE`: `none` (default), `memory` or `file`.
//! - `METACRUD_CACHE_DIR`: directory for the file cache; required when `METACRUD_CACHE=file`.
//! - `METACRUD_CACHE_KEY`: key the marker cache is stored under, default `annotations`.
//! - `METACRUD_DEFAULT_FLUSH`: whether entity creation flushes by default, default `true`.

use crate::error::ConfigError;
use crate::metadata::{CacheStore, FileCacheStore, MemoryCacheStore};
use std::path::PathBuf;
use std::sync::Arc;

pub const DEFAULT_CACHE_KEY: &str = "annotations";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheBackend {
    None,
    Memory,
    File(PathBuf),
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub cache: CacheBackend,
    pub cache_key: String,
    pub default_flush: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            cache: CacheBackend::None,
            cache_key: DEFAULT_CACHE_KEY.into(),
            default_flush: true,
        }
    }
}

impl Settings {
    /// Load `.env` if present, then read the environment.
    pub fn load() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!(error = %e, "could not read .env");
            }
        }
        Self::from_env()
    }

    /// Read settings from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through an arbitrary variable lookup (used by `from_env` and tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let cache = match lookup("METACRUD_CACHE").as_deref().map(str::trim) {
            None | Some("") | Some("none") => CacheBackend::None,
            Some("memory") => CacheBackend::Memory,
            Some("file") => {
                let dir = lookup("METACRUD_CACHE_DIR")
                    .filter(|d| !d.trim().is_empty())
                    .ok_or(ConfigError::MissingSetting("METACRUD_CACHE_DIR"))?;
                CacheBackend::File(PathBuf::from(dir))
            }
            Some(other) => {
                return Err(ConfigError::InvalidSetting {
                    name: "METACRUD_CACHE",
                    reason: format!("expected none, memory or file; got {}", other),
                })
            }
        };

        let cache_key = match lookup("METACRUD_CACHE_KEY") {
            None => DEFAULT_CACHE_KEY.to_string(),
            Some(k) if k.trim().is_empty() => {
                return Err(ConfigError::InvalidSetting {
                    name: "METACRUD_CACHE_KEY",
                    reason: "must not be empty".into(),
                })
            }
            Some(k) => k,
        };

        let default_flush = match lookup("METACRUD_DEFAULT_FLUSH") {
            None => true,
            Some(v) => v.trim().parse::<bool>().map_err(|_| ConfigError::InvalidSetting {
                name: "METACRUD_DEFAULT_FLUSH",
                reason: format!("expected true or false; got {}", v),
            })?,
        };

        Ok(Settings {
            cache,
            cache_key,
            default_flush,
        })
    }

    /// Build the optional cache store the marker cache persists into.
    pub fn cache_store(&self) -> Result<Option<Arc<dyn CacheStore>>, ConfigError> {
        Ok(match &self.cache {
            CacheBackend::None => None,
            CacheBackend::Memory => Some(Arc::new(MemoryCacheStore::new())),
            CacheBackend::File(dir) => Some(Arc::new(FileCacheStore::open(dir)?)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_without_variables() {
        let s = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(s.cache, CacheBackend::None);
        assert_eq!(s.cache_key, "annotations");
        assert!(s.default_flush);
        assert!(s.cache_store().unwrap().is_none());
    }

    #[test]
    fn file_cache_requires_directory() {
        let err = Settings::from_lookup(lookup(&[("METACRUD_CACHE", "file")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSetting("METACRUD_CACHE_DIR")));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Settings::from_lookup(lookup(&[("METACRUD_CACHE", "redis")])).is_err());
        assert!(Settings::from_lookup(lookup(&[("METACRUD_CACHE_KEY", " ")])).is_err());
        assert!(Settings::from_lookup(lookup(&[("METACRUD_DEFAULT_FLUSH", "maybe")])).is_err());
    }

    #[test]
    fn memory_cache_and_flush_flag() {
        let s = Settings::from_lookup(lookup(&[
            ("METACRUD_CACHE", "memory"),
            ("METACRUD_DEFAULT_FLUSH", "false"),
        ]))
        .unwrap();
        assert_eq!(s.cache, CacheBackend::Memory);
        assert!(!s.default_flush);
        assert!(s.cache_store().unwrap().is_some());
    }
}
