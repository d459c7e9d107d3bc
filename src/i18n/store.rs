use super::tree::TranslationTree;
use crate::storage::KeyValueStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

const ENTRY_PREFIX: &str = "i18n:entry:";
const META_KEY: &str = "i18n:meta";

/// One cached translation payload for a `(language, namespace)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: TranslationTree,
    pub version: String,
    pub timestamp_ms: i64,
    pub etag: Option<String>,
}

/// The authoritative version manifest: language → namespace → version.
/// Persisted separately from entry data so staleness checks are cheap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationMeta {
    pub versions: BTreeMap<String, BTreeMap<String, String>>,
    pub etag: Option<String>,
}

impl TranslationMeta {
    pub fn version_for(&self, language: &str, namespace: &str) -> Option<&str> {
        self.versions
            .get(language)
            .and_then(|namespaces| namespaces.get(namespace))
            .map(String::as_str)
    }
}

/// Persisted, versioned, per-language/namespace translation cache.
///
/// Single writer of the persisted entries; concurrent writes to the same key
/// are last-write-wins at the storage layer (merging happens in the loader).
/// Read/write failures degrade to a cache miss and are never fatal.
#[derive(Clone)]
pub struct TranslationCache {
    store: Arc<dyn KeyValueStore>,
    max_age_ms: i64,
}

impl TranslationCache {
    pub fn new(store: Arc<dyn KeyValueStore>, max_age_days: u64) -> Self {
        Self {
            store,
            max_age_ms: (max_age_days as i64) * 24 * 60 * 60 * 1000,
        }
    }

    fn entry_key(language: &str, namespace: &str) -> String {
        format!("{ENTRY_PREFIX}{language}:{namespace}")
    }

    /// Read an entry. Returns `None` when absent, expired by age, or (when
    /// `expected_version` is supplied) stored under a different version.
    pub fn get(
        &self,
        language: &str,
        namespace: &str,
        expected_version: Option<&str>,
    ) -> Option<CacheEntry> {
        let entry = self.read_entry(language, namespace)?;

        if let Some(expected) = expected_version {
            if entry.version != expected {
                return None;
            }
        }

        let age_ms = Utc::now().timestamp_millis() - entry.timestamp_ms;
        if age_ms > self.max_age_ms {
            return None;
        }

        Some(entry)
    }

    /// Read an entry ignoring version and age. Used when a conditional fetch
    /// confirmed the cached copy is still current, and by merge mode where a
    /// stale layer is better than nothing.
    pub fn get_any(&self, language: &str, namespace: &str) -> Option<CacheEntry> {
        self.read_entry(language, namespace)
    }

    /// Write (overwrite) an entry. Atomic per key; failures are logged and
    /// swallowed so a broken cache never blocks the translation pipeline.
    pub fn put(
        &self,
        language: &str,
        namespace: &str,
        data: &TranslationTree,
        version: &str,
        etag: Option<&str>,
    ) {
        let entry = CacheEntry {
            data: data.clone(),
            version: version.to_string(),
            timestamp_ms: Utc::now().timestamp_millis(),
            etag: etag.map(str::to_string),
        };
        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("failed to serialize cache entry {language}/{namespace}: {e}");
                return;
            }
        };
        if let Err(e) = self.store.set(&Self::entry_key(language, namespace), &raw) {
            warn!("failed to persist cache entry {language}/{namespace}: {e}");
        }
    }

    /// The stored version manifest, if any. Independent of entry expiration.
    pub fn meta(&self) -> Option<TranslationMeta> {
        let raw = match self.store.get(META_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("failed to read translation meta: {e}");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!("stored translation meta is corrupt, discarding: {e}");
                None
            }
        }
    }

    pub fn put_meta(&self, meta: &TranslationMeta) {
        let raw = match serde_json::to_string(meta) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("failed to serialize translation meta: {e}");
                return;
            }
        };
        if let Err(e) = self.store.set(META_KEY, &raw) {
            warn!("failed to persist translation meta: {e}");
        }
    }

    fn read_entry(&self, language: &str, namespace: &str) -> Option<CacheEntry> {
        let raw = match self.store.get(&Self::entry_key(language, namespace)) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("cache read failed for {language}/{namespace}, treating as miss: {e}");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("cache entry for {language}/{namespace} is corrupt, treating as miss: {e}");
                None
            }
        }
    }
}
