//! Key/value persistence for encoded documents.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use lckb_core::{ClinicalDocument, LckbError, LckbResult};
use tracing::{debug, info, warn};

use crate::codec;

const KEY_PREFIX: &str = "lckb:";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("quota exceeded writing {key}")]
    QuotaExceeded { key: String },
    #[error("store I/O at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("store backend: {0}")]
    Backend(String),
}

impl From<StoreError> for LckbError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::QuotaExceeded { key } => LckbError::PersistenceFull { key },
            other => LckbError::Store(other.to_string()),
        }
    }
}

pub trait DocumentStore: Send + Sync {
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn delete(&self, key: &str) -> Result<bool, StoreError>;
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

pub fn document_key(patient_id: &str) -> String {
    format!("{KEY_PREFIX}{patient_id}")
}

/// In-memory store with an optional byte capacity.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
    capacity: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            entries: RwLock::default(),
            capacity: Some(bytes),
        }
    }

    pub fn used_bytes(&self) -> usize {
        self.entries
            .read()
            .map(|entries| entries.values().map(String::len).sum())
            .unwrap_or(0)
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Backend("store lock poisoned".to_string())
}

impl DocumentStore for MemoryStore {
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        if let Some(capacity) = self.capacity {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| v.len())
                .sum();
            if others + value.len() > capacity {
                return Err(StoreError::QuotaExceeded {
                    key: key.to_string(),
                });
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().map_err(poisoned)?.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.write().map_err(poisoned)?.remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.entries.read().map_err(poisoned)?.keys().cloned().collect())
    }
}

/// One file per key under `root`, with an optional total byte quota.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    quota: Option<u64>,
}

impl FileStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StoreError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root, quota: None })
    }

    pub fn with_quota(mut self, bytes: u64) -> Self {
        self.quota = Some(bytes);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", encode_key(key)))
    }

    fn used_bytes_excluding(&self, skip: &Path) -> Result<u64, StoreError> {
        let mut total = 0;
        for entry in self.read_dir()? {
            if entry.path() == skip {
                continue;
            }
            let metadata = entry.metadata().map_err(|source| StoreError::Io {
                path: entry.path(),
                source,
            })?;
            total += metadata.len();
        }
        Ok(total)
    }

    fn read_dir(&self) -> Result<Vec<fs::DirEntry>, StoreError> {
        let io = |source| StoreError::Io {
            path: self.root.clone(),
            source,
        };
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(io)? {
            let entry = entry.map_err(io)?;
            if entry.path().extension().is_some_and(|ext| ext == "json") {
                entries.push(entry);
            }
        }
        Ok(entries)
    }
}

/// Keys map to file names; bytes outside `[A-Za-z0-9_-]` are hex-escaped.
fn encode_key(key: &str) -> String {
    key.bytes()
        .map(|b| {
            if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
                (b as char).to_string()
            } else {
                format!("%{b:02X}")
            }
        })
        .collect()
}

fn decode_key(name: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(name.len());
    let mut chars = name.bytes();
    while let Some(b) = chars.next() {
        if b == b'%' {
            let hi = chars.next()?;
            let lo = chars.next()?;
            let hex = [hi, lo];
            let text = std::str::from_utf8(&hex).ok()?;
            bytes.push(u8::from_str_radix(text, 16).ok()?);
        } else {
            bytes.push(b);
        }
    }
    String::from_utf8(bytes).ok()
}

impl DocumentStore for FileStore {
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        if let Some(quota) = self.quota {
            let others = self.used_bytes_excluding(&path)?;
            if others + value.len() as u64 > quota {
                return Err(StoreError::QuotaExceeded {
                    key: key.to_string(),
                });
            }
        }
        fs::write(&path, value).map_err(|source| StoreError::Io { path, source })
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = self
            .read_dir()?
            .into_iter()
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                decode_key(name.strip_suffix(".json")?)
            })
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// Oldest persisted document belonging to another patient.
fn eviction_candidate(
    store: &dyn DocumentStore,
    keep: &str,
) -> Result<Option<String>, StoreError> {
    let mut oldest: Option<(DateTime<Utc>, String)> = None;
    for key in store.keys()? {
        if key == keep || !key.starts_with(KEY_PREFIX) {
            continue;
        }
        let saved = store
            .get(&key)?
            .and_then(|text| codec::saved_at(&text))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        if oldest.as_ref().map_or(true, |(at, _)| saved < *at) {
            oldest = Some((saved, key));
        }
    }
    Ok(oldest.map(|(_, key)| key))
}

/// Persists `doc`. On quota exhaustion the oldest documents of other patients
/// are evicted one by one until the write fits.
pub fn save_document(
    store: &dyn DocumentStore,
    doc: &ClinicalDocument,
    saved_at: DateTime<Utc>,
) -> LckbResult<()> {
    let key = document_key(doc.patient_id());
    let payload = codec::encode(doc, saved_at)?;
    loop {
        match store.put(&key, &payload) {
            Ok(()) => {
                info!(key = %key, bytes = payload.len(), "document saved");
                return Ok(());
            }
            Err(StoreError::QuotaExceeded { .. }) => {
                let Some(victim) = eviction_candidate(store, &key)? else {
                    warn!(key = %key, "store full and nothing left to evict");
                    return Err(LckbError::PersistenceFull { key });
                };
                warn!(evicted = %victim, key = %key, "store full, evicting oldest document");
                store.delete(&victim)?;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Loads and rehydrates a patient's document, if one is stored.
pub fn load_document(
    store: &dyn DocumentStore,
    patient_id: &str,
    loaded_at: DateTime<Utc>,
) -> LckbResult<Option<ClinicalDocument>> {
    let key = document_key(patient_id);
    let Some(text) = store.get(&key)? else {
        debug!(key = %key, "no stored document");
        return Ok(None);
    };
    codec::rehydrate(&text, loaded_at).map(Some)
}

pub fn delete_document(store: &dyn DocumentStore, patient_id: &str) -> LckbResult<bool> {
    Ok(store.delete(&document_key(patient_id))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, hour, 0, 0).unwrap()
    }

    fn doc(patient: &str) -> ClinicalDocument {
        ClinicalDocument::create(patient, at(1))
    }

    #[test]
    fn save_evicts_oldest_other_patient() {
        let size = codec::encode(&doc("pt-a"), at(1)).unwrap().len();
        let store = MemoryStore::with_capacity(size * 2 + size / 2);

        save_document(&store, &doc("pt-a"), at(1)).unwrap();
        save_document(&store, &doc("pt-b"), at(2)).unwrap();
        save_document(&store, &doc("pt-c"), at(3)).unwrap();

        assert_eq!(
            store.keys().unwrap(),
            vec!["lckb:pt-b".to_string(), "lckb:pt-c".to_string()]
        );
        assert!(load_document(&store, "pt-a", at(4)).unwrap().is_none());
        let loaded = load_document(&store, "pt-c", at(4)).unwrap().unwrap();
        assert_eq!(loaded.metadata.last_rehydrated_at, Some(at(4)));
        assert_eq!(loaded.metadata.last_loaded_timestamp, None);
    }

    #[test]
    fn too_large_for_empty_store_is_persistence_full() {
        let store = MemoryStore::with_capacity(16);
        assert!(matches!(
            save_document(&store, &doc("pt-a"), at(1)),
            Err(LckbError::PersistenceFull { .. })
        ));
    }

    #[test]
    fn file_store_round_trip_and_quota() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        save_document(&store, &doc("pt/x"), at(1)).unwrap();
        assert_eq!(store.keys().unwrap(), vec!["lckb:pt/x".to_string()]);
        assert_eq!(
            load_document(&store, "pt/x", at(2)).unwrap().unwrap().patient_id(),
            "pt/x"
        );
        assert!(delete_document(&store, "pt/x").unwrap());
        assert!(!delete_document(&store, "pt/x").unwrap());

        let size = codec::encode(&doc("pt-a"), at(1)).unwrap().len() as u64;
        let limited = FileStore::open(dir.path()).unwrap().with_quota(size + size / 2);
        save_document(&limited, &doc("pt-a"), at(1)).unwrap();
        save_document(&limited, &doc("pt-b"), at(2)).unwrap();
        assert_eq!(limited.keys().unwrap(), vec!["lckb:pt-b".to_string()]);
    }
}
