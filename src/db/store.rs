use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Failed to replace store file: {0}")]
    Persist(String),
    #[error("Malformed store file: {0}")]
    Malformed(String),
}

/// A value that can live in a [`JsonFileStore`].
pub trait StoredRecord: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Key the record is stored under.
    fn key(&self) -> &str;

    /// Patches a raw JSON object found under `key` in a file written by an
    /// older version, before it is deserialized. Returns true when the
    /// object was changed.
    fn backfill(_key: &str, _raw: &mut Map<String, Value>) -> bool {
        false
    }
}

/// Narrow keyed storage interface used by the orchestrator.
#[async_trait]
pub trait Store<T: StoredRecord>: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<T>, StoreError>;
    async fn put(&self, id: &str, record: T) -> Result<(), StoreError>;
    /// Removes and returns the record, if present.
    async fn delete(&self, id: &str) -> Result<Option<T>, StoreError>;
    async fn list(&self) -> Result<Vec<T>, StoreError>;
}

/// A flat `id -> record` map mirrored to a single JSON file.
///
/// Every mutation rewrites the whole file through a temporary file in the
/// same directory followed by a rename, so readers never observe a partially
/// written file. Mutations are serialized by an async mutex; if the write
/// fails the in-memory map is restored to its previous state.
pub struct JsonFileStore<T> {
    path: PathBuf,
    records: Mutex<BTreeMap<String, T>>,
}

impl<T: StoredRecord> JsonFileStore<T> {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let (records, backfilled) = if tokio::fs::try_exists(&path).await? {
            let contents = tokio::fs::read_to_string(&path).await?;
            Self::decode(&contents)?
        } else {
            (BTreeMap::new(), false)
        };

        info!(path = ?path, count = records.len(), "Loaded record store.");

        let store = Self {
            path,
            records: Mutex::new(records),
        };

        if backfilled {
            info!(path = ?store.path, "Backfilled missing fields, rewriting store.");
            let guard = store.records.lock().await;
            store.write(&guard).await?;
            drop(guard);
        }

        Ok(store)
    }

    fn decode(contents: &str) -> Result<(BTreeMap<String, T>, bool), StoreError> {
        if contents.trim().is_empty() {
            return Ok((BTreeMap::new(), false));
        }
        let raw: Map<String, Value> = serde_json::from_str(contents)?;
        let mut backfilled = false;
        let mut records = BTreeMap::new();
        for (key, mut value) in raw {
            let Some(object) = value.as_object_mut() else {
                return Err(StoreError::Malformed(format!(
                    "entry '{key}' is not a JSON object"
                )));
            };
            backfilled |= T::backfill(&key, object);
            let record: T = serde_json::from_value(value)?;
            let record_key = record.key().to_string();
            if record_key != key {
                debug!(from = %key, to = %record_key, "Re-keying stored entry.");
                backfilled = true;
            }
            if records.insert(record_key.clone(), record).is_some() {
                return Err(StoreError::Malformed(format!(
                    "more than one entry for '{record_key}'"
                )));
            }
        }
        Ok((records, backfilled))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write(&self, records: &BTreeMap<String, T>) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(records)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&path, &bytes))
            .await
            .map_err(|e| StoreError::Persist(format!("writer task failed: {e}")))??;
        debug!(path = ?self.path, count = records.len(), "Store written.");
        Ok(())
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path)
        .map_err(|e| StoreError::Persist(e.error.to_string()))?;
    Ok(())
}

#[async_trait]
impl<T: StoredRecord> Store<T> for JsonFileStore<T> {
    async fn get(&self, id: &str) -> Result<Option<T>, StoreError> {
        Ok(self.records.lock().await.get(id).cloned())
    }

    async fn put(&self, id: &str, record: T) -> Result<(), StoreError> {
        let mut guard = self.records.lock().await;
        let previous = guard.insert(id.to_string(), record);
        if let Err(e) = self.write(&guard).await {
            warn!(id = %id, error = %e, "Failed to persist store, reverting in-memory change.");
            match previous {
                Some(prev) => guard.insert(id.to_string(), prev),
                None => guard.remove(id),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<Option<T>, StoreError> {
        let mut guard = self.records.lock().await;
        let Some(removed) = guard.remove(id) else {
            return Ok(None);
        };
        if let Err(e) = self.write(&guard).await {
            warn!(id = %id, error = %e, "Failed to persist store, reverting in-memory change.");
            guard.insert(id.to_string(), removed);
            return Err(e);
        }
        Ok(Some(removed))
    }

    async fn list(&self) -> Result<Vec<T>, StoreError> {
        Ok(self.records.lock().await.values().cloned().collect())
    }
}
