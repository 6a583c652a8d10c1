use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, broadcast};

use super::{CacheEvent, MemoryWeatherCache, WeatherCache, check_key};
use crate::error::StoreError;
use crate::model::{ForecastSnapshot, LocationId};
use crate::persist::{read_json, remove_file, write_json_atomic};

/// Weather cache persisted as one JSON file per location.
///
/// Every entry is loaded into memory on open, reads are served from there and
/// mutations go to disk first. A file is only ever replaced by rename, so an
/// interrupted write leaves the previous snapshot intact.
#[derive(Debug)]
pub struct FileWeatherCache {
    dir: PathBuf,
    index: MemoryWeatherCache,
    // serializes disk mutations so the index and the directory agree
    write_lock: Mutex<()>,
}

impl FileWeatherCache {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;

        let entries = load_entries(&dir).await?;
        tracing::debug!(dir = %dir.display(), entries = entries.len(), "Opened weather cache");

        Ok(Self {
            dir,
            index: MemoryWeatherCache::with_entries(entries),
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, id: LocationId) -> PathBuf {
        entry_path(&self.dir, id)
    }

    /// Deletes the files of `ids` and drops whichever succeeded from the
    /// index. Callers hold the write lock.
    async fn remove_entries(&self, ids: Vec<LocationId>) -> Result<usize, StoreError> {
        let mut removed = Vec::with_capacity(ids.len());
        let mut failure = None;
        for id in ids {
            match remove_file(&self.entry_path(id)).await {
                Ok(_) => removed.push(id),
                Err(e) => {
                    tracing::warn!(%id, "Failed to remove cache entry: {e}");
                    failure.get_or_insert(e);
                }
            }
        }

        // the index follows the directory even when some removals failed
        let purged = self.index.forget_purged(&removed).await;
        match failure {
            Some(e) => Err(e),
            None => Ok(purged),
        }
    }
}

fn entry_path(dir: &Path, id: LocationId) -> PathBuf {
    dir.join(format!("{id}.json"))
}

async fn load_entries(dir: &Path) -> Result<HashMap<LocationId, ForecastSnapshot>, StoreError> {
    let io_err = |source| StoreError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = HashMap::new();
    let mut read_dir = tokio::fs::read_dir(dir).await.map_err(io_err)?;

    while let Some(entry) = read_dir.next_entry().await.map_err(io_err)? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }

        match read_json::<ForecastSnapshot>(&path).await {
            Ok(Some(snapshot)) if path == entry_path(dir, snapshot.location_id) => {
                entries.insert(snapshot.location_id, snapshot);
            }
            Ok(Some(snapshot)) => {
                tracing::warn!(
                    path = %path.display(),
                    location_id = %snapshot.location_id,
                    "Ignoring cache file whose name does not match its location"
                );
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Skipping unreadable cache entry: {e}");
            }
        }
    }

    Ok(entries)
}

#[async_trait]
impl WeatherCache for FileWeatherCache {
    async fn get(&self, id: LocationId) -> Result<Option<ForecastSnapshot>, StoreError> {
        self.index.get(id).await
    }

    async fn put(&self, id: LocationId, snapshot: ForecastSnapshot) -> Result<(), StoreError> {
        check_key(id, &snapshot)?;
        let _guard = self.write_lock.lock().await;

        write_json_atomic(&self.entry_path(id), &snapshot).await?;
        self.index.put(id, snapshot).await
    }

    async fn delete(&self, id: LocationId) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;

        remove_file(&self.entry_path(id)).await?;
        self.index.delete(id).await
    }

    async fn purge_older_than(&self, threshold_ms: i64) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock().await;
        let expired = self.index.ids_older_than(threshold_ms).await;
        self.remove_entries(expired).await
    }

    async fn clear(&self) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock().await;
        let all = self.index.ids().await;
        self.remove_entries(all).await
    }

    fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.index.subscribe()
    }
}
