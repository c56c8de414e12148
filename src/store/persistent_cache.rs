use crate::store::original_cache::{
    CacheError, CachedImage, DEFAULT_CAPACITY, OriginalImageCache,
};
use crate::store::persistent_store::{PersistSpace, PersistentStore, StoreError};
use crate::utils::background::BackgroundService;
use crate::utils::types::ImageId;
use async_trait::async_trait;
use log::{debug, info, warn};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Single key under which recency order is kept in `OriginalsIndex`
const INDEX_KEY: &str = "lru";

impl From<StoreError> for CacheError {
    fn from(err: StoreError) -> Self {
        CacheError::Storage(err.to_string())
    }
}

/// Original images cache persisted with fjall, survives restarts.
///
/// Recency is tracked in memory and written to disk on every `set` and on flush,
/// so order after a restart reflects the last write or flush.
pub struct PersistentOriginalCache {
    store: Arc<PersistentStore>,
    // every operation runs under this lock, which keeps index and data consistent
    index: Arc<Mutex<LruCache<ImageId, ()>>>,
    flush_period: Duration,
}

impl PersistentOriginalCache {
    pub async fn open(
        store: Arc<PersistentStore>,
        capacity: Option<NonZeroUsize>,
        flush_period: Duration,
    ) -> Result<Self, CacheError> {
        let capacity = capacity.unwrap_or(DEFAULT_CAPACITY);
        let mut index = LruCache::new(capacity);

        // stored least recently used first
        let stored: Vec<ImageId> = match store.get(PersistSpace::OriginalsIndex, INDEX_KEY).await? {
            None => Vec::new(),
            Some(slice) => postcard::from_bytes(&slice)
                .map_err(|err| CacheError::Storage(format!("corrupted index: {}", err)))?,
        };

        let mut trimmed = 0;
        for key in stored {
            if let Some((evicted, _)) = index.push(key.clone(), ())
                && evicted != key
            {
                store.remove(PersistSpace::Originals, &evicted).await?;
                trimmed += 1;
            }
        }
        info!(
            "Restored {} original images from disk, trimmed {} over capacity",
            index.len(),
            trimmed
        );

        if trimmed > 0 {
            save_index(&store, &index).await?;
        }

        Ok(PersistentOriginalCache {
            store,
            index: Arc::new(Mutex::new(index)),
            flush_period,
        })
    }

    /// Write recency order and fsync
    pub async fn flush(&self) -> Result<(), CacheError> {
        let index = self.index.lock().await;
        save_index(&self.store, &index).await?;
        self.store.persist()?;
        Ok(())
    }
}

async fn save_index(
    store: &PersistentStore,
    index: &LruCache<ImageId, ()>,
) -> Result<(), CacheError> {
    let order: Vec<&ImageId> = index.iter().rev().map(|(key, _)| key).collect();
    let encoded = postcard::to_stdvec(&order)
        .map_err(|err| CacheError::Storage(format!("failed to encode index: {}", err)))?;
    store
        .set(PersistSpace::OriginalsIndex, INDEX_KEY, encoded)
        .await?;
    Ok(())
}

#[async_trait]
impl OriginalImageCache for PersistentOriginalCache {
    async fn get(&self, key: &ImageId) -> Result<CachedImage, CacheError> {
        let mut index = self.index.lock().await;
        if index.get(key).is_none() {
            return Err(CacheError::NotFound);
        }

        match self.store.get(PersistSpace::Originals, key).await? {
            Some(slice) => Ok(CachedImage::new(Arc::from(&*slice))),
            None => {
                // a write was interrupted between index update and data insert
                warn!("Original image {} is indexed but missing on disk", key);
                index.pop(key);
                Err(CacheError::NotFound)
            }
        }
    }

    async fn set(&self, key: &ImageId, data: Vec<u8>) -> Result<(), CacheError> {
        let store = self.store.clone();
        let index = self.index.clone();
        let key = key.clone();

        // detached, so a dropped caller can't leave index and data out of step
        tokio::spawn(async move {
            let mut index = index.lock_owned().await;

            let evicted = match index.push(key.clone(), ()) {
                Some((evicted, _)) if evicted != key => Some(evicted),
                _ => None,
            };

            store.set(PersistSpace::Originals, &key, data).await?;
            if let Some(evicted) = evicted {
                debug!("Evicting original image {} from disk", evicted);
                store.remove(PersistSpace::Originals, &evicted).await?;
            }
            save_index(&store, &index).await
        })
        .await
        .map_err(|err| CacheError::Storage(err.to_string()))?
    }

    async fn len(&self) -> usize {
        self.index.lock().await.len()
    }
}

#[async_trait]
impl BackgroundService for PersistentOriginalCache {
    fn background_period(&self) -> Duration {
        self.flush_period
    }

    async fn background(&self) {
        debug!("Flushing original images to disk");
        if let Err(err) = self.flush().await {
            warn!("Failed to flush data to disk, got error: {}", err)
        }
    }

    async fn stop(&self) {
        self.background().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::path::Path;
    use tempfile::tempdir;

    async fn open(dir: &Path, capacity: usize) -> PersistentOriginalCache {
        let capacity = NonZeroUsize::new(capacity).unwrap();
        let store = Arc::new(PersistentStore::open(dir, capacity).unwrap());
        PersistentOriginalCache::open(store, Some(capacity), Duration::from_secs(60))
            .await
            .unwrap()
    }

    fn read_all(mut handle: CachedImage) -> Vec<u8> {
        let mut out = Vec::new();
        handle.read_to_end(&mut out).unwrap();
        out
    }

    #[tokio::test]
    async fn miss_is_not_found() {
        let dir = tempdir().unwrap();
        let cache = open(dir.path(), 2).await;

        assert_eq!(
            cache.get(&"example.com/a.jpg".to_string()).await.err(),
            Some(CacheError::NotFound)
        );
    }

    #[tokio::test]
    async fn set_then_get_returns_same_bytes() {
        let dir = tempdir().unwrap();
        let cache = open(dir.path(), 2).await;
        let key = "example.com/a.jpg".to_string();

        cache.set(&key, b"abc".to_vec()).await.unwrap();
        assert_eq!(read_all(cache.get(&key).await.unwrap()), b"abc");
    }

    #[tokio::test]
    async fn get_protects_entry_from_eviction() {
        let dir = tempdir().unwrap();
        let cache = open(dir.path(), 3).await;
        for key in ["a", "b", "c"] {
            cache.set(&key.to_string(), key.as_bytes().to_vec()).await.unwrap();
        }
        cache.get(&"a".to_string()).await.unwrap();
        cache.set(&"d".to_string(), b"d".to_vec()).await.unwrap();

        assert_eq!(cache.len().await, 3);
        assert!(cache.get(&"a".to_string()).await.is_ok());
        assert_eq!(
            cache.get(&"b".to_string()).await.err(),
            Some(CacheError::NotFound)
        );
        // evicted data is gone from disk too
        assert!(
            cache
                .store
                .get(PersistSpace::Originals, "b")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn entries_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let cache = open(dir.path(), 3).await;
            cache.set(&"a".to_string(), b"first".to_vec()).await.unwrap();
            cache.set(&"b".to_string(), b"second".to_vec()).await.unwrap();
            cache.flush().await.unwrap();
        }

        let cache = open(dir.path(), 3).await;
        assert_eq!(cache.len().await, 2);
        assert_eq!(read_all(cache.get(&"a".to_string()).await.unwrap()), b"first");
    }

    #[tokio::test]
    async fn reopen_with_smaller_capacity_drops_oldest() {
        let dir = tempdir().unwrap();
        {
            let cache = open(dir.path(), 3).await;
            for key in ["a", "b", "c"] {
                cache.set(&key.to_string(), key.as_bytes().to_vec()).await.unwrap();
            }
            cache.flush().await.unwrap();
        }

        let cache = open(dir.path(), 2).await;
        assert_eq!(cache.len().await, 2);
        assert_eq!(
            cache.get(&"a".to_string()).await.err(),
            Some(CacheError::NotFound)
        );
        assert!(cache.get(&"c".to_string()).await.is_ok());
    }

    #[tokio::test]
    async fn dropped_set_still_evicts_from_disk() {
        let dir = tempdir().unwrap();
        let cache = open(dir.path(), 1).await;
        cache.set(&"a".to_string(), b"a".to_vec()).await.unwrap();

        // caller goes away right after the first poll
        let dropped = tokio::time::timeout(
            Duration::ZERO,
            cache.set(&"b".to_string(), vec![7; 4 * 1024 * 1024]),
        )
        .await;
        assert!(dropped.is_err());

        cache.set(&"c".to_string(), b"c".to_vec()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(cache.len().await, 1);
        assert!(
            cache
                .store
                .get(PersistSpace::Originals, "a")
                .await
                .unwrap()
                .is_none()
        );
        let mut on_disk = Vec::new();
        for key in ["b", "c"] {
            if cache.store.get(PersistSpace::Originals, key).await.unwrap().is_some() {
                on_disk.push(key.to_string());
            }
        }
        assert_eq!(on_disk.len(), 1);
        assert!(cache.get(&on_disk[0]).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_never_tear_values() {
        let dir = tempdir().unwrap();
        let cache = Arc::new(open(dir.path(), 2).await);
        let key = "example.com/shared.jpg".to_string();

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..8u8 {
            let cache = cache.clone();
            let key = key.clone();
            tasks.spawn(async move {
                cache.set(&key, vec![i; 64 * 1024]).await.unwrap();
                let value = read_all(cache.get(&key).await.unwrap());
                assert_eq!(value.len(), 64 * 1024);
                assert!(value.iter().all(|b| *b == value[0]));
                assert!(value[0] < 8);
            });
        }
        while let Some(res) = tasks.join_next().await {
            res.unwrap();
        }

        assert_eq!(cache.len().await, 1);
    }
}
