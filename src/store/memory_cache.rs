use crate::store::original_cache::{
    CacheError, CachedImage, DEFAULT_CAPACITY, OriginalImageCache,
};
use crate::utils::types::ImageId;
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Inmemory cache for original images, lives as long as the process
pub struct MemoryOriginalCache {
    cache: Mutex<LruCache<ImageId, Arc<[u8]>>>,
}

impl MemoryOriginalCache {
    pub fn new(capacity: Option<NonZeroUsize>) -> Self {
        let capacity = capacity.unwrap_or(DEFAULT_CAPACITY);

        MemoryOriginalCache {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }
}

#[async_trait]
impl OriginalImageCache for MemoryOriginalCache {
    async fn get(&self, key: &ImageId) -> Result<CachedImage, CacheError> {
        let mut cache = self.cache.lock();
        match cache.get(key) {
            None => Err(CacheError::NotFound),
            Some(data) => Ok(CachedImage::new(data.clone())),
        }
    }

    async fn set(&self, key: &ImageId, data: Vec<u8>) -> Result<(), CacheError> {
        let mut cache = self.cache.lock();
        if let Some((evicted, _)) = cache.push(key.clone(), Arc::from(data))
            && evicted != *key
        {
            log::debug!("Evicted original image {} from memory cache", evicted);
        }
        Ok(())
    }

    async fn len(&self) -> usize {
        self.cache.lock().len()
    }
}
