use crate::utils::types::ImageId;
use async_trait::async_trait;
use std::io::{BufRead, Cursor, Read, Seek, SeekFrom};
use std::num::NonZeroUsize;
use std::sync::Arc;
use thiserror::Error;

/// Count of originals kept when no capacity is configured
pub const DEFAULT_CAPACITY: NonZeroUsize = NonZeroUsize::new(256).unwrap();

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Key is absent. Expected on first request for an image
    #[error("image is not cached")]
    NotFound,
    #[error("storage error: {0}")]
    Storage(String),
}

/// Read handle over cached image bytes.
///
/// Holds its own reference to the data, so a concurrent overwrite or eviction of the
/// same key never affects an already opened handle. Released on drop.
pub struct CachedImage {
    inner: Cursor<Arc<[u8]>>,
}

impl CachedImage {
    pub fn new(data: Arc<[u8]>) -> Self {
        CachedImage {
            inner: Cursor::new(data),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.get_ref().len()
    }
}

impl Read for CachedImage {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl BufRead for CachedImage {
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt)
    }
}

impl Seek for CachedImage {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}

/// Bounded store of original (source) images keyed by source url.
///
/// Implementations evict the least recently used entry synchronously within `set`
/// once capacity is exceeded. Both `get` hits and `set` count as access.
/// Calls are individually safe from concurrent requests, no cross-call atomicity.
#[async_trait]
pub trait OriginalImageCache {
    /// Cached bytes for `key`, refreshing its recency. [`CacheError::NotFound`] if absent
    async fn get(&self, key: &ImageId) -> Result<CachedImage, CacheError>;

    /// Insert or overwrite `key` as most recently used, evicting over capacity
    async fn set(&self, key: &ImageId, data: Vec<u8>) -> Result<(), CacheError>;

    /// Count of cached originals
    async fn len(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_image_reads_whole_payload() {
        let mut handle = CachedImage::new(Arc::from(&b"jpeg bytes"[..]));
        assert_eq!(handle.len(), 10);

        let mut out = Vec::new();
        handle.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"jpeg bytes");

        handle.seek(SeekFrom::Start(5)).unwrap();
        let mut rest = String::new();
        handle.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "bytes");
    }

    #[test]
    fn not_found_is_distinct_from_storage_failure() {
        assert_ne!(CacheError::NotFound, CacheError::Storage("disk full".into()));
        assert_eq!(
            CacheError::Storage("disk full".into()).to_string(),
            "storage error: disk full"
        );
    }
}
