use crate::image_ops::image_types::Extensions;
use crate::image_ops::operations::{decode, decode_bytes, encode_jpeg, resize_exact};
use crate::proxying_images::{FetchError, OriginBackend, OriginResponse};
use crate::store::original_cache::{CacheError, OriginalImageCache};
use crate::utils::types::{ImageId, OriginalImage, ProcessedImage};
use log::{debug, warn};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::task::spawn_blocking;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Terminal failure of a single request. Messages are matched by existing clients,
/// keep them stable
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProcessingError {
    #[error("failed to get from cache: {0}")]
    Storage(String),
    #[error("failed to download image: {0}")]
    Download(String),
    #[error("server returned status: {0}")]
    RemoteStatus(u16),
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error("failed to encode image: {0}")]
    Encode(String),
    #[error("failed to encode image for cache: {0}")]
    CacheEncode(String),
    #[error("failed to cache image: {0}")]
    CacheWrite(String),
    #[error("invalid size: {0}")]
    InvalidSize(String),
    #[error("request cancelled")]
    Cancelled,
}

impl From<FetchError> for ProcessingError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Download(reason) => ProcessingError::Download(reason),
            FetchError::Status(code) => ProcessingError::RemoteStatus(code),
            FetchError::Cancelled => ProcessingError::Cancelled,
        }
    }
}

/// Fetch, cache and resize pipeline.
///
/// Only originals are cached, keyed by source url alone, so every size of the same
/// image is derived from a single cache entry. Holds no locks of its own, concurrent
/// misses for one url both download and the last cache write wins.
pub struct Processor {
    cache: Arc<dyn OriginalImageCache + Send + Sync>,
    origin: Arc<dyn OriginBackend + Send + Sync>,
}

impl Processor {
    pub fn new(
        cache: Arc<dyn OriginalImageCache + Send + Sync>,
        origin: Arc<dyn OriginBackend + Send + Sync>,
    ) -> Self {
        Processor { cache, origin }
    }

    /// Original image from cache, or downloaded, decoded and cached on miss.
    ///
    /// Headers are only present for fresh downloads.
    #[instrument(skip(self, cancel))]
    pub async fn get_original(
        &self,
        cancel: &CancellationToken,
        url: &ImageId,
    ) -> Result<OriginalImage, ProcessingError> {
        match self.cache.get(url).await {
            Ok(cached) => {
                debug!("Found original {} in cache ({} bytes)", url, cached.len());
                // handle is moved into the task and released there on every path
                let img = spawn_blocking(move || decode(cached))
                    .await
                    .map_err(|err| ProcessingError::Decode(err.to_string()))?
                    .map_err(|err| {
                        warn!("Cached original {} is not decodable: {}", url, err);
                        ProcessingError::Decode(err.to_string())
                    })?;
                return Ok(OriginalImage::new(img, Default::default()));
            }
            Err(CacheError::NotFound) => {
                debug!("Original {} is not cached, downloading", url);
            }
            Err(CacheError::Storage(reason)) => {
                return Err(ProcessingError::Storage(reason));
            }
        }

        let fetch_start = Instant::now();
        let OriginResponse { body, headers } = self.origin.fetch(cancel, url).await?;
        debug!(
            "Downloaded {} ({} bytes) in {:?}",
            url,
            body.len(),
            fetch_start.elapsed()
        );

        let (img, cache_data) = spawn_blocking(move || {
            let img = decode_bytes(&body)
                .map_err(|err| ProcessingError::Decode(err.to_string()))?;
            let cache_data =
                encode_jpeg(&img).map_err(|err| ProcessingError::CacheEncode(err.to_string()))?;
            Ok::<_, ProcessingError>((img, cache_data))
        })
        .await
        .map_err(|err| ProcessingError::Decode(err.to_string()))??;

        self.cache
            .set(url, cache_data)
            .await
            .map_err(|err| ProcessingError::CacheWrite(err.to_string()))?;

        Ok(OriginalImage::new(img, headers))
    }

    /// Resize original of `url` to exactly `width` x `height` and encode as JPEG
    #[instrument(skip(self, cancel))]
    pub async fn process(
        &self,
        cancel: &CancellationToken,
        url: &ImageId,
        width: u32,
        height: u32,
    ) -> Result<ProcessedImage, ProcessingError> {
        if width == 0 || height == 0 {
            return Err(ProcessingError::InvalidSize(format!(
                "{}x{} has zero dimension",
                width, height
            )));
        }

        let original = self.get_original(cancel, url).await?;

        let resize_start = Instant::now();
        let image = original.image;
        let data = spawn_blocking(move || {
            let resized = resize_exact(&image, width, height)
                .map_err(|err| ProcessingError::Encode(err.to_string()))?;
            encode_jpeg(&resized).map_err(|err| ProcessingError::Encode(err.to_string()))
        })
        .await
        .map_err(|err| ProcessingError::Encode(err.to_string()))??;

        let resize_time = resize_start.elapsed();
        if resize_time.as_millis() > 200 {
            debug!("Resize+encode of {} took {:?}", url, resize_time);
        }

        Ok(ProcessedImage::new(data, original.headers, Extensions::Jpeg))
    }
}
