use crate::image_ops::processing::Processor;
use crate::proxying_images::{HttpOriginBackend, OriginBackend};
use crate::store::memory_cache::MemoryOriginalCache;
use crate::store::original_cache::{CacheError, OriginalImageCache};
use crate::store::persistent_cache::PersistentOriginalCache;
use crate::store::persistent_store::{PersistentStore, StoreError};
use crate::utils::background::BackgroundService;
use envconfig::Envconfig;
use log::info;
use std::num::NonZeroUsize;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use strum::EnumString;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid environment: {0}")]
    Env(#[from] envconfig::Error),
    #[error("failed to open persistent store: {0}")]
    Store(#[from] StoreError),
    #[error("failed to open original images cache: {0}")]
    Cache(#[from] CacheError),
    #[error("failed to build http client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

#[derive(Clone, Debug, EnumString, strum::Display, Eq, PartialEq)]
#[strum(ascii_case_insensitive)]
pub enum StorageImplementation {
    #[strum(to_string = "memory", serialize = "InMemory")]
    InMemory,
    #[strum(to_string = "disk", serialize = "Persistent")]
    Persistent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    width: u32,
    height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Size { width, height }
    }

    pub fn is_allowed_size(&self, width: u32, height: u32) -> bool {
        width > 0 && height > 0 && width <= self.width && height <= self.height
    }
}

#[derive(Debug)]
pub struct ParseSizeError {
    msg: String,
}

impl std::fmt::Display for ParseSizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.msg)
    }
}

impl FromStr for Size {
    type Err = ParseSizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed: Vec<u32> = s
            .split(',')
            .map_while(|el| el.trim().parse::<u32>().ok())
            .collect();

        match parsed.as_slice() {
            [width, height] => Ok(Size::new(*width, *height)),
            _ => Err(ParseSizeError {
                msg: format!("Expected size \"width,height\", got {}", s),
            }),
        }
    }
}

#[derive(Envconfig)]
struct EnvConfig {
    #[envconfig(from = "HOST", default = "0.0.0.0")]
    pub host: String,
    #[envconfig(from = "PORT", default = "8080")]
    pub port: u16,

    // ------------------
    // Fetching originals
    /// Timeout (seconds) for a single origin request, connect timeout is a third of it
    #[envconfig(from = "FETCH_TIMEOUT", default = "30")]
    pub fetch_timeout: u64,
    /// Keep idle connections to origins pooled
    #[envconfig(from = "FETCH_KEEP_ALIVE", default = "false")]
    pub fetch_keep_alive: bool,
    /// Timeout (seconds) for a whole request to this service
    #[envconfig(from = "REQUEST_TIMEOUT", default = "60")]
    pub request_timeout: u64,

    // ------------------
    // Caching settings
    #[envconfig(from = "STORAGE_TYPE", default = "memory")]
    pub storage_implementation: StorageImplementation,
    /// Count of original images cached
    #[envconfig(from = "STORAGE_CACHE_SIZE", default = "256")]
    pub storage_cache_size: NonZeroUsize,
    /// Persistent db location (directory)
    #[envconfig(from = "PERSISTENT_STORAGE_DIR", default = ".img-preview")]
    pub persistent_storage_dir: String,
    /// Period (seconds) of flushing persistent storage to disk
    #[envconfig(from = "FLUSH_PERIOD", default = "60")]
    pub flush_period: u64,

    // ------------------
    // Processing settings
    /// Max image resulting size after resize (width,height)
    #[envconfig(from = "MAX_IMAGE_RESIZE", default = "10000,10000")]
    pub max_image_resize: Size,
}

pub struct Config {
    pub host: String,
    pub port: u16,
    pub request_timeout: Duration,
    pub max_image_resize: Size,
    pub processor: Processor,
    /// Services to run in background for the lifetime of the server
    pub background: Vec<Arc<dyn BackgroundService + Send + Sync>>,
    /// Cancelled on shutdown, parent of every request token
    pub shutdown: CancellationToken,
}

impl Config {
    pub async fn from_env() -> Result<Config, ConfigError> {
        let env_conf = EnvConfig::init_from_env()?;

        let origin = Arc::new(HttpOriginBackend::new(
            Duration::from_secs(env_conf.fetch_timeout),
            env_conf.fetch_keep_alive,
        )?) as Arc<dyn OriginBackend + Send + Sync>;

        let storage_size = env_conf.storage_cache_size;
        let mut background: Vec<Arc<dyn BackgroundService + Send + Sync>> = Vec::new();

        info!(
            "Using {} storage for {} original images",
            env_conf.storage_implementation, storage_size
        );
        let cache: Arc<dyn OriginalImageCache + Send + Sync> =
            match env_conf.storage_implementation {
                StorageImplementation::InMemory => {
                    Arc::new(MemoryOriginalCache::new(Some(storage_size)))
                }
                StorageImplementation::Persistent => {
                    let store = Arc::new(PersistentStore::open(
                        Path::new(env_conf.persistent_storage_dir.as_str()),
                        storage_size,
                    )?);
                    let cache = Arc::new(
                        PersistentOriginalCache::open(
                            store,
                            Some(storage_size),
                            Duration::from_secs(env_conf.flush_period),
                        )
                        .await?,
                    );
                    background.push(cache.clone());
                    cache
                }
            };

        info!("Original images cache holds {} entries", cache.len().await);

        Ok(Config {
            host: env_conf.host,
            port: env_conf.port,
            request_timeout: Duration::from_secs(env_conf.request_timeout),
            max_image_resize: env_conf.max_image_resize,
            processor: Processor::new(cache, origin),
            background,
            shutdown: CancellationToken::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_size() {
        assert_eq!("1920,1080".parse::<Size>().unwrap(), Size::new(1920, 1080));
        assert_eq!(" 300 , 200 ".parse::<Size>().unwrap(), Size::new(300, 200));
        assert!("1920".parse::<Size>().is_err());
        assert!("1920,abc".parse::<Size>().is_err());
        assert!("1,2,3".parse::<Size>().is_err());
    }

    #[test]
    fn size_bounds() {
        let max = Size::new(500, 400);
        assert!(max.is_allowed_size(500, 400));
        assert!(max.is_allowed_size(1, 1));
        assert!(!max.is_allowed_size(501, 10));
        assert!(!max.is_allowed_size(10, 401));
        assert!(!max.is_allowed_size(0, 10));
    }

    #[test]
    fn parses_storage_type() {
        assert_eq!(
            "memory".parse::<StorageImplementation>().unwrap(),
            StorageImplementation::InMemory
        );
        assert_eq!(
            "InMemory".parse::<StorageImplementation>().unwrap(),
            StorageImplementation::InMemory
        );
        assert_eq!(
            "DISK".parse::<StorageImplementation>().unwrap(),
            StorageImplementation::Persistent
        );
        assert!("redis".parse::<StorageImplementation>().is_err());
        assert_eq!(StorageImplementation::Persistent.to_string(), "disk");
    }
}
