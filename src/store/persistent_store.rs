use fjall::{Keyspace, KeyspaceCreateOptions, PersistMode, Slice};
use postcard::to_stdvec;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::path::Path;
use thiserror::Error;
use tokio::task::spawn_blocking;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("db error: {0}")]
    Db(#[from] fjall::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] postcard::Error),
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Copy)]
pub enum PersistSpace {
    /// Encoded original images by source url
    Originals,
    /// Recency order of `Originals`
    OriginalsIndex,
}

const PERSISTENT_ORIGINALS_KEYSPACE: &str = "originals";
const PERSISTENT_ORIGINALS_INDEX_KEYSPACE: &str = "originals_index";

/// Expecting source image is about 2mb size
const SOURCE_IMAGE_SIZE: u64 = 2048 * 1024;

/// Thin async facade over fjall keyspaces.
///
/// Keys are postcard encoded, values are stored as is.
pub struct PersistentStore {
    db: fjall::Database,
    originals_keyspace: Keyspace,
    index_keyspace: Keyspace,
}

impl PersistentStore {
    pub fn open(db_path: &Path, capacity: NonZeroUsize) -> Result<Self, StoreError> {
        // block cache sized to hold the whole working set of originals
        let db_cache_size = SOURCE_IMAGE_SIZE * capacity.get() as u64;

        let db = fjall::Database::builder(db_path)
            .cache_size(db_cache_size)
            .open()?;

        let originals_keyspace =
            db.keyspace(PERSISTENT_ORIGINALS_KEYSPACE, KeyspaceCreateOptions::default)?;
        let index_keyspace = db.keyspace(
            PERSISTENT_ORIGINALS_INDEX_KEYSPACE,
            KeyspaceCreateOptions::default,
        )?;

        Ok(PersistentStore {
            db,
            originals_keyspace,
            index_keyspace,
        })
    }

    fn keyspace(&self, space: PersistSpace) -> Keyspace {
        match space {
            PersistSpace::Originals => self.originals_keyspace.clone(),
            PersistSpace::OriginalsIndex => self.index_keyspace.clone(),
        }
    }

    pub async fn get<K>(&self, space: PersistSpace, key: &K) -> Result<Option<Slice>, StoreError>
    where
        K: Serialize + ?Sized,
    {
        let keyspace = self.keyspace(space);
        let key = to_stdvec(key)?;

        Ok(spawn_blocking(move || keyspace.get(key)).await??)
    }

    pub async fn set<K>(&self, space: PersistSpace, key: &K, value: Vec<u8>) -> Result<(), StoreError>
    where
        K: Serialize + ?Sized,
    {
        let keyspace = self.keyspace(space);
        let key = to_stdvec(key)?;

        Ok(spawn_blocking(move || keyspace.insert(key, value)).await??)
    }

    pub async fn remove<K>(&self, space: PersistSpace, key: &K) -> Result<(), StoreError>
    where
        K: Serialize + ?Sized,
    {
        let keyspace = self.keyspace(space);
        let key = to_stdvec(key)?;

        Ok(spawn_blocking(move || keyspace.remove(key)).await??)
    }

    /// Fsync everything written so far
    pub fn persist(&self) -> Result<(), StoreError> {
        Ok(self.db.persist(PersistMode::SyncAll)?)
    }
}
