use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use patchwork_core::{error::RepositoryError, Entity, EntityStore, UnitOfWork};
use patchwork_proto::Uid;
use sled::Config;
use tokio::task;
use tracing::{debug, warn};

use crate::{
    database::{collection_prefix, entity_key, Database},
    error::SledError,
};

/// Pending writes of the open unit of work. `None` is a staged delete.
type Staged = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

/// Entity store over a single sled tree.
///
/// Writes are staged in memory and only reach sled when the unit of work is saved, as one atomic batch.
/// Reads see the staged state first. A backend carries exactly one open unit of work, so concurrent
/// batches need separate backends.
pub struct SledBackend {
    database: Arc<Database>,
    staged: Mutex<Staged>,
}

impl SledBackend {
    pub fn with_homedir_folder(folder_name: &str) -> anyhow::Result<Self> {
        let dir = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Failed to get home directory"))?.join(folder_name);

        Self::with_path(dir)
    }

    pub fn with_path(path: PathBuf) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&path)?;
        let db = sled::open(path.join("sled"))?;
        Ok(Self::open(db)?)
    }

    pub fn new() -> anyhow::Result<Self> { Self::with_homedir_folder(".patchwork") }

    pub fn new_test() -> anyhow::Result<Self> {
        let db = Config::new().temporary(true).flush_every_ms(None).open()?;
        Ok(Self::open(db)?)
    }

    fn open(db: sled::Db) -> Result<Self, SledError> { Ok(Self { database: Arc::new(Database::open(db)?), staged: Mutex::new(Staged::new()) }) }

    /// Uids of every saved entity in a collection, in key order. Staged writes are not included.
    pub async fn list(&self, collection: &str) -> Result<Vec<Uid>, SledError> {
        let database = self.database.clone();
        let prefix = collection_prefix(collection);
        task::spawn_blocking(move || -> Result<Vec<Uid>, SledError> {
            let mut uids = Vec::new();
            for entry in database.entities.scan_prefix(&prefix) {
                let (key, _) = entry?;
                let uid = String::from_utf8(key[prefix.len()..].to_vec())?;
                uids.push(Uid::from(uid));
            }
            Ok(uids)
        })
        .await?
    }

    /// Number of writes waiting for `save`.
    pub fn pending(&self) -> usize { self.staged().len() }

    fn staged(&self) -> MutexGuard<'_, Staged> {
        self.staged.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn read(&self, key: Vec<u8>) -> Result<Option<Vec<u8>>, SledError> {
        let staged = self.staged().get(&key).cloned();
        if let Some(staged) = staged {
            return Ok(staged);
        }
        let database = self.database.clone();
        let value = task::spawn_blocking(move || database.entities.get(key)).await??;
        Ok(value.map(|bytes| bytes.to_vec()))
    }

    fn stage(&self, key: Vec<u8>, value: Option<Vec<u8>>) { self.staged().insert(key, value); }
}

#[async_trait]
impl<T: Entity> EntityStore<T> for SledBackend {
    async fn retrieve(&self, uid: &Uid) -> Result<Option<T>, RepositoryError> {
        match self.read(entity_key(T::collection(), uid)).await? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(SledError::from)?)),
            None => Ok(None),
        }
    }

    async fn create(&self, entity: &T) -> Result<(), RepositoryError> {
        let key = entity_key(T::collection(), entity.uid());
        if self.read(key.clone()).await?.is_some() {
            return Err(RepositoryError::AlreadyExists { model: T::collection().to_owned(), uid: entity.uid().clone() });
        }
        self.stage(key, Some(bincode::serialize(entity).map_err(SledError::from)?));
        Ok(())
    }

    async fn update(&self, entity: &T) -> Result<(), RepositoryError> {
        let key = entity_key(T::collection(), entity.uid());
        if self.read(key.clone()).await?.is_none() {
            return Err(RepositoryError::not_found(T::collection(), entity.uid()));
        }
        self.stage(key, Some(bincode::serialize(entity).map_err(SledError::from)?));
        Ok(())
    }

    async fn delete(&self, uid: &Uid) -> Result<bool, RepositoryError> {
        let key = entity_key(T::collection(), uid);
        if self.read(key.clone()).await?.is_none() {
            return Ok(false);
        }
        self.stage(key, None);
        Ok(true)
    }
}

#[async_trait]
impl UnitOfWork for SledBackend {
    async fn save(&self) -> Result<(), RepositoryError> {
        let staged = std::mem::take(&mut *self.staged());
        let count = staged.len();

        let mut batch = sled::Batch::default();
        for (key, value) in staged {
            match value {
                Some(value) => batch.insert(key, value),
                None => batch.remove(key),
            }
        }

        let database = self.database.clone();
        task::spawn_blocking(move || -> Result<(), SledError> {
            database.entities.apply_batch(batch)?;
            database.db.flush()?;
            Ok(())
        })
        .await
        .map_err(SledError::from)??;

        debug!("SledBackend.save: {count} writes");
        Ok(())
    }

    async fn abort(&self) -> Result<(), RepositoryError> {
        let discarded = std::mem::take(&mut *self.staged()).len();
        if discarded > 0 {
            warn!("SledBackend.abort: discarded {discarded} writes");
        }
        Ok(())
    }
}
