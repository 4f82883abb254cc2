use patchwork_proto::Uid;
use sled::Db;

pub struct Database {
    pub db: Db,
    /// Every entity of every collection, keyed by `collection/uid`
    pub(crate) entities: sled::Tree,
}

impl Database {
    pub fn open(db: Db) -> Result<Self, sled::Error> {
        let entities = db.open_tree("entities")?;
        Ok(Self { db, entities })
    }
}

pub(crate) fn entity_key(collection: &str, uid: &Uid) -> Vec<u8> { format!("{collection}/{uid}").into_bytes() }

pub(crate) fn collection_prefix(collection: &str) -> Vec<u8> { format!("{collection}/").into_bytes() }
