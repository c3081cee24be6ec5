//! Local persistence of the records this node has issued.
//!
//! The `Datastore` is a plain byte map keyed by `DatastoreKey`. `RecordStore`
//! layers the record semantics on top and serialises issuance, so that two
//! concurrent publishes for the same identity can never reuse a sequence
//! number.
use std::{collections::HashMap, path::Path as FsPath, sync::Arc};

use anyhow::Result;
use chrono::{DateTime, Utc};
use libp2p_identity::{Keypair, PeerId};
use parking_lot::Mutex;
use record::{DatastoreKey, NameKeys, NameRecord, Path};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::{NameError, NameResult};

pub trait Datastore: Send + Sync {
    fn get(&self, key: &DatastoreKey) -> Result<Option<Vec<u8>>>;
    fn put(&self, key: &DatastoreKey, value: &[u8]) -> Result<()>;
    /// Returns whether the key was present.
    fn delete(&self, key: &DatastoreKey) -> Result<bool>;
}

#[derive(Default)]
pub struct MemoryDatastore {
    entries: Mutex<HashMap<DatastoreKey, Vec<u8>>>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Datastore for MemoryDatastore {
    fn get(&self, key: &DatastoreKey) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn put(&self, key: &DatastoreKey, value: &[u8]) -> Result<()> {
        self.entries.lock().insert(key.clone(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &DatastoreKey) -> Result<bool> {
        Ok(self.entries.lock().remove(key).is_some())
    }
}

/// SQLite-backed datastore, one row per key.
pub struct SqliteDatastore {
    db: Mutex<Connection>,
}

impl SqliteDatastore {
    pub fn open(path: impl AsRef<FsPath>) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(db: Connection) -> Result<Self> {
        db.execute(
            "CREATE TABLE IF NOT EXISTS records (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL
            )",
            [],
        )?;

        Ok(Self { db: Mutex::new(db) })
    }
}

impl Datastore for SqliteDatastore {
    fn get(&self, key: &DatastoreKey) -> Result<Option<Vec<u8>>> {
        let value = self
            .db
            .lock()
            .query_row(
                "SELECT value FROM records WHERE key = ?1",
                params![key.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put(&self, key: &DatastoreKey, value: &[u8]) -> Result<()> {
        self.db.lock().execute(
            "INSERT INTO records (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key.as_str(), value],
        )?;
        Ok(())
    }

    fn delete(&self, key: &DatastoreKey) -> Result<bool> {
        let removed = self
            .db
            .lock()
            .execute("DELETE FROM records WHERE key = ?1", params![key.as_str()])?;
        Ok(removed > 0)
    }
}

/// Last issued record per identity.
pub struct RecordStore {
    datastore: Arc<dyn Datastore>,
    issue_lock: tokio::sync::Mutex<()>,
}

impl RecordStore {
    pub fn new(datastore: Arc<dyn Datastore>) -> Self {
        Self {
            datastore,
            issue_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryDatastore::new()))
    }

    /// Last record issued for `peer_id`, if any.
    pub fn get(&self, peer_id: &PeerId) -> NameResult<Option<NameRecord>> {
        let key = NameKeys::for_peer(peer_id).datastore_key();
        let Some(bytes) = self.datastore.get(&key).map_err(NameError::Store)? else {
            return Ok(None);
        };
        Ok(Some(NameRecord::from_bytes(&bytes)?))
    }

    pub fn put(&self, peer_id: &PeerId, record: &NameRecord) -> NameResult<()> {
        let key = NameKeys::for_peer(peer_id).datastore_key();
        self.datastore
            .put(&key, &record.to_bytes())
            .map_err(NameError::Store)
    }

    /// Sequence of the last issued record, 0 when none was issued.
    pub fn last_sequence(&self, peer_id: &PeerId) -> NameResult<u64> {
        Ok(self.get(peer_id)?.map_or(0, |record| record.sequence()))
    }

    /// Sign and persist the next record for `key`.
    ///
    /// The record is durable before it is returned, so a crash after this
    /// point can only cause a sequence number to be skipped, never reused.
    pub async fn issue(
        &self,
        key: &Keypair,
        value: Path,
        eol: DateTime<Utc>,
    ) -> NameResult<NameRecord> {
        let _guard = self.issue_lock.lock().await;
        let peer_id = key.public().to_peer_id();

        let previous = self.last_sequence(&peer_id)?;
        if previous == 0 {
            debug!(%peer_id, "no previous record, starting at sequence 1");
        }

        let record = NameRecord::create(key, value, previous + 1, eol)?;
        self.put(&peer_id, &record)?;
        Ok(record)
    }
}
