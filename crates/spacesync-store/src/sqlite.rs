//! SQLite implementation of the storage traits.
//!
//! This is the primary storage backend. It uses rusqlite with bundled SQLite,
//! wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use spacesync_core::{
    decode, encode, Blake3Hash, ObjectEntry, ObjectId, Range, RangeDigest, SpaceDescriptor,
    SpaceId,
};

use crate::error::{Result, StoreError};
use crate::migration::{self, now_millis};
use crate::traits::{PutResult, SpaceStorage, SpaceStorageProvider};

type SharedConnection = Arc<Mutex<Connection>>;

/// SQLite-backed storage provider.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime. Every space opened from the
/// provider shares its connection.
pub struct SqliteStorageProvider {
    conn: SharedConnection,
}

impl SqliteStorageProvider {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

/// Storage of a single space inside a [`SqliteStorageProvider`] database.
pub struct SqliteSpaceStorage {
    space_id: SpaceId,
    conn: SharedConnection,
}

fn lock(conn: &SharedConnection) -> Result<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|e| {
        StoreError::Database(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
            Some(format!("mutex poisoned: {}", e)),
        ))
    })
}

/// Run `f` against the connection on the blocking pool.
async fn blocking<F, T>(conn: &SharedConnection, f: F) -> Result<T>
where
    F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let conn = Arc::clone(conn);
    tokio::task::spawn_blocking(move || {
        let mut conn = lock(&conn)?;
        f(&mut conn)
    })
    .await
    .map_err(|e| StoreError::Unavailable(format!("spawn_blocking failed: {}", e)))?
}

/// Encode a u64 key so that SQLite's signed integer order matches u64 order.
fn encode_key(key: u64) -> i64 {
    (key ^ (1 << 63)) as i64
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, Vec<u8>)> {
    Ok((row.get("object_id")?, row.get("hash")?))
}

fn to_entry((id, hash): (String, Vec<u8>)) -> Result<ObjectEntry> {
    let hash = Blake3Hash::try_from(hash.as_slice())
        .map_err(|e| StoreError::InvalidData(format!("object {}: {}", id, e)))?;
    Ok(ObjectEntry::new(id, hash))
}

fn space_exists(conn: &Connection, id: &str) -> Result<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM spaces WHERE space_id = ?1",
            params![id],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

fn load_digest(tx: &Transaction<'_>, space_id: &str) -> Result<RangeDigest> {
    let (sum, count): (Vec<u8>, i64) = tx
        .query_row(
            "SELECT digest_sum, object_count FROM spaces WHERE space_id = ?1",
            params![space_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(space_id.to_owned()))?;
    let sum = <[u8; 32]>::try_from(sum.as_slice()).map_err(|_| {
        StoreError::InvalidData(format!("space {}: digest of {} bytes", space_id, sum.len()))
    })?;
    Ok(RangeDigest::from_parts(sum, count as u64))
}

/// Persist the running digest and the cached whole-space hash derived from it.
fn store_digest(tx: &Transaction<'_>, space_id: &str, digest: &RangeDigest) -> Result<()> {
    tx.execute(
        "UPDATE spaces SET digest_sum = ?2, object_count = ?3, space_hash = ?4
         WHERE space_id = ?1",
        params![
            space_id,
            digest.sum_bytes().as_slice(),
            digest.count() as i64,
            digest.finish().to_hex()
        ],
    )?;
    Ok(())
}

#[async_trait]
impl SpaceStorageProvider for SqliteStorageProvider {
    async fn space_storage(&self, id: &SpaceId) -> Result<Arc<dyn SpaceStorage>> {
        let key = id.as_str().to_owned();
        let exists = blocking(&self.conn, move |conn| space_exists(conn, &key)).await?;
        if !exists {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(Arc::new(SqliteSpaceStorage {
            space_id: id.clone(),
            conn: Arc::clone(&self.conn),
        }))
    }

    async fn create_space_storage(
        &self,
        descriptor: &SpaceDescriptor,
    ) -> Result<Arc<dyn SpaceStorage>> {
        let space_id = descriptor.space_id().clone();
        let encoded = encode(descriptor)?;
        let key = space_id.as_str().to_owned();

        blocking(&self.conn, move |conn| {
            let tx = conn.transaction()?;
            if space_exists(&tx, &key)? {
                return Err(StoreError::AlreadyExists(key));
            }
            let empty = RangeDigest::new();
            tx.execute(
                "INSERT INTO spaces
                     (space_id, descriptor, space_hash, digest_sum, object_count, created_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                params![
                    key,
                    encoded,
                    empty.finish().to_hex(),
                    empty.sum_bytes().as_slice(),
                    now_millis()
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await?;

        tracing::debug!(space_id = %space_id, "persisted new space");
        Ok(Arc::new(SqliteSpaceStorage {
            space_id,
            conn: Arc::clone(&self.conn),
        }))
    }

    async fn space_exists(&self, id: &SpaceId) -> Result<bool> {
        let key = id.as_str().to_owned();
        blocking(&self.conn, move |conn| space_exists(conn, &key)).await
    }

    async fn list_spaces(&self) -> Result<Vec<SpaceId>> {
        blocking(&self.conn, |conn| {
            let mut stmt = conn.prepare("SELECT space_id FROM spaces ORDER BY space_id")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(ids.into_iter().map(SpaceId::from).collect())
        })
        .await
    }
}

#[async_trait]
impl SpaceStorage for SqliteSpaceStorage {
    fn space_id(&self) -> &SpaceId {
        &self.space_id
    }

    async fn descriptor(&self) -> Result<SpaceDescriptor> {
        let key = self.space_id.as_str().to_owned();
        let bytes: Vec<u8> = blocking(&self.conn, move |conn| {
            conn.query_row(
                "SELECT descriptor FROM spaces WHERE space_id = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(StoreError::NotFound(key))
        })
        .await?;
        Ok(decode(&bytes)?)
    }

    async fn read_space_hash(&self) -> Result<String> {
        let key = self.space_id.as_str().to_owned();
        blocking(&self.conn, move |conn| {
            conn.query_row(
                "SELECT space_hash FROM spaces WHERE space_id = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(StoreError::NotFound(key))
        })
        .await
    }

    async fn objects_in(&self, range: Range) -> Result<Vec<ObjectEntry>> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let key = self.space_id.as_str().to_owned();
        blocking(&self.conn, move |conn| {
            let mut stmt = conn.prepare(
                "SELECT object_id, hash FROM objects
                 WHERE space_id = ?1 AND key >= ?2 AND key < ?3
                 ORDER BY key, object_id",
            )?;
            let rows = stmt
                .query_map(
                    params![key, encode_key(range.from), encode_key(range.to)],
                    row_to_entry,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(to_entry).collect()
        })
        .await
    }

    async fn object(&self, id: &ObjectId) -> Result<Option<ObjectEntry>> {
        let key = self.space_id.as_str().to_owned();
        let object_id = id.as_str().to_owned();
        blocking(&self.conn, move |conn| {
            conn.query_row(
                "SELECT object_id, hash FROM objects WHERE space_id = ?1 AND object_id = ?2",
                params![key, object_id],
                row_to_entry,
            )
            .optional()?
            .map(to_entry)
            .transpose()
        })
        .await
    }

    async fn put_object(&self, entry: &ObjectEntry) -> Result<PutResult> {
        let key = self.space_id.as_str().to_owned();
        let entry = entry.clone();
        blocking(&self.conn, move |conn| {
            let tx = conn.transaction()?;
            let existing: Option<Vec<u8>> = tx
                .query_row(
                    "SELECT hash FROM objects WHERE space_id = ?1 AND object_id = ?2",
                    params![key, entry.id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;

            let mut digest = load_digest(&tx, &key)?;
            let result = match existing {
                None => {
                    digest.add(&entry);
                    PutResult::Inserted
                }
                Some(hash) if hash.as_slice() == entry.hash.as_bytes() => PutResult::Unchanged,
                Some(hash) => {
                    let previous = to_entry((entry.id.as_str().to_owned(), hash))?;
                    digest.replace(&previous, &entry);
                    PutResult::Updated
                }
            };
            if !result.changed() {
                return Ok(result);
            }

            tx.execute(
                "INSERT INTO objects (space_id, object_id, key, hash, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(space_id, object_id)
                 DO UPDATE SET hash = excluded.hash, updated_at = excluded.updated_at",
                params![
                    key,
                    entry.id.as_str(),
                    encode_key(entry.key()),
                    entry.hash.as_bytes().as_slice(),
                    now_millis()
                ],
            )?;
            store_digest(&tx, &key, &digest)?;
            tx.commit()?;
            Ok(result)
        })
        .await
    }

    async fn remove_object(&self, id: &ObjectId) -> Result<bool> {
        let key = self.space_id.as_str().to_owned();
        let object_id = id.as_str().to_owned();
        blocking(&self.conn, move |conn| {
            let tx = conn.transaction()?;
            let existing = tx
                .query_row(
                    "SELECT object_id, hash FROM objects WHERE space_id = ?1 AND object_id = ?2",
                    params![key, object_id],
                    row_to_entry,
                )
                .optional()?;
            let Some(row) = existing else {
                return Ok(false);
            };
            let previous = to_entry(row)?;

            tx.execute(
                "DELETE FROM objects WHERE space_id = ?1 AND object_id = ?2",
                params![key, object_id],
            )?;
            let mut digest = load_digest(&tx, &key)?;
            digest.remove(&previous);
            store_digest(&tx, &key, &digest)?;
            tx.commit()?;
            Ok(true)
        })
        .await
    }
}
