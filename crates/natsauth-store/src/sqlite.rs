//! SQLite implementation of the Store trait.
//!
//! This is the persistent storage backend. It uses rusqlite with bundled
//! SQLite, wrapped in async via tokio::spawn_blocking. Version checks and
//! writes happen inside one transaction, so optimistic concurrency holds
//! across processes sharing the database file.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ciborium::value::Value;
use rusqlite::{params, Connection, OptionalExtension};

use natsauth_core::{CredentialStatus, Kind, ObjectKey, ObjectMeta};

use crate::error::{Result, StoreError};
use crate::migration::{self, now_millis};
use crate::record::Record;
use crate::traits::{Store, StoredObject};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if needed.
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

    /// Run a blocking closure against the connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|e| {
                StoreError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                    Some(format!("mutex poisoned: {}", e)),
                ))
            })?;
            f(&mut conn)
        })
        .await
        .map_err(|e| {
            StoreError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!("spawn_blocking failed: {}", e)),
            ))
        })?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row encoding
// ─────────────────────────────────────────────────────────────────────────────

/// Encode record fields as a CBOR map of text keys to byte strings.
fn encode_fields(data: &BTreeMap<String, Vec<u8>>) -> Result<Vec<u8>> {
    let map = Value::Map(
        data.iter()
            .map(|(k, v)| (Value::Text(k.clone()), Value::Bytes(v.clone())))
            .collect(),
    );
    let mut buf = Vec::new();
    ciborium::into_writer(&map, &mut buf)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode_fields(bytes: &[u8]) -> Result<BTreeMap<String, Vec<u8>>> {
    let value: Value =
        ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))?;

    let Value::Map(entries) = value else {
        return Err(StoreError::InvalidData("record data is not a map".into()));
    };

    entries
        .into_iter()
        .map(|(k, v)| match (k, v) {
            (Value::Text(k), Value::Bytes(v)) => Ok((k, v)),
            _ => Err(StoreError::InvalidData(
                "record field is not text -> bytes".into(),
            )),
        })
        .collect()
}

fn read_record(conn: &Connection, name: &str) -> Result<Option<Record>> {
    let row: Option<(Vec<u8>, i64)> = conn
        .query_row(
            "SELECT data, version FROM records WHERE name = ?1",
            params![name],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match row {
        Some((data, version)) => Ok(Some(Record {
            name: name.to_string(),
            data: decode_fields(&data)?,
            version: version as u64,
        })),
        None => Ok(None),
    }
}

struct ObjectRow {
    name: String,
    generation: i64,
    resource_version: i64,
    annotations: String,
    spec: String,
    status: String,
}

fn row_to_object(row: &rusqlite::Row<'_>) -> rusqlite::Result<ObjectRow> {
    Ok(ObjectRow {
        name: row.get("name")?,
        generation: row.get("generation")?,
        resource_version: row.get("resource_version")?,
        annotations: row.get("annotations")?,
        spec: row.get("spec")?,
        status: row.get("status")?,
    })
}

impl ObjectRow {
    fn into_stored(self, kind: Kind) -> Result<StoredObject> {
        Ok(StoredObject {
            kind,
            meta: ObjectMeta {
                name: self.name,
                generation: self.generation as u64,
                resource_version: self.resource_version as u64,
                annotations: serde_json::from_str(&self.annotations)?,
            },
            spec: serde_json::from_str(&self.spec)?,
            status: serde_json::from_str(&self.status)?,
        })
    }
}

fn read_object(conn: &Connection, key: &ObjectKey) -> Result<Option<StoredObject>> {
    conn.query_row(
        "SELECT name, generation, resource_version, annotations, spec, status
         FROM objects WHERE kind = ?1 AND name = ?2",
        params![key.kind.as_str(), key.name],
        row_to_object,
    )
    .optional()?
    .map(|row| row.into_stored(key.kind))
    .transpose()
}

/// Write all mutable columns of an object, guarded by its previous version.
fn write_object(conn: &Connection, object: &StoredObject, previous_version: u64) -> Result<()> {
    let changed = conn.execute(
        "UPDATE objects
         SET generation = ?1, resource_version = ?2, annotations = ?3,
             spec = ?4, status = ?5, updated_at = ?6
         WHERE kind = ?7 AND name = ?8 AND resource_version = ?9",
        params![
            object.meta.generation as i64,
            object.meta.resource_version as i64,
            serde_json::to_string(&object.meta.annotations)?,
            serde_json::to_string(&object.spec)?,
            serde_json::to_string(&object.status)?,
            now_millis(),
            object.kind.as_str(),
            object.meta.name,
            previous_version as i64,
        ],
    )?;

    if changed == 0 {
        return Err(StoreError::conflict(
            object.key().to_string(),
            format!("version {} is stale", previous_version),
        ));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Store impl
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl Store for SqliteStore {
    async fn get_record(&self, name: &str) -> Result<Option<Record>> {
        let name = name.to_string();
        self.blocking(move |conn| read_record(conn, &name)).await
    }

    async fn create_record(&self, record: &Record) -> Result<Record> {
        let mut record = record.clone();

        self.blocking(move |conn| {
            let data = encode_fields(&record.data)?;
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO records (name, data, version, updated_at)
                 VALUES (?1, ?2, 1, ?3)",
                params![record.name, data, now_millis()],
            )?;

            if inserted == 0 {
                return Err(StoreError::conflict(&record.name, "record already exists"));
            }

            record.version = 1;
            Ok(record)
        })
        .await
    }

    async fn update_record(&self, record: &Record) -> Result<Record> {
        let mut record = record.clone();

        self.blocking(move |conn| {
            let tx = conn.transaction()?;

            let current: Option<i64> = tx
                .query_row(
                    "SELECT version FROM records WHERE name = ?1",
                    params![record.name],
                    |row| row.get(0),
                )
                .optional()?;

            match current {
                None => return Err(StoreError::NotFound(record.name.clone())),
                Some(v) if v as u64 != record.version => {
                    return Err(StoreError::conflict(
                        &record.name,
                        format!("expected version {}, found {}", record.version, v),
                    ));
                }
                Some(_) => {}
            }

            tx.execute(
                "UPDATE records SET data = ?1, version = version + 1, updated_at = ?2
                 WHERE name = ?3",
                params![encode_fields(&record.data)?, now_millis(), record.name],
            )?;
            tx.commit()?;

            record.version += 1;
            Ok(record)
        })
        .await
    }

    async fn get_object(&self, key: &ObjectKey) -> Result<Option<StoredObject>> {
        let key = key.clone();
        self.blocking(move |conn| read_object(conn, &key)).await
    }

    async fn list_objects(&self, kind: Kind) -> Result<Vec<StoredObject>> {
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT name, generation, resource_version, annotations, spec, status
                 FROM objects WHERE kind = ?1 ORDER BY name",
            )?;
            let rows = stmt
                .query_map(params![kind.as_str()], row_to_object)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter().map(|row| row.into_stored(kind)).collect()
        })
        .await
    }

    async fn apply_spec(&self, key: &ObjectKey, spec: serde_json::Value) -> Result<StoredObject> {
        let key = key.clone();

        self.blocking(move |conn| {
            let tx = conn.transaction()?;

            let stored = match read_object(&tx, &key)? {
                Some(existing) if existing.spec == spec => return Ok(existing),
                Some(mut existing) => {
                    let previous = existing.meta.resource_version;
                    existing.spec = spec;
                    existing.meta.generation += 1;
                    existing.meta.resource_version += 1;
                    write_object(&tx, &existing, previous)?;
                    existing
                }
                None => {
                    let object = StoredObject {
                        kind: key.kind,
                        meta: ObjectMeta {
                            name: key.name.clone(),
                            generation: 1,
                            resource_version: 1,
                            annotations: BTreeMap::new(),
                        },
                        spec,
                        status: CredentialStatus::default(),
                    };
                    tx.execute(
                        "INSERT INTO objects
                         (kind, name, generation, resource_version, annotations, spec, status, updated_at)
                         VALUES (?1, ?2, 1, 1, '{}', ?3, ?4, ?5)",
                        params![
                            key.kind.as_str(),
                            key.name,
                            serde_json::to_string(&object.spec)?,
                            serde_json::to_string(&object.status)?,
                            now_millis(),
                        ],
                    )?;
                    object
                }
            };

            tx.commit()?;
            Ok(stored)
        })
        .await
    }

    async fn update_status(
        &self,
        key: &ObjectKey,
        status: &CredentialStatus,
        expected_version: u64,
    ) -> Result<StoredObject> {
        let key = key.clone();
        let status = status.clone();

        self.blocking(move |conn| {
            let tx = conn.transaction()?;

            let mut object =
                read_object(&tx, &key)?.ok_or_else(|| StoreError::NotFound(key.to_string()))?;
            object.status = status;
            object.meta.resource_version = expected_version + 1;
            write_object(&tx, &object, expected_version)?;

            tx.commit()?;
            Ok(object)
        })
        .await
    }

    async fn annotate(&self, key: &ObjectKey, name: &str, value: &str) -> Result<StoredObject> {
        let key = key.clone();
        let (name, value) = (name.to_string(), value.to_string());

        self.blocking(move |conn| {
            let tx = conn.transaction()?;

            let mut object =
                read_object(&tx, &key)?.ok_or_else(|| StoreError::NotFound(key.to_string()))?;
            let previous = object.meta.resource_version;
            object.meta.annotations.insert(name, value);
            object.meta.resource_version += 1;
            write_object(&tx, &object, previous)?;

            tx.commit()?;
            Ok(object)
        })
        .await
    }
}
