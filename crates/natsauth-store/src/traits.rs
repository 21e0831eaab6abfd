//! Store trait: the abstract interface for credential records and declared
//! objects.
//!
//! This trait keeps the engine storage-agnostic. Implementations include
//! SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use natsauth_core::{CredentialStatus, Kind, Object, ObjectKey, ObjectMeta, Resource};

use crate::error::{Result, StoreError};
use crate::record::Record;

/// A declared object with its spec kept as untyped JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub kind: Kind,
    pub meta: ObjectMeta,
    pub spec: serde_json::Value,
    pub status: CredentialStatus,
}

impl StoredObject {
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.kind, self.meta.name.clone())
    }

    /// Decode into a typed object.
    pub fn decode<R: Resource>(self) -> Result<Object<R>> {
        if self.kind != R::KIND {
            return Err(StoreError::InvalidData(format!(
                "expected {} object, found {}",
                R::KIND,
                self.kind
            )));
        }
        Ok(Object {
            spec: serde_json::from_value(self.spec)?,
            meta: self.meta,
            status: self.status,
        })
    }
}

/// The Store trait: async interface for records and declared objects.
///
/// # Design Notes
///
/// - **Optimistic concurrency**: every record and object carries a version.
///   Writes that name a stale version fail with [`StoreError::Conflict`];
///   the caller re-reads and retries.
/// - **Atomic records**: a record is created or replaced as a whole, never
///   field by field.
/// - **Generation**: an object's generation moves only when its spec
///   changes; status writes and annotations only move its resource version.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Record Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a record by name.
    async fn get_record(&self, name: &str) -> Result<Option<Record>>;

    /// Create a record. Fails with `Conflict` if the name is taken.
    ///
    /// Returns the stored record with its assigned version.
    async fn create_record(&self, record: &Record) -> Result<Record>;

    /// Replace a record's fields.
    ///
    /// `record.version` must match the stored version, otherwise `Conflict`.
    async fn update_record(&self, record: &Record) -> Result<Record>;

    // ─────────────────────────────────────────────────────────────────────────
    // Object Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a declared object.
    async fn get_object(&self, key: &ObjectKey) -> Result<Option<StoredObject>>;

    /// List all declared objects of a kind, ordered by name.
    async fn list_objects(&self, kind: Kind) -> Result<Vec<StoredObject>>;

    /// Create or update an object's spec.
    ///
    /// Bumps the generation when the spec differs from the stored one; an
    /// identical spec is not a write.
    async fn apply_spec(&self, key: &ObjectKey, spec: serde_json::Value) -> Result<StoredObject>;

    /// Replace an object's status.
    ///
    /// `expected_version` must match the object's resource version,
    /// otherwise `Conflict`.
    async fn update_status(
        &self,
        key: &ObjectKey,
        status: &CredentialStatus,
        expected_version: u64,
    ) -> Result<StoredObject>;

    /// Set an annotation on an object, bumping its resource version.
    async fn annotate(&self, key: &ObjectKey, name: &str, value: &str) -> Result<StoredObject>;
}

/// Typed helpers over [`Store`].
pub trait StoreExt: Store {
    /// Get a typed object by name.
    fn get<R: Resource>(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<Option<Object<R>>>> + Send;

    /// List typed objects of one kind.
    fn list<R: Resource>(&self) -> impl std::future::Future<Output = Result<Vec<Object<R>>>> + Send;

    /// Declare (create or update) an object's desired state.
    fn declare<R: Resource>(
        &self,
        name: &str,
        spec: &R,
    ) -> impl std::future::Future<Output = Result<Object<R>>> + Send;

    /// Write an object's status against the version it was read at.
    fn write_status<R: Resource>(
        &self,
        object: &Object<R>,
        status: &CredentialStatus,
    ) -> impl std::future::Future<Output = Result<Object<R>>> + Send;
}

impl<S: Store + ?Sized> StoreExt for S {
    async fn get<R: Resource>(&self, name: &str) -> Result<Option<Object<R>>> {
        let key = ObjectKey::new(R::KIND, name);
        match self.get_object(&key).await? {
            Some(stored) => Ok(Some(stored.decode()?)),
            None => Ok(None),
        }
    }

    async fn list<R: Resource>(&self) -> Result<Vec<Object<R>>> {
        self.list_objects(R::KIND)
            .await?
            .into_iter()
            .map(StoredObject::decode)
            .collect()
    }

    async fn declare<R: Resource>(&self, name: &str, spec: &R) -> Result<Object<R>> {
        let key = ObjectKey::new(R::KIND, name);
        let value = serde_json::to_value(spec)?;
        self.apply_spec(&key, value).await?.decode()
    }

    async fn write_status<R: Resource>(
        &self,
        object: &Object<R>,
        status: &CredentialStatus,
    ) -> Result<Object<R>> {
        self.update_status(&object.key(), status, object.meta.resource_version)
            .await?
            .decode()
    }
}
