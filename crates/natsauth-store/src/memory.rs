//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence. It also counts
//! writes, so tests can assert that a converged reconcile touches nothing.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use natsauth_core::{CredentialStatus, Kind, ObjectKey, ObjectMeta};

use crate::error::{Result, StoreError};
use crate::record::Record;
use crate::traits::{Store, StoredObject};

/// Counts of successful writes, by category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub record_writes: u64,
    pub spec_writes: u64,
    pub status_writes: u64,
    pub annotation_writes: u64,
}

impl WriteStats {
    pub fn total(&self) -> u64 {
        self.record_writes + self.spec_writes + self.status_writes + self.annotation_writes
    }
}

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

struct MemoryStoreInner {
    /// Records indexed by name.
    records: HashMap<String, Record>,

    /// Objects indexed by kind, then name (ordered for listing).
    objects: HashMap<Kind, BTreeMap<String, StoredObject>>,

    stats: WriteStats,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner {
                records: HashMap::new(),
                objects: HashMap::new(),
                stats: WriteStats::default(),
            }),
        }
    }

    /// Snapshot of the write counters.
    pub fn stats(&self) -> WriteStats {
        self.inner.read().unwrap().stats
    }

    /// Total number of writes so far.
    pub fn write_count(&self) -> u64 {
        self.stats().total()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_record(&self, name: &str) -> Result<Option<Record>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.records.get(name).cloned())
    }

    async fn create_record(&self, record: &Record) -> Result<Record> {
        let mut inner = self.inner.write().unwrap();

        if inner.records.contains_key(&record.name) {
            return Err(StoreError::conflict(&record.name, "record already exists"));
        }

        let mut stored = record.clone();
        stored.version = 1;
        inner.records.insert(stored.name.clone(), stored.clone());
        inner.stats.record_writes += 1;
        Ok(stored)
    }

    async fn update_record(&self, record: &Record) -> Result<Record> {
        let mut inner = self.inner.write().unwrap();

        let existing = inner
            .records
            .get_mut(&record.name)
            .ok_or_else(|| StoreError::NotFound(record.name.clone()))?;

        if existing.version != record.version {
            return Err(StoreError::conflict(
                &record.name,
                format!("expected version {}, found {}", record.version, existing.version),
            ));
        }

        existing.data = record.data.clone();
        existing.version += 1;
        let stored = existing.clone();
        inner.stats.record_writes += 1;
        Ok(stored)
    }

    async fn get_object(&self, key: &ObjectKey) -> Result<Option<StoredObject>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .objects
            .get(&key.kind)
            .and_then(|by_name| by_name.get(&key.name))
            .cloned())
    }

    async fn list_objects(&self, kind: Kind) -> Result<Vec<StoredObject>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .objects
            .get(&kind)
            .map(|by_name| by_name.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn apply_spec(&self, key: &ObjectKey, spec: serde_json::Value) -> Result<StoredObject> {
        let mut inner = self.inner.write().unwrap();
        let by_name = inner.objects.entry(key.kind).or_default();

        let stored = match by_name.get_mut(&key.name) {
            Some(existing) if existing.spec == spec => return Ok(existing.clone()),
            Some(existing) => {
                existing.spec = spec;
                existing.meta.generation += 1;
                existing.meta.resource_version += 1;
                existing.clone()
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
                by_name.insert(key.name.clone(), object.clone());
                object
            }
        };

        inner.stats.spec_writes += 1;
        Ok(stored)
    }

    async fn update_status(
        &self,
        key: &ObjectKey,
        status: &CredentialStatus,
        expected_version: u64,
    ) -> Result<StoredObject> {
        let mut inner = self.inner.write().unwrap();

        let existing = inner
            .objects
            .get_mut(&key.kind)
            .and_then(|by_name| by_name.get_mut(&key.name))
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        if existing.meta.resource_version != expected_version {
            return Err(StoreError::conflict(
                key.to_string(),
                format!(
                    "expected version {}, found {}",
                    expected_version, existing.meta.resource_version
                ),
            ));
        }

        existing.status = status.clone();
        existing.meta.resource_version += 1;
        let stored = existing.clone();
        inner.stats.status_writes += 1;
        Ok(stored)
    }

    async fn annotate(&self, key: &ObjectKey, name: &str, value: &str) -> Result<StoredObject> {
        let mut inner = self.inner.write().unwrap();

        let existing = inner
            .objects
            .get_mut(&key.kind)
            .and_then(|by_name| by_name.get_mut(&key.name))
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        existing
            .meta
            .annotations
            .insert(name.to_string(), value.to_string());
        existing.meta.resource_version += 1;
        let stored = existing.clone();
        inner.stats.annotation_writes += 1;
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::fields;
    use crate::traits::StoreExt;
    use natsauth_core::{AccountSpec, OperatorSpec, Phase};

    #[tokio::test]
    async fn test_record_create_and_update() {
        let store = MemoryStore::new();
        let record = Record::new("prod-account-jwt").with_field(fields::ACCOUNT_JWT, "t1");

        // Create
        let created = store.create_record(&record).await.unwrap();
        assert_eq!(created.version, 1);

        // Second create conflicts
        let err = store.create_record(&record).await.unwrap_err();
        assert!(err.is_conflict());

        // Update at the current version
        let mut next = created.clone();
        next.set(fields::ACCOUNT_JWT, "t2");
        let updated = store.update_record(&next).await.unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.text(fields::ACCOUNT_JWT), Some("t2"));

        // Stale update conflicts
        let err = store.update_record(&next).await.unwrap_err();
        assert!(err.is_conflict());

        assert_eq!(store.stats().record_writes, 2);
    }

    #[tokio::test]
    async fn test_update_missing_record() {
        let store = MemoryStore::new();
        let err = store.update_record(&Record::new("ghost")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_declare_bumps_generation_only_on_change() {
        let store = MemoryStore::new();
        let spec = AccountSpec::new("root");

        let first = store.declare("prod", &spec).await.unwrap();
        assert_eq!(first.meta.generation, 1);

        // Same spec: no write
        let same = store.declare("prod", &spec).await.unwrap();
        assert_eq!(same.meta.generation, 1);
        assert_eq!(store.stats().spec_writes, 1);

        let mut changed = spec.clone();
        changed.description = "production".into();
        let second = store.declare("prod", &changed).await.unwrap();
        assert_eq!(second.meta.generation, 2);
        assert_eq!(second.spec.description, "production");
    }

    #[tokio::test]
    async fn test_status_write_is_optimistic() {
        let store = MemoryStore::new();
        let spec = OperatorSpec::jwt("nats://nats:4222", "nats-auth");
        let object = store.declare("root", &spec).await.unwrap();

        let mut status = CredentialStatus::default();
        status.phase = Phase::Ready;
        let written = store.write_status(&object, &status).await.unwrap();
        assert_eq!(written.status.phase, Phase::Ready);
        assert_eq!(written.meta.generation, 1);

        // Writing against the old version conflicts
        let err = store.write_status(&object, &status).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_annotate_and_list() {
        let store = MemoryStore::new();
        store.declare("b", &AccountSpec::new("root")).await.unwrap();
        store.declare("a", &AccountSpec::new("root")).await.unwrap();

        let key = ObjectKey::account("a");
        let annotated = store.annotate(&key, "touched", "1").await.unwrap();
        assert_eq!(annotated.meta.annotations.get("touched").map(String::as_str), Some("1"));
        assert_eq!(annotated.meta.resource_version, 2);

        let names: Vec<_> = store
            .list::<AccountSpec>()
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.meta.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
