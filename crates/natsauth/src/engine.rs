//! The Engine: reconciles declared operators, accounts and users into
//! signed credentials and rendered broker configuration.
//!
//! Each call to [`Engine::reconcile`] handles one object. It reads
//! everything it needs from the store, so it is safe to run repeatedly,
//! concurrently for different objects, and after a crash.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::Instrument;

use natsauth_core::resource::CONDITION_READY;
use natsauth_core::{Condition, CredentialStatus, Kind, ObjectKey, Phase};
use natsauth_store::{Record, Store, StoreError, StoredObject};

use crate::config::EngineConfig;
use crate::error::{ReconcileError, Result};
use crate::queue::WorkQueue;

/// Prefix of the annotations bumped on an operator when a dependent changes.
pub const ANNOTATION_LAST_UPDATE: &str = "natsauth/last-update";

/// The annotation an operator carries for one dependent, holding
/// `"{kind}/{name}@{resource_version}"` of the last change it was told about.
pub fn last_update_annotation(source: &ObjectKey) -> String {
    format!("{ANNOTATION_LAST_UPDATE}.{}.{}", source.kind, source.name)
}

/// What a single reconcile did, and when it wants to run again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub key: ObjectKey,
    pub phase: Phase,
    /// Failure reason, if the reconcile failed.
    pub reason: Option<&'static str>,
    /// `None` when the object no longer exists.
    pub requeue_after: Option<Duration>,
}

impl Outcome {
    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Ready && self.reason.is_none()
    }

    fn gone(key: &ObjectKey) -> Self {
        Self {
            key: key.clone(),
            phase: Phase::Pending,
            reason: None,
            requeue_after: None,
        }
    }
}

/// The result of a successful per-kind reconcile, applied at the boundary.
#[derive(Debug, Default)]
pub(crate) struct Reconciled {
    pub status: CredentialStatus,
    /// Operators whose artifact includes this object.
    pub notify: Vec<String>,
    /// The object's contribution to those artifacts changed in this pass.
    pub changed: bool,
    /// Dependents to enqueue without annotation.
    pub enqueue: Vec<ObjectKey>,
}

impl Reconciled {
    pub fn new(status: CredentialStatus) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }
}

/// The reconciliation engine.
///
/// Provides:
/// - Per-kind reconciliation with a consistency guard against re-signing
/// - Aggregation of the operator's broker configuration
/// - Cross-object notification through the [`WorkQueue`]
pub struct Engine<S: Store> {
    store: Arc<S>,
    config: EngineConfig,
    queue: WorkQueue,
    /// One async lock per object; the same object never reconciles twice at once.
    locks: Mutex<HashMap<ObjectKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S: Store> Engine<S> {
    /// Create an engine owning its store.
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self::with_shared_store(Arc::new(store), config)
    }

    /// Create an engine over a store shared with other components.
    pub fn with_shared_store(store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            queue: WorkQueue::new(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Queue receiving notifications and dependent requeues.
    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    fn lock_for(&self, key: &ObjectKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks.entry(key.clone()).or_default().clone()
    }

    /// Drop an object's lock once no other reconcile holds or waits on it.
    fn release_lock(&self, key: &ObjectKey, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap();
        drop(lock);
        if locks.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(key);
        }
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks.lock().unwrap().len()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reconcile
    // ─────────────────────────────────────────────────────────────────────────

    /// Reconcile one object.
    ///
    /// Errors never escape: they are recorded in the object's status and
    /// turned into a requeue delay.
    pub async fn reconcile(&self, key: &ObjectKey) -> Outcome {
        let lock = self.lock_for(key);
        let outcome = {
            let _guard = lock.lock().await;
            let span = tracing::info_span!("reconcile", kind = %key.kind, name = %key.name);
            self.reconcile_locked(key).instrument(span).await
        };
        self.release_lock(key, lock);
        outcome
    }

    async fn reconcile_locked(&self, key: &ObjectKey) -> Outcome {
        let stored = match self.store.get_object(key).await {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                tracing::debug!("object not found, nothing to do");
                return Outcome::gone(key);
            }
            Err(e) => return self.fail(key, None, e.into()).await,
        };

        match self.dispatch(&stored).await {
            Ok(done) => match self.finish(&stored, done).await {
                Ok(()) => Outcome {
                    key: key.clone(),
                    phase: Phase::Ready,
                    reason: None,
                    requeue_after: Some(self.config.drift_interval()),
                },
                Err(e) => self.fail(key, Some(&stored), e).await,
            },
            Err(e) => self.fail(key, Some(&stored), e).await,
        }
    }

    async fn dispatch(&self, stored: &StoredObject) -> Result<Reconciled> {
        match stored.kind {
            Kind::Operator => self.reconcile_operator(stored.clone().decode()?).await,
            Kind::Account => self.reconcile_account(stored.clone().decode()?).await,
            Kind::User => self.reconcile_user(stored.clone().decode()?).await,
        }
    }

    /// Write the ready status, then deliver notifications.
    async fn finish(&self, stored: &StoredObject, done: Reconciled) -> Result<()> {
        let mut status = done.status;
        status.phase = Phase::Ready;
        status.observed_generation = stored.meta.generation;
        status.set_condition(Condition::new(
            CONDITION_READY,
            true,
            "Reconciled",
            "credentials are current",
        ));

        let version = self.write_status(stored, status).await?;

        let source = stored.key();
        for operator in &done.notify {
            self.notify_operator(operator, &source, version, done.changed).await?;
        }
        for key in done.enqueue {
            if self.queue.enqueue(key.clone()) {
                tracing::debug!(dependent = %key, "enqueued dependent");
            }
        }

        tracing::info!(generation = stored.meta.generation, "reconciled");
        Ok(())
    }

    /// Record a failure in status (unless it is a conflict) and pick a delay.
    async fn fail(
        &self,
        key: &ObjectKey,
        stored: Option<&StoredObject>,
        error: ReconcileError,
    ) -> Outcome {
        let phase = match error {
            ReconcileError::DependencyNotReady(_) => Phase::Pending,
            _ => Phase::Error,
        };

        match &error {
            ReconcileError::DependencyNotReady(msg) => {
                tracing::info!(reason = error.reason(), "waiting: {msg}")
            }
            ReconcileError::StoreConflict(msg) => {
                tracing::debug!(reason = error.reason(), "conflict, retrying: {msg}")
            }
            other => tracing::warn!(reason = other.reason(), error = %other, "reconcile failed"),
        }

        if let (Some(stored), false) = (stored, matches!(error, ReconcileError::StoreConflict(_))) {
            let mut status = stored.status.clone();
            status.phase = phase;
            status.observed_generation = stored.meta.generation;
            status.set_condition(Condition::new(
                CONDITION_READY,
                false,
                error.reason(),
                error.to_string(),
            ));
            if let Err(e) = self.write_status(stored, status).await {
                tracing::debug!(error = %e, "could not record failure in status");
            }
        }

        Outcome {
            key: key.clone(),
            phase,
            reason: Some(error.reason()),
            requeue_after: Some(error.requeue_after(&self.config)),
        }
    }

    /// Write status only when it differs. Returns the resulting resource version.
    async fn write_status(&self, stored: &StoredObject, status: CredentialStatus) -> Result<u64> {
        if status == stored.status {
            return Ok(stored.meta.resource_version);
        }
        let updated = self
            .store
            .update_status(&stored.key(), &status, stored.meta.resource_version)
            .await?;
        tracing::debug!(phase = ?status.phase, "status written");
        Ok(updated.meta.resource_version)
    }

    /// Persist a record as one write, skipping the write when nothing changed.
    ///
    /// `existing` is the record as read at the start of the reconcile; a
    /// concurrent write since then surfaces as a conflict.
    pub(crate) async fn put_record(&self, existing: Option<&Record>, mut desired: Record) -> Result<bool> {
        match existing {
            Some(current) if current.same_data(&desired) => Ok(false),
            Some(current) => {
                desired.version = current.version;
                self.store.update_record(&desired).await?;
                tracing::debug!(record = %desired.name, "record updated");
                Ok(true)
            }
            None => {
                self.store.create_record(&desired).await?;
                tracing::debug!(record = %desired.name, "record created");
                Ok(true)
            }
        }
    }

    /// Mark an operator dirty and schedule it.
    ///
    /// An unchanged source still notifies when the operator's annotation
    /// does not name its current version, so a notification lost after the
    /// status write is delivered on the next pass.
    async fn notify_operator(
        &self,
        operator: &str,
        source: &ObjectKey,
        version: u64,
        changed: bool,
    ) -> Result<()> {
        let key = ObjectKey::operator(operator);
        let annotation = last_update_annotation(source);
        let value = format!("{source}@{version}");

        if !changed {
            match self.store.get_object(&key).await? {
                None => return Ok(()),
                Some(stored) if stored.meta.annotations.get(&annotation) == Some(&value) => {
                    return Ok(())
                }
                Some(_) => tracing::info!(operator, "operator missed the last update, notifying again"),
            }
        }

        match self.store.annotate(&key, &annotation, &value).await {
            Ok(_) => {}
            Err(StoreError::NotFound(_)) => {
                tracing::debug!(operator, "operator gone, skipping notification");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
        self.queue.enqueue(key);
        tracing::debug!(operator, "notified operator");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use natsauth_core::{AccountSpec, OperatorSpec};
    use natsauth_store::{MemoryStore, StoreExt};

    #[tokio::test]
    async fn test_locks_released_after_reconcile() {
        let engine = Engine::new(MemoryStore::new(), EngineConfig::default());
        engine
            .store()
            .declare("root", &OperatorSpec::jwt("nats://nats:4222", "root-auth"))
            .await
            .unwrap();
        engine.store().declare("prod", &AccountSpec::new("root")).await.unwrap();

        for key in [
            ObjectKey::operator("root"),
            ObjectKey::account("prod"),
            ObjectKey::account("deleted"),
        ] {
            engine.reconcile(&key).await;
        }
        assert_eq!(engine.lock_count(), 0);
    }

    #[tokio::test]
    async fn test_held_lock_survives_release() {
        let engine = Engine::new(MemoryStore::new(), EngineConfig::default());
        let key = ObjectKey::account("prod");

        let held = engine.lock_for(&key);
        engine.reconcile(&key).await;
        assert_eq!(engine.lock_count(), 1);

        engine.release_lock(&key, held);
        assert_eq!(engine.lock_count(), 0);
    }
}
