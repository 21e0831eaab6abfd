//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use natsauth::{Controller, Engine, EngineConfig, Outcome, RunReport};
use natsauth_core::{
    AccountLimits, AccountSpec, CredentialStatus, KeyKind, KeyPair, Object, ObjectKey,
    OperatorSpec, Permissions, Resource, UserSpec,
};
use natsauth_store::{MemoryStore, Record, Store, StoreExt};

/// URL every fixture operator hands to its users.
pub const TEST_NATS_URL: &str = "nats://nats:4222";

/// Drains allowed per [`TestFixture::settle`].
pub const SETTLE_ROUNDS: usize = 32;

/// An engine over a fresh memory store, with a controller to drive it.
pub struct TestFixture {
    pub controller: Controller<MemoryStore>,
}

impl TestFixture {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            controller: Controller::new(Engine::new(MemoryStore::new(), config)),
        }
    }

    pub fn engine(&self) -> &Arc<Engine<MemoryStore>> {
        self.controller.engine()
    }

    pub fn store(&self) -> &MemoryStore {
        self.engine().store()
    }

    /// Declare (or update) an object.
    pub async fn declare<R: Resource>(&self, name: &str, spec: &R) -> Object<R> {
        self.store()
            .declare(name, spec)
            .await
            .expect("declare object")
    }

    /// Declare a `jwt`-mode operator whose artifact is `<name>-auth`.
    pub async fn jwt_operator(&self, name: &str) -> Object<OperatorSpec> {
        self.declare(name, &OperatorSpec::jwt(TEST_NATS_URL, format!("{name}-auth")))
            .await
    }

    /// Declare a `token`-mode operator whose artifact is `<name>-auth`.
    pub async fn token_operator(&self, name: &str) -> Object<OperatorSpec> {
        self.declare(name, &OperatorSpec::token(TEST_NATS_URL, format!("{name}-auth")))
            .await
    }

    /// Declare an account with a connection limit.
    pub async fn account(&self, name: &str, operator: &str, conn: i64) -> Object<AccountSpec> {
        self.declare(name, &account_spec(operator, conn)).await
    }

    /// Declare a hierarchical user with publish permissions.
    pub async fn jwt_user(
        &self,
        name: &str,
        operator: &str,
        account: &str,
        publish_allow: &[&str],
    ) -> Object<UserSpec> {
        let mut spec = UserSpec::jwt(operator, account);
        if !publish_allow.is_empty() {
            spec.permissions = Some(publish_permissions(publish_allow));
        }
        self.declare(name, &spec).await
    }

    /// Declare a flat user with publish permissions.
    pub async fn flat_user(&self, name: &str, operator: &str, publish_allow: &[&str]) -> Object<UserSpec> {
        let mut spec = UserSpec::token(operator);
        if !publish_allow.is_empty() {
            spec.permissions = Some(publish_permissions(publish_allow));
        }
        self.declare(name, &spec).await
    }

    pub async fn reconcile(&self, key: &ObjectKey) -> Outcome {
        self.engine().reconcile(key).await
    }

    /// Queue everything and run until the queue is empty.
    pub async fn settle(&self) -> RunReport {
        self.controller.enqueue_all().await.expect("enqueue all");
        self.controller.run_until_idle(SETTLE_ROUNDS).await
    }

    pub async fn record(&self, name: &str) -> Option<Record> {
        self.store().get_record(name).await.expect("read record")
    }

    /// A text field of a record that must exist.
    pub async fn field(&self, record: &str, field: &str) -> String {
        let record = self
            .record(record)
            .await
            .unwrap_or_else(|| panic!("record {record} missing"));
        record
            .text(field)
            .unwrap_or_else(|| panic!("field {field} missing from {}", record.name))
            .to_string()
    }

    pub async fn status(&self, key: &ObjectKey) -> CredentialStatus {
        self.store()
            .get_object(key)
            .await
            .expect("read object")
            .unwrap_or_else(|| panic!("object {key} missing"))
            .status
    }

    /// The persisted public id of an object.
    pub async fn public_key(&self, key: &ObjectKey) -> String {
        self.status(key)
            .await
            .public_key
            .unwrap_or_else(|| panic!("{key} has no public key"))
    }

    pub fn write_count(&self) -> u64 {
        self.store().write_count()
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// An account spec with every limit unlimited except connections.
pub fn account_spec(operator: &str, conn: i64) -> AccountSpec {
    let mut spec = AccountSpec::new(operator);
    spec.limits = Some(AccountLimits {
        conn,
        ..AccountLimits::default()
    });
    spec
}

pub fn publish_permissions(subjects: &[&str]) -> Permissions {
    Permissions {
        publish_allow: subjects.iter().map(|s| s.to_string()).collect(),
        ..Permissions::default()
    }
}

/// A deterministic keypair; distinct `index` values give distinct keys.
pub fn seeded_key_pair(kind: KeyKind, index: u8) -> KeyPair {
    let mut seed = [0u8; 32];
    seed[0] = index;
    seed[31] = 0xA5;
    KeyPair::from_raw_seed(kind, &seed)
}
