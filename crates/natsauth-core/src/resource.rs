//! Declared state: the operator, account and user objects the engine
//! reconciles, plus the status it writes back.
//!
//! Every object is stored as an [`Object`] carrying [`ObjectMeta`]
//! (generation, resource version, annotations), a kind-specific spec and a
//! shared [`CredentialStatus`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Default artifact key for the rendered server configuration.
pub const DEFAULT_SERVER_AUTH_KEY: &str = "auth.conf";
/// Default `name` claim of the operator token.
pub const DEFAULT_OPERATOR_NAME: &str = "NATS Operator";
/// Default resolver directory used by the directory form.
pub const DEFAULT_RESOLVER_DIR: &str = "/var/lib/nats-resolver";

/// Condition type for overall readiness.
pub const CONDITION_READY: &str = "Ready";
/// Condition type flagging JetStream limits that need broker-side enablement.
pub const CONDITION_JETSTREAM: &str = "JetStreamLimits";

/// Discriminator for the three declared object kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Operator,
    Account,
    User,
}

impl Kind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Kind::Operator => "operator",
            Kind::Account => "account",
            Kind::User => "user",
        }
    }

    /// Parse from the lowercase name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "operator" => Some(Kind::Operator),
            "account" => Some(Kind::Account),
            "user" => Some(Kind::User),
            _ => None,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one declared object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub kind: Kind,
    pub name: String,
}

impl ObjectKey {
    pub fn new(kind: Kind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn operator(name: impl Into<String>) -> Self {
        Self::new(Kind::Operator, name)
    }

    pub fn account(name: impl Into<String>) -> Self {
        Self::new(Kind::Account, name)
    }

    pub fn user(name: impl Into<String>) -> Self {
        Self::new(Kind::User, name)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Bookkeeping shared by every declared object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    /// Bumped on every spec change.
    pub generation: u64,
    /// Bumped on every write; used for optimistic concurrency.
    pub resource_version: u64,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// A spec type that can be declared in the store.
pub trait Resource: Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static {
    const KIND: Kind;
}

/// A declared object: metadata, desired state and last observed status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Object<S> {
    pub meta: ObjectMeta,
    pub spec: S,
    #[serde(default)]
    pub status: CredentialStatus,
}

impl<S: Resource> Object<S> {
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(S::KIND, self.meta.name.clone())
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared references
// ─────────────────────────────────────────────────────────────────────────────

/// Reference to a field of an externally managed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyRef {
    /// Record name.
    pub name: String,
    /// Field within the record; each use site has its own default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl SecretKeyRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Operator
// ─────────────────────────────────────────────────────────────────────────────

/// Deployment-wide authentication mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Flat username/password table only.
    Token,
    /// Signed operator/account/user trust chain only.
    #[default]
    Jwt,
    /// Both: the trust chain plus a flat table.
    Mixed,
}

impl AuthMode {
    /// Whether this mode publishes the signed trust chain.
    pub const fn uses_jwt(self) -> bool {
        matches!(self, AuthMode::Jwt | AuthMode::Mixed)
    }

    /// Whether this mode renders the flat user table.
    pub const fn uses_token(self) -> bool {
        matches!(self, AuthMode::Token | AuthMode::Mixed)
    }
}

/// How account tokens reach the broker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverForm {
    /// Embed every account token in the configuration.
    #[default]
    Preload,
    /// Point the broker at a directory holding one file per token.
    Directory,
}

/// Where the aggregate artifact is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerAuthConfig {
    /// Artifact record name.
    pub name: String,
    /// Field holding the rendered configuration.
    #[serde(default = "default_server_auth_key")]
    pub key: String,
}

impl ServerAuthConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: DEFAULT_SERVER_AUTH_KEY.to_string(),
        }
    }
}

/// Trust-chain settings, required in `jwt` and `mixed` mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JwtSettings {
    /// `name` claim of the operator token.
    #[serde(default = "default_operator_name")]
    pub operator_name: String,
    #[serde(default = "default_resolver_dir")]
    pub resolver_dir: String,
    #[serde(default)]
    pub resolver: ResolverForm,
    /// External operator seed; when absent the engine manages its own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_seed_ref: Option<SecretKeyRef>,
}

impl Default for JwtSettings {
    fn default() -> Self {
        Self {
            operator_name: default_operator_name(),
            resolver_dir: default_resolver_dir(),
            resolver: ResolverForm::default(),
            operator_seed_ref: None,
        }
    }
}

/// Desired state of the root of trust.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorSpec {
    /// Connection URL handed to clients in user records.
    pub nats_url: String,
    #[serde(default)]
    pub mode: AuthMode,
    pub server_auth_config: ServerAuthConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt: Option<JwtSettings>,
}

impl OperatorSpec {
    /// A `jwt`-mode operator with default trust-chain settings.
    pub fn jwt(nats_url: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            nats_url: nats_url.into(),
            mode: AuthMode::Jwt,
            server_auth_config: ServerAuthConfig::new(artifact),
            jwt: Some(JwtSettings::default()),
        }
    }

    /// A `token`-mode operator.
    pub fn token(nats_url: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            nats_url: nats_url.into(),
            mode: AuthMode::Token,
            server_auth_config: ServerAuthConfig::new(artifact),
            jwt: None,
        }
    }

    /// Check the schema constraints that serde cannot express.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.nats_url.starts_with("nats://") {
            return Err(format!("natsUrl must start with nats://, got {:?}", self.nats_url));
        }
        if self.server_auth_config.name.trim().is_empty() {
            return Err("serverAuthConfig.name must not be empty".into());
        }
        if self.server_auth_config.key.trim().is_empty() {
            return Err("serverAuthConfig.key must not be empty".into());
        }
        if self.mode.uses_jwt() && self.jwt.is_none() {
            return Err("jwt settings are required for jwt or mixed mode".into());
        }
        Ok(())
    }
}

impl Resource for OperatorSpec {
    const KIND: Kind = Kind::Operator;
}

// ─────────────────────────────────────────────────────────────────────────────
// Account
// ─────────────────────────────────────────────────────────────────────────────

/// Core account limits. Every count defaults to `-1` (unlimited).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountLimits {
    #[serde(default = "unlimited")]
    pub conn: i64,
    #[serde(default = "unlimited")]
    pub subs: i64,
    #[serde(default = "unlimited")]
    pub payload: i64,
    #[serde(default = "unlimited")]
    pub data: i64,
    #[serde(default = "unlimited")]
    pub exports: i64,
    #[serde(default = "unlimited")]
    pub imports: i64,
    #[serde(default = "enabled")]
    pub wildcard_exports: bool,
}

impl Default for AccountLimits {
    fn default() -> Self {
        Self {
            conn: -1,
            subs: -1,
            payload: -1,
            data: -1,
            exports: -1,
            imports: -1,
            wildcard_exports: true,
        }
    }
}

/// Streaming (JetStream) limits. Zero leaves JetStream disabled for the account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JetStreamLimits {
    pub memory_storage: i64,
    pub disk_storage: i64,
    pub streams: i64,
    pub consumer: i64,
    pub max_ack_pending: i64,
    pub memory_max_stream_bytes: i64,
    pub disk_max_stream_bytes: i64,
    pub max_bytes_required: bool,
}

/// Desired state of a tenant account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSpec {
    /// Name of the operator object that signs this account.
    pub operator_ref: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<AccountLimits>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jetstream_limits: Option<JetStreamLimits>,
    /// External account seed (field defaults to `account.seed`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_ref: Option<SecretKeyRef>,
}

impl AccountSpec {
    pub fn new(operator_ref: impl Into<String>) -> Self {
        Self {
            operator_ref: operator_ref.into(),
            description: String::new(),
            limits: None,
            jetstream_limits: None,
            seed_ref: None,
        }
    }
}

impl Resource for AccountSpec {
    const KIND: Kind = Kind::Account;
}

// ─────────────────────────────────────────────────────────────────────────────
// User
// ─────────────────────────────────────────────────────────────────────────────

/// Per-user credential style. `Inherit` follows the operator's mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserAuthType {
    Token,
    Jwt,
    #[default]
    Inherit,
}

/// Where a flat user's password comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PasswordSource {
    /// Generated once, then held stable.
    Generate,
    /// Read from an external record (field defaults to `password`).
    SecretRef(SecretKeyRef),
}

/// Subject permissions. Lists are sets; order carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Permissions {
    pub publish_allow: Vec<String>,
    pub publish_deny: Vec<String>,
    pub subscribe_allow: Vec<String>,
    pub subscribe_deny: Vec<String>,
}

impl Permissions {
    pub fn is_empty(&self) -> bool {
        self.publish_allow.is_empty()
            && self.publish_deny.is_empty()
            && self.subscribe_allow.is_empty()
            && self.subscribe_deny.is_empty()
    }
}

/// Desired state of a connecting principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSpec {
    /// Name of the operator object this user belongs to.
    pub operator_ref: String,
    #[serde(default)]
    pub auth_type: UserAuthType,
    /// Signing account; required for hierarchical users.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_ref: Option<String>,
    /// Flat-mode username; defaults to the object name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_source: Option<PasswordSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Permissions>,
    /// External user seed (field defaults to `user.seed`, then `seed.nk`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_ref: Option<SecretKeyRef>,
}

impl UserSpec {
    /// A hierarchical user signed by `account`.
    pub fn jwt(operator_ref: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            operator_ref: operator_ref.into(),
            auth_type: UserAuthType::Jwt,
            account_ref: Some(account.into()),
            username: None,
            password_source: None,
            permissions: None,
            seed_ref: None,
        }
    }

    /// A flat username/password user.
    pub fn token(operator_ref: impl Into<String>) -> Self {
        Self {
            operator_ref: operator_ref.into(),
            auth_type: UserAuthType::Token,
            account_ref: None,
            username: None,
            password_source: None,
            permissions: None,
            seed_ref: None,
        }
    }
}

impl Resource for UserSpec {
    const KIND: Kind = Kind::User;
}

// ─────────────────────────────────────────────────────────────────────────────
// Status
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle phase. There is no terminal phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Pending,
    Ready,
    Error,
}

/// A typed status condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: bool,
    /// Machine-readable reason.
    pub reason: String,
    /// Human-readable message.
    pub message: String,
}

impl Condition {
    pub fn new(
        condition_type: impl Into<String>,
        status: bool,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            condition_type: condition_type.into(),
            status,
            reason: reason.into(),
            message: message.into(),
        }
    }
}

/// Status written back by the engine for every kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CredentialStatus {
    pub phase: Phase,
    /// Public id of the entity's keypair (hierarchical entities only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    /// Name of the record holding the credentials.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<String>,
    /// Fingerprint of the claims behind the currently persisted token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claims_hash: Option<String>,
    pub observed_generation: u64,
    pub conditions: Vec<Condition>,
}

impl CredentialStatus {
    /// Look up a condition by type.
    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }

    /// Insert or replace the condition with the same type.
    pub fn set_condition(&mut self, condition: Condition) {
        match self
            .conditions
            .iter_mut()
            .find(|c| c.condition_type == condition.condition_type)
        {
            Some(existing) => *existing = condition,
            None => self.conditions.push(condition),
        }
    }

    /// Drop the condition with the given type, if present.
    pub fn clear_condition(&mut self, condition_type: &str) {
        self.conditions.retain(|c| c.condition_type != condition_type);
    }

    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Ready
    }
}

fn default_server_auth_key() -> String {
    DEFAULT_SERVER_AUTH_KEY.to_string()
}

fn default_operator_name() -> String {
    DEFAULT_OPERATOR_NAME.to_string()
}

fn default_resolver_dir() -> String {
    DEFAULT_RESOLVER_DIR.to_string()
}

fn unlimited() -> i64 {
    -1
}

fn enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_limits_defaults_from_partial_json() {
        let limits: AccountLimits = serde_json::from_str(r#"{"conn": 100}"#).unwrap();
        assert_eq!(limits.conn, 100);
        assert_eq!(limits.subs, -1);
        assert_eq!(limits.imports, -1);
        assert!(limits.wildcard_exports);
    }

    #[test]
    fn test_user_spec_defaults() {
        let spec: UserSpec = serde_json::from_str(r#"{"operatorRef": "root"}"#).unwrap();
        assert_eq!(spec.auth_type, UserAuthType::Inherit);
        assert!(spec.account_ref.is_none());
        assert!(spec.permissions.is_none());
    }

    #[test]
    fn test_password_source_json() {
        let generate: PasswordSource = serde_json::from_str(r#""generate""#).unwrap();
        assert_eq!(generate, PasswordSource::Generate);

        let external: PasswordSource =
            serde_json::from_str(r#"{"secretRef": {"name": "pw"}}"#).unwrap();
        assert_eq!(external, PasswordSource::SecretRef(SecretKeyRef::new("pw")));
    }

    #[test]
    fn test_operator_spec_validation() {
        let spec = OperatorSpec::jwt("nats://nats:4222", "nats-auth");
        assert!(spec.validate().is_ok());

        let mut missing_jwt = spec.clone();
        missing_jwt.jwt = None;
        assert!(missing_jwt.validate().is_err());

        let mut bad_url = spec.clone();
        bad_url.nats_url = "http://nats:4222".into();
        assert!(bad_url.validate().is_err());

        // Token mode needs no trust-chain settings
        assert!(OperatorSpec::token("nats://nats:4222", "nats-auth")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_set_condition_replaces_same_type() {
        let mut status = CredentialStatus::default();
        status.set_condition(Condition::new(CONDITION_READY, false, "Pending", "waiting"));
        status.set_condition(Condition::new(CONDITION_READY, true, "Reconciled", "ok"));
        assert_eq!(status.conditions.len(), 1);
        assert!(status.condition(CONDITION_READY).unwrap().status);

        status.clear_condition(CONDITION_READY);
        assert!(status.conditions.is_empty());
    }
}
