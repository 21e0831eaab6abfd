//! Claims documents for operator, account and user tokens.
//!
//! The JSON layout follows the NATS JWT v2 schema: registered claims at the
//! top level, NATS-specific fields under `nats` with a `type` and `version`.
//! The builders only translate declared state; `iss`, `iat` and `jti` are
//! filled in by [`crate::jwt::sign`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::nkeys::{KeyKind, PublicKey};
use crate::resource::{AccountLimits, JetStreamLimits, Permissions};

/// Claims schema version written into every token.
pub const CLAIMS_VERSION: u8 = 2;

/// Value of `nats.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimType {
    Operator,
    Account,
    User,
}

/// The NATS-specific body of a claims document.
pub trait ClaimsBody: Serialize + DeserializeOwned + Clone {
    const TYPE: ClaimType;
    /// Role of the key allowed to sign this kind of claims.
    const ISSUER: KeyKind;
}

/// A claims document: registered JWT claims plus a NATS body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims<N> {
    /// Unique id: hash of the claims with an empty `jti`.
    #[serde(default)]
    pub jti: String,
    /// Issued-at, Unix seconds.
    #[serde(default)]
    pub iat: i64,
    /// Issuer public id.
    #[serde(default)]
    pub iss: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Subject public id.
    pub sub: String,
    pub nats: N,
}

pub type OperatorClaims = Claims<OperatorNats>;
pub type AccountClaims = Claims<AccountNats>;
pub type UserClaims = Claims<UserNats>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorNats {
    #[serde(rename = "type")]
    pub claim_type: ClaimType,
    pub version: u8,
}

impl ClaimsBody for OperatorNats {
    const TYPE: ClaimType = ClaimType::Operator;
    const ISSUER: KeyKind = KeyKind::Operator;
}

/// Account resource limits as carried in `nats.limits`.
///
/// The defaults are the broker's: everything unlimited, JetStream disabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsClaim {
    pub subs: i64,
    pub data: i64,
    pub payload: i64,
    pub imports: i64,
    pub exports: i64,
    pub wildcards: bool,
    pub conn: i64,
    pub leaf: i64,
    pub mem_storage: i64,
    pub disk_storage: i64,
    pub streams: i64,
    pub consumer: i64,
    pub max_ack_pending: i64,
    pub mem_max_stream_bytes: i64,
    pub disk_max_stream_bytes: i64,
    pub max_bytes_required: bool,
}

impl Default for LimitsClaim {
    fn default() -> Self {
        Self {
            subs: -1,
            data: -1,
            payload: -1,
            imports: -1,
            exports: -1,
            wildcards: true,
            conn: -1,
            leaf: -1,
            mem_storage: 0,
            disk_storage: 0,
            streams: 0,
            consumer: 0,
            max_ack_pending: 0,
            mem_max_stream_bytes: 0,
            disk_max_stream_bytes: 0,
            max_bytes_required: false,
        }
    }
}

impl LimitsClaim {
    /// Whether any JetStream limit is set.
    pub fn has_jetstream(&self) -> bool {
        self.mem_storage != 0
            || self.disk_storage != 0
            || self.streams != 0
            || self.consumer != 0
            || self.max_ack_pending != 0
            || self.mem_max_stream_bytes != 0
            || self.disk_max_stream_bytes != 0
            || self.max_bytes_required
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountNats {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub limits: LimitsClaim,
    #[serde(rename = "type")]
    pub claim_type: ClaimType,
    pub version: u8,
}

impl ClaimsBody for AccountNats {
    const TYPE: ClaimType = ClaimType::Account;
    const ISSUER: KeyKind = KeyKind::Operator;
}

/// An allow/deny subject pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectPermission {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deny: Vec<String>,
}

impl SubjectPermission {
    fn from_lists(allow: &[String], deny: &[String]) -> Self {
        Self {
            allow: subject_set(allow),
            deny: subject_set(deny),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserNats {
    #[serde(rename = "pub", default)]
    pub publish: SubjectPermission,
    #[serde(rename = "sub", default)]
    pub subscribe: SubjectPermission,
    pub subs: i64,
    pub data: i64,
    pub payload: i64,
    #[serde(rename = "type")]
    pub claim_type: ClaimType,
    pub version: u8,
}

impl ClaimsBody for UserNats {
    const TYPE: ClaimType = ClaimType::User;
    const ISSUER: KeyKind = KeyKind::Account;
}

/// Build the self-describing claims of the root of trust.
pub fn build_operator_claims(public_id: &PublicKey, name: &str) -> OperatorClaims {
    Claims {
        jti: String::new(),
        iat: 0,
        iss: String::new(),
        name: name.to_string(),
        sub: public_id.encode(),
        nats: OperatorNats {
            claim_type: ClaimType::Operator,
            version: CLAIMS_VERSION,
        },
    }
}

/// Build account claims. Absent limits leave the broker defaults in effect.
pub fn build_account_claims(
    public_id: &PublicKey,
    name: &str,
    description: &str,
    limits: Option<&AccountLimits>,
    jetstream: Option<&JetStreamLimits>,
) -> AccountClaims {
    let mut claim = LimitsClaim::default();

    if let Some(limits) = limits {
        claim.conn = limits.conn;
        claim.subs = limits.subs;
        claim.payload = limits.payload;
        claim.data = limits.data;
        claim.exports = limits.exports;
        claim.imports = limits.imports;
        claim.wildcards = limits.wildcard_exports;
    }

    if let Some(js) = jetstream {
        claim.mem_storage = js.memory_storage;
        claim.disk_storage = js.disk_storage;
        claim.streams = js.streams;
        claim.consumer = js.consumer;
        claim.max_ack_pending = js.max_ack_pending;
        claim.mem_max_stream_bytes = js.memory_max_stream_bytes;
        claim.disk_max_stream_bytes = js.disk_max_stream_bytes;
        claim.max_bytes_required = js.max_bytes_required;
    }

    Claims {
        jti: String::new(),
        iat: 0,
        iss: String::new(),
        name: name.to_string(),
        sub: public_id.encode(),
        nats: AccountNats {
            description: description.to_string(),
            limits: claim,
            claim_type: ClaimType::Account,
            version: CLAIMS_VERSION,
        },
    }
}

/// Build user claims. Absent permissions leave the user unrestricted.
pub fn build_user_claims(
    public_id: &PublicKey,
    name: &str,
    permissions: Option<&Permissions>,
) -> UserClaims {
    let (publish, subscribe) = match permissions {
        Some(p) => (
            SubjectPermission::from_lists(&p.publish_allow, &p.publish_deny),
            SubjectPermission::from_lists(&p.subscribe_allow, &p.subscribe_deny),
        ),
        None => Default::default(),
    };

    Claims {
        jti: String::new(),
        iat: 0,
        iss: String::new(),
        name: name.to_string(),
        sub: public_id.encode(),
        nats: UserNats {
            publish,
            subscribe,
            subs: -1,
            data: -1,
            payload: -1,
            claim_type: ClaimType::User,
            version: CLAIMS_VERSION,
        },
    }
}

/// Deduplicate a subject list, keeping the first occurrence of each subject.
pub fn subject_set(subjects: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(subjects.len());
    for subject in subjects {
        if !out.contains(subject) {
            out.push(subject.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nkeys::KeyPair;

    #[test]
    fn test_account_claims_without_limits_use_broker_defaults() {
        let kp = KeyPair::generate(KeyKind::Account);
        let claims = build_account_claims(&kp.public_key(), "prod", "", None, None);

        assert_eq!(claims.sub, kp.public_key().encode());
        assert_eq!(claims.nats.limits, LimitsClaim::default());
        assert!(!claims.nats.limits.has_jetstream());
    }

    #[test]
    fn test_account_claims_copy_limits() {
        let kp = KeyPair::generate(KeyKind::Account);
        let limits = AccountLimits {
            conn: 100,
            wildcard_exports: false,
            ..Default::default()
        };
        let js = JetStreamLimits {
            disk_storage: 1 << 30,
            streams: 10,
            ..Default::default()
        };
        let claims =
            build_account_claims(&kp.public_key(), "prod", "production", Some(&limits), Some(&js));

        assert_eq!(claims.nats.description, "production");
        assert_eq!(claims.nats.limits.conn, 100);
        assert_eq!(claims.nats.limits.subs, -1);
        assert!(!claims.nats.limits.wildcards);
        assert_eq!(claims.nats.limits.disk_storage, 1 << 30);
        assert_eq!(claims.nats.limits.streams, 10);
        assert!(claims.nats.limits.has_jetstream());
    }

    #[test]
    fn test_user_claims_dedupe_subjects() {
        let kp = KeyPair::generate(KeyKind::User);
        let perms = Permissions {
            publish_allow: vec!["orders.>".into(), "audit".into(), "orders.>".into()],
            subscribe_deny: vec!["_INBOX.>".into()],
            ..Default::default()
        };
        let claims = build_user_claims(&kp.public_key(), "svc", Some(&perms));

        assert_eq!(claims.nats.publish.allow, vec!["orders.>", "audit"]);
        assert!(claims.nats.publish.deny.is_empty());
        assert_eq!(claims.nats.subscribe.deny, vec!["_INBOX.>"]);
    }

    #[test]
    fn test_claims_json_layout() {
        let kp = KeyPair::generate(KeyKind::User);
        let claims = build_user_claims(&kp.public_key(), "svc", None);
        let json: serde_json::Value = serde_json::to_value(&claims).unwrap();

        assert_eq!(json["nats"]["type"], "user");
        assert_eq!(json["nats"]["version"], 2);
        assert_eq!(json["nats"]["subs"], -1);
        // Empty permission lists are omitted
        assert_eq!(json["nats"]["pub"], serde_json::json!({}));
    }
}
