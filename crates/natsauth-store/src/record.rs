//! Credential records: named bags of fields with a version for optimistic
//! concurrency. The store never interprets field contents.
//!
//! Record names and field names are fixed so that the broker and clients
//! can find what the engine writes.

use std::collections::BTreeMap;

/// Stable field names.
pub mod fields {
    /// Operator token.
    pub const OPERATOR_JWT: &str = "operator.jwt";
    /// Operator seed; also the default field of an external operator seed.
    pub const OPERATOR_SEED: &str = "operator.seed";

    pub const ACCOUNT_JWT: &str = "account.jwt";
    pub const ACCOUNT_SEED: &str = "account.seed";

    /// Full credentials file (token + seed).
    pub const USER_CREDS: &str = "user.creds";
    pub const USER_JWT: &str = "user.jwt";
    pub const USER_SEED: &str = "seed.nk";
    /// Preferred field of an external user seed; `seed.nk` is the fallback.
    pub const EXTERNAL_USER_SEED: &str = "user.seed";

    pub const USERNAME: &str = "USERNAME";
    pub const PASSWORD: &str = "PASSWORD";
    pub const NATS_URL: &str = "NATS_URL";
    /// Default field of an external password.
    pub const EXTERNAL_PASSWORD: &str = "password";

    /// Operator token inside the aggregate artifact.
    pub const ARTIFACT_OPERATOR: &str = "operator";
}

/// Name of the record holding an operator's token and self-managed seed.
pub fn operator_record_name(operator: &str) -> String {
    format!("{operator}-operator")
}

/// Name of the record holding an account's token and seed.
pub fn account_record_name(account: &str) -> String {
    format!("{account}-account-jwt")
}

/// Name of the record holding a user's credentials (either mode).
pub fn user_record_name(user: &str) -> String {
    format!("{user}-user-creds")
}

/// A named, versioned record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    pub name: String,
    pub data: BTreeMap<String, Vec<u8>>,
    /// Store-assigned version; 0 for a record not yet persisted.
    pub version: u64,
}

impl Record {
    /// Create an empty, unpersisted record.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: BTreeMap::new(),
            version: 0,
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, key: impl Into<String>, value: impl AsRef<[u8]>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl AsRef<[u8]>) {
        self.data.insert(key.into(), value.as_ref().to_vec());
    }

    pub fn field(&self, key: &str) -> Option<&[u8]> {
        self.data.get(key).map(Vec::as_slice)
    }

    /// A non-empty UTF-8 field.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.field(key)
            .and_then(|b| std::str::from_utf8(b).ok())
            .filter(|s| !s.is_empty())
    }

    /// Whether `other` carries exactly the same fields, ignoring name and version.
    pub fn same_data(&self, other: &Record) -> bool {
        self.data == other.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_fields() {
        let record = Record::new("prod-account-jwt")
            .with_field(fields::ACCOUNT_JWT, "a.b.c")
            .with_field(fields::ACCOUNT_SEED, b"");

        assert_eq!(record.text(fields::ACCOUNT_JWT), Some("a.b.c"));
        // Empty fields read as absent
        assert_eq!(record.text(fields::ACCOUNT_SEED), None);
        assert_eq!(record.field(fields::ACCOUNT_SEED), Some(&b""[..]));
    }

    #[test]
    fn test_record_names() {
        assert_eq!(operator_record_name("root"), "root-operator");
        assert_eq!(account_record_name("prod"), "prod-account-jwt");
        assert_eq!(user_record_name("svc"), "svc-user-creds");
    }
}
