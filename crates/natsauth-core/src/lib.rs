//! # natsauth Core
//!
//! Pure primitives for natsauth: NKey keypairs, signed claims, credentials
//! files and the declared-state schema.
//!
//! This crate contains no I/O and no storage. It is pure computation over
//! keys and claims documents.
//!
//! ## Key Types
//!
//! - [`KeyPair`] - Role-tagged Ed25519 keypair with NKey seed encoding
//! - [`PublicKey`] - Role-tagged public id (`O…`, `A…`, `U…`)
//! - [`Claims`] - Operator, account and user claims documents
//! - [`UserCredentials`] - Token + seed text block for clients
//! - [`Fingerprint`] - Blake3 hash of canonical claims, used to detect change
//! - [`Object`] - A declared operator, account or user with its status
//!
//! ## Signing
//!
//! ```rust
//! use natsauth_core::{build_account_claims, jwt, obtain_key_pair, KeyKind};
//!
//! let operator = obtain_key_pair(KeyKind::Operator, None).unwrap();
//! let account = obtain_key_pair(KeyKind::Account, None).unwrap();
//!
//! let claims = build_account_claims(&account.public_key(), "prod", "", None, None);
//! let token = jwt::sign(claims, &operator).unwrap();
//! assert_eq!(token.split('.').count(), 3);
//! ```

pub mod claims;
pub mod creds;
pub mod error;
pub mod fingerprint;
pub mod jwt;
pub mod nkeys;
pub mod resource;
pub mod secret;

pub use claims::{
    build_account_claims, build_operator_claims, build_user_claims, AccountClaims, AccountNats,
    ClaimType, Claims, ClaimsBody, LimitsClaim, OperatorClaims, OperatorNats, SubjectPermission,
    UserClaims, UserNats,
};
pub use creds::UserCredentials;
pub use error::{CoreError, Result};
pub use fingerprint::{canonical_bytes, claims_fingerprint, Fingerprint};
pub use nkeys::{obtain_key_pair, KeyKind, KeyPair, PublicKey, Signature};
pub use resource::{
    AccountLimits, AccountSpec, AuthMode, Condition, CredentialStatus, JetStreamLimits,
    JwtSettings, Kind, Object, ObjectKey, ObjectMeta, OperatorSpec, PasswordSource, Permissions,
    Phase, Resource, ResolverForm, SecretKeyRef, ServerAuthConfig, UserAuthType, UserSpec,
};
pub use secret::generate_password;
