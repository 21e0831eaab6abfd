//! Error types for natsauth core.

use thiserror::Error;

/// Core errors that can occur while handling keys, claims and tokens.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Seed text is malformed, fails its checksum, or has the wrong role.
    #[error("invalid seed: {0}")]
    InvalidSeed(String),

    /// Public key text is malformed or fails its checksum.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// The keypair could not produce a signature.
    #[error("signing error: {0}")]
    SigningError(String),

    #[error("invalid signature")]
    InvalidSignature,

    /// Token is not a well-formed `header.claims.signature` triple.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// Credentials file is missing one of its delimited sections.
    #[error("malformed credentials: {0}")]
    MalformedCredentials(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::EncodingError(e.to_string())
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
