//! Token signing and verification.
//!
//! A token is `base64url(header).base64url(claims).base64url(signature)`
//! with the `ed25519-nkey` algorithm. The signer is the single source of
//! truth for `iss`: whatever the caller put there is overwritten with the
//! signing key's public id.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512_256};

use crate::claims::{ClaimType, Claims, ClaimsBody};
use crate::error::{CoreError, Result};
use crate::nkeys::{base32_encode, KeyPair, PublicKey, Signature};

/// Token type in the header.
pub const TOKEN_TYPE: &str = "JWT";
/// Signature algorithm in the header.
pub const ALGORITHM: &str = "ed25519-nkey";

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    typ: String,
    alg: String,
}

/// Sign a claims document with the issuer's keypair.
///
/// Sets `iss` to the signer's public id unconditionally, stamps `iat` when
/// the caller left it at zero, and derives `jti` from the claims content.
/// Fails with `SigningError` when the keypair's role may not issue this
/// kind of claims.
pub fn sign<N: ClaimsBody>(mut claims: Claims<N>, signer: &KeyPair) -> Result<String> {
    if signer.kind() != N::ISSUER {
        return Err(CoreError::SigningError(format!(
            "{:?} claims must be signed by an {} key, got {} key",
            N::TYPE,
            N::ISSUER,
            signer.kind()
        )));
    }

    claims.iss = signer.public_key().encode();
    if claims.iat == 0 {
        claims.iat = now_secs();
    }
    claims.jti = String::new();
    let unidentified = serde_json::to_vec(&claims)
        .map_err(|e| CoreError::SigningError(format!("claims serialization failed: {e}")))?;
    claims.jti = base32_encode(&Sha512_256::digest(&unidentified));

    let header = serde_json::to_vec(&Header {
        typ: TOKEN_TYPE.to_string(),
        alg: ALGORITHM.to_string(),
    })
    .map_err(|e| CoreError::SigningError(e.to_string()))?;
    let payload = serde_json::to_vec(&claims)
        .map_err(|e| CoreError::SigningError(format!("claims serialization failed: {e}")))?;

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header),
        URL_SAFE_NO_PAD.encode(payload)
    );
    let signature = signer.sign(signing_input.as_bytes());

    Ok(format!(
        "{}.{}",
        signing_input,
        URL_SAFE_NO_PAD.encode(signature.as_bytes())
    ))
}

/// Decode a token and verify its signature against its own `iss`.
///
/// Also checks the header algorithm, the claims type and that the issuer
/// key has the role allowed to sign this kind of claims.
pub fn decode<N: ClaimsBody>(token: &str) -> Result<Claims<N>> {
    let mut parts = token.trim().split('.');
    let (header_b64, payload_b64, signature_b64) =
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(p), Some(s), None) => (h, p, s),
            _ => return Err(CoreError::MalformedToken("expected three segments".into())),
        };

    let header: Header = serde_json::from_slice(&b64_decode(header_b64)?)
        .map_err(|e| CoreError::MalformedToken(format!("header: {e}")))?;
    if header.alg != ALGORITHM {
        return Err(CoreError::MalformedToken(format!(
            "unsupported algorithm {:?}",
            header.alg
        )));
    }

    let value: serde_json::Value = serde_json::from_slice(&b64_decode(payload_b64)?)
        .map_err(|e| CoreError::DecodingError(format!("claims: {e}")))?;
    let claim_type = value
        .pointer("/nats/type")
        .cloned()
        .map(serde_json::from_value::<ClaimType>)
        .transpose()
        .map_err(|e| CoreError::DecodingError(format!("claims type: {e}")))?;
    if claim_type != Some(N::TYPE) {
        return Err(CoreError::MalformedToken(format!(
            "expected {:?} claims, found {:?}",
            N::TYPE,
            claim_type
        )));
    }
    let claims: Claims<N> = serde_json::from_value(value)
        .map_err(|e| CoreError::DecodingError(format!("claims: {e}")))?;

    let issuer = PublicKey::decode(&claims.iss)?;
    if issuer.kind() != N::ISSUER {
        return Err(CoreError::InvalidPublicKey(format!(
            "{:?} claims issued by {} key",
            N::TYPE,
            issuer.kind()
        )));
    }

    let raw_signature: [u8; 64] = b64_decode(signature_b64)?
        .try_into()
        .map_err(|_| CoreError::MalformedToken("signature must be 64 bytes".into()))?;
    let signing_input = &token.trim()[..header_b64.len() + 1 + payload_b64.len()];
    issuer.verify(signing_input.as_bytes(), &Signature::from_bytes(raw_signature))?;

    Ok(claims)
}

fn b64_decode(segment: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| CoreError::MalformedToken(format!("base64: {e}")))
}

/// Get current time in seconds.
fn now_secs() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
