//! NKey keypairs: Ed25519 keys with a role prefix, CRC16 checksum and
//! base32 text encoding, as understood by the NATS server.
//!
//! Public keys encode as `prefix || key || crc16` (56 characters), seeds as
//! `seed-prefix/role || raw seed || crc16` (58 characters). The first
//! character of a public key names its role (`O`, `A`, `U`); seeds always
//! start with `S` followed by the role character.

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::Zeroizing;

use crate::error::{CoreError, Result};

const PREFIX_SEED: u8 = 18 << 3;
const PREFIX_OPERATOR: u8 = 14 << 3;
const PREFIX_ACCOUNT: u8 = 0;
const PREFIX_USER: u8 = 20 << 3;

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Role of a key in the operator → account → user hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    Operator,
    Account,
    User,
}

impl KeyKind {
    /// The prefix byte placed in front of public keys of this role.
    pub const fn prefix_byte(self) -> u8 {
        match self {
            KeyKind::Operator => PREFIX_OPERATOR,
            KeyKind::Account => PREFIX_ACCOUNT,
            KeyKind::User => PREFIX_USER,
        }
    }

    /// Parse from a prefix byte.
    pub fn from_prefix_byte(b: u8) -> Option<Self> {
        match b {
            PREFIX_OPERATOR => Some(KeyKind::Operator),
            PREFIX_ACCOUNT => Some(KeyKind::Account),
            PREFIX_USER => Some(KeyKind::User),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            KeyKind::Operator => "operator",
            KeyKind::Account => "account",
            KeyKind::User => "user",
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A 64-byte Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}...)", &hex::encode(self.0)[..16])
    }
}

/// A role-tagged Ed25519 public key.
///
/// The text form (see [`PublicKey::encode`]) is the public id stored in
/// statuses and used as `iss`/`sub` in signed claims.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey {
    kind: KeyKind,
    bytes: [u8; 32],
}

impl PublicKey {
    pub const fn new(kind: KeyKind, bytes: [u8; 32]) -> Self {
        Self { kind, bytes }
    }

    pub const fn kind(&self) -> KeyKind {
        self.kind
    }

    /// Get the raw key bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Encode to the 56-character text form.
    pub fn encode(&self) -> String {
        let mut raw = Vec::with_capacity(35);
        raw.push(self.kind.prefix_byte());
        raw.extend_from_slice(&self.bytes);
        push_crc16(&mut raw);
        base32_encode(&raw)
    }

    /// Parse the text form, validating checksum and role prefix.
    pub fn decode(text: &str) -> Result<Self> {
        let raw = base32_decode(text.trim())
            .ok_or_else(|| CoreError::InvalidPublicKey("not base32".into()))?;
        let payload = strip_crc16(&raw)
            .ok_or_else(|| CoreError::InvalidPublicKey("checksum mismatch".into()))?;
        if payload.len() != 33 {
            return Err(CoreError::InvalidPublicKey(format!(
                "expected 33 payload bytes, got {}",
                payload.len()
            )));
        }
        let kind = KeyKind::from_prefix_byte(payload[0]).ok_or_else(|| {
            CoreError::InvalidPublicKey(format!("unknown prefix byte {}", payload[0]))
        })?;
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&payload[1..]);
        Ok(Self { kind, bytes })
    }

    /// Verify a signature over a message.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<()> {
        let verifying_key = VerifyingKey::from_bytes(&self.bytes)
            .map_err(|e| CoreError::InvalidPublicKey(e.to_string()))?;
        let sig = DalekSignature::from_bytes(&signature.0);
        verifying_key
            .verify(message, &sig)
            .map_err(|_| CoreError::InvalidSignature)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}...)", &self.encode()[..12])
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        PublicKey::decode(&text).map_err(serde::de::Error::custom)
    }
}

/// A role-tagged signing keypair.
///
/// Secret material is zeroized when the keypair is dropped.
#[derive(Clone)]
pub struct KeyPair {
    kind: KeyKind,
    signing_key: SigningKey,
}

impl KeyPair {
    /// Generate a new random keypair.
    pub fn generate(kind: KeyKind) -> Self {
        let mut rng = rand::thread_rng();
        let signing_key = SigningKey::generate(&mut rng);
        Self { kind, signing_key }
    }

    /// Create from a raw 32-byte seed.
    pub fn from_raw_seed(kind: KeyKind, seed: &[u8; 32]) -> Self {
        Self {
            kind,
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Restore a keypair from its encoded seed. The role is taken from the seed.
    pub fn from_seed(seed: &str) -> Result<Self> {
        let raw = Zeroizing::new(
            base32_decode(seed.trim()).ok_or_else(|| CoreError::InvalidSeed("not base32".into()))?,
        );
        let payload = strip_crc16(&raw)
            .ok_or_else(|| CoreError::InvalidSeed("checksum mismatch".into()))?;
        if payload.len() != 34 {
            return Err(CoreError::InvalidSeed(format!(
                "expected 34 payload bytes, got {}",
                payload.len()
            )));
        }
        if payload[0] & 0xf8 != PREFIX_SEED {
            return Err(CoreError::InvalidSeed("missing seed prefix".into()));
        }
        let role = ((payload[0] & 0x07) << 5) | ((payload[1] & 0xf8) >> 3);
        let kind = KeyKind::from_prefix_byte(role)
            .ok_or_else(|| CoreError::InvalidSeed(format!("unknown role byte {role}")))?;

        let mut raw_seed = Zeroizing::new([0u8; 32]);
        raw_seed.copy_from_slice(&payload[2..]);
        Ok(Self::from_raw_seed(kind, &raw_seed))
    }

    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    /// Get the public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey::new(self.kind, self.signing_key.verifying_key().to_bytes())
    }

    /// Encode the seed (secret key material) to its 58-character text form.
    pub fn seed(&self) -> Zeroizing<String> {
        let role = self.kind.prefix_byte();
        let mut raw = Zeroizing::new(Vec::with_capacity(36));
        raw.push(PREFIX_SEED | (role >> 5));
        raw.push((role & 0x1f) << 3);
        raw.extend_from_slice(self.signing_key.as_bytes());
        push_crc16(&mut raw);
        Zeroizing::new(base32_encode(&raw))
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing_key.sign(message).to_bytes())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair({:?})", self.public_key())
    }
}

/// Restore a keypair from an existing seed, or generate a fresh one.
///
/// A non-empty seed always reconstructs the same keypair; a seed that is
/// malformed or belongs to a different role fails with `InvalidSeed`.
pub fn obtain_key_pair(kind: KeyKind, existing_seed: Option<&str>) -> Result<KeyPair> {
    match existing_seed.map(str::trim).filter(|s| !s.is_empty()) {
        Some(seed) => {
            let keypair = KeyPair::from_seed(seed)?;
            if keypair.kind() != kind {
                return Err(CoreError::InvalidSeed(format!(
                    "expected {} seed, found {} seed",
                    kind,
                    keypair.kind()
                )));
            }
            Ok(keypair)
        }
        None => Ok(KeyPair::generate(kind)),
    }
}

// CRC16/XMODEM: polynomial 0x1021, initial value 0.
fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

fn push_crc16(raw: &mut Vec<u8>) {
    let crc = crc16(raw);
    raw.extend_from_slice(&crc.to_le_bytes());
}

fn strip_crc16(raw: &[u8]) -> Option<&[u8]> {
    if raw.len() < 3 {
        return None;
    }
    let (payload, tail) = raw.split_at(raw.len() - 2);
    let expected = u16::from_le_bytes([tail[0], tail[1]]);
    (crc16(payload) == expected).then_some(payload)
}

/// RFC 4648 base32 encoding (uppercase, no padding).
pub(crate) fn base32_encode(data: &[u8]) -> String {
    let mut result = String::with_capacity((data.len() * 8 + 4) / 5);
    let mut buffer: u64 = 0;
    let mut bits_in_buffer = 0;

    for &byte in data {
        buffer = (buffer << 8) | (byte as u64);
        bits_in_buffer += 8;

        while bits_in_buffer >= 5 {
            bits_in_buffer -= 5;
            let index = ((buffer >> bits_in_buffer) & 0x1f) as usize;
            result.push(BASE32_ALPHABET[index] as char);
        }
    }

    if bits_in_buffer > 0 {
        let index = ((buffer << (5 - bits_in_buffer)) & 0x1f) as usize;
        result.push(BASE32_ALPHABET[index] as char);
    }

    result
}

/// Inverse of [`base32_encode`]. Trailing bits that do not fill a byte are dropped.
fn base32_decode(text: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len() * 5 / 8);
    let mut buffer: u64 = 0;
    let mut bits_in_buffer = 0;

    for c in text.bytes() {
        let value = BASE32_ALPHABET.iter().position(|&a| a == c)? as u64;
        buffer = (buffer << 5) | value;
        bits_in_buffer += 5;

        if bits_in_buffer >= 8 {
            bits_in_buffer -= 8;
            out.push(((buffer >> bits_in_buffer) & 0xff) as u8);
        }
    }

    Some(out)
}
