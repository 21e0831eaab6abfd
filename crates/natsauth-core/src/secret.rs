//! Random secrets for flat-mode users.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use zeroize::Zeroizing;

/// Default number of random bytes behind a generated password.
pub const DEFAULT_PASSWORD_BYTES: usize = 24;

/// Generate a URL-safe password from `byte_len` random bytes.
pub fn generate_password(byte_len: usize) -> Zeroizing<String> {
    let mut bytes = Zeroizing::new(vec![0u8; byte_len]);
    rand::thread_rng().fill_bytes(&mut bytes);
    Zeroizing::new(URL_SAFE_NO_PAD.encode(bytes.as_slice()))
}
