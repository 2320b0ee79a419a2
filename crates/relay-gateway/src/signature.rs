//! LINE webhook signature: base64(HMAC-SHA256(channel_secret, body)).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// The channel secret could not be used as an HMAC key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid channel secret")]
pub struct InvalidSecret;

/// Compute the signature header value for `body`.
pub fn sign(secret: &str, body: &[u8]) -> Result<String, InvalidSecret> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| InvalidSecret)?;
    mac.update(body);
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Check a signature header against `body` in constant time.
///
/// A missing, empty or non-base64 header never verifies.
pub fn verify(secret: &str, body: &[u8], header: &str) -> bool {
    let header = header.trim();
    if header.is_empty() {
        return false;
    }
    let Ok(expected) = BASE64.decode(header) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}
