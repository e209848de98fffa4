use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};

type HmacSha256 = Hmac<Sha256>;

pub fn hmac_sha256_hex(secret: &str, message: &[u8]) -> String {
    hex::encode(hmac_sha256(secret, message))
}

pub fn hmac_sha256_base64(secret: &str, message: &[u8]) -> String {
    BASE64.encode(hmac_sha256(secret, message))
}

fn hmac_sha256(secret: &str, message: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length, so new_from_slice cannot fail here.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return Vec::new(),
    };
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

/// Checks a hex HMAC-SHA256 signature. The provided value is trimmed and
/// decoded case-insensitively; the comparison is constant-time.
pub fn verify_hmac_sha256_hex(secret: &str, message: &[u8], provided: &str) -> bool {
    let Ok(provided) = hex::decode(provided.trim().to_ascii_lowercase()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(message);
    mac.verify_slice(&provided).is_ok()
}

/// Checks a base64 HMAC-SHA256 signature in constant time.
pub fn verify_hmac_sha256_base64(secret: &str, message: &[u8], provided: &str) -> bool {
    let Ok(provided) = BASE64.decode(provided.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(message);
    mac.verify_slice(&provided).is_ok()
}

pub fn sha512_hex(message: &str) -> String {
    hex::encode(Sha512::digest(message.as_bytes()))
}

/// Compares a provided hex digest against an expected one without
/// short-circuiting on the first differing byte.
pub fn digest_matches(expected_hex: &str, provided_hex: &str) -> bool {
    let (Ok(expected), Ok(provided)) = (
        hex::decode(expected_hex.trim().to_ascii_lowercase()),
        hex::decode(provided_hex.trim().to_ascii_lowercase()),
    ) else {
        return false;
    };
    if expected.len() != provided.len() {
        return false;
    }
    expected
        .iter()
        .zip(provided.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Short, non-sensitive prefix for logs.
pub fn redact(sig: &str) -> String {
    sig.chars().take(8).collect()
}
