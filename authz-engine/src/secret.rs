//! Client secret encoding.
//!
//! Stored secrets carry an `{id}` prefix naming the encoding:
//! - `{noop}<secret>` keeps the secret verbatim (development clients only)
//! - `{sha256}<salt>$<digest>` is a salted SHA-256 digest, both parts base64url

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const NOOP_PREFIX: &str = "{noop}";
const SHA256_PREFIX: &str = "{sha256}";
const SALT_LEN: usize = 16;

/// Returns `secret` unchanged if it is already encoded, otherwise its
/// salted SHA-256 encoding
pub fn encode_secret(secret: &str) -> String {
    if is_encoded(secret) {
        return secret.to_string();
    }

    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let digest = digest(&salt, secret);
    format!(
        "{SHA256_PREFIX}{}${}",
        URL_SAFE_NO_PAD.encode(salt),
        URL_SAFE_NO_PAD.encode(digest)
    )
}

/// Checks a presented secret against an encoded one.
///
/// Unknown encodings and malformed values never match.
pub fn verify_secret(presented: &str, encoded: &str) -> bool {
    if let Some(plain) = encoded.strip_prefix(NOOP_PREFIX) {
        return presented.as_bytes().ct_eq(plain.as_bytes()).into();
    }

    let Some(rest) = encoded.strip_prefix(SHA256_PREFIX) else {
        return false;
    };
    let Some((salt, expected)) = rest.split_once('$') else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (URL_SAFE_NO_PAD.decode(salt), URL_SAFE_NO_PAD.decode(expected))
    else {
        return false;
    };

    digest(&salt, presented).ct_eq(&expected).into()
}

fn is_encoded(secret: &str) -> bool {
    secret.starts_with('{') && secret.contains('}')
}

fn digest(salt: &[u8], secret: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(secret.as_bytes());
    hasher.finalize().to_vec()
}
