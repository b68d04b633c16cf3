//! Opaque credential generation

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;

/// Number of random bytes behind every generated credential (256 bits)
pub const TOKEN_BYTES: usize = 32;

/// Source of opaque credential values.
///
/// Implementations must be safe to call from many tasks at once. Values only
/// need to be unique with overwhelming probability: the record store enforces
/// uniqueness and the issuer retries on the rare collision.
pub trait TokenGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Generates base64url encoded values from the thread-local CSPRNG
#[derive(Debug, Clone, Copy, Default)]
pub struct SecureTokenGenerator;

impl TokenGenerator for SecureTokenGenerator {
    fn generate(&self) -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}
