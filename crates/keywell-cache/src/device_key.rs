//! Device-secret to cache-key derivation.
//!
//! The device secret never touches disk. A per-installation random salt
//! (stored in the location manifest) feeds HKDF-SHA256 together with the
//! secret, so two installations sharing a device secret still hold ledgers
//! under distinct keys.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use keywell_core::DeviceSecret;

/// Length of the per-installation salt.
pub const SALT_LEN: usize = 16;

/// Label for cache-key derivation (domain separation).
const CACHE_KEY_LABEL: &[u8] = b"keywell cache key v1";

/// Symmetric key that seals the ledger. Zeroed on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    /// Borrow the raw key bytes for the AEAD.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CacheKey([REDACTED; 32 bytes])")
    }
}

/// Derive the ledger encryption key from a device secret and installation salt.
///
/// Deterministic: the same (secret, salt) pair always yields the same key,
/// which is what lets a restarted client unlock its existing ledger.
pub fn derive_cache_key(secret: &DeviceSecret, salt: &[u8; SALT_LEN]) -> CacheKey {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), secret.as_bytes());

    let mut key = [0u8; 32];
    let Ok(()) = hkdf.expand(CACHE_KEY_LABEL, &mut key) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };

    CacheKey(key)
}
