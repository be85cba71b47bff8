//! Sensitive byte buffers.
//!
//! Device secrets, derived keys, and auth tokens are wrapped so that their
//! storage is zeroed on release and their contents never leak through `Debug`
//! output or log lines. Key equality, where it exists, is constant-time.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Caller-supplied credential that locks the local cache.
///
/// Zeroed on drop. Deliberately has no `PartialEq`: secrets are verified by
/// unlocking the store, never by direct comparison.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DeviceSecret(Vec<u8>);

impl DeviceSecret {
    /// Wrap a secret byte buffer.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Borrow the raw secret bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for DeviceSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DeviceSecret([REDACTED; {} bytes])", self.0.len())
    }
}

impl From<&[u8]> for DeviceSecret {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

/// A symmetric key produced by the SDK.
///
/// For OTP mode this is raw pool material and must never be reused; the
/// exactly-once guarantee of the cache is what makes it a one-time pad.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey(Vec<u8>);

impl SymmetricKey {
    /// Wrap derived key bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Borrow the raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Key length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for a zero-length key (never produced by a successful call).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SymmetricKey([REDACTED; {} bytes])", self.0.len())
    }
}

/// Constant-time comparison: scans both buffers in full regardless of where
/// they first differ.
impl PartialEq for SymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        if self.0.len() != other.0.len() {
            return false;
        }
        let mut diff = 0u8;
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            diff |= a ^ b;
        }
        diff == 0
    }
}

impl Eq for SymmetricKey {}

/// Symmetric key plus the opaque metadata a peer needs to derive the same key.
///
/// The metadata is meaningful only to a peer running the sync half of the
/// distributed agreement; it is single-use and safe to transmit in the clear.
#[derive(Debug, Clone)]
pub struct SymmetricKeyData {
    /// The derived symmetric key.
    pub key: SymmetricKey,
    /// Opaque single-use token for the peer's `gen_sync`.
    pub metadata: Vec<u8>,
}

/// An asymmetric key pair seeded from pool random.
///
/// Buffer lengths are determined by the chosen algorithm; the pair itself is
/// constructed by the external asymmetric-primitive provider.
#[derive(Debug, Clone)]
pub struct AsymmetricKeyPair {
    /// Private key, zeroed on drop.
    pub private_key: SymmetricKey,
    /// Public key; not secret.
    pub public_key: Vec<u8>,
}

/// Bearer token for the external keywell services.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AuthToken(String);

impl AuthToken {
    /// Wrap a service token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Borrow the token string for transport headers.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthToken([REDACTED])")
    }
}
