//! Key derivation from pool seed material.
//!
//! Maps key modes to the amount of true random they consume and turns
//! consumed seeds into output keys. Validation happens here, before any
//! consumption: an invalid request must never waste pool material.

use hkdf::Hkdf;
use sha2::Sha256;

use keywell_core::{AsymmetricKeyMode, KeyGenError, SymmetricKey, SymmetricKeyMode};

/// Seed bytes consumed for an AES-256 key.
pub const AES_256_SEED_LEN: u64 = 32;

/// Output length of an AES-256 key.
const AES_256_KEY_LEN: usize = 32;

/// Label for AES-256 key expansion (domain separation).
const AES_256_KEY_LABEL: &[u8] = b"keywell aes-256 key v1";

/// Seed bytes consumed for an ECDH key pair (curve order size).
pub const ECDH_SEED_LEN: u64 = 32;

/// Seed bytes consumed for a FrodoKEM key pair.
pub const FRODO_SEED_LEN: u64 = 48;

/// Seed bytes consumed for a Kyber key pair.
pub const KYBER_SEED_LEN: u64 = 64;

/// Seed bytes a symmetric key request will consume.
///
/// # Errors
///
/// `InvalidArgument` for an OTP request with `key_size == 0`. For AES-256 the
/// `key_size` argument is ignored.
pub fn symmetric_seed_len(mode: SymmetricKeyMode, key_size: u64) -> Result<u64, KeyGenError> {
    match mode {
        SymmetricKeyMode::Aes256 => Ok(AES_256_SEED_LEN),
        SymmetricKeyMode::Otp if key_size == 0 => {
            Err(KeyGenError::invalid_argument("OTP key_size must be positive"))
        },
        SymmetricKeyMode::Otp => Ok(key_size),
    }
}

/// Derive the output key from consumed seed material.
///
/// AES-256 expands the 32-byte seed through labeled HKDF-SHA256. OTP returns
/// the seed unchanged: the pool's exactly-once guarantee is what makes it a
/// one-time pad. Deterministic, so both halves of the distributed agreement
/// derive identical keys from identical seeds.
pub fn symmetric_key_from_seed(mode: SymmetricKeyMode, seed: &[u8]) -> SymmetricKey {
    match mode {
        SymmetricKeyMode::Aes256 => {
            let hkdf = Hkdf::<Sha256>::new(None, seed);
            let mut key = vec![0u8; AES_256_KEY_LEN];
            let Ok(()) = hkdf.expand(AES_256_KEY_LABEL, &mut key) else {
                unreachable!("32 bytes is a valid HKDF-SHA256 output length");
            };
            SymmetricKey::new(key)
        },
        SymmetricKeyMode::Otp => SymmetricKey::new(seed.to_vec()),
    }
}

/// Seed bytes an asymmetric key-pair request will consume.
pub fn asymmetric_seed_len(mode: AsymmetricKeyMode) -> u64 {
    match mode {
        AsymmetricKeyMode::Ecdh => ECDH_SEED_LEN,
        AsymmetricKeyMode::Frodo => FRODO_SEED_LEN,
        AsymmetricKeyMode::Kyber => KYBER_SEED_LEN,
    }
}
