//! Deterministic asymmetric-provider fake.

use hkdf::Hkdf;
use sha2::Sha256;

use keywell_core::{
    AsymmetricKeyMode, AsymmetricKeyPair, AsymmetricProvider, KeyGenError, SymmetricKey,
};

/// Expected seed length per mode (mirrors the client's consumption).
fn seed_len(mode: AsymmetricKeyMode) -> usize {
    match mode {
        AsymmetricKeyMode::Ecdh => 32,
        AsymmetricKeyMode::Frodo => 48,
        AsymmetricKeyMode::Kyber => 64,
    }
}

/// Output lengths (private, public) per mode. Arbitrary but distinct; the
/// real primitives live outside the SDK.
fn output_lens(mode: AsymmetricKeyMode) -> (usize, usize) {
    match mode {
        AsymmetricKeyMode::Ecdh => (32, 65),
        AsymmetricKeyMode::Frodo => (48, 96),
        AsymmetricKeyMode::Kyber => (64, 128),
    }
}

/// Stand-in for the external asymmetric-primitive library.
///
/// Expands the seed through labeled HKDF so that the contract the clients
/// rely on holds: same seed, same pair; different seeds, different pairs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimAsymmetricProvider;

impl AsymmetricProvider for SimAsymmetricProvider {
    fn derive_key_pair(
        &self,
        mode: AsymmetricKeyMode,
        seed: &[u8],
    ) -> Result<AsymmetricKeyPair, KeyGenError> {
        if seed.len() != seed_len(mode) {
            return Err(KeyGenError::invalid_argument(format!(
                "{mode:?} needs a {}-byte seed, got {}",
                seed_len(mode),
                seed.len()
            )));
        }

        let (private_len, public_len) = output_lens(mode);
        let hkdf = Hkdf::<Sha256>::new(None, seed);

        let mut private_key = vec![0u8; private_len];
        let Ok(()) = hkdf.expand(b"sim private key", &mut private_key) else {
            unreachable!("requested length is within HKDF-SHA256 bounds");
        };
        let mut public_key = vec![0u8; public_len];
        let Ok(()) = hkdf.expand(b"sim public key", &mut public_key) else {
            unreachable!("requested length is within HKDF-SHA256 bounds");
        };

        Ok(AsymmetricKeyPair { private_key: SymmetricKey::new(private_key), public_key })
    }
}
