//! Contracts for the external collaborators the SDK consumes.
//!
//! The core never talks to the network itself. Transports implementing these
//! traits are constructed by the host application against a
//! [`crate::deployment::ServiceEndpoints`] value; tests use the deterministic
//! implementations from `keywell-harness`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    config::AsymmetricKeyMode,
    error::KeyGenError,
    secret::{AsymmetricKeyPair, AuthToken},
};

/// Remote source of true-random bytes used to replenish the local pool.
#[async_trait]
pub trait RandomSource: Send + Sync + 'static {
    /// Fetch `num_bytes` of fresh random.
    ///
    /// The service may return fewer bytes than requested; the maintenance
    /// loop appends whatever arrives and asks again on the next tick.
    ///
    /// # Errors
    ///
    /// `ServiceUnavailable` on transient failure. Never retried inside the
    /// call - retrying across ticks is the scheduler's job.
    async fn fetch_random(&self, token: &AuthToken, num_bytes: u64) -> Result<Vec<u8>, KeyGenError>;
}

/// Seed material and peer metadata returned by [`AgreementService::init_agreement`].
#[derive(Debug, Clone)]
pub struct AgreementInit {
    /// Fresh seed bytes for the initiator's key derivation.
    pub seed: Vec<u8>,
    /// Opaque single-use token redeemable once by the peer for the same seed.
    pub metadata: Vec<u8>,
}

/// Two-party agreement service.
///
/// The service holds the seed escrow and must enforce single redemption of
/// each metadata token; the client surfaces its refusal as `Protocol`.
#[async_trait]
pub trait AgreementService: Send + Sync + 'static {
    /// Obtain `seed_len` bytes of fresh seed material plus a metadata token
    /// that lets exactly one peer reconstruct the same seed.
    async fn init_agreement(
        &self,
        token: &AuthToken,
        seed_len: u64,
    ) -> Result<AgreementInit, KeyGenError>;

    /// Redeem a metadata token for the initiator's seed material.
    ///
    /// # Errors
    ///
    /// `Protocol` if the token is unknown, expired, or already redeemed;
    /// `ServiceUnavailable` on transient transport failure.
    async fn sync_agreement(
        &self,
        token: &AuthToken,
        metadata: &[u8],
    ) -> Result<Vec<u8>, KeyGenError>;
}

/// Shared handles implement the contract of what they wrap, so a test can
/// keep a handle to a fake while the client owns another.
#[async_trait]
impl<R: RandomSource + ?Sized> RandomSource for Arc<R> {
    async fn fetch_random(&self, token: &AuthToken, num_bytes: u64) -> Result<Vec<u8>, KeyGenError> {
        (**self).fetch_random(token, num_bytes).await
    }
}

#[async_trait]
impl<A: AgreementService + ?Sized> AgreementService for Arc<A> {
    async fn init_agreement(
        &self,
        token: &AuthToken,
        seed_len: u64,
    ) -> Result<AgreementInit, KeyGenError> {
        (**self).init_agreement(token, seed_len).await
    }

    async fn sync_agreement(
        &self,
        token: &AuthToken,
        metadata: &[u8],
    ) -> Result<Vec<u8>, KeyGenError> {
        (**self).sync_agreement(token, metadata).await
    }
}

/// External asymmetric-primitive library.
///
/// The SDK supplies seed bytes of the length appropriate for `mode`; the
/// provider runs the actual ECDH / FrodoKEM / Kyber key-pair construction.
/// Must be deterministic: the same seed yields the same pair.
pub trait AsymmetricProvider: Send + Sync + 'static {
    /// Construct a key pair deterministically from `seed`.
    fn derive_key_pair(
        &self,
        mode: AsymmetricKeyMode,
        seed: &[u8],
    ) -> Result<AsymmetricKeyPair, KeyGenError>;
}
