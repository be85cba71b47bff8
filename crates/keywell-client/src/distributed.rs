//! Distributed key-agreement client.
//!
//! Lets two independent peers derive an identical symmetric key without
//! transmitting it: the initiator's `gen_init` obtains fresh seed material
//! from the agreement service and hands its peer an opaque metadata token;
//! the peer's `gen_sync` redeems the token for the same seed and derives the
//! same key. Entirely independent of the local cache.
//!
//! Metadata tokens are single-use: the service refuses a second redemption,
//! since a replay would hand the shared key to anyone who observed the
//! token. This client surfaces that refusal as `Protocol` and never quietly
//! re-derives.

use serde::{Deserialize, Serialize};

use keywell_core::{
    AgreementService, AuthToken, KeyGenError, SymmetricKey, SymmetricKeyData, SymmetricKeyMode,
};

use crate::derivation::{symmetric_key_from_seed, symmetric_seed_len};

/// Version tag of the metadata envelope.
const METADATA_VERSION: u8 = 1;

/// What travels to the peer: derivation parameters plus the service's own
/// single-use token. CBOR-encoded; opaque to everyone but `gen_sync`.
#[derive(Debug, Serialize, Deserialize)]
struct MetadataEnvelope {
    version: u8,
    mode: SymmetricKeyMode,
    key_size: u64,
    token: Vec<u8>,
}

/// Client for the two-party key agreement.
pub struct DistributedClient<A: AgreementService> {
    service: A,
    token: Option<AuthToken>,
}

impl<A: AgreementService> DistributedClient<A> {
    /// Create an uninitialized client over the agreement service.
    pub fn new(service: A) -> Self {
        Self { service, token: None }
    }

    /// Store the service credential. No network traffic happens here.
    pub fn initialize(&mut self, token: AuthToken) -> Result<(), KeyGenError> {
        if token.as_str().is_empty() {
            return Err(KeyGenError::invalid_argument("auth token must not be empty"));
        }
        self.token = Some(token);
        Ok(())
    }

    /// Initiator half: derive a symmetric key and the metadata a peer needs
    /// to derive the same one.
    ///
    /// `key_size` is the OTP key length in bytes, ignored for
    /// [`SymmetricKeyMode::Aes256`]. Validation precedes the service call.
    pub async fn gen_init(
        &self,
        mode: SymmetricKeyMode,
        key_size: u64,
    ) -> Result<SymmetricKeyData, KeyGenError> {
        let seed_len = symmetric_seed_len(mode, key_size)?;
        let token = self.token()?;

        let init = self.service.init_agreement(token, seed_len).await?;
        if init.seed.len() as u64 != seed_len {
            return Err(KeyGenError::Protocol {
                detail: format!(
                    "agreement service returned {} seed bytes, expected {seed_len}",
                    init.seed.len()
                ),
            });
        }

        let envelope =
            MetadataEnvelope { version: METADATA_VERSION, mode, key_size, token: init.metadata };
        let mut metadata = Vec::new();
        ciborium::into_writer(&envelope, &mut metadata)
            .map_err(|e| KeyGenError::Protocol { detail: format!("metadata encode: {e}") })?;

        Ok(SymmetricKeyData { key: symmetric_key_from_seed(mode, &init.seed), metadata })
    }

    /// Peer half: redeem metadata for the initiator's seed and derive the
    /// identical key.
    ///
    /// # Errors
    ///
    /// `Protocol` if the metadata is malformed, from an unsupported version,
    /// expired, or already redeemed (replay).
    pub async fn gen_sync(&self, metadata: &[u8]) -> Result<SymmetricKey, KeyGenError> {
        let token = self.token()?;

        let envelope: MetadataEnvelope = ciborium::from_reader(metadata)
            .map_err(|e| KeyGenError::Protocol { detail: format!("malformed metadata: {e}") })?;
        if envelope.version != METADATA_VERSION {
            return Err(KeyGenError::Protocol {
                detail: format!("unsupported metadata version {}", envelope.version),
            });
        }
        let seed_len = symmetric_seed_len(envelope.mode, envelope.key_size)
            .map_err(|_| KeyGenError::Protocol { detail: "metadata has invalid key size".into() })?;

        let seed = self.service.sync_agreement(token, &envelope.token).await?;
        if seed.len() as u64 != seed_len {
            return Err(KeyGenError::Protocol {
                detail: format!(
                    "agreement service returned {} seed bytes, expected {seed_len}",
                    seed.len()
                ),
            });
        }

        Ok(symmetric_key_from_seed(envelope.mode, &seed))
    }

    fn token(&self) -> Result<&AuthToken, KeyGenError> {
        self.token
            .as_ref()
            .ok_or_else(|| KeyGenError::invalid_argument("client is not initialized"))
    }
}
