//! Deterministic agreement-service fake with single redemption.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

use keywell_core::{AgreementInit, AgreementService, AuthToken, KeyGenError};

struct Inner {
    rng: ChaCha20Rng,
    /// Escrowed seeds keyed by token id; removed on redemption.
    pending: HashMap<u64, Vec<u8>>,
    next_id: u64,
}

/// In-memory agreement service.
///
/// Seeds are escrowed under an 8-byte token id and handed out exactly once;
/// a second redemption of the same token fails with `Protocol`, which is the
/// replay behavior the real service must enforce.
pub struct SimAgreementService {
    inner: Mutex<Inner>,
}

impl SimAgreementService {
    /// Create a service producing the seed stream for `seed`.
    pub fn seeded(seed: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                rng: ChaCha20Rng::seed_from_u64(seed),
                pending: HashMap::new(),
                next_id: 0,
            }),
        }
    }

    /// Seeds escrowed and not yet redeemed.
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Drop an escrowed seed, simulating token expiry on the service side.
    pub fn expire(&self, metadata: &[u8]) {
        if let Ok(raw) = <[u8; 8]>::try_from(metadata) {
            self.lock().pending.remove(&u64::from_be_bytes(raw));
        }
    }

    /// Drop every escrowed seed. Callers that only hold the client-side
    /// metadata envelope (not the raw service token) expire through this.
    pub fn expire_all(&self) {
        self.lock().pending.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl AgreementService for SimAgreementService {
    async fn init_agreement(
        &self,
        _token: &AuthToken,
        seed_len: u64,
    ) -> Result<AgreementInit, KeyGenError> {
        let mut inner = self.lock();

        let mut seed = vec![0u8; seed_len as usize];
        inner.rng.fill_bytes(&mut seed);

        let id = inner.next_id;
        inner.next_id += 1;
        inner.pending.insert(id, seed.clone());

        Ok(AgreementInit { seed, metadata: id.to_be_bytes().to_vec() })
    }

    async fn sync_agreement(
        &self,
        _token: &AuthToken,
        metadata: &[u8],
    ) -> Result<Vec<u8>, KeyGenError> {
        let raw: [u8; 8] = metadata.try_into().map_err(|_| KeyGenError::Protocol {
            detail: format!("malformed service token ({} bytes)", metadata.len()),
        })?;

        self.lock().pending.remove(&u64::from_be_bytes(raw)).ok_or_else(|| {
            KeyGenError::Protocol { detail: "token unknown, expired, or already redeemed".into() }
        })
    }
}
