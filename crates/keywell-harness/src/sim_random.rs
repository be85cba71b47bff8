//! Deterministic random-source fake.

use std::sync::Mutex;

use async_trait::async_trait;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

use keywell_core::{AuthToken, KeyGenError, RandomSource};

struct Inner {
    rng: ChaCha20Rng,
    /// Calls left to fail before serving again.
    fail_remaining: u32,
    /// Cap on bytes returned per fetch, if set.
    max_chunk: Option<u64>,
    fetch_count: u64,
}

/// Seeded random source with scriptable failures.
///
/// Bytes come from a seeded ChaCha20 stream, so the exact pool content of a
/// test run is reproducible. Failure injection is scripted: arm a failure
/// window, watch the client degrade and recover.
pub struct SimRandomSource {
    inner: Mutex<Inner>,
}

impl SimRandomSource {
    /// Create a source producing the byte stream for `seed`.
    pub fn seeded(seed: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                rng: ChaCha20Rng::seed_from_u64(seed),
                fail_remaining: 0,
                max_chunk: None,
                fetch_count: 0,
            }),
        }
    }

    /// Make the next `calls` fetches fail with `ServiceUnavailable`.
    pub fn fail_next(&self, calls: u32) {
        self.lock().fail_remaining = calls;
    }

    /// Cap the bytes returned per fetch (the service may under-deliver).
    pub fn limit_chunk(&self, max: u64) {
        self.lock().max_chunk = Some(max);
    }

    /// Number of fetches attempted against this source.
    pub fn fetch_count(&self) -> u64 {
        self.lock().fetch_count
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl RandomSource for SimRandomSource {
    async fn fetch_random(
        &self,
        _token: &AuthToken,
        num_bytes: u64,
    ) -> Result<Vec<u8>, KeyGenError> {
        let mut inner = self.lock();
        inner.fetch_count += 1;

        if inner.fail_remaining > 0 {
            inner.fail_remaining -= 1;
            return Err(KeyGenError::ServiceUnavailable {
                detail: "simulated outage".into(),
            });
        }

        let len = inner.max_chunk.map_or(num_bytes, |max| num_bytes.min(max));
        let mut bytes = vec![0u8; len as usize];
        inner.rng.fill_bytes(&mut bytes);
        Ok(bytes)
    }
}
