//! Local key-generation client.
//!
//! Owns the encrypted cache, the maintenance task, and the key-derivation
//! path on top of them. Construction is cheap; `initialize_async` unlocks or
//! creates the store and starts maintenance, returning before the cache is
//! ready - readiness is observed by polling [`LocalClient::check_cache_status`].

use std::sync::Arc;

use zeroize::Zeroizing;

use keywell_cache::CacheStore;
use keywell_core::{
    AsymmetricKeyMode, AsymmetricKeyPair, AsymmetricProvider, AuthToken, CacheConfig, CacheStatus,
    DeviceSecret, KeyGenError, RandomSource, SymmetricKey, SymmetricKeyMode,
};

use crate::{
    derivation::{asymmetric_seed_len, symmetric_key_from_seed, symmetric_seed_len},
    maintenance::MaintenanceHandle,
    state::CacheShared,
};

/// State that exists only after a successful `initialize_async`.
struct Session {
    shared: Arc<CacheShared>,
    maintenance: Option<MaintenanceHandle>,
}

impl Drop for Session {
    fn drop(&mut self) {
        // Backstop for clients dropped without an explicit shutdown: signal
        // and abort rather than leak the task.
        if let Some(handle) = self.maintenance.take() {
            handle.abort();
        }
    }
}

/// Client generating key material from the local random pool.
///
/// Generic over its two external collaborators: the random-source service
/// that replenishes the pool and the asymmetric-primitive provider that
/// turns seeds into key pairs. All key-generation calls are synchronous and
/// may run on any thread; the one background task is owned here and joined
/// on [`shutdown`](Self::shutdown) or [`wipe`](Self::wipe).
pub struct LocalClient<R: RandomSource, P: AsymmetricProvider> {
    random_source: Arc<R>,
    provider: P,
    session: Option<Session>,
}

impl<R: RandomSource, P: AsymmetricProvider> LocalClient<R, P> {
    /// Create an uninitialized client over the given collaborators.
    pub fn new(random_source: R, provider: P) -> Self {
        Self { random_source: Arc::new(random_source), provider, session: None }
    }

    /// Unlock or create the cache and start background maintenance.
    ///
    /// Returns as soon as the store is unlocked and the scheduler is running;
    /// it does not wait for the cache to reach `Ready`. There is no blocking
    /// wait primitive - poll [`check_cache_status`](Self::check_cache_status).
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for a malformed config or a double initialize.
    /// - `Authentication` if the device secret does not unlock existing data.
    /// - `Storage` on I/O failure or ledger corruption (fatal to this
    ///   instance; there is no partial-recovery mode).
    pub async fn initialize_async(
        &mut self,
        token: AuthToken,
        config: CacheConfig,
    ) -> Result<(), KeyGenError> {
        if self.session.is_some() {
            return Err(KeyGenError::invalid_argument("client is already initialized"));
        }
        config.validate()?;

        let store = CacheStore::open(
            &config.locations,
            &config.device_secret,
            config.max_num_cached_bytes,
        )?;
        let shared = Arc::new(CacheShared::new(store, config.min_num_cached_bytes));

        let maintenance = MaintenanceHandle::spawn(
            Arc::clone(&self.random_source),
            token,
            Arc::clone(&shared),
            config.maintenance_interval,
        );

        self.session = Some(Session { shared, maintenance: Some(maintenance) });
        tracing::info!("local client initialized");
        Ok(())
    }

    /// Generate a symmetric key from the pool.
    ///
    /// Arguments are validated before anything is consumed, so an invalid
    /// request never wastes random. `key_size` is the OTP key length in
    /// bytes and is ignored for [`SymmetricKeyMode::Aes256`].
    pub fn gen_symmetric_key(
        &self,
        mode: SymmetricKeyMode,
        key_size: u64,
    ) -> Result<SymmetricKey, KeyGenError> {
        let seed_len = symmetric_seed_len(mode, key_size)?;
        let seed = self.consume(seed_len)?;
        Ok(symmetric_key_from_seed(mode, &seed))
    }

    /// Generate an asymmetric key pair seeded from the pool.
    pub fn gen_asymmetric_keys(
        &self,
        mode: AsymmetricKeyMode,
    ) -> Result<AsymmetricKeyPair, KeyGenError> {
        let seed = self.consume(asymmetric_seed_len(mode))?;
        self.provider.derive_key_pair(mode, &seed)
    }

    /// Re-encrypt the cache under a new device secret.
    ///
    /// Holds the exclusive store lock for the full re-encryption pass,
    /// blocking concurrent consumption and replenishment - rotation is rare
    /// and must be atomic. On return the old secret no longer unlocks any
    /// location, or (on error) still unlocks all of them.
    pub fn update_device_secret(
        &self,
        old_secret: &DeviceSecret,
        new_secret: &DeviceSecret,
    ) -> Result<(), KeyGenError> {
        let shared = self.shared()?;
        let mut store = shared.lock_store();
        store.rotate(old_secret, new_secret)?;
        Ok(())
    }

    /// Securely delete all pool material from every location; idempotent.
    ///
    /// Stops and joins the maintenance task first, so the pool does not
    /// refill behind the caller's back; a download in flight when the wipe
    /// lands is discarded rather than appended afterwards. Replenishment
    /// does not resume on this instance.
    pub async fn wipe(&mut self) -> Result<(), KeyGenError> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| KeyGenError::invalid_argument("client is not initialized"))?;
        if let Some(handle) = session.maintenance.take() {
            handle.stop().await;
        }

        session.shared.bump_wipe_generation();
        let mut store = session.shared.lock_store();
        store.wipe()?;
        session.shared.refresh(&store);
        Ok(())
    }

    /// Snapshot of cache state, pool level, and maintenance health.
    pub fn check_cache_status(&self) -> Result<CacheStatus, KeyGenError> {
        Ok(self.shared()?.status())
    }

    /// Stop the maintenance task and join it, bounded by a shutdown timeout.
    ///
    /// The cache itself stays on disk; wiping is explicit.
    pub async fn shutdown(&mut self) {
        if let Some(session) = self.session.as_mut()
            && let Some(handle) = session.maintenance.take()
        {
            handle.stop().await;
        }
    }

    fn shared(&self) -> Result<&Arc<CacheShared>, KeyGenError> {
        self.session
            .as_ref()
            .map(|s| &s.shared)
            .ok_or_else(|| KeyGenError::invalid_argument("client is not initialized"))
    }

    /// Consume `n` pool bytes under the exclusive lock.
    fn consume(&self, n: u64) -> Result<Zeroizing<Vec<u8>>, KeyGenError> {
        let shared = self.shared()?;
        let mut store = shared.lock_store();
        let seed = store.consume(n)?;
        shared.refresh(&store);
        Ok(seed)
    }
}
