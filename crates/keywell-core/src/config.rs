//! Cache configuration and status types.

use std::{collections::HashSet, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{error::KeyGenError, secret::DeviceSecret};

/// A storage location holding part of the random pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationConfig {
    /// Unique identifier for the location within one [`CacheConfig`].
    pub id: String,
    /// Directory where this location's ledger lives.
    pub path: PathBuf,
    /// Maximum bytes of pool material this location may hold.
    pub available_size: u64,
}

/// Configuration for the local random cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Secret unlocking the on-disk ledger.
    pub device_secret: DeviceSecret,
    /// Ordered set of storage locations.
    pub locations: Vec<LocationConfig>,
    /// Upper bound on unconsumed cached bytes.
    pub max_num_cached_bytes: u64,
    /// Pool size at which the cache first reports ready.
    pub min_num_cached_bytes: u64,
    /// Time between maintenance download attempts.
    pub maintenance_interval: Duration,
}

impl CacheConfig {
    /// Validate the configuration before any state is touched.
    ///
    /// Hard failures (`InvalidArgument`): no locations, duplicate location
    /// ids, `min_num_cached_bytes > max_num_cached_bytes`, or a zero
    /// maintenance interval. A combined location capacity below
    /// `max_num_cached_bytes` is a configuration smell, not a failure: the
    /// cache will simply plateau early, so it is only logged.
    pub fn validate(&self) -> Result<(), KeyGenError> {
        if self.locations.is_empty() {
            return Err(KeyGenError::invalid_argument("at least one storage location is required"));
        }

        let mut seen = HashSet::new();
        for location in &self.locations {
            if !seen.insert(location.id.as_str()) {
                return Err(KeyGenError::invalid_argument(format!(
                    "duplicate location id {:?}",
                    location.id
                )));
            }
        }

        if self.min_num_cached_bytes > self.max_num_cached_bytes {
            return Err(KeyGenError::invalid_argument(format!(
                "min_num_cached_bytes ({}) exceeds max_num_cached_bytes ({})",
                self.min_num_cached_bytes, self.max_num_cached_bytes
            )));
        }

        if self.maintenance_interval.is_zero() {
            return Err(KeyGenError::invalid_argument("maintenance_interval must be non-zero"));
        }

        let total_capacity: u64 = self.locations.iter().map(|l| l.available_size).sum();
        if total_capacity < self.max_num_cached_bytes {
            tracing::warn!(
                total_capacity,
                max_num_cached_bytes = self.max_num_cached_bytes,
                "combined location capacity is below max_num_cached_bytes; the pool will not fill"
            );
        }

        Ok(())
    }
}

/// Symmetric key algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymmetricKeyMode {
    /// 256-bit AES key expanded from a fixed 32-byte pool seed.
    Aes256,
    /// One-time pad: raw pool bytes of caller-chosen length.
    Otp,
}

/// Asymmetric key algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AsymmetricKeyMode {
    /// Elliptic-curve Diffie-Hellman.
    Ecdh,
    /// FrodoKEM.
    Frodo,
    /// Kyber.
    Kyber,
}

/// Cache lifecycle state.
///
/// One-way: once the pool has accumulated `min_num_cached_bytes` the cache is
/// `Ready` and stays so, even if later drained (a drained ready cache reports
/// `InsufficientRandom` on consumption instead of regressing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheState {
    /// Accumulating the initial random pool.
    Downloading,
    /// Initial pool reached the configured minimum.
    Ready,
}

/// Health of the background replenishment task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaintenanceHealth {
    /// Replenishment is proceeding (or idle at capacity).
    Nominal,
    /// Downloads have failed for several consecutive attempts.
    ///
    /// Sticky until a download succeeds. Background failures are never
    /// thrown; this is how they reach the caller.
    Stalled {
        /// Failed attempts since the last successful download.
        consecutive_failures: u32,
    },
}

/// Point-in-time snapshot of the cache, returned by `check_cache_status`.
///
/// Reads are lock-free; a snapshot may trail an in-flight maintenance tick by
/// one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatus {
    /// Lifecycle state (one-way `Downloading` → `Ready`).
    pub state: CacheState,
    /// Unconsumed bytes currently available.
    pub remaining_capacity: u64,
    /// Total random ever downloaded to disk; reset only by `wipe`.
    pub total_downloaded_random: u64,
    /// Background replenishment health.
    pub maintenance: MaintenanceHealth,
}
