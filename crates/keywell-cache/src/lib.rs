//! Keywell encrypted random ledger.
//!
//! On-disk pool of true-random bytes with the security-critical exactly-once
//! consumption guarantee: any byte returned by [`CacheStore::consume`] is
//! deleted before the call returns and can never be produced again, across
//! restarts and crashes. Blocks are sealed with XChaCha20-Poly1305 under a
//! key derived from the caller's device secret, and the whole ledger can be
//! atomically re-encrypted under a new secret.
//!
//! This crate is synchronous and lock-free by itself; `keywell-client` wraps
//! the store in a mutex and serializes foreground consumption against
//! background replenishment.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod block;
pub mod device_key;
pub mod error;
pub mod manifest;
pub mod store;

pub use device_key::{CacheKey, SALT_LEN, derive_cache_key};
pub use error::CacheError;
pub use store::CacheStore;
