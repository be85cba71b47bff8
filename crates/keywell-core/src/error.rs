//! Error taxonomy for the keywell SDK.
//!
//! One strongly-typed error for the whole public surface. Foreground
//! operations (key generation, rotation, initialization) return these
//! synchronously; background maintenance failures never propagate as errors
//! and degrade to an observable status condition instead.
//!
//! We avoid `std::io::Error` in the public surface to keep callers matching
//! on semantic conditions rather than OS error kinds.

use std::io;

use thiserror::Error;

/// Errors surfaced by keywell clients and the cache ledger.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyGenError {
    /// The supplied device secret cannot unlock the existing cache.
    #[error("device secret does not unlock the cache")]
    Authentication,

    /// The cache holds fewer unconsumed bytes than the operation needs.
    ///
    /// Nothing is consumed when this is returned; the request either runs in
    /// full or not at all.
    #[error("insufficient random: requested {requested} bytes, {available} available")]
    InsufficientRandom {
        /// Bytes the operation asked for.
        requested: u64,
        /// Unconsumed bytes currently in the pool.
        available: u64,
    },

    /// A request was malformed before any random was consumed.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// What was wrong with the request.
        reason: String,
    },

    /// Disk I/O failure or ledger corruption.
    #[error("storage error: {detail}")]
    Storage {
        /// Underlying failure description.
        detail: String,
    },

    /// Transient failure talking to an external service.
    #[error("service unavailable: {detail}")]
    ServiceUnavailable {
        /// Underlying failure description.
        detail: String,
    },

    /// Malformed, expired, or replayed agreement metadata.
    #[error("protocol error: {detail}")]
    Protocol {
        /// What the agreement exchange rejected.
        detail: String,
    },
}

impl KeyGenError {
    /// Returns true if this error is transient and may succeed on retry.
    ///
    /// Only external-service hiccups are transient. Authentication failures,
    /// invalid arguments, and storage corruption never resolve on their own,
    /// and an insufficient pool is reported via status rather than retried
    /// blindly.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ServiceUnavailable { .. })
    }

    /// Shorthand for an [`KeyGenError::InvalidArgument`] with a formatted reason.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument { reason: reason.into() }
    }
}

/// Convert I/O failures at the storage boundary.
///
/// Only for boundary conversion - ledger internals attach their own context
/// before errors reach here.
impl From<io::Error> for KeyGenError {
    fn from(err: io::Error) -> Self {
        Self::Storage { detail: err.to_string() }
    }
}
