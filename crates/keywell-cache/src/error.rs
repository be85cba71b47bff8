//! Ledger error types.

use thiserror::Error;

use keywell_core::KeyGenError;

/// Errors raised by the encrypted ledger.
///
/// Converted to [`KeyGenError`] at the client boundary; internally the ledger
/// distinguishes plain I/O failures from corruption so that initialization
/// can treat the latter as fatal.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The derived key cannot decrypt the existing ledger.
    #[error("device secret does not unlock the ledger")]
    Authentication,

    /// Fewer unconsumed bytes exist than the request needs.
    #[error("insufficient random: requested {requested} bytes, {available} available")]
    InsufficientRandom {
        /// Bytes requested.
        requested: u64,
        /// Unconsumed bytes present.
        available: u64,
    },

    /// An append would push the pool past its configured bounds.
    ///
    /// Excess bytes are rejected in full, never silently truncated.
    #[error("append of {appended} bytes exceeds remaining headroom of {headroom}")]
    CapacityExceeded {
        /// Bytes the caller tried to append.
        appended: u64,
        /// Headroom left under the tighter of the pool and location bounds.
        headroom: u64,
    },

    /// Disk I/O failure.
    #[error("ledger i/o failure: {detail}")]
    Io {
        /// Underlying failure description.
        detail: String,
    },

    /// The on-disk ledger is damaged (bad magic, impossible sizes, failed
    /// authentication tag on a block the manifest key opened).
    #[error("ledger corrupt: {detail}")]
    Corrupt {
        /// What failed to parse or authenticate.
        detail: String,
    },
}

impl CacheError {
    pub(crate) fn io(context: &str, err: &std::io::Error) -> Self {
        Self::Io { detail: format!("{context}: {err}") }
    }
}

impl From<CacheError> for KeyGenError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Authentication => Self::Authentication,
            CacheError::InsufficientRandom { requested, available } => {
                Self::InsufficientRandom { requested, available }
            },
            CacheError::CapacityExceeded { .. } | CacheError::Io { .. } => {
                Self::Storage { detail: err.to_string() }
            },
            CacheError::Corrupt { .. } => Self::Storage { detail: err.to_string() },
        }
    }
}
