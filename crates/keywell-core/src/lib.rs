//! Keywell core types.
//!
//! Shared vocabulary for the keywell SDK: cache configuration, key modes,
//! status snapshots, the error taxonomy, sensitive-buffer wrappers, and the
//! contracts of the external services the SDK consumes. No I/O lives here.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod deployment;
pub mod error;
pub mod secret;
pub mod services;

pub use config::{
    AsymmetricKeyMode, CacheConfig, CacheState, CacheStatus, LocationConfig, MaintenanceHealth,
    SymmetricKeyMode,
};
pub use deployment::{Deployment, ServiceEndpoints};
pub use error::KeyGenError;
pub use secret::{AsymmetricKeyPair, AuthToken, DeviceSecret, SymmetricKey, SymmetricKeyData};
pub use services::{AgreementInit, AgreementService, AsymmetricProvider, RandomSource};
