//! Deterministic simulation harness for keywell testing.
//!
//! In-memory implementations of the three external-service contracts from
//! `keywell-core`, all seeded and reproducible: a random source with
//! scriptable outages, an agreement service that enforces single redemption,
//! and a deterministic asymmetric provider. Tests drive the real clients
//! against these and assert on observable status instead of sleeping.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod sim_agreement;
pub mod sim_asymmetric;
pub mod sim_random;

pub use sim_agreement::SimAgreementService;
pub use sim_asymmetric::SimAsymmetricProvider;
pub use sim_random::SimRandomSource;
