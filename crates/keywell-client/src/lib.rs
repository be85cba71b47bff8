//! Keywell key-generation clients.
//!
//! Two client kinds over the same derivation engine:
//!
//! - [`LocalClient`] generates symmetric and asymmetric key material from the
//!   locally persisted random pool, kept topped up by a background
//!   maintenance task. Every consumed byte is used at most once - OTP keys
//!   from this client are true one-time pads.
//! - [`DistributedClient`] runs the two-party agreement handshake that lets
//!   two peers derive an identical symmetric key via the external agreement
//!   service, never touching the local cache.
//!
//! Both are generic over the external collaborators defined in
//! `keywell-core`; production transports and the `keywell-harness` fakes
//! plug in interchangeably.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod derivation;
pub mod distributed;
pub mod local;
mod maintenance;
mod state;

pub use distributed::DistributedClient;
pub use local::LocalClient;
