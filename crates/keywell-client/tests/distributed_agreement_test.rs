//! Two-party agreement tests: two independent clients over one service.

use std::sync::Arc;

use ciborium::value::Value;

use keywell_client::DistributedClient;
use keywell_core::{AuthToken, KeyGenError, SymmetricKeyMode};
use keywell_harness::SimAgreementService;

fn peers() -> (
    Arc<SimAgreementService>,
    DistributedClient<Arc<SimAgreementService>>,
    DistributedClient<Arc<SimAgreementService>>,
) {
    let service = Arc::new(SimAgreementService::seeded(42));

    let mut alice = DistributedClient::new(Arc::clone(&service));
    alice.initialize(AuthToken::new("alice-token")).unwrap();
    let mut bob = DistributedClient::new(Arc::clone(&service));
    bob.initialize(AuthToken::new("bob-token")).unwrap();

    (service, alice, bob)
}

#[tokio::test]
async fn peers_derive_identical_aes_keys() {
    let (service, alice, bob) = peers();

    let init = alice.gen_init(SymmetricKeyMode::Aes256, 0).await.unwrap();
    assert_eq!(init.key.len(), 32);
    assert_eq!(service.pending_count(), 1);

    let synced = bob.gen_sync(&init.metadata).await.unwrap();
    assert_eq!(init.key, synced);
    assert_eq!(service.pending_count(), 0);
}

#[tokio::test]
async fn otp_agreement_honors_the_requested_length() {
    let (_service, alice, bob) = peers();

    let init = alice.gen_init(SymmetricKeyMode::Otp, 100).await.unwrap();
    let synced = bob.gen_sync(&init.metadata).await.unwrap();

    assert_eq!(init.key.len(), 100);
    assert_eq!(init.key, synced);
}

#[tokio::test]
async fn replayed_metadata_is_refused() {
    let (_service, alice, bob) = peers();

    let init = alice.gen_init(SymmetricKeyMode::Aes256, 0).await.unwrap();
    bob.gen_sync(&init.metadata).await.unwrap();

    // A second redemption would hand the key to whoever captured the
    // metadata in transit.
    assert!(matches!(
        bob.gen_sync(&init.metadata).await,
        Err(KeyGenError::Protocol { .. })
    ));
}

#[tokio::test]
async fn malformed_metadata_is_a_protocol_error() {
    let (_service, _alice, bob) = peers();

    assert!(matches!(
        bob.gen_sync(b"definitely not cbor").await,
        Err(KeyGenError::Protocol { .. })
    ));
    assert!(matches!(bob.gen_sync(&[]).await, Err(KeyGenError::Protocol { .. })));
}

#[tokio::test]
async fn unsupported_envelope_version_is_refused() {
    let (_service, _alice, bob) = peers();

    // A well-formed envelope from a hypothetical future client.
    let envelope = Value::Map(vec![
        (Value::Text("version".into()), Value::Integer(2.into())),
        (Value::Text("mode".into()), Value::Text("Aes256".into())),
        (Value::Text("key_size".into()), Value::Integer(0.into())),
        (Value::Text("token".into()), Value::Array(Vec::new())),
    ]);
    let mut metadata = Vec::new();
    ciborium::into_writer(&envelope, &mut metadata).unwrap();

    assert!(matches!(bob.gen_sync(&metadata).await, Err(KeyGenError::Protocol { .. })));
}

#[tokio::test]
async fn expired_token_is_a_protocol_error() {
    let (service, alice, bob) = peers();

    let init = alice.gen_init(SymmetricKeyMode::Aes256, 0).await.unwrap();
    service.expire_all();

    assert!(matches!(
        bob.gen_sync(&init.metadata).await,
        Err(KeyGenError::Protocol { .. })
    ));
}

#[tokio::test]
async fn validation_precedes_the_service_call() {
    let (service, alice, _bob) = peers();

    assert!(matches!(
        alice.gen_init(SymmetricKeyMode::Otp, 0).await,
        Err(KeyGenError::InvalidArgument { .. })
    ));
    // Nothing was escrowed for the rejected request.
    assert_eq!(service.pending_count(), 0);
}

#[tokio::test]
async fn uninitialized_client_is_rejected() {
    let client = DistributedClient::new(SimAgreementService::seeded(1));
    assert!(matches!(
        client.gen_init(SymmetricKeyMode::Aes256, 0).await,
        Err(KeyGenError::InvalidArgument { .. })
    ));
    assert!(matches!(client.gen_sync(&[]).await, Err(KeyGenError::InvalidArgument { .. })));

    let mut client = DistributedClient::new(SimAgreementService::seeded(1));
    assert!(matches!(
        client.initialize(AuthToken::new("")),
        Err(KeyGenError::InvalidArgument { .. })
    ));
}
