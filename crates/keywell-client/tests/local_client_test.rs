//! End-to-end local client tests over the simulation harness.
//!
//! All tests run on a paused tokio clock: maintenance backoff and interval
//! sleeps auto-advance, so even the stall-and-recover scenarios finish in
//! milliseconds of wall time. Tests poll observable status instead of
//! assuming tick timing.

use std::{sync::Arc, time::Duration};

use tempfile::TempDir;
use tokio::time;

use keywell_client::LocalClient;
use keywell_core::{
    AsymmetricKeyMode, AuthToken, CacheConfig, CacheState, CacheStatus, DeviceSecret, KeyGenError,
    LocationConfig, MaintenanceHealth, SymmetricKeyMode,
};
use keywell_harness::{SimAsymmetricProvider, SimRandomSource};

const MIN_CACHED: u64 = 256;
const MAX_CACHED: u64 = 512;
const INTERVAL: Duration = Duration::from_secs(1);

type TestClient = LocalClient<Arc<SimRandomSource>, SimAsymmetricProvider>;

fn config(root: &TempDir, secret: &[u8]) -> CacheConfig {
    CacheConfig {
        device_secret: DeviceSecret::new(secret.to_vec()),
        locations: vec![
            LocationConfig {
                id: "primary".into(),
                path: root.path().join("primary"),
                available_size: 384,
            },
            LocationConfig {
                id: "secondary".into(),
                path: root.path().join("secondary"),
                available_size: 384,
            },
        ],
        max_num_cached_bytes: MAX_CACHED,
        min_num_cached_bytes: MIN_CACHED,
        maintenance_interval: INTERVAL,
    }
}

async fn started_client(root: &TempDir, source: Arc<SimRandomSource>) -> TestClient {
    let mut client = LocalClient::new(source, SimAsymmetricProvider);
    client
        .initialize_async(AuthToken::new("test-token"), config(root, b"device secret"))
        .await
        .unwrap();
    client
}

/// Poll until the cache reports ready, advancing the paused clock.
async fn wait_ready(client: &TestClient) -> CacheStatus {
    for _ in 0..200 {
        let status = client.check_cache_status().unwrap();
        if status.state == CacheState::Ready {
            return status;
        }
        time::sleep(INTERVAL).await;
    }
    panic!("cache never reached ready");
}

async fn wait_health(client: &TestClient, want_stalled: bool) -> CacheStatus {
    for _ in 0..200 {
        let status = client.check_cache_status().unwrap();
        let stalled = matches!(status.maintenance, MaintenanceHealth::Stalled { .. });
        if stalled == want_stalled {
            return status;
        }
        time::sleep(INTERVAL).await;
    }
    panic!("maintenance health never became stalled={want_stalled}");
}

async fn wait_remaining(client: &TestClient, want: u64) {
    for _ in 0..200 {
        if client.check_cache_status().unwrap().remaining_capacity == want {
            return;
        }
        time::sleep(INTERVAL).await;
    }
    panic!("pool never reached {want} remaining bytes");
}

#[tokio::test(start_paused = true)]
async fn cache_fills_and_serves_aes_keys() {
    let root = TempDir::new().unwrap();
    let client = started_client(&root, Arc::new(SimRandomSource::seeded(1))).await;

    let status = wait_ready(&client).await;
    assert!(status.remaining_capacity >= MIN_CACHED);
    assert!(status.total_downloaded_random >= MIN_CACHED);
    assert_eq!(status.maintenance, MaintenanceHealth::Nominal);

    let key = client.gen_symmetric_key(SymmetricKeyMode::Aes256, 0).unwrap();
    assert_eq!(key.len(), 32);
}

#[tokio::test(start_paused = true)]
async fn under_delivering_source_still_reaches_ready() {
    let root = TempDir::new().unwrap();
    let source = Arc::new(SimRandomSource::seeded(2));
    source.limit_chunk(48);
    let client = started_client(&root, Arc::clone(&source)).await;

    wait_ready(&client).await;
    // Filling MIN_CACHED at 48 bytes a tick takes several fetches.
    assert!(source.fetch_count() >= MIN_CACHED / 48);
}

#[tokio::test(start_paused = true)]
async fn undersized_locations_plateau_at_their_capacity() {
    let root = TempDir::new().unwrap();
    let source = Arc::new(SimRandomSource::seeded(16));

    // Locations hold 100 bytes against a 512-byte pool bound; the
    // configuration validates with a warning, and the cache must fill to
    // the location bound instead of requesting bytes it cannot store.
    let config = CacheConfig {
        device_secret: DeviceSecret::new(b"device secret".to_vec()),
        locations: vec![LocationConfig {
            id: "primary".into(),
            path: root.path().join("primary"),
            available_size: 100,
        }],
        max_num_cached_bytes: MAX_CACHED,
        min_num_cached_bytes: 50,
        maintenance_interval: INTERVAL,
    };
    let mut client = LocalClient::new(Arc::clone(&source), SimAsymmetricProvider);
    client.initialize_async(AuthToken::new("test-token"), config).await.unwrap();

    let status = wait_ready(&client).await;
    assert_eq!(status.remaining_capacity, 100);
    assert_eq!(status.total_downloaded_random, 100);
    assert_eq!(status.maintenance, MaintenanceHealth::Nominal);

    // At the plateau there is nothing to request; the service is left alone.
    let fetches = source.fetch_count();
    time::sleep(INTERVAL * 20).await;
    assert_eq!(source.fetch_count(), fetches);

    // Consumption opens headroom and replenishment resumes up to the
    // location bound.
    client.gen_symmetric_key(SymmetricKeyMode::Otp, 40).unwrap();
    wait_remaining(&client, 100).await;
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn otp_keys_never_share_pool_bytes() {
    let root = TempDir::new().unwrap();
    let client = started_client(&root, Arc::new(SimRandomSource::seeded(3))).await;
    wait_ready(&client).await;

    let a = client.gen_symmetric_key(SymmetricKeyMode::Otp, 32).unwrap();
    let b = client.gen_symmetric_key(SymmetricKeyMode::Otp, 32).unwrap();

    assert_eq!(a.len(), 32);
    assert_eq!(b.len(), 32);
    assert_ne!(a, b, "consecutive one-time pads must come from disjoint pool bytes");
}

#[tokio::test(start_paused = true)]
async fn invalid_request_consumes_nothing() {
    let root = TempDir::new().unwrap();
    let mut client = started_client(&root, Arc::new(SimRandomSource::seeded(4))).await;
    wait_ready(&client).await;
    client.shutdown().await;

    let before = client.check_cache_status().unwrap().remaining_capacity;
    assert!(matches!(
        client.gen_symmetric_key(SymmetricKeyMode::Otp, 0),
        Err(KeyGenError::InvalidArgument { .. })
    ));
    let after = client.check_cache_status().unwrap().remaining_capacity;
    assert_eq!(before, after);
}

#[tokio::test(start_paused = true)]
async fn oversized_request_reports_insufficient_random() {
    let root = TempDir::new().unwrap();
    let client = started_client(&root, Arc::new(SimRandomSource::seeded(5))).await;
    wait_ready(&client).await;

    // Larger than the pool can ever hold.
    let err = client.gen_symmetric_key(SymmetricKeyMode::Otp, MAX_CACHED + 1).unwrap_err();
    assert!(matches!(err, KeyGenError::InsufficientRandom { requested, .. }
        if requested == MAX_CACHED + 1));
}

#[tokio::test(start_paused = true)]
async fn asymmetric_modes_consume_mode_specific_seed() {
    let root = TempDir::new().unwrap();
    let mut client = started_client(&root, Arc::new(SimRandomSource::seeded(6))).await;
    wait_ready(&client).await;
    // Stop replenishment so pool deltas are exact.
    client.shutdown().await;

    for (mode, seed_len, private_len, public_len) in [
        (AsymmetricKeyMode::Ecdh, 32, 32, 65),
        (AsymmetricKeyMode::Frodo, 48, 48, 96),
        (AsymmetricKeyMode::Kyber, 64, 64, 128),
    ] {
        let before = client.check_cache_status().unwrap().remaining_capacity;
        let pair = client.gen_asymmetric_keys(mode).unwrap();
        let after = client.check_cache_status().unwrap().remaining_capacity;

        assert_eq!(before - after, seed_len, "{mode:?} seed consumption");
        assert_eq!(pair.private_key.len(), private_len);
        assert_eq!(pair.public_key.len(), public_len);
    }
}

#[tokio::test(start_paused = true)]
async fn stall_is_reported_then_cleared_on_recovery() {
    let root = TempDir::new().unwrap();
    let source = Arc::new(SimRandomSource::seeded(7));
    // Enough failures to cross the stall threshold before the first success.
    source.fail_next(6);
    let client = started_client(&root, Arc::clone(&source)).await;

    let status = wait_health(&client, true).await;
    assert!(matches!(
        status.maintenance,
        MaintenanceHealth::Stalled { consecutive_failures } if consecutive_failures >= 5
    ));
    assert_eq!(status.state, CacheState::Downloading);

    // The failure window drains; the next successful download clears the
    // stall and the pool fills.
    let status = wait_health(&client, false).await;
    assert_eq!(status.maintenance, MaintenanceHealth::Nominal);
    wait_ready(&client).await;
}

#[tokio::test(start_paused = true)]
async fn wipe_empties_the_pool_and_is_idempotent() {
    let root = TempDir::new().unwrap();
    let mut client = started_client(&root, Arc::new(SimRandomSource::seeded(8))).await;
    wait_ready(&client).await;

    client.wipe().await.unwrap();
    client.wipe().await.unwrap();

    let status = client.check_cache_status().unwrap();
    assert_eq!(status.remaining_capacity, 0);
    assert_eq!(status.total_downloaded_random, 0);
    // Ready is one-way: a drained cache fails consumption instead.
    assert_eq!(status.state, CacheState::Ready);
    assert!(matches!(
        client.gen_symmetric_key(SymmetricKeyMode::Aes256, 0),
        Err(KeyGenError::InsufficientRandom { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn wipe_stops_replenishment() {
    let root = TempDir::new().unwrap();
    let source = Arc::new(SimRandomSource::seeded(15));
    let mut client = started_client(&root, Arc::clone(&source)).await;
    wait_ready(&client).await;

    // The scheduler is still live here; wipe must stop it, not just empty
    // the pool for one tick.
    client.wipe().await.unwrap();
    let fetches = source.fetch_count();

    time::sleep(INTERVAL * 20).await;
    assert_eq!(source.fetch_count(), fetches, "wiped cache must not refill");
    assert_eq!(client.check_cache_status().unwrap().remaining_capacity, 0);
    assert_eq!(client.check_cache_status().unwrap().total_downloaded_random, 0);
}

#[tokio::test(start_paused = true)]
async fn rotated_secret_locks_out_the_old_one() {
    let root = TempDir::new().unwrap();
    let old_secret = DeviceSecret::new(b"device secret".to_vec());
    let new_secret = DeviceSecret::new(b"rotated secret".to_vec());

    let mut client = started_client(&root, Arc::new(SimRandomSource::seeded(9))).await;
    wait_ready(&client).await;
    client.shutdown().await;

    client.gen_symmetric_key(SymmetricKeyMode::Otp, 16).unwrap();
    let preserved = client.check_cache_status().unwrap().remaining_capacity;
    client.update_device_secret(&old_secret, &new_secret).unwrap();
    drop(client);

    // The old secret no longer unlocks any location.
    let mut stale = LocalClient::new(Arc::new(SimRandomSource::seeded(9)), SimAsymmetricProvider);
    assert!(matches!(
        stale.initialize_async(AuthToken::new("test-token"), config(&root, b"device secret")).await,
        Err(KeyGenError::Authentication)
    ));

    // The new secret sees the pool byte-for-byte intact.
    let mut rotated = LocalClient::new(Arc::new(SimRandomSource::seeded(9)), SimAsymmetricProvider);
    rotated
        .initialize_async(AuthToken::new("test-token"), config(&root, b"rotated secret"))
        .await
        .unwrap();
    assert_eq!(rotated.check_cache_status().unwrap().remaining_capacity, preserved);
}

#[tokio::test(start_paused = true)]
async fn rotation_with_wrong_current_secret_fails_closed() {
    let root = TempDir::new().unwrap();
    let mut client = started_client(&root, Arc::new(SimRandomSource::seeded(10))).await;
    wait_ready(&client).await;
    client.shutdown().await;

    let wrong = DeviceSecret::new(b"not the secret".to_vec());
    let new_secret = DeviceSecret::new(b"rotated secret".to_vec());
    assert!(matches!(
        client.update_device_secret(&wrong, &new_secret),
        Err(KeyGenError::Authentication)
    ));

    // The original secret still works.
    client.gen_symmetric_key(SymmetricKeyMode::Aes256, 0).unwrap();
}

#[tokio::test(start_paused = true)]
async fn uninitialized_client_rejects_every_call() {
    let mut client: TestClient =
        LocalClient::new(Arc::new(SimRandomSource::seeded(11)), SimAsymmetricProvider);

    assert!(matches!(
        client.gen_symmetric_key(SymmetricKeyMode::Aes256, 0),
        Err(KeyGenError::InvalidArgument { .. })
    ));
    assert!(matches!(
        client.gen_asymmetric_keys(AsymmetricKeyMode::Ecdh),
        Err(KeyGenError::InvalidArgument { .. })
    ));
    assert!(matches!(client.wipe().await, Err(KeyGenError::InvalidArgument { .. })));
    assert!(matches!(client.check_cache_status(), Err(KeyGenError::InvalidArgument { .. })));
}

#[tokio::test(start_paused = true)]
async fn double_initialize_is_rejected() {
    let root = TempDir::new().unwrap();
    let mut client = started_client(&root, Arc::new(SimRandomSource::seeded(12))).await;

    assert!(matches!(
        client
            .initialize_async(AuthToken::new("test-token"), config(&root, b"device secret"))
            .await,
        Err(KeyGenError::InvalidArgument { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_replenishment() {
    let root = TempDir::new().unwrap();
    let source = Arc::new(SimRandomSource::seeded(13));
    let mut client = started_client(&root, Arc::clone(&source)).await;
    wait_ready(&client).await;
    client.shutdown().await;

    // Drain the pool so there would be a deficit to fetch, then let many
    // intervals pass: no further downloads may happen.
    client.gen_symmetric_key(SymmetricKeyMode::Otp, 64).unwrap();
    let fetches = source.fetch_count();
    time::sleep(INTERVAL * 20).await;
    assert_eq!(source.fetch_count(), fetches);
}

#[tokio::test(start_paused = true)]
async fn pool_survives_restart_without_replaying_bytes() {
    let root = TempDir::new().unwrap();
    let mut client = started_client(&root, Arc::new(SimRandomSource::seeded(14))).await;
    wait_ready(&client).await;
    client.shutdown().await;

    let first = client.gen_symmetric_key(SymmetricKeyMode::Otp, 32).unwrap();
    let remaining = client.check_cache_status().unwrap().remaining_capacity;
    drop(client);

    let mut reopened = started_client(&root, Arc::new(SimRandomSource::seeded(14))).await;
    assert_eq!(reopened.check_cache_status().unwrap().remaining_capacity, remaining);
    reopened.shutdown().await;

    let second = reopened.gen_symmetric_key(SymmetricKeyMode::Otp, 32).unwrap();
    assert_ne!(first, second, "a restart must never re-serve consumed pool bytes");
}
