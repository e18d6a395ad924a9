//! Integration tests for per-instance session management

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::*;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;
use webhookrelay_operator::cache::BucketCache;
use webhookrelay_operator::crd::WebhookRelayForwardSpec;
use webhookrelay_operator::session::{Credentials, Session, SessionIdentity, SessionManager};

fn manager() -> (Arc<FakeSessionFactory>, SessionManager) {
    let factory = Arc::new(FakeSessionFactory::default());
    let manager = SessionManager::new(factory.clone());
    (factory, manager)
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn session_is_reused_for_same_instance() {
    let (factory, manager) = manager();
    let instance = forward("fwd", 1, "uid-1", WebhookRelayForwardSpec::default());

    let first = assert_ok!(manager.ensure_session(&instance).await);
    let second = assert_ok!(manager.ensure_session(&instance).await);

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(factory.builds.load(Ordering::SeqCst), 1);
    assert_eq!(manager.len().await, 1);
}

#[tokio::test]
async fn generation_change_rebuilds_session() {
    let (factory, manager) = manager();

    let first = assert_ok!(
        manager
            .ensure_session(&forward("fwd", 1, "uid-1", WebhookRelayForwardSpec::default()))
            .await
    );
    let second = assert_ok!(
        manager
            .ensure_session(&forward("fwd", 2, "uid-1", WebhookRelayForwardSpec::default()))
            .await
    );

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(second.identity().generation, 2);
    assert_eq!(factory.builds.load(Ordering::SeqCst), 2);
    assert_eq!(manager.len().await, 1);
}

#[tokio::test]
async fn recreated_instance_gets_new_session() {
    let (factory, manager) = manager();

    assert_ok!(
        manager
            .ensure_session(&forward("fwd", 1, "uid-1", WebhookRelayForwardSpec::default()))
            .await
    );
    let recreated = assert_ok!(
        manager
            .ensure_session(&forward("fwd", 1, "uid-2", WebhookRelayForwardSpec::default()))
            .await
    );

    assert_eq!(recreated.identity().uid, "uid-2");
    assert_eq!(factory.builds.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn instances_get_independent_sessions() {
    let (factory, manager) = manager();

    let a = assert_ok!(
        manager
            .ensure_session(&forward("a", 1, "uid-a", WebhookRelayForwardSpec::default()))
            .await
    );
    let b = assert_ok!(
        manager
            .ensure_session(&forward("b", 1, "uid-b", WebhookRelayForwardSpec::default()))
            .await
    );

    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(factory.builds.load(Ordering::SeqCst), 2);
    assert_eq!(manager.len().await, 2);
}

#[tokio::test]
async fn failed_rebuild_drops_stale_session() {
    let (factory, manager) = manager();

    assert_ok!(
        manager
            .ensure_session(&forward("fwd", 1, "uid-1", WebhookRelayForwardSpec::default()))
            .await
    );

    factory.fail.store(true, Ordering::SeqCst);
    let err = assert_err!(
        manager
            .ensure_session(&forward("fwd", 2, "uid-1", WebhookRelayForwardSpec::default()))
            .await
    );

    assert!(err.to_string().contains("secret not found"));
    assert!(manager.is_empty().await);
}

#[tokio::test]
async fn forget_and_retain_drop_sessions() {
    let (_factory, manager) = manager();

    for name in ["a", "b", "c"] {
        assert_ok!(
            manager
                .ensure_session(&forward(name, 1, name, WebhookRelayForwardSpec::default()))
                .await
        );
    }

    assert!(manager.forget("default", "a").await);
    assert!(!manager.forget("default", "a").await);
    assert!(!manager.forget("other", "b").await);

    let dropped = manager.retain(|key| key == "default/b").await;
    assert_eq!(dropped, 1);
    assert_eq!(manager.len().await, 1);
}

// ============================================================================
// Session
// ============================================================================

#[test]
fn identity_comes_from_instance_metadata() {
    let instance = forward("fwd", 7, "uid-7", WebhookRelayForwardSpec::default());

    assert_eq!(
        SessionIdentity::of(&instance),
        SessionIdentity {
            name: "fwd".to_string(),
            generation: 7,
            uid: "uid-7".to_string(),
        }
    );
}

#[test]
fn dropping_session_stops_its_watcher() {
    let token = CancellationToken::new();
    let session = Session::new(
        SessionIdentity::default(),
        test_credentials(),
        Arc::new(FakeRelayApi::new()),
        Arc::new(BucketCache::new()),
    )
    .with_watcher(token.clone());

    assert!(!token.is_cancelled());
    drop(session);
    assert!(token.is_cancelled());
}

#[test]
fn credentials_debug_hides_secrets() {
    let credentials = Credentials::new("my-key", "my-secret");
    let debug = format!("{:?}", credentials);

    assert!(!debug.contains("my-key"));
    assert!(!debug.contains("my-secret"));
    assert!(debug.contains(&credentials.fingerprint()));
}

#[test]
fn fingerprint_is_stable_per_key() {
    let a = Credentials::new("key", "one");
    let b = Credentials::new("key", "two");
    let c = Credentials::new("other", "one");

    assert_eq!(a.fingerprint().len(), 12);
    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_ne!(a.fingerprint(), c.fingerprint());
}
