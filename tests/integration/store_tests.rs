//! Integration tests for persisted grant storage

use chrono::Duration;
use dlg_auth::{
    scope::CALENDAR_VIEW, Clock, DenialReason, FileGrantStore, GrantIssuer, GrantStore, GrantVerifier,
    Scope, Strategy, Subject,
};
use dlg_tests::{setup_test_logging, TestAuthority};
use std::sync::Arc;

#[tokio::test]
async fn test_file_store_preserves_every_field() {
    setup_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grants.json");

    // Signed grants go through the same store to cover the signature proof
    let signer = TestAuthority::new(Strategy::Credential);
    let signed = signer
        .authority
        .issue(
            Subject::new("did:example:holder123").unwrap(),
            Scope::parse("calendar.view calendar.edit").unwrap(),
            Duration::minutes(5),
        )
        .await
        .unwrap();

    let store = FileGrantStore::open(&path).await.unwrap();
    let bearer = TestAuthority::with_store(Strategy::Bearer, Arc::new(store));
    let stored = bearer
        .authority
        .issue(
            Subject::new("alice").unwrap(),
            Scope::parse(CALENDAR_VIEW).unwrap(),
            Duration::hours(1),
        )
        .await
        .unwrap();
    bearer.store.put(signed.clone()).await.unwrap();

    let reopened = FileGrantStore::open(&path).await.unwrap();
    assert_eq!(reopened.len().await.unwrap(), 2);
    assert_eq!(reopened.get(&stored.id).await.unwrap(), stored);
    assert_eq!(reopened.get(&signed.id).await.unwrap(), signed);
}

#[tokio::test]
async fn test_bearer_grants_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grants.json");

    let artifact = {
        let first = TestAuthority::with_store(
            Strategy::Bearer,
            Arc::new(FileGrantStore::open(&path).await.unwrap()),
        );
        first
            .authority
            .issue(
                Subject::new("alice").unwrap(),
                Scope::parse(CALENDAR_VIEW).unwrap(),
                Duration::hours(1),
            )
            .await
            .unwrap()
            .artifact()
            .unwrap()
    };

    let second = TestAuthority::with_store(
        Strategy::Bearer,
        Arc::new(FileGrantStore::open(&path).await.unwrap()),
    );
    assert!(second.authority.verify(&artifact, CALENDAR_VIEW).await.is_valid());
}

#[tokio::test]
async fn test_purge_only_drops_dead_grants() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grants.json");
    let t = TestAuthority::with_store(
        Strategy::Bearer,
        Arc::new(FileGrantStore::open(&path).await.unwrap()),
    );

    let subject = || Subject::new("alice").unwrap();
    let scope = || Scope::parse(CALENDAR_VIEW).unwrap();
    let short = t.authority.issue(subject(), scope(), Duration::minutes(1)).await.unwrap();
    let long = t.authority.issue(subject(), scope(), Duration::hours(1)).await.unwrap();

    t.clock.advance(Duration::minutes(2));
    assert_eq!(t.store.purge_expired(t.clock.now()).await.unwrap(), 1);

    assert!(t
        .authority
        .verify(&long.artifact().unwrap(), CALENDAR_VIEW)
        .await
        .is_valid());
    // Once purged, a dead grant is indistinguishable from a never-issued one
    assert_eq!(
        t.authority
            .verify(&short.artifact().unwrap(), CALENDAR_VIEW)
            .await
            .reason(),
        Some(DenialReason::Unknown)
    );

    let reopened = FileGrantStore::open(&path).await.unwrap();
    assert_eq!(reopened.len().await.unwrap(), 1);
}
