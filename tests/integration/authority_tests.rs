//! Integration tests for issuance, verification and delegated actions
//!
//! Every property is checked against both grant strategies.

use assert_matches::assert_matches;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Duration;
use dlg_auth::{
    scope::{CALENDAR_EDIT, CALENDAR_VIEW},
    ActionOutcome, Calendar, DelegatedAction, DenialReason, FindSlot, FindSlotRequest, GrantError,
    GrantId, GrantIssuer, GrantStore, GrantVerifier, InvocationState, Scope, SignedBundle, Strategy, Subject,
    VerificationResult,
};
use dlg_tests::{setup_test_logging, TestAuthority, STRATEGIES};
use std::sync::Arc;

fn alice() -> Subject {
    Subject::new("alice").unwrap()
}

fn view() -> Scope {
    Scope::new([CALENDAR_VIEW]).unwrap()
}

#[tokio::test]
async fn test_valid_right_after_issuance() {
    setup_test_logging();

    for strategy in STRATEGIES {
        let t = TestAuthority::new(strategy);
        let grant = t.authority.issue(alice(), view(), Duration::hours(1)).await.unwrap();

        assert_eq!(
            t.authority.verify(&grant.artifact().unwrap(), CALENDAR_VIEW).await,
            VerificationResult::Valid {
                subject: alice(),
                scope: view()
            },
            "{strategy}"
        );
    }
}

#[tokio::test]
async fn test_expired_regardless_of_scope() {
    for strategy in STRATEGIES {
        let t = TestAuthority::new(strategy);
        let grant = t.authority.issue(alice(), view(), Duration::hours(1)).await.unwrap();
        let artifact = grant.artifact().unwrap();

        // Still usable at the exact expiry instant
        t.clock.set(grant.expires_at);
        assert!(t.authority.verify(&artifact, CALENDAR_VIEW).await.is_valid(), "{strategy}");

        t.clock.advance(Duration::seconds(1));
        for scope in [CALENDAR_VIEW, CALENDAR_EDIT, "anything"] {
            assert_eq!(
                t.authority.verify(&artifact, scope).await.reason(),
                Some(DenialReason::Expired),
                "{strategy} / {scope}"
            );
        }
    }
}

#[tokio::test]
async fn test_scope_mismatch_before_expiry() {
    for strategy in STRATEGIES {
        let t = TestAuthority::new(strategy);
        let grant = t.authority.issue(alice(), view(), Duration::hours(1)).await.unwrap();

        assert_eq!(
            t.authority
                .verify(&grant.artifact().unwrap(), CALENDAR_EDIT)
                .await
                .reason(),
            Some(DenialReason::ScopeMismatch),
            "{strategy}"
        );
    }
}

#[tokio::test]
async fn test_never_issued_artifacts() {
    let bearer = TestAuthority::new(Strategy::Bearer);
    assert_eq!(
        bearer
            .authority
            .verify(GrantId::generate().as_str(), CALENDAR_VIEW)
            .await
            .reason(),
        Some(DenialReason::Unknown)
    );
    assert_eq!(
        bearer.authority.verify("", CALENDAR_VIEW).await.reason(),
        Some(DenialReason::Unknown)
    );

    let credential = TestAuthority::new(Strategy::Credential);
    assert_eq!(
        credential
            .authority
            .verify(GrantId::generate().as_str(), CALENDAR_VIEW)
            .await
            .reason(),
        Some(DenialReason::BadSignature)
    );
}

#[tokio::test]
async fn test_tampering_any_claim_is_detected() {
    let t = TestAuthority::new(Strategy::Credential);
    let grant = t.authority.issue(alice(), view(), Duration::hours(1)).await.unwrap();
    let artifact = grant.artifact().unwrap();
    let (_, signature) = artifact.split_once('.').unwrap();
    let original = SignedBundle::decode(&artifact).unwrap();

    let tamperings: Vec<Box<dyn Fn(&mut SignedBundle)>> = vec![
        Box::new(|b| b.claims.sub = Subject::new("mallory").unwrap()),
        Box::new(|b| b.claims.scope = Scope::parse("calendar.view calendar.edit").unwrap()),
        Box::new(|b| b.claims.exp += 86_400),
        Box::new(|b| b.claims.iat -= 60),
        Box::new(|b| b.claims.iss = "did:example:rogue".to_string()),
        Box::new(|b| b.claims.jti = GrantId::generate()),
    ];

    for tamper in tamperings {
        let mut bundle = original.clone();
        tamper(&mut bundle);

        let forged = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&bundle.claims).unwrap()),
            signature
        );
        assert_eq!(
            t.authority.verify(&forged, CALENDAR_VIEW).await.reason(),
            Some(DenialReason::BadSignature)
        );
    }

    // Flipping a byte of the signature itself
    let mut sig_bytes = URL_SAFE_NO_PAD.decode(signature).unwrap();
    sig_bytes[0] ^= 0x01;
    let (claims, _) = artifact.split_once('.').unwrap();
    let forged = format!("{}.{}", claims, URL_SAFE_NO_PAD.encode(sig_bytes));
    assert_eq!(
        t.authority.verify(&forged, CALENDAR_VIEW).await.reason(),
        Some(DenialReason::BadSignature)
    );
}

#[tokio::test]
async fn test_bad_signature_checked_before_expiry() {
    let t = TestAuthority::new(Strategy::Credential);
    let grant = t.authority.issue(alice(), view(), Duration::hours(1)).await.unwrap();
    let artifact = grant.artifact().unwrap();

    t.clock.advance(Duration::hours(2));
    let truncated = &artifact[..artifact.len() - 4];
    assert_eq!(
        t.authority.verify(truncated, CALENDAR_VIEW).await.reason(),
        Some(DenialReason::BadSignature)
    );
}

#[tokio::test]
async fn test_issuance_rejects_bad_requests() {
    for strategy in STRATEGIES {
        let t = TestAuthority::new(strategy);

        assert_matches!(
            t.authority.issue(alice(), view(), Duration::zero()).await,
            Err(GrantError::InvalidDuration(_))
        );
        assert_matches!(
            t.authority.issue(alice(), view(), Duration::seconds(-1)).await,
            Err(GrantError::InvalidDuration(_))
        );
        assert!(Scope::parse("").is_err());
    }
}

#[tokio::test]
async fn test_ids_unique_across_grants() {
    for strategy in STRATEGIES {
        let t = TestAuthority::new(strategy);
        let mut ids = std::collections::HashSet::new();

        for _ in 0..50 {
            let grant = t.authority.issue(alice(), view(), Duration::hours(1)).await.unwrap();
            assert!(ids.insert(grant.id), "{strategy}");
        }
    }
}

#[tokio::test]
async fn test_find_slot_end_to_end() {
    setup_test_logging();

    for strategy in STRATEGIES {
        let t = TestAuthority::new(strategy);
        let verifier: Arc<dyn GrantVerifier> = t.authority.clone();
        let action = DelegatedAction::new(verifier, FindSlot::new(Arc::new(Calendar::mock().unwrap())));

        let grant = t.authority.issue(alice(), view(), Duration::hours(1)).await.unwrap();
        let artifact = grant.artifact().unwrap();

        let outcome = action
            .invoke(&artifact, CALENDAR_VIEW, FindSlotRequest::default())
            .await;
        assert_eq!(outcome.terminal_state(), InvocationState::Done);
        let slot = outcome.completed().expect("slot returned");
        assert!(slot.start < slot.end, "{strategy}");

        let outcome = action
            .invoke(&artifact, CALENDAR_EDIT, FindSlotRequest::default())
            .await;
        assert_eq!(outcome.terminal_state(), InvocationState::Denied);
        assert_eq!(outcome.denial_reason(), Some(DenialReason::ScopeMismatch), "{strategy}");
    }
}

#[tokio::test]
async fn test_action_failure_after_authorization() {
    let t = TestAuthority::new(Strategy::Bearer);
    let verifier: Arc<dyn GrantVerifier> = t.authority.clone();
    let action = DelegatedAction::new(verifier, FindSlot::new(Arc::new(Calendar::default())));

    let grant = t.authority.issue(alice(), view(), Duration::hours(1)).await.unwrap();
    let outcome = action
        .invoke(&grant.artifact().unwrap(), CALENDAR_VIEW, FindSlotRequest::default())
        .await;

    assert_matches!(outcome, ActionOutcome::Failed(_));
    assert_eq!(outcome.denial_reason(), None);
}

#[tokio::test]
async fn test_artifacts_do_not_cross_strategies() {
    let bearer = TestAuthority::new(Strategy::Bearer);
    let credential = TestAuthority::new(Strategy::Credential);

    let token = bearer.authority.issue(alice(), view(), Duration::hours(1)).await.unwrap();
    let vc = credential.authority.issue(alice(), view(), Duration::hours(1)).await.unwrap();

    assert_eq!(
        credential
            .authority
            .verify(&token.artifact().unwrap(), CALENDAR_VIEW)
            .await
            .reason(),
        Some(DenialReason::BadSignature)
    );
    assert_eq!(
        bearer
            .authority
            .verify(&vc.artifact().unwrap(), CALENDAR_VIEW)
            .await
            .reason(),
        Some(DenialReason::Unknown)
    );
}

#[tokio::test]
async fn test_concurrent_invocations() {
    let t = TestAuthority::new(Strategy::Bearer);
    let verifier: Arc<dyn GrantVerifier> = t.authority.clone();
    let action = Arc::new(DelegatedAction::new(
        verifier,
        FindSlot::new(Arc::new(Calendar::mock().unwrap())),
    ));

    let mut handles = Vec::new();
    for i in 0..16 {
        let authority = t.authority.clone();
        let action = action.clone();
        handles.push(tokio::spawn(async move {
            let subject = Subject::new(format!("agent-{i}")).unwrap();
            let grant = authority.issue(subject, view(), Duration::hours(1)).await.unwrap();
            action
                .invoke(&grant.artifact().unwrap(), CALENDAR_VIEW, FindSlotRequest::default())
                .await
                .completed()
                .is_some()
        }));
    }

    for handle in handles {
        assert!(handle.await.unwrap());
    }
    assert_eq!(t.store.len().await.unwrap(), 16);
}
