//! End-to-end tests for the HTTP gateway
//!
//! Drives the real route table through actix-web's test service: issue a
//! grant, call the delegated actions with it, and check the denial mapping.

use actix_web::{
    http::{header, StatusCode},
    test, web, App,
};
use chrono::Duration;
use dlg_auth::{gateway, Strategy};
use dlg_tests::{setup_test_logging, TestAuthority, STRATEGIES};
use serde_json::{json, Value};

macro_rules! gateway_app {
    ($t:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($t.app_state()))
                .configure(gateway::configure),
        )
        .await
    };
}

macro_rules! issue {
    ($app:expr, $body:expr $(,)?) => {{
        let req = test::TestRequest::post()
            .uri("/v1/grants")
            .set_json($body)
            .to_request();
        let resp = test::call_service(&$app, req).await;
        let status = resp.status();
        let body: Value = test::read_body_json(resp).await;
        (status, body)
    }};
}

macro_rules! call_action {
    ($app:expr, $action:expr, $artifact:expr, $body:expr $(,)?) => {{
        let mut req = test::TestRequest::post()
            .uri(&format!("/v1/actions/{}", $action))
            .set_json($body);
        let artifact: Option<&str> = $artifact;
        if let Some(artifact) = artifact {
            req = req.insert_header((header::AUTHORIZATION, format!("Bearer {artifact}")));
        }

        let resp = test::call_service(&$app, req.to_request()).await;
        let status = resp.status();
        let body: Value = test::read_body_json(resp).await;
        (status, body)
    }};
}

#[actix_web::test]
async fn test_health() {
    let t = TestAuthority::new(Strategy::Credential);
    let app = gateway_app!(t);

    let req = test::TestRequest::get().uri("/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["status"], "healthy");
    assert_eq!(body["strategy"], "credential");
    assert_eq!(body["issuer_public_key"].as_str().map(str::len), Some(64));
}

#[actix_web::test]
async fn test_issue_then_find_slot() {
    setup_test_logging();

    for strategy in STRATEGIES {
        let t = TestAuthority::new(strategy);
        let app = gateway_app!(t);

        let (status, grant) = issue!(
            app,
            json!({ "subject": "alice", "scope": "calendar.view", "ttl_seconds": 3600 }),
        );
        assert_eq!(status, StatusCode::OK, "{strategy}: {grant}");
        assert_eq!(grant["token_type"], strategy.token_type());
        assert_eq!(grant["expires_in"], 3600);
        assert_eq!(grant["scope"], json!(["calendar.view"]));
        let artifact = grant["artifact"].as_str().unwrap().to_string();

        let (status, slot) = call_action!(app, "find_slot", Some(artifact.as_str()), json!({}));
        assert_eq!(status, StatusCode::OK, "{strategy}");
        assert_eq!(slot, json!({ "start": "2025-03-01T11:45", "end": "2025-03-01T12:15" }));

        let (status, slot) = call_action!(
            app,
            "find_slot",
            Some(artifact.as_str()),
            json!({ "duration_minutes": 90 }),
        );
        assert_eq!(status, StatusCode::OK);
        assert_eq!(slot["end"], "2025-03-01T13:15");

        let (status, now) = call_action!(
            app,
            "current_time",
            Some(artifact.as_str()),
            json!({ "timezone": "+09:00" }),
        );
        assert_eq!(status, StatusCode::OK);
        assert_eq!(now["datetime"], "2025-03-01T17:00:00+09:00");
        assert_eq!(now["is_dst"], false);
    }
}

#[actix_web::test]
async fn test_convert_time() {
    for strategy in STRATEGIES {
        let t = TestAuthority::new(strategy);
        let app = gateway_app!(t);

        let (_, grant) = issue!(app, json!({ "subject": "alice", "scope": "calendar.view" }));
        let artifact = grant["artifact"].as_str().unwrap().to_string();

        let (status, body) = call_action!(
            app,
            "convert_time",
            Some(artifact.as_str()),
            json!({
                "source_timezone": "Europe/Paris",
                "time": "09:00",
                "target_timezone": "America/New_York",
            }),
        );
        assert_eq!(status, StatusCode::OK, "{strategy}: {body}");
        assert_eq!(body["source"]["datetime"], "2025-03-01T09:00:00+01:00");
        assert_eq!(body["target"]["datetime"], "2025-03-01T03:00:00-05:00");
        assert_eq!(body["target"]["is_dst"], false);
        assert_eq!(body["time_difference"], "-6.0h");
    }
}

#[actix_web::test]
async fn test_scope_mismatch_is_forbidden() {
    for strategy in STRATEGIES {
        let t = TestAuthority::new(strategy);
        let app = gateway_app!(t);

        let (_, grant) = issue!(app, json!({ "subject": "alice", "scope": ["calendar.edit"] }));
        let artifact = grant["artifact"].as_str().unwrap().to_string();

        let (status, body) = call_action!(app, "find_slot", Some(artifact.as_str()), json!({}));
        assert_eq!(status, StatusCode::FORBIDDEN, "{strategy}");
        assert_eq!(body, json!({ "error": true, "reason": "scope_mismatch" }));
    }
}

#[actix_web::test]
async fn test_denials_are_unauthorized() {
    let t = TestAuthority::new(Strategy::Bearer);
    let app = gateway_app!(t);

    let (status, body) = call_action!(app, "find_slot", None, json!({}));
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": true, "reason": "unknown" }));

    let (status, body) = call_action!(app, "find_slot", Some("made-up"), json!({}));
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["reason"], "unknown");

    let (_, grant) = issue!(app, json!({ "subject": "alice", "scope": "calendar.view" }));
    let artifact = grant["artifact"].as_str().unwrap().to_string();
    t.clock.advance(Duration::hours(1) + Duration::seconds(1));

    let (status, body) = call_action!(app, "current_time", Some(artifact.as_str()), json!({}));
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["reason"], "expired");
}

#[actix_web::test]
async fn test_tampered_credential_is_unauthorized() {
    let t = TestAuthority::new(Strategy::Credential);
    let app = gateway_app!(t);

    let (_, grant) = issue!(app, json!({ "subject": "alice", "scope": "calendar.view" }));
    let artifact = grant["artifact"].as_str().unwrap();
    let (claims, signature) = artifact.split_once('.').unwrap();
    let forged = format!("{}x.{}", claims, signature);

    let (status, body) = call_action!(app, "find_slot", Some(forged.as_str()), json!({}));
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["reason"], "bad_signature");
}

#[actix_web::test]
async fn test_action_errors_are_unprocessable() {
    let t = TestAuthority::new(Strategy::Bearer);
    let app = gateway_app!(t);

    let (_, grant) = issue!(app, json!({ "subject": "alice", "scope": "calendar.view" }));
    let artifact = grant["artifact"].as_str().unwrap().to_string();

    let (status, body) = call_action!(
        app,
        "find_slot",
        Some(artifact.as_str()),
        json!({ "duration_minutes": 0 }),
    );
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_payload");

    let (status, body) = call_action!(
        app,
        "current_time",
        Some(artifact.as_str()),
        json!({ "timezone": "Mars/Olympus" }),
    );
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_payload");

    let (status, body) = call_action!(
        app,
        "convert_time",
        Some(artifact.as_str()),
        json!({ "source_timezone": "UTC", "time": "9.30", "target_timezone": "Asia/Tokyo" }),
    );
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_payload");
}

#[actix_web::test]
async fn test_issuance_errors() {
    let t = TestAuthority::new(Strategy::Bearer);
    let app = gateway_app!(t);

    let (status, body) = issue!(
        app,
        json!({ "subject": "alice", "scope": "calendar.view", "ttl_seconds": 0 }),
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Invalid duration"));

    let (status, _) = issue!(app, json!({ "subject": "", "scope": "calendar.view" }));
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = issue!(app, json!({ "subject": "alice", "scope": [] }));
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[actix_web::test]
async fn test_out_of_range_ttl_is_rejected() {
    for strategy in STRATEGIES {
        let t = TestAuthority::new(strategy);
        let app = gateway_app!(t);

        for ttl_seconds in [9_000_000_000_000_i64, i64::MAX] {
            let (status, body) = issue!(
                app,
                json!({ "subject": "alice", "scope": "calendar.view", "ttl_seconds": ttl_seconds }),
            );
            assert_eq!(status, StatusCode::BAD_REQUEST, "{strategy} / {ttl_seconds}");
            assert!(body["error"].as_str().unwrap().contains("Invalid duration"));
        }

        // The gateway keeps serving afterwards
        let (status, _) = issue!(app, json!({ "subject": "alice", "scope": "calendar.view" }));
        assert_eq!(status, StatusCode::OK);
    }
}

#[actix_web::test]
async fn test_introspection() {
    for strategy in STRATEGIES {
        let t = TestAuthority::new(strategy);
        let app = gateway_app!(t);

        let (_, grant) = issue!(app, json!({ "subject": "alice", "scope": "calendar.view" }));
        let artifact = grant["artifact"].as_str().unwrap();

        let req = test::TestRequest::post()
            .uri("/v1/grants/introspect")
            .set_json(json!({ "artifact": artifact, "required_scope": "calendar.view" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(
            body,
            json!({ "status": "valid", "subject": "alice", "scope": ["calendar.view"] })
        );

        let req = test::TestRequest::post()
            .uri("/v1/grants/introspect")
            .set_json(json!({ "artifact": artifact, "required_scope": "calendar.edit" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, json!({ "status": "invalid", "reason": "scope_mismatch" }));
    }
}
