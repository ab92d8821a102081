//! HTTP gateway
//!
//! Thin actix-web adapter over the authority and the calendar actions:
//!
//! - `GET  /health`
//! - `POST /v1/grants`                issue a grant
//! - `POST /v1/grants/introspect`     verify an artifact
//! - `POST /v1/actions/find_slot`     delegated action, `Authorization: Bearer …`
//! - `POST /v1/actions/current_time`  delegated action, `Authorization: Bearer …`
//! - `POST /v1/actions/convert_time`  delegated action, `Authorization: Bearer …`

use crate::{
    action::{ActionOutcome, DelegatedAction, Denial, Operation},
    authority::Authority,
    calendar::{Calendar, ConvertTime, CurrentTime, FindSlot},
    clock::Clock,
    error::{DenialReason, GrantError, Result},
    grant::Subject,
    issuer::GrantIssuer,
    scope::Scope,
    verification::{GrantVerifier, VerificationResult},
};
use actix_web::{
    error::InternalError, get, http::header, http::StatusCode, post, web, HttpRequest,
    HttpResponse, Responder, ResponseError,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use validator::Validate;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    /// Configured grant authority
    pub authority: Arc<Authority>,

    /// Lifetime for requests that name none
    pub default_ttl: Duration,

    /// Guarded slot finder
    pub find_slot: Arc<DelegatedAction<FindSlot>>,

    /// Guarded clock query
    pub current_time: Arc<DelegatedAction<CurrentTime>>,

    /// Guarded timezone conversion
    pub convert_time: Arc<DelegatedAction<ConvertTime>>,
}

impl AppState {
    /// Wire the actions to `authority`
    pub fn new(
        authority: Arc<Authority>,
        default_ttl: Duration,
        calendar: Arc<Calendar>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let verifier: Arc<dyn GrantVerifier> = authority.clone();

        Self {
            find_slot: Arc::new(DelegatedAction::new(verifier.clone(), FindSlot::new(calendar))),
            current_time: Arc::new(DelegatedAction::new(
                verifier.clone(),
                CurrentTime::new(clock.clone()),
            )),
            convert_time: Arc::new(DelegatedAction::new(verifier, ConvertTime::new(clock))),
            authority,
            default_ttl,
        }
    }
}

/// Register every route and the JSON error handler
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        let body = serde_json::json!({ "error": format!("Invalid request body: {}", err) });
        InternalError::from_response(err, HttpResponse::BadRequest().json(body)).into()
    }))
    .service(health_check)
    .service(
        web::scope("/v1")
            .service(issue_grant)
            .service(introspect_grant)
            .service(find_slot)
            .service(current_time)
            .service(convert_time),
    );
}

/// Grant request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct IssueRequest {
    /// Who the grant is for
    #[validate(length(min = 1, max = 255))]
    pub subject: String,

    /// Requested scope, list or space-delimited string
    pub scope: Scope,

    /// Lifetime in seconds; the configured default when absent
    #[serde(default)]
    pub ttl_seconds: Option<i64>,
}

/// Grant response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueResponse {
    /// Bearer artifact to present
    pub artifact: String,

    /// `Bearer` or `VerifiableCredential`
    pub token_type: String,

    /// Grant id
    pub grant_id: String,

    /// Grant subject
    pub subject: String,

    /// Granted scope
    pub scope: Scope,

    /// Issuance time
    pub issued_at: DateTime<Utc>,

    /// Expiry time
    pub expires_at: DateTime<Utc>,

    /// Seconds until expiry
    pub expires_in: i64,
}

/// Introspection request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntrospectRequest {
    /// Artifact to check
    pub artifact: String,

    /// Scope the caller needs
    pub required_scope: String,
}

#[get("/health")]
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let mut body = serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "strategy": state.authority.strategy(),
    });

    if let Some(public_key) = state.authority.public_key_hex() {
        body["issuer_public_key"] = serde_json::Value::String(public_key);
    }

    HttpResponse::Ok().json(body)
}

#[post("/grants")]
async fn issue_grant(
    state: web::Data<AppState>,
    body: web::Json<IssueRequest>,
) -> Result<impl Responder> {
    body.validate()
        .map_err(|e| GrantError::InvalidSubject(format!("Invalid request: {}", e)))?;

    let request = body.into_inner();
    let subject = Subject::new(request.subject)?;
    let ttl = match request.ttl_seconds {
        Some(seconds) => Duration::try_seconds(seconds).ok_or_else(|| {
            GrantError::InvalidDuration(format!("ttl_seconds {} is out of range", seconds))
        })?,
        None => state.default_ttl,
    };

    let grant = state.authority.issue(subject, request.scope, ttl).await?;
    let artifact = grant.artifact()?;

    Ok(HttpResponse::Ok().json(IssueResponse {
        artifact,
        token_type: state.authority.strategy().token_type().to_string(),
        grant_id: grant.id.to_string(),
        subject: grant.subject.to_string(),
        expires_in: grant.ttl().num_seconds(),
        scope: grant.scope,
        issued_at: grant.issued_at,
        expires_at: grant.expires_at,
    }))
}

#[post("/grants/introspect")]
async fn introspect_grant(
    state: web::Data<AppState>,
    body: web::Json<IntrospectRequest>,
) -> impl Responder {
    let result: VerificationResult = state
        .authority
        .verify(&body.artifact, &body.required_scope)
        .await;

    HttpResponse::Ok().json(result)
}

#[post("/actions/find_slot")]
async fn find_slot(state: web::Data<AppState>, req: HttpRequest, body: web::Bytes) -> HttpResponse {
    guarded(state.find_slot.as_ref(), &req, &body).await
}

#[post("/actions/current_time")]
async fn current_time(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> HttpResponse {
    guarded(state.current_time.as_ref(), &req, &body).await
}

#[post("/actions/convert_time")]
async fn convert_time(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> HttpResponse {
    guarded(state.convert_time.as_ref(), &req, &body).await
}

/// Run `action` for the bearer artifact on `req`, against its declared scope
async fn guarded<O: Operation>(
    action: &DelegatedAction<O>,
    req: &HttpRequest,
    body: &[u8],
) -> HttpResponse {
    let Some(artifact) = bearer_artifact(req) else {
        return denial_response(Denial::new(DenialReason::Unknown));
    };

    outcome_response(
        action
            .invoke_json(artifact, action.required_scope(), body)
            .await,
    )
}

/// Artifact from an `Authorization: Bearer …` header
pub fn bearer_artifact(req: &HttpRequest) -> Option<&str> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, artifact) = value.split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        debug!(scheme, "Unsupported authorization scheme");
        return None;
    }

    let artifact = artifact.trim();
    (!artifact.is_empty()).then_some(artifact)
}

fn outcome_response(outcome: ActionOutcome<serde_json::Value>) -> HttpResponse {
    match outcome {
        ActionOutcome::Completed(output) => HttpResponse::Ok().json(output),
        ActionOutcome::Denied(denial) => denial_response(denial),
        ActionOutcome::Failed(e) => {
            let status =
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::UNPROCESSABLE_ENTITY);
            HttpResponse::build(status).json(serde_json::json!({
                "error": e.code(),
                "message": e.to_string(),
            }))
        }
    }
}

fn denial_response(denial: Denial) -> HttpResponse {
    let status = StatusCode::from_u16(denial.reason.status_code()).unwrap_or(StatusCode::UNAUTHORIZED);
    let challenge = match denial.reason {
        DenialReason::ScopeMismatch => "Bearer error=\"insufficient_scope\"",
        _ => "Bearer error=\"invalid_token\"",
    };

    HttpResponse::build(status)
        .insert_header((header::WWW_AUTHENTICATE, challenge))
        .json(denial)
}

impl ResponseError for GrantError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(GrantError::status_code(self))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(ResponseError::status_code(self)).json(serde_json::json!({
            "error": self.to_string(),
        }))
    }
}

/// Build a rustls server configuration from PEM files
pub fn load_rustls_config(cert_path: &Path, key_path: &Path) -> Result<rustls::ServerConfig> {
    use std::{fs::File, io::BufReader};

    let open = |path: &Path| {
        File::open(path).map(BufReader::new).map_err(|e| {
            GrantError::ConfigError(format!("Failed to open {}: {}", path.display(), e))
        })
    };

    let certs = rustls_pemfile::certs(&mut open(cert_path)?)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| GrantError::ConfigError(format!("Invalid certificate PEM: {}", e)))?;
    if certs.is_empty() {
        return Err(GrantError::ConfigError(format!(
            "No certificates found in {}",
            cert_path.display()
        )));
    }

    let key = rustls_pemfile::private_key(&mut open(key_path)?)
        .map_err(|e| GrantError::ConfigError(format!("Invalid private key PEM: {}", e)))?
        .ok_or_else(|| {
            GrantError::ConfigError(format!("No private key found in {}", key_path.display()))
        })?;

    rustls::ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| GrantError::ConfigError(format!("TLS setup failed: {}", e)))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| GrantError::ConfigError(format!("TLS setup failed: {}", e)))
}
