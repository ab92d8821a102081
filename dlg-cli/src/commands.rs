//! CLI command implementations
//!
//! Remote commands talk to a running gateway over HTTP. `demo` wires the
//! authority and the calendar action together in-process.

use anyhow::{anyhow, Context, Result};
use chrono::{Duration, Utc};
use dlg_auth::{
    config::AuthorityConfig,
    scope::{CALENDAR_EDIT, CALENDAR_VIEW},
    ActionOutcome, Authority, Calendar, Clock, DelegatedAction, FindSlot, FindSlotRequest,
    GrantIssuer, GrantStore, GrantVerifier, InMemoryGrantStore, ManualClock, Scope, Strategy,
    Subject,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Minimal HTTP client for the gateway routes
struct GatewayClient {
    base_url: String,
    http: reqwest::Client,
}

impl GatewayClient {
    fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn post(&self, path: &str, artifact: Option<&str>, body: &Value) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "POST");

        let mut request = self.http.post(&url).json(body);
        if let Some(artifact) = artifact {
            request = request.bearer_auth(artifact);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to reach gateway at {}", self.base_url))?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .context("Gateway returned a non-JSON body")?;

        if !status.is_success() {
            return Err(anyhow!(
                "Gateway answered {}: {}",
                status,
                serde_json::to_string_pretty(&body)?
            ));
        }

        Ok(body)
    }
}

/// Execute the issue command
pub async fn execute_issue(
    gateway: &str,
    subject: String,
    scope: String,
    ttl: Option<i64>,
) -> Result<()> {
    let scope = Scope::parse(&scope)?;
    info!(subject = %subject, scope = %scope, "Requesting grant");

    let body = GatewayClient::new(gateway)
        .post(
            "/v1/grants",
            None,
            &json!({ "subject": subject, "scope": scope, "ttl_seconds": ttl }),
        )
        .await?;

    print_json(&body)
}

/// Execute the introspect command
pub async fn execute_introspect(gateway: &str, artifact: String, scope: String) -> Result<()> {
    let body = GatewayClient::new(gateway)
        .post(
            "/v1/grants/introspect",
            None,
            &json!({ "artifact": artifact, "required_scope": scope }),
        )
        .await?;

    print_json(&body)
}

/// Execute the find-slot command
pub async fn execute_find_slot(gateway: &str, artifact: String, duration: i64) -> Result<()> {
    let body = GatewayClient::new(gateway)
        .post(
            "/v1/actions/find_slot",
            Some(&artifact),
            &json!({ "duration_minutes": duration }),
        )
        .await?;

    print_json(&body)
}

/// Execute the current-time command
pub async fn execute_current_time(gateway: &str, artifact: String, timezone: String) -> Result<()> {
    let body = GatewayClient::new(gateway)
        .post(
            "/v1/actions/current_time",
            Some(&artifact),
            &json!({ "timezone": timezone }),
        )
        .await?;

    print_json(&body)
}

/// Execute the convert-time command
pub async fn execute_convert_time(
    gateway: &str,
    artifact: String,
    time: String,
    from: String,
    to: String,
) -> Result<()> {
    let body = GatewayClient::new(gateway)
        .post(
            "/v1/actions/convert_time",
            Some(&artifact),
            &json!({ "source_timezone": from, "time": time, "target_timezone": to }),
        )
        .await?;

    print_json(&body)
}

/// Run the whole flow in-process
///
/// Issues a one-hour `calendar.view` grant, then shows a successful slot
/// lookup, a scope mismatch, and an expiry after the clock is moved past the
/// grant's lifetime.
pub async fn run_demo(strategy: Strategy, subject: String) -> Result<()> {
    let clock = ManualClock::new(Utc::now());
    let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
    let store: Arc<dyn GrantStore> = Arc::new(InMemoryGrantStore::new());

    let config = AuthorityConfig {
        strategy,
        ..AuthorityConfig::default()
    };
    let authority = Arc::new(Authority::from_config(&config, store, shared_clock)?);
    let verifier: Arc<dyn GrantVerifier> = authority.clone();
    let calendar = Calendar::mock().ok_or_else(|| anyhow!("Failed to build the demo calendar"))?;
    let action = DelegatedAction::new(verifier, FindSlot::new(Arc::new(calendar)));

    println!("== strategy: {} ==", strategy);

    let grant = authority
        .issue(
            Subject::new(subject)?,
            Scope::new([CALENDAR_VIEW])?,
            Duration::hours(1),
        )
        .await?;
    let artifact = grant.artifact()?;
    println!(
        "issued grant {} for {} [{}], expires {}",
        grant.id, grant.subject, grant.scope, grant.expires_at
    );
    println!("artifact: {}", artifact);

    report(
        "find_slot with calendar.view",
        action
            .invoke(&artifact, CALENDAR_VIEW, FindSlotRequest::default())
            .await,
    )?;
    report(
        "find_slot with calendar.edit",
        action
            .invoke(&artifact, CALENDAR_EDIT, FindSlotRequest::default())
            .await,
    )?;

    clock.advance(Duration::minutes(61));
    report(
        "find_slot after 61 minutes",
        action
            .invoke(&artifact, CALENDAR_VIEW, FindSlotRequest::default())
            .await,
    )?;

    Ok(())
}

fn report<T: serde::Serialize>(label: &str, outcome: ActionOutcome<T>) -> Result<()> {
    let rendered = match outcome {
        ActionOutcome::Completed(output) => serde_json::to_string(&output)?,
        ActionOutcome::Denied(denial) => serde_json::to_string(&denial)?,
        ActionOutcome::Failed(e) => format!("failed: {}", e),
    };

    println!("{:<32} -> {}", label, rendered);
    Ok(())
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
