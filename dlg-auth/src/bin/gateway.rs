//! Grant Gateway Binary
//!
//! HTTP server for grant issuance, introspection and the delegated calendar
//! actions. Configuration is read from the TOML file named by the first
//! argument or `DLG_CONFIG`, then from `DLG_*` variables.

use actix_web::{middleware, web, App, HttpServer};
use anyhow::{Context, Result};
use dlg_auth::{
    config::{GatewayConfig, LogFormat, LoggingConfig, TransportMode},
    gateway::{self, AppState},
    Authority, Calendar, Clock, GrantStore, SystemClock,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entry point
#[actix_web::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("DLG_CONFIG").ok())
        .map(PathBuf::from);
    let config = GatewayConfig::load(config_path.as_deref()).context("Failed to load configuration")?;

    init_tracing(&config.logging);
    info!(
        strategy = %config.authority.strategy,
        store = ?config.store.kind,
        transport = ?config.transport.mode,
        "Starting grant gateway"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = config.store.open().await.context("Failed to open grant store")?;
    let authority = Arc::new(
        Authority::from_config(&config.authority, store.clone(), clock.clone())
            .context("Failed to build grant authority")?,
    );

    if let Some(public_key) = authority.public_key_hex() {
        info!(public_key = %public_key, "Credential issuer key loaded");
    }

    if let Some(interval) = config.store.purge_interval {
        spawn_purge_task(store, clock.clone(), interval);
    }

    let state = AppState::new(
        authority,
        config.authority.default_ttl()?,
        Arc::new(Calendar::mock().context("Failed to build the demo calendar")?),
        clock,
    );

    let bind_addr = config.server.bind_address.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(middleware::Logger::default())
            .configure(gateway::configure)
    });

    let server = match config.transport.mode {
        TransportMode::Plaintext => {
            if !config.server.is_loopback() {
                warn!(
                    bind_address = %bind_addr,
                    "Serving bearer artifacts over plaintext on a non-loopback address"
                );
            }
            info!("Listening on http://{}", bind_addr);
            server.bind(&bind_addr)?
        }
        TransportMode::Tls => {
            let (cert_path, key_path) = match (&config.transport.cert_path, &config.transport.key_path) {
                (Some(cert), Some(key)) => (cert, key),
                _ => anyhow::bail!("TLS transport requires cert_path and key_path"),
            };
            let tls_config = gateway::load_rustls_config(cert_path, key_path)?;
            info!("Listening on https://{}", bind_addr);
            server.bind_rustls_0_23(&bind_addr, tls_config)?
        }
    };

    server.run().await?;

    info!("Grant gateway stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));

    match logging.format {
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

fn spawn_purge_task(store: Arc<dyn GrantStore>, clock: Arc<dyn Clock>, every: Duration) {
    actix_web::rt::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match store.purge_expired(clock.now()).await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "Purged expired grants"),
                Err(e) => error!(error = %e, "Failed to purge expired grants"),
            }
        }
    });
}
