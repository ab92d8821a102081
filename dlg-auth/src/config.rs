//! Gateway configuration
//!
//! Loaded from a TOML file, then overridden from `DLG_*` environment
//! variables (a `.env` file is honoured). Every section has defaults, so an
//! empty file or no file at all yields a working local setup.

use crate::{
    authority::Strategy,
    error::{GrantError, Result},
    issuer::IssuancePolicy,
    store::{FileGrantStore, GrantStore, InMemoryGrantStore},
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Top-level gateway configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Listener settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Grant strategy and issuance limits
    #[serde(default)]
    pub authority: AuthorityConfig,
    /// Grant storage
    #[serde(default)]
    pub store: StoreConfig,
    /// Transport confidentiality
    #[serde(default)]
    pub transport: TransportConfig,
    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind, `host:port`
    #[serde(default = "ServerConfig::default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: Self::default_bind_address(),
        }
    }
}

impl ServerConfig {
    fn default_bind_address() -> String {
        "127.0.0.1:8080".to_string()
    }

    /// Whether the listener only accepts local connections
    pub fn is_loopback(&self) -> bool {
        match self.bind_address.parse::<SocketAddr>() {
            Ok(addr) => addr.ip().is_loopback(),
            Err(_) => self.bind_address.starts_with("localhost:"),
        }
    }
}

/// Grant strategy and issuance limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityConfig {
    /// `bearer` or `credential`
    #[serde(default)]
    pub strategy: Strategy,

    /// Issuer name written into signed credentials
    #[serde(default = "AuthorityConfig::default_issuer")]
    pub issuer: String,

    /// Lifetime used when a request names none
    #[serde(default = "AuthorityConfig::fallback_ttl", with = "humantime_serde")]
    pub default_ttl: Duration,

    /// Upper bound on requested lifetimes
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub max_ttl: Option<Duration>,

    /// Hex-encoded 32-byte Ed25519 seed; a fresh key is generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_key: Option<String>,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            issuer: Self::default_issuer(),
            default_ttl: Self::fallback_ttl(),
            max_ttl: None,
            signing_key: None,
        }
    }
}

impl AuthorityConfig {
    fn default_issuer() -> String {
        "dlg-gateway".to_string()
    }

    fn fallback_ttl() -> Duration {
        Duration::from_secs(crate::DEFAULT_TTL_SECS)
    }

    /// Default lifetime as a signed duration
    pub fn default_ttl(&self) -> Result<chrono::Duration> {
        to_chrono(self.default_ttl, "authority.default_ttl")
    }

    /// Issuance limits derived from this section
    pub fn issuance_policy(&self) -> Result<IssuancePolicy> {
        match self.max_ttl {
            Some(max_ttl) => Ok(IssuancePolicy::with_max_ttl(to_chrono(
                max_ttl,
                "authority.max_ttl",
            )?)),
            None => Ok(IssuancePolicy::default()),
        }
    }
}

/// Where bearer grants live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// Process memory; lost on restart
    #[default]
    Memory,
    /// JSON document on disk
    File,
}

/// Grant storage settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend
    #[serde(default)]
    pub kind: StoreKind,

    /// Document path for the file backend
    #[serde(default = "StoreConfig::default_path")]
    pub path: PathBuf,

    /// How often expired grants are purged; never when absent
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub purge_interval: Option<Duration>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            path: Self::default_path(),
            purge_interval: None,
        }
    }
}

impl StoreConfig {
    fn default_path() -> PathBuf {
        PathBuf::from("grants.json")
    }

    /// Open the configured backend
    pub async fn open(&self) -> Result<Arc<dyn GrantStore>> {
        match self.kind {
            StoreKind::Memory => Ok(Arc::new(InMemoryGrantStore::new())),
            StoreKind::File => Ok(Arc::new(FileGrantStore::open(&self.path).await?)),
        }
    }
}

/// Listener transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    /// Plain HTTP
    #[default]
    Plaintext,
    /// HTTPS via rustls
    Tls,
}

/// Transport confidentiality settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// `plaintext` or `tls`
    #[serde(default)]
    pub mode: TransportMode,

    /// PEM certificate chain, required for `tls`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_path: Option<PathBuf>,

    /// PEM private key, required for `tls`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<PathBuf>,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Log settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Output format
    #[serde(default)]
    pub format: LogFormat,

    /// `EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default = "LoggingConfig::default_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: Self::default_filter(),
        }
    }
}

impl LoggingConfig {
    fn default_filter() -> String {
        "info".to_string()
    }
}

impl GatewayConfig {
    /// Load from `path` (defaults when `None` or missing), then apply the
    /// environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    GrantError::ConfigError(format!(
                        "Failed to read config {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Self::from_toml_str(&content)?
            }
            _ => Self::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| GrantError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| GrantError::ConfigError(format!("Failed to serialize config: {}", e)))
    }

    /// Apply `DLG_*` overrides read through `lookup`
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind_address) = lookup("DLG_BIND_ADDRESS") {
            self.server.bind_address = bind_address;
        }
        if let Some(strategy) = lookup("DLG_STRATEGY") {
            self.authority.strategy = strategy.parse()?;
        }
        if let Some(issuer) = lookup("DLG_ISSUER") {
            self.authority.issuer = issuer;
        }
        if let Some(ttl) = lookup("DLG_DEFAULT_TTL") {
            self.authority.default_ttl = parse_duration("DLG_DEFAULT_TTL", &ttl)?;
        }
        if let Some(ttl) = lookup("DLG_MAX_TTL") {
            self.authority.max_ttl = Some(parse_duration("DLG_MAX_TTL", &ttl)?);
        }
        if let Some(key) = lookup("DLG_SIGNING_KEY") {
            self.authority.signing_key = Some(key);
        }
        if let Some(kind) = lookup("DLG_STORE_KIND") {
            self.store.kind = match kind.to_ascii_lowercase().as_str() {
                "memory" => StoreKind::Memory,
                "file" => StoreKind::File,
                other => {
                    return Err(GrantError::ConfigError(format!(
                        "Invalid DLG_STORE_KIND: {}",
                        other
                    )))
                }
            };
        }
        if let Some(path) = lookup("DLG_STORE_PATH") {
            self.store.path = PathBuf::from(path);
        }
        if let Some(interval) = lookup("DLG_PURGE_INTERVAL") {
            self.store.purge_interval = Some(parse_duration("DLG_PURGE_INTERVAL", &interval)?);
        }
        if let Some(mode) = lookup("DLG_TRANSPORT_MODE") {
            self.transport.mode = match mode.to_ascii_lowercase().as_str() {
                "plaintext" => TransportMode::Plaintext,
                "tls" => TransportMode::Tls,
                other => {
                    return Err(GrantError::ConfigError(format!(
                        "Invalid DLG_TRANSPORT_MODE: {}",
                        other
                    )))
                }
            };
        }
        if let Some(path) = lookup("DLG_TLS_CERT") {
            self.transport.cert_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("DLG_TLS_KEY") {
            self.transport.key_path = Some(PathBuf::from(path));
        }
        if let Some(format) = lookup("DLG_LOG_FORMAT") {
            self.logging.format = match format.to_ascii_lowercase().as_str() {
                "pretty" => LogFormat::Pretty,
                "json" => LogFormat::Json,
                other => {
                    return Err(GrantError::ConfigError(format!(
                        "Invalid DLG_LOG_FORMAT: {}",
                        other
                    )))
                }
            };
        }

        Ok(())
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.authority.default_ttl.is_zero() {
            return Err(GrantError::ConfigError(
                "authority.default_ttl must be positive".to_string(),
            ));
        }

        if let Some(max_ttl) = self.authority.max_ttl {
            if self.authority.default_ttl > max_ttl {
                return Err(GrantError::ConfigError(format!(
                    "authority.default_ttl ({}) exceeds authority.max_ttl ({})",
                    humantime_serde::re::humantime::format_duration(self.authority.default_ttl),
                    humantime_serde::re::humantime::format_duration(max_ttl)
                )));
            }
        }

        if let Some(interval) = self.store.purge_interval {
            if interval.is_zero() {
                return Err(GrantError::ConfigError(
                    "store.purge_interval must be positive".to_string(),
                ));
            }
        }

        if self.transport.mode == TransportMode::Tls
            && (self.transport.cert_path.is_none() || self.transport.key_path.is_none())
        {
            return Err(GrantError::ConfigError(
                "transport.mode = \"tls\" requires transport.cert_path and transport.key_path"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_duration(key: &str, raw: &str) -> Result<Duration> {
    humantime_serde::re::humantime::parse_duration(raw.trim())
        .map_err(|e| GrantError::ConfigError(format!("Invalid {}: {}", key, e)))
}

fn to_chrono(duration: Duration, key: &str) -> Result<chrono::Duration> {
    chrono::Duration::from_std(duration)
        .map_err(|e| GrantError::ConfigError(format!("{} out of range: {}", key, e)))
}
