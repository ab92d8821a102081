//! Common test utilities shared across integration and E2E tests

use chrono::{TimeZone, Utc};
use dlg_auth::{
    config::AuthorityConfig, gateway::AppState, Authority, Calendar, Clock, GrantStore,
    InMemoryGrantStore, ManualClock, Strategy,
};
use std::sync::Arc;

/// Both grant strategies, for tests that must hold for each
pub const STRATEGIES: [Strategy; 2] = [Strategy::Bearer, Strategy::Credential];

/// Setup logging for tests
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

/// Authority wired to a manual clock and an in-memory store
pub struct TestAuthority {
    /// Authority under test
    pub authority: Arc<Authority>,
    /// Handle that moves the authority's time
    pub clock: ManualClock,
    /// Store shared with the authority
    pub store: Arc<dyn GrantStore>,
}

impl TestAuthority {
    /// Build one for `strategy`, frozen at 2025-03-01T08:00:00Z
    pub fn new(strategy: Strategy) -> Self {
        Self::with_store(strategy, Arc::new(InMemoryGrantStore::new()))
    }

    /// Build one over an existing store
    pub fn with_store(strategy: Strategy, store: Arc<dyn GrantStore>) -> Self {
        let clock = ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0)
                .single()
                .unwrap_or_else(Utc::now),
        );
        let config = AuthorityConfig {
            strategy,
            issuer: "did:example:issuer".to_string(),
            ..AuthorityConfig::default()
        };

        let authority = Authority::from_config(&config, store.clone(), Arc::new(clock.clone()))
            .expect("authority config is valid");

        Self {
            authority: Arc::new(authority),
            clock,
            store,
        }
    }

    /// Gateway state over this authority and the mock calendar
    pub fn app_state(&self) -> AppState {
        let clock: Arc<dyn Clock> = Arc::new(self.clock.clone());
        AppState::new(
            self.authority.clone(),
            chrono::Duration::hours(1),
            Arc::new(Calendar::mock().unwrap()),
            clock,
        )
    }
}
