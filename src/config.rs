use once_cell::sync::Lazy;
use std::time::Duration;

use crate::checkout::models::TierPlan;

/// Base URL of the application backend. Defaults to `http://localhost:8080`.
pub static API_URL: Lazy<String> = Lazy::new(|| {
    read_optional_env("API_URL").unwrap_or_else(|| "http://localhost:8080".to_string())
});

/// Whether checkout is enabled for this deployment. Defaults to `false`.
pub static PAYMENTS_ENABLED: Lazy<bool> =
    Lazy::new(|| parse_flag(std::env::var("PAYMENTS_ENABLED").ok().as_deref()));

/// Raw `Cookie` header forwarded with every backend request. Issued by the auth service.
pub static SESSION_COOKIE: Lazy<Option<String>> = Lazy::new(|| read_optional_env("SESSION_COOKIE"));

/// Route the user is sent to once reconciliation finishes. Defaults to `/dash`.
pub static DASHBOARD_ROUTE: Lazy<String> =
    Lazy::new(|| read_optional_env("DASHBOARD_ROUTE").unwrap_or_else(|| "/dash".to_string()));

/// key: reconciler-config -> delay between verify-session attempts while the session is open
pub static SESSION_POLL_INTERVAL_MS: Lazy<u64> =
    Lazy::new(|| read_positive_millis("SESSION_POLL_INTERVAL_MS", 3000));

/// key: reconciler-config -> profile refresh cadence while waiting for the tier to change
pub static TIER_POLL_INTERVAL_MS: Lazy<u64> =
    Lazy::new(|| read_positive_millis("TIER_POLL_INTERVAL_MS", 2000));

/// key: reconciler-config -> upper bound on the tier wait before redirecting anyway
pub static TIER_MAX_WAIT_MS: Lazy<u64> = Lazy::new(|| read_positive_millis("TIER_MAX_WAIT_MS", 10_000));

/// key: reconciler-config -> pause between detecting the new tier and redirecting
pub static TIER_SETTLE_DELAY_MS: Lazy<u64> =
    Lazy::new(|| read_positive_millis("TIER_SETTLE_DELAY_MS", 2000));

/// Per-request timeout for backend calls, in seconds. Defaults to `10`.
pub static REQUEST_TIMEOUT_SECS: Lazy<u64> = Lazy::new(|| {
    std::env::var("REQUEST_TIMEOUT_SECS")
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(10)
});

/// Active subscription tiers, provided as a JSON array via `TIERS_JSON`.
pub static ACTIVE_TIERS: Lazy<Vec<TierPlan>> =
    Lazy::new(|| parse_tiers(std::env::var("TIERS_JSON").ok().as_deref()));

/// Timing and feature switches for one reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    pub payments_enabled: bool,
    pub session_poll_interval: Duration,
    pub tier_poll_interval: Duration,
    pub tier_max_wait: Duration,
    pub settle_delay: Duration,
    pub dashboard_route: String,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            payments_enabled: true,
            session_poll_interval: Duration::from_millis(3000),
            tier_poll_interval: Duration::from_millis(2000),
            tier_max_wait: Duration::from_millis(10_000),
            settle_delay: Duration::from_millis(2000),
            dashboard_route: "/dash".to_string(),
        }
    }
}

impl ReconcilerConfig {
    pub fn from_env() -> Self {
        Self {
            payments_enabled: *PAYMENTS_ENABLED,
            session_poll_interval: Duration::from_millis(*SESSION_POLL_INTERVAL_MS),
            tier_poll_interval: Duration::from_millis(*TIER_POLL_INTERVAL_MS),
            tier_max_wait: Duration::from_millis(*TIER_MAX_WAIT_MS),
            settle_delay: Duration::from_millis(*TIER_SETTLE_DELAY_MS),
            dashboard_route: DASHBOARD_ROUTE.clone(),
        }
    }
}

/// Connection settings for [`crate::checkout::BackendClient`].
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub api_url: String,
    pub session_cookie: Option<String>,
    pub request_timeout: Duration,
}

impl BackendConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            session_cookie: None,
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_session_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.session_cookie = Some(cookie.into());
        self
    }

    pub fn from_env() -> Self {
        Self {
            api_url: API_URL.clone(),
            session_cookie: SESSION_COOKIE.clone(),
            request_timeout: Duration::from_secs(*REQUEST_TIMEOUT_SECS),
        }
    }
}

fn read_optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_positive_millis(key: &str, default_value: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default_value)
}

fn parse_flag(raw: Option<&str>) -> bool {
    raw.map(|value| {
        let normalized = value.trim().to_ascii_lowercase();
        matches!(normalized.as_str(), "1" | "true" | "yes")
    })
    .unwrap_or(false)
}

fn parse_tiers(raw: Option<&str>) -> Vec<TierPlan> {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Vec::new();
    };
    match serde_json::from_str(raw) {
        Ok(tiers) => tiers,
        Err(err) => {
            tracing::error!(?err, "failed to parse TIERS_JSON; continuing without a tier catalog");
            Vec::new()
        }
    }
}
