//! Faucet configuration

use crate::error::{FaucetError, FaucetResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use trickle_common::utils::logging::LoggingConfig;
use trickle_common::utils::retry::RetryPolicy;

/// Faucet service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FaucetConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub payout: PayoutConfig,
    pub ledger: LedgerConfig,
    pub error_tracking: ErrorTrackingConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub addr: String,

    /// Enable permissive CORS
    pub cors_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:3000".to_string(),
            cors_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProviderKind {
    Supabase,
    Static,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub provider: AuthProviderKind,

    /// Supabase project URL
    pub supabase_url: Option<String>,

    /// Supabase anon (public) key, sent as `apikey`
    pub supabase_anon_key: Option<String>,

    /// token -> user id, used by the static provider
    pub static_tokens: HashMap<String, String>,

    /// Identity lookup timeout (seconds)
    pub timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            provider: AuthProviderKind::Supabase,
            supabase_url: None,
            supabase_anon_key: None,
            static_tokens: HashMap::new(),
            timeout_secs: 5,
        }
    }
}

impl AuthConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PayoutConfig {
    /// FaucetPay send endpoint
    pub api_url: String,

    /// FaucetPay API key. Claims fail with a configuration error while unset.
    pub api_key: Option<String>,

    /// Upper bound for one payout request (seconds)
    pub timeout_secs: u64,

    /// Extra attempts when the connection could not be established
    pub connect_retries: usize,

    /// Backoff before the first connect retry (milliseconds)
    pub retry_base_delay_ms: u64,
}

impl Default for PayoutConfig {
    fn default() -> Self {
        Self {
            api_url: "https://faucetpay.io/api/v1/send".to_string(),
            api_key: None,
            timeout_secs: 10,
            connect_retries: 2,
            retry_base_delay_ms: 200,
        }
    }
}

impl PayoutConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.connect_retries + 1,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }

    /// Longest a single payout can take: every attempt timing out plus the
    /// backoff between attempts.
    pub fn worst_case_duration(&self) -> Duration {
        let policy = self.retry_policy();
        let attempts = policy.max_attempts.max(1);
        let backoff = (1..attempts).fold(Duration::ZERO, |total, attempt| {
            total.saturating_add(policy.delay_for(attempt))
        });
        self.timeout()
            .saturating_mul(attempts as u32)
            .saturating_add(backoff)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    Memory,
    Sled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub backend: LedgerBackend,

    /// Database path for the sled backend
    pub db_path: PathBuf,

    /// How long an unfinished claim blocks the same user (seconds)
    pub pending_ttl_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::Memory,
            db_path: PathBuf::from("./trickle_data"),
            pending_ttl_secs: 300,
        }
    }
}

impl LedgerConfig {
    pub fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorTrackingConfig {
    /// Where error events are POSTed; events are only logged when unset
    pub webhook_url: Option<String>,

    pub environment: String,

    pub project_id: Option<String>,
}

impl Default for ErrorTrackingConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            environment: "development".to_string(),
            project_id: None,
        }
    }
}

impl FaucetConfig {
    /// Reject settings under which a live reservation could be taken over
    /// while its payout is still in flight.
    pub fn validate(&self) -> FaucetResult<()> {
        let pending_ttl = self.ledger.pending_ttl();
        let worst_case = self.payout.worst_case_duration();
        if pending_ttl <= worst_case {
            return Err(FaucetError::ServiceMisconfigured(format!(
                "ledger.pending_ttl_secs ({}s) must exceed the longest payout ({}s)",
                pending_ttl.as_secs(),
                worst_case.as_secs_f64()
            )));
        }
        Ok(())
    }

    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from `lookup`; empty values are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(addr) = var("TRICKLE_SERVER_ADDR") {
            self.server.addr = addr;
        }

        if let Some(key) = var("FAUCETPAY_API_KEY") {
            self.payout.api_key = Some(key);
        }

        if let Some(url) = var("FAUCETPAY_API_URL") {
            self.payout.api_url = url;
        }

        if let Some(url) = var("SUPABASE_URL") {
            self.auth.supabase_url = Some(url);
        }

        if let Some(key) = var("SUPABASE_ANON_KEY") {
            self.auth.supabase_anon_key = Some(key);
        }

        if let Some(backend) = var("TRICKLE_LEDGER_BACKEND") {
            match backend.to_lowercase().as_str() {
                "sled" => self.ledger.backend = LedgerBackend::Sled,
                "memory" => self.ledger.backend = LedgerBackend::Memory,
                other => tracing::warn!("Ignoring unknown ledger backend '{}'", other),
            }
        }

        if let Some(path) = var("TRICKLE_DB_PATH") {
            self.ledger.db_path = PathBuf::from(path);
        }

        if let Some(url) = var("ERROR_WEBHOOK_URL") {
            self.error_tracking.webhook_url = Some(url);
        }

        if let Some(env) = var("APP_ENV") {
            self.error_tracking.environment = env;
        }

        if let Some(project) = var("PROJECT_ID") {
            self.error_tracking.project_id = Some(project);
        }

        if let Some(level) = var("TRICKLE_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(format) = var("TRICKLE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}
