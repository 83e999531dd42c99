//! Faucet service core logic

use crate::clock::{Clock, SystemClock};
use crate::config::{FaucetConfig, LedgerBackend};
use crate::error::{FaucetError, FaucetResult, ADDRESS_REQUIRED, PAYOUT_REJECTED_FALLBACK};
use crate::identity::{provider_from_config, Identity, IdentityProvider};
use crate::ledger::{
    ceil_secs, CooldownLedger, CooldownStore, MemoryStore, Reservation, SledStore,
};
use crate::metrics::FaucetMetrics;
use crate::payout::{FaucetPayClient, PayoutOutcome, PayoutRequest, PayoutService};
use crate::reporter::{reporter_from_config, ErrorReporter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const CLAIM_SUCCESS_MESSAGE: &str = "Faucet reward claimed successfully!";
pub const API_KEY_MISSING: &str = "FaucetPay API key not configured";

/// Claim request body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClaimRequest {
    #[serde(default, alias = "faucetPayAddress")]
    pub destination_address: Option<String>,
}

/// Successful claim response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    pub message: String,
    /// Raw payout service response
    pub data: Value,
}

/// Cooldown state for the authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownStatus {
    pub eligible: bool,
    pub remaining_seconds: u64,
    pub cooldown_seconds: u64,
}

/// Collaborators a [`FaucetService`] is assembled from
pub struct ServiceParts {
    pub ledger: CooldownLedger,
    pub identity: Arc<dyn IdentityProvider>,
    pub payout: Arc<dyn PayoutService>,
    /// Credential for the payout service; claims fail while it is missing
    pub payout_api_key: Option<String>,
    pub reporter: Arc<dyn ErrorReporter>,
    pub clock: Arc<dyn Clock>,
}

/// Faucet service
pub struct FaucetService {
    ledger: CooldownLedger,
    identity: Arc<dyn IdentityProvider>,
    payout: Arc<dyn PayoutService>,
    payout_api_key: Option<String>,
    reporter: Arc<dyn ErrorReporter>,
    clock: Arc<dyn Clock>,
    metrics: FaucetMetrics,
}

impl FaucetService {
    pub fn new(parts: ServiceParts) -> FaucetResult<Self> {
        Ok(Self {
            ledger: parts.ledger,
            identity: parts.identity,
            payout: parts.payout,
            payout_api_key: parts.payout_api_key.filter(|key| !key.is_empty()),
            reporter: parts.reporter,
            clock: parts.clock,
            metrics: FaucetMetrics::new()?,
        })
    }

    /// Wire up production collaborators from configuration
    pub fn from_config(config: &FaucetConfig) -> FaucetResult<Self> {
        config.validate()?;

        let store: Arc<dyn CooldownStore> = match config.ledger.backend {
            LedgerBackend::Memory => Arc::new(MemoryStore::new()),
            LedgerBackend::Sled => Arc::new(SledStore::open(&config.ledger.db_path)?),
        };
        let ledger = CooldownLedger::new(store).with_pending_ttl(config.ledger.pending_ttl());

        if config.payout.api_key.is_none() {
            warn!("{}; claims will fail until it is set", API_KEY_MISSING);
        }

        Self::new(ServiceParts {
            ledger,
            identity: provider_from_config(&config.auth)?,
            payout: Arc::new(FaucetPayClient::new(&config.payout)?),
            payout_api_key: config.payout.api_key.clone(),
            reporter: reporter_from_config(&config.error_tracking)?,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn ledger(&self) -> &CooldownLedger {
        &self.ledger
    }

    pub fn metrics(&self) -> &FaucetMetrics {
        &self.metrics
    }

    /// Resolve the caller; a missing credential is `Unauthorized`.
    pub async fn authenticate(&self, token: Option<&str>) -> FaucetResult<Identity> {
        let token = token.ok_or_else(|| FaucetError::unauthorized("Missing Authorization header"))?;
        self.identity.authenticate(token).await
    }

    /// Handle one claim. Internal failures are reported before being returned.
    pub async fn claim(
        &self,
        token: Option<&str>,
        request: Option<ClaimRequest>,
    ) -> FaucetResult<ClaimReceipt> {
        let result = self.process_claim(token, request).await;

        match &result {
            Ok(_) => self.metrics.record_outcome("success"),
            Err(e) => {
                self.metrics.record_outcome(e.outcome());
                if e.is_internal() {
                    self.reporter.capture(e, "claim");
                } else {
                    debug!("Claim refused: {}", e);
                }
            }
        }
        result
    }

    async fn process_claim(
        &self,
        token: Option<&str>,
        request: Option<ClaimRequest>,
    ) -> FaucetResult<ClaimReceipt> {
        let identity = self.authenticate(token).await?;

        let address = request
            .and_then(|r| r.destination_address)
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .ok_or_else(|| FaucetError::InvalidArgument(ADDRESS_REQUIRED.to_string()))?;

        // The check time is also the time recorded on success.
        let now = self.clock.now_ms();
        let reservation = self.ledger.reserve(&identity, now)?;

        // Dropping the reservation on any early return releases it.
        let api_key = self
            .payout_api_key
            .as_deref()
            .ok_or_else(|| FaucetError::ServiceMisconfigured(API_KEY_MISSING.to_string()))?;

        info!(%identity, to = %address, "Submitting payout");
        let payout_request = PayoutRequest::disbursement(api_key, address.as_str());

        // Once the request may reach the payout service the outcome must be
        // settled in the ledger, even if the caller goes away.
        let payout = Arc::clone(&self.payout);
        let payout_duration = self.metrics.payout_duration.clone();
        let settlement = tokio::spawn(async move {
            let timer = payout_duration.start_timer();
            let outcome = payout.send(&payout_request).await;
            timer.observe_duration();
            settle(reservation, outcome)
        });

        settlement
            .await
            .map_err(|e| FaucetError::Internal(format!("payout task failed: {}", e)))?
    }

    /// How long the caller still has to wait
    pub async fn cooldown_status(&self, token: Option<&str>) -> FaucetResult<CooldownStatus> {
        let result = self.lookup_cooldown(token).await;
        if let Err(e) = &result {
            if e.is_internal() {
                self.reporter.capture(e, "cooldown_status");
            }
        }
        result
    }

    async fn lookup_cooldown(&self, token: Option<&str>) -> FaucetResult<CooldownStatus> {
        let identity = self.authenticate(token).await?;
        let remaining = self.ledger.remaining_cooldown(&identity, self.clock.now_ms())?;

        Ok(CooldownStatus {
            eligible: remaining.is_zero(),
            remaining_seconds: ceil_secs(remaining),
            cooldown_seconds: self.ledger.cooldown().as_secs(),
        })
    }
}

/// Record the payout outcome against the reservation taken for it
fn settle(
    reservation: Reservation,
    outcome: FaucetResult<PayoutOutcome>,
) -> FaucetResult<ClaimReceipt> {
    // Unreachable service: dropping the reservation releases it.
    match outcome? {
        PayoutOutcome::Accepted(data) => {
            let identity = reservation.identity().clone();
            reservation.commit()?;
            info!(%identity, "Faucet reward claimed");
            Ok(ClaimReceipt {
                message: CLAIM_SUCCESS_MESSAGE.to_string(),
                data,
            })
        }
        PayoutOutcome::Rejected {
            message,
            details,
            retryable,
            ..
        } => {
            reservation.release()?;
            Err(FaucetError::PayoutRejected {
                message: message.unwrap_or_else(|| PAYOUT_REJECTED_FALLBACK.to_string()),
                details,
                retryable,
            })
        }
    }
}
