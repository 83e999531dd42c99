//! Client for the external payout service (FaucetPay)

use crate::config::PayoutConfig;
use crate::error::{FaucetError, FaucetResult};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};
use trickle_common::utils::retry::{retry_async, RetryPolicy};

/// Amount sent per successful claim
pub const DISBURSEMENT_AMOUNT: &str = "0.000001";

/// Currency of every disbursement
pub const DISBURSEMENT_CURRENCY: &str = "BTC";

/// The service's own success code, carried in the response body
pub const PAYOUT_SUCCESS_STATUS: i64 = 200;

/// Body of a FaucetPay `send` call
#[derive(Clone, Serialize)]
pub struct PayoutRequest {
    #[serde(rename = "api_key")]
    pub credential: String,
    pub amount: String,
    #[serde(rename = "to")]
    pub destination_address: String,
    pub currency: String,
}

impl PayoutRequest {
    /// The fixed faucet disbursement to `destination_address`
    pub fn disbursement(credential: impl Into<String>, destination_address: impl Into<String>) -> Self {
        Self {
            credential: credential.into(),
            amount: DISBURSEMENT_AMOUNT.to_string(),
            destination_address: destination_address.into(),
            currency: DISBURSEMENT_CURRENCY.to_string(),
        }
    }
}

impl fmt::Debug for PayoutRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayoutRequest")
            .field("credential", &"<redacted>")
            .field("amount", &self.amount)
            .field("destination_address", &self.destination_address)
            .field("currency", &self.currency)
            .finish()
    }
}

/// What the payout service said about a request it received
#[derive(Debug, Clone, PartialEq)]
pub enum PayoutOutcome {
    /// Funds sent; carries the raw response body
    Accepted(Value),
    Rejected {
        status: Option<i64>,
        message: Option<String>,
        details: Value,
        /// Server-side failure that may succeed later; 4xx-class codes are terminal
        retryable: bool,
    },
}

#[async_trait]
pub trait PayoutService: Send + Sync {
    /// `Ok` whenever the service answered; `PayoutUnavailable` when it could
    /// not be reached in time.
    async fn send(&self, request: &PayoutRequest) -> FaucetResult<PayoutOutcome>;
}

pub struct FaucetPayClient {
    api_url: String,
    timeout: Duration,
    retry_policy: RetryPolicy,
    client: reqwest::Client,
}

impl FaucetPayClient {
    pub fn new(config: &PayoutConfig) -> FaucetResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| FaucetError::Internal(format!("Failed to build payout client: {}", e)))?;

        Ok(Self {
            api_url: config.api_url.clone(),
            timeout: config.timeout(),
            retry_policy: config.retry_policy(),
            client,
        })
    }

    fn unavailable(&self, error: reqwest::Error) -> FaucetError {
        if error.is_timeout() {
            FaucetError::PayoutUnavailable(format!(
                "no response within {}s",
                self.timeout.as_secs_f64()
            ))
        } else {
            FaucetError::PayoutUnavailable(error.to_string())
        }
    }
}

#[async_trait]
impl PayoutService for FaucetPayClient {
    async fn send(&self, request: &PayoutRequest) -> FaucetResult<PayoutOutcome> {
        debug!(?request, "Sending payout request");

        // Only connection failures are retried: the request never left this
        // process, so it cannot have been paid out.
        let response = retry_async(
            || self.client.post(&self.api_url).json(request).send(),
            self.retry_policy,
            "faucetpay_send",
            |e: &reqwest::Error| e.is_connect(),
        )
        .await
        .map_err(|e| self.unavailable(e))?;

        let http_status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| self.unavailable(e))?;

        let outcome = classify_response(http_status, &body)?;
        match &outcome {
            PayoutOutcome::Accepted(_) => {
                info!(to = %request.destination_address, "Payout accepted")
            }
            PayoutOutcome::Rejected { status, message, retryable, .. } => warn!(
                to = %request.destination_address,
                ?status,
                ?message,
                retryable,
                "Payout rejected"
            ),
        }
        Ok(outcome)
    }
}

/// Interpret a payout response. Success is signalled only by `status: 200`
/// in the JSON body.
pub fn classify_response(http_status: u16, body: &[u8]) -> FaucetResult<PayoutOutcome> {
    let json: Value = match serde_json::from_slice(body) {
        Ok(json) => json,
        Err(_) if http_status >= 500 => {
            return Err(FaucetError::PayoutUnavailable(format!(
                "payout service returned HTTP {}",
                http_status
            )))
        }
        Err(e) => {
            return Err(FaucetError::Internal(format!(
                "Invalid payout response (HTTP {}): {}",
                http_status, e
            )))
        }
    };

    let status = json.get("status").and_then(Value::as_i64);
    if status == Some(PAYOUT_SUCCESS_STATUS) {
        return Ok(PayoutOutcome::Accepted(json));
    }

    let retryable = http_status >= 500 || status.map_or(false, |s| s >= 500);
    let message = json
        .get("message")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .map(str::to_string);

    Ok(PayoutOutcome::Rejected {
        status,
        message,
        details: json,
        retryable,
    })
}
