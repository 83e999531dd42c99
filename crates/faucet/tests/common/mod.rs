//! Shared fixtures for faucet integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response};
use axum::Router;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;
use trickle_faucet::clock::ManualClock;
use trickle_faucet::identity::StaticIdentityProvider;
use trickle_faucet::payout::{PayoutOutcome, PayoutRequest, PayoutService};
use trickle_faucet::reporter::ErrorReporter;
use trickle_faucet::{CooldownLedger, FaucetError, FaucetResult, FaucetService, ServiceParts};
use uuid::Uuid;

/// Payout double keyed on the destination address:
/// `unknown` is rejected, `down` is unreachable, `broken` fails internally,
/// everything else is paid.
pub struct ScriptedPayout {
    calls: AtomicUsize,
    requests: Mutex<Vec<PayoutRequest>>,
    delay: Duration,
}

impl ScriptedPayout {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            delay,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<PayoutRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PayoutService for ScriptedPayout {
    async fn send(&self, request: &PayoutRequest) -> FaucetResult<PayoutOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match request.destination_address.as_str() {
            "unknown" => Ok(PayoutOutcome::Rejected {
                status: Some(456),
                message: Some("The address does not belong to any user.".to_string()),
                details: json!({
                    "status": 456,
                    "message": "The address does not belong to any user."
                }),
                retryable: false,
            }),
            "down" => Err(FaucetError::PayoutUnavailable("no response within 10s".to_string())),
            "broken" => Err(FaucetError::Internal("unexpected payout failure".to_string())),
            _ => Ok(PayoutOutcome::Accepted(json!({
                "status": 200,
                "message": "OK",
                "payout_id": 7
            }))),
        }
    }
}

/// Counts captured events instead of delivering them
#[derive(Default)]
pub struct CountingReporter {
    pub captured: AtomicUsize,
}

impl ErrorReporter for CountingReporter {
    fn capture(&self, _error: &FaucetError, _operation: &str) -> Uuid {
        self.captured.fetch_add(1, Ordering::SeqCst);
        Uuid::new_v4()
    }
}

pub struct Harness {
    pub service: Arc<FaucetService>,
    pub clock: Arc<ManualClock>,
    pub payout: Arc<ScriptedPayout>,
    pub reporter: Arc<CountingReporter>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(ScriptedPayout::new(), Some("test-api-key"))
    }

    pub fn build(payout: ScriptedPayout, api_key: Option<&str>) -> Self {
        let clock = Arc::new(ManualClock::new(0));
        let payout = Arc::new(payout);
        let reporter = Arc::new(CountingReporter::default());
        let identity = StaticIdentityProvider::new()
            .with_token("alice-token", "alice")
            .with_token("bob-token", "bob");

        let service = FaucetService::new(ServiceParts {
            ledger: CooldownLedger::in_memory(),
            identity: Arc::new(identity),
            payout: payout.clone(),
            payout_api_key: api_key.map(str::to_string),
            reporter: reporter.clone(),
            clock: clock.clone(),
        })
        .unwrap();

        Self {
            service: Arc::new(service),
            clock,
            payout,
            reporter,
        }
    }

    pub fn app(&self) -> Router {
        trickle_faucet::api::router(self.service.clone())
    }

    pub fn reported(&self) -> usize {
        self.reporter.captured.load(Ordering::SeqCst)
    }
}

pub fn claim_request(token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/claimFaucet")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn send(app: Router, request: Request<Body>) -> (u16, Value) {
    let response = app.oneshot(request).await.unwrap();
    read_json(response).await
}

pub async fn read_json(response: Response<Body>) -> (u16, Value) {
    let status = response.status().as_u16();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}
