//! Prometheus metrics for the claim path

use crate::error::{FaucetError, FaucetResult};
use prometheus::{histogram_opts, opts, Encoder, Histogram, IntCounterVec, Registry, TextEncoder};

#[derive(Debug)]
pub struct FaucetMetrics {
    registry: Registry,

    /// Claim attempts by outcome
    pub claims_total: IntCounterVec,

    /// Wall time of payout service calls
    pub payout_duration: Histogram,
}

fn metrics_error(e: prometheus::Error) -> FaucetError {
    FaucetError::Internal(format!("metrics: {}", e))
}

impl FaucetMetrics {
    pub fn new() -> FaucetResult<Self> {
        let registry = Registry::new();

        let claims_total = IntCounterVec::new(
            opts!("trickle_claims_total", "Claim attempts by outcome"),
            &["outcome"],
        )
        .map_err(metrics_error)?;

        let payout_duration = Histogram::with_opts(histogram_opts!(
            "trickle_payout_duration_seconds",
            "Time spent waiting on the payout service",
            vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
        ))
        .map_err(metrics_error)?;

        registry
            .register(Box::new(claims_total.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(payout_duration.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            claims_total,
            payout_duration,
        })
    }

    pub fn record_outcome(&self, outcome: &str) {
        self.claims_total.with_label_values(&[outcome]).inc();
    }

    pub fn outcome_count(&self, outcome: &str) -> u64 {
        self.claims_total.with_label_values(&[outcome]).get()
    }

    /// Render all metrics in the Prometheus text format
    pub fn gather(&self) -> FaucetResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| FaucetError::Internal(e.to_string()))
    }
}
