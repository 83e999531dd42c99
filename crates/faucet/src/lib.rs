//! Trickle faucet claim service
//!
//! Authenticated users claim a fixed FaucetPay disbursement at most once per hour:
//! - Bearer-token authentication through an identity provider
//! - Per-user cooldown ledger (in-memory or sled)
//! - FaucetPay payouts, recorded only when accepted
//! - Error tracking and Prometheus metrics

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod metrics;
pub mod payout;
pub mod reporter;
pub mod service;

pub use config::FaucetConfig;
pub use error::{FaucetError, FaucetResult};
pub use ledger::{CooldownLedger, CLAIM_COOLDOWN_MS};
pub use service::{ClaimReceipt, ClaimRequest, CooldownStatus, FaucetService, ServiceParts};
