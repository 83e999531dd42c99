//! Cooldown ledger: tracks, per identity, when the last successful claim happened.
//!
//! Eligibility checks and claim recording go through a single compare-and-swap
//! on the stored entry, so two concurrent claims for one identity cannot both
//! pass the check. A claim in flight is marked with `pending_since_ms` until it
//! is committed or released.

mod memory;
mod persistent;

pub use memory::MemoryStore;
pub use persistent::SledStore;

use crate::error::{FaucetError, FaucetResult};
use crate::identity::Identity;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// One hour between successful claims
pub const CLAIM_COOLDOWN_MS: i64 = 3_600_000;

/// How long an unsettled reservation blocks further claims
pub const DEFAULT_PENDING_TTL: Duration = Duration::from_secs(300);

const MAX_SWAP_ATTEMPTS: usize = 64;

/// Stored state for one identity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownEntry {
    /// Time of the last successful claim
    pub last_claim_ms: Option<i64>,
    /// Set while a claim is being paid out
    pub pending_since_ms: Option<i64>,
}

/// Backing storage for cooldown entries
pub trait CooldownStore: Send + Sync {
    fn get(&self, identity: &Identity) -> FaucetResult<Option<CooldownEntry>>;

    /// Store `new` only if the current entry still equals `expected`.
    /// Returns `false` when another writer got there first.
    fn compare_and_swap(
        &self,
        identity: &Identity,
        expected: Option<&CooldownEntry>,
        new: &CooldownEntry,
    ) -> FaucetResult<bool>;

    /// Short backend name for logs
    fn backend(&self) -> &'static str;

    /// Persist buffered writes. Volatile stores have nothing to do.
    fn flush(&self) -> FaucetResult<()> {
        Ok(())
    }
}

#[derive(Clone)]
pub struct CooldownLedger {
    store: Arc<dyn CooldownStore>,
    cooldown_ms: i64,
    pending_ttl_ms: i64,
}

impl CooldownLedger {
    pub fn new(store: Arc<dyn CooldownStore>) -> Self {
        Self {
            store,
            cooldown_ms: CLAIM_COOLDOWN_MS,
            pending_ttl_ms: DEFAULT_PENDING_TTL.as_millis() as i64,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn with_pending_ttl(mut self, ttl: Duration) -> Self {
        self.pending_ttl_ms = ttl.as_millis() as i64;
        self
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms as u64)
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    pub fn flush(&self) -> FaucetResult<()> {
        self.store.flush()
    }

    /// True when the identity never claimed or its cooldown has fully elapsed.
    pub fn is_eligible(&self, identity: &Identity, now_ms: i64) -> FaucetResult<bool> {
        let entry = self.store.get(identity)?;
        Ok(self.remaining_ms(entry.as_ref(), now_ms) == 0)
    }

    /// Time left until the identity may claim again, zero when eligible.
    pub fn remaining_cooldown(&self, identity: &Identity, now_ms: i64) -> FaucetResult<Duration> {
        let entry = self.store.get(identity)?;
        Ok(Duration::from_millis(self.remaining_ms(entry.as_ref(), now_ms) as u64))
    }

    /// Overwrite the last-claim time for `identity`, clearing any pending marker.
    pub fn record_claim(&self, identity: &Identity, now_ms: i64) -> FaucetResult<()> {
        self.update(identity, |_| {
            Ok(CooldownEntry {
                last_claim_ms: Some(now_ms),
                pending_since_ms: None,
            })
        })?;
        debug!(%identity, now_ms, "Recorded claim");
        Ok(())
    }

    /// Check eligibility and mark a claim in flight in one atomic step.
    pub fn reserve(&self, identity: &Identity, now_ms: i64) -> FaucetResult<Reservation> {
        self.update(identity, |current| {
            let remaining = self.remaining_ms(current, now_ms);
            if remaining > 0 {
                return Err(FaucetError::RateLimited(ceil_secs_ms(remaining)));
            }

            if let Some(since) = current.and_then(|e| e.pending_since_ms) {
                if now_ms - since < self.pending_ttl_ms {
                    return Err(FaucetError::ClaimInProgress);
                }
                warn!(%identity, pending_since_ms = since, "Taking over abandoned claim reservation");
            }

            Ok(CooldownEntry {
                last_claim_ms: current.and_then(|e| e.last_claim_ms),
                pending_since_ms: Some(now_ms),
            })
        })?;

        Ok(Reservation {
            ledger: self.clone(),
            identity: identity.clone(),
            reserved_at_ms: now_ms,
            settled: false,
        })
    }

    fn remaining_ms(&self, entry: Option<&CooldownEntry>, now_ms: i64) -> i64 {
        match entry.and_then(|e| e.last_claim_ms) {
            Some(last) => (self.cooldown_ms - (now_ms - last)).clamp(0, self.cooldown_ms),
            None => 0,
        }
    }

    fn update<F>(&self, identity: &Identity, mut next: F) -> FaucetResult<CooldownEntry>
    where
        F: FnMut(Option<&CooldownEntry>) -> FaucetResult<CooldownEntry>,
    {
        for _ in 0..MAX_SWAP_ATTEMPTS {
            let current = self.store.get(identity)?;
            let new = next(current.as_ref())?;
            if self.store.compare_and_swap(identity, current.as_ref(), &new)? {
                return Ok(new);
            }
            debug!(%identity, "Cooldown entry changed concurrently, retrying");
        }

        Err(FaucetError::Internal(format!(
            "cooldown entry for {} kept changing under contention",
            identity
        )))
    }
}

/// Ceiling-rounded whole seconds
pub fn ceil_secs(duration: Duration) -> u64 {
    let millis = duration.as_millis() as u64;
    (millis + 999) / 1000
}

fn ceil_secs_ms(millis: i64) -> u64 {
    ceil_secs(Duration::from_millis(millis.max(0) as u64))
}

/// An in-flight claim. Commit after a successful payout; anything else
/// releases the slot, explicitly or when the reservation is dropped.
#[must_use = "a reservation is released as soon as it is dropped"]
pub struct Reservation {
    ledger: CooldownLedger,
    identity: Identity,
    reserved_at_ms: i64,
    settled: bool,
}

impl Reservation {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The time the eligibility check was made; this is what gets recorded.
    pub fn reserved_at_ms(&self) -> i64 {
        self.reserved_at_ms
    }

    pub fn commit(mut self) -> FaucetResult<()> {
        self.settled = true;
        let reserved_at = self.reserved_at_ms;
        self.ledger.update(&self.identity, |current| {
            Ok(CooldownEntry {
                last_claim_ms: Some(reserved_at),
                pending_since_ms: current
                    .and_then(|e| e.pending_since_ms)
                    .filter(|&since| since != reserved_at),
            })
        })?;
        debug!(identity = %self.identity, reserved_at, "Committed claim");
        Ok(())
    }

    pub fn release(mut self) -> FaucetResult<()> {
        self.settled = true;
        self.clear_pending()
    }

    fn clear_pending(&self) -> FaucetResult<()> {
        let reserved_at = self.reserved_at_ms;
        self.ledger.update(&self.identity, |current| {
            Ok(CooldownEntry {
                last_claim_ms: current.and_then(|e| e.last_claim_ms),
                pending_since_ms: current
                    .and_then(|e| e.pending_since_ms)
                    .filter(|&since| since != reserved_at),
            })
        })?;
        debug!(identity = %self.identity, reserved_at, "Released claim reservation");
        Ok(())
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.settled {
            if let Err(e) = self.clear_pending() {
                warn!(identity = %self.identity, "Failed to release claim reservation: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> Identity {
        Identity::new(id)
    }

    #[test]
    fn test_never_claimed_is_eligible() {
        let ledger = CooldownLedger::in_memory();
        for now in [0, 1, CLAIM_COOLDOWN_MS, i64::MAX / 2] {
            assert!(ledger.is_eligible(&user("u"), now).unwrap());
            assert_eq!(ledger.remaining_cooldown(&user("u"), now).unwrap(), Duration::ZERO);
        }
    }

    #[test]
    fn test_cooldown_window_boundaries() {
        let ledger = CooldownLedger::in_memory();
        let t = 10_000;
        ledger.record_claim(&user("u"), t).unwrap();

        for now in [t, t + 1, t + 1_000, t + CLAIM_COOLDOWN_MS - 1] {
            assert!(!ledger.is_eligible(&user("u"), now).unwrap(), "now={}", now);
        }
        assert!(ledger.is_eligible(&user("u"), t + CLAIM_COOLDOWN_MS).unwrap());
        assert!(ledger.is_eligible(&user("u"), t + CLAIM_COOLDOWN_MS + 1).unwrap());
    }

    #[test]
    fn test_remaining_cooldown_decreases_to_zero() {
        let ledger = CooldownLedger::in_memory();
        ledger.record_claim(&user("u"), 0).unwrap();

        let mut previous = ledger.remaining_cooldown(&user("u"), 0).unwrap();
        assert_eq!(previous, Duration::from_millis(CLAIM_COOLDOWN_MS as u64));
        for now in (60_000..CLAIM_COOLDOWN_MS).step_by(60_000) {
            let remaining = ledger.remaining_cooldown(&user("u"), now).unwrap();
            assert!(remaining < previous);
            previous = remaining;
        }
        assert_eq!(
            ledger.remaining_cooldown(&user("u"), CLAIM_COOLDOWN_MS).unwrap(),
            Duration::ZERO
        );
        assert_eq!(
            ledger.remaining_cooldown(&user("u"), CLAIM_COOLDOWN_MS * 2).unwrap(),
            Duration::ZERO
        );
    }

    #[test]
    fn test_record_claim_overwrites() {
        let ledger = CooldownLedger::in_memory();
        ledger.record_claim(&user("u"), 0).unwrap();
        ledger.record_claim(&user("u"), 5_000_000).unwrap();
        assert!(!ledger.is_eligible(&user("u"), 5_000_000 + 1).unwrap());
    }

    #[test]
    fn test_identities_are_independent() {
        let ledger = CooldownLedger::in_memory();
        ledger.record_claim(&user("a"), 0).unwrap();
        assert!(!ledger.is_eligible(&user("a"), 1).unwrap());
        assert!(ledger.is_eligible(&user("b"), 1).unwrap());
    }

    #[test]
    fn test_ceil_secs() {
        assert_eq!(ceil_secs(Duration::ZERO), 0);
        assert_eq!(ceil_secs(Duration::from_millis(1)), 1);
        assert_eq!(ceil_secs(Duration::from_millis(1_000)), 1);
        assert_eq!(ceil_secs(Duration::from_millis(3_599_000)), 3599);
        assert_eq!(ceil_secs(Duration::from_millis(3_599_001)), 3600);
    }

    #[test]
    fn test_reserve_then_commit_records_reservation_time() {
        let ledger = CooldownLedger::in_memory();
        let reservation = ledger.reserve(&user("u"), 1_000).unwrap();
        assert_eq!(reservation.reserved_at_ms(), 1_000);
        reservation.commit().unwrap();

        assert!(!ledger.is_eligible(&user("u"), 1_000 + CLAIM_COOLDOWN_MS - 1).unwrap());
        assert!(ledger.is_eligible(&user("u"), 1_000 + CLAIM_COOLDOWN_MS).unwrap());
    }

    #[test]
    fn test_second_reservation_is_rejected_while_pending() {
        let ledger = CooldownLedger::in_memory();
        let _first = ledger.reserve(&user("u"), 0).unwrap();
        assert!(matches!(
            ledger.reserve(&user("u"), 10),
            Err(FaucetError::ClaimInProgress)
        ));
    }

    #[test]
    fn test_release_keeps_identity_eligible() {
        let ledger = CooldownLedger::in_memory();
        ledger.reserve(&user("u"), 0).unwrap().release().unwrap();
        assert!(ledger.is_eligible(&user("u"), 1).unwrap());
        assert!(ledger.reserve(&user("u"), 1).is_ok());
    }

    #[test]
    fn test_dropped_reservation_is_released() {
        let ledger = CooldownLedger::in_memory();
        {
            let _reservation = ledger.reserve(&user("u"), 0).unwrap();
        }
        assert!(ledger.reserve(&user("u"), 1).is_ok());
    }

    #[test]
    fn test_reserve_during_cooldown_reports_remaining_seconds() {
        let ledger = CooldownLedger::in_memory();
        ledger.reserve(&user("u"), 0).unwrap().commit().unwrap();

        match ledger.reserve(&user("u"), 1_000) {
            Err(FaucetError::RateLimited(secs)) => assert_eq!(secs, 3599),
            other => panic!("expected RateLimited, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_stale_reservation_can_be_taken_over() {
        let ledger = CooldownLedger::in_memory().with_pending_ttl(Duration::from_secs(60));
        let abandoned = ledger.reserve(&user("u"), 0).unwrap();
        std::mem::forget(abandoned);

        assert!(matches!(
            ledger.reserve(&user("u"), 59_999),
            Err(FaucetError::ClaimInProgress)
        ));
        assert!(ledger.reserve(&user("u"), 60_000).is_ok());
    }
}
