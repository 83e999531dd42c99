use super::{CooldownEntry, CooldownStore};
use crate::error::{FaucetError, FaucetResult};
use crate::identity::Identity;
use std::collections::HashMap;
use std::sync::Mutex;

/// Process-local cooldown storage. Lost on restart and not shared between
/// instances.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<Identity, CooldownEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> FaucetError {
    FaucetError::Internal("cooldown ledger lock poisoned".to_string())
}

impl CooldownStore for MemoryStore {
    fn get(&self, identity: &Identity) -> FaucetResult<Option<CooldownEntry>> {
        let entries = self.entries.lock().map_err(|_| poisoned())?;
        Ok(entries.get(identity).copied())
    }

    fn compare_and_swap(
        &self,
        identity: &Identity,
        expected: Option<&CooldownEntry>,
        new: &CooldownEntry,
    ) -> FaucetResult<bool> {
        let mut entries = self.entries.lock().map_err(|_| poisoned())?;
        if entries.get(identity) != expected {
            return Ok(false);
        }
        entries.insert(identity.clone(), *new);
        Ok(true)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_and_swap_detects_conflicts() {
        let store = MemoryStore::new();
        let id = Identity::new("u");
        let first = CooldownEntry {
            last_claim_ms: Some(1),
            pending_since_ms: None,
        };
        let second = CooldownEntry {
            last_claim_ms: Some(2),
            pending_since_ms: None,
        };

        assert!(store.compare_and_swap(&id, None, &first).unwrap());
        // Stale expectation
        assert!(!store.compare_and_swap(&id, None, &second).unwrap());
        assert!(store.compare_and_swap(&id, Some(&first), &second).unwrap());
        assert_eq!(store.get(&id).unwrap(), Some(second));
        assert_eq!(store.len(), 1);
    }
}
