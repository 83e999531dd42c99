use super::{CooldownEntry, CooldownStore};
use crate::error::{FaucetError, FaucetResult};
use crate::identity::Identity;
use std::path::Path;
use tracing::{debug, info};

const TREE_NAME: &str = "cooldowns";

/// Background flush interval; explicit [`CooldownStore::flush`] runs on shutdown
const FLUSH_EVERY_MS: u64 = 500;

/// Durable cooldown storage on a sled tree. Survives restarts and relies on
/// sled's native compare-and-swap for atomic updates.
pub struct SledStore {
    db: ::sled::Db,
    tree: ::sled::Tree,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> FaucetResult<Self> {
        info!("Opening cooldown database at: {:?}", path.as_ref());

        let db = ::sled::Config::default()
            .path(path)
            .cache_capacity(16 * 1024 * 1024)
            .flush_every_ms(Some(FLUSH_EVERY_MS))
            .open()?;
        let tree = db.open_tree(TREE_NAME)?;

        Ok(Self { db, tree })
    }

    /// Number of identities that ever claimed
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

fn encode(entry: &CooldownEntry) -> FaucetResult<Vec<u8>> {
    bincode::serialize(entry).map_err(|e| FaucetError::Internal(e.to_string()))
}

fn decode(bytes: &[u8]) -> FaucetResult<CooldownEntry> {
    bincode::deserialize(bytes).map_err(|e| FaucetError::Internal(e.to_string()))
}

impl CooldownStore for SledStore {
    fn get(&self, identity: &Identity) -> FaucetResult<Option<CooldownEntry>> {
        match self.tree.get(identity.as_str().as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn compare_and_swap(
        &self,
        identity: &Identity,
        expected: Option<&CooldownEntry>,
        new: &CooldownEntry,
    ) -> FaucetResult<bool> {
        let expected = expected.map(encode).transpose()?;
        let new = encode(new)?;

        Ok(self
            .tree
            .compare_and_swap(identity.as_str().as_bytes(), expected, Some(new))?
            .is_ok())
    }

    fn flush(&self) -> FaucetResult<()> {
        let bytes = self.db.flush()?;
        debug!(bytes, "Flushed cooldown database");
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "sled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{CooldownLedger, CLAIM_COOLDOWN_MS};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_claim_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let id = Identity::new("user-1");

        {
            let store = SledStore::open(dir.path()).unwrap();
            let ledger = CooldownLedger::new(Arc::new(store));
            ledger.reserve(&id, 0).unwrap().commit().unwrap();
            ledger.flush().unwrap();
        }

        let store = Arc::new(SledStore::open(dir.path()).unwrap());
        assert_eq!(store.len(), 1);
        let ledger = CooldownLedger::new(store);
        assert!(!ledger.is_eligible(&id, 1_000).unwrap());
        assert!(ledger.is_eligible(&id, CLAIM_COOLDOWN_MS).unwrap());
    }

    #[test]
    fn test_sled_compare_and_swap() {
        let dir = TempDir::new().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        let id = Identity::new("u");
        let entry = CooldownEntry {
            last_claim_ms: None,
            pending_since_ms: Some(5),
        };

        assert!(store.compare_and_swap(&id, None, &entry).unwrap());
        assert!(!store.compare_and_swap(&id, None, &entry).unwrap());
        assert_eq!(store.get(&id).unwrap(), Some(entry));
    }
}
