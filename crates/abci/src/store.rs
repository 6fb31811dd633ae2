//! Root multi-store seam.
//!
//! The versioned key-value engine behind the application is an external
//! collaborator; the service only depends on the small contract here:
//! branch, write-back, working hash, durable commit. The node crate provides
//! the production implementation; [`MemoryStore`] is the in-process reference
//! used by tests.

use causeway_types::{CommitId, Hash};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Storage failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("initial version can only be set before the first commit (latest is {0})")]
    InitialVersionAfterCommit(u64),
}

/// A private, discardable write overlay on top of the root store.
///
/// Branches never observe each other's writes; a branch becomes visible only
/// when the service writes it back via [`RootStore::write_branch`].
pub trait BranchStore: Send + Sync {
    /// Read through the overlay into the branched-from state.
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Record a write in the overlay.
    fn set(&mut self, key: &[u8], value: &[u8]);

    /// Record a deletion in the overlay.
    fn delete(&mut self, key: &[u8]);

    /// The ordered write set (`None` marks a deletion).
    fn writes(&self) -> Vec<(Vec<u8>, Option<Vec<u8>>)>;
}

/// The committed multi-store the service runs against.
///
/// `write_branch` makes a branch's writes visible in the working set without
/// making them durable; `commit` persists the working set. This split is what
/// lets the consensus engine learn an app hash for a height before the height
/// is durably committed.
pub trait RootStore: Send + Sync {
    /// Open a fresh branch over the current working set.
    fn branch(&self) -> Box<dyn BranchStore>;

    /// Apply a branch's write set to the working set (visible, not durable).
    fn write_branch(&self, branch: &dyn BranchStore);

    /// Merkle root of the current working set.
    fn working_hash(&self) -> Hash;

    /// Durably persist the working set, producing the next version.
    fn commit(&self) -> Result<CommitId, StoreError>;

    /// Version of the last durable commit (0 if none).
    fn latest_version(&self) -> u64;

    /// Identity of the last durable commit.
    fn last_commit_id(&self) -> CommitId;

    /// Set the version the first commit will produce. Only valid before any
    /// commit has happened.
    fn set_initial_version(&self, version: u64) -> Result<(), StoreError>;

    /// Serve a raw key query against committed state.
    fn query(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;
}

// ═══════════════════════════════════════════════════════════════════════════
// In-memory reference implementation
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct MemoryStoreInner {
    committed: BTreeMap<Vec<u8>, Vec<u8>>,
    working: BTreeMap<Vec<u8>, Vec<u8>>,
    version: u64,
    initial_version: Option<u64>,
    last_commit: CommitId,
}

/// In-memory [`RootStore`].
///
/// Interior mutability mirrors the production store: the engine drives the
/// service serially, but query handlers may read concurrently.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RootStore for MemoryStore {
    fn branch(&self) -> Box<dyn BranchStore> {
        Box::new(MemoryBranch {
            base: self.inner.read().working.clone(),
            overlay: BTreeMap::new(),
        })
    }

    fn write_branch(&self, branch: &dyn BranchStore) {
        let mut inner = self.inner.write();
        for (key, value) in branch.writes() {
            match value {
                Some(value) => {
                    inner.working.insert(key, value);
                }
                None => {
                    inner.working.remove(&key);
                }
            }
        }
    }

    fn working_hash(&self) -> Hash {
        hash_map(&self.inner.read().working)
    }

    fn commit(&self) -> Result<CommitId, StoreError> {
        let mut inner = self.inner.write();
        let next_version = if inner.version == 0 {
            inner.initial_version.unwrap_or(1)
        } else {
            inner.version + 1
        };
        let hash = hash_map(&inner.working);
        inner.committed = inner.working.clone();
        inner.version = next_version;
        inner.last_commit = CommitId {
            version: next_version,
            hash,
        };
        Ok(inner.last_commit)
    }

    fn latest_version(&self) -> u64 {
        self.inner.read().version
    }

    fn last_commit_id(&self) -> CommitId {
        self.inner.read().last_commit
    }

    fn set_initial_version(&self, version: u64) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if inner.version > 0 {
            return Err(StoreError::InitialVersionAfterCommit(inner.version));
        }
        inner.initial_version = Some(version);
        Ok(())
    }

    fn query(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.inner.read().committed.get(key).cloned())
    }
}

/// Merkle-root stand-in: a running hash over the sorted working set.
fn hash_map(map: &BTreeMap<Vec<u8>, Vec<u8>>) -> Hash {
    let mut hasher = blake3::Hasher::new();
    for (key, value) in map {
        hasher.update(&(key.len() as u64).to_le_bytes());
        hasher.update(key);
        hasher.update(&(value.len() as u64).to_le_bytes());
        hasher.update(value);
    }
    Hash(*hasher.finalize().as_bytes())
}

struct MemoryBranch {
    base: BTreeMap<Vec<u8>, Vec<u8>>,
    overlay: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl BranchStore for MemoryBranch {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.overlay.get(key) {
            Some(entry) => entry.clone(),
            None => self.base.get(key).cloned(),
        }
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.overlay.insert(key.to_vec(), Some(value.to_vec()));
    }

    fn delete(&mut self, key: &[u8]) {
        self.overlay.insert(key.to_vec(), None);
    }

    fn writes(&self) -> Vec<(Vec<u8>, Option<Vec<u8>>)> {
        self.overlay
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_isolation() {
        let store = MemoryStore::new();

        let mut a = store.branch();
        a.set(b"k", b"from-a");

        let b = store.branch();
        assert_eq!(b.get(b"k"), None, "branches must not see each other");
        assert_eq!(a.get(b"k"), Some(b"from-a".to_vec()));

        // Nothing visible in the root until write-back.
        store.write_branch(a.as_ref());
        let c = store.branch();
        assert_eq!(c.get(b"k"), Some(b"from-a".to_vec()));
    }

    #[test]
    fn test_working_hash_changes_with_writes() {
        let store = MemoryStore::new();
        let empty = store.working_hash();

        let mut branch = store.branch();
        branch.set(b"k", b"v");
        store.write_branch(branch.as_ref());

        assert_ne!(store.working_hash(), empty);
    }

    #[test]
    fn test_commit_versions_are_sequential() {
        let store = MemoryStore::new();
        assert_eq!(store.latest_version(), 0);

        let first = store.commit().unwrap();
        assert_eq!(first.version, 1);
        let second = store.commit().unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(store.last_commit_id(), second);
    }

    #[test]
    fn test_initial_version_offsets_first_commit() {
        let store = MemoryStore::new();
        store.set_initial_version(5).unwrap();

        assert_eq!(store.commit().unwrap().version, 5);
        assert_eq!(store.commit().unwrap().version, 6);
    }

    #[test]
    fn test_initial_version_rejected_after_commit() {
        let store = MemoryStore::new();
        store.commit().unwrap();
        assert_eq!(
            store.set_initial_version(5),
            Err(StoreError::InitialVersionAfterCommit(1))
        );
    }

    #[test]
    fn test_query_serves_committed_state_only() {
        let store = MemoryStore::new();
        let mut branch = store.branch();
        branch.set(b"k", b"v");
        store.write_branch(branch.as_ref());

        // Visible in the working set, not yet durable.
        assert_eq!(store.query(b"k").unwrap(), None);

        store.commit().unwrap();
        assert_eq!(store.query(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_branch_delete_masks_base() {
        let store = MemoryStore::new();
        let mut setup = store.branch();
        setup.set(b"k", b"v");
        store.write_branch(setup.as_ref());

        let mut branch = store.branch();
        assert_eq!(branch.get(b"k"), Some(b"v".to_vec()));
        branch.delete(b"k");
        assert_eq!(branch.get(b"k"), None);

        store.write_branch(branch.as_ref());
        let after = store.branch();
        assert_eq!(after.get(b"k"), None);
    }
}
