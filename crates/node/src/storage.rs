//! RocksDB-backed root store.
//!
//! All operations are synchronous blocking I/O. Callers in async contexts
//! should use `spawn_blocking` if needed to avoid blocking the runtime.
//!
//! Layout:
//! - `state` column family: the committed application key space
//! - default column family: chain metadata under `chain:`-prefixed keys
//!
//! The working set (writes made visible by `write_branch` but not yet
//! durable) lives in memory and is flushed atomically by `commit`. On a crash
//! between the two, the working set is simply lost and the engine replays the
//! height.

use causeway_abci::{BranchStore, RootStore, StoreError};
use causeway_types::{CommitId, Hash};
use parking_lot::RwLock;
use rocksdb::{ColumnFamilyDescriptor, Options, WriteBatch, DB};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

const CF_STATE: &str = "state";

const KEY_VERSION: &[u8] = b"chain:version";
const KEY_APP_HASH: &[u8] = b"chain:app_hash";
const KEY_BLOCK_DELAY: &[u8] = b"chain:block_delay";

struct StoreInner {
    /// Visible-but-not-durable writes (`None` marks a deletion).
    overlay: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    version: u64,
    last_commit: CommitId,
    initial_version: Option<u64>,
}

/// RocksDB-backed [`RootStore`].
pub struct RocksDbStore {
    db: Arc<DB>,
    inner: RwLock<StoreInner>,
}

impl RocksDbStore {
    /// Open or create the database at `path`, restoring the last committed
    /// version and app hash.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_keep_log_file_num(10);

        let cf_descriptors = vec![ColumnFamilyDescriptor::new(CF_STATE, Options::default())];
        let db = DB::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let version = db
            .get(KEY_VERSION)
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .map(|v| {
                let bytes: [u8; 8] = v.as_slice().try_into().unwrap_or([0; 8]);
                u64::from_le_bytes(bytes)
            })
            .unwrap_or(0);

        let app_hash = db
            .get(KEY_APP_HASH)
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .map(|v| Hash::from_hash_bytes(&v))
            .unwrap_or(Hash::ZERO);

        Ok(Self {
            db: Arc::new(db),
            inner: RwLock::new(StoreInner {
                overlay: BTreeMap::new(),
                version,
                last_commit: CommitId {
                    version,
                    hash: app_hash,
                },
                initial_version: None,
            }),
        })
    }

    /// Persist the block-delay schedule next to chain metadata.
    pub fn put_delay_schedule(&self, bytes: &[u8]) -> Result<(), StoreError> {
        self.db
            .put(KEY_BLOCK_DELAY, bytes)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    /// The persisted block-delay schedule, if any.
    pub fn delay_schedule(&self) -> Result<Option<Vec<u8>>, StoreError> {
        self.db
            .get(KEY_BLOCK_DELAY)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn state_cf(&self) -> &rocksdb::ColumnFamily {
        self.db
            .cf_handle(CF_STATE)
            .expect("state column family must exist")
    }
}

impl RootStore for RocksDbStore {
    fn branch(&self) -> Box<dyn BranchStore> {
        Box::new(DbBranch {
            db: self.db.clone(),
            base: self.inner.read().overlay.clone(),
            writes: BTreeMap::new(),
        })
    }

    fn write_branch(&self, branch: &dyn BranchStore) {
        let mut inner = self.inner.write();
        for (key, value) in branch.writes() {
            inner.overlay.insert(key, value);
        }
    }

    fn working_hash(&self) -> Hash {
        let inner = self.inner.read();
        hash_overlay(inner.last_commit.hash, &inner.overlay)
    }

    fn commit(&self) -> Result<CommitId, StoreError> {
        let start = Instant::now();
        let mut inner = self.inner.write();

        let next_version = if inner.version == 0 {
            inner.initial_version.unwrap_or(1)
        } else {
            inner.version + 1
        };
        let hash = hash_overlay(inner.last_commit.hash, &inner.overlay);

        let cf = self.state_cf();
        let mut batch = WriteBatch::default();
        for (key, value) in &inner.overlay {
            match value {
                Some(value) => batch.put_cf(cf, key, value),
                None => batch.delete_cf(cf, key),
            }
        }
        batch.put(KEY_VERSION, next_version.to_le_bytes());
        batch.put(KEY_APP_HASH, hash.as_bytes());

        // Sync write: the app hash we report for this version must survive a
        // crash, or the node restarts disagreeing with the network.
        let mut write_opts = rocksdb::WriteOptions::default();
        write_opts.set_sync(true);
        self.db
            .write_opt(batch, &write_opts)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        inner.overlay.clear();
        inner.version = next_version;
        inner.last_commit = CommitId {
            version: next_version,
            hash,
        };

        crate::metrics::record_store_commit(start.elapsed().as_secs_f64());
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
        self.db
            .get_cf(self.state_cf(), key)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

/// Chained working root: the previous commit's hash folded with the ordered
/// write set. Identical committed state plus identical writes yields the same
/// root on every validator.
fn hash_overlay(base: Hash, overlay: &BTreeMap<Vec<u8>, Option<Vec<u8>>>) -> Hash {
    if overlay.is_empty() {
        return base;
    }
    let mut hasher = blake3::Hasher::new();
    hasher.update(base.as_bytes());
    for (key, value) in overlay {
        hasher.update(&(key.len() as u64).to_le_bytes());
        hasher.update(key);
        match value {
            Some(value) => {
                hasher.update(&[1]);
                hasher.update(&(value.len() as u64).to_le_bytes());
                hasher.update(value);
            }
            None => {
                hasher.update(&[0]);
            }
        }
    }
    Hash(*hasher.finalize().as_bytes())
}

struct DbBranch {
    db: Arc<DB>,
    /// Snapshot of the working set at branch time.
    base: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl BranchStore for DbBranch {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        if let Some(entry) = self.writes.get(key) {
            return entry.clone();
        }
        if let Some(entry) = self.base.get(key) {
            return entry.clone();
        }
        let cf = self.db.cf_handle(CF_STATE)?;
        match self.db.get_cf(cf, key) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(error = %e, "branch read failed");
                None
            }
        }
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.writes.insert(key.to_vec(), Some(value.to_vec()));
    }

    fn delete(&mut self, key: &[u8]) {
        self.writes.insert(key.to_vec(), None);
    }

    fn writes(&self) -> Vec<(Vec<u8>, Option<Vec<u8>>)> {
        self.writes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_branch_commit_query() {
        let dir = TempDir::new().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();

        let mut branch = store.branch();
        branch.set(b"k", b"v");
        store.write_branch(branch.as_ref());

        // Visible to new branches, not yet durable for queries.
        assert_eq!(store.branch().get(b"k"), Some(b"v".to_vec()));
        assert_eq!(store.query(b"k").unwrap(), None);

        let commit = store.commit().unwrap();
        assert_eq!(commit.version, 1);
        assert_eq!(store.query(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_version_and_app_hash_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let commit = {
            let store = RocksDbStore::open(dir.path()).unwrap();
            let mut branch = store.branch();
            branch.set(b"k", b"v");
            store.write_branch(branch.as_ref());
            store.commit().unwrap()
        };

        let store = RocksDbStore::open(dir.path()).unwrap();
        assert_eq!(store.latest_version(), commit.version);
        assert_eq!(store.last_commit_id(), commit);
        assert_eq!(store.query(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_working_hash_tracks_writes_and_settles_on_commit() {
        let dir = TempDir::new().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();
        let empty = store.working_hash();

        let mut branch = store.branch();
        branch.set(b"k", b"v");
        store.write_branch(branch.as_ref());

        let working = store.working_hash();
        assert_ne!(working, empty);

        let commit = store.commit().unwrap();
        assert_eq!(commit.hash, working);
        // Overlay drained; the working hash now equals the committed root.
        assert_eq!(store.working_hash(), commit.hash);
    }

    #[test]
    fn test_initial_version() {
        let dir = TempDir::new().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();
        store.set_initial_version(10).unwrap();
        assert_eq!(store.commit().unwrap().version, 10);
        assert_eq!(store.commit().unwrap().version, 11);

        assert_eq!(
            store.set_initial_version(20),
            Err(StoreError::InitialVersionAfterCommit(11))
        );
    }

    #[test]
    fn test_delete_through_branch() {
        let dir = TempDir::new().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();

        let mut branch = store.branch();
        branch.set(b"k", b"v");
        store.write_branch(branch.as_ref());
        store.commit().unwrap();

        let mut branch = store.branch();
        branch.delete(b"k");
        store.write_branch(branch.as_ref());
        store.commit().unwrap();

        assert_eq!(store.query(b"k").unwrap(), None);
    }

    #[test]
    fn test_delay_schedule_persistence() {
        let dir = TempDir::new().unwrap();
        let schedule = [7u8; 24];
        {
            let store = RocksDbStore::open(dir.path()).unwrap();
            assert_eq!(store.delay_schedule().unwrap(), None);
            store.put_delay_schedule(&schedule).unwrap();
        }

        let store = RocksDbStore::open(dir.path()).unwrap();
        assert_eq!(store.delay_schedule().unwrap(), Some(schedule.to_vec()));
    }
}
