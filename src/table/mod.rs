//! Tables: RID allocation, the page directory, and per-table shared state

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::index::Index;
use crate::pool::BufferPool;
use crate::storage::Rid;
use crate::transaction::LockManager;

/// Whether a directory entry points into the base or tail pages of its range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    Base,
    Tail,
}

/// Where one record version lives: `(range, page, slot)` plus base/tail side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordLocation {
    pub range_index: usize,
    pub page_index: usize,
    pub slot: usize,
    pub kind: RecordKind,
}

/// A materialized record as returned by queries: RID, primary-key value, and
/// the projected data columns (`None` placeholders for unprojected columns)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub rid: Rid,
    pub key: i64,
    pub columns: Vec<Option<i64>>,
}

/// One table: fixed-width integer columns, a primary-key column, page ranges
/// cached through the shared buffer pool, and the RID → location directory.
///
/// All mutable state is behind locks or atomics; a `Table` is shared across
/// worker threads as `Arc<Table>`.
pub struct Table {
    name: String,
    num_columns: usize,
    key: usize,
    pool: Arc<BufferPool>,
    next_rid: AtomicI64,
    active_range: AtomicUsize,
    page_directory: RwLock<AHashMap<Rid, RecordLocation>>,
    index: RwLock<Index>,
    lock_manager: LockManager,
}

impl Table {
    /// Create an empty table. `key` is the primary-key column number and must
    /// be below `num_columns`.
    pub fn new(name: &str, num_columns: usize, key: usize, pool: Arc<BufferPool>) -> Self {
        Self {
            name: name.to_string(),
            num_columns,
            key,
            pool,
            next_rid: AtomicI64::new(1),
            active_range: AtomicUsize::new(0),
            page_directory: RwLock::new(AHashMap::new()),
            index: RwLock::new(Index::new(num_columns, key)),
            lock_manager: LockManager::new(),
        }
    }

    /// Rebuild a table from catalog state (directory entries, RID counter,
    /// active range). The index is rebuilt separately by the database.
    pub fn restore(
        name: &str,
        num_columns: usize,
        key: usize,
        pool: Arc<BufferPool>,
        next_rid: Rid,
        active_range: usize,
        directory: impl IntoIterator<Item = (Rid, RecordLocation)>,
    ) -> Self {
        let table = Self::new(name, num_columns, key, pool);
        table.next_rid.store(next_rid, Ordering::SeqCst);
        table.active_range.store(active_range, Ordering::SeqCst);
        {
            let mut dir = table.page_directory.write().expect("page directory poisoned");
            dir.extend(directory);
        }
        table
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of data columns
    pub fn num_columns(&self) -> usize {
        self.num_columns
    }

    /// Primary-key column number
    pub fn key(&self) -> usize {
        self.key
    }

    /// The buffer pool this table's ranges are cached through
    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Hand out the next RID. Strictly increasing; never reused, even after
    /// deletes.
    pub fn new_rid(&self) -> Rid {
        self.next_rid.fetch_add(1, Ordering::SeqCst)
    }

    /// The next RID that would be handed out (catalog bookkeeping)
    pub fn next_rid(&self) -> Rid {
        self.next_rid.load(Ordering::SeqCst)
    }

    /// Index of the page range new base records go into
    pub fn active_range(&self) -> usize {
        self.active_range.load(Ordering::SeqCst)
    }

    /// Roll over to a new page range, but only if `from` is still the active
    /// one — concurrent inserters race here and exactly one wins
    pub fn advance_range(&self, from: usize) {
        let _ = self.active_range.compare_exchange(
            from,
            from + 1,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Look up where a RID lives
    pub fn locate(&self, rid: Rid) -> Option<RecordLocation> {
        self.page_directory
            .read()
            .expect("page directory poisoned")
            .get(&rid)
            .copied()
    }

    /// Record where a RID lives
    pub fn set_location(&self, rid: Rid, location: RecordLocation) {
        self.page_directory
            .write()
            .expect("page directory poisoned")
            .insert(rid, location);
    }

    /// Drop a RID's directory entry (base-record deletes only; orphaned tail
    /// entries stay)
    pub fn remove_location(&self, rid: Rid) {
        self.page_directory
            .write()
            .expect("page directory poisoned")
            .remove(&rid);
    }

    /// Snapshot of every directory entry (catalog bookkeeping)
    pub fn directory_entries(&self) -> Vec<(Rid, RecordLocation)> {
        self.page_directory
            .read()
            .expect("page directory poisoned")
            .iter()
            .map(|(rid, loc)| (*rid, *loc))
            .collect()
    }

    /// Shared access to the table's indexes
    pub fn index(&self) -> RwLockReadGuard<'_, Index> {
        self.index.read().expect("index poisoned")
    }

    /// Exclusive access to the table's indexes
    pub fn index_mut(&self) -> RwLockWriteGuard<'_, Index> {
        self.index.write().expect("index poisoned")
    }

    /// The record-granularity lock table for transactions on this table
    pub fn lock_manager(&self) -> &LockManager {
        &self.lock_manager
    }
}

/// Wall-clock seconds since the epoch, as stored in the timestamp column
pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_table() -> (TempDir, Table) {
        let dir = TempDir::new().unwrap();
        let pool = Arc::new(BufferPool::new(dir.path()));
        let table = Table::new("grades", 3, 0, pool);
        (dir, table)
    }

    #[test]
    fn test_rids_are_monotonic_from_one() {
        let (_dir, table) = test_table();
        assert_eq!(table.new_rid(), 1);
        assert_eq!(table.new_rid(), 2);
        assert_eq!(table.next_rid(), 3);
    }

    #[test]
    fn test_directory_round_trip() {
        let (_dir, table) = test_table();
        let loc = RecordLocation {
            range_index: 0,
            page_index: 2,
            slot: 17,
            kind: RecordKind::Base,
        };
        table.set_location(5, loc);
        assert_eq!(table.locate(5), Some(loc));

        table.remove_location(5);
        assert_eq!(table.locate(5), None);
    }

    #[test]
    fn test_advance_range_races_resolve_to_one_step() {
        let (_dir, table) = test_table();
        assert_eq!(table.active_range(), 0);
        // two racers observed range 0; only the first advances
        table.advance_range(0);
        table.advance_range(0);
        assert_eq!(table.active_range(), 1);
    }

    #[test]
    fn test_restore_preserves_counters() {
        let dir = TempDir::new().unwrap();
        let pool = Arc::new(BufferPool::new(dir.path()));
        let loc = RecordLocation {
            range_index: 1,
            page_index: 0,
            slot: 3,
            kind: RecordKind::Tail,
        };
        let table = Table::restore("grades", 3, 0, pool, 42, 1, vec![(7, loc)]);

        assert_eq!(table.next_rid(), 42);
        assert_eq!(table.active_range(), 1);
        assert_eq!(table.locate(7), Some(loc));
    }
}
