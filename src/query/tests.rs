use std::sync::Arc;

use tempfile::TempDir;

use super::{ColumnUpdate, Query};
use crate::pool::BufferPool;
use crate::storage::{BASE_PAGES_PER_RANGE, LOGICAL_PAGE_CAPACITY, SCHEMA_ENCODING_COLUMN};
use crate::table::Table;

fn setup(num_columns: usize, key: usize) -> (TempDir, Arc<Table>, Query) {
    let dir = TempDir::new().unwrap();
    let pool = Arc::new(BufferPool::new(dir.path()));
    let table = Arc::new(Table::new("grades", num_columns, key, pool));
    let query = Query::new(Arc::clone(&table));
    (dir, table, query)
}

fn all(num_columns: usize) -> Vec<bool> {
    vec![true; num_columns]
}

fn set(updates: &[(usize, i64)], num_columns: usize) -> Vec<ColumnUpdate> {
    let mut columns = ColumnUpdate::none(num_columns);
    for (i, value) in updates {
        columns[*i] = ColumnUpdate::Set(*value);
    }
    columns
}

#[test]
fn test_insert_then_select() {
    let (_dir, _table, query) = setup(3, 0);
    assert!(query.insert(&[1, 10, 20]));

    let records = query.select(1, 0, &all(3)).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key, 1);
    assert_eq!(records[0].columns, vec![Some(1), Some(10), Some(20)]);
}

#[test]
fn test_duplicate_primary_key_rejected() {
    let (_dir, table, query) = setup(3, 0);
    assert!(query.insert(&[1, 10, 20]));
    assert!(!query.insert(&[1, 99, 99]));

    // no second directory or index entry appeared
    assert_eq!(table.directory_entries().len(), 1);
    assert_eq!(table.index().locate(0, 1).len(), 1);
}

#[test]
fn test_insert_wrong_column_count_rejected() {
    let (_dir, table, query) = setup(3, 0);
    assert!(!query.insert(&[1, 10]));
    assert!(!query.insert(&[1, 10, 20, 30]));
    assert!(table.directory_entries().is_empty());
}

#[test]
fn test_update_and_select_version() {
    let (_dir, _table, query) = setup(3, 0);
    assert!(query.insert(&[1, 10, 20]));
    assert!(query.update(1, &set(&[(1, 99)], 3)));

    let latest = query.select_version(1, 0, &all(3), 0).unwrap();
    assert_eq!(latest[0].columns, vec![Some(1), Some(99), Some(20)]);

    let previous = query.select_version(1, 0, &all(3), -1).unwrap();
    assert_eq!(previous[0].columns, vec![Some(1), Some(10), Some(20)]);

    // deeper than the chain saturates at the inserted state
    let deep = query.select_version(1, 0, &all(3), -5).unwrap();
    assert_eq!(deep[0].columns, vec![Some(1), Some(10), Some(20)]);
}

#[test]
fn test_version_chain_reconstruction() {
    let (_dir, _table, query) = setup(2, 0);
    assert!(query.insert(&[7, 100]));
    for value in [101, 102, 103] {
        assert!(query.update(7, &set(&[(1, value)], 2)));
    }

    let expected = [(0, 103), (-1, 102), (-2, 101), (-3, 100), (-4, 100)];
    for (version, value) in expected {
        let records = query.select_version(7, 0, &all(2), version).unwrap();
        assert_eq!(records[0].columns, vec![Some(7), Some(value)], "version {}", version);
    }
}

#[test]
fn test_schema_encoding_accumulates() {
    let (_dir, table, query) = setup(4, 0);
    assert!(query.insert(&[1, 10, 20, 30]));
    assert!(query.update(1, &set(&[(1, 11)], 4)));
    assert!(query.update(1, &set(&[(3, 33)], 4)));

    let location = table.locate(1).unwrap();
    let frame = table.pool().get_frame(table.name(), location.range_index, 4).unwrap();
    let (meta, _) = frame
        .page_range()
        .read_base_record(location.page_index, location.slot, &all(4))
        .unwrap();
    assert_eq!(meta[SCHEMA_ENCODING_COLUMN], 0b1010);

    // the merged view combines both updates
    let records = query.select(1, 0, &all(4)).unwrap();
    assert_eq!(records[0].columns, vec![Some(1), Some(11), Some(20), Some(33)]);
}

#[test]
fn test_update_cannot_change_primary_key() {
    let (_dir, _table, query) = setup(2, 0);
    assert!(query.insert(&[5, 50]));

    assert!(!query.update(5, &set(&[(0, 6)], 2)));
    // re-setting the same key value is a no-op, not a change
    assert!(query.update(5, &set(&[(0, 5), (1, 51)], 2)));

    let records = query.select(5, 0, &all(2)).unwrap();
    assert_eq!(records[0].columns, vec![Some(5), Some(51)]);
}

#[test]
fn test_update_missing_key_fails() {
    let (_dir, _table, query) = setup(2, 0);
    assert!(!query.update(404, &set(&[(1, 1)], 2)));
}

#[test]
fn test_delete_is_authoritative() {
    let (_dir, table, query) = setup(3, 0);
    assert!(query.insert(&[1, 10, 20]));
    assert!(query.update(1, &set(&[(2, 99)], 3)));
    assert!(query.delete(1));

    assert_eq!(query.select(1, 0, &all(3)).unwrap(), vec![]);
    // a deep version request must not resurrect the record
    assert_eq!(query.select_version(1, 0, &all(3), -3).unwrap(), vec![]);
    assert_eq!(query.sum(0, 10, 2), None);
    assert_eq!(table.locate(1), None);

    assert!(!query.delete(1));
    // the key is free for reuse with a fresh RID
    assert!(query.insert(&[1, 1, 1]));
    let records = query.select(1, 0, &all(3)).unwrap();
    assert_eq!(records[0].columns, vec![Some(1), Some(1), Some(1)]);
}

#[test]
fn test_sum_over_key_range() {
    let (_dir, _table, query) = setup(3, 0);
    for key in 1..=5 {
        assert!(query.insert(&[key, key * 10, key * 100]));
    }

    assert_eq!(query.sum(1, 5, 2), Some(1500));
    assert_eq!(query.sum(2, 3, 1), Some(50));
    assert_eq!(query.sum(1, 1, 0), Some(1));
    // no keys in range is a failure, not zero
    assert_eq!(query.sum(50, 90, 2), None);
}

#[test]
fn test_sum_version_sees_old_state() {
    let (_dir, _table, query) = setup(2, 0);
    for key in 1..=3 {
        assert!(query.insert(&[key, 10]));
    }
    assert!(query.update(2, &set(&[(1, 50)], 2)));

    assert_eq!(query.sum(1, 3, 1), Some(70));
    assert_eq!(query.sum_version(1, 3, 1, -1), Some(30));
}

#[test]
fn test_increment() {
    let (_dir, _table, query) = setup(2, 0);
    assert!(query.insert(&[1, 7]));

    assert!(query.increment(1, 1));
    assert!(query.increment(1, 1));

    let records = query.select(1, 0, &all(2)).unwrap();
    assert_eq!(records[0].columns, vec![Some(1), Some(9)]);

    assert!(!query.increment(404, 1));
    assert!(!query.increment(1, 9));
}

#[test]
fn test_projection_placeholders() {
    let (_dir, _table, query) = setup(3, 0);
    assert!(query.insert(&[1, 10, 20]));

    let records = query.select(1, 0, &[true, false, true]).unwrap();
    assert_eq!(records[0].columns, vec![Some(1), None, Some(20)]);

    // wrong projection width is a failure
    assert_eq!(query.select(1, 0, &[true, false]), None);
}

#[test]
fn test_select_on_secondary_index() {
    let (_dir, _table, query) = setup(2, 0);
    assert!(query.insert(&[1, 55]));
    assert!(query.insert(&[2, 55]));
    assert!(query.insert(&[3, 66]));

    // unindexed column locates nothing
    assert_eq!(query.select(55, 1, &all(2)).unwrap(), vec![]);

    assert!(query.create_index(1));
    let mut keys: Vec<i64> = query
        .select(55, 1, &all(2))
        .unwrap()
        .iter()
        .map(|r| r.key)
        .collect();
    keys.sort_unstable();
    assert_eq!(keys, vec![1, 2]);
}

#[test]
fn test_create_index_backfills_latest_values() {
    let (_dir, _table, query) = setup(2, 0);
    assert!(query.insert(&[1, 10]));
    assert!(query.update(1, &set(&[(1, 20)], 2)));

    assert!(query.create_index(1));
    assert_eq!(query.select(20, 1, &all(2)).unwrap().len(), 1);
    assert_eq!(query.select(10, 1, &all(2)).unwrap(), vec![]);

    assert!(!query.create_index(1));
    assert!(!query.create_index(9));
    assert!(query.drop_index(1));
    assert!(!query.drop_index(0));
}

#[test]
fn test_page_range_rollover() {
    let (_dir, table, query) = setup(1, 0);

    let range_capacity = (BASE_PAGES_PER_RANGE * LOGICAL_PAGE_CAPACITY) as i64;
    for key in 0..range_capacity {
        assert!(query.insert(&[key]));
    }
    assert_eq!(table.active_range(), 1);

    assert!(query.insert(&[range_capacity]));
    let location = table.locate(table.index().locate(0, range_capacity)[0]).unwrap();
    assert_eq!(location.range_index, 1);

    // records on both sides of the rollover stay reachable
    assert_eq!(query.select(0, 0, &[true]).unwrap().len(), 1);
    assert_eq!(query.select(range_capacity, 0, &[true]).unwrap().len(), 1);
}

#[test]
fn test_updates_of_deleted_then_reinserted_key_use_new_chain() {
    let (_dir, _table, query) = setup(2, 0);
    assert!(query.insert(&[1, 10]));
    assert!(query.update(1, &set(&[(1, 11)], 2)));
    assert!(query.delete(1));

    assert!(query.insert(&[1, 500]));
    assert!(query.update(1, &set(&[(1, 501)], 2)));

    let latest = query.select(1, 0, &all(2)).unwrap();
    assert_eq!(latest[0].columns, vec![Some(1), Some(501)]);
    // the old chain's history is gone for good
    let old = query.select_version(1, 0, &all(2), -1).unwrap();
    assert_eq!(old[0].columns, vec![Some(1), Some(500)]);
}
