use tempfile::TempDir;

use super::{Database, DatabaseError};
use crate::query::{ColumnUpdate, Query};

fn all(num_columns: usize) -> Vec<bool> {
    vec![true; num_columns]
}

#[test]
fn test_create_get_drop_table() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path()).unwrap();

    let table = db.create_table("grades", 3, 0).unwrap();
    assert_eq!(table.num_columns(), 3);
    assert!(db.get_table("grades").is_some());

    assert!(matches!(
        db.create_table("grades", 3, 0),
        Err(DatabaseError::TableExists(_))
    ));
    assert!(matches!(
        db.create_table("bad", 2, 5),
        Err(DatabaseError::InvalidKeyColumn { key: 5, .. })
    ));

    db.drop_table("grades").unwrap();
    assert!(db.get_table("grades").is_none());
    assert!(matches!(
        db.drop_table("grades"),
        Err(DatabaseError::TableNotFound(_))
    ));
}

#[test]
fn test_close_and_reopen_round_trip() {
    let dir = TempDir::new().unwrap();

    {
        let db = Database::open(dir.path()).unwrap();
        let table = db.create_table("grades", 3, 0).unwrap();
        let query = Query::new(table);
        for key in 1..=10 {
            assert!(query.insert(&[key, key * 2, key * 3]));
        }
        let mut updates = ColumnUpdate::none(3);
        updates[1] = ColumnUpdate::Set(777);
        assert!(query.update(4, &updates));
        assert!(query.delete(9));
        db.close().unwrap();
    }

    let db = Database::open(dir.path()).unwrap();
    let table = db.get_table("grades").unwrap();
    let query = Query::new(table);

    let records = query.select(4, 0, &all(3)).unwrap();
    assert_eq!(records[0].columns, vec![Some(4), Some(777), Some(12)]);
    // version history survived the round trip
    let records = query.select_version(4, 0, &all(3), -1).unwrap();
    assert_eq!(records[0].columns, vec![Some(4), Some(8), Some(12)]);

    // the deleted record stayed deleted
    assert_eq!(query.select(9, 0, &all(3)).unwrap(), vec![]);
    assert_eq!(query.sum(1, 10, 0), Some(1 + 2 + 3 + 4 + 5 + 6 + 7 + 8 + 10));

    // RIDs continue past the restored counter instead of colliding
    assert!(query.insert(&[50, 0, 0]));
    let restored = query.select(50, 0, &all(3)).unwrap();
    assert!(restored[0].rid > 11);
}

#[test]
fn test_reopen_restores_secondary_indexes() {
    let dir = TempDir::new().unwrap();

    {
        let db = Database::open(dir.path()).unwrap();
        let table = db.create_table("grades", 2, 0).unwrap();
        let query = Query::new(table);
        assert!(query.insert(&[1, 55]));
        assert!(query.insert(&[2, 55]));
        assert!(query.create_index(1));
        db.close().unwrap();
    }

    let db = Database::open(dir.path()).unwrap();
    let query = Query::new(db.get_table("grades").unwrap());
    assert_eq!(query.select(55, 1, &all(2)).unwrap().len(), 2);
}

#[test]
fn test_dropped_table_leaves_no_files() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path()).unwrap();

    let table = db.create_table("scratch", 2, 0).unwrap();
    let query = Query::new(table);
    assert!(query.insert(&[1, 2]));
    db.close().unwrap();
    assert!(dir.path().join("scratch").is_dir());

    db.drop_table("scratch").unwrap();
    assert!(!dir.path().join("scratch").is_dir());
}

#[test]
fn test_multiple_tables_share_the_pool() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path()).unwrap();

    let first = Query::new(db.create_table("first", 2, 0).unwrap());
    let second = Query::new(db.create_table("second", 2, 1).unwrap());

    assert!(first.insert(&[1, 10]));
    assert!(second.insert(&[10, 1]));

    assert_eq!(first.select(1, 0, &all(2)).unwrap().len(), 1);
    // second table is keyed on column 1
    assert_eq!(second.select(1, 1, &all(2)).unwrap().len(), 1);
}
