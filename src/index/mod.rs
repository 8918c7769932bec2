//! Per-column value indexes

mod error;

pub use error::{IndexError, IndexResult};

use std::collections::BTreeMap;

use ahash::AHashSet;

use crate::storage::{NUM_METADATA_COLUMNS, RID_COLUMN, Rid};

/// One ordered map per indexed column, mapping column value to the set of
/// live base-record RIDs carrying that value. The primary-key column is
/// always indexed; other columns can be indexed on demand.
pub struct Index {
    key: usize,
    num_columns: usize,
    indices: Vec<Option<BTreeMap<i64, AHashSet<Rid>>>>,
}

impl Index {
    /// Create the index set for a table with `num_columns` data columns and
    /// its primary key at `key`
    pub fn new(num_columns: usize, key: usize) -> Self {
        let mut indices: Vec<Option<BTreeMap<i64, AHashSet<Rid>>>> =
            (0..num_columns).map(|_| None).collect();
        indices[key] = Some(BTreeMap::new());
        Self {
            key,
            num_columns,
            indices,
        }
    }

    /// Primary-key column number
    pub fn key(&self) -> usize {
        self.key
    }

    /// True if `column` currently has an index
    pub fn is_indexed(&self, column: usize) -> bool {
        self.indices.get(column).is_some_and(Option::is_some)
    }

    /// Columns that currently have an index, primary key included
    pub fn indexed_columns(&self) -> Vec<usize> {
        self.indices
            .iter()
            .enumerate()
            .filter_map(|(column, index)| index.as_ref().map(|_| column))
            .collect()
    }

    /// Register a full record (metadata + data values) with every indexed
    /// column
    pub fn add(&mut self, record: &[i64]) -> IndexResult<()> {
        self.check_arity(record)?;
        let rid = record[RID_COLUMN];

        for (column, index) in self.indices.iter_mut().enumerate() {
            if let Some(map) = index {
                let value = record[NUM_METADATA_COLUMNS + column];
                map.entry(value).or_default().insert(rid);
            }
        }
        Ok(())
    }

    /// Remove a record from every indexed column, dropping values whose RID
    /// set becomes empty
    pub fn delete(&mut self, record: &[i64]) -> IndexResult<()> {
        self.check_arity(record)?;
        let rid = record[RID_COLUMN];

        for (column, index) in self.indices.iter_mut().enumerate() {
            if let Some(map) = index {
                let value = record[NUM_METADATA_COLUMNS + column];
                let rids = map
                    .get_mut(&value)
                    .ok_or(IndexError::KeyNotFound { column, value })?;
                rids.remove(&rid);
                if rids.is_empty() {
                    map.remove(&value);
                }
            }
        }
        Ok(())
    }

    /// RIDs of all records with `value` on `column`, empty if none
    pub fn locate(&self, column: usize, value: i64) -> Vec<Rid> {
        let Some(Some(map)) = self.indices.get(column) else {
            return Vec::new();
        };
        let mut rids: Vec<Rid> = map
            .get(&value)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        rids.sort_unstable();
        rids
    }

    /// RIDs of all records whose `column` value lies in `[begin, end]`
    pub fn locate_range(&self, column: usize, begin: i64, end: i64) -> Vec<Rid> {
        let Some(Some(map)) = self.indices.get(column) else {
            return Vec::new();
        };
        let mut rids: Vec<Rid> = map
            .range(begin..=end)
            .flat_map(|(_, set)| set.iter().copied())
            .collect();
        rids.sort_unstable();
        rids.dedup();
        rids
    }

    /// Distinct `column` values present in `[begin, end]`
    pub fn keys_in_range(&self, column: usize, begin: i64, end: i64) -> Vec<i64> {
        let Some(Some(map)) = self.indices.get(column) else {
            return Vec::new();
        };
        map.range(begin..=end).map(|(value, _)| *value).collect()
    }

    /// Build an index on `column` from pre-materialized `(value, rid)`
    /// entries. The caller scans live records through the primary-key index;
    /// the one-time cost is O(n).
    pub fn create_index<I>(&mut self, column: usize, entries: I) -> IndexResult<()>
    where
        I: IntoIterator<Item = (i64, Rid)>,
    {
        if column >= self.num_columns {
            return Err(IndexError::InvalidColumn(column));
        }
        if self.is_indexed(column) {
            return Err(IndexError::AlreadyIndexed(column));
        }

        let mut map: BTreeMap<i64, AHashSet<Rid>> = BTreeMap::new();
        for (value, rid) in entries {
            map.entry(value).or_default().insert(rid);
        }
        self.indices[column] = Some(map);
        Ok(())
    }

    /// Drop the index on `column`. The primary-key index cannot be dropped.
    pub fn drop_index(&mut self, column: usize) -> IndexResult<()> {
        if column >= self.num_columns {
            return Err(IndexError::InvalidColumn(column));
        }
        if column == self.key {
            return Err(IndexError::AlreadyIndexed(column));
        }
        if !self.is_indexed(column) {
            return Err(IndexError::NotIndexed(column));
        }
        self.indices[column] = None;
        Ok(())
    }

    fn check_arity(&self, record: &[i64]) -> IndexResult<()> {
        let expected = NUM_METADATA_COLUMNS + self.num_columns;
        if record.len() != expected {
            return Err(IndexError::SchemaMismatch {
                expected,
                actual: record.len(),
            });
        }
        Ok(())
    }
}
