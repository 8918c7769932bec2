//! Query engine: insert/select/update/delete/aggregate over the page
//! hierarchy, implementing the MVCC base/tail delta-chain protocol.
//!
//! Every public query returns a `bool` or `Option<_>`; lower-layer failures
//! never cross the query boundary. The fallible internals live in the
//! `try_*` methods.

mod error;
#[cfg(test)]
mod tests;

pub use error::{QueryError, QueryResult};

use std::sync::Arc;

use log::debug;

use crate::index::IndexError;
use crate::storage::{
    INDIRECTION_COLUMN, NUM_METADATA_COLUMNS, PageRange, RID_COLUMN, RID_INVALID, Rid,
    SCHEMA_ENCODING_COLUMN,
};
use crate::table::{Record, RecordKind, RecordLocation, Table, now};

/// One column of an update: leave it alone or set a new value.
/// Zero is a legitimate column value, so "unchanged" is its own variant
/// rather than a sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnUpdate {
    Unchanged,
    Set(i64),
}

impl ColumnUpdate {
    /// An all-`Unchanged` update of the given width
    pub fn none(num_columns: usize) -> Vec<ColumnUpdate> {
        vec![ColumnUpdate::Unchanged; num_columns]
    }
}

/// Performs queries on one table
pub struct Query {
    table: Arc<Table>,
}

impl Query {
    pub fn new(table: Arc<Table>) -> Self {
        Self { table }
    }

    /// Insert a record. False on wrong column count or duplicate primary key.
    pub fn insert(&self, columns: &[i64]) -> bool {
        match self.try_insert(columns) {
            Ok(()) => true,
            Err(err) => {
                debug!("insert failed: {}", err);
                false
            }
        }
    }

    /// Read the latest version of every record whose `search_key_column`
    /// equals `search_key`. `None` on failure, `Some(vec![])` when no record
    /// matches.
    pub fn select(
        &self,
        search_key: i64,
        search_key_column: usize,
        projection: &[bool],
    ) -> Option<Vec<Record>> {
        self.select_version(search_key, search_key_column, projection, 0)
    }

    /// Read a relative version (`0` = latest, `-1` = one older, …) of every
    /// matching record, saturating at the originally inserted state when the
    /// chain is shorter than requested.
    pub fn select_version(
        &self,
        search_key: i64,
        search_key_column: usize,
        projection: &[bool],
        relative_version: i64,
    ) -> Option<Vec<Record>> {
        match self.try_select_version(search_key, search_key_column, projection, relative_version)
        {
            Ok(records) => Some(records),
            Err(err) => {
                debug!("select failed: {}", err);
                None
            }
        }
    }

    /// Update the record(s) with the given primary key. False when the key
    /// does not exist or the update tries to change the primary key itself.
    pub fn update(&self, primary_key: i64, updates: &[ColumnUpdate]) -> bool {
        match self.try_update(primary_key, updates) {
            Ok(()) => true,
            Err(err) => {
                debug!("update failed: {}", err);
                false
            }
        }
    }

    /// Tombstone the record(s) with the given primary key. Tail versions are
    /// left in place; their space is never reclaimed.
    pub fn delete(&self, primary_key: i64) -> bool {
        match self.try_delete(primary_key) {
            Ok(()) => true,
            Err(err) => {
                debug!("delete failed: {}", err);
                false
            }
        }
    }

    /// Sum `column` over the latest version of all records with primary keys
    /// in `[start, end]`. `None` when no record falls in the range.
    pub fn sum(&self, start: i64, end: i64, column: usize) -> Option<i64> {
        self.sum_version(start, end, column, 0)
    }

    /// Sum `column` at a relative version over all records with primary keys
    /// in `[start, end]`
    pub fn sum_version(
        &self,
        start: i64,
        end: i64,
        column: usize,
        relative_version: i64,
    ) -> Option<i64> {
        match self.try_sum_version(start, end, column, relative_version) {
            Ok(total) => Some(total),
            Err(err) => {
                debug!("sum failed: {}", err);
                None
            }
        }
    }

    /// Add one to `column` of the record with the given primary key
    pub fn increment(&self, key: i64, column: usize) -> bool {
        let num_columns = self.table.num_columns();
        if column >= num_columns {
            return false;
        }

        let projection = vec![true; num_columns];
        let records = match self.select(key, self.table.key(), &projection) {
            Some(records) => records,
            None => return false,
        };
        let Some(record) = records.first() else {
            return false;
        };

        let mut updates = ColumnUpdate::none(num_columns);
        updates[column] = ColumnUpdate::Set(record.columns[column].unwrap_or(0) + 1);
        self.update(key, &updates)
    }

    /// Build an index on `column` by scanning all live records through the
    /// primary-key index. One-time O(n) cost.
    pub fn create_index(&self, column: usize) -> bool {
        match self.try_create_index(column) {
            Ok(()) => true,
            Err(err) => {
                debug!("create_index failed: {}", err);
                false
            }
        }
    }

    /// Drop the index on `column`; the primary-key index stays
    pub fn drop_index(&self, column: usize) -> bool {
        self.table.index_mut().drop_index(column).is_ok()
    }

    // ---- fallible internals ----

    fn try_insert(&self, columns: &[i64]) -> QueryResult<()> {
        let num_columns = self.table.num_columns();
        if columns.len() != num_columns {
            return Err(QueryError::SchemaMismatch {
                expected: num_columns,
                actual: columns.len(),
            });
        }

        let key = columns[self.table.key()];
        if !self.table.index().locate(self.table.key(), key).is_empty() {
            return Err(QueryError::DuplicateKey(key));
        }

        let rid = self.table.new_rid();
        let mut record = Vec::with_capacity(NUM_METADATA_COLUMNS + num_columns);
        record.push(RID_INVALID); // indirection: no versions yet
        record.push(rid);
        record.push(now());
        record.push(0); // schema encoding
        record.extend_from_slice(columns);

        // Find a range with base capacity, rolling over when the active one
        // is exhausted.
        let location = loop {
            let range_index = self.table.active_range();
            let frame =
                self.table
                    .pool()
                    .get_frame(self.table.name(), range_index, num_columns)?;
            let mut range = frame.page_range_mut();
            if !range.has_base_page_capacity() {
                drop(range);
                self.table.advance_range(range_index);
                continue;
            }

            let (page_index, slot) = range.write_base_record(&record)?;
            let exhausted = !range.has_base_page_capacity();
            drop(range);
            if exhausted {
                self.table.advance_range(range_index);
            }
            break RecordLocation {
                range_index,
                page_index,
                slot,
                kind: RecordKind::Base,
            };
        };

        self.table.set_location(rid, location);
        self.table.index_mut().add(&record)?;
        Ok(())
    }

    fn try_select_version(
        &self,
        search_key: i64,
        search_key_column: usize,
        projection: &[bool],
        relative_version: i64,
    ) -> QueryResult<Vec<Record>> {
        let num_columns = self.table.num_columns();
        if projection.len() != num_columns {
            return Err(QueryError::SchemaMismatch {
                expected: num_columns,
                actual: projection.len(),
            });
        }

        let rids = self.table.index().locate(search_key_column, search_key);

        // always read the primary key so the record can carry it
        let mut internal = projection.to_vec();
        internal[self.table.key()] = true;

        let mut records = Vec::with_capacity(rids.len());
        for rid in rids {
            let Some(location) = self.table.locate(rid) else {
                continue;
            };
            let frame = self.table.pool().get_frame(
                self.table.name(),
                location.range_index,
                num_columns,
            )?;
            let range = frame.page_range();
            let Some((base_rid, values)) =
                self.read_version(&range, location, &internal, relative_version)?
            else {
                continue;
            };

            let key = values[self.table.key()].unwrap_or(search_key);
            let columns = values
                .iter()
                .zip(projection)
                .map(|(value, wanted)| if *wanted { *value } else { None })
                .collect();
            records.push(Record {
                rid: base_rid,
                key,
                columns,
            });
        }
        Ok(records)
    }

    fn try_update(&self, primary_key: i64, updates: &[ColumnUpdate]) -> QueryResult<()> {
        let num_columns = self.table.num_columns();
        if updates.len() != num_columns {
            return Err(QueryError::SchemaMismatch {
                expected: num_columns,
                actual: updates.len(),
            });
        }
        if let ColumnUpdate::Set(value) = updates[self.table.key()]
            && value != primary_key
        {
            return Err(QueryError::PrimaryKeyImmutable);
        }

        let rids = self.table.index().locate(self.table.key(), primary_key);
        if rids.is_empty() {
            return Err(QueryError::NoSuchKey(primary_key));
        }

        for rid in rids {
            self.update_one(rid, updates)?;
        }
        Ok(())
    }

    // Append one tail version for the base record at `rid` and retarget the
    // base's indirection and schema encoding.
    fn update_one(&self, rid: Rid, updates: &[ColumnUpdate]) -> QueryResult<()> {
        let num_columns = self.table.num_columns();
        let location = self.table.locate(rid).ok_or(QueryError::NotFound(rid))?;
        let frame =
            self.table
                .pool()
                .get_frame(self.table.name(), location.range_index, num_columns)?;

        let mut range = frame.page_range_mut();
        let all = vec![true; num_columns];
        let (meta, base_values) =
            range.read_base_record(location.page_index, location.slot, &all)?;
        if meta[RID_COLUMN] == RID_INVALID {
            return Err(QueryError::NotFound(rid));
        }
        let base_rid = meta[RID_COLUMN];
        let newest_tail = meta[INDIRECTION_COLUMN];

        // Current materialized state: the newest tail merged over the base,
        // or the base itself when no version exists yet.
        let (previous_schema, previous_values) = if newest_tail == RID_INVALID {
            let values = base_values.iter().map(|v| v.unwrap_or(0)).collect::<Vec<_>>();
            (0, values)
        } else {
            let tail_location = self
                .table
                .locate(newest_tail)
                .ok_or(QueryError::NotFound(newest_tail))?;
            let (tail_meta, tail_values) =
                range.read_tail_record(tail_location.page_index, tail_location.slot, &all)?;
            let schema = tail_meta[SCHEMA_ENCODING_COLUMN];
            let values = merge_columns(&base_values, &tail_values, schema);
            (schema, values)
        };

        let change_bits = updates.iter().enumerate().fold(0i64, |bits, (i, update)| {
            match update {
                ColumnUpdate::Set(_) => bits | (1 << i),
                ColumnUpdate::Unchanged => bits,
            }
        });
        let cumulative_schema = previous_schema | change_bits;

        // New values as given; columns already in the chain copied forward
        // from the previous tail; everything else zero-filled (the schema
        // bitmap makes those slots unreachable).
        let tail_columns: Vec<i64> = updates
            .iter()
            .enumerate()
            .map(|(i, update)| match update {
                ColumnUpdate::Set(value) => *value,
                ColumnUpdate::Unchanged if previous_schema & (1 << i) != 0 => previous_values[i],
                ColumnUpdate::Unchanged => 0,
            })
            .collect();

        let tail_rid = self.table.new_rid();
        let indirection = if newest_tail == RID_INVALID {
            base_rid
        } else {
            newest_tail
        };
        let mut tail_record = Vec::with_capacity(NUM_METADATA_COLUMNS + num_columns);
        tail_record.push(indirection);
        tail_record.push(tail_rid);
        tail_record.push(now());
        tail_record.push(cumulative_schema);
        tail_record.extend_from_slice(&tail_columns);

        let (tail_page, tail_slot) = range.write_tail_record(&tail_record)?;
        self.table.set_location(
            tail_rid,
            RecordLocation {
                range_index: location.range_index,
                page_index: tail_page,
                slot: tail_slot,
                kind: RecordKind::Tail,
            },
        );

        range.update_base_record_column(
            location.page_index,
            location.slot,
            INDIRECTION_COLUMN,
            tail_rid,
        )?;
        range.update_base_record_column(
            location.page_index,
            location.slot,
            SCHEMA_ENCODING_COLUMN,
            cumulative_schema,
        )?;
        drop(range);

        // Index entries are keyed by materialized values, so maintenance
        // needs the full before/after images.
        let new_values: Vec<i64> = updates
            .iter()
            .enumerate()
            .map(|(i, update)| match update {
                ColumnUpdate::Set(value) => *value,
                ColumnUpdate::Unchanged => previous_values[i],
            })
            .collect();
        if new_values != previous_values {
            let mut index = self.table.index_mut();
            index.delete(&indexed_record(base_rid, &previous_values))?;
            index.add(&indexed_record(base_rid, &new_values))?;
        }
        Ok(())
    }

    fn try_delete(&self, primary_key: i64) -> QueryResult<()> {
        let num_columns = self.table.num_columns();
        let rids = self.table.index().locate(self.table.key(), primary_key);
        if rids.is_empty() {
            return Err(QueryError::NoSuchKey(primary_key));
        }

        for rid in rids {
            let location = self.table.locate(rid).ok_or(QueryError::NotFound(rid))?;
            let frame = self.table.pool().get_frame(
                self.table.name(),
                location.range_index,
                num_columns,
            )?;

            let mut range = frame.page_range_mut();
            let all = vec![true; num_columns];
            let (meta, base_values) =
                range.read_base_record(location.page_index, location.slot, &all)?;
            if meta[RID_COLUMN] == RID_INVALID {
                return Err(QueryError::NotFound(rid));
            }
            let current_values = if meta[INDIRECTION_COLUMN] == RID_INVALID {
                base_values.iter().map(|v| v.unwrap_or(0)).collect::<Vec<_>>()
            } else {
                let tail_location = self
                    .table
                    .locate(meta[INDIRECTION_COLUMN])
                    .ok_or(QueryError::NotFound(meta[INDIRECTION_COLUMN]))?;
                let (tail_meta, tail_values) =
                    range.read_tail_record(tail_location.page_index, tail_location.slot, &all)?;
                merge_columns(&base_values, &tail_values, tail_meta[SCHEMA_ENCODING_COLUMN])
            };

            // tombstone the base; its tail chain stays, unreachable
            range.update_base_record_column(
                location.page_index,
                location.slot,
                RID_COLUMN,
                RID_INVALID,
            )?;
            drop(range);

            self.table
                .index_mut()
                .delete(&indexed_record(rid, &current_values))?;
            self.table.remove_location(rid);
        }
        Ok(())
    }

    fn try_sum_version(
        &self,
        start: i64,
        end: i64,
        column: usize,
        relative_version: i64,
    ) -> QueryResult<i64> {
        let num_columns = self.table.num_columns();
        if column >= num_columns {
            return Err(QueryError::SchemaMismatch {
                expected: num_columns,
                actual: column,
            });
        }

        let rids = self.table.index().locate_range(self.table.key(), start, end);

        let mut projection = vec![false; num_columns];
        projection[column] = true;

        let mut total = 0i64;
        let mut found = 0usize;
        for rid in rids {
            let Some(location) = self.table.locate(rid) else {
                continue;
            };
            let frame = self.table.pool().get_frame(
                self.table.name(),
                location.range_index,
                num_columns,
            )?;
            let range = frame.page_range();
            if let Some((_, values)) =
                self.read_version(&range, location, &projection, relative_version)?
            {
                total += values[column].unwrap_or(0);
                found += 1;
            }
        }

        if found == 0 {
            return Err(QueryError::EmptyRange { start, end });
        }
        Ok(total)
    }

    fn try_create_index(&self, column: usize) -> QueryResult<()> {
        let num_columns = self.table.num_columns();
        if column >= num_columns {
            return Err(IndexError::InvalidColumn(column).into());
        }
        if self.table.index().is_indexed(column) {
            return Err(IndexError::AlreadyIndexed(column).into());
        }

        let rids = self
            .table
            .index()
            .locate_range(self.table.key(), i64::MIN, i64::MAX);

        let mut projection = vec![false; num_columns];
        projection[column] = true;

        let mut entries = Vec::with_capacity(rids.len());
        for rid in rids {
            let Some(location) = self.table.locate(rid) else {
                continue;
            };
            let frame = self.table.pool().get_frame(
                self.table.name(),
                location.range_index,
                num_columns,
            )?;
            let range = frame.page_range();
            if let Some((base_rid, values)) = self.read_version(&range, location, &projection, 0)?
            {
                entries.push((values[column].unwrap_or(0), base_rid));
            }
        }

        self.table.index_mut().create_index(column, entries)?;
        Ok(())
    }

    /// Materialize the full current values for one base RID. Used when the
    /// index is rebuilt at database open.
    pub(crate) fn read_latest(&self, rid: Rid) -> QueryResult<Option<Vec<i64>>> {
        let num_columns = self.table.num_columns();
        let Some(location) = self.table.locate(rid) else {
            return Ok(None);
        };
        let frame =
            self.table
                .pool()
                .get_frame(self.table.name(), location.range_index, num_columns)?;
        let range = frame.page_range();
        let all = vec![true; num_columns];
        match self.read_version(&range, location, &all, 0)? {
            Some((_, values)) => Ok(Some(values.iter().map(|v| v.unwrap_or(0)).collect())),
            None => Ok(None),
        }
    }

    // Walk the version chain of the base record at `location` and return its
    // RID plus the projected values at `relative_version` (0 = latest).
    //
    // The chain is a reverse-chronological singly linked list: the base's
    // indirection names the newest tail, each tail's indirection the next
    // older one, and the oldest tail points back at the base RID. A request
    // deeper than the chain saturates at the original base state. Returns
    // None for tombstoned records.
    fn read_version(
        &self,
        range: &PageRange,
        location: RecordLocation,
        projection: &[bool],
        relative_version: i64,
    ) -> QueryResult<Option<(Rid, Vec<Option<i64>>)>> {
        let (meta, base_values) =
            range.read_base_record(location.page_index, location.slot, projection)?;
        if meta[RID_COLUMN] == RID_INVALID {
            return Ok(None);
        }
        let base_rid = meta[RID_COLUMN];
        if meta[INDIRECTION_COLUMN] == RID_INVALID {
            return Ok(Some((base_rid, base_values)));
        }

        let mut tail_rid = meta[INDIRECTION_COLUMN];
        let mut version = 0i64;
        loop {
            let tail_location = self
                .table
                .locate(tail_rid)
                .ok_or(QueryError::NotFound(tail_rid))?;
            let (tail_meta, tail_values) =
                range.read_tail_record(tail_location.page_index, tail_location.slot, projection)?;

            if version == relative_version {
                let schema = tail_meta[SCHEMA_ENCODING_COLUMN];
                let merged = base_values
                    .iter()
                    .zip(&tail_values)
                    .enumerate()
                    .map(|(i, (base, tail))| {
                        if schema & (1 << i) != 0 { *tail } else { *base }
                    })
                    .collect();
                return Ok(Some((base_rid, merged)));
            }

            if tail_meta[INDIRECTION_COLUMN] == base_rid {
                // chain exhausted: saturate at the originally inserted state
                return Ok(Some((base_rid, base_values)));
            }
            tail_rid = tail_meta[INDIRECTION_COLUMN];
            version -= 1;
        }
    }
}

// Merge fully-read tail values over base values using the tail's cumulative
// schema bitmap.
fn merge_columns(base: &[Option<i64>], tail: &[Option<i64>], schema: i64) -> Vec<i64> {
    base.iter()
        .zip(tail)
        .enumerate()
        .map(|(i, (base, tail))| {
            if schema & (1 << i) != 0 {
                tail.unwrap_or(0)
            } else {
                base.unwrap_or(0)
            }
        })
        .collect()
}

// A record image carrying just what the index needs: the base RID and the
// materialized data values.
fn indexed_record(rid: Rid, values: &[i64]) -> Vec<i64> {
    let mut record = vec![RID_INVALID, rid, 0, 0];
    record.extend_from_slice(values);
    record
}
