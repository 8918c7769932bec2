use serde::{Deserialize, Serialize};

use super::error::{StorageError, StorageResult};
use super::logical_page::LogicalPage;
use super::{BASE_PAGES_PER_RANGE, NUM_METADATA_COLUMNS};

/// Base/tail cursor counters persisted as structured metadata with the range
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PageRangeMeta {
    pub regular_columns: usize,
    pub base_pages_index: usize,
    pub base_pages_slot: usize,
    pub tail_pages_index: usize,
    pub tail_pages_slot: usize,
}

/// A bounded sequence of base logical pages (capacity 16, 65536 base-record
/// slots) plus an unbounded sequence of tail logical pages holding version
/// history for the same slice of the table.
pub struct PageRange {
    regular_columns: usize,
    base_pages: Vec<LogicalPage>,
    tail_pages: Vec<LogicalPage>,
}

impl PageRange {
    /// Create an empty range for `regular_columns` data columns
    pub fn new(regular_columns: usize) -> Self {
        Self {
            regular_columns,
            base_pages: vec![LogicalPage::new(regular_columns)],
            tail_pages: vec![LogicalPage::new(regular_columns)],
        }
    }

    /// Reassemble a range from persisted logical pages
    pub fn from_parts(
        meta: PageRangeMeta,
        base_pages: Vec<LogicalPage>,
        tail_pages: Vec<LogicalPage>,
    ) -> StorageResult<Self> {
        if base_pages.is_empty() || tail_pages.is_empty() {
            return Err(StorageError::Corrupt(
                "page range needs at least one base and one tail page".to_string(),
            ));
        }
        if base_pages.len() > BASE_PAGES_PER_RANGE {
            return Err(StorageError::Corrupt(format!(
                "page range holds {} base pages, limit is {}",
                base_pages.len(),
                BASE_PAGES_PER_RANGE
            )));
        }
        let all_pages = base_pages.iter().chain(tail_pages.iter());
        for page in all_pages {
            if page.regular_columns() != meta.regular_columns {
                return Err(StorageError::Corrupt(format!(
                    "logical page has {} data columns, range expects {}",
                    page.regular_columns(),
                    meta.regular_columns
                )));
            }
        }

        Ok(Self {
            regular_columns: meta.regular_columns,
            base_pages,
            tail_pages,
        })
    }

    /// Number of data columns
    pub fn regular_columns(&self) -> usize {
        self.regular_columns
    }

    /// Total column count, metadata included
    pub fn total_columns(&self) -> usize {
        NUM_METADATA_COLUMNS + self.regular_columns
    }

    /// Base logical pages, oldest first
    pub fn base_pages(&self) -> &[LogicalPage] {
        &self.base_pages
    }

    /// Tail logical pages, oldest first
    pub fn tail_pages(&self) -> &[LogicalPage] {
        &self.tail_pages
    }

    /// Persistable cursor metadata for this range
    pub fn meta(&self) -> PageRangeMeta {
        PageRangeMeta {
            regular_columns: self.regular_columns,
            base_pages_index: self.base_pages.len() - 1,
            base_pages_slot: self
                .base_pages
                .last()
                .map(LogicalPage::num_records)
                .unwrap_or(0),
            tail_pages_index: self.tail_pages.len() - 1,
            tail_pages_slot: self
                .tail_pages
                .last()
                .map(LogicalPage::num_records)
                .unwrap_or(0),
        }
    }

    /// True while another base record fits in this range
    pub fn has_base_page_capacity(&self) -> bool {
        self.base_pages.len() < BASE_PAGES_PER_RANGE
            || self.base_pages[self.base_pages.len() - 1].has_capacity()
    }

    /// Append a full base record, returning `(page_index, slot)`.
    /// The caller (table) is responsible for rolling over to a new range once
    /// base capacity is exhausted.
    pub fn write_base_record(&mut self, record: &[i64]) -> StorageResult<(usize, usize)> {
        if !self.has_base_page_capacity() {
            return Err(StorageError::CapacityExceeded(self.base_pages.len()));
        }
        if !self.base_pages[self.base_pages.len() - 1].has_capacity() {
            self.base_pages.push(LogicalPage::new(self.regular_columns));
        }

        let page_index = self.base_pages.len() - 1;
        let slot = self.base_pages[page_index].write_record(record)?;
        Ok((page_index, slot))
    }

    /// Append a full tail record, returning `(page_index, slot)`.
    /// Tail pages grow without bound.
    pub fn write_tail_record(&mut self, record: &[i64]) -> StorageResult<(usize, usize)> {
        if !self.tail_pages[self.tail_pages.len() - 1].has_capacity() {
            self.tail_pages.push(LogicalPage::new(self.regular_columns));
        }

        let page_index = self.tail_pages.len() - 1;
        let slot = self.tail_pages[page_index].write_record(record)?;
        Ok((page_index, slot))
    }

    /// Read a base record: all metadata values plus the projected data values
    pub fn read_base_record(
        &self,
        page_index: usize,
        slot: usize,
        projection: &[bool],
    ) -> StorageResult<([i64; NUM_METADATA_COLUMNS], Vec<Option<i64>>)> {
        let page = self.base_page(page_index)?;
        Ok((page.read_metadata_at(slot)?, page.read_record_at(slot, projection)?))
    }

    /// Read a tail record: all metadata values plus the projected data values
    pub fn read_tail_record(
        &self,
        page_index: usize,
        slot: usize,
        projection: &[bool],
    ) -> StorageResult<([i64; NUM_METADATA_COLUMNS], Vec<Option<i64>>)> {
        let page = self.tail_page(page_index)?;
        Ok((page.read_metadata_at(slot)?, page.read_record_at(slot, projection)?))
    }

    /// In-place overwrite of one column of a base record
    pub fn update_base_record_column(
        &mut self,
        page_index: usize,
        slot: usize,
        column: usize,
        value: i64,
    ) -> StorageResult<()> {
        let num_pages = self.base_pages.len();
        self.base_pages
            .get_mut(page_index)
            .ok_or(StorageError::OutOfRange {
                slot: page_index,
                num_records: num_pages,
            })?
            .update_column(column, slot, value)
    }

    /// In-place overwrite of one column of a tail record
    pub fn update_tail_record_column(
        &mut self,
        page_index: usize,
        slot: usize,
        column: usize,
        value: i64,
    ) -> StorageResult<()> {
        let num_pages = self.tail_pages.len();
        self.tail_pages
            .get_mut(page_index)
            .ok_or(StorageError::OutOfRange {
                slot: page_index,
                num_records: num_pages,
            })?
            .update_column(column, slot, value)
    }

    fn base_page(&self, page_index: usize) -> StorageResult<&LogicalPage> {
        self.base_pages.get(page_index).ok_or(StorageError::OutOfRange {
            slot: page_index,
            num_records: self.base_pages.len(),
        })
    }

    fn tail_page(&self, page_index: usize) -> StorageResult<&LogicalPage> {
        self.tail_pages.get(page_index).ok_or(StorageError::OutOfRange {
            slot: page_index,
            num_records: self.tail_pages.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{LOGICAL_PAGE_CAPACITY, RID_COLUMN};

    fn record(rid: i64, columns: &[i64]) -> Vec<i64> {
        let mut rec = vec![0, rid, 1000, 0];
        rec.extend_from_slice(columns);
        rec
    }

    #[test]
    fn test_base_and_tail_writes_are_separate() {
        let mut range = PageRange::new(2);

        let (bpage, bslot) = range.write_base_record(&record(1, &[10, 20])).unwrap();
        let (tpage, tslot) = range.write_tail_record(&record(2, &[11, 20])).unwrap();
        assert_eq!((bpage, bslot), (0, 0));
        assert_eq!((tpage, tslot), (0, 0));

        let (meta, values) = range.read_base_record(0, 0, &[true, true]).unwrap();
        assert_eq!(meta[RID_COLUMN], 1);
        assert_eq!(values, vec![Some(10), Some(20)]);

        let (meta, values) = range.read_tail_record(0, 0, &[true, false]).unwrap();
        assert_eq!(meta[RID_COLUMN], 2);
        assert_eq!(values, vec![Some(11), None]);
    }

    #[test]
    fn test_base_page_rollover_within_range() {
        let mut range = PageRange::new(1);
        for i in 0..LOGICAL_PAGE_CAPACITY {
            let (page, _) = range.write_base_record(&record(i as i64 + 1, &[0])).unwrap();
            assert_eq!(page, 0);
        }
        let (page, slot) = range.write_base_record(&record(90000, &[0])).unwrap();
        assert_eq!((page, slot), (1, 0));
        assert_eq!(range.base_pages().len(), 2);
    }

    #[test]
    fn test_tail_pages_grow_without_bound() {
        let mut range = PageRange::new(1);
        for i in 0..(LOGICAL_PAGE_CAPACITY * 2 + 1) {
            range.write_tail_record(&record(i as i64 + 1, &[0])).unwrap();
        }
        assert_eq!(range.tail_pages().len(), 3);
    }

    #[test]
    fn test_update_record_columns() {
        let mut range = PageRange::new(1);
        range.write_base_record(&record(1, &[5])).unwrap();
        range.write_tail_record(&record(2, &[6])).unwrap();

        range.update_base_record_column(0, 0, RID_COLUMN, 0).unwrap();
        range.update_tail_record_column(0, 0, RID_COLUMN, 99).unwrap();

        let (meta, _) = range.read_base_record(0, 0, &[false]).unwrap();
        assert_eq!(meta[RID_COLUMN], 0);
        let (meta, _) = range.read_tail_record(0, 0, &[false]).unwrap();
        assert_eq!(meta[RID_COLUMN], 99);

        assert!(range.update_base_record_column(7, 0, RID_COLUMN, 0).is_err());
    }

    #[test]
    fn test_meta_tracks_cursors() {
        let mut range = PageRange::new(1);
        range.write_base_record(&record(1, &[0])).unwrap();
        range.write_base_record(&record(2, &[0])).unwrap();
        range.write_tail_record(&record(3, &[0])).unwrap();

        let meta = range.meta();
        assert_eq!(meta.base_pages_index, 0);
        assert_eq!(meta.base_pages_slot, 2);
        assert_eq!(meta.tail_pages_index, 0);
        assert_eq!(meta.tail_pages_slot, 1);
    }
}
