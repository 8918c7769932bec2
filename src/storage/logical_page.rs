use serde::{Deserialize, Serialize};

use super::error::{StorageError, StorageResult};
use super::page::PhysicalPage;
use super::{
    LOGICAL_PAGE_CAPACITY, NUM_METADATA_COLUMNS, PAGES_PER_COLUMN, SLOTS_PER_PAGE,
};

/// Structured metadata persisted alongside a logical page's column files
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LogicalPageMeta {
    pub regular_columns: usize,
    pub num_records: usize,
}

/// One logical column-page group: for every column (metadata + data) an
/// ordered sequence of physical pages, grown lazily up to 8 per column.
///
/// Invariant: all columns hold the same number of physical pages at all times.
pub struct LogicalPage {
    num_records: usize,
    regular_columns: usize,
    columns: Vec<Vec<PhysicalPage>>,
}

impl LogicalPage {
    /// Create an empty logical page for `regular_columns` data columns
    pub fn new(regular_columns: usize) -> Self {
        let total = NUM_METADATA_COLUMNS + regular_columns;
        Self {
            num_records: 0,
            regular_columns,
            columns: (0..total).map(|_| vec![PhysicalPage::new()]).collect(),
        }
    }

    /// Reassemble a logical page from persisted parts
    pub fn from_parts(
        meta: LogicalPageMeta,
        columns: Vec<Vec<PhysicalPage>>,
    ) -> StorageResult<Self> {
        let total = NUM_METADATA_COLUMNS + meta.regular_columns;
        if columns.len() != total {
            return Err(StorageError::Corrupt(format!(
                "logical page expects {} columns, got {}",
                total,
                columns.len()
            )));
        }

        let levels = Self::levels_for(meta.num_records);
        if columns.iter().any(|column| column.len() != levels) {
            return Err(StorageError::Corrupt(format!(
                "logical page with {} records expects {} physical pages per column",
                meta.num_records, levels
            )));
        }

        Ok(Self {
            num_records: meta.num_records,
            regular_columns: meta.regular_columns,
            columns,
        })
    }

    /// Physical pages per column implied by a record count
    pub fn levels_for(num_records: usize) -> usize {
        (num_records / SLOTS_PER_PAGE + 1).min(PAGES_PER_COLUMN)
    }

    /// Number of data columns (metadata excluded)
    pub fn regular_columns(&self) -> usize {
        self.regular_columns
    }

    /// Total column count, metadata included
    pub fn total_columns(&self) -> usize {
        NUM_METADATA_COLUMNS + self.regular_columns
    }

    /// Next free slot / number of records written
    pub fn num_records(&self) -> usize {
        self.num_records
    }

    /// True while fewer than 4096 records are stored
    pub fn has_capacity(&self) -> bool {
        self.num_records < LOGICAL_PAGE_CAPACITY
    }

    /// Persistable metadata for this page
    pub fn meta(&self) -> LogicalPageMeta {
        LogicalPageMeta {
            regular_columns: self.regular_columns,
            num_records: self.num_records,
        }
    }

    /// The physical pages backing each column, metadata columns first
    pub fn physical_pages(&self) -> &[Vec<PhysicalPage>] {
        &self.columns
    }

    /// Append a full record (metadata + data values) and return its slot
    pub fn write_record(&mut self, record: &[i64]) -> StorageResult<usize> {
        if record.len() != self.total_columns() {
            return Err(StorageError::SchemaMismatch {
                expected: self.total_columns(),
                actual: record.len(),
            });
        }
        if !self.has_capacity() {
            return Err(StorageError::CapacityExceeded(self.num_records));
        }

        let slot = self.num_records;
        let level = slot / SLOTS_PER_PAGE;
        let offset = slot % SLOTS_PER_PAGE;

        for (column, value) in self.columns.iter_mut().zip(record) {
            column[level].write(*value, offset)?;
        }

        self.num_records += 1;
        self.allocate_physical_pages();
        Ok(slot)
    }

    /// Read the data columns at `slot`, returning values for columns whose
    /// projection bit is set and `None` placeholders otherwise
    pub fn read_record_at(
        &self,
        slot: usize,
        projection: &[bool],
    ) -> StorageResult<Vec<Option<i64>>> {
        if projection.len() != self.regular_columns {
            return Err(StorageError::SchemaMismatch {
                expected: self.regular_columns,
                actual: projection.len(),
            });
        }
        self.check_slot(slot)?;

        let level = slot / SLOTS_PER_PAGE;
        let offset = slot % SLOTS_PER_PAGE;

        let mut values = Vec::with_capacity(self.regular_columns);
        for (i, wanted) in projection.iter().enumerate() {
            if *wanted {
                let page = &self.columns[NUM_METADATA_COLUMNS + i][level];
                values.push(Some(page.read(offset)?));
            } else {
                values.push(None);
            }
        }
        Ok(values)
    }

    /// Read all four metadata values at `slot`
    pub fn read_metadata_at(&self, slot: usize) -> StorageResult<[i64; NUM_METADATA_COLUMNS]> {
        self.check_slot(slot)?;

        let level = slot / SLOTS_PER_PAGE;
        let offset = slot % SLOTS_PER_PAGE;

        let mut meta = [0i64; NUM_METADATA_COLUMNS];
        for (column, value) in meta.iter_mut().enumerate() {
            *value = self.columns[column][level].read(offset)?;
        }
        Ok(meta)
    }

    /// Overwrite one column value in place.
    /// `column` is an absolute index; by convention only metadata columns
    /// (indirection, rid, schema encoding) go through this path.
    pub fn update_column(&mut self, column: usize, slot: usize, value: i64) -> StorageResult<()> {
        if column >= self.total_columns() {
            return Err(StorageError::SchemaMismatch {
                expected: self.total_columns(),
                actual: column,
            });
        }
        self.check_slot(slot)?;

        let level = slot / SLOTS_PER_PAGE;
        let offset = slot % SLOTS_PER_PAGE;
        self.columns[column][level].update_slot(value, offset)
    }

    fn check_slot(&self, slot: usize) -> StorageResult<()> {
        if slot >= self.num_records {
            return Err(StorageError::OutOfRange {
                slot,
                num_records: self.num_records,
            });
        }
        Ok(())
    }

    // Lazily grow every column by one physical page once the current level
    // fills, stopping at 8 levels.
    fn allocate_physical_pages(&mut self) {
        let level = self.num_records / SLOTS_PER_PAGE;
        if level < PAGES_PER_COLUMN && level >= self.columns[0].len() {
            for column in &mut self.columns {
                column.push(PhysicalPage::new());
            }
        }
    }
}
