//! On-disk form of a page range.
//!
//! Layout under a range directory:
//! - `range.json` — base/tail cursor counters (`PageRangeMeta`)
//! - `b<i>.json` / `t<i>.json` — per-logical-page metadata
//!   (`{regular_columns, num_records}`)
//! - `b<i>/col<j>/<k>.bin` / `t<i>/col<j>/<k>.bin` — one physical page each,
//!   exactly 4096 bytes of 512 big-endian i64 slots.

use std::fs;
use std::path::Path;

use super::error::{PoolError, PoolResult};
use crate::storage::{
    LogicalPage, LogicalPageMeta, PAGE_SIZE, PageRange, PageRangeMeta, PhysicalPage,
    SLOTS_PER_PAGE,
};

/// Write a range and all of its pages under `dir`, replacing prior contents
pub fn save_range(dir: &Path, range: &PageRange) -> PoolResult<()> {
    fs::create_dir_all(dir)?;
    let meta_json = serde_json::to_string_pretty(&range.meta())?;
    fs::write(dir.join("range.json"), meta_json)?;

    for (i, page) in range.base_pages().iter().enumerate() {
        save_logical_page(dir, &format!("b{}", i), page)?;
    }
    for (i, page) in range.tail_pages().iter().enumerate() {
        save_logical_page(dir, &format!("t{}", i), page)?;
    }
    Ok(())
}

/// Load a range previously written by `save_range`.
/// Any malformed or short file surfaces as `Corrupt` for this range only.
pub fn load_range(dir: &Path, expected_columns: usize) -> PoolResult<PageRange> {
    let meta_json = fs::read_to_string(dir.join("range.json"))?;
    let meta: PageRangeMeta = serde_json::from_str(&meta_json)?;
    if meta.regular_columns != expected_columns {
        return Err(PoolError::Corrupt(format!(
            "range has {} data columns, table expects {}",
            meta.regular_columns, expected_columns
        )));
    }

    let mut base_pages = Vec::with_capacity(meta.base_pages_index + 1);
    for i in 0..=meta.base_pages_index {
        base_pages.push(load_logical_page(dir, &format!("b{}", i))?);
    }
    let mut tail_pages = Vec::with_capacity(meta.tail_pages_index + 1);
    for i in 0..=meta.tail_pages_index {
        tail_pages.push(load_logical_page(dir, &format!("t{}", i))?);
    }

    Ok(PageRange::from_parts(meta, base_pages, tail_pages)?)
}

/// True if `dir` holds a persisted range
pub fn range_exists(dir: &Path) -> bool {
    dir.join("range.json").is_file()
}

fn save_logical_page(dir: &Path, name: &str, page: &LogicalPage) -> PoolResult<()> {
    let meta_json = serde_json::to_string_pretty(&page.meta())?;
    fs::write(dir.join(format!("{}.json", name)), meta_json)?;

    for (col, pages) in page.physical_pages().iter().enumerate() {
        let col_dir = dir.join(name).join(format!("col{}", col));
        fs::create_dir_all(&col_dir)?;
        for (level, physical) in pages.iter().enumerate() {
            fs::write(col_dir.join(format!("{}.bin", level)), physical.as_bytes())?;
        }
    }
    Ok(())
}

fn load_logical_page(dir: &Path, name: &str) -> PoolResult<LogicalPage> {
    let meta_json = fs::read_to_string(dir.join(format!("{}.json", name)))?;
    let meta: LogicalPageMeta = serde_json::from_str(&meta_json)?;

    let total_columns = crate::storage::NUM_METADATA_COLUMNS + meta.regular_columns;
    let levels = LogicalPage::levels_for(meta.num_records);

    let mut columns = Vec::with_capacity(total_columns);
    for col in 0..total_columns {
        let col_dir = dir.join(name).join(format!("col{}", col));
        let mut pages = Vec::with_capacity(levels);
        for level in 0..levels {
            let path = col_dir.join(format!("{}.bin", level));
            let bytes = fs::read(&path)?;
            if bytes.len() != PAGE_SIZE {
                return Err(PoolError::Corrupt(format!(
                    "{} is {} bytes, expected {}",
                    path.display(),
                    bytes.len(),
                    PAGE_SIZE
                )));
            }
            let level_records =
                meta.num_records.saturating_sub(level * SLOTS_PER_PAGE).min(SLOTS_PER_PAGE);
            pages.push(PhysicalPage::from_bytes(&bytes, level_records)?);
        }
        columns.push(pages);
    }

    Ok(LogicalPage::from_parts(meta, columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(rid: i64, columns: &[i64]) -> Vec<i64> {
        let mut rec = vec![0, rid, 1000, 0];
        rec.extend_from_slice(columns);
        rec
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut range = PageRange::new(2);
        range.write_base_record(&record(1, &[10, 20])).unwrap();
        range.write_base_record(&record(2, &[30, 40])).unwrap();
        range.write_tail_record(&record(3, &[11, 20])).unwrap();

        save_range(dir.path(), &range).unwrap();
        assert!(range_exists(dir.path()));

        let restored = load_range(dir.path(), 2).unwrap();
        let (meta, values) = restored.read_base_record(0, 1, &[true, true]).unwrap();
        assert_eq!(meta[crate::storage::RID_COLUMN], 2);
        assert_eq!(values, vec![Some(30), Some(40)]);
        let (meta, values) = restored.read_tail_record(0, 0, &[true, true]).unwrap();
        assert_eq!(meta[crate::storage::RID_COLUMN], 3);
        assert_eq!(values, vec![Some(11), Some(20)]);
    }

    #[test]
    fn test_load_rejects_column_mismatch() {
        let dir = TempDir::new().unwrap();
        let range = PageRange::new(2);
        save_range(dir.path(), &range).unwrap();

        assert!(matches!(load_range(dir.path(), 3), Err(PoolError::Corrupt(_))));
    }

    #[test]
    fn test_load_rejects_truncated_page_file() {
        let dir = TempDir::new().unwrap();
        let mut range = PageRange::new(1);
        range.write_base_record(&record(1, &[5])).unwrap();
        save_range(dir.path(), &range).unwrap();

        fs::write(dir.path().join("b0/col0/0.bin"), vec![0u8; 17]).unwrap();
        assert!(matches!(load_range(dir.path(), 1), Err(PoolError::Corrupt(_))));
    }

    #[test]
    fn test_load_rejects_malformed_metadata() {
        let dir = TempDir::new().unwrap();
        let range = PageRange::new(1);
        save_range(dir.path(), &range).unwrap();

        fs::write(dir.path().join("range.json"), "{not json").unwrap();
        assert!(matches!(load_range(dir.path(), 1), Err(PoolError::Corrupt(_))));
    }

    #[test]
    fn test_missing_range() {
        let dir = TempDir::new().unwrap();
        assert!(!range_exists(dir.path()));
        assert!(load_range(dir.path(), 1).is_err());
    }
}
