//! Database: table catalog, open/close bookkeeping, and the shared pool

mod error;
#[cfg(test)]
mod tests;

pub use error::{DatabaseError, DatabaseResult};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ahash::AHashMap;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::pool::BufferPool;
use crate::query::Query;
use crate::storage::Rid;
use crate::table::{RecordKind, RecordLocation, Table};

#[derive(Debug, Serialize, Deserialize)]
struct TableCatalog {
    name: String,
    num_columns: usize,
    key: usize,
    next_rid: Rid,
    active_range: usize,
    directory: Vec<(Rid, RecordLocation)>,
    indexed_columns: Vec<usize>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DatabaseCatalog {
    tables: Vec<TableCatalog>,
}

/// One logical database: a set of tables sharing a buffer pool rooted at a
/// directory on disk.
pub struct Database {
    path: PathBuf,
    pool: Arc<BufferPool>,
    tables: Mutex<AHashMap<String, Arc<Table>>>,
}

impl Database {
    /// Open (or create) the database rooted at `path`, restoring any tables
    /// the catalog knows about
    pub fn open(path: impl Into<PathBuf>) -> DatabaseResult<Self> {
        let path = path.into();
        fs::create_dir_all(&path)?;

        let database = Self {
            pool: Arc::new(BufferPool::new(&path)),
            tables: Mutex::new(AHashMap::new()),
            path,
        };

        let catalog_path = database.catalog_path();
        if catalog_path.is_file() {
            let content = fs::read_to_string(&catalog_path)?;
            let catalog: DatabaseCatalog = serde_json::from_str(&content)?;
            for table_catalog in catalog.tables {
                let table = database.restore_table(table_catalog)?;
                database
                    .tables
                    .lock()
                    .expect("table map poisoned")
                    .insert(table.name().to_string(), table);
            }
        }

        Ok(database)
    }

    /// Persist the catalog and write back every dirty frame. The database
    /// stays usable afterwards; shutdown is assumed quiescent.
    pub fn close(&self) -> DatabaseResult<()> {
        let catalog = DatabaseCatalog {
            tables: self
                .tables
                .lock()
                .expect("table map poisoned")
                .values()
                .map(|table| TableCatalog {
                    name: table.name().to_string(),
                    num_columns: table.num_columns(),
                    key: table.key(),
                    next_rid: table.next_rid(),
                    active_range: table.active_range(),
                    directory: table.directory_entries(),
                    indexed_columns: table.index().indexed_columns(),
                })
                .collect(),
        };

        let content = serde_json::to_string_pretty(&catalog)?;
        fs::write(self.catalog_path(), content)?;
        self.pool.on_close()?;
        Ok(())
    }

    /// Create a table with `num_columns` integer columns, keyed on column
    /// `key_index`
    pub fn create_table(
        &self,
        name: &str,
        num_columns: usize,
        key_index: usize,
    ) -> DatabaseResult<Arc<Table>> {
        if key_index >= num_columns {
            return Err(DatabaseError::InvalidKeyColumn {
                key: key_index,
                num_columns,
            });
        }

        let mut tables = self.tables.lock().expect("table map poisoned");
        if tables.contains_key(name) {
            return Err(DatabaseError::TableExists(name.to_string()));
        }

        let table = Arc::new(Table::new(name, num_columns, key_index, Arc::clone(&self.pool)));
        tables.insert(name.to_string(), Arc::clone(&table));
        Ok(table)
    }

    /// Drop a table, its cached frames, and its persisted ranges
    pub fn drop_table(&self, name: &str) -> DatabaseResult<()> {
        let removed = self
            .tables
            .lock()
            .expect("table map poisoned")
            .remove(name)
            .ok_or_else(|| DatabaseError::TableNotFound(name.to_string()))?;

        self.pool.drop_table(removed.name());
        let table_dir = self.pool.table_dir(removed.name());
        if table_dir.is_dir() {
            fs::remove_dir_all(table_dir)?;
        }
        Ok(())
    }

    /// Look up a table by name
    pub fn get_table(&self, name: &str) -> Option<Arc<Table>> {
        self.tables.lock().expect("table map poisoned").get(name).cloned()
    }

    /// The directory this database lives under
    pub fn path(&self) -> &Path {
        &self.path
    }

    // Restore one table from its catalog entry and rebuild its indexes from
    // the live base records.
    fn restore_table(&self, catalog: TableCatalog) -> DatabaseResult<Arc<Table>> {
        debug!("restoring table {}", catalog.name);
        let base_rids: Vec<Rid> = catalog
            .directory
            .iter()
            .filter(|(_, location)| location.kind == RecordKind::Base)
            .map(|(rid, _)| *rid)
            .collect();

        let table = Arc::new(Table::restore(
            &catalog.name,
            catalog.num_columns,
            catalog.key,
            Arc::clone(&self.pool),
            catalog.next_rid,
            catalog.active_range,
            catalog.directory,
        ));

        let query = Query::new(Arc::clone(&table));
        {
            let mut index = table.index_mut();
            for rid in base_rids {
                if let Some(values) = query.read_latest(rid)? {
                    let mut record = vec![0, rid, 0, 0];
                    record.extend_from_slice(&values);
                    index.add(&record)?;
                }
            }
        }
        for column in catalog.indexed_columns {
            if column != table.key() {
                query.create_index(column);
            }
        }

        Ok(table)
    }

    fn catalog_path(&self) -> PathBuf {
        self.path.join("catalog.json")
    }
}
