use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;

use super::error::LockError;
use super::lock::{LockMode, TransactionId};
use crate::query::{ColumnUpdate, Query};
use crate::table::Table;

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// One query inside a transaction, with everything needed to plan its locks
#[derive(Debug, Clone)]
pub enum TransactionQuery {
    Insert {
        columns: Vec<i64>,
    },
    Select {
        key: i64,
        key_column: usize,
        projection: Vec<bool>,
    },
    Update {
        key: i64,
        updates: Vec<ColumnUpdate>,
    },
    Delete {
        key: i64,
    },
    Increment {
        key: i64,
        column: usize,
    },
    Sum {
        start: i64,
        end: i64,
        column: usize,
    },
}

/// What happened to a transaction run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOutcome {
    Committed,
    /// Rolled back. When the abort came from a lock conflict, `blocked_on`
    /// names the holding transaction so the worker can grow the wait-for
    /// graph.
    Aborted { blocked_on: Option<TransactionId> },
}

// Compensating actions recorded before each write, applied in reverse on
// abort.
enum UndoAction {
    Remove { key: i64 },
    Restore { key: i64, values: Vec<i64> },
    Reinsert { values: Vec<i64> },
}

/// A batch of queries run under strict two-phase locking: every lock is
/// acquired (non-blocking) before the first query executes, and all locks are
/// released together at commit or abort. Aborts roll back already-applied
/// writes with compensating queries — best-effort, in-memory only.
pub struct Transaction {
    id: TransactionId,
    queries: Vec<TransactionQuery>,
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            id: NEXT_TRANSACTION_ID.fetch_add(1, Ordering::SeqCst),
            queries: Vec::new(),
        }
    }

    /// Monotonic id; larger means younger
    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn add_query(&mut self, query: TransactionQuery) {
        self.queries.push(query);
    }

    /// Execute against `table`. Returns `Committed`, or `Aborted` after
    /// releasing every lock and undoing any applied writes.
    pub fn run(&self, table: &Arc<Table>) -> TransactionOutcome {
        let lock_plan = self.plan_locks(table);
        let manager = table.lock_manager();

        let mut held: Vec<i64> = Vec::with_capacity(lock_plan.len());
        for (key, mode) in &lock_plan {
            match manager.acquire(*key, self.id, *mode) {
                Ok(()) => held.push(*key),
                Err(LockError::Conflict { holder, .. }) => {
                    debug!("transaction {} blocked on {}", self.id, holder);
                    for key in &held {
                        manager.release(*key, self.id);
                    }
                    return TransactionOutcome::Aborted {
                        blocked_on: Some(holder),
                    };
                }
            }
        }

        let query = Query::new(Arc::clone(table));
        let mut undo: Vec<UndoAction> = Vec::new();
        let committed = self.execute(table, &query, &mut undo);

        if !committed {
            debug!("transaction {} rolling back {} writes", self.id, undo.len());
            Self::rollback(&query, undo);
        }
        for key in &held {
            manager.release(*key, self.id);
        }

        if committed {
            TransactionOutcome::Committed
        } else {
            TransactionOutcome::Aborted { blocked_on: None }
        }
    }

    // All locks this transaction will need, strongest mode per key, in
    // deterministic key order.
    fn plan_locks(&self, table: &Arc<Table>) -> Vec<(i64, LockMode)> {
        let mut plan: BTreeMap<i64, LockMode> = BTreeMap::new();
        let mut want = |key: i64, mode: LockMode| {
            let entry = plan.entry(key).or_insert(mode);
            if mode == LockMode::Exclusive {
                *entry = LockMode::Exclusive;
            }
        };

        for query in &self.queries {
            match query {
                TransactionQuery::Insert { columns } => {
                    if let Some(key) = columns.get(table.key()) {
                        want(*key, LockMode::Exclusive);
                    }
                }
                TransactionQuery::Select { key, key_column, .. } => {
                    if *key_column == table.key() {
                        want(*key, LockMode::Shared);
                    }
                }
                TransactionQuery::Update { key, .. }
                | TransactionQuery::Delete { key }
                | TransactionQuery::Increment { key, .. } => want(*key, LockMode::Exclusive),
                TransactionQuery::Sum { start, end, .. } => {
                    for key in table.index().keys_in_range(table.key(), *start, *end) {
                        want(key, LockMode::Shared);
                    }
                }
            }
        }
        plan.into_iter().collect()
    }

    // Run the queries in order, recording an undo action before each write.
    // Any failed query aborts the whole batch.
    fn execute(&self, table: &Arc<Table>, query: &Query, undo: &mut Vec<UndoAction>) -> bool {
        let num_columns = table.num_columns();
        let everything = vec![true; num_columns];

        for item in &self.queries {
            let ok = match item {
                TransactionQuery::Insert { columns } => {
                    let key = columns[table.key()];
                    let inserted = query.insert(columns);
                    if inserted {
                        undo.push(UndoAction::Remove { key });
                    }
                    inserted
                }
                TransactionQuery::Select {
                    key,
                    key_column,
                    projection,
                } => query.select(*key, *key_column, projection).is_some(),
                TransactionQuery::Update { key, updates } => {
                    match Self::snapshot(query, *key, table.key(), &everything) {
                        Some(values) => {
                            let updated = query.update(*key, updates);
                            if updated {
                                undo.push(UndoAction::Restore { key: *key, values });
                            }
                            updated
                        }
                        None => false,
                    }
                }
                TransactionQuery::Delete { key } => {
                    match Self::snapshot(query, *key, table.key(), &everything) {
                        Some(values) => {
                            let deleted = query.delete(*key);
                            if deleted {
                                undo.push(UndoAction::Reinsert { values });
                            }
                            deleted
                        }
                        None => false,
                    }
                }
                TransactionQuery::Increment { key, column } => {
                    match Self::snapshot(query, *key, table.key(), &everything) {
                        Some(values) => {
                            let incremented = query.increment(*key, *column);
                            if incremented {
                                undo.push(UndoAction::Restore { key: *key, values });
                            }
                            incremented
                        }
                        None => false,
                    }
                }
                TransactionQuery::Sum { start, end, column } => {
                    query.sum(*start, *end, *column).is_some()
                }
            };

            if !ok {
                return false;
            }
        }
        true
    }

    // Pre-image of the record at `key`, fully materialized
    fn snapshot(
        query: &Query,
        key: i64,
        key_column: usize,
        projection: &[bool],
    ) -> Option<Vec<i64>> {
        let records = query.select(key, key_column, projection)?;
        let record = records.first()?;
        Some(record.columns.iter().map(|v| v.unwrap_or(0)).collect())
    }

    fn rollback(query: &Query, undo: Vec<UndoAction>) {
        for action in undo.into_iter().rev() {
            match action {
                UndoAction::Remove { key } => {
                    let _ = query.delete(key);
                }
                UndoAction::Restore { key, values } => {
                    let updates: Vec<ColumnUpdate> =
                        values.iter().map(|value| ColumnUpdate::Set(*value)).collect();
                    let _ = query.update(key, &updates);
                }
                UndoAction::Reinsert { values } => {
                    let _ = query.insert(&values);
                }
            }
        }
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}
