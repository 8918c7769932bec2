use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, warn};
use rand::Rng;

use super::graph::WaitGraph;
use super::transaction::{Transaction, TransactionOutcome};
use crate::table::Table;

/// Attempts per transaction before recording a permanent abort
pub const MAX_RETRIES: usize = 16;

/// Runs a sequential list of transactions on its own thread. Lock conflicts
/// are retried after a randomized backoff; the shared wait-for graph breaks
/// deadlock cycles by making the youngest transaction back off first.
pub struct TransactionWorker {
    table: Arc<Table>,
    graph: Arc<WaitGraph>,
    transactions: Vec<Transaction>,
    stats: Vec<bool>,
    result: usize,
}

impl TransactionWorker {
    pub fn new(table: Arc<Table>, graph: Arc<WaitGraph>) -> Self {
        Self {
            table,
            graph,
            transactions: Vec::new(),
            stats: Vec::new(),
            result: 0,
        }
    }

    pub fn add_transaction(&mut self, transaction: Transaction) {
        self.transactions.push(transaction);
    }

    /// Run every queued transaction on the calling thread
    pub fn run(&mut self) {
        let transactions = std::mem::take(&mut self.transactions);
        for transaction in &transactions {
            let committed = self.run_one(transaction);
            self.stats.push(committed);
            self.result += usize::from(committed);
        }
    }

    /// Run on a new thread; `join` the handle to get the worker (and its
    /// stats) back
    pub fn spawn(mut self) -> JoinHandle<TransactionWorker> {
        thread::spawn(move || {
            self.run();
            self
        })
    }

    /// Number of committed transactions
    pub fn result(&self) -> usize {
        self.result
    }

    /// Commit/abort outcome per transaction, in submission order
    pub fn stats(&self) -> &[bool] {
        &self.stats
    }

    fn run_one(&self, transaction: &Transaction) -> bool {
        let mut rng = rand::thread_rng();

        for attempt in 0..MAX_RETRIES {
            match transaction.run(&self.table) {
                TransactionOutcome::Committed => {
                    self.graph.clear(transaction.id());
                    return true;
                }
                TransactionOutcome::Aborted { blocked_on } => {
                    let mut backoff_ms: u64 = rng.gen_range(1..=4) << attempt.min(6);

                    if let Some(holder) = blocked_on {
                        self.graph.block_on(transaction.id(), holder);
                        if let Some(victim) = self.graph.cycle_victim(transaction.id()) {
                            debug!(
                                "deadlock cycle from transaction {}, victim {}",
                                transaction.id(),
                                victim
                            );
                            if victim == transaction.id() {
                                // youngest in the cycle: step aside so the
                                // older transactions can finish
                                self.graph.clear(transaction.id());
                                backoff_ms *= 2;
                            }
                        }
                    } else {
                        self.graph.clear(transaction.id());
                    }

                    thread::sleep(Duration::from_millis(backoff_ms));
                }
            }
        }

        self.graph.clear(transaction.id());
        warn!(
            "transaction {} gave up after {} attempts",
            transaction.id(),
            MAX_RETRIES
        );
        false
    }
}
