use std::sync::Mutex;

use ahash::{AHashMap, AHashSet};

use super::lock::TransactionId;

/// Wait-for graph shared by the transaction workers: an edge `waiter → held`
/// records that `waiter` failed to lock a record `held` has locked.
///
/// Before backing off, a worker registers its edge and checks for a cycle
/// reaching back to its own transaction. When a cycle exists, the youngest
/// transaction in it (largest id) is the victim — oldest wins, guaranteeing
/// eventual progress.
pub struct WaitGraph {
    edges: Mutex<AHashMap<TransactionId, TransactionId>>,
}

impl WaitGraph {
    pub fn new() -> Self {
        Self {
            edges: Mutex::new(AHashMap::new()),
        }
    }

    /// Record that `waiter` is blocked on `holder`
    pub fn block_on(&self, waiter: TransactionId, holder: TransactionId) {
        if waiter == holder {
            return;
        }
        self.edges.lock().expect("wait graph poisoned").insert(waiter, holder);
    }

    /// Forget whatever `txn` was blocked on (it committed, aborted, or is
    /// retrying from scratch)
    pub fn clear(&self, txn: TransactionId) {
        self.edges.lock().expect("wait graph poisoned").remove(&txn);
    }

    /// Walk the graph from `start`; if the walk returns to `start`, the cycle
    /// exists and the youngest member is returned as the victim
    pub fn cycle_victim(&self, start: TransactionId) -> Option<TransactionId> {
        let edges = self.edges.lock().expect("wait graph poisoned");

        let mut visited = AHashSet::new();
        let mut youngest = start;
        let mut current = start;
        while let Some(next) = edges.get(&current).copied() {
            if next == start {
                return Some(youngest);
            }
            // a cycle not involving `start` is someone else's to break
            if !visited.insert(next) {
                return None;
            }
            youngest = youngest.max(next);
            current = next;
        }
        None
    }
}

impl Default for WaitGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_cycle() {
        let graph = WaitGraph::new();
        graph.block_on(1, 2);
        graph.block_on(2, 3);
        assert_eq!(graph.cycle_victim(1), None);
    }

    #[test]
    fn test_two_party_cycle_picks_youngest() {
        let graph = WaitGraph::new();
        graph.block_on(1, 2);
        graph.block_on(2, 1);
        assert_eq!(graph.cycle_victim(1), Some(2));
        assert_eq!(graph.cycle_victim(2), Some(2));
    }

    #[test]
    fn test_longer_cycle() {
        let graph = WaitGraph::new();
        graph.block_on(3, 7);
        graph.block_on(7, 5);
        graph.block_on(5, 3);
        assert_eq!(graph.cycle_victim(3), Some(7));
    }

    #[test]
    fn test_clear_breaks_cycle() {
        let graph = WaitGraph::new();
        graph.block_on(1, 2);
        graph.block_on(2, 1);
        graph.clear(2);
        assert_eq!(graph.cycle_victim(1), None);
    }

    #[test]
    fn test_cycle_elsewhere_is_ignored() {
        let graph = WaitGraph::new();
        graph.block_on(1, 2);
        graph.block_on(2, 3);
        graph.block_on(3, 2);
        assert_eq!(graph.cycle_victim(1), None);
    }
}
