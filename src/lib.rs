pub mod database;
pub mod index;
pub mod pool;
pub mod query;
pub mod storage;
pub mod table;
pub mod transaction;

pub use database::{Database, DatabaseError, DatabaseResult};
pub use index::{Index, IndexError, IndexResult};
pub use pool::{BUFFER_POOL_CAPACITY, BufferPool, Frame, FrameGuard, PoolError, PoolResult};
pub use query::{ColumnUpdate, Query, QueryError, QueryResult};
pub use storage::{LogicalPage, PageRange, PhysicalPage, Rid, StorageError, StorageResult};
pub use table::{Record, RecordKind, RecordLocation, Table};
pub use transaction::{
    LockManager, LockMode, Transaction, TransactionOutcome, TransactionQuery, TransactionWorker,
    WaitGraph,
};
