//! Buffer pool: caches page ranges behind pinned, reference-counted frames

mod bufferpool;
mod disk;
mod error;
mod frame;

pub use bufferpool::{BufferPool, FrameGuard};
pub use error::{PoolError, PoolResult};
pub use frame::Frame;

/// Default number of frames the pool keeps resident
pub const BUFFER_POOL_CAPACITY: usize = 16;
