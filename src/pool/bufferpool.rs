use std::ops::Deref;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Instant;

use ahash::AHashMap;
use log::{debug, warn};

use super::disk;
use super::error::PoolResult;
use super::frame::Frame;
use super::BUFFER_POOL_CAPACITY;
use crate::storage::PageRange;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FrameKey {
    table: String,
    range_index: usize,
}

/// Caches page ranges behind reference-counted frames, keyed by
/// (table, range index).
///
/// Eviction picks, among frames with pin count zero, the one with the fewest
/// requests, breaking ties by oldest access. A pinned frame is never evicted;
/// when every frame is pinned the requester waits until a pin drops.
pub struct BufferPool {
    dir: PathBuf,
    capacity: usize,
    epoch: Instant,
    frames: Mutex<AHashMap<FrameKey, Arc<Frame>>>,
    unpinned: Condvar,
}

impl BufferPool {
    /// Create a pool persisting ranges under `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_capacity(dir, BUFFER_POOL_CAPACITY)
    }

    /// Create a pool with an explicit frame capacity
    pub fn with_capacity(dir: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            dir: dir.into(),
            capacity: capacity.max(1),
            epoch: Instant::now(),
            frames: Mutex::new(AHashMap::new()),
            unpinned: Condvar::new(),
        }
    }

    /// Get the frame for `(table, range_index)`, pinning it for the lifetime
    /// of the returned guard. Misses load the range from disk, or allocate an
    /// empty one when nothing was persisted yet.
    pub fn get_frame(
        &self,
        table: &str,
        range_index: usize,
        num_columns: usize,
    ) -> PoolResult<FrameGuard<'_>> {
        let key = FrameKey {
            table: table.to_string(),
            range_index,
        };

        let mut frames = self.lock_frames();
        loop {
            if let Some(frame) = frames.get(&key) {
                frame.touch(self.clock());
                frame.pin();
                return Ok(FrameGuard {
                    frame: Arc::clone(frame),
                    pool: self,
                });
            }

            if frames.len() < self.capacity {
                break;
            }

            match Self::victim(&frames) {
                Some(victim_key) => {
                    let victim = frames.get(&victim_key).expect("victim key just selected");
                    if victim.is_dirty() {
                        self.write_frame(victim)?;
                    }
                    debug!(
                        "evicting frame {}/range_{}",
                        victim_key.table, victim_key.range_index
                    );
                    frames.remove(&victim_key);
                }
                // Every frame is pinned; wait for a guard to drop.
                None => frames = self.unpinned.wait(frames).expect("buffer pool mutex poisoned"),
            }
        }

        let frame = Arc::new(self.read_frame(table, range_index, num_columns)?);
        frame.touch(self.clock());
        frame.pin();
        frames.insert(key, Arc::clone(&frame));
        Ok(FrameGuard { frame, pool: self })
    }

    /// Write one frame's range back to disk and clear its dirty flag
    pub fn write_frame(&self, frame: &Frame) -> PoolResult<()> {
        let dir = self.range_dir(frame.table(), frame.range_index());
        disk::save_range(&dir, &frame.page_range())?;
        frame.clear_dirty();
        Ok(())
    }

    /// Materialize a frame for `(table, range_index)` from persistence, or
    /// allocate an empty range (born dirty) when none exists
    pub fn read_frame(
        &self,
        table: &str,
        range_index: usize,
        num_columns: usize,
    ) -> PoolResult<Frame> {
        let dir = self.range_dir(table, range_index);
        if disk::range_exists(&dir) {
            let range = disk::load_range(&dir, num_columns)?;
            Ok(Frame::new(table.to_string(), range_index, range, false))
        } else {
            Ok(Frame::new(
                table.to_string(),
                range_index,
                PageRange::new(num_columns),
                true,
            ))
        }
    }

    /// Write back every dirty frame, pinned or not. Shutdown is assumed
    /// quiescent.
    pub fn on_close(&self) -> PoolResult<()> {
        let frames = self.lock_frames();
        for frame in frames.values() {
            if frame.is_dirty() {
                if frame.pin_count() > 0 {
                    warn!(
                        "flushing pinned frame {}/range_{} at close",
                        frame.table(),
                        frame.range_index()
                    );
                }
                self.write_frame(frame)?;
            }
        }
        Ok(())
    }

    /// Discard every cached frame of `table` without writing anything back.
    /// Used when the table itself is dropped.
    pub fn drop_table(&self, table: &str) {
        let mut frames = self.lock_frames();
        frames.retain(|key, _| key.table != table);
        drop(frames);
        self.notify_unpin();
    }

    /// Number of frames currently resident
    pub fn resident_count(&self) -> usize {
        self.lock_frames().len()
    }

    /// True if `(table, range_index)` is cached
    pub fn is_cached(&self, table: &str, range_index: usize) -> bool {
        let key = FrameKey {
            table: table.to_string(),
            range_index,
        };
        self.lock_frames().contains_key(&key)
    }

    /// Directory a table's ranges are persisted under
    pub fn table_dir(&self, table: &str) -> PathBuf {
        self.dir.join(table)
    }

    fn range_dir(&self, table: &str, range_index: usize) -> PathBuf {
        self.table_dir(table).join(format!("range_{}", range_index))
    }

    fn lock_frames(&self) -> MutexGuard<'_, AHashMap<FrameKey, Arc<Frame>>> {
        self.frames.lock().expect("buffer pool mutex poisoned")
    }

    fn clock(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    // Minimum request count among unpinned frames, oldest access breaking
    // ties. None when every frame is pinned.
    fn victim(frames: &AHashMap<FrameKey, Arc<Frame>>) -> Option<FrameKey> {
        frames
            .iter()
            .filter(|(_, frame)| frame.pin_count() == 0)
            .min_by_key(|(_, frame)| (frame.request_count(), frame.last_accessed()))
            .map(|(key, _)| key.clone())
    }

    fn notify_unpin(&self) {
        self.unpinned.notify_all();
    }
}

/// RAII pin on a frame: created pinned, unpins (and wakes eviction waiters)
/// on drop.
pub struct FrameGuard<'a> {
    frame: Arc<Frame>,
    pool: &'a BufferPool,
}

impl Deref for FrameGuard<'_> {
    type Target = Frame;

    fn deref(&self) -> &Frame {
        &self.frame
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.frame.unpin();
        self.pool.notify_unpin();
    }
}
