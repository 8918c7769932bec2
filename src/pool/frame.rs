use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crate::storage::PageRange;

/// A buffer-pool cache slot: one page range plus the pin/dirty/usage
/// metadata the eviction policy reads.
pub struct Frame {
    table: String,
    range_index: usize,
    page_range: RwLock<PageRange>,
    dirty: AtomicBool,
    pin: AtomicUsize,
    request_count: AtomicU64,
    last_accessed: AtomicU64,
}

impl Frame {
    /// Wrap a page range. Freshly allocated ranges are created dirty so they
    /// reach disk even if never written through.
    pub fn new(table: String, range_index: usize, page_range: PageRange, dirty: bool) -> Self {
        Self {
            table,
            range_index,
            page_range: RwLock::new(page_range),
            dirty: AtomicBool::new(dirty),
            pin: AtomicUsize::new(0),
            request_count: AtomicU64::new(0),
            last_accessed: AtomicU64::new(0),
        }
    }

    /// Table this frame's range belongs to
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Range index within the table
    pub fn range_index(&self) -> usize {
        self.range_index
    }

    /// Shared access to the cached range
    pub fn page_range(&self) -> std::sync::RwLockReadGuard<'_, PageRange> {
        self.page_range.read().expect("frame lock poisoned")
    }

    /// Exclusive access to the cached range; marks the frame dirty
    pub fn page_range_mut(&self) -> std::sync::RwLockWriteGuard<'_, PageRange> {
        self.dirty.store(true, Ordering::Release);
        self.page_range.write().expect("frame lock poisoned")
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Release);
    }

    /// Record one request against this frame and refresh its access stamp
    pub fn touch(&self, stamp: u64) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.last_accessed.store(stamp, Ordering::Relaxed);
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn last_accessed(&self) -> u64 {
        self.last_accessed.load(Ordering::Relaxed)
    }

    pub fn pin(&self) {
        self.pin.fetch_add(1, Ordering::AcqRel);
    }

    pub fn unpin(&self) {
        self.pin.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn pin_count(&self) -> usize {
        self.pin.load(Ordering::Acquire)
    }
}
