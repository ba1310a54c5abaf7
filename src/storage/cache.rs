//! # Buffer Pool
//!
//! This module implements [`BufferPool`], the sole client-visible surface of
//! the storage layer. It owns a fixed array of frames, the page-id→frame
//! mapping, pin counts, and dirty bits, and orchestrates fetch / new /
//! unpin / flush / delete against the page store and the LRU replacer.
//!
//! ## Pin/Unpin Protocol
//!
//! Pages must be pinned before access to prevent eviction:
//!
//! 1. `fetch_page` / `new_page` return a pinned [`PageRef`]
//!    (pin count incremented on behalf of the caller)
//! 2. The caller reads/writes the page data through the handle
//! 3. `unpin_page(id, dirty)` releases the reservation exactly once,
//!    declaring whether the contents were modified
//! 4. Frames with a positive pin count are never chosen for eviction
//!
//! ## Frame State Machine
//!
//! ```text
//! FREE ──(victim selection)──► loading ──(read/zero)──► PINNED(1)
//! PINNED(n) ──(fetch hit)──► PINNED(n+1)
//! PINNED(n>0) ──(unpin)──► PINNED(n-1)
//! PINNED(0) ──(replacer registration)──► EVICTABLE
//! EVICTABLE ──(fetch hit)──► PINNED(1)
//! EVICTABLE ──(chosen as victim)──► (write back if dirty) ──► loading
//! EVICTABLE ──(delete)──► FREE
//! ```
//!
//! At any instant every frame is in exactly one of three sets: the frame
//! free list, the replacer's evictable queue, or occupied-and-pinned. The
//! unit tests check this partition after every scenario.
//!
//! ## Eviction and Write-Back
//!
//! A miss takes a frame from the free list, falling back to the replacer's
//! least-recently-unpinned victim. A dirty victim is written back with a
//! freshly stamped checksum before the frame is reused; losing that write
//! would corrupt the database, so the write happens under the pool latch
//! before the old mapping is erased.
//!
//! ## Capacity
//!
//! When every frame is pinned there is nothing to evict: `fetch_page` and
//! `new_page` return `Ok(None)` and the caller decides whether to unpin
//! something and retry. I/O failures are propagated unchanged.
//!
//! ## Statistics
//!
//! Hit and miss counters move only in `fetch_page`; `hit_rate` reports
//! 0.0 until the first fetch.
//!
//! ## Thread Safety
//!
//! Every operation acquires the single pool latch at entry and releases it
//! at exit; disk I/O happens under the latch, trading overlap for an atomic
//! state machine. The latch order is pool → store; the replacer locks only
//! itself.

use std::sync::Arc;

use eyre::{ensure, Result};
use hashbrown::HashMap;
use parking_lot::Mutex;
use tracing::warn;

use crate::config::DEFAULT_BUFFER_POOL_SIZE;

use super::page::{Page, PageType};
use super::replacer::LruReplacer;
use super::{PageId, PageStore};

struct Frame {
    page: Page,
    page_id: Option<PageId>,
    pin_count: u32,
    dirty: bool,
}

impl Frame {
    fn new() -> Self {
        Self {
            page: Page::new(),
            page_id: None,
            pin_count: 0,
            dirty: false,
        }
    }
}

pub struct BufferPool {
    pool_size: usize,
    store: Arc<dyn PageStore>,
    replacer: LruReplacer,
    inner: Mutex<PoolInner>,
}

struct PoolInner {
    frames: Vec<Frame>,
    page_table: HashMap<PageId, usize>,
    free_frames: Vec<usize>,
    hits: u64,
    misses: u64,
}

impl BufferPool {
    pub fn new(pool_size: usize, store: Arc<dyn PageStore>) -> Result<Self> {
        ensure!(pool_size > 0, "buffer pool must hold at least one frame");

        Ok(Self {
            pool_size,
            store,
            replacer: LruReplacer::new(pool_size),
            inner: Mutex::new(PoolInner {
                frames: (0..pool_size).map(|_| Frame::new()).collect(),
                page_table: HashMap::with_capacity(pool_size),
                free_frames: (0..pool_size).collect(),
                hits: 0,
                misses: 0,
            }),
        })
    }

    /// Creates a pool with the default frame count
    /// ([`DEFAULT_BUFFER_POOL_SIZE`], 800KB resident).
    pub fn with_default_size(store: Arc<dyn PageStore>) -> Result<Self> {
        Self::new(DEFAULT_BUFFER_POOL_SIZE, store)
    }

    /// Returns the page pinned on behalf of the caller, or `None` when the
    /// pool has no free and no evictable frame.
    pub fn fetch_page(&self, page_id: PageId) -> Result<Option<PageRef<'_>>> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            inner.frames[frame_id].pin_count += 1;
            self.replacer.pin(frame_id);
            inner.hits += 1;
            return Ok(Some(PageRef {
                pool: self,
                page_id,
                frame_id,
            }));
        }

        inner.misses += 1;
        let Some(frame_id) = self.take_victim(inner) else {
            return Ok(None);
        };
        self.evict_occupant(inner, frame_id)?;

        let frame = &mut inner.frames[frame_id];
        if let Err(e) = self.store.read_page(page_id, &mut frame.page) {
            inner.free_frames.push(frame_id);
            return Err(e);
        }
        frame.page_id = Some(page_id);
        frame.pin_count = 1;
        frame.dirty = false;

        inner.page_table.insert(page_id, frame_id);
        self.replacer.pin(frame_id);
        Ok(Some(PageRef {
            pool: self,
            page_id,
            frame_id,
        }))
    }

    /// Allocates a fresh page on the store and materializes it as a zeroed,
    /// pinned, dirty frame with the header stamped. Returns `None` when the
    /// pool is full.
    pub fn new_page(&self) -> Result<Option<PageRef<'_>>> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let Some(frame_id) = self.take_victim(inner) else {
            return Ok(None);
        };
        self.evict_occupant(inner, frame_id)?;

        let page_id = match self.store.allocate_page() {
            Ok(id) => id,
            Err(e) => {
                inner.free_frames.push(frame_id);
                return Err(e);
            }
        };

        let frame = &mut inner.frames[frame_id];
        frame.page.reset();
        let header = frame.page.header_mut();
        header.set_page_id(page_id);
        header.set_page_type(PageType::Data);
        frame.page.update_checksum();
        frame.page_id = Some(page_id);
        frame.pin_count = 1;
        // A new page must reach disk even if the caller never touches it.
        frame.dirty = true;

        inner.page_table.insert(page_id, frame_id);
        self.replacer.pin(frame_id);
        Ok(Some(PageRef {
            pool: self,
            page_id,
            frame_id,
        }))
    }

    /// Releases one pin. Fails when the page is not resident or its pin
    /// count is already zero. A true `is_dirty` sticks until the next
    /// write-back; false never clears it.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let mut inner = self.inner.lock();

        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return false;
        };

        let frame = &mut inner.frames[frame_id];
        if frame.pin_count == 0 {
            return false;
        }

        frame.pin_count -= 1;
        if is_dirty {
            frame.dirty = true;
        }
        if frame.pin_count == 0 {
            self.replacer.unpin(frame_id);
        }
        true
    }

    /// Writes the resident page to the store, pinned or not, and clears its
    /// dirty bit. Returns false when the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.inner.lock();

        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return Ok(false);
        };

        let frame = &mut inner.frames[frame_id];
        frame.page.update_checksum();
        self.store.write_page(page_id, &frame.page)?;
        frame.dirty = false;
        Ok(true)
    }

    /// Writes every dirty resident page and clears its dirty bit.
    pub fn flush_all_pages(&self) -> Result<()> {
        let mut guard = self.inner.lock();
        let PoolInner {
            frames, page_table, ..
        } = &mut *guard;

        for (&page_id, &frame_id) in page_table.iter() {
            let frame = &mut frames[frame_id];
            if frame.dirty {
                frame.page.update_checksum();
                self.store.write_page(page_id, &frame.page)?;
                frame.dirty = false;
            }
        }
        Ok(())
    }

    /// Deallocates the page on the store and, when resident, returns its
    /// frame to the free list. Fails (false) when the page is pinned; a
    /// rejected deletion leaves all state unchanged.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.inner.lock();

        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            self.store.deallocate_page(page_id)?;
            return Ok(true);
        };

        if inner.frames[frame_id].pin_count > 0 {
            return Ok(false);
        }

        // Deallocate first so a store-side rejection leaves the pool intact.
        self.store.deallocate_page(page_id)?;

        inner.page_table.remove(&page_id);
        let frame = &mut inner.frames[frame_id];
        frame.page_id = None;
        frame.dirty = false;
        self.replacer.pin(frame_id);
        inner.free_frames.push(frame_id);
        Ok(true)
    }

    pub fn hit_count(&self) -> u64 {
        self.inner.lock().hits
    }

    pub fn miss_count(&self) -> u64 {
        self.inner.lock().misses
    }

    pub fn hit_rate(&self) -> f64 {
        let inner = self.inner.lock();
        let total = inner.hits + inner.misses;
        if total == 0 {
            return 0.0;
        }
        inner.hits as f64 / total as f64
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Free list first, replacer victim second, `None` when every frame is
    /// pinned.
    fn take_victim(&self, inner: &mut PoolInner) -> Option<usize> {
        inner.free_frames.pop().or_else(|| self.replacer.victim())
    }

    /// Writes back and unmaps the victim frame's current occupant, if any.
    /// A failed write-back re-registers the frame with the replacer so the
    /// pool partition stays intact, then propagates the error.
    fn evict_occupant(&self, inner: &mut PoolInner, frame_id: usize) -> Result<()> {
        let PoolInner {
            frames, page_table, ..
        } = inner;

        let frame = &mut frames[frame_id];
        let Some(old_id) = frame.page_id else {
            return Ok(());
        };

        if frame.dirty {
            frame.page.update_checksum();
            if let Err(e) = self.store.write_page(old_id, &frame.page) {
                self.replacer.unpin(frame_id);
                return Err(e);
            }
            frame.dirty = false;
        }

        frame.page_id = None;
        page_table.remove(&old_id);
        Ok(())
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        if let Err(e) = self.flush_all_pages() {
            warn!("failed to flush dirty pages on shutdown: {}", e);
        }
    }
}

/// A pinned page handle.
///
/// The handle is valid only while the caller holds the pin: releasing it
/// via [`PageRef::unpin`] or [`BufferPool::unpin_page`] allows the frame to
/// be evicted and reused, so no access may follow the release. Every
/// successful `fetch_page` / `new_page` must be paired with exactly one
/// unpin.
pub struct PageRef<'a> {
    pool: &'a BufferPool,
    page_id: PageId,
    frame_id: usize,
}

impl PageRef<'_> {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn page(&self) -> &Page {
        let mut inner = self.pool.inner.lock();
        let ptr: *const Page = &mut inner.frames[self.frame_id].page;
        // SAFETY: the frame is pinned while this handle exists, so it cannot
        // be evicted or reassigned, and the frame array is never resized
        // after construction, so the Page address is stable. The lifetime of
        // the returned reference is capped by &self, and the handle contract
        // forbids use after the pin is released.
        unsafe { &*ptr }
    }

    pub fn page_mut(&mut self) -> &mut Page {
        let mut inner = self.pool.inner.lock();
        let ptr: *mut Page = &mut inner.frames[self.frame_id].page;
        // SAFETY: as in `page`, the pinned frame is stable for the life of
        // the handle. `&mut self` ensures this handle hands out at most one
        // mutable reference at a time.
        unsafe { &mut *ptr }
    }

    /// The page's data area.
    pub fn data(&self) -> &[u8] {
        self.page().data()
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.page_mut().data_mut()
    }

    /// Releases the pin, consuming the handle.
    pub fn unpin(self, dirty: bool) -> bool {
        self.pool.unpin_page(self.page_id, dirty)
    }
}
