//! # Storage Module
//!
//! This module provides the storage foundation for MazeDB: a single-file,
//! page-granular disk store and a bounded in-memory buffer pool with LRU
//! replacement. Everything above this layer (records, indexes, query
//! execution) obtains pinned page handles through [`BufferPool`] and never
//! touches the file directly.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │        Upper Layers (records)        │
//! ├─────────────────────────────────────┤
//! │   BufferPool (frames, pins, dirty)   │──┐
//! ├─────────────────────────────────────┤  │ victim choice
//! │   DiskManager (file, free list)      │  │
//! └─────────────────────────────────────┘  │
//!                        LruReplacer  ◄────┘
//! ```
//!
//! The buffer pool consults its page table to decide hit vs. miss; on a miss
//! it takes a frame from its free list or from the replacer, writes back the
//! previous occupant if dirty, reads the requested page, and returns a
//! handle pinned on behalf of the caller. On unpin the reference count is
//! decremented and, at zero, the frame becomes evictable.
//!
//! ## Pinned-Page Protocol
//!
//! 1. `fetch_page` / `new_page` return a pinned [`PageRef`]
//! 2. The caller reads/writes the page data through the handle
//! 3. The caller releases the pin exactly once, declaring dirtiness
//! 4. Frames with a positive pin count are never evicted
//!
//! ## Page Size
//!
//! All storage uses 8KB (8192 byte) pages with a fixed 128-byte header;
//! the remaining 8064 bytes are opaque to this layer.
//!
//! ## Module Organization
//!
//! - `page`: Page buffer, typed header view, advisory checksum
//! - `disk`: Single-file page store with free-page recycling
//! - `mem`: In-memory page store used as a test double
//! - `replacer`: LRU queue over evictable frames
//! - `cache`: Buffer pool and pinned page handles
//!
//! ## Thread Safety
//!
//! Each component guards its state with a single `parking_lot` latch. The
//! buffer pool latch is acquired first and the store latch second; the
//! replacer's internal latch is only ever taken by the replacer itself, so
//! no two latches are acquired in reverse order. File I/O happens under the
//! latches, which keeps the frame state machine atomic at the cost of
//! serialized I/O.

mod cache;
mod disk;
mod mem;
mod page;
mod replacer;

pub use cache::{BufferPool, PageRef};
pub use disk::DiskManager;
pub use mem::MemStore;
pub use page::{Page, PageHeader, PageType};
pub use replacer::LruReplacer;

use eyre::Result;

/// Identifier of a page slot in the backing file. Stable across restarts.
pub type PageId = u32;

/// Capability boundary over the persistent page store.
///
/// The buffer pool holds the store as `Arc<dyn PageStore>`, which lets tests
/// substitute [`MemStore`] for the file-backed [`DiskManager`]. All methods
/// take `&self`; implementations serialize internally and may block on I/O.
pub trait PageStore: Send + Sync {
    /// Reads page `page_id` into `page`. Fails when the identifier is out
    /// of range. Checksum verification is advisory: a mismatch is logged
    /// and the read still succeeds.
    fn read_page(&self, page_id: PageId, page: &mut Page) -> Result<()>;

    /// Writes `page` at slot `page_id`, extending the store when the
    /// identifier lies past the current end.
    fn write_page(&self, page_id: PageId, page: &Page) -> Result<()>;

    /// Returns a fresh or recycled page identifier. Never returns a
    /// reserved identifier.
    fn allocate_page(&self) -> Result<PageId>;

    /// Marks `page_id` recyclable. Fails for reserved or out-of-range
    /// identifiers, or when the pending free list is full.
    fn deallocate_page(&self, page_id: PageId) -> Result<()>;

    /// Current number of page slots, reserved pages included.
    fn page_count(&self) -> u32;

    /// Requests that pending writes reach durable storage.
    fn sync(&self) -> Result<()>;
}
