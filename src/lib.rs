//! # MazeDB Storage Foundation
//!
//! MazeDB is an embedded database; this crate is its storage foundation: a
//! fixed-capacity, in-memory cache of fixed-size disk pages backed by a
//! single-file page store, with LRU replacement deciding which cached page
//! to evict when the cache is full. Layers above (record layouts, indexes,
//! query execution) obtain and release pinned page handles through the
//! buffer pool and never touch the file directly.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use mazedb::{BufferPool, DiskManager};
//!
//! let store = Arc::new(DiskManager::open("./maze.db")?);
//! let pool = BufferPool::with_default_size(store.clone())?;
//!
//! let mut page = pool.new_page()?.expect("pool has capacity");
//! let id = page.page_id();
//! page.data_mut()[..5].copy_from_slice(b"hello");
//! page.unpin(true);
//!
//! pool.flush_page(id)?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │     Upper Layers (records, trees)    │
//! ├─────────────────────────────────────┤
//! │  BufferPool      frames, pin counts, │
//! │                  dirty bits, stats   │
//! ├──────────────────┬──────────────────┤
//! │  DiskManager     │  LruReplacer      │
//! │  file, free list │  eviction order   │
//! └──────────────────┴──────────────────┘
//! ```
//!
//! ## File Layout
//!
//! A database is one file of 8KB pages:
//!
//! ```text
//! Page 0    Header page (format version, page size)
//! Page 1    Free-list page (recyclable identifiers)
//! Page 2+   Application data and index pages
//! ```
//!
//! ## Guarantees
//!
//! - A dirty page is written back, checksum stamped, before its frame is
//!   reused; a pinned page is never evicted.
//! - A page identifier is resident in at most one frame at a time.
//! - Checksums are advisory: a mismatch on read is logged, never fatal.
//! - Capacity exhaustion (every frame pinned) is an in-band `None`, not an
//!   error; I/O failures propagate unchanged.
//!
//! ## Module Overview
//!
//! - [`config`]: Page geometry, reserved identifiers, pool sizing
//! - [`storage`]: Page store, buffer pool, replacement policy

pub mod config;
pub mod storage;

pub use storage::{
    BufferPool, DiskManager, LruReplacer, MemStore, Page, PageHeader, PageId, PageRef, PageStore,
    PageType,
};
