//! # MazeDB Configuration Constants
//!
//! This module centralizes all configuration constants, grouping
//! interdependent values together and documenting their relationships.
//! Constants that depend on each other are co-located to prevent mismatch
//! bugs.
//!
//! ## Dependency Graph
//!
//! ```text
//! PAGE_SIZE (8192 bytes)
//!       │
//!       ├─> PAGE_HEADER_SIZE (128 bytes, fixed on-disk layout)
//!       │
//!       ├─> PAGE_DATA_SIZE (derived: PAGE_SIZE - PAGE_HEADER_SIZE)
//!       │
//!       └─> FREE_LIST_MAX_ENTRIES (derived: PAGE_DATA_SIZE / 4)
//!             The persisted free list lives in a single reserved page, so
//!             the disk manager refuses deallocations past this count.
//!
//! DEFAULT_BUFFER_POOL_SIZE (100)
//!       │
//!       └─> 100 frames × PAGE_SIZE = 800KB resident by default
//! ```
//!
//! ## Critical Invariants
//!
//! These invariants are enforced by compile-time assertions:
//!
//! 1. `PAGE_DATA_SIZE == PAGE_SIZE - PAGE_HEADER_SIZE` (derived correctly)
//! 2. `FREE_LIST_MAX_ENTRIES * 4 <= PAGE_DATA_SIZE` (free list fits page 1)
//! 3. The reserved page identifiers are distinct and precede all data pages
//!
//! ## Usage
//!
//! Import constants from this module rather than defining them locally:
//!
//! ```ignore
//! use crate::config::{PAGE_SIZE, HEADER_PAGE_ID};
//! ```

// ============================================================================
// PAGE LAYOUT CONSTANTS
// These define the fundamental page structure used throughout the database
// ============================================================================

/// Size of each database page in bytes (8KB).
/// This is the fundamental unit of I/O and caching.
pub const PAGE_SIZE: usize = 8192;

/// Size of the page header in bytes.
/// Every page begins with this header containing type, counts, and checksum.
pub const PAGE_HEADER_SIZE: usize = 128;

/// Usable space in a page after the header.
pub const PAGE_DATA_SIZE: usize = PAGE_SIZE - PAGE_HEADER_SIZE;

const _: () = assert!(
    PAGE_DATA_SIZE == PAGE_SIZE - PAGE_HEADER_SIZE,
    "PAGE_DATA_SIZE derivation mismatch"
);

// ============================================================================
// RESERVED PAGE IDENTIFIERS
// The first two pages of every database file have fixed roles
// ============================================================================

/// Identifier of the database header page (always page 0).
pub const HEADER_PAGE_ID: u32 = 0;

/// Identifier of the persisted free-list page (always page 1).
pub const FREE_LIST_PAGE_ID: u32 = 1;

/// Sentinel identifier denoting the absence of a page.
pub const INVALID_PAGE_ID: u32 = u32::MAX;

/// Maximum number of recyclable page identifiers the reserved free-list
/// page can persist. Deallocation fails once this many are pending.
pub const FREE_LIST_MAX_ENTRIES: usize = PAGE_DATA_SIZE / 4;

const _: () = assert!(
    FREE_LIST_MAX_ENTRIES * 4 <= PAGE_DATA_SIZE,
    "persisted free list must fit in a single page"
);

const _: () = assert!(HEADER_PAGE_ID != FREE_LIST_PAGE_ID);

// ============================================================================
// BUFFER POOL CONFIGURATION
// ============================================================================

/// Default number of frames in the buffer pool (100 pages = 800KB).
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 100;

/// On-disk format version stamped into the header page.
pub const FORMAT_VERSION: u32 = 1;
