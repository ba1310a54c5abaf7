//! # Single-File Page Store
//!
//! This module implements [`DiskManager`], the persistent half of the
//! storage layer: a single file presented as an array of 8KB slots
//! addressable by page identifier, with free-page recycling and a persisted
//! free list.
//!
//! ## File Format
//!
//! ```text
//! Offset 0:      Page 0   Header page (format version, page size)
//! Offset 8192:   Page 1   Free-list page (recyclable identifiers)
//! Offset 16384:  Page 2+  Application data and index pages
//! ```
//!
//! The file length is always an integral multiple of `PAGE_SIZE`; a partial
//! trailing page left by an interrupted write is truncated (ignored) on the
//! next open.
//!
//! ## Free-List Persistence
//!
//! Deallocated identifiers accumulate in memory and are serialized into the
//! reserved free-list page on close:
//!
//! ```text
//! Offset  Size   Description
//! ------  -----  ----------------------------------------
//! 0       128    PageHeader (type = FREE_LIST, num_records = count)
//! 128     4*N    Packed little-endian identifiers, insertion order
//! ```
//!
//! A single page holds at most `FREE_LIST_MAX_ENTRIES` (2016) identifiers;
//! deallocation fails once that many are pending rather than silently
//! dropping entries. Allocation recycles from the tail, so the most
//! recently freed identifier is reused first.
//!
//! ## Thread Safety
//!
//! One internal mutex serializes every operation; file I/O happens under
//! it. Callers must assume any call may block on disk.
//!
//! ## Durability
//!
//! Writes reach the OS when the operation returns; [`DiskManager::sync`]
//! (and close) additionally ask the file system to flush to stable storage.
//! There is no crash recovery beyond that.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use eyre::{ensure, Result, WrapErr};
use parking_lot::Mutex;
use tracing::warn;

use crate::config::{
    FORMAT_VERSION, FREE_LIST_MAX_ENTRIES, FREE_LIST_PAGE_ID, HEADER_PAGE_ID, PAGE_SIZE,
};

use super::page::{Page, PageType};
use super::{PageId, PageStore};

#[derive(Debug)]
pub struct DiskManager {
    path: PathBuf,
    inner: Mutex<DiskInner>,
}

#[derive(Debug)]
struct DiskInner {
    file: File,
    num_pages: u32,
    free_pages: Vec<PageId>,
    closed: bool,
}

impl DiskManager {
    /// Opens the database file at `path`, creating and initializing it when
    /// absent. After open the file always holds at least the two reserved
    /// pages, so allocation can never return identifier 0 or 1.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .wrap_err_with(|| format!("failed to open database file '{}'", path.display()))?;

        let file_size = file
            .metadata()
            .wrap_err_with(|| format!("failed to get metadata for '{}'", path.display()))?
            .len();

        let mut inner = DiskInner {
            file,
            // A partial trailing page is truncated by the integer division.
            num_pages: (file_size / PAGE_SIZE as u64) as u32,
            free_pages: Vec::new(),
            closed: false,
        };

        if inner.num_pages <= HEADER_PAGE_ID {
            inner.write_header_page()?;
        }
        if inner.num_pages <= FREE_LIST_PAGE_ID {
            inner.save_free_list()?;
        } else {
            inner.load_free_list(&path);
        }

        Ok(Self {
            path,
            inner: Mutex::new(inner),
        })
    }

    /// Persists the free list into the reserved page, flushes, and marks
    /// the manager closed. Safe to call more than once.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Ok(());
        }

        inner.save_free_list()?;
        inner
            .file
            .sync_data()
            .wrap_err_with(|| format!("failed to sync '{}'", self.path.display()))?;
        inner.closed = true;
        Ok(())
    }

    /// Number of recyclable identifiers currently pending.
    pub fn free_page_count(&self) -> usize {
        self.inner.lock().free_pages.len()
    }
}

impl DiskInner {
    fn read_page_at(&mut self, page_id: PageId, page: &mut Page) -> Result<()> {
        ensure!(
            page_id < self.num_pages,
            "page {} out of bounds (num_pages={})",
            page_id,
            self.num_pages
        );

        let offset = page_id as u64 * PAGE_SIZE as u64;
        self.file
            .seek(SeekFrom::Start(offset))
            .wrap_err_with(|| format!("failed to seek to page {page_id}"))?;
        self.file
            .read_exact(page.as_bytes_mut())
            .wrap_err_with(|| format!("failed to read page {page_id}"))?;
        Ok(())
    }

    fn write_page_at(&mut self, page_id: PageId, page: &Page) -> Result<()> {
        if page_id >= self.num_pages {
            self.num_pages = page_id + 1;
        }

        let offset = page_id as u64 * PAGE_SIZE as u64;
        self.file
            .seek(SeekFrom::Start(offset))
            .wrap_err_with(|| format!("failed to seek to page {page_id}"))?;
        self.file
            .write_all(page.as_bytes())
            .wrap_err_with(|| format!("failed to write page {page_id}"))?;
        Ok(())
    }

    fn write_header_page(&mut self) -> Result<()> {
        let mut page = Page::new();
        let header = page.header_mut();
        header.set_page_id(HEADER_PAGE_ID);
        header.set_page_type(PageType::Header);

        // Advisory metadata: version, page size, and the page count the
        // file will hold once initialization completes.
        let data = page.data_mut();
        data[0..4].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        data[4..8].copy_from_slice(&(PAGE_SIZE as u32).to_le_bytes());
        data[8..12].copy_from_slice(&2u32.to_le_bytes());

        page.update_checksum();
        self.write_page_at(HEADER_PAGE_ID, &page)
    }

    fn save_free_list(&mut self) -> Result<()> {
        let mut page = Page::new();
        let header = page.header_mut();
        header.set_page_id(FREE_LIST_PAGE_ID);
        header.set_page_type(PageType::FreeList);
        header.set_num_records(self.free_pages.len() as u32);

        let data = page.data_mut();
        for (i, &id) in self.free_pages.iter().enumerate() {
            data[i * 4..i * 4 + 4].copy_from_slice(&id.to_le_bytes());
        }

        page.update_checksum();
        self.write_page_at(FREE_LIST_PAGE_ID, &page)
    }

    fn load_free_list(&mut self, path: &Path) {
        let mut page = Page::new();
        if let Err(e) = self.read_page_at(FREE_LIST_PAGE_ID, &mut page) {
            warn!(
                "failed to read free-list page of '{}', starting empty: {}",
                path.display(),
                e
            );
            return;
        }

        let header = page.header();
        if header.page_type() != PageType::FreeList {
            return;
        }

        let count = header.num_records() as usize;
        if count > FREE_LIST_MAX_ENTRIES {
            warn!(
                "free-list page of '{}' claims {} entries (max {}), starting empty",
                path.display(),
                count,
                FREE_LIST_MAX_ENTRIES
            );
            return;
        }

        let data = page.data();
        self.free_pages = data[..count * 4]
            .chunks_exact(4)
            .map(|w| u32::from_le_bytes(w.try_into().expect("4-byte chunk")))
            .collect();
    }
}

impl PageStore for DiskManager {
    fn read_page(&self, page_id: PageId, page: &mut Page) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.read_page_at(page_id, page)?;
        drop(inner);

        // Advisory verification: DATA/INDEX pages only, and only when a
        // checksum was ever stamped.
        let header = page.header();
        if matches!(header.page_type(), PageType::Data | PageType::Index)
            && header.checksum() != 0
            && !page.verify_checksum()
        {
            warn!("checksum mismatch on page {}", page_id);
        }

        Ok(())
    }

    fn write_page(&self, page_id: PageId, page: &Page) -> Result<()> {
        self.inner.lock().write_page_at(page_id, page)
    }

    fn allocate_page(&self) -> Result<PageId> {
        let mut inner = self.inner.lock();

        if let Some(page_id) = inner.free_pages.pop() {
            return Ok(page_id);
        }

        let page_id = inner.num_pages;
        inner.num_pages += 1;
        Ok(page_id)
    }

    fn deallocate_page(&self, page_id: PageId) -> Result<()> {
        let mut inner = self.inner.lock();

        ensure!(
            page_id != HEADER_PAGE_ID && page_id != FREE_LIST_PAGE_ID,
            "cannot deallocate reserved page {}",
            page_id
        );
        ensure!(
            page_id < inner.num_pages,
            "page {} out of bounds (num_pages={})",
            page_id,
            inner.num_pages
        );
        ensure!(
            inner.free_pages.len() < FREE_LIST_MAX_ENTRIES,
            "free list full ({} pending identifiers)",
            inner.free_pages.len()
        );

        inner.free_pages.push(page_id);
        Ok(())
    }

    fn page_count(&self) -> u32 {
        self.inner.lock().num_pages
    }

    fn sync(&self) -> Result<()> {
        self.inner
            .lock()
            .file
            .sync_data()
            .wrap_err_with(|| format!("failed to sync '{}'", self.path.display()))
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }

        if let Err(e) = inner.save_free_list() {
            warn!("failed to persist free list on shutdown: {}", e);
            return;
        }
        if let Err(e) = inner.file.sync_data() {
            warn!("failed to sync '{}' on shutdown: {}", self.path.display(), e);
        }
        inner.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_temp() -> (tempfile::TempDir, DiskManager) {
        let dir = tempdir().unwrap();
        let store = DiskManager::open(dir.path().join("test.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn create_initializes_reserved_pages() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let store = DiskManager::open(&path).unwrap();

        assert_eq!(store.page_count(), 2);
        assert_eq!(
            std::fs::metadata(&path).unwrap().len(),
            2 * PAGE_SIZE as u64
        );
    }

    #[test]
    fn header_page_carries_format_metadata() {
        let (_dir, store) = open_temp();

        let mut page = Page::new();
        store.read_page(HEADER_PAGE_ID, &mut page).unwrap();

        assert_eq!(page.header().page_type(), PageType::Header);
        assert_eq!(&page.data()[0..4], &FORMAT_VERSION.to_le_bytes());
        assert_eq!(&page.data()[4..8], &(PAGE_SIZE as u32).to_le_bytes());
    }

    #[test]
    fn first_allocation_returns_page_2() {
        let (_dir, store) = open_temp();
        assert_eq!(store.allocate_page().unwrap(), 2);
        assert_eq!(store.allocate_page().unwrap(), 3);
        assert_eq!(store.page_count(), 4);
    }

    #[test]
    fn allocation_recycles_most_recently_freed_first() {
        let (_dir, store) = open_temp();
        let a = store.allocate_page().unwrap();
        let b = store.allocate_page().unwrap();

        store.deallocate_page(a).unwrap();
        store.deallocate_page(b).unwrap();

        assert_eq!(store.allocate_page().unwrap(), b);
        assert_eq!(store.allocate_page().unwrap(), a);
    }

    #[test]
    fn deallocate_reserved_pages_fails() {
        let (_dir, store) = open_temp();
        assert!(store.deallocate_page(HEADER_PAGE_ID).is_err());
        assert!(store.deallocate_page(FREE_LIST_PAGE_ID).is_err());
    }

    #[test]
    fn deallocate_out_of_range_fails() {
        let (_dir, store) = open_temp();
        assert!(store.deallocate_page(99).is_err());
    }

    #[test]
    fn read_out_of_range_fails() {
        let (_dir, store) = open_temp();
        let mut page = Page::new();
        assert!(store.read_page(7, &mut page).is_err());
    }

    #[test]
    fn write_extends_page_count() {
        let (_dir, store) = open_temp();
        let page = Page::new();

        store.write_page(5, &page).unwrap();

        assert_eq!(store.page_count(), 6);
        let mut read = Page::new();
        store.read_page(5, &mut read).unwrap();
    }

    #[test]
    fn page_round_trip_preserves_bytes() {
        let (_dir, store) = open_temp();
        let id = store.allocate_page().unwrap();

        let mut page = Page::new();
        page.header_mut().set_page_id(id);
        page.header_mut().set_page_type(PageType::Data);
        page.data_mut()[..11].copy_from_slice(b"hello pages");
        page.update_checksum();
        store.write_page(id, &page).unwrap();

        let mut read = Page::new();
        store.read_page(id, &mut read).unwrap();

        assert_eq!(read.as_bytes(), page.as_bytes());
        assert!(read.verify_checksum());
    }

    #[test]
    fn checksum_mismatch_is_advisory() {
        let (_dir, store) = open_temp();
        let id = store.allocate_page().unwrap();

        let mut page = Page::new();
        page.header_mut().set_page_type(PageType::Data);
        page.data_mut()[..4].copy_from_slice(b"data");
        page.header_mut().set_checksum(0xBAD0BAD0);
        store.write_page(id, &page).unwrap();

        // The read still succeeds and returns the bytes as stored.
        let mut read = Page::new();
        store.read_page(id, &mut read).unwrap();
        assert_eq!(&read.data()[..4], b"data");
        assert_eq!(read.header().checksum(), 0xBAD0BAD0);
    }

    #[test]
    fn free_list_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let store = DiskManager::open(&path).unwrap();
            let a = store.allocate_page().unwrap();
            let b = store.allocate_page().unwrap();
            let c = store.allocate_page().unwrap();
            // The file only grows on write; materialize the last page so
            // the count survives reopen.
            store.write_page(c, &Page::new()).unwrap();
            store.deallocate_page(a).unwrap();
            store.deallocate_page(b).unwrap();
            store.close().unwrap();
        }

        let store = DiskManager::open(&path).unwrap();
        assert_eq!(store.page_count(), 5);
        assert_eq!(store.free_page_count(), 2);
        assert_eq!(store.allocate_page().unwrap(), 3);
        assert_eq!(store.allocate_page().unwrap(), 2);
    }

    #[test]
    fn reopen_without_free_list_type_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let store = DiskManager::open(&path).unwrap();
            let id = store.allocate_page().unwrap();
            store.deallocate_page(id).unwrap();
            store.close().unwrap();
            // Clobber page 1 after close so neither close nor Drop rewrites it.
            let mut bogus = Page::new();
            bogus.header_mut().set_page_type(PageType::Header);
            store.write_page(FREE_LIST_PAGE_ID, &bogus).unwrap();
        }

        let store = DiskManager::open(&path).unwrap();
        assert_eq!(store.free_page_count(), 0);
    }

    #[test]
    fn partial_trailing_page_is_truncated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let store = DiskManager::open(&path).unwrap();
            store.close().unwrap();
        }

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0u8; 100]).unwrap();
        drop(file);

        let store = DiskManager::open(&path).unwrap();
        assert_eq!(store.page_count(), 2);
    }

    #[test]
    fn short_file_regains_reserved_pages() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        std::fs::write(&path, vec![0u8; PAGE_SIZE]).unwrap();

        let store = DiskManager::open(&path).unwrap();

        assert_eq!(store.page_count(), 2);
        assert_eq!(store.allocate_page().unwrap(), 2);
    }

    #[test]
    fn deallocation_capped_at_free_list_capacity() {
        let (_dir, store) = open_temp();

        let ids: Vec<_> = (0..FREE_LIST_MAX_ENTRIES + 1)
            .map(|_| store.allocate_page().unwrap())
            .collect();

        for &id in &ids[..FREE_LIST_MAX_ENTRIES] {
            store.deallocate_page(id).unwrap();
        }
        assert!(store.deallocate_page(ids[FREE_LIST_MAX_ENTRIES]).is_err());
    }

    #[test]
    fn close_is_idempotent() {
        let (_dir, store) = open_temp();
        store.close().unwrap();
        store.close().unwrap();
    }
}
