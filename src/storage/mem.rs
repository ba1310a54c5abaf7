//! In-memory [`PageStore`] used as a test double for the file-backed
//! [`DiskManager`](super::DiskManager). Mirrors its reserved-page and
//! recycling semantics and additionally records the order of page writes so
//! tests can assert write-back behavior.

use eyre::{ensure, Result};
use parking_lot::Mutex;

use crate::config::{FREE_LIST_MAX_ENTRIES, FREE_LIST_PAGE_ID, HEADER_PAGE_ID};

use super::page::Page;
use super::{PageId, PageStore};

pub struct MemStore {
    inner: Mutex<MemInner>,
}

struct MemInner {
    pages: Vec<Page>,
    free_pages: Vec<PageId>,
    write_log: Vec<PageId>,
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemInner {
                // Reserved header and free-list slots, as on disk.
                pages: vec![Page::new(), Page::new()],
                free_pages: Vec::new(),
                write_log: Vec::new(),
            }),
        }
    }

    /// Every page identifier written so far, in write order.
    pub fn written_pages(&self) -> Vec<PageId> {
        self.inner.lock().write_log.clone()
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PageStore for MemStore {
    fn read_page(&self, page_id: PageId, page: &mut Page) -> Result<()> {
        let inner = self.inner.lock();
        ensure!(
            (page_id as usize) < inner.pages.len(),
            "page {} out of bounds (num_pages={})",
            page_id,
            inner.pages.len()
        );

        page.as_bytes_mut()
            .copy_from_slice(inner.pages[page_id as usize].as_bytes());
        Ok(())
    }

    fn write_page(&self, page_id: PageId, page: &Page) -> Result<()> {
        let mut inner = self.inner.lock();

        while inner.pages.len() <= page_id as usize {
            inner.pages.push(Page::new());
        }
        inner.pages[page_id as usize]
            .as_bytes_mut()
            .copy_from_slice(page.as_bytes());
        inner.write_log.push(page_id);
        Ok(())
    }

    fn allocate_page(&self) -> Result<PageId> {
        let mut inner = self.inner.lock();

        if let Some(page_id) = inner.free_pages.pop() {
            return Ok(page_id);
        }

        let page_id = inner.pages.len() as PageId;
        inner.pages.push(Page::new());
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
            (page_id as usize) < inner.pages.len(),
            "page {} out of bounds (num_pages={})",
            page_id,
            inner.pages.len()
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
        self.inner.lock().pages.len() as u32
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_reserved_pages() {
        let store = MemStore::new();
        assert_eq!(store.page_count(), 2);
        assert_eq!(store.allocate_page().unwrap(), 2);
    }

    #[test]
    fn write_then_read_round_trips() {
        let store = MemStore::new();
        let id = store.allocate_page().unwrap();

        let mut page = Page::new();
        page.data_mut()[..3].copy_from_slice(b"abc");
        store.write_page(id, &page).unwrap();

        let mut read = Page::new();
        store.read_page(id, &mut read).unwrap();
        assert_eq!(&read.data()[..3], b"abc");
        assert_eq!(store.written_pages(), vec![id]);
    }

    #[test]
    fn deallocate_reserved_pages_fails() {
        let store = MemStore::new();
        assert!(store.deallocate_page(HEADER_PAGE_ID).is_err());
        assert!(store.deallocate_page(FREE_LIST_PAGE_ID).is_err());
    }

    #[test]
    fn recycles_deallocated_identifiers() {
        let store = MemStore::new();
        let id = store.allocate_page().unwrap();
        store.deallocate_page(id).unwrap();
        assert_eq!(store.allocate_page().unwrap(), id);
    }
}
