//! End-to-end scenarios driving the buffer pool against a real on-disk
//! store: round trips, persistence across reopen, hit-rate behavior,
//! forced eviction, deletion, and capacity exhaustion.

use std::path::Path;
use std::sync::Arc;

use mazedb::{BufferPool, DiskManager, PageRef};
use tempfile::tempdir;

fn open_store(path: &Path) -> Arc<DiskManager> {
    Arc::new(DiskManager::open(path).unwrap())
}

fn write_text(page: &mut PageRef<'_>, text: &str) {
    page.data_mut()[..text.len()].copy_from_slice(text.as_bytes());
}

fn assert_text(page: &PageRef<'_>, text: &str) {
    assert_eq!(&page.data()[..text.len()], text.as_bytes());
}

#[test]
fn basic_round_trip() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir.path().join("maze.db"));
    let pool = BufferPool::new(10, store.clone()).unwrap();

    let mut page = pool.new_page().unwrap().unwrap();
    assert_eq!(page.page_id(), 2);
    write_text(&mut page, "Hello, Logic Maze Database!");
    assert!(page.unpin(true));
    assert!(pool.flush_page(2).unwrap());

    let fetched = pool.fetch_page(2).unwrap().unwrap();
    assert_text(&fetched, "Hello, Logic Maze Database!");
    assert!(fetched.page().verify_checksum());
    fetched.unpin(false);
}

#[test]
fn persistence_across_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("maze.db");

    let mut ids = Vec::new();
    {
        let store = open_store(&path);
        let pool = BufferPool::new(10, store.clone()).unwrap();

        for i in 0..5 {
            let mut page = pool.new_page().unwrap().unwrap();
            ids.push(page.page_id());
            write_text(&mut page, &format!("Page {i} data - test persistence"));
            assert!(page.unpin(true));
        }
        pool.flush_all_pages().unwrap();

        drop(pool);
        store.close().unwrap();
    }
    assert_eq!(ids, vec![2, 3, 4, 5, 6]);

    let store = open_store(&path);
    let pool = BufferPool::new(10, store.clone()).unwrap();

    for (i, &id) in ids.iter().enumerate() {
        let page = pool.fetch_page(id).unwrap().unwrap();
        assert_text(&page, &format!("Page {i} data - test persistence"));
        assert!(page.page().verify_checksum());
        page.unpin(false);
    }
}

#[test]
fn repeated_access_yields_high_hit_rate() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir.path().join("maze.db"));

    let mut ids = Vec::new();
    {
        let pool = BufferPool::new(10, store.clone()).unwrap();
        for i in 0..5 {
            let mut page = pool.new_page().unwrap().unwrap();
            ids.push(page.page_id());
            write_text(&mut page, &format!("Page {i}"));
            page.unpin(true);
        }
        pool.flush_all_pages().unwrap();
    }

    // A cold pool over the same store: one miss per page, then hits only.
    let pool = BufferPool::new(10, store.clone()).unwrap();
    for _ in 0..10 {
        for &id in &ids {
            let page = pool.fetch_page(id).unwrap().unwrap();
            page.unpin(false);
        }
    }

    assert_eq!(pool.miss_count(), 5);
    assert_eq!(pool.hit_count(), 45);
    assert!(pool.hit_rate() > 0.80);
}

#[test]
fn forced_eviction_preserves_written_data() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir.path().join("maze.db"));
    let pool = BufferPool::new(5, store.clone()).unwrap();

    let mut ids = Vec::new();
    for i in 0..10 {
        let mut page = pool.new_page().unwrap().unwrap();
        ids.push(page.page_id());
        write_text(&mut page, &format!("Page {i}"));
        assert!(page.unpin(true));
    }
    assert_eq!(ids, (2..12).collect::<Vec<_>>());

    // The earliest-created pages were evicted: fetching them misses, and
    // the write-back must have preserved their contents.
    for (i, &id) in ids[..5].iter().enumerate() {
        let misses_before = pool.miss_count();
        let page = pool.fetch_page(id).unwrap().unwrap();
        assert!(pool.miss_count() > misses_before);
        assert_text(&page, &format!("Page {i}"));
        page.unpin(false);
    }
}

#[test]
fn delete_unpinned_page_allows_identifier_reuse() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir.path().join("maze.db"));
    let pool = BufferPool::new(10, store.clone()).unwrap();

    let mut page = pool.new_page().unwrap().unwrap();
    let id = page.page_id();
    write_text(&mut page, "short lived");
    assert!(page.unpin(false));

    assert!(pool.delete_page(id).unwrap());

    let next = pool.new_page().unwrap().unwrap();
    assert_eq!(next.page_id(), id);
    next.unpin(false);
}

#[test]
fn capacity_exhaustion_recovers_after_unpin() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir.path().join("maze.db"));
    let pool = BufferPool::new(2, store.clone()).unwrap();

    let first = pool.new_page().unwrap().unwrap();
    let second = pool.new_page().unwrap().unwrap();
    assert!(pool.new_page().unwrap().is_none());

    assert!(first.unpin(false));
    let third = pool.new_page().unwrap().expect("freed frame is reusable");

    third.unpin(false);
    second.unpin(false);
}

#[test]
fn recycled_identifiers_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("maze.db");

    let freed;
    {
        let store = open_store(&path);
        let pool = BufferPool::new(4, store.clone()).unwrap();

        let keep = pool.new_page().unwrap().unwrap();
        let keep_id = keep.page_id();
        keep.unpin(true);

        let gone = pool.new_page().unwrap().unwrap();
        freed = gone.page_id();
        gone.unpin(false);
        assert!(pool.delete_page(freed).unwrap());

        pool.flush_all_pages().unwrap();
        assert_eq!(keep_id, 2);
        drop(pool);
        store.close().unwrap();
    }

    let store = open_store(&path);
    let pool = BufferPool::new(4, store.clone()).unwrap();

    let page = pool.new_page().unwrap().unwrap();
    assert_eq!(page.page_id(), freed);
    page.unpin(false);
}
