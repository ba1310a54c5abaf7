//! # Page Buffer and Header Layout
//!
//! This module defines the page structure for MazeDB's storage layer. Every
//! 8KB page begins with a 128-byte header followed by an 8064-byte data area
//! that is opaque to the storage layer.
//!
//! ## Page Header Layout (128 bytes, little-endian)
//!
//! ```text
//! Offset  Size  Field              Description
//! ------  ----  -----------------  ----------------------------------------
//! 0       4     page_id            Identifier of the page in the file
//! 4       1     page_type          HEADER, DATA, INDEX, FREE_LIST
//! 5       3     padding            Zero
//! 8       4     num_records        Record count maintained by upper layers
//! 12      4     free_space         Bytes remaining in the data area
//! 16      4     free_space_offset  First free byte in the data area
//! 20      4     checksum           XOR of the data-area words
//! 24      104   reserved           Zero
//! ```
//!
//! ## Zero-Copy Access
//!
//! [`PageHeader`] uses `zerocopy` for safe transmutation from raw bytes, so
//! the header is read and written in place over the first 128 bytes of the
//! page buffer. The on-disk layout is byte-identical to the in-memory view.
//!
//! ## Checksum
//!
//! The checksum is the XOR of all 2016 little-endian u32 words of the data
//! area (the header is excluded). It is stamped before every write and
//! verified after reads of DATA and INDEX pages; a mismatch is advisory
//! only. The reserved header and free-list pages carry a checksum but are
//! never verified.

use eyre::{ensure, Result};
use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{INVALID_PAGE_ID, PAGE_DATA_SIZE, PAGE_HEADER_SIZE, PAGE_SIZE};

use super::PageId;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    Invalid = 0,
    Header = 1,
    Data = 2,
    Index = 3,
    FreeList = 4,
}

impl PageType {
    pub fn from_byte(b: u8) -> Self {
        match b {
            1 => PageType::Header,
            2 => PageType::Data,
            3 => PageType::Index,
            4 => PageType::FreeList,
            _ => PageType::Invalid,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct PageHeader {
    page_id: U32,
    page_type: u8,
    padding: [u8; 3],
    num_records: U32,
    free_space: U32,
    free_space_offset: U32,
    checksum: U32,
    reserved: [u8; 104],
}

const _: () = assert!(std::mem::size_of::<PageHeader>() == PAGE_HEADER_SIZE);

impl PageHeader {
    pub fn new(page_id: PageId, page_type: PageType) -> Self {
        Self {
            page_id: U32::new(page_id),
            page_type: page_type as u8,
            padding: [0u8; 3],
            num_records: U32::new(0),
            free_space: U32::new(PAGE_DATA_SIZE as u32),
            free_space_offset: U32::new(0),
            checksum: U32::new(0),
            reserved: [0u8; 104],
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        ensure!(
            bytes.len() >= PAGE_HEADER_SIZE,
            "buffer too small for PageHeader: {} < {}",
            bytes.len(),
            PAGE_HEADER_SIZE
        );

        Self::ref_from_bytes(&bytes[..PAGE_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to read PageHeader: {:?}", e))
    }

    pub fn from_bytes_mut(bytes: &mut [u8]) -> Result<&mut Self> {
        ensure!(
            bytes.len() >= PAGE_HEADER_SIZE,
            "buffer too small for PageHeader: {} < {}",
            bytes.len(),
            PAGE_HEADER_SIZE
        );

        Self::mut_from_bytes(&mut bytes[..PAGE_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to read PageHeader: {:?}", e))
    }

    pub fn page_id(&self) -> PageId {
        self.page_id.get()
    }

    pub fn set_page_id(&mut self, page_id: PageId) {
        self.page_id = U32::new(page_id);
    }

    pub fn page_type(&self) -> PageType {
        PageType::from_byte(self.page_type)
    }

    pub fn set_page_type(&mut self, page_type: PageType) {
        self.page_type = page_type as u8;
    }

    pub fn num_records(&self) -> u32 {
        self.num_records.get()
    }

    pub fn set_num_records(&mut self, count: u32) {
        self.num_records = U32::new(count);
    }

    pub fn free_space(&self) -> u32 {
        self.free_space.get()
    }

    pub fn set_free_space(&mut self, bytes: u32) {
        self.free_space = U32::new(bytes);
    }

    pub fn free_space_offset(&self) -> u32 {
        self.free_space_offset.get()
    }

    pub fn set_free_space_offset(&mut self, offset: u32) {
        self.free_space_offset = U32::new(offset);
    }

    pub fn checksum(&self) -> u32 {
        self.checksum.get()
    }

    pub fn set_checksum(&mut self, checksum: u32) {
        self.checksum = U32::new(checksum);
    }
}

impl Default for PageHeader {
    fn default() -> Self {
        Self::new(INVALID_PAGE_ID, PageType::Invalid)
    }
}

/// A fixed-size page buffer: 128-byte header plus 8064-byte data area.
///
/// The buffer is heap-allocated so its address stays stable while the page
/// sits in a buffer pool frame.
pub struct Page {
    buf: Box<[u8; PAGE_SIZE]>,
}

impl Page {
    /// Creates a zeroed page with a default header stamped.
    pub fn new() -> Self {
        let mut page = Self {
            buf: Box::new([0u8; PAGE_SIZE]),
        };
        *page.header_mut() = PageHeader::default();
        page
    }

    /// Zeroes the buffer and restores the default header.
    pub fn reset(&mut self) {
        self.buf.fill(0);
        *self.header_mut() = PageHeader::default();
    }

    pub fn header(&self) -> &PageHeader {
        // Infallible: the buffer always holds PAGE_HEADER_SIZE bytes and the
        // header type is unaligned.
        PageHeader::from_bytes(&self.buf[..]).expect("page header view")
    }

    pub fn header_mut(&mut self) -> &mut PageHeader {
        PageHeader::from_bytes_mut(&mut self.buf[..]).expect("page header view")
    }

    /// The 8064-byte data area following the header.
    pub fn data(&self) -> &[u8] {
        &self.buf[PAGE_HEADER_SIZE..]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.buf[PAGE_HEADER_SIZE..]
    }

    /// The raw page bytes, header included, as written to disk.
    pub fn as_bytes(&self) -> &[u8; PAGE_SIZE] {
        &self.buf
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8; PAGE_SIZE] {
        &mut self.buf
    }

    /// XOR of the little-endian u32 words of the data area.
    pub fn compute_checksum(&self) -> u32 {
        let mut sum = 0u32;
        for word in self.data().chunks_exact(4) {
            sum ^= u32::from_le_bytes(word.try_into().expect("4-byte chunk"));
        }
        sum
    }

    /// Recomputes the checksum and stamps it into the header.
    pub fn update_checksum(&mut self) {
        let sum = self.compute_checksum();
        self.header_mut().set_checksum(sum);
    }

    /// True when the recorded checksum matches the data area.
    pub fn verify_checksum(&self) -> bool {
        self.header().checksum() == self.compute_checksum()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Page {
    fn clone(&self) -> Self {
        Self {
            buf: Box::new(*self.buf),
        }
    }
}
