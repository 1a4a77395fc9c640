//! Flash pages and the buffer type that mirrors one page

use core::mem::size_of;

use crate::{registers::FLASH_BASE, Error};

/// The size of a page in bytes
pub const PAGE_SIZE: usize = 64;
/// The number of words in a page
pub const PAGE_WORDS: usize = PAGE_SIZE / size_of::<u32>();
/// The number of pages in the program flash (16 KiB)
pub const PAGE_COUNT: usize = 256;
/// The highest valid page index
pub const MAX_PAGE: usize = PAGE_COUNT - 1;

/// A page index that has been checked against the size of the flash.
///
/// Addresses can only be computed from a [Page], so an index that is out of range
/// never gets turned into an address.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct Page(u8);

impl Page {
    /// Validate a page index
    pub fn new(index: usize) -> Result<Self, Error> {
        if index > MAX_PAGE {
            return Err(Error::PageOutOfRange);
        }
        Ok(Self(index as u8))
    }

    /// The page that contains the given absolute flash address
    pub fn containing(address: u32) -> Result<Self, Error> {
        let offset = address.checked_sub(FLASH_BASE).ok_or(Error::PageOutOfRange)?;
        Self::new(offset as usize / PAGE_SIZE)
    }

    /// The index of the page
    pub fn index(&self) -> usize {
        self.0 as usize
    }

    /// The absolute address of the first byte of the page
    pub fn address(&self) -> u32 {
        FLASH_BASE + (self.index() * PAGE_SIZE) as u32
    }

    /// The absolute address of word `word` of the page
    pub(crate) fn word_address(&self, word: usize) -> u32 {
        debug_assert!(word < PAGE_WORDS);
        self.address() + (word * size_of::<u32>()) as u32
    }
}

impl TryFrom<usize> for Page {
    type Error = Error;

    fn try_from(index: usize) -> Result<Self, Self::Error> {
        Self::new(index)
    }
}

impl From<Page> for usize {
    fn from(page: Page) -> Self {
        page.index()
    }
}

/// One page worth of bytes, laid out exactly as it is in flash.
///
/// The buffer is word aligned so the driver can move it a word at a time,
/// but it carries no padding or metadata.
#[repr(C, align(4))]
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PageBuffer {
    /// The raw bytes of the page
    pub bytes: [u8; PAGE_SIZE],
}

impl PageBuffer {
    /// A buffer filled with zeroes
    pub const fn new() -> Self {
        Self {
            bytes: [0; PAGE_SIZE],
        }
    }

    /// A buffer in the erased state (all bits set)
    pub const fn erased() -> Self {
        Self {
            bytes: [0xFF; PAGE_SIZE],
        }
    }

    /// Returns `true` if every byte is in the erased state
    pub fn is_erased(&self) -> bool {
        self.bytes.iter().all(|b| *b == 0xFF)
    }

    /// Get word `index` of the page. Words use the memory byte order of the chip.
    pub fn word(&self, index: usize) -> u32 {
        let start = index * size_of::<u32>();
        let mut word = [0; size_of::<u32>()];
        word.copy_from_slice(&self.bytes[start..start + size_of::<u32>()]);
        u32::from_le_bytes(word)
    }

    /// Set word `index` of the page
    pub fn set_word(&mut self, index: usize, value: u32) {
        let start = index * size_of::<u32>();
        self.bytes[start..start + size_of::<u32>()].copy_from_slice(&value.to_le_bytes());
    }

    /// Iterate over the words of the page in ascending address order
    pub fn words(&self) -> impl Iterator<Item = u32> + '_ {
        (0..PAGE_WORDS).map(move |index| self.word(index))
    }
}

impl Default for PageBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl From<[u8; PAGE_SIZE]> for PageBuffer {
    fn from(bytes: [u8; PAGE_SIZE]) -> Self {
        Self { bytes }
    }
}

impl AsRef<[u8]> for PageBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl AsMut<[u8]> for PageBuffer {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}
