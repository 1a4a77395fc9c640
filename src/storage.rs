//! [embedded-storage](embedded_storage) implementation on top of the page driver.
//!
//! Offsets are relative to the start of the program flash. The flash has to be
//! unlocked before erasing or writing, otherwise the erase verification fails.

use embedded_storage::nor_flash::{
    check_erase, check_read, check_write, ErrorType, MultiwriteNorFlash, NorFlash, ReadNorFlash,
};

use crate::{
    page::{Page, PageBuffer, PAGE_COUNT, PAGE_SIZE},
    registers::{FlashRegisters, FLASH_BASE},
    Error, Flash,
};

/// Total size of the program flash in bytes
pub const CAPACITY: usize = PAGE_COUNT * PAGE_SIZE;

/// The page holding the byte at `offset` from the start of the flash
fn page_at(offset: usize) -> Result<Page, Error> {
    Page::containing(FLASH_BASE + offset as u32)
}

impl<R: FlashRegisters> ErrorType for Flash<R> {
    type Error = Error;
}

impl<R: FlashRegisters> ReadNorFlash for Flash<R> {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        check_read(&*self, offset, bytes.len())?;

        let mut page_buffer = PageBuffer::new();
        let mut offset = offset as usize;
        let mut bytes = bytes;
        while !bytes.is_empty() {
            let page = page_at(offset)?;
            let start = offset % PAGE_SIZE;
            let len = bytes.len().min(PAGE_SIZE - start);

            self.read_page(page.index(), &mut page_buffer)?;
            let (head, tail) = core::mem::take(&mut bytes).split_at_mut(len);
            head.copy_from_slice(&page_buffer.bytes[start..start + len]);

            bytes = tail;
            offset += len;
        }

        Ok(())
    }

    fn capacity(&self) -> usize {
        CAPACITY
    }
}

impl<R: FlashRegisters> NorFlash for Flash<R> {
    const WRITE_SIZE: usize = 4;
    const ERASE_SIZE: usize = PAGE_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        check_erase(&*self, from, to)?;

        for page in from as usize / PAGE_SIZE..to as usize / PAGE_SIZE {
            self.erase_page(page)?;
        }

        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        check_write(&*self, offset, bytes.len())?;

        let mut page_buffer = PageBuffer::new();
        let mut offset = offset as usize;
        let mut bytes = bytes;
        while !bytes.is_empty() {
            let page = page_at(offset)?;
            let start = offset % PAGE_SIZE;
            let len = bytes.len().min(PAGE_SIZE - start);

            // Words outside of the written range are programmed with their current value,
            // which leaves them unchanged
            self.read_page(page.index(), &mut page_buffer)?;
            page_buffer.bytes[start..start + len].copy_from_slice(&bytes[..len]);
            self.write_page(page.index(), &page_buffer)?;

            bytes = &bytes[len..];
            offset += len;
        }

        Ok(())
    }
}

impl<R: FlashRegisters> MultiwriteNorFlash for Flash<R> {}
