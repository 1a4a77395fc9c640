//! The flash controller driver

use crate::{
    page::{Page, PageBuffer, PAGE_WORDS},
    registers::{ctlr, statr, FlashRegisters, Mmio, Register, KEY1, KEY2},
    Error, LockState,
};

/// The value every word has after an erase
const ERASED_WORD: u32 = 0xFFFF_FFFF;

/// Driver for the program flash, using the fast page mode of the controller.
///
/// All operations block until the controller is done. A write or erase that is
/// interrupted halfway leaves the page in an undefined state, so the caller has
/// to make sure nothing else touches the controller in the meantime.
pub struct Flash<R> {
    registers: R,
}

impl Flash<Mmio> {
    /// Take the flash controller of the chip.
    /// Returns `None` if the controller was already taken.
    pub fn take() -> Option<Self> {
        Mmio::take().map(Self::new)
    }
}

impl<R: FlashRegisters> Flash<R> {
    /// Create the driver on top of the given register access
    pub fn new(registers: R) -> Self {
        Self { registers }
    }

    /// Give back the register access
    pub fn free(self) -> R {
        self.registers
    }

    /// The register access the driver runs on
    pub fn registers(&self) -> &R {
        &self.registers
    }

    /// Read the current lock state from the control register
    pub fn lock_state(&self) -> LockState {
        LockState::from_ctlr(self.registers.read(Register::Ctlr))
    }

    /// Unlock the flash into fast mode. Does nothing if it already is.
    ///
    /// Returns [Error::Locked] if the controller did not accept the key sequences.
    pub fn unlock(&mut self) -> Result<(), Error> {
        if self.lock_state().is_unlocked_fast() {
            return Ok(());
        }

        // Normal mode unlock
        self.registers.write(Register::Keyr, KEY1);
        self.registers.write(Register::Keyr, KEY2);
        self.wait_while_busy();

        // Fast mode unlock
        self.registers.write(Register::Modekeyr, KEY1);
        self.registers.write(Register::Modekeyr, KEY2);
        self.wait_while_busy();

        match self.lock_state() {
            LockState::UnlockedFast => {
                flash_debug!("flash unlocked");
                Ok(())
            }
            state => {
                flash_warn!("flash unlock rejected, controller reports {}", state);
                Err(Error::Locked)
            }
        }
    }

    /// Lock the flash again.
    ///
    /// Returns [Error::Unlocked] if the controller does not report being locked afterwards.
    pub fn lock(&mut self) -> Result<(), Error> {
        self.registers.modify(Register::Ctlr, |value| value | ctlr::LOCK);

        match self.lock_state() {
            LockState::Locked => Ok(()),
            state => {
                flash_warn!("flash lock ignored, controller reports {}", state);
                Err(Error::Unlocked)
            }
        }
    }

    /// Read a page of flash into `out`
    pub fn read_page(&self, page: usize, out: &mut PageBuffer) -> Result<(), Error> {
        let page = Page::new(page)?;

        for word in 0..PAGE_WORDS {
            out.set_word(word, self.registers.read_word(page.word_address(word)));
        }

        Ok(())
    }

    /// Program a page with the contents of `data`.
    ///
    /// Flash can only clear bits, so the page has to be erased first for the
    /// result to equal `data`. Nothing is read back; use [Flash::verify_page] when
    /// the written contents need to be confirmed.
    pub fn write_page(&mut self, page: usize, data: &PageBuffer) -> Result<(), Error> {
        let page = Page::new(page)?;

        // Clear the page buffer and arm the fast page program
        self.registers.write(Register::Ctlr, ctlr::BUF_RST | ctlr::PAGE_PG);
        self.wait_while_busy();

        self.registers.write(Register::Addr, page.address());

        // Every word has to be loaded into the buffer before the next one is written
        for (index, word) in data.words().enumerate() {
            self.registers.write_word(page.word_address(index), word);
            self.registers.write(Register::Ctlr, ctlr::BUF_LOAD | ctlr::PAGE_PG);
            self.wait_while_busy();
        }

        // Burn the buffer into the page
        self.registers.write(Register::Ctlr, ctlr::STRT | ctlr::PAGE_PG);
        self.wait_while_busy();

        // Synchronize the changes
        self.registers.synchronize();

        Ok(())
    }

    /// Erase a page and check that every word reads back as erased.
    ///
    /// Returns [Error::EraseFailed] if any word still has a bit cleared.
    pub fn erase_page(&mut self, page: usize) -> Result<(), Error> {
        let page = Page::new(page)?;

        self.registers.write(Register::Ctlr, ctlr::PAGE_ER);
        self.registers.write(Register::Addr, page.address());
        self.registers.write(Register::Ctlr, ctlr::STRT | ctlr::PAGE_ER);
        // Wait for the erase to be done
        self.wait_while_busy();

        // Synchronize the changes
        self.registers.synchronize();

        for word in 0..PAGE_WORDS {
            let value = self.registers.read_word(page.word_address(word));
            if value != ERASED_WORD {
                flash_warn!(
                    "page {} word {} reads {:#010X} after erase",
                    page.index(),
                    word,
                    value
                );
                return Err(Error::EraseFailed);
            }
        }

        Ok(())
    }

    /// Compare a page against `expected`.
    ///
    /// Returns [Error::VerifyFailed] on the first word that differs.
    pub fn verify_page(&self, page: usize, expected: &PageBuffer) -> Result<(), Error> {
        let page = Page::new(page)?;

        for (index, word) in expected.words().enumerate() {
            if self.registers.read_word(page.word_address(index)) != word {
                flash_debug!("page {} differs at word {}", page.index(), index);
                return Err(Error::VerifyFailed);
            }
        }

        Ok(())
    }

    /// Spin until the controller clears its busy flag.
    /// There is no timeout, see [crate::bounded] for a bounded variant.
    fn wait_while_busy(&self) {
        while self.registers.read(Register::Statr) & statr::BSY != 0 {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{page::PAGE_SIZE, sim::SimulatedFlash, MAX_PAGE};

    fn simulator() -> SimulatedFlash {
        SimulatedFlash::new().with_busy_polls(2)
    }

    fn counting() -> PageBuffer {
        let mut data = PageBuffer::new();
        for (i, byte) in data.bytes.iter_mut().enumerate() {
            *byte = i as u8;
        }
        data
    }

    #[test]
    fn unlock_reaches_fast_mode() {
        let mut sim = simulator();
        let mut flash = Flash::new(&mut sim);
        assert_eq!(flash.lock_state(), LockState::Locked);
        assert_eq!(flash.unlock(), Ok(()));
        assert_eq!(flash.lock_state(), LockState::UnlockedFast);
    }

    #[test]
    fn unlock_from_normal_mode() {
        let mut sim = simulator().with_lock_state(LockState::UnlockedNormal);
        let mut flash = Flash::new(&mut sim);
        assert_eq!(flash.lock_state(), LockState::UnlockedNormal);
        assert_eq!(flash.unlock(), Ok(()));
        assert_eq!(flash.lock_state(), LockState::UnlockedFast);
    }

    #[test]
    fn unlock_is_idempotent() {
        let mut sim = simulator();
        let mut flash = Flash::new(&mut sim);
        assert_eq!(flash.unlock(), Ok(()));
        let writes = flash.registers().register_writes();
        assert_eq!(flash.unlock(), Ok(()));
        assert_eq!(flash.lock_state(), LockState::UnlockedFast);
        // The second unlock must not send the keys again
        assert_eq!(flash.registers().register_writes(), writes);
        assert!(!sim.is_key_locked_out());
    }

    #[test]
    fn rejected_unlock_is_reported() {
        let mut sim = simulator();
        sim.set_reject_unlock(true);
        let mut flash = Flash::new(&mut sim);
        assert_eq!(flash.unlock(), Err(Error::Locked));
        assert_eq!(flash.lock_state(), LockState::Locked);
    }

    #[test]
    fn lock_is_idempotent() {
        let mut sim = simulator();
        let mut flash = Flash::new(&mut sim);
        flash.unlock().unwrap();
        assert_eq!(flash.lock(), Ok(()));
        assert_eq!(flash.lock_state(), LockState::Locked);
        assert_eq!(flash.lock(), Ok(()));
        assert_eq!(flash.lock_state(), LockState::Locked);
    }

    #[test]
    fn ignored_lock_is_reported() {
        let mut sim = simulator();
        sim.set_ignore_lock(true);
        let mut flash = Flash::new(&mut sim);
        flash.unlock().unwrap();
        assert_eq!(flash.lock(), Err(Error::Unlocked));
        assert_eq!(flash.lock_state(), LockState::UnlockedFast);
    }

    #[test]
    fn lock_and_unlock_again() {
        let mut sim = simulator();
        let mut flash = Flash::new(&mut sim);
        flash.unlock().unwrap();
        flash.lock().unwrap();
        assert_eq!(flash.unlock(), Ok(()));
        assert_eq!(flash.lock_state(), LockState::UnlockedFast);
    }

    #[test]
    fn erase_then_read_is_all_ones() {
        let mut sim = simulator();
        let mut flash = Flash::new(&mut sim);
        flash.unlock().unwrap();

        for page in [0, 1, 127, MAX_PAGE] {
            assert_eq!(flash.erase_page(page), Ok(()));
            let mut buffer = PageBuffer::new();
            assert_eq!(flash.read_page(page, &mut buffer), Ok(()));
            assert_eq!(buffer, PageBuffer::erased());
        }
    }

    #[test]
    fn erase_only_touches_its_page() {
        let mut sim = simulator();
        let mut flash = Flash::new(&mut sim);
        flash.unlock().unwrap();
        flash.erase_page(10).unwrap();

        let mut buffer = PageBuffer::erased();
        flash.read_page(9, &mut buffer).unwrap();
        assert_eq!(buffer, PageBuffer::new());
        flash.read_page(11, &mut buffer).unwrap();
        assert_eq!(buffer, PageBuffer::new());
    }

    #[test]
    fn write_round_trip() {
        let mut sim = simulator();
        let mut flash = Flash::new(&mut sim);
        flash.unlock().unwrap();

        let data = counting();
        flash.erase_page(MAX_PAGE).unwrap();
        assert_eq!(flash.write_page(MAX_PAGE, &data), Ok(()));

        let mut buffer = PageBuffer::new();
        flash.read_page(MAX_PAGE, &mut buffer).unwrap();
        for i in 0..PAGE_SIZE {
            assert_eq!(buffer.bytes[i], i as u8);
        }
        assert_eq!(flash.verify_page(MAX_PAGE, &data), Ok(()));
    }

    #[test]
    fn write_round_trip_patterns() {
        let mut sim = simulator();
        let mut flash = Flash::new(&mut sim);
        flash.unlock().unwrap();

        let mut alternating = PageBuffer::new();
        for (i, byte) in alternating.bytes.iter_mut().enumerate() {
            *byte = if i % 2 == 0 { 0xAA } else { 0x55 };
        }
        let mut one_zero_word = PageBuffer::erased();
        one_zero_word.set_word(7, 0);
        let mut mixed_words = PageBuffer::new();
        for word in 0..PAGE_WORDS {
            mixed_words.set_word(word, 0x0102_0304u32.wrapping_mul(word as u32 + 1) ^ 0x8000_0001);
        }
        let patterns = [
            alternating,
            one_zero_word,
            mixed_words,
            PageBuffer::new(),
            PageBuffer::erased(),
            counting(),
        ];

        for (page, data) in [0, 1, 100, 128, 254, MAX_PAGE].into_iter().zip(patterns.iter()) {
            flash.erase_page(page).unwrap();
            assert_eq!(flash.write_page(page, data), Ok(()));

            let mut buffer = PageBuffer::new();
            flash.read_page(page, &mut buffer).unwrap();
            assert_eq!(&buffer, data, "page {}", page);
        }

        // Writing one page left the others alone
        for (page, data) in [0, 1, 100, 128, 254, MAX_PAGE].into_iter().zip(patterns.iter()) {
            assert_eq!(flash.verify_page(page, data), Ok(()), "page {}", page);
        }
    }

    #[test]
    fn write_without_erase_only_clears_bits() {
        let mut sim = simulator();
        let mut flash = Flash::new(&mut sim);
        flash.unlock().unwrap();

        flash.erase_page(4).unwrap();
        flash.write_page(4, &PageBuffer::from([0x0F; PAGE_SIZE])).unwrap();
        flash.write_page(4, &PageBuffer::from([0xF1; PAGE_SIZE])).unwrap();

        // The write itself reports success, only a read back shows the damage
        assert_eq!(
            flash.verify_page(4, &PageBuffer::from([0xF1; PAGE_SIZE])),
            Err(Error::VerifyFailed)
        );
        let mut buffer = PageBuffer::new();
        flash.read_page(4, &mut buffer).unwrap();
        assert_eq!(buffer, PageBuffer::from([0x01; PAGE_SIZE]));
    }

    #[test]
    fn write_follows_buffered_protocol() {
        let mut sim = simulator();
        let mut flash = Flash::new(&mut sim);
        flash.unlock().unwrap();
        flash.write_page(2, &counting()).unwrap();

        let writes = sim.ctlr_writes();
        assert_eq!(writes.len(), 1 + PAGE_WORDS + 1);
        assert_eq!(writes[0], ctlr::BUF_RST | ctlr::PAGE_PG);
        assert!(writes[1..=PAGE_WORDS]
            .iter()
            .all(|w| *w == ctlr::BUF_LOAD | ctlr::PAGE_PG));
        assert_eq!(writes[PAGE_WORDS + 1], ctlr::STRT | ctlr::PAGE_PG);
    }

    #[test]
    fn erase_follows_protocol() {
        let mut sim = simulator();
        let mut flash = Flash::new(&mut sim);
        flash.unlock().unwrap();
        flash.erase_page(2).unwrap();

        assert_eq!(
            sim.ctlr_writes(),
            &[ctlr::PAGE_ER, ctlr::STRT | ctlr::PAGE_ER]
        );
    }

    #[test]
    fn stuck_bit_fails_erase() {
        let mut sim = simulator();
        sim.stick_bits(Page::new(7).unwrap(), 15, 0x0000_0100);
        let mut flash = Flash::new(&mut sim);
        flash.unlock().unwrap();

        assert_eq!(flash.erase_page(7), Err(Error::EraseFailed));
        assert_eq!(flash.erase_page(8), Ok(()));
    }

    #[test]
    fn erase_while_locked_fails_verification() {
        let mut sim = simulator();
        let mut flash = Flash::new(&mut sim);
        assert_eq!(flash.erase_page(0), Err(Error::EraseFailed));
    }

    #[test]
    fn out_of_range_never_reaches_hardware() {
        let mut sim = simulator();
        let mut flash = Flash::new(&mut sim);
        flash.unlock().unwrap();
        let before = flash.registers().accesses();

        let mut buffer = PageBuffer::new();
        for page in [MAX_PAGE + 1, 1000, usize::MAX] {
            assert_eq!(flash.read_page(page, &mut buffer), Err(Error::PageOutOfRange));
            assert_eq!(flash.write_page(page, &buffer), Err(Error::PageOutOfRange));
            assert_eq!(flash.erase_page(page), Err(Error::PageOutOfRange));
            assert_eq!(flash.verify_page(page, &buffer), Err(Error::PageOutOfRange));
        }

        assert_eq!(flash.registers().accesses(), before);
        assert_eq!(buffer, PageBuffer::new());
    }

    #[test]
    fn read_does_not_touch_registers() {
        let mut sim = simulator();
        let flash = Flash::new(&mut sim);
        let writes = flash.registers().register_writes();
        let mut buffer = PageBuffer::new();
        flash.read_page(0, &mut buffer).unwrap();
        assert_eq!(flash.registers().register_writes(), writes);
    }
}
