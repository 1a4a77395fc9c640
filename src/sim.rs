//! Simulated flash controller for host builds.
//!
//! Models the parts of the controller the driver relies on:
//! - the KEYR/MODEKEYR key sequences and the set-only LOCK/FLOCK bits
//! - the fast page buffer (reset, load, start) and page erase
//! - programming can only clear bits, erase sets them all again
//! - the busy flag stays up for a configurable number of status reads
//!
//! Faults can be injected to exercise the error paths, and every register
//! access is counted so tests can check that invalid calls never reach the hardware.

use core::cell::Cell;

use crate::{
    lock::LockState,
    page::{Page, PAGE_COUNT, PAGE_SIZE, PAGE_WORDS},
    registers::{ctlr, statr, FlashRegisters, Register, FLASH_BASE, KEY1, KEY2},
    PageBuffer,
};

/// Bits of CTLR that only the driver can arm while fast mode is unlocked
const FAST_BITS: u32 = ctlr::PAGE_PG | ctlr::PAGE_ER | ctlr::BUF_LOAD | ctlr::BUF_RST | ctlr::STRT;
/// Bits of CTLR that keep their value after a write
const MODE_BITS: u32 = ctlr::PAGE_PG | ctlr::PAGE_ER;
/// The erased value of a flash word
const ERASED: u32 = 0xFFFF_FFFF;

/// Progress through a two word key sequence
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum KeyStage {
    Idle,
    GotKey1,
}

/// An in-memory stand-in for the flash controller and its 16 KiB of flash
#[derive(Debug)]
pub struct SimulatedFlash {
    memory: Vec<u32>,
    /// LOCK and FLOCK
    lock_bits: u32,
    /// The armed mode bits (PAGE_PG, PAGE_ER)
    mode: u32,
    addr: u32,
    statr: u32,
    page_buffer: [u32; PAGE_WORDS],
    /// The last word written to the flash window, waiting for BUF_LOAD
    pending: Option<(u32, u32)>,

    keyr_stage: KeyStage,
    modekeyr_stage: KeyStage,
    key_lockout: bool,

    busy_polls: u32,
    busy: Cell<u32>,

    stuck_busy: bool,
    reject_unlock: bool,
    ignore_lock: bool,
    stuck_bits: Vec<(usize, u32)>,

    register_reads: Cell<usize>,
    register_writes: usize,
    flash_reads: Cell<usize>,
    flash_writes: usize,
    ctlr_writes: Vec<u32>,
}

impl SimulatedFlash {
    /// A locked controller with all of flash programmed to zero
    pub fn new() -> Self {
        Self {
            memory: vec![0; PAGE_COUNT * PAGE_WORDS],
            lock_bits: ctlr::LOCK | ctlr::FLOCK,
            mode: 0,
            addr: 0,
            statr: 0,
            page_buffer: [ERASED; PAGE_WORDS],
            pending: None,
            keyr_stage: KeyStage::Idle,
            modekeyr_stage: KeyStage::Idle,
            key_lockout: false,
            busy_polls: 1,
            busy: Cell::new(0),
            stuck_busy: false,
            reject_unlock: false,
            ignore_lock: false,
            stuck_bits: Vec::new(),
            register_reads: Cell::new(0),
            register_writes: 0,
            flash_reads: Cell::new(0),
            flash_writes: 0,
            ctlr_writes: Vec::new(),
        }
    }

    /// Keep the busy flag set for `polls` status reads after every operation
    pub fn with_busy_polls(mut self, polls: u32) -> Self {
        self.busy_polls = polls;
        self
    }

    /// Preload a page, bypassing the controller
    pub fn with_page(mut self, page: Page, contents: &PageBuffer) -> Self {
        for (index, word) in contents.words().enumerate() {
            self.memory[page.index() * PAGE_WORDS + index] = word;
        }
        self
    }

    /// Put the lock bits into the state that classifies as `state`
    pub fn with_lock_state(mut self, state: LockState) -> Self {
        self.lock_bits = match state {
            LockState::Locked => ctlr::LOCK | ctlr::FLOCK,
            LockState::UnlockedNormal => ctlr::FLOCK,
            LockState::UnlockedFast => 0,
        };
        self
    }

    /// The busy flag never clears
    pub fn set_stuck_busy(&mut self, stuck: bool) {
        self.stuck_busy = stuck;
    }

    /// Key sequences are accepted but never clear the lock bits
    pub fn set_reject_unlock(&mut self, reject: bool) {
        self.reject_unlock = reject;
    }

    /// Writes to the LOCK bit are ignored
    pub fn set_ignore_lock(&mut self, ignore: bool) {
        self.ignore_lock = ignore;
    }

    /// The bits in `mask` of word `word` of `page` are stuck at zero and survive an erase
    pub fn stick_bits(&mut self, page: Page, word: usize, mask: u32) {
        self.stuck_bits.push((page.index() * PAGE_WORDS + word, mask));
    }

    /// The current contents of a page, bypassing the controller
    pub fn page_contents(&self, page: Page) -> PageBuffer {
        let mut buffer = PageBuffer::new();
        let start = page.index() * PAGE_WORDS;
        for (index, word) in self.memory[start..start + PAGE_WORDS].iter().enumerate() {
            buffer.set_word(index, *word);
        }
        buffer
    }

    /// The lock state as the hardware sees it
    pub fn lock_state(&self) -> LockState {
        LockState::from_ctlr(self.lock_bits)
    }

    /// Returns `true` if a wrong key locked the key registers until reset
    pub fn is_key_locked_out(&self) -> bool {
        self.key_lockout
    }

    /// Returns `true` if an erase or program was attempted without fast mode unlocked
    pub fn write_protect_error(&self) -> bool {
        self.statr & statr::WRPRTERR != 0
    }

    /// Number of controller register writes so far
    pub fn register_writes(&self) -> usize {
        self.register_writes
    }

    /// Number of register and flash accesses of any kind so far
    pub fn accesses(&self) -> usize {
        self.register_reads.get() + self.register_writes + self.flash_reads.get() + self.flash_writes
    }

    /// Every value written to CTLR, in order
    pub fn ctlr_writes(&self) -> &[u32] {
        &self.ctlr_writes
    }

    fn start_busy(&mut self) {
        self.busy.set(self.busy_polls);
        self.statr &= !statr::EOP;
    }

    fn finish(&mut self) {
        self.start_busy();
        self.statr |= statr::EOP;
    }

    fn word_index(address: u32) -> usize {
        assert!(
            address % 4 == 0,
            "Unaligned flash access at {:#010X}",
            address
        );
        match address.checked_sub(FLASH_BASE) {
            Some(offset) if (offset as usize) < PAGE_COUNT * PAGE_SIZE => offset as usize / 4,
            _ => panic!("Flash access outside of flash memory at {:#010X}", address),
        }
    }

    fn key_step(stage: &mut KeyStage, lockout: &mut bool, value: u32) -> bool {
        match (*stage, value) {
            (KeyStage::Idle, KEY1) => {
                *stage = KeyStage::GotKey1;
                false
            }
            (KeyStage::GotKey1, KEY2) => {
                *stage = KeyStage::Idle;
                true
            }
            _ => {
                // A wrong key locks the register until the next reset
                *stage = KeyStage::Idle;
                *lockout = true;
                false
            }
        }
    }

    fn write_keyr(&mut self, value: u32) {
        if self.key_lockout {
            return;
        }
        if Self::key_step(&mut self.keyr_stage, &mut self.key_lockout, value) {
            if !self.reject_unlock {
                self.lock_bits &= !ctlr::LOCK;
            }
            self.start_busy();
        }
    }

    fn write_modekeyr(&mut self, value: u32) {
        if self.key_lockout {
            return;
        }
        if Self::key_step(&mut self.modekeyr_stage, &mut self.key_lockout, value) {
            // Fast mode can only be unlocked after normal mode
            if !self.reject_unlock && self.lock_bits & ctlr::LOCK == 0 {
                self.lock_bits &= !ctlr::FLOCK;
            }
            self.start_busy();
        }
    }

    fn write_ctlr(&mut self, value: u32) {
        self.ctlr_writes.push(value);

        if value & ctlr::LOCK != 0 {
            if !self.ignore_lock {
                self.lock_bits |= ctlr::LOCK | ctlr::FLOCK;
            }
            // Locking disarms whatever mode was set
            self.mode = 0;
            return;
        }
        if value & ctlr::FLOCK != 0 {
            self.lock_bits |= ctlr::FLOCK;
        }

        if value & FAST_BITS == 0 {
            self.mode = 0;
            return;
        }
        if !self.lock_state().is_unlocked_fast() {
            self.statr |= statr::WRPRTERR;
            return;
        }

        self.mode = value & MODE_BITS;

        if self.mode & ctlr::PAGE_PG != 0 {
            if value & ctlr::BUF_RST != 0 {
                self.page_buffer = [ERASED; PAGE_WORDS];
                self.pending = None;
                self.finish();
            }
            if value & ctlr::BUF_LOAD != 0 {
                if let Some((address, word)) = self.pending.take() {
                    self.page_buffer[(address as usize % PAGE_SIZE) / 4] = word;
                }
                self.finish();
            }
            if value & ctlr::STRT != 0 {
                let start = Self::word_index(self.addr & !(PAGE_SIZE as u32 - 1));
                for (index, word) in self.page_buffer.iter().enumerate() {
                    // Programming can only clear bits
                    self.memory[start + index] &= *word;
                }
                self.page_buffer = [ERASED; PAGE_WORDS];
                self.finish();
            }
        } else if self.mode & ctlr::PAGE_ER != 0 && value & ctlr::STRT != 0 {
            let start = Self::word_index(self.addr & !(PAGE_SIZE as u32 - 1));
            for index in start..start + PAGE_WORDS {
                self.memory[index] = ERASED;
            }
            for (index, mask) in &self.stuck_bits {
                if (start..start + PAGE_WORDS).contains(index) {
                    self.memory[*index] &= !mask;
                }
            }
            self.finish();
        }
    }
}

impl Default for SimulatedFlash {
    fn default() -> Self {
        Self::new()
    }
}

impl FlashRegisters for SimulatedFlash {
    fn read(&self, register: Register) -> u32 {
        self.register_reads.set(self.register_reads.get() + 1);
        match register {
            Register::Statr => {
                let remaining = self.busy.get();
                if self.stuck_busy {
                    self.statr | statr::BSY
                } else if remaining > 0 {
                    self.busy.set(remaining - 1);
                    self.statr | statr::BSY
                } else {
                    self.statr
                }
            }
            Register::Ctlr => self.lock_bits | self.mode,
            Register::Addr => self.addr,
            // The key registers read as zero
            Register::Keyr | Register::Modekeyr => 0,
        }
    }

    fn write(&mut self, register: Register, value: u32) {
        self.register_writes += 1;
        match register {
            Register::Keyr => self.write_keyr(value),
            Register::Modekeyr => self.write_modekeyr(value),
            Register::Ctlr => self.write_ctlr(value),
            Register::Addr => self.addr = value,
            Register::Statr => {
                // Status flags are cleared by writing a one
                self.statr &= !(value & (statr::EOP | statr::WRPRTERR));
            }
        }
    }

    fn read_word(&self, address: u32) -> u32 {
        self.flash_reads.set(self.flash_reads.get() + 1);
        self.memory[Self::word_index(address)]
    }

    fn write_word(&mut self, address: u32, value: u32) {
        self.flash_writes += 1;
        // Panics if the driver computed an address outside of flash
        let _ = Self::word_index(address);
        if self.mode & ctlr::PAGE_PG != 0 {
            self.pending = Some((address, value));
        }
    }
}
