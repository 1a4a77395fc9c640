//! Register map of the flash controller and the hardware access seam.
//!
//! The driver never touches memory directly. Everything goes through
//! [FlashRegisters] so the same protocol code runs against the real
//! peripheral ([Mmio]) and against the simulated controller in host builds.

use core::cell::Cell;
use core::sync::atomic::{self, Ordering};

use critical_section::Mutex;

/// Start of the memory mapped program flash
pub const FLASH_BASE: u32 = 0x0800_0000;
/// Start of the flash controller register block
pub const FLASH_R_BASE: u32 = 0x4002_2000;

/// First value of the unlock key sequence
pub const KEY1: u32 = 0x4567_0123;
/// Second value of the unlock key sequence
pub const KEY2: u32 = 0xCDEF_89AB;

/// Status register bits
pub mod statr {
    /// An operation is in progress
    pub const BSY: u32 = 1 << 0;
    /// Write protection error
    pub const WRPRTERR: u32 = 1 << 4;
    /// End of operation
    pub const EOP: u32 = 1 << 5;
}

/// Control register bits
pub mod ctlr {
    /// Start the armed erase or program operation
    pub const STRT: u32 = 1 << 6;
    /// Normal mode lock. Set only, cleared by the KEYR sequence.
    pub const LOCK: u32 = 1 << 7;
    /// Fast mode lock. Set only, cleared by the MODEKEYR sequence.
    pub const FLOCK: u32 = 1 << 15;
    /// Fast page program
    pub const PAGE_PG: u32 = 1 << 16;
    /// Fast page erase
    pub const PAGE_ER: u32 = 1 << 17;
    /// Load the last written word into the page buffer
    pub const BUF_LOAD: u32 = 1 << 18;
    /// Reset the page buffer
    pub const BUF_RST: u32 = 1 << 19;
}

/// The controller registers used by the driver
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Register {
    /// Key register for the normal mode unlock
    Keyr,
    /// Status register
    Statr,
    /// Control register
    Ctlr,
    /// Target address of erase and program operations
    Addr,
    /// Key register for the fast mode unlock
    Modekeyr,
}

impl Register {
    /// Byte offset of the register from [FLASH_R_BASE]
    pub const fn offset(self) -> u32 {
        match self {
            Register::Keyr => 0x04,
            Register::Statr => 0x0C,
            Register::Ctlr => 0x10,
            Register::Addr => 0x14,
            Register::Modekeyr => 0x24,
        }
    }

    /// Absolute address of the register
    pub const fn address(self) -> u32 {
        FLASH_R_BASE + self.offset()
    }
}

/// Access to the flash controller and the flash memory it manages.
///
/// Implementations must not reorder or elide any access: every call is one
/// bus transaction on real hardware.
pub trait FlashRegisters {
    /// Read a controller register
    fn read(&self, register: Register) -> u32;

    /// Write a controller register
    fn write(&mut self, register: Register, value: u32);

    /// Read one word of flash memory at the given absolute address
    fn read_word(&self, address: u32) -> u32;

    /// Write one word to the given absolute flash address.
    /// Only meaningful while a program operation is armed.
    fn write_word(&mut self, address: u32, value: u32);

    /// Read-modify-write a controller register
    fn modify(&mut self, register: Register, f: impl FnOnce(u32) -> u32) {
        let value = self.read(register);
        self.write(register, f(value));
    }

    /// Make sure all flash changes are visible to subsequent reads and fetches
    fn synchronize(&mut self) {}
}

// The chip has no atomic instructions, so the flag is guarded by a critical section
static TAKEN: Mutex<Cell<bool>> = Mutex::new(Cell::new(false));

/// Volatile access to the real controller.
///
/// This is a capability token: it is neither `Copy` nor `Clone`, and
/// [Mmio::take] hands it out only once.
#[derive(Debug)]
pub struct Mmio {
    _private: (),
}

impl Mmio {
    /// Take the controller. Returns `None` if it has been taken before.
    pub fn take() -> Option<Self> {
        critical_section::with(|cs| {
            let taken = TAKEN.borrow(cs);
            if taken.replace(true) {
                None
            } else {
                Some(Self { _private: () })
            }
        })
    }

    /// Create the token without checking whether it was already handed out.
    ///
    /// # Safety
    ///
    /// The caller must make sure no other context drives the controller at the same time.
    /// Two interleaved register sequences corrupt each other.
    pub unsafe fn steal() -> Self {
        critical_section::with(|cs| TAKEN.borrow(cs).set(true));
        Self { _private: () }
    }
}

impl FlashRegisters for Mmio {
    fn read(&self, register: Register) -> u32 {
        // This is safe because the register block is always mapped and reads have no side effects
        unsafe { (register.address() as *const u32).read_volatile() }
    }

    fn write(&mut self, register: Register, value: u32) {
        // This is safe because we hold the only token for the controller
        unsafe { (register.address() as *mut u32).write_volatile(value) }
    }

    fn read_word(&self, address: u32) -> u32 {
        // The driver only hands us word aligned addresses that it validated against the flash size
        unsafe { (address as *const u32).read_volatile() }
    }

    fn write_word(&mut self, address: u32, value: u32) {
        unsafe { (address as *mut u32).write_volatile(value) }
    }

    fn synchronize(&mut self) {
        atomic::fence(Ordering::SeqCst);
    }
}

impl<T: FlashRegisters> FlashRegisters for &mut T {
    fn read(&self, register: Register) -> u32 {
        (**self).read(register)
    }

    fn write(&mut self, register: Register, value: u32) {
        (**self).write(register, value)
    }

    fn read_word(&self, address: u32) -> u32 {
        (**self).read_word(address)
    }

    fn write_word(&mut self, address: u32, value: u32) {
        (**self).write_word(address, value)
    }

    fn synchronize(&mut self) {
        (**self).synchronize()
    }
}
