//! Busy-waiting with an upper bound.
//!
//! The driver spins on the busy flag for as long as the controller keeps it set,
//! which is what the hardware contract asks for. A wedged controller then hangs
//! the caller forever. [BoundedRegisters] wraps the register access and gives up
//! after a number of consecutive busy reads.
//!
//! This is a deviation from the plain driver. Once the bound expires the
//! wrapper reports the controller as idle and drops every further write, so
//! the driver runs out its sequence without feeding a busy controller.
//! [BoundedFlash::run] replaces the outcome with [Timeout::Expired]. The page
//! that was being worked on must be treated as undefined after that.
//!
//! The wrapped driver is only reachable through [BoundedFlash::run], so an
//! operation that ran into the bound can never be reported as a success.

use core::cell::Cell;

use crate::{
    registers::{statr, FlashRegisters, Register},
    Error, Flash,
};

/// Register access that stops reporting busy after `max_polls` consecutive busy reads.
///
/// Only [BoundedFlash] creates it.
#[derive(Debug)]
pub struct BoundedRegisters<R> {
    inner: R,
    max_polls: u32,
    polls: Cell<u32>,
    expired: Cell<bool>,
}

impl<R: FlashRegisters> BoundedRegisters<R> {
    fn new(inner: R, max_polls: u32) -> Self {
        Self {
            inner,
            max_polls,
            polls: Cell::new(0),
            expired: Cell::new(false),
        }
    }

    /// Returns `true` if the bound expired during the current operation
    pub fn expired(&self) -> bool {
        self.expired.get()
    }

    fn reset(&self) {
        self.polls.set(0);
        self.expired.set(false);
    }

    /// The wrapped register access
    pub fn inner(&self) -> &R {
        &self.inner
    }
}

impl<R: FlashRegisters> FlashRegisters for BoundedRegisters<R> {
    fn read(&self, register: Register) -> u32 {
        let value = self.inner.read(register);
        if register != Register::Statr {
            return value;
        }

        if value & statr::BSY == 0 {
            self.polls.set(0);
            return value;
        }
        if self.expired.get() {
            return value & !statr::BSY;
        }

        let polls = self.polls.get() + 1;
        self.polls.set(polls);
        if polls >= self.max_polls {
            flash_warn!("flash controller still busy after {} polls, giving up", polls);
            self.expired.set(true);
            return value & !statr::BSY;
        }
        value
    }

    fn write(&mut self, register: Register, value: u32) {
        if !self.expired.get() {
            self.inner.write(register, value)
        }
    }

    fn read_word(&self, address: u32) -> u32 {
        self.inner.read_word(address)
    }

    fn write_word(&mut self, address: u32, value: u32) {
        if !self.expired.get() {
            self.inner.write_word(address, value)
        }
    }

    fn synchronize(&mut self) {
        self.inner.synchronize()
    }
}

/// The driver with a bound on every busy-wait
pub struct BoundedFlash<R> {
    flash: Flash<BoundedRegisters<R>>,
}

impl<R: FlashRegisters> BoundedFlash<R> {
    /// Drive `registers`, allowing at most `max_polls` busy reads in a row
    pub fn new(registers: R, max_polls: u32) -> Self {
        Self {
            flash: Flash::new(BoundedRegisters::new(registers, max_polls)),
        }
    }

    /// Run one or more driver operations with the busy-wait bound in effect.
    ///
    /// Returns [Timeout::Expired] if the bound expired at any point, whatever
    /// the operations themselves returned.
    pub fn run<T>(
        &mut self,
        operation: impl FnOnce(&mut Flash<BoundedRegisters<R>>) -> Result<T, Error>,
    ) -> Result<T, Timeout> {
        self.flash.registers().reset();
        let result = operation(&mut self.flash);
        if self.flash.registers().expired() {
            return Err(Timeout::Expired);
        }
        result.map_err(Timeout::Failed)
    }

    /// The wrapped register access
    pub fn registers(&self) -> &R {
        self.flash.registers().inner()
    }

    /// Give back the wrapped register access
    pub fn free(self) -> R {
        self.flash.free().inner
    }
}

/// The outcome of a bounded flash operation that did not succeed
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Timeout {
    /// The controller stayed busy for longer than the bound
    Expired,
    /// The operation finished in time but failed
    Failed(Error),
}

impl From<Error> for Timeout {
    fn from(error: Error) -> Self {
        Timeout::Failed(error)
    }
}

impl core::fmt::Display for Timeout {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Timeout::Expired => f.write_str("flash controller stayed busy"),
            Timeout::Failed(error) => write!(f, "{}", error),
        }
    }
}
