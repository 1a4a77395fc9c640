#![doc = include_str!("../README.md")]
#![cfg_attr(not(any(test, feature = "std-compat")), no_std)]
#![warn(missing_docs)]

#[macro_use]
mod log;

pub mod bounded;
pub mod error;
pub mod ffi;
pub mod flash;
pub mod hexdump;
pub mod lock;
pub mod page;
pub mod registers;
#[cfg(any(test, feature = "std-compat"))]
pub mod sim;
pub mod storage;

pub use error::Error;
pub use flash::Flash;
pub use lock::LockState;
pub use page::{Page, PageBuffer, MAX_PAGE, PAGE_COUNT, PAGE_SIZE, PAGE_WORDS};
pub use registers::{FlashRegisters, Mmio, Register};
