//! Raw pointer entry points and the C interface to the driver.
//!
//! The raw pointer functions are the only place a missing buffer can show up,
//! they reject it with [Error::InvalidPointer] before anything else is checked.
//!
//! With the `ffi` feature the `flash_*` functions are exported for C callers.
//! Every one of them returns `0` on success or the code of the [Error] as a C
//! `int`, the size of a C enum. Lock states are returned as their
//! [crate::LockState] code. The functions drive the real controller, so the
//! caller must not run two of them at the same time.

use core::ffi::c_int;

#[cfg(feature = "ffi")]
use crate::Mmio;
use crate::{registers::FlashRegisters, Error, Flash, PageBuffer};

/// Status code for success
pub const FLASH_OK: c_int = 0;

/// Turn a driver result into a status code
pub fn status_code(result: Result<(), Error>) -> c_int {
    match result {
        Ok(()) => FLASH_OK,
        Err(error) => c_int::from(u8::from(error)),
    }
}

#[cfg(feature = "ffi")]
fn flash() -> Flash<Mmio> {
    // The C side owns the controller and serializes the calls
    Flash::new(unsafe { Mmio::steal() })
}

/// Read a page through a raw pointer. A null pointer is rejected before the page index is checked.
///
/// # Safety
///
/// `out` must be null or valid for writes of a [PageBuffer].
pub unsafe fn read_page_raw<R: FlashRegisters>(
    flash: &Flash<R>,
    page: usize,
    out: *mut PageBuffer,
) -> Result<(), Error> {
    let out = out.as_mut().ok_or(Error::InvalidPointer)?;
    flash.read_page(page, out)
}

/// Write a page through a raw pointer. A null pointer is rejected before the page index is checked.
///
/// # Safety
///
/// `data` must be null or valid for reads of a [PageBuffer].
pub unsafe fn write_page_raw<R: FlashRegisters>(
    flash: &mut Flash<R>,
    page: usize,
    data: *const PageBuffer,
) -> Result<(), Error> {
    let data = data.as_ref().ok_or(Error::InvalidPointer)?;
    flash.write_page(page, data)
}

/// Returns the lock state of the flash
#[cfg(feature = "ffi")]
#[no_mangle]
pub extern "C" fn flash_get_lock_state() -> c_int {
    c_int::from(u8::from(flash().lock_state()))
}

/// Unlocks the flash into fast mode
#[cfg(feature = "ffi")]
#[no_mangle]
pub extern "C" fn flash_unlock() -> c_int {
    status_code(flash().unlock())
}

/// Locks the flash
#[cfg(feature = "ffi")]
#[no_mangle]
pub extern "C" fn flash_lock() -> c_int {
    status_code(flash().lock())
}

/// Reads page `page_num` into `page_ptr`
///
/// # Safety
///
/// `page_ptr` must be null or point to a writable 64 byte page buffer.
#[cfg(feature = "ffi")]
#[no_mangle]
pub unsafe extern "C" fn flash_read_page(page_num: usize, page_ptr: *mut PageBuffer) -> c_int {
    status_code(read_page_raw(&flash(), page_num, page_ptr))
}

/// Programs page `page_num` with the contents of `page_ptr`
///
/// # Safety
///
/// `page_ptr` must be null or point to a readable 64 byte page buffer.
#[cfg(feature = "ffi")]
#[no_mangle]
pub unsafe extern "C" fn flash_write_page(page_num: usize, page_ptr: *const PageBuffer) -> c_int {
    status_code(write_page_raw(&mut flash(), page_num, page_ptr))
}

/// Erases page `page_num` and verifies the erase
#[cfg(feature = "ffi")]
#[no_mangle]
pub extern "C" fn flash_erase_page(page_num: usize) -> c_int {
    status_code(flash().erase_page(page_num))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{sim::SimulatedFlash, MAX_PAGE};
    use core::ptr;

    #[test]
    fn null_pointer_is_rejected_without_hardware_access() {
        let mut sim = SimulatedFlash::new();
        let mut flash = Flash::new(&mut sim);

        // Null is checked first, even when the page is out of range too
        for page in [0, MAX_PAGE + 1] {
            assert_eq!(
                unsafe { read_page_raw(&flash, page, ptr::null_mut()) },
                Err(Error::InvalidPointer)
            );
            assert_eq!(
                unsafe { write_page_raw(&mut flash, page, ptr::null()) },
                Err(Error::InvalidPointer)
            );
        }
        assert_eq!(flash.registers().accesses(), 0);
    }

    #[test]
    fn valid_pointer_round_trip() {
        let mut sim = SimulatedFlash::new();
        let mut flash = Flash::new(&mut sim);
        flash.unlock().unwrap();
        flash.erase_page(MAX_PAGE).unwrap();

        let data = PageBuffer::from([0xA5; 64]);
        let mut out = PageBuffer::new();
        assert_eq!(unsafe { write_page_raw(&mut flash, MAX_PAGE, &data) }, Ok(()));
        assert_eq!(unsafe { read_page_raw(&flash, MAX_PAGE, &mut out) }, Ok(()));
        assert_eq!(out, data);

        assert_eq!(
            unsafe { read_page_raw(&flash, MAX_PAGE + 1, &mut out) },
            Err(Error::PageOutOfRange)
        );
    }

    #[test]
    fn status_codes() {
        assert_eq!(status_code(Ok(())), FLASH_OK);
        assert_eq!(status_code(Err(Error::Locked)), 1);
        assert_eq!(status_code(Err(Error::PageOutOfRange)), 2);
        assert_eq!(status_code(Err(Error::InvalidPointer)), 3);
        assert_eq!(status_code(Err(Error::VerifyFailed)), 6);
    }
}
