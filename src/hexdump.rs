//! Hex dump of a page for diagnostics.
//!
//! Every byte is printed as two upper case hex digits followed by two spaces,
//! with a line break after every 16 bytes.

use core::fmt::{self, Write};

use arrayvec::ArrayString;

use crate::page::{PageBuffer, PAGE_SIZE};

/// Bytes per line of the dump
pub const BYTES_PER_LINE: usize = 16;
/// Length of the complete dump of one page
pub const HEX_DUMP_LEN: usize = PAGE_SIZE * 4 + PAGE_SIZE / BYTES_PER_LINE;

/// Displays a page as a hex dump
#[derive(Debug, Copy, Clone)]
pub struct HexDump<'a>(pub &'a PageBuffer);

impl fmt::Display for HexDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.0.bytes.chunks(BYTES_PER_LINE) {
            for byte in line {
                write!(f, "{:02X}  ", byte)?;
            }
            f.write_char('\n')?;
        }
        Ok(())
    }
}

/// Render the hex dump of a page into a fixed size string
pub fn hex_dump(page: &PageBuffer) -> ArrayString<HEX_DUMP_LEN> {
    let mut text = ArrayString::new();
    // The capacity is exactly the length of a dump, so this can't run out of space
    let _ = write!(text, "{}", HexDump(page));
    text
}
