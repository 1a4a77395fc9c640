//! Demo of the flash driver running against the simulated controller.
//!
//! Unlocks the flash, erases the last page, prints it, fills it with a
//! counting pattern and prints it again after reading it back.

use std::process::ExitCode;

use ch32_flash::{hexdump::HexDump, sim::SimulatedFlash, Flash, PageBuffer, MAX_PAGE};

fn main() -> ExitCode {
    let mut flash = Flash::new(SimulatedFlash::new().with_busy_polls(4));

    println!("\n\n--------------- ch32-flash demo ---------------\n");

    print!("Unlocking flash.....");
    if let Err(e) = flash.unlock() {
        println!("Failed: {}", e);
        return ExitCode::FAILURE;
    }
    println!("Done");

    print!("Erasing Flash Page {}....", MAX_PAGE);
    if let Err(e) = flash.erase_page(MAX_PAGE) {
        println!("Failed: {}", e);
        return ExitCode::FAILURE;
    }
    println!("Done");

    let mut page = PageBuffer::new();
    if let Err(e) = flash.read_page(MAX_PAGE, &mut page) {
        println!("Reading page {} failed: {}", MAX_PAGE, e);
        return ExitCode::FAILURE;
    }
    println!("\n\nRead Flash Page {}...", MAX_PAGE);
    print!("{}", HexDump(&page));

    // Change the values in the page data buffer for the demo
    for (i, byte) in page.bytes.iter_mut().enumerate() {
        *byte = i as u8;
    }

    if let Err(e) = flash.write_page(MAX_PAGE, &page) {
        println!("Writing page {} failed: {}", MAX_PAGE, e);
        return ExitCode::FAILURE;
    }

    let mut read_back = PageBuffer::new();
    if let Err(e) = flash.read_page(MAX_PAGE, &mut read_back) {
        println!("Reading page {} failed: {}", MAX_PAGE, e);
        return ExitCode::FAILURE;
    }
    println!("\n\nOverwritten Flash Page {}...", MAX_PAGE);
    print!("{}", HexDump(&read_back));

    if let Err(e) = flash.verify_page(MAX_PAGE, &page) {
        println!("Page {} does not match what was written: {}", MAX_PAGE, e);
        return ExitCode::FAILURE;
    }

    if let Err(e) = flash.lock() {
        println!("Locking flash failed: {}", e);
        return ExitCode::FAILURE;
    }
    println!("Flash is {}", flash.lock_state());

    ExitCode::SUCCESS
}
