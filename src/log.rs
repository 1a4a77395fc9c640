//! Logging macros used by the driver.
//!
//! On the target the messages go over RTT when the `rtt` feature is enabled,
//! host builds print them to stdout and otherwise they are compiled out.

#[cfg(any(test, feature = "std-compat"))]
macro_rules! flash_log {
    ($level:literal, $($arg:tt)*) => {
        std::println!("[{}] {}", $level, format_args!($($arg)*))
    };
}

#[cfg(all(feature = "rtt", not(any(test, feature = "std-compat"))))]
macro_rules! flash_log {
    ($level:literal, $($arg:tt)*) => {
        rtt_target::rprintln!("[{}] {}", $level, format_args!($($arg)*))
    };
}

#[cfg(not(any(test, feature = "std-compat", feature = "rtt")))]
macro_rules! flash_log {
    ($level:literal, $($arg:tt)*) => {{
        // Keep the arguments type checked even though nothing is printed
        let _ = format_args!($($arg)*);
    }};
}

macro_rules! flash_debug {
    ($($arg:tt)*) => {
        flash_log!("DEBUG", $($arg)*)
    };
}

macro_rules! flash_warn {
    ($($arg:tt)*) => {
        flash_log!("WARN", $($arg)*)
    };
}
