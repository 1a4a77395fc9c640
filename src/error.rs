//! Errors reported by the driver

use embedded_storage::nor_flash::{NorFlashError, NorFlashErrorKind};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Everything that can go wrong in a flash operation.
///
/// The discriminants are the status codes of the C interface, `0` is reserved for success.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
pub enum Error {
    /// The unlock key sequence ran but the controller still is not in fast mode
    Locked = 1,
    /// The page index is larger than [crate::MAX_PAGE]
    PageOutOfRange = 2,
    /// A required buffer was not given
    InvalidPointer = 3,
    /// The lock bit was set but the controller still reports being unlocked
    Unlocked = 4,
    /// A word of the page did not read back as erased after the erase finished
    EraseFailed = 5,
    /// The page contents differ from the expected data
    VerifyFailed = 6,
    /// An offset or length does not fall on a word boundary
    Unaligned = 7,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let text = match self {
            Error::Locked => "flash is still locked after the unlock sequence",
            Error::PageOutOfRange => "page index out of range",
            Error::InvalidPointer => "no page buffer given",
            Error::Unlocked => "flash is still unlocked after setting the lock bit",
            Error::EraseFailed => "page is not fully erased after erase",
            Error::VerifyFailed => "page contents do not match",
            Error::Unaligned => "offset or length is not word aligned",
        };
        f.write_str(text)
    }
}

impl NorFlashError for Error {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            Self::PageOutOfRange => NorFlashErrorKind::OutOfBounds,
            Self::Unaligned => NorFlashErrorKind::NotAligned,
            _ => NorFlashErrorKind::Other,
        }
    }
}

impl From<NorFlashErrorKind> for Error {
    fn from(kind: NorFlashErrorKind) -> Self {
        match kind {
            NorFlashErrorKind::NotAligned => Self::Unaligned,
            _ => Self::PageOutOfRange,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(u8::from(Error::Locked), 1);
        assert_eq!(u8::from(Error::PageOutOfRange), 2);
        assert_eq!(u8::from(Error::InvalidPointer), 3);
        assert_eq!(u8::from(Error::Unlocked), 4);
        assert_eq!(u8::from(Error::EraseFailed), 5);
        assert_eq!(Error::try_from(6).ok(), Some(Error::VerifyFailed));
        assert_eq!(u8::from(Error::Unaligned), 7);
        assert!(Error::try_from(0).is_err());
        assert!(Error::try_from(8).is_err());
    }

    #[test]
    fn nor_flash_kind() {
        assert_eq!(Error::PageOutOfRange.kind(), NorFlashErrorKind::OutOfBounds);
        assert_eq!(Error::Unaligned.kind(), NorFlashErrorKind::NotAligned);
        assert_eq!(Error::EraseFailed.kind(), NorFlashErrorKind::Other);
        assert_eq!(Error::from(NorFlashErrorKind::NotAligned), Error::Unaligned);
    }
}
