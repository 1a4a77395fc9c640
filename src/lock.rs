//! The lock state of the controller

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::registers::ctlr;

/// The lock state of the flash controller.
///
/// The state is never stored. It is derived from the LOCK and FLOCK bits of
/// the control register every time it is needed.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
pub enum LockState {
    /// Flash is completely locked. This is the state after reset.
    Locked = 0,
    /// Normal mode is unlocked, fast mode is still locked.
    /// The driver has no operation that targets this state but the hardware can be in it.
    UnlockedNormal = 1,
    /// Fast mode is unlocked and page erase/program are available
    UnlockedFast = 2,
}

impl LockState {
    /// Classify a snapshot of the control register
    pub const fn from_ctlr(value: u32) -> Self {
        if value & ctlr::LOCK != 0 {
            LockState::Locked
        } else if value & ctlr::FLOCK != 0 {
            LockState::UnlockedNormal
        } else {
            LockState::UnlockedFast
        }
    }

    /// Returns `true` if the state is [`UnlockedFast`].
    ///
    /// [`UnlockedFast`]: LockState::UnlockedFast
    pub fn is_unlocked_fast(&self) -> bool {
        matches!(self, Self::UnlockedFast)
    }
}

impl core::fmt::Display for LockState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self)
    }
}
