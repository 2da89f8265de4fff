#![no_std]
#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod device;
pub mod interface;
pub mod motion;
pub mod registers;
pub mod status;

// Re-export main types
pub use device::L6470Driver;
pub use interface::{ByteTransfer, SpiInterface};
pub use motion::{BemfConfig, Direction, MotionProfile, StepMode, SwitchAction};
pub use registers::{Access, Register};
pub use status::{FaultFlags, MotorState, Status};

/// Power-on value of the `CONFIG` register
///
/// The chip loads this value after power-up and after the `ResetDevice`
/// command. [`L6470Driver::init_motion`] reads `CONFIG` back right after the
/// reset and compares it against this constant to catch wiring or power
/// faults (an unpowered or miswired chip reads all-zeros or all-ones).
pub const CONFIG_RESET_VALUE: u16 = 0x2E88;

/// Largest absolute position representable by the 22-bit `ABS_POS` counter
pub const POSITION_MAX: i32 = (1 << 21) - 1;

/// Smallest (most negative) absolute position representable by `ABS_POS`
pub const POSITION_MIN: i32 = -(1 << 21);

/// Driver errors
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// Communication error with the device
    Bus(E),
    /// `CONFIG` read-back after reset did not match [`CONFIG_RESET_VALUE`]
    /// (contains the actual value read)
    InvalidDevice(u16),
    /// Attempted to write a read-only register
    ReadOnly(Register),
}

impl<E> From<E> for Error<E> {
    fn from(error: E) -> Self {
        Self::Bus(error)
    }
}
