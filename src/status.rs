//! `STATUS` register decoding
//!
//! The 16-bit `STATUS` word mixes live state (busy, direction, motor state,
//! switch level) with latched flags (switch event, command errors, and the
//! active-low fault bits). The chip clears the latched flags when status is
//! read through the `GetStatus` command, so a caller that needs both the
//! live state and the fault history must take one [`Status`] snapshot and
//! derive both from it.

use crate::motion::Direction;

/// Motor operating state reported by the `MOT_STATUS` field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MotorState {
    /// Motor stopped
    Stopped,
    /// Motor accelerating
    Accelerating,
    /// Motor decelerating
    Decelerating,
    /// Motor running at constant speed
    ConstantSpeed,
}

/// Decoded snapshot of the 16-bit `STATUS` register
///
/// All accessors report the condition in positive logic regardless of the
/// wire polarity; the fault bits in particular are active-low on the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status {
    raw: u16,
}

impl Status {
    /// Wrap a raw `STATUS` register value
    #[must_use]
    pub const fn from_raw(raw: u16) -> Self {
        Self { raw }
    }

    /// The raw register value
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.raw
    }

    const fn bit(self, index: u8) -> bool {
        self.raw & (1 << index) != 0
    }

    /// Bridges are in high impedance (motor undriven)
    #[must_use]
    pub const fn is_high_impedance(self) -> bool {
        self.bit(0)
    }

    /// A motion command is still executing
    ///
    /// The wire bit is active-low: `BUSY` low means busy.
    #[must_use]
    pub const fn is_busy(self) -> bool {
        !self.bit(1)
    }

    /// Level of the external switch input (closed = grounded)
    #[must_use]
    pub const fn switch_closed(self) -> bool {
        self.bit(2)
    }

    /// A switch turn-on event was latched (cleared by `GetStatus`)
    #[must_use]
    pub const fn switch_event(self) -> bool {
        self.bit(3)
    }

    /// Direction of the current or last motion
    #[must_use]
    pub const fn direction(self) -> Direction {
        Direction::from_forward_bit(self.bit(4))
    }

    /// Current motor operating state
    #[must_use]
    pub const fn motor_state(self) -> MotorState {
        match (self.raw >> 5) & 0b11 {
            0 => MotorState::Stopped,
            1 => MotorState::Accelerating,
            2 => MotorState::Decelerating,
            _ => MotorState::ConstantSpeed,
        }
    }

    /// The last command could not be performed (latched)
    #[must_use]
    pub const fn command_not_performed(self) -> bool {
        self.bit(7)
    }

    /// The last command opcode was invalid (latched)
    #[must_use]
    pub const fn wrong_command(self) -> bool {
        self.bit(8)
    }

    /// Undervoltage lockout tripped (latched)
    #[must_use]
    pub const fn undervoltage(self) -> bool {
        !self.bit(9)
    }

    /// Thermal warning threshold exceeded (latched)
    #[must_use]
    pub const fn thermal_warning(self) -> bool {
        !self.bit(10)
    }

    /// Thermal shutdown: bridges were disabled (latched)
    #[must_use]
    pub const fn thermal_shutdown(self) -> bool {
        !self.bit(11)
    }

    /// Overcurrent detected (latched)
    #[must_use]
    pub const fn overcurrent(self) -> bool {
        !self.bit(12)
    }

    /// Stall detected on bridge A (latched)
    #[must_use]
    pub const fn stall_a(self) -> bool {
        !self.bit(13)
    }

    /// Stall detected on bridge B (latched)
    #[must_use]
    pub const fn stall_b(self) -> bool {
        !self.bit(14)
    }

    /// The STCK pin is configured as a step-clock input
    #[must_use]
    pub const fn step_clock_mode(self) -> bool {
        self.bit(15)
    }

    /// Extract the latched fault flags from this snapshot
    #[must_use]
    pub const fn faults(self) -> FaultFlags {
        FaultFlags {
            undervoltage: self.undervoltage(),
            thermal_warning: self.thermal_warning(),
            thermal_shutdown: self.thermal_shutdown(),
            overcurrent: self.overcurrent(),
            stall_a: self.stall_a(),
            stall_b: self.stall_b(),
            command_error: self.wrong_command() || self.command_not_performed(),
        }
    }
}

/// Latched fault conditions extracted from a [`Status`] snapshot
///
/// These flags remain set on the chip until status is read through the
/// `GetStatus` command
/// ([`L6470Driver::get_error`](crate::L6470Driver::get_error)), regardless of
/// whether the underlying condition persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FaultFlags {
    /// Supply voltage dropped below the lockout threshold
    pub undervoltage: bool,
    /// Die temperature exceeded the warning threshold
    pub thermal_warning: bool,
    /// Die temperature forced a bridge shutdown
    pub thermal_shutdown: bool,
    /// Bridge current exceeded the `OCD_TH` threshold
    pub overcurrent: bool,
    /// Stall detected on bridge A
    pub stall_a: bool,
    /// Stall detected on bridge B
    pub stall_b: bool,
    /// A command was rejected or could not be performed
    pub command_error: bool,
}

impl FaultFlags {
    /// Whether any fault is flagged
    #[must_use]
    pub const fn any(self) -> bool {
        self.undervoltage
            || self.thermal_warning
            || self.thermal_shutdown
            || self.overcurrent
            || self.stall_a
            || self.stall_b
            || self.command_error
    }
}
