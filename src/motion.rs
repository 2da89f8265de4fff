//! Motion profile types and physical-unit conversions
//!
//! The chip stores speeds and rates as fixed-point fractions of its internal
//! 250 ns tick. Each conversion function below is the single source of truth
//! for its register's scale exponent and width: speed-class registers encode
//! `round(steps_per_s * tick * 2^exp)`, acceleration registers encode
//! `round(steps_per_s2 * tick^2 * 2^40)`.
//!
//! All conversions clamp to the register's representable range before
//! encoding; out-of-range inputs saturate instead of overflowing the bit
//! field, and the inverse of each conversion is an exact round trip within
//! one register LSB.

use crate::registers::Register;

/// Duration of the chip's internal tick in seconds (250 ns)
pub const TICK_SECONDS: f32 = 250.0e-9;

/// Low-speed optimization enable, bit 12 of the `MIN_SPEED` register
pub(crate) const LSPD_OPT: u32 = 1 << 12;

/// Rotation direction
///
/// "Forward" and "reverse" are the chip's convention; which physical rotation
/// that maps to depends on motor wiring. See
/// [`L6470Driver::set_direction_inverted`](crate::L6470Driver::set_direction_inverted)
/// for reconciling the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Direction bit 0
    Reverse,
    /// Direction bit 1
    Forward,
}

impl Direction {
    /// The opposite direction
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Reverse => Self::Forward,
            Self::Forward => Self::Reverse,
        }
    }

    pub(crate) const fn bit(self) -> u8 {
        match self {
            Self::Reverse => 0,
            Self::Forward => 1,
        }
    }

    pub(crate) const fn from_forward_bit(forward: bool) -> Self {
        if forward { Self::Forward } else { Self::Reverse }
    }
}

/// What the chip does with the position counter when the external switch
/// trips during `GoUntil`, or when `ReleaseSW` completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SwitchAction {
    /// Reset the absolute position counter to zero
    ResetPosition,
    /// Copy the absolute position into the `MARK` register
    MarkPosition,
}

impl SwitchAction {
    pub(crate) const fn bit(self) -> u8 {
        match self {
            Self::ResetPosition => 0x00,
            Self::MarkPosition => 0x08,
        }
    }
}

/// Microstepping mode: how many microsteps make up one full motor step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StepMode {
    /// Full-step mode
    Full = 0,
    /// 2 microsteps per full step
    Half = 1,
    /// 4 microsteps per full step
    Quarter = 2,
    /// 8 microsteps per full step
    Eighth = 3,
    /// 16 microsteps per full step
    Sixteenth = 4,
    /// 32 microsteps per full step
    ThirtySecond = 5,
    /// 64 microsteps per full step
    SixtyFourth = 6,
    /// 128 microsteps per full step (power-on default)
    OneTwentyEighth = 7,
}

impl StepMode {
    /// Microsteps per full motor step (1, 2, 4, ... 128)
    #[must_use]
    pub const fn microsteps(self) -> u8 {
        1 << self as u8
    }

    /// Look up the mode for a microsteps-per-full-step divisor
    ///
    /// Returns `None` unless `microsteps` is a power of two in `1..=128`.
    #[must_use]
    pub const fn from_microsteps(microsteps: u8) -> Option<Self> {
        match microsteps {
            1 => Some(Self::Full),
            2 => Some(Self::Half),
            4 => Some(Self::Quarter),
            8 => Some(Self::Eighth),
            16 => Some(Self::Sixteenth),
            32 => Some(Self::ThirtySecond),
            64 => Some(Self::SixtyFourth),
            128 => Some(Self::OneTwentyEighth),
            _ => None,
        }
    }

    /// Value of the `STEP_SEL` field in the `STEP_MODE` register
    #[must_use]
    pub const fn step_sel(self) -> u8 {
        self as u8
    }
}

/// Motion profile applied to the chip's speed and rate registers
///
/// All fields are in physical units: steps/s for speeds, steps/s² for rates.
/// Setters clamp each field to its register's representable range and report
/// the value actually applied, so saturation is observable by comparing input
/// and output.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotionProfile {
    /// Speed ceiling for all positioning commands (steps/s)
    pub max_speed: f32,
    /// Speed floor; 0 lets the chip start from standstill (steps/s)
    pub min_speed: f32,
    /// Acceleration rate (steps/s²)
    pub acceleration: f32,
    /// Deceleration rate (steps/s²)
    pub deceleration: f32,
    /// Switch the bridges to full-step drive above the full-scale cutoff
    /// speed
    ///
    /// When `false`, applying the profile pins the `FS_SPD` register to its
    /// ceiling so the chip never leaves microstepping. When `true`, the
    /// cutoff configured via
    /// [`set_full_scale_cutoff`](crate::L6470Driver::set_full_scale_cutoff)
    /// (or the chip default of ~602.7 steps/s) stays in effect.
    pub full_step_switching: bool,
}

impl MotionProfile {
    /// Profile matching the chip's power-on register values
    pub const POWER_ON: Self = Self {
        max_speed: 991.8,
        min_speed: 0.0,
        acceleration: 2008.2,
        deceleration: 2008.2,
        full_step_switching: true,
    };
}

impl Default for MotionProfile {
    fn default() -> Self {
        Self {
            max_speed: 500.0,
            min_speed: 0.0,
            acceleration: 100.0,
            deceleration: 100.0,
            full_step_switching: false,
        }
    }
}

/// Back-EMF compensation parameters
///
/// The `k_val_*` amplitudes and the slope fields are raw 8-bit register
/// values (amplitude = Vs × value / 256); the intersect speed is in steps/s.
/// The defaults are the chip's power-on values.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BemfConfig {
    /// Voltage amplitude while holding position
    pub k_val_hold: u8,
    /// Voltage amplitude at constant speed
    pub k_val_run: u8,
    /// Voltage amplitude while accelerating
    pub k_val_acc: u8,
    /// Voltage amplitude while decelerating
    pub k_val_dec: u8,
    /// Speed at which the compensation slopes intersect (steps/s)
    pub intersect_speed: f32,
    /// Compensation slope below the intersect speed
    pub start_slope: u8,
    /// Compensation slope above the intersect speed while accelerating
    pub accel_final_slope: u8,
    /// Compensation slope above the intersect speed while decelerating
    pub decel_final_slope: u8,
}

impl Default for BemfConfig {
    fn default() -> Self {
        Self {
            k_val_hold: 0x29,
            k_val_run: 0x29,
            k_val_acc: 0x29,
            k_val_dec: 0x29,
            intersect_speed: 61.5,
            start_slope: 0x19,
            accel_final_slope: 0x29,
            decel_final_slope: 0x29,
        }
    }
}

// steps/s per register LSB for a speed-class register with the given scale
// exponent.
fn speed_factor(exponent: u32) -> f32 {
    TICK_SECONDS * (1u64 << exponent) as f32
}

// Round-and-saturate a non-negative fixed-point value into [0, max].
fn to_fixed(value: f32, factor: f32, max: u32) -> u32 {
    if !(value > 0.0) {
        return 0;
    }
    let scaled = libm::roundf(value * factor);
    if scaled >= max as f32 { max } else { scaled as u32 }
}

/// Convert steps/s to the 20-bit `SPEED` register format
///
/// This format is also the payload of the `Run` and `GoUntil` commands.
#[must_use]
pub fn speed_to_reg(steps_per_s: f32) -> u32 {
    to_fixed(steps_per_s, speed_factor(28), Register::Speed.max_unsigned())
}

/// Convert a `SPEED` register value to steps/s
#[must_use]
pub fn speed_from_reg(reg: u32) -> f32 {
    reg as f32 / speed_factor(28)
}

/// Convert steps/s to the 10-bit `MAX_SPEED` register format
#[must_use]
pub fn max_speed_to_reg(steps_per_s: f32) -> u32 {
    to_fixed(steps_per_s, speed_factor(18), Register::MaxSpeed.max_unsigned())
}

/// Convert a `MAX_SPEED` register value to steps/s
#[must_use]
pub fn max_speed_from_reg(reg: u32) -> f32 {
    reg as f32 / speed_factor(18)
}

/// Convert steps/s to the 12-bit speed field of the `MIN_SPEED` register
///
/// Bit 12 of the register (low-speed optimization) is not part of the speed
/// field and is handled separately by the driver.
#[must_use]
pub fn min_speed_to_reg(steps_per_s: f32) -> u32 {
    to_fixed(steps_per_s, speed_factor(24), LSPD_OPT - 1)
}

/// Convert a `MIN_SPEED` speed field value to steps/s
#[must_use]
pub fn min_speed_from_reg(reg: u32) -> f32 {
    (reg & (LSPD_OPT - 1)) as f32 / speed_factor(24)
}

/// Convert steps/s to the 10-bit `FS_SPD` register format
///
/// The datasheet offsets this register by half an LSB: the switching
/// threshold is `(FS_SPD + 0.5) * 2^-18 / tick` steps/s.
#[must_use]
pub fn full_scale_to_reg(steps_per_s: f32) -> u32 {
    to_fixed(
        steps_per_s * speed_factor(18) - 0.5,
        1.0,
        Register::FsSpd.max_unsigned(),
    )
}

/// Convert an `FS_SPD` register value to the switching threshold in steps/s
#[must_use]
pub fn full_scale_from_reg(reg: u32) -> f32 {
    (reg as f32 + 0.5) / speed_factor(18)
}

/// Convert steps/s to the 14-bit `INT_SPEED` register format
#[must_use]
pub fn intersect_speed_to_reg(steps_per_s: f32) -> u32 {
    to_fixed(steps_per_s, speed_factor(26), Register::IntSpeed.max_unsigned())
}

/// Convert an `INT_SPEED` register value to steps/s
#[must_use]
pub fn intersect_speed_from_reg(reg: u32) -> f32 {
    reg as f32 / speed_factor(26)
}

// ACC/DEC LSB: 2^-40 steps per tick². 0xFFF is reserved by the chip, so the
// usable ceiling is one LSB below the field maximum.
const ACCEL_REG_MAX: u32 = 0xFFE;

fn accel_factor() -> f32 {
    TICK_SECONDS * TICK_SECONDS * (1u64 << 40) as f32
}

/// Convert steps/s² to the 12-bit `ACC`/`DEC` register format
#[must_use]
pub fn accel_to_reg(steps_per_s2: f32) -> u32 {
    to_fixed(steps_per_s2, accel_factor(), ACCEL_REG_MAX)
}

/// Convert an `ACC`/`DEC` register value to steps/s²
#[must_use]
pub fn accel_from_reg(reg: u32) -> f32 {
    reg as f32 / accel_factor()
}

/// Convert an overcurrent threshold in milliamps to the 4-bit `OCD_TH`
/// register format (375 mA per step, 375 mA..6 A)
#[must_use]
pub fn ocd_threshold_to_reg(milliamps: f32) -> u32 {
    let steps = libm::roundf(milliamps / 375.0);
    if steps <= 1.0 {
        0
    } else if steps >= 16.0 {
        Register::OcdTh.max_unsigned()
    } else {
        steps as u32 - 1
    }
}

/// Convert an `OCD_TH` register value to milliamps
#[must_use]
pub fn ocd_threshold_from_reg(reg: u32) -> f32 {
    (reg + 1) as f32 * 375.0
}

/// Convert a stall detection threshold in milliamps to the 7-bit `STALL_TH`
/// register format (31.25 mA per step, 31.25 mA..4 A)
#[must_use]
pub fn stall_threshold_to_reg(milliamps: f32) -> u32 {
    let steps = libm::roundf(milliamps / 31.25);
    if steps <= 1.0 {
        0
    } else if steps >= 128.0 {
        Register::StallTh.max_unsigned()
    } else {
        steps as u32 - 1
    }
}

/// Convert a `STALL_TH` register value to milliamps
#[must_use]
pub fn stall_threshold_from_reg(reg: u32) -> f32 {
    (reg + 1) as f32 * 31.25
}
