//! High-level driver API for the L6470
//!
//! [`L6470Driver`] owns the command/parameter protocol: it encodes register
//! writes and reads through the generic codec in [`crate::registers`],
//! translates physical units through [`crate::motion`], and issues the
//! non-blocking motion command set.
//!
//! Every motion command returns as soon as its bytes are transferred; the
//! chip performs the motion asynchronously. Completion is observed by
//! polling [`is_busy`](L6470Driver::is_busy) or
//! [`get_status`](L6470Driver::get_status).

use crate::interface::ByteTransfer;
use crate::motion::{
    self, BemfConfig, Direction, MotionProfile, StepMode, SwitchAction, LSPD_OPT,
};
use crate::registers::{self, opcode, Access, Register};
use crate::status::{FaultFlags, Status};
use crate::{Error, CONFIG_RESET_VALUE};

// MOVE takes a 22-bit unsigned microstep count.
const MOVE_STEPS_MAX: u32 = (1 << 22) - 1;

/// Driver for one L6470 motor controller
///
/// The driver is bound to exactly one transport for its whole lifetime. It
/// caches only what the chip cannot report in physical units on its own
/// terms — the configured step mode, the direction-inversion flag and the
/// last applied motion profile; position and status are read fresh on every
/// call because they change asynchronously while the motor runs.
///
/// Dropping the driver performs no chip-side action: a motor left running
/// keeps running. Callers that want a safe teardown issue
/// [`soft_hiz`](Self::soft_hiz) or [`hard_hiz`](Self::hard_hiz) before
/// dropping or [`release`](Self::release)-ing the driver.
pub struct L6470Driver<B> {
    bus: B,
    step_mode: StepMode,
    direction_inverted: bool,
    profile: MotionProfile,
}

impl<B> L6470Driver<B>
where
    B: ByteTransfer,
{
    /// Create a new driver bound to the given transport
    ///
    /// No bytes are transferred; the cached configuration starts at the
    /// chip's power-on defaults. Call [`init_motion`](Self::init_motion) to
    /// reset and configure the chip.
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            step_mode: StepMode::OneTwentyEighth,
            direction_inverted: false,
            profile: MotionProfile::POWER_ON,
        }
    }

    /// Consume the driver and return the transport
    ///
    /// No chip-side cleanup is performed; stop the motor first if it should
    /// not keep running.
    pub fn release(self) -> B {
        self.bus
    }

    fn xfer(&mut self, byte: u8) -> Result<u8, Error<B::Error>> {
        self.bus.transfer(byte).map_err(Error::Bus)
    }

    fn send_command(&mut self, opcode: u8, payload: &[u8]) -> Result<(), Error<B::Error>> {
        self.xfer(opcode)?;
        for &byte in payload {
            self.xfer(byte)?;
        }
        Ok(())
    }

    fn apply_direction(&self, direction: Direction) -> Direction {
        if self.direction_inverted {
            direction.opposite()
        } else {
            direction
        }
    }

    // ==================== Initialization ====================

    /// Reset the chip and apply a step mode and motion profile
    ///
    /// After the reset, `CONFIG` is read back and compared against its
    /// power-on value as a wiring/power sanity check. Returns the profile as
    /// actually applied (each field clamped to its register range).
    ///
    /// # Errors
    ///
    /// [`Error::InvalidDevice`] if the `CONFIG` read-back does not match
    /// [`CONFIG_RESET_VALUE`]; any bus error otherwise.
    pub fn init_motion(
        &mut self,
        mode: StepMode,
        profile: &MotionProfile,
    ) -> Result<MotionProfile, Error<B::Error>> {
        self.reset_device()?;
        let config = self.config()?;
        if config != CONFIG_RESET_VALUE {
            return Err(Error::InvalidDevice(config));
        }
        self.set_step_mode(mode)?;
        self.apply_profile(profile)
    }

    /// Apply every field of a motion profile to the chip
    ///
    /// Returns the profile as actually applied. When
    /// [`full_step_switching`](MotionProfile::full_step_switching) is
    /// disabled, `FS_SPD` is pinned to its ceiling so the chip never switches
    /// out of microstepping; otherwise the configured cutoff is left alone.
    pub fn apply_profile(
        &mut self,
        profile: &MotionProfile,
    ) -> Result<MotionProfile, Error<B::Error>> {
        let applied = MotionProfile {
            max_speed: self.set_max_speed(profile.max_speed)?,
            min_speed: self.set_min_speed(profile.min_speed)?,
            acceleration: self.set_acceleration(profile.acceleration)?,
            deceleration: self.set_deceleration(profile.deceleration)?,
            full_step_switching: profile.full_step_switching,
        };
        if !profile.full_step_switching {
            self.set_param(Register::FsSpd, Register::FsSpd.max_unsigned())?;
        }
        self.profile = applied;
        Ok(applied)
    }

    /// Apply back-EMF compensation parameters
    ///
    /// The chip's defaults ([`BemfConfig::default`]) suit many motors; tuned
    /// values come from the motor's electrical constants per the datasheet's
    /// application note.
    pub fn init_bemf(&mut self, config: &BemfConfig) -> Result<(), Error<B::Error>> {
        self.set_param(Register::KvalHold, config.k_val_hold as u32)?;
        self.set_param(Register::KvalRun, config.k_val_run as u32)?;
        self.set_param(Register::KvalAcc, config.k_val_acc as u32)?;
        self.set_param(Register::KvalDec, config.k_val_dec as u32)?;
        self.set_param(
            Register::IntSpeed,
            motion::intersect_speed_to_reg(config.intersect_speed),
        )?;
        self.set_param(Register::StSlp, config.start_slope as u32)?;
        self.set_param(Register::FnSlpAcc, config.accel_final_slope as u32)?;
        self.set_param(Register::FnSlpDec, config.decel_final_slope as u32)?;
        Ok(())
    }

    // ==================== Raw parameter access ====================

    /// Write a parameter register
    ///
    /// The value is clamped to the register's bit width and the clamped value
    /// is returned, so saturation is observable by the caller.
    ///
    /// # Errors
    ///
    /// [`Error::ReadOnly`] for read-only registers, before any byte is
    /// transferred.
    pub fn set_param(&mut self, register: Register, value: u32) -> Result<u32, Error<B::Error>> {
        if let Access::ReadOnly = register.access() {
            return Err(Error::ReadOnly(register));
        }
        let clamped = registers::clamp_unsigned(register, value);
        let (bytes, len) = registers::encode(register, clamped);
        self.send_command(opcode::SET_PARAM | register.address(), &bytes[..len])?;
        Ok(clamped)
    }

    /// Write a signed parameter register (two's complement within its width)
    ///
    /// # Errors
    ///
    /// [`Error::ReadOnly`] for read-only registers.
    pub fn set_param_signed(
        &mut self,
        register: Register,
        value: i32,
    ) -> Result<i32, Error<B::Error>> {
        if let Access::ReadOnly = register.access() {
            return Err(Error::ReadOnly(register));
        }
        let clamped = registers::clamp_signed(register, value);
        let (bytes, len) = registers::encode_signed(register, clamped);
        self.send_command(opcode::SET_PARAM | register.address(), &bytes[..len])?;
        Ok(clamped)
    }

    /// Read a parameter register
    pub fn get_param(&mut self, register: Register) -> Result<u32, Error<B::Error>> {
        // Opcode phase: the byte the chip shifts back here is meaningless.
        self.xfer(opcode::GET_PARAM | register.address())?;
        let len = register.byte_len();
        let mut bytes = [0u8; 3];
        for slot in bytes.iter_mut().take(len) {
            *slot = self.xfer(opcode::NOP)?;
        }
        Ok(registers::decode(register, &bytes[..len]))
    }

    /// Read a signed parameter register, sign-extended from its width
    pub fn get_param_signed(&mut self, register: Register) -> Result<i32, Error<B::Error>> {
        self.xfer(opcode::GET_PARAM | register.address())?;
        let len = register.byte_len();
        let mut bytes = [0u8; 3];
        for slot in bytes.iter_mut().take(len) {
            *slot = self.xfer(opcode::NOP)?;
        }
        Ok(registers::decode_signed(register, &bytes[..len]))
    }

    // ==================== Device configuration ====================

    /// Write the 16-bit `CONFIG` register
    pub fn set_config(&mut self, config: u16) -> Result<(), Error<B::Error>> {
        self.set_param(Register::Config, config as u32)?;
        Ok(())
    }

    /// Read the 16-bit `CONFIG` register
    pub fn config(&mut self) -> Result<u16, Error<B::Error>> {
        Ok(self.get_param(Register::Config)? as u16)
    }

    /// Set the microstepping mode
    ///
    /// Writing `STEP_MODE` also resets the chip's electrical and absolute
    /// position, so this is normally done once at initialization.
    pub fn set_step_mode(&mut self, mode: StepMode) -> Result<(), Error<B::Error>> {
        self.set_param(Register::StepMode, mode.step_sel() as u32)?;
        self.step_mode = mode;
        Ok(())
    }

    /// The configured microstepping mode (cached)
    #[must_use]
    pub const fn step_mode(&self) -> StepMode {
        self.step_mode
    }

    /// Invert the meaning of [`Direction`] for every subsequent command
    ///
    /// With inversion enabled the direction bit is flipped on the wire, so
    /// callers keep reasoning in one fixed convention regardless of how the
    /// motor windings are connected.
    pub fn set_direction_inverted(&mut self, inverted: bool) {
        self.direction_inverted = inverted;
    }

    /// Whether direction inversion is active
    #[must_use]
    pub const fn is_direction_inverted(&self) -> bool {
        self.direction_inverted
    }

    /// The last applied motion profile (cached)
    ///
    /// Reset to the power-on values by [`reset_device`](Self::reset_device).
    #[must_use]
    pub const fn profile(&self) -> MotionProfile {
        self.profile
    }

    // ==================== Motion profile ====================

    /// Set the maximum speed in steps/s; returns the applied value
    pub fn set_max_speed(&mut self, steps_per_s: f32) -> Result<f32, Error<B::Error>> {
        let reg = motion::max_speed_to_reg(steps_per_s);
        self.set_param(Register::MaxSpeed, reg)?;
        let applied = motion::max_speed_from_reg(reg);
        self.profile.max_speed = applied;
        Ok(applied)
    }

    /// Read the maximum speed in steps/s
    pub fn max_speed(&mut self) -> Result<f32, Error<B::Error>> {
        Ok(motion::max_speed_from_reg(self.get_param(Register::MaxSpeed)?))
    }

    /// Set the minimum speed in steps/s; returns the applied value
    ///
    /// The low-speed optimization bit sharing the register is preserved.
    pub fn set_min_speed(&mut self, steps_per_s: f32) -> Result<f32, Error<B::Error>> {
        let lspd_opt = self.get_param(Register::MinSpeed)? & LSPD_OPT;
        let reg = motion::min_speed_to_reg(steps_per_s);
        self.set_param(Register::MinSpeed, lspd_opt | reg)?;
        let applied = motion::min_speed_from_reg(reg);
        self.profile.min_speed = applied;
        Ok(applied)
    }

    /// Read the minimum speed in steps/s
    pub fn min_speed(&mut self) -> Result<f32, Error<B::Error>> {
        Ok(motion::min_speed_from_reg(self.get_param(Register::MinSpeed)?))
    }

    /// Enable or disable low-speed optimization
    ///
    /// When enabled the chip applies phase-current compensation below the
    /// minimum speed. The speed field of `MIN_SPEED` is preserved.
    pub fn set_low_speed_optimization(&mut self, enable: bool) -> Result<(), Error<B::Error>> {
        let speed_field = self.get_param(Register::MinSpeed)? & (LSPD_OPT - 1);
        let value = if enable { speed_field | LSPD_OPT } else { speed_field };
        self.set_param(Register::MinSpeed, value)?;
        Ok(())
    }

    /// Set the acceleration in steps/s²; returns the applied value
    pub fn set_acceleration(&mut self, steps_per_s2: f32) -> Result<f32, Error<B::Error>> {
        let reg = motion::accel_to_reg(steps_per_s2);
        self.set_param(Register::Acc, reg)?;
        let applied = motion::accel_from_reg(reg);
        self.profile.acceleration = applied;
        Ok(applied)
    }

    /// Read the acceleration in steps/s²
    pub fn acceleration(&mut self) -> Result<f32, Error<B::Error>> {
        Ok(motion::accel_from_reg(self.get_param(Register::Acc)?))
    }

    /// Set the deceleration in steps/s²; returns the applied value
    pub fn set_deceleration(&mut self, steps_per_s2: f32) -> Result<f32, Error<B::Error>> {
        let reg = motion::accel_to_reg(steps_per_s2);
        self.set_param(Register::Dec, reg)?;
        let applied = motion::accel_from_reg(reg);
        self.profile.deceleration = applied;
        Ok(applied)
    }

    /// Read the deceleration in steps/s²
    pub fn deceleration(&mut self) -> Result<f32, Error<B::Error>> {
        Ok(motion::accel_from_reg(self.get_param(Register::Dec)?))
    }

    /// Set the full-step switching threshold in steps/s; returns the applied
    /// value
    pub fn set_full_scale_cutoff(&mut self, steps_per_s: f32) -> Result<f32, Error<B::Error>> {
        let reg = motion::full_scale_to_reg(steps_per_s);
        self.set_param(Register::FsSpd, reg)?;
        Ok(motion::full_scale_from_reg(reg))
    }

    /// Read the full-step switching threshold in steps/s
    pub fn full_scale_cutoff(&mut self) -> Result<f32, Error<B::Error>> {
        Ok(motion::full_scale_from_reg(self.get_param(Register::FsSpd)?))
    }

    /// Set the BEMF intersect speed in steps/s; returns the applied value
    pub fn set_intersect_speed(&mut self, steps_per_s: f32) -> Result<f32, Error<B::Error>> {
        let reg = motion::intersect_speed_to_reg(steps_per_s);
        self.set_param(Register::IntSpeed, reg)?;
        Ok(motion::intersect_speed_from_reg(reg))
    }

    /// Read the BEMF intersect speed in steps/s
    pub fn intersect_speed(&mut self) -> Result<f32, Error<B::Error>> {
        Ok(motion::intersect_speed_from_reg(self.get_param(Register::IntSpeed)?))
    }

    /// Set the overcurrent shutdown threshold in milliamps; returns the
    /// applied value
    pub fn set_overcurrent_threshold_ma(&mut self, milliamps: f32) -> Result<f32, Error<B::Error>> {
        let reg = motion::ocd_threshold_to_reg(milliamps);
        self.set_param(Register::OcdTh, reg)?;
        Ok(motion::ocd_threshold_from_reg(reg))
    }

    /// Set the stall detection threshold in milliamps; returns the applied
    /// value
    pub fn set_stall_threshold_ma(&mut self, milliamps: f32) -> Result<f32, Error<B::Error>> {
        let reg = motion::stall_threshold_to_reg(milliamps);
        self.set_param(Register::StallTh, reg)?;
        Ok(motion::stall_threshold_from_reg(reg))
    }

    /// Read the current motor speed in steps/s from the `SPEED` register
    pub fn current_speed(&mut self) -> Result<f32, Error<B::Error>> {
        Ok(motion::speed_from_reg(self.get_param(Register::Speed)?))
    }

    // ==================== Position ====================

    /// Read the absolute position in microsteps
    pub fn position(&mut self) -> Result<i32, Error<B::Error>> {
        self.get_param_signed(Register::AbsPos)
    }

    /// Read the absolute position in full steps, rounded to nearest
    pub fn position_full_steps(&mut self) -> Result<i32, Error<B::Error>> {
        let microsteps = self.position()?;
        Ok(libm::roundf(microsteps as f32 / self.step_mode.microsteps() as f32) as i32)
    }

    /// Overwrite the absolute position counter (microsteps); returns the
    /// applied (clamped) value
    ///
    /// The chip only accepts the write while the motor is stopped.
    pub fn set_position(&mut self, microsteps: i32) -> Result<i32, Error<B::Error>> {
        self.set_param_signed(Register::AbsPos, microsteps)
    }

    /// Overwrite the absolute position counter (full steps); returns the
    /// applied value in full steps
    pub fn set_position_full_steps(&mut self, steps: i32) -> Result<i32, Error<B::Error>> {
        let applied = self.set_position(steps.saturating_mul(self.step_mode.microsteps() as i32))?;
        Ok(applied / self.step_mode.microsteps() as i32)
    }

    /// Read the `MARK` position in microsteps
    pub fn mark(&mut self) -> Result<i32, Error<B::Error>> {
        self.get_param_signed(Register::Mark)
    }

    /// Store a position (microsteps) in the `MARK` register; returns the
    /// applied (clamped) value
    ///
    /// To capture the live position instead, use
    /// [`go_until`](Self::go_until) with [`SwitchAction::MarkPosition`].
    pub fn set_mark(&mut self, microsteps: i32) -> Result<i32, Error<B::Error>> {
        self.set_param_signed(Register::Mark, microsteps)
    }

    // ==================== Motion commands ====================
    //
    // All non-blocking: the call returns once the command bytes are
    // transferred, not once the motion finishes.

    /// Spin continuously in `direction` at `steps_per_s` until stopped
    pub fn run(&mut self, direction: Direction, steps_per_s: f32) -> Result<(), Error<B::Error>> {
        let dir = self.apply_direction(direction);
        let (bytes, len) = registers::encode(Register::Speed, motion::speed_to_reg(steps_per_s));
        self.send_command(opcode::RUN | dir.bit(), &bytes[..len])
    }

    /// Move by a relative number of microsteps
    ///
    /// The direction is derived from the sign; the magnitude saturates at the
    /// 22-bit step count the command accepts.
    pub fn move_steps(&mut self, microsteps: i32) -> Result<(), Error<B::Error>> {
        let dir = self.apply_direction(Direction::from_forward_bit(microsteps >= 0));
        let magnitude = microsteps.unsigned_abs().min(MOVE_STEPS_MAX);
        let payload = [
            (magnitude >> 16) as u8,
            (magnitude >> 8) as u8,
            magnitude as u8,
        ];
        self.send_command(opcode::MOVE | dir.bit(), &payload)
    }

    /// Move by a relative number of full steps
    pub fn move_full_steps(&mut self, steps: i32) -> Result<(), Error<B::Error>> {
        self.move_steps(steps.saturating_mul(self.step_mode.microsteps() as i32))
    }

    /// Move to an absolute position (microsteps) via the shortest path
    pub fn goto_absolute(&mut self, microsteps: i32) -> Result<(), Error<B::Error>> {
        let (bytes, len) = registers::encode_signed(Register::AbsPos, microsteps);
        self.send_command(opcode::GOTO, &bytes[..len])
    }

    /// Move to an absolute position (full steps) via the shortest path
    pub fn goto_absolute_full_steps(&mut self, steps: i32) -> Result<(), Error<B::Error>> {
        self.goto_absolute(steps.saturating_mul(self.step_mode.microsteps() as i32))
    }

    /// Move to an absolute position (microsteps) forcing the rotation
    /// direction, even if it is the longer way around
    pub fn goto_direction(
        &mut self,
        direction: Direction,
        microsteps: i32,
    ) -> Result<(), Error<B::Error>> {
        let dir = self.apply_direction(direction);
        let (bytes, len) = registers::encode_signed(Register::AbsPos, microsteps);
        self.send_command(opcode::GOTO_DIR | dir.bit(), &bytes[..len])
    }

    /// Move to an absolute position (full steps) forcing the rotation
    /// direction
    pub fn goto_direction_full_steps(
        &mut self,
        direction: Direction,
        steps: i32,
    ) -> Result<(), Error<B::Error>> {
        self.goto_direction(direction, steps.saturating_mul(self.step_mode.microsteps() as i32))
    }

    /// Run at `steps_per_s` until the external switch trips, then perform
    /// `action` and decelerate to a stop
    pub fn go_until(
        &mut self,
        action: SwitchAction,
        direction: Direction,
        steps_per_s: f32,
    ) -> Result<(), Error<B::Error>> {
        let dir = self.apply_direction(direction);
        let (bytes, len) = registers::encode(Register::Speed, motion::speed_to_reg(steps_per_s));
        self.send_command(opcode::GO_UNTIL | action.bit() | dir.bit(), &bytes[..len])
    }

    /// Step away from a tripped switch at minimum speed until it releases,
    /// then perform `action` and stop
    pub fn release_switch(
        &mut self,
        action: SwitchAction,
        direction: Direction,
    ) -> Result<(), Error<B::Error>> {
        let dir = self.apply_direction(direction);
        self.send_command(opcode::RELEASE_SW | action.bit() | dir.bit(), &[])
    }

    /// Move to absolute position 0 via the shortest path at maximum speed
    pub fn go_home(&mut self) -> Result<(), Error<B::Error>> {
        self.send_command(opcode::GO_HOME, &[])
    }

    /// Move to the position stored in `MARK` via the shortest path
    pub fn go_mark(&mut self) -> Result<(), Error<B::Error>> {
        self.send_command(opcode::GO_MARK, &[])
    }

    /// Zero the absolute position counter without moving
    pub fn reset_position(&mut self) -> Result<(), Error<B::Error>> {
        self.send_command(opcode::RESET_POS, &[])
    }

    /// Reset the chip to power-on defaults
    ///
    /// The chip truly forgets its configuration: the cached step mode and
    /// motion profile are reset to the power-on values, and callers must
    /// reapply their settings (typically via
    /// [`init_motion`](Self::init_motion)).
    pub fn reset_device(&mut self) -> Result<(), Error<B::Error>> {
        self.send_command(opcode::RESET_DEVICE, &[])?;
        self.step_mode = StepMode::OneTwentyEighth;
        self.profile = MotionProfile::POWER_ON;
        Ok(())
    }

    /// Decelerate to a stop; the bridges stay driven (holding torque)
    pub fn soft_stop(&mut self) -> Result<(), Error<B::Error>> {
        self.send_command(opcode::SOFT_STOP, &[])
    }

    /// Stop immediately (infinite deceleration); the bridges stay driven
    pub fn hard_stop(&mut self) -> Result<(), Error<B::Error>> {
        self.send_command(opcode::HARD_STOP, &[])
    }

    /// Decelerate to a stop, then release the bridges to high impedance
    pub fn soft_hiz(&mut self) -> Result<(), Error<B::Error>> {
        self.send_command(opcode::SOFT_HIZ, &[])
    }

    /// Release the bridges to high impedance immediately, no deceleration
    pub fn hard_hiz(&mut self) -> Result<(), Error<B::Error>> {
        self.send_command(opcode::HARD_HIZ, &[])
    }

    // ==================== Status ====================

    /// Read the status register without clearing latched flags
    ///
    /// Status reflects live, asynchronously changing chip state and is never
    /// cached; every call issues a fresh read. Safe to poll: latched fault
    /// flags survive this read (contrast [`get_error`](Self::get_error)).
    pub fn get_status(&mut self) -> Result<Status, Error<B::Error>> {
        Ok(Status::from_raw(self.get_param(Register::Status)? as u16))
    }

    /// Whether a motion command is still executing
    pub fn is_busy(&mut self) -> Result<bool, Error<B::Error>> {
        Ok(self.get_status()?.is_busy())
    }

    /// Read and clear the latched fault flags
    ///
    /// Issues the chip's `GetStatus` command, which clears the latched fault
    /// bits as a side effect of the read. A second call with no new fault in
    /// between therefore reports no faults. Callers needing both live state
    /// and fault history should use [`get_status`](Self::get_status) once and
    /// derive both from the snapshot.
    pub fn get_error(&mut self) -> Result<FaultFlags, Error<B::Error>> {
        self.xfer(opcode::GET_STATUS)?;
        let high = self.xfer(opcode::NOP)?;
        let low = self.xfer(opcode::NOP)?;
        Ok(Status::from_raw(u16::from_be_bytes([high, low])).faults())
    }
}
