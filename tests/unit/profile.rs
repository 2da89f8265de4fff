//! Unit tests for motion profile application and saturation reporting

use crate::common::{assert_float_eq, create_mock_driver};
use l6470::{motion, MotionProfile, Register, StepMode};

#[test]
fn test_set_acceleration_writes_the_converted_register() {
    let (mut driver, chip) = create_mock_driver();

    // 1000 steps/s² * (250 ns)² * 2^40 = 68.7 -> 69.
    let applied = driver.set_acceleration(1000.0).unwrap();
    assert_eq!(chip.register(Register::Acc), 69);
    assert_eq!(motion::accel_to_reg(applied), 69);
    assert_float_eq(applied, 1004.1, 0.1);
}

#[test]
fn test_acceleration_saturation_reports_the_ceiling() {
    let (mut driver, chip) = create_mock_driver();

    let requested = 1.0e9;
    let applied = driver.set_acceleration(requested).unwrap();

    // The register ceiling is 0xFFE (0xFFF is reserved by the chip); the
    // caller sees the clamp by comparing input and output.
    assert_eq!(chip.register(Register::Acc), 0xFFE);
    assert!(applied < requested);
    assert_float_eq(applied, 59575.5, 1.0);
}

#[test]
fn test_set_max_speed_rounds_not_truncates() {
    let (mut driver, chip) = create_mock_driver();

    // 500 steps/s * 250 ns * 2^18 = 32.768 -> 33, not 32.
    let applied = driver.set_max_speed(500.0).unwrap();
    assert_eq!(chip.register(Register::MaxSpeed), 33);
    assert_float_eq(applied, 503.5, 0.1);
    assert_float_eq(driver.max_speed().unwrap(), applied, 1.0e-3);
}

#[test]
fn test_min_speed_preserves_low_speed_optimization() {
    let (mut driver, chip) = create_mock_driver();

    driver.set_low_speed_optimization(true).unwrap();
    assert_eq!(chip.register(Register::MinSpeed) & 0x1000, 0x1000);

    let applied = driver.set_min_speed(100.0).unwrap();
    let reg = chip.register(Register::MinSpeed);
    assert_eq!(reg & 0x1000, 0x1000, "LSPD_OPT must survive a speed write");
    assert_eq!(reg & 0x0FFF, motion::min_speed_to_reg(100.0));
    assert_float_eq(applied, 100.0, motion::min_speed_from_reg(1));

    driver.set_low_speed_optimization(false).unwrap();
    let reg = chip.register(Register::MinSpeed);
    assert_eq!(reg & 0x1000, 0, "speed field must survive clearing LSPD_OPT");
    assert_eq!(reg & 0x0FFF, motion::min_speed_to_reg(100.0));
}

#[test]
fn test_apply_profile_reports_every_applied_field() {
    let (mut driver, chip) = create_mock_driver();

    let requested = MotionProfile {
        max_speed: 500.0,
        min_speed: 20.0,
        acceleration: 100.0,
        deceleration: 250.0,
        full_step_switching: false,
    };
    let applied = driver.apply_profile(&requested).unwrap();

    assert_eq!(chip.register(Register::MaxSpeed), 33);
    assert_eq!(chip.register(Register::Acc), 7);
    assert_eq!(chip.register(Register::Dec), 17);
    assert_float_eq(applied.max_speed, 503.5, 0.1);
    assert_float_eq(applied.min_speed, 20.0, motion::min_speed_from_reg(1));
    assert_float_eq(applied.acceleration, 101.9, 0.1);
    assert_float_eq(applied.deceleration, 247.4, 0.1);
    assert_eq!(driver.profile(), applied);

    // Full-step switching disabled: FS_SPD pinned to its ceiling.
    assert_eq!(chip.register(Register::FsSpd), 0x3FF);
}

#[test]
fn test_apply_profile_keeps_cutoff_when_switching_enabled() {
    let (mut driver, chip) = create_mock_driver();

    driver
        .apply_profile(&MotionProfile {
            full_step_switching: true,
            ..MotionProfile::default()
        })
        .unwrap();

    // Chip default cutoff (~602.7 steps/s) left in place.
    assert_eq!(chip.register(Register::FsSpd), 0x027);

    let applied = driver.set_full_scale_cutoff(300.0).unwrap();
    assert_float_eq(applied, 300.0, motion::max_speed_from_reg(1));
    assert_float_eq(driver.full_scale_cutoff().unwrap(), applied, 1.0e-3);
}

#[test]
fn test_intersect_speed_roundtrip() {
    let (mut driver, chip) = create_mock_driver();

    // Chip default: 0x0408 -> 61.5 steps/s.
    assert_float_eq(driver.intersect_speed().unwrap(), 61.5, 0.1);

    let applied = driver.set_intersect_speed(120.0).unwrap();
    assert_eq!(chip.register(Register::IntSpeed), motion::intersect_speed_to_reg(120.0));
    assert_float_eq(applied, 120.0, motion::intersect_speed_from_reg(1));
}

#[test]
fn test_current_thresholds() {
    let (mut driver, chip) = create_mock_driver();

    let applied = driver.set_overcurrent_threshold_ma(3000.0).unwrap();
    assert_eq!(chip.register(Register::OcdTh), 7);
    assert_float_eq(applied, 3000.0, 0.01);

    let applied = driver.set_stall_threshold_ma(1000.0).unwrap();
    assert_eq!(chip.register(Register::StallTh), 31);
    assert_float_eq(applied, 1000.0, 0.01);

    // Saturation reports the ceiling.
    let applied = driver.set_overcurrent_threshold_ma(50_000.0).unwrap();
    assert_eq!(chip.register(Register::OcdTh), 15);
    assert_float_eq(applied, 6000.0, 0.01);
}

#[test]
fn test_init_bemf_writes_every_register() {
    let (mut driver, chip) = create_mock_driver();

    let config = l6470::BemfConfig {
        k_val_hold: 0x10,
        k_val_run: 0x20,
        k_val_acc: 0x30,
        k_val_dec: 0x40,
        intersect_speed: 120.0,
        start_slope: 0x05,
        accel_final_slope: 0x0A,
        decel_final_slope: 0x0B,
    };
    driver.init_bemf(&config).unwrap();

    assert_eq!(chip.register(Register::KvalHold), 0x10);
    assert_eq!(chip.register(Register::KvalRun), 0x20);
    assert_eq!(chip.register(Register::KvalAcc), 0x30);
    assert_eq!(chip.register(Register::KvalDec), 0x40);
    assert_eq!(chip.register(Register::IntSpeed), motion::intersect_speed_to_reg(120.0));
    assert_eq!(chip.register(Register::StSlp), 0x05);
    assert_eq!(chip.register(Register::FnSlpAcc), 0x0A);
    assert_eq!(chip.register(Register::FnSlpDec), 0x0B);
}

#[test]
fn test_getters_read_fresh_values() {
    let (mut driver, chip) = create_mock_driver();

    // Chip defaults, not driver cache.
    assert_float_eq(driver.max_speed().unwrap(), 991.8, 0.1);
    assert_float_eq(driver.acceleration().unwrap(), 2008.2, 0.5);
    assert_float_eq(driver.deceleration().unwrap(), 2008.2, 0.5);

    // A value changed behind the driver's back is seen on the next read.
    chip.set_register(Register::MaxSpeed, 100);
    assert_float_eq(driver.max_speed().unwrap(), motion::max_speed_from_reg(100), 1.0e-3);
}

#[test]
fn test_current_speed_decodes_speed_register() {
    let (mut driver, chip) = create_mock_driver();
    driver.set_step_mode(StepMode::Sixteenth).unwrap();

    chip.set_register(Register::Speed, motion::speed_to_reg(400.0));
    assert_float_eq(driver.current_speed().unwrap(), 400.0, motion::speed_from_reg(1));
}
