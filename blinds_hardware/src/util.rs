use std::time::Duration;

/// Full-scale sense voltages of the TMC2130 current DAC.
const VFS_HIGH: f32 = 0.325;
const VFS_LOW: f32 = 0.180;
/// Internal resistance added to the external sense resistor.
const R_INTERNAL_OHM: f32 = 0.02;

/// Time between STEP pulses for `speed_rpm` with the given motor geometry.
/// Zero speeds are treated as 1 rpm.
pub fn step_interval(speed_rpm: u32, motor_steps: u32, microsteps: u32) -> Duration {
    let per_rev = u64::from(motor_steps.max(1)) * u64::from(microsteps.max(1));
    let steps_per_min = per_rev.saturating_mul(u64::from(speed_rpm.max(1)));
    let nanos = 60_000_000_000u64 / steps_per_min.max(1);
    Duration::from_nanos(nanos.max(1))
}

/// Current-scale register setting for an RMS motor current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentScale {
    /// IRUN / IHOLD value, 0..=31.
    pub cs: u8,
    /// CHOPCONF.vsense: selects the low full-scale voltage.
    pub vsense: bool,
}

/// Compute CS and vsense for `current_ma` RMS with sense resistor `rsense_ohm`.
///
/// The high-range DAC is tried first; when it would leave fewer than 16 usable
/// steps the low range is used for better resolution.
pub fn current_scale(current_ma: u32, rsense_ohm: f32) -> CurrentScale {
    let amps = current_ma as f32 / 1000.0;
    let r = rsense_ohm + R_INTERNAL_OHM;
    let cs_for = |vfs: f32| 32.0 * std::f32::consts::SQRT_2 * amps * r / vfs - 1.0;

    let high = cs_for(VFS_HIGH);
    let (cs, vsense) = if high < 16.0 {
        (cs_for(VFS_LOW), true)
    } else {
        (high, false)
    };
    CurrentScale {
        cs: cs.round().clamp(0.0, 31.0) as u8,
        vsense,
    }
}
