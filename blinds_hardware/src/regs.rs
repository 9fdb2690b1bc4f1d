//! Register layouts for the TMC2130 driver and the AS5600 encoder.
//!
//! Pure bit twiddling, usable (and tested) without the `hardware` feature.

use blinds_traits::ActuatorStatus;

use crate::util::CurrentScale;

pub mod tmc2130 {
    pub const GCONF: u8 = 0x00;
    pub const GSTAT: u8 = 0x01;
    pub const IHOLD_IRUN: u8 = 0x10;
    pub const TPOWERDOWN: u8 = 0x11;
    pub const TCOOLTHRS: u8 = 0x14;
    pub const CHOPCONF: u8 = 0x6C;
    pub const COOLCONF: u8 = 0x6D;
    pub const DRV_STATUS: u8 = 0x6F;

    /// Address bit marking a write datagram.
    pub const WRITE: u8 = 0x80;

    /// GCONF.en_pwm_mode (stealthChop).
    pub const EN_PWM_MODE: u32 = 1 << 2;
}

pub mod as5600 {
    pub const ADDRESS: u16 = 0x36;
    pub const STATUS: u8 = 0x0B;
    pub const RAW_ANGLE: u8 = 0x0C;
    pub const COUNTS_PER_REV: u32 = 4096;
}

/// Decoded DRV_STATUS register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrvStatus {
    pub raw: u32,
    pub sg_result: u16,
    pub stallguard: bool,
    pub overtemp: bool,
    pub overtemp_prewarn: bool,
    pub short_a: bool,
    pub short_b: bool,
    pub open_a: bool,
    pub open_b: bool,
    pub standstill: bool,
}

impl DrvStatus {
    pub fn from_register(raw: u32) -> Self {
        let bit = |n: u32| raw & (1 << n) != 0;
        Self {
            raw,
            sg_result: (raw & 0x3FF) as u16,
            stallguard: bit(24),
            overtemp: bit(25),
            overtemp_prewarn: bit(26),
            short_a: bit(27),
            short_b: bit(28),
            open_a: bit(29),
            open_b: bit(30),
            standstill: bit(31),
        }
    }

    /// Hard fault: the motor is not following commands or the stage shut
    /// itself down.
    pub fn is_hard_fault(&self) -> bool {
        self.stallguard || self.overtemp || self.short_a || self.short_b
    }

    /// Map onto the actuator telemetry seen by the controller.
    pub fn to_actuator_status(self, enabled: bool) -> ActuatorStatus {
        ActuatorStatus {
            stalled: self.is_hard_fault(),
            thermal_warning: self.overtemp_prewarn,
            enabled,
            register: self.raw,
        }
    }
}

/// IHOLD_IRUN value: hold current zero, run current `cs`, hold delay `delay`.
pub fn ihold_irun(run: CurrentScale, hold_delay: u8) -> u32 {
    (u32::from(hold_delay & 0x0F) << 16) | (u32::from(run.cs & 0x1F) << 8)
}

/// MRES field for a power-of-two microstep count (256 → 0, 1 → 8).
pub fn mres(microsteps: u32) -> u32 {
    let ms = microsteps.clamp(1, 256).next_power_of_two().min(256);
    8 - ms.trailing_zeros()
}

/// CHOPCONF with spreadCycle defaults (toff 4, hstrt 4, hend 1, tbl 2).
pub fn chopconf(microsteps: u32, vsense: bool) -> u32 {
    let mut v = 4 | (4 << 4) | (1 << 7) | (2 << 15);
    if vsense {
        v |= 1 << 17;
    }
    v | (mres(microsteps) << 24)
}

/// COOLCONF with the 7-bit signed stallGuard threshold.
pub fn coolconf(stall_threshold: i8) -> u32 {
    (u32::from(stall_threshold.clamp(-64, 63) as u8) & 0x7F) << 16
}

/// 12-bit angle from the two RAW_ANGLE bytes (big-endian).
pub fn decode_raw_angle(bytes: [u8; 2]) -> u16 {
    u16::from_be_bytes(bytes) & 0x0FFF
}

/// AS5600 STATUS: (magnet detected, too weak, too strong).
pub fn magnet_status(status: u8) -> (bool, bool, bool) {
    (status & 0x20 != 0, status & 0x10 != 0, status & 0x08 != 0)
}
