//! Per-tick outcome and the diagnostic snapshot.

use core::fmt;

use blinds_traits::ActuatorStatus;

use crate::error::ControlError;
use crate::profile::Profile;
use crate::protection::{ProtectionState, SuppressReason};
use crate::publisher::Publication;

/// What the controller did on one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickStatus {
    /// Within the deadzone; driver released.
    Settled,
    /// A burst toward the target was executed.
    Moving { delta: i32, profile: Profile },
    /// A reverse back-off replaced the planned burst.
    BackingOff { delta: i32, profile: Profile },
    /// Motion was owed but held by protection.
    Suppressed(SuppressReason),
    /// A hardware call failed; the driver has been asked to release.
    Faulted(ControlError),
}

impl TickStatus {
    pub fn is_settled(&self) -> bool {
        matches!(self, TickStatus::Settled)
    }

    /// Steps executed this tick.
    pub fn executed(&self) -> i32 {
        match self {
            TickStatus::Moving { delta, .. } | TickStatus::BackingOff { delta, .. } => *delta,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    pub status: TickStatus,
    /// Value to emit on the position topic, if any.
    pub publish: Option<Publication>,
}

/// Side effect of applying a command that the controller cannot perform
/// itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandEffect {
    /// Target/position state changed (or nothing happened).
    Motion,
    /// Drive the status LED.
    Indicator(bool),
}

/// Read-only diagnostic view of the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub position: i64,
    pub target: i64,
    pub percent: u8,
    pub target_percent: u8,
    pub driver_enabled: bool,
    /// Last status read from the actuator, if any.
    pub actuator: Option<ActuatorStatus>,
    pub last_profile: Option<Profile>,
    pub protection: ProtectionState,
    pub publish_pending: bool,
    /// Position reports the transport accepted.
    pub reports: u64,
    pub has_absolute_encoder: bool,
    pub revolutions: Option<i64>,
    pub stalls: u32,
    pub backoffs: u32,
    pub uptime_ms: u64,
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "position: {} ({}%)", self.position, self.percent)?;
        writeln!(f, "target: {} ({}%)", self.target, self.target_percent)?;
        writeln!(f, "driver enabled: {}", self.driver_enabled)?;
        match self.actuator {
            Some(s) => writeln!(
                f,
                "driver status: stalled={} thermal_warning={} enabled={} register=0x{:08x}",
                s.stalled, s.thermal_warning, s.enabled, s.register
            )?,
            None => writeln!(f, "driver status: not read yet")?,
        }
        match self.last_profile {
            Some(p) => writeln!(
                f,
                "last profile: {} mA, {} rpm",
                p.current_ma, p.speed_rpm
            )?,
            None => writeln!(f, "last profile: none")?,
        }
        writeln!(f, "protection: {}", self.protection.name())?;
        writeln!(f, "stalls: {} backoffs: {}", self.stalls, self.backoffs)?;
        writeln!(
            f,
            "publish pending: {} reports: {}",
            self.publish_pending, self.reports
        )?;
        match self.revolutions {
            Some(r) => writeln!(f, "encoder: absolute, revolutions={r}")?,
            None => writeln!(f, "encoder: none (open-loop)")?,
        }
        write!(f, "uptime: {} ms", self.uptime_ms)
    }
}
