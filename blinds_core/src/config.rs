//! Runtime configuration types for the controller.
//!
//! These are the structs `ControllerCore` is built from. They are separate
//! from the TOML-deserialized config in `blinds_config`; see `conversions`.

use crate::profile::{DescentGate, Profile, Zone, ZoneTable};

/// Travel bounds in device units (microsteps or encoder counts).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TravelCfg {
    /// Fully open.
    pub top: i64,
    /// Fully closed.
    pub bottom: i64,
    /// Where RESET re-homes to.
    pub home: i64,
}

impl TravelCfg {
    #[inline]
    pub fn clamp(&self, position: i64) -> i64 {
        position.clamp(self.bottom, self.top)
    }

    #[inline]
    pub fn span(&self) -> i64 {
        self.top - self.bottom
    }
}

impl Default for TravelCfg {
    fn default() -> Self {
        Self {
            top: 700,
            bottom: -179_000,
            home: 700,
        }
    }
}

/// Motion profiler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotionCfg {
    /// Settled when `|target - position| < deadzone`.
    pub deadzone: i64,
    /// Largest reverse burst per tick (negative).
    pub min_burst: i32,
    /// Largest forward burst per tick.
    pub max_burst: i32,
    pub zones: ZoneTable,
}

impl Default for MotionCfg {
    fn default() -> Self {
        Self {
            deadzone: 600,
            min_burst: -32,
            max_burst: 32,
            zones: ZoneTable::from_parts(
                vec![
                    Zone::new(-179_000, Profile::new(1500, 30)),
                    Zone::new(-80_000, Profile::new(1250, 30)),
                ],
                Some(DescentGate::new(-80_000, Profile::new(800, 90))),
            ),
        }
    }
}

/// Protection supervisor configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProtectionCfg {
    /// Hold-off after a stall.
    pub cooldown_ms: u64,
    /// Reverse back-off magnitude relative to the planned burst.
    pub backoff_ratio: f32,
    /// Current limit for the back-off move.
    pub backoff_current_ma: u32,
    /// Settle window after a back-off.
    pub settle_ms: u64,
}

impl Default for ProtectionCfg {
    fn default() -> Self {
        Self {
            cooldown_ms: 5000,
            backoff_ratio: 1.5,
            backoff_current_ma: 400,
            settle_ms: 3000,
        }
    }
}

/// Position feedback capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderCfg {
    pub enabled: bool,
    pub counts_per_rev: u32,
}

impl Default for EncoderCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            counts_per_rev: 4096,
        }
    }
}

/// Everything the controller needs besides its hardware.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerCfg {
    pub travel: TravelCfg,
    pub motion: MotionCfg,
    pub protection: ProtectionCfg,
    pub encoder: EncoderCfg,
}
