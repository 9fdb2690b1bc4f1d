//! `From` implementations bridging `blinds_config` types to `blinds_core` types.
//!
//! Zone tables are copied as-is; the builder validates them again.

use crate::config::{ControllerCfg, EncoderCfg, MotionCfg, ProtectionCfg, TravelCfg};
use crate::profile::{DescentGate, Profile, Zone, ZoneTable};

// ── TravelCfg ────────────────────────────────────────────────────────────────

impl From<&blinds_config::Travel> for TravelCfg {
    fn from(c: &blinds_config::Travel) -> Self {
        Self {
            top: c.top,
            bottom: c.bottom,
            home: c.home(),
        }
    }
}

// ── MotionCfg ────────────────────────────────────────────────────────────────

impl From<&blinds_config::ZoneRow> for Zone {
    fn from(r: &blinds_config::ZoneRow) -> Self {
        Zone::new(r.threshold, Profile::new(r.current_ma, r.speed_rpm))
    }
}

impl From<&blinds_config::ZoneRow> for DescentGate {
    fn from(r: &blinds_config::ZoneRow) -> Self {
        DescentGate::new(r.threshold, Profile::new(r.current_ma, r.speed_rpm))
    }
}

impl From<&blinds_config::Motion> for MotionCfg {
    fn from(c: &blinds_config::Motion) -> Self {
        Self {
            deadzone: c.deadzone,
            min_burst: c.min_burst(),
            max_burst: c.max_burst,
            zones: ZoneTable::from_parts(
                c.zones.iter().map(Zone::from).collect(),
                c.descent.as_ref().map(DescentGate::from),
            ),
        }
    }
}

// ── ProtectionCfg ────────────────────────────────────────────────────────────

impl From<&blinds_config::Protection> for ProtectionCfg {
    fn from(c: &blinds_config::Protection) -> Self {
        Self {
            cooldown_ms: c.cooldown_ms,
            backoff_ratio: c.backoff_ratio,
            backoff_current_ma: c.backoff_current_ma,
            settle_ms: c.settle_ms,
        }
    }
}

// ── EncoderCfg ───────────────────────────────────────────────────────────────

impl From<&blinds_config::Encoder> for EncoderCfg {
    fn from(c: &blinds_config::Encoder) -> Self {
        Self {
            enabled: c.enabled,
            counts_per_rev: c.counts_per_rev,
        }
    }
}

// ── ControllerCfg ────────────────────────────────────────────────────────────

impl From<&blinds_config::Config> for ControllerCfg {
    fn from(c: &blinds_config::Config) -> Self {
        Self {
            travel: (&c.travel).into(),
            motion: (&c.motion).into(),
            protection: (&c.protection).into(),
            encoder: (&c.encoder).into(),
        }
    }
}
