//! Motion profiler: burst sizing and zone-based (current, speed) selection.
//!
//! Each tick the profiler turns `target - position` into a bounded burst of
//! microsteps. Bursts are clamped to `[min_burst, max_burst]` so a single tick
//! never commands more than a fixed amount of motion, which bounds both the
//! current transient and the loop latency.

use crate::config::MotionCfg;
use crate::error::BuildError;

/// A (current limit, speed limit) pair commanded to the actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Profile {
    pub current_ma: u32,
    pub speed_rpm: u32,
}

impl Profile {
    pub const fn new(current_ma: u32, speed_rpm: u32) -> Self {
        Self {
            current_ma,
            speed_rpm,
        }
    }
}

/// A contiguous position range starting at `threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zone {
    pub threshold: i64,
    pub profile: Profile,
}

impl Zone {
    pub const fn new(threshold: i64, profile: Profile) -> Self {
        Self { threshold, profile }
    }
}

/// Target-gated override in front of the zone lookup.
///
/// The zones only apply while the target lies strictly above `threshold` and
/// the position is strictly off it. Any other pair (heading to or below the
/// threshold, or sitting exactly on it) gets `profile`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescentGate {
    pub threshold: i64,
    pub profile: Profile,
}

impl DescentGate {
    pub const fn new(threshold: i64, profile: Profile) -> Self {
        Self { threshold, profile }
    }

    /// Whether the pair is handed on to the zone lookup.
    #[inline]
    pub fn admits(&self, position: i64, target: i64) -> bool {
        target > self.threshold && position != self.threshold
    }
}

/// Ordered zone table.
///
/// Thresholds are strictly ascending. Zone `i` covers
/// `[zones[i].threshold, zones[i + 1].threshold)`; the first zone also covers
/// everything below its threshold and the last everything above, so the table
/// partitions the whole coordinate line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneTable {
    zones: Vec<Zone>,
    descent: Option<DescentGate>,
}

impl ZoneTable {
    /// Build a validated table.
    pub fn new(zones: Vec<Zone>, descent: Option<DescentGate>) -> Result<Self, BuildError> {
        if zones.is_empty() {
            return Err(BuildError::InvalidConfig("zone table must not be empty"));
        }
        if zones.windows(2).any(|w| w[1].threshold <= w[0].threshold) {
            return Err(BuildError::InvalidConfig(
                "zone thresholds must be strictly ascending",
            ));
        }
        let profiles = zones.iter().map(|z| z.profile).chain(descent.map(|g| g.profile));
        for p in profiles {
            if p.current_ma == 0 || p.speed_rpm == 0 {
                return Err(BuildError::InvalidConfig(
                    "zone current and speed must be > 0",
                ));
            }
        }
        Ok(Self { zones, descent })
    }

    pub(crate) fn from_parts(zones: Vec<Zone>, descent: Option<DescentGate>) -> Self {
        Self { zones, descent }
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn descent(&self) -> Option<DescentGate> {
        self.descent
    }

    /// Index of the zone containing `position`. The table holds a handful of
    /// entries, so a linear scan is used.
    pub fn zone_index(&self, position: i64) -> usize {
        let mut idx = 0;
        for (i, z) in self.zones.iter().enumerate() {
            if position >= z.threshold {
                idx = i;
            } else {
                break;
            }
        }
        idx
    }

    /// Profile for the pair: the descent profile when a gate is configured
    /// and does not admit the pair, otherwise the zone containing `position`.
    pub fn select(&self, position: i64, target: i64) -> Profile {
        if let Some(gate) = self.descent
            && !gate.admits(position, target)
        {
            return gate.profile;
        }
        self.zones[self.zone_index(position)].profile
    }
}

/// Output of one profiler step. `delta == 0` means settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    pub delta: i32,
    pub profile: Profile,
}

impl Plan {
    #[inline]
    pub fn is_settled(&self) -> bool {
        self.delta == 0
    }
}

#[derive(Debug, Clone)]
pub struct MotionProfiler {
    deadzone: i64,
    min_burst: i32,
    max_burst: i32,
    zones: ZoneTable,
}

impl MotionProfiler {
    pub fn new(cfg: &MotionCfg) -> Self {
        Self {
            deadzone: cfg.deadzone,
            min_burst: cfg.min_burst,
            max_burst: cfg.max_burst,
            zones: cfg.zones.clone(),
        }
    }

    pub fn zones(&self) -> &ZoneTable {
        &self.zones
    }

    pub fn deadzone(&self) -> i64 {
        self.deadzone
    }

    /// Compute this tick's burst toward `target`.
    pub fn step(&self, target: i64, position: i64) -> Plan {
        let raw = target.saturating_sub(position);
        let delta = if raw.unsigned_abs() < self.deadzone.unsigned_abs() {
            0
        } else {
            // Bounds are i32, so the clamped value always fits.
            raw.clamp(i64::from(self.min_burst), i64::from(self.max_burst)) as i32
        };
        let profile = self.zones.select(position, target);
        tracing::trace!(
            target,
            position,
            raw,
            delta,
            current_ma = profile.current_ma,
            speed_rpm = profile.speed_rpm,
            "profiler step"
        );
        Plan { delta, profile }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ZoneTable {
        ZoneTable::new(
            vec![
                Zone::new(0, Profile::new(1500, 30)),
                Zone::new(100, Profile::new(1000, 60)),
                Zone::new(200, Profile::new(700, 90)),
            ],
            None,
        )
        .unwrap()
    }

    #[test]
    fn zone_index_covers_whole_line() {
        let t = table();
        assert_eq!(t.zone_index(-1_000_000), 0);
        assert_eq!(t.zone_index(0), 0);
        assert_eq!(t.zone_index(99), 0);
        assert_eq!(t.zone_index(100), 1);
        assert_eq!(t.zone_index(199), 1);
        assert_eq!(t.zone_index(200), 2);
        assert_eq!(t.zone_index(i64::MAX), 2);
    }

    fn gated() -> ZoneTable {
        ZoneTable::new(
            vec![
                Zone::new(-179_000, Profile::new(1500, 30)),
                Zone::new(-80_000, Profile::new(1250, 30)),
            ],
            Some(DescentGate::new(-80_000, Profile::new(800, 90))),
        )
        .unwrap()
    }

    #[test]
    fn raising_across_the_gate_uses_the_starting_zone() {
        let t = gated();
        assert_eq!(t.select(-143_060, -20_000), Profile::new(1500, 30));
        assert_eq!(t.select(-80_001, -79_999), Profile::new(1500, 30));
        // Below the first threshold still falls in the first zone.
        assert_eq!(t.select(-200_000, 700), Profile::new(1500, 30));
    }

    #[test]
    fn travel_above_the_gate_uses_the_upper_zone() {
        let t = gated();
        // Lowering while both ends stay above the gate.
        assert_eq!(t.select(-17_270, -53_210), Profile::new(1250, 30));
        assert_eq!(t.select(-53_210, 700), Profile::new(1250, 30));
    }

    #[test]
    fn target_at_or_below_the_gate_uses_descent() {
        let t = gated();
        assert_eq!(t.select(-143_060, -107_120), Profile::new(800, 90));
        assert_eq!(t.select(700, -179_000), Profile::new(800, 90));
        assert_eq!(t.select(-20_000, -80_000), Profile::new(800, 90));
    }

    #[test]
    fn position_on_the_gate_uses_descent() {
        let t = gated();
        assert_eq!(t.select(-80_000, 700), Profile::new(800, 90));
        assert_eq!(t.select(-80_000, -179_000), Profile::new(800, 90));
    }

    #[test]
    fn without_a_gate_selection_follows_position_only() {
        let t = table();
        assert_eq!(t.select(50, 10), Profile::new(1500, 30));
        assert_eq!(t.select(150, 10), Profile::new(1000, 60));
        assert_eq!(t.select(250, 1_000), Profile::new(700, 90));
    }

    #[test]
    fn rejects_bad_tables() {
        assert!(ZoneTable::new(vec![], None).is_err());
        let dup = vec![
            Zone::new(5, Profile::new(1, 1)),
            Zone::new(5, Profile::new(1, 1)),
        ];
        assert!(ZoneTable::new(dup, None).is_err());
        let zero = vec![Zone::new(5, Profile::new(0, 1))];
        assert!(ZoneTable::new(zero, None).is_err());
        let bad_descent = vec![Zone::new(5, Profile::new(1, 1))];
        let gate = DescentGate::new(5, Profile::new(1, 0));
        assert!(ZoneTable::new(bad_descent, Some(gate)).is_err());
    }

    #[test]
    fn deadzone_boundary_is_exclusive() {
        let p = MotionProfiler::new(&MotionCfg {
            deadzone: 600,
            min_burst: -32,
            max_burst: 32,
            zones: table(),
        });
        assert_eq!(p.step(1000, 401).delta, 0);
        assert_eq!(p.step(1000, 400).delta, 32);
        assert_eq!(p.step(400, 1000).delta, -32);
    }

    #[test]
    fn zero_deadzone_still_settles_on_exact_match() {
        let p = MotionProfiler::new(&MotionCfg {
            deadzone: 0,
            min_burst: -10,
            max_burst: 10,
            zones: table(),
        });
        assert!(p.step(42, 42).is_settled());
        assert_eq!(p.step(45, 42).delta, 3);
        assert_eq!(p.step(40, 42).delta, -2);
    }
}
