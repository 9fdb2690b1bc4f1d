//! Protection supervisor for the driver stage.
//!
//! - Stall (hard fault): driver disabled at once, all motion held for the
//!   cooldown window.
//! - Thermal/overcurrent pre-warning (soft fault): the planned burst is
//!   replaced by a short reverse move at reduced current, then motion is held
//!   for a settle window.
//!
//! Both hold-offs are timestamps checked each tick; nothing here blocks.

use blinds_traits::ActuatorStatus;

use crate::config::ProtectionCfg;
use crate::profile::{Plan, Profile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionState {
    Normal,
    /// Hard stall seen; no motion until `until_ms`.
    Cooling { until_ms: u64 },
    /// Back-off executed; no motion until `resume_at_ms`.
    Settling { resume_at_ms: u64 },
}

impl ProtectionState {
    pub fn name(&self) -> &'static str {
        match self {
            ProtectionState::Normal => "normal",
            ProtectionState::Cooling { .. } => "cooling",
            ProtectionState::Settling { .. } => "settling",
        }
    }
}

/// Why a planned move was not issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// Stall detected on this tick.
    Stall,
    Cooling { remaining_ms: u64 },
    Settling { remaining_ms: u64 },
}

/// Verdict on a planned move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Proceed(Plan),
    /// Corrective reverse move substituted for the plan.
    Backoff(Plan),
    Suppressed(SuppressReason),
}

#[derive(Debug, Clone)]
pub struct ProtectionSupervisor {
    cfg: ProtectionCfg,
    state: ProtectionState,
    stalls: u32,
    backoffs: u32,
}

impl ProtectionSupervisor {
    pub fn new(cfg: ProtectionCfg) -> Self {
        Self {
            cfg,
            state: ProtectionState::Normal,
            stalls: 0,
            backoffs: 0,
        }
    }

    pub fn state(&self) -> ProtectionState {
        self.state
    }

    /// Stalls seen since start.
    pub fn stalls(&self) -> u32 {
        self.stalls
    }

    /// Back-off moves issued since start.
    pub fn backoffs(&self) -> u32 {
        self.backoffs
    }

    /// Expire elapsed hold-offs; report the one still active, if any.
    ///
    /// Called before telemetry is read: while held, no status read is needed
    /// because no motion will be issued.
    pub fn hold(&mut self, now_ms: u64) -> Option<SuppressReason> {
        match self.state {
            ProtectionState::Normal => None,
            ProtectionState::Cooling { until_ms } => {
                if now_ms >= until_ms {
                    tracing::info!("stall cooldown elapsed; motion re-enabled");
                    self.state = ProtectionState::Normal;
                    None
                } else {
                    Some(SuppressReason::Cooling {
                        remaining_ms: until_ms - now_ms,
                    })
                }
            }
            ProtectionState::Settling { resume_at_ms } => {
                if now_ms >= resume_at_ms {
                    tracing::debug!("back-off settle window elapsed");
                    self.state = ProtectionState::Normal;
                    None
                } else {
                    Some(SuppressReason::Settling {
                        remaining_ms: resume_at_ms - now_ms,
                    })
                }
            }
        }
    }

    /// Judge a planned move against fresh telemetry. Call only when `hold`
    /// returned `None`.
    pub fn assess(&mut self, plan: Plan, status: ActuatorStatus, now_ms: u64) -> Gate {
        if status.stalled {
            self.stalls = self.stalls.saturating_add(1);
            let until_ms = now_ms.saturating_add(self.cfg.cooldown_ms);
            self.state = ProtectionState::Cooling { until_ms };
            tracing::warn!(
                register = status.register,
                cooldown_ms = self.cfg.cooldown_ms,
                "driver stall; disabling and cooling down"
            );
            return Gate::Suppressed(SuppressReason::Stall);
        }

        if status.thermal_warning {
            self.backoffs = self.backoffs.saturating_add(1);
            let backoff = self.backoff_plan(plan);
            self.state = ProtectionState::Settling {
                resume_at_ms: now_ms.saturating_add(self.cfg.settle_ms),
            };
            tracing::warn!(
                planned = plan.delta,
                executed = backoff.delta,
                current_ma = backoff.profile.current_ma,
                settle_ms = self.cfg.settle_ms,
                "thermal pre-warning; backing off"
            );
            return Gate::Backoff(backoff);
        }

        Gate::Proceed(plan)
    }

    /// `hold` then `assess` in one step.
    #[cfg(test)]
    fn gate(&mut self, plan: Plan, status: ActuatorStatus, now_ms: u64) -> Gate {
        match self.hold(now_ms) {
            Some(reason) => Gate::Suppressed(reason),
            None => self.assess(plan, status, now_ms),
        }
    }

    /// Reverse move of `backoff_ratio` times the planned burst, at no more
    /// than the back-off current.
    fn backoff_plan(&self, plan: Plan) -> Plan {
        let magnitude = (f64::from(plan.delta.unsigned_abs()) * f64::from(self.cfg.backoff_ratio))
            .round()
            .clamp(1.0, f64::from(i32::MAX)) as i32;
        let delta = if plan.delta > 0 { -magnitude } else { magnitude };
        Plan {
            delta,
            profile: Profile {
                current_ma: self.cfg.backoff_current_ma.min(plan.profile.current_ma),
                speed_rpm: plan.profile.speed_rpm,
            },
        }
    }
}
