//! The position-control state machine (`ControllerCore`).
//!
//! One `tick` runs the pipeline: tracker refresh, profiler step, protection
//! gate, then an actuator command or a driver release. Nothing in here
//! blocks; hold-offs are timestamps compared against the injected clock.

use std::sync::Arc;
use std::time::Instant;

use blinds_traits::clock::Clock;
use blinds_traits::{Actuator, ActuatorStatus, AngleSensor};
use eyre::WrapErr;

use crate::command::Command;
use crate::config::{ControllerCfg, TravelCfg};
use crate::error::{ControlError, Result};
use crate::hw_error::map_hw_error;
use crate::profile::{MotionProfiler, Plan, Profile};
use crate::protection::{Gate, ProtectionState, ProtectionSupervisor, SuppressReason};
use crate::publisher::{PositionPublisher, Publication, percent_of, position_of};
use crate::status::{CommandEffect, Snapshot, TickOutcome, TickStatus};
use crate::tracker::PositionTracker;

/// Unified core for both the boxed `Controller` and statically dispatched
/// variants.
pub struct ControllerCore<A: Actuator, E: AngleSensor> {
    pub(crate) actuator: A,
    pub(crate) encoder: Option<E>,
    pub(crate) cfg: ControllerCfg,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) epoch: Instant,

    pub(crate) tracker: PositionTracker,
    pub(crate) profiler: MotionProfiler,
    pub(crate) protection: ProtectionSupervisor,
    pub(crate) publisher: PositionPublisher,
    pub(crate) target: i64,
    pub(crate) driver_enabled: bool,
    pub(crate) last_status: Option<ActuatorStatus>,
    pub(crate) last_profile: Option<Profile>,
}

impl<A: Actuator, E: AngleSensor> core::fmt::Debug for ControllerCore<A, E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ControllerCore")
            .field("position", &self.tracker.position())
            .field("target", &self.target)
            .field("driver_enabled", &self.driver_enabled)
            .field("protection", &self.protection.state())
            .finish()
    }
}

impl<A: Actuator, E: AngleSensor> ControllerCore<A, E> {
    pub fn position(&self) -> i64 {
        self.tracker.position()
    }

    pub fn target(&self) -> i64 {
        self.target
    }

    pub fn travel(&self) -> &TravelCfg {
        &self.cfg.travel
    }

    pub fn cfg(&self) -> &ControllerCfg {
        &self.cfg
    }

    pub fn driver_enabled(&self) -> bool {
        self.driver_enabled
    }

    pub fn protection_state(&self) -> ProtectionState {
        self.protection.state()
    }

    pub fn publish_pending(&self) -> bool {
        self.publisher.is_pending()
    }

    pub fn has_absolute_encoder(&self) -> bool {
        self.tracker.has_absolute_encoder()
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn actuator_mut(&mut self) -> &mut A {
        &mut self.actuator
    }

    /// Boot sequence: release the driver, seed the tracker from the encoder
    /// (if any), aim at fully open and owe a position report.
    pub fn begin(&mut self) -> Result<()> {
        self.epoch = self.clock.now();
        self.protection = ProtectionSupervisor::new(self.cfg.protection);
        self.last_status = None;
        self.last_profile = None;
        self.release_driver()?;
        if let Some(enc) = self.encoder.as_mut() {
            let raw = enc
                .read_angle()
                .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
                .wrap_err("reading encoder")?;
            self.tracker.refresh_from_angle(raw);
        }
        self.aim(self.cfg.travel.top);
        self.publisher = PositionPublisher::new(true);
        tracing::info!(
            position = self.tracker.position(),
            target = self.target,
            encoder = self.tracker.has_absolute_encoder(),
            "controller started"
        );
        Ok(())
    }

    /// One iteration of the control loop.
    pub fn tick(&mut self) -> TickOutcome {
        let now = self.now_ms();

        if let Some(enc) = self.encoder.as_mut() {
            match enc.read_angle() {
                Ok(raw) => {
                    self.tracker.refresh_from_angle(raw);
                }
                Err(e) => return self.fault(map_hw_error(&*e), "encoder read failed"),
            }
        }

        let position = self.tracker.position();
        let plan = self.profiler.step(self.target, position);

        if plan.is_settled() {
            self.release_driver_best_effort("settled");
            let publish = self.publisher.on_settle(self.settled_percent(position));
            return TickOutcome {
                status: TickStatus::Settled,
                publish,
            };
        }

        if let Some(reason) = self.protection.hold(now) {
            return Self::suppressed(reason);
        }

        let status = match self.actuator.status() {
            Ok(s) => s,
            Err(e) => return self.fault(map_hw_error(&*e), "driver status read failed"),
        };
        self.last_status = Some(status);

        match self.protection.assess(plan, status, now) {
            Gate::Proceed(p) => match self.execute(p) {
                Ok(publication) => TickOutcome {
                    status: TickStatus::Moving {
                        delta: p.delta,
                        profile: p.profile,
                    },
                    publish: Some(publication),
                },
                Err(e) => self.fault(e, "move failed"),
            },
            Gate::Backoff(p) => match self.execute(p) {
                Ok(publication) => TickOutcome {
                    status: TickStatus::BackingOff {
                        delta: p.delta,
                        profile: p.profile,
                    },
                    publish: Some(publication),
                },
                Err(e) => self.fault(e, "back-off move failed"),
            },
            Gate::Suppressed(reason) => {
                if reason == SuppressReason::Stall {
                    self.release_driver_best_effort("stall");
                }
                Self::suppressed(reason)
            }
        }
    }

    /// Apply a decoded command. Takes effect regardless of protection state;
    /// motion resumes once protection allows it.
    pub fn apply(&mut self, command: Command) -> CommandEffect {
        let travel = self.cfg.travel;
        match command {
            Command::Open => {
                self.aim(travel.top);
                self.publisher.mark_pending();
            }
            Command::Close => {
                self.aim(travel.bottom);
                self.publisher.mark_pending();
            }
            Command::Stop => {
                // The tracker may read outside the bounds after an encoder boot.
                self.aim(self.tracker.position());
                self.publisher.clear();
            }
            Command::Reset => {
                self.tracker.recalibrate(travel.home);
                self.aim(travel.home);
                self.publisher.mark_pending();
            }
            Command::Led(on) => {
                tracing::info!(on, "indicator command");
                return CommandEffect::Indicator(on);
            }
            Command::SetPosition(pct) => {
                self.aim(position_of(&travel, pct));
                self.publisher.mark_pending();
            }
            Command::Feedback(pct) => {
                let position = position_of(&travel, pct);
                self.tracker.recalibrate(position);
                self.aim(position);
                self.publisher.mark_pending();
            }
        }
        tracing::info!(
            %command,
            target = self.target,
            position = self.tracker.position(),
            "command applied"
        );
        CommandEffect::Motion
    }

    /// The transport accepted `publication`.
    pub fn confirm_publication(&mut self, publication: Publication) {
        self.publisher.confirm(publication);
    }

    /// Release the driver stage.
    pub fn release_driver(&mut self) -> Result<()> {
        self.actuator
            .set_enabled(false)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("disabling driver")?;
        if self.driver_enabled {
            tracing::debug!("driver released");
        }
        self.driver_enabled = false;
        Ok(())
    }

    /// Read driver telemetry without moving.
    pub fn read_status(&mut self) -> Result<ActuatorStatus> {
        let status = self
            .actuator
            .status()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("reading driver status")?;
        self.last_status = Some(status);
        Ok(status)
    }

    pub fn snapshot(&self) -> Snapshot {
        let travel = &self.cfg.travel;
        Snapshot {
            position: self.tracker.position(),
            target: self.target,
            percent: percent_of(travel, self.tracker.position()),
            target_percent: percent_of(travel, self.target),
            driver_enabled: self.driver_enabled,
            actuator: self.last_status,
            last_profile: self.last_profile,
            protection: self.protection.state(),
            publish_pending: self.publisher.is_pending(),
            reports: self.publisher.published(),
            has_absolute_encoder: self.tracker.has_absolute_encoder(),
            revolutions: self.tracker.unwrap_state().map(|u| u.revolutions()),
            stalls: self.protection.stalls(),
            backoffs: self.protection.backoffs(),
            uptime_ms: self.now_ms(),
        }
    }

    // ── Private ──────────────────────────────────────────────────────────────

    #[inline]
    fn now_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }

    /// Every write to the target goes through here; it never leaves
    /// `[bottom, top]`.
    #[inline]
    fn aim(&mut self, target: i64) {
        self.target = self.cfg.travel.clamp(target);
    }

    /// Value of a settle report: the measured position, except that a blind
    /// sent to the bottom reports fully closed even if it stopped short
    /// within the deadzone.
    fn settled_percent(&self, position: i64) -> u8 {
        let travel = &self.cfg.travel;
        if self.target == travel.bottom {
            percent_of(travel, travel.bottom)
        } else {
            percent_of(travel, position)
        }
    }

    fn execute(&mut self, plan: Plan) -> core::result::Result<Publication, ControlError> {
        if !self.driver_enabled {
            self.actuator
                .set_enabled(true)
                .map_err(|e| map_hw_error(&*e))?;
            self.driver_enabled = true;
        }
        self.actuator
            .move_steps(plan.delta, plan.profile.current_ma, plan.profile.speed_rpm)
            .map_err(|e| map_hw_error(&*e))?;
        self.tracker.record_executed(plan.delta);
        self.last_profile = Some(plan.profile);
        let percent = percent_of(&self.cfg.travel, self.tracker.position());
        Ok(self.publisher.on_move(percent))
    }

    fn release_driver_best_effort(&mut self, why: &'static str) {
        if !self.driver_enabled {
            return;
        }
        if let Err(e) = self.release_driver() {
            tracing::warn!(error = %e, why, "driver release failed");
        }
    }

    fn suppressed(reason: SuppressReason) -> TickOutcome {
        TickOutcome {
            status: TickStatus::Suppressed(reason),
            publish: None,
        }
    }

    fn fault(&mut self, err: ControlError, what: &'static str) -> TickOutcome {
        tracing::warn!(error = %err, "{what}");
        // Force the release attempt even if we believe the stage is off.
        self.driver_enabled = true;
        self.release_driver_best_effort("fault");
        TickOutcome {
            status: TickStatus::Faulted(err),
            publish: None,
        }
    }
}
