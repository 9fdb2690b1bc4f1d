//! Type-state builder for `Controller` and generic `build_controller` constructor.
//!
//! The builder enforces at compile time that an actuator is provided before
//! `build()` is available. `try_build()` is always available for dynamic checks.

use std::marker::PhantomData;
use std::sync::Arc;

use blinds_traits::clock::{Clock, MonotonicClock};
use blinds_traits::{Actuator, ActuatorStatus, AngleSensor};

use crate::command::Command;
use crate::config::*;
use crate::core::ControllerCore;
use crate::error::{BuildError, Result};
use crate::profile::{MotionProfiler, ZoneTable};
use crate::protection::{ProtectionState, ProtectionSupervisor};
use crate::publisher::{PositionPublisher, Publication};
use crate::status::{CommandEffect, Snapshot, TickOutcome};
use crate::tracker::PositionTracker;

// ── Public dynamic-dispatch wrapper ──────────────────────────────────────────

/// Boxed controller over any actuator and angle sensor.
pub struct Controller {
    pub(crate) inner: ControllerCore<Box<dyn Actuator + Send>, Box<dyn AngleSensor + Send>>,
}

impl core::fmt::Debug for Controller {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Controller")
            .field("position", &self.inner.position())
            .field("target", &self.inner.target())
            .field("driver_enabled", &self.inner.driver_enabled())
            .finish()
    }
}

impl Controller {
    /// Start building a Controller.
    pub fn builder() -> ControllerBuilder<Missing> {
        ControllerBuilder::default()
    }

    pub fn position(&self) -> i64 {
        self.inner.position()
    }

    pub fn target(&self) -> i64 {
        self.inner.target()
    }

    pub fn travel(&self) -> &TravelCfg {
        self.inner.travel()
    }

    pub fn driver_enabled(&self) -> bool {
        self.inner.driver_enabled()
    }

    pub fn protection_state(&self) -> ProtectionState {
        self.inner.protection_state()
    }

    pub fn publish_pending(&self) -> bool {
        self.inner.publish_pending()
    }

    /// Boot sequence. Call once before the first tick.
    pub fn begin(&mut self) -> Result<()> {
        self.inner.begin()
    }

    /// One iteration of the control loop.
    pub fn tick(&mut self) -> TickOutcome {
        self.inner.tick()
    }

    pub fn apply(&mut self, command: Command) -> CommandEffect {
        self.inner.apply(command)
    }

    pub fn confirm_publication(&mut self, publication: Publication) {
        self.inner.confirm_publication(publication);
    }

    /// Release the driver stage.
    pub fn release_driver(&mut self) -> Result<()> {
        self.inner.release_driver()
    }

    /// Read driver telemetry without moving.
    pub fn read_status(&mut self) -> Result<ActuatorStatus> {
        self.inner.read_status()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.snapshot()
    }
}

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for `Controller`. All fields are validated on `build()`.
pub struct ControllerBuilder<A> {
    actuator: Option<Box<dyn Actuator + Send>>,
    encoder: Option<Box<dyn AngleSensor + Send>>,
    travel: Option<TravelCfg>,
    motion: Option<MotionCfg>,
    protection: Option<ProtectionCfg>,
    encoder_cfg: Option<EncoderCfg>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    _a: PhantomData<A>,
}

impl Default for ControllerBuilder<Missing> {
    fn default() -> Self {
        Self {
            actuator: None,
            encoder: None,
            travel: None,
            motion: None,
            protection: None,
            encoder_cfg: None,
            clock: None,
            _a: PhantomData,
        }
    }
}

/// Validate configuration and construct a `ControllerCore`.
///
/// Shared by `ControllerBuilder::try_build()` and `build_controller()`.
fn validate_and_build<A: Actuator, E: AngleSensor>(
    actuator: A,
    encoder: Option<E>,
    cfg: ControllerCfg,
    clock: Option<Box<dyn Clock + Send + Sync>>,
) -> Result<ControllerCore<A, E>> {
    // ── Validation ───────────────────────────────────────────────────────────
    let ControllerCfg {
        travel,
        motion,
        protection,
        encoder: encoder_cfg,
    } = &cfg;
    if travel.top <= travel.bottom {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "travel top must be greater than bottom",
        )));
    }
    if !(travel.bottom..=travel.top).contains(&travel.home) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "travel home must lie within [bottom, top]",
        )));
    }
    if motion.deadzone < 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "deadzone must be >= 0",
        )));
    }
    if motion.max_burst <= 0 || motion.min_burst >= 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "bursts must satisfy min_burst < 0 < max_burst",
        )));
    }
    // Re-validate the table in case it was assembled by hand.
    ZoneTable::new(motion.zones.zones().to_vec(), motion.zones.descent())
        .map_err(eyre::Report::new)?;
    if protection.cooldown_ms == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "cooldown_ms must be >= 1",
        )));
    }
    if !(protection.backoff_ratio.is_finite() && protection.backoff_ratio > 0.0) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "backoff_ratio must be finite and > 0",
        )));
    }
    if protection.backoff_current_ma == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "backoff_current_ma must be > 0",
        )));
    }
    if encoder_cfg.enabled && encoder_cfg.counts_per_rev < 4 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "counts_per_rev must be >= 4",
        )));
    }

    // ── Position source ──────────────────────────────────────────────────────
    let (tracker, encoder) = if encoder_cfg.enabled {
        let enc = encoder.ok_or_else(|| eyre::Report::new(BuildError::MissingEncoder))?;
        (PositionTracker::encoder(encoder_cfg.counts_per_rev), Some(enc))
    } else {
        if encoder.is_some() {
            tracing::info!("angle sensor supplied but encoder is disabled; running open-loop");
        }
        (PositionTracker::open_loop(travel.top), None)
    };

    let clock: Arc<dyn Clock + Send + Sync> = match clock {
        Some(b) => Arc::from(b),
        None => Arc::new(MonotonicClock),
    };
    let epoch = clock.now();

    Ok(ControllerCore {
        actuator,
        encoder,
        profiler: MotionProfiler::new(motion),
        protection: ProtectionSupervisor::new(*protection),
        publisher: PositionPublisher::new(true),
        target: travel.top,
        tracker,
        clock,
        epoch,
        // Unknown until the first release; assume energized.
        driver_enabled: true,
        last_status: None,
        last_profile: None,
        cfg,
    })
}

impl<A> ControllerBuilder<A> {
    /// Fallible build available in any type-state; returns detailed error for missing pieces.
    pub fn try_build(self) -> Result<Controller> {
        let actuator = self
            .actuator
            .ok_or_else(|| eyre::Report::new(BuildError::MissingActuator))?;
        let cfg = ControllerCfg {
            travel: self.travel.unwrap_or_default(),
            motion: self.motion.unwrap_or_default(),
            protection: self.protection.unwrap_or_default(),
            encoder: self.encoder_cfg.unwrap_or_default(),
        };
        let inner = validate_and_build(actuator, self.encoder, cfg, self.clock)?;
        Ok(Controller { inner })
    }
}

/// Chainable setters that do not affect type-state.
impl<A> ControllerBuilder<A> {
    pub fn with_encoder(mut self, encoder: impl AngleSensor + Send + 'static) -> Self {
        self.encoder = Some(Box::new(encoder));
        self
    }
    /// Replace all four config sections at once.
    pub fn with_cfg(mut self, cfg: ControllerCfg) -> Self {
        self.travel = Some(cfg.travel);
        self.motion = Some(cfg.motion);
        self.protection = Some(cfg.protection);
        self.encoder_cfg = Some(cfg.encoder);
        self
    }
    pub fn with_travel(mut self, travel: TravelCfg) -> Self {
        self.travel = Some(travel);
        self
    }
    pub fn with_motion(mut self, motion: MotionCfg) -> Self {
        self.motion = Some(motion);
        self
    }
    pub fn with_protection(mut self, protection: ProtectionCfg) -> Self {
        self.protection = Some(protection);
        self
    }
    pub fn with_encoder_cfg(mut self, encoder: EncoderCfg) -> Self {
        self.encoder_cfg = Some(encoder);
        self
    }
    /// Provide a custom clock implementation; defaults to `MonotonicClock` when not provided.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
}

// Setter that advances type-state
impl ControllerBuilder<Missing> {
    pub fn with_actuator(
        self,
        actuator: impl Actuator + Send + 'static,
    ) -> ControllerBuilder<Set> {
        ControllerBuilder {
            actuator: Some(Box::new(actuator)),
            encoder: self.encoder,
            travel: self.travel,
            motion: self.motion,
            protection: self.protection,
            encoder_cfg: self.encoder_cfg,
            clock: self.clock,
            _a: PhantomData,
        }
    }
}

impl ControllerBuilder<Set> {
    /// Validate and build the Controller. Only available once an actuator is set.
    pub fn build(self) -> Result<Controller> {
        self.try_build()
    }
}

/// Generic, statically-dispatched alias using the unified core.
pub type ControllerG<A, E> = ControllerCore<A, E>;

/// Build a generic, statically-dispatched `ControllerG` from concrete parts.
///
/// Delegates to the shared `validate_and_build`.
pub fn build_controller<A, E>(
    actuator: A,
    encoder: Option<E>,
    cfg: ControllerCfg,
    clock: Option<Box<dyn Clock + Send + Sync>>,
) -> Result<ControllerG<A, E>>
where
    A: Actuator + 'static,
    E: AngleSensor + 'static,
{
    validate_and_build(actuator, encoder, cfg, clock)
}
