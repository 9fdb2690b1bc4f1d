//! Hardware and transport seams for the blinds controller.
//!
//! The control core only talks to the outside world through these traits, so
//! it can be driven by simulated parts in tests and by real drivers on the
//! device.
pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Telemetry flags reported by the motor driver stage.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorStatus {
    /// Driver-reported overload: the motor cannot execute commanded motion.
    pub stalled: bool,
    /// Overcurrent / overtemperature pre-warning, raised before a hard stall.
    pub thermal_warning: bool,
    /// Driver stage enable state.
    pub enabled: bool,
    /// Raw driver status register, for diagnostics only.
    pub register: u32,
}

/// A stepper driver stage that executes bursts of microsteps.
pub trait Actuator {
    /// Fresh telemetry read from the driver.
    fn status(&mut self) -> Result<ActuatorStatus, Box<dyn std::error::Error + Send + Sync>>;

    /// Execute `delta` microsteps (sign = direction) at the given limits.
    fn move_steps(
        &mut self,
        delta: i32,
        current_ma: u32,
        speed_rpm: u32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Energize or release the driver stage.
    fn set_enabled(&mut self, enabled: bool)
    -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Absolute rotary sensor returning a cyclic angle in `[0, counts_per_rev)`.
pub trait AngleSensor {
    fn read_angle(&mut self) -> Result<u16, Box<dyn std::error::Error + Send + Sync>>;
}

/// One inbound publish/subscribe message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: String,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Publish/subscribe session with a broker.
///
/// `poll` must never block: it returns the next queued inbound message, if any.
pub trait MessageBus {
    fn is_connected(&self) -> bool;
    fn connect(&mut self, client_id: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn subscribe(&mut self, topic: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn poll(&mut self) -> Result<Option<Message>, Box<dyn std::error::Error + Send + Sync>>;
    fn publish(
        &mut self,
        topic: &str,
        payload: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Status LED side channel.
pub trait Indicator {
    fn set(&mut self, on: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl<T: Actuator + ?Sized> Actuator for Box<T> {
    fn status(&mut self) -> Result<ActuatorStatus, Box<dyn std::error::Error + Send + Sync>> {
        (**self).status()
    }

    fn move_steps(
        &mut self,
        delta: i32,
        current_ma: u32,
        speed_rpm: u32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).move_steps(delta, current_ma, speed_rpm)
    }

    fn set_enabled(
        &mut self,
        enabled: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).set_enabled(enabled)
    }
}

impl<T: AngleSensor + ?Sized> AngleSensor for Box<T> {
    fn read_angle(&mut self) -> Result<u16, Box<dyn std::error::Error + Send + Sync>> {
        (**self).read_angle()
    }
}

impl<T: MessageBus + ?Sized> MessageBus for Box<T> {
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
    fn connect(&mut self, client_id: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).connect(client_id)
    }
    fn subscribe(&mut self, topic: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).subscribe(topic)
    }
    fn poll(&mut self) -> Result<Option<Message>, Box<dyn std::error::Error + Send + Sync>> {
        (**self).poll()
    }
    fn publish(
        &mut self,
        topic: &str,
        payload: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).publish(topic, payload)
    }
}

impl<T: Indicator + ?Sized> Indicator for Box<T> {
    fn set(&mut self, on: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).set(on)
    }
}
