//! Simulated plant, broker and LED.
//!
//! `SimPlant` is the shared ground truth: the actuator moves it, the encoder
//! reads it, and tests inspect or perturb it through a cloned handle.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use blinds_traits::{Actuator, ActuatorStatus, AngleSensor, Indicator, Message, MessageBus};
use crossbeam_channel::{Receiver, Sender, TryRecvError};

use crate::error::HwError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Bursts kept for inspection; older ones are dropped.
pub const MOVE_HISTORY: usize = 256;

/// One executed burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveRecord {
    pub delta: i32,
    pub current_ma: u32,
    pub speed_rpm: u32,
}

#[derive(Debug, Default)]
struct PlantState {
    position: i64,
    enabled: bool,
    stalled: bool,
    thermal_warning: bool,
    fail_status: Option<String>,
    fail_move: Option<String>,
    fail_angle: Option<String>,
    moves: VecDeque<MoveRecord>,
    move_count: u64,
    enable_writes: u32,
}

/// Shared simulated mechanics. Cloning yields another handle to the same
/// plant.
#[derive(Debug, Clone, Default)]
pub struct SimPlant {
    state: Arc<Mutex<PlantState>>,
}

impl SimPlant {
    /// Plant resting at `position` device units, driver released.
    pub fn new(position: i64) -> Self {
        Self {
            state: Arc::new(Mutex::new(PlantState {
                position,
                ..PlantState::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PlantState> {
        // A panicking test thread must not wedge the others.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn actuator(&self) -> SimulatedActuator {
        SimulatedActuator {
            plant: self.clone(),
        }
    }

    pub fn encoder(&self, counts_per_rev: u32) -> SimulatedEncoder {
        SimulatedEncoder {
            plant: self.clone(),
            counts_per_rev: i64::from(counts_per_rev.max(1)),
        }
    }

    pub fn position(&self) -> i64 {
        self.lock().position
    }

    /// Move the mechanism without the driver (slip, manual handling).
    pub fn displace(&self, delta: i64) {
        let mut s = self.lock();
        s.position = s.position.saturating_add(delta);
    }

    pub fn enabled(&self) -> bool {
        self.lock().enabled
    }

    pub fn set_stalled(&self, on: bool) {
        self.lock().stalled = on;
    }

    pub fn set_thermal_warning(&self, on: bool) {
        self.lock().thermal_warning = on;
    }

    /// Make the next status read fail with `msg`.
    pub fn fail_next_status(&self, msg: impl Into<String>) {
        self.lock().fail_status = Some(msg.into());
    }

    /// Make the next move fail with `msg`.
    pub fn fail_next_move(&self, msg: impl Into<String>) {
        self.lock().fail_move = Some(msg.into());
    }

    /// Make the next angle read fail with `msg`.
    pub fn fail_next_angle(&self, msg: impl Into<String>) {
        self.lock().fail_angle = Some(msg.into());
    }

    /// The most recent bursts, oldest first, at most `MOVE_HISTORY`.
    pub fn moves(&self) -> Vec<MoveRecord> {
        self.lock().moves.iter().copied().collect()
    }

    pub fn last_move(&self) -> Option<MoveRecord> {
        self.lock().moves.back().copied()
    }

    /// Bursts executed since the plant was created.
    pub fn move_count(&self) -> u64 {
        self.lock().move_count
    }

    /// Number of `set_enabled` calls seen.
    pub fn enable_writes(&self) -> u32 {
        self.lock().enable_writes
    }
}

/// Driver stage acting on a `SimPlant`.
#[derive(Debug, Clone)]
pub struct SimulatedActuator {
    plant: SimPlant,
}

impl SimulatedActuator {
    pub fn plant(&self) -> &SimPlant {
        &self.plant
    }
}

impl Actuator for SimulatedActuator {
    fn status(&mut self) -> Result<ActuatorStatus, BoxError> {
        let mut s = self.plant.lock();
        if let Some(msg) = s.fail_status.take() {
            return Err(Box::new(HwError::Injected(msg)));
        }
        let mut register = 0u32;
        if s.stalled {
            register |= 1 << 24;
        }
        if s.thermal_warning {
            register |= 1 << 26;
        }
        Ok(ActuatorStatus {
            stalled: s.stalled,
            thermal_warning: s.thermal_warning,
            enabled: s.enabled,
            register,
        })
    }

    fn move_steps(&mut self, delta: i32, current_ma: u32, speed_rpm: u32) -> Result<(), BoxError> {
        let mut s = self.plant.lock();
        if let Some(msg) = s.fail_move.take() {
            return Err(Box::new(HwError::Injected(msg)));
        }
        if !s.enabled {
            return Err(Box::new(HwError::DriverFault("move while disabled".into())));
        }
        if s.moves.len() == MOVE_HISTORY {
            s.moves.pop_front();
        }
        s.moves.push_back(MoveRecord {
            delta,
            current_ma,
            speed_rpm,
        });
        s.move_count = s.move_count.saturating_add(1);
        if !s.stalled {
            s.position = s.position.saturating_add(i64::from(delta));
        }
        tracing::trace!(delta, current_ma, speed_rpm, position = s.position, "sim move");
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<(), BoxError> {
        let mut s = self.plant.lock();
        s.enabled = enabled;
        s.enable_writes = s.enable_writes.saturating_add(1);
        Ok(())
    }
}

/// Absolute encoder reading the plant position modulo `counts_per_rev`.
#[derive(Debug, Clone)]
pub struct SimulatedEncoder {
    plant: SimPlant,
    counts_per_rev: i64,
}

impl AngleSensor for SimulatedEncoder {
    fn read_angle(&mut self) -> Result<u16, BoxError> {
        let mut s = self.plant.lock();
        if let Some(msg) = s.fail_angle.take() {
            return Err(Box::new(HwError::Injected(msg)));
        }
        let raw = s.position.rem_euclid(self.counts_per_rev);
        u16::try_from(raw).map_err(|_| Box::new(HwError::I2c("angle out of range".into())) as BoxError)
    }
}

// ── Broker ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Link {
    connected: AtomicBool,
    refuse_connect: AtomicBool,
    fail_publish: AtomicBool,
    connects: AtomicU32,
    client_id: Mutex<Option<String>>,
    subscriptions: Mutex<Vec<String>>,
}

/// In-process broker session. Inbound messages are injected through the
/// paired `BusHandle`; publications come out of it.
#[derive(Debug)]
pub struct LoopbackBus {
    inbox: Receiver<Message>,
    outbox: Sender<Message>,
    link: Arc<Link>,
}

/// Test/driver side of a `LoopbackBus`.
#[derive(Debug, Clone)]
pub struct BusHandle {
    inject: Sender<Message>,
    published: Receiver<Message>,
    link: Arc<Link>,
}

impl LoopbackBus {
    /// A disconnected session and its handle.
    pub fn new() -> (Self, BusHandle) {
        let (inject, inbox) = crossbeam_channel::unbounded();
        let (outbox, published) = crossbeam_channel::unbounded();
        let link = Arc::new(Link::default());
        (
            Self {
                inbox,
                outbox,
                link: Arc::clone(&link),
            },
            BusHandle {
                inject,
                published,
                link,
            },
        )
    }
}

impl MessageBus for LoopbackBus {
    fn is_connected(&self) -> bool {
        self.link.connected.load(Ordering::Acquire)
    }

    fn connect(&mut self, client_id: &str) -> Result<(), BoxError> {
        self.link.connects.fetch_add(1, Ordering::Relaxed);
        if self.link.refuse_connect.load(Ordering::Acquire) {
            return Err(Box::new(HwError::Broker("connection refused".into())));
        }
        if let Ok(mut id) = self.link.client_id.lock() {
            *id = Some(client_id.to_owned());
        }
        if let Ok(mut subs) = self.link.subscriptions.lock() {
            subs.clear();
        }
        self.link.connected.store(true, Ordering::Release);
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), BoxError> {
        if !self.is_connected() {
            return Err(Box::new(HwError::Disconnected));
        }
        if let Ok(mut subs) = self.link.subscriptions.lock() {
            subs.push(topic.to_owned());
        }
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<Message>, BoxError> {
        if !self.is_connected() {
            return Ok(None);
        }
        match self.inbox.try_recv() {
            Ok(m) => Ok(Some(m)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(Box::new(HwError::Disconnected)),
        }
    }

    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), BoxError> {
        if !self.is_connected() {
            return Err(Box::new(HwError::Disconnected));
        }
        if self.link.fail_publish.load(Ordering::Acquire) {
            return Err(Box::new(HwError::Broker("publish rejected".into())));
        }
        self.outbox
            .send(Message::new(topic, payload))
            .map_err(|_| Box::new(HwError::Disconnected) as BoxError)
    }
}

impl BusHandle {
    /// Queue an inbound message.
    pub fn send(&self, topic: &str, payload: &str) {
        // The receiver lives as long as the bus; a send error means it is gone.
        let _ = self.inject.send(Message::new(topic, payload));
    }

    /// Sender for feeding messages from another thread.
    pub fn injector(&self) -> Sender<Message> {
        self.inject.clone()
    }

    /// Drain everything published since the last call.
    pub fn take_published(&self) -> Vec<Message> {
        self.published.try_iter().collect()
    }

    pub fn drop_link(&self) {
        self.link.connected.store(false, Ordering::Release);
    }

    pub fn set_refuse_connect(&self, on: bool) {
        self.link.refuse_connect.store(on, Ordering::Release);
    }

    pub fn set_fail_publish(&self, on: bool) {
        self.link.fail_publish.store(on, Ordering::Release);
    }

    pub fn connects(&self) -> u32 {
        self.link.connects.load(Ordering::Relaxed)
    }

    pub fn client_id(&self) -> Option<String> {
        self.link.client_id.lock().ok().and_then(|g| g.clone())
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.link
            .subscriptions
            .lock()
            .map(|g| g.clone())
            .unwrap_or_default()
    }
}

// ── Indicator ────────────────────────────────────────────────────────────────

/// LED state held in a shared flag.
#[derive(Debug, Clone, Default)]
pub struct SimulatedIndicator {
    on: Arc<AtomicBool>,
}

impl SimulatedIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::Relaxed)
    }
}

impl Indicator for SimulatedIndicator {
    fn set(&mut self, on: bool) -> Result<(), BoxError> {
        self.on.store(on, Ordering::Relaxed);
        tracing::debug!(on, "sim indicator");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actuator_moves_plant_only_when_enabled() {
        let plant = SimPlant::new(10);
        let mut act = plant.actuator();
        assert!(act.move_steps(5, 100, 10).is_err());
        act.set_enabled(true).unwrap();
        act.move_steps(5, 100, 10).unwrap();
        assert_eq!(plant.position(), 15);
        assert_eq!(plant.moves().len(), 1);
    }

    #[test]
    fn stalled_plant_does_not_move() {
        let plant = SimPlant::new(0);
        let mut act = plant.actuator();
        act.set_enabled(true).unwrap();
        plant.set_stalled(true);
        let s = act.status().unwrap();
        assert!(s.stalled);
        assert_eq!(s.register & (1 << 24), 1 << 24);
        act.move_steps(5, 100, 10).unwrap();
        assert_eq!(plant.position(), 0);
    }

    #[test]
    fn move_history_keeps_only_recent_bursts() {
        let plant = SimPlant::new(0);
        let mut act = plant.actuator();
        act.set_enabled(true).unwrap();
        for i in 0..(MOVE_HISTORY as i32 + 44) {
            act.move_steps(i, 100, 10).unwrap();
        }
        let moves = plant.moves();
        assert_eq!(moves.len(), MOVE_HISTORY);
        assert_eq!(moves[0].delta, 44);
        assert_eq!(plant.last_move().unwrap().delta, MOVE_HISTORY as i32 + 43);
        assert_eq!(plant.move_count(), MOVE_HISTORY as u64 + 44);
    }

    #[test]
    fn encoder_wraps_negative_positions() {
        let plant = SimPlant::new(-1);
        let mut enc = plant.encoder(4096);
        assert_eq!(enc.read_angle().unwrap(), 4095);
    }

    #[test]
    fn injected_faults_fire_once() {
        let plant = SimPlant::new(0);
        let mut act = plant.actuator();
        plant.fail_next_status("spi crc");
        assert!(act.status().is_err());
        assert!(act.status().is_ok());
    }

    #[test]
    fn loopback_requires_connection() {
        let (mut bus, handle) = LoopbackBus::new();
        handle.send("a/b", "OPEN");
        assert_eq!(bus.poll().unwrap(), None);
        assert!(bus.publish("x", "1").is_err());
        bus.connect("dev").unwrap();
        assert_eq!(bus.poll().unwrap(), Some(Message::new("a/b", "OPEN")));
        bus.publish("x", "1").unwrap();
        assert_eq!(handle.take_published(), vec![Message::new("x", "1")]);
        assert_eq!(handle.client_id().as_deref(), Some("dev"));
    }
}
