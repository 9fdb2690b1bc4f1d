//! Network glue around a `Controller`.
//!
//! Per tick: reconnect and resubscribe if the session dropped, drain at most
//! one inbound message, run the control pipeline, then publish. Transport
//! failures never stop local control.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use blinds_traits::clock::{Clock, MonotonicClock};
use blinds_traits::{Indicator, Message, MessageBus};

use crate::builder::Controller;
use crate::command::{self, Command, TopicRole};
use crate::error::{ControlError, Result};
use crate::hw_error::map_hw_error;
use crate::status::{CommandEffect, TickOutcome};

/// Topic strings for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMap {
    pub command: String,
    pub set_position: String,
    pub feedback: String,
    pub position: String,
}

impl TopicMap {
    /// Role of an inbound topic, if it is one we subscribe to.
    pub fn role(&self, topic: &str) -> Option<TopicRole> {
        if topic == self.command {
            Some(TopicRole::Command)
        } else if topic == self.set_position {
            Some(TopicRole::SetPosition)
        } else if topic == self.feedback {
            Some(TopicRole::Feedback)
        } else {
            None
        }
    }

    pub fn subscriptions(&self) -> [&str; 3] {
        [&self.command, &self.set_position, &self.feedback]
    }
}

impl From<&blinds_config::Topics> for TopicMap {
    fn from(t: &blinds_config::Topics) -> Self {
        Self {
            command: t.command.clone(),
            set_position: t.set_position.clone(),
            feedback: t.feedback.clone(),
            position: t.position.clone(),
        }
    }
}

/// What one node tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTick {
    /// Command decoded and applied this tick.
    pub command: Option<Command>,
    pub outcome: TickOutcome,
    /// Percentage actually handed to the transport.
    pub published: Option<u8>,
}

/// Totals for a `run` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub commands: u64,
    pub publications: u64,
    pub faults: u64,
}

pub struct Node<B: MessageBus, I: Indicator> {
    controller: Controller,
    bus: B,
    indicator: Option<I>,
    topics: TopicMap,
    client_id: String,
    clock: Arc<dyn Clock + Send + Sync>,
    subscribed: bool,
    link_up: bool,
}

impl<B: MessageBus, I: Indicator> core::fmt::Debug for Node<B, I> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Node")
            .field("controller", &self.controller)
            .field("client_id", &self.client_id)
            .field("subscribed", &self.subscribed)
            .finish()
    }
}

impl<B: MessageBus, I: Indicator> Node<B, I> {
    pub fn new(
        controller: Controller,
        bus: B,
        indicator: Option<I>,
        topics: TopicMap,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            controller,
            bus,
            indicator,
            topics,
            client_id: client_id.into(),
            clock: Arc::new(MonotonicClock),
            subscribed: false,
            link_up: false,
        }
    }

    /// Clock used to pace `run`; defaults to `MonotonicClock`.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Arc::from(clock);
        self
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut Controller {
        &mut self.controller
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// One loop iteration.
    pub fn tick(&mut self) -> NodeTick {
        self.housekeeping();
        let command = self.drain_one();
        let outcome = self.controller.tick();
        let published = outcome.publish.and_then(|p| {
            if !self.bus.is_connected() {
                tracing::debug!(percent = p.percent, "offline; position report deferred");
                return None;
            }
            let payload = p.percent.to_string();
            match self.bus.publish(&self.topics.position, &payload) {
                Ok(()) => {
                    self.controller.confirm_publication(p);
                    Some(p.percent)
                }
                Err(e) => {
                    tracing::debug!(error = %map_hw_error(&*e), "position publish failed; will retry");
                    None
                }
            }
        });
        NodeTick {
            command,
            outcome,
            published,
        }
    }

    /// Tick at `period` until `shutdown` is raised or `max_ticks` ran.
    /// The driver stage is released before returning.
    pub fn run(
        &mut self,
        period: Duration,
        shutdown: &AtomicBool,
        max_ticks: Option<u64>,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        while !shutdown.load(Ordering::Relaxed) {
            if max_ticks.is_some_and(|max| summary.ticks >= max) {
                break;
            }
            let t = self.tick();
            summary.ticks += 1;
            summary.commands += u64::from(t.command.is_some());
            summary.publications += u64::from(t.published.is_some());
            summary.faults += u64::from(matches!(
                t.outcome.status,
                crate::status::TickStatus::Faulted(_)
            ));
            self.clock.sleep(period);
        }
        tracing::info!(
            ticks = summary.ticks,
            commands = summary.commands,
            publications = summary.publications,
            faults = summary.faults,
            "node stopped"
        );
        self.controller.release_driver()?;
        Ok(summary)
    }

    /// Apply one inbound message directly, bypassing the transport.
    pub fn handle_message(&mut self, msg: &Message) -> Option<Command> {
        let Some(role) = self.topics.role(&msg.topic) else {
            tracing::debug!(topic = %msg.topic, "message on unknown topic dropped");
            return None;
        };
        let Some(cmd) = command::decode(role, &msg.payload) else {
            tracing::debug!(topic = %msg.topic, payload = %msg.payload, "malformed payload dropped");
            return None;
        };
        if let CommandEffect::Indicator(on) = self.controller.apply(cmd) {
            self.drive_indicator(on);
        }
        Some(cmd)
    }

    // ── Private ──────────────────────────────────────────────────────────────

    fn housekeeping(&mut self) {
        if self.bus.is_connected() {
            if !self.link_up {
                tracing::info!(client_id = %self.client_id, "broker link up");
                self.link_up = true;
            }
        } else {
            if self.link_up {
                tracing::warn!("broker link lost; control continues locally");
                self.link_up = false;
            }
            self.subscribed = false;
            if let Err(e) = self.bus.connect(&self.client_id) {
                tracing::debug!(error = %map_hw_error(&*e), "reconnect attempt failed");
                return;
            }
        }
        if !self.subscribed && self.bus.is_connected() {
            match self.subscribe_all() {
                Ok(()) => self.subscribed = true,
                Err(e) => tracing::warn!(error = %e, "subscribe failed"),
            }
        }
    }

    fn subscribe_all(&mut self) -> core::result::Result<(), ControlError> {
        for topic in self.topics.subscriptions() {
            self.bus.subscribe(topic).map_err(|e| map_hw_error(&*e))?;
        }
        tracing::info!(
            command = %self.topics.command,
            set_position = %self.topics.set_position,
            feedback = %self.topics.feedback,
            "subscribed"
        );
        Ok(())
    }

    fn drain_one(&mut self) -> Option<Command> {
        match self.bus.poll() {
            Ok(Some(msg)) => self.handle_message(&msg),
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(error = %map_hw_error(&*e), "poll failed");
                None
            }
        }
    }

    fn drive_indicator(&mut self, on: bool) {
        match self.indicator.as_mut() {
            Some(led) => {
                if let Err(e) = led.set(on) {
                    tracing::warn!(error = %map_hw_error(&*e), "indicator write failed");
                }
            }
            None => tracing::debug!(on, "no indicator configured"),
        }
    }
}
