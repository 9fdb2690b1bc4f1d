#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Window-covering position control (hardware-agnostic).
//!
//! All hardware goes through `blinds_traits::Actuator`, `AngleSensor`,
//! `MessageBus` and `Indicator`, so the same core runs against the simulator
//! and the real driver stage.
//!
//! ## Architecture
//!
//! - **Tracking**: encoder unwrap or open-loop step accumulation (`tracker`)
//! - **Profiling**: bounded bursts and zone-based current/speed (`profile`)
//! - **Protection**: stall cooldown and thermal back-off (`protection`)
//! - **Commands**: payload decoding (`command`)
//! - **Reporting**: 0–100 mapping and publish debounce (`publisher`)
//! - **Control**: the per-tick state machine (`ControllerCore`)
//! - **Node**: transport glue and the run loop (`node`)
//!
//! ## Units
//!
//! Positions are `i64` device units: microsteps for open-loop builds, encoder
//! counts when an absolute encoder is fitted.

pub mod builder;
pub mod command;
pub mod config;
pub mod conversions;
pub mod core;
pub mod error;
pub mod hw_error;
pub mod mocks;
pub mod node;
pub mod profile;
pub mod protection;
pub mod publisher;
pub mod status;
pub mod tracker;

pub use builder::{Controller, ControllerBuilder, ControllerG, Missing, Set, build_controller};
pub use command::{Command, TopicRole, decode};
pub use config::{ControllerCfg, EncoderCfg, MotionCfg, ProtectionCfg, TravelCfg};
pub use error::{BuildError, ControlError, Report, Result};
pub use node::{Node, NodeTick, RunSummary, TopicMap};
pub use profile::{DescentGate, MotionProfiler, Plan, Profile, Zone, ZoneTable};
pub use protection::{Gate, ProtectionState, ProtectionSupervisor, SuppressReason};
pub use publisher::{Publication, percent_of, position_of};
pub use status::{CommandEffect, Snapshot, TickOutcome, TickStatus};
pub use tracker::{EncoderUnwrap, PositionTracker};
