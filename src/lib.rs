// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/motiongate

//! MotionGate - Motion State Inference Engine
//!
//! Infers in real time whether a person is actively moving (walking or
//! running) versus stationary or riding in a vehicle, from noisy and
//! intermittent sensor signals, and exposes a single debounced boolean to a
//! downstream app-gating policy.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      MotionGate Engine                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌───────────┐  │
//! │  │ Accel    │   │ Activity │   │ Step     │   │ Location  │  │
//! │  │ Source   │   │ Source   │   │ Source   │   │ Wake      │  │
//! │  └────┬─────┘   └────┬─────┘   └────┬─────┘   └────┬──────┘  │
//! │       └──────────────┴───────┬──────┴──────────────┘         │
//! │                     ┌────────▼─────────┐                     │
//! │                     │  Power Scheduler │ fg/bg, wake probes  │
//! │                     └────────┬─────────┘                     │
//! │                     ┌────────▼─────────┐                     │
//! │                     │  Engine Mailbox  │ single actor task   │
//! │                     └────────┬─────────┘                     │
//! │       ┌──────────────────────▼───────────────────────┐       │
//! │       │ Decision Engine: variance window + step      │       │
//! │       │ debouncer + label, priority rule cascade     │       │
//! │       └──────────────────────┬───────────────────────┘       │
//! │                     ┌────────▼─────────┐                     │
//! │                     │    Event Bus     │ is_moving edges     │
//! │                     └──────────────────┘                     │
//! └──────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![allow(dead_code)]

pub mod config;
pub mod core;
pub mod detection;
pub mod sensors;

// Re-exports for convenience
pub use config::{Config, DetectionConfig, SchedulerConfig};
pub use crate::core::{
    EngineStatus, Event, EventBus, EventPayload, EventType, MotionEngine, PowerMode,
};
pub use detection::{
    ActivityLabel, DecisionEngine, MovementChange, MovementState, RawActivityClass,
    StepDebouncer, VarianceTracker,
};
pub use sensors::{
    AccelSample, AccelerometerSource, ActivityEvent, ActivitySource, LocationWakeSource,
    Scenario, ScenarioPhase, SensorSimulator, SensorSuite, StepReading, StepSource, WakeEvent,
};

/// MotionGate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// MotionGate name
pub const NAME: &str = "MotionGate";
