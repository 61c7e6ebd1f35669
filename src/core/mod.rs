//! Core engine module - orchestrates fusion, scheduling, and publication

mod engine;
mod event_bus;
mod scheduler;

pub use engine::MotionEngine;
pub use event_bus::{Event, EventBus, EventPayload, EventType};
pub use scheduler::{PowerMode, PowerScheduler};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::detection::ActivityLabel;

/// Messages funneled into the engine actor's mailbox.
///
/// Sensor pumps, timers, and probes all run on independent tasks; this
/// mailbox is the single serialization point, so the decision cascade never
/// observes a torn combination of inputs.
#[derive(Debug, Clone)]
pub(crate) enum EngineMsg {
    /// Raw acceleration magnitude from the foreground accelerometer pump.
    Accel { magnitude: f64, at: DateTime<Utc> },
    /// Normalized activity classification.
    Activity { label: ActivityLabel, at: DateTime<Utc> },
    /// Cumulative step counter reading.
    StepCount { count: u64, at: DateTime<Utc> },
    /// Housekeeping tick for grace-window expiry.
    Tick { at: DateTime<Utc> },
    /// Completed background probe.
    Probe(ProbeOutcome),
    /// Power mode transition, for status tracking.
    PowerMode(PowerMode),
}

/// Result of one background probe. Applied only if `generation` still
/// matches the scheduler's current generation when the actor sees it.
#[derive(Debug, Clone)]
pub(crate) struct ProbeOutcome {
    pub generation: u64,
    pub label: Option<ActivityLabel>,
    pub steps_in_window: Option<u64>,
    pub at: DateTime<Utc>,
}

/// Engine-wide status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub running: bool,
    pub power_mode: Option<PowerMode>,
    pub samples_processed: u64,
    pub probes_applied: u64,
    pub probes_discarded: u64,
    pub last_change: Option<DateTime<Utc>>,
}

impl Default for EngineStatus {
    fn default() -> Self {
        Self {
            running: false,
            power_mode: None,
            samples_processed: 0,
            probes_applied: 0,
            probes_discarded: 0,
            last_change: None,
        }
    }
}
