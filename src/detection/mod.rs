// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/motiongate

//! Detection module - motion state fusion and the decision cascade

mod activity;
mod steps;
mod variance;

pub use activity::{ActivityLabel, RawActivityClass};
pub use steps::StepDebouncer;
pub use variance::VarianceTracker;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::DetectionConfig;

/// Externally observable movement snapshot.
///
/// `is_moving` transitions are the only externally significant events; the
/// remaining fields are informational and refresh on every evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementState {
    /// The debounced boolean the downstream policy consumes.
    pub is_moving: bool,
    /// Latest normalized activity label.
    pub label: ActivityLabel,
    /// Most recent acceleration magnitude in g.
    pub acceleration_magnitude: f64,
    /// Coarse speed estimate in m/s, `None` when the label is `Unknown`.
    pub speed_estimate: Option<f64>,
}

impl Default for MovementState {
    fn default() -> Self {
        Self {
            is_moving: false,
            label: ActivityLabel::Unknown,
            acceleration_magnitude: 0.0,
            speed_estimate: None,
        }
    }
}

/// Edge-triggered `is_moving` change notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementChange {
    /// The new value of the moving flag.
    pub is_moving: bool,
    /// Full snapshot at the moment of the transition.
    pub state: MovementState,
    /// When the transition was observed.
    pub at: DateTime<Utc>,
}

/// Central decision state machine.
///
/// Fuses the latest activity label, the step debouncer's recent-steps flag,
/// and the acceleration variance window into one `is_moving` verdict. The
/// rules form a strict priority cascade evaluated top-down on every input
/// event; the first matching rule wins:
///
/// 1. in-vehicle            → not moving (unconditional override)
/// 2. walking / running     → moving
/// 3. recent step pulses    → moving
/// 4. stationary            → not moving
/// 5. unknown               → variance fallback; holds the previous verdict
///    while the window has too few samples
///
/// Change notifications are edge-triggered: an evaluation that lands on the
/// same verdict as before returns `None`.
pub struct DecisionEngine {
    variance: VarianceTracker,
    steps: StepDebouncer,
    label: ActivityLabel,
    last_magnitude: f64,
    variance_threshold: f64,
    is_moving: bool,
}

impl DecisionEngine {
    /// Create a fresh engine. All input state starts empty; `is_moving`
    /// starts false and holds until the inputs produce a decisive verdict.
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            variance: VarianceTracker::new(config.window_size, config.min_variance_samples),
            steps: StepDebouncer::new(Duration::seconds(config.grace_period_secs as i64)),
            label: ActivityLabel::Unknown,
            last_magnitude: 0.0,
            variance_threshold: config.variance_threshold,
            is_moving: false,
        }
    }

    /// Feed one acceleration magnitude sample.
    pub fn on_acceleration(&mut self, magnitude: f64, at: DateTime<Utc>) -> Option<MovementChange> {
        self.last_magnitude = magnitude;
        self.variance.push(magnitude);
        self.evaluate(at)
    }

    /// Feed a normalized activity classification.
    pub fn on_activity(&mut self, label: ActivityLabel, at: DateTime<Utc>) -> Option<MovementChange> {
        self.label = label;
        self.evaluate(at)
    }

    /// Feed a cumulative step counter reading.
    pub fn on_step_count(&mut self, count: u64, at: DateTime<Utc>) -> Option<MovementChange> {
        self.steps.on_step_count(count, at);
        self.evaluate(at)
    }

    /// Feed a windowed step count from a background probe.
    pub fn on_probe_steps(&mut self, count_in_window: u64, at: DateTime<Utc>) -> Option<MovementChange> {
        self.steps.on_probe_steps(count_in_window, at);
        self.evaluate(at)
    }

    /// Housekeeping tick: expires the step grace window and re-evaluates.
    pub fn tick(&mut self, at: DateTime<Utc>) -> Option<MovementChange> {
        self.steps.tick(at);
        self.evaluate(at)
    }

    /// Current snapshot. Refreshed by every evaluation regardless of whether
    /// the verdict changed.
    pub fn state(&self) -> MovementState {
        MovementState {
            is_moving: self.is_moving,
            label: self.label,
            acceleration_magnitude: self.last_magnitude,
            speed_estimate: self.label.speed_estimate(),
        }
    }

    /// Current verdict.
    pub fn is_moving(&self) -> bool {
        self.is_moving
    }

    fn evaluate(&mut self, at: DateTime<Utc>) -> Option<MovementChange> {
        let verdict = self.decide();
        if verdict == self.is_moving {
            return None;
        }

        self.is_moving = verdict;
        Some(MovementChange {
            is_moving: verdict,
            state: self.state(),
            at,
        })
    }

    /// The priority cascade. Rules are evaluated strictly top-down; once a
    /// rule fires the later ones are unreachable.
    fn decide(&self) -> bool {
        // Rule 1: vehicular movement must never pass as active movement,
        // regardless of step pulses or acceleration.
        if self.label == ActivityLabel::InVehicle {
            return false;
        }

        // Rule 2: a confident on-foot classification is trusted immediately.
        if self.label.is_on_foot() {
            return true;
        }

        // Rule 3: step pulses catch walking before the classifier confirms
        // it, bounded by the grace window.
        if self.steps.has_recent_steps() {
            return true;
        }

        // Rule 4.
        if self.label == ActivityLabel::Stationary {
            return false;
        }

        // Rule 5: unknown label, fall back to acceleration variance. With
        // too few samples the previous verdict holds to avoid flapping on
        // startup.
        match self.variance.variance_and_mean() {
            Some((variance, _)) => variance > self.variance_threshold,
            None => self.is_moving,
        }
    }
}
