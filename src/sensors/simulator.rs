// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/motiongate

//! Sensor simulator for demo/testing
//!
//! One `SensorSimulator` implements all four source traits over a shared
//! scripted scenario, so the demo binary and the engine tests can run the
//! full pipeline without device hardware.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::prelude::*;
use rand_distr::Normal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::{AccelSample, ActivityEvent, StepReading, WakeEvent};
use super::{AccelerometerSource, ActivitySource, LocationWakeSource, StepSource};
use crate::detection::ActivityLabel;

/// One segment of a scripted scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioPhase {
    /// Device at rest on a table or in a pocket.
    Still,
    /// Walking pace, ~1.8 steps/s.
    Walking,
    /// Running pace, ~2.8 steps/s.
    Running,
    /// Riding in a vehicle: engine vibration but no steps.
    Driving,
}

impl ScenarioPhase {
    /// The label the platform classifier would report for this phase.
    pub fn label(&self) -> ActivityLabel {
        match self {
            ScenarioPhase::Still => ActivityLabel::Stationary,
            ScenarioPhase::Walking => ActivityLabel::Walking,
            ScenarioPhase::Running => ActivityLabel::Running,
            ScenarioPhase::Driving => ActivityLabel::InVehicle,
        }
    }

    /// Step cadence in steps per second.
    pub fn cadence_hz(&self) -> f64 {
        match self {
            ScenarioPhase::Still => 0.0,
            ScenarioPhase::Walking => 1.8,
            ScenarioPhase::Running => 2.8,
            ScenarioPhase::Driving => 0.0,
        }
    }

    /// Standard deviation of the acceleration magnitude around 1 g.
    fn accel_sigma(&self) -> f64 {
        match self {
            ScenarioPhase::Still => 0.005,
            ScenarioPhase::Walking => 0.25,
            ScenarioPhase::Running => 0.5,
            ScenarioPhase::Driving => 0.06,
        }
    }

    /// Whether the device is geographically moving during this phase.
    fn geographically_moving(&self) -> bool {
        !matches!(self, ScenarioPhase::Still)
    }
}

/// A cyclic schedule of phases with durations.
#[derive(Debug, Clone)]
pub struct Scenario {
    phases: Vec<(ScenarioPhase, Duration)>,
    total: Duration,
}

impl Scenario {
    /// Build a scenario from phase segments. Empty input falls back to a
    /// permanently still scenario.
    pub fn new(phases: Vec<(ScenarioPhase, Duration)>) -> Self {
        let phases = if phases.is_empty() {
            vec![(ScenarioPhase::Still, Duration::from_secs(60))]
        } else {
            phases
        };
        let total = phases.iter().map(|(_, d)| *d).sum();
        Self { phases, total }
    }

    /// Default demo scenario: a short commute. Still, walk to the bus, ride,
    /// walk to the office, sit down. Repeats cyclically.
    pub fn commute() -> Self {
        Self::new(vec![
            (ScenarioPhase::Still, Duration::from_secs(15)),
            (ScenarioPhase::Walking, Duration::from_secs(30)),
            (ScenarioPhase::Driving, Duration::from_secs(45)),
            (ScenarioPhase::Walking, Duration::from_secs(20)),
            (ScenarioPhase::Still, Duration::from_secs(20)),
        ])
    }

    /// Phase active at `elapsed` since scenario start (cyclic).
    pub fn phase_at(&self, elapsed: Duration) -> ScenarioPhase {
        let mut t = Duration::from_nanos(
            (elapsed.as_nanos() % self.total.as_nanos().max(1)) as u64,
        );
        for (phase, d) in &self.phases {
            if t < *d {
                return *phase;
            }
            t -= *d;
        }
        self.phases[self.phases.len() - 1].0
    }

    /// Cumulative steps taken from scenario start until `elapsed`,
    /// integrating each phase's cadence (cyclic).
    pub fn steps_until(&self, elapsed: Duration) -> u64 {
        let cycles = (elapsed.as_nanos() / self.total.as_nanos().max(1)) as u64;
        let mut remainder = Duration::from_nanos(
            (elapsed.as_nanos() % self.total.as_nanos().max(1)) as u64,
        );

        let per_cycle: f64 = self
            .phases
            .iter()
            .map(|(p, d)| p.cadence_hz() * d.as_secs_f64())
            .sum();

        let mut partial = 0.0;
        for (phase, d) in &self.phases {
            let span = remainder.min(*d);
            partial += phase.cadence_hz() * span.as_secs_f64();
            remainder = remainder.saturating_sub(*d);
            if remainder.is_zero() {
                break;
            }
        }

        (cycles as f64 * per_cycle + partial) as u64
    }
}

struct SimTasks {
    accel: Option<JoinHandle<()>>,
    activity: Option<JoinHandle<()>>,
    steps: Option<JoinHandle<()>>,
    wake: Option<JoinHandle<()>>,
}

/// Simulates all four sensor sources from one scripted scenario.
pub struct SensorSimulator {
    scenario: Arc<Scenario>,
    started: Instant,
    epoch: DateTime<Utc>,
    step_base: u64,
    accel_tx: broadcast::Sender<AccelSample>,
    activity_tx: broadcast::Sender<ActivityEvent>,
    step_tx: broadcast::Sender<StepReading>,
    wake_tx: broadcast::Sender<WakeEvent>,
    tasks: Mutex<SimTasks>,
}

impl SensorSimulator {
    /// Create a simulator over the given scenario. The counter base mimics a
    /// cumulative platform pedometer that has been counting since boot.
    pub fn new(scenario: Scenario) -> Self {
        let (accel_tx, _) = broadcast::channel(256);
        let (activity_tx, _) = broadcast::channel(64);
        let (step_tx, _) = broadcast::channel(64);
        let (wake_tx, _) = broadcast::channel(16);

        Self {
            scenario: Arc::new(scenario),
            started: Instant::now(),
            epoch: Utc::now(),
            step_base: 12_847,
            accel_tx,
            activity_tx,
            step_tx,
            wake_tx,
            tasks: Mutex::new(SimTasks {
                accel: None,
                activity: None,
                steps: None,
                wake: None,
            }),
        }
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn elapsed_at(&self, t: DateTime<Utc>) -> Duration {
        (t - self.epoch).to_std().unwrap_or_default()
    }

    fn current_phase(&self) -> ScenarioPhase {
        self.scenario.phase_at(self.elapsed())
    }

    fn step_count_at(&self, t: DateTime<Utc>) -> u64 {
        self.step_base + self.scenario.steps_until(self.elapsed_at(t))
    }
}

#[async_trait]
impl AccelerometerSource for SensorSimulator {
    async fn start_sampling(&self, hz: f64) -> Result<()> {
        let mut tasks = self.tasks.lock();
        if tasks.accel.is_some() {
            return Ok(());
        }

        let tx = self.accel_tx.clone();
        let scenario = Arc::clone(&self.scenario);
        let started = self.started;
        let period = Duration::from_secs_f64(1.0 / hz.max(0.1));

        tasks.accel = Some(tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let phase = scenario.phase_at(started.elapsed());
                let sigma = phase.accel_sigma();
                let jitter = Normal::new(0.0, sigma.max(1e-6)).unwrap();

                let sample = AccelSample {
                    x: rng.sample(jitter) * 0.4,
                    y: rng.sample(jitter) * 0.4,
                    z: 1.0 + rng.sample(jitter),
                    at: Utc::now(),
                };
                let _ = tx.send(sample);
            }
        }));
        Ok(())
    }

    async fn stop_sampling(&self) -> Result<()> {
        if let Some(task) = self.tasks.lock().accel.take() {
            task.abort();
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AccelSample> {
        self.accel_tx.subscribe()
    }
}

#[async_trait]
impl ActivitySource for SensorSimulator {
    async fn start_updates(&self) -> Result<()> {
        let mut tasks = self.tasks.lock();
        if tasks.activity.is_some() {
            return Ok(());
        }

        let tx = self.activity_tx.clone();
        let scenario = Arc::clone(&self.scenario);
        let started = self.started;

        tasks.activity = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            let mut last: Option<ActivityLabel> = None;
            loop {
                ticker.tick().await;
                let label = scenario.phase_at(started.elapsed()).label();
                // Classification events are delivered on change only.
                if last != Some(label) {
                    last = Some(label);
                    let _ = tx.send(ActivityEvent {
                        label,
                        at: Utc::now(),
                    });
                }
            }
        }));
        Ok(())
    }

    async fn stop_updates(&self) -> Result<()> {
        if let Some(task) = self.tasks.lock().activity.take() {
            task.abort();
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ActivityEvent> {
        self.activity_tx.subscribe()
    }

    async fn query_recent(&self, _window: Duration) -> Result<Option<ActivityEvent>> {
        // The simulated classifier always has a current opinion.
        Ok(Some(ActivityEvent {
            label: self.current_phase().label(),
            at: Utc::now(),
        }))
    }
}

#[async_trait]
impl StepSource for SensorSimulator {
    async fn start_updates(&self) -> Result<()> {
        let mut tasks = self.tasks.lock();
        if tasks.steps.is_some() {
            return Ok(());
        }

        let tx = self.step_tx.clone();
        let scenario = Arc::clone(&self.scenario);
        let started = self.started;
        let step_base = self.step_base;

        tasks.steps = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            loop {
                ticker.tick().await;
                let count = step_base + scenario.steps_until(started.elapsed());
                let _ = tx.send(StepReading {
                    count,
                    at: Utc::now(),
                });
            }
        }));
        Ok(())
    }

    async fn stop_updates(&self) -> Result<()> {
        if let Some(task) = self.tasks.lock().steps.take() {
            task.abort();
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StepReading> {
        self.step_tx.subscribe()
    }

    async fn query_steps(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<u64> {
        if to <= from {
            return Ok(0);
        }
        Ok(self
            .step_count_at(to)
            .saturating_sub(self.step_count_at(from)))
    }
}

#[async_trait]
impl LocationWakeSource for SensorSimulator {
    async fn arm(&self) -> Result<()> {
        let mut tasks = self.tasks.lock();
        if tasks.wake.is_some() {
            return Ok(());
        }

        let tx = self.wake_tx.clone();
        let scenario = Arc::clone(&self.scenario);
        let started = self.started;

        tasks.wake = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(45));
            ticker.tick().await; // skip the immediate first tick
            loop {
                ticker.tick().await;
                // Coarse geofence-style notification: fires only while the
                // device is actually covering ground.
                if scenario.phase_at(started.elapsed()).geographically_moving() {
                    let _ = tx.send(WakeEvent { at: Utc::now() });
                }
            }
        }));
        Ok(())
    }

    async fn disarm(&self) -> Result<()> {
        if let Some(task) = self.tasks.lock().wake.take() {
            task.abort();
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<WakeEvent> {
        self.wake_tx.subscribe()
    }
}

impl Drop for SensorSimulator {
    fn drop(&mut self) {
        let mut tasks = self.tasks.lock();
        for task in [
            tasks.accel.take(),
            tasks.activity.take(),
            tasks.steps.take(),
            tasks.wake.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }
    }
}
