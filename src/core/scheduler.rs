// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/motiongate

//! Power-aware scheduler - which sources run, at what cadence
//!
//! Owns the foreground/background lifecycle. In foreground the accelerometer
//! samples at full rate and the classifier/pedometer streams are live; in
//! background those are assumed suspended by the host platform, and a
//! periodic wake timer (plus opportunistic geographic wake notifications)
//! drives short probes of recent classification and step history instead.
//!
//! State machine: Stopped → Foreground ⇄ Background → Stopped. Every
//! transition is idempotent; `stop()` is reachable from any state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::event_bus::EventBus;
use super::{EngineMsg, ProbeOutcome};
use crate::config::SchedulerConfig;
use crate::sensors::SensorSuite;

/// Process-wide execution regime, tied to host application visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerMode {
    /// Full-rate sampling, continuous subscriptions.
    Foreground,
    /// High-rate sources suspended; periodic wake probes.
    Background,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchedulerState {
    Stopped,
    Foreground,
    Background,
}

struct SchedulerInner {
    state: SchedulerState,
    tx: Option<mpsc::Sender<EngineMsg>>,
    tasks: Vec<JoinHandle<()>>,
}

/// Owns source subscriptions and the background wake machinery.
pub struct PowerScheduler {
    config: SchedulerConfig,
    suite: SensorSuite,
    bus: Arc<EventBus>,
    /// Bumped on every lifecycle transition; in-flight probes carry the
    /// value they started with, and stale results are discarded at apply
    /// time by the engine actor.
    generation: Arc<AtomicU64>,
    inner: Mutex<SchedulerInner>,
}

impl PowerScheduler {
    pub fn new(config: SchedulerConfig, suite: SensorSuite, bus: Arc<EventBus>) -> Self {
        Self {
            config,
            suite,
            bus,
            generation: Arc::new(AtomicU64::new(0)),
            inner: Mutex::new(SchedulerInner {
                state: SchedulerState::Stopped,
                tx: None,
                tasks: Vec::new(),
            }),
        }
    }

    /// Shared generation counter, for the engine actor's stale-probe check.
    pub(crate) fn generation_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.generation)
    }

    /// Store freshly spawned task handles, unless the state moved on while
    /// they were being spawned. Returns `false` (after aborting the
    /// handles) when a concurrent transition won the race; the caller must
    /// then tear down whatever sources it just started.
    fn store_tasks(&self, tasks: Vec<JoinHandle<()>>, expected: SchedulerState) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == expected {
            inner.tasks = tasks;
            true
        } else {
            drop(inner);
            abort_all(tasks);
            false
        }
    }

    /// Current power mode, `None` when stopped.
    pub fn power_mode(&self) -> Option<PowerMode> {
        match self.inner.lock().state {
            SchedulerState::Stopped => None,
            SchedulerState::Foreground => Some(PowerMode::Foreground),
            SchedulerState::Background => Some(PowerMode::Background),
        }
    }

    /// Begin scheduling in foreground mode, feeding the given mailbox.
    /// No-op when already running.
    pub(crate) async fn start(&self, tx: mpsc::Sender<EngineMsg>) {
        {
            let mut inner = self.inner.lock();
            if inner.state != SchedulerState::Stopped {
                return;
            }
            inner.state = SchedulerState::Foreground;
            inner.tx = Some(tx.clone());
        }

        self.suite.warn_missing();
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.announce_mode(&tx, PowerMode::Foreground).await;

        let tasks = self.spawn_foreground(&tx).await;
        if !self.store_tasks(tasks, SchedulerState::Foreground) {
            // Lost a race with stop(); undo the sources we just started.
            self.suspend_foreground_sources().await;
            return;
        }

        info!("scheduler started in foreground mode");
    }

    /// Suspend high-rate sources and arm the wake timer. No-op unless
    /// currently in foreground.
    pub async fn enter_background(&self) {
        let (tx, old_tasks) = {
            let mut inner = self.inner.lock();
            if inner.state != SchedulerState::Foreground {
                return;
            }
            inner.state = SchedulerState::Background;
            let tx = match inner.tx.clone() {
                Some(tx) => tx,
                None => return,
            };
            (tx, std::mem::take(&mut inner.tasks))
        };

        self.generation.fetch_add(1, Ordering::SeqCst);
        abort_all(old_tasks);
        self.suspend_foreground_sources().await;
        self.announce_mode(&tx, PowerMode::Background).await;

        let tasks = self.spawn_background(&tx).await;
        if !self.store_tasks(tasks, SchedulerState::Background) {
            if let Some(wake) = &self.suite.location_wake {
                if let Err(e) = wake.disarm().await {
                    warn!("failed to disarm location wake source: {}", e);
                }
            }
            return;
        }

        info!("scheduler entered background mode");
    }

    /// Disarm the wake timer, restore high-rate sources, and fire one
    /// immediate probe so stale background state refreshes without waiting
    /// for a natural sample. No-op unless currently in background.
    pub async fn enter_foreground(&self) {
        let (tx, old_tasks) = {
            let mut inner = self.inner.lock();
            if inner.state != SchedulerState::Background {
                return;
            }
            inner.state = SchedulerState::Foreground;
            let tx = match inner.tx.clone() {
                Some(tx) => tx,
                None => return,
            };
            (tx, std::mem::take(&mut inner.tasks))
        };

        // Invalidate any probe still in flight from the background regime.
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        abort_all(old_tasks);

        if let Some(wake) = &self.suite.location_wake {
            if let Err(e) = wake.disarm().await {
                warn!("failed to disarm location wake source: {}", e);
            }
        }

        self.announce_mode(&tx, PowerMode::Foreground).await;

        let tasks = self.spawn_foreground(&tx).await;
        if !self.store_tasks(tasks, SchedulerState::Foreground) {
            self.suspend_foreground_sources().await;
            return;
        }

        // One immediate probe under the new generation.
        run_probe(&self.suite, &self.config, &self.bus, &tx, generation).await;

        info!("scheduler entered foreground mode");
    }

    /// Tear down all timers and subscriptions. Safe to call repeatedly and
    /// from any state.
    pub async fn stop(&self) {
        let old_tasks = {
            let mut inner = self.inner.lock();
            if inner.state == SchedulerState::Stopped {
                return;
            }
            inner.state = SchedulerState::Stopped;
            inner.tx = None;
            std::mem::take(&mut inner.tasks)
        };

        self.generation.fetch_add(1, Ordering::SeqCst);
        abort_all(old_tasks);
        self.suspend_foreground_sources().await;
        if let Some(wake) = &self.suite.location_wake {
            if let Err(e) = wake.disarm().await {
                warn!("failed to disarm location wake source: {}", e);
            }
        }

        info!("scheduler stopped");
    }

    async fn announce_mode(&self, tx: &mpsc::Sender<EngineMsg>, mode: PowerMode) {
        self.bus.publish_power_mode(mode);
        let _ = tx.send(EngineMsg::PowerMode(mode)).await;
    }

    async fn suspend_foreground_sources(&self) {
        if let Some(accel) = &self.suite.accelerometer {
            if let Err(e) = accel.stop_sampling().await {
                warn!("failed to stop accelerometer: {}", e);
            }
        }
        if let Some(activity) = &self.suite.activity {
            if let Err(e) = activity.stop_updates().await {
                warn!("failed to stop activity updates: {}", e);
            }
        }
        if let Some(steps) = &self.suite.steps {
            if let Err(e) = steps.stop_updates().await {
                warn!("failed to stop step updates: {}", e);
            }
        }
    }

    /// Start high-rate sources and spawn their pump tasks plus the
    /// housekeeping tick.
    async fn spawn_foreground(&self, tx: &mpsc::Sender<EngineMsg>) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::new();

        if let Some(accel) = &self.suite.accelerometer {
            match accel.start_sampling(self.config.foreground_sample_hz).await {
                Ok(()) => {
                    let rx = accel.subscribe();
                    let tx = tx.clone();
                    tasks.push(tokio::spawn(pump_accel(rx, tx)));
                }
                Err(e) => {
                    warn!("accelerometer failed to start: {}", e);
                    self.bus.publish_degraded("accelerometer", &e.to_string());
                }
            }
        }

        if let Some(activity) = &self.suite.activity {
            match activity.start_updates().await {
                Ok(()) => {
                    let rx = activity.subscribe();
                    let tx = tx.clone();
                    tasks.push(tokio::spawn(pump_activity(rx, tx)));
                }
                Err(e) => {
                    warn!("activity classifier failed to start: {}", e);
                    self.bus.publish_degraded("activity", &e.to_string());
                }
            }
        }

        if let Some(steps) = &self.suite.steps {
            match steps.start_updates().await {
                Ok(()) => {
                    let rx = steps.subscribe();
                    let tx = tx.clone();
                    tasks.push(tokio::spawn(pump_steps(rx, tx)));
                }
                Err(e) => {
                    warn!("step counter failed to start: {}", e);
                    self.bus.publish_degraded("steps", &e.to_string());
                }
            }
        }

        // Housekeeping tick: expires the step grace window even when no
        // sensor event arrives to trigger a re-evaluation.
        {
            let tx = tx.clone();
            let period = Duration::from_secs(self.config.tick_interval_secs.max(1));
            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                loop {
                    ticker.tick().await;
                    if tx.send(EngineMsg::Tick { at: Utc::now() }).await.is_err() {
                        break;
                    }
                }
            }));
        }

        tasks
    }

    /// Arm the wake timer and the location wake pump.
    async fn spawn_background(&self, tx: &mpsc::Sender<EngineMsg>) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::new();

        // Periodic wake timer: each firing performs one probe.
        {
            let suite = self.suite.clone();
            let config = self.config.clone();
            let bus = Arc::clone(&self.bus);
            let generation = Arc::clone(&self.generation);
            let tx = tx.clone();
            let period = Duration::from_secs(self.config.background_probe_interval_secs.max(1));

            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.tick().await; // the interval's immediate first tick
                loop {
                    ticker.tick().await;
                    let gen = generation.load(Ordering::SeqCst);
                    run_probe(&suite, &config, &bus, &tx, gen).await;
                }
            }));
        }

        // Geographic wake notifications buy an earlier probe than the fixed
        // timer would; they carry no motion evidence of their own.
        if let Some(wake) = &self.suite.location_wake {
            match wake.arm().await {
                Ok(()) => {
                    let mut rx = wake.subscribe();
                    let suite = self.suite.clone();
                    let config = self.config.clone();
                    let bus = Arc::clone(&self.bus);
                    let generation = Arc::clone(&self.generation);
                    let tx = tx.clone();

                    tasks.push(tokio::spawn(async move {
                        loop {
                            match rx.recv().await {
                                Ok(event) => {
                                    debug!("location wake at {}, probing early", event.at);
                                    let gen = generation.load(Ordering::SeqCst);
                                    run_probe(&suite, &config, &bus, &tx, gen).await;
                                }
                                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                                Err(broadcast::error::RecvError::Closed) => break,
                            }
                        }
                    }));
                }
                Err(e) => {
                    warn!("location wake source failed to arm: {}", e);
                    self.bus.publish_degraded("location_wake", &e.to_string());
                }
            }
        }

        tasks
    }
}

fn abort_all(tasks: Vec<JoinHandle<()>>) {
    for task in tasks {
        task.abort();
    }
}

async fn pump_accel(
    mut rx: broadcast::Receiver<crate::sensors::AccelSample>,
    tx: mpsc::Sender<EngineMsg>,
) {
    loop {
        match rx.recv().await {
            Ok(sample) => {
                let msg = EngineMsg::Accel {
                    magnitude: sample.magnitude(),
                    at: sample.at,
                };
                if tx.send(msg).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                debug!("accelerometer pump lagged, dropped {} samples", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn pump_activity(
    mut rx: broadcast::Receiver<crate::sensors::ActivityEvent>,
    tx: mpsc::Sender<EngineMsg>,
) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let msg = EngineMsg::Activity {
                    label: event.label,
                    at: event.at,
                };
                if tx.send(msg).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn pump_steps(
    mut rx: broadcast::Receiver<crate::sensors::StepReading>,
    tx: mpsc::Sender<EngineMsg>,
) {
    loop {
        match rx.recv().await {
            Ok(reading) => {
                let msg = EngineMsg::StepCount {
                    count: reading.count,
                    at: reading.at,
                };
                if tx.send(msg).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// One probe: bounded re-query of recent classification and step history.
///
/// A query failure withholds that input and is reported upward; it never
/// fabricates a value. The outcome always carries the generation it started
/// under so the engine actor can discard superseded results.
async fn run_probe(
    suite: &SensorSuite,
    config: &SchedulerConfig,
    bus: &EventBus,
    tx: &mpsc::Sender<EngineMsg>,
    generation: u64,
) {
    let now = Utc::now();

    let label = match &suite.activity {
        Some(source) => {
            let window = Duration::from_secs(config.activity_probe_window_secs);
            match source.query_recent(window).await {
                Ok(event) => event.map(|e| e.label),
                Err(e) => {
                    warn!("activity probe query failed: {}", e);
                    bus.publish_probe_failure(generation, &format!("activity: {}", e));
                    None
                }
            }
        }
        None => None,
    };

    let steps_in_window = match &suite.steps {
        Some(source) => {
            let from = now - chrono::Duration::seconds(config.step_probe_window_secs as i64);
            match source.query_steps(from, now).await {
                Ok(count) => Some(count),
                Err(e) => {
                    warn!("step probe query failed: {}", e);
                    bus.publish_probe_failure(generation, &format!("steps: {}", e));
                    None
                }
            }
        }
        None => None,
    };

    debug!(
        "probe gen={} label={:?} steps={:?}",
        generation, label, steps_in_window
    );

    let _ = tx
        .send(EngineMsg::Probe(ProbeOutcome {
            generation,
            label,
            steps_in_window,
            at: now,
        }))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::{Scenario, ScenarioPhase, SensorSimulator};
    use std::time::Duration as StdDuration;

    fn suite() -> SensorSuite {
        let sim = Arc::new(SensorSimulator::new(Scenario::new(vec![(
            ScenarioPhase::Walking,
            StdDuration::from_secs(600),
        )])));
        SensorSuite {
            accelerometer: Some(sim.clone()),
            activity: Some(sim.clone()),
            steps: Some(sim.clone()),
            location_wake: Some(sim),
        }
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_pumps_samples() {
        let bus = Arc::new(EventBus::new(64));
        let scheduler = PowerScheduler::new(SchedulerConfig::default(), suite(), bus);
        let (tx, mut rx) = mpsc::channel(64);

        scheduler.start(tx.clone()).await;
        scheduler.start(tx).await; // second call is a no-op
        assert_eq!(scheduler.power_mode(), Some(PowerMode::Foreground));

        // First message announces the mode, then sensor data flows.
        let first = tokio::time::timeout(StdDuration::from_secs(2), rx.recv())
            .await
            .expect("no message within 2s")
            .unwrap();
        assert!(matches!(first, EngineMsg::PowerMode(PowerMode::Foreground)));

        let mut saw_accel = false;
        for _ in 0..50 {
            let msg = tokio::time::timeout(StdDuration::from_secs(2), rx.recv())
                .await
                .expect("stream stalled")
                .unwrap();
            if matches!(msg, EngineMsg::Accel { .. }) {
                saw_accel = true;
                break;
            }
        }
        assert!(saw_accel);

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_stop_twice_is_a_noop() {
        let bus = Arc::new(EventBus::new(64));
        let scheduler = PowerScheduler::new(SchedulerConfig::default(), suite(), bus);
        let (tx, _rx) = mpsc::channel(64);

        // stop before start
        scheduler.stop().await;
        assert_eq!(scheduler.power_mode(), None);

        scheduler.start(tx).await;
        scheduler.stop().await;
        scheduler.stop().await;
        assert_eq!(scheduler.power_mode(), None);
    }

    #[tokio::test]
    async fn test_background_transition_bumps_generation() {
        let bus = Arc::new(EventBus::new(64));
        let scheduler = PowerScheduler::new(SchedulerConfig::default(), suite(), bus);
        let (tx, mut rx) = mpsc::channel(256);
        let counter = scheduler.generation_counter();

        scheduler.start(tx).await;
        let after_start = counter.load(Ordering::SeqCst);

        scheduler.enter_background().await;
        assert!(counter.load(Ordering::SeqCst) > after_start);
        assert_eq!(scheduler.power_mode(), Some(PowerMode::Background));

        // enter_background from background is a no-op
        let frozen = counter.load(Ordering::SeqCst);
        scheduler.enter_background().await;
        assert_eq!(counter.load(Ordering::SeqCst), frozen);

        scheduler.enter_foreground().await;
        assert_eq!(scheduler.power_mode(), Some(PowerMode::Foreground));

        // The return to foreground fires one immediate probe carrying the
        // post-transition generation.
        let current = counter.load(Ordering::SeqCst);
        let mut saw_probe = false;
        for _ in 0..100 {
            match tokio::time::timeout(StdDuration::from_secs(2), rx.recv()).await {
                Ok(Some(EngineMsg::Probe(outcome))) => {
                    assert_eq!(outcome.generation, current);
                    saw_probe = true;
                    break;
                }
                Ok(Some(_)) => continue,
                _ => break,
            }
        }
        assert!(saw_probe, "no foreground-entry probe observed");

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_stop_racing_start_aborts_fresh_tasks() {
        // stop() may land while start() is between transitioning state and
        // storing its task handles; whichever interleaving occurs, a final
        // stop must leave no pump running.
        for _ in 0..10 {
            let bus = Arc::new(EventBus::new(64));
            let scheduler = Arc::new(PowerScheduler::new(
                SchedulerConfig::default(),
                suite(),
                bus,
            ));
            let (tx, mut rx) = mpsc::channel(1024);

            let racer = Arc::clone(&scheduler);
            let start = tokio::spawn(async move { racer.start(tx).await });
            scheduler.stop().await;
            start.await.unwrap();
            scheduler.stop().await;
            assert_eq!(scheduler.power_mode(), None);

            // Drain anything queued before teardown; afterwards the mailbox
            // must stay silent.
            while rx.try_recv().is_ok() {}
            tokio::time::sleep(StdDuration::from_millis(250)).await;
            assert!(rx.try_recv().is_err(), "pump survived stop");
        }
    }

    #[tokio::test]
    async fn test_probe_reports_walking_steps() {
        let bus = Arc::new(EventBus::new(64));
        let suite = suite();
        let (tx, mut rx) = mpsc::channel(64);
        let config = SchedulerConfig::default();

        // Let the simulated pedometer accumulate some history.
        tokio::time::sleep(StdDuration::from_millis(1200)).await;
        run_probe(&suite, &config, &bus, &tx, 7).await;

        let msg = rx.recv().await.unwrap();
        match msg {
            EngineMsg::Probe(outcome) => {
                assert_eq!(outcome.generation, 7);
                assert_eq!(outcome.label, Some(crate::detection::ActivityLabel::Walking));
                assert!(outcome.steps_in_window.unwrap_or(0) > 0);
            }
            other => panic!("expected probe outcome, got {:?}", other),
        }
    }
}
