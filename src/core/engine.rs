// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/motiongate

//! Main motion engine - the singleton coordinator
//!
//! One engine instance owns one actor task, one acceleration window, one
//! step debouncer, and one current activity label. Sensor pumps, timers, and
//! probes deliver messages into the actor's mailbox; the actor is the only
//! code that touches decision state, so the priority cascade always sees a
//! consistent combination of inputs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::event_bus::EventBus;
use super::scheduler::PowerScheduler;
use super::{EngineMsg, EngineStatus, ProbeOutcome};
use crate::config::Config;
use crate::detection::{DecisionEngine, MovementChange, MovementState};
use crate::sensors::SensorSuite;

struct EngineInner {
    running: bool,
    actor: Option<JoinHandle<()>>,
    shutdown: Option<broadcast::Sender<()>>,
}

/// The motion state inference engine.
///
/// Exposes idempotent lifecycle control (`start`, `stop`,
/// `enter_foreground`, `enter_background`), the readable `MovementState`
/// snapshot, and the subscribable edge-triggered movement change stream.
pub struct MotionEngine {
    config: Arc<Config>,
    bus: Arc<EventBus>,
    scheduler: Arc<PowerScheduler>,
    state: Arc<RwLock<MovementState>>,
    status: Arc<RwLock<EngineStatus>>,
    inner: Mutex<EngineInner>,
}

impl MotionEngine {
    /// Create an engine over the given sources. Nothing runs until
    /// `start()`.
    pub fn new(config: Config, suite: SensorSuite, bus: Arc<EventBus>) -> Self {
        let config = Arc::new(config);
        let scheduler = Arc::new(PowerScheduler::new(
            config.scheduler.clone(),
            suite,
            Arc::clone(&bus),
        ));

        Self {
            config,
            bus,
            scheduler,
            state: Arc::new(RwLock::new(MovementState::default())),
            status: Arc::new(RwLock::new(EngineStatus::default())),
            inner: Mutex::new(EngineInner {
                running: false,
                actor: None,
                shutdown: None,
            }),
        }
    }

    /// Start the engine in foreground mode. No-op when already running.
    ///
    /// The acceleration window and step state are recreated empty on every
    /// start; nothing carries over from a previous run.
    pub async fn start(&self) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            if inner.running {
                return Ok(());
            }
            inner.running = true;
        }

        info!("starting motion engine");

        let (tx, rx) = mpsc::channel(self.config.scheduler.channel_capacity.max(16));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        *self.state.write().await = MovementState::default();
        {
            let mut status = self.status.write().await;
            *status = EngineStatus::default();
            status.running = true;
        }

        let actor = tokio::spawn(run_actor(
            rx,
            shutdown_rx,
            DecisionEngine::new(&self.config.detection),
            Arc::clone(&self.state),
            Arc::clone(&self.status),
            Arc::clone(&self.bus),
            self.scheduler.generation_counter(),
        ));

        {
            let mut inner = self.inner.lock();
            inner.actor = Some(actor);
            inner.shutdown = Some(shutdown_tx);
        }

        self.scheduler.start(tx).await;
        info!("motion engine started");
        Ok(())
    }

    /// Tear down timers, subscriptions, and the actor task. Calling `stop`
    /// twice, or before `start`, is a no-op, never an error.
    pub async fn stop(&self) -> Result<()> {
        let (actor, shutdown) = {
            let mut inner = self.inner.lock();
            if !inner.running {
                return Ok(());
            }
            inner.running = false;
            (inner.actor.take(), inner.shutdown.take())
        };

        info!("stopping motion engine");
        self.scheduler.stop().await;

        if let Some(shutdown) = shutdown {
            let _ = shutdown.send(());
        }
        if let Some(actor) = actor {
            let _ = actor.await;
        }

        self.status.write().await.running = false;
        info!("motion engine stopped");
        Ok(())
    }

    /// Switch to the background execution regime. No-op unless running in
    /// foreground.
    pub async fn enter_background(&self) {
        self.scheduler.enter_background().await;
    }

    /// Switch back to the foreground regime and refresh stale background
    /// state with one immediate probe. No-op unless running in background.
    pub async fn enter_foreground(&self) {
        self.scheduler.enter_foreground().await;
    }

    /// Current movement snapshot.
    pub async fn movement_state(&self) -> MovementState {
        self.state.read().await.clone()
    }

    /// Current debounced verdict.
    pub async fn is_moving(&self) -> bool {
        self.state.read().await.is_moving
    }

    /// Engine status counters.
    pub async fn status(&self) -> EngineStatus {
        let mut status = self.status.read().await.clone();
        status.power_mode = self.scheduler.power_mode();
        status
    }

    /// Subscribe to edge-triggered movement transitions.
    pub fn subscribe_movement(&self) -> broadcast::Receiver<MovementChange> {
        self.bus.subscribe_movement()
    }

    /// The shared event bus.
    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }
}

/// The single serialization point: every mutation of decision state happens
/// here, in mailbox order.
async fn run_actor(
    mut rx: mpsc::Receiver<EngineMsg>,
    mut shutdown: broadcast::Receiver<()>,
    mut decision: DecisionEngine,
    state: Arc<RwLock<MovementState>>,
    status: Arc<RwLock<EngineStatus>>,
    bus: Arc<EventBus>,
    generation: Arc<AtomicU64>,
) {
    loop {
        tokio::select! {
            maybe = rx.recv() => {
                match maybe {
                    Some(msg) => {
                        handle_msg(msg, &mut decision, &state, &status, &bus, &generation).await;
                    }
                    None => break,
                }
            }
            _ = shutdown.recv() => break,
        }
    }
    debug!("engine actor exited");
}

async fn handle_msg(
    msg: EngineMsg,
    decision: &mut DecisionEngine,
    state: &RwLock<MovementState>,
    status: &RwLock<EngineStatus>,
    bus: &EventBus,
    generation: &AtomicU64,
) {
    let mut changes: Vec<MovementChange> = Vec::new();

    match msg {
        EngineMsg::Accel { magnitude, at } => {
            changes.extend(decision.on_acceleration(magnitude, at));
            status.write().await.samples_processed += 1;
        }
        EngineMsg::Activity { label, at } => {
            changes.extend(decision.on_activity(label, at));
        }
        EngineMsg::StepCount { count, at } => {
            changes.extend(decision.on_step_count(count, at));
        }
        EngineMsg::Tick { at } => {
            changes.extend(decision.tick(at));
        }
        EngineMsg::Probe(outcome) => {
            apply_probe(outcome, decision, status, generation, &mut changes).await;
        }
        EngineMsg::PowerMode(mode) => {
            status.write().await.power_mode = Some(mode);
        }
    }

    // Snapshot refreshes on every message; notifications only on edges.
    *state.write().await = decision.state();

    for change in changes {
        info!(
            "movement changed: is_moving={} label={} at={}",
            change.is_moving, change.state.label, change.at
        );
        status.write().await.last_change = Some(change.at);
        bus.publish_movement(change);
    }
}

/// Apply a probe outcome unless it was superseded. A stale result is
/// discarded silently: it is not an error, and it must not touch state
/// that a newer regime already owns.
async fn apply_probe(
    outcome: ProbeOutcome,
    decision: &mut DecisionEngine,
    status: &RwLock<EngineStatus>,
    generation: &AtomicU64,
    changes: &mut Vec<MovementChange>,
) {
    let current = generation.load(Ordering::SeqCst);
    if outcome.generation != current {
        debug!(
            "discarding stale probe (gen {} != current {})",
            outcome.generation, current
        );
        status.write().await.probes_discarded += 1;
        return;
    }

    if let Some(label) = outcome.label {
        changes.extend(decision.on_activity(label, outcome.at));
    }
    if let Some(count) = outcome.steps_in_window {
        changes.extend(decision.on_probe_steps(count, outcome.at));
    }
    changes.extend(decision.tick(outcome.at));

    status.write().await.probes_applied += 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EventType, PowerMode};
    use crate::detection::ActivityLabel;
    use crate::sensors::{ActivityEvent, ActivitySource, StepReading, StepSource};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use crate::sensors::{Scenario, ScenarioPhase, SensorSimulator};
    use std::time::Duration;

    fn walking_suite() -> SensorSuite {
        let sim = Arc::new(SensorSimulator::new(Scenario::new(vec![(
            ScenarioPhase::Walking,
            Duration::from_secs(600),
        )])));
        SensorSuite {
            accelerometer: Some(sim.clone()),
            activity: Some(sim.clone()),
            steps: Some(sim.clone()),
            location_wake: Some(sim),
        }
    }

    #[tokio::test]
    async fn test_walking_scenario_reports_moving() {
        let bus = Arc::new(EventBus::new(64));
        let engine = MotionEngine::new(Config::default(), walking_suite(), Arc::clone(&bus));
        let mut changes = engine.subscribe_movement();

        engine.start().await.unwrap();

        let change = tokio::time::timeout(Duration::from_secs(5), changes.recv())
            .await
            .expect("no movement change within 5s")
            .unwrap();
        assert!(change.is_moving);
        assert!(engine.is_moving().await);
        assert_eq!(engine.movement_state().await.label, ActivityLabel::Walking);

        engine.stop().await.unwrap();
        assert!(!engine.status().await.running);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let bus = Arc::new(EventBus::new(64));
        let engine = MotionEngine::new(Config::default(), walking_suite(), bus);

        // stop before start
        engine.stop().await.unwrap();

        engine.start().await.unwrap();
        engine.start().await.unwrap(); // second start is a no-op
        engine.stop().await.unwrap();
        engine.stop().await.unwrap();
        assert!(!engine.status().await.running);
    }

    #[tokio::test]
    async fn test_background_probe_drives_decision() {
        let mut config = Config::default();
        config.scheduler.background_probe_interval_secs = 1;

        let bus = Arc::new(EventBus::new(64));
        let engine = MotionEngine::new(config, walking_suite(), Arc::clone(&bus));
        let mut changes = engine.subscribe_movement();

        engine.start().await.unwrap();
        engine.enter_background().await;
        assert_eq!(engine.status().await.power_mode, Some(PowerMode::Background));

        // With the accelerometer suspended, only wake probes can move the
        // verdict. Drain any change that slipped in before backgrounding and
        // wait for a probe-driven one.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(6);
        let mut moving = engine.is_moving().await;
        while !moving && tokio::time::Instant::now() < deadline {
            match tokio::time::timeout(Duration::from_secs(2), changes.recv()).await {
                Ok(Ok(change)) => moving = change.is_moving,
                _ => moving = engine.is_moving().await,
            }
        }
        assert!(moving, "background probe never produced a moving verdict");
        assert!(engine.status().await.probes_applied > 0);

        engine.stop().await.unwrap();
    }

    /// Sources that stream nothing and whose history queries always fail,
    /// as when the platform revokes access mid-run.
    struct OfflineHistory {
        activity_tx: broadcast::Sender<ActivityEvent>,
        step_tx: broadcast::Sender<StepReading>,
    }

    impl OfflineHistory {
        fn new() -> Self {
            let (activity_tx, _) = broadcast::channel(8);
            let (step_tx, _) = broadcast::channel(8);
            Self {
                activity_tx,
                step_tx,
            }
        }
    }

    #[async_trait]
    impl ActivitySource for OfflineHistory {
        async fn start_updates(&self) -> Result<()> {
            Ok(())
        }

        async fn stop_updates(&self) -> Result<()> {
            Ok(())
        }

        fn subscribe(&self) -> broadcast::Receiver<ActivityEvent> {
            self.activity_tx.subscribe()
        }

        async fn query_recent(&self, _window: Duration) -> Result<Option<ActivityEvent>> {
            anyhow::bail!("classifier history unavailable")
        }
    }

    #[async_trait]
    impl StepSource for OfflineHistory {
        async fn start_updates(&self) -> Result<()> {
            Ok(())
        }

        async fn stop_updates(&self) -> Result<()> {
            Ok(())
        }

        fn subscribe(&self) -> broadcast::Receiver<StepReading> {
            self.step_tx.subscribe()
        }

        async fn query_steps(&self, _from: DateTime<Utc>, _to: DateTime<Utc>) -> Result<u64> {
            anyhow::bail!("pedometer history unavailable")
        }
    }

    #[tokio::test]
    async fn test_degraded_suite_survives_failing_probe_queries() {
        let mut config = Config::default();
        config.scheduler.background_probe_interval_secs = 1;

        // No accelerometer, no location wake, and the two remaining sources
        // fail every history query.
        let history = Arc::new(OfflineHistory::new());
        let suite = SensorSuite {
            accelerometer: None,
            activity: Some(history.clone()),
            steps: Some(history),
            location_wake: None,
        };

        let bus = Arc::new(EventBus::new(64));
        let engine = MotionEngine::new(config, suite, Arc::clone(&bus));
        let mut events = bus.subscribe_events();

        engine.start().await.unwrap();
        engine.enter_background().await;

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        let mut saw_failure = false;
        while !saw_failure && tokio::time::Instant::now() < deadline {
            match tokio::time::timeout(Duration::from_secs(2), events.recv()).await {
                Ok(Ok(event)) => saw_failure = event.event_type == EventType::ProbeFailed,
                _ => break,
            }
        }
        assert!(saw_failure, "no probe failure reported on the bus");

        // Failed queries withhold their input; they never mutate the
        // snapshot or kill the engine.
        let state = engine.movement_state().await;
        assert!(!state.is_moving);
        assert_eq!(state.label, ActivityLabel::Unknown);
        assert!(engine.status().await.running);

        engine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_probe_is_discarded() {
        let (tx, rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let state = Arc::new(RwLock::new(MovementState::default()));
        let status = Arc::new(RwLock::new(EngineStatus::default()));
        let bus = Arc::new(EventBus::new(16));
        let generation = Arc::new(AtomicU64::new(5));

        let actor = tokio::spawn(run_actor(
            rx,
            shutdown_rx,
            DecisionEngine::new(&crate::config::DetectionConfig::default()),
            Arc::clone(&state),
            Arc::clone(&status),
            bus,
            Arc::clone(&generation),
        ));

        // Stale probe: strong evidence, wrong generation. Must not apply.
        tx.send(EngineMsg::Probe(ProbeOutcome {
            generation: 4,
            label: Some(ActivityLabel::Walking),
            steps_in_window: Some(12),
            at: Utc::now(),
        }))
        .await
        .unwrap();

        // Current probe applies normally.
        tx.send(EngineMsg::Probe(ProbeOutcome {
            generation: 5,
            label: None,
            steps_in_window: Some(3),
            at: Utc::now(),
        }))
        .await
        .unwrap();

        // Give the actor a moment to drain the mailbox.
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(status.read().await.probes_discarded, 1);
        assert_eq!(status.read().await.probes_applied, 1);
        let snapshot = state.read().await.clone();
        assert!(snapshot.is_moving); // via the applied probe's steps
        assert_eq!(snapshot.label, ActivityLabel::Unknown); // stale label never landed

        let _ = shutdown_tx.send(());
        let _ = actor.await;
    }
}
