// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/motiongate

//! Sensor source traits and common sample types
//!
//! All sources are push-based: the engine never polls. Each trait exposes a
//! `subscribe()` broadcast stream plus start/stop control, and the sources
//! that support background probing additionally expose a bounded historical
//! query. Implementations wrap platform services (or the simulator).

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;

use crate::detection::ActivityLabel;

/// A single raw accelerometer sample.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AccelSample {
    /// X axis acceleration in g
    pub x: f64,
    /// Y axis acceleration in g
    pub y: f64,
    /// Z axis acceleration in g
    pub z: f64,
    /// Capture time
    pub at: DateTime<Utc>,
}

impl AccelSample {
    /// Total acceleration magnitude: sqrt(x² + y² + z²).
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// A cumulative step counter reading. The count is monotone per boot; a
/// lower value than previously seen means the counter was reset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StepReading {
    /// Cumulative step count
    pub count: u64,
    /// Reading time
    pub at: DateTime<Utc>,
}

/// A coarse activity classification event, already normalized into the
/// engine vocabulary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// Normalized label
    pub label: ActivityLabel,
    /// Classification time
    pub at: DateTime<Utc>,
}

/// A coarse geographic-movement wake notification. Carries no motion
/// evidence; it exists solely to give the background scheduler an earlier
/// chance to probe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WakeEvent {
    /// Notification time
    pub at: DateTime<Utc>,
}

/// Raw accelerometer stream, nominally 10 Hz in foreground, suspended in
/// background.
#[async_trait]
pub trait AccelerometerSource: Send + Sync {
    /// Begin delivering samples at the given rate. Idempotent.
    async fn start_sampling(&self, hz: f64) -> Result<()>;

    /// Stop delivering samples. Idempotent.
    async fn stop_sampling(&self) -> Result<()>;

    /// Subscribe to the sample stream.
    fn subscribe(&self) -> broadcast::Receiver<AccelSample>;
}

/// Coarse activity classification stream with a bounded history query for
/// background probing.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    /// Begin delivering classification events (delivered on change). Idempotent.
    async fn start_updates(&self) -> Result<()>;

    /// Stop delivering classification events. Idempotent.
    async fn stop_updates(&self) -> Result<()>;

    /// Subscribe to the classification stream.
    fn subscribe(&self) -> broadcast::Receiver<ActivityEvent>;

    /// Most recent classification within the trailing `window`, if any.
    async fn query_recent(&self, window: Duration) -> Result<Option<ActivityEvent>>;
}

/// Step counter stream with an explicit `[from, to)` window query.
#[async_trait]
pub trait StepSource: Send + Sync {
    /// Begin delivering cumulative counter readings. Idempotent.
    async fn start_updates(&self) -> Result<()>;

    /// Stop delivering counter readings. Idempotent.
    async fn stop_updates(&self) -> Result<()>;

    /// Subscribe to the reading stream.
    fn subscribe(&self) -> broadcast::Receiver<StepReading>;

    /// Number of steps taken in `[from, to)`.
    async fn query_steps(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<u64>;
}

/// Low-power geographic-movement wake source (large radius, infrequent).
#[async_trait]
pub trait LocationWakeSource: Send + Sync {
    /// Arm wake notifications. Idempotent.
    async fn arm(&self) -> Result<()>;

    /// Disarm wake notifications. Idempotent.
    async fn disarm(&self) -> Result<()>;

    /// Subscribe to wake notifications.
    fn subscribe(&self) -> broadcast::Receiver<WakeEvent>;
}

/// The bundle of sources available to one engine instance.
///
/// Any entry may be `None`: a missing source is reported once at start and
/// the engine degrades to whatever remains (ultimately the variance-only
/// fallback rule). Missing sources are never an error.
#[derive(Clone, Default)]
pub struct SensorSuite {
    /// Raw accelerometer, if available
    pub accelerometer: Option<Arc<dyn AccelerometerSource>>,
    /// Coarse activity classifier, if available
    pub activity: Option<Arc<dyn ActivitySource>>,
    /// Step counter, if available
    pub steps: Option<Arc<dyn StepSource>>,
    /// Geographic wake source, if available
    pub location_wake: Option<Arc<dyn LocationWakeSource>>,
}

impl SensorSuite {
    /// Number of available sources.
    pub fn available_count(&self) -> usize {
        self.accelerometer.is_some() as usize
            + self.activity.is_some() as usize
            + self.steps.is_some() as usize
            + self.location_wake.is_some() as usize
    }

    /// Log a warning for every missing source. Called once at engine start.
    pub fn warn_missing(&self) {
        if self.accelerometer.is_none() {
            warn!("accelerometer source unavailable, variance fallback disabled");
        }
        if self.activity.is_none() {
            warn!("activity classifier unavailable, relying on steps and variance");
        }
        if self.steps.is_none() {
            warn!("step counter unavailable, onset detection will lag");
        }
        if self.location_wake.is_none() {
            warn!("location wake source unavailable, background probes run on timer only");
        }
    }
}
