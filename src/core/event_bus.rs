// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/motiongate

//! Event bus for inter-component communication
//!
//! The movement-change stream is the policy-facing surface: the downstream
//! app-gating collaborator subscribes to it and reacts to transitions only.
//! The generic event stream carries operational signals (power mode changes,
//! degraded sources, probe failures) for logging and diagnostics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::core::PowerMode;
use crate::detection::MovementChange;

/// Event types in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    MovementChange,
    PowerMode,
    SourceDegraded,
    ProbeFailed,
    Status,
}

/// Generic event wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Movement(MovementChange),
    PowerMode(PowerMode),
    SourceDegraded { source: String, detail: String },
    ProbeFailed { generation: u64, detail: String },
    Status { key: String, value: String },
}

/// Central event bus for pub/sub communication
pub struct EventBus {
    movement_tx: broadcast::Sender<MovementChange>,
    event_tx: broadcast::Sender<Event>,
    event_counter: std::sync::atomic::AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (movement_tx, _) = broadcast::channel(capacity.max(1));
        let (event_tx, _) = broadcast::channel(capacity.max(1));

        Self {
            movement_tx,
            event_tx,
            event_counter: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Publish an edge-triggered movement transition.
    pub fn publish_movement(&self, change: MovementChange) {
        let _ = self.movement_tx.send(change.clone());
        self.publish_event(EventType::MovementChange, EventPayload::Movement(change));
    }

    pub fn publish_power_mode(&self, mode: PowerMode) {
        self.publish_event(EventType::PowerMode, EventPayload::PowerMode(mode));
    }

    pub fn publish_degraded(&self, source: &str, detail: &str) {
        self.publish_event(
            EventType::SourceDegraded,
            EventPayload::SourceDegraded {
                source: source.to_string(),
                detail: detail.to_string(),
            },
        );
    }

    pub fn publish_probe_failure(&self, generation: u64, detail: &str) {
        self.publish_event(
            EventType::ProbeFailed,
            EventPayload::ProbeFailed {
                generation,
                detail: detail.to_string(),
            },
        );
    }

    pub fn publish_status(&self, key: &str, value: &str) {
        self.publish_event(
            EventType::Status,
            EventPayload::Status {
                key: key.to_string(),
                value: value.to_string(),
            },
        );
    }

    fn publish_event(&self, event_type: EventType, payload: EventPayload) {
        let id = self
            .event_counter
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let event = Event {
            id,
            event_type,
            timestamp: Utc::now(),
            payload,
        };
        let _ = self.event_tx.send(event);
    }

    /// Subscribe to movement transitions (the policy surface).
    pub fn subscribe_movement(&self) -> broadcast::Receiver<MovementChange> {
        self.movement_tx.subscribe()
    }

    /// Subscribe to the full diagnostic event stream.
    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::MovementState;

    #[tokio::test]
    async fn test_movement_fanout() {
        let bus = EventBus::new(16);
        let mut movement_rx = bus.subscribe_movement();
        let mut event_rx = bus.subscribe_events();

        bus.publish_movement(MovementChange {
            is_moving: true,
            state: MovementState::default(),
            at: Utc::now(),
        });

        assert!(movement_rx.recv().await.unwrap().is_moving);
        let event = event_rx.recv().await.unwrap();
        assert_eq!(event.event_type, EventType::MovementChange);
    }

    #[tokio::test]
    async fn test_event_ids_are_sequential() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe_events();

        bus.publish_status("a", "1");
        bus.publish_status("b", "2");

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(second.id, first.id + 1);
    }
}
