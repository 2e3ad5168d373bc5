//! Engine events and the broadcast EventBus
//!
//! Every state change other services may care about (a resolved match, a
//! review entering or leaving the queue, a threshold drifting) is published
//! here. Notification delivery subscribes to the bus; this crate never sends
//! email or SMS itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events emitted by the matching and review services
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    /// Resolver finished a run for a processing job
    MatchResolved {
        match_id: Uuid,
        processing_job_id: Uuid,
        /// Serialized review status ("approved", "pending", ...)
        review_status: String,
        confidence: f64,
        timestamp: DateTime<Utc>,
    },

    /// New review item entered the queue
    ReviewQueued {
        review_id: Uuid,
        job_id: Uuid,
        review_type: String,
        priority: String,
        reasons: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// Review item taken by a reviewer
    ReviewAssigned {
        review_id: Uuid,
        reviewer_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Review item handed back to the queue
    ReviewReleased {
        review_id: Uuid,
        reviewer_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Reviewer recorded a decision
    ReviewCompleted {
        review_id: Uuid,
        job_id: Uuid,
        reviewer_id: String,
        decision: String,
        timestamp: DateTime<Utc>,
    },

    /// Human correction moved a concept threshold
    ThresholdAdjusted {
        concept_tag: String,
        delta: f64,
        new_threshold: f64,
        timestamp: DateTime<Utc>,
    },
}

impl EngineEvent {
    /// Event name used for the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            EngineEvent::MatchResolved { .. } => "MatchResolved",
            EngineEvent::ReviewQueued { .. } => "ReviewQueued",
            EngineEvent::ReviewAssigned { .. } => "ReviewAssigned",
            EngineEvent::ReviewReleased { .. } => "ReviewReleased",
            EngineEvent::ReviewCompleted { .. } => "ReviewCompleted",
            EngineEvent::ThresholdAdjusted { .. } => "ThresholdAdjusted",
        }
    }
}

/// Broadcast bus for [`EngineEvent`]s
///
/// Cloning shares the same channel. Slow subscribers lose the oldest events
/// once `capacity` is exceeded.
///
/// # Examples
///
/// ```
/// use trialmatch_common::events::{EngineEvent, EventBus};
///
/// let bus = EventBus::new(16);
/// let mut rx = bus.subscribe();
/// bus.emit_lossy(EngineEvent::ThresholdAdjusted {
///     concept_tag: "dosage".to_string(),
///     delta: -0.07,
///     new_threshold: 0.68,
///     timestamp: chrono::Utc::now(),
/// });
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: EngineEvent,
    ) -> Result<usize, broadcast::error::SendError<EngineEvent>> {
        self.tx.send(event)
    }

    /// Emit without caring whether anyone listens
    pub fn emit_lossy(&self, event: EngineEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("No subscribers for engine event");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
