//! Event types for the job filer event system
//!
//! Provides the shared event taxonomy and the EventBus used to push
//! automation and ingestion notifications to dashboards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Job filer event types
///
/// Events are broadcast via EventBus and serialized for SSE / WebSocket
/// transmission. The serialized `type` tag is the stable wire name
/// (`automation_started`, `automation_paused`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Browser launched and navigation toward the posting began
    AutomationStarted {
        session_id: String,
        job_id: i64,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Form fields are being detected and filled
    AutomationFilling {
        session_id: String,
        job_id: i64,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Form is filled and the submit control is highlighted
    ///
    /// The session waits here until a human confirms or cancels.
    AutomationPaused {
        session_id: String,
        job_id: i64,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Submit control clicked after explicit confirmation
    AutomationSubmitted {
        session_id: String,
        job_id: i64,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Session cancelled by the operator or by the kill switch
    AutomationCancelled {
        session_id: String,
        job_id: i64,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Session failed; its browser has been released
    AutomationError {
        session_id: String,
        job_id: i64,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A job posting moved along its workflow
    JobStatusChanged {
        job_id: i64,
        old_status: String,
        new_status: String,
        timestamp: DateTime<Utc>,
    },

    /// An ingestion run finished
    IngestionCompleted {
        inserted: usize,
        duplicates: usize,
        examined: usize,
        failed_sources: Vec<String>,
        timestamp: DateTime<Utc>,
    },
}

impl AgentEvent {
    /// Stable event name, used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            AgentEvent::AutomationStarted { .. } => "automation_started",
            AgentEvent::AutomationFilling { .. } => "automation_filling",
            AgentEvent::AutomationPaused { .. } => "automation_paused",
            AgentEvent::AutomationSubmitted { .. } => "automation_submitted",
            AgentEvent::AutomationCancelled { .. } => "automation_cancelled",
            AgentEvent::AutomationError { .. } => "automation_error",
            AgentEvent::JobStatusChanged { .. } => "job_status_changed",
            AgentEvent::IngestionCompleted { .. } => "ingestion_completed",
        }
    }

    /// Session ID for automation events, `None` otherwise
    pub fn session_id(&self) -> Option<&str> {
        match self {
            AgentEvent::AutomationStarted { session_id, .. }
            | AgentEvent::AutomationFilling { session_id, .. }
            | AgentEvent::AutomationPaused { session_id, .. }
            | AgentEvent::AutomationSubmitted { session_id, .. }
            | AgentEvent::AutomationCancelled { session_id, .. }
            | AgentEvent::AutomationError { session_id, .. } => Some(session_id),
            _ => None,
        }
    }
}

/// Central event distribution bus
///
/// Wraps a tokio broadcast channel:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged subscribers lose the oldest events
///
/// Delivery to disconnected listeners is not guaranteed.
///
/// # Examples
///
/// ```
/// use hjf_common::events::{AgentEvent, EventBus};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(AgentEvent::AutomationPaused {
///     session_id: "auto-7-1700000000000".to_string(),
///     job_id: 7,
///     message: "Ready to submit - waiting for confirmation".to_string(),
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AgentEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: AgentEvent,
    ) -> Result<usize, broadcast::error::SendError<AgentEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: AgentEvent) {
        if let Err(e) = self.tx.send(event) {
            tracing::trace!(event_type = e.0.event_type(), "No subscribers for event");
        }
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
