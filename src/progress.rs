//! Per-session progress bus for observable audit execution.
//!
//! The progress system provides a stream of events that can be rendered
//! differently depending on the deployment context:
//! - Chat surface: websocket frames while a pipeline runs
//! - Admin UI: live scheduler progress
//! - Analysis: JSON export for replay
//!
//! Sessions are multiplexed over a shared bus. Each session has at most one
//! subscriber; events emitted for a session with no subscriber are dropped
//! rather than buffered indefinitely. Late subscribers lose early events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Capacity of a single session channel. When a subscriber stops draining,
/// further events for that session are dropped, not queued without bound.
const SESSION_CHANNEL_CAPACITY: usize = 256;

/// Types of progress events emitted during routing and pipeline execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressEventType {
    /// Context analyzer started reformulating the question
    ContextAnalysisStarted,
    /// Router started deciding the response mode
    RoutingStarted,
    /// Router finished (mode and elapsed ms in metadata)
    RoutingCompleted,
    /// Router LLM call failed; degraded to NOVEL_CLAIM
    RouterFallback,
    /// Pipeline run started
    PipelineStarted,
    /// An agent stage started (agent name in metadata)
    AgentStarted,
    /// An agent stage finished (agent name, ms, success in metadata)
    AgentCompleted,
    /// Pipeline run finished successfully
    PipelineCompleted,
    /// Pipeline run failed (error in content)
    PipelineFailed,
    /// The persisted claim card, serialized in metadata
    ClaimCardReady,
    /// Periodic heartbeat so idle connections stay open
    Keepalive,
}

impl std::fmt::Display for ProgressEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ContextAnalysisStarted => "CONTEXT_ANALYSIS_STARTED",
            Self::RoutingStarted => "ROUTING_STARTED",
            Self::RoutingCompleted => "ROUTING_COMPLETED",
            Self::RouterFallback => "ROUTER_FALLBACK",
            Self::PipelineStarted => "PIPELINE_STARTED",
            Self::AgentStarted => "AGENT_STARTED",
            Self::AgentCompleted => "AGENT_COMPLETED",
            Self::PipelineCompleted => "PIPELINE_COMPLETED",
            Self::PipelineFailed => "PIPELINE_FAILED",
            Self::ClaimCardReady => "CLAIM_CARD_READY",
            Self::Keepalive => "KEEPALIVE",
        };
        write!(f, "{}", s)
    }
}

/// A progress event emitted during routing or pipeline execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Type of the event
    pub event_type: ProgressEventType,
    /// Human-readable content describing the event
    pub content: String,
    /// Event-specific metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    /// Create a new progress event.
    pub fn new(event_type: ProgressEventType, content: impl Into<String>) -> Self {
        Self {
            event_type,
            content: content.into(),
            metadata: None,
            timestamp: Utc::now(),
        }
    }

    /// Add metadata to the event.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Get a metadata value.
    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.as_ref()?.get(key)
    }

    // Convenience constructors for common event types

    /// Context analysis started for a question.
    pub fn context_analysis_started(question: impl Into<String>) -> Self {
        Self::new(ProgressEventType::ContextAnalysisStarted, question)
    }

    /// Routing started for a reformulated question.
    pub fn routing_started(question: impl Into<String>) -> Self {
        Self::new(ProgressEventType::RoutingStarted, question)
    }

    /// Routing completed with the chosen mode.
    pub fn routing_completed(mode: impl Into<String>, elapsed_ms: u64) -> Self {
        let mode = mode.into();
        Self::new(ProgressEventType::RoutingCompleted, mode.clone())
            .with_metadata("mode", mode)
            .with_metadata("elapsed_ms", elapsed_ms as i64)
    }

    /// Router degraded to NOVEL_CLAIM after an LLM-layer failure.
    pub fn router_fallback(reason: impl Into<String>) -> Self {
        Self::new(ProgressEventType::RouterFallback, reason)
    }

    /// Pipeline started for a claim question.
    pub fn pipeline_started(question: impl Into<String>) -> Self {
        Self::new(ProgressEventType::PipelineStarted, question)
    }

    /// An agent stage started.
    pub fn agent_started(agent: &str) -> Self {
        Self::new(ProgressEventType::AgentStarted, agent).with_metadata("agent", agent)
    }

    /// An agent stage completed.
    pub fn agent_completed(agent: &str, elapsed_ms: u64, success: bool) -> Self {
        Self::new(ProgressEventType::AgentCompleted, agent)
            .with_metadata("agent", agent)
            .with_metadata("elapsed_ms", elapsed_ms as i64)
            .with_metadata("success", success)
    }

    /// Pipeline completed.
    pub fn pipeline_completed(elapsed_ms: u64) -> Self {
        Self::new(ProgressEventType::PipelineCompleted, "pipeline completed")
            .with_metadata("elapsed_ms", elapsed_ms as i64)
    }

    /// Pipeline failed with an error message.
    pub fn pipeline_failed(error: impl Into<String>, elapsed_ms: u64) -> Self {
        Self::new(ProgressEventType::PipelineFailed, error)
            .with_metadata("elapsed_ms", elapsed_ms as i64)
    }

    /// The persisted claim card is ready.
    pub fn claim_card_ready(card: Value) -> Self {
        Self::new(ProgressEventType::ClaimCardReady, "claim card ready")
            .with_metadata("claim_card", card)
    }

    /// Heartbeat.
    pub fn keepalive() -> Self {
        Self::new(ProgressEventType::Keepalive, "")
    }

    /// Check if this is a terminal pipeline event.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.event_type,
            ProgressEventType::PipelineCompleted | ProgressEventType::PipelineFailed
        )
    }
}

/// Per-session progress bus.
///
/// A mapping from session id to a single-subscriber channel. Subscribers may
/// appear before or after the session starts emitting; `emit` is fire-and-
/// forget and never blocks the emitting task.
#[derive(Default)]
pub struct ProgressBus {
    sessions: Mutex<HashMap<String, mpsc::Sender<ProgressEvent>>>,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a session, replacing any previous subscriber.
    pub fn subscribe(&self, session_id: impl Into<String>) -> mpsc::Receiver<ProgressEvent> {
        let (tx, rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
        let mut sessions = self.sessions.lock().expect("progress bus lock poisoned");
        sessions.insert(session_id.into(), tx);
        rx
    }

    /// Remove a session's subscriber.
    pub fn unsubscribe(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().expect("progress bus lock poisoned");
        sessions.remove(session_id);
    }

    /// Emit an event for a session. Returns true if a subscriber received it.
    ///
    /// Events for unknown sessions are dropped. A full channel also drops the
    /// event; a closed channel removes the stale subscriber entry.
    pub fn emit(&self, session_id: &str, event: ProgressEvent) -> bool {
        let mut sessions = self.sessions.lock().expect("progress bus lock poisoned");
        let Some(tx) = sessions.get(session_id) else {
            return false;
        };

        match tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => false,
            Err(mpsc::error::TrySendError::Closed(_)) => {
                sessions.remove(session_id);
                false
            }
        }
    }

    /// Number of sessions with a live subscriber.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().expect("progress bus lock poisoned").len()
    }
}

/// Handle that emits all events for one session.
///
/// Cloneable; shared by the router, orchestrator, and agents of a request.
#[derive(Clone)]
pub struct SessionEmitter {
    bus: std::sync::Arc<ProgressBus>,
    session_id: String,
}

impl SessionEmitter {
    pub fn new(bus: std::sync::Arc<ProgressBus>, session_id: impl Into<String>) -> Self {
        Self {
            bus,
            session_id: session_id.into(),
        }
    }

    /// The session this emitter belongs to.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Emit an event for this session.
    pub fn emit(&self, event: ProgressEvent) -> bool {
        self.bus.emit(&self.session_id, event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_event_serializes_screaming_snake_case() {
        let event = ProgressEvent::routing_completed("EXACT_MATCH", 42);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "ROUTING_COMPLETED");
        assert_eq!(json["metadata"]["mode"], "EXACT_MATCH");
        assert_eq!(json["metadata"]["elapsed_ms"], 42);
    }

    #[test]
    fn test_agent_completed_metadata() {
        let event = ProgressEvent::agent_completed("source_checker", 1200, true);
        assert_eq!(
            event.get_metadata("agent"),
            Some(&Value::String("source_checker".into()))
        );
        assert_eq!(event.get_metadata("success"), Some(&Value::Bool(true)));
    }

    #[tokio::test]
    async fn test_subscribe_then_emit_delivers() {
        let bus = ProgressBus::new();
        let mut rx = bus.subscribe("session-1");

        assert!(bus.emit("session-1", ProgressEvent::pipeline_started("q")));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, ProgressEventType::PipelineStarted);
    }

    #[tokio::test]
    async fn test_emit_without_subscriber_drops() {
        let bus = ProgressBus::new();
        assert!(!bus.emit("nobody", ProgressEvent::keepalive()));
    }

    #[tokio::test]
    async fn test_late_subscriber_loses_early_events() {
        let bus = ProgressBus::new();
        bus.emit("session-1", ProgressEvent::pipeline_started("early"));

        let mut rx = bus.subscribe("session-1");
        assert!(bus.emit("session-1", ProgressEvent::pipeline_completed(5)));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, ProgressEventType::PipelineCompleted);
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_cleaned_up() {
        let bus = ProgressBus::new();
        let rx = bus.subscribe("session-1");
        drop(rx);

        assert!(!bus.emit("session-1", ProgressEvent::keepalive()));
        assert_eq!(bus.session_count(), 0);
    }

    #[tokio::test]
    async fn test_session_emitter_routes_to_its_session() {
        let bus = Arc::new(ProgressBus::new());
        let mut rx = bus.subscribe("s1");
        let emitter = SessionEmitter::new(bus.clone(), "s1");

        emitter.emit(ProgressEvent::agent_started("writer"));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, ProgressEventType::AgentStarted);
        assert_eq!(event.content, "writer");
    }

    #[test]
    fn test_terminal_events() {
        assert!(ProgressEvent::pipeline_completed(1).is_terminal());
        assert!(ProgressEvent::pipeline_failed("err", 1).is_terminal());
        assert!(!ProgressEvent::keepalive().is_terminal());
    }
}
