//! Event sink trait and implementations.

use super::PipelineEvent;
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn, Level};

/// Receives pipeline lifecycle events.
///
/// Sinks must not fail the run: errors inside a sink are logged and dropped.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Handles one event.
    async fn emit(&self, event: &PipelineEvent);
}

/// A sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: &PipelineEvent) {}
}

/// A sink that logs events through `tracing`.
///
/// Failure events are always logged at `WARN`.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a logging sink with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    /// The level non-failure events are logged at.
    #[must_use]
    pub fn level(&self) -> Level {
        self.level
    }

    fn log_event(&self, event: &PipelineEvent) {
        let event_type = event.event_type();
        let stage = event.stage().unwrap_or("-");

        if matches!(
            event,
            PipelineEvent::StageFailed { .. } | PipelineEvent::PipelineFailed { .. }
        ) {
            warn!(event_type, stage, payload = %event.to_payload(), "Event: {}", event_type);
            return;
        }

        if self.level == Level::DEBUG {
            debug!(event_type, stage, payload = %event.to_payload(), "Event: {}", event_type);
        } else {
            info!(event_type, stage, "Event: {}", event_type);
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: &PipelineEvent) {
        self.log_event(event);
    }
}

/// A sink that keeps every event in memory, for tests and reports.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<PipelineEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.read().clone()
    }

    /// Returns the collected event types in order.
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.read().iter().map(PipelineEvent::event_type).collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns events whose type starts with `type_prefix`.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<PipelineEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type().starts_with(type_prefix))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: &PipelineEvent) {
        self.events.write().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(stage: &str) -> PipelineEvent {
        PipelineEvent::StageStarted {
            stage: stage.to_string(),
            index: 0,
        }
    }

    #[tokio::test]
    async fn test_noop_and_logging_sinks() {
        NoOpEventSink.emit(&started("a")).await;
        LoggingEventSink::default().emit(&started("a")).await;
        LoggingEventSink::debug()
            .emit(&PipelineEvent::StageFailed {
                stage: "a".to_string(),
                kind: "ProviderError".to_string(),
                error: "down".to_string(),
            })
            .await;
    }

    #[test]
    fn test_logging_sink_levels() {
        assert_eq!(LoggingEventSink::default().level(), Level::INFO);
        assert_eq!(LoggingEventSink::debug().level(), Level::DEBUG);
    }

    #[tokio::test]
    async fn test_collecting_sink() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit(&started("search_recipes")).await;
        sink.emit(&PipelineEvent::PipelineCompleted {
            pipeline: "recipe".to_string(),
            duration_ms: 1,
        })
        .await;

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.event_types(), vec!["stage.started", "pipeline.completed"]);
        assert_eq!(sink.events_of_type("stage.").len(), 1);

        sink.clear();
        assert!(sink.is_empty());
    }
}
