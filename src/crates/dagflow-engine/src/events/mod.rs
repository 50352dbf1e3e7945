//! Event hook (C5): a best-effort observability feed over workflow and
//! node lifecycle transitions.
//!
//! Grounded on the original Go `api/events.go` (`EventType` consts,
//! `Event` struct, `EventLogger` interface, `StdoutEventLogger` and a
//! Postgres-backed logger). Emission is fire-and-forget: a logging
//! failure is traced but never bubbles up and never blocks or rolls back
//! the state change that triggered it (see `SPEC_FULL.md` §4.5).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::connection::DatabasePool;

/// The kind of lifecycle transition an [`Event`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    WorkflowCreated,
    WorkflowUpdated,
    WorkflowCompleted,
    WorkflowDispatched,
    NodeDispatched,
    NodeUpdated,
    NodeCompleted,
}

impl EventType {
    fn as_str(self) -> &'static str {
        match self {
            EventType::WorkflowCreated => "WORKFLOW_CREATED",
            EventType::WorkflowUpdated => "WORKFLOW_UPDATED",
            EventType::WorkflowCompleted => "WORKFLOW_COMPLETED",
            EventType::WorkflowDispatched => "WORKFLOW_DISPATCHED",
            EventType::NodeDispatched => "NODE_DISPATCHED",
            EventType::NodeUpdated => "NODE_UPDATED",
            EventType::NodeCompleted => "NODE_COMPLETED",
        }
    }
}

/// One emitted event. `payload` is a small, serializable free-form blob
/// rather than the whole workflow/node - keeping an event cheap to log
/// and cheap to fan out to an external sink later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub workflow_id: String,
    pub node_id: Option<String>,
    pub payload: serde_json::Value,
}

impl Event {
    pub fn workflow_created(workflow_id: impl Into<String>) -> Self {
        Self::new(EventType::WorkflowCreated, workflow_id, None, serde_json::Value::Null)
    }

    pub fn workflow_updated(workflow_id: impl Into<String>) -> Self {
        Self::new(EventType::WorkflowUpdated, workflow_id, None, serde_json::Value::Null)
    }

    pub fn workflow_completed(workflow_id: impl Into<String>) -> Self {
        Self::new(EventType::WorkflowCompleted, workflow_id, None, serde_json::Value::Null)
    }

    /// Fired the first time any entry node (no parents) of a workflow is
    /// claimed for dispatch - the workflow-level counterpart to
    /// `WorkflowCompleted` firing off a final node's `PASS`.
    pub fn workflow_dispatched(workflow_id: impl Into<String>) -> Self {
        Self::new(EventType::WorkflowDispatched, workflow_id, None, serde_json::Value::Null)
    }

    pub fn node_dispatched(workflow_id: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self::new(EventType::NodeDispatched, workflow_id, Some(node_id.into()), serde_json::Value::Null)
    }

    pub fn node_updated(workflow_id: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self::new(EventType::NodeUpdated, workflow_id, Some(node_id.into()), serde_json::Value::Null)
    }

    pub fn node_completed(workflow_id: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self::new(EventType::NodeCompleted, workflow_id, Some(node_id.into()), serde_json::Value::Null)
    }

    fn new(
        event_type: EventType,
        workflow_id: impl Into<String>,
        node_id: Option<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            workflow_id: workflow_id.into(),
            node_id,
            payload,
        }
    }
}

/// A sink for emitted events. Implementations must not panic and should
/// treat their own failures as non-fatal to the caller.
pub trait EventLogger: Send + Sync {
    fn log_event(&self, event: Event);
}

/// Logs every event as a single line of JSON to stdout. Cheap, always
/// available, and the default when no durable sink is configured.
pub struct StdoutEventLogger;

impl EventLogger for StdoutEventLogger {
    fn log_event(&self, event: Event) {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!("failed to serialize event for stdout: {}", e),
        }
    }
}

/// Writes every event as a row in the `events` table. Failures are
/// logged and swallowed: a down database must never block dispatch.
pub struct DbEventLogger {
    pool: DatabasePool,
}

impl DbEventLogger {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn insert(&self, event: &Event) -> Result<(), sqlx::Error> {
        let payload = serde_json::to_string(&event.payload).unwrap_or_else(|_| "null".to_string());
        sqlx::query(
            "INSERT INTO events (event_type, timestamp, workflow_id, node_id, payload)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(event.event_type.as_str())
        .bind(event.timestamp.to_rfc3339())
        .bind(&event.workflow_id)
        .bind(&event.node_id)
        .bind(&payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

impl EventLogger for DbEventLogger {
    /// Spawns the insert onto the runtime rather than awaiting it inline:
    /// `log_event` is called from synchronous call sites in the dispatch
    /// pipeline that should not block on event persistence.
    fn log_event(&self, event: Event) {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            let logger = DbEventLogger { pool };
            if let Err(e) = logger.insert(&event).await {
                tracing::warn!("failed to persist event {:?}: {}", event.event_type, e);
            }
        });
    }
}

/// Fans an event out to every logger in the list, continuing past any
/// individual logger's failure.
pub struct FanOutEventLogger {
    loggers: Vec<Box<dyn EventLogger>>,
}

impl FanOutEventLogger {
    pub fn new(loggers: Vec<Box<dyn EventLogger>>) -> Self {
        Self { loggers }
    }
}

impl EventLogger for FanOutEventLogger {
    fn log_event(&self, event: Event) {
        for logger in &self.loggers {
            logger.log_event(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingLogger {
        events: Arc<Mutex<Vec<EventType>>>,
    }

    impl EventLogger for RecordingLogger {
        fn log_event(&self, event: Event) {
            self.events.lock().unwrap().push(event.event_type);
        }
    }

    #[test]
    fn event_constructors_set_expected_type() {
        let e = Event::node_completed("w1", "n1");
        assert_eq!(e.event_type, EventType::NodeCompleted);
        assert_eq!(e.workflow_id, "w1");
        assert_eq!(e.node_id.as_deref(), Some("n1"));
    }

    #[test]
    fn fan_out_logger_reaches_every_sink() {
        let a = RecordingLogger::default();
        let b = RecordingLogger::default();
        let fan_out = FanOutEventLogger::new(vec![Box::new(a.clone()), Box::new(b.clone())]);

        fan_out.log_event(Event::workflow_created("w1"));

        assert_eq!(a.events.lock().unwrap().len(), 1);
        assert_eq!(b.events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn db_event_logger_persists_row() {
        let pool = sqlx::sqlite::SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_type TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                workflow_id TEXT NOT NULL,
                node_id TEXT,
                payload TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .unwrap();

        let logger = DbEventLogger::new(pool.clone());
        logger.insert(&Event::workflow_created("w1")).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
