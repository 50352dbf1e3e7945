//! Workflow execution engine: a DAG scheduler backed by a transactional
//! state store.
//!
//! A workflow is a directed acyclic graph of nodes. The engine discovers
//! nodes whose dependencies are satisfied, dispatches them to an external
//! executor over an opaque RPC contract, and persists the result -
//! including any structural edits to the graph the executor requests -
//! atomically. See [`scheduler`] for the dispatch loop and [`db`] for the
//! storage layer.

pub mod auth;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod events;
pub mod proto;
pub mod proto_conv;
pub mod scheduler;
pub mod services;
pub mod version;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the engine's core (store, scheduler, management API).
///
/// Mirrors the failure taxonomy every component maps into: storage faults
/// are retriable, `NotFound`/`Constraint`/`Invalid` are caller mistakes,
/// `InfraError`/`TaskError` describe a dispatch outcome rather than an
/// engine bug, and `Auth` is never downgraded to an internal error.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("infrastructure error dispatching node: {0}")]
    InfraError(String),

    #[error("task error: {0}")]
    TaskError(String),

    #[error("authentication/authorization error: {0}")]
    Auth(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl From<db::DatabaseError> for EngineError {
    fn from(err: db::DatabaseError) -> Self {
        match err {
            db::DatabaseError::NotFound(msg) => EngineError::NotFound(msg),
            db::DatabaseError::ConstraintViolation(msg) => EngineError::Constraint(msg),
            other => EngineError::Storage(other.to_string()),
        }
    }
}

/// Every repository maps a raw `sqlx::Error` through [`db::DatabaseError`]
/// first, so the fine-grained NotFound/ConstraintViolation distinction it
/// classifies sqlx errors into actually reaches callers instead of
/// collapsing to a single opaque `Storage` variant.
impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        db::DatabaseError::from(err).into()
    }
}

/// Execution status of a node. Ordered roughly by where it sits in the
/// lifecycle; the numeric values are part of the wire contract (they are
/// what `services/workflow.rs` inspects to classify node events), so new
/// variants must be appended, never inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(i32)]
pub enum Status {
    #[default]
    Unknown = 0,
    Pass = 1,
    Fail = 2,
    Skipped = 3,
    Filtered = 4,
    TaskError = 5,
    InfraError = 6,
    Timeout = 7,
    Crash = 8,
    Blocked = 9,
    Running = 10,
}

impl Status {
    /// Terminal statuses never transition again without operator intervention.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Status::Pass
                | Status::Fail
                | Status::Skipped
                | Status::Filtered
                | Status::TaskError
                | Status::InfraError
                | Status::Timeout
                | Status::Crash
        )
    }

    pub fn is_running(self) -> bool {
        matches!(self, Status::Running)
    }

    /// A node is ready for dispatch only while its status is `Unknown`.
    pub fn is_unknown(self) -> bool {
        matches!(self, Status::Unknown)
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        Some(match value {
            0 => Status::Unknown,
            1 => Status::Pass,
            2 => Status::Fail,
            3 => Status::Skipped,
            4 => Status::Filtered,
            5 => Status::TaskError,
            6 => Status::InfraError,
            7 => Status::Timeout,
            8 => Status::Crash,
            9 => Status::Blocked,
            10 => Status::Running,
            _ => return None,
        })
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Status::Unknown => "UNKNOWN",
            Status::Pass => "PASS",
            Status::Fail => "FAIL",
            Status::Skipped => "SKIPPED",
            Status::Filtered => "FILTERED",
            Status::TaskError => "TASK_ERROR",
            Status::InfraError => "INFRA_ERROR",
            Status::Timeout => "TIMEOUT",
            Status::Crash => "CRASH",
            Status::Blocked => "BLOCKED",
            Status::Running => "RUNNING",
        };
        write!(f, "{}", name)
    }
}

/// Get version information.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(Status::Pass.is_terminal());
        assert!(Status::InfraError.is_terminal());
        assert!(!Status::Unknown.is_terminal());
        assert!(!Status::Running.is_terminal());
        assert!(!Status::Blocked.is_terminal());
    }

    #[test]
    fn status_roundtrip_through_i32() {
        for raw in 0..=10 {
            let status = Status::from_i32(raw).expect("known status");
            assert_eq!(status as i32, raw);
        }
        assert!(Status::from_i32(99).is_none());
    }

    #[test]
    fn engine_error_from_database_not_found() {
        let db_err = db::DatabaseError::not_found("node missing");
        let engine_err: EngineError = db_err.into();
        assert!(matches!(engine_err, EngineError::NotFound(_)));
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
