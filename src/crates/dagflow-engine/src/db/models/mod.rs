//! Database models.
//!
//! Core data models for persistent storage in the engine's database. All
//! timestamp fields are stored as ISO8601 strings (TEXT in SQLite) due to
//! sqlx and SQLite type limitations with `chrono::DateTime<Utc>`.

pub mod configuration;
pub mod node;
pub mod workflow;

pub use configuration::Configuration;
pub use node::{AssignedTask, ExecutionOptions, Node, NodeEdit, NodeEditType, NodeRow, TaskResult};
pub use workflow::{Workflow, WorkflowRow};
