//! Workflow model for database persistence.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::node::Node;
use crate::Status;

/// Row shape persisted for a workflow. Unlike the teacher crate this was
/// adapted from, a workflow does not carry a `definition` blob - its
/// structure lives entirely in the `nodes`/`node_edges` tables, and is
/// materialized onto this row only when returned to a caller.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: i32,
    pub created_at: String,
    pub updated_at: String,
}

/// A workflow together with its materialized nodes, as returned by
/// `GetWorkflow`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: Status,
    pub nodes: Vec<Node>,
    pub created_at: String,
    pub updated_at: String,
}

impl Workflow {
    pub fn new(id: String, name: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id,
            name,
            description: None,
            status: Status::Unknown,
            nodes: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_nodes(mut self, nodes: Vec<Node>) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn from_row(row: WorkflowRow, nodes: Vec<Node>) -> crate::Result<Self> {
        let status = Status::from_i32(row.status)
            .ok_or_else(|| crate::EngineError::Invalid(format!("unknown status {}", row.status)))?;

        Ok(Self {
            id: row.id,
            name: row.name,
            description: row.description,
            status,
            nodes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn is_completed(&self) -> bool {
        self.status == Status::Pass
    }
}
