//! Node model: the unit of scheduled work inside a workflow's DAG.
//!
//! A [`Node`] is the in-memory, fully-typed representation used by the
//! scheduler and management API. The store's row format
//! ([`NodeRow`]) keeps the status column separate from the serialized
//! node body so the status is always readable without decoding the blob,
//! and so the blob's schema can evolve independently of the status
//! column that the readiness query depends on.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashSet;

use crate::Status;

/// A single attempt record appended to a task's history. Append-only: the
/// store never truncates or rewrites `results`, only appends.
///
/// `status` is stored as a raw `i32` rather than [`Status`] so a result
/// written by a newer executor with an unknown status value still
/// round-trips instead of failing to deserialize.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TaskResult {
    pub status: i32,
    pub summary: String,
    pub output: String,
    pub artifacts: std::collections::BTreeMap<String, String>,
}

/// A task assigned to a node: a goal plus whatever upstream task ids it
/// declares a dependency on, plus the append-only history of attempts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AssignedTask {
    pub task_id: String,
    pub goal: String,
    pub dependency_ids: Vec<String>,
    pub results: Vec<TaskResult>,
    pub subtasks: Vec<AssignedTask>,
}

/// Opaque execution policy carried through to the dispatch client but
/// never interpreted by the core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ExecutionOptions {
    pub timeout_seconds: Option<u64>,
    pub max_retries: Option<u32>,
}

/// A node in a workflow's DAG.
///
/// Every field but `node_id`/`agent`/`parent_ids` defaults on
/// deserialization: `child_ids` is always re-derived server-side
/// (`derive_child_ids`), `edits` is an audit trail a client payload never
/// carries, and a freshly declared node has no task history yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub node_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parent_ids: Vec<String>,
    #[serde(default)]
    pub child_ids: Vec<String>,
    pub agent: String,
    #[serde(default)]
    pub execution_options: ExecutionOptions,
    #[serde(default)]
    pub assigned_task: AssignedTask,
    #[serde(default)]
    pub all_tasks: Vec<AssignedTask>,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub edits: Vec<NodeEdit>,
    #[serde(default)]
    pub is_final: bool,
}

impl Node {
    pub fn new(node_id: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            description: String::new(),
            parent_ids: Vec::new(),
            child_ids: Vec::new(),
            agent: agent.into(),
            execution_options: ExecutionOptions::default(),
            assigned_task: AssignedTask::default(),
            all_tasks: Vec::new(),
            status: Status::Unknown,
            edits: Vec::new(),
            is_final: false,
        }
    }

    pub fn with_parents(mut self, parent_ids: impl IntoIterator<Item = String>) -> Self {
        self.parent_ids = parent_ids.into_iter().collect();
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    /// True when this node is in [`Status::Unknown`]. Readiness also
    /// requires every parent to be `PASS`, which only the store (with
    /// visibility into the edge table) can evaluate; see
    /// [`crate::db::repositories::node_repo::NodeRepository::find_ready_nodes`].
    pub fn is_claimable(&self) -> bool {
        self.status.is_unknown()
    }
}

/// The kind of mutation a [`NodeEdit`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeEditType {
    Insert,
    Update,
    Delete,
}

/// One unit of an atomic batch applied via
/// [`crate::db::repositories::node_repo::NodeRepository::apply_node_edits`].
/// For `Delete`, only `node_id` need be populated on `node`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeEdit {
    pub edit_type: NodeEditType,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub description: String,
    pub node: Node,
}

impl NodeEdit {
    pub fn insert(node: Node, description: impl Into<String>) -> Self {
        Self {
            edit_type: NodeEditType::Insert,
            timestamp: chrono::Utc::now(),
            description: description.into(),
            node,
        }
    }

    pub fn update(node: Node, description: impl Into<String>) -> Self {
        Self {
            edit_type: NodeEditType::Update,
            timestamp: chrono::Utc::now(),
            description: description.into(),
            node,
        }
    }

    pub fn delete(node_id: impl Into<String>, description: impl Into<String>) -> Self {
        let mut node = Node::new(node_id, "");
        node.status = Status::Unknown;
        Self {
            edit_type: NodeEditType::Delete,
            timestamp: chrono::Utc::now(),
            description: description.into(),
            node,
        }
    }
}

/// Row shape persisted for a node. `status` is the column the readiness
/// query filters on and is authoritative over whatever status is embedded
/// in `node_blob` on read (see module docs).
#[derive(Debug, Clone, FromRow)]
pub struct NodeRow {
    pub workflow_id: String,
    pub id: String,
    pub status: i32,
    pub node_blob: String,
    pub all_tasks_blob: String,
    pub edits_blob: String,
    pub created_at: String,
    pub updated_at: String,
}

/// The node body serialized into `node_blob`: everything except
/// `all_tasks`/`edits`, which get their own blobs (see
/// [`NodeRepository::serialize_node`][crate::db::repositories::node_repo::NodeRepository::serialize_node]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct NodeBody {
    pub description: String,
    pub parent_ids: Vec<String>,
    pub child_ids: Vec<String>,
    pub agent: String,
    pub execution_options: ExecutionOptions,
    pub assigned_task: AssignedTask,
    pub is_final: bool,
}

impl NodeRow {
    /// Deserialize the three blobs and overlay the authoritative status
    /// column, producing the typed [`Node`] callers work with.
    pub fn into_node(self) -> crate::Result<Node> {
        let body: NodeBody = serde_json::from_str(&self.node_blob)?;
        let all_tasks: Vec<AssignedTask> = serde_json::from_str(&self.all_tasks_blob)?;
        let edits: Vec<NodeEdit> = serde_json::from_str(&self.edits_blob)?;
        let status = Status::from_i32(self.status)
            .ok_or_else(|| crate::EngineError::Invalid(format!("unknown status {}", self.status)))?;

        Ok(Node {
            node_id: self.id,
            description: body.description,
            parent_ids: body.parent_ids,
            child_ids: body.child_ids,
            agent: body.agent,
            execution_options: body.execution_options,
            assigned_task: body.assigned_task,
            all_tasks,
            status,
            edits,
            is_final: body.is_final,
        })
    }
}

/// Derive the reverse edge projection (child_ids) for a set of nodes
/// sharing a workflow, from their `parent_ids`. Used when materializing a
/// `Workflow` for read so `child_ids` never drifts from the edge table.
pub fn derive_child_ids(nodes: &mut [Node]) {
    let mut children: std::collections::HashMap<String, HashSet<String>> =
        std::collections::HashMap::new();
    for node in nodes.iter() {
        for parent in &node.parent_ids {
            children
                .entry(parent.clone())
                .or_default()
                .insert(node.node_id.clone());
        }
    }
    for node in nodes.iter_mut() {
        let mut child_ids: Vec<String> = children
            .remove(&node.node_id)
            .unwrap_or_default()
            .into_iter()
            .collect();
        child_ids.sort();
        node.child_ids = child_ids;
    }
}
