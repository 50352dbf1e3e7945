//! Node repository: nodes, edges, and the atomic edit-batch machinery.
//!
//! Grounded on the original Go `postgres_state_manager.go`'s
//! `applyInsertEdit`/`applyUpdateEdit`/`applyDeleteEdit` /
//! `replaceNodeEdges` / `batchInsertEdges` shape, reworked onto sqlx
//! transactions against SQLite. The status column on `nodes` is always
//! the source of truth (see [`crate::db::models::node::NodeRow`]); the
//! edge table is rebuilt from a node's `parent_ids` on every insert or
//! update rather than diffed, which keeps `replace_node_edges` a single
//! delete-then-batch-insert instead of a parent/child set comparison.

use chrono::Utc;
use sqlx::Sqlite;

use crate::db::connection::DatabasePool;
use crate::db::models::node::{Node, NodeBody, NodeEdit, NodeEditType, NodeRow};
use crate::{EngineError, Result, Status};

pub struct NodeRepository;

impl NodeRepository {
    /// Serialize a node into its three persisted blobs. `all_tasks` and
    /// `edits` are split out from the main body so each can evolve its
    /// own schema independently (see module docs on `SPEC_FULL.md`'s
    /// serialization policy).
    pub(crate) fn serialize_node(node: &Node) -> Result<(String, String, String)> {
        let body = NodeBody {
            description: node.description.clone(),
            parent_ids: node.parent_ids.clone(),
            child_ids: node.child_ids.clone(),
            agent: node.agent.clone(),
            execution_options: node.execution_options.clone(),
            assigned_task: node.assigned_task.clone(),
            is_final: node.is_final,
        };
        let node_blob = serde_json::to_string(&body)?;
        let all_tasks_blob = serde_json::to_string(&node.all_tasks)?;
        let edits_blob = serde_json::to_string(&node.edits)?;
        Ok((node_blob, all_tasks_blob, edits_blob))
    }

    /// Insert a single node's row. Does not insert edges; callers that
    /// want edges populated call [`Self::replace_node_edges`]
    /// separately within the same transaction (see [`Self::create_node`]
    /// and [`Self::apply_node_edits`]).
    async fn insert_node_row(
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        workflow_id: &str,
        node: &Node,
    ) -> Result<()> {
        let (node_blob, all_tasks_blob, edits_blob) = Self::serialize_node(node)?;
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO nodes (workflow_id, id, status, node_blob, all_tasks_blob, edits_blob, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(workflow_id)
        .bind(&node.node_id)
        .bind(node.status as i32)
        .bind(&node_blob)
        .bind(&all_tasks_blob)
        .bind(&edits_blob)
        .bind(&now)
        .bind(&now)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_insert_err(e, &node.node_id))?;
        Ok(())
    }

    /// Replace the edge set touching `node_id`: delete every edge where
    /// it appears as parent or child, then batch-reinsert from
    /// `node.parent_ids`. Mirrors `replaceNodeEdges` in the Go
    /// implementation.
    async fn replace_node_edges(
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        workflow_id: &str,
        node: &Node,
    ) -> Result<()> {
        sqlx::query(
            "DELETE FROM node_edges WHERE workflow_id = ? AND (parent_node_id = ? OR child_node_id = ?)",
        )
        .bind(workflow_id)
        .bind(&node.node_id)
        .bind(&node.node_id)
        .execute(&mut **tx)
        .await?;

        if node.parent_ids.is_empty() {
            return Ok(());
        }

        // A single parameterized multi-row INSERT, mirroring
        // `batchInsertEdges` in the Go implementation.
        let mut qb = sqlx::QueryBuilder::new(
            "INSERT INTO node_edges (workflow_id, parent_node_id, child_node_id) ",
        );
        qb.push_values(&node.parent_ids, |mut b, parent_id| {
            b.push_bind(workflow_id)
                .push_bind(parent_id)
                .push_bind(&node.node_id);
        });
        qb.build()
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    /// Reject a status update that would move a node from a terminal
    /// status back to a non-terminal one (the default the open question
    /// in `SPEC_FULL.md` resolves to).
    fn check_transition(current: Status, next: Status) -> Result<()> {
        if current.is_terminal() && !next.is_terminal() {
            return Err(EngineError::Invalid(format!(
                "cannot move node from terminal status {} back to non-terminal status {}",
                current, next
            )));
        }
        Ok(())
    }

    /// Insert a single node (plus its edges) in its own transaction.
    pub async fn create_node(pool: &DatabasePool, workflow_id: &str, node: &Node) -> Result<()> {
        let mut tx = pool.begin().await?;

        Self::insert_node_row(&mut tx, workflow_id, node).await?;
        Self::replace_node_edges(&mut tx, workflow_id, node).await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_node(pool: &DatabasePool, workflow_id: &str, node_id: &str) -> Result<Node> {
        let row = sqlx::query_as::<_, NodeRow>(
            "SELECT workflow_id, id, status, node_blob, all_tasks_blob, edits_blob, created_at, updated_at
             FROM nodes WHERE workflow_id = ? AND id = ?",
        )
        .bind(workflow_id)
        .bind(node_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| {
            EngineError::NotFound(format!("node {} not found in workflow {}", node_id, workflow_id))
        })?;

        row.into_node()
    }

    pub async fn list_nodes(pool: &DatabasePool, workflow_id: &str) -> Result<Vec<Node>> {
        let rows = sqlx::query_as::<_, NodeRow>(
            "SELECT workflow_id, id, status, node_blob, all_tasks_blob, edits_blob, created_at, updated_at
             FROM nodes WHERE workflow_id = ?",
        )
        .bind(workflow_id)
        .fetch_all(pool)
        .await?;

        rows.into_iter().map(|r| r.into_node()).collect()
    }

    /// Replace the row identified by `(workflow_id, node.node_id)` and
    /// rewrite its edges. Fails with `NotFound` if no such row exists.
    pub async fn update_node(pool: &DatabasePool, workflow_id: &str, node: &Node) -> Result<()> {
        let mut tx = pool.begin().await?;

        let existing_status: Option<i32> = sqlx::query_scalar(
            "SELECT status FROM nodes WHERE workflow_id = ? AND id = ?",
        )
        .bind(workflow_id)
        .bind(&node.node_id)
        .fetch_optional(&mut *tx)
        .await?;

        let existing_status = existing_status.ok_or_else(|| {
            EngineError::NotFound(format!(
                "node {} not found in workflow {}",
                node.node_id, workflow_id
            ))
        })?;
        let current = Status::from_i32(existing_status)
            .ok_or_else(|| EngineError::Invalid(format!("unknown stored status {}", existing_status)))?;
        Self::check_transition(current, node.status)?;

        let (node_blob, all_tasks_blob, edits_blob) = Self::serialize_node(node)?;
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE nodes SET status = ?, node_blob = ?, all_tasks_blob = ?, edits_blob = ?, updated_at = ?
             WHERE workflow_id = ? AND id = ?",
        )
        .bind(node.status as i32)
        .bind(&node_blob)
        .bind(&all_tasks_blob)
        .bind(&edits_blob)
        .bind(&now)
        .bind(workflow_id)
        .bind(&node.node_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound(format!(
                "node {} not found in workflow {}",
                node.node_id, workflow_id
            )));
        }

        Self::replace_node_edges(&mut tx, workflow_id, node).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Apply a batch of edits atomically (I5): any failure rolls back
    /// the whole batch. Node inserts are applied in a first pass, before
    /// any edge is written, so a later INSERT's id may be referenced as
    /// a parent by an earlier INSERT in the same batch (see
    /// `SPEC_FULL.md` §9 on cyclic-insert tolerance).
    pub async fn apply_node_edits(
        pool: &DatabasePool,
        workflow_id: &str,
        edits: &[NodeEdit],
    ) -> Result<()> {
        let mut tx = pool.begin().await?;

        for edit in edits {
            if matches!(edit.edit_type, NodeEditType::Insert) {
                Self::insert_node_row(&mut tx, workflow_id, &edit.node).await?;
            }
        }

        for edit in edits {
            match edit.edit_type {
                NodeEditType::Insert => {
                    Self::replace_node_edges(&mut tx, workflow_id, &edit.node).await?;
                }
                NodeEditType::Update => {
                    let existing_status: Option<i32> = sqlx::query_scalar(
                        "SELECT status FROM nodes WHERE workflow_id = ? AND id = ?",
                    )
                    .bind(workflow_id)
                    .bind(&edit.node.node_id)
                    .fetch_optional(&mut *tx)
                    .await?;

                    let existing_status = existing_status.ok_or_else(|| {
                        EngineError::NotFound(format!(
                            "node {} not found in workflow {}",
                            edit.node.node_id, workflow_id
                        ))
                    })?;
                    let current = Status::from_i32(existing_status).ok_or_else(|| {
                        EngineError::Invalid(format!("unknown stored status {}", existing_status))
                    })?;
                    Self::check_transition(current, edit.node.status)?;

                    let (node_blob, all_tasks_blob, edits_blob) =
                        Self::serialize_node(&edit.node)?;
                    let now = Utc::now().to_rfc3339();
                    sqlx::query(
                        "UPDATE nodes SET status = ?, node_blob = ?, all_tasks_blob = ?, edits_blob = ?, updated_at = ?
                         WHERE workflow_id = ? AND id = ?",
                    )
                    .bind(edit.node.status as i32)
                    .bind(&node_blob)
                    .bind(&all_tasks_blob)
                    .bind(&edits_blob)
                    .bind(&now)
                    .bind(workflow_id)
                    .bind(&edit.node.node_id)
                    .execute(&mut *tx)
                    .await?;

                    Self::replace_node_edges(&mut tx, workflow_id, &edit.node).await?;
                }
                NodeEditType::Delete => {
                    sqlx::query(
                        "DELETE FROM node_edges WHERE workflow_id = ? AND (parent_node_id = ? OR child_node_id = ?)",
                    )
                    .bind(workflow_id)
                    .bind(&edit.node.node_id)
                    .bind(&edit.node.node_id)
                    .execute(&mut *tx)
                    .await?;

                    let result = sqlx::query("DELETE FROM nodes WHERE workflow_id = ? AND id = ?")
                        .bind(workflow_id)
                        .bind(&edit.node.node_id)
                        .execute(&mut *tx)
                        .await?;

                    if result.rows_affected() == 0 {
                        return Err(EngineError::NotFound(format!(
                            "node {} not found in workflow {}",
                            edit.node.node_id, workflow_id
                        )));
                    }
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// A node is ready iff its status is `UNKNOWN` and every parent (via
    /// the edge table) has status `PASS`. Expressed as a single query so
    /// readiness is a pure function of committed state at query time;
    /// the projected `workflow_id` is what lets the scheduler avoid the
    /// original implementation's `"unknown_workflow"` placeholder bug.
    pub async fn find_ready_nodes(pool: &DatabasePool) -> Result<Vec<(String, Node)>> {
        let rows = sqlx::query_as::<_, NodeRow>(
            "SELECT n.workflow_id, n.id, n.status, n.node_blob, n.all_tasks_blob, n.edits_blob, n.created_at, n.updated_at
             FROM nodes n
             WHERE n.status = ?
             AND NOT EXISTS (
                 SELECT 1 FROM node_edges e
                 JOIN nodes p ON p.workflow_id = e.workflow_id AND p.id = e.parent_node_id
                 WHERE e.workflow_id = n.workflow_id AND e.child_node_id = n.id AND p.status != ?
             )",
        )
        .bind(Status::Unknown as i32)
        .bind(Status::Pass as i32)
        .fetch_all(pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let workflow_id = row.workflow_id.clone();
                row.into_node().map(|node| (workflow_id, node))
            })
            .collect()
    }
}

fn map_insert_err(err: sqlx::Error, node_id: &str) -> EngineError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.kind() {
            sqlx::error::ErrorKind::UniqueViolation => {
                return EngineError::Constraint(format!("node {} already exists", node_id));
            }
            sqlx::error::ErrorKind::ForeignKeyViolation => {
                return EngineError::Constraint(format!(
                    "workflow for node {} does not exist",
                    node_id
                ));
            }
            _ => {}
        }
    }
    EngineError::from(err)
}
