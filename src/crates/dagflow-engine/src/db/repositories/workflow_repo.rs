//! Workflow repository: the `workflows` table half of the state store.
//!
//! Node and edge storage lives in [`super::node_repo`]; this repository
//! only owns the workflow row itself (name, description, status).

use chrono::Utc;

use crate::db::connection::DatabasePool;
use crate::db::models::WorkflowRow;
use crate::{EngineError, Status};

/// Workflow repository for managing workflow database operations.
pub struct WorkflowRepository;

impl WorkflowRepository {
    /// Insert a new workflow row. The caller is responsible for inserting
    /// any initial nodes via [`super::node_repo::NodeRepository`] in the
    /// same logical operation (see `CreateWorkflow` in `services::workflow`).
    pub async fn create(
        pool: &DatabasePool,
        id: &str,
        name: &str,
        description: Option<&str>,
    ) -> crate::Result<WorkflowRow> {
        let now = Utc::now().to_rfc3339();
        let row = sqlx::query_as::<_, WorkflowRow>(
            "INSERT INTO workflows (id, name, description, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(id)
        .bind(name)
        .bind(description)
        .bind(Status::Unknown as i32)
        .bind(&now)
        .bind(&now)
        .fetch_one(pool)
        .await?;
        Ok(row)
    }

    pub async fn get_by_id(pool: &DatabasePool, id: &str) -> crate::Result<Option<WorkflowRow>> {
        let row = sqlx::query_as::<_, WorkflowRow>("SELECT * FROM workflows WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row)
    }

    pub async fn list(pool: &DatabasePool) -> crate::Result<Vec<WorkflowRow>> {
        let rows = sqlx::query_as::<_, WorkflowRow>("SELECT * FROM workflows ORDER BY created_at DESC")
            .fetch_all(pool)
            .await?;
        Ok(rows)
    }

    /// Fails with [`EngineError::NotFound`] when `id` is unknown, so callers
    /// propagate with `?` rather than checking a bool.
    pub async fn update_status(pool: &DatabasePool, id: &str, status: Status) -> crate::Result<()> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query("UPDATE workflows SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status as i32)
            .bind(&now)
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound(format!("workflow {} not found", id)));
        }
        Ok(())
    }
}
