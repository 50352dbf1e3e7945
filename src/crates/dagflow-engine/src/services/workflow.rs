//! Management API (C4): external CRUD over workflows and nodes, served as
//! plain JSON over HTTP.
//!
//! Grounded on the teacher's `api/handlers/workflows.rs` /
//! `api/error.rs` / `api/response.rs` idiom (axum handlers, an
//! `ApiError` enum with a blanket `IntoResponse`, a thin success-response
//! wrapper) but rebuilt end to end against `SPEC_FULL.md` §4.4: workflows
//! and nodes instead of the teacher's workflow-definition blob, and the
//! diff-based `UpdateWorkflow` the original Go `api/workflow_service.go`
//! computed before calling `ApplyNodeEdits`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{AuthError, AuthInterceptor};
use crate::db::connection::DatabasePool;
use crate::db::models::node::{Node, NodeEdit};
use crate::db::models::workflow::Workflow;
use crate::db::repositories::{NodeRepository, WorkflowRepository};
use crate::events::{Event, EventLogger};
use crate::{EngineError, Status};

/// Shared state behind every management API handler.
pub struct ManagementApi {
    pool: DatabasePool,
    auth: AuthInterceptor,
    events: Arc<dyn EventLogger>,
}

impl ManagementApi {
    pub fn new(pool: DatabasePool, auth: AuthInterceptor, events: Arc<dyn EventLogger>) -> Self {
        Self { pool, auth, events }
    }
}

/// Build the axum router for the management API (C4). Every route name
/// below is also the `method` string passed to
/// [`AuthInterceptor::authorize_headers`], matching the table in
/// `SPEC_FULL.md` §6.
pub fn router(state: Arc<ManagementApi>) -> Router {
    Router::new()
        .route("/workflows", post(create_workflow).get(list_workflows))
        .route("/workflows/:workflow_id", get(get_workflow).put(update_workflow))
        .route(
            "/workflows/:workflow_id/nodes/:node_id",
            get(get_node).put(update_node),
        )
        .with_state(state)
}

/// A structured error, convertible straight into the HTTP response a
/// handler returns. Never surfaces an internal message beyond the
/// category + a short human-readable string (`SPEC_FULL.md` §7).
#[derive(Debug)]
enum ApiError {
    Auth(AuthError),
    Engine(EngineError),
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        ApiError::Auth(e)
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError::Engine(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    category: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Auth(auth_err) => auth_err.into_response(),
            ApiError::Engine(engine_err) => {
                let (status, category) = match &engine_err {
                    EngineError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                    EngineError::Constraint(_) | EngineError::Invalid(_) => {
                        (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT")
                    }
                    EngineError::Auth(_) => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
                    _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
                };
                let message = match &engine_err {
                    EngineError::Storage(_) | EngineError::Serialization(_) => {
                        "internal storage error".to_string()
                    }
                    other => other.to_string(),
                };
                (status, Json(ErrorBody { category, message })).into_response()
            }
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
struct CreateWorkflowRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    nodes: Vec<Node>,
}

#[derive(Debug, Serialize)]
struct CreateWorkflowResponse {
    workflow_id: String,
}

#[derive(Debug, Serialize)]
struct ListWorkflowsResponse {
    workflow_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateWorkflowRequest {
    #[serde(default)]
    nodes: Vec<Node>,
}

#[derive(Debug, Serialize)]
struct SuccessResponse {
    success: bool,
}

/// `CreateWorkflow(nodes[]) -> (workflow_id)` (`SPEC_FULL.md` §6). Assigns
/// a fresh workflow id and, for any node with an empty `node_id`, a fresh
/// node id - then persists the workflow row and every supplied node (plus
/// derived edges) atomically node-by-node.
async fn create_workflow(
    State(state): State<Arc<ManagementApi>>,
    headers: HeaderMap,
    Json(req): Json<CreateWorkflowRequest>,
) -> ApiResult<impl IntoResponse> {
    state.auth.authorize_headers(&headers, "CreateWorkflow")?;

    let workflow_id = Uuid::new_v4().to_string();
    let name = if req.name.is_empty() { workflow_id.clone() } else { req.name };

    WorkflowRepository::create(&state.pool, &workflow_id, &name, req.description.as_deref()).await?;

    let mut nodes = req.nodes;
    for node in &mut nodes {
        if node.node_id.is_empty() {
            node.node_id = Uuid::new_v4().to_string();
        }
    }
    for node in &nodes {
        NodeRepository::create_node(&state.pool, &workflow_id, node).await?;
    }

    state.events.log_event(Event::workflow_created(&workflow_id));

    Ok((StatusCode::CREATED, Json(CreateWorkflowResponse { workflow_id })))
}

/// `GetWorkflow(workflow_id) -> (nodes[])`: returns the workflow row plus
/// every node in it, `child_ids` re-derived from the edge projection so
/// it never drifts from what was actually persisted.
async fn get_workflow(
    State(state): State<Arc<ManagementApi>>,
    headers: HeaderMap,
    Path(workflow_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.auth.authorize_headers(&headers, "GetWorkflow")?;

    let row = WorkflowRepository::get_by_id(&state.pool, &workflow_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("workflow {} not found", workflow_id)))?;

    let mut nodes = NodeRepository::list_nodes(&state.pool, &workflow_id).await?;
    crate::db::models::node::derive_child_ids(&mut nodes);

    Ok(Json(Workflow::from_row(row, nodes)?))
}

/// `ListWorkflows() -> (workflow_ids[])`.
async fn list_workflows(
    State(state): State<Arc<ManagementApi>>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    state.auth.authorize_headers(&headers, "ListWorkflows")?;

    let rows = WorkflowRepository::list(&state.pool).await?;
    let workflow_ids = rows.into_iter().map(|r| r.id).collect();

    Ok(Json(ListWorkflowsResponse { workflow_ids }))
}

/// `UpdateWorkflow(workflow_id, nodes[]) -> (success)`: the diff-based
/// declarative update in `SPEC_FULL.md` §4.4. An empty computed batch
/// short-circuits before any store call, matching property (P6).
async fn update_workflow(
    State(state): State<Arc<ManagementApi>>,
    headers: HeaderMap,
    Path(workflow_id): Path<String>,
    Json(req): Json<UpdateWorkflowRequest>,
) -> ApiResult<impl IntoResponse> {
    state.auth.authorize_headers(&headers, "UpdateWorkflow")?;

    if WorkflowRepository::get_by_id(&state.pool, &workflow_id)
        .await?
        .is_none()
    {
        return Err(EngineError::NotFound(format!("workflow {} not found", workflow_id)).into());
    }

    let current = NodeRepository::list_nodes(&state.pool, &workflow_id).await?;
    let batch = diff_batch(&current, req.nodes);

    if !batch.is_empty() {
        NodeRepository::apply_node_edits(&state.pool, &workflow_id, &batch).await?;
        state.events.log_event(Event::workflow_updated(&workflow_id));
    }

    Ok(Json(SuccessResponse { success: true }))
}

/// `GetNode(workflow_id, node_id) -> (node)`.
async fn get_node(
    State(state): State<Arc<ManagementApi>>,
    headers: HeaderMap,
    Path((workflow_id, node_id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    state.auth.authorize_headers(&headers, "GetNode")?;

    let node = NodeRepository::get_node(&state.pool, &workflow_id, &node_id).await?;
    Ok(Json(node))
}

/// `UpdateNode(workflow_id, node) -> (success)`: a direct point mutation,
/// delegated straight to the store (`SPEC_FULL.md` §4.4 - no diffing,
/// unlike `UpdateWorkflow`). Classifies the emitted event by the
/// resulting status: a terminal status emits `NodeCompleted`, anything
/// else `NodeUpdated`.
async fn update_node(
    State(state): State<Arc<ManagementApi>>,
    headers: HeaderMap,
    Path((workflow_id, node_id)): Path<(String, String)>,
    Json(mut node): Json<Node>,
) -> ApiResult<impl IntoResponse> {
    state.auth.authorize_headers(&headers, "UpdateNode")?;

    node.node_id = node_id.clone();
    NodeRepository::update_node(&state.pool, &workflow_id, &node).await?;

    if node.status.is_terminal() {
        state.events.log_event(Event::node_completed(&workflow_id, &node_id));
    } else {
        state.events.log_event(Event::node_updated(&workflow_id, &node_id));
    }
    if node.status == Status::Pass && node.is_final {
        WorkflowRepository::update_status(&state.pool, &workflow_id, Status::Pass).await?;
        state.events.log_event(Event::workflow_completed(&workflow_id));
    }

    Ok(Json(SuccessResponse { success: true }))
}

/// Compute the edit batch an `UpdateWorkflow` declarative node list
/// yields against the current persisted set (`SPEC_FULL.md` §4.4,
/// property P6): incoming ids missing from current become `INSERT`s,
/// current ids missing from incoming become `DELETE`s, and ids present
/// in both whose bodies differ become `UPDATE`s. Incoming nodes with an
/// empty id are always treated as inserts and assigned a fresh one.
fn diff_batch(current: &[Node], incoming: Vec<Node>) -> Vec<NodeEdit> {
    let current_by_id: HashMap<&str, &Node> =
        current.iter().map(|n| (n.node_id.as_str(), n)).collect();

    let mut batch = Vec::new();
    let mut incoming_ids: HashSet<String> = HashSet::new();

    for mut node in incoming {
        if node.node_id.is_empty() {
            node.node_id = Uuid::new_v4().to_string();
        }
        incoming_ids.insert(node.node_id.clone());

        match current_by_id.get(node.node_id.as_str()) {
            None => batch.push(NodeEdit::insert(node, "declarative update: new node")),
            Some(existing) => {
                if !nodes_structurally_equal(existing, &node) {
                    batch.push(NodeEdit::update(node, "declarative update: modified node"));
                }
            }
        }
    }

    for node in current {
        if !incoming_ids.contains(&node.node_id) {
            batch.push(NodeEdit::delete(node.node_id.as_str(), "declarative update: removed node"));
        }
    }

    batch
}

/// Structural equality for diffing: compares every field a client can
/// declare except `edits`, which is server-accumulated audit history a
/// declarative update payload never carries.
fn nodes_structurally_equal(a: &Node, b: &Node) -> bool {
    a.node_id == b.node_id
        && a.description == b.description
        && a.parent_ids == b.parent_ids
        && a.child_ids == b.child_ids
        && a.agent == b.agent
        && a.execution_options == b.execution_options
        && a.assigned_task == b.assigned_task
        && a.all_tasks == b.all_tasks
        && a.status == b.status
        && a.is_final == b.is_final
}
