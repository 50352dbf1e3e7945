//! In-process dispatch clients used by scheduler tests. A real deployment
//! wires [`super::grpc::TonicDispatchClient`] against `NODE_TARGET`
//! instead; the engine's core never assumes a transport beyond
//! [`super::DispatchClient`].

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{DispatchClient, DispatchError, ExecuteNodeRequest, ExecuteNodeResponse};
use crate::Status;

/// Always marks the dispatched node with a fixed terminal status. Used to
/// test the scheduler's D1-D5 pipeline without a real executor.
pub struct FixedStatusDispatchClient {
    pub status: Status,
    pub calls: AtomicUsize,
}

impl FixedStatusDispatchClient {
    pub fn new(status: Status) -> Self {
        Self {
            status,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DispatchClient for FixedStatusDispatchClient {
    async fn execute_node(
        &self,
        request: ExecuteNodeRequest,
    ) -> Result<ExecuteNodeResponse, DispatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut node = request.node;
        node.status = self.status;
        Ok(ExecuteNodeResponse { node })
    }
}

/// Always fails as a transport error, to exercise the scheduler's
/// `INFRA_ERROR` path.
#[derive(Default)]
pub struct AlwaysFailDispatchClient;

#[async_trait]
impl DispatchClient for AlwaysFailDispatchClient {
    async fn execute_node(
        &self,
        _request: ExecuteNodeRequest,
    ) -> Result<ExecuteNodeResponse, DispatchError> {
        Err(DispatchError::Transport("simulated executor unavailable".to_string()))
    }
}

/// Returns a fixed status plus an edit batch embedded in the response
/// node, to exercise D5 (scheduler applies edits from the response).
pub struct EditEmittingDispatchClient {
    pub status: Status,
    pub edits: Mutex<Vec<crate::db::models::node::NodeEdit>>,
}

impl EditEmittingDispatchClient {
    pub fn new(status: Status, edits: Vec<crate::db::models::node::NodeEdit>) -> Self {
        Self {
            status,
            edits: Mutex::new(edits),
        }
    }
}

#[async_trait]
impl DispatchClient for EditEmittingDispatchClient {
    async fn execute_node(
        &self,
        request: ExecuteNodeRequest,
    ) -> Result<ExecuteNodeResponse, DispatchError> {
        let mut node = request.node;
        node.status = self.status;
        node.edits = std::mem::take(&mut *self.edits.lock().unwrap());
        Ok(ExecuteNodeResponse { node })
    }
}
