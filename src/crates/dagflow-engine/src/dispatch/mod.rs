//! Dispatch client: the transport-agnostic contract used to invoke a
//! remote node executor (`ExecuteNode`). Real transports (e.g. a tonic
//! client against `NODE_TARGET`) and the in-process [`mock`] used by
//! tests both implement [`DispatchClient`].

pub mod grpc;
pub mod mock;

use async_trait::async_trait;

use crate::db::models::node::Node;

/// Request shape for one dispatch. `upstream_nodes` lets an executor
/// assemble context from a node's direct dependencies without a second
/// round-trip through the management API.
#[derive(Debug, Clone)]
pub struct ExecuteNodeRequest {
    pub workflow_id: String,
    pub node_id: String,
    pub node: Node,
    pub upstream_nodes: Vec<Node>,
}

/// Response shape for one dispatch. `node` is authoritative post-execution
/// state; any edits embedded in `node.edits` are applied by the scheduler
/// after the node's own status is written back (see `scheduler::dispatch_node`).
#[derive(Debug, Clone)]
pub struct ExecuteNodeResponse {
    pub node: Node,
}

/// A dispatch failure distinct from a handled task outcome: the executor
/// was unreachable, timed out, or returned a malformed response. The
/// scheduler maps this to `Status::InfraError`, never to a task status.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("transport error invoking node executor: {0}")]
    Transport(String),

    #[error("node executor request timed out")]
    Timeout,
}

#[async_trait]
pub trait DispatchClient: Send + Sync {
    async fn execute_node(
        &self,
        request: ExecuteNodeRequest,
    ) -> Result<ExecuteNodeResponse, DispatchError>;
}
