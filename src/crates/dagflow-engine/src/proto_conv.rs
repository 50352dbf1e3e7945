//! Conversions between the node executor wire types ([`crate::proto`]) and
//! the engine's internal models ([`crate::db::models`], [`crate::dispatch`]).
//!
//! A node travels through three shapes on a single dispatch: the stored
//! [`Node`], the wire [`WireNode`] sent to an executor, and back again as
//! the response is folded into the store. Edits embedded in a response are
//! deliberately left out of the wire contract (see [`wire_node_to_node`])
//! for v1 - an executor that wants to mutate the graph is a `SPEC_FULL.md`
//! Open Question left to a later revision of the executor contract.

use crate::db::models::node::{AssignedTask, ExecutionOptions, Node, TaskResult};
use crate::dispatch::{ExecuteNodeRequest, ExecuteNodeResponse};
use crate::proto::node_executor::{WireAssignedTask, WireExecuteNodeRequest, WireExecuteNodeResponse, WireNode, WireTaskResult};

pub fn task_result_to_wire(result: &TaskResult) -> WireTaskResult {
    WireTaskResult {
        status: result.status,
        summary: result.summary.clone(),
        output: result.output.clone(),
        artifacts: result.artifacts.clone(),
    }
}

pub fn wire_to_task_result(wire: WireTaskResult) -> TaskResult {
    TaskResult {
        status: wire.status,
        summary: wire.summary,
        output: wire.output,
        artifacts: wire.artifacts,
    }
}

pub fn assigned_task_to_wire(task: &AssignedTask) -> WireAssignedTask {
    WireAssignedTask {
        task_id: task.task_id.clone(),
        goal: task.goal.clone(),
        dependency_ids: task.dependency_ids.clone(),
        results: task.results.iter().map(task_result_to_wire).collect(),
        subtasks: task.subtasks.iter().map(assigned_task_to_wire).collect(),
    }
}

pub fn wire_to_assigned_task(wire: WireAssignedTask) -> AssignedTask {
    AssignedTask {
        task_id: wire.task_id,
        goal: wire.goal,
        dependency_ids: wire.dependency_ids,
        results: wire.results.into_iter().map(wire_to_task_result).collect(),
        subtasks: wire.subtasks.into_iter().map(wire_to_assigned_task).collect(),
    }
}

/// Convert a stored [`Node`] into the shape sent to an executor. `edits`
/// never travels outbound - a node is dispatched before it has any, since
/// edits are produced by the executor's response, not consumed from it.
pub fn node_to_wire(node: &Node) -> WireNode {
    WireNode {
        node_id: node.node_id.clone(),
        description: node.description.clone(),
        parent_ids: node.parent_ids.clone(),
        child_ids: node.child_ids.clone(),
        agent: node.agent.clone(),
        timeout_seconds: node.execution_options.timeout_seconds,
        max_retries: node.execution_options.max_retries,
        assigned_task: assigned_task_to_wire(&node.assigned_task),
        all_tasks: node.all_tasks.iter().map(assigned_task_to_wire).collect(),
        status: node.status as i32,
        is_final: node.is_final,
    }
}

/// Convert an executor's wire response back into a stored [`Node`].
/// `edits` is always empty here: v1 of the wire contract carries no
/// structural edits, unlike the in-process [`crate::dispatch::mock`]
/// clients used in tests, which may embed them directly.
pub fn wire_node_to_node(wire: WireNode) -> crate::Result<Node> {
    let status = crate::Status::from_i32(wire.status)
        .ok_or_else(|| crate::EngineError::Invalid(format!("executor returned unknown status {}", wire.status)))?;

    Ok(Node {
        node_id: wire.node_id,
        description: wire.description,
        parent_ids: wire.parent_ids,
        child_ids: wire.child_ids,
        agent: wire.agent,
        execution_options: ExecutionOptions {
            timeout_seconds: wire.timeout_seconds,
            max_retries: wire.max_retries,
        },
        assigned_task: wire_to_assigned_task(wire.assigned_task),
        all_tasks: wire.all_tasks.into_iter().map(wire_to_assigned_task).collect(),
        status,
        edits: Vec::new(),
        is_final: wire.is_final,
    })
}

pub fn execute_node_request_to_wire(request: &ExecuteNodeRequest) -> WireExecuteNodeRequest {
    WireExecuteNodeRequest {
        workflow_id: request.workflow_id.clone(),
        node: node_to_wire(&request.node),
        upstream_nodes: request.upstream_nodes.iter().map(node_to_wire).collect(),
    }
}

pub fn wire_to_execute_node_response(wire: WireExecuteNodeResponse) -> crate::Result<ExecuteNodeResponse> {
    Ok(ExecuteNodeResponse {
        node: wire_node_to_node(wire.node)?,
    })
}
