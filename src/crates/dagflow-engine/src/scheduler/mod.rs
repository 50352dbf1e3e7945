//! The scheduler loop (C3): periodic discovery of ready nodes, concurrent
//! dispatch, and reconciliation of the dispatch outcome back into the
//! store.
//!
//! Grounded on the original Go `SimpleScheduler`/`dispatchNode` (`time.
//! NewTicker` + `select`, one goroutine per ready node), generalized onto
//! `tokio::time::interval` and one spawned task per node. The crucial fix
//! over the original: `FindReadyNodes` there hardcoded
//! `workflowID := "unknown_workflow"` with a `// TODO` acknowledging it
//! was a placeholder. Here the readiness query in `NodeRepository`
//! projects `workflow_id` alongside every node, so it is threaded through
//! D1-D5 instead of guessed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::db::connection::DatabasePool;
use crate::db::models::node::Node;
use crate::db::repositories::NodeRepository;
use crate::dispatch::{DispatchClient, ExecuteNodeRequest};
use crate::events::{Event, EventLogger, EventType};
use crate::{Result, Status};

/// Default poll interval when none is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct Scheduler {
    pool: DatabasePool,
    dispatch: Arc<dyn DispatchClient>,
    events: Arc<dyn EventLogger>,
    poll_interval: Duration,
}

impl Scheduler {
    pub fn new(
        pool: DatabasePool,
        dispatch: Arc<dyn DispatchClient>,
        events: Arc<dyn EventLogger>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            pool,
            dispatch,
            events,
            poll_interval,
        }
    }

    /// Run the poll loop until `shutdown` is signalled. In-flight workers
    /// spawned for a cycle are allowed to run to completion; only the
    /// next tick is suppressed.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.schedule_once().await {
                        tracing::error!("scheduler poll failed: {}", e);
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("scheduler received shutdown signal, stopping poll loop");
                        break;
                    }
                }
            }
        }
    }

    /// One poll cycle: discover ready nodes, spawn an independent worker
    /// per node. Workers share no mutable state; each takes a snapshot.
    pub async fn schedule_once(&self) -> Result<usize> {
        let ready = NodeRepository::find_ready_nodes(&self.pool).await?;
        let count = ready.len();
        if count > 0 {
            tracing::info!("scheduler found {} ready node(s)", count);
        }

        for (workflow_id, node) in ready {
            let pool = self.pool.clone();
            let dispatch = self.dispatch.clone();
            let events = self.events.clone();
            tokio::spawn(async move {
                if let Err(e) = dispatch_node(&pool, dispatch.as_ref(), events.as_ref(), &workflow_id, node).await {
                    tracing::error!("dispatch worker failed: {}", e);
                }
            });
        }

        Ok(count)
    }
}

/// The per-node dispatch pipeline: D1 claim, D2 build request, D3
/// invoke, D4 writeback, D5 apply embedded edits. Each step's failure
/// handling matches `SPEC_FULL.md` §4.3 exactly.
pub async fn dispatch_node(
    pool: &DatabasePool,
    dispatch: &dyn DispatchClient,
    events: &dyn EventLogger,
    workflow_id: &str,
    mut node: Node,
) -> Result<()> {
    let node_id = node.node_id.clone();

    // D1: claim by transitioning to RUNNING. If this fails, abandon the
    // node for this cycle; it is rediscovered on the next poll.
    node.status = Status::Running;
    if let Err(e) = NodeRepository::update_node(pool, workflow_id, &node).await {
        tracing::warn!(
            "failed to claim node {} in workflow {}: {}",
            node_id,
            workflow_id,
            e
        );
        return Ok(());
    }
    events.log_event(Event::node_dispatched(workflow_id, &node_id));
    if node.parent_ids.is_empty() {
        events.log_event(Event::workflow_dispatched(workflow_id));
    }

    // D2: build the request.
    let request = ExecuteNodeRequest {
        workflow_id: workflow_id.to_string(),
        node_id: node_id.clone(),
        node: node.clone(),
        upstream_nodes: Vec::new(),
    };

    // D3: invoke. A transport failure is an infra error, not a task
    // outcome, and stops the pipeline for this node.
    let response = match dispatch.execute_node(request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("dispatch failed for node {}: {}", node_id, e);
            node.status = Status::InfraError;
            if let Err(update_err) = NodeRepository::update_node(pool, workflow_id, &node).await {
                tracing::error!(
                    "failed to record INFRA_ERROR for node {}: {}",
                    node_id,
                    update_err
                );
            } else {
                events.log_event(Event::node_completed(workflow_id, &node_id));
            }
            return Ok(());
        }
    };

    // D4: write back the response node's state.
    let mut result_node = response.node;
    if let Err(e) = NodeRepository::update_node(pool, workflow_id, &result_node).await {
        tracing::error!("failed to write back result for node {}: {}", node_id, e);
        return Ok(());
    }
    if result_node.status.is_terminal() {
        events.log_event(Event::node_completed(workflow_id, &node_id));
    } else {
        events.log_event(Event::node_updated(workflow_id, &node_id));
    }
    if result_node.status == Status::Pass && result_node.is_final {
        if let Err(e) = crate::db::repositories::WorkflowRepository::update_status(
            pool,
            workflow_id,
            Status::Pass,
        )
        .await
        {
            tracing::error!("failed to mark workflow {} completed: {}", workflow_id, e);
        } else {
            events.log_event(Event::workflow_completed(workflow_id));
        }
    }

    // D5: apply any edits the executor embedded in the response.
    let edits = std::mem::take(&mut result_node.edits);
    if !edits.is_empty() {
        if let Err(e) = NodeRepository::apply_node_edits(pool, workflow_id, &edits).await {
            tracing::error!(
                "failed to apply edits returned for node {}: {}",
                node_id,
                e
            );
        }
    }

    Ok(())
}
