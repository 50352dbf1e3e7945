//! A [`DispatchClient`] that calls a real node executor process over gRPC,
//! using the JSON-over-tonic codec in [`crate::proto`] rather than a
//! compiled `.proto`.

use async_trait::async_trait;
use http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};

use super::{DispatchClient, DispatchError, ExecuteNodeRequest, ExecuteNodeResponse};
use crate::proto::JsonCodec;
use crate::proto_conv::{execute_node_request_to_wire, wire_to_execute_node_response};

const EXECUTE_NODE_PATH: &str = "/dagflow.NodeExecutor/ExecuteNode";

/// Connects once at construction and reuses the channel (tonic's
/// `Channel` load-balances and reconnects internally) for every
/// subsequent `execute_node` call.
pub struct TonicDispatchClient {
    channel: Channel,
}

impl TonicDispatchClient {
    /// `target` is `NODE_TARGET` from the environment, e.g.
    /// `http://executor-host:7000`.
    pub async fn connect(target: impl Into<String>) -> Result<Self, tonic::transport::Error> {
        let endpoint: Endpoint = Endpoint::from_shared(target.into())?;
        let channel = endpoint.connect().await?;
        Ok(Self { channel })
    }
}

#[async_trait]
impl DispatchClient for TonicDispatchClient {
    async fn execute_node(
        &self,
        request: ExecuteNodeRequest,
    ) -> Result<ExecuteNodeResponse, DispatchError> {
        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        grpc.ready()
            .await
            .map_err(|e| DispatchError::Transport(format!("executor channel not ready: {}", e)))?;

        let path = PathAndQuery::from_static(EXECUTE_NODE_PATH);
        let wire_request = tonic::Request::new(execute_node_request_to_wire(&request));

        let response = grpc
            .unary(wire_request, path, JsonCodec::default())
            .await
            .map_err(|status| match status.code() {
                tonic::Code::DeadlineExceeded => DispatchError::Timeout,
                _ => DispatchError::Transport(status.to_string()),
            })?;

        wire_to_execute_node_response(response.into_inner())
            .map_err(|e| DispatchError::Transport(format!("malformed executor response: {}", e)))
    }
}
