//! Wire types and service contract for the node executor RPC (C2).
//!
//! The management API (C4) is served over plain JSON/HTTP (see
//! `services::workflow::router`); this module covers the one surface that
//! is genuinely inter-process gRPC: the engine calling out to an external
//! node executor at `NODE_TARGET` to run a node, and an executor process
//! implementing the server side of that same contract.
//!
//! There is no `.proto` file behind this - messages are encoded as JSON
//! over a unary gRPC call via [`JsonCodec`], not protobuf, so the wire
//! types below are plain serde structs rather than prost-generated ones.

use std::marker::PhantomData;

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::Status;

pub mod node_executor {
    use super::*;

    pub mod node_executor_server {
        use tonic::async_trait;

        #[async_trait]
        pub trait NodeExecutor: Send + Sync + 'static {
            async fn execute_node(
                &self,
                request: tonic::Request<super::WireExecuteNodeRequest>,
            ) -> Result<tonic::Response<super::WireExecuteNodeResponse>, tonic::Status>;
        }
    }

    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct WireTaskResult {
        pub status: i32,
        pub summary: String,
        pub output: String,
        pub artifacts: std::collections::BTreeMap<String, String>,
    }

    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct WireAssignedTask {
        pub task_id: String,
        pub goal: String,
        pub dependency_ids: Vec<String>,
        pub results: Vec<WireTaskResult>,
        pub subtasks: Vec<WireAssignedTask>,
    }

    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct WireNode {
        pub node_id: String,
        pub description: String,
        pub parent_ids: Vec<String>,
        pub child_ids: Vec<String>,
        pub agent: String,
        pub timeout_seconds: Option<u64>,
        pub max_retries: Option<u32>,
        pub assigned_task: WireAssignedTask,
        pub all_tasks: Vec<WireAssignedTask>,
        pub status: i32,
        pub is_final: bool,
    }

    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct WireExecuteNodeRequest {
        pub workflow_id: String,
        pub node: WireNode,
        pub upstream_nodes: Vec<WireNode>,
    }

    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct WireExecuteNodeResponse {
        pub node: WireNode,
    }
}

/// A tonic [`Codec`] that (de)serializes messages as JSON rather than
/// protobuf, so [`node_executor`]'s plain serde structs can ride a unary
/// gRPC call without a `.proto`/`prost` pipeline.
#[derive(Debug)]
pub struct JsonCodec<T, U>(PhantomData<(T, U)>);

impl<T, U> Default for JsonCodec<T, U> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T, U> Codec for JsonCodec<T, U>
where
    T: Serialize + Send + 'static,
    U: for<'de> Deserialize<'de> + Send + 'static,
{
    type Encode = T;
    type Decode = U;
    type Encoder = JsonEncoder<T>;
    type Decoder = JsonDecoder<U>;

    fn encoder(&mut self) -> Self::Encoder {
        JsonEncoder(PhantomData)
    }

    fn decoder(&mut self) -> Self::Decoder {
        JsonDecoder(PhantomData)
    }
}

#[derive(Debug)]
pub struct JsonEncoder<T>(PhantomData<T>);

impl<T: Serialize> Encoder for JsonEncoder<T> {
    type Item = T;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        let bytes = serde_json::to_vec(&item).map_err(|e| Status::internal(format!("json encode failed: {}", e)))?;
        dst.put_slice(&bytes);
        Ok(())
    }
}

#[derive(Debug)]
pub struct JsonDecoder<U>(PhantomData<U>);

impl<U: for<'de> Deserialize<'de>> Decoder for JsonDecoder<U> {
    type Item = U;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        if !src.has_remaining() {
            return Ok(None);
        }
        let bytes = src.copy_to_bytes(src.remaining());
        let item = serde_json::from_slice(&bytes).map_err(|e| Status::internal(format!("json decode failed: {}", e)))?;
        Ok(Some(item))
    }
}

#[cfg(test)]
mod tests {
    use super::node_executor::*;

    #[test]
    fn wire_node_roundtrips_through_json() {
        let node = WireNode {
            node_id: "n1".to_string(),
            description: String::new(),
            parent_ids: vec![],
            child_ids: vec![],
            agent: "agent-a".to_string(),
            timeout_seconds: None,
            max_retries: None,
            assigned_task: WireAssignedTask {
                task_id: String::new(),
                goal: String::new(),
                dependency_ids: vec![],
                results: vec![],
                subtasks: vec![],
            },
            all_tasks: vec![],
            status: 0,
            is_final: false,
        };
        let json = serde_json::to_string(&node).unwrap();
        let decoded: WireNode = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.node_id, "n1");
    }
}
