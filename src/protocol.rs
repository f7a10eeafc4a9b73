//! Defines the protocol layer for handling MCP message serialization and deserialization.
//!
//! This layer sits on top of the `NetworkAdapter` and provides a strongly-typed interface
//! for sending and receiving MCP messages. It is responsible for all `serde_json`
//! operations, keeping the session logic focused on dispatch.

use crate::error::{ErrorData, Result};
use crate::network_adapter::NetworkAdapter;
use crate::types::RequestId;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

/// A connection that handles MCP protocol logic over a generic `NetworkAdapter`.
pub struct ProtocolConnection<A: NetworkAdapter> {
    adapter: A,
}

impl<A: NetworkAdapter> ProtocolConnection<A> {
    /// Creates a new `ProtocolConnection` that will use the given adapter for communication.
    pub fn new(adapter: A) -> Self {
        Self { adapter }
    }

    /// Serializes a message struct into a JSON string and sends it via the adapter.
    pub async fn send_serializable<T: Serialize + Send + Sync>(&mut self, msg: T) -> Result<()> {
        let json_string = serde_json::to_string(&msg)?;
        self.adapter.send(&json_string).await
    }

    /// Sends a raw, already-serialized JSON string over the adapter.
    pub async fn send_raw(&mut self, json_string: &str) -> Result<()> {
        self.adapter.send(json_string).await
    }

    /// Receives the next non-empty frame and deserializes it.
    ///
    /// `Ok(None)` means the connection closed. A frame that is not valid JSON
    /// yields `Error::Serialization` (or `Error::InvalidFrame` from the
    /// adapter); the connection stays usable afterwards.
    /// Cancel-safe as long as the adapter's `recv` is.
    pub async fn recv_message<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        loop {
            match self.adapter.recv().await? {
                Some(frame) if frame.trim().is_empty() => continue,
                Some(frame) => return Ok(Some(serde_json::from_str::<T>(&frame)?)),
                None => return Ok(None),
            }
        }
    }

    pub async fn close(&mut self) -> Result<()> {
        self.adapter.close().await
    }
}

/// A decoded JSON-RPC frame, classified by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    Request {
        id: RequestId,
        method: String,
        params: Value,
    },
    Notification {
        method: String,
        params: Value,
    },
    Response {
        id: RequestId,
        outcome: std::result::Result<Value, ErrorData>,
    },
}

#[derive(Deserialize)]
struct RawMessage {
    #[serde(default)]
    id: Option<RequestId>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ErrorData>,
}

impl IncomingMessage {
    /// Classifies a raw frame.
    pub fn parse(value: Value) -> std::result::Result<Self, ErrorData> {
        let raw: RawMessage = serde_json::from_value(value)
            .map_err(|e| ErrorData::invalid_request(format!("Malformed message: {}", e)))?;

        match (raw.id, raw.method) {
            (Some(id), Some(method)) => Ok(IncomingMessage::Request {
                id,
                method,
                params: raw.params.unwrap_or(Value::Null),
            }),
            (None, Some(method)) => Ok(IncomingMessage::Notification {
                method,
                params: raw.params.unwrap_or(Value::Null),
            }),
            (Some(id), None) => {
                let outcome = match (raw.error, raw.result) {
                    (Some(error), _) => Err(error),
                    (None, Some(result)) => Ok(result),
                    (None, None) => Ok(Value::Null),
                };
                Ok(IncomingMessage::Response { id, outcome })
            }
            (None, None) => Err(ErrorData::invalid_request(
                "Message has neither a method nor an id",
            )),
        }
    }
}
