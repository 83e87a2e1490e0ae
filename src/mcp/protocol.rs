//! JSON-RPC 2.0 wire messages for the MCP discovery handshake.
//!
//! The handshake is a fixed three-message exchange: an `initialize` request
//! (id 1), the `notifications/initialized` notification, and a `tools/list`
//! request (id 2). Correlation is by raw integer id; notifications carry no
//! id and are never waited on.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::mcp::session::InboundFrame;

pub(crate) const JSONRPC_VERSION: &str = "2.0";
pub(crate) const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Correlation id of the `initialize` request.
pub const INITIALIZE_REQUEST_ID: i64 = 1;
/// Correlation id of the `tools/list` request.
pub const TOOLS_LIST_REQUEST_ID: i64 = 2;

/// A JSON-RPC 2.0 message as it appears on the wire.
///
/// One shape covers requests, notifications and responses; absent members
/// stay off the wire entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcMessage {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl JsonRpcMessage {
    fn request(method: &str, params: Option<Value>, id: i64) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            method: Some(method.to_string()),
            params,
            result: None,
            error: None,
        }
    }

    fn notification(method: &str) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: Some(method.to_string()),
            params: None,
            result: None,
            error: None,
        }
    }
}

/// The fixed `initialize` request announcing this client's capabilities.
pub fn initialize_request() -> JsonRpcMessage {
    JsonRpcMessage::request(
        "initialize",
        Some(json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {
                "roots": { "listChanged": false },
                "sampling": {}
            },
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION")
            }
        })),
        INITIALIZE_REQUEST_ID,
    )
}

/// The `notifications/initialized` notification. No id, no reply expected.
pub fn initialized_notification() -> JsonRpcMessage {
    JsonRpcMessage::notification("notifications/initialized")
}

/// The `tools/list` request.
pub fn tools_list_request() -> JsonRpcMessage {
    JsonRpcMessage::request("tools/list", None, TOOLS_LIST_REQUEST_ID)
}

/// Parse a text frame into a message, tolerating junk.
///
/// Returns `None` for binary frames and unparseable text so correlation
/// predicates can treat such frames as "not mine" instead of failing the
/// whole listen.
pub fn parse_frame(frame: &InboundFrame) -> Option<JsonRpcMessage> {
    match frame {
        InboundFrame::Text(text) => serde_json::from_str(text).ok(),
        InboundFrame::Binary(_) => None,
    }
}

/// Whether a frame is a JSON-RPC message carrying the given correlation id.
///
/// Matches responses with either a `result` or an `error` member; the
/// caller decides what an error ack means.
pub fn is_response_with_id(frame: &InboundFrame, id: i64) -> bool {
    parse_frame(frame).is_some_and(|message| message.id == Some(id))
}

/// Extract `result.tools[*].name` from a `tools/list` result.
///
/// Entries without a string `name` are skipped.
pub fn tool_names(result: &Value) -> Vec<String> {
    result
        .get("tools")
        .and_then(Value::as_array)
        .map(|tools| {
            tools
                .iter()
                .filter_map(|tool| tool.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
