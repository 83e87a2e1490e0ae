//! Tool discovery against an MCP access point.
//!
//! Drives the fixed handshake over one WebSocket session: `initialize`
//! (id 1), `notifications/initialized` once the ack arrived, then
//! `tools/list` (id 2). Discovery is best-effort: every failure kind —
//! connect, timeout, transport loss, JSON-RPC error member — degrades to an
//! empty tool list, and the session is released exactly once on every exit
//! path.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::mcp::error::{ConnectError, ListenError, SendError};
use crate::mcp::protocol::{self, JsonRpcMessage, INITIALIZE_REQUEST_ID, TOOLS_LIST_REQUEST_ID};
use crate::mcp::session::{ConnectionConfig, InboundFrame, WsClient};

const DISCOVERY_CONNECT_TIMEOUT: Duration = Duration::from_secs(8);
const DISCOVERY_SESSION_BUDGET: Duration = Duration::from_secs(10);
const DISCOVERY_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Why a discovery run came up empty. Internal: callers only ever see the
/// degraded empty list.
#[derive(Debug, Error)]
pub(crate) enum DiscoveryError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Send(#[from] SendError),

    #[error(transparent)]
    Listen(#[from] ListenError),

    /// A correlated response carried a JSON-RPC `error` member.
    #[error("{stage} rejected by peer: {detail}")]
    Rpc { stage: &'static str, detail: String },

    /// A correlated response carried neither `result` nor anything usable.
    #[error("malformed {stage} response")]
    Malformed { stage: &'static str },
}

/// Connection parameters tuned for a discovery run against an access
/// point: the tool list can be large, and agent endpoints are slow to wake.
pub fn discovery_config(address: impl Into<String>) -> ConnectionConfig {
    let mut config = ConnectionConfig::new(address);
    config.connect_timeout = DISCOVERY_CONNECT_TIMEOUT;
    config.session_budget = DISCOVERY_SESSION_BUDGET;
    config.max_frame_bytes = DISCOVERY_MAX_FRAME_BYTES;
    config
}

/// Run the discovery handshake and return the advertised tool names.
///
/// Never fails: mechanical and protocol-level failures alike degrade to an
/// empty list, since tool discovery is advisory rather than critical-path.
pub async fn discover_tools(config: ConnectionConfig) -> Vec<String> {
    let address = config.address.clone();
    match fetch_tool_names(config).await {
        Ok(names) => {
            debug!(address = %address, count = names.len(), "tool discovery complete");
            names
        }
        Err(err) => {
            warn!(address = %address, error = %err, "tool discovery failed, returning empty list");
            Vec::new()
        }
    }
}

async fn fetch_tool_names(config: ConnectionConfig) -> Result<Vec<String>, DiscoveryError> {
    let client = WsClient::connect(config).await?;
    let outcome = run_handshake(&client).await;
    // Single teardown point; already-closed sessions make this a no-op.
    client.close().await;
    outcome
}

async fn run_handshake(client: &WsClient) -> Result<Vec<String>, DiscoveryError> {
    debug!("sending initialize request");
    client.send_json(&protocol::initialize_request()).await?;

    let acks = client
        .listen_keep_open(|frame| protocol::is_response_with_id(frame, INITIALIZE_REQUEST_ID))
        .await?;
    let ack = matched_message(&acks, "initialize")?;
    if let Some(error) = ack.error {
        return Err(DiscoveryError::Rpc {
            stage: "initialize",
            detail: error.to_string(),
        });
    }
    if ack.result.is_none() {
        return Err(DiscoveryError::Malformed { stage: "initialize" });
    }

    // The notification must never precede the ack.
    debug!("initialize acknowledged, sending initialized notification");
    client
        .send_json(&protocol::initialized_notification())
        .await?;

    debug!("requesting tool list");
    client.send_json(&protocol::tools_list_request()).await?;

    let replies = client
        .listen(|frame| protocol::is_response_with_id(frame, TOOLS_LIST_REQUEST_ID))
        .await?;
    let reply = matched_message(&replies, "tools/list")?;
    if let Some(error) = reply.error {
        return Err(DiscoveryError::Rpc {
            stage: "tools/list",
            detail: error.to_string(),
        });
    }
    let result = reply
        .result
        .ok_or(DiscoveryError::Malformed { stage: "tools/list" })?;

    Ok(protocol::tool_names(&result))
}

/// The predicate matched on the last collected frame; parse it back out.
fn matched_message(
    frames: &[InboundFrame],
    stage: &'static str,
) -> Result<JsonRpcMessage, DiscoveryError> {
    frames
        .last()
        .and_then(protocol::parse_frame)
        .ok_or(DiscoveryError::Malformed { stage })
}
