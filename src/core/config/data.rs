use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::mcp::discovery::discovery_config;
use crate::mcp::session::ConnectionConfig;

/// One handshake header sent on every connection.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HeaderEntry {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct Config {
    /// Access-point address used when the CLI is invoked without one
    pub endpoint: Option<String>,
    /// Extra handshake headers for every connection
    #[serde(default)]
    pub headers: Vec<HeaderEntry>,
    /// Override for the connect timeout (seconds)
    pub connect_timeout_secs: Option<u64>,
    /// Override for the per-session listening budget (seconds)
    pub session_budget_secs: Option<u64>,
    /// Override for the inbound frame queue capacity
    pub queue_capacity: Option<usize>,
    /// Override for the maximum accepted frame size (bytes)
    pub max_frame_bytes: Option<usize>,
}

impl Config {
    /// Connection parameters for one discovery run, with file-level
    /// overrides applied on top of the discovery defaults.
    pub fn connection_config(&self, address: &str) -> ConnectionConfig {
        let mut connection = discovery_config(address);
        for entry in &self.headers {
            connection
                .headers
                .push((entry.name.clone(), entry.value.clone()));
        }
        if let Some(secs) = self.connect_timeout_secs {
            connection.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.session_budget_secs {
            connection.session_budget = Duration::from_secs(secs);
        }
        if let Some(capacity) = self.queue_capacity {
            connection.queue_capacity = capacity;
        }
        if let Some(bytes) = self.max_frame_bytes {
            connection.max_frame_bytes = bytes;
        }
        connection
    }
}

pub fn path_display(path: &Path) -> String {
    path.display().to_string()
}
