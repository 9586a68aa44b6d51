//! JSON-RPC envelope for talking to the Kavion MCP server.
//!
//! The server frames messages as one JSON object per line on stdio. Its
//! stdout also carries plain-text startup banners, so incoming lines have
//! to be classified before they can be routed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol revision the harness speaks.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }

    /// The `initialize` handshake request.
    pub fn initialize(id: u64, client_name: &str, client_version: &str) -> Self {
        Self::new(
            id,
            "initialize",
            Some(initialize_params(client_name, client_version)),
        )
    }

    pub fn tools_list(id: u64) -> Self {
        Self::new(id, "tools/list", Some(serde_json::json!({})))
    }

    pub fn tools_call(id: u64, tool: &str, arguments: Value) -> Self {
        Self::new(
            id,
            "tools/call",
            Some(serde_json::json!({
                "name": tool,
                "arguments": arguments,
            })),
        )
    }

    /// Serialize to the newline-terminated wire form.
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Parameters for the `initialize` handshake.
pub fn initialize_params(client_name: &str, client_version: &str) -> Value {
    serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": { "tools": {} },
        "clientInfo": {
            "name": client_name,
            "version": client_version,
        },
    })
}

/// A request without an id, i.e. one the server will not answer.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }

    /// Sent after a successful `initialize` exchange.
    pub fn initialized() -> Self {
        Self::new("notifications/initialized", None)
    }

    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    /// Echoed request id. Kept as a raw value since remote peers may use
    /// string ids even though this harness always sends numbers.
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    pub fn numeric_id(&self) -> Option<u64> {
        self.id.as_ref().and_then(Value::as_u64)
    }

    /// Collapse into the inner result, surfacing a server error.
    pub fn into_result(self) -> crate::Result<Value> {
        if let Some(err) = self.error {
            return Err(crate::Error::Rpc(err));
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// What a line read from the server's stdout turned out to be.
#[derive(Debug)]
pub enum StdoutLine {
    /// A JSON-RPC response with an id.
    Response(Response),
    /// Startup banner, progress message, or other non-protocol output.
    Banner(String),
}

/// Classify a stdout line. Anything that does not parse as a JSON-RPC
/// response object is treated as server chatter, never as an error.
pub fn classify_line(line: &str) -> StdoutLine {
    let trimmed = line.trim();
    if trimmed.starts_with('{') {
        if let Ok(response) = serde_json::from_str::<Response>(trimmed) {
            if response.id.is_some() || response.error.is_some() {
                return StdoutLine::Response(response);
            }
        }
    }
    StdoutLine::Banner(trimmed.to_string())
}

/// Monotonic request id allocator, one per connection.
#[derive(Debug, Default)]
pub struct IdSequence(AtomicU64);

impl IdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}
