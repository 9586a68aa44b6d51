//! Clients for a running bridge: plain HTTP JSON-RPC and the SSE probe.

use std::time::Duration;

use futures::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use crate::rpc::Response;
use crate::tools::{self, ToolDescriptor, ToolInvocation};
use crate::{Error, Result};

/// What `GET /health` reports.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(rename = "mcpServerReady", default)]
    pub mcp_server_ready: bool,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Client for the bridge's `POST /mcp` forwarder.
pub struct BridgeClient {
    http: reqwest::Client,
    base: Url,
}

impl BridgeClient {
    pub fn new(base: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base,
        }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|err| Error::InvalidConfig(format!("bad bridge URL: {err}")))
    }

    pub async fn health(&self) -> Result<HealthStatus> {
        let response = self
            .http
            .get(self.endpoint("/health")?)
            .timeout(Duration::from_secs(5))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Bridge {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json().await?)
    }

    /// Forward one JSON-RPC request through the bridge.
    pub async fn rpc(&self, method: &str, params: Value, timeout: Duration) -> Result<Response> {
        let response = self
            .http
            .post(self.endpoint("/mcp")?)
            .timeout(timeout)
            .json(&json!({ "method": method, "params": params }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Bridge {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json().await?)
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let result = self
            .rpc("tools/list", json!({}), Duration::from_secs(30))
            .await?
            .into_result()?;
        Ok(tools::parse_tool_list(&result))
    }

    pub async fn call(&self, invocation: &ToolInvocation) -> Result<Value> {
        self.rpc(
            "tools/call",
            json!({
                "name": invocation.name,
                "arguments": invocation.arguments,
            }),
            invocation.timeout,
        )
        .await?
        .into_result()
    }
}

/// Result of SSE session negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseHandshake {
    /// The message endpoint handed out by the server.
    pub endpoint: String,
    pub session_id: String,
}

/// Incremental scanner over SSE lines looking for the `endpoint` event.
#[derive(Debug, Default)]
pub struct EndpointScanner {
    event: Option<String>,
}

impl EndpointScanner {
    /// Feed one line of the SSE stream.
    pub fn push_line(&mut self, line: &str) -> Option<SseHandshake> {
        let line = line.trim_end_matches('\r');

        if line.is_empty() {
            self.event = None;
            return None;
        }
        if let Some(event) = line.strip_prefix("event:") {
            self.event = Some(event.trim().to_string());
            return None;
        }
        if let Some(data) = line.strip_prefix("data:") {
            let data = data.trim();
            // Some server generations skip the event name, so fall back
            // to spotting the session parameter itself.
            let is_endpoint =
                self.event.as_deref() == Some("endpoint") || data.contains("session_id=");
            if is_endpoint {
                if let Some((_, session_id)) = data.split_once("session_id=") {
                    return Some(SseHandshake {
                        endpoint: data.to_string(),
                        session_id: session_id.to_string(),
                    });
                }
            }
        }
        None
    }
}

/// Open the SSE endpoint and wait for session negotiation.
pub async fn negotiate_sse(base: &Url, timeout: Duration) -> Result<SseHandshake> {
    let url = base
        .join("/sse")
        .map_err(|err| Error::InvalidConfig(format!("bad SSE URL: {err}")))?;

    let negotiation = async move {
        let response = reqwest::Client::new()
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Bridge {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let mut scanner = EndpointScanner::default();
        let mut buffer = String::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            buffer.push_str(&String::from_utf8_lossy(&chunk?));
            while let Some(pos) = buffer.find('\n') {
                let line: String = buffer.drain(..=pos).collect();
                if let Some(handshake) = scanner.push_line(line.trim_end_matches('\n')) {
                    return Ok(handshake);
                }
            }
        }

        Err(Error::Protocol(
            "SSE stream ended before session negotiation".to_string(),
        ))
    };

    tokio::time::timeout(timeout, negotiation)
        .await
        .map_err(|_| Error::Timeout(timeout))?
}
