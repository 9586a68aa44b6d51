//! Anthropic Messages API client with the bridge attached as a remote
//! MCP server, for the `ask` flow.

use reqwest::header;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::{Error, Result};

const DEFAULT_ALLOWED_TOOLS: [&str; 4] =
    ["execute_sql", "list_tables", "search_docs", "get_quick_stats"];

/// Configuration for the Messages API call.
#[derive(Debug, Clone)]
pub struct AskConfig {
    /// API key; read from `ANTHROPIC_API_KEY` when unset.
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub api_version: String,
    /// Beta flag enabling the MCP connector.
    pub beta: String,
    pub max_tokens: u32,
    pub timeout: Duration,
    /// Tools the model may call through the bridge.
    pub allowed_tools: Vec<String>,
}

impl Default for AskConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.anthropic.com".to_string(),
            model: "claude-3-5-sonnet-20241022".to_string(),
            api_version: "2023-06-01".to_string(),
            beta: "mcp-client-2025-04-04".to_string(),
            max_tokens: 1024,
            timeout: Duration::from_secs(120),
            allowed_tools: DEFAULT_ALLOWED_TOOLS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl AskConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn resolve_api_key(&self) -> Result<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .ok_or_else(|| {
                Error::InvalidConfig("ANTHROPIC_API_KEY is not set".to_string())
            })
    }
}

#[derive(Debug, Serialize)]
struct ToolConfiguration {
    enabled: bool,
    allowed_tools: Vec<String>,
}

#[derive(Debug, Serialize)]
struct McpServerDef {
    #[serde(rename = "type")]
    server_type: &'static str,
    url: String,
    name: &'static str,
    tool_configuration: ToolConfiguration,
}

#[derive(Debug, Serialize)]
struct MessageRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<RequestMessage>,
    mcp_servers: Vec<McpServerDef>,
}

#[derive(Debug, Serialize)]
struct RequestMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    content: Vec<Value>,
    #[serde(default)]
    stop_reason: Option<String>,
}

/// A tool invocation the model made through the MCP connector.
#[derive(Debug, Clone)]
pub struct ToolUse {
    pub name: String,
    pub input: Value,
}

/// The parts of the reply the demo cares about.
#[derive(Debug)]
pub struct AskOutcome {
    pub text: String,
    pub tool_uses: Vec<ToolUse>,
    pub stop_reason: Option<String>,
}

fn build_request(config: &AskConfig, mcp_url: &str, prompt: &str) -> MessageRequest {
    MessageRequest {
        model: config.model.clone(),
        max_tokens: config.max_tokens,
        messages: vec![RequestMessage {
            role: "user",
            content: prompt.to_string(),
        }],
        mcp_servers: vec![McpServerDef {
            server_type: "url",
            url: mcp_url.to_string(),
            name: "kavion",
            tool_configuration: ToolConfiguration {
                enabled: true,
                allowed_tools: config.allowed_tools.clone(),
            },
        }],
    }
}

fn parse_outcome(response: MessageResponse) -> AskOutcome {
    let mut text = String::new();
    let mut tool_uses = Vec::new();

    for block in &response.content {
        match block["type"].as_str() {
            Some("text") => {
                if let Some(chunk) = block["text"].as_str() {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(chunk);
                }
            }
            Some("mcp_tool_use") | Some("tool_use") => {
                tool_uses.push(ToolUse {
                    name: block["name"].as_str().unwrap_or("unknown").to_string(),
                    input: block["input"].clone(),
                });
            }
            _ => {}
        }
    }

    AskOutcome {
        text,
        tool_uses,
        stop_reason: response.stop_reason,
    }
}

/// Ask the model a question with the bridge's `/mcp` endpoint registered
/// as a remote MCP server.
pub async fn ask(config: &AskConfig, mcp_url: &str, prompt: &str) -> Result<AskOutcome> {
    let api_key = config.resolve_api_key()?;
    let request = build_request(config, mcp_url, prompt);

    let response = reqwest::Client::new()
        .post(format!("{}/v1/messages", config.base_url))
        .timeout(config.timeout)
        .header("x-api-key", api_key)
        .header("anthropic-version", &config.api_version)
        .header("anthropic-beta", &config.beta)
        .header(header::CONTENT_TYPE, "application/json")
        .json(&request)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::Api {
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        });
    }

    Ok(parse_outcome(response.json().await?))
}
