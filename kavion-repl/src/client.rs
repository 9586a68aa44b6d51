use anyhow::Result;
use rmcp::{
    ServiceExt,
    model::{CallToolRequestParam, ClientCapabilities, ClientInfo, Implementation, Tool},
    service::ServerSink,
    transport::{StreamableHttpClientTransport, TokioChildProcess},
};
use serde_json::Value;
use std::{collections::BTreeMap, ops};
use tokio::process::Command;

/// How to reach the Kavion MCP server
#[derive(Debug, Clone)]
pub enum Transport {
    /// Spawn the server and talk over stdio
    Stdio {
        command: String,
        args: Vec<String>,
        env: Vec<(String, String)>,
    },
    /// Connect to a streamable HTTP endpoint
    Http { url: String },
}

impl Transport {
    /// Stdio transport for the Kavion server described by `config`.
    pub fn from_config(config: &kavion_mcp::Config) -> Self {
        Self::Stdio {
            command: config.command.clone(),
            args: config.server_args(),
            env: config.server_env(),
        }
    }
}

type Inner = Box<dyn ops::Deref<Target = ServerSink>>;

/// Connected MCP client plus the server's advertised tool set
pub struct McpClient {
    client: Inner,
    tools: BTreeMap<String, Tool>,
}

impl McpClient {
    pub async fn new(transport: Transport) -> Result<Self> {
        let client_info = ClientInfo {
            protocol_version: Default::default(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: "kavion-repl".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        let client: Inner = match transport {
            Transport::Stdio { command, args, env } => {
                let mut cmd = Command::new(&command);
                cmd.args(args);
                for (key, value) in env {
                    cmd.env(key, value);
                }

                let handle = client_info.serve(TokioChildProcess::new(cmd)?).await?;
                Box::new(handle)
            }
            Transport::Http { url } => {
                let transport = StreamableHttpClientTransport::from_uri(url);
                let handle = client_info.serve(transport).await?;
                Box::new(handle)
            }
        };

        let mut mcp_client = Self {
            client,
            tools: BTreeMap::new(),
        };
        mcp_client.refresh_tools().await?;

        Ok(mcp_client)
    }

    pub fn server_info(&self) -> &rmcp::model::ServerInfo {
        self.client.peer_info().unwrap()
    }

    /// Re-fetch the tool list from the server
    pub async fn refresh_tools(&mut self) -> Result<()> {
        let tools = self.client.list_all_tools().await?;

        self.tools.clear();
        for tool in tools {
            self.tools.insert(tool.name.to_string(), tool);
        }

        Ok(())
    }

    /// Tool names in stable order
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn get_tool(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    pub async fn call_tool(&self, name: &str, arguments: Option<Value>) -> Result<Value> {
        if !self.tools.contains_key(name) {
            return Err(anyhow::anyhow!("Tool '{}' not found", name));
        }

        let result = self
            .client
            .call_tool(CallToolRequestParam {
                name: name.to_string().into(),
                arguments: arguments.and_then(|v| v.as_object().cloned()),
            })
            .await?;

        Ok(serde_json::to_value(result)?)
    }
}
