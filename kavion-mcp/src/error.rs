use std::time::Duration;

use crate::rpc::RpcError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("MCP server is not ready")]
    NotReady,

    #[error("MCP server process is gone")]
    ServerGone,

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("server error {}: {}", .0.code, .0.message)]
    Rpc(RpcError),

    #[error("bridge returned HTTP {status}: {body}")]
    Bridge { status: u16, body: String },

    #[error("Anthropic API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Protocol(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
