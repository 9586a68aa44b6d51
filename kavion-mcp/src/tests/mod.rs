//! In-crate integration tests, driven against a scripted fake server
//! over duplex pipes instead of a spawned node process.

mod backend;
mod bridge;

use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::backend::Pipe;

pub const READY_BANNER: &str = "Server connected and ready!";

/// Script knobs for the fake server.
#[derive(Clone, Copy, Default)]
pub struct FakeOptions {
    /// Print startup banners (including the ready banner) before
    /// answering anything.
    pub print_banners: bool,
}

/// Handle to the fake server: every message it received, in order.
pub struct FakeServer {
    pub seen: Arc<Mutex<Vec<Value>>>,
}

impl FakeServer {
    pub fn saw_method(&self, method: &str) -> bool {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .any(|msg| msg["method"] == method)
    }
}

/// A quiet fake: no banners, readiness only via the initialize exchange.
pub fn quiet_server() -> (Pipe, FakeServer) {
    start_fake(FakeOptions::default())
}

/// A chatty fake that prints startup banners like the real server.
pub fn ready_server() -> (Pipe, FakeServer) {
    start_fake(FakeOptions {
        print_banners: true,
    })
}

pub fn start_fake(options: FakeOptions) -> (Pipe, FakeServer) {
    let (client_end, server_end) = tokio::io::duplex(1 << 16);
    let (client_read, client_write) = tokio::io::split(client_end);
    let (server_read, server_write) = tokio::io::split(server_end);

    let seen = Arc::new(Mutex::new(Vec::new()));
    tokio::spawn(run_fake(options, server_read, server_write, seen.clone()));

    let pipe = Pipe::start(client_read, client_write, READY_BANNER.to_string());
    (pipe, FakeServer { seen })
}

async fn run_fake(
    options: FakeOptions,
    read: impl tokio::io::AsyncRead + Unpin,
    mut write: impl tokio::io::AsyncWrite + Unpin,
    seen: Arc<Mutex<Vec<Value>>>,
) {
    if options.print_banners {
        let banners = format!("Starting Kavion Thermal/RGB MCP Server v1.0.0\n{READY_BANNER}\n");
        if write.write_all(banners.as_bytes()).await.is_err() {
            return;
        }
    }

    let mut lines = BufReader::new(read).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let Ok(message) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        seen.lock().unwrap().push(message.clone());

        let id = message["id"].clone();
        if id.is_null() {
            // Notification, nothing to answer.
            continue;
        }

        let method = message["method"].as_str().unwrap_or_default();
        let response = match method {
            "initialize" => json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "protocolVersion": "2024-11-05",
                    "capabilities": { "tools": {} },
                    "serverInfo": { "name": "kavion-fake", "version": "0.0.1" },
                }
            }),
            "tools/list" => json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "tools": [
                        {
                            "name": "execute_sql",
                            "description": "Run SQL",
                            "inputSchema": { "type": "object" },
                        },
                        { "name": "list_tables" },
                    ]
                }
            }),
            "tools/call" => {
                let tool = message["params"]["name"].as_str().unwrap_or_default();
                match tool {
                    // Never answered: exercises client-side timeouts.
                    "sleepy" => continue,
                    // Answered under the wrong id: must be dropped.
                    "confused" => json!({
                        "jsonrpc": "2.0",
                        "id": 999_999,
                        "result": {}
                    }),
                    _ => json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "result": {
                            "content": [
                                { "type": "text", "text": format!("called {tool}") }
                            ]
                        }
                    }),
                }
            }
            // Drops the connection, simulating a crashed server.
            "crash" => return,
            _ => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": "Method not found" }
            }),
        };

        let mut line = response.to_string();
        line.push('\n');
        if write.write_all(line.as_bytes()).await.is_err() {
            return;
        }
    }
}

/// Poll until `predicate` holds, failing the test after two seconds.
pub async fn wait_until(mut predicate: impl FnMut() -> bool) {
    for _ in 0..200 {
        if predicate() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("condition not reached within two seconds");
}
