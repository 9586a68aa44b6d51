//! Smoke-test and demo flows against the bridge or the raw server.
//!
//! Each step prints what it is doing and what came back, keeps going
//! when a single call fails, and only errors out when the target is
//! unreachable.

use std::time::Duration;

use serde_json::json;
use url::Url;

use crate::backend::Backend;
use crate::client::{self, BridgeClient};
use crate::config::Config;
use crate::llm::{self, AskConfig};
use crate::tools::{self, ToolInvocation};
use crate::{Error, Result};

const SAMPLE_SQL: &str = "SELECT id, name, description FROM datasets LIMIT 3;";

fn print_result(label: &str, result: &serde_json::Value) {
    let rendered = tools::render_result(result);
    println!("{label}:");
    for line in rendered.lines().take(20) {
        println!("  {line}");
    }
    println!();
}

/// Health, tool list, and two sample calls against a running bridge.
pub async fn check(bridge: Url) -> Result<()> {
    let client = BridgeClient::new(bridge);

    let health = match client.health().await {
        Ok(health) => health,
        Err(err) => {
            eprintln!("cannot reach the bridge: {err}");
            eprintln!("start it with: kavion-mcp serve");
            return Err(err);
        }
    };
    println!(
        "health: {} (server ready: {})",
        health.status, health.mcp_server_ready
    );

    match client.list_tools().await {
        Ok(list) => {
            let names: Vec<&str> = list.iter().map(|tool| tool.name.as_str()).collect();
            println!("tools: {}", names.join(", "));
        }
        Err(err) => println!("tools/list failed: {err}"),
    }

    match client.call(&ToolInvocation::execute_sql(SAMPLE_SQL)).await {
        Ok(result) => print_result("execute_sql", &result),
        Err(err) => println!("execute_sql failed: {err}"),
    }

    match client.call(&ToolInvocation::list_tables(&[])).await {
        Ok(result) => print_result("list_tables", &result),
        Err(err) => println!("list_tables failed: {err}"),
    }

    Ok(())
}

/// Spawn the server directly and run the handshake plus a cheap call.
pub async fn stdio_check(config: Config) -> Result<()> {
    println!(
        "spawning: {} {}",
        config.command,
        config.server_args().join(" ")
    );

    let backend = Backend::connect(&config).await?;
    let pipe = backend.pipe();
    println!("initialize: ok");

    let result = pipe
        .request("tools/list", Some(json!({})), Duration::from_secs(30))
        .await?;
    let list = tools::parse_tool_list(&result);
    println!("tools ({}):", list.len());
    for tool in &list {
        println!(
            "  {} - {}",
            tool.name,
            tool.description.as_deref().unwrap_or("no description")
        );
    }

    let stats = ToolInvocation::get_quick_stats();
    match pipe
        .request(
            "tools/call",
            Some(json!({ "name": stats.name, "arguments": stats.arguments })),
            stats.timeout,
        )
        .await
    {
        Ok(result) => print_result("get_quick_stats", &result),
        Err(err) => println!("get_quick_stats failed: {err}"),
    }

    backend.kill().await;
    Ok(())
}

/// Health plus SSE session negotiation against an SSE-capable server.
pub async fn sse_check(base: Url) -> Result<()> {
    let client = BridgeClient::new(base.clone());
    match client.health().await {
        Ok(health) => println!("health: {}", health.status),
        Err(err) => println!("health check failed: {err}"),
    }

    let handshake = client::negotiate_sse(&base, Duration::from_secs(10)).await?;
    println!("sse endpoint: {}", handshake.endpoint);
    println!("session id: {}", handshake.session_id);
    Ok(())
}

/// Run one tool invocation through the bridge and print the result.
pub async fn run_tool(bridge: Url, invocation: ToolInvocation) -> Result<()> {
    let client = BridgeClient::new(bridge);
    let result = client.call(&invocation).await?;
    print_result(invocation.name, &result);
    Ok(())
}

/// Ask the model a question with the bridge attached as an MCP server.
pub async fn ask(bridge: Url, prompt: &str, model: Option<String>) -> Result<()> {
    let mut config = AskConfig::default();
    if let Some(model) = model {
        config = config.with_model(model);
    }

    let mcp_url = bridge
        .join("/mcp")
        .map_err(|err| Error::InvalidConfig(format!("bad bridge URL: {err}")))?;

    println!("asking {} ...", config.model);
    let outcome = llm::ask(&config, mcp_url.as_str(), prompt).await?;

    for tool_use in &outcome.tool_uses {
        println!("tool use: {} {}", tool_use.name, tool_use.input);
    }
    println!("{}", outcome.text);
    if let Some(reason) = &outcome.stop_reason {
        if reason != "end_turn" {
            println!("(stopped: {reason})");
        }
    }
    Ok(())
}
