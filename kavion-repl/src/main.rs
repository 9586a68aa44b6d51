mod client;
mod completer;
mod prompt;
mod repl;
mod term;

use clap::Parser;
use client::{McpClient, Transport};
use crossterm::tty::IsTty;
use repl::Repl;

/// Interactive client for the Kavion MCP server.
///
/// With no target, spawns the stdio server described by the environment
/// (KAVION_MCP_SERVER, SUPABASE_URL, ...). A target starting with http
/// is treated as a streamable HTTP endpoint, anything else as a command
/// to spawn.
#[derive(Parser)]
#[command(name = "kavion-repl", version)]
struct Cli {
    /// Server URL or command with arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    target: Vec<String>,
}

fn pick_transport(mut target: Vec<String>) -> Transport {
    if target.is_empty() {
        return Transport::from_config(&kavion_mcp::Config::from_env());
    }

    let first = target.remove(0);
    if first.starts_with("http") {
        Transport::Http { url: first }
    } else {
        Transport::Stdio {
            command: first,
            args: target,
            env: Vec::new(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("Kavion REPL - interactive MCP client");
    println!("====================================");

    let cli = Cli::parse();
    let client = McpClient::new(pick_transport(cli.target)).await?;

    let server_info = client.server_info();
    println!();
    println!(
        "Connected to: {} v{}",
        server_info.server_info.name, server_info.server_info.version
    );
    println!("Protocol: {}", server_info.protocol_version);
    println!("Available tools: {}", client.tool_names().len());
    println!();
    println!("Type 'help' ('h') for available commands, 'quit' ('q') to exit.");
    println!();

    let mut repl = Repl::new(client);

    if std::io::stdin().is_tty() {
        repl.run().await?;
    } else {
        repl.run_non_interactive().await?;
    }

    println!("Goodbye!");
    Ok(())
}
