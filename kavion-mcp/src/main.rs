use std::path::PathBuf;

use clap::{Parser, Subcommand};
use kavion_mcp::tools::ToolInvocation;
use kavion_mcp::{Config, scenario};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

#[derive(Parser)]
#[command(name = "kavion-mcp", version, about = "Harness for the Kavion MCP server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP bridge in front of the stdio server
    Serve {
        /// Listen port (overrides PORT)
        #[arg(long)]
        port: Option<u16>,
        /// Path to the server entry point
        #[arg(long)]
        server_path: Option<PathBuf>,
    },
    /// Smoke-test a running bridge
    Check {
        #[arg(long, default_value = "http://localhost:3000")]
        bridge: Url,
    },
    /// Spawn the server directly and run the stdio handshake
    StdioCheck {
        #[arg(long)]
        server_path: Option<PathBuf>,
    },
    /// Probe SSE session negotiation
    SseCheck {
        #[arg(long, default_value = "http://localhost:8000")]
        url: Url,
    },
    /// Run a SQL query
    Sql {
        query: String,
        #[arg(long, default_value = "http://localhost:3000")]
        bridge: Url,
    },
    /// List database tables
    Tables {
        /// Schemas to search (defaults to public)
        schemas: Vec<String>,
        #[arg(long, default_value = "http://localhost:3000")]
        bridge: Url,
    },
    /// Search the documentation
    Docs {
        query: String,
        #[arg(long, default_value = "http://localhost:3000")]
        bridge: Url,
    },
    /// Get quick database statistics
    Stats {
        #[arg(long, default_value = "http://localhost:3000")]
        bridge: Url,
    },
    /// List database extensions
    Extensions {
        #[arg(long, default_value = "http://localhost:3000")]
        bridge: Url,
    },
    /// List applied migrations
    Migrations {
        #[arg(long, default_value = "http://localhost:3000")]
        bridge: Url,
    },
    /// Apply a migration
    ApplyMigration {
        name: String,
        query: String,
        #[arg(long, default_value = "http://localhost:3000")]
        bridge: Url,
    },
    /// Write the server into Cursor's mcp.json
    Cursor {
        #[arg(long, default_value = kavion_mcp::cursor::DEFAULT_SERVER_NAME)]
        name: String,
    },
    /// Ask a question via the Anthropic MCP connector
    Ask {
        prompt: String,
        #[arg(long)]
        model: Option<String>,
        #[arg(long, default_value = "http://localhost:3000")]
        bridge: Url,
    },
}

fn base_config(server_path: Option<PathBuf>) -> Config {
    let mut config = Config::from_env();
    if let Some(path) = server_path {
        config.server_path = path;
    }
    config
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("info,{}=debug", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { port, server_path } => {
            let mut config = base_config(server_path);
            if let Some(port) = port {
                config.bind_port = port;
            }
            kavion_mcp::bridge::serve(config).await?;
        }
        Command::Check { bridge } => scenario::check(bridge).await?,
        Command::StdioCheck { server_path } => {
            scenario::stdio_check(base_config(server_path)).await?;
        }
        Command::SseCheck { url } => scenario::sse_check(url).await?,
        Command::Sql { query, bridge } => {
            scenario::run_tool(bridge, ToolInvocation::execute_sql(&query)).await?;
        }
        Command::Tables { schemas, bridge } => {
            scenario::run_tool(bridge, ToolInvocation::list_tables(&schemas)).await?;
        }
        Command::Docs { query, bridge } => {
            scenario::run_tool(bridge, ToolInvocation::search_docs(&query)).await?;
        }
        Command::Stats { bridge } => {
            scenario::run_tool(bridge, ToolInvocation::get_quick_stats()).await?;
        }
        Command::Extensions { bridge } => {
            scenario::run_tool(bridge, ToolInvocation::list_extensions()).await?;
        }
        Command::Migrations { bridge } => {
            scenario::run_tool(bridge, ToolInvocation::list_migrations()).await?;
        }
        Command::ApplyMigration { name, query, bridge } => {
            scenario::run_tool(bridge, ToolInvocation::apply_migration(&name, &query)).await?;
        }
        Command::Cursor { name } => {
            let path = kavion_mcp::cursor::install(&Config::from_env(), &name)?;
            println!("wrote {}", path.display());
            println!("restart Cursor, then check its MCP settings for '{name}'");
        }
        Command::Ask { prompt, model, bridge } => {
            scenario::ask(bridge, &prompt, model).await?;
        }
    }

    Ok(())
}
