//! Cursor editor integration: write the stdio server into `mcp.json`.

use std::path::PathBuf;

use serde_json::{Value, json};

use crate::config::Config;
use crate::{Error, Result};

pub const DEFAULT_SERVER_NAME: &str = "kavion";

/// Build the `mcpServers` entry for a direct stdio connection.
pub fn server_entry(config: &Config) -> Value {
    let env: serde_json::Map<String, Value> = config
        .server_env()
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect();

    json!({
        "command": config.command,
        "args": config.server_args(),
        "env": env,
    })
}

/// Merge an entry into an existing config, preserving other servers.
pub fn merge_entry(mut existing: Value, name: &str, entry: Value) -> Value {
    if !existing.is_object() {
        existing = json!({});
    }
    let servers = existing
        .as_object_mut()
        .unwrap()
        .entry("mcpServers")
        .or_insert_with(|| json!({}));
    if !servers.is_object() {
        *servers = json!({});
    }
    servers.as_object_mut().unwrap().insert(name.to_string(), entry);
    existing
}

/// Candidate Cursor config directories, most common first.
pub fn candidate_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(home) = dirs::home_dir() {
        dirs.push(home.join(".cursor"));
        dirs.push(home.join(".config").join("cursor"));
        dirs.push(home.join("Library").join("Application Support").join("Cursor"));
        dirs.push(home.join("AppData").join("Roaming").join("Cursor"));
    }
    dirs
}

/// Write the config into the first existing candidate directory,
/// creating `~/.cursor` when none exists yet. Returns the config path.
pub fn install(config: &Config, server_name: &str) -> Result<PathBuf> {
    let candidates = candidate_dirs();
    let dir = candidates
        .iter()
        .find(|dir| dir.exists())
        .cloned()
        .or_else(|| candidates.first().cloned())
        .ok_or_else(|| Error::InvalidConfig("cannot determine home directory".to_string()))?;

    install_into(config, server_name, dir)
}

fn install_into(config: &Config, server_name: &str, dir: PathBuf) -> Result<PathBuf> {
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("mcp.json");

    let existing = match std::fs::read_to_string(&path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|_| json!({})),
        Err(_) => json!({}),
    };

    let merged = merge_entry(existing, server_name, server_entry(config));
    std::fs::write(&path, serde_json::to_string_pretty(&merged)?)?;
    Ok(path)
}
