//! The Kavion server's tool surface.
//!
//! Tool names and argument shapes are owned by the external server; this
//! module only mirrors them so callers get one place to build a
//! `tools/call` and to render what came back.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

/// A prepared `tools/call` invocation.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub name: &'static str,
    pub arguments: Value,
    /// Deadline for this call; SQL gets more headroom than the rest.
    pub timeout: Duration,
}

impl ToolInvocation {
    fn new(name: &'static str, arguments: Value) -> Self {
        Self {
            name,
            arguments,
            timeout: Duration::from_secs(30),
        }
    }

    fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn execute_sql(query: &str) -> Self {
        Self::new("execute_sql", serde_json::json!({ "query": query }))
            .with_timeout(Duration::from_secs(120))
    }

    pub fn list_tables(schemas: &[String]) -> Self {
        let schemas: Vec<&str> = if schemas.is_empty() {
            vec!["public"]
        } else {
            schemas.iter().map(String::as_str).collect()
        };
        Self::new("list_tables", serde_json::json!({ "schemas": schemas }))
    }

    pub fn search_docs(query: &str) -> Self {
        Self::new("search_docs", serde_json::json!({ "query": query }))
    }

    pub fn get_quick_stats() -> Self {
        Self::new("get_quick_stats", serde_json::json!({}))
    }

    pub fn list_extensions() -> Self {
        Self::new("list_extensions", serde_json::json!({}))
    }

    pub fn list_migrations() -> Self {
        Self::new("list_migrations", serde_json::json!({}))
    }

    pub fn apply_migration(name: &str, query: &str) -> Self {
        Self::new(
            "apply_migration",
            serde_json::json!({ "name": name, "query": query }),
        )
        .with_timeout(Duration::from_secs(120))
    }
}

/// Tool metadata as returned by `tools/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "inputSchema")]
    pub input_schema: Option<Value>,
}

/// Parse the `tools` array out of a `tools/list` result.
pub fn parse_tool_list(result: &Value) -> Vec<ToolDescriptor> {
    result["tools"]
        .as_array()
        .map(|tools| {
            tools
                .iter()
                .filter_map(|tool| serde_json::from_value(tool.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Render a `tools/call` result for the terminal: concatenated text
/// content blocks when present, pretty JSON otherwise.
pub fn render_result(result: &Value) -> String {
    let texts: Vec<&str> = result["content"]
        .as_array()
        .map(|blocks| {
            blocks
                .iter()
                .filter(|block| block["type"] == "text")
                .filter_map(|block| block["text"].as_str())
                .collect()
        })
        .unwrap_or_default();

    if texts.is_empty() {
        serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string())
    } else {
        texts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_sql_arguments() {
        let invocation = ToolInvocation::execute_sql("SELECT id FROM datasets LIMIT 3;");
        assert_eq!(invocation.name, "execute_sql");
        assert_eq!(
            invocation.arguments["query"],
            "SELECT id FROM datasets LIMIT 3;"
        );
        assert_eq!(invocation.timeout, Duration::from_secs(120));
    }

    #[test]
    fn list_tables_defaults_to_public() {
        let invocation = ToolInvocation::list_tables(&[]);
        assert_eq!(invocation.arguments["schemas"], serde_json::json!(["public"]));

        let schemas = vec!["auth".to_string(), "storage".to_string()];
        let invocation = ToolInvocation::list_tables(&schemas);
        assert_eq!(
            invocation.arguments["schemas"],
            serde_json::json!(["auth", "storage"])
        );
    }

    #[test]
    fn zero_argument_tools_send_empty_objects() {
        for invocation in [
            ToolInvocation::get_quick_stats(),
            ToolInvocation::list_extensions(),
            ToolInvocation::list_migrations(),
        ] {
            assert_eq!(invocation.arguments, serde_json::json!({}));
        }
    }

    #[test]
    fn apply_migration_arguments() {
        let invocation = ToolInvocation::apply_migration("add_index", "CREATE INDEX ...");
        assert_eq!(invocation.arguments["name"], "add_index");
        assert_eq!(invocation.arguments["query"], "CREATE INDEX ...");
    }

    #[test]
    fn parse_tool_list_extracts_names() {
        let result = serde_json::json!({
            "tools": [
                { "name": "execute_sql", "description": "Run SQL", "inputSchema": {"type": "object"} },
                { "name": "list_tables" },
            ]
        });
        let tools = parse_tool_list(&result);
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "execute_sql");
        assert_eq!(tools[0].description.as_deref(), Some("Run SQL"));
        assert!(tools[1].description.is_none());
    }

    #[test]
    fn render_result_prefers_text_blocks() {
        let result = serde_json::json!({
            "content": [
                { "type": "text", "text": "3 rows" },
                { "type": "image", "data": "..." },
                { "type": "text", "text": "done" },
            ]
        });
        assert_eq!(render_result(&result), "3 rows\ndone");
    }

    #[test]
    fn render_result_falls_back_to_json() {
        let result = serde_json::json!({ "rows": [1, 2, 3] });
        let rendered = render_result(&result);
        assert!(rendered.contains("\"rows\""));
    }
}
