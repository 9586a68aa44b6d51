use crate::client::McpClient;
use reedline::{Span, Suggestion};
use rmcp::model::Tool;

/// Completer over built-in commands, shortcuts, and server tools
pub struct Completer {
    commands: Vec<String>,
    built_in: Vec<String>,
    tools: Vec<(String, Tool)>,
}

const BUILT_IN: &[&str] = &[
    "h",
    "help",
    "list",
    "tools",
    "server",
    "info",
    "q",
    "quit",
    "exit",
    "sql",
    "docs",
    "tables",
    "stats",
    "extensions",
    "migrations",
];

impl Completer {
    pub fn new(client: &McpClient) -> Self {
        let built_in: Vec<String> = BUILT_IN.iter().map(|s| s.to_string()).collect();
        let mut commands = built_in.clone();

        let mut tools = vec![];
        for name in client.tool_names() {
            commands.push(name.clone());

            let Some(tool) = client.get_tool(&name) else {
                continue;
            };

            tools.push((name, tool.clone()));
        }

        Self {
            commands,
            built_in,
            tools,
        }
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }
}

impl reedline::Completer for Completer {
    fn complete(&mut self, line: &str, pos: usize) -> Vec<Suggestion> {
        let mut completions = vec![];

        if line.contains(' ') {
            return completions;
        }

        let span = Span::new(0, pos);

        for command in &self.built_in {
            if command.starts_with(line) {
                completions.push(Suggestion {
                    value: command.clone(),
                    description: None,
                    extra: None,
                    span,
                    style: None,
                    append_whitespace: true,
                });
            }
        }

        for (name, tool) in &self.tools {
            if name.starts_with(line) {
                completions.push(Suggestion {
                    value: name.clone(),
                    description: tool.description.as_ref().map(|v| v.to_string()),
                    extra: None,
                    span,
                    style: None,
                    append_whitespace: true,
                });
            }
        }

        completions
    }
}
