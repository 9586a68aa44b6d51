use crate::{client::McpClient, completer::Completer, prompt::ReplPrompt, term::*};
use kavion_mcp::tools::{ToolInvocation, render_result};
use nu_ansi_term::{Color, Style};
use reedline::{
    self, ColumnarMenu, DefaultHinter, DefaultValidator, Emacs, ExampleHighlighter,
    ExternalPrinter, KeyCode, KeyModifiers, Keybindings, MenuBuilder, Reedline, ReedlineEvent,
    ReedlineMenu, Signal, default_emacs_keybindings,
};
use rmcp::model::Tool;
use std::{boxed::Box, ops::ControlFlow};

/// Interactive shell over a connected Kavion MCP server
pub struct Repl {
    prompt: ReplPrompt,
    client: McpClient,
    keybindings: Keybindings,
    external_printer: ExternalPrinter<String>,
    hinter_style: Style,
}

impl Repl {
    pub fn new(client: McpClient) -> Self {
        let name = &client.server_info().server_info.name;
        let style = Style::new().italic().fg(Color::LightGray);
        let mut keybindings = default_emacs_keybindings();
        keybindings.add_binding(
            KeyModifiers::NONE,
            KeyCode::Tab,
            ReedlineEvent::Menu("completion_menu".to_string()),
        );
        let prompt = ReplPrompt::new(&paint_green_bold(&format!("{name}> ")));

        Self {
            hinter_style: style,
            prompt,
            client,
            keybindings,
            external_printer: ExternalPrinter::new(2048),
        }
    }

    /// Map a shortcut command to a prepared tool invocation.
    fn shortcut(command: &str, args: Option<&str>) -> Option<ToolInvocation> {
        match command {
            "sql" => Some(ToolInvocation::execute_sql(args?)),
            "docs" => Some(ToolInvocation::search_docs(args?)),
            "tables" => {
                let schemas: Vec<String> = args
                    .unwrap_or_default()
                    .split_whitespace()
                    .map(str::to_string)
                    .collect();
                Some(ToolInvocation::list_tables(&schemas))
            }
            "stats" => Some(ToolInvocation::get_quick_stats()),
            "extensions" => Some(ToolInvocation::list_extensions()),
            "migrations" => Some(ToolInvocation::list_migrations()),
            _ => None,
        }
    }

    async fn handle_command(
        &mut self,
        command: &str,
        args: Option<&str>,
    ) -> anyhow::Result<ControlFlow<()>> {
        match command {
            "h" | "help" => {
                if let Some(name) = args {
                    if let Some(tool) = self.client.get_tool(name) {
                        self.print_tool(tool);
                    }
                } else {
                    self.show_help();
                }
            }
            "list" | "tools" => {
                self.list_tools();
            }
            "server" | "info" => {
                self.show_server_info();
            }
            "q" | "quit" | "exit" => {
                return Ok(ControlFlow::Break(()));
            }
            _ => {
                if let Some(invocation) = Self::shortcut(command, args) {
                    let result = self
                        .client
                        .call_tool(invocation.name, Some(invocation.arguments.clone()))
                        .await?;
                    println!("\n{}\n", render_result(&result));
                } else if self.client.tool_names().contains(&command.to_string()) {
                    let args_json = match args {
                        Some(args) => Some(self.parse_json_args(args)?),
                        None => None,
                    };

                    let result = self.client.call_tool(command, args_json).await?;
                    println!("\n{}\n", render_result(&result));
                } else {
                    println!("Unknown command: {command}. Type 'help' for available commands.");
                }
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    fn show_help(&self) {
        println!("Available commands:");
        println!("  help             - Show this help message");
        println!("  list, tools      - List available tools");
        println!("  server, info     - Show server information");
        println!("  q, quit, exit    - Exit the REPL");
        println!();
        println!("Shortcuts:");
        println!("  sql <query>      - Run a SQL query");
        println!("  docs <query>     - Search the documentation");
        println!("  tables [schema]  - List tables (defaults to public)");
        println!("  stats            - Quick database statistics");
        println!("  extensions       - List database extensions");
        println!("  migrations       - List applied migrations");
        println!();
        println!("Any tool can also be called directly:");
        println!("  <tool_name> {{arg1: 'value1', arg2: 'value2'}}");
    }

    fn list_tools(&self) {
        println!("Available tools:");
        for tool_name in self.client.tool_names() {
            if let Some(tool) = self.client.get_tool(&tool_name) {
                self.print_tool(tool);
            }
        }
    }

    fn print_tool(&self, tool: &Tool) {
        println!("## {}\n", tool.name);

        if let Some(description) = tool.description.as_ref() {
            println!("{description}\n");
        }

        if let Ok(schema_str) = serde_json::to_string_pretty(&tool.input_schema) {
            println!("Schema:\n{schema_str}\n");
        }
    }

    fn show_server_info(&self) {
        let server_info = self.client.server_info();
        println!("Server Information:");
        println!("  Name: {}", server_info.server_info.name);
        println!("  Version: {}", server_info.server_info.version);
        println!("  Protocol: {}", server_info.protocol_version);

        if let Some(instructions) = &server_info.instructions {
            println!("  Instructions:");
            for line in instructions.lines() {
                println!("    {line}");
            }
        }
    }

    fn parse_line<'a>(&self, line: &'a str) -> Option<(&'a str, Option<&'a str>)> {
        let line = line.trim();

        if line.is_empty() {
            return None;
        }

        let Some((command, args)) = line.split_once(' ') else {
            return Some((line, None));
        };

        let args = args.trim();
        if args.is_empty() {
            Some((command, None))
        } else {
            Some((command, Some(args)))
        }
    }

    async fn process_line(&mut self, line: String) -> anyhow::Result<ControlFlow<()>> {
        if let Some((command, args)) = self.parse_line(&line) {
            self.handle_command(command, args).await
        } else {
            self.handle_command("help", None).await
        }
    }

    fn parse_json_args(&self, args: &str) -> anyhow::Result<serde_json::Value> {
        // JSON5 keeps quoting relaxed for hand-typed arguments
        match json5::from_str(args) {
            Ok(value) => Ok(value),
            Err(e) => Err(anyhow::anyhow!("Failed to parse JSON: {}", e)),
        }
    }

    fn build_line_editor(&self) -> anyhow::Result<Reedline> {
        let completer = Completer::new(&self.client);
        let valid_commands = completer.commands().to_vec();

        let completer = Box::new(completer);
        let completion_menu = Box::new(ColumnarMenu::default().with_name("completion_menu"));
        let validator = Box::new(DefaultValidator);
        let line_editor = Reedline::create()
            .with_edit_mode(Box::new(Emacs::new(self.keybindings.clone())))
            .with_completer(completer)
            .with_menu(ReedlineMenu::EngineCompleter(completion_menu))
            .with_highlighter(Box::new(ExampleHighlighter::new(valid_commands)))
            .with_validator(validator)
            .with_partial_completions(true)
            .with_quick_completions(true)
            .with_external_printer(self.external_printer.clone())
            .with_hinter(Box::new(
                DefaultHinter::default().with_style(self.hinter_style),
            ));

        Ok(line_editor)
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        let mut line_editor = self.build_line_editor()?;

        loop {
            let sig = line_editor.read_line(&self.prompt)?;
            match sig {
                Signal::Success(line) => match self.process_line(line).await {
                    Ok(ControlFlow::Continue(())) => {}
                    Ok(ControlFlow::Break(())) => {
                        break;
                    }
                    Err(err) => {
                        println!("Error: {}", paint_yellow_bold(&err.to_string()));
                    }
                },
                Signal::CtrlC | Signal::CtrlD => {
                    break;
                }
            }
        }
        Ok(())
    }

    pub async fn run_non_interactive(&mut self) -> anyhow::Result<()> {
        use tokio::io::{AsyncBufReadExt, BufReader};

        let stdin = tokio::io::stdin();
        let reader = BufReader::new(stdin);
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            match self.process_line(line).await {
                Ok(ControlFlow::Continue(())) => {}
                Ok(ControlFlow::Break(())) => {
                    break;
                }
                Err(err) => {
                    println!("Error: {err}");
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortcuts_build_invocations() {
        let invocation = Repl::shortcut("sql", Some("SELECT 1")).unwrap();
        assert_eq!(invocation.name, "execute_sql");
        assert_eq!(invocation.arguments["query"], "SELECT 1");

        let invocation = Repl::shortcut("tables", None).unwrap();
        assert_eq!(invocation.arguments["schemas"], serde_json::json!(["public"]));

        let invocation = Repl::shortcut("tables", Some("auth storage")).unwrap();
        assert_eq!(
            invocation.arguments["schemas"],
            serde_json::json!(["auth", "storage"])
        );

        assert!(Repl::shortcut("sql", None).is_none());
        assert!(Repl::shortcut("unknown", None).is_none());
    }
}
