// Output formatting for CLI

use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;
use tandem_core::{Message, MessageRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

impl OutputFormat {
    /// Print a structured value; text output uses the caller's rendering
    pub fn print<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) -> Result<()> {
        match self {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
            OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
            OutputFormat::Text => println!("{}", text()),
        }
        Ok(())
    }

    pub fn is_text(&self) -> bool {
        matches!(self, OutputFormat::Text)
    }
}

/// Print a section heading for text output
pub fn print_heading(title: &str) {
    println!("=== {} ===", title);
}

/// Print a simple key-value pair for text output
pub fn print_field(label: &str, value: &str) {
    println!("{:<20} {}", format!("{}:", label), value);
}

/// Render a conversation for `--show-messages`
pub fn format_messages(messages: &[Message]) -> String {
    messages
        .iter()
        .map(format_message)
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_message(msg: &Message) -> String {
    let mut line = match msg.role {
        MessageRole::ToolResult => format!(
            "[tool_result {}{}] {}",
            msg.tool_name.as_deref().unwrap_or("?"),
            if msg.is_error { " error" } else { "" },
            msg.content
        ),
        role => format!("[{}] {}", role, msg.content),
    };
    for call in &msg.tool_calls {
        line.push_str(&format!("\n  -> {}({})", call.name, call.arguments));
    }
    line
}
