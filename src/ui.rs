use crate::diff::render_diff;
use crate::editing_session::ConfirmChange;
use crate::response::{ResponsePart, ResponseSink};
use crate::tools::Tool;
use anyhow::Result;
use async_trait::async_trait;
use console::style;
use std::io::{self, Write};
use std::path::Path;

/// Prints response parts to the terminal as they arrive.
pub struct ConsoleSink;

impl ResponseSink for ConsoleSink {
    fn push(&self, part: ResponsePart) {
        match part {
            ResponsePart::Progress(message) => {
                println!("[{}]", style(message).magenta());
            }
            ResponsePart::Markdown(text) => {
                print!("{text}");
                io::stdout().flush().ok();
            }
            ResponsePart::CodeBlockUri(uri) => {
                print!("{}", style(uri).cyan());
            }
            ResponsePart::FileProgress { uri, lines } => {
                eprint!("\r{}", style(format!("{uri}: {lines} lines")).dim());
                io::stderr().flush().ok();
            }
            ResponsePart::TextEdit { uri, content } => {
                let lines = content.lines().count();
                eprintln!();
                println!("{}", style(format!("edited {uri} ({lines} lines)")).green());
            }
            ResponsePart::Warning(message) => {
                eprintln!("{}", style(message).yellow());
            }
        }
    }
}

/// One line of the tool listing: name, display name, `#reference` and
/// description.
pub fn format_tool_entry(tool: &dyn Tool) -> String {
    let description = tool.schema().description.unwrap_or_default();
    format!(
        "{} {} {} {}",
        style(tool.name()).cyan().bold(),
        style(format!("({})", tool.display_name())).dim(),
        style(format!("#{}", tool.reference_name())).magenta(),
        description
    )
}

pub fn display_user_message(prompt: &str) {
    println!("[{}]", style("user").blue());
    println!("{}", style(prompt).cyan());
}

/// Asks a yes/no question on the terminal. Anything but `n` is a yes.
pub async fn ask_yes_no(question: &str) -> Result<bool> {
    print!("\x07{} ", style(format!("{question} [Y/n]")).dim());
    io::stdout().flush()?;

    let answer = tokio::task::spawn_blocking(|| {
        let mut buffer = String::new();
        io::stdin().read_line(&mut buffer).map(|read| match read {
            0 => None, // EOF (Ctrl+D)
            _ => Some(buffer.trim().to_string()),
        })
    })
    .await??;

    Ok(match answer {
        Some(input) => !input.eq_ignore_ascii_case("n"),
        None => false,
    })
}

/// Shows the diff of a proposed change and asks for confirmation.
pub struct TerminalConfirm;

#[async_trait]
impl ConfirmChange for TerminalConfirm {
    async fn confirm(&self, path: &Path, current: &str, proposed: &str) -> Result<bool> {
        eprintln!();
        println!("[{}]", style(format!("review: {}", path.display())).magenta());
        println!("{}", render_diff(current, proposed));
        ask_yes_no(&format!("Apply change to {}?", path.display())).await
    }
}
