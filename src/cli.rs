use crate::session_history::SessionKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// An AI coding assistant for your workspace
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Workspace root (defaults to the current directory)
    #[arg(short, long, global = true, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Model to use instead of the configured one
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run an editing session on a working set
    Edit {
        prompt: String,
        /// Working set file (repeatable)
        #[arg(short, long = "file", value_name = "PATH")]
        files: Vec<PathBuf>,
    },
    /// Ask a question in the panel chat
    Chat { prompt: String },
    /// Run the rule-based agent workflow
    Agent { prompt: String },
    /// Apply SEARCH/REPLACE blocks to a file
    Patch {
        file: PathBuf,
        /// File holding the blocks; `-` or nothing reads stdin
        blocks: Option<PathBuf>,
    },
    /// List the tool catalog
    Tools,
    /// Inspect the session history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum HistoryAction {
    /// List recorded sessions, newest first
    List {
        #[arg(long = "type", value_enum)]
        kind: Option<SessionKind>,
    },
    /// Print the request and response of one session
    Show { id: String },
    /// Remove one session
    Remove { id: String },
    /// Remove all sessions
    Clear,
}
