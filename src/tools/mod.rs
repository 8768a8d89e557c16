//! # Tool Trait
//!
//! Every capability the model can invoke implements [`Tool`]. Tools never talk
//! to the host directly; they go through the [`ToolContext`], which carries the
//! [`Workspace`] adapter, the optional web search service and the command
//! policy.

use crate::error::ToolError;
use crate::web::WebSearch;
use crate::workspace::Workspace;
use async_trait::async_trait;
use openrouter_api::models::tool::FunctionDescription;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

pub mod command;
pub mod files;
pub mod search;
pub mod symbols;
pub mod web;

pub use self::command::{ExecuteCommandTool, RunCommandTool, RunPersistentCommandTool};
pub use self::files::{
    AnalyzeFileTool, CreateFileOrFolderTool, EditFileTool, GetDirTreeTool, ReplaceInFileTool,
    RewriteFileTool,
};
pub use self::search::{ExploreCodebaseTool, SearchForFilesTool, SearchInFileTool};
pub use self::symbols::{FindSymbolTool, ListSymbolsInFileTool, VerifyChangesTool};
pub use self::web::SearchWebTool;

/// A self-contained, executable tool.
///
/// This trait is object-safe, allowing for dynamic dispatch via
/// `Box<dyn Tool>`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique, static name of the tool. This is what the model emits in
    /// `<tool-name>`.
    fn name(&self) -> &'static str;

    /// Human-readable name shown in progress messages and prompts.
    fn display_name(&self) -> &'static str;

    /// Short name for referencing the tool from a prompt.
    fn reference_name(&self) -> &'static str;

    /// Model-facing description and JSON schema of the arguments.
    fn schema(&self) -> FunctionDescription;

    /// Runs the tool. The result is serialised to JSON before it is shown to
    /// the model, so it should contain only what the model needs.
    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, ToolError>;
}

/// Host services available to tools.
#[derive(Clone)]
pub struct ToolContext {
    pub workspace: Arc<dyn Workspace>,
    pub web_search: Option<Arc<WebSearch>>,
    pub allowed_command_prefixes: Vec<String>,
}

impl ToolContext {
    pub fn new(workspace: Arc<dyn Workspace>) -> Self {
        Self {
            workspace,
            web_search: None,
            allowed_command_prefixes: Vec::new(),
        }
    }

    pub fn with_web_search(mut self, web_search: Arc<WebSearch>) -> Self {
        self.web_search = Some(web_search);
        self
    }

    pub fn with_allowed_command_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.allowed_command_prefixes = prefixes;
        self
    }

    /// An empty prefix list allows every command.
    pub fn check_command(&self, tool: &str, command: &str) -> Result<(), ToolError> {
        let command = command.trim();
        if command.is_empty() {
            return Err(ToolError::invalid(tool, "command is empty"));
        }
        if self.allowed_command_prefixes.is_empty()
            || self
                .allowed_command_prefixes
                .iter()
                .any(|prefix| command.starts_with(prefix.as_str()))
        {
            return Ok(());
        }
        Err(ToolError::invalid(
            tool,
            format!(
                "Command '{command}' is not allowed. Only commands starting with {:?} are permitted.",
                self.allowed_command_prefixes
            ),
        ))
    }
}

pub(crate) fn parse_args<T: DeserializeOwned>(tool: &str, args: &Value) -> Result<T, ToolError> {
    serde_json::from_value(args.clone()).map_err(|e| ToolError::invalid(tool, e.to_string()))
}

/// The built-in catalog in its canonical order.
pub fn builtin_tools() -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(ExploreCodebaseTool),
        Box::new(AnalyzeFileTool),
        Box::new(EditFileTool),
        Box::new(ExecuteCommandTool),
        Box::new(VerifyChangesTool),
        Box::new(SearchWebTool),
        Box::new(CreateFileOrFolderTool),
        Box::new(RewriteFileTool),
        Box::new(RunPersistentCommandTool),
        Box::new(RunCommandTool),
        Box::new(SearchInFileTool),
        Box::new(ListSymbolsInFileTool),
        Box::new(GetDirTreeTool),
        Box::new(SearchForFilesTool),
        Box::new(FindSymbolTool),
        Box::new(ReplaceInFileTool),
    ]
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::ToolContext;
    use crate::workspace::LocalWorkspace;
    use std::sync::Arc;
    use tempfile::{Builder, TempDir};

    pub fn setup_context() -> (TempDir, ToolContext) {
        let tmp_dir = Builder::new().prefix("test-tools-").tempdir().unwrap();
        let ctx = ToolContext::new(Arc::new(LocalWorkspace::new(tmp_dir.path())));
        (tmp_dir, ctx)
    }
}
