use super::{Tool, ToolContext, parse_args};
use crate::error::ToolError;
use crate::workspace::to_uri;
use async_trait::async_trait;
use openrouter_api::models::tool::FunctionDescription;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};

const DEFAULT_EXCLUDE: &str = "**/node_modules/**";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExploreArgs {
    query: String,
    exclude_pattern: Option<String>,
}

#[derive(Deserialize)]
struct PatternArgs {
    pattern: String,
}

#[derive(Deserialize)]
struct SearchInFileArgs {
    uri: String,
    query: String,
}

async fn find_uris(
    ctx: &ToolContext,
    tool: &str,
    pattern: &str,
    exclude: Option<&str>,
) -> Result<Value, ToolError> {
    if pattern.trim().is_empty() {
        return Err(ToolError::invalid(tool, "pattern is empty"));
    }
    let files = ctx
        .workspace
        .find_files(pattern, exclude)
        .await
        .map_err(|e| find_error(tool, e))?;
    Ok(Value::Array(
        files.iter().map(|f| Value::String(to_uri(f))).collect(),
    ))
}

/// A malformed glob is the caller's fault; anything else is the host's.
fn find_error(tool: &str, e: anyhow::Error) -> ToolError {
    match e.downcast_ref::<ignore::Error>() {
        Some(ignore::Error::Glob { .. }) => ToolError::invalid(tool, format!("{e:#}")),
        _ => ToolError::External(format!("{e:#}")),
    }
}

pub struct ExploreCodebaseTool;

#[async_trait]
impl Tool for ExploreCodebaseTool {
    fn name(&self) -> &'static str {
        "exploreCodebase"
    }

    fn display_name(&self) -> &'static str {
        "Explore Codebase"
    }

    fn reference_name(&self) -> &'static str {
        "explore"
    }

    fn schema(&self) -> FunctionDescription {
        FunctionDescription {
            name: self.name().to_string(),
            description: Some(
                "Explores the codebase to understand project structure and dependencies"
                    .to_string(),
            ),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search query to find relevant files" },
                    "excludePattern": { "type": "string", "description": "Pattern to exclude from search" }
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let args: ExploreArgs = parse_args(self.name(), args)?;
        let exclude = args.exclude_pattern.as_deref().unwrap_or(DEFAULT_EXCLUDE);
        find_uris(ctx, self.name(), &args.query, Some(exclude)).await
    }
}

pub struct SearchForFilesTool;

#[async_trait]
impl Tool for SearchForFilesTool {
    fn name(&self) -> &'static str {
        "searchForFiles"
    }

    fn display_name(&self) -> &'static str {
        "Search For Files"
    }

    fn reference_name(&self) -> &'static str {
        "searchFiles"
    }

    fn schema(&self) -> FunctionDescription {
        FunctionDescription {
            name: self.name().to_string(),
            description: Some("Searches for files matching a pattern".to_string()),
            parameters: json!({
                "type": "object",
                "properties": {
                    "pattern": { "type": "string", "description": "Glob pattern to search for" }
                },
                "required": ["pattern"]
            }),
        }
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let args: PatternArgs = parse_args(self.name(), args)?;
        find_uris(ctx, self.name(), &args.pattern, None).await
    }
}

pub struct SearchInFileTool;

#[async_trait]
impl Tool for SearchInFileTool {
    fn name(&self) -> &'static str {
        "searchInFile"
    }

    fn display_name(&self) -> &'static str {
        "Search In File"
    }

    fn reference_name(&self) -> &'static str {
        "searchInFile"
    }

    fn schema(&self) -> FunctionDescription {
        FunctionDescription {
            name: self.name().to_string(),
            description: Some("Searches for a string or regex in a file".to_string()),
            parameters: json!({
                "type": "object",
                "properties": {
                    "uri": { "type": "string", "description": "URI of the file to search" },
                    "query": { "type": "string", "description": "String or regex to search for" }
                },
                "required": ["uri", "query"]
            }),
        }
    }

    /// Returns the byte offset of every match.
    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let args: SearchInFileArgs = parse_args(self.name(), args)?;
        let regex = Regex::new(&args.query)
            .map_err(|e| ToolError::invalid(self.name(), format!("invalid regex: {e}")))?;
        let path = ctx.workspace.resolve_uri(&args.uri);
        let content = ctx.workspace.read_file(&path).await?;
        let offsets: Vec<usize> = regex.find_iter(&content).map(|m| m.start()).collect();
        Ok(json!(offsets))
    }
}
