use super::{Tool, ToolContext, parse_args};
use crate::error::ToolError;
use crate::patch;
use crate::workspace::{EntryKind, to_uri};
use async_trait::async_trait;
use openrouter_api::models::tool::FunctionDescription;
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Deserialize)]
struct UriArgs {
    uri: String,
}

#[derive(Deserialize)]
struct WriteArgs {
    uri: String,
    content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateArgs {
    uri: String,
    is_folder: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplaceArgs {
    uri: String,
    replace_blocks: String,
}

#[derive(Deserialize, Default)]
struct DirTreeArgs {
    root: Option<String>,
}

fn uri_schema(name: &str, description: &str, uri_description: &str) -> FunctionDescription {
    FunctionDescription {
        name: name.to_string(),
        description: Some(description.to_string()),
        parameters: json!({
            "type": "object",
            "properties": {
                "uri": { "type": "string", "description": uri_description }
            },
            "required": ["uri"]
        }),
    }
}

fn write_schema(name: &str, description: &str, uri_description: &str) -> FunctionDescription {
    FunctionDescription {
        name: name.to_string(),
        description: Some(description.to_string()),
        parameters: json!({
            "type": "object",
            "properties": {
                "uri": { "type": "string", "description": uri_description },
                "content": { "type": "string", "description": "New content for the file" }
            },
            "required": ["uri", "content"]
        }),
    }
}

pub struct AnalyzeFileTool;

#[async_trait]
impl Tool for AnalyzeFileTool {
    fn name(&self) -> &'static str {
        "analyzeFile"
    }

    fn display_name(&self) -> &'static str {
        "Analyze File"
    }

    fn reference_name(&self) -> &'static str {
        "analyze"
    }

    fn schema(&self) -> FunctionDescription {
        uri_schema(
            self.name(),
            "Reads and analyzes file contents",
            "URI of the file to analyze",
        )
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let args: UriArgs = parse_args(self.name(), args)?;
        let path = ctx.workspace.resolve_uri(&args.uri);
        let content = ctx.workspace.read_file(&path).await?;
        Ok(Value::String(content))
    }
}

pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &'static str {
        "editFile"
    }

    fn display_name(&self) -> &'static str {
        "Edit File"
    }

    fn reference_name(&self) -> &'static str {
        "edit"
    }

    fn schema(&self) -> FunctionDescription {
        write_schema(
            self.name(),
            "Makes changes to files in the workspace",
            "URI of the file to edit",
        )
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let args: WriteArgs = parse_args(self.name(), args)?;
        let path = ctx.workspace.resolve_uri(&args.uri);
        ctx.workspace.write_file(&path, &args.content).await?;
        tracing::info!(path = %path.display(), "file edited");
        Ok(Value::Null)
    }
}

pub struct RewriteFileTool;

#[async_trait]
impl Tool for RewriteFileTool {
    fn name(&self) -> &'static str {
        "rewriteFile"
    }

    fn display_name(&self) -> &'static str {
        "Rewrite File"
    }

    fn reference_name(&self) -> &'static str {
        "rewrite"
    }

    fn schema(&self) -> FunctionDescription {
        write_schema(
            self.name(),
            "Replaces the entire content of a file",
            "URI of the file to rewrite",
        )
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let args: WriteArgs = parse_args(self.name(), args)?;
        let path = ctx.workspace.resolve_uri(&args.uri);
        ctx.workspace.write_file(&path, &args.content).await?;
        tracing::info!(path = %path.display(), "file rewritten");
        Ok(Value::Null)
    }
}

pub struct CreateFileOrFolderTool;

#[async_trait]
impl Tool for CreateFileOrFolderTool {
    fn name(&self) -> &'static str {
        "createFileOrFolder"
    }

    fn display_name(&self) -> &'static str {
        "Create File or Folder"
    }

    fn reference_name(&self) -> &'static str {
        "create"
    }

    fn schema(&self) -> FunctionDescription {
        FunctionDescription {
            name: self.name().to_string(),
            description: Some("Creates a new file or folder in the workspace".to_string()),
            parameters: json!({
                "type": "object",
                "properties": {
                    "uri": { "type": "string", "description": "URI of the file or folder to create" },
                    "isFolder": { "type": "boolean", "description": "Whether to create a folder (true) or file (false)" }
                },
                "required": ["uri", "isFolder"]
            }),
        }
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let args: CreateArgs = parse_args(self.name(), args)?;
        let path = ctx.workspace.resolve_uri(&args.uri);
        if args.is_folder {
            ctx.workspace.create_dir(&path).await?;
        } else {
            ctx.workspace.write_file(&path, "").await?;
        }
        Ok(Value::Null)
    }
}

pub struct ReplaceInFileTool;

#[async_trait]
impl Tool for ReplaceInFileTool {
    fn name(&self) -> &'static str {
        "replaceInFile"
    }

    fn display_name(&self) -> &'static str {
        "Replace In File (Smart Patch)"
    }

    fn reference_name(&self) -> &'static str {
        "replace"
    }

    fn schema(&self) -> FunctionDescription {
        FunctionDescription {
            name: self.name().to_string(),
            description: Some(
                "Applies precise SEARCH/REPLACE blocks to a file, like a patch or diff.".to_string(),
            ),
            parameters: json!({
                "type": "object",
                "properties": {
                    "uri": { "type": "string", "description": "URI of the file to patch" },
                    "replaceBlocks": { "type": "string", "description": "SEARCH/REPLACE blocks string" }
                },
                "required": ["uri", "replaceBlocks"]
            }),
        }
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let args: ReplaceArgs = parse_args(self.name(), args)?;
        let path = ctx.workspace.resolve_uri(&args.uri);
        let content = ctx.workspace.read_file(&path).await?;
        let outcome = patch::apply_blocks(&content, &args.replace_blocks);

        if outcome.is_noop() {
            return Ok(Value::String(format!(
                "No matching blocks found in {}",
                path.display()
            )));
        }
        ctx.workspace.write_file(&path, &outcome.content).await?;
        Ok(Value::String(format!(
            "Applied {} search/replace block(s) to {}",
            outcome.applied,
            path.display()
        )))
    }
}

pub struct GetDirTreeTool;

#[async_trait]
impl Tool for GetDirTreeTool {
    fn name(&self) -> &'static str {
        "getDirTree"
    }

    fn display_name(&self) -> &'static str {
        "Get Directory Tree"
    }

    fn reference_name(&self) -> &'static str {
        "dirTree"
    }

    fn schema(&self) -> FunctionDescription {
        FunctionDescription {
            name: self.name().to_string(),
            description: Some("Gets the directory tree of the workspace or a folder".to_string()),
            parameters: json!({
                "type": "object",
                "properties": {
                    "root": { "type": "string", "description": "Root URI to start from (optional)" }
                },
                "required": []
            }),
        }
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let args: DirTreeArgs = if args.is_null() {
            DirTreeArgs::default()
        } else {
            parse_args(self.name(), args)?
        };
        let folder = match args.root.as_deref().map(str::trim) {
            Some(root) if !root.is_empty() => ctx.workspace.resolve_uri(root),
            _ => match ctx.workspace.roots().into_iter().next() {
                Some(root) => root,
                None => return Ok(Value::Null),
            },
        };
        if ctx.workspace.stat(&folder).await? != Some(EntryKind::Folder) {
            return Err(ToolError::invalid(
                self.name(),
                format!("{} is not a folder", to_uri(&folder)),
            ));
        }
        let entries = ctx.workspace.read_dir(&folder).await?;
        Ok(serde_json::to_value(entries).map_err(anyhow::Error::from)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::setup_context;
    use std::fs;

    #[tokio::test]
    async fn test_analyze_file_reads_relative_and_file_uri() {
        let (tmp_dir, ctx) = setup_context();
        let path = tmp_dir.path().join("notes.md");
        fs::write(&path, "# Notes\n").unwrap();

        let relative = AnalyzeFileTool
            .execute(&json!({"uri": "notes.md"}), &ctx)
            .await
            .unwrap();
        let absolute = AnalyzeFileTool
            .execute(&json!({"uri": to_uri(&path)}), &ctx)
            .await
            .unwrap();

        assert_eq!(relative, json!("# Notes\n"));
        assert_eq!(absolute, relative);
    }

    #[tokio::test]
    async fn test_analyze_file_missing_uri_is_invalid() {
        let (_tmp_dir, ctx) = setup_context();
        let err = AnalyzeFileTool.execute(&json!({}), &ctx).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn test_edit_and_rewrite_write_content() {
        let (tmp_dir, ctx) = setup_context();
        EditFileTool
            .execute(&json!({"uri": "src/a.rs", "content": "fn a() {}"}), &ctx)
            .await
            .unwrap();
        assert_eq!(
            fs::read_to_string(tmp_dir.path().join("src/a.rs")).unwrap(),
            "fn a() {}"
        );
        RewriteFileTool
            .execute(&json!({"uri": "src/a.rs", "content": ""}), &ctx)
            .await
            .unwrap();
        assert_eq!(fs::read_to_string(tmp_dir.path().join("src/a.rs")).unwrap(), "");
    }

    #[tokio::test]
    async fn test_create_file_or_folder() {
        let (tmp_dir, ctx) = setup_context();
        CreateFileOrFolderTool
            .execute(&json!({"uri": "pkg/sub", "isFolder": true}), &ctx)
            .await
            .unwrap();
        CreateFileOrFolderTool
            .execute(&json!({"uri": "pkg/sub/empty.txt", "isFolder": false}), &ctx)
            .await
            .unwrap();
        assert!(tmp_dir.path().join("pkg/sub").is_dir());
        assert_eq!(
            fs::read_to_string(tmp_dir.path().join("pkg/sub/empty.txt")).unwrap(),
            ""
        );
    }

    #[tokio::test]
    async fn test_replace_in_file_reports_applied_and_noop() {
        let (tmp_dir, ctx) = setup_context();
        let path = tmp_dir.path().join("calc.js");
        fs::write(&path, "let w=5\nlet x = 6\nlet y=7").unwrap();
        let blocks = "<<<<<<< ORIGINAL\nlet x = 6\n=======\nlet x = 6.5\n>>>>>>> UPDATED";

        let applied = ReplaceInFileTool
            .execute(&json!({"uri": "calc.js", "replaceBlocks": blocks}), &ctx)
            .await
            .unwrap();
        assert_eq!(
            applied,
            json!(format!(
                "Applied 1 search/replace block(s) to {}",
                path.display()
            ))
        );
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "let w=5\nlet x = 6.5\nlet y=7"
        );

        let noop = ReplaceInFileTool
            .execute(&json!({"uri": "calc.js", "replaceBlocks": blocks}), &ctx)
            .await
            .unwrap();
        assert_eq!(
            noop,
            json!(format!("No matching blocks found in {}", path.display()))
        );
    }

    #[tokio::test]
    async fn test_get_dir_tree_defaults_to_first_root() {
        let (tmp_dir, ctx) = setup_context();
        fs::write(tmp_dir.path().join("README.md"), "").unwrap();
        fs::create_dir(tmp_dir.path().join("src")).unwrap();

        let tree = GetDirTreeTool.execute(&json!({}), &ctx).await.unwrap();
        assert_eq!(
            tree,
            json!([
                {"name": "README.md", "type": "file"},
                {"name": "src", "type": "folder"}
            ])
        );
        let sub = GetDirTreeTool
            .execute(&json!({"root": "src"}), &ctx)
            .await
            .unwrap();
        assert_eq!(sub, json!([]));
    }

    #[tokio::test]
    async fn test_get_dir_tree_rejects_files() {
        let (tmp_dir, ctx) = setup_context();
        fs::write(tmp_dir.path().join("a.txt"), "").unwrap();
        let err = GetDirTreeTool
            .execute(&json!({"root": "a.txt"}), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("is not a folder"));
    }
}
