use super::{Tool, ToolContext, parse_args};
use crate::error::ToolError;
use async_trait::async_trait;
use openrouter_api::models::tool::FunctionDescription;
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Deserialize)]
struct UriArgs {
    uri: String,
}

#[derive(Deserialize)]
struct SymbolArgs {
    symbol: String,
}

fn to_json<T: serde::Serialize>(value: T) -> Result<Value, ToolError> {
    Ok(serde_json::to_value(value).map_err(anyhow::Error::from)?)
}

pub struct ListSymbolsInFileTool;

#[async_trait]
impl Tool for ListSymbolsInFileTool {
    fn name(&self) -> &'static str {
        "listSymbolsInFile"
    }

    fn display_name(&self) -> &'static str {
        "List Symbols In File"
    }

    fn reference_name(&self) -> &'static str {
        "listSymbols"
    }

    fn schema(&self) -> FunctionDescription {
        FunctionDescription {
            name: self.name().to_string(),
            description: Some("Lists all symbols in a file".to_string()),
            parameters: json!({
                "type": "object",
                "properties": {
                    "uri": { "type": "string", "description": "URI of the file" }
                },
                "required": ["uri"]
            }),
        }
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let args: UriArgs = parse_args(self.name(), args)?;
        let path = ctx.workspace.resolve_uri(&args.uri);
        to_json(ctx.workspace.document_symbols(&path).await?)
    }
}

pub struct FindSymbolTool;

#[async_trait]
impl Tool for FindSymbolTool {
    fn name(&self) -> &'static str {
        "findSymbol"
    }

    fn display_name(&self) -> &'static str {
        "Find Symbol"
    }

    fn reference_name(&self) -> &'static str {
        "findSymbol"
    }

    fn schema(&self) -> FunctionDescription {
        FunctionDescription {
            name: self.name().to_string(),
            description: Some("Finds a symbol in the workspace".to_string()),
            parameters: json!({
                "type": "object",
                "properties": {
                    "symbol": { "type": "string", "description": "Symbol name to find" }
                },
                "required": ["symbol"]
            }),
        }
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let args: SymbolArgs = parse_args(self.name(), args)?;
        to_json(ctx.workspace.workspace_symbols(args.symbol.trim()).await?)
    }
}

pub struct VerifyChangesTool;

#[async_trait]
impl Tool for VerifyChangesTool {
    fn name(&self) -> &'static str {
        "verifyChanges"
    }

    fn display_name(&self) -> &'static str {
        "Verify Changes"
    }

    fn reference_name(&self) -> &'static str {
        "verify"
    }

    fn schema(&self) -> FunctionDescription {
        FunctionDescription {
            name: self.name().to_string(),
            description: Some("Verifies changes and validates code quality".to_string()),
            parameters: json!({
                "type": "object",
                "properties": {
                    "uri": { "type": "string", "description": "URI of the file to verify" }
                },
                "required": ["uri"]
            }),
        }
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let args: UriArgs = parse_args(self.name(), args)?;
        let path = ctx.workspace.resolve_uri(&args.uri);
        to_json(ctx.workspace.diagnostics(&path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::setup_context;
    use std::fs;

    #[tokio::test]
    async fn test_list_symbols_in_file() {
        let (tmp_dir, ctx) = setup_context();
        fs::write(
            tmp_dir.path().join("shapes.py"),
            "class Circle:\n    def area(self):\n        pass\n",
        )
        .unwrap();

        let symbols = ListSymbolsInFileTool
            .execute(&json!({"uri": "shapes.py"}), &ctx)
            .await
            .unwrap();
        assert_eq!(
            symbols,
            json!([
                {"name": "Circle", "kind": "class", "line": 1},
                {"name": "area", "kind": "function", "line": 2}
            ])
        );
    }

    #[tokio::test]
    async fn test_find_symbol_reports_path() {
        let (tmp_dir, ctx) = setup_context();
        fs::write(tmp_dir.path().join("a.rs"), "pub fn parse_config() {}\n").unwrap();
        fs::write(tmp_dir.path().join("b.rs"), "fn unrelated() {}\n").unwrap();

        let found = FindSymbolTool
            .execute(&json!({"symbol": "Config"}), &ctx)
            .await
            .unwrap();
        let found = found.as_array().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["name"], "parse_config");
        assert!(found[0]["path"].as_str().unwrap().ends_with("a.rs"));
    }

    #[tokio::test]
    async fn test_verify_changes_without_diagnostics_command_is_empty() {
        let (tmp_dir, ctx) = setup_context();
        fs::write(tmp_dir.path().join("a.rs"), "fn main() {}").unwrap();
        let diagnostics = VerifyChangesTool
            .execute(&json!({"uri": "a.rs"}), &ctx)
            .await
            .unwrap();
        assert_eq!(diagnostics, json!([]));
    }
}
