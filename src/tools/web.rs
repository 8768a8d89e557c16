use super::{Tool, ToolContext, parse_args};
use crate::error::ToolError;
use async_trait::async_trait;
use openrouter_api::models::tool::FunctionDescription;
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Deserialize)]
struct QueryArgs {
    query: String,
}

pub struct SearchWebTool;

#[async_trait]
impl Tool for SearchWebTool {
    fn name(&self) -> &'static str {
        "searchWeb"
    }

    fn display_name(&self) -> &'static str {
        "Search Web"
    }

    fn reference_name(&self) -> &'static str {
        "web"
    }

    fn schema(&self) -> FunctionDescription {
        FunctionDescription {
            name: self.name().to_string(),
            description: Some(
                "Searches the web for documentation and best practices".to_string(),
            ),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search query" }
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let args: QueryArgs = parse_args(self.name(), args)?;
        let web_search = ctx
            .web_search
            .as_ref()
            .ok_or_else(|| ToolError::External("Web search is not configured".to_string()))?;
        Ok(Value::String(web_search.search(args.query.trim()).await))
    }
}
