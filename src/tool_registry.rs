//! # Tool Registry
//!
//! The registry is the central hub for discovering and executing tools. It
//! keeps tools in registration order, which is the order prompts list them
//! in, and rejects a second tool with an existing name.

use crate::error::ToolError;
use crate::tools::{Tool, ToolContext, builtin_tools};
use anyhow::{Result, bail};
use serde_json::Value;
use std::collections::HashMap;
use strip_ansi_escapes::strip_str;

pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
    index: HashMap<&'static str, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// A registry holding the built-in catalog.
    pub fn with_builtin_tools() -> Result<Self> {
        let mut registry = Self::new();
        for tool in builtin_tools() {
            registry.register(tool)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<()> {
        let name = tool.name();
        if self.index.contains_key(name) {
            bail!("Tool {name} is already registered");
        }
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.index.get(name).map(|&i| self.tools[i].as_ref())
    }

    /// Tools in registration order.
    pub fn tools(&self) -> impl Iterator<Item = &dyn Tool> {
        self.tools.iter().map(|t| t.as_ref())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Executes `name` with `args`. String results are stripped of ANSI
    /// escape sequences.
    pub async fn execute(&self, name: &str, args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tracing::debug!(tool = name, %args, "executing tool");

        match tool.execute(args, ctx).await {
            Ok(Value::String(output)) => Ok(Value::String(strip_str(&output))),
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "tool failed");
                Err(e)
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::setup_context;
    use async_trait::async_trait;
    use openrouter_api::models::tool::FunctionDescription;
    use serde_json::json;

    struct ColorTool;

    #[async_trait]
    impl Tool for ColorTool {
        fn name(&self) -> &'static str {
            "color"
        }

        fn display_name(&self) -> &'static str {
            "Color"
        }

        fn reference_name(&self) -> &'static str {
            "color"
        }

        fn schema(&self) -> FunctionDescription {
            FunctionDescription {
                name: "color".to_string(),
                description: Some("Prints in color".to_string()),
                parameters: json!({"type": "object", "properties": {}}),
            }
        }

        async fn execute(&self, _args: &Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
            Ok(Value::String("\u{1b}[31mred\u{1b}[0m".to_string()))
        }
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(ColorTool)).unwrap();
        assert!(registry.register(Box::new(ColorTool)).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_builtin_registry_preserves_order() {
        let registry = ToolRegistry::with_builtin_tools().unwrap();
        let names: Vec<_> = registry.tools().map(|t| t.name()).collect();
        assert_eq!(names.first(), Some(&"exploreCodebase"));
        assert_eq!(names.last(), Some(&"replaceInFile"));
        assert_eq!(names.len(), 16);
        assert_eq!(registry.get("getDirTree").unwrap().display_name(), "Get Directory Tree");
    }

    #[tokio::test]
    async fn test_execute_unknown_tool_is_not_found() {
        let (_tmp_dir, ctx) = setup_context();
        let registry = ToolRegistry::new();
        let err = registry.execute("nope", &json!({}), &ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "Tool nope not found.");
    }

    #[tokio::test]
    async fn test_execute_strips_ansi() {
        let (_tmp_dir, ctx) = setup_context();
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(ColorTool)).unwrap();
        let out = registry.execute("color", &json!({}), &ctx).await.unwrap();
        assert_eq!(out, json!("red"));
    }
}
