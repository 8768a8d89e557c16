use super::{Tool, ToolContext, parse_args};
use crate::error::ToolError;
use async_trait::async_trait;
use openrouter_api::models::tool::FunctionDescription;
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Deserialize)]
struct CommandArgs {
    command: String,
}

fn command_schema(name: &str, description: &str, command_description: &str) -> FunctionDescription {
    FunctionDescription {
        name: name.to_string(),
        description: Some(description.to_string()),
        parameters: json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": command_description }
            },
            "required": ["command"]
        }),
    }
}

async fn spawn(tool: &str, args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
    let args: CommandArgs = parse_args(tool, args)?;
    ctx.check_command(tool, &args.command)?;
    let pid = ctx.workspace.spawn_command(args.command.trim()).await?;
    Ok(json!({ "pid": pid }))
}

/// Starts a command in the background.
pub struct ExecuteCommandTool;

#[async_trait]
impl Tool for ExecuteCommandTool {
    fn name(&self) -> &'static str {
        "executeCommand"
    }

    fn display_name(&self) -> &'static str {
        "Execute Command"
    }

    fn reference_name(&self) -> &'static str {
        "exec"
    }

    fn schema(&self) -> FunctionDescription {
        command_schema(self.name(), "Executes terminal commands", "Command to execute")
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        spawn(self.name(), args, ctx).await
    }
}

/// Starts a long-running command such as a dev server.
pub struct RunPersistentCommandTool;

#[async_trait]
impl Tool for RunPersistentCommandTool {
    fn name(&self) -> &'static str {
        "runPersistentCommand"
    }

    fn display_name(&self) -> &'static str {
        "Run Persistent Command"
    }

    fn reference_name(&self) -> &'static str {
        "runPersistent"
    }

    fn schema(&self) -> FunctionDescription {
        command_schema(
            self.name(),
            "Runs a persistent terminal command (e.g., dev server)",
            "Command to run",
        )
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        spawn(self.name(), args, ctx).await
    }
}

/// Runs a command to completion and returns its stdout.
pub struct RunCommandTool;

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &'static str {
        "runCommand"
    }

    fn display_name(&self) -> &'static str {
        "Run Command"
    }

    fn reference_name(&self) -> &'static str {
        "run"
    }

    fn schema(&self) -> FunctionDescription {
        command_schema(
            self.name(),
            "Runs a one-off shell command and returns output",
            "Command to run",
        )
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let args: CommandArgs = parse_args(self.name(), args)?;
        ctx.check_command(self.name(), &args.command)?;
        let output = ctx.workspace.run_command(args.command.trim()).await?;
        if output.success() {
            return Ok(Value::String(output.stdout));
        }
        let reason = if output.stderr.trim().is_empty() {
            match output.exit_code {
                Some(code) => format!("Command exited with code {code}"),
                None => "Command was terminated by a signal".to_string(),
            }
        } else {
            output.stderr
        };
        Err(ToolError::External(reason))
    }
}
