//! # Agent workflow
//!
//! A keyword planner maps a request onto a list of tool steps, and the
//! executor runs them strictly in order. Later steps pick their targets from
//! the results of earlier ones. Writes are checkpointed so the caller can
//! restore them afterwards.

use crate::checkpoint::CheckpointStore;
use crate::response::{ResponsePart, ResponseSink};
use crate::tool_registry::ToolRegistry;
use crate::tools::ToolContext;
use crate::workspace::to_uri;
use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const GENERIC_FAILURE: &str = "An error occurred while processing your request";
pub const EDIT_MARKER: &str = "// Edited by Flexpilot Agent";
pub const REWRITE_MARKER: &str = "// Rewritten by Flexpilot Agent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Explore,
    Analyze,
    Plan,
    Execute,
    Verify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    #[serde(rename = "type")]
    pub kind: StepKind,
    pub description: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_used: Option<String>,
}

impl WorkflowStep {
    pub fn new(kind: StepKind, description: &str, tool: &str) -> Self {
        Self {
            kind,
            description: description.to_string(),
            status: StepStatus::Pending,
            result: None,
            tool_used: Some(tool.to_string()),
        }
    }

    /// Markdown reported once the step has completed.
    pub fn progress_message(&self) -> String {
        let mut sections = vec![format!("### {}", self.description)];
        if let Some(tool) = &self.tool_used {
            sections.push(format!("Using tool: `{tool}`"));
        }
        let result = self
            .result
            .as_ref()
            .filter(|r| !r.is_null() && r.as_str() != Some(""));
        if let Some(result) = result {
            let pretty = serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string());
            sections.push(format!("```json\n{pretty}\n```"));
        }
        sections.join("\n\n")
    }
}

#[derive(Debug, Clone)]
pub struct PlanRule {
    pub pattern: Regex,
    pub kind: StepKind,
    pub description: &'static str,
    pub tool: &'static str,
}

impl PlanRule {
    fn step(&self) -> WorkflowStep {
        WorkflowStep::new(self.kind, self.description, self.tool)
    }
}

fn rule(pattern: &str, kind: StepKind, description: &'static str, tool: &'static str) -> PlanRule {
    PlanRule {
        pattern: Regex::new(pattern).expect("Invalid regex"),
        kind,
        description,
        tool,
    }
}

static DEFAULT_RULES: Lazy<Vec<PlanRule>> = Lazy::new(|| {
    vec![
        rule("list files|directory|tree", StepKind::Explore, "Getting directory tree", "getDirTree"),
        rule("search|find file", StepKind::Explore, "Searching for files", "searchForFiles"),
        rule("read|analyze|content", StepKind::Analyze, "Reading file contents", "analyzeFile"),
        rule("symbol|function|class", StepKind::Analyze, "Listing symbols in file", "listSymbolsInFile"),
        rule("edit|modify|change", StepKind::Execute, "Editing file", "editFile"),
        rule("rewrite|replace all", StepKind::Execute, "Rewriting file", "rewriteFile"),
    ]
});

/// Maps a request onto steps. Every matching rule contributes one step, in
/// declaration order; no match yields the fallback plan.
#[derive(Debug, Clone)]
pub struct Planner {
    rules: Vec<PlanRule>,
    fallback: Vec<PlanRule>,
}

impl Planner {
    pub fn new(rules: Vec<PlanRule>, fallback: Vec<PlanRule>) -> Self {
        Self { rules, fallback }
    }

    pub fn plan(&self, request: &str) -> Vec<WorkflowStep> {
        let request = request.to_lowercase();
        let steps: Vec<_> = self
            .rules
            .iter()
            .filter(|rule| rule.pattern.is_match(&request))
            .map(PlanRule::step)
            .collect();
        if steps.is_empty() {
            return self.fallback.iter().map(PlanRule::step).collect();
        }
        steps
    }
}

impl Default for Planner {
    fn default() -> Self {
        let fallback = DEFAULT_RULES
            .iter()
            .filter(|r| matches!(r.tool, "getDirTree" | "analyzeFile"))
            .cloned()
            .collect();
        Self::new(DEFAULT_RULES.clone(), fallback)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowOutcome {
    Done(Vec<WorkflowStep>),
    /// Carries only the steps that completed before cancellation.
    Cancelled(Vec<WorkflowStep>),
    Failed {
        steps: Vec<WorkflowStep>,
        message: String,
    },
}

impl WorkflowOutcome {
    pub fn steps(&self) -> &[WorkflowStep] {
        match self {
            WorkflowOutcome::Done(steps) | WorkflowOutcome::Cancelled(steps) => steps,
            WorkflowOutcome::Failed { steps, .. } => steps,
        }
    }
}

/// Results of earlier steps that later steps draw their targets from.
#[derive(Debug, Default)]
struct IntermediateResults {
    dir_tree: Option<Value>,
    files: Option<Value>,
}

pub struct AgentWorkflow {
    planner: Planner,
    registry: Arc<ToolRegistry>,
    ctx: ToolContext,
    checkpoints: Arc<CheckpointStore>,
}

impl AgentWorkflow {
    pub fn new(registry: Arc<ToolRegistry>, ctx: ToolContext, checkpoints: Arc<CheckpointStore>) -> Self {
        Self {
            planner: Planner::default(),
            registry,
            ctx,
            checkpoints,
        }
    }

    pub fn with_planner(mut self, planner: Planner) -> Self {
        self.planner = planner;
        self
    }

    pub async fn run(
        &self,
        request: &str,
        sink: &dyn ResponseSink,
        cancel: &CancellationToken,
    ) -> WorkflowOutcome {
        let plan = self.planner.plan(request);
        tracing::info!(steps = plan.len(), "agent workflow planned");

        let mut done = Vec::new();
        let mut results = IntermediateResults::default();
        for mut step in plan {
            if cancel.is_cancelled() {
                tracing::info!(completed = done.len(), "agent workflow cancelled");
                return WorkflowOutcome::Cancelled(done);
            }
            step.status = StepStatus::InProgress;
            match self.run_step(&step, &mut results).await {
                Ok(result) => {
                    step.result = Some(result);
                    step.status = StepStatus::Completed;
                    sink.push(ResponsePart::Markdown(step.progress_message()));
                    done.push(step);
                }
                Err(e) => {
                    tracing::error!(step = %step.description, error = %e, "agent workflow step failed");
                    step.status = StepStatus::Failed;
                    done.push(step);
                    return WorkflowOutcome::Failed {
                        steps: done,
                        message: GENERIC_FAILURE.to_string(),
                    };
                }
            }
        }
        WorkflowOutcome::Done(done)
    }

    async fn run_step(&self, step: &WorkflowStep, results: &mut IntermediateResults) -> Result<Value> {
        let tool = step.tool_used.as_deref().unwrap_or_default();
        match tool {
            "getDirTree" => {
                let tree = self.call(tool, json!({})).await?;
                results.dir_tree = Some(tree.clone());
                Ok(tree)
            }
            "searchForFiles" => {
                let files = self.call(tool, json!({ "pattern": "**/*" })).await?;
                results.files = Some(files.clone());
                Ok(files)
            }
            "analyzeFile" | "listSymbolsInFile" => match self.target_file(results) {
                Some(uri) => self.call(tool, json!({ "uri": uri })).await,
                None => Ok(json!("No file found to read.")),
            },
            "editFile" => {
                let Some(uri) = self.target_file(results) else {
                    return Ok(json!("No file found to edit."));
                };
                let current = self.call("analyzeFile", json!({ "uri": uri })).await?;
                let content = format!("{}\n{EDIT_MARKER}\n", current.as_str().unwrap_or_default());
                self.checkpoints.snapshot(&self.ctx.workspace.resolve_uri(&uri)).await?;
                self.call(tool, json!({ "uri": uri, "content": content })).await?;
                Ok(json!("File edited."))
            }
            "rewriteFile" => {
                let Some(uri) = self.target_file(results) else {
                    return Ok(json!("No file found to rewrite."));
                };
                self.checkpoints.snapshot(&self.ctx.workspace.resolve_uri(&uri)).await?;
                self.call(tool, json!({ "uri": uri, "content": format!("{REWRITE_MARKER}\n") }))
                    .await?;
                Ok(json!("File rewritten."))
            }
            _ => Ok(json!("Tool not implemented in workflow.")),
        }
    }

    async fn call(&self, tool: &str, args: Value) -> Result<Value> {
        Ok(self.registry.execute(tool, &args, &self.ctx).await?)
    }

    /// First search hit, else the first file of the directory tree, else the
    /// first workspace root.
    fn target_file(&self, results: &IntermediateResults) -> Option<String> {
        let search_hit = results
            .files
            .as_ref()
            .and_then(|files| files.get(0))
            .and_then(Value::as_str)
            .map(str::to_string);
        if search_hit.is_some() {
            return search_hit;
        }

        let root = self.ctx.workspace.roots().into_iter().next()?;
        let tree_file = results.dir_tree.as_ref().and_then(Value::as_array).and_then(|entries| {
            entries
                .iter()
                .find(|e| e.get("type").and_then(Value::as_str) == Some("file"))
                .and_then(|e| e.get("name").and_then(Value::as_str))
        });
        Some(match tree_file {
            Some(name) => to_uri(&root.join(name)),
            None => to_uri(&root),
        })
    }
}
