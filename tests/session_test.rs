use anyhow::Result;
use flexpilot::agent_workflow::{AgentWorkflow, StepStatus, WorkflowOutcome};
use flexpilot::checkpoint::CheckpointStore;
use flexpilot::editing_session::{AutoApprove, EditingRequest, EditingSession};
use flexpilot::llm::ScriptedModel;
use flexpilot::response::{RecordingSink, ResponsePart};
use flexpilot::session_history::{
    HistoryFilter, JsonFileStore, SessionHistoryManager, SessionKind,
};
use flexpilot::tool_registry::ToolRegistry;
use flexpilot::tools::ToolContext;
use flexpilot::workspace::{LocalWorkspace, to_uri};
use std::{fs, sync::Arc};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_edit_after_tool_call_is_applied_and_persisted() -> Result<()> {
    // 1. A workspace with one file and a history file outside of it
    let workspace_dir = tempdir()?;
    let state_dir = tempdir()?;
    let file_path = workspace_dir.path().join("config.toml");
    fs::write(&file_path, "name = \"demo\"\n")?;
    let uri = to_uri(&file_path);

    // 2. The model reads the file first, then answers with a modification
    let tool_call = format!(
        "Let me look.\n<tool-call>\n<tool-name>analyzeFile</tool-name>\n<tool-args>{{\"uri\": \"{uri}\"}}</tool-args>\n</tool-call>\n"
    );
    let modification = format!(
        "<file-modification>\n<change-description>Add a version</change-description>\n<complete-file-uri>{uri}</complete-file-uri>\n<updated-file-content>\nname = \"demo\"\nversion = \"1.0.0\"\n</updated-file-content>\n</file-modification>"
    );
    let (first, second) = tool_call.split_at(tool_call.len() / 2);
    let model = Arc::new(
        ScriptedModel::new()
            .with_response(&[first, second])
            .with_response(&[modification.as_str()]),
    );

    let workspace = Arc::new(LocalWorkspace::new(workspace_dir.path()));
    let history_path = state_dir.path().join("state.json");
    let history = Arc::new(SessionHistoryManager::new(Box::new(JsonFileStore::new(
        &history_path,
    )))?);
    let session = EditingSession::new(
        model.clone(),
        Arc::new(ToolRegistry::with_builtin_tools()?),
        ToolContext::new(workspace.clone()),
        Arc::new(CheckpointStore::new(workspace)),
        Arc::new(AutoApprove),
    )
    .with_history(history);

    // 3. Run the request
    let sink = RecordingSink::new();
    let request = EditingRequest::new("add a version").with_working_set(vec![uri.clone()]);
    let outcome = session
        .handle(&request, &sink, &CancellationToken::new())
        .await;

    // 4. The tool ran once and the modification was written
    assert_eq!(model.requests().len(), 2);
    assert_eq!(outcome.modified_files, vec![uri.clone()]);
    assert_eq!(
        fs::read_to_string(&file_path)?,
        "name = \"demo\"\nversion = \"1.0.0\"\n"
    );
    let executed = sink
        .parts()
        .into_iter()
        .filter(|p| matches!(p, ResponsePart::Progress(m) if m.starts_with("Executing tool")))
        .count();
    assert_eq!(executed, 1);

    // 5. The session survives a reload of the history
    let reloaded = SessionHistoryManager::new(Box::new(JsonFileStore::new(&history_path)))?;
    let entries = reloaded.list(&HistoryFilter {
        kind: Some(SessionKind::Editing),
        ..HistoryFilter::default()
    });
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].request, "add a version");
    assert_eq!(entries[0].modified_files, vec![uri]);

    Ok(())
}

#[tokio::test]
async fn test_agent_workflow_edits_and_restores() -> Result<()> {
    let workspace_dir = tempdir()?;
    let file_path = workspace_dir.path().join("lib.rs");
    fs::write(&file_path, "pub fn answer() -> u32 { 42 }")?;

    let workspace = Arc::new(LocalWorkspace::new(workspace_dir.path()));
    let checkpoints = Arc::new(CheckpointStore::new(workspace.clone()));
    let workflow = AgentWorkflow::new(
        Arc::new(ToolRegistry::with_builtin_tools()?),
        ToolContext::new(workspace),
        checkpoints.clone(),
    );

    let sink = RecordingSink::new();
    let outcome = workflow
        .run("find files and rewrite them", &sink, &CancellationToken::new())
        .await;

    let WorkflowOutcome::Done(steps) = outcome else {
        panic!("workflow did not complete: {outcome:?}");
    };
    assert_eq!(steps.len(), 2);
    assert!(steps.iter().all(|s| s.status == StepStatus::Completed));
    assert_eq!(
        fs::read_to_string(&file_path)?,
        "// Rewritten by Flexpilot Agent\n"
    );

    assert_eq!(checkpoints.pending(), vec![file_path.clone()]);
    assert!(checkpoints.restore(&file_path).await?);
    assert_eq!(fs::read_to_string(&file_path)?, "pub fn answer() -> u32 { 42 }");

    Ok(())
}
