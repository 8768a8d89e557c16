//! # Editing session
//!
//! Drives one editing request: builds the prompt, streams the model's answer
//! through the [`StreamParser`] and acts on its events. Tool calls are
//! executed and their results fed back to the model; completed file
//! modifications are checkpointed, confirmed and written.

use crate::checkpoint::CheckpointStore;
use crate::llm::{ChatMessage, LanguageModel};
use crate::prompt_builder::{self, ChatTurn};
use crate::response::{ResponsePart, ResponseSink};
use crate::session_history::{SessionHistoryEntry, SessionHistoryManager, SessionKind};
use crate::stream_parser::{StreamEvent, StreamParser};
use crate::tool_registry::ToolRegistry;
use crate::tools::ToolContext;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const ERROR_MESSAGE: &str = "Error processing request";
pub const ERROR_RESPONSE: &str = "Unable to process request";

/// Asks whether a proposed file change should be written.
#[async_trait]
pub trait ConfirmChange: Send + Sync {
    async fn confirm(&self, path: &Path, current: &str, proposed: &str) -> Result<bool>;
}

/// Accepts every change.
pub struct AutoApprove;

#[async_trait]
impl ConfirmChange for AutoApprove {
    async fn confirm(&self, _path: &Path, _current: &str, _proposed: &str) -> Result<bool> {
        Ok(true)
    }
}

#[derive(Debug, Clone, Default)]
pub struct EditingRequest {
    pub prompt: String,
    /// URIs of the files the user is working on.
    pub working_set: Vec<String>,
    pub history: Vec<ChatTurn>,
}

impl EditingRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_working_set(mut self, working_set: Vec<String>) -> Self {
        self.working_set = working_set;
        self
    }

    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.history = history;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOutcome {
    pub request: String,
    pub response: String,
    /// At least one file modification was completed, accepted or not.
    pub success: bool,
    /// URIs of the files that were written.
    pub modified_files: Vec<String>,
    pub error: Option<String>,
}

/// Per-request state of the response loop.
#[derive(Default)]
struct Progress {
    tool_rounds: usize,
    file_completed: bool,
    modified_files: Vec<String>,
}

pub struct EditingSession {
    model: Arc<dyn LanguageModel>,
    registry: Arc<ToolRegistry>,
    ctx: ToolContext,
    checkpoints: Arc<CheckpointStore>,
    confirm: Arc<dyn ConfirmChange>,
    history: Option<Arc<SessionHistoryManager>>,
    max_tool_rounds: usize,
}

impl EditingSession {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        registry: Arc<ToolRegistry>,
        ctx: ToolContext,
        checkpoints: Arc<CheckpointStore>,
        confirm: Arc<dyn ConfirmChange>,
    ) -> Self {
        Self {
            model,
            registry,
            ctx,
            checkpoints,
            confirm,
            history: None,
            max_tool_rounds: 5,
        }
    }

    pub fn with_history(mut self, history: Arc<SessionHistoryManager>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_max_tool_rounds(mut self, max_tool_rounds: usize) -> Self {
        self.max_tool_rounds = max_tool_rounds;
        self
    }

    /// Handles `request` end to end. Errors are reported through `sink` and
    /// the returned outcome, never propagated.
    pub async fn handle(
        &self,
        request: &EditingRequest,
        sink: &dyn ResponseSink,
        cancel: &CancellationToken,
    ) -> EditOutcome {
        let outcome = match self.run(request, sink, cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %format!("{e:#}"), "editing session failed");
                sink.push(ResponsePart::Warning(ERROR_MESSAGE.to_string()));
                EditOutcome {
                    request: request.prompt.clone(),
                    response: ERROR_RESPONSE.to_string(),
                    success: false,
                    modified_files: Vec::new(),
                    error: Some(ERROR_MESSAGE.to_string()),
                }
            }
        };

        if let Some(history) = &self.history {
            let mut entry = SessionHistoryEntry::new(
                SessionKind::Editing,
                outcome.request.clone(),
                outcome.response.clone(),
            )
            .with_modified_files(outcome.modified_files.clone())
            .with_model_id(self.model.id());
            if !request.working_set.is_empty() {
                let working_set = Value::from(request.working_set.clone());
                entry = entry.with_metadata("workingSet", working_set);
            }
            if let Err(e) = history.add(entry) {
                tracing::warn!(error = %e, "failed to record editing session");
            }
        }
        outcome
    }

    async fn run(
        &self,
        request: &EditingRequest,
        sink: &dyn ResponseSink,
        cancel: &CancellationToken,
    ) -> Result<EditOutcome> {
        let mut messages = prompt_builder::build_editing_request(
            &self.registry,
            &request.working_set,
            &request.history,
            &request.prompt,
            self.ctx.web_search.as_deref(),
        )
        .await;
        tracing::debug!(messages = messages.len(), "editing request built");

        sink.push(ResponsePart::Progress("Generating Edits".to_string()));
        let mut chunks = self.model.stream(messages.clone(), cancel.clone()).await?;
        let mut parser = StreamParser::new();
        let mut progress = Progress::default();

        while let Some(chunk) = chunks.recv().await {
            if cancel.is_cancelled() {
                tracing::info!("editing session cancelled");
                break;
            }
            let events = parser.push(&chunk?);
            self.handle_events(events, &mut parser, &mut messages, &mut progress, sink, cancel)
                .await?;
        }

        let response = parser.buffer().to_string();
        if !progress.file_completed {
            sink.push(ResponsePart::Markdown(response.clone()));
        }
        tracing::debug!(chars = response.len(), "editing response complete");

        Ok(EditOutcome {
            request: request.prompt.clone(),
            response,
            success: progress.file_completed,
            modified_files: progress.modified_files,
            error: None,
        })
    }

    /// Handles events in order. A tool round appends the model's follow-up
    /// answer to the same parser, so its events are queued behind the rest.
    async fn handle_events(
        &self,
        events: Vec<StreamEvent>,
        parser: &mut StreamParser,
        messages: &mut Vec<ChatMessage>,
        progress: &mut Progress,
        sink: &dyn ResponseSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut queue = VecDeque::from(events);
        while let Some(event) = queue.pop_front() {
            match event {
                StreamEvent::ToolCall { name, args } => {
                    if let Some(answer) = self
                        .run_tool(&name, &args, messages, progress, sink, cancel)
                        .await
                    {
                        queue.extend(parser.push(&answer));
                    }
                }
                StreamEvent::FileAnnounced { description, uri } => {
                    sink.push(ResponsePart::Markdown(description));
                    sink.push(ResponsePart::Markdown("\n\n```\n".to_string()));
                    sink.push(ResponsePart::CodeBlockUri(uri));
                    sink.push(ResponsePart::Markdown("\n```\n\n".to_string()));
                }
                StreamEvent::FileProgress { uri, lines } => {
                    sink.push(ResponsePart::FileProgress { uri, lines });
                }
                StreamEvent::FileCompleted {
                    description,
                    uri,
                    content,
                } => {
                    progress.file_completed = true;
                    if self.apply_file(&description, &uri, &content, sink).await? {
                        progress.modified_files.push(uri);
                    }
                }
            }
        }
        Ok(())
    }

    /// Executes one tool call and asks the model to continue. Returns the
    /// model's follow-up answer, or `None` if the call could not be run.
    async fn run_tool(
        &self,
        name: &str,
        args: &Value,
        messages: &mut Vec<ChatMessage>,
        progress: &mut Progress,
        sink: &dyn ResponseSink,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let Some(tool) = self.registry.get(name) else {
            tracing::error!(tool = name, "model called an unknown tool");
            sink.push(ResponsePart::Progress(format!("Tool {name} not found.")));
            return None;
        };
        if progress.tool_rounds >= self.max_tool_rounds {
            tracing::warn!(tool = name, max = self.max_tool_rounds, "tool round limit reached");
            sink.push(ResponsePart::Warning(format!(
                "Tool round limit of {} reached, skipping {name}",
                self.max_tool_rounds
            )));
            return None;
        }
        progress.tool_rounds += 1;
        sink.push(ResponsePart::Progress(format!(
            "Executing tool: {}",
            tool.display_name()
        )));

        match self.tool_round(name, args, messages, cancel).await {
            Ok(answer) => Some(answer),
            Err(e) => {
                tracing::error!(tool = name, error = %format!("{e:#}"), "tool round failed");
                sink.push(ResponsePart::Progress(format!(
                    "Failed to execute tool {name}"
                )));
                None
            }
        }
    }

    async fn tool_round(
        &self,
        name: &str,
        args: &Value,
        messages: &mut Vec<ChatMessage>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let result = self.registry.execute(name, args, &self.ctx).await?;
        let rendered = serde_json::to_string_pretty(&result)?;
        messages.push(ChatMessage::assistant(format!(
            "Tool {name} returned:\n{rendered}"
        )));
        self.model.complete(messages.clone(), cancel.clone()).await
    }

    /// Proposes `content` for `uri`, keeping the surrounding whitespace of
    /// the current document. Returns whether the change was written.
    async fn apply_file(
        &self,
        description: &str,
        uri: &str,
        content: &str,
        sink: &dyn ResponseSink,
    ) -> Result<bool> {
        let workspace = &self.ctx.workspace;
        let path = workspace.resolve_uri(uri);
        let exists = workspace.stat(&path).await?.is_some();
        let current = if exists {
            workspace.read_file(&path).await?
        } else {
            String::new()
        };
        let proposed = with_surrounding_whitespace(&current, content);

        if exists {
            self.checkpoints.snapshot(&path).await?;
        }
        let accepted = self.confirm.confirm(&path, &current, &proposed).await?;

        if accepted {
            workspace.write_file(&path, &proposed).await?;
            self.checkpoints.clear(&path)?;
            tracing::info!(path = %path.display(), "file modification applied");
            sink.push(ResponsePart::Markdown(format!(
                "✅ **Smart Patch Applied**\n\n- **File:** [{}]({uri})\n- **Change:** {description}\n\n",
                path.display()
            )));
            sink.push(ResponsePart::TextEdit {
                uri: uri.to_string(),
                content: proposed,
            });
        } else {
            self.checkpoints.restore(&path).await?;
            self.checkpoints.clear(&path)?;
            tracing::info!(path = %path.display(), "file modification rejected");
            sink.push(ResponsePart::Markdown(format!(
                "Change to {} was reverted.\n\n",
                path.display()
            )));
        }
        Ok(accepted)
    }
}

/// `new_content` trimmed, wrapped in the leading and trailing whitespace of
/// `current`. A whitespace-only document counts as both.
fn with_surrounding_whitespace(current: &str, new_content: &str) -> String {
    let body = current.trim_start();
    let leading = &current[..current.len() - body.len()];
    let trailing = if body.is_empty() {
        current
    } else {
        &body[body.trim_end().len()..]
    };
    format!("{leading}{}{trailing}", new_content.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Role, ScriptedModel};
    use crate::response::RecordingSink;
    use crate::session_history::{HistoryFilter, MemoryStore};
    use crate::workspace::{LocalWorkspace, to_uri};
    use std::fs;
    use std::sync::Mutex;
    use tempfile::{Builder, TempDir};

    struct RecordingConfirm {
        answer: bool,
        seen: Mutex<Vec<String>>,
    }

    impl RecordingConfirm {
        fn new(answer: bool) -> Arc<Self> {
            Arc::new(Self {
                answer,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ConfirmChange for RecordingConfirm {
        async fn confirm(&self, _path: &Path, _current: &str, proposed: &str) -> Result<bool> {
            self.seen.lock().unwrap().push(proposed.to_string());
            Ok(self.answer)
        }
    }

    struct Fixture {
        tmp_dir: TempDir,
        model: Arc<ScriptedModel>,
        checkpoints: Arc<CheckpointStore>,
        history: Arc<SessionHistoryManager>,
        session: EditingSession,
    }

    /// `script` receives the URI of the fixture's `main.rs`.
    fn setup(
        script: impl FnOnce(&str) -> ScriptedModel,
        confirm: Arc<dyn ConfirmChange>,
    ) -> Fixture {
        let tmp_dir = Builder::new().prefix("test-editing-").tempdir().unwrap();
        fs::write(tmp_dir.path().join("main.rs"), "fn main() {}\n").unwrap();
        fs::write(tmp_dir.path().join("notes.txt"), "remember").unwrap();
        let model = script(&to_uri(&tmp_dir.path().join("main.rs")));

        let workspace = Arc::new(LocalWorkspace::new(tmp_dir.path()));
        let checkpoints = Arc::new(CheckpointStore::new(workspace.clone()));
        let history = Arc::new(SessionHistoryManager::new(Box::new(MemoryStore::new())).unwrap());
        let model = Arc::new(model);
        let session = EditingSession::new(
            model.clone(),
            Arc::new(ToolRegistry::with_builtin_tools().unwrap()),
            ToolContext::new(workspace),
            checkpoints.clone(),
            confirm,
        )
        .with_history(history.clone());
        Fixture {
            tmp_dir,
            model,
            checkpoints,
            history,
            session,
        }
    }

    fn modification(uri: &str) -> String {
        format!(
            "Updating main.\n<file-modification>\n<change-description>Print a greeting</change-description>\n<complete-file-uri>{uri}</complete-file-uri>\n<updated-file-content>\nfn main() {{\n    println!(\"hi\");\n}}\n</updated-file-content>\n</file-modification>\n"
        )
    }

    fn chunks(text: &str, size: usize) -> Vec<String> {
        text.chars()
            .collect::<Vec<_>>()
            .chunks(size)
            .map(|c| c.iter().collect())
            .collect()
    }

    fn scripted(texts: &[Vec<String>]) -> ScriptedModel {
        texts.iter().fold(ScriptedModel::new(), |model, parts| {
            let parts: Vec<&str> = parts.iter().map(String::as_str).collect();
            model.with_response(&parts)
        })
    }

    #[test]
    fn test_surrounding_whitespace_is_kept() {
        assert_eq!(with_surrounding_whitespace("\n  a\n\n", " b "), "\n  b\n\n");
        assert_eq!(with_surrounding_whitespace("", "\nb\n"), "b");
        assert_eq!(with_surrounding_whitespace("   ", "b"), "   b   ");
        assert_eq!(with_surrounding_whitespace("\n", " b "), "\nb\n");
    }

    #[tokio::test]
    async fn test_accepted_modification_is_written() {
        let confirm = RecordingConfirm::new(true);
        let fixture = setup(
            |uri| scripted(&[chunks(&modification(uri), 7)]),
            confirm.clone(),
        );
        let uri = to_uri(&fixture.tmp_dir.path().join("main.rs"));

        let sink = RecordingSink::new();
        let outcome = fixture
            .session
            .handle(&EditingRequest::new("greet"), &sink, &CancellationToken::new())
            .await;

        let path = fixture.tmp_dir.path().join("main.rs");
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "fn main() {\n    println!(\"hi\");\n}\n"
        );
        assert!(outcome.success);
        assert_eq!(outcome.modified_files, vec![uri.clone()]);
        assert!(outcome.error.is_none());
        assert_eq!(confirm.seen.lock().unwrap().len(), 1);
        assert!(fixture.checkpoints.pending().is_empty());

        let parts = sink.parts();
        assert!(parts.contains(&ResponsePart::CodeBlockUri(uri.clone())));
        assert!(parts.iter().any(|p| matches!(p, ResponsePart::TextEdit { uri: u, .. } if *u == uri)));
        assert!(sink.markdown_text().contains("Smart Patch Applied"));
        assert!(!sink.markdown_text().contains("Updating main."));

        let entries = fixture.history.list(&HistoryFilter::default());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, SessionKind::Editing);
        assert!(entries[0].has_file_modifications);
        assert_eq!(entries[0].model_id.as_deref(), Some("scripted"));
    }

    #[tokio::test]
    async fn test_rejected_modification_restores_file() {
        let fixture = setup(
            |uri| scripted(&[vec![modification(uri)]]),
            RecordingConfirm::new(false),
        );

        let sink = RecordingSink::new();
        let outcome = fixture
            .session
            .handle(&EditingRequest::new("greet"), &sink, &CancellationToken::new())
            .await;

        let path = fixture.tmp_dir.path().join("main.rs");
        assert_eq!(fs::read_to_string(&path).unwrap(), "fn main() {}\n");
        assert!(outcome.modified_files.is_empty());
        assert!(fixture.checkpoints.pending().is_empty());
        assert_eq!(sink.markdown_text().matches("was reverted").count(), 1);
        assert!(!fixture.history.list(&HistoryFilter::default())[0].has_file_modifications);
    }

    #[tokio::test]
    async fn test_plain_answer_is_pushed_as_markdown() {
        let fixture = setup(
            |_| scripted(&[vec!["Nothing ".to_string(), "to change.".to_string()]]),
            Arc::new(AutoApprove),
        );
        let uri = to_uri(&fixture.tmp_dir.path().join("main.rs"));
        let request = EditingRequest::new("look").with_working_set(vec![uri.clone()]);
        let sink = RecordingSink::new();
        let outcome = fixture
            .session
            .handle(&request, &sink, &CancellationToken::new())
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.response, "Nothing to change.");
        assert_eq!(sink.markdown_text(), "Nothing to change.");
        assert_eq!(sink.progress_messages(), vec!["Generating Edits"]);

        let entry = &fixture.history.list(&HistoryFilter::default())[0];
        let metadata = entry.metadata.as_ref().unwrap();
        assert_eq!(metadata["workingSet"], Value::from(vec![uri]));
    }

    #[tokio::test]
    async fn test_tool_call_runs_once_and_feeds_result_back() {
        let call = "<tool-call>\n<tool-name>analyzeFile</tool-name>\n<tool-args>{\"uri\": \"notes.txt\"}</tool-args>\n</tool-call>\n";
        let fixture = setup(
            |_| scripted(&[chunks(call, 5), vec!["The notes say remember.".to_string()]]),
            Arc::new(AutoApprove),
        );
        let sink = RecordingSink::new();
        let outcome = fixture
            .session
            .handle(&EditingRequest::new("what do the notes say"), &sink, &CancellationToken::new())
            .await;

        let requests = fixture.model.requests();
        assert_eq!(requests.len(), 2);
        let last = requests[1].last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.content, "Tool analyzeFile returned:\n\"remember\"");
        assert!(outcome.response.ends_with("The notes say remember."));
        assert_eq!(
            sink.progress_messages(),
            vec!["Generating Edits", "Executing tool: Analyze File"]
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported() {
        let call = "<tool-call><tool-name>nope</tool-name><tool-args>{}</tool-args></tool-call>";
        let fixture = setup(|_| scripted(&[vec![call.to_string()]]), Arc::new(AutoApprove));
        let sink = RecordingSink::new();
        fixture
            .session
            .handle(&EditingRequest::new("x"), &sink, &CancellationToken::new())
            .await;

        assert_eq!(fixture.model.requests().len(), 1);
        assert!(sink.progress_messages().contains(&"Tool nope not found.".to_string()));
    }

    #[tokio::test]
    async fn test_failing_tool_is_reported() {
        let call = "<tool-call><tool-name>analyzeFile</tool-name><tool-args>{\"uri\": \"missing.txt\"}</tool-args></tool-call>";
        let fixture = setup(|_| scripted(&[vec![call.to_string()]]), Arc::new(AutoApprove));
        let sink = RecordingSink::new();
        fixture
            .session
            .handle(&EditingRequest::new("x"), &sink, &CancellationToken::new())
            .await;

        assert_eq!(fixture.model.requests().len(), 1);
        assert!(
            sink.progress_messages()
                .contains(&"Failed to execute tool analyzeFile".to_string())
        );
    }

    #[tokio::test]
    async fn test_tool_rounds_are_bounded() {
        let call = "<tool-call><tool-name>analyzeFile</tool-name><tool-args>{\"uri\": \"notes.txt\"}</tool-args></tool-call>";
        let fixture = setup(|_| scripted(&[vec![call.to_string()]]), Arc::new(AutoApprove));
        let session = fixture.session.with_max_tool_rounds(0);
        let sink = RecordingSink::new();
        session
            .handle(&EditingRequest::new("x"), &sink, &CancellationToken::new())
            .await;

        assert_eq!(fixture.model.requests().len(), 1);
        assert!(
            sink.parts()
                .iter()
                .any(|p| matches!(p, ResponsePart::Warning(w) if w.contains("limit")))
        );
    }

    #[tokio::test]
    async fn test_model_failure_becomes_generic_error() {
        let fixture = setup(|_| ScriptedModel::new(), Arc::new(AutoApprove));
        let sink = RecordingSink::new();
        let outcome = fixture
            .session
            .handle(&EditingRequest::new("x"), &sink, &CancellationToken::new())
            .await;

        assert_eq!(outcome.error.as_deref(), Some(ERROR_MESSAGE));
        assert_eq!(outcome.response, ERROR_RESPONSE);
        assert!(sink.parts().contains(&ResponsePart::Warning(ERROR_MESSAGE.to_string())));
        assert_eq!(
            fixture.history.list(&HistoryFilter::default())[0].response,
            ERROR_RESPONSE
        );
    }

    #[tokio::test]
    async fn test_cancelled_session_stops_reading() {
        let fixture = setup(
            |_| scripted(&[vec!["first".to_string(), "second".to_string()]]),
            Arc::new(AutoApprove),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = fixture
            .session
            .handle(&EditingRequest::new("x"), &RecordingSink::new(), &cancel)
            .await;

        assert_eq!(outcome.response, "");
        assert!(outcome.error.is_none());
    }
}
