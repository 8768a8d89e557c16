//! Panel chat: streamed question answering plus the title and follow-up
//! providers.

use crate::editing_session::{ERROR_MESSAGE, ERROR_RESPONSE};
use crate::llm::{ChatMessage, LanguageModel};
use crate::markup;
use crate::prompt_builder::{self, ChatTurn};
use crate::response::{ResponsePart, ResponseSink};
use crate::session_history::{SessionHistoryEntry, SessionHistoryManager, SessionKind};
use crate::web::WebSearch;
use crate::workspace::Workspace;
use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatOutcome {
    pub request: String,
    pub response: String,
    pub error: Option<String>,
}

pub struct PanelChat {
    model: Arc<dyn LanguageModel>,
    workspace: Arc<dyn Workspace>,
    web_search: Option<Arc<WebSearch>>,
    history: Option<Arc<SessionHistoryManager>>,
}

impl PanelChat {
    pub fn new(model: Arc<dyn LanguageModel>, workspace: Arc<dyn Workspace>) -> Self {
        Self {
            model,
            workspace,
            web_search: None,
            history: None,
        }
    }

    pub fn with_web_search(mut self, web_search: Arc<WebSearch>) -> Self {
        self.web_search = Some(web_search);
        self
    }

    pub fn with_history(mut self, history: Arc<SessionHistoryManager>) -> Self {
        self.history = Some(history);
        self
    }

    /// Streams the answer to `prompt` as markdown parts.
    pub async fn respond(
        &self,
        history: &[ChatTurn],
        prompt: &str,
        sink: &dyn ResponseSink,
        cancel: &CancellationToken,
    ) -> ChatOutcome {
        let outcome = match self.stream_answer(history, prompt, sink, cancel).await {
            Ok(response) => ChatOutcome {
                request: prompt.to_string(),
                response,
                error: None,
            },
            Err(e) => {
                tracing::error!(error = %format!("{e:#}"), "panel chat failed");
                sink.push(ResponsePart::Warning(ERROR_MESSAGE.to_string()));
                ChatOutcome {
                    request: prompt.to_string(),
                    response: ERROR_RESPONSE.to_string(),
                    error: Some(ERROR_MESSAGE.to_string()),
                }
            }
        };

        if let Some(manager) = &self.history {
            let entry = SessionHistoryEntry::new(
                SessionKind::Chat,
                outcome.request.clone(),
                outcome.response.clone(),
            )
            .with_model_id(self.model.id());
            if let Err(e) = manager.add(entry) {
                tracing::warn!(error = %e, "failed to record chat session");
            }
        }
        outcome
    }

    async fn stream_answer(
        &self,
        history: &[ChatTurn],
        prompt: &str,
        sink: &dyn ResponseSink,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let messages = prompt_builder::build_chat_request(
            self.model.as_ref(),
            self.workspace.as_ref(),
            history,
            prompt,
            self.web_search.as_deref(),
        )
        .await?;

        let mut chunks = self.model.stream(messages, cancel.clone()).await?;
        let mut response = String::new();
        while let Some(chunk) = chunks.recv().await {
            if cancel.is_cancelled() {
                tracing::info!("panel chat cancelled");
                break;
            }
            let chunk = chunk?;
            sink.push(ResponsePart::Markdown(chunk.clone()));
            response.push_str(&chunk);
        }
        Ok(response)
    }

    /// A short title for a conversation, from its first exchange.
    pub async fn provide_title(&self, first_turn: &ChatTurn) -> Option<String> {
        let messages = prompt_builder::build_title_request(first_turn);
        self.complete_tag(messages, markup::CHAT_SUMMARY_TITLE).await
    }

    /// A follow-up question the user might ask next.
    pub async fn provide_followup(&self, history: &[ChatTurn], latest: &ChatTurn) -> Option<String> {
        let messages = prompt_builder::build_followup_request(history, latest);
        self.complete_tag(messages, markup::FOLLOW_UP_QUESTION).await
    }

    async fn complete_tag(&self, messages: Vec<ChatMessage>, tag: &str) -> Option<String> {
        match self.model.complete(messages, CancellationToken::new()).await {
            Ok(text) => markup::extract_tag(&text, tag),
            Err(e) => {
                tracing::warn!(tag, error = %e, "completion failed");
                None
            }
        }
    }
}
