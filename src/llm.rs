//! The language-model seam: messages in, streamed text out.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Receiving end of a streamed completion. The stream ends when the sender
/// is dropped; an `Err` item ends it early.
pub type ChunkStream = mpsc::Receiver<Result<String>>;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Identifier of the underlying model, e.g. `google/gemini-2.5-flash`.
    fn id(&self) -> &str;

    async fn stream(
        &self,
        messages: Vec<ChatMessage>,
        cancel: CancellationToken,
    ) -> Result<ChunkStream>;

    /// Collects a whole response.
    async fn complete(&self, messages: Vec<ChatMessage>, cancel: CancellationToken) -> Result<String> {
        let mut chunks = self.stream(messages, cancel.clone()).await?;
        let mut text = String::new();
        while let Some(chunk) = chunks.recv().await {
            if cancel.is_cancelled() {
                break;
            }
            text.push_str(&chunk?);
        }
        Ok(text)
    }
}

/// A model that replays canned responses, one per call, each split into the
/// given chunks. Every request it receives is recorded.
#[derive(Default)]
pub struct ScriptedModel {
    responses: Mutex<VecDeque<Vec<String>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, chunks: &[&str]) -> Self {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(chunks.iter().map(|c| c.to_string()).collect());
        }
        self
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn id(&self) -> &str {
        "scripted"
    }

    async fn stream(
        &self,
        messages: Vec<ChatMessage>,
        _cancel: CancellationToken,
    ) -> Result<ChunkStream> {
        self.requests
            .lock()
            .map_err(|_| anyhow!("request log poisoned"))?
            .push(messages);
        let chunks = self
            .responses
            .lock()
            .map_err(|_| anyhow!("response queue poisoned"))?
            .pop_front()
            .ok_or_else(|| anyhow!("No scripted response left"))?;

        let (tx, rx) = mpsc::channel(chunks.len().max(1));
        for chunk in chunks {
            // Capacity covers every chunk, so this never waits.
            tx.try_send(Ok(chunk))
                .map_err(|e| anyhow!("Failed to queue scripted chunk: {e}"))?;
        }
        Ok(rx)
    }
}
