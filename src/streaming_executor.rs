use crate::llm::{ChatMessage, ChunkStream, LanguageModel};
use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use openrouter_api::{OpenRouterClient, Ready, types::chat::*};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A [`LanguageModel`] backed by an OpenAI-compatible chat completion
/// endpoint (OpenRouter, Ollama, OpenAI).
pub struct OpenRouterModel {
    client: Arc<OpenRouterClient<Ready>>,
    model: String,
}

impl OpenRouterModel {
    pub fn new(client: OpenRouterClient<Ready>, model: impl Into<String>) -> Self {
        Self {
            client: Arc::new(client),
            model: model.into(),
        }
    }
}

fn to_request(model: &str, messages: Vec<ChatMessage>) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: model.to_string(),
        messages: messages
            .into_iter()
            .map(|m| Message {
                role: m.role.as_str().to_string(),
                content: m.content,
                name: None,
                tool_calls: None,
                tool_call_id: None,
            })
            .collect(),
        stream: Some(true),
        response_format: None,
        tools: None,
        provider: None,
        models: None,
        transforms: None,
    }
}

#[async_trait]
impl LanguageModel for OpenRouterModel {
    fn id(&self) -> &str {
        &self.model
    }

    async fn stream(
        &self,
        messages: Vec<ChatMessage>,
        cancel: CancellationToken,
    ) -> Result<ChunkStream> {
        let request = to_request(&self.model, messages);
        let client = Arc::clone(&self.client);
        let (tx, rx) = mpsc::channel(64);

        tracing::debug!(model = %self.model, "starting completion stream");
        tokio::spawn(async move {
            let chat = match client.chat() {
                Ok(chat) => chat,
                Err(e) => {
                    let _ = tx.send(Err(e.into())).await;
                    return;
                }
            };
            let mut stream = chat.chat_completion_stream(request);

            loop {
                let chunk = tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("completion stream cancelled");
                        break;
                    }
                    chunk = stream.next() => chunk,
                };
                let Some(chunk) = chunk else {
                    break;
                };
                let item = match chunk {
                    Ok(chunk) => match chunk
                        .choices
                        .first()
                        .and_then(|c| c.delta.content.as_deref())
                    {
                        Some(content) if !content.is_empty() => Ok(content.to_string()),
                        _ => continue,
                    },
                    Err(e) => Err(e.into()),
                };
                let failed = item.is_err();
                if tx.send(item).await.is_err() || failed {
                    break;
                }
            }
        });

        Ok(rx)
    }
}
