//! # Prompt building
//!
//! Turns conversation state into the message lists sent to the model:
//! editing requests (tool catalog, working set, instructions, response
//! format), panel chat requests, and the small title and follow-up requests.
//! A prompt that mentions `@web` gets a web search context message first.

use crate::enricher;
use crate::llm::{ChatMessage, LanguageModel};
use crate::markup;
use crate::tool_registry::ToolRegistry;
use crate::web::{WebResult, WebSearch};
use crate::workspace::Workspace;
use anyhow::Result;
use std::fmt::Write as _;
use tokio_util::sync::CancellationToken;

/// One earlier request/response pair of the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub prompt: String,
    pub response: String,
}

impl ChatTurn {
    pub fn new(prompt: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            response: response.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebContext {
    Found {
        query: String,
        results: Vec<WebResult>,
    },
    Failed(String),
}

impl WebContext {
    pub fn citations(&self) -> String {
        match self {
            WebContext::Found { results, .. } => results
                .iter()
                .enumerate()
                .map(|(i, r)| format!("[{}] {} ({})", i + 1, r.title, r.url))
                .collect::<Vec<_>>()
                .join("\n"),
            WebContext::Failed(_) => String::new(),
        }
    }
}

/// Runs a structured web search for the first instruction mentioning `@web`.
pub async fn fetch_web_context(
    instructions: &[String],
    web_search: Option<&WebSearch>,
) -> Option<WebContext> {
    let instruction = instructions.iter().find(|i| enricher::mentions_web(i))?;
    let query = enricher::web_query(instruction);
    let Some(web_search) = web_search else {
        return Some(WebContext::Failed(
            "Web search failed: web search is not configured".to_string(),
        ));
    };

    let results = web_search.search_structured(&query).await;
    if results.is_empty() {
        return Some(WebContext::Failed(format!(
            "Web search failed: no results for \"{query}\""
        )));
    }
    Some(WebContext::Found { query, results })
}

fn render_raw_web_context(context: &WebContext) -> String {
    match context {
        WebContext::Found { results, .. } => {
            let extracts = results
                .iter()
                .enumerate()
                .map(|(i, r)| format!("[{}] {}", i + 1, r.extracted_content))
                .collect::<Vec<_>>()
                .join("\n\n");
            format!(
                "### Web Search Context\n\n{extracts}\n\n**Citations:**\n{}",
                context.citations()
            )
        }
        WebContext::Failed(message) => message.clone(),
    }
}

/// Asks `model` to condense the search results into a cited answer. Falls
/// back to the raw extracts.
async fn render_summarized_web_context(context: &WebContext, model: &dyn LanguageModel) -> String {
    let WebContext::Found { query, results } = context else {
        return render_raw_web_context(context);
    };
    let mut prompt = format!(
        "You are a smart assistant. Given the following web search results for the query: \"{query}\", synthesize a clear, direct, and relevant answer. Use the extracted content to answer, and cite or link to the most relevant sources.\n\n"
    );
    for (i, r) in results.iter().enumerate() {
        let _ = writeln!(
            prompt,
            "Source [{}]: {} ({})\nContent: {}\n",
            i + 1,
            r.title,
            r.url,
            r.extracted_content
        );
    }
    prompt.push_str("\n---\nPlease write a concise answer to the query, referencing the sources as [1], [2], etc., where appropriate. Include links where helpful.");

    let messages = vec![
        ChatMessage::system(
            "You are a helpful assistant that summarizes web search results and always cites sources.",
        ),
        ChatMessage::user(prompt),
    ];
    let summary = match model.complete(messages, CancellationToken::new()).await {
        Ok(summary) if !summary.trim().is_empty() => summary,
        Ok(_) => "[Failed to summarize with LLM]".to_string(),
        Err(e) => {
            tracing::debug!(error = %e, "web context summary failed");
            "[Failed to summarize with LLM]".to_string()
        }
    };
    format!(
        "### Web Search Context\n\n{}\n\n**Citations:**\n{}",
        summary.trim(),
        context.citations()
    )
}

const AGENT_ROLE: &str = "## Agent Mode: Autonomous AI Developer

- You are an **autonomous AI coding agent** named **Flexpilot**.
- You have **full access to the entire codebase** and may **explore, create, edit, and delete any file or folder** needed to accomplish the user's request.
- You can **plan and execute multi-step changes** across the project, including searching, editing, creating files, running terminal commands, and using all available tools.
- You may **search the codebase, documentation, and the web** to gather context.
- **Break down complex tasks into manageable steps**, plan your approach, and execute changes in sequence.
- After making changes, **verify your results** (run tests, check diagnostics, review code) and **fix issues** you detect.
- Once the task is complete, **summarize the changes you made**, including new files, deleted files, and major refactors.";

const BEST_PRACTICES: &str = "**Best Practices:**
- Be proactive and solve the user's request end-to-end.
- Document your plan and reasoning as you go.
- Ask for clarification only if absolutely necessary.
- Always cite sources when using web search results.";

const EDITING_METHODS: &str = "**Editing Methods:**
1. **Whole-file replace:** emit a `<file-modification>` with the complete new content, or use `editFile` / `rewriteFile`.
2. **Smart patch (SEARCH/REPLACE blocks):** for precise, minimal edits, pass SEARCH/REPLACE blocks to the `replaceInFile` tool. Prefer this for small or multi-location changes.

SEARCH/REPLACE block format:

```
<<<<<<< ORIGINAL
// ... original code ...
=======
// ... new code ...
>>>>>>> UPDATED
```

- Each block must match the original code exactly.
- You may output multiple blocks for multiple changes in a file.";

const TOOL_CALL_FORMAT: &str = "**Calling a tool:** emit exactly one block per call. The result is sent back to you.

```
<tool-call>
<tool-name>analyzeFile</tool-name>
<tool-args>{\"uri\": \"file:///exact/path/to/file.ts\"}</tool-args>
</tool-call>
```";

const FILE_MODIFICATION_FORMAT: &str = "### Response Format

**The response should follow below format strictly**

```
<file-modification>
    <change-description>
        Text description of why this particular test1.ts change was made
    </change-description>
    <complete-file-uri>
        file:///exact/complete/path/to/file/test1.ts
    </complete-file-uri>
    <updated-file-content>
import * as fs from 'fs';
    </updated-file-content>
</file-modification>
```";

/// The instruction message of an editing request.
pub fn editing_instructions(
    registry: &ToolRegistry,
    working_set: &[String],
    instructions: &[String],
) -> String {
    let mut out = String::new();
    out.push_str(AGENT_ROLE);
    out.push_str("\n- You have access to the following tools:\n");
    for tool in registry.tools() {
        let description = tool.schema().description.unwrap_or_default();
        let _ = writeln!(
            out,
            "  - **{}** (`{}`): {}",
            tool.display_name(),
            tool.name(),
            description
        );
    }
    let _ = write!(
        out,
        "\n{BEST_PRACTICES}\n\n{EDITING_METHODS}\n\n{TOOL_CALL_FORMAT}\n\n### Working Set Files\n\n"
    );
    for file in working_set {
        let _ = writeln!(out, "- {file}");
    }
    out.push_str("\n### Instructions\n\n");
    for instruction in instructions {
        let _ = writeln!(out, "- {instruction}");
    }
    let _ = write!(out, "\n{FILE_MODIFICATION_FORMAT}");
    out
}

/// Builds an editing request. Prior prompts are repeated as instructions
/// ahead of the current one.
pub async fn build_editing_request(
    registry: &ToolRegistry,
    working_set: &[String],
    history: &[ChatTurn],
    prompt: &str,
    web_search: Option<&WebSearch>,
) -> Vec<ChatMessage> {
    let mut instructions: Vec<String> = history
        .iter()
        .map(|turn| turn.prompt.clone())
        .filter(|p| !p.trim().is_empty())
        .collect();
    instructions.push(prompt.to_string());

    let mut messages = Vec::new();
    if let Some(context) = fetch_web_context(&instructions, web_search).await {
        messages.push(ChatMessage::user(render_raw_web_context(&context)));
    }
    messages.push(ChatMessage::user(editing_instructions(
        registry,
        working_set,
        &instructions,
    )));
    messages
}

pub fn chat_system_prompt(model_id: &str) -> String {
    format!(
        "# Important Points

- You are an AI programming assistant and a skilled programmer named **Flexpilot**, working in a {os} environment, assisting a fellow developer.
- Follow the user's requirements carefully & to the letter.
- Keep your answers short and impersonal.
- You are powered by **{model_id}** Large Language Model.
- Use Markdown formatting in your answers.
- Make sure to include the programming language name at the start of the Markdown code blocks like below

```python
print('hello world')
```

- Avoid wrapping the whole response in triple backticks.",
        os = std::env::consts::OS,
    )
}

/// Appends the content of every `@path` mention that exists in the
/// workspace, and notes the ones that do not.
pub async fn expand_file_mentions(prompt: &str, workspace: &dyn Workspace) -> Result<String> {
    let enrichments = enricher::extract_enrichments(prompt);
    if enrichments.mentioned_files.is_empty() {
        return Ok(prompt.to_string());
    }

    let mut attached = String::new();
    let mut not_found = Vec::new();
    for mention in &enrichments.mentioned_files {
        let path = workspace.resolve_uri(mention);
        match workspace.read_file(&path).await {
            Ok(content) => {
                let _ = write!(attached, "\nFile: {mention}\n```\n{content}\n```\n");
            }
            Err(e) => {
                tracing::warn!(mention = %mention, error = %e, "could not attach mentioned file");
                not_found.push(mention.clone());
            }
        }
    }

    let mut final_prompt = prompt.to_string();
    if !attached.is_empty() {
        final_prompt.push_str("\n\nAttached file contents:\n");
        final_prompt.push_str(&attached);
    }
    if !not_found.is_empty() {
        let _ = write!(
            final_prompt,
            "\nNote: The following files were mentioned but could not be found and are not included: {}\n",
            not_found.join(", ")
        );
    }
    Ok(final_prompt)
}

/// Builds a panel chat request. When `model` is given, web search results
/// are summarised by it before they are added as context.
pub async fn build_chat_request(
    model: &dyn LanguageModel,
    workspace: &dyn Workspace,
    history: &[ChatTurn],
    prompt: &str,
    web_search: Option<&WebSearch>,
) -> Result<Vec<ChatMessage>> {
    let mut messages = vec![ChatMessage::system(chat_system_prompt(model.id()))];

    let mut instructions: Vec<String> = history.iter().map(|t| t.prompt.clone()).collect();
    instructions.push(prompt.to_string());
    if let Some(context) = fetch_web_context(&instructions, web_search).await {
        messages.push(ChatMessage::system(
            render_summarized_web_context(&context, model).await,
        ));
    }

    for turn in history {
        messages.push(ChatMessage::user(turn.prompt.clone()));
        let response = turn.response.trim();
        if !response.is_empty() {
            messages.push(ChatMessage::assistant(response));
        }
    }

    messages.push(ChatMessage::user(
        expand_file_mentions(prompt, workspace).await?,
    ));
    Ok(messages)
}

pub fn build_title_request(first_turn: &ChatTurn) -> Vec<ChatMessage> {
    let tag = markup::CHAT_SUMMARY_TITLE;
    let system = format!(
        "## Important Instructions

- You are an AI programming assistant and a skilled programmer named **Flexpilot**, assisting a fellow developer in **crafting a perfect title for a chat conversation**.
- You must provide a **concise title** that encapsulates the main topic of the chat dialogue in **under 10 words in a single sentence.**
- **Very Important: Strictly follow below response format in the output**

## Response Format:

<{tag}>Perfect title for the chat conversation</{tag}>

## Example Responses

<{tag}>Optimizing SQL query performance</{tag}>
<{tag}>Debugging memory leaks in C++ applications</{tag}>
<{tag}>Configuring Kubernetes ingress controllers</{tag}>
<{tag}>Implementing JWT authentication in Node.js</{tag}>"
    );
    let conversation = format!(
        "### Chat Conversation\n\n- **User:** {}\n- **Assistant:** {}",
        first_turn.prompt.trim(),
        first_turn.response.trim()
    );
    vec![
        ChatMessage::system(system),
        ChatMessage::user(
            "Provide a concise title for the below chat conversation that encapsulates the main topic discussed. It must be under 10 words in a single sentence and strictly follow response format",
        ),
        ChatMessage::user(conversation),
    ]
}

pub fn build_followup_request(history: &[ChatTurn], latest: &ChatTurn) -> Vec<ChatMessage> {
    let tag = markup::FOLLOW_UP_QUESTION;
    let system = format!(
        "## Important Instructions

- You are an AI programming assistant and a skilled programmer named **Flexpilot**, assisting a fellow developer in **crafting follow-up question** for the current chat conversation.
- You must provide a **short, one-sentence question** that the **user can ask naturally** that follows from the previous few questions and answers. The question must be **under 10 words** and in a **single line.**
- **Very Important: Strictly follow below response format in the output**

## Response Format:

<{tag}>Short follow-up question</{tag}>

## Example Responses

<{tag}>How can I optimize this SQL query?</{tag}>
<{tag}>What are the best practices for using Docker?</{tag}>
<{tag}>How can I improve the performance of my React app?</{tag}>
<{tag}>What are the common pitfalls of using Node.js?</{tag}>"
    );
    let mut messages = vec![ChatMessage::system(system)];
    for turn in history.iter().chain(std::iter::once(latest)) {
        messages.push(ChatMessage::user(turn.prompt.clone()));
        messages.push(ChatMessage::assistant(turn.response.clone()));
    }
    messages.push(ChatMessage::user(
        "Write a short (under 10 words) one-sentence follow up question that the user can ask naturally that follows from the previous few questions and answers.",
    ));
    messages
}
