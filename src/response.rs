//! Response parts streamed back to whoever drives a request (the terminal UI
//! in the binary, a recorder in tests).

use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponsePart {
    /// Short status line.
    Progress(String),
    Markdown(String),
    /// Reference to the file a code block is being written for.
    CodeBlockUri(String),
    /// Number of lines streamed so far for a file modification.
    FileProgress { uri: String, lines: usize },
    /// A file was replaced with `content`.
    TextEdit { uri: String, content: String },
    Warning(String),
}

pub trait ResponseSink: Send + Sync {
    fn push(&self, part: ResponsePart);
}

/// Keeps every part in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    parts: Mutex<Vec<ResponsePart>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parts(&self) -> Vec<ResponsePart> {
        self.parts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn markdown_text(&self) -> String {
        self.parts()
            .into_iter()
            .filter_map(|part| match part {
                ResponsePart::Markdown(text) => Some(text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn progress_messages(&self) -> Vec<String> {
        self.parts()
            .into_iter()
            .filter_map(|part| match part {
                ResponsePart::Progress(text) => Some(text),
                _ => None,
            })
            .collect()
    }
}

impl ResponseSink for RecordingSink {
    fn push(&self, part: ResponsePart) {
        if let Ok(mut parts) = self.parts.lock() {
            parts.push(part);
        }
    }
}
