//! # Streamed response parser
//!
//! The model's answer arrives in chunks. After every chunk the whole buffer is
//! re-scanned for complete `<tool-call>` regions and for `<file-modification>`
//! regions, which may still be streaming their `<updated-file-content>`.
//!
//! [`scan`] is stateless and reports everything it can see in a buffer.
//! [`StreamParser`] pairs it with an explicit [`EmittedRegions`] set so that a
//! region is turned into an event exactly once, no matter how many chunks it
//! was split across or how often the buffer is re-scanned.

use crate::markup::{self, Region};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    ToolCall {
        name: String,
        args: Value,
    },
    /// A file-modification region whose description and URI are complete.
    FileAnnounced {
        description: String,
        uri: String,
    },
    /// The updated content is still streaming; `lines` lines have arrived.
    FileProgress {
        uri: String,
        lines: usize,
    },
    FileCompleted {
        description: String,
        uri: String,
        content: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent<'a> {
    Missing,
    Partial(&'a str),
    Complete(&'a str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedToolCall<'a> {
    /// Byte offset of the region in the buffer. Stable because the buffer only
    /// ever grows at the end.
    pub offset: usize,
    pub name: Option<&'a str>,
    pub args: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile<'a> {
    pub description: &'a str,
    pub uri: &'a str,
    pub content: FileContent<'a>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Scan<'a> {
    pub tool_calls: Vec<ScannedToolCall<'a>>,
    pub files: Vec<ScannedFile<'a>>,
}

/// Scans a complete-so-far response buffer.
pub fn scan(buffer: &str) -> Scan<'_> {
    let tool_calls = markup::find_regions(buffer, markup::TOOL_CALL)
        .into_iter()
        .map(|Region { start, inner }| ScannedToolCall {
            offset: start,
            name: markup::find_tag(inner, markup::TOOL_NAME)
                .map(str::trim)
                .filter(|s| !s.is_empty()),
            args: markup::find_tag(inner, markup::TOOL_ARGS)
                .map(str::trim)
                .filter(|s| !s.is_empty()),
        })
        .collect();

    // Splitting on the opening tag lets a region be reported before its
    // closing tag has streamed in.
    let files = buffer
        .split(&markup::open_tag(markup::FILE_MODIFICATION))
        .filter_map(|segment| {
            let description = markup::find_tag(segment, markup::CHANGE_DESCRIPTION)?.trim();
            let uri = markup::find_tag(segment, markup::COMPLETE_FILE_URI)?.trim();
            let content = match markup::find_tag(segment, markup::UPDATED_FILE_CONTENT) {
                Some(code) => FileContent::Complete(code.trim()),
                None => match markup::after_open_tag(segment, markup::UPDATED_FILE_CONTENT) {
                    Some(partial) if !partial.is_empty() => FileContent::Partial(partial),
                    _ => FileContent::Missing,
                },
            };
            Some(ScannedFile {
                description,
                uri,
                content,
            })
        })
        .collect();

    Scan { tool_calls, files }
}

/// Identity of something that has already been turned into an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EmittedRegion {
    ToolCall(usize),
    FileAnnounced(String),
    FileCompleted(String),
}

#[derive(Debug, Default)]
pub struct EmittedRegions {
    seen: HashSet<EmittedRegion>,
    progress: HashMap<String, usize>,
}

impl EmittedRegions {
    /// Records `region`; returns `true` if it had not been emitted before.
    pub fn insert(&mut self, region: EmittedRegion) -> bool {
        self.seen.insert(region)
    }

    pub fn contains(&self, region: &EmittedRegion) -> bool {
        self.seen.contains(region)
    }

    /// Records a progress line count; returns `true` if it changed.
    pub fn update_progress(&mut self, uri: &str, lines: usize) -> bool {
        match self.progress.insert(uri.to_string(), lines) {
            Some(previous) => previous != lines,
            None => true,
        }
    }
}

#[derive(Debug, Default)]
pub struct StreamParser {
    buffer: String,
    emitted: EmittedRegions,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Appends `chunk`, re-scans the buffer and returns the new events.
    ///
    /// Tool calls come first, then file events in buffer order.
    pub fn push(&mut self, chunk: &str) -> Vec<StreamEvent> {
        self.buffer.push_str(chunk);
        let scan = scan(&self.buffer);
        let mut events = Vec::new();

        for call in scan.tool_calls {
            if !self.emitted.insert(EmittedRegion::ToolCall(call.offset)) {
                continue;
            }
            let (Some(name), Some(raw_args)) = (call.name, call.args) else {
                tracing::debug!(offset = call.offset, "dropping tool call without name or args");
                continue;
            };
            match serde_json::from_str::<Value>(raw_args) {
                Ok(args) => events.push(StreamEvent::ToolCall {
                    name: name.to_string(),
                    args,
                }),
                Err(e) => {
                    tracing::debug!(tool = name, error = %e, "dropping tool call with malformed args");
                }
            }
        }

        let mut progressed = HashSet::new();
        for file in scan.files {
            if self
                .emitted
                .insert(EmittedRegion::FileAnnounced(file.uri.to_string()))
            {
                events.push(StreamEvent::FileAnnounced {
                    description: file.description.to_string(),
                    uri: file.uri.to_string(),
                });
            }

            match file.content {
                FileContent::Complete(content) => {
                    if self
                        .emitted
                        .insert(EmittedRegion::FileCompleted(file.uri.to_string()))
                    {
                        events.push(StreamEvent::FileCompleted {
                            description: file.description.to_string(),
                            uri: file.uri.to_string(),
                            content: content.to_string(),
                        });
                    }
                }
                FileContent::Partial(partial) => {
                    let completed = self
                        .emitted
                        .contains(&EmittedRegion::FileCompleted(file.uri.to_string()));
                    let lines = partial.trim().split('\n').count();
                    if !completed
                        && progressed.insert(file.uri)
                        && self.emitted.update_progress(file.uri, lines)
                    {
                        events.push(StreamEvent::FileProgress {
                            uri: file.uri.to_string(),
                            lines,
                        });
                    }
                }
                FileContent::Missing => {}
            }
        }

        events
    }
}
